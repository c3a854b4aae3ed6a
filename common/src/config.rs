use std::path::PathBuf;

use thiserror::Error;
use url::Url;

pub const DEFAULT_ENTITY_ID: &str = "input_boolean.dnd_status";
pub const DISPLAY_WIDTH: u32 = 800;
pub const DISPLAY_HEIGHT: u32 = 480;

pub const ENV_BASE_URL: &str = "HA_BASE_URL";
pub const ENV_TOKEN: &str = "HA_TOKEN";
pub const ENV_ENTITY_ID: &str = "HA_ENTITY_ID";
pub const ENV_MIN_REFRESH_SECONDS: &str = "HA_MIN_REFRESH_SECONDS";
pub const ENV_RECONNECT_SECONDS: &str = "EPAPER_RECONNECT_SECONDS";
pub const ENV_REFUSED_RECONNECT_SECONDS: &str = "EPAPER_REFUSED_RECONNECT_SECONDS";
pub const ENV_CATCH_UP: &str = "EPAPER_CATCH_UP";
pub const ENV_RENDER_STYLE: &str = "EPAPER_RENDER_STYLE";
pub const ENV_OUTPUT_DIR: &str = "EPAPER_OUTPUT_DIR";
pub const ENV_DISPLAY: &str = "EPAPER_DISPLAY";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} environment variable not set")]
    Missing(&'static str),
    #[error("invalid value for {key}: {value:?} ({reason})")]
    Invalid {
        key: &'static str,
        value: String,
        reason: &'static str,
    },
}

#[derive(Clone)]
pub struct HubConfig {
    pub base_url: Url,
    pub token: String,
}

impl std::fmt::Debug for HubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HubConfig")
            .field("base_url", &self.base_url.as_str())
            .field("token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefreshConfig {
    pub entity_id: String,
    pub min_refresh_ms: u64,
    pub catch_up: bool,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            entity_id: DEFAULT_ENTITY_ID.to_string(),
            min_refresh_ms: 10_000,
            catch_up: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectConfig {
    pub retry_delay_ms: u64,
    pub refused_delay_ms: u64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            retry_delay_ms: 10_000,
            refused_delay_ms: 30_000,
        }
    }
}

impl ReconnectConfig {
    pub fn sanitize(&mut self) {
        self.retry_delay_ms = self.retry_delay_ms.max(1_000);
        self.refused_delay_ms = self.refused_delay_ms.max(self.retry_delay_ms);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RenderStyle {
    #[default]
    Dnd,
    Label,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayBackend {
    #[default]
    Auto,
    Simulated,
    Waveshare,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub hub: HubConfig,
    pub refresh: RefreshConfig,
    pub reconnect: ReconnectConfig,
    pub render_style: RenderStyle,
    pub display: DisplayBackend,
    pub output_dir: PathBuf,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let raw_url = get(ENV_BASE_URL).ok_or(ConfigError::Missing(ENV_BASE_URL))?;
        let token = get(ENV_TOKEN).ok_or(ConfigError::Missing(ENV_TOKEN))?;
        let base_url = parse_base_url(&raw_url)?;

        let defaults = RefreshConfig::default();
        let refresh = RefreshConfig {
            entity_id: get(ENV_ENTITY_ID).unwrap_or(defaults.entity_id),
            min_refresh_ms: match get(ENV_MIN_REFRESH_SECONDS) {
                Some(value) => parse_seconds(ENV_MIN_REFRESH_SECONDS, &value)?,
                None => defaults.min_refresh_ms,
            },
            catch_up: match get(ENV_CATCH_UP) {
                Some(value) => parse_bool(ENV_CATCH_UP, &value)?,
                None => defaults.catch_up,
            },
        };

        let mut reconnect = ReconnectConfig::default();
        if let Some(value) = get(ENV_RECONNECT_SECONDS) {
            reconnect.retry_delay_ms = parse_seconds(ENV_RECONNECT_SECONDS, &value)?;
        }
        if let Some(value) = get(ENV_REFUSED_RECONNECT_SECONDS) {
            reconnect.refused_delay_ms = parse_seconds(ENV_REFUSED_RECONNECT_SECONDS, &value)?;
        }
        reconnect.sanitize();

        let render_style = match get(ENV_RENDER_STYLE) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "dnd" => RenderStyle::Dnd,
                "label" => RenderStyle::Label,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: ENV_RENDER_STYLE,
                        value,
                        reason: "expected 'dnd' or 'label'",
                    })
                }
            },
            None => RenderStyle::default(),
        };

        let display = match get(ENV_DISPLAY) {
            Some(value) => match value.to_ascii_lowercase().as_str() {
                "auto" => DisplayBackend::Auto,
                "simulated" => DisplayBackend::Simulated,
                "waveshare" => DisplayBackend::Waveshare,
                _ => {
                    return Err(ConfigError::Invalid {
                        key: ENV_DISPLAY,
                        value,
                        reason: "expected 'auto', 'simulated' or 'waveshare'",
                    })
                }
            },
            None => DisplayBackend::default(),
        };

        let output_dir = get(ENV_OUTPUT_DIR)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("/tmp"));

        Ok(Self {
            hub: HubConfig { base_url, token },
            refresh,
            reconnect,
            render_style,
            display,
            output_dir,
        })
    }
}

fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|_| ConfigError::Invalid {
        key: ENV_BASE_URL,
        value: raw.to_string(),
        reason: "not a valid URL",
    })?;

    match url.scheme() {
        "http" | "https" => Ok(url),
        _ => Err(ConfigError::Invalid {
            key: ENV_BASE_URL,
            value: raw.to_string(),
            reason: "scheme must be http or https",
        }),
    }
}

fn parse_seconds(key: &'static str, value: &str) -> Result<u64, ConfigError> {
    value
        .parse::<u64>()
        .ok()
        .and_then(|seconds| seconds.checked_mul(1_000))
        .ok_or_else(|| ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected a whole number of seconds",
        })
}

fn parse_bool(key: &'static str, value: &str) -> Result<bool, ConfigError> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigError::Invalid {
            key,
            value: value.to_string(),
            reason: "expected true or false",
        }),
    }
}
