use serde::{Deserialize, Serialize};
use url::Url;

use crate::types::StateChange;

pub const EVENT_STATE_CHANGED: &str = "state_changed";
pub const WEBSOCKET_PATH: &str = "/api/websocket";
pub const STATES_PATH: &str = "/api/states/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Auth { access_token: String },
    SubscribeEvents { id: u64, event_type: String },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    AuthRequired {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthOk {
        #[serde(default)]
        ha_version: Option<String>,
    },
    AuthInvalid {
        #[serde(default)]
        message: Option<String>,
    },
    Result {
        id: u64,
        success: bool,
        #[serde(default)]
        error: Option<ResultError>,
    },
    Event {
        #[serde(default)]
        id: u64,
        event: EventPayload,
    },
    #[serde(other)]
    Other,
}

impl ServerMessage {
    pub fn parse(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::AuthRequired { .. } => "auth_required",
            Self::AuthOk { .. } => "auth_ok",
            Self::AuthInvalid { .. } => "auth_invalid",
            Self::Result { .. } => "result",
            Self::Event { .. } => "event",
            Self::Other => "other",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ResultError {
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EventPayload {
    pub event_type: String,
    #[serde(default)]
    pub data: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct StateObject {
    pub state: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
struct StateChangedData {
    entity_id: String,
    #[serde(default)]
    old_state: Option<StateObject>,
    #[serde(default)]
    new_state: Option<StateObject>,
}

impl EventPayload {
    pub fn state_change(&self) -> Option<StateChange> {
        if self.event_type != EVENT_STATE_CHANGED {
            return None;
        }
        let data = StateChangedData::deserialize(&self.data).ok()?;
        let new_state = data.new_state?;
        Some(StateChange {
            entity_id: data.entity_id,
            old_state: data.old_state.map(|old| old.state),
            new_state: new_state.state,
        })
    }
}

pub fn websocket_url(base: &Url) -> Option<Url> {
    let mut url = base.clone();
    let scheme = if base.scheme() == "https" { "wss" } else { "ws" };
    url.set_scheme(scheme).ok()?;
    url.set_path(&format!("{}{WEBSOCKET_PATH}", base_path(base)));
    url.set_query(None);
    url.set_fragment(None);
    Some(url)
}

pub fn state_url(base: &Url, entity_id: &str) -> Url {
    let mut url = base.clone();
    url.set_path(&format!("{}{STATES_PATH}{entity_id}", base_path(base)));
    url.set_query(None);
    url.set_fragment(None);
    url
}

fn base_path(base: &Url) -> &str {
    base.path().trim_end_matches('/')
}
