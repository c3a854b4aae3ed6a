use crate::config::ReconnectConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LossReason {
    Refused,
    AuthRejected,
    Dropped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionPhase {
    Disconnected,
    Connecting,
    Authenticated,
    Subscribed,
    Listening,
    ConnectionLost(LossReason),
    Stopped,
}

impl ConnectionPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "DISCONNECTED",
            Self::Connecting => "CONNECTING",
            Self::Authenticated => "AUTHENTICATED",
            Self::Subscribed => "SUBSCRIBED",
            Self::Listening => "LISTENING",
            Self::ConnectionLost(_) => "CONNECTION_LOST",
            Self::Stopped => "STOPPED",
        }
    }

    pub fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Stopped, _) => false,
            (_, Self::Stopped) => true,
            (Self::Disconnected, Self::Connecting)
            | (Self::Connecting, Self::Authenticated)
            | (Self::Authenticated, Self::Subscribed)
            | (Self::Subscribed, Self::Listening)
            | (Self::ConnectionLost(_), Self::Connecting) => true,
            (
                Self::Connecting | Self::Authenticated | Self::Subscribed | Self::Listening,
                Self::ConnectionLost(_),
            ) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    config: ReconnectConfig,
}

impl ReconnectPolicy {
    pub fn new(mut config: ReconnectConfig) -> Self {
        config.sanitize();
        Self { config }
    }

    pub fn delay_ms(&self, reason: LossReason) -> u64 {
        match reason {
            LossReason::Refused => self.config.refused_delay_ms,
            LossReason::AuthRejected | LossReason::Dropped => self.config.retry_delay_ms,
        }
    }
}
