pub mod config;
pub mod lifecycle;
pub mod plane;
pub mod protocol;
pub mod refresh;
pub mod render;
pub mod types;

pub use config::{
    ConfigError, DisplayBackend, HubConfig, ReconnectConfig, RefreshConfig, RenderStyle,
    ServiceConfig, DISPLAY_HEIGHT, DISPLAY_WIDTH,
};
pub use lifecycle::{ConnectionPhase, LossReason, ReconnectPolicy};
pub use plane::{BitmapPlane, Frame};
pub use protocol::{ClientMessage, ServerMessage};
pub use refresh::{RefreshController, RefreshDecision, SkipReason};
pub use render::{Renderer, StatusRenderer};
pub use types::{EntityState, StateChange};
