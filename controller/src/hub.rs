use std::{io::ErrorKind, time::Duration};

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use thiserror::Error;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    tungstenite::{self, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, info, trace};
use url::Url;

use epaper_dnd_common::{
    protocol::{self, StateObject},
    ClientMessage, HubConfig, LossReason, ServerMessage, StateChange,
};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const HTTP_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum HubError {
    #[error("connection refused: {0}")]
    ConnectionRefused(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("authentication failed: {0}")]
    Authentication(String),
    #[error("subscription rejected: {0}")]
    Subscription(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("connection closed by hub")]
    Closed,
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("hub returned HTTP {0}")]
    Status(u16),
}

impl HubError {
    pub fn loss_reason(&self) -> LossReason {
        match self {
            Self::ConnectionRefused(_) => LossReason::Refused,
            Self::Http(err) if err.is_connect() => LossReason::Refused,
            Self::Authentication(_) => LossReason::AuthRejected,
            Self::Transport(_)
            | Self::Subscription(_)
            | Self::Protocol(_)
            | Self::Closed
            | Self::Http(_)
            | Self::Status(_) => LossReason::Dropped,
        }
    }
}

#[async_trait]
pub trait HubConnector: Send + Sync {
    type Session: HubSession;

    async fn connect(&self) -> Result<Self::Session, HubError>;

    async fn fetch_state(&self, entity_id: &str) -> Result<String, HubError>;
}

#[async_trait]
pub trait HubSession: Send {
    async fn authenticate(&mut self) -> Result<(), HubError>;

    async fn subscribe(&mut self, event_type: &str) -> Result<(), HubError>;

    /// Next `state_changed` notification. `Ok(None)` once the stream ends.
    async fn next_event(&mut self) -> Result<Option<StateChange>, HubError>;
}

pub struct HomeAssistantHub {
    base_url: Url,
    ws_url: Url,
    token: String,
    http: reqwest::Client,
}

impl HomeAssistantHub {
    pub fn new(config: &HubConfig) -> Result<Self, HubError> {
        let ws_url = protocol::websocket_url(&config.base_url).ok_or_else(|| {
            HubError::Protocol(format!(
                "cannot derive websocket address from {}",
                config.base_url
            ))
        })?;
        let http = reqwest::Client::builder().timeout(HTTP_TIMEOUT).build()?;

        Ok(Self {
            base_url: config.base_url.clone(),
            ws_url,
            token: config.token.clone(),
            http,
        })
    }

    pub fn ws_url(&self) -> &Url {
        &self.ws_url
    }
}

#[async_trait]
impl HubConnector for HomeAssistantHub {
    type Session = HomeAssistantSession;

    async fn connect(&self) -> Result<Self::Session, HubError> {
        info!("connecting to {}", self.ws_url());

        let connecting = tokio_tungstenite::connect_async(self.ws_url.as_str());
        let (stream, _response) = tokio::time::timeout(CONNECT_TIMEOUT, connecting)
            .await
            .map_err(|_| HubError::Transport("timed out opening websocket".to_string()))?
            .map_err(map_ws_error)?;

        Ok(HomeAssistantSession {
            stream,
            token: self.token.clone(),
            next_id: 1,
        })
    }

    async fn fetch_state(&self, entity_id: &str) -> Result<String, HubError> {
        let url = protocol::state_url(&self.base_url, entity_id);
        debug!("fetching {url}");

        let response = self
            .http
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(HubError::Status(status.as_u16()));
        }

        let body: StateObject = response.json().await?;
        Ok(body.state)
    }
}

pub struct HomeAssistantSession {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    token: String,
    next_id: u64,
}

impl HomeAssistantSession {
    async fn send(&mut self, message: &ClientMessage) -> Result<(), HubError> {
        let payload =
            serde_json::to_string(message).map_err(|err| HubError::Protocol(err.to_string()))?;
        self.stream
            .send(Message::text(payload))
            .await
            .map_err(map_ws_error)
    }

    async fn recv(&mut self) -> Result<Option<ServerMessage>, HubError> {
        while let Some(frame) = self.stream.next().await {
            match frame.map_err(map_ws_error)? {
                Message::Text(text) => {
                    let message = ServerMessage::parse(&text).map_err(|err| {
                        HubError::Protocol(format!("malformed message from hub: {err}"))
                    })?;
                    trace!("hub message: {}", message.kind());
                    return Ok(Some(message));
                }
                Message::Close(frame) => {
                    match frame {
                        Some(cf) => {
                            info!("hub closed websocket: {} {}", cf.code, cf.reason);
                        }
                        None => info!("hub closed websocket"),
                    }
                    return Ok(None);
                }
                // tungstenite answers pings itself
                _ => {}
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl HubSession for HomeAssistantSession {
    async fn authenticate(&mut self) -> Result<(), HubError> {
        match self.recv().await? {
            Some(ServerMessage::AuthRequired { ha_version }) => {
                debug!(
                    "hub {} requested authentication",
                    ha_version.as_deref().unwrap_or("(unknown version)")
                );
            }
            Some(other) => {
                return Err(HubError::Protocol(format!(
                    "expected auth_required, got {}",
                    other.kind()
                )))
            }
            None => return Err(HubError::Closed),
        }

        let auth = ClientMessage::Auth {
            access_token: self.token.clone(),
        };
        self.send(&auth).await?;

        match self.recv().await? {
            Some(ServerMessage::AuthOk { ha_version }) => {
                info!(
                    "authenticated with hub {}",
                    ha_version.as_deref().unwrap_or("(unknown version)")
                );
                Ok(())
            }
            Some(ServerMessage::AuthInvalid { message }) => Err(HubError::Authentication(
                message.unwrap_or_else(|| "credentials rejected".to_string()),
            )),
            Some(other) => Err(HubError::Protocol(format!(
                "expected auth_ok, got {}",
                other.kind()
            ))),
            None => Err(HubError::Closed),
        }
    }

    async fn subscribe(&mut self, event_type: &str) -> Result<(), HubError> {
        let id = self.next_id;
        self.next_id += 1;

        self.send(&ClientMessage::SubscribeEvents {
            id,
            event_type: event_type.to_string(),
        })
        .await?;

        loop {
            match self.recv().await? {
                Some(ServerMessage::Result {
                    id: result_id,
                    success,
                    error,
                }) if result_id == id => {
                    if success {
                        info!("subscribed to {event_type} events");
                        return Ok(());
                    }
                    let reason = error
                        .map(|err| format!("{}: {}", err.code, err.message))
                        .unwrap_or_else(|| "no reason given".to_string());
                    return Err(HubError::Subscription(reason));
                }
                Some(other) => trace!("ignoring {} while subscribing", other.kind()),
                None => return Err(HubError::Closed),
            }
        }
    }

    async fn next_event(&mut self) -> Result<Option<StateChange>, HubError> {
        loop {
            match self.recv().await? {
                Some(ServerMessage::Event { event, .. }) => {
                    if let Some(change) = event.state_change() {
                        return Ok(Some(change));
                    }
                }
                Some(_) => {}
                None => return Ok(None),
            }
        }
    }
}

fn map_ws_error(err: tungstenite::Error) -> HubError {
    match err {
        tungstenite::Error::Io(ref io) if io.kind() == ErrorKind::ConnectionRefused => {
            HubError::ConnectionRefused(err.to_string())
        }
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => {
            HubError::Closed
        }
        other => HubError::Transport(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use epaper_dnd_common::protocol::EVENT_STATE_CHANGED;
    use pretty_assertions::assert_eq;
    use serde_json::{json, Value};
    use tokio::net::TcpListener;
    use wiremock::{
        matchers::{header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn hub_for(base: &str, token: &str) -> HomeAssistantHub {
        HomeAssistantHub::new(&HubConfig {
            base_url: Url::parse(base).unwrap(),
            token: token.to_string(),
        })
        .unwrap()
    }

    async fn read_json(ws: &mut WebSocketStream<TcpStream>) -> Value {
        let message = ws.next().await.unwrap().unwrap();
        serde_json::from_str(message.to_text().unwrap()).unwrap()
    }

    async fn send_json(ws: &mut WebSocketStream<TcpStream>, value: Value) {
        ws.send(Message::text(value.to_string())).await.unwrap();
    }

    #[tokio::test]
    async fn fetch_state_reads_rest_api() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/states/input_boolean.dnd_status"))
            .and(header("authorization", "Bearer token-123"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "entity_id": "input_boolean.dnd_status",
                "state": "on",
                "attributes": {}
            })))
            .mount(&server)
            .await;

        let hub = hub_for(&server.uri(), "token-123");
        let state = hub.fetch_state("input_boolean.dnd_status").await.unwrap();
        assert_eq!(state, "on");
    }

    #[tokio::test]
    async fn fetch_state_reports_http_status() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;

        let hub = hub_for(&server.uri(), "bad");
        let err = hub.fetch_state("input_boolean.dnd_status").await.unwrap_err();
        assert!(matches!(err, HubError::Status(401)));
        assert_eq!(err.loss_reason(), LossReason::Dropped);
    }

    #[tokio::test]
    async fn refused_connection_is_classified() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let hub = hub_for(&format!("http://{addr}"), "token");
        let Err(err) = hub.connect().await else {
            panic!("connect should fail");
        };
        assert_eq!(err.loss_reason(), LossReason::Refused);
    }

    #[tokio::test]
    async fn session_handshake_subscribe_and_events() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();

            send_json(&mut ws, json!({ "type": "auth_required", "ha_version": "2024.6.0" })).await;
            let auth = read_json(&mut ws).await;
            assert_eq!(auth, json!({ "type": "auth", "access_token": "token-123" }));
            send_json(&mut ws, json!({ "type": "auth_ok", "ha_version": "2024.6.0" })).await;

            let subscribe = read_json(&mut ws).await;
            assert_eq!(subscribe["type"], "subscribe_events");
            assert_eq!(subscribe["event_type"], "state_changed");
            let id = subscribe["id"].clone();
            send_json(
                &mut ws,
                json!({ "id": id, "type": "result", "success": true, "result": null }),
            )
            .await;

            send_json(
                &mut ws,
                json!({
                    "id": id,
                    "type": "event",
                    "event": {
                        "event_type": "state_changed",
                        "data": {
                            "entity_id": "sensor.power",
                            "old_state": { "state": "10" },
                            "new_state": { "state": "12" }
                        }
                    }
                }),
            )
            .await;
            send_json(
                &mut ws,
                json!({
                    "id": id,
                    "type": "event",
                    "event": {
                        "event_type": "state_changed",
                        "data": {
                            "entity_id": "input_boolean.dnd_status",
                            "old_state": { "state": "off" },
                            "new_state": { "state": "on" }
                        }
                    }
                }),
            )
            .await;
            ws.close(None).await.unwrap();
        });

        let hub = hub_for(&format!("http://{addr}"), "token-123");
        assert_eq!(
            hub.ws_url().as_str(),
            format!("ws://{addr}/api/websocket").as_str()
        );

        let mut session = hub.connect().await.unwrap();
        session.authenticate().await.unwrap();
        session.subscribe(EVENT_STATE_CHANGED).await.unwrap();

        let first = session.next_event().await.unwrap().unwrap();
        assert_eq!(first.entity_id, "sensor.power");

        let second = session.next_event().await.unwrap().unwrap();
        assert_eq!(
            second,
            StateChange {
                entity_id: "input_boolean.dnd_status".to_string(),
                old_state: Some("off".to_string()),
                new_state: "on".to_string(),
            }
        );

        assert!(session.next_event().await.unwrap().is_none());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn rejected_token_is_authentication_error() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            send_json(&mut ws, json!({ "type": "auth_required" })).await;
            let _auth = read_json(&mut ws).await;
            send_json(&mut ws, json!({ "type": "auth_invalid", "message": "Invalid access token" }))
                .await;
        });

        let hub = hub_for(&format!("http://{addr}"), "expired");
        let mut session = hub.connect().await.unwrap();
        let err = session.authenticate().await.unwrap_err();

        assert!(matches!(
            err,
            HubError::Authentication(ref message) if message == "Invalid access token"
        ));
        assert_eq!(err.loss_reason(), LossReason::AuthRejected);
        server.await.unwrap();
    }

    #[tokio::test]
    async fn failed_subscription_is_reported() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            send_json(&mut ws, json!({ "type": "auth_required" })).await;
            let _auth = read_json(&mut ws).await;
            send_json(&mut ws, json!({ "type": "auth_ok" })).await;
            let subscribe = read_json(&mut ws).await;
            send_json(
                &mut ws,
                json!({
                    "id": subscribe["id"],
                    "type": "result",
                    "success": false,
                    "error": { "code": "unauthorized", "message": "Unauthorized" }
                }),
            )
            .await;
        });

        let hub = hub_for(&format!("http://{addr}"), "token");
        let mut session = hub.connect().await.unwrap();
        session.authenticate().await.unwrap();
        let err = session.subscribe(EVENT_STATE_CHANGED).await.unwrap_err();

        assert!(matches!(err, HubError::Subscription(_)));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn malformed_frame_drops_session() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (tcp, _) = listener.accept().await.unwrap();
            let mut ws = tokio_tungstenite::accept_async(tcp).await.unwrap();
            send_json(&mut ws, json!({ "type": "auth_required" })).await;
            let _auth = read_json(&mut ws).await;
            send_json(&mut ws, json!({ "type": "auth_ok" })).await;
            let subscribe = read_json(&mut ws).await;
            send_json(
                &mut ws,
                json!({ "id": subscribe["id"], "type": "result", "success": true }),
            )
            .await;
            ws.send(Message::text("<html>502 Bad Gateway</html>"))
                .await
                .unwrap();
        });

        let hub = hub_for(&format!("http://{addr}"), "token");
        let mut session = hub.connect().await.unwrap();
        session.authenticate().await.unwrap();
        session.subscribe(EVENT_STATE_CHANGED).await.unwrap();

        let err = session.next_event().await.unwrap_err();
        assert!(matches!(err, HubError::Protocol(_)));
        assert_eq!(err.loss_reason(), LossReason::Dropped);
        server.await.unwrap();
    }
}
