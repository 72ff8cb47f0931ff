//! WebSocket observer channel.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, warn};

use greenroom_config::Secret;

use crate::bus::EventBus;
use crate::observer::ObserverCommand;
use crate::BusError;

/// Observer listener configuration.
#[derive(Debug, Clone)]
pub struct ObserverServerConfig {
    pub host: String,
    pub port: u16,
    /// When set, connections must present the secret (Bearer header or
    /// `?token=`) before the WebSocket upgrade is accepted.
    pub shared_secret: Option<Secret>,
}

impl Default for ObserverServerConfig {
    fn default() -> Self {
        ObserverServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8765,
            shared_secret: None,
        }
    }
}

#[derive(Clone)]
struct ObserverState {
    bus: Arc<EventBus>,
    commands: mpsc::Sender<ObserverCommand>,
    shared_secret: Option<Secret>,
}

impl ObserverState {
    fn check_auth(&self, token: Option<&str>) -> bool {
        match &self.shared_secret {
            None => true,
            Some(expected) => token == Some(expected.expose()),
        }
    }
}

/// Start the observer listener. Runs until the process shuts down;
/// callers spawn it alongside the relay loop.
pub async fn serve_observers(
    bus: Arc<EventBus>,
    commands: mpsc::Sender<ObserverCommand>,
    config: ObserverServerConfig,
) -> Result<(), BusError> {
    if config.shared_secret.is_none() && !is_loopback_host(&config.host) {
        return Err(BusError::InsecureBind(config.host));
    }

    let state = ObserverState {
        bus,
        commands,
        shared_secret: config.shared_secret,
    };
    let app = Router::new()
        .route("/", get(observer_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|source| BusError::Bind {
            addr: addr.clone(),
            source,
        })?;
    info!("Observer channel listening on ws://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}

fn is_loopback_host(host: &str) -> bool {
    if host.eq_ignore_ascii_case("localhost") {
        return true;
    }
    host.parse::<std::net::IpAddr>()
        .map(|ip| ip.is_loopback())
        .unwrap_or(false)
}

async fn observer_handler(
    State(state): State<ObserverState>,
    Query(params): Query<HashMap<String, String>>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Response {
    let token = bearer_token(&headers).or_else(|| params.get("token").map(|s| s.as_str()));
    if !state.check_auth(token) {
        warn!("observer connection rejected: bad or missing secret");
        return StatusCode::UNAUTHORIZED.into_response();
    }
    ws.on_upgrade(move |socket| handle_observer(socket, state))
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
}

/// One observer session: replay the retained log, then stream live
/// events while accepting inbound commands.
async fn handle_observer(socket: WebSocket, state: ObserverState) {
    let (snapshot, mut live) = state.bus.subscribe();
    let (mut sink, mut stream) = socket.split();

    info!(replayed = snapshot.len(), "observer connected");
    for event in snapshot {
        if let Ok(text) = serde_json::to_string(&event) {
            if sink.send(Message::Text(text)).await.is_err() {
                return;
            }
        }
    }

    loop {
        tokio::select! {
            event = live.recv() => match event {
                Ok(event) => {
                    if let Ok(text) = serde_json::to_string(&event) {
                        if sink.send(Message::Text(text)).await.is_err() {
                            break;
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(missed)) => {
                    warn!(missed, "observer lagged; dropping session");
                    break;
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => {
                    if let Some(command) = ObserverCommand::parse(&text) {
                        if state.commands.send(command).await.is_err() {
                            break;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    debug!(error = %err, "observer socket error");
                    break;
                }
            },
        }
    }
    debug!("observer disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with_secret(secret: Option<&str>) -> ObserverState {
        let (commands, _rx) = mpsc::channel(8);
        ObserverState {
            bus: Arc::new(EventBus::new(16)),
            commands,
            shared_secret: secret.map(Secret::new),
        }
    }

    #[test]
    fn test_auth_open_without_secret() {
        let state = state_with_secret(None);
        assert!(state.check_auth(None));
        assert!(state.check_auth(Some("anything")));
    }

    #[test]
    fn test_auth_enforced_with_secret() {
        let state = state_with_secret(Some("hunter2"));
        assert!(!state.check_auth(None));
        assert!(!state.check_auth(Some("wrong")));
        assert!(state.check_auth(Some("hunter2")));
    }

    #[test]
    fn test_bearer_token_extraction() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Bearer hunter2".parse().unwrap());
        assert_eq!(bearer_token(&headers), Some("hunter2"));

        let mut headers = HeaderMap::new();
        headers.insert("authorization", "Basic xyz".parse().unwrap());
        assert_eq!(bearer_token(&headers), None);
    }

    #[test]
    fn test_loopback_detection() {
        assert!(is_loopback_host("127.0.0.1"));
        assert!(is_loopback_host("localhost"));
        assert!(!is_loopback_host("0.0.0.0"));
    }
}
