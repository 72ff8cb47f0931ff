//! One connection to one backend process.

use std::collections::HashMap;
use std::process::Stdio;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use greenroom_config::ServiceConfig;
use greenroom_core::{
    JsonRpcRequest, JsonRpcResponse, RelayError, ToolDef, ToolListResult, PROTOCOL_VERSION,
};

/// Pending requests awaiting a response, keyed by request id. `None`
/// once the connection has closed; every connection owns its own table,
/// so one slow backend never blocks another.
type PendingMap = Arc<Mutex<Option<HashMap<u64, oneshot::Sender<JsonRpcResponse>>>>>;

/// A live backend connection: writes requests, and a reader task
/// completes them by id as responses arrive, in whatever order the
/// backend produces them.
pub struct BackendConnection {
    service: String,
    writer: tokio::sync::Mutex<Box<dyn AsyncWrite + Send + Unpin>>,
    pending: PendingMap,
    next_id: AtomicU64,
    child: Option<tokio::process::Child>,
}

impl BackendConnection {
    /// Spawn the configured backend process and connect over its stdio.
    pub fn spawn(
        service: &str,
        config: &ServiceConfig,
        state_path: Option<&std::path::Path>,
    ) -> Result<Self, RelayError> {
        let mut command = tokio::process::Command::new(&config.command);
        command
            .args(&config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit());
        for (key, value) in &config.env {
            command.env(key, value);
        }
        if let Some(path) = state_path {
            command.env("GREENROOM_STATE_PATH", path);
        }

        let mut child = command.spawn()?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| RelayError::Protocol(format!("no stdin pipe for '{}'", service)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| RelayError::Protocol(format!("no stdout pipe for '{}'", service)))?;

        info!(service, command = %config.command, "backend spawned");
        let mut conn = Self::from_transport(service, stdout, stdin);
        conn.child = Some(child);
        Ok(conn)
    }

    /// Build a connection over an arbitrary transport. Tests wire this
    /// to an in-process backend over `tokio::io::duplex`.
    pub fn from_transport<R, W>(service: &str, reader: R, writer: W) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let pending: PendingMap = Arc::new(Mutex::new(Some(HashMap::new())));
        spawn_reader(service.to_string(), reader, Arc::clone(&pending));
        BackendConnection {
            service: service.to_string(),
            writer: tokio::sync::Mutex::new(Box::new(writer)),
            pending,
            next_id: AtomicU64::new(1),
            child: None,
        }
    }

    pub fn service(&self) -> &str {
        &self.service
    }

    /// Send a request and await its response, bounded by `timeout`.
    pub async fn request(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
        timeout: Duration,
    ) -> Result<JsonRpcResponse, RelayError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut guard = self.pending.lock();
            match guard.as_mut() {
                Some(map) => {
                    map.insert(id, tx);
                }
                None => return Err(RelayError::ConnectionClosed(self.service.clone())),
            }
        }

        let request = JsonRpcRequest::new(id, method, params);
        if let Err(err) = self.write_line(&request).await {
            if let Some(map) = self.pending.lock().as_mut() {
                map.remove(&id);
            }
            return Err(err);
        }

        match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(RelayError::ConnectionClosed(self.service.clone())),
            Err(_) => {
                if let Some(map) = self.pending.lock().as_mut() {
                    map.remove(&id);
                }
                Err(RelayError::Timeout {
                    service: self.service.clone(),
                    method: method.to_string(),
                    seconds: timeout.as_secs(),
                })
            }
        }
    }

    /// Send a fire-and-forget notification.
    pub async fn notify(
        &self,
        method: &str,
        params: Option<serde_json::Value>,
    ) -> Result<(), RelayError> {
        self.write_line(&JsonRpcRequest::notification(method, params))
            .await
    }

    async fn write_line(&self, request: &JsonRpcRequest) -> Result<(), RelayError> {
        let line = serde_json::to_string(request)?;
        let mut writer = self.writer.lock().await;
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
        Ok(())
    }

    /// Run the connection handshake: `initialize`, the `initialized`
    /// notification, then fetch the public catalog.
    pub async fn handshake(&self, timeout: Duration) -> Result<Vec<ToolDef>, RelayError> {
        let params = serde_json::json!({
            "protocolVersion": PROTOCOL_VERSION,
            "capabilities": {},
            "clientInfo": {"name": "greenroom-relay", "version": env!("CARGO_PKG_VERSION")},
        });
        let response = self.request("initialize", Some(params), timeout).await?;
        if let Some(error) = response.error {
            return Err(RelayError::Backend {
                service: self.service.clone(),
                code: error.code,
                message: error.message,
            });
        }
        self.notify("notifications/initialized", None).await?;
        self.list_tools("tools/list", timeout).await
    }

    /// Fetch the hidden injection tools over the dedicated method.
    pub async fn injection_tools(&self, timeout: Duration) -> Result<Vec<ToolDef>, RelayError> {
        self.list_tools("internal/tools", timeout).await
    }

    async fn list_tools(&self, method: &str, timeout: Duration) -> Result<Vec<ToolDef>, RelayError> {
        let response = self.request(method, None, timeout).await?;
        if let Some(error) = response.error {
            return Err(RelayError::Backend {
                service: self.service.clone(),
                code: error.code,
                message: error.message,
            });
        }
        let result = response
            .result
            .ok_or_else(|| RelayError::Protocol(format!("empty {} result", method)))?;
        let list: ToolListResult = serde_json::from_value(result)?;
        Ok(list.tools)
    }

    /// True while the pending table is open (the reader task has not
    /// seen EOF).
    pub fn is_open(&self) -> bool {
        self.pending.lock().is_some()
    }
}

fn spawn_reader<R>(service: String, reader: R, pending: PendingMap)
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    let line = line.trim();
                    if line.is_empty() {
                        continue;
                    }
                    let response: JsonRpcResponse = match serde_json::from_str(line) {
                        Ok(response) => response,
                        Err(err) => {
                            warn!(service, error = %err, "dropping malformed backend line");
                            continue;
                        }
                    };
                    let Some(id) = response.id_u64() else {
                        debug!(service, "dropping response without numeric id");
                        continue;
                    };
                    let sender = pending.lock().as_mut().and_then(|map| map.remove(&id));
                    match sender {
                        Some(sender) => {
                            let _ = sender.send(response);
                        }
                        None => {
                            debug!(service, id, "response for unknown or timed-out request");
                        }
                    }
                }
                Ok(None) => break,
                Err(err) => {
                    warn!(service, error = %err, "backend read error");
                    break;
                }
            }
        }
        // EOF fails every pending request: dropping the senders wakes
        // their awaiters with ConnectionClosed.
        let dropped = pending.lock().take().map(|map| map.len()).unwrap_or(0);
        if dropped > 0 {
            warn!(service, dropped, "backend exited with requests pending");
        } else {
            info!(service, "backend connection closed");
        }
    });
}

impl Drop for BackendConnection {
    fn drop(&mut self) {
        if let Some(child) = self.child.as_mut() {
            let _ = child.start_kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{duplex, AsyncBufReadExt, BufReader};

    /// Backend half of a duplex pair that answers with canned or
    /// scripted responses.
    async fn scripted_backend(
        transport: tokio::io::DuplexStream,
        mut respond: impl FnMut(JsonRpcRequest) -> Option<Vec<String>> + Send + 'static,
    ) {
        let (read, mut write) = tokio::io::split(transport);
        let mut lines = BufReader::new(read).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            let request: JsonRpcRequest = serde_json::from_str(&line).unwrap();
            if let Some(replies) = respond(request) {
                for reply in replies {
                    write.write_all(reply.as_bytes()).await.unwrap();
                    write.write_all(b"\n").await.unwrap();
                }
            }
        }
    }

    fn success_line(id: u64, result: serde_json::Value) -> String {
        serde_json::to_string(&JsonRpcResponse::success(
            Some(serde_json::json!(id)),
            result,
        ))
        .unwrap()
    }

    #[tokio::test]
    async fn test_request_response_roundtrip() {
        let (relay_side, backend_side) = duplex(4096);
        tokio::spawn(scripted_backend(backend_side, |req| {
            let id = req.id.as_ref().and_then(|v| v.as_u64()).unwrap();
            Some(vec![success_line(id, serde_json::json!({"ok": true}))])
        }));

        let (read, write) = tokio::io::split(relay_side);
        let conn = BackendConnection::from_transport("payments", read, write);
        let response = conn
            .request("ping", None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_out_of_order_responses_correlate_by_id() {
        let (relay_side, backend_side) = duplex(4096);
        // Hold the first request's response until the second request
        // arrives, then answer both in reverse order.
        let held: Arc<Mutex<Option<u64>>> = Arc::new(Mutex::new(None));
        let held2 = Arc::clone(&held);
        tokio::spawn(scripted_backend(backend_side, move |req| {
            let id = req.id.as_ref().and_then(|v| v.as_u64()).unwrap();
            let mut held = held2.lock();
            match held.take() {
                None => {
                    *held = Some(id);
                    None
                }
                Some(first) => Some(vec![
                    success_line(id, serde_json::json!({"answer": "second"})),
                    success_line(first, serde_json::json!({"answer": "first"})),
                ]),
            }
        }));

        let (read, write) = tokio::io::split(relay_side);
        let conn = Arc::new(BackendConnection::from_transport("payments", read, write));

        let c1 = Arc::clone(&conn);
        let first = tokio::spawn(async move {
            c1.request("tools/call", Some(serde_json::json!({"name": "a"})), Duration::from_secs(2))
                .await
        });
        // Let the first request land before sending the second.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = conn
            .request("tools/call", Some(serde_json::json!({"name": "b"})), Duration::from_secs(2))
            .await
            .unwrap();
        let first = first.await.unwrap().unwrap();

        assert_eq!(first.result.unwrap()["answer"], "first");
        assert_eq!(second.result.unwrap()["answer"], "second");
    }

    #[tokio::test]
    async fn test_timeout_names_service_and_method() {
        let (relay_side, backend_side) = duplex(4096);
        tokio::spawn(scripted_backend(backend_side, |_| None));

        let (read, write) = tokio::io::split(relay_side);
        let conn = BackendConnection::from_transport("payments", read, write);
        let err = conn
            .request("tools/call", None, Duration::from_millis(50))
            .await
            .unwrap_err();
        match err {
            RelayError::Timeout { service, method, .. } => {
                assert_eq!(service, "payments");
                assert_eq!(method, "tools/call");
            }
            other => panic!("expected timeout, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_eof_fails_pending_requests() {
        let (relay_side, backend_side) = duplex(4096);
        let (read, write) = tokio::io::split(relay_side);
        let conn = Arc::new(BackendConnection::from_transport("payments", read, write));

        let c1 = Arc::clone(&conn);
        let pending =
            tokio::spawn(async move { c1.request("ping", None, Duration::from_secs(5)).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(backend_side);

        let err = pending.await.unwrap().unwrap_err();
        assert!(matches!(err, RelayError::ConnectionClosed(service) if service == "payments"));
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!conn.is_open());
    }

    #[tokio::test]
    async fn test_malformed_lines_dropped() {
        let (relay_side, backend_side) = duplex(4096);
        tokio::spawn(scripted_backend(backend_side, |req| {
            let id = req.id.as_ref().and_then(|v| v.as_u64()).unwrap();
            Some(vec![
                "this is not json".to_string(),
                success_line(id, serde_json::json!({"ok": true})),
            ])
        }));

        let (read, write) = tokio::io::split(relay_side);
        let conn = BackendConnection::from_transport("payments", read, write);
        let response = conn
            .request("ping", None, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(response.result.unwrap()["ok"], true);
    }

    #[tokio::test]
    async fn test_ids_are_per_connection() {
        let (relay_a, backend_a) = duplex(4096);
        let (relay_b, backend_b) = duplex(4096);
        let seen_a: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_b: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));

        for (backend_side, seen) in [(backend_a, Arc::clone(&seen_a)), (backend_b, Arc::clone(&seen_b))] {
            tokio::spawn(scripted_backend(backend_side, move |req| {
                let id = req.id.as_ref().and_then(|v| v.as_u64()).unwrap();
                seen.lock().push(id);
                Some(vec![success_line(id, serde_json::json!({}))])
            }));
        }

        let (read_a, write_a) = tokio::io::split(relay_a);
        let (read_b, write_b) = tokio::io::split(relay_b);
        let conn_a = BackendConnection::from_transport("payments", read_a, write_a);
        let conn_b = BackendConnection::from_transport("chat", read_b, write_b);

        for _ in 0..3 {
            conn_a.request("ping", None, Duration::from_secs(1)).await.unwrap();
        }
        conn_b.request("ping", None, Duration::from_secs(1)).await.unwrap();

        // Each connection starts its own counter; ids never interleave
        // across backends.
        assert_eq!(*seen_a.lock(), vec![1, 2, 3]);
        assert_eq!(*seen_b.lock(), vec![1]);
    }
}
