//! Chrome DevTools Protocol client over a single WebSocket.
//!
//! One reader task dispatches command responses (by id) and events (by
//! method name); one writer task owns the sink.

use futures::{SinkExt, StreamExt};
use outreach_core::{Error, Result};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, warn};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

type Pending = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;
type Listeners = Arc<Mutex<HashMap<String, Vec<mpsc::Sender<Value>>>>>;

pub struct CdpClient {
    ws_tx: mpsc::Sender<String>,
    pending: Pending,
    next_id: AtomicU64,
    event_listeners: Listeners,
    closed: Arc<AtomicBool>,
    command_timeout: Duration,
    reader_handle: JoinHandle<()>,
    writer_handle: JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a target's (or the browser's) debugger WebSocket.
    pub async fn connect(ws_url: &str) -> Result<Self> {
        let (ws_stream, _) = connect_async(ws_url).await.map_err(|e| {
            Error::Browser(format!("Failed to connect to CDP endpoint {}: {}", ws_url, e))
        })?;
        let (mut ws_sink, mut ws_read) = ws_stream.split();

        let (ws_tx, mut ws_rx) = mpsc::channel::<String>(256);
        let pending: Pending = Arc::new(Mutex::new(HashMap::new()));
        let event_listeners: Listeners = Arc::new(Mutex::new(HashMap::new()));
        let closed = Arc::new(AtomicBool::new(false));

        let writer_handle = tokio::spawn(async move {
            while let Some(msg) = ws_rx.recv().await {
                if let Err(e) = ws_sink.send(Message::Text(msg)).await {
                    error!("CDP WebSocket write error: {}", e);
                    break;
                }
            }
        });

        let reader_pending = pending.clone();
        let reader_listeners = event_listeners.clone();
        let reader_closed = closed.clone();
        let reader_handle = tokio::spawn(async move {
            while let Some(msg) = ws_read.next().await {
                match msg {
                    Ok(Message::Text(text)) => {
                        let Ok(val) = serde_json::from_str::<Value>(&text) else {
                            continue;
                        };
                        if let Some(id) = val.get("id").and_then(|v| v.as_u64()) {
                            if let Some(tx) = reader_pending.lock().await.remove(&id) {
                                let _ = tx.send(val);
                            }
                        } else if let Some(method) = val.get("method").and_then(|v| v.as_str()) {
                            let params = val.get("params").cloned().unwrap_or(Value::Null);
                            let mut listeners = reader_listeners.lock().await;
                            if let Some(senders) = listeners.get_mut(method) {
                                senders.retain(|tx| !tx.is_closed());
                                for tx in senders.iter() {
                                    let _ = tx.try_send(params.clone());
                                }
                            }
                        }
                    }
                    Ok(Message::Close(_)) => {
                        debug!("CDP WebSocket closed by peer");
                        break;
                    }
                    Err(e) => {
                        warn!("CDP WebSocket read error: {}", e);
                        break;
                    }
                    _ => {}
                }
            }
            reader_closed.store(true, Ordering::SeqCst);
            // Fail in-flight commands and end every subscription.
            reader_pending.lock().await.clear();
            reader_listeners.lock().await.clear();
        });

        Ok(Self {
            ws_tx,
            pending,
            next_id: AtomicU64::new(1),
            event_listeners,
            closed,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            reader_handle,
            writer_handle,
        })
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    /// Whether the underlying connection has gone away.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send a command and wait for its result.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value> {
        if self.is_closed() {
            return Err(Error::Browser(format!(
                "CDP connection closed, cannot send '{}'",
                method
            )));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let msg = json!({
            "id": id,
            "method": method,
            "params": params,
        });

        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        self.ws_tx
            .send(msg.to_string())
            .await
            .map_err(|e| Error::Browser(format!("Failed to send CDP command: {}", e)))?;

        match tokio::time::timeout(self.command_timeout, rx).await {
            Ok(Ok(response)) => match response.get("error") {
                Some(error) => Err(Error::Browser(format!("CDP error in '{}': {}", method, error))),
                None => Ok(response.get("result").cloned().unwrap_or(Value::Null)),
            },
            Ok(Err(_)) => Err(Error::Browser(format!(
                "CDP connection closed while waiting for '{}'",
                method
            ))),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(Error::Timeout(format!(
                    "CDP command '{}' timed out after {}s",
                    method,
                    self.command_timeout.as_secs()
                )))
            }
        }
    }

    /// Subscribe to an event. The receiver yields each event's `params` and
    /// ends when the connection closes.
    pub async fn subscribe_event(&self, method: &str) -> mpsc::Receiver<Value> {
        let (tx, rx) = mpsc::channel(64);
        self.event_listeners
            .lock()
            .await
            .entry(method.to_string())
            .or_default()
            .push(tx);
        rx
    }

    pub async fn enable_domain(&self, domain: &str) -> Result<()> {
        self.send_command(&format!("{}.enable", domain), json!({}))
            .await?;
        Ok(())
    }

    /// Start a navigation. Load completion arrives as `Page.loadEventFired`.
    pub async fn navigate(&self, url: &str) -> Result<Value> {
        let result = self
            .send_command("Page.navigate", json!({ "url": url }))
            .await?;
        if let Some(error_text) = result.get("errorText").and_then(|v| v.as_str()) {
            return Err(Error::Browser(format!(
                "Navigation to {} failed: {}",
                url, error_text
            )));
        }
        Ok(result)
    }

    /// Evaluate an expression and return its value. Page exceptions are errors.
    pub async fn evaluate_js(&self, expression: &str) -> Result<Value> {
        let result = self
            .send_command(
                "Runtime.evaluate",
                json!({
                    "expression": expression,
                    "returnByValue": true,
                    "awaitPromise": true,
                }),
            )
            .await?;
        if let Some(details) = result.get("exceptionDetails") {
            let text = details
                .pointer("/exception/description")
                .or_else(|| details.get("text"))
                .and_then(|v| v.as_str())
                .unwrap_or("uncaught exception");
            return Err(Error::Browser(format!("Page script failed: {}", text)));
        }
        Ok(result
            .pointer("/result/value")
            .cloned()
            .unwrap_or(Value::Null))
    }

    /// Expose `window.<name>(payload)` to the page; calls arrive as
    /// `Runtime.bindingCalled` events.
    pub async fn add_binding(&self, name: &str) -> Result<()> {
        self.send_command("Runtime.addBinding", json!({ "name": name }))
            .await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
        self.writer_handle.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;
    use tokio_tungstenite::accept_async;

    /// Minimal DevTools peer: answers `Runtime.evaluate` with a fixed value,
    /// fails `Page.navigate`, and emits one event after `Page.enable`.
    async fn fake_devtools() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut ws = accept_async(stream).await.unwrap();
            while let Some(Ok(Message::Text(text))) = ws.next().await {
                let req: Value = serde_json::from_str(&text).unwrap();
                let id = req["id"].clone();
                let reply = match req["method"].as_str().unwrap_or_default() {
                    "Runtime.evaluate" => json!({
                        "id": id,
                        "result": {"result": {"type": "string", "value": "complete"}}
                    }),
                    "Page.navigate" => json!({
                        "id": id,
                        "result": {"frameId": "F1", "errorText": "net::ERR_NAME_NOT_RESOLVED"}
                    }),
                    "Page.enable" => {
                        ws.send(Message::Text(json!({"id": id, "result": {}}).to_string()))
                            .await
                            .unwrap();
                        json!({"method": "Page.loadEventFired", "params": {"timestamp": 1.5}})
                    }
                    _ => json!({"id": id, "error": {"code": -32601, "message": "not found"}}),
                };
                ws.send(Message::Text(reply.to_string())).await.unwrap();
            }
        });
        format!("ws://{}", addr)
    }

    #[tokio::test]
    async fn test_commands_and_events() {
        let url = fake_devtools().await;
        let client = CdpClient::connect(&url).await.unwrap();

        assert_eq!(
            client.evaluate_js("document.readyState").await.unwrap(),
            json!("complete")
        );
        assert!(matches!(
            client.navigate("https://nowhere.invalid").await,
            Err(Error::Browser(_))
        ));
        assert!(client.send_command("Bogus.method", json!({})).await.is_err());

        let mut loads = client.subscribe_event("Page.loadEventFired").await;
        client.enable_domain("Page").await.unwrap();
        let params = loads.recv().await.unwrap();
        assert_eq!(params["timestamp"], json!(1.5));
        assert!(!client.is_closed());
    }
}
