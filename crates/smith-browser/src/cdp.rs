//! Minimal Chrome DevTools Protocol client.
//!
//! JSON-RPC style command/response correlation over a WebSocket: commands
//! carry auto-incrementing ids, a background reader task routes responses
//! back through oneshot channels and discards events we do not subscribe
//! to.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use crate::error::BrowserError;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;
type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Value>>>>;

/// Default per-command timeout.
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// CDP WebSocket client bound to one page target.
pub struct CdpClient {
    next_id: AtomicU64,
    pending: PendingMap,
    writer: Mutex<WsSink>,
    reader_handle: tokio::task::JoinHandle<()>,
}

impl CdpClient {
    /// Connect to a DevTools page endpoint
    /// (`ws://127.0.0.1:{port}/devtools/page/{target}`).
    pub async fn connect(ws_url: &str) -> Result<Self, BrowserError> {
        let (stream, _) = tokio_tungstenite::connect_async(ws_url).await.map_err(|e| {
            BrowserError::ConnectionFailed {
                url: ws_url.to_string(),
                reason: e.to_string(),
            }
        })?;
        let (writer, reader) = stream.split();

        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));
        let reader_handle = tokio::spawn(read_loop(reader, Arc::clone(&pending)));

        tracing::debug!(url = ws_url, "CDP connection established");
        Ok(Self {
            next_id: AtomicU64::new(1),
            pending,
            writer: Mutex::new(writer),
            reader_handle,
        })
    }

    /// Send a command and wait for its result.
    pub async fn send_command(&self, method: &str, params: Value) -> Result<Value, BrowserError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let frame = serde_json::json!({ "id": id, "method": method, "params": params });

        // Register before sending so the response cannot race past us.
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        {
            let mut writer = self.writer.lock().await;
            writer
                .send(Message::Text(frame.to_string().into()))
                .await
                .map_err(|e| BrowserError::Protocol(format!("send failed: {e}")))?;
        }

        let response = tokio::time::timeout(COMMAND_TIMEOUT, rx)
            .await
            .map_err(|_| BrowserError::Timeout {
                method: method.to_string(),
            })?
            .map_err(|_| BrowserError::Protocol("response channel closed".into()))?;

        if let Some(error) = response.get("error") {
            return Err(BrowserError::Cdp {
                code: error.get("code").and_then(|v| v.as_i64()).unwrap_or(0),
                message: error
                    .get("message")
                    .and_then(|v| v.as_str())
                    .unwrap_or("unknown")
                    .to_string(),
            });
        }
        Ok(response.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Enable a CDP domain (many require an explicit enable call).
    pub async fn enable_domain(&self, domain: &str) -> Result<(), BrowserError> {
        self.send_command(&format!("{domain}.enable"), serde_json::json!({}))
            .await?;
        Ok(())
    }
}

impl Drop for CdpClient {
    fn drop(&mut self) {
        self.reader_handle.abort();
    }
}

/// Route responses to their waiting callers; drop events.
async fn read_loop(mut reader: WsSource, pending: PendingMap) {
    while let Some(message) = reader.next().await {
        let text = match message {
            Ok(Message::Text(t)) => t.to_string(),
            Ok(Message::Close(_)) | Err(_) => break,
            _ => continue,
        };
        let value: Value = match serde_json::from_str(&text) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "unparseable CDP frame");
                continue;
            }
        };
        if let Some(id) = value.get("id").and_then(|v| v.as_u64()) {
            if let Some(tx) = pending.lock().await.remove(&id) {
                let _ = tx.send(value);
            }
        }
        // Frames with a method and no id are events; nothing subscribes.
    }
    tracing::debug!("CDP reader loop ended");
}
