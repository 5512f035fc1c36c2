use crate::gateway::{Gateway, GatewayError, GatewayEvent, GatewayFactory};
use crate::request::PendingReplies;
use async_trait::async_trait;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use log::{debug, warn};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const EVENT_BUFFER: usize = 100;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

/// Outbound control frame: an API submission, correlated by `id` when a
/// response is expected.
#[derive(Serialize)]
struct OutFrame<'a> {
    api: &'a str,
    token: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    data: &'a Value,
}

/// Inbound frame: either a correlated response (`id`) or an unsolicited
/// event (`event`).
#[derive(Deserialize)]
struct InFrame {
    #[serde(default)]
    event: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    data: Value,
    #[serde(default)]
    error: Option<String>,
}

/// Event payloads travel as opaque JSON text; some gateway builds nest them
/// as a string, some inline the object.
fn payload_text(data: Value) -> String {
    match data {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

/// WebSocket implementation of the gateway control channel.
pub struct WsGateway {
    token: String,
    sink: Mutex<WsSink>,
    responses: PendingReplies<Result<Value, String>>,
    events: Mutex<Option<mpsc::Receiver<GatewayEvent>>>,
    unique_id: String,
    id_counter: AtomicU64,
    closed: AtomicBool,
}

impl WsGateway {
    pub async fn connect(endpoint: &str, token: &str) -> Result<Arc<Self>, GatewayError> {
        let (stream, _) = connect_async(endpoint)
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let (sink, source) = stream.split();
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);

        let mut unique_id_bytes = [0u8; 2];
        rand::rng().fill_bytes(&mut unique_id_bytes);

        let gateway = Arc::new(Self {
            token: token.to_string(),
            sink: Mutex::new(sink),
            responses: PendingReplies::new(),
            events: Mutex::new(Some(events_rx)),
            unique_id: format!("{}.{}", unique_id_bytes[0], unique_id_bytes[1]),
            id_counter: AtomicU64::new(0),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(Self::read_loop(gateway.clone(), source, events_tx));
        Ok(gateway)
    }

    fn next_request_id(&self) -> String {
        let count = self.id_counter.fetch_add(1, Ordering::Relaxed);
        format!("{}-{}", self.unique_id, count)
    }

    async fn read_loop(self: Arc<Self>, mut source: WsSource, events_tx: mpsc::Sender<GatewayEvent>) {
        while let Some(frame) = source.next().await {
            let text = match frame {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(_) => continue,
                Err(e) => {
                    warn!(target: "Bridge/Transport", "websocket read failed: {e}");
                    break;
                }
            };
            let frame: InFrame = match serde_json::from_str(&text) {
                Ok(frame) => frame,
                Err(e) => {
                    warn!(target: "Bridge/Transport", "unparseable frame dropped: {e}");
                    continue;
                }
            };

            if let Some(id) = frame.id {
                let outcome = match frame.error {
                    Some(message) => Err(message),
                    None => Ok(frame.data),
                };
                if self.responses.resolve(&id, outcome).await == 0 {
                    debug!(target: "Bridge/Transport", "late response for {id} dropped");
                }
            } else if let Some(name) = frame.event {
                match GatewayEvent::from_wire(&name, payload_text(frame.data)) {
                    Some(event) => {
                        if events_tx.send(event).await.is_err() {
                            break;
                        }
                    }
                    None => {
                        warn!(target: "Bridge/Transport", "unknown gateway event '{name}' dropped")
                    }
                }
            }
        }
        if !self.closed.load(Ordering::SeqCst) {
            // Let the client's debouncer decide when to rebuild the session.
            let _ = events_tx
                .send(GatewayEvent::Reconnect("gateway stream closed".to_string()))
                .await;
        }
    }

    async fn send_frame(&self, frame: &OutFrame<'_>) -> Result<(), GatewayError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(GatewayError::Closed);
        }
        let text =
            serde_json::to_string(frame).map_err(|e| GatewayError::Transport(e.to_string()))?;
        self.sink
            .lock()
            .await
            .send(Message::text(text))
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Gateway for WsGateway {
    async fn request(&self, api: &str, data: Value) -> Result<Value, GatewayError> {
        let id = self.next_request_id();
        let mut rx = self.responses.register(&id).await;

        let frame = OutFrame {
            api,
            token: &self.token,
            id: Some(&id),
            data: &data,
        };
        if let Err(e) = self.send_frame(&frame).await {
            self.responses.discard(&id).await;
            return Err(e);
        }

        match tokio::time::timeout(REQUEST_TIMEOUT, &mut rx).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(message))) => Err(GatewayError::Rpc {
                api: api.to_string(),
                message,
            }),
            Ok(Err(_)) => Err(GatewayError::Closed),
            Err(_) => {
                self.responses.discard(&id).await;
                Err(GatewayError::Timeout)
            }
        }
    }

    async fn notify(&self, api: &str) -> Result<(), GatewayError> {
        let data = Value::Null;
        let frame = OutFrame {
            api,
            token: &self.token,
            id: None,
            data: &data,
        };
        self.send_frame(&frame).await
    }

    async fn take_events(&self) -> Option<mpsc::Receiver<GatewayEvent>> {
        self.events.lock().await.take()
    }

    async fn stop(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.responses.clear().await;
        let mut sink = self.sink.lock().await;
        if let Err(e) = sink.send(Message::Close(None)).await {
            debug!(target: "Bridge/Transport", "close frame not sent: {e}");
        }
    }
}

/// Builds a fresh WebSocket gateway per session.
pub struct WsGatewayFactory {
    endpoint: String,
    token: String,
}

impl WsGatewayFactory {
    pub fn new(endpoint: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }
}

#[async_trait]
impl GatewayFactory for WsGatewayFactory {
    async fn connect(&self) -> Result<Arc<dyn Gateway>, GatewayError> {
        let gateway = WsGateway::connect(&self.endpoint, &self.token).await?;
        Ok(gateway as Arc<dyn Gateway>)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_payloads_unwrap_nested_text() {
        assert_eq!(payload_text(Value::String("{\"a\":1}".into())), "{\"a\":1}");
        assert_eq!(
            payload_text(serde_json::json!({"a": 1})),
            "{\"a\":1}".to_string()
        );
    }
}
