//! Scripted gateway and client builders shared by unit and integration
//! tests.

use crate::client::Client;
use crate::config::BridgeConfig;
use crate::gateway::{Gateway, GatewayError, GatewayEvent, GatewayFactory};
use crate::store::memory::MemoryStore;
use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

/// A gateway whose pushes are driven by the test and whose request
/// responses are scripted per API name.
pub struct MockGateway {
    requests: Mutex<Vec<(String, Value)>>,
    notifies: Mutex<Vec<String>>,
    responses: Mutex<HashMap<String, Value>>,
    events_tx: mpsc::Sender<GatewayEvent>,
    events_rx: tokio::sync::Mutex<Option<mpsc::Receiver<GatewayEvent>>>,
    stopped: AtomicBool,
}

impl MockGateway {
    pub fn new() -> Arc<Self> {
        let (events_tx, events_rx) = mpsc::channel(100);
        Arc::new(Self {
            requests: Mutex::new(Vec::new()),
            notifies: Mutex::new(Vec::new()),
            responses: Mutex::new(HashMap::new()),
            events_tx,
            events_rx: tokio::sync::Mutex::new(Some(events_rx)),
            stopped: AtomicBool::new(false),
        })
    }

    /// Delivers a push event to the client under test.
    pub async fn push(&self, event: GatewayEvent) {
        self.events_tx
            .send(event)
            .await
            .expect("client stopped consuming gateway events");
    }

    /// Scripts the response for an API; unscripted APIs answer with a
    /// generic success object.
    pub fn stub(&self, api: &str, response: Value) {
        self.responses
            .lock()
            .unwrap()
            .insert(api.to_string(), response);
    }

    /// Every `request` submission seen so far, in order.
    pub fn requests(&self) -> Vec<(String, Value)> {
        self.requests.lock().unwrap().clone()
    }

    /// Submissions for one API name.
    pub fn requests_for(&self, api: &str) -> Vec<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == api)
            .map(|(_, data)| data.clone())
            .collect()
    }

    pub fn notifies(&self) -> Vec<String> {
        self.notifies.lock().unwrap().clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Gateway for MockGateway {
    async fn request(&self, api: &str, data: Value) -> Result<Value, GatewayError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(GatewayError::Closed);
        }
        self.requests
            .lock()
            .unwrap()
            .push((api.to_string(), data));
        let stubbed = self.responses.lock().unwrap().get(api).cloned();
        Ok(stubbed.unwrap_or_else(|| json!({ "status": "success" })))
    }

    async fn notify(&self, api: &str) -> Result<(), GatewayError> {
        if self.stopped.load(Ordering::SeqCst) {
            return Err(GatewayError::Closed);
        }
        self.notifies.lock().unwrap().push(api.to_string());
        Ok(())
    }

    async fn take_events(&self) -> Option<mpsc::Receiver<GatewayEvent>> {
        self.events_rx.lock().await.take()
    }

    async fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

/// Produces a fresh [`MockGateway`] per session and keeps every one it
/// handed out, so tests can reach the current connection.
#[derive(Default)]
pub struct MockGatewayFactory {
    connected: Mutex<Vec<Arc<MockGateway>>>,
}

impl MockGatewayFactory {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// The most recently connected gateway.
    pub fn latest(&self) -> Arc<MockGateway> {
        self.connected
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("no gateway connected yet")
    }

    pub fn connection_count(&self) -> usize {
        self.connected.lock().unwrap().len()
    }
}

#[async_trait]
impl GatewayFactory for MockGatewayFactory {
    async fn connect(&self) -> Result<Arc<dyn Gateway>, GatewayError> {
        let gateway = MockGateway::new();
        self.connected.lock().unwrap().push(gateway.clone());
        Ok(gateway as Arc<dyn Gateway>)
    }
}

static TEST_COUNTER: AtomicU64 = AtomicU64::new(0);

/// A client wired to a mock gateway factory and an in-memory entity store.
pub fn create_test_client() -> (Arc<Client>, Arc<MockGatewayFactory>) {
    let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    let store_dir = std::env::temp_dir().join(format!(
        "wechat-bridge-test-{}-{}",
        std::process::id(),
        n
    ));
    let config = BridgeConfig {
        endpoint: "mock".to_string(),
        token: "test-token".to_string(),
        store_dir: store_dir.to_string_lossy().into_owned(),
    };
    let factory = MockGatewayFactory::new();
    let client = Client::new(config, factory.clone(), Arc::new(MemoryStore::new()));
    (client, factory)
}

/// Standard login push payload for `wx-self`.
pub fn login_payload() -> String {
    json!({
        "account": "user-self",
        "account_alias": "wx-self",
        "name": "Self",
        "thumb": "https://example.com/self.png",
        "task_id": "task-1",
    })
    .to_string()
}

/// Connects the client and drives it through a login, waiting until the
/// cache is ready.
pub async fn connect_and_login(
    client: &Arc<Client>,
    factory: &Arc<MockGatewayFactory>,
) -> Arc<MockGateway> {
    client.connect().await.expect("connect failed");
    let gateway = factory.latest();
    gateway.push(GatewayEvent::Login(login_payload())).await;

    let mut state = client.state();
    state
        .wait_for(|s| *s == crate::client::BridgeState::LoggedIn)
        .await
        .expect("client never reached LoggedIn");
    gateway
}
