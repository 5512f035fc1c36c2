use log::debug;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

/// Collapses bursts of reconnect notifications into a single
/// reinitialization.
///
/// The upstream transport can emit many reconnect events in quick
/// succession during instability; restarting the session for each one would
/// thrash the login flow. The first signal arms a timer; further signals
/// within the window only replace the recorded reason. When the window
/// elapses, one fire carrying the latest reason is delivered to the
/// receiver returned by [`ReconnectDebouncer::new`].
pub struct ReconnectDebouncer {
    window: Duration,
    pending: Arc<Mutex<Option<String>>>,
    fire_tx: mpsc::UnboundedSender<String>,
}

impl ReconnectDebouncer {
    pub fn new(window: Duration) -> (Self, mpsc::UnboundedReceiver<String>) {
        let (fire_tx, fire_rx) = mpsc::unbounded_channel();
        (
            Self {
                window,
                pending: Arc::new(Mutex::new(None)),
                fire_tx,
            },
            fire_rx,
        )
    }

    /// Schedules a reinitialization, or folds into the one already pending.
    pub fn signal(&self, reason: impl Into<String>) {
        let reason = reason.into();
        let mut pending = self.pending.lock().unwrap();
        if let Some(latest) = pending.as_mut() {
            debug!(target: "Bridge/Reconnect", "folding reconnect signal: {reason}");
            *latest = reason;
            return;
        }
        *pending = Some(reason);
        drop(pending);

        let pending = self.pending.clone();
        let fire_tx = self.fire_tx.clone();
        let window = self.window;
        tokio::spawn(async move {
            tokio::time::sleep(window).await;
            if let Some(reason) = pending.lock().unwrap().take() {
                let _ = fire_tx.send(reason);
            }
        });
    }
}
