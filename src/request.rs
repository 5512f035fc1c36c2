use log::warn;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tokio::sync::{Mutex, oneshot};

/// Correlation table between an outbound synchronization request and the
/// push event that eventually answers it.
///
/// Each key holds one or more single-shot waiters; resolving delivers the
/// value to every waiter exactly once and clears the key. Resolving a key
/// nobody registered drops the value: no history is kept, callers must not
/// rely on already-answered queries.
pub struct PendingReplies<T> {
    waiters: Mutex<HashMap<String, Vec<oneshot::Sender<T>>>>,
}

impl<T: Clone> Default for PendingReplies<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> PendingReplies<T> {
    pub fn new() -> Self {
        Self {
            waiters: Mutex::new(HashMap::new()),
        }
    }

    /// Registers a waiter under `key`. Multiple registrations per key are
    /// allowed (fan-out); each receives the resolved value once.
    pub async fn register(&self, key: &str) -> oneshot::Receiver<T> {
        let (tx, rx) = oneshot::channel();
        self.waiters
            .lock()
            .await
            .entry(key.to_string())
            .or_default()
            .push(tx);
        rx
    }

    /// Delivers `value` to every waiter under `key` and removes them.
    /// Returns how many waiters were resolved.
    pub async fn resolve(&self, key: &str, value: T) -> usize {
        let Some(senders) = self.waiters.lock().await.remove(key) else {
            return 0;
        };
        let mut delivered = 0;
        for sender in senders {
            if sender.send(value.clone()).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }

    /// Whether any waiter is currently registered under `key`.
    pub async fn peek(&self, key: &str) -> bool {
        self.waiters
            .lock()
            .await
            .get(key)
            .is_some_and(|senders| !senders.is_empty())
    }

    /// Drops the waiters under one key, e.g. when the requester timed out
    /// and will not consume a late answer.
    pub async fn discard(&self, key: &str) {
        self.waiters.lock().await.remove(key);
    }

    /// Drops every waiter; their receivers complete with a closed error.
    /// Called on session teardown.
    pub async fn clear(&self) {
        self.waiters.lock().await.clear();
    }
}

/// Waits for a reply under `key`, re-issuing the synchronization request
/// every `retry_interval` until the push event arrives.
///
/// The registry entry is retried, not abandoned: a lost or slow upstream
/// answer leads to another sync submission, never to a caller-visible
/// failure. Cancellation is the caller dropping this future. `resync` is
/// invoked once before the first wait, so a single call covers both the
/// initial request and every retry.
pub(crate) async fn wait_with_resync<T, F, Fut>(
    registry: &PendingReplies<T>,
    key: &str,
    retry_interval: Duration,
    mut resync: F,
) -> Option<T>
where
    T: Clone,
    F: FnMut() -> Fut,
    Fut: Future<Output = ()>,
{
    let mut rx = registry.register(key).await;
    resync().await;
    loop {
        match tokio::time::timeout(retry_interval, &mut rx).await {
            Ok(Ok(value)) => return Some(value),
            Ok(Err(_)) => {
                // Session teardown dropped the registry entry.
                return None;
            }
            Err(_) => {
                warn!(target: "Bridge/Request", "no reply for {key} yet, re-requesting");
                resync().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn fan_out_delivers_to_every_waiter_once() {
        let registry = PendingReplies::<String>::new();

        let rx1 = registry.register("5@chatroom").await;
        let rx2 = registry.register("5@chatroom").await;
        let rx3 = registry.register("5@chatroom").await;
        assert!(registry.peek("5@chatroom").await);

        let delivered = registry.resolve("5@chatroom", "members".to_string()).await;
        assert_eq!(delivered, 3);

        assert_eq!(rx1.await.unwrap(), "members");
        assert_eq!(rx2.await.unwrap(), "members");
        assert_eq!(rx3.await.unwrap(), "members");

        // The key is gone after delivery.
        assert!(!registry.peek("5@chatroom").await);
        assert_eq!(registry.resolve("5@chatroom", "again".to_string()).await, 0);
    }

    #[tokio::test]
    async fn unmatched_resolve_is_dropped() {
        let registry = PendingReplies::<u32>::new();
        assert_eq!(registry.resolve("wx-1", 7).await, 0);
        // A waiter registered afterwards does not see the old value.
        let rx = registry.register("wx-1").await;
        assert_eq!(registry.resolve("wx-1", 8).await, 1);
        assert_eq!(rx.await.unwrap(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reissues_the_request_and_keeps_waiting() {
        let registry = Arc::new(PendingReplies::<u32>::new());
        let attempts = Arc::new(AtomicU32::new(0));

        let waiter = {
            let registry = registry.clone();
            let attempts = attempts.clone();
            tokio::spawn(async move {
                wait_with_resync(&registry, "wx-1", Duration::from_secs(3), || {
                    attempts.fetch_add(1, Ordering::SeqCst);
                    async {}
                })
                .await
            })
        };

        // Two full timeouts pass before the reply shows up.
        tokio::time::sleep(Duration::from_millis(6500)).await;
        registry.resolve("wx-1", 42).await;

        assert_eq!(waiter.await.unwrap(), Some(42));
        // Initial request plus one re-request per elapsed timeout.
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn clear_wakes_waiters_empty() {
        let registry = PendingReplies::<u32>::new();
        let rx = registry.register("wx-1").await;
        registry.clear().await;
        assert!(rx.await.is_err());
    }
}
