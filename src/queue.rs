use log::{debug, warn};
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;

type Task = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue worker is gone")]
    Closed,
}

/// Serialized task runner that spaces out submissions to the gateway.
///
/// Tasks run strictly in submission order on a single worker, with at least
/// `interval` between the start of consecutive tasks, so bursts of cache
/// misses do not flood the upstream. One instance exists per
/// synchronization domain (contact, room, room member); the domains
/// throttle independently and do not starve each other.
pub struct DelayQueueExecutor {
    tx: mpsc::UnboundedSender<(Task, oneshot::Sender<()>)>,
}

impl DelayQueueExecutor {
    pub fn new(label: &'static str, interval: Duration) -> Self {
        let (tx, mut rx) = mpsc::unbounded_channel::<(Task, oneshot::Sender<()>)>();
        tokio::spawn(async move {
            let mut last_start: Option<Instant> = None;
            while let Some((task, done)) = rx.recv().await {
                if let Some(last) = last_start {
                    let since = last.elapsed();
                    if since < interval {
                        tokio::time::sleep(interval - since).await;
                    }
                }
                last_start = Some(Instant::now());
                // A failed task must not wedge the queue; log and advance.
                if let Err(e) = task.await {
                    warn!(target: "Bridge/Queue", "{label} task failed: {e:#}");
                }
                let _ = done.send(());
            }
            debug!(target: "Bridge/Queue", "{label} worker exiting");
        });
        Self { tx }
    }

    /// Enqueues `task` and resolves once it has run (successfully or not).
    pub async fn execute<F>(&self, task: F) -> Result<(), QueueError>
    where
        F: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send((Box::pin(task), done_tx))
            .map_err(|_| QueueError::Closed)?;
        done_rx.await.map_err(|_| QueueError::Closed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::Mutex;

    #[tokio::test(start_paused = true)]
    async fn tasks_run_in_order_with_minimum_spacing() {
        let interval = Duration::from_millis(200);
        let queue = Arc::new(DelayQueueExecutor::new("test", interval));
        let starts: Arc<Mutex<Vec<(u32, Instant)>>> = Arc::new(Mutex::new(Vec::new()));

        let began = Instant::now();
        let mut handles = Vec::new();
        for i in 0..4u32 {
            let queue = queue.clone();
            let starts = starts.clone();
            handles.push(tokio::spawn(async move {
                queue
                    .execute(async move {
                        starts.lock().unwrap().push((i, Instant::now()));
                        Ok(())
                    })
                    .await
                    .unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let starts = starts.lock().unwrap();
        let order: Vec<u32> = starts.iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 2, 3]);

        // K tasks with threshold interval take at least (K-1) * interval.
        let last_start = starts.last().unwrap().1;
        assert!(last_start.duration_since(began) >= interval * 3);
        for pair in starts.windows(2) {
            assert!(pair[1].1.duration_since(pair[0].1) >= interval);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_does_not_block_the_queue() {
        let queue = DelayQueueExecutor::new("test", Duration::from_millis(200));

        queue
            .execute(async { Err(anyhow::anyhow!("sync rejected")) })
            .await
            .unwrap();

        let ran = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = ran.clone();
        queue
            .execute(async move {
                flag.store(true, std::sync::atomic::Ordering::SeqCst);
                Ok(())
            })
            .await
            .unwrap();
        assert!(ran.load(std::sync::atomic::Ordering::SeqCst));
    }
}
