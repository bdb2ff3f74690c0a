//! Outbox Publisher (C2) — drains the transactional outbox into the queue,
//! guaranteeing at-least-once delivery.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::OrchestratorConfig;
use crate::ports::{OutboxStore, Queue};
use crate::types::Envelope;

const QUEUE_TOPIC: &str = "orchestrator:jobs";
const MAX_ENQUEUE_RETRIES: u32 = 3;
const ENQUEUE_BACKOFF_BASE: Duration = Duration::from_millis(100);

pub struct OutboxPublisher<O, Q> {
    outbox: Arc<O>,
    queue: Arc<Q>,
    config: OrchestratorConfig,
    errors: AtomicU64,
}

impl<O, Q> OutboxPublisher<O, Q>
where
    O: OutboxStore,
    Q: Queue,
{
    pub fn new(outbox: Arc<O>, queue: Arc<Q>, config: OrchestratorConfig) -> Self {
        OutboxPublisher { outbox, queue, config, errors: AtomicU64::new(0) }
    }

    /// Runs until `shutdown` fires.
    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.outbox_poll_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("outbox publisher shutting down");
                        return;
                    }
                }
            }

            match self.drain_once().await {
                Ok(0) => debug!("outbox idle"),
                Ok(n) => info!(published = n, "outbox drained"),
                Err(e) => {
                    let count = self.errors.fetch_add(1, Ordering::Relaxed) + 1;
                    error!(error = %e, failures = count, "outbox drain failed");
                    let backoff = self.backoff_for(count);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }

    fn backoff_for(&self, failures: u64) -> Duration {
        let capped_exp = failures.min(8) as u32;
        let backoff = Duration::from_millis(100u64.saturating_mul(1 << capped_exp));
        backoff.min(self.config.outbox_max_backoff)
    }

    /// Fetches a batch of unpublished rows and enqueues each. Returns the
    /// number successfully published.
    pub async fn drain_once(&self) -> anyhow::Result<usize> {
        let rows = self
            .outbox
            .fetch_unpublished(self.config.outbox_batch_size)
            .await
            .map_err(|e| anyhow::anyhow!(e))?;

        let mut published = 0;
        for row in rows {
            let envelope: Envelope = match serde_json::from_slice(&row.payload) {
                Ok(e) => e,
                Err(e) => {
                    warn!(outbox_id = %row.id, error = %e, "envelope malformed, leaving unpublished");
                    continue;
                }
            };

            if self.enqueue_with_retry(&row.payload).await {
                self.outbox
                    .mark_published(row.id)
                    .await
                    .map_err(|e| anyhow::anyhow!(e))?;
                published += 1;
                debug!(job_id = %envelope.id, outbox_id = %row.id, "published");
            } else {
                warn!(outbox_id = %row.id, "enqueue failed after retries, will retry next cycle");
            }
        }
        Ok(published)
    }

    async fn enqueue_with_retry(&self, payload: &[u8]) -> bool {
        let mut attempt = 0;
        loop {
            match self.queue.push(QUEUE_TOPIC, payload).await {
                Ok(()) => return true,
                Err(e) if attempt < MAX_ENQUEUE_RETRIES => {
                    attempt += 1;
                    warn!(attempt, error = %e, "enqueue retry");
                    tokio::time::sleep(ENQUEUE_BACKOFF_BASE * 2u32.pow(attempt)).await;
                }
                Err(e) => {
                    error!(error = %e, "enqueue failed, giving up this cycle");
                    return false;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use uuid::Uuid;

    use crate::types::OutboxRow;

    #[derive(Default)]
    struct FakeOutbox {
        rows: StdMutex<Vec<OutboxRow>>,
        published: StdMutex<Vec<Uuid>>,
    }

    #[async_trait]
    impl OutboxStore for FakeOutbox {
        async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxRow>> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.iter().take(limit).cloned().collect())
        }
        async fn mark_published(&self, id: Uuid) -> Result<()> {
            self.rows.lock().unwrap().retain(|r| r.id != id);
            self.published.lock().unwrap().push(id);
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeQueue {
        pushed: StdMutex<Vec<Vec<u8>>>,
        fail_next: StdMutex<usize>,
    }

    #[async_trait]
    impl Queue for FakeQueue {
        async fn push(&self, _topic: &str, payload: &[u8]) -> Result<()> {
            let mut fail_next = self.fail_next.lock().unwrap();
            if *fail_next > 0 {
                *fail_next -= 1;
                return Err(crate::error::OrchestratorError::Store("simulated".into()));
            }
            self.pushed.lock().unwrap().push(payload.to_vec());
            Ok(())
        }
        async fn pop(&self, _topic: &str, _timeout: Duration) -> Result<Option<Vec<u8>>> {
            Ok(None)
        }
    }

    fn envelope_row(seq: i64) -> OutboxRow {
        let envelope = Envelope {
            id: Uuid::new_v4(),
            enqueued_at: chrono::Utc::now(),
            attempt: 0,
            request_id: None,
        };
        OutboxRow {
            id: Uuid::new_v4(),
            topic: QUEUE_TOPIC.to_string(),
            payload: serde_json::to_vec(&envelope).unwrap(),
            published_at: None,
            created_seq: seq,
        }
    }

    #[tokio::test]
    async fn drains_and_marks_published() {
        let outbox = Arc::new(FakeOutbox {
            rows: StdMutex::new(vec![envelope_row(1), envelope_row(2)]),
            published: StdMutex::new(vec![]),
        });
        let queue = Arc::new(FakeQueue::default());
        let publisher = OutboxPublisher::new(outbox.clone(), queue.clone(), OrchestratorConfig::from_env());

        let published = publisher.drain_once().await.unwrap();
        assert_eq!(published, 2);
        assert_eq!(outbox.rows.lock().unwrap().len(), 0);
        assert_eq!(queue.pushed.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn malformed_row_left_unpublished() {
        let mut bad = envelope_row(1);
        bad.payload = b"not json".to_vec();
        let outbox = Arc::new(FakeOutbox {
            rows: StdMutex::new(vec![bad]),
            published: StdMutex::new(vec![]),
        });
        let queue = Arc::new(FakeQueue::default());
        let publisher = OutboxPublisher::new(outbox.clone(), queue, OrchestratorConfig::from_env());

        let published = publisher.drain_once().await.unwrap();
        assert_eq!(published, 0);
        assert_eq!(outbox.rows.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn enqueue_retries_then_succeeds() {
        let outbox = Arc::new(FakeOutbox {
            rows: StdMutex::new(vec![envelope_row(1)]),
            published: StdMutex::new(vec![]),
        });
        let queue = Arc::new(FakeQueue { pushed: StdMutex::new(vec![]), fail_next: StdMutex::new(2) });
        let publisher = OutboxPublisher::new(outbox.clone(), queue.clone(), OrchestratorConfig::from_env());

        let published = publisher.drain_once().await.unwrap();
        assert_eq!(published, 1);
        assert_eq!(queue.pushed.lock().unwrap().len(), 1);
    }
}
