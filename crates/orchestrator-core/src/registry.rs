//! Job Context Registry (C1) — the sole channel for external cancellation
//! into an in-flight job. Never exposes iteration over its internal map.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::types::JobId;

#[derive(Debug, Default, Clone)]
pub struct JobContextRegistry {
    inner: Arc<Mutex<HashMap<JobId, CancellationToken>>>,
}

impl JobContextRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any prior handle for this job id.
    pub async fn register(&self, id: JobId) -> CancellationToken {
        let token = CancellationToken::new();
        self.inner.lock().await.insert(id, token.clone());
        token
    }

    /// Cancels the handle exactly once and removes the entry. Returns
    /// whether an entry was found.
    pub async fn cancel(&self, id: JobId) -> bool {
        if let Some(token) = self.inner.lock().await.remove(&id) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub async fn unregister(&self, id: JobId) {
        self.inner.lock().await.remove(&id);
    }

    pub async fn is_running(&self, id: JobId) -> bool {
        self.inner.lock().await.contains_key(&id)
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn register_then_cancel_removes_entry() {
        let registry = JobContextRegistry::new();
        let id = JobId::new_v4();
        let token = registry.register(id).await;
        assert!(registry.is_running(id).await);

        assert!(registry.cancel(id).await);
        assert!(token.is_cancelled());
        assert!(!registry.is_running(id).await);
    }

    #[tokio::test]
    async fn cancel_missing_job_returns_false() {
        let registry = JobContextRegistry::new();
        assert!(!registry.cancel(JobId::new_v4()).await);
    }

    #[tokio::test]
    async fn register_replaces_prior_handle() {
        let registry = JobContextRegistry::new();
        let id = JobId::new_v4();
        let first = registry.register(id).await;
        let second = registry.register(id).await;

        assert!(registry.cancel(id).await);
        assert!(second.is_cancelled());
        assert!(!first.is_cancelled());
        assert_eq!(registry.count().await, 0);
    }
}
