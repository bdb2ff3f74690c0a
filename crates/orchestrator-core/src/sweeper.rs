//! Timeout Sweeper (C13) — periodically fails jobs stuck in `processing`
//! past a threshold, independent of in-memory executor state.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config::OrchestratorConfig;
use crate::ports::Store;
use crate::types::JobStatus;

pub struct TimeoutSweeper<S> {
    store: Arc<S>,
    config: OrchestratorConfig,
}

impl<S: Store> TimeoutSweeper<S> {
    pub fn new(store: Arc<S>, config: OrchestratorConfig) -> Self {
        TimeoutSweeper { store, config }
    }

    pub async fn run(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.config.sweeper_interval) => {}
                _ = shutdown.changed() => {
                    if *shutdown.borrow() {
                        info!("timeout sweeper shutting down");
                        return;
                    }
                }
            }

            if let Err(e) = self.sweep_once().await {
                warn!(error = %e, "timeout sweep failed");
            }
        }
    }

    pub async fn sweep_once(&self) -> anyhow::Result<usize> {
        let threshold = Utc::now() - chrono::Duration::from_std(self.config.sweeper_threshold)?;
        let stuck = self.store.find_stuck_jobs(threshold).await.map_err(|e| anyhow::anyhow!(e))?;
        for job_id in &stuck {
            warn!(job_id = %job_id, "timeout sweeper failing stuck job");
            self.store
                .update_job_status(*job_id, JobStatus::Failed)
                .await
                .map_err(|e| anyhow::anyhow!(e))?;
        }
        Ok(stuck.len())
    }
}
