//! Queue Consumer (C3) — acquires the processing lease, validates the
//! JobSpec, and hands off to the Cross-Region Executor.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};
use uuid::Uuid;

use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::executor::{CrossRegionExecutor, ExecutorDeps};
use crate::ports::{LeaseStore, SignatureVerifier, Store};
use crate::registry::JobContextRegistry;
use crate::types::{Envelope, JobId, JobSpec, JobStatus};

fn lease_key(job_id: JobId) -> String {
    format!("job:processing:{job_id}")
}

pub struct QueueConsumer<S, L> {
    store: Arc<S>,
    lease: Arc<L>,
    registry: JobContextRegistry,
    config: OrchestratorConfig,
    consumer_id: String,
}

impl<S, L> QueueConsumer<S, L>
where
    S: Store,
    L: LeaseStore,
{
    pub fn new(store: Arc<S>, lease: Arc<L>, registry: JobContextRegistry, config: OrchestratorConfig) -> Self {
        QueueConsumer {
            store,
            lease,
            registry,
            config,
            consumer_id: Uuid::new_v4().to_string(),
        }
    }

    /// Handles one dequeued envelope. Returns Ok(()) for every case where the
    /// envelope should be considered consumed (including legitimate skips);
    /// returns Err only when the envelope itself is unprocessable.
    pub async fn handle_envelope<Q, V>(
        &self,
        payload: &[u8],
        executor_deps: &ExecutorDeps<S, Q, V>,
    ) -> Result<()>
    where
        Q: crate::ports::RouterClient + crate::ports::RegionProbe,
        V: SignatureVerifier,
    {
        let envelope: Envelope = serde_json::from_slice(payload)
            .map_err(|e| OrchestratorError::EnvelopeMalformed(e.to_string()))?;

        let job = match self.store.get_job(envelope.id).await {
            Ok(job) => job,
            Err(OrchestratorError::NotFound(_)) => {
                warn!(job_id = %envelope.id, "envelope references unknown job, dropping");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        match job.status {
            JobStatus::Completed | JobStatus::Partial | JobStatus::Cancelled => {
                debug!(job_id = %envelope.id, status = ?job.status, "already terminal, skipping");
                return Ok(());
            }
            JobStatus::Processing => {
                // fall through to lease attempt below; a live processing
                // status does not by itself prove ownership
            }
            JobStatus::Failed | JobStatus::Queued | JobStatus::Finalizing => {}
        }

        let key = lease_key(envelope.id);
        let acquired = self
            .lease
            .acquire(&key, &self.consumer_id, self.config.lease_ttl)
            .await
            .map_err(|e| OrchestratorError::LeaseStore(e.into()))?;

        if !acquired {
            debug!(job_id = %envelope.id, "lease held by another consumer, skipping");
            return Ok(());
        }

        let result = self.process_locked(envelope.id, job.spec, executor_deps).await;

        if let Err(e) = self.lease.release(&key, &self.consumer_id).await {
            warn!(job_id = %envelope.id, error = %e, "lease release failed, will expire via TTL");
        }

        result
    }

    async fn process_locked<Q, V>(
        &self,
        job_id: JobId,
        spec: JobSpec,
        executor_deps: &ExecutorDeps<S, Q, V>,
    ) -> Result<()>
    where
        Q: crate::ports::RouterClient + crate::ports::RegionProbe,
        V: SignatureVerifier,
    {
        let token = self.registry.register(job_id).await;
        let outcome = async {
            if spec.constraints.regions.is_empty() {
                return Err(OrchestratorError::JobSpecInvalid("empty region set".into()));
            }

            validate_signature(&spec, &self.config, &executor_deps.signature_verifier)?;

            self.store.update_job_status(job_id, JobStatus::Processing).await?;

            let executor = CrossRegionExecutor::new(executor_deps.clone_refs(), self.config.clone());
            executor.run(job_id, &spec, token.clone()).await
        }
        .await;

        self.registry.unregister(job_id).await;

        if let Err(e) = &outcome {
            warn!(job_id = %job_id, error = %e, "job failed during execution");
            let _ = self.store.update_job_status(job_id, JobStatus::Failed).await;
        }

        outcome
    }
}

fn validate_signature<V: SignatureVerifier>(
    spec: &JobSpec,
    config: &OrchestratorConfig,
    verifier: &V,
) -> Result<()> {
    if config.signature_check_disabled() {
        return Ok(());
    }
    let (Some(signature), Some(public_key)) = (&spec.signature, &spec.public_key) else {
        return Ok(());
    };

    let mut canonical = spec.clone();
    canonical.signature = None;
    canonical.public_key = None;
    let payload = serde_json::to_vec(&canonical)
        .map_err(|e| OrchestratorError::JobSpecInvalid(format!("canonicalization failed: {e}")))?;

    verifier.verify(&payload, signature, public_key)
}

pub fn default_poll_timeout() -> Duration {
    Duration::from_secs(1)
}
