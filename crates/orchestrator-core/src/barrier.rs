//! Completion Barrier (C12) — gates `processing -> completed` until every
//! expected execution unit has landed as a terminal row.

use tracing::{info, warn};

use crate::error::Result;
use crate::ports::Store;
use crate::types::{JobId, JobStatus};

pub struct CompletionBarrier {
    enabled: bool,
}

impl CompletionBarrier {
    pub fn new(enabled: bool) -> Self {
        CompletionBarrier { enabled }
    }

    /// `classification` is the executor's own verdict (completed/partial/failed).
    /// When the barrier is enabled and the persisted terminal-row count is
    /// short of `expected_count`, the job is parked in `finalizing` instead.
    pub async fn finalize<S: Store>(
        &self,
        job_id: JobId,
        expected_count: usize,
        classification: JobStatus,
        store: &S,
    ) -> Result<()> {
        if !self.enabled || classification != JobStatus::Completed {
            store.update_job_status(job_id, classification).await?;
            return Ok(());
        }

        let persisted = store.count_terminal_units(job_id).await?;
        if persisted < expected_count {
            warn!(job_id = %job_id, persisted, expected_count, "completion barrier holding job in finalizing");
            store.update_job_status(job_id, JobStatus::Finalizing).await?;
            return Ok(());
        }

        info!(job_id = %job_id, persisted, expected_count, "completion barrier satisfied");
        store.update_job_status(job_id, JobStatus::Completed).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::Store;
    use crate::types::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeStore {
        status: Mutex<Option<JobStatus>>,
        terminal_count: usize,
    }

    #[async_trait]
    impl Store for FakeStore {
        async fn create_job(&self, _spec: &JobSpec) -> Result<Job> {
            unimplemented!()
        }
        async fn get_job(&self, _id: JobId) -> Result<Job> {
            unimplemented!()
        }
        async fn update_job_status(&self, _id: JobId, status: JobStatus) -> Result<()> {
            *self.status.lock().unwrap() = Some(status);
            Ok(())
        }
        async fn find_unit(
            &self,
            _job_id: JobId,
            _region: &str,
            _model_id: &str,
            _question: &str,
        ) -> Result<Option<ExecutionUnit>> {
            Ok(None)
        }
        async fn upsert_unit(&self, _unit: &ExecutionUnit) -> Result<()> {
            Ok(())
        }
        async fn update_unit_region_verification(
            &self,
            _job_id: JobId,
            _region: &str,
            _model_id: &str,
            _question: &str,
            _observed_region: &str,
            _verified: bool,
        ) -> Result<()> {
            Ok(())
        }
        async fn count_terminal_units(&self, _job_id: JobId) -> Result<usize> {
            Ok(self.terminal_count)
        }
        async fn list_units(&self, _job_id: JobId) -> Result<Vec<ExecutionUnit>> {
            Ok(vec![])
        }
        async fn upsert_region_result(&self, _result: &RegionResult) -> Result<()> {
            Ok(())
        }
        async fn list_region_results(&self, _job_id: JobId) -> Result<Vec<RegionResult>> {
            Ok(vec![])
        }
        async fn create_analysis(&self, _analysis: &CrossRegionAnalysis) -> Result<()> {
            Ok(())
        }
        async fn get_analysis(&self, _job_id: JobId) -> Result<Option<CrossRegionAnalysis>> {
            Ok(None)
        }
        async fn find_stuck_jobs(&self, _threshold: DateTime<Utc>) -> Result<Vec<JobId>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn holds_in_finalizing_when_short() {
        let store = FakeStore { status: Mutex::new(None), terminal_count: 2 };
        let barrier = CompletionBarrier::new(true);
        barrier.finalize(JobId::new_v4(), 5, JobStatus::Completed, &store).await.unwrap();
        assert_eq!(*store.status.lock().unwrap(), Some(JobStatus::Finalizing));
    }

    #[tokio::test]
    async fn completes_when_counts_match() {
        let store = FakeStore { status: Mutex::new(None), terminal_count: 5 };
        let barrier = CompletionBarrier::new(true);
        barrier.finalize(JobId::new_v4(), 5, JobStatus::Completed, &store).await.unwrap();
        assert_eq!(*store.status.lock().unwrap(), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn bypassed_when_disabled() {
        let store = FakeStore { status: Mutex::new(None), terminal_count: 0 };
        let barrier = CompletionBarrier::new(false);
        barrier.finalize(JobId::new_v4(), 5, JobStatus::Completed, &store).await.unwrap();
        assert_eq!(*store.status.lock().unwrap(), Some(JobStatus::Completed));
    }

    #[tokio::test]
    async fn non_completed_classification_passes_through() {
        let store = FakeStore { status: Mutex::new(None), terminal_count: 0 };
        let barrier = CompletionBarrier::new(true);
        barrier.finalize(JobId::new_v4(), 5, JobStatus::Failed, &store).await.unwrap();
        assert_eq!(*store.status.lock().unwrap(), Some(JobStatus::Failed));
    }
}
