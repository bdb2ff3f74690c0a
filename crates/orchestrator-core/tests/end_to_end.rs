//! Integration coverage for the executor + completion barrier against
//! in-memory fakes of Store, RouterClient, and SignatureVerifier.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use orchestrator_core::config::OrchestratorConfig;
use orchestrator_core::error::Result;
use orchestrator_core::executor::{CrossRegionExecutor, ExecutorDeps};
use orchestrator_core::ports::*;
use orchestrator_core::types::*;

#[derive(Default)]
struct FakeStore {
    jobs: Mutex<HashMap<JobId, Job>>,
    units: Mutex<HashMap<(JobId, String, String, String), ExecutionUnit>>,
    region_results: Mutex<Vec<RegionResult>>,
    analyses: Mutex<HashMap<JobId, CrossRegionAnalysis>>,
}

#[async_trait]
impl Store for FakeStore {
    async fn create_job(&self, spec: &JobSpec) -> Result<Job> {
        let job = Job { id: spec.id, status: JobStatus::Queued, created_at: Utc::now(), updated_at: Utc::now(), spec: spec.clone() };
        self.jobs.lock().unwrap().insert(spec.id, job.clone());
        Ok(job)
    }
    async fn get_job(&self, id: JobId) -> Result<Job> {
        self.jobs.lock().unwrap().get(&id).cloned().ok_or_else(|| {
            orchestrator_core::error::OrchestratorError::NotFound(id.to_string())
        })
    }
    async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<()> {
        if let Some(job) = self.jobs.lock().unwrap().get_mut(&id) {
            job.status = status;
        }
        Ok(())
    }
    async fn find_unit(&self, job_id: JobId, region: &str, model_id: &str, question: &str) -> Result<Option<ExecutionUnit>> {
        Ok(self.units.lock().unwrap().get(&(job_id, region.to_string(), model_id.to_string(), question.to_string())).cloned())
    }
    async fn upsert_unit(&self, unit: &ExecutionUnit) -> Result<()> {
        self.units.lock().unwrap().insert(unit.key(), unit.clone());
        Ok(())
    }
    async fn update_unit_region_verification(&self, job_id: JobId, region: &str, model_id: &str, question: &str, observed_region: &str, verified: bool) -> Result<()> {
        if let Some(unit) = self.units.lock().unwrap().get_mut(&(job_id, region.to_string(), model_id.to_string(), question.to_string())) {
            unit.observed_region = Some(observed_region.to_string());
            unit.region_verified = Some(verified);
        }
        Ok(())
    }
    async fn count_terminal_units(&self, job_id: JobId) -> Result<usize> {
        Ok(self.units.lock().unwrap().values().filter(|u| u.job_id == job_id && u.is_terminal_row()).count())
    }
    async fn list_units(&self, job_id: JobId) -> Result<Vec<ExecutionUnit>> {
        Ok(self.units.lock().unwrap().values().filter(|u| u.job_id == job_id).cloned().collect())
    }
    async fn upsert_region_result(&self, result: &RegionResult) -> Result<()> {
        self.region_results.lock().unwrap().push(result.clone());
        Ok(())
    }
    async fn list_region_results(&self, job_id: JobId) -> Result<Vec<RegionResult>> {
        Ok(self.region_results.lock().unwrap().iter().filter(|r| r.job_id == job_id).cloned().collect())
    }
    async fn create_analysis(&self, analysis: &CrossRegionAnalysis) -> Result<()> {
        self.analyses.lock().unwrap().insert(analysis.job_id, analysis.clone());
        Ok(())
    }
    async fn get_analysis(&self, job_id: JobId) -> Result<Option<CrossRegionAnalysis>> {
        Ok(self.analyses.lock().unwrap().get(&job_id).cloned())
    }
    async fn find_stuck_jobs(&self, _threshold: DateTime<Utc>) -> Result<Vec<JobId>> {
        Ok(vec![])
    }
}

struct FakeRouter;

#[async_trait]
impl RouterClient for FakeRouter {
    async fn infer(&self, req: InferenceRequest, _trace_id: &str) -> Result<InferenceResponse> {
        Ok(InferenceResponse {
            success: true,
            response: Some(format!("Paris is the capital of France, answered by {}", req.model)),
            provider_used: Some("fake-provider".into()),
            error: None,
            metadata: serde_json::json!({}),
            inference_sec: 0.01,
        })
    }
}

#[async_trait]
impl RegionProbe for FakeRouter {
    async fn verify(&self, claimed_region: &str) -> Result<(String, bool)> {
        Ok((claimed_region.to_string(), true))
    }
}

struct NoopVerifier;
impl SignatureVerifier for NoopVerifier {
    fn verify(&self, _payload: &[u8], _sig: &str, _pk: &str) -> Result<()> {
        Ok(())
    }
}

fn build_spec(regions: Vec<&str>) -> JobSpec {
    JobSpec {
        id: Uuid::new_v4(),
        version: "1".into(),
        benchmark: BenchmarkDescriptor {
            name: "test-benchmark".into(),
            container_image: "none".into(),
            input_payload: serde_json::json!({}),
            input_hash: "hash".into(),
            scoring_method: "none".into(),
        },
        models: vec![ModelDescriptor {
            model_id: "model-a".into(),
            display_name: "Model A".into(),
            provider: "test".into(),
            eligible_regions: regions.iter().map(|s| s.to_string()).collect(),
        }],
        questions: vec!["capital_of_france".into()],
        constraints: JobConstraints {
            regions: regions.into_iter().map(String::from).collect(),
            min_regions: 1,
            min_success_rate: 0.5,
            job_timeout_secs: None,
            per_provider_timeout_secs: None,
            per_region_providers: HashMap::new(),
        },
        metadata: HashMap::new(),
        signature: None,
        public_key: None,
    }
}

#[tokio::test]
async fn identical_responses_complete_with_low_risk() {
    orchestrator_analysis::install();

    let store = Arc::new(FakeStore::default());
    let router = Arc::new(FakeRouter);
    let verifier = Arc::new(NoopVerifier);

    let spec = build_spec(vec!["US", "EU"]);
    store.create_job(&spec).await.unwrap();

    let deps = ExecutorDeps::new(store.clone(), router, verifier);
    let mut config = OrchestratorConfig::from_env();
    config.strict_completion_barrier = true;

    let executor = CrossRegionExecutor::new(deps, config);
    let token = tokio_util::sync::CancellationToken::new();
    executor.run(spec.id, &spec, token).await.unwrap();

    let job = store.get_job(spec.id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);

    let units = store.list_units(spec.id).await.unwrap();
    assert_eq!(units.len(), 2);
    assert!(units.iter().all(|u| u.status == UnitStatus::Completed));

    let analysis = store.get_analysis(spec.id).await.unwrap().expect("analysis written");
    assert!(analysis.summary.starts_with("**Risk Level: LOW RISK**"));
}

#[tokio::test]
async fn redelivery_does_not_duplicate_units() {
    orchestrator_analysis::install();

    let store = Arc::new(FakeStore::default());
    let router = Arc::new(FakeRouter);
    let verifier = Arc::new(NoopVerifier);

    let spec = build_spec(vec!["US"]);
    store.create_job(&spec).await.unwrap();

    let deps = ExecutorDeps::new(store.clone(), router, verifier);
    let config = OrchestratorConfig::from_env();

    let executor = CrossRegionExecutor::new(deps, config);
    let token = tokio_util::sync::CancellationToken::new();
    executor.run(spec.id, &spec, token.clone()).await.unwrap();
    executor.run(spec.id, &spec, token).await.unwrap();

    let units = store.list_units(spec.id).await.unwrap();
    assert_eq!(units.len(), 1);
}
