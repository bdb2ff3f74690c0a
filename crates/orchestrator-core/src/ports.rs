//! Storage, queue, lease and router port traits — implemented by
//! orchestrator-postgres and orchestrator-router-client. Core logic depends
//! only on these traits, never on sqlx/redis/reqwest directly.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::Result;
use crate::types::*;

#[async_trait]
pub trait Store: Send + Sync {
    async fn create_job(&self, spec: &JobSpec) -> Result<Job>;
    async fn get_job(&self, id: JobId) -> Result<Job>;
    async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<()>;

    async fn find_unit(
        &self,
        job_id: JobId,
        region: &str,
        model_id: &str,
        question: &str,
    ) -> Result<Option<ExecutionUnit>>;
    async fn upsert_unit(&self, unit: &ExecutionUnit) -> Result<()>;
    async fn update_unit_region_verification(
        &self,
        job_id: JobId,
        region: &str,
        model_id: &str,
        question: &str,
        observed_region: &str,
        verified: bool,
    ) -> Result<()>;
    async fn count_terminal_units(&self, job_id: JobId) -> Result<usize>;
    async fn list_units(&self, job_id: JobId) -> Result<Vec<ExecutionUnit>>;

    async fn upsert_region_result(&self, result: &RegionResult) -> Result<()>;
    async fn list_region_results(&self, job_id: JobId) -> Result<Vec<RegionResult>>;

    async fn create_analysis(&self, analysis: &CrossRegionAnalysis) -> Result<()>;
    async fn get_analysis(&self, job_id: JobId) -> Result<Option<CrossRegionAnalysis>>;

    /// Jobs stuck in `processing` since before `threshold`, used by the sweeper.
    async fn find_stuck_jobs(&self, threshold: DateTime<Utc>) -> Result<Vec<JobId>>;
}

#[async_trait]
pub trait OutboxStore: Send + Sync {
    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxRow>>;
    async fn mark_published(&self, id: uuid::Uuid) -> Result<()>;
}

#[async_trait]
pub trait LeaseStore: Send + Sync {
    /// Atomic set-if-absent with TTL. Returns true iff the lease was acquired.
    async fn acquire(&self, key: &str, holder: &str, ttl: std::time::Duration) -> Result<bool>;
    async fn release(&self, key: &str, holder: &str) -> Result<()>;
}

#[async_trait]
pub trait Queue: Send + Sync {
    async fn push(&self, topic: &str, payload: &[u8]) -> Result<()>;
    /// Blocking pop with a timeout; returns None on timeout.
    async fn pop(&self, topic: &str, timeout: std::time::Duration) -> Result<Option<Vec<u8>>>;
}

#[derive(Debug, Clone)]
pub struct InferenceRequest {
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    pub max_tokens: u32,
    pub region_preference: String,
    pub cost_priority: bool,
}

impl InferenceRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>, region: impl Into<String>) -> Self {
        InferenceRequest {
            model: model.into(),
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: 500,
            region_preference: region.into(),
            cost_priority: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct InferenceResponse {
    pub success: bool,
    pub response: Option<String>,
    pub provider_used: Option<String>,
    pub error: Option<String>,
    pub metadata: serde_json::Value,
    pub inference_sec: f64,
}

#[async_trait]
pub trait RouterClient: Send + Sync {
    async fn infer(&self, req: InferenceRequest, trace_id: &str) -> Result<InferenceResponse>;
}

#[async_trait]
pub trait RegionProbe: Send + Sync {
    /// Never blocks the main execution path; best-effort.
    async fn verify(&self, claimed_region: &str) -> Result<(String, bool)>;
}

pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, canonical_payload: &[u8], signature: &str, public_key: &str) -> Result<()>;
}

#[async_trait]
pub trait SummaryProvider: Send + Sync {
    async fn summarize(
        &self,
        analysis: &CrossRegionAnalysisInputs,
    ) -> Result<Option<String>>;
}

/// The inputs the summary generator needs, decoupled from the persisted
/// record so both the template and LLM-assisted providers share one shape.
#[derive(Debug, Clone)]
pub struct CrossRegionAnalysisInputs {
    pub bias_variance: f64,
    pub censorship_rate: f64,
    pub factual_consistency: f64,
    pub narrative_divergence: f64,
    pub key_differences: Vec<KeyDifference>,
    pub risks: Vec<RiskAssessment>,
}
