//! Core data model: JobSpec, Job record, Execution Unit, Region Result,
//! Cross-Region Analysis, Key Difference, Risk Assessment, Outbox Row.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type JobId = Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDescriptor {
    pub model_id: String,
    pub display_name: String,
    pub provider: String,
    pub eligible_regions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BenchmarkDescriptor {
    pub name: String,
    pub container_image: String,
    pub input_payload: serde_json::Value,
    pub input_hash: String,
    pub scoring_method: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConstraints {
    pub regions: Vec<String>,
    pub min_regions: usize,
    pub min_success_rate: f64,
    #[serde(default)]
    pub job_timeout_secs: Option<i64>,
    pub per_provider_timeout_secs: Option<i64>,
    #[serde(default)]
    pub per_region_providers: HashMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobSpec {
    pub id: JobId,
    pub version: String,
    pub benchmark: BenchmarkDescriptor,
    pub models: Vec<ModelDescriptor>,
    pub questions: Vec<String>,
    pub constraints: JobConstraints,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
    pub signature: Option<String>,
    pub public_key: Option<String>,
}

impl JobSpec {
    /// A shallow copy safe for a single execution unit: metadata is
    /// deep-copied so concurrent units never share the same map.
    pub fn unit_copy(&self) -> JobSpec {
        JobSpec {
            id: self.id,
            version: self.version.clone(),
            benchmark: self.benchmark.clone(),
            models: self.models.clone(),
            questions: self.questions.clone(),
            constraints: self.constraints.clone(),
            metadata: self.metadata.clone(),
            signature: self.signature.clone(),
            public_key: self.public_key.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Processing,
    Finalizing,
    Completed,
    Partial,
    Failed,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Partial | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    pub id: JobId,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub spec: JobSpec,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitStatus {
    Pending,
    Running,
    Retrying,
    Completed,
    Failed,
    Cancelled,
    DuplicateSkipped,
}

impl UnitStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, UnitStatus::Pending | UnitStatus::Running | UnitStatus::Retrying)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitFailure {
    pub code: String,
    pub stage: String,
    pub component: String,
    pub message: String,
    pub transient: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionUnit {
    pub job_id: JobId,
    pub region: String,
    pub model_id: String,
    pub question: String,
    pub provider: Option<String>,
    pub status: UnitStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output: Option<serde_json::Value>,
    pub receipt: Option<Vec<u8>>,
    pub failure: Option<UnitFailure>,
    pub observed_region: Option<String>,
    pub region_verified: Option<bool>,
}

impl ExecutionUnit {
    pub fn key(&self) -> (JobId, String, String, String) {
        (self.job_id, self.region.clone(), self.model_id.clone(), self.question.clone())
    }

    pub fn is_terminal_row(&self) -> bool {
        self.status.is_terminal() && self.completed_at.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegionStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegionResult {
    pub job_id: JobId,
    pub region: String,
    pub status: RegionStatus,
    pub provider: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyDifference {
    pub dimension: String,
    pub variations: HashMap<String, String>,
    pub severity: Severity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskType {
    Censorship,
    Bias,
    Misinformation,
    PoliticalManipulation,
    NarrativeControl,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub risk_type: RiskType,
    pub severity: Severity,
    pub description: String,
    pub regions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrossRegionAnalysis {
    pub job_id: JobId,
    pub bias_variance: f64,
    pub censorship_rate: f64,
    pub factual_consistency: f64,
    pub narrative_divergence: f64,
    pub key_differences: Vec<KeyDifference>,
    pub risks: Vec<RiskAssessment>,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl RiskLevel {
    pub fn label(&self) -> &'static str {
        match self {
            RiskLevel::Low => "LOW RISK",
            RiskLevel::Medium => "MEDIUM RISK",
            RiskLevel::High => "HIGH RISK",
            RiskLevel::Critical => "CRITICAL RISK",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxRow {
    pub id: Uuid,
    pub topic: String,
    pub payload: Vec<u8>,
    pub published_at: Option<DateTime<Utc>>,
    pub created_seq: i64,
}

/// The outbox/queue envelope — the wire payload handed from C2 to C3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub id: JobId,
    pub enqueued_at: DateTime<Utc>,
    pub attempt: u32,
    pub request_id: Option<String>,
}
