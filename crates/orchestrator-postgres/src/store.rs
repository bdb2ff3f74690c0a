//! Postgres-backed Store and OutboxStore. Runtime-checked queries
//! (`sqlx::query`/`query_as`), never compile-time `query!` macros — the
//! schema is managed by migrations this crate does not own.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, PgPool, Row};
use uuid::Uuid;

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::ports::{OutboxStore, Store};
use orchestrator_core::types::*;

fn map_err(e: sqlx::Error) -> OrchestratorError {
    match e {
        sqlx::Error::RowNotFound => OrchestratorError::NotFound("row not found".into()),
        other => OrchestratorError::Store(other.to_string()),
    }
}

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        PgStore { pool }
    }
}

fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Queued => "queued",
        JobStatus::Processing => "processing",
        JobStatus::Finalizing => "finalizing",
        JobStatus::Completed => "completed",
        JobStatus::Partial => "partial",
        JobStatus::Failed => "failed",
        JobStatus::Cancelled => "cancelled",
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "processing" => JobStatus::Processing,
        "finalizing" => JobStatus::Finalizing,
        "completed" => JobStatus::Completed,
        "partial" => JobStatus::Partial,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        _ => JobStatus::Queued,
    }
}

fn unit_status_str(status: UnitStatus) -> &'static str {
    match status {
        UnitStatus::Pending => "pending",
        UnitStatus::Running => "running",
        UnitStatus::Retrying => "retrying",
        UnitStatus::Completed => "completed",
        UnitStatus::Failed => "failed",
        UnitStatus::Cancelled => "cancelled",
        UnitStatus::DuplicateSkipped => "duplicate_skipped",
    }
}

fn parse_unit_status(s: &str) -> UnitStatus {
    match s {
        "running" => UnitStatus::Running,
        "retrying" => UnitStatus::Retrying,
        "completed" => UnitStatus::Completed,
        "failed" => UnitStatus::Failed,
        "cancelled" => UnitStatus::Cancelled,
        "duplicate_skipped" => UnitStatus::DuplicateSkipped,
        _ => UnitStatus::Pending,
    }
}

fn unit_from_row(row: PgRow) -> Result<ExecutionUnit> {
    let failure: Option<serde_json::Value> = row.try_get("failure").map_err(map_err)?;
    let failure = failure.and_then(|v| serde_json::from_value(v).ok());

    Ok(ExecutionUnit {
        job_id: row.try_get("job_id").map_err(map_err)?,
        region: row.try_get("region").map_err(map_err)?,
        model_id: row.try_get("model_id").map_err(map_err)?,
        question: row.try_get("question").map_err(map_err)?,
        provider: row.try_get("provider").map_err(map_err)?,
        status: parse_unit_status(row.try_get::<String, _>("status").map_err(map_err)?.as_str()),
        started_at: row.try_get("started_at").map_err(map_err)?,
        completed_at: row.try_get("completed_at").map_err(map_err)?,
        output: row.try_get("output").map_err(map_err)?,
        receipt: row.try_get("receipt").map_err(map_err)?,
        failure,
        observed_region: row.try_get("observed_region").map_err(map_err)?,
        region_verified: row.try_get("region_verified").map_err(map_err)?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_job(&self, spec: &JobSpec) -> Result<Job> {
        let spec_json = serde_json::to_value(spec)
            .map_err(|e| OrchestratorError::JobSpecInvalid(e.to_string()))?;
        let row = sqlx::query(
            "INSERT INTO jobs (id, status, spec, created_at, updated_at) \
             VALUES ($1, 'queued', $2, now(), now()) \
             RETURNING created_at, updated_at",
        )
        .bind(spec.id)
        .bind(&spec_json)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;

        Ok(Job {
            id: spec.id,
            status: JobStatus::Queued,
            created_at: row.try_get("created_at").map_err(map_err)?,
            updated_at: row.try_get("updated_at").map_err(map_err)?,
            spec: spec.clone(),
        })
    }

    async fn get_job(&self, id: JobId) -> Result<Job> {
        let row = sqlx::query(
            "SELECT id, status, spec, created_at, updated_at FROM jobs WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?
        .ok_or_else(|| OrchestratorError::NotFound(format!("job {id}")))?;

        let spec_json: serde_json::Value = row.try_get("spec").map_err(map_err)?;
        let spec: JobSpec = serde_json::from_value(spec_json)
            .map_err(|e| OrchestratorError::Store(format!("corrupt jobspec: {e}")))?;

        Ok(Job {
            id,
            status: parse_job_status(row.try_get::<String, _>("status").map_err(map_err)?.as_str()),
            created_at: row.try_get("created_at").map_err(map_err)?,
            updated_at: row.try_get("updated_at").map_err(map_err)?,
            spec,
        })
    }

    async fn update_job_status(&self, id: JobId, status: JobStatus) -> Result<()> {
        sqlx::query("UPDATE jobs SET status = $1, updated_at = now() WHERE id = $2")
            .bind(job_status_str(status))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }

    async fn find_unit(
        &self,
        job_id: JobId,
        region: &str,
        model_id: &str,
        question: &str,
    ) -> Result<Option<ExecutionUnit>> {
        let row = sqlx::query(
            "SELECT job_id, region, model_id, question, provider, status, started_at, \
             completed_at, output, receipt, failure, observed_region, region_verified \
             FROM execution_units WHERE job_id = $1 AND region = $2 AND model_id = $3 AND question = $4",
        )
        .bind(job_id)
        .bind(region)
        .bind(model_id)
        .bind(question)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        row.map(unit_from_row).transpose()
    }

    async fn upsert_unit(&self, unit: &ExecutionUnit) -> Result<()> {
        let failure_json = unit.failure.as_ref().map(|f| serde_json::to_value(f)).transpose()
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

        sqlx::query(
            "INSERT INTO execution_units \
             (job_id, region, model_id, question, provider, status, started_at, completed_at, \
              output, receipt, failure, observed_region, region_verified) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9,$10,$11,$12,$13) \
             ON CONFLICT (job_id, region, model_id, question) DO UPDATE SET \
               provider = EXCLUDED.provider, status = EXCLUDED.status, \
               started_at = EXCLUDED.started_at, completed_at = EXCLUDED.completed_at, \
               output = EXCLUDED.output, receipt = EXCLUDED.receipt, failure = EXCLUDED.failure, \
               observed_region = EXCLUDED.observed_region, region_verified = EXCLUDED.region_verified",
        )
        .bind(unit.job_id)
        .bind(&unit.region)
        .bind(&unit.model_id)
        .bind(&unit.question)
        .bind(&unit.provider)
        .bind(unit_status_str(unit.status))
        .bind(unit.started_at)
        .bind(unit.completed_at)
        .bind(&unit.output)
        .bind(&unit.receipt)
        .bind(&failure_json)
        .bind(&unit.observed_region)
        .bind(unit.region_verified)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn update_unit_region_verification(
        &self,
        job_id: JobId,
        region: &str,
        model_id: &str,
        question: &str,
        observed_region: &str,
        verified: bool,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE execution_units SET observed_region = $1, region_verified = $2 \
             WHERE job_id = $3 AND region = $4 AND model_id = $5 AND question = $6",
        )
        .bind(observed_region)
        .bind(verified)
        .bind(job_id)
        .bind(region)
        .bind(model_id)
        .bind(question)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn count_terminal_units(&self, job_id: JobId) -> Result<usize> {
        let row = sqlx::query(
            "SELECT count(*) AS n FROM execution_units \
             WHERE job_id = $1 AND status NOT IN ('retrying','pending','running') \
             AND completed_at IS NOT NULL",
        )
        .bind(job_id)
        .fetch_one(&self.pool)
        .await
        .map_err(map_err)?;
        let n: i64 = row.try_get("n").map_err(map_err)?;
        Ok(n as usize)
    }

    async fn list_units(&self, job_id: JobId) -> Result<Vec<ExecutionUnit>> {
        let rows = sqlx::query(
            "SELECT job_id, region, model_id, question, provider, status, started_at, \
             completed_at, output, receipt, failure, observed_region, region_verified \
             FROM execution_units WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.into_iter().map(unit_from_row).collect()
    }

    async fn upsert_region_result(&self, result: &RegionResult) -> Result<()> {
        let status_str = match result.status {
            RegionStatus::Success => "success",
            RegionStatus::Failed => "failed",
        };
        sqlx::query(
            "INSERT INTO region_results (job_id, region, status, provider, started_at, completed_at, error) \
             VALUES ($1,$2,$3,$4,$5,$6,$7) \
             ON CONFLICT (job_id, region) DO UPDATE SET \
               status = EXCLUDED.status, provider = EXCLUDED.provider, \
               started_at = EXCLUDED.started_at, completed_at = EXCLUDED.completed_at, \
               error = EXCLUDED.error",
        )
        .bind(result.job_id)
        .bind(&result.region)
        .bind(status_str)
        .bind(&result.provider)
        .bind(result.started_at)
        .bind(result.completed_at)
        .bind(&result.error)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn list_region_results(&self, job_id: JobId) -> Result<Vec<RegionResult>> {
        let rows = sqlx::query(
            "SELECT job_id, region, status, provider, started_at, completed_at, error \
             FROM region_results WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.into_iter()
            .map(|row| {
                let status_str: String = row.try_get("status").map_err(map_err)?;
                Ok(RegionResult {
                    job_id: row.try_get("job_id").map_err(map_err)?,
                    region: row.try_get("region").map_err(map_err)?,
                    status: if status_str == "success" { RegionStatus::Success } else { RegionStatus::Failed },
                    provider: row.try_get("provider").map_err(map_err)?,
                    started_at: row.try_get("started_at").map_err(map_err)?,
                    completed_at: row.try_get("completed_at").map_err(map_err)?,
                    error: row.try_get("error").map_err(map_err)?,
                })
            })
            .collect()
    }

    async fn create_analysis(&self, analysis: &CrossRegionAnalysis) -> Result<()> {
        let key_differences = serde_json::to_value(&analysis.key_differences)
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;
        let risks = serde_json::to_value(&analysis.risks)
            .map_err(|e| OrchestratorError::Store(e.to_string()))?;

        sqlx::query(
            "INSERT INTO cross_region_analyses \
             (job_id, bias_variance, censorship_rate, factual_consistency, narrative_divergence, \
              key_differences, risks, summary, created_at) \
             VALUES ($1,$2,$3,$4,$5,$6,$7,$8,$9)",
        )
        .bind(analysis.job_id)
        .bind(analysis.bias_variance)
        .bind(analysis.censorship_rate)
        .bind(analysis.factual_consistency)
        .bind(analysis.narrative_divergence)
        .bind(&key_differences)
        .bind(&risks)
        .bind(&analysis.summary)
        .bind(analysis.created_at)
        .execute(&self.pool)
        .await
        .map_err(map_err)?;
        Ok(())
    }

    async fn get_analysis(&self, job_id: JobId) -> Result<Option<CrossRegionAnalysis>> {
        let row = sqlx::query(
            "SELECT job_id, bias_variance, censorship_rate, factual_consistency, \
             narrative_divergence, key_differences, risks, summary, created_at \
             FROM cross_region_analyses WHERE job_id = $1",
        )
        .bind(job_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_err)?;

        let Some(row) = row else { return Ok(None) };
        let key_differences: serde_json::Value = row.try_get("key_differences").map_err(map_err)?;
        let risks: serde_json::Value = row.try_get("risks").map_err(map_err)?;

        Ok(Some(CrossRegionAnalysis {
            job_id: row.try_get("job_id").map_err(map_err)?,
            bias_variance: row.try_get("bias_variance").map_err(map_err)?,
            censorship_rate: row.try_get("censorship_rate").map_err(map_err)?,
            factual_consistency: row.try_get("factual_consistency").map_err(map_err)?,
            narrative_divergence: row.try_get("narrative_divergence").map_err(map_err)?,
            key_differences: serde_json::from_value(key_differences)
                .map_err(|e| OrchestratorError::Store(e.to_string()))?,
            risks: serde_json::from_value(risks).map_err(|e| OrchestratorError::Store(e.to_string()))?,
            summary: row.try_get("summary").map_err(map_err)?,
            created_at: row.try_get("created_at").map_err(map_err)?,
        }))
    }

    async fn find_stuck_jobs(&self, threshold: DateTime<Utc>) -> Result<Vec<JobId>> {
        let rows = sqlx::query(
            "SELECT id FROM jobs WHERE status = 'processing' AND updated_at < $1",
        )
        .bind(threshold)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.into_iter().map(|row| row.try_get::<Uuid, _>("id").map_err(map_err)).collect()
    }
}

#[async_trait]
impl OutboxStore for PgStore {
    async fn fetch_unpublished(&self, limit: usize) -> Result<Vec<OutboxRow>> {
        let rows = sqlx::query(
            "SELECT id, topic, payload, published_at, created_seq FROM outbox \
             WHERE published_at IS NULL ORDER BY created_seq ASC LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_err)?;

        rows.into_iter()
            .map(|row| {
                Ok(OutboxRow {
                    id: row.try_get("id").map_err(map_err)?,
                    topic: row.try_get("topic").map_err(map_err)?,
                    payload: row.try_get("payload").map_err(map_err)?,
                    published_at: row.try_get("published_at").map_err(map_err)?,
                    created_seq: row.try_get("created_seq").map_err(map_err)?,
                })
            })
            .collect()
    }

    async fn mark_published(&self, id: Uuid) -> Result<()> {
        sqlx::query("UPDATE outbox SET published_at = now() WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(map_err)?;
        Ok(())
    }
}
