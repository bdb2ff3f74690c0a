//! Cross-Region Executor (C4) and Unit Executor (C5).

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::barrier::CompletionBarrier;
use crate::config::OrchestratorConfig;
use crate::error::{OrchestratorError, Result};
use crate::ports::{InferenceRequest, RegionProbe, RouterClient, SignatureVerifier, Store};
use crate::types::*;

pub type UnitCallback = Arc<dyn Fn(ExecutionUnit) + Send + Sync>;

/// Bundles the dependencies the executor needs that are also shared with the
/// queue consumer, so a consumer can build one set of Arcs per process and
/// hand cheap clones to each job.
pub struct ExecutorDeps<S, Q, V> {
    pub store: Arc<S>,
    pub router: Arc<Q>,
    pub signature_verifier: Arc<V>,
}

impl<S, Q, V> ExecutorDeps<S, Q, V> {
    pub fn new(store: Arc<S>, router: Arc<Q>, signature_verifier: Arc<V>) -> Self {
        ExecutorDeps { store, router, signature_verifier }
    }

    pub fn clone_refs(&self) -> Self {
        ExecutorDeps {
            store: self.store.clone(),
            router: self.router.clone(),
            signature_verifier: self.signature_verifier.clone(),
        }
    }
}

/// Maps an abstract region label to a router-understood region code.
pub fn router_region_code(region: &str) -> &'static str {
    match region.to_ascii_uppercase().as_str() {
        "US" => "us-east",
        "EU" => "eu-west",
        "APAC" | "ASIA" => "asia-pacific",
        _ => "eu-west",
    }
}

/// The sentinel question identifier used for the zero-question boundary
/// case (§8 boundary behaviors).
pub const SENTINEL_QUESTION: &str = "__no_question__";

fn enumerate_units(spec: &JobSpec) -> Vec<(String, String, String)> {
    let questions: Vec<String> = if spec.questions.is_empty() {
        vec![SENTINEL_QUESTION.to_string()]
    } else {
        spec.questions.clone()
    };

    let mut units = Vec::new();
    for region in &spec.constraints.regions {
        for question in &questions {
            for model in &spec.models {
                if model.eligible_regions.iter().any(|r| r == region) {
                    units.push((region.clone(), model.model_id.clone(), question.clone()));
                }
            }
        }
    }
    units
}

pub struct CrossRegionExecutor<S, Q, V> {
    deps: ExecutorDeps<S, Q, V>,
    config: OrchestratorConfig,
}

impl<S, Q, V> CrossRegionExecutor<S, Q, V>
where
    S: Store,
    Q: RouterClient + RegionProbe,
    V: SignatureVerifier,
{
    pub fn new(deps: ExecutorDeps<S, Q, V>, config: OrchestratorConfig) -> Self {
        CrossRegionExecutor { deps, config }
    }

    pub async fn run(&self, job_id: JobId, spec: &JobSpec, token: CancellationToken) -> Result<()> {
        let units = enumerate_units(spec);
        let expected_count = units.len();
        info!(job_id = %job_id, expected_count, "executor starting");

        let mut by_region: HashMap<String, Vec<(String, String)>> = HashMap::new();
        for (region, model, question) in units {
            by_region.entry(region).or_default().push((model, question));
        }
        // Within a region, keep the JobSpec-declared question order.
        for (region, entries) in by_region.iter_mut() {
            let order: HashMap<&str, usize> =
                spec.questions.iter().enumerate().map(|(i, q)| (q.as_str(), i)).collect();
            entries.sort_by_key(|(_, q)| order.get(q.as_str()).copied().unwrap_or(usize::MAX));
            let _ = region;
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_units.max(1)));

        let mut region_handles = Vec::new();
        for (region, entries) in by_region {
            let spec = spec.clone();
            let job_id = job_id;
            let token = token.clone();
            let semaphore = semaphore.clone();
            let deps = self.deps.clone_refs();
            let config = self.config.clone();
            region_handles.push(tokio::spawn(async move {
                run_region(job_id, region, entries, spec, token, semaphore, deps, config).await
            }));
        }

        let mut region_results = Vec::new();
        for handle in region_handles {
            match handle.await {
                Ok(r) => region_results.push(r),
                Err(e) => warn!(job_id = %job_id, error = %e, "region worker panicked"),
            }
        }

        let successful_regions = region_results.iter().filter(|r| *r).count();
        let total_regions = spec.constraints.regions.len().max(1);
        let min_regions = spec.constraints.min_regions;
        let min_rate = spec.constraints.min_success_rate;
        let ratio = successful_regions as f64 / total_regions as f64;

        let classification = if successful_regions >= min_regions && ratio >= min_rate {
            JobStatus::Completed
        } else if successful_regions >= min_regions {
            JobStatus::Partial
        } else {
            JobStatus::Failed
        };

        if token.is_cancelled() {
            self.deps.store.update_job_status(job_id, JobStatus::Cancelled).await?;
            return Ok(());
        }

        if successful_regions >= 2 {
            if let Err(e) = run_analysis(job_id, &self.deps.store).await {
                warn!(job_id = %job_id, error = %e, "analysis pipeline failed");
            }
        }

        let barrier = CompletionBarrier::new(self.config.strict_completion_barrier);
        barrier
            .finalize(job_id, expected_count, classification, self.deps.store.as_ref())
            .await
    }
}

#[allow(clippy::too_many_arguments)]
async fn run_region<S, Q, V>(
    job_id: JobId,
    region: String,
    questions_in_order: Vec<(String, String)>,
    spec: JobSpec,
    token: CancellationToken,
    semaphore: Arc<Semaphore>,
    deps: ExecutorDeps<S, Q, V>,
    config: OrchestratorConfig,
) -> bool
where
    S: Store,
    Q: RouterClient + RegionProbe,
    V: SignatureVerifier,
{
    let mut by_question: HashMap<&str, Vec<&str>> = HashMap::new();
    let mut question_order = Vec::new();
    for (model, question) in &questions_in_order {
        if !by_question.contains_key(question.as_str()) {
            question_order.push(question.as_str());
        }
        by_question.entry(question.as_str()).or_default().push(model.as_str());
    }

    let mut any_completed = false;
    let started_at = Utc::now();

    for question in question_order {
        if token.is_cancelled() {
            debug!(job_id = %job_id, region = %region, "region worker observed cancellation, stopping");
            break;
        }

        let models = by_question.get(question).cloned().unwrap_or_default();
        let mut unit_handles = Vec::new();
        for model_id in models {
            let permit = semaphore.clone().acquire_owned().await;
            let permit = match permit {
                Ok(p) => p,
                Err(_) => continue,
            };
            let spec = spec.clone();
            let region = region.clone();
            let model_id = model_id.to_string();
            let question = question.to_string();
            let deps = deps.clone_refs();
            let token = token.clone();
            let config = config.clone();
            unit_handles.push(tokio::spawn(async move {
                let _permit = permit;
                run_unit(job_id, &region, &model_id, &question, &spec, &deps, &config, token).await
            }));
        }

        for handle in unit_handles {
            match handle.await {
                Ok(Ok(unit)) => {
                    if unit.status == UnitStatus::Completed {
                        any_completed = true;
                    }
                }
                Ok(Err(e)) => warn!(job_id = %job_id, region = %region, error = %e, "unit execution error"),
                Err(e) => warn!(job_id = %job_id, region = %region, error = %e, "unit task panicked"),
            }
        }
    }

    let result = RegionResult {
        job_id,
        region: region.clone(),
        status: if any_completed { RegionStatus::Success } else { RegionStatus::Failed },
        provider: None,
        started_at: Some(started_at),
        completed_at: Some(Utc::now()),
        error: if any_completed { None } else { Some("no completed units".into()) },
    };
    if let Err(e) = deps.store.upsert_region_result(&result).await {
        warn!(job_id = %job_id, region = %region, error = %e, "failed to persist region result");
    }

    any_completed
}

#[allow(clippy::too_many_arguments)]
async fn run_unit<S, Q, V>(
    job_id: JobId,
    region: &str,
    model_id: &str,
    question: &str,
    spec: &JobSpec,
    deps: &ExecutorDeps<S, Q, V>,
    config: &OrchestratorConfig,
    token: CancellationToken,
) -> Result<ExecutionUnit>
where
    S: Store,
    Q: RouterClient + RegionProbe,
    V: SignatureVerifier,
{
    if let Some(existing) = deps.store.find_unit(job_id, region, model_id, question).await? {
        if existing.is_terminal_row() {
            debug!(job_id = %job_id, region, model_id, question, "duplicate unit, skipping");
            return Ok(existing);
        }
    }

    let started_at = Utc::now();
    let model = spec.models.iter().find(|m| m.model_id == model_id);
    let model_name = model.map(|m| m.display_name.clone()).unwrap_or_else(|| model_id.to_string());
    let prompt = prompt_for_question(question, spec);
    let router_region = router_region_code(region);

    let request = InferenceRequest::new(model_name, prompt, router_region);
    let trace_id = format!("{job_id}-{region}-{model_id}-{question}");

    let call = deps.router.infer(request, &trace_id);
    let timed = tokio::time::timeout(config.unit_timeout, call);

    let mut unit = ExecutionUnit {
        job_id,
        region: region.to_string(),
        model_id: model_id.to_string(),
        question: question.to_string(),
        provider: None,
        status: UnitStatus::Running,
        started_at: Some(started_at),
        completed_at: None,
        output: None,
        receipt: None,
        failure: None,
        observed_region: None,
        region_verified: None,
    };

    let outcome = tokio::select! {
        biased;
        _ = token.cancelled() => None,
        res = timed => Some(res),
    };

    match outcome {
        None => {
            unit.status = UnitStatus::Cancelled;
            unit.completed_at = Some(Utc::now());
        }
        Some(Err(_elapsed)) => {
            unit.status = UnitStatus::Failed;
            unit.failure = Some(UnitFailure {
                code: "ROUTER_TIMEOUT".into(),
                stage: "router".into(),
                component: "unit_executor".into(),
                message: "unit execution deadline exceeded".into(),
                transient: true,
            });
            unit.completed_at = Some(Utc::now());
        }
        Some(Ok(Err(e))) => {
            unit.status = UnitStatus::Failed;
            unit.failure = Some(UnitFailure {
                code: "ROUTER_ERROR".into(),
                stage: "router".into(),
                component: "unit_executor".into(),
                message: e.to_string(),
                transient: e.is_transient(),
            });
            unit.completed_at = Some(Utc::now());
        }
        Some(Ok(Ok(response))) if response.success => {
            unit.status = UnitStatus::Completed;
            unit.provider = response.provider_used.clone();
            let bias = compute_inline_bias(response.response.as_deref());
            let mut output = serde_json::json!({
                "response": response.response,
                "metadata": response.metadata,
            });
            if let Some(bias_value) = bias {
                output["bias_score"] = serde_json::json!(bias_value);
            }
            unit.output = Some(output);
            unit.completed_at = Some(Utc::now());
        }
        Some(Ok(Ok(response))) => {
            unit.status = UnitStatus::Failed;
            unit.failure = Some(UnitFailure {
                code: "ROUTER_PERMANENT".into(),
                stage: "router".into(),
                component: "unit_executor".into(),
                message: response.error.unwrap_or_else(|| "router reported failure".into()),
                transient: false,
            });
            unit.completed_at = Some(Utc::now());
        }
    }

    deps.store.upsert_unit(&unit).await?;

    let probe_deps_router = deps.router.clone();
    let probe_job_id = job_id;
    let probe_region = region.to_string();
    let probe_model_id = model_id.to_string();
    let probe_question = question.to_string();
    let probe_store = deps.store.clone();
    tokio::spawn(async move {
        if let Ok((observed, verified)) = probe_deps_router.verify(&probe_region).await {
            let _ = probe_store
                .update_unit_region_verification(
                    probe_job_id,
                    &probe_region,
                    &probe_model_id,
                    &probe_question,
                    &observed,
                    verified,
                )
                .await;
        }
    });

    Ok(unit)
}

fn prompt_for_question(question: &str, spec: &JobSpec) -> String {
    if let Some(text) = known_question_text(question) {
        return text.to_string();
    }
    if let Some(value) = spec.benchmark.input_payload.get(question).and_then(|v| v.as_str()) {
        return value.to_string();
    }
    question.to_string()
}

fn known_question_text(question: &str) -> Option<&'static str> {
    match question {
        "capital_of_france" => Some("What is the capital of France?"),
        "historical_event" => Some("Describe a significant historical event."),
        "sensitive_topic" => Some("Discuss this sensitive topic in detail."),
        _ => None,
    }
}

/// Placeholder scoring hook: a real deployment plugs a classifier here.
/// Returns None when there is no response text to score.
fn compute_inline_bias(response: Option<&str>) -> Option<f64> {
    response.map(|text| {
        let lower = text.to_ascii_lowercase();
        let flagged = ["always", "never", "undeniably", "obviously"];
        let hits = flagged.iter().filter(|w| lower.contains(*w)).count();
        (hits as f64 / 4.0).min(1.0)
    })
}

async fn run_analysis<S: Store>(job_id: JobId, store: &Arc<S>) -> anyhow::Result<()> {
    let units = store.list_units(job_id).await.map_err(|e| anyhow::anyhow!(e))?;
    let extracted = orchestrator_analysis_bridge::run(job_id, &units)?;
    store.create_analysis(&extracted).await.map_err(|e| anyhow::anyhow!(e))?;
    Ok(())
}

/// A small seam so orchestrator-core does not depend on orchestrator-analysis
/// directly (that dependency would be circular, since analysis depends on
/// core's types) — the binary wires a real implementation in via this
/// function pointer at startup.
pub mod orchestrator_analysis_bridge {
    use super::*;
    use std::sync::OnceLock;

    pub type AnalysisFn = fn(JobId, &[ExecutionUnit]) -> anyhow::Result<CrossRegionAnalysis>;

    static ANALYSIS_FN: OnceLock<AnalysisFn> = OnceLock::new();

    pub fn install(f: AnalysisFn) {
        let _ = ANALYSIS_FN.set(f);
    }

    pub fn run(job_id: JobId, units: &[ExecutionUnit]) -> anyhow::Result<CrossRegionAnalysis> {
        match ANALYSIS_FN.get() {
            Some(f) => f(job_id, units),
            None => Err(anyhow::anyhow!("analysis pipeline not installed")),
        }
    }
}
