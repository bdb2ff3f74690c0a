pub mod differences;
pub mod extractor;
pub mod metrics;
pub mod risk;
pub mod summary;

use chrono::Utc;
use orchestrator_core::ports::CrossRegionAnalysisInputs;
use orchestrator_core::types::{CrossRegionAnalysis, ExecutionUnit, JobId};

/// Runs the full five-stage pipeline synchronously (C6-C11) and returns the
/// persisted-ready Cross-Region Analysis record. Summary generation here
/// uses the template-only path; a caller wanting the LLM-assisted path
/// should call `summary::generate` directly with a live provider.
pub fn run(job_id: JobId, units: &[ExecutionUnit]) -> anyhow::Result<CrossRegionAnalysis> {
    let responses = extractor::extract(units)?;
    let computed = metrics::compute(&responses);
    let key_differences = differences::analyze(&responses);
    let risks = risk::assess(&computed, &key_differences);

    let inputs = CrossRegionAnalysisInputs {
        bias_variance: computed.bias_variance,
        censorship_rate: computed.censorship_rate,
        factual_consistency: computed.factual_consistency,
        narrative_divergence: computed.narrative_divergence,
        key_differences: key_differences.clone(),
        risks: risks.clone(),
    };
    let summary_text = summary::render_template(&inputs);

    Ok(CrossRegionAnalysis {
        job_id,
        bias_variance: computed.bias_variance,
        censorship_rate: computed.censorship_rate,
        factual_consistency: computed.factual_consistency,
        narrative_divergence: computed.narrative_divergence,
        key_differences,
        risks,
        summary: summary_text,
        created_at: Utc::now(),
    })
}

/// Installs this crate's `run` as the engine's analysis implementation.
/// Call once at process startup before the queue consumer is started.
pub fn install() {
    orchestrator_core::executor::orchestrator_analysis_bridge::install(run);
}
