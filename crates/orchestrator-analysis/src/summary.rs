//! Summary Generator (C11) — renders a deterministic Markdown summary with
//! an optional pluggable LLM override behind the `SummaryProvider` trait.

use orchestrator_core::ports::{CrossRegionAnalysisInputs, SummaryProvider};
use orchestrator_core::types::{KeyDifference, RiskAssessment, RiskLevel, Severity};

const LLM_MIN_LENGTH: usize = 300;

pub fn recommendation(inputs: &CrossRegionAnalysisInputs) -> RiskLevel {
    let has_critical = inputs.risks.iter().any(|r| r.severity == Severity::Critical);
    let has_high = inputs.risks.iter().any(|r| r.severity == Severity::High);
    let has_medium = inputs.risks.iter().any(|r| r.severity == Severity::Medium);

    if has_critical {
        RiskLevel::Critical
    } else if has_high {
        RiskLevel::High
    } else if has_medium {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

fn opening_statement(inputs: &CrossRegionAnalysisInputs) -> &'static str {
    match (
        inputs.censorship_rate > 0.3,
        inputs.bias_variance > 0.5,
        inputs.factual_consistency < 0.5,
    ) {
        (true, true, _) => {
            "This analysis reveals significant censorship combined with substantial bias variance across regions."
        }
        (true, false, _) => "This analysis reveals notable censorship signals across one or more regions.",
        (false, true, _) => "This analysis reveals substantial bias variance across regions.",
        (false, false, true) => "This analysis reveals meaningful factual divergence across regions.",
        (false, false, false) => "This analysis found broadly consistent responses across the examined regions.",
    }
}

fn conclusion(inputs: &CrossRegionAnalysisInputs, level: RiskLevel) -> &'static str {
    match level {
        RiskLevel::Critical => {
            "The combination of risks identified warrants immediate review before this model set is relied upon."
        }
        RiskLevel::High => "The identified risks merit close attention and targeted follow-up investigation.",
        RiskLevel::Medium => "Some divergence was observed; routine monitoring is recommended.",
        RiskLevel::Low => {
            if inputs.key_differences.is_empty() {
                "No material cross-region divergence was identified in this run."
            } else {
                "Minor divergence was observed but does not rise to a level of concern."
            }
        }
    }
}

fn key_metrics_block(inputs: &CrossRegionAnalysisInputs) -> String {
    format!(
        "## Key Metrics\n\n- Bias variance: {:.2} ({:.0}%)\n- Censorship rate: {:.2} ({:.0}%)\n- Factual consistency: {:.2} ({:.0}%)\n- Narrative divergence: {:.2} ({:.0}%)\n",
        inputs.bias_variance,
        inputs.bias_variance * 100.0,
        inputs.censorship_rate,
        inputs.censorship_rate * 100.0,
        inputs.factual_consistency,
        inputs.factual_consistency * 100.0,
        inputs.narrative_divergence,
        inputs.narrative_divergence * 100.0,
    )
}

fn key_findings_block(differences: &[KeyDifference]) -> String {
    if differences.is_empty() {
        return "## Key Findings\n\nNo significant cross-region differences were identified.\n".to_string();
    }

    let mut top: Vec<&KeyDifference> = differences
        .iter()
        .filter(|d| matches!(d.severity, Severity::Critical | Severity::High))
        .collect();
    top.sort_by_key(|d| std::cmp::Reverse(severity_rank(d.severity)));
    top.truncate(3);

    let mut out = String::from("## Key Findings\n\n");
    if top.is_empty() {
        out.push_str("No critical or high-severity differences were identified.\n");
    } else {
        for d in top {
            out.push_str(&format!("- **{}** ({:?} severity)\n", d.dimension, d.severity));
        }
    }
    out
}

fn severity_rank(s: Severity) -> u8 {
    match s {
        Severity::Low => 0,
        Severity::Medium => 1,
        Severity::High => 2,
        Severity::Critical => 3,
    }
}

fn identified_risks_block(risks: &[RiskAssessment]) -> String {
    if risks.is_empty() {
        return "## Identified Risks\n\nNone identified.\n".to_string();
    }

    let mut out = String::from("## Identified Risks\n\n");
    for severity in [Severity::Critical, Severity::High, Severity::Medium] {
        let group: Vec<&RiskAssessment> = risks.iter().filter(|r| r.severity == severity).collect();
        if group.is_empty() {
            continue;
        }
        out.push_str(&format!("### {severity:?}\n\n"));
        for r in group {
            out.push_str(&format!("- {:?}: {}\n", r.risk_type, r.description));
        }
    }
    out
}

pub fn render_template(inputs: &CrossRegionAnalysisInputs) -> String {
    let level = recommendation(inputs);
    let mut body = String::new();
    body.push_str(opening_statement(inputs));
    body.push_str("\n\n");
    body.push_str(&key_metrics_block(inputs));
    body.push('\n');
    body.push_str(&key_findings_block(&inputs.key_differences));
    body.push('\n');
    body.push_str(&identified_risks_block(&inputs.risks));
    body.push_str("\n## Conclusion\n\n");
    body.push_str(conclusion(inputs, level));
    body.push('\n');

    format!("**Risk Level: {}**\n\n{}", level.label(), body)
}

pub struct TemplateSummaryProvider;

#[async_trait::async_trait]
impl SummaryProvider for TemplateSummaryProvider {
    async fn summarize(&self, _inputs: &CrossRegionAnalysisInputs) -> orchestrator_core::Result<Option<String>> {
        Ok(None)
    }
}

/// Produces the final summary: tries the configured provider first, falls
/// back to the deterministic template on failure or short output.
pub async fn generate(
    inputs: &CrossRegionAnalysisInputs,
    provider: &dyn SummaryProvider,
) -> String {
    match provider.summarize(inputs).await {
        Ok(Some(text)) if text.len() >= LLM_MIN_LENGTH => {
            let level = recommendation(inputs);
            format!("**Risk Level: {}**\n\n{}", level.label(), text)
        }
        _ => render_template(inputs),
    }
}
