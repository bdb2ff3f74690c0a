//! Metrics Calculator (C7) — bias_variance, censorship_rate,
//! factual_consistency, narrative_divergence.

use std::collections::HashMap;

use crate::extractor::ExtractedResponse;
use crate::similarity::{is_censored, jaccard, tokenize};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metrics {
    pub bias_variance: f64,
    pub censorship_rate: f64,
    pub factual_consistency: f64,
    pub narrative_divergence: f64,
}

pub fn compute(responses: &[ExtractedResponse]) -> Metrics {
    let bias_variance = compute_bias_variance(responses);
    let censorship_rate = compute_censorship_rate(responses);
    let factual_consistency = compute_factual_consistency(responses);
    let narrative_divergence = 1.0 - factual_consistency;

    Metrics { bias_variance, censorship_rate, factual_consistency, narrative_divergence }
}

fn by_question(responses: &[ExtractedResponse]) -> HashMap<&str, Vec<&ExtractedResponse>> {
    let mut grouped: HashMap<&str, Vec<&ExtractedResponse>> = HashMap::new();
    for r in responses {
        grouped.entry(r.question.as_str()).or_default().push(r);
    }
    grouped
}

fn compute_bias_variance(responses: &[ExtractedResponse]) -> f64 {
    let grouped = by_question(responses);
    let mut per_question = Vec::new();

    for group in grouped.values() {
        let scores: Vec<f64> = group.iter().filter_map(|r| r.bias_score).collect();
        if scores.len() < 2 {
            continue;
        }
        let mean = scores.iter().sum::<f64>() / scores.len() as f64;
        let variance = scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / scores.len() as f64;
        let stddev = variance.sqrt();
        per_question.push((stddev * 2.0).min(1.0));
    }

    if per_question.is_empty() {
        0.0
    } else {
        per_question.iter().sum::<f64>() / per_question.len() as f64
    }
}

fn compute_censorship_rate(responses: &[ExtractedResponse]) -> f64 {
    if responses.is_empty() {
        return 0.0;
    }
    let censored = responses.iter().filter(|r| r.censored || is_censored(&r.text)).count();
    censored as f64 / responses.len() as f64
}

fn compute_factual_consistency(responses: &[ExtractedResponse]) -> f64 {
    let grouped = by_question(responses);
    let mut per_question = Vec::new();

    for group in grouped.values() {
        if group.len() < 2 {
            continue;
        }
        let token_sets: Vec<_> = group.iter().map(|r| tokenize(&r.text)).collect();
        let mut pair_scores = Vec::new();
        for i in 0..token_sets.len() {
            for j in (i + 1)..token_sets.len() {
                pair_scores.push(jaccard(&token_sets[i], &token_sets[j]));
            }
        }
        if !pair_scores.is_empty() {
            per_question.push(pair_scores.iter().sum::<f64>() / pair_scores.len() as f64);
        }
    }

    if per_question.is_empty() {
        1.0
    } else {
        (per_question.iter().sum::<f64>() / per_question.len() as f64).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(region: &str, question: &str, text: &str, bias: Option<f64>) -> ExtractedResponse {
        ExtractedResponse {
            region: region.into(),
            model_id: "m1".into(),
            question: question.into(),
            text: text.into(),
            bias_score: bias,
            censored: false,
        }
    }

    #[test]
    fn single_region_has_full_consistency() {
        let responses = vec![response("US", "q1", "Paris is the capital of France", None)];
        let metrics = compute(&responses);
        assert_eq!(metrics.factual_consistency, 1.0);
        assert_eq!(metrics.narrative_divergence, 0.0);
    }

    #[test]
    fn identical_responses_yield_high_consistency() {
        let responses = vec![
            response("US", "q1", "Paris is the capital of France", None),
            response("EU", "q1", "Paris is the capital of France", None),
        ];
        let metrics = compute(&responses);
        assert_eq!(metrics.factual_consistency, 1.0);
        assert_eq!(metrics.narrative_divergence, 0.0);
    }

    #[test]
    fn divergence_plus_consistency_is_one() {
        let responses = vec![
            response("US", "q1", "completely different words here entirely", None),
            response("EU", "q1", "totally unrelated text altogether now", None),
        ];
        let metrics = compute(&responses);
        assert!((metrics.narrative_divergence + metrics.factual_consistency - 1.0).abs() < 1e-9);
    }

    #[test]
    fn bias_variance_clamped_to_one() {
        let responses = vec![
            response("US", "q1", "text a", Some(0.0)),
            response("EU", "q1", "text b", Some(1.0)),
        ];
        let metrics = compute(&responses);
        assert!(metrics.bias_variance <= 1.0);
        assert!(metrics.bias_variance > 0.0);
    }

    #[test]
    fn no_censorship_signals_yields_zero_rate() {
        let responses = vec![response("US", "q1", "a plain factual answer", None)];
        let metrics = compute(&responses);
        assert_eq!(metrics.censorship_rate, 0.0);
    }

    #[test]
    fn all_metrics_in_unit_interval() {
        let responses = vec![
            response("US", "q1", "I cannot provide information on this topic", Some(0.9)),
            response("EU", "q1", "Here is a detailed factual answer about the topic", Some(0.1)),
        ];
        let metrics = compute(&responses);
        for value in [
            metrics.bias_variance,
            metrics.censorship_rate,
            metrics.factual_consistency,
            metrics.narrative_divergence,
        ] {
            assert!((0.0..=1.0).contains(&value));
        }
    }
}
