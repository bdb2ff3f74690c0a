//! Difference Analyzer (C9) — locates cross-region Key Differences along
//! political, censorship, factual, and tone dimensions.

use std::collections::HashMap;

use orchestrator_core::types::{KeyDifference, Severity};

use crate::extractor::ExtractedResponse;
use crate::similarity::{is_censored, jaccard, tokenize, tone_score};

const POLITICAL_FAMILIES: &[(&str, &[&str])] = &[
    ("democracy", &["democracy", "democratic", "election", "vote", "voting"]),
    ("government", &["government", "regime", "state", "authority", "administration"]),
    ("protest", &["protest", "demonstration", "dissent", "unrest", "uprising"]),
    ("censorship", &["censorship", "censor", "banned", "suppressed", "restricted"]),
    ("human_rights", &["human rights", "freedom", "liberty", "oppression", "repression"]),
];

fn severity_for(contributing_censored: bool, variation_count: usize) -> Severity {
    if contributing_censored {
        Severity::Critical
    } else if variation_count >= 3 {
        Severity::High
    } else if variation_count >= 2 {
        Severity::Medium
    } else {
        Severity::Low
    }
}

pub fn analyze(responses: &[ExtractedResponse]) -> Vec<KeyDifference> {
    let mut by_question: HashMap<&str, Vec<&ExtractedResponse>> = HashMap::new();
    for r in responses {
        by_question.entry(r.question.as_str()).or_default().push(r);
    }

    let mut differences = Vec::new();
    for group in by_question.values() {
        if group.len() < 2 {
            continue;
        }
        differences.extend(political_stance(group));
        if let Some(d) = censorship_difference(group) {
            differences.push(d);
        }
        if let Some(d) = factual_accuracy(group) {
            differences.push(d);
        }
        if let Some(d) = tone_sentiment(group) {
            differences.push(d);
        }
    }
    differences
}

fn political_stance(group: &[&ExtractedResponse]) -> Vec<KeyDifference> {
    let mut out = Vec::new();
    for (family, keywords) in POLITICAL_FAMILIES {
        let mut counts: HashMap<String, usize> = HashMap::new();
        for r in group {
            let lower = r.text.to_ascii_lowercase();
            let count = keywords.iter().filter(|k| lower.contains(*k)).count();
            counts.insert(r.region.clone(), count);
        }
        let max = *counts.values().max().unwrap_or(&0);
        let min = *counts.values().min().unwrap_or(&0);
        if max.saturating_sub(min) > 1 {
            let any_censored = group.iter().any(|r| r.censored || is_censored(&r.text));
            let variations: HashMap<String, String> = counts
                .into_iter()
                .map(|(region, count)| (region, format!("{count} keyword mentions")))
                .collect();
            let distinct_variations = variations.values().collect::<std::collections::HashSet<_>>().len();
            out.push(KeyDifference {
                dimension: format!("political_stance_{family}"),
                variations,
                severity: severity_for(any_censored, distinct_variations),
            });
        }
    }
    out
}

fn censorship_difference(group: &[&ExtractedResponse]) -> Option<KeyDifference> {
    let censored: Vec<&&ExtractedResponse> =
        group.iter().filter(|r| r.censored || is_censored(&r.text)).collect();
    let uncensored: Vec<&&ExtractedResponse> =
        group.iter().filter(|r| !(r.censored || is_censored(&r.text))).collect();

    if censored.is_empty() || uncensored.is_empty() {
        return None;
    }

    let severity = if censored.len() == 1 || uncensored.len() == 1 {
        Severity::Medium
    } else {
        Severity::High
    };

    let mut variations = HashMap::new();
    for r in &censored {
        variations.insert(r.region.clone(), "refused to answer".to_string());
    }
    for r in &uncensored {
        variations.insert(r.region.clone(), "answered directly".to_string());
    }

    Some(KeyDifference { dimension: "censorship".into(), variations, severity })
}

fn factual_accuracy(group: &[&ExtractedResponse]) -> Option<KeyDifference> {
    let token_sets: Vec<_> = group.iter().map(|r| tokenize(&r.text)).collect();
    let mut scores = Vec::new();
    for i in 0..token_sets.len() {
        for j in (i + 1)..token_sets.len() {
            scores.push(jaccard(&token_sets[i], &token_sets[j]));
        }
    }
    if scores.is_empty() {
        return None;
    }
    let avg = scores.iter().sum::<f64>() / scores.len() as f64;
    if avg >= 0.3 {
        return None;
    }

    let severity = if avg < 0.15 { Severity::Critical } else { Severity::High };
    let variations: HashMap<String, String> = group
        .iter()
        .map(|r| (r.region.clone(), format!("{:.0} chars", r.text.len())))
        .collect();
    Some(KeyDifference { dimension: "factual_accuracy".into(), variations, severity })
}

fn tone_sentiment(group: &[&ExtractedResponse]) -> Option<KeyDifference> {
    let scores: HashMap<String, f64> =
        group.iter().map(|r| (r.region.clone(), tone_score(&r.text))).collect();
    let max = scores.values().cloned().fold(f64::MIN, f64::max);
    let min = scores.values().cloned().fold(f64::MAX, f64::min);
    let range = max - min;
    if range <= 0.5 {
        return None;
    }

    let severity = if range > 0.7 { Severity::High } else { Severity::Medium };
    let variations =
        scores.into_iter().map(|(region, score)| (region, format!("{score:.2} tone score"))).collect();
    Some(KeyDifference { dimension: "tone_sentiment".into(), variations, severity })
}
