//! Similarity & Classifier (C8) — tokenization, Jaccard similarity,
//! censorship-phrase detection, and a simple tone score.

use std::collections::HashSet;

const CENSORSHIP_PHRASES: &[&str] = &[
    "i cannot",
    "i can't",
    "i'm not able to",
    "i am not able to",
    "i'm unable to",
    "i am unable to",
    "i don't have information",
    "i do not have information",
    "i cannot provide",
    "i can't provide",
    "i'm not allowed",
    "i am not allowed",
    "this topic is sensitive",
    "i cannot discuss",
    "i can't discuss",
    "i'm not permitted",
    "i am not permitted",
    "i decline to answer",
    "i must decline",
    "i cannot answer",
    "i can't answer",
];

const POSITIVE_WORDS: &[&str] = &[
    "good", "great", "positive", "success", "achieve", "progress", "benefit", "improve", "strong",
    "effective",
];
const NEGATIVE_WORDS: &[&str] = &[
    "bad", "poor", "negative", "failure", "crisis", "decline", "harm", "worsen", "weak", "ineffective",
];

pub fn tokenize(text: &str) -> HashSet<String> {
    text.to_ascii_lowercase()
        .chars()
        .map(|c| if ".,!?;:()[]{}\"'".contains(c) { ' ' } else { c })
        .collect::<String>()
        .split_whitespace()
        .filter(|t| t.len() >= 3)
        .map(String::from)
        .collect()
}

pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.union(b).count();
    intersection as f64 / union as f64
}

pub fn is_censored(text: &str) -> bool {
    let lower = text.to_ascii_lowercase();
    CENSORSHIP_PHRASES.iter().any(|phrase| lower.contains(phrase))
}

pub fn tone_score(text: &str) -> f64 {
    let lower = text.to_ascii_lowercase();
    let pos = POSITIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    let neg = NEGATIVE_WORDS.iter().filter(|w| lower.contains(*w)).count() as f64;
    if pos + neg == 0.0 {
        0.0
    } else {
        (pos - neg) / (pos + neg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenize_drops_short_tokens_and_punctuation() {
        let tokens = tokenize("The cat, a dog. Running!");
        assert!(tokens.contains("the"));
        assert!(tokens.contains("cat"));
        assert!(tokens.contains("dog"));
        assert!(tokens.contains("running"));
        assert!(!tokens.contains("a"));
    }

    #[test]
    fn jaccard_identical_sets_is_one() {
        let a = tokenize("Paris is the capital of France");
        let b = tokenize("Paris is the capital of France");
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn jaccard_disjoint_sets_is_zero() {
        let a = tokenize("completely unrelated words here");
        let b = tokenize("totally different text entirely");
        assert_eq!(jaccard(&a, &b), 0.0);
    }

    #[test]
    fn jaccard_both_empty_is_one() {
        let a: std::collections::HashSet<String> = HashSet::new();
        let b: std::collections::HashSet<String> = HashSet::new();
        assert_eq!(jaccard(&a, &b), 1.0);
    }

    #[test]
    fn detects_refusal_phrases() {
        assert!(is_censored("I cannot provide information on this."));
        assert!(!is_censored("Paris is the capital of France."));
    }

    #[test]
    fn tone_score_neutral_when_no_words() {
        assert_eq!(tone_score("The weather today is mild."), 0.0);
    }
}
