//! Response Extractor (C6) — normalizes per-unit output payloads into a
//! flat, region-keyed response list for the metrics stage.

use orchestrator_core::types::ExecutionUnit;

#[derive(Debug, Clone)]
pub struct ExtractedResponse {
    pub region: String,
    pub model_id: String,
    pub question: String,
    pub text: String,
    pub bias_score: Option<f64>,
    pub censored: bool,
}

pub fn extract(units: &[ExecutionUnit]) -> anyhow::Result<Vec<ExtractedResponse>> {
    let mut out = Vec::new();
    for unit in units {
        let Some(output) = &unit.output else { continue };
        let text = response_text(output);
        let Some(text) = text else { continue };
        if text.is_empty() {
            continue;
        }

        let bias_score = output.get("bias_score").and_then(|v| v.as_f64());
        let censored = output
            .get("censored")
            .and_then(|v| v.as_bool())
            .unwrap_or(false);

        out.push(ExtractedResponse {
            region: unit.region.clone(),
            model_id: unit.model_id.clone(),
            question: unit.question.clone(),
            text,
            bias_score,
            censored,
        });
    }

    if out.is_empty() {
        anyhow::bail!("no regions yielded a usable response");
    }
    Ok(out)
}

fn response_text(output: &serde_json::Value) -> Option<String> {
    if let Some(s) = output.get("response").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    if let Some(arr) = output.get("responses").and_then(|v| v.as_array()) {
        if let Some(first) = arr.first().and_then(|v| v.as_str()) {
            return Some(first.to_string());
        }
    }
    if let Some(s) = output.get("text").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    if let Some(s) = output.get("content").and_then(|v| v.as_str()) {
        return Some(s.to_string());
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use orchestrator_core::types::*;
    use uuid::Uuid;

    fn unit(region: &str, output: serde_json::Value) -> ExecutionUnit {
        ExecutionUnit {
            job_id: Uuid::new_v4(),
            region: region.to_string(),
            model_id: "m1".into(),
            question: "q1".into(),
            provider: None,
            status: UnitStatus::Completed,
            started_at: None,
            completed_at: None,
            output: Some(output),
            receipt: None,
            failure: None,
            observed_region: None,
            region_verified: None,
        }
    }

    #[test]
    fn extracts_response_field() {
        let units = vec![unit("US", serde_json::json!({"response": "hello"}))];
        let extracted = extract(&units).unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].text, "hello");
    }

    #[test]
    fn falls_back_through_field_order() {
        let units = vec![unit("US", serde_json::json!({"content": "fallback"}))];
        let extracted = extract(&units).unwrap();
        assert_eq!(extracted[0].text, "fallback");
    }

    #[test]
    fn empty_responses_are_dropped() {
        let units = vec![
            unit("US", serde_json::json!({"response": ""})),
            unit("EU", serde_json::json!({"response": "present"})),
        ];
        let extracted = extract(&units).unwrap();
        assert_eq!(extracted.len(), 1);
        assert_eq!(extracted[0].region, "EU");
    }

    #[test]
    fn errors_when_nothing_usable() {
        let units = vec![unit("US", serde_json::json!({}))];
        assert!(extract(&units).is_err());
    }
}
