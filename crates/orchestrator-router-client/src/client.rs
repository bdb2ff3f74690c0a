//! HTTP client for the inference router, grounded on the same request-body
//! shape and error-mapping conventions as the Anthropic client this crate
//! was adapted from.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use orchestrator_core::error::{OrchestratorError, Result};
use orchestrator_core::ports::{InferenceRequest, InferenceResponse, RegionProbe, RouterClient};

pub struct HttpRouterClient {
    base_url: String,
    api_key: Option<String>,
    client: reqwest::Client,
}

impl HttpRouterClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        HttpRouterClient { base_url: base_url.into(), api_key: None, client: reqwest::Client::new() }
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let base_url = std::env::var("INFERENCE_ROUTER_URL")
            .map_err(|_| anyhow::anyhow!("INFERENCE_ROUTER_URL not set"))?;
        let mut client = HttpRouterClient::new(base_url);
        if let Ok(key) = std::env::var("INFERENCE_ROUTER_API_KEY") {
            client = client.with_api_key(key);
        }
        Ok(client)
    }
}

#[derive(Serialize)]
struct RouterRequestBody<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_tokens: u32,
    region_preference: &'a str,
    cost_priority: bool,
}

#[derive(Deserialize)]
struct RouterResponseBody {
    success: bool,
    response: Option<String>,
    provider_used: Option<String>,
    error: Option<String>,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    inference_sec: f64,
}

#[async_trait]
impl RouterClient for HttpRouterClient {
    async fn infer(&self, req: InferenceRequest, trace_id: &str) -> Result<InferenceResponse> {
        let body = RouterRequestBody {
            model: &req.model,
            prompt: &req.prompt,
            temperature: req.temperature,
            max_tokens: req.max_tokens,
            region_preference: &req.region_preference,
            cost_priority: req.cost_priority,
        };

        let mut request = self
            .client
            .post(format!("{}/v1/infer", self.base_url))
            .header("X-Trace-Id", trace_id)
            .json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| OrchestratorError::Router {
            message: e.to_string(),
            transient: e.is_timeout() || e.is_connect(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let transient = status.is_server_error();
            let text = response.text().await.unwrap_or_default();
            return Err(OrchestratorError::Router {
                message: format!("router returned {status}: {text}"),
                transient,
            });
        }

        let parsed: RouterResponseBody = response.json().await.map_err(|e| OrchestratorError::Router {
            message: format!("failed to decode router response: {e}"),
            transient: false,
        })?;

        Ok(InferenceResponse {
            success: parsed.success,
            response: parsed.response,
            provider_used: parsed.provider_used,
            error: parsed.error,
            metadata: parsed.metadata,
            inference_sec: parsed.inference_sec,
        })
    }
}

#[derive(serde::Deserialize)]
struct ProbeResponse {
    observed_region: String,
    verified: bool,
}

#[async_trait]
impl RegionProbe for HttpRouterClient {
    /// Never blocks the main execution path; the unit executor fires this
    /// with `tokio::spawn` and does not await it before returning.
    async fn verify(&self, claimed_region: &str) -> Result<(String, bool)> {
        let response = self
            .client
            .get(format!("{}/v1/region-probe", self.base_url))
            .query(&[("claimed_region", claimed_region)])
            .send()
            .await
            .map_err(|e| OrchestratorError::Router { message: e.to_string(), transient: true })?;

        let parsed: ProbeResponse = response
            .json()
            .await
            .map_err(|e| OrchestratorError::Router { message: e.to_string(), transient: false })?;
        Ok((parsed.observed_region, parsed.verified))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_client_has_no_api_key() {
        let client = HttpRouterClient::new("http://localhost:9000");
        assert!(client.api_key.is_none());
    }

    #[test]
    fn with_api_key_sets_key() {
        let client = HttpRouterClient::new("http://localhost:9000").with_api_key("secret");
        assert_eq!(client.api_key.as_deref(), Some("secret"));
    }
}
