use std::time::Duration;

use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::config::LlmConfig;
use crate::error::{LoreError, Result};

const HEALTH_TIMEOUT_SECS: u64 = 5;

/// Client for the local Ollama API.
///
/// One synchronous prompt/response call per chunk. Retry lives in the
/// scan orchestrator, not here.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    client: reqwest::Client,
    health_client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
    timeout_secs: u64,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<ModelTag>,
}

#[derive(Deserialize)]
struct ModelTag {
    name: String,
}

impl OllamaClient {
    pub fn new(config: &LlmConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| LoreError::Internal(format!("failed to build HTTP client: {e}")))?;

        let health_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(HEALTH_TIMEOUT_SECS))
            .build()
            .map_err(|e| LoreError::Internal(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            health_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
            timeout_secs: config.timeout_secs,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Send a prompt and return the raw generated text.
    ///
    /// Connection failures map to `BackendUnavailable`, elapsed timeouts
    /// to `BackendTimeout`.
    pub async fn generate(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: f32,
    ) -> Result<String> {
        if prompt.trim().is_empty() {
            return Err(LoreError::Validation("prompt cannot be empty".to_string()));
        }

        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model: &self.model,
            prompt,
            system,
            stream: false,
            options: GenerateOptions { temperature },
        };

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| self.map_transport(e))?;

        if response.status() != StatusCode::OK {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(LoreError::BackendUnavailable(format!(
                "ollama returned {status}: {}",
                normalize_err_body(&detail)
            )));
        }

        let parsed = response
            .json::<GenerateResponse>()
            .await
            .map_err(|e| LoreError::Parse(format!("bad generate response: {e}")))?;

        tracing::debug!(response_len = parsed.response.len(), "LLM response received");
        Ok(parsed.response)
    }

    /// Names of models the backend has pulled. Empty on any failure.
    pub async fn list_models(&self) -> Vec<String> {
        let url = format!("{}/api/tags", self.base_url);
        let mut request = self.health_client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => response
                .json::<TagsResponse>()
                .await
                .map(|tags| tags.models.into_iter().map(|m| m.name).collect())
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    /// Health check: is the backend reachable and the configured model
    /// installed? Returns (ok, human-readable message).
    pub async fn test_connection(&self) -> (bool, String) {
        let url = format!("{}/api/tags", self.base_url);
        let mut request = self.health_client.get(&url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) if response.status() == StatusCode::OK => {
                let models: Vec<String> = response
                    .json::<TagsResponse>()
                    .await
                    .map(|tags| tags.models.into_iter().map(|m| m.name).collect())
                    .unwrap_or_default();

                if models.iter().any(|m| m == &self.model) {
                    (
                        true,
                        format!("Connected to Ollama. Model '{}' is available.", self.model),
                    )
                } else {
                    (
                        false,
                        format!(
                            "Ollama is running, but model '{}' is not installed. Available: {}",
                            self.model,
                            models.join(", ")
                        ),
                    )
                }
            }
            Ok(response) => (
                false,
                format!("Ollama responded with status {}", response.status()),
            ),
            Err(e) => (
                false,
                format!("Cannot connect to Ollama at {}: {e}", self.base_url),
            ),
        }
    }

    fn map_transport(&self, error: reqwest::Error) -> LoreError {
        if error.is_timeout() {
            LoreError::BackendTimeout {
                timeout_secs: self.timeout_secs,
            }
        } else if error.is_connect() {
            LoreError::BackendUnavailable(format!("cannot reach {}: {error}", self.base_url))
        } else {
            LoreError::Http(error)
        }
    }
}

fn normalize_err_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "<empty body>".to_string();
    }

    if let Ok(json) = serde_json::from_str::<serde_json::Value>(trimmed) {
        if let Some(err) = json.get("error").and_then(|v| v.as_str()) {
            return err.to_string();
        }
    }

    trimmed.to_string()
}
