use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{PipelineError, Result};

/// One model invocation. Both configured model identities (polish and
/// summarize) go through this same call shape.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// Model identifier as known to the serving runtime.
    pub model: String,
    pub prompt: String,
    pub temperature: f64,
    /// Output-length ceiling in tokens. `None` leaves it to the runtime.
    pub max_tokens: Option<u32>,
    /// Stop sequences that terminate generation.
    pub stop: Vec<String>,
}

impl GenerationRequest {
    pub fn new(model: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            prompt: prompt.into(),
            temperature: 0.1,
            max_tokens: None,
            stop: Vec::new(),
        }
    }
}

/// The language-model collaborator. Stages depend on this trait rather than
/// a concrete client so the retry and abort contracts can be exercised with
/// a scripted implementation.
#[async_trait]
pub trait TextModel: Send + Sync {
    /// Generate text for the request, or fail with `ModelUnavailable` when
    /// the service cannot be reached or returns an unusable response.
    async fn generate(&self, request: &GenerationRequest) -> Result<String>;
}

/// Configuration for the Ollama-style model service.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OllamaConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

impl Default for OllamaConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:11434".to_string(),
            timeout_secs: 600,
        }
    }
}

/// HTTP client for a local Ollama server's `/api/generate` endpoint.
pub struct OllamaClient {
    client: Client,
    config: OllamaConfig,
}

#[derive(Debug, Serialize)]
struct GenerateBody<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions<'a>,
}

#[derive(Debug, Serialize)]
struct GenerateOptions<'a> {
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    stop: &'a Vec<String>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

impl OllamaClient {
    pub fn new(config: OllamaConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/generate", self.config.base_url.trim_end_matches('/'))
    }

    fn unavailable(&self, model: &str, reason: impl std::fmt::Display) -> PipelineError {
        PipelineError::ModelUnavailable {
            model: model.to_string(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl TextModel for OllamaClient {
    async fn generate(&self, request: &GenerationRequest) -> Result<String> {
        let body = GenerateBody {
            model: &request.model,
            prompt: &request.prompt,
            stream: false,
            options: GenerateOptions {
                temperature: request.temperature,
                num_predict: request.max_tokens,
                stop: &request.stop,
            },
        };

        debug!(
            model = %request.model,
            prompt_chars = request.prompt.len(),
            "Sending generation request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| self.unavailable(&request.model, e))?;

        if !response.status().is_success() {
            let status = response.status();
            let detail = response.text().await.unwrap_or_default();
            return Err(self.unavailable(&request.model, format!("HTTP {status}: {detail}")));
        }

        let parsed: GenerateResponse = response
            .json()
            .await
            .map_err(|e| self.unavailable(&request.model, format!("bad response body: {e}")))?;

        let text = parsed.response.trim().to_string();
        if text.is_empty() {
            return Err(self.unavailable(&request.model, "empty response"));
        }
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_body_serialization() {
        let stop = vec!["### Instruction:".to_string()];
        let body = GenerateBody {
            model: "medllama2",
            prompt: "summarize",
            stream: false,
            options: GenerateOptions {
                temperature: 0.05,
                num_predict: Some(500),
                stop: &stop,
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["model"], "medllama2");
        assert_eq!(json["stream"], false);
        assert_eq!(json["options"]["num_predict"], 500);
        assert_eq!(json["options"]["stop"][0], "### Instruction:");
    }

    #[test]
    fn test_endpoint_strips_trailing_slash() {
        let client = OllamaClient::new(OllamaConfig {
            base_url: "http://localhost:11434/".to_string(),
            timeout_secs: 5,
        })
        .unwrap();
        assert_eq!(client.endpoint(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn test_generate_response_defaults_empty() {
        let parsed: GenerateResponse = serde_json::from_str("{}").unwrap();
        assert!(parsed.response.is_empty());
    }
}
