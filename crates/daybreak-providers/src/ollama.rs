//! Ollama provider.
//!
//! Talks to a local Ollama server through `/api/generate` (non-streaming).
//! Every request carries the configured timeout so a stuck model cannot hold
//! a pipeline stage forever.

use std::time::Duration;

use async_trait::async_trait;
use daybreak_core::config::InferenceConfig;
use daybreak_core::error::{DaybreakError, Result};
use daybreak_core::traits::InferenceProvider;
use serde_json::{Value, json};

/// Local LLM served by Ollama.
pub struct OllamaProvider {
    /// Base URL (e.g., "http://localhost:11434").
    base_url: String,
    /// Model tag (e.g., "mistral:7b").
    model: String,
    /// Upper bound for one generation.
    timeout: Duration,
    /// `num_predict` sent with each request.
    max_tokens: u32,
    /// HTTP client.
    client: reqwest::Client,
}

impl OllamaProvider {
    /// Create from the `[inference]` config section.
    pub fn from_config(config: &InferenceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DaybreakError::Http(format!("ollama client: {e}")))?;
        Ok(Self {
            base_url: config.host.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            max_tokens: config.max_tokens,
            client,
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> DaybreakError {
        if e.is_timeout() {
            DaybreakError::Timeout("ollama".into(), self.timeout.as_secs())
        } else if e.is_connect() {
            DaybreakError::adapter("ollama", format!("cannot connect to {}", self.base_url))
        } else {
            DaybreakError::Http(format!("ollama: {e}"))
        }
    }
}

#[async_trait]
impl InferenceProvider for OllamaProvider {
    fn name(&self) -> &str {
        "ollama"
    }

    async fn generate(&self, prompt: &str, temperature: f32) -> Result<String> {
        let body = json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "options": {
                "temperature": temperature,
                "num_predict": self.max_tokens,
            },
        });

        let url = format!("{}/api/generate", self.base_url);
        let resp = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(DaybreakError::adapter(
                "ollama",
                format!("API error {status}: {text}"),
            ));
        }

        let json: Value = resp
            .json()
            .await
            .map_err(|e| DaybreakError::Http(format!("ollama: {e}")))?;

        let text = json["response"].as_str().unwrap_or("").trim().to_string();
        if text.is_empty() {
            tracing::warn!("⚠️ Ollama returned an empty response");
            return Err(DaybreakError::adapter("ollama", "empty response"));
        }

        tracing::info!("🤖 Ollama response received ({} chars)", text.chars().count());
        Ok(text)
    }

    async fn health_check(&self) -> Result<bool> {
        let url = format!("{}/api/tags", self.base_url);
        let resp = match self.client.get(&url).send().await {
            Ok(r) if r.status().is_success() => r,
            Ok(r) => {
                tracing::warn!("⚠️ Ollama health check returned {}", r.status());
                return Ok(false);
            }
            Err(e) => {
                tracing::warn!("⚠️ Ollama unreachable at {}: {e}", self.base_url);
                return Ok(false);
            }
        };

        let json: Value = resp.json().await.unwrap_or_default();
        let models: Vec<&str> = json["models"]
            .as_array()
            .map(|arr| arr.iter().filter_map(|m| m["name"].as_str()).collect())
            .unwrap_or_default();

        // "mistral:7b" also matches "mistral:7b-instruct" and friends.
        let wanted_base = self.model.split(':').next().unwrap_or(&self.model);
        let found = models
            .iter()
            .any(|m| *m == self.model || m.split(':').next() == Some(wanted_base));
        if !found {
            tracing::warn!(
                "⚠️ Model {} not found on Ollama. Available: {}",
                self.model,
                models.join(", ")
            );
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn provider_for(server: &MockServer) -> OllamaProvider {
        OllamaProvider::from_config(&InferenceConfig {
            host: server.uri(),
            model: "mistral:7b".into(),
            timeout_secs: 5,
            max_tokens: 100,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_generate_returns_trimmed_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"response": "  Markets look calm.\n", "done": true})),
            )
            .mount(&server)
            .await;

        let provider = provider_for(&server);
        let text = provider.generate("hello", 0.3).await.unwrap();
        assert_eq!(text, "Markets look calm.");
    }

    #[tokio::test]
    async fn test_empty_response_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"response": "   "})))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate("hello", 0.3).await.unwrap_err();
        assert!(err.to_string().contains("empty response"));
    }

    #[tokio::test]
    async fn test_server_error_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/generate"))
            .respond_with(ResponseTemplate::new(500).set_body_string("model not loaded"))
            .mount(&server)
            .await;

        let err = provider_for(&server).generate("hello", 0.3).await.unwrap_err();
        assert!(matches!(err, DaybreakError::Adapter { .. }));
        assert!(err.to_string().contains("500"));
    }

    #[tokio::test]
    async fn test_health_check_matches_model_family() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "models": [{"name": "mistral:7b-instruct"}, {"name": "llama3.2:latest"}]
            })))
            .mount(&server)
            .await;

        assert!(provider_for(&server).health_check().await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_missing_model() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/tags"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"models": [{"name": "phi3:mini"}]})),
            )
            .mount(&server)
            .await;

        assert!(!provider_for(&server).health_check().await.unwrap());
    }
}
