use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{GenerationError, GenerationRequest, TextGenerator, endpoint, error_for_status};

/// Generator backed by an Ollama runtime's `/api/generate` route.
pub struct OllamaGenerator {
    http: Client,
    base_url: String,
}

impl OllamaGenerator {
    /// Wrap an HTTP client pointed at `base_url`.
    pub fn new(http: Client, base_url: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
        }
    }

    fn url(&self) -> String {
        endpoint(&self.base_url, "api/generate")
    }
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    done: bool,
}

#[async_trait]
impl TextGenerator for OllamaGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let mut options = Map::new();
        options.insert("temperature".into(), json!(request.temperature));
        options.insert("num_predict".into(), json!(request.max_new_tokens));
        if let Some(penalty) = request.repetition_penalty {
            options.insert("repeat_penalty".into(), json!(penalty));
        }
        let payload = json!({
            "model": request.model,
            "prompt": request.prompt,
            "stream": false,
            "raw": true,
            "options": Value::Object(options),
        });

        let url = self.url();
        let response = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Ollama at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(error_for_status("Ollama", &url, response).await);
        }

        let body: OllamaResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Ollama response: {error}"))
        })?;

        if !body.done {
            return Err(GenerationError::InvalidResponse(
                "Ollama response incomplete (streaming not supported)".into(),
            ));
        }

        Ok(body.response.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn generator(server: &MockServer) -> OllamaGenerator {
        let http = Client::builder()
            .user_agent("rustysum-test")
            .build()
            .expect("client");
        OllamaGenerator::new(http, server.base_url())
    }

    #[tokio::test]
    async fn ollama_generator_sends_decoding_options() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/api/generate")
                    .body_contains("\"num_predict\":120")
                    .body_contains("\"repeat_penalty\"");
                then.status(200).json_body(json!({
                    "response": "  - key point  ",
                    "done": true
                }));
            })
            .await;

        let text = generator(&server)
            .generate(
                GenerationRequest::new("mistral", "[INST] text [/INST]", 120)
                    .with_repetition_penalty(1.15),
            )
            .await
            .expect("generation");

        mock.assert();
        assert_eq!(text, "- key point");
    }

    #[tokio::test]
    async fn ollama_generator_reports_error_status() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(500).body("out of memory");
            })
            .await;

        let error = generator(&server)
            .generate(GenerationRequest::new("mistral", "prompt", 10))
            .await
            .expect_err("error response");

        assert!(matches!(
            error,
            GenerationError::GenerationFailed(ref message) if message.contains("500")
        ));
    }

    #[tokio::test]
    async fn ollama_generator_rejects_incomplete_response() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/api/generate");
                then.status(200)
                    .json_body(json!({ "response": "partial", "done": false }));
            })
            .await;

        let error = generator(&server)
            .generate(GenerationRequest::new("mistral", "prompt", 10))
            .await
            .expect_err("incomplete response");

        assert!(matches!(error, GenerationError::InvalidResponse(_)));
    }
}
