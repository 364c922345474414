use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;

use super::{GenerationError, GenerationRequest, TextGenerator, endpoint, error_for_status};

/// Generator backed by the Gemini `generateContent` API.
pub struct GeminiGenerator {
    http: Client,
    base_url: String,
    api_key: String,
}

impl GeminiGenerator {
    /// Wrap an HTTP client pointed at `base_url`, authenticating with `api_key`.
    pub fn new(http: Client, base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_key: api_key.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<Content>,
}

#[derive(Debug, Deserialize)]
struct Content {
    #[serde(default)]
    parts: Vec<Part>,
}

#[derive(Debug, Deserialize)]
struct Part {
    #[serde(default)]
    text: Option<String>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.content)
            .map(|content| {
                content
                    .parts
                    .into_iter()
                    .filter_map(|part| part.text)
                    .collect::<String>()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl TextGenerator for GeminiGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let url = endpoint(
            &self.base_url,
            &format!("v1beta/models/{}:generateContent", request.model),
        );
        let payload = json!({
            "contents": [{ "role": "user", "parts": [{ "text": request.prompt }] }],
            "generationConfig": {
                "temperature": request.temperature,
                "maxOutputTokens": request.max_new_tokens,
            },
        });

        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&payload)
            .send()
            .await
            .map_err(|error| {
                GenerationError::ProviderUnavailable(format!(
                    "failed to reach Gemini at {}: {error}",
                    self.base_url
                ))
            })?;

        if !response.status().is_success() {
            return Err(error_for_status("Gemini", &url, response).await);
        }

        let body: GenerateContentResponse = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!("failed to decode Gemini response: {error}"))
        })?;

        Ok(body.text().trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn generator(server: &MockServer) -> GeminiGenerator {
        let http = Client::builder()
            .user_agent("rustysum-test")
            .build()
            .expect("client");
        GeminiGenerator::new(http, server.base_url(), "test-key")
    }

    #[tokio::test]
    async fn joins_candidate_parts() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent")
                    .header("x-goog-api-key", "test-key");
                then.status(200).json_body(json!({
                    "candidates": [{
                        "content": { "parts": [{ "text": "First. " }, { "text": "Second." }] }
                    }]
                }));
            })
            .await;

        let text = generator(&server)
            .generate(GenerationRequest::new(
                "gemini-2.5-flash",
                "Summarize:\ntext",
                1024,
            ))
            .await
            .expect("generation");

        mock.assert();
        assert_eq!(text, "First. Second.");
    }

    #[tokio::test]
    async fn blocked_prompt_without_candidates_yields_empty_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-flash:generateContent");
                then.status(200)
                    .json_body(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
            })
            .await;

        let text = generator(&server)
            .generate(GenerationRequest::new("gemini-2.5-flash", "prompt", 16))
            .await
            .expect("generation");

        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn error_status_is_reported() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/v1beta/models/gemini-2.5-pro:generateContent");
                then.status(429).body("quota exceeded");
            })
            .await;

        let error = generator(&server)
            .generate(GenerationRequest::new("gemini-2.5-pro", "prompt", 16))
            .await
            .expect_err("quota error");

        assert!(matches!(
            error,
            GenerationError::GenerationFailed(ref message) if message.contains("429")
        ));
    }
}
