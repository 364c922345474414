use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{GenerationError, GenerationRequest, TextGenerator, endpoint, error_for_status};

/// Generator for seq2seq summarization models served by a Hugging Face inference endpoint.
///
/// Posts to `{base_url}/models/{model}` and reads the `summary_text` (or `generated_text`)
/// of the first returned candidate. Decoding knobs travel as `parameters`.
pub struct HuggingFaceGenerator {
    http: Client,
    base_url: String,
    api_token: Option<String>,
}

impl HuggingFaceGenerator {
    /// Wrap an HTTP client pointed at `base_url`, optionally authenticating with a bearer token.
    pub fn new(http: Client, base_url: impl Into<String>, api_token: Option<String>) -> Self {
        Self {
            http,
            base_url: base_url.into(),
            api_token,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    summary_text: Option<String>,
    #[serde(default)]
    generated_text: Option<String>,
}

fn parameters(request: &GenerationRequest) -> Value {
    let mut parameters = Map::new();
    parameters.insert("max_length".into(), json!(request.max_new_tokens));
    if let Some(min) = request.min_new_tokens {
        parameters.insert("min_length".into(), json!(min));
    }
    if let Some(beams) = request.num_beams {
        parameters.insert("num_beams".into(), json!(beams));
        parameters.insert("early_stopping".into(), json!(true));
        parameters.insert("do_sample".into(), json!(false));
    } else {
        parameters.insert("temperature".into(), json!(request.temperature));
    }
    if let Some(penalty) = request.length_penalty {
        parameters.insert("length_penalty".into(), json!(penalty));
    }
    if let Some(penalty) = request.repetition_penalty {
        parameters.insert("repetition_penalty".into(), json!(penalty));
    }
    Value::Object(parameters)
}

#[async_trait]
impl TextGenerator for HuggingFaceGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<String, GenerationError> {
        let url = endpoint(&self.base_url, &format!("models/{}", request.model));
        let payload = json!({
            "inputs": request.prompt,
            "parameters": parameters(&request),
            "options": { "wait_for_model": true },
        });

        let mut call = self.http.post(&url).json(&payload);
        if let Some(token) = self.api_token.as_deref().filter(|token| !token.is_empty()) {
            call = call.bearer_auth(token);
        }

        let response = call.send().await.map_err(|error| {
            GenerationError::ProviderUnavailable(format!(
                "failed to reach inference endpoint at {}: {error}",
                self.base_url
            ))
        })?;

        if !response.status().is_success() {
            return Err(error_for_status("Inference endpoint", &url, response).await);
        }

        let candidates: Vec<Candidate> = response.json().await.map_err(|error| {
            GenerationError::InvalidResponse(format!(
                "failed to decode inference response: {error}"
            ))
        })?;

        let text = candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.summary_text.or(candidate.generated_text))
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::{Method::POST, MockServer};

    fn generator(server: &MockServer, token: Option<&str>) -> HuggingFaceGenerator {
        let http = Client::builder()
            .user_agent("rustysum-test")
            .build()
            .expect("client");
        HuggingFaceGenerator::new(http, server.base_url(), token.map(str::to_string))
    }

    #[tokio::test]
    async fn posts_beam_search_parameters_and_reads_summary_text() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/models/facebook/bart-large-cnn")
                    .header("authorization", "Bearer secret")
                    .body_contains("\"num_beams\":4")
                    .body_contains("\"length_penalty\":2.0")
                    .body_contains("\"min_length\":100");
                then.status(200)
                    .json_body(json!([{ "summary_text": " A short summary. " }]));
            })
            .await;

        let text = generator(&server, Some("secret"))
            .generate(
                GenerationRequest::new("facebook/bart-large-cnn", "long text", 300)
                    .with_min_new_tokens(100)
                    .with_beams(4)
                    .with_length_penalty(2.0),
            )
            .await
            .expect("generation");

        mock.assert();
        assert_eq!(text, "A short summary.");
    }

    #[tokio::test]
    async fn empty_candidate_list_yields_empty_text() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/t5-small");
                then.status(200).json_body(json!([]));
            })
            .await;

        let text = generator(&server, None)
            .generate(GenerationRequest::new("t5-small", "summarize: text", 300))
            .await
            .expect("generation");

        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn missing_model_maps_to_unavailable() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/models/t5-small");
                then.status(404).body("not found");
            })
            .await;

        let error = generator(&server, None)
            .generate(GenerationRequest::new("t5-small", "summarize: text", 300))
            .await
            .expect_err("missing model");

        assert!(matches!(error, GenerationError::ProviderUnavailable(_)));
    }
}
