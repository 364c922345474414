//! HTTP surface for Rusty Summarizer.
//!
//! This module exposes a compact Axum router with a handful of endpoints:
//!
//! - `POST /summarize` – Run the map-reduce pipeline over `text` with the backend named by
//!   `model_choice`. The response is a `text/plain` body streamed line by line in the
//!   `PROGRESS:` / `SUMMARY:` / `ERROR:` protocol. A map-phase failure aborts the body.
//! - `GET /backends` – List selectable backends with their chunk windows.
//! - `GET /metrics` – Observe run and chunk counters.
//! - `GET /commands` – Machine-readable command catalog for quick discovery by tools/hosts.

use crate::config::BackendProfile;
use crate::processing::SummarizationApi;
use crate::protocol::encode_events;
use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::{HeaderValue, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// Build the HTTP router exposing the summarization API surface.
pub fn create_router<S>(service: Arc<S>) -> Router
where
    S: SummarizationApi + 'static,
{
    Router::new()
        .route("/summarize", post(summarize::<S>))
        .route("/backends", get(list_backends::<S>))
        .route("/metrics", get(get_metrics::<S>))
        .route("/commands", get(get_commands))
        .with_state(service)
}

/// Request body for the `POST /summarize` endpoint.
#[derive(Deserialize)]
struct SummarizeRequest {
    /// Extracted document text.
    text: String,
    /// Backend identifier (`t5-small`, `bart-large-cnn`, `mistral`, `api`).
    model_choice: String,
}

/// Stream a summary for the submitted text.
///
/// Invalid backends and reduce failures still answer `200` with an `ERROR:` line; the
/// status only reflects whether the stream could be opened.
async fn summarize<S>(
    State(service): State<Arc<S>>,
    Json(request): Json<SummarizeRequest>,
) -> Response
where
    S: SummarizationApi,
{
    let SummarizeRequest { text, model_choice } = request;
    tracing::info!(
        backend = %model_choice,
        input_chars = text.chars().count(),
        "Summarize request received"
    );
    let lines = encode_events(service.summarize(text, model_choice));
    let mut response = Body::from_stream(lines).into_response();
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("text/plain; charset=utf-8"),
    );
    response
}

/// Response body for `GET /backends`.
#[derive(Serialize)]
struct BackendsResponse {
    backends: Vec<BackendProfile>,
}

/// List the backends callers may choose from.
async fn list_backends<S>(State(service): State<Arc<S>>) -> Json<BackendsResponse>
where
    S: SummarizationApi,
{
    Json(BackendsResponse {
        backends: service.backends(),
    })
}

/// Return the pipeline counters.
async fn get_metrics<S>(State(service): State<Arc<S>>) -> Json<MetricsResponse>
where
    S: SummarizationApi,
{
    let snapshot = service.metrics_snapshot();
    Json(MetricsResponse {
        runs_started: snapshot.runs_started,
        runs_succeeded: snapshot.runs_succeeded,
        runs_failed: snapshot.runs_failed,
        chunks_mapped: snapshot.chunks_mapped,
        chunks_skipped: snapshot.chunks_skipped,
    })
}

/// Response body for `GET /metrics`.
#[derive(Serialize)]
struct MetricsResponse {
    runs_started: u64,
    runs_succeeded: u64,
    runs_failed: u64,
    chunks_mapped: u64,
    chunks_skipped: u64,
}

/// Descriptor for a single command in the discovery catalog.
#[derive(Serialize)]
struct CommandDescriptor {
    name: &'static str,
    method: &'static str,
    path: &'static str,
    description: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    request_example: Option<serde_json::Value>,
}

/// Response body for `GET /commands`.
#[derive(Serialize)]
struct CommandsResponse {
    commands: Vec<CommandDescriptor>,
}

/// Enumerate supported HTTP commands for discovery/UX in hosts and tools.
async fn get_commands() -> Json<CommandsResponse> {
    Json(CommandsResponse {
        commands: vec![
            CommandDescriptor {
                name: "summarize",
                method: "POST",
                path: "/summarize",
                description: "Chunk a document, summarize each chunk, and synthesize a final summary. Streams PROGRESS:c/t lines followed by one SUMMARY: or ERROR: line.",
                request_example: Some(json!({
                    "text": "Document contents",
                    "model_choice": "bart-large-cnn"
                })),
            },
            CommandDescriptor {
                name: "backends",
                method: "GET",
                path: "/backends",
                description: "Return the selectable backends with their token budgets.",
                request_example: None,
            },
            CommandDescriptor {
                name: "metrics",
                method: "GET",
                path: "/metrics",
                description: "Return run and chunk counters useful for observability dashboards.",
                request_example: None,
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::{create_router, get_commands};
    use crate::config::{BackendProfile, backend_profiles};
    use crate::metrics::MetricsSnapshot;
    use crate::processing::{
        PipelineError, PipelineEvent, PipelineResult, PipelineStream, ProgressEvent,
        StrategyError, SummarizationApi,
    };
    use axum::{
        body::{Body, to_bytes},
        http::{Method, Request, StatusCode, header},
    };
    use serde_json::json;
    use std::sync::{Arc, Mutex};
    use tower::ServiceExt;

    #[tokio::test]
    async fn commands_catalog_exposes_summarize_endpoint() {
        let response = get_commands().await;
        let commands = response.0.commands;
        let summarize = commands
            .iter()
            .find(|cmd| cmd.name == "summarize")
            .expect("summarize command present");

        assert_eq!(summarize.method, "POST");
        assert_eq!(summarize.path, "/summarize");
        assert!(summarize.description.contains("PROGRESS"));
        assert!(commands.len() >= 3);
    }

    #[tokio::test]
    async fn summarize_route_streams_protocol_lines() {
        let service = Arc::new(StubSummarizationService::new(vec![
            Ok(progress(1, 2)),
            Ok(progress(2, 2)),
            Ok(PipelineEvent::Finished(PipelineResult::Success {
                text: "Line one.\nLine two.".into(),
            })),
        ]));
        let app = create_router(service.clone());

        let response = app
            .oneshot(summarize_request(json!({
                "text": "Document body",
                "model_choice": "mistral"
            })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE],
            "text/plain; charset=utf-8"
        );
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert_eq!(
            std::str::from_utf8(&body).expect("utf-8"),
            "PROGRESS:1/2\nPROGRESS:2/2\nSUMMARY:Line one.\\nLine two.\n"
        );
        assert_eq!(
            service.recorded_calls(),
            vec![("Document body".to_string(), "mistral".to_string())]
        );
    }

    #[tokio::test]
    async fn summarize_route_reports_invalid_backend_in_band() {
        let service = Arc::new(StubSummarizationService::new(vec![Ok(
            PipelineEvent::Finished(PipelineResult::Failure {
                message: "Invalid model choice: unknown".into(),
            }),
        )]));
        let app = create_router(service);

        let response = app
            .oneshot(summarize_request(json!({
                "text": "Document body",
                "model_choice": "unknown"
            })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        assert_eq!(&body[..], b"ERROR:Invalid model choice: unknown\n");
    }

    #[tokio::test]
    async fn map_failure_aborts_the_body() {
        let service = Arc::new(StubSummarizationService::new(vec![
            Ok(progress(1, 3)),
            Err(PipelineError::Map {
                index: 2,
                total: 3,
                source: StrategyError::Aborted("engine crashed".into()),
            }),
        ]));
        let app = create_router(service);

        let response = app
            .oneshot(summarize_request(json!({
                "text": "Document body",
                "model_choice": "t5-small"
            })))
            .await
            .expect("router response");

        assert_eq!(response.status(), StatusCode::OK);
        assert!(to_bytes(response.into_body(), usize::MAX).await.is_err());
    }

    #[tokio::test]
    async fn summarize_route_rejects_missing_fields() {
        let app = create_router(Arc::new(StubSummarizationService::new(Vec::new())));
        let response = app
            .oneshot(summarize_request(json!({ "text": "no backend" })))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn backends_and_metrics_routes_return_json() {
        let app = create_router(Arc::new(StubSummarizationService::new(Vec::new())));

        let response = app
            .clone()
            .oneshot(get_request("/backends"))
            .await
            .expect("router response");
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["backends"][0]["id"], "t5-small");
        assert_eq!(json["backends"][0]["budget"]["max_tokens"], 350);
        assert_eq!(json["backends"][2]["kind"], "local_causal");

        let response = app
            .oneshot(get_request("/metrics"))
            .await
            .expect("router response");
        let body = to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body bytes");
        let json: serde_json::Value = serde_json::from_slice(&body).expect("json body");
        assert_eq!(json["runs_started"], 4);
        assert_eq!(json["chunks_skipped"], 1);
    }

    fn progress(completed: usize, total: usize) -> PipelineEvent {
        PipelineEvent::Progress(ProgressEvent { completed, total })
    }

    fn summarize_request(payload: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(Method::POST)
            .uri("/summarize")
            .header("content-type", "application/json")
            .body(Body::from(payload.to_string()))
            .expect("request")
    }

    fn get_request(uri: &str) -> Request<Body> {
        Request::builder()
            .method(Method::GET)
            .uri(uri)
            .body(Body::empty())
            .expect("request")
    }

    struct StubSummarizationService {
        calls: Mutex<Vec<(String, String)>>,
        script: Mutex<Vec<Result<PipelineEvent, PipelineError>>>,
    }

    impl StubSummarizationService {
        fn new(script: Vec<Result<PipelineEvent, PipelineError>>) -> Self {
            Self {
                calls: Mutex::new(Vec::new()),
                script: Mutex::new(script),
            }
        }

        fn recorded_calls(&self) -> Vec<(String, String)> {
            self.calls.lock().expect("calls lock").clone()
        }
    }

    impl SummarizationApi for StubSummarizationService {
        fn summarize(&self, text: String, backend_id: String) -> PipelineStream {
            self.calls
                .lock()
                .expect("calls lock")
                .push((text, backend_id));
            let script = std::mem::take(&mut *self.script.lock().expect("script lock"));
            Box::pin(futures_util::stream::iter(script))
        }

        fn backends(&self) -> Vec<BackendProfile> {
            backend_profiles().to_vec()
        }

        fn metrics_snapshot(&self) -> MetricsSnapshot {
            MetricsSnapshot {
                runs_started: 4,
                runs_succeeded: 3,
                runs_failed: 1,
                chunks_mapped: 9,
                chunks_skipped: 1,
            }
        }
    }
}
