//! HTTP surface: webhook receiver and search API
//!
//! Endpoints:
//! - POST /events - registry notification envelope, returns the batch report
//! - GET /search - `q`, `a`, repeated `f`, `offset` and `maxResults`
//! - GET /health - returns "ok"

use axum::{
    body::Bytes,
    extract::{RawQuery, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use regsearch_core::notify::BatchReport;
use regsearch_core::search::{self, SearchRequest, SearchResponse};
use regsearch_core::{IndexStore, NotificationProcessor};
use serde_json::json;
use std::sync::Arc;
use tracing::{debug, error};

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn IndexStore>,
    pub processor: Arc<NotificationProcessor>,
    pub default_max_results: usize,
}

/// Build the application router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/events", post(events))
        .route("/search", get(search_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Error returned to HTTP callers
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl From<regsearch_core::Error> for ApiError {
    fn from(err: regsearch_core::Error) -> Self {
        let status = if err.is_bad_request() {
            StatusCode::BAD_REQUEST
        } else {
            error!("Request failed: {}", err);
            StatusCode::INTERNAL_SERVER_ERROR
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));
        (self.status, body).into_response()
    }
}

async fn events(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<BatchReport>, ApiError> {
    debug!("Received notification envelope ({} bytes)", body.len());
    let report = state.processor.handle(&body).await?;
    Ok(Json(report))
}

async fn search_handler(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> Result<Json<SearchResponse>, ApiError> {
    let query = query.unwrap_or_default();
    let request = SearchRequest::from_pairs(url::form_urlencoded::parse(query.as_bytes()))?;
    let response =
        search::execute(state.store.as_ref(), &request, state.default_max_results).await?;
    Ok(Json(response))
}

async fn health() -> &'static str {
    "ok"
}

#[cfg(test)]
mod tests {
    use super::*;
    use regsearch_core::hooks::HookEngine;
    use regsearch_core::MemoryIndex;
    use regsearch_registry::RegistryClient;
    use serde_json::Value;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const DOCKER_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

    async fn mock_registry() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/v2/mysql/manifests/sha256:man"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({
                        "schemaVersion": 2,
                        "mediaType": DOCKER_V2,
                        "config": {"size": 10, "digest": "sha256:cfg"},
                        "layers": [{"size": 90, "digest": "sha256:layer"}]
                    }))
                    .insert_header("Docker-Content-Digest", "sha256:man"),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/v2/mysql/blobs/sha256:cfg"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "created": "2024-01-01T00:00:00Z",
                "config": {"Labels": {"family": "debian"}}
            })))
            .mount(&server)
            .await;
        server
    }

    /// Serve the router on an ephemeral port and return its base URL
    async fn spawn_app(registry: &MockServer) -> String {
        let store: Arc<dyn IndexStore> = Arc::new(MemoryIndex::new());
        let client = Arc::new(RegistryClient::new(&registry.uri()).unwrap());
        let processor = Arc::new(NotificationProcessor::new(
            client,
            store.clone(),
            Arc::new(HookEngine::empty()),
        ));
        let app = router(AppState {
            store,
            processor,
            default_max_results: 10,
        });

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}", addr)
    }

    fn envelope(action: &str, media_type: &str, digest: &str) -> Value {
        json!({
            "events": [{
                "id": "evt-1",
                "action": action,
                "target": {
                    "mediaType": media_type,
                    "repository": "mysql",
                    "tag": "5.7",
                    "digest": digest
                }
            }]
        })
    }

    #[tokio::test]
    async fn test_push_then_search_then_delete() {
        let registry = mock_registry().await;
        let base = spawn_app(&registry).await;
        let http = reqwest::Client::new();

        let report: Value = http
            .post(format!("{}/events", base))
            .body(envelope("push", DOCKER_V2, "sha256:man").to_string())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["pushed"], 1);

        let response = http
            .get(format!("{}/search?a=Label.family:debian&f=FullName", base))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let results: Value = response.json().await.unwrap();
        assert_eq!(results["total"], 1);
        assert_eq!(results["hits"][0]["fields"]["FullName"], "mysql:5.7");

        let report: Value = http
            .post(format!("{}/events", base))
            .body(envelope("delete", "", "sha256:man").to_string())
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(report["deleted"], 1);

        let results: Value = http
            .get(format!("{}/search?q=mysql", base))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        assert_eq!(results["total"], 0);
    }

    #[tokio::test]
    async fn test_ignored_event_is_accepted() {
        let registry = MockServer::start().await;
        let base = spawn_app(&registry).await;

        let response = reqwest::Client::new()
            .post(format!("{}/events", base))
            .body(envelope("push", "application/octet-stream", "sha256:x").to_string())
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
        let report: Value = response.json().await.unwrap();
        assert_eq!(report["ignored"], 1);
    }

    #[tokio::test]
    async fn test_bad_requests() {
        let registry = MockServer::start().await;
        let base = spawn_app(&registry).await;
        let http = reqwest::Client::new();

        let malformed = http
            .post(format!("{}/events", base))
            .body("not json")
            .send()
            .await
            .unwrap();
        assert_eq!(malformed.status(), 400);

        let no_criteria = http.get(format!("{}/search", base)).send().await.unwrap();
        assert_eq!(no_criteria.status(), 400);
        let body: Value = no_criteria.json().await.unwrap();
        assert_eq!(body["error"]["status"], 400);

        let bad_field = http
            .get(format!("{}/search?a=Bogus:x", base))
            .send()
            .await
            .unwrap();
        assert_eq!(bad_field.status(), 400);
    }

    #[tokio::test]
    async fn test_health() {
        let registry = MockServer::start().await;
        let base = spawn_app(&registry).await;
        let body = reqwest::get(format!("{}/health", base))
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "ok");
    }
}
