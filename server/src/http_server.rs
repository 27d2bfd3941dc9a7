use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Redirect, Response},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use finchat_core::config::MissingSetting;
use finchat_core::errors::ChatResult;
use finchat_core::types::{ImageUpload, Turn};
use serde::{Deserialize, Serialize};
use tokio::sync::MutexGuard;
use tower_http::cors::{Any, CorsLayer};
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::conversation::{SessionController, TurnOutcome};
use crate::render::{render_busy_page, render_page, PageView};
use crate::session::{Session, SessionHandle, SessionStoreError, SessionStoreRef};

/// Uploads beyond this size are rejected before reaching the handlers
const MAX_BODY_BYTES: usize = 20 * 1024 * 1024;

/// Application state shared with all routes
#[derive(Clone)]
pub struct AppState {
    controller: SessionController,
    sessions: SessionStoreRef,
    warnings: Arc<Vec<MissingSetting>>,
}

impl AppState {
    pub fn new(
        controller: SessionController,
        sessions: SessionStoreRef,
        warnings: Vec<MissingSetting>,
    ) -> Self {
        Self {
            controller,
            sessions,
            warnings: Arc::new(warnings),
        }
    }
}

/// Response model for newly created sessions
#[derive(Serialize, Deserialize, Debug)]
pub struct SessionCreated {
    pub session_id: String,
}

/// Response model for a session's history
#[derive(Serialize, Deserialize, Debug)]
pub struct HistoryResponse {
    pub session_id: String,
    pub history: Vec<Turn>,
    pub has_continuation: bool,
}

/// Base64-encoded image in a JSON query
#[derive(Serialize, Deserialize, Debug)]
pub struct ImagePayload {
    #[serde(default)]
    pub mime_type: Option<String>,
    pub data: String,
}

/// Request model for queries
#[derive(Serialize, Deserialize, Debug)]
pub struct QueryRequest {
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub images: Vec<ImagePayload>,
}

/// Response model for queries
#[derive(Serialize, Deserialize, Debug)]
pub struct QueryResponse {
    pub response: String,
    pub skipped: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Error type for HTTP server
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    Busy,
    BadRequest(String),
    InternalError(anyhow::Error),
}

impl From<SessionStoreError> for ApiError {
    fn from(e: SessionStoreError) -> Self {
        match e {
            SessionStoreError::NotFound(id) => ApiError::NotFound(id),
            other => ApiError::InternalError(anyhow::Error::new(other)),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            Self::NotFound(id) => (StatusCode::NOT_FOUND, format!("Session not found: {}", id)),
            Self::Busy => (
                StatusCode::CONFLICT,
                "A message is already being processed for this session".to_string(),
            ),
            Self::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            Self::InternalError(e) => {
                error!(error = %e, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    format!("Internal server error: {}", e),
                )
            }
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

/// Build the router with all routes
pub fn router(state: AppState) -> Router {
    // Set up CORS
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(new_session_page))
        .route("/health", get(health))
        .route("/sessions/:id", get(show_session))
        .route("/sessions/:id/turns", post(submit_form))
        .route("/sessions/:id/clear", post(clear_form))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/:id", get(get_history))
        .route("/api/sessions/:id/query", post(handle_query))
        .route("/api/sessions/:id/clear", post(clear_api))
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(cors)
        .with_state(state)
}

/// Start the HTTP server and serve until `shutdown` resolves
pub async fn run_server(
    state: AppState,
    addr: SocketAddr,
    shutdown: impl Future<Output = ()>,
) -> anyhow::Result<()> {
    info!("Starting HTTP server on {}", addr);

    axum::Server::bind(&addr)
        .serve(router(state).into_make_service())
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to start HTTP server: {}", e))
}

/// Health check handler
async fn health() -> impl IntoResponse {
    "finchat is running"
}

async fn open_session(state: &AppState) -> Result<String, ApiError> {
    let id = Uuid::new_v4().to_string();
    state.sessions.create_session(id.clone()).await?;
    info!(session = %id, "Opened session");
    Ok(id)
}

/// Lock a session for a turn, rejecting the request if one is in flight
fn claim(handle: &SessionHandle) -> Result<MutexGuard<'_, Session>, ApiError> {
    handle.try_lock().map_err(|_| ApiError::Busy)
}

/// Run one turn and record its outcome on the session
async fn run_turn(
    state: &AppState,
    session: &mut Session,
    text: &str,
    images: &[ImageUpload],
) -> ChatResult<TurnOutcome> {
    let result = state
        .controller
        .submit_turn(&mut session.conversation, text, images)
        .await;

    match &result {
        Ok(TurnOutcome::Answered(_)) => session.notice = None,
        Ok(TurnOutcome::NothingToSend) => {}
        Err(e) => {
            error!(session = %session.id, error = %e, "Failed to process turn");
            session.record_error(e.to_string());
        }
    }
    session.touch();
    result
}

/// Start a fresh conversation and send the browser to it
async fn new_session_page(State(state): State<AppState>) -> Result<Redirect, ApiError> {
    let id = open_session(&state).await?;
    Ok(Redirect::to(&format!("/sessions/{}", id)))
}

async fn show_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Html<String>, ApiError> {
    let handle = state.sessions.get_session(&id).await?;
    // A turn in flight holds the lock until the provider answers
    let Ok(session) = handle.try_lock() else {
        return Ok(Html(render_busy_page(&id)));
    };

    let page = render_page(&PageView {
        session_id: &session.id,
        history: session.conversation.history(),
        notice: session.notice.as_ref(),
        warnings: &state.warnings,
        model: &state.controller.settings().model,
    });
    Ok(Html(page))
}

/// Read the chat form: one `prompt` field and any number of `images` files
async fn read_form(mut multipart: Multipart) -> Result<(String, Vec<ImageUpload>), ApiError> {
    let bad_form = |e: axum::extract::multipart::MultipartError| {
        ApiError::BadRequest(format!("Invalid form data: {}", e))
    };

    let mut prompt = String::new();
    let mut images = Vec::new();

    while let Some(field) = multipart.next_field().await.map_err(bad_form)? {
        let name = field.name().map(str::to_string);
        match name.as_deref() {
            Some("prompt") => prompt = field.text().await.map_err(bad_form)?,
            Some("images") => {
                let mime_type = field.content_type().map(str::to_string);
                let bytes = field.bytes().await.map_err(bad_form)?;
                // An empty file input still submits one empty part
                if bytes.is_empty() {
                    continue;
                }
                images.push(ImageUpload::new(mime_type, bytes.to_vec()));
            }
            other => debug!(field = ?other, "Ignoring unknown form field"),
        }
    }

    Ok((prompt, images))
}

async fn submit_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Redirect, ApiError> {
    let handle = state.sessions.get_session(&id).await?;
    let mut session = claim(&handle)?;
    let (prompt, images) = read_form(multipart).await?;

    // Failures are already recorded on the session and shown on the page
    let _ = run_turn(&state, &mut session, &prompt, &images).await;

    Ok(Redirect::to(&format!("/sessions/{}", id)))
}

async fn clear_form(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Redirect, ApiError> {
    let handle = state.sessions.get_session(&id).await?;
    claim(&handle)?.clear();
    info!(session = %id, "Conversation cleared");
    Ok(Redirect::to(&format!("/sessions/{}", id)))
}

async fn create_session(State(state): State<AppState>) -> Result<Json<SessionCreated>, ApiError> {
    let session_id = open_session(&state).await?;
    Ok(Json(SessionCreated { session_id }))
}

async fn get_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<HistoryResponse>, ApiError> {
    let handle = state.sessions.get_session(&id).await?;
    let session = claim(&handle)?;

    Ok(Json(HistoryResponse {
        session_id: session.id.clone(),
        history: session.conversation.history().to_vec(),
        has_continuation: session.conversation.continuation_token().is_some(),
    }))
}

fn decode_images(payloads: Vec<ImagePayload>) -> Result<Vec<ImageUpload>, ApiError> {
    payloads
        .into_iter()
        .enumerate()
        .map(|(i, payload)| {
            STANDARD
                .decode(payload.data.trim())
                .map(|bytes| ImageUpload::new(payload.mime_type, bytes))
                .map_err(|e| ApiError::BadRequest(format!("Image {} is not valid base64: {}", i, e)))
        })
        .collect()
}

/// Handler for query requests
async fn handle_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    let handle = state.sessions.get_session(&id).await?;
    let images = decode_images(payload.images)?;
    let mut session = claim(&handle)?;

    let body = match run_turn(&state, &mut session, &payload.query, &images).await {
        Ok(TurnOutcome::Answered(response)) => QueryResponse {
            response,
            skipped: false,
            error: None,
        },
        Ok(TurnOutcome::NothingToSend) => QueryResponse {
            response: String::new(),
            skipped: true,
            error: None,
        },
        Err(e) => QueryResponse {
            response: String::new(),
            skipped: false,
            error: Some(format!("Error generating response: {}", e)),
        },
    };
    Ok(Json(body))
}

async fn clear_api(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let handle = state.sessions.get_session(&id).await?;
    claim(&handle)?.clear();
    info!(session = %id, "Conversation cleared");
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversation::testing::{controller, ScriptedProvider};
    use crate::session::InMemorySessionStore;
    use finchat_core::errors::ChatError;
    use finchat_core::types::{ContentPart, Role};
    use reqwest::multipart::{Form, Part};
    use reqwest::redirect::Policy;
    use reqwest::StatusCode;
    use serde_json::json;

    struct TestServer {
        base: String,
        client: reqwest::Client,
        sessions: SessionStoreRef,
        provider: Arc<ScriptedProvider>,
    }

    impl TestServer {
        async fn start(provider: ScriptedProvider, warnings: Vec<MissingSetting>) -> Self {
            let provider = Arc::new(provider);
            let sessions: SessionStoreRef = Arc::new(InMemorySessionStore::new());
            let state = AppState::new(controller(provider.clone()), sessions.clone(), warnings);

            let addr = SocketAddr::from(([127, 0, 0, 1], 0));
            let server = axum::Server::bind(&addr).serve(router(state).into_make_service());
            let base = format!("http://{}", server.local_addr());
            tokio::spawn(server);

            let client = reqwest::Client::builder()
                .redirect(Policy::none())
                .no_proxy()
                .build()
                .unwrap();

            Self {
                base,
                client,
                sessions,
                provider,
            }
        }

        fn url(&self, path: &str) -> String {
            format!("{}{}", self.base, path)
        }

        async fn new_session(&self) -> String {
            let created: SessionCreated = self
                .client
                .post(self.url("/api/sessions"))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap();
            created.session_id
        }

        async fn query(&self, id: &str, body: serde_json::Value) -> reqwest::Response {
            self.client
                .post(self.url(&format!("/api/sessions/{}/query", id)))
                .json(&body)
                .send()
                .await
                .unwrap()
        }

        async fn history(&self, id: &str) -> HistoryResponse {
            self.client
                .get(self.url(&format!("/api/sessions/{}", id)))
                .send()
                .await
                .unwrap()
                .json()
                .await
                .unwrap()
        }
    }

    #[tokio::test]
    async fn test_health() {
        let server = TestServer::start(ScriptedProvider::new(), vec![]).await;
        let body = server
            .client
            .get(server.url("/health"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert_eq!(body, "finchat is running");
    }

    #[tokio::test]
    async fn test_root_redirects_to_new_session_page() {
        let server = TestServer::start(ScriptedProvider::new(), vec![MissingSetting::ApiKey]).await;

        let response = server.client.get(server.url("/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        let location = response.headers()["location"].to_str().unwrap().to_string();
        assert!(location.starts_with("/sessions/"));

        let id = location.trim_start_matches("/sessions/");
        assert!(server.sessions.get_session(id).await.is_ok());

        let page = server.client.get(server.url(&location)).send().await.unwrap();
        assert_eq!(page.status(), StatusCode::OK);
        let html = page.text().await.unwrap();
        assert!(html.contains("OPENAI_API_KEY is not set"));
        assert!(html.contains(&format!("/sessions/{}/turns", id)));
    }

    #[tokio::test]
    async fn test_unknown_session_is_not_found() {
        let server = TestServer::start(ScriptedProvider::new(), vec![]).await;

        let page = server.client.get(server.url("/sessions/nope")).send().await.unwrap();
        assert_eq!(page.status(), StatusCode::NOT_FOUND);

        let query = server.query("nope", json!({"query": "hi"})).await;
        assert_eq!(query.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_unknown_session_wins_over_bad_image() {
        let server = TestServer::start(ScriptedProvider::new(), vec![]).await;

        let response = server
            .query("nope", json!({"query": "x", "images": [{"data": "***"}]}))
            .await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_query_answers_and_chains() {
        let provider = ScriptedProvider::new()
            .reply("resp_1", "Q1 revenue was $10M.")
            .reply("resp_2", "Q2 revenue was $12M.");
        let server = TestServer::start(provider, vec![]).await;
        let id = server.new_session().await;

        let first: QueryResponse = server
            .query(&id, json!({"query": "What was Q1 revenue?"}))
            .await
            .json()
            .await
            .unwrap();
        assert_eq!(first.response, "Q1 revenue was $10M.");
        assert!(!first.skipped);
        assert!(first.error.is_none());

        server.query(&id, json!({"query": "And Q2?"})).await;

        let history = server.history(&id).await;
        assert_eq!(history.history.len(), 4);
        assert_eq!(history.history[2].role, Role::User);
        assert!(history.has_continuation);
        assert_eq!(
            server.provider.previous_ids(),
            vec![None, Some("resp_1".to_string())]
        );
    }

    #[tokio::test]
    async fn test_query_with_base64_image() {
        let server = TestServer::start(ScriptedProvider::new().reply("resp_1", "A chart."), vec![]).await;
        let id = server.new_session().await;

        server
            .query(&id, json!({"query": "", "images": [{"data": "aGVsbG8="}]}))
            .await;

        let history = server.history(&id).await;
        assert_eq!(
            history.history[0],
            Turn::user(vec![ContentPart::image("data:image/png;base64,aGVsbG8=")])
        );
    }

    #[tokio::test]
    async fn test_query_with_bad_base64_is_rejected() {
        let server = TestServer::start(ScriptedProvider::new(), vec![]).await;
        let id = server.new_session().await;

        let response = server
            .query(&id, json!({"query": "x", "images": [{"data": "***"}]}))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(server.provider.call_count(), 0);
        assert!(server.history(&id).await.history.is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_is_skipped() {
        let server = TestServer::start(ScriptedProvider::new(), vec![]).await;
        let id = server.new_session().await;

        let body: QueryResponse = server
            .query(&id, json!({"query": "   "}))
            .await
            .json()
            .await
            .unwrap();

        assert!(body.skipped);
        assert_eq!(server.provider.call_count(), 0);
        assert!(server.history(&id).await.history.is_empty());
    }

    #[tokio::test]
    async fn test_remote_failure_is_reported_inline() {
        let provider = ScriptedProvider::new().fail(ChatError::HttpError {
            status_code: 401,
            message: "Incorrect API key provided".to_string(),
        });
        let server = TestServer::start(provider, vec![]).await;
        let id = server.new_session().await;

        let response = server.query(&id, json!({"query": "hi"})).await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: QueryResponse = response.json().await.unwrap();
        assert_eq!(
            body.error.as_deref(),
            Some("Error generating response: HTTP Error: 401 - Incorrect API key provided")
        );

        let history = server.history(&id).await;
        assert_eq!(history.history.len(), 1);
        assert!(!history.has_continuation);

        let html = server
            .client
            .get(server.url(&format!("/sessions/{}", id)))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains("Incorrect API key provided"));
    }

    #[tokio::test]
    async fn test_form_submission_with_images() {
        let server = TestServer::start(ScriptedProvider::new().reply("resp_1", "Two charts."), vec![]).await;
        let id = server.new_session().await;

        let form = Form::new()
            .text("prompt", "  Compare these  ")
            .part(
                "images",
                Part::bytes(b"a".to_vec())
                    .file_name("a.jpg")
                    .mime_str("image/jpeg")
                    .unwrap(),
            )
            .part(
                "images",
                Part::bytes(b"b".to_vec())
                    .file_name("b.webp")
                    .mime_str("image/webp")
                    .unwrap(),
            )
            .part("images", Part::bytes(Vec::new()).file_name(""));

        let response = server
            .client
            .post(server.url(&format!("/sessions/{}/turns", id)))
            .multipart(form)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);
        assert_eq!(
            response.headers()["location"].to_str().unwrap(),
            format!("/sessions/{}", id)
        );

        let history = server.history(&id).await;
        assert_eq!(
            history.history,
            vec![
                Turn::user(vec![
                    ContentPart::text("Compare these"),
                    ContentPart::image("data:image/jpeg;base64,YQ=="),
                    ContentPart::image("data:image/webp;base64,Yg=="),
                ]),
                Turn::assistant("Two charts."),
            ]
        );
    }

    #[tokio::test]
    async fn test_clear_resets_session() {
        let provider = ScriptedProvider::new()
            .reply("resp_1", "one")
            .reply("resp_2", "two");
        let server = TestServer::start(provider, vec![]).await;
        let id = server.new_session().await;
        server.query(&id, json!({"query": "a"})).await;
        server.query(&id, json!({"query": "b"})).await;

        let response = server
            .client
            .post(server.url(&format!("/sessions/{}/clear", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::SEE_OTHER);

        let history = server.history(&id).await;
        assert!(history.history.is_empty());
        assert!(!history.has_continuation);

        let html = server
            .client
            .get(server.url(&format!("/sessions/{}", id)))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(html.contains("Conversation cleared"));

        let response = server
            .client
            .post(server.url(&format!("/api/sessions/{}/clear", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_busy_session_rejects_second_submission() {
        let server = TestServer::start(ScriptedProvider::new(), vec![]).await;
        let id = server.new_session().await;

        let handle = server.sessions.get_session(&id).await.unwrap();
        let _in_flight = handle.lock().await;

        let response = server.query(&id, json!({"query": "hi"})).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(server.provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_reads_do_not_wait_for_turn_in_flight() {
        let server = TestServer::start(ScriptedProvider::new(), vec![]).await;
        let id = server.new_session().await;

        let handle = server.sessions.get_session(&id).await.unwrap();
        let _in_flight = handle.lock().await;

        let page = server
            .client
            .get(server.url(&format!("/sessions/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(page.status(), StatusCode::OK);
        let body = page.text().await.unwrap();
        assert!(body.contains("Thinking..."));
        assert!(body.contains("http-equiv=\"refresh\""));

        let history = server
            .client
            .get(server.url(&format!("/api/sessions/{}", id)))
            .send()
            .await
            .unwrap();
        assert_eq!(history.status(), StatusCode::CONFLICT);
    }
}
