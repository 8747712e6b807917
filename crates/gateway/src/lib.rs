//! HTTP gateway for Aether.
//!
//! Serves the chat route the client streams from, a health check, and a
//! read-only admin surface for dataset export and statistics.
//!
//! Built on Axum.

mod admin;
mod chat;

use axum::extract::DefaultBodyLimit;
use axum::{
    Router,
    http::{HeaderValue, Method, StatusCode, header},
    middleware::{self, Next},
    response::Json,
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};

use aether_agent::ContextAssembler;
use aether_config::AppConfig;
use aether_core::provider::Provider;
use aether_core::record::RecordStore;

/// Shared application state for the gateway.
pub struct GatewayState {
    pub config: AppConfig,
    pub provider: Arc<dyn Provider>,
    pub store: Arc<dyn RecordStore>,
    pub assembler: ContextAssembler,
}

impl GatewayState {
    pub fn new(config: AppConfig, provider: Arc<dyn Provider>, store: Arc<dyn RecordStore>) -> Self {
        Self {
            config,
            provider,
            store,
            assembler: ContextAssembler::default(),
        }
    }
}

pub type SharedState = Arc<GatewayState>;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub(crate) fn status(code: StatusCode, error: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            code,
            Json(Self {
                error: error.into(),
            }),
        )
    }
}

/// Build the router with every gateway route.
///
/// Layers applied:
/// - CORS restricted to `gateway.allowed_origins`
/// - request body size limit (`gateway.max_body_bytes`)
/// - per-client rate limiting (`gateway.rate_limit_per_minute`)
/// - HTTP trace logging
pub fn build_router(state: SharedState) -> Router {
    let gateway = &state.config.gateway;
    let cors = cors_layer(&gateway.allowed_origins);
    let body_limit = gateway.max_body_bytes;
    let rate_limiter = Arc::new(RateLimiter::new(
        gateway.rate_limit_per_minute,
        Duration::from_secs(60),
    ));

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/chat", post(chat::chat_handler))
        .route("/api/admin/stats", get(admin::stats_handler))
        .route("/api/admin/export", get(admin::export_handler))
        .route("/api/admin/turns", get(admin::turns_handler))
        .with_state(state)
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(middleware::from_fn(move |req, next| {
            let limiter = rate_limiter.clone();
            rate_limit_middleware(limiter, req, next)
        }))
        .layer(cors)
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let allow_origin = if origins.iter().any(|o| o == "*") {
        AllowOrigin::any()
    } else {
        let parsed: Vec<HeaderValue> = origins
            .iter()
            .filter_map(|origin| match origin.parse() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(origin = %origin, "Ignoring unparseable CORS origin");
                    None
                }
            })
            .collect();
        AllowOrigin::list(parsed)
    };

    CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .max_age(Duration::from_secs(3600))
}

/// Serve `state` on an already-bound listener until the server stops.
pub async fn serve(listener: TcpListener, state: SharedState) -> std::io::Result<()> {
    axum::serve(listener, build_router(state)).await
}

/// Start the gateway HTTP server from configuration.
pub async fn start(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let addr = format!("{}:{}", config.gateway.host, config.gateway.port);

    let provider = aether_providers::build_from_config(&config)?;
    let store = aether_memory::open_store(&config.store).await?;
    info!(
        provider = %provider.name(),
        store = %store.name(),
        model = %config.default_model,
        "Gateway subsystems ready"
    );

    let state = Arc::new(GatewayState::new(config, provider, store));
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "Gateway listening");
    serve(listener, state).await?;
    Ok(())
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    version: &'static str,
}

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

// ── Rate limiting ─────────────────────────────────────────────────────────

/// Sliding-window rate limiter keyed by client.
struct RateLimiter {
    max_requests: usize,
    window: Duration,
    clients: std::sync::Mutex<HashMap<String, Vec<Instant>>>,
}

impl RateLimiter {
    fn new(max_requests: usize, window: Duration) -> Self {
        Self {
            max_requests,
            window,
            clients: std::sync::Mutex::new(HashMap::new()),
        }
    }

    /// Record a request for `client_key`. Returns `false` once the window is full.
    fn check(&self, client_key: &str) -> bool {
        let now = Instant::now();
        let mut clients = self.clients.lock().unwrap_or_else(|e| e.into_inner());

        if clients.len() > 10_000 {
            clients.retain(|_, stamps| {
                stamps
                    .last()
                    .is_some_and(|t| now.duration_since(*t) < self.window)
            });
        }

        let stamps = clients.entry(client_key.to_string()).or_default();
        stamps.retain(|t| now.duration_since(*t) < self.window);

        if stamps.len() >= self.max_requests {
            return false;
        }
        stamps.push(now);
        true
    }
}

/// Keys on the Authorization header, else `x-forwarded-for`, else
/// "anonymous". `/health` is never limited.
async fn rate_limit_middleware(
    limiter: Arc<RateLimiter>,
    req: axum::extract::Request,
    next: Next,
) -> Result<axum::response::Response, StatusCode> {
    if req.uri().path() == "/health" {
        return Ok(next.run(req).await);
    }

    let headers = req.headers();
    let client_key = headers
        .get(header::AUTHORIZATION)
        .or_else(|| headers.get("x-forwarded-for"))
        .and_then(|v| v.to_str().ok())
        .unwrap_or("anonymous")
        .to_string();

    if !limiter.check(&client_key) {
        warn!(client = %client_key, path = %req.uri().path(), "Rate limit exceeded");
        return Err(StatusCode::TOO_MANY_REQUESTS);
    }

    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_core::error::ProviderError;
    use aether_core::message::{Role, Speaker};
    use aether_core::provider::{ChunkReceiver, ProviderRequest, ProviderResponse, StreamChunk};
    use aether_core::record::{FeedbackRecord, TurnRecord};
    use aether_memory::InMemoryStore;
    use aether_providers::{StreamDecoder, StreamFrame};
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use std::sync::Mutex;
    use tower::ServiceExt;

    /// Streams fixed deltas and remembers the last request it saw.
    struct ScriptedProvider {
        deltas: Vec<&'static str>,
        seen: Mutex<Option<ProviderRequest>>,
    }

    impl ScriptedProvider {
        fn new(deltas: Vec<&'static str>) -> Self {
            Self {
                deltas,
                seen: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl Provider for ScriptedProvider {
        fn name(&self) -> &str {
            "scripted"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::NotConfigured("stream only".into()))
        }

        async fn stream(&self, request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            *self.seen.lock().unwrap() = Some(request);
            let (tx, rx) = tokio::sync::mpsc::channel(16);
            for delta in &self.deltas {
                tx.send(Ok(StreamChunk {
                    content: Some(delta.to_string()),
                    ..Default::default()
                }))
                .await
                .unwrap();
            }
            tx.send(Ok(StreamChunk {
                done: true,
                ..Default::default()
            }))
            .await
            .unwrap();
            Ok(rx)
        }
    }

    struct RefusingProvider;

    #[async_trait]
    impl Provider for RefusingProvider {
        fn name(&self) -> &str {
            "refusing"
        }

        async fn complete(&self, _request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
            Err(ProviderError::AuthenticationFailed("bad key".into()))
        }

        async fn stream(&self, _request: ProviderRequest) -> Result<ChunkReceiver, ProviderError> {
            Err(ProviderError::AuthenticationFailed("bad key".into()))
        }
    }

    fn test_state(provider: Arc<dyn Provider>, store: Arc<dyn RecordStore>) -> SharedState {
        Arc::new(GatewayState::new(AppConfig::default(), provider, store))
    }

    fn default_state() -> SharedState {
        test_state(
            Arc::new(ScriptedProvider::new(vec!["Hi"])),
            Arc::new(InMemoryStore::new()),
        )
    }

    fn chat_request(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/chat")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    async fn body_text(response: axum::response::Response) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    #[tokio::test]
    async fn health_returns_ok() {
        let app = build_router(default_state());

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "ok");
    }

    #[tokio::test]
    async fn chat_streams_data_frames() {
        let provider = Arc::new(ScriptedProvider::new(vec!["Hello", ", ", "world"]));
        let app = build_router(test_state(provider, Arc::new(InMemoryStore::new())));

        let response = app
            .oneshot(chat_request(serde_json::json!({ "message": "Say hello" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()["content-type"],
            "text/plain; charset=utf-8"
        );
        assert_eq!(response.headers()["x-vercel-ai-data-stream"], "v1");

        let text = body_text(response).await;
        let mut decoder = StreamDecoder::new();
        let frames = decoder.feed_frames(text.as_bytes());
        assert!(matches!(frames.first(), Some(StreamFrame::StartStep { .. })));
        assert!(matches!(frames.last(), Some(StreamFrame::Finish(_))));

        let answer: String = frames
            .iter()
            .filter_map(|f| match f {
                StreamFrame::TextDelta(t) => Some(t.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(answer, "Hello, world");
    }

    #[tokio::test]
    async fn chat_assembles_history_memories_and_atoms() {
        let provider = Arc::new(ScriptedProvider::new(vec!["ok"]));
        let app = build_router(test_state(provider.clone(), Arc::new(InMemoryStore::new())));

        let body = serde_json::json!({
            "message": "Next step?",
            "history": [
                { "role": "user", "content": "Plan a launch" },
                { "role": "assistant", "content": "Sure" }
            ],
            "memories": ["Prefers short answers"],
            "atoms": { "context": "B2B SaaS", "goal": "Launch plan" }
        });
        let response = app.oneshot(chat_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await;

        let seen = provider.seen.lock().unwrap().clone().unwrap();
        assert!(seen.stream);
        assert_eq!(seen.model, "gpt-4o");
        assert_eq!(seen.messages.len(), 4);
        assert_eq!(seen.messages[0].role, Role::System);
        assert!(seen.messages[0].content.contains("Prefers short answers"));
        assert!(seen.messages[0].content.contains("Launch plan"));
        assert_eq!(seen.messages[3].content, "Next step?");
    }

    #[tokio::test]
    async fn chat_forwards_message_verbatim() {
        let provider = Arc::new(ScriptedProvider::new(vec!["ok"]));
        let app = build_router(test_state(provider.clone(), Arc::new(InMemoryStore::new())));

        let message = "  code:\n    indented\n";
        let response = app
            .oneshot(chat_request(serde_json::json!({ "message": message })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        body_text(response).await;

        let seen = provider.seen.lock().unwrap().clone().unwrap();
        let last = seen.messages.last().unwrap();
        assert_eq!(last.role, Role::User);
        assert_eq!(last.content, message);
    }

    #[tokio::test]
    async fn chat_rejects_incomplete_atoms() {
        let provider = Arc::new(ScriptedProvider::new(vec!["ok"]));
        let app = build_router(test_state(provider.clone(), Arc::new(InMemoryStore::new())));

        let body = serde_json::json!({
            "message": "Review this",
            "atoms": { "role": "Auditor", "context": "Q3 books" }
        });
        let response = app.oneshot(chat_request(body)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("goal"));
        assert!(provider.seen.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn chat_rejects_blank_message() {
        let app = build_router(default_state());
        let response = app
            .oneshot(chat_request(serde_json::json!({ "message": "   " })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn upstream_refusal_is_bad_gateway() {
        let app = build_router(test_state(
            Arc::new(RefusingProvider),
            Arc::new(InMemoryStore::new()),
        ));
        let response = app
            .oneshot(chat_request(serde_json::json!({ "message": "hi" })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert!(json["error"].as_str().unwrap().contains("bad key"));
    }

    async fn seeded_store() -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        let t0 = chrono::Utc::now();
        let q = TurnRecord::new(Speaker::User, "What is Raft?", "s1", "u1")
            .with_email("ann@example.com")
            .with_created_at(t0);
        let a = TurnRecord::new(Speaker::Assistant, "A consensus protocol.", "s1", "u1")
            .with_created_at(t0 + chrono::Duration::seconds(1));
        store
            .append_feedback(FeedbackRecord::new(&a.id, 5, "rating"))
            .await
            .unwrap();
        store.append_turn(q).await.unwrap();
        store.append_turn(a).await.unwrap();
        store
    }

    #[tokio::test]
    async fn admin_stats_counts_records() {
        let app = build_router(test_state(
            Arc::new(ScriptedProvider::new(vec![])),
            seeded_store().await,
        ));
        let req = Request::builder()
            .uri("/api/admin/stats")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["total_users"], 1);
        assert_eq!(json["total_turns"], 2);
        assert_eq!(json["total_sessions"], 1);
        assert_eq!(json["total_feedback"], 1);
    }

    #[tokio::test]
    async fn admin_export_is_a_download() {
        let app = build_router(test_state(
            Arc::new(ScriptedProvider::new(vec![])),
            seeded_store().await,
        ));
        let req = Request::builder()
            .uri("/api/admin/export")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let disposition = response.headers()["content-disposition"].to_str().unwrap().to_string();
        assert!(disposition.contains("prometheus-rlhf-"));

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json[0]["prompt"], "What is Raft?");
        assert_eq!(json[0]["response"], "A consensus protocol.");
        assert_eq!(json[0]["rating"], 5);
        assert_eq!(json[0]["user_email"], "ann@example.com");
    }

    #[tokio::test]
    async fn admin_turns_searches_content() {
        let app = build_router(test_state(
            Arc::new(ScriptedProvider::new(vec![])),
            seeded_store().await,
        ));
        let req = Request::builder()
            .uri("/api/admin/turns?q=consensus&limit=5")
            .body(Body::empty())
            .unwrap();
        let response = app.oneshot(req).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        let turns = json.as_array().unwrap();
        assert_eq!(turns.len(), 1);
        assert_eq!(turns[0]["content"], "A consensus protocol.");
    }

    #[tokio::test]
    async fn rate_limit_rejects_after_window_fills() {
        let mut config = AppConfig::default();
        config.gateway.rate_limit_per_minute = 2;
        let state = Arc::new(GatewayState::new(
            config,
            Arc::new(ScriptedProvider::new(vec![])),
            Arc::new(InMemoryStore::new()),
        ));
        let app = build_router(state);

        let stats = || {
            Request::builder()
                .uri("/api/admin/stats")
                .body(Body::empty())
                .unwrap()
        };
        assert_eq!(app.clone().oneshot(stats()).await.unwrap().status(), StatusCode::OK);
        assert_eq!(app.clone().oneshot(stats()).await.unwrap().status(), StatusCode::OK);
        assert_eq!(
            app.clone().oneshot(stats()).await.unwrap().status(),
            StatusCode::TOO_MANY_REQUESTS
        );

        // Health stays reachable.
        let health = Request::builder().uri("/health").body(Body::empty()).unwrap();
        assert_eq!(app.oneshot(health).await.unwrap().status(), StatusCode::OK);
    }

    #[test]
    fn rate_limiter_separates_clients() {
        let limiter = RateLimiter::new(1, Duration::from_secs(60));
        assert!(limiter.check("a"));
        assert!(!limiter.check("a"));
        assert!(limiter.check("b"));
    }
}
