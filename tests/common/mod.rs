//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use axum::{extract::State, http::StatusCode, routing::post, Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

use waitlist_intake::config::{IntakeConfig, RateLimitBackend, Secret, StorageBackend};
use waitlist_intake::storage::MemoryStore;
use waitlist_intake::{HttpServer, IntakePipeline, Shutdown};

/// A running service instance backed by an in-memory store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub store: MemoryStore,
    pub client: reqwest::Client,
    _shutdown: Shutdown,
}

impl TestApp {
    pub fn url(&self) -> String {
        format!("http://{}/api/waitlist", self.addr)
    }

    /// POST `body` from the client at `ip`.
    pub async fn submit(&self, ip: &str, body: Value) -> reqwest::Response {
        self.client
            .post(self.url())
            .header("x-forwarded-for", ip)
            .json(&body)
            .send()
            .await
            .unwrap()
    }
}

/// Development profile, salted, memory limiter (5 per minute) and memory store.
pub fn test_config() -> IntakeConfig {
    let mut config = IntakeConfig::default();
    config.abuse.ip_hash_salt = Some(Secret::new("integration-salt"));
    config.rate_limit.backend = RateLimitBackend::Memory;
    config.storage.backend = StorageBackend::Memory;
    config
}

/// Start the real HTTP server on an ephemeral port.
pub async fn spawn_app(config: IntakeConfig) -> TestApp {
    let store = MemoryStore::new(None);
    let pipeline =
        IntakePipeline::from_config(&config, Arc::new(store.clone()), reqwest::Client::new());
    let server = HttpServer::new(&config, Arc::new(pipeline));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let shutdown = Shutdown::new();
    let rx = shutdown.subscribe();
    tokio::spawn(async move {
        let _ = server.run(listener, rx).await;
    });

    TestApp {
        addr,
        store,
        client: reqwest::Client::new(),
        _shutdown: shutdown,
    }
}

async fn serve(router: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, router).await;
    });
    format!("http://{}", addr)
}

/// Challenge verifier that answers every token with `success`.
/// Returns the `siteverify` URL.
pub async fn start_mock_verifier(success: bool) -> String {
    let router = Router::new().route(
        "/siteverify",
        post(move || async move {
            let codes: Vec<&str> = if success { vec![] } else { vec!["invalid-input-response"] };
            Json(json!({ "success": success, "error-codes": codes }))
        }),
    );
    format!("{}/siteverify", serve(router).await)
}

#[derive(Clone, Default)]
struct UpstashState {
    counters: Arc<Mutex<HashMap<String, u64>>>,
}

/// Upstash REST endpoint that evaluates the fixed window script as INCR.
pub async fn start_mock_upstash() -> String {
    async fn eval(
        State(state): State<UpstashState>,
        Json(command): Json<Vec<Value>>,
    ) -> (StatusCode, Json<Value>) {
        let Some(key) = command.get(3).and_then(Value::as_str) else {
            return (StatusCode::BAD_REQUEST, Json(json!({ "error": "ERR wrong number of arguments" })));
        };
        let mut counters = state.counters.lock().unwrap();
        let count = counters.entry(key.to_string()).or_insert(0);
        *count += 1;
        (StatusCode::OK, Json(json!({ "result": *count })))
    }

    let router = Router::new()
        .route("/", post(eval))
        .with_state(UpstashState::default());
    serve(router).await
}

/// Upstash REST endpoint that always fails.
pub async fn start_broken_upstash() -> String {
    let router = Router::new().route(
        "/",
        post(|| async { (StatusCode::SERVICE_UNAVAILABLE, "unavailable") }),
    );
    serve(router).await
}
