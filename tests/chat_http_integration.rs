//! Integration tests for the survey HTTP API.
//!
//! Each test spins up an Axum server on a random port backed by an
//! in-memory libSQL store and a stub model, then drives it with reqwest.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use survey_followup::error::LlmError;
use survey_followup::llm::{CompletionRequest, CompletionResponse, FinishReason, LlmProvider};
use survey_followup::store::{LibSqlBackend, SessionRepository, SessionStore};
use survey_followup::survey::{
    AppState, ChatbotConfig, ConfigStore, ConversationMode, ConversationPolicy, build_router,
};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(10);

const CONCLUSION: &str = "Thank you, that's helpful feedback on those points";

/// Stub model: answers extraction prompts with fixed points and follow-up
/// prompts with a question naming the target point.
struct StubLlm;

#[async_trait]
impl LlmProvider for StubLlm {
    fn model_name(&self) -> &str {
        "stub"
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let prompt = request
            .conversation()
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();

        let content = if prompt.contains("comma-separated") {
            if prompt.contains("nothing") {
                "NONE".to_string()
            } else {
                "price, usability".to_string()
            }
        } else if prompt.contains("about 'price'") {
            "What about the price feels off?".to_string()
        } else if prompt.contains("about 'usability'") {
            "Which tasks feel hardest to complete?".to_string()
        } else {
            "Could you say more about that?".to_string()
        };

        Ok(CompletionResponse {
            content,
            input_tokens: 0,
            output_tokens: 0,
            finish_reason: FinishReason::Stop,
        })
    }
}

/// Model that panics, to exercise the 500 path.
struct PanickingLlm;

#[async_trait]
impl LlmProvider for PanickingLlm {
    fn model_name(&self) -> &str {
        "panicking"
    }

    async fn complete(&self, _request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        panic!("model exploded");
    }
}

/// Start a server on a random port, return its base URL.
async fn start_server(llm: Arc<dyn LlmProvider>, static_dir: &std::path::Path) -> String {
    let repo: Arc<dyn SessionRepository> = Arc::new(LibSqlBackend::new_memory().await.unwrap());
    let policy = ConversationPolicy::new(
        SessionStore::new(Arc::clone(&repo)),
        llm,
        ConversationMode::PointTracking,
    );
    let state = AppState {
        policy: Arc::new(policy),
        config: Arc::new(ConfigStore::new(ChatbotConfig::default(), repo)),
        llm_ready: true,
        storage_ready: true,
    };
    let app = build_router(state, &["*".to_string()], static_dir);

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    // Give the server a moment to start accepting connections.
    tokio::time::sleep(Duration::from_millis(50)).await;

    format!("http://127.0.0.1:{port}")
}

async fn chat(client: &reqwest::Client, base: &str, session_id: &str, prompt: &str) -> (u16, Value) {
    let response = client
        .post(format!("{base}/generate_chat"))
        .json(&json!({"session_id": session_id, "prompt": prompt}))
        .send()
        .await
        .unwrap();
    let status = response.status().as_u16();
    (status, response.json().await.unwrap())
}

#[tokio::test]
async fn full_conversation_walks_points_then_concludes() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(Arc::new(StubLlm), dir.path()).await;
        let client = reqwest::Client::new();

        let (status, first) = chat(&client, &base, "conv-1", "Too expensive and clunky").await;
        assert_eq!(status, 200);
        assert_eq!(first["response"], "What about the price feels off?");

        let (_, second) = chat(&client, &base, "conv-1", "The monthly fee").await;
        assert_eq!(second["response"], "Which tasks feel hardest to complete?");

        let (_, third) = chat(&client, &base, "conv-1", "Exporting reports").await;
        assert_eq!(third["response"], CONCLUSION);

        let (_, after) = chat(&client, &base, "conv-1", "One more thing").await;
        assert_eq!(after["response"], CONCLUSION);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn sessions_are_independent() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(Arc::new(StubLlm), dir.path()).await;
        let client = reqwest::Client::new();

        chat(&client, &base, "a", "Too expensive and clunky").await;
        let (_, other) = chat(&client, &base, "b", "Too expensive and clunky").await;
        assert_eq!(other["response"], "What about the price feels off?");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn no_points_asks_for_clarification_then_restarts() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(Arc::new(StubLlm), dir.path()).await;
        let client = reqwest::Client::new();

        let (_, first) = chat(&client, &base, "c1", "nothing really").await;
        assert!(first["response"].as_str().unwrap().contains("tell me more"));

        let (_, retry) = chat(&client, &base, "c1", "Pricing is confusing").await;
        assert_eq!(retry["response"], "What about the price feels off?");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn validation_errors() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(Arc::new(StubLlm), dir.path()).await;
        let client = reqwest::Client::new();

        let (status, body) = chat(&client, &base, "", "hello").await;
        assert_eq!(status, 400);
        assert!(body["detail"].is_string());

        let (status, body) = chat(&client, &base, "v1", "").await;
        assert_eq!(status, 200);
        assert_eq!(body["response"], "Please type a response.");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn panicking_turn_returns_generic_500() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(Arc::new(PanickingLlm), dir.path()).await;
        let client = reqwest::Client::new();

        let (status, body) = chat(&client, &base, "p1", "Too slow").await;
        assert_eq!(status, 500);
        assert_eq!(body["detail"], "Internal Server Error processing request.");
        assert!(!body.to_string().contains("exploded"));

        // The server keeps serving other requests.
        let health = client.get(format!("{base}/health")).send().await.unwrap();
        assert_eq!(health.status().as_u16(), 200);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn config_update_is_seen_by_next_page() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(Arc::new(StubLlm), dir.path()).await;
        let client = reqwest::Client::new();

        let response = client
            .post(format!("{base}/config"))
            .json(&json!({
                "initialQuestion": "What slowed down your last export?",
                "promptParams": {"maxFollowUps": 3},
                "uiConfig": {"title": "Export feedback"}
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);

        let page = client
            .get(format!("{base}/?session_id=page-1"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(page.contains("What slowed down your last export?"));
        assert!(page.contains("Export feedback"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn form_post_and_resume() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let base = start_server(Arc::new(StubLlm), dir.path()).await;
        let client = reqwest::Client::new();

        let page = client
            .post(format!("{base}/"))
            .form(&[("session_id", "form-1"), ("prompt", "Too expensive and clunky")])
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(page.contains("Too expensive and clunky"));
        assert!(page.contains("What about the price feels off?"));

        let resumed = client
            .get(format!("{base}/?session_id=form-1"))
            .send()
            .await
            .unwrap()
            .text()
            .await
            .unwrap();
        assert!(resumed.contains("What about the price feels off?"));
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn serves_static_assets_with_cors() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("embed.js"), "console.log('embed');").unwrap();
        let base = start_server(Arc::new(StubLlm), dir.path()).await;
        let client = reqwest::Client::new();

        let response = client
            .get(format!("{base}/static/embed.js"))
            .header("Origin", "https://shop.example")
            .send()
            .await
            .unwrap();
        assert_eq!(response.status().as_u16(), 200);
        assert_eq!(
            response.headers()["access-control-allow-origin"],
            "*"
        );
        assert!(response.text().await.unwrap().contains("embed"));
    })
    .await
    .expect("test timed out");
}
