//! Integration tests for the HTTP clients.
//!
//! These tests start a real axum server on a random port that stands in for
//! the summarization provider and the context-editing endpoint.

use std::sync::{Arc, Mutex};

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use chat_context::api::anthropic::{EditRequest, EditResponse, RemoteContextEditor};
use chat_context::context::eviction::LocalContextEditor;
use chat_context::context::manager::{ANTHROPIC_KEY_VAR, CONTEXT_EDIT_URL_VAR};
use chat_context::context::summarizer::CompletionRequest;
use chat_context::prelude::*;
use serde_json::{Value, json};

/// Requests seen by the fake server: headers of interest plus the body.
#[derive(Clone, Default)]
struct Seen(Arc<Mutex<Vec<(HeaderMap, Value)>>>);

impl Seen {
    fn record(&self, headers: HeaderMap, body: Value) {
        self.0.lock().unwrap().push((headers, body));
    }

    fn take(&self) -> Vec<(HeaderMap, Value)> {
        std::mem::take(&mut *self.0.lock().unwrap())
    }
}

/// Helper: serve `app` on port 0 (random available port).
async fn spawn_test_server(app: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

async fn chat_ok(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Json<Value> {
    seen.record(headers, body);
    Json(json!({
        "choices": [{
            "message": {"content": "KEY DATA POINTS:\n- order 4411 shipped"},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 120, "completion_tokens": 12, "total_tokens": 132}
    }))
}

async fn chat_overloaded() -> (StatusCode, &'static str) {
    (StatusCode::TOO_MANY_REQUESTS, "rate limited")
}

async fn chat_empty() -> Json<Value> {
    Json(json!({"choices": [{"message": {"content": "   "}, "finish_reason": "stop"}]}))
}

/// Applies the directives in-process, like a provider would.
async fn edit_locally(
    State(seen): State<Seen>,
    headers: HeaderMap,
    Json(request): Json<EditRequest>,
) -> Json<EditResponse> {
    seen.record(headers, serde_json::to_value(&request).unwrap());
    Json(LocalContextEditor::default().apply(&request))
}

async fn edit_unauthorized() -> (StatusCode, &'static str) {
    (StatusCode::UNAUTHORIZED, "invalid x-api-key")
}

fn router(seen: &Seen) -> Router {
    Router::new()
        .route("/chat", post(chat_ok))
        .route("/chat/overloaded", post(chat_overloaded))
        .route("/chat/empty", post(chat_empty))
        .route("/edit", post(edit_locally))
        .route("/edit/unauthorized", post(edit_unauthorized))
        .with_state(seen.clone())
}

fn tool_heavy_window() -> Vec<Message> {
    let mut msgs = vec![
        Message::system("You are a support agent."),
        Message::user("Where is order 4411?"),
    ];
    for (i, id) in ["toolu_1", "toolu_2", "toolu_3", "toolu_4", "toolu_5"]
        .into_iter()
        .enumerate()
    {
        msgs.push(Message::assistant_tool_calls(vec![ContentPart::tool_call(
            id,
            "lookup_order",
            json!({"order": 4411, "page": i}),
        )]));
        msgs.push(Message::tool_result(id, "lookup_order", "row ".repeat(500)));
    }
    msgs.push(Message::assistant_text("Order 4411 shipped yesterday."));
    msgs
}

// ── Summarization client ─────────────────────────────────────────────

#[tokio::test]
async fn openrouter_client_sends_summary_request() {
    let seen = Seen::default();
    let base = spawn_test_server(router(&seen)).await;
    let client = OpenRouterClient::with_url("sk-or-test", format!("{base}/chat")).unwrap();

    let completion = client
        .complete(CompletionRequest {
            model: "openai/gpt-4o-mini".into(),
            system_prompt: "Summarize.".into(),
            messages: vec![
                Message::user("USER: where is my order"),
                Message::tool_result("c1", "lookup_order", "shipped"),
            ],
            max_output_tokens: 256,
        })
        .await
        .unwrap();
    assert_eq!(completion.text, "KEY DATA POINTS:\n- order 4411 shipped");

    let requests = seen.take();
    assert_eq!(requests.len(), 1);
    let (headers, body) = &requests[0];
    assert_eq!(headers["authorization"], "Bearer sk-or-test");
    assert_eq!(body["model"], "openai/gpt-4o-mini");
    assert_eq!(body["max_tokens"], 256);
    assert_eq!(body["messages"][0]["role"], "system");
    assert_eq!(body["messages"][0]["content"], "Summarize.");
    // Tool output travels as user text.
    assert_eq!(body["messages"][2]["role"], "user");
}

#[tokio::test]
async fn openrouter_rate_limit_is_a_transient_api_error() {
    let seen = Seen::default();
    let base = spawn_test_server(router(&seen)).await;
    let client = OpenRouterClient::with_url("k", format!("{base}/chat/overloaded")).unwrap();

    let err = client
        .complete(CompletionRequest {
            model: "m".into(),
            system_prompt: "s".into(),
            messages: vec![Message::user("u")],
            max_output_tokens: 16,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::Api { status: 429, .. }));
    assert!(err.is_transient());
}

#[tokio::test]
async fn blank_completion_is_empty_response() {
    let seen = Seen::default();
    let base = spawn_test_server(router(&seen)).await;
    let client = OpenRouterClient::with_url("k", format!("{base}/chat/empty")).unwrap();

    let err = client
        .complete(CompletionRequest {
            model: "m".into(),
            system_prompt: "s".into(),
            messages: vec![],
            max_output_tokens: 16,
        })
        .await
        .unwrap_err();
    assert!(matches!(err, ContextError::EmptyResponse));
}

#[tokio::test]
async fn manager_summarizes_through_http_model() {
    let seen = Seen::default();
    let base = spawn_test_server(router(&seen)).await;
    let client = OpenRouterClient::with_url("k", format!("{base}/chat")).unwrap();
    let manager = ContextManager::new(ContextBudget::new(300).with_keep_recent(3))
        .with_summary_model(Arc::new(client));

    let result = manager.manage(&tool_heavy_window()).await;
    assert_eq!(result.method, CompactionMethod::Summarization);
    assert!(result.messages[0].text_content().contains("order 4411 shipped"));
}

// ── Context-editing client ───────────────────────────────────────────

#[tokio::test]
async fn remote_editor_sends_beta_headers_and_directives() {
    let seen = Seen::default();
    let base = spawn_test_server(router(&seen)).await;
    let editor = RemoteContextEditor::new("sk-ant-test", format!("{base}/edit")).unwrap();
    let budget = ContextBudget::new(500).with_keep_recent(2);
    let manager = ContextManager::new(budget).with_context_editor(Arc::new(editor));

    let window = tool_heavy_window();
    let result = manager.manage(&window).await;
    assert_eq!(result.method, CompactionMethod::ProviderEdit);
    assert_eq!(result.messages.len(), window.len());
    assert_eq!(result.messages[0], Message::system("You are a support agent."));
    assert!(result.tokens_saved > 0);

    let requests = seen.take();
    let (headers, body) = &requests[0];
    assert_eq!(headers["x-api-key"], "sk-ant-test");
    assert_eq!(headers["anthropic-version"], "2023-06-01");
    assert_eq!(headers["anthropic-beta"], "context-management-2025-06-27");
    assert_eq!(body["system"][0]["text"], "You are a support agent.");
    assert_eq!(body["messages"][1]["content"][0]["type"], "tool_use");
    let edits = body["context_management"]["edits"].as_array().unwrap();
    assert_eq!(edits[0]["type"], "clear_thinking_20251015");
    assert_eq!(edits[1]["type"], "clear_tool_uses_20250919");
}

#[tokio::test]
async fn rejected_edit_falls_back_to_summary() {
    let seen = Seen::default();
    let base = spawn_test_server(router(&seen)).await;
    let editor = RemoteContextEditor::new("bad", format!("{base}/edit/unauthorized")).unwrap();
    let model = OpenRouterClient::with_url("k", format!("{base}/chat")).unwrap();
    let manager = ContextManager::new(ContextBudget::new(500).with_keep_recent(2))
        .with_context_editor(Arc::new(editor))
        .with_summary_model(Arc::new(model));

    let result = manager.manage(&tool_heavy_window()).await;
    assert_eq!(result.method, CompactionMethod::Summarization);
    assert!(result.summarized);
}

#[tokio::test]
async fn editor_configured_from_lookup() {
    let seen = Seen::default();
    let base = spawn_test_server(router(&seen)).await;
    let url = format!("{base}/edit");
    let lookup = |key: &str| match key {
        k if k == ANTHROPIC_KEY_VAR => Some("sk-ant-env".to_string()),
        k if k == CONTEXT_EDIT_URL_VAR => Some(url.clone()),
        _ => None,
    };
    let budget = ContextBudget::new(500)
        .with_keep_recent(2)
        .with_strategy(StrategyKind::ProviderEdit);
    let manager = ContextManager::from_lookup(budget, lookup);
    assert!(manager.has_context_editor());
    assert!(!manager.has_summarizer());

    let result = manager.manage(&tool_heavy_window()).await;
    assert_eq!(result.method, CompactionMethod::ProviderEdit);
    assert_eq!(seen.take()[0].0["x-api-key"], "sk-ant-env");
}
