//! Integration tests for the request pipeline against a mock
//! chat-completion endpoint.
//!
//! The backend is a `wiremock` server, so these run offline. Tests that
//! rasterise a PDF need the pdfium shared library; they print a SKIP line
//! and return early when it cannot be bound.
//!
//! Run with:
//!   cargo test --test pipeline -- --nocapture
//!
//! To include the PDF tests:
//!   PDFIUM_LIB_PATH=/path/to/dir cargo test --test pipeline -- --nocapture

use pagelens::pipeline::render::bind_pdfium;
use pagelens::{
    Assistant, AssistantConfig, Attachment, BackendConfig, ConversationHistory, ExtractError,
    Fragment, Mode, PageLensError, RasterConfig, Request,
};
use pdfium_render::prelude::*;
use serde_json::{json, Value};
use std::time::Duration;
use wiremock::matchers::{header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

// ── Test helpers ─────────────────────────────────────────────────────────────

fn backend(server: &MockServer, model: &str, timeout_secs: u64) -> BackendConfig {
    BackendConfig::builder()
        .base_url(format!("{}/v1", server.uri()))
        .api_key("test-key")
        .model(model)
        .timeout_secs(timeout_secs)
        .build()
        .unwrap()
}

fn assistant(server: &MockServer) -> Assistant {
    Assistant::new(AssistantConfig::new(backend(server, "vision-model", 5))).unwrap()
}

fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-1",
        "choices": [{
            "index": 0,
            "message": { "role": "assistant", "content": content },
            "finish_reason": "stop"
        }]
    })
}

async fn mount_answer(server: &MockServer, content: &str) {
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("Authorization", "Bearer test-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion(content)))
        .mount(server)
        .await;
}

/// JSON bodies of every request the mock server received.
async fn sent_bodies(server: &MockServer) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap_or_default()
        .iter()
        .map(|r| r.body_json::<Value>().unwrap())
        .collect()
}

/// Build a blank PDF with `n` A4 pages, or `None` when pdfium is unavailable.
fn blank_pdf(n: usize) -> Option<Vec<u8>> {
    let pdfium = match bind_pdfium() {
        Ok(p) => p,
        Err(e) => {
            println!("SKIP — pdfium not available: {e}");
            return None;
        }
    };
    let mut doc = pdfium.create_new_pdf().unwrap();
    for _ in 0..n {
        doc.pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
    }
    Some(doc.save_to_bytes().unwrap())
}

// ── Text mode ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_text_request_sends_prompt_as_plain_string() {
    let server = MockServer::start().await;
    mount_answer(&server, "Hi there").await;

    let answer = assistant(&server).ask(Request::text("Hello")).await.unwrap();
    assert_eq!(answer.answer, "Hi there");
    assert_eq!(answer.mode, Mode::Text);
    assert_eq!(answer.pages, 0);
    assert_eq!(answer.model, "vision-model");

    let bodies = sent_bodies(&server).await;
    assert_eq!(bodies.len(), 1);
    assert_eq!(bodies[0]["model"], "vision-model");
    assert_eq!(bodies[0]["messages"], json!([{"role": "user", "content": "Hello"}]));
    assert_eq!(bodies[0]["stream"], false);
}

#[tokio::test]
async fn test_text_turns_use_text_backend_when_configured() {
    let server = MockServer::start().await;
    mount_answer(&server, "ok").await;

    let mut config = AssistantConfig::new(backend(&server, "vision-model", 5));
    config.text = Some(backend(&server, "text-model", 5));
    let a = Assistant::new(config).unwrap();

    let answer = a.ask(Request::text("Hello")).await.unwrap();
    assert_eq!(answer.model, "text-model");
    assert_eq!(sent_bodies(&server).await[0]["model"], "text-model");
}

// ── Rejections ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unsupported_upload_is_rejected_without_backend_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion("unused")))
        .expect(0)
        .mount(&server)
        .await;

    let att = Attachment::from_bytes("report.docx", b"PK\x03\x04").unwrap();
    let staging = att.staging_dir().unwrap().to_path_buf();

    let err = assistant(&server)
        .ask(Request::text("Summarize").attachment(att))
        .await
        .unwrap_err();

    assert_eq!(err.status_hint(), 400);
    match &err {
        PageLensError::Rejected(c) => assert_eq!(c.reason, "unsupported file type: .docx"),
        other => panic!("expected rejection, got {other:?}"),
    }
    assert!(!staging.exists());
}

#[tokio::test]
async fn test_empty_text_prompt_is_rejected() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = assistant(&server).ask(Request::text("")).await.unwrap_err();
    assert_eq!(err.kind(), "client_error");
}

// ── Image mode ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_image_request_builds_text_then_image_part() {
    let server = MockServer::start().await;
    mount_answer(&server, "A red square.").await;

    let png = b"\x89PNG\r\n\x1a\nfake-image-bytes";
    let att = Attachment::from_bytes("square.png", png).unwrap();
    let answer = assistant(&server)
        .ask(Request::text("What is this?").attachment(att))
        .await
        .unwrap();
    assert_eq!(answer.mode, Mode::Image);
    assert_eq!(answer.filename.as_deref(), Some("square.png"));

    let bodies = sent_bodies(&server).await;
    let content = bodies[0]["messages"][0]["content"].as_array().unwrap().clone();
    assert_eq!(content.len(), 2);
    assert_eq!(content[0], json!({"type": "text", "text": "What is this?"}));
    assert_eq!(content[1]["type"], "image_url");
    let url = content[1]["image_url"]["url"].as_str().unwrap();
    assert!(url.starts_with("data:image/png;base64,"), "got {url}");
}

#[tokio::test]
async fn test_image_without_prompt_gets_default_question() {
    let server = MockServer::start().await;
    mount_answer(&server, "A cat.").await;

    let att = Attachment::from_bytes("cat.JPEG", b"jpeg-bytes").unwrap();
    assistant(&server)
        .ask(Request::new().attachment(att))
        .await
        .unwrap();

    let bodies = sent_bodies(&server).await;
    let content = &bodies[0]["messages"][0]["content"];
    assert_eq!(content[0]["text"], "What is in this image?");
    assert!(content[1]["image_url"]["url"]
        .as_str()
        .unwrap()
        .starts_with("data:image/jpeg;base64,"));
}

// ── Backend failures ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_non_success_status_carries_status_and_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
        .mount(&server)
        .await;

    let err = assistant(&server).ask(Request::text("Hello")).await.unwrap_err();
    match &err {
        PageLensError::Backend { status, body } => {
            assert_eq!(*status, 500);
            assert_eq!(body, "upstream exploded");
        }
        other => panic!("expected backend error, got {other:?}"),
    }
    assert_eq!(err.status_hint(), 502);
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_embedded_error_field_is_backend_reported() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"error": {"message": "quota exceeded", "code": 1113}})),
        )
        .mount(&server)
        .await;

    let err = assistant(&server).ask(Request::text("Hello")).await.unwrap_err();
    assert!(matches!(
        err,
        PageLensError::Extract(ExtractError::BackendReported(ref m)) if m == "quota exceeded"
    ));
}

#[tokio::test]
async fn test_non_json_body_is_malformed_response() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>gateway</html>"))
        .mount(&server)
        .await;

    let err = assistant(&server).ask(Request::text("Hello")).await.unwrap_err();
    assert!(matches!(
        err,
        PageLensError::Extract(ExtractError::MalformedResponse)
    ));
}

#[tokio::test]
async fn test_empty_choices_is_named() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"choices": []})))
        .mount(&server)
        .await;

    let err = assistant(&server).ask(Request::text("Hello")).await.unwrap_err();
    assert!(matches!(err, PageLensError::Extract(ExtractError::EmptyChoices)));
}

// ── Transport failures ───────────────────────────────────────────────────────

#[tokio::test]
async fn test_slow_backend_times_out_and_releases_upload() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion("too late"))
                .set_delay(Duration::from_secs(3)),
        )
        .mount(&server)
        .await;

    let a = Assistant::new(AssistantConfig::new(backend(&server, "vision-model", 1))).unwrap();
    let att = Attachment::from_bytes("photo.webp", b"RIFF....WEBP").unwrap();
    let staging = att.staging_dir().unwrap().to_path_buf();

    let err = a
        .ask(Request::text("Describe").attachment(att))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "timeout");
    assert_eq!(err.status_hint(), 504);
    assert!(err.is_retryable());
    assert!(!staging.exists(), "temp dir must be removed on failure");
}

#[tokio::test]
async fn test_unreachable_backend_is_connection_error() {
    // Reserve a free port, then release it so nothing is listening there.
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let config = BackendConfig::builder()
        .base_url(format!("http://{addr}/v1"))
        .api_key("test-key")
        .model("vision-model")
        .timeout_secs(5)
        .build()
        .unwrap();
    let a = Assistant::new(AssistantConfig::new(config)).unwrap();
    let err = a.ask(Request::text("Hello")).await.unwrap_err();
    assert!(matches!(err, PageLensError::Connection { .. }), "got {err:?}");
    assert_eq!(err.kind(), "connection");
    assert_eq!(err.status_hint(), 503);
    assert!(err.is_retryable());
}

// ── History ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_history_grows_only_on_success() {
    let server = MockServer::start().await;
    mount_answer(&server, "Hi").await;

    let a = assistant(&server);
    let mut history = ConversationHistory::new();

    a.ask_with_history(Request::text("Hello"), &mut history)
        .await
        .unwrap();
    a.ask_with_history(Request::text("And again"), &mut history)
        .await
        .unwrap();
    assert_eq!(history.len(), 4);

    let bodies = sent_bodies(&server).await;
    assert_eq!(bodies[0]["messages"].as_array().unwrap().len(), 1);
    assert_eq!(
        bodies[1]["messages"],
        json!([
            {"role": "user", "content": "Hello"},
            {"role": "assistant", "content": "Hi"},
            {"role": "user", "content": "And again"}
        ])
    );

    // A rejected turn leaves the history as it was.
    let err = a
        .ask_with_history(Request::text("  "), &mut history)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), "client_error");
    assert_eq!(history.len(), 4);
}

// ── Streaming ────────────────────────────────────────────────────────────────

fn sse(lines: &[&str]) -> String {
    lines.iter().map(|l| format!("data: {l}\n\n")).collect()
}

#[tokio::test]
async fn test_streamed_answer_is_assembled_and_recorded() {
    let server = MockServer::start().await;
    let body = sse(&[
        r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
        r#"{"choices":[{"delta":{"reasoning_content":"greeting back"}}]}"#,
        r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
        r#"{"choices":[{"delta":{"content":"lo!"}}]}"#,
        r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2}}"#,
        "[DONE]",
    ]);
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .expect(1)
        .mount(&server)
        .await;

    let mut history = ConversationHistory::new();
    let mut fragments = Vec::new();
    let answer = assistant(&server)
        .ask_streaming(Request::text("Hello"), Some(&mut history), |f| {
            fragments.push(f.clone())
        })
        .await
        .unwrap();

    assert_eq!(answer.answer, "Hello!");
    assert_eq!(answer.reasoning.as_deref(), Some("greeting back"));
    assert_eq!(
        fragments,
        vec![
            Fragment::Reasoning("greeting back".into()),
            Fragment::Content("Hel".into()),
            Fragment::Content("lo!".into()),
        ]
    );
    assert_eq!(history.len(), 2);
    assert_eq!(history.last_answer(), Some("Hello!"));

    let bodies = sent_bodies(&server).await;
    assert_eq!(bodies[0]["stream"], true);
    assert_eq!(bodies[0]["stream_options"], json!({"include_usage": true}));
}

#[tokio::test]
async fn test_streamed_failure_leaves_history_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
        .mount(&server)
        .await;

    let mut history = ConversationHistory::new();
    let err = assistant(&server)
        .ask_streaming(Request::text("Hello"), Some(&mut history), |_| {})
        .await
        .unwrap_err();
    assert!(matches!(err, PageLensError::Backend { status: 429, .. }));
    assert!(history.is_empty());
}

// ── PDF mode (needs pdfium) ──────────────────────────────────────────────────

#[tokio::test]
async fn test_pdf_pages_follow_prompt_in_order() {
    let Some(pdf) = blank_pdf(3) else { return };
    let server = MockServer::start().await;
    mount_answer(&server, "Three blank pages.").await;

    let out = tempfile::tempdir().unwrap();
    let mut config = AssistantConfig::new(backend(&server, "vision-model", 5));
    config.raster = RasterConfig {
        output_dir: Some(out.path().to_path_buf()),
        ..RasterConfig::default()
    };
    let a = Assistant::new(config).unwrap();

    let att = Attachment::from_bytes("report.pdf", &pdf).unwrap();
    let answer = a
        .ask(Request::text("Summarize").attachment(att))
        .await
        .unwrap();
    assert_eq!(answer.mode, Mode::Pdf);
    assert_eq!(answer.pages, 3);
    assert_eq!(answer.filename.as_deref(), Some("report.pdf"));

    let bodies = sent_bodies(&server).await;
    let content = bodies[0]["messages"][0]["content"].as_array().unwrap().clone();
    assert_eq!(content.len(), 4);
    assert_eq!(content[0]["text"], "Summarize");
    for part in &content[1..] {
        assert!(part["image_url"]["url"]
            .as_str()
            .unwrap()
            .starts_with("data:image/png;base64,"));
    }

    for n in 1..=3 {
        assert!(out.path().join(format!("report_page{n}.png")).exists());
    }
}

#[tokio::test]
async fn test_pdf_with_text_hint_reads_text_layer() {
    let Some(pdf) = blank_pdf(2) else { return };
    let server = MockServer::start().await;
    mount_answer(&server, "Nothing written.").await;

    let mut config = AssistantConfig::new(backend(&server, "vision-model", 5));
    config.text = Some(backend(&server, "text-model", 5));
    let a = Assistant::new(config).unwrap();

    let att = Attachment::from_bytes("blank.pdf", &pdf).unwrap();
    let answer = a
        .ask(
            Request::text("What does it say?")
                .attachment(att)
                .model_type("text"),
        )
        .await
        .unwrap();
    assert_eq!(answer.mode, Mode::Pdf);
    assert_eq!(answer.pages, 2);
    assert_eq!(answer.model, "text-model");

    let bodies = sent_bodies(&server).await;
    let prompt = bodies[0]["messages"][0]["content"].as_str().unwrap();
    assert!(prompt.starts_with("The following is the content of a PDF document:"));
    assert!(prompt.contains("The PDF has 2 pages."));
    assert!(prompt.contains("Question: What does it say?"));
}

#[tokio::test]
async fn test_corrupt_pdf_is_client_error() {
    if blank_pdf(0).is_none() {
        return;
    }
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let att = Attachment::from_bytes("broken.pdf", b"%PDF-1.7\nthis is not a real pdf").unwrap();
    let err = assistant(&server)
        .ask(Request::text("Summarize").attachment(att))
        .await
        .unwrap_err();
    assert!(matches!(err, PageLensError::CorruptPdf { .. }), "got {err:?}");
    assert_eq!(err.status_hint(), 400);
}
