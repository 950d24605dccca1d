//! OpenAI plugin tests, including SSE streaming against wiremock.

use mintflow::{standard_registry, Error, ExecutionContext};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn ctx_for(server: &MockServer) -> ExecutionContext {
    ExecutionContext::builder()
        .override_base_url("openai", server.uri())
        .build()
        .expect("context creation should succeed")
}

#[tokio::test]
async fn generate_text_extracts_the_first_choice() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(header("authorization", "Bearer sk-test"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [
                { "role": "system", "content": "Be brief." },
                { "role": "user", "content": "Say hi" }
            ]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [
                { "index": 0, "message": { "role": "assistant", "content": "Hi!" } }
            ],
            "usage": { "prompt_tokens": 9, "completion_tokens": 2, "total_tokens": 11 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let out = registry
        .dispatch(
            "openai",
            "generate_text",
            json!({
                "apiKey": "sk-test",
                "model": "gpt-4o-mini",
                "prompt": "Say hi",
                "systemPrompt": "Be brief."
            }),
            &ctx_for(&server),
        )
        .await
        .expect("generate_text should succeed");

    assert_eq!(out["text"], "Hi!");
    assert_eq!(out["model"], "gpt-4o-mini");
    assert_eq!(out["usage"]["total_tokens"], 11);
}

#[tokio::test]
async fn stream_text_accumulates_sse_deltas() {
    let server = MockServer::start().await;

    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"role\":\"assistant\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hel\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"lo \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"world\"}}]}\n\n",
        "data: [DONE]\n\n",
    );

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({ "stream": true })))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_raw(body.as_bytes().to_vec(), "text/event-stream"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let out = registry
        .dispatch(
            "openai",
            "stream_text",
            json!({
                "apiKey": "sk-test",
                "model": "gpt-4o-mini",
                "prompt": "Say hello"
            }),
            &ctx_for(&server),
        )
        .await
        .expect("stream_text should succeed");

    assert_eq!(out["text"], "Hello world");
    assert_eq!(out["chunks"], 3);
}

#[tokio::test]
async fn create_embedding_returns_vectors_per_input() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/embeddings"))
        .and(body_partial_json(json!({
            "model": "text-embedding-3-small",
            "input": "hello"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "model": "text-embedding-3-small",
            "data": [
                { "index": 0, "embedding": [0.1, 0.2, 0.3] }
            ],
            "usage": { "prompt_tokens": 1, "total_tokens": 1 }
        })))
        .expect(1)
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let out = registry
        .dispatch(
            "openai",
            "create_embedding",
            json!({
                "apiKey": "sk-test",
                "model": "text-embedding-3-small",
                "input": "hello"
            }),
            &ctx_for(&server),
        )
        .await
        .expect("create_embedding should succeed");

    assert_eq!(out["embeddings"][0], json!([0.1, 0.2, 0.3]));
}

#[tokio::test]
async fn rate_limit_error_carries_the_openai_label_and_code() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(429).set_body_json(json!({
            "error": {
                "code": "rate_limit_exceeded",
                "message": "Rate limit reached"
            }
        })))
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let err = registry
        .dispatch(
            "openai",
            "generate_text",
            json!({
                "apiKey": "sk-test",
                "model": "gpt-4o-mini",
                "prompt": "hi"
            }),
            &ctx_for(&server),
        )
        .await
        .unwrap_err();

    let Error::Upstream(details) = err else {
        panic!("expected Upstream, got {err:?}");
    };
    assert_eq!(details.status, Some(429));
    assert_eq!(details.code.as_deref(), Some("rate_limit_exceeded"));
    assert_eq!(
        details.to_string(),
        "OpenAI API error (429): Rate limit reached"
    );
}

#[tokio::test]
async fn streaming_error_status_fails_before_reading_the_body_stream() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(401).set_body_json(json!({
            "error": { "message": "Incorrect API key provided" }
        })))
        .mount(&server)
        .await;

    let registry = standard_registry().expect("registry should build");
    let err = registry
        .dispatch(
            "openai",
            "stream_text",
            json!({
                "apiKey": "sk-bad",
                "model": "gpt-4o-mini",
                "prompt": "hi"
            }),
            &ctx_for(&server),
        )
        .await
        .unwrap_err();

    assert_eq!(
        err.to_string(),
        "OpenAI API error (401): Incorrect API key provided"
    );
}
