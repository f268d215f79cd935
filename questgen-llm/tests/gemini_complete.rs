use httpmock::prelude::*;
use secrecy::SecretString;
use serde_json::json;

use questgen_core::{CompletionRequest, ProviderErrorKind, TextGenerator, TokenUsage};
use questgen_llm::GeminiClient;

fn client(server: &MockServer) -> GeminiClient {
    GeminiClient::new(SecretString::new("test-key".to_string()), "gemini-1.5-flash")
        .unwrap()
        .with_base_url(server.url(""))
        .unwrap()
}

#[tokio::test]
async fn complete_maps_text_and_usage() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-1.5-flash:generateContent")
            .query_param("key", "test-key")
            .json_body(json!({
                "contents": [
                    { "role": "user", "parts": [{ "text": "Create a quest" }] }
                ],
                "generationConfig": { "temperature": 0.5, "maxOutputTokens": 256 }
            }));
        then.status(200).json_body(json!({
            "candidates": [
                {
                    "content": {
                        "parts": [
                            { "text": "{\"title\": " },
                            { "text": "\"Volcano Explorer\"}" }
                        ]
                    },
                    "finishReason": "STOP"
                }
            ],
            "usageMetadata": {
                "promptTokenCount": 12,
                "candidatesTokenCount": 8,
                "totalTokenCount": 20
            }
        }));
    });

    let mut request = CompletionRequest::new("Create a quest", 0.5);
    request.max_output_tokens = Some(256);
    let completion = client(&server).complete(request).await.unwrap();

    assert_eq!(completion.text, r#"{"title": "Volcano Explorer"}"#);
    assert_eq!(completion.finish_reason.as_deref(), Some("STOP"));
    assert_eq!(
        completion.usage,
        Some(TokenUsage {
            prompt_tokens: 12,
            completion_tokens: 8,
            total_tokens: 20,
        })
    );
    mock.assert();
}

#[tokio::test]
async fn request_model_overrides_default() {
    let server = MockServer::start();
    let mock = server.mock(|when, then| {
        when.method(POST)
            .path("/v1beta/models/gemini-2.0-flash:generateContent");
        then.status(200).json_body(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{}" }] } }]
        }));
    });

    let mut request = CompletionRequest::new("hi", 0.7);
    request.model = Some("models/gemini-2.0-flash".to_string());
    client(&server).complete(request).await.unwrap();

    mock.assert();
}

#[tokio::test]
async fn rate_limit_is_transient_with_retry_after() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST);
        then.status(429)
            .header("Retry-After", "3")
            .json_body(json!({ "error": { "code": 429, "message": "Resource has been exhausted" } }));
    });

    let err = client(&server)
        .complete(CompletionRequest::new("hi", 0.7))
        .await
        .unwrap_err();

    assert_eq!(
        err.kind,
        ProviderErrorKind::RateLimited {
            retry_after: Some(std::time::Duration::from_secs(3))
        }
    );
    assert_eq!(err.message, "Resource has been exhausted");
    assert!(err.is_transient());
}

#[tokio::test]
async fn server_error_is_transient() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST);
        then.status(503).body("upstream unavailable");
    });

    let err = client(&server)
        .complete(CompletionRequest::new("hi", 0.7))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Server { status: 503 });
    assert!(err.message.contains("upstream unavailable"));
    assert!(err.is_transient());
}

#[tokio::test]
async fn invalid_key_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST);
        then.status(400).json_body(json!({
            "error": {
                "code": 400,
                "message": "API key not valid. Please pass a valid API key.",
                "status": "INVALID_ARGUMENT"
            }
        }));
    });

    let err = client(&server)
        .complete(CompletionRequest::new("hi", 0.7))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Auth);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn safety_block_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST);
        then.status(200).json_body(json!({
            "candidates": [{ "content": { "parts": [] }, "finishReason": "SAFETY" }]
        }));
    });

    let err = client(&server)
        .complete(CompletionRequest::new("hi", 0.7))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Blocked);
    assert!(!err.is_transient());
}

#[tokio::test]
async fn blocked_prompt_without_candidates_is_fatal() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST);
        then.status(200)
            .json_body(json!({ "promptFeedback": { "blockReason": "SAFETY" } }));
    });

    let err = client(&server)
        .complete(CompletionRequest::new("hi", 0.7))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Blocked);
}

#[tokio::test]
async fn undecodable_body_is_malformed() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST);
        then.status(200).body("<html>gateway</html>");
    });

    let err = client(&server)
        .complete(CompletionRequest::new("hi", 0.7))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Malformed);
    assert!(err.is_transient());
}

#[tokio::test]
async fn unreachable_host_is_a_network_failure() {
    let client = GeminiClient::new(SecretString::new("k".to_string()), "gemini-1.5-flash")
        .unwrap()
        .with_base_url("http://127.0.0.1:1")
        .unwrap();

    let err = client
        .complete(CompletionRequest::new("hi", 0.7))
        .await
        .unwrap_err();

    assert_eq!(err.kind, ProviderErrorKind::Network);
}
