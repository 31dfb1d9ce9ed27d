//! Gemini transport against a local mock server.

use std::collections::BTreeMap;
use std::time::Duration;

use httpmock::prelude::*;
use indent_tracker_assist::{
    AssistClient, AssistConfig, ReplyOutcome, RetryPolicy, SYSTEM_INSTRUCTION,
};
use serde_json::json;

const GENERATE_PATH: &str = "/v1beta/models/gemini-2.0-flash:generateContent";

fn config(server: &MockServer) -> AssistConfig {
    AssistConfig {
        base_url: server.base_url(),
        retry: RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(1),
        },
        ..AssistConfig::new("test-key")
    }
}

#[tokio::test]
async fn test_success_sends_prompt_and_reads_first_candidate() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path(GENERATE_PATH)
                .header("x-goog-api-key", "test-key")
                .json_body_partial(
                    json!({
                        "systemInstruction": { "parts": [{ "text": SYSTEM_INSTRUCTION }] }
                    })
                    .to_string(),
                );
            then.status(200).json_body(json!({
                "candidates": [{
                    "content": { "parts": [{ "text": "Salam, ubat wad 4A sudah siap untuk diambil." }] }
                }]
            }));
        })
        .await;

    let client = AssistClient::new(&config(&server)).unwrap();
    let reply = client
        .draft_ready_notification("4A", "Floor Stock", "Farmasi Satelit 1")
        .await;

    mock.assert_hits_async(1).await;
    assert_eq!(reply.outcome, ReplyOutcome::Generated);
    assert_eq!(reply.text, "Salam, ubat wad 4A sudah siap untuk diambil.");
}

#[tokio::test]
async fn test_server_errors_retried_five_times_then_fallback() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(500).body("internal");
        })
        .await;

    let client = AssistClient::new(&config(&server)).unwrap();
    let reply = client.draft_ready_notification("5B", "IV Drip", "Farmasi Stor Pukal 3").await;

    mock.assert_hits_async(5).await;
    assert_eq!(reply.outcome, ReplyOutcome::Fallback);
    assert_eq!(reply.display_text(), "Gagal menjana mesej.");
}

#[tokio::test]
async fn test_success_without_candidates_is_empty() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200).json_body(json!({ "promptFeedback": { "blockReason": "OTHER" } }));
        })
        .await;

    let client = AssistClient::new(&config(&server)).unwrap();
    let counts = BTreeMap::from([("Farmasi Satelit 1".to_string(), 4)]);
    let reply = client.summarize_workload(&counts).await;

    mock.assert_hits_async(1).await;
    assert_eq!(reply.outcome, ReplyOutcome::Empty);
    assert_eq!(reply.display_text(), "Tiada respon.");
}

#[tokio::test]
async fn test_undecodable_body_counts_as_failure() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path(GENERATE_PATH);
            then.status(200).body("<html>not json</html>");
        })
        .await;

    let client = AssistClient::new(&config(&server)).unwrap();
    let err = client.generate("hello").await.unwrap_err();

    mock.assert_hits_async(5).await;
    assert!(err.to_string().contains("5 attempts"));
}

#[tokio::test]
async fn test_unreachable_host_errors_never_include_key() {
    let config = AssistConfig {
        base_url: "http://127.0.0.1:1".to_string(),
        retry: RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::from_millis(1),
        },
        ..AssistConfig::new("SUPER-SECRET-KEY")
    };
    let client = AssistClient::new(&config).unwrap();

    let err = client.generate("hello").await.unwrap_err();
    assert!(!err.to_string().contains("SUPER-SECRET-KEY"));
    let mut source = std::error::Error::source(&err);
    while let Some(inner) = source {
        assert!(!inner.to_string().contains("SUPER-SECRET-KEY"));
        source = inner.source();
    }

    let reply = client
        .draft_ready_notification("4A", "Floor Stock", "Farmasi Satelit 1")
        .await;
    assert_eq!(reply.outcome, ReplyOutcome::Fallback);
}
