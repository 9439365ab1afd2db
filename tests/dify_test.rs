//! Enrichment client behavior against a local canned-response HTTP stub:
//! retry ceilings, short-circuits, and response validation.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chartmill::config::DifySettings;
use chartmill::enrich::{DifyClient, UNKNOWN_STAGE};
use chartmill::error::Error;
use chartmill::model::{Indicator, StageOutcome};
use secrecy::SecretString;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

fn settings(base_url: &str) -> DifySettings {
    DifySettings {
        base_url: base_url.to_string(),
        workflow_api_key: SecretString::from("test-workflow-key"),
        indicator_api_key: SecretString::from("test-indicator-key"),
        chat_api_key: SecretString::from("test-chat-key"),
        user: "test".to_string(),
        max_retries: 3,
        retry_delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    }
}

fn client(base_url: &str) -> DifyClient {
    DifyClient::new(settings(base_url), CancellationToken::new()).unwrap()
}

/// Minimal HTTP stub: answers each request with a canned (status, body)
/// chosen by request index, counting requests as it goes.
async fn spawn_stub<F>(respond: F) -> (String, Arc<AtomicUsize>)
where
    F: Fn(usize) -> (u16, String) + Send + Sync + 'static,
{
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&hits);

    tokio::spawn(async move {
        loop {
            let Ok((mut socket, _)) = listener.accept().await else {
                break;
            };
            let n = seen.fetch_add(1, Ordering::SeqCst);
            let (status, body) = respond(n);
            read_request(&mut socket).await;
            let reason = if status < 400 { "OK" } else { "Error" };
            let response = format!(
                "HTTP/1.1 {status} {reason}\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = socket.write_all(response.as_bytes()).await;
            let _ = socket.shutdown().await;
        }
    });

    (format!("http://{addr}/v1"), hits)
}

/// Drain one HTTP request (headers plus content-length body).
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 1024];
    loop {
        let Ok(n) = socket.read(&mut chunk).await else {
            return;
        };
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);
        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let headers = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

fn workflow_success(result: &serde_json::Value) -> String {
    serde_json::json!({
        "data": {
            "status": "succeeded",
            "outputs": { "result": result.to_string() }
        }
    })
    .to_string()
}

#[tokio::test]
async fn classify_stage_parses_successful_workflow() {
    let body = workflow_success(&serde_json::json!({
        "visit_number": 2,
        "gestational_weeks": 14
    }));
    let (base, hits) = spawn_stub(move |_| (200, body.clone())).await;

    let outcome = client(&base).classify_stage("visit note text").await.unwrap();
    assert_eq!(
        outcome,
        StageOutcome {
            visit_number: 2,
            gestational_weeks: 14
        }
    );
    assert_eq!(hits.load(Ordering::SeqCst), 1, "success must not retry");
}

#[tokio::test]
async fn server_errors_are_retried_to_the_ceiling() {
    let (base, hits) = spawn_stub(|_| (500, "{}".to_string())).await;

    let err = client(&base).classify_stage("visit note text").await.unwrap_err();
    match err {
        Error::Transport { status, .. } => assert_eq!(status, Some(500)),
        other => panic!("expected Transport, got {other:?}"),
    }
    assert_eq!(hits.load(Ordering::SeqCst), 3, "default ceiling is 3 attempts");
}

#[tokio::test]
async fn transient_failure_recovers_on_retry() {
    let body = workflow_success(&serde_json::json!({
        "visit_number": 1,
        "gestational_weeks": 8
    }));
    let (base, hits) = spawn_stub(move |n| {
        if n == 0 {
            (502, "bad gateway".to_string())
        } else {
            (200, body.clone())
        }
    })
    .await;

    let outcome = client(&base).classify_stage("visit note text").await.unwrap();
    assert_eq!(outcome.visit_number, 1);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn failed_workflow_status_is_not_retried() {
    let body = serde_json::json!({
        "data": { "status": "failed", "error": "upstream model error" }
    })
    .to_string();
    let (base, hits) = spawn_stub(move |_| (200, body.clone())).await;

    let err = client(&base).classify_stage("visit note text").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1, "validation failures must not retry");
}

#[tokio::test]
async fn empty_query_short_circuits_without_any_request() {
    let (base, hits) = spawn_stub(|_| (200, "{}".to_string())).await;

    let err = client(&base).classify_stage("   ").await.unwrap_err();
    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancellation_aborts_between_attempts() {
    let (base, hits) = spawn_stub(|_| (500, "{}".to_string())).await;

    let mut settings = settings(&base);
    settings.retry_delay = Duration::from_secs(30);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let client = DifyClient::new(settings, cancel).unwrap();

    let started = std::time::Instant::now();
    let err = client.classify_stage("visit note text").await.unwrap_err();
    // Shutdown must be distinguishable from a network failure.
    assert!(matches!(err, Error::Cancelled(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1, "no further attempts after cancel");
    assert!(started.elapsed() < Duration::from_secs(5), "must not sit out the delay");
}

#[tokio::test]
async fn answer_digits_extracts_first_run() {
    let body = serde_json::json!({
        "event": "message",
        "answer": "Based on the note, this is visit 2 of 12."
    })
    .to_string();
    let (base, _) = spawn_stub(move |_| (200, body.clone())).await;

    let digits = client(&base).answer_digits("visit note text").await.unwrap();
    assert_eq!(digits, "2");
}

#[tokio::test]
async fn answer_without_digits_yields_unknown() {
    let body = serde_json::json!({
        "event": "message",
        "answer": "cannot determine the stage"
    })
    .to_string();
    let (base, _) = spawn_stub(move |_| (200, body.clone())).await;

    let digits = client(&base).answer_digits("visit note text").await.unwrap();
    assert_eq!(digits, UNKNOWN_STAGE);
}

#[tokio::test]
async fn non_message_event_yields_unknown() {
    let body = serde_json::json!({ "event": "error", "answer": "5" }).to_string();
    let (base, _) = spawn_stub(move |_| (200, body.clone())).await;

    let digits = client(&base).answer_digits("visit note text").await.unwrap();
    assert_eq!(digits, UNKNOWN_STAGE);
}

fn candidate(code: &str, name: &str) -> Indicator {
    Indicator {
        code: code.to_string(),
        name: name.to_string(),
        value: None,
        value_explain: None,
    }
}

#[tokio::test]
async fn extract_indicators_round_trips_and_validates() {
    let result = serde_json::json!([
        { "code": "c1", "name": "height", "value": "170", "value_explain": "cm" },
        { "code": "c2", "name": "weight", "value": "", "value_explain": null }
    ]);
    let body = workflow_success(&result);
    let (base, hits) = spawn_stub(move |_| (200, body.clone())).await;

    let extracted = client(&base)
        .extract_indicators(
            "visit note text",
            &[candidate("c1", "height"), candidate("c2", "weight")],
        )
        .await
        .unwrap();

    assert_eq!(extracted.len(), 2);
    assert_eq!(extracted[0].value.as_deref(), Some("170"));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn indicator_result_missing_a_candidate_is_rejected() {
    let result = serde_json::json!([
        { "code": "c1", "name": "height", "value": "170" }
    ]);
    let body = workflow_success(&result);
    let (base, hits) = spawn_stub(move |_| (200, body.clone())).await;

    let err = client(&base)
        .extract_indicators(
            "visit note text",
            &[candidate("c1", "height"), candidate("c2", "weight")],
        )
        .await
        .unwrap_err();

    assert!(matches!(err, Error::Validation(_)));
    assert_eq!(hits.load(Ordering::SeqCst), 1, "mismatches must not retry");
}
