mod common;

use common::TestApp;
use futures::StreamExt;
use serde_json::json;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn register_then_unregister_device_token() {
    let app = TestApp::spawn().await;
    let owner_id = Uuid::new_v4();

    let resp = app
        .client
        .post(format!("{}/devices", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"token": "apns-token-1", "platform": "ios"}))
        .send()
        .await
        .expect("register failed");
    assert_eq!(resp.status(), 201);

    let resp = app
        .client
        .delete(format!("{}/devices/{}", app.server_url, "apns-token-1"))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("unregister failed");
    assert_eq!(resp.status(), 204);
}

#[tokio::test]
async fn unregister_someone_elses_token_reports_forbidden() {
    let app = TestApp::spawn().await;
    let owner_a = Uuid::new_v4();
    let owner_b = Uuid::new_v4();

    app.client
        .post(format!("{}/devices", app.server_url))
        .header("Authorization", app.auth_header(owner_a))
        .json(&json!({"token": "fcm-token-1", "platform": "android"}))
        .send()
        .await
        .expect("register failed");

    let resp = app
        .client
        .delete(format!("{}/devices/{}", app.server_url, "fcm-token-1"))
        .header("Authorization", app.auth_header(owner_b))
        .send()
        .await
        .expect("unregister failed");
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn register_rejects_oversized_token() {
    let app = TestApp::spawn().await;
    let owner_id = Uuid::new_v4();
    let huge_token = "a".repeat(5000);

    let resp = app
        .client
        .post(format!("{}/devices", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"token": huge_token, "platform": "ios"}))
        .send()
        .await
        .expect("register failed");
    assert_eq!(resp.status(), 400);
}

/// A token re-registered under a different owner transfers ownership rather
/// than conflicting.
#[tokio::test]
async fn reregistering_a_token_transfers_ownership() {
    let app = TestApp::spawn().await;
    let owner_a = Uuid::new_v4();
    let owner_b = Uuid::new_v4();

    app.client
        .post(format!("{}/devices", app.server_url))
        .header("Authorization", app.auth_header(owner_a))
        .json(&json!({"token": "shared-device", "platform": "ios"}))
        .send()
        .await
        .expect("register failed");

    let resp = app
        .client
        .post(format!("{}/devices", app.server_url))
        .header("Authorization", app.auth_header(owner_b))
        .json(&json!({"token": "shared-device", "platform": "ios"}))
        .send()
        .await
        .expect("register failed");
    assert_eq!(resp.status(), 201);

    // Now owner_a no longer owns it, so they cannot unregister it.
    let resp = app
        .client
        .delete(format!("{}/devices/{}", app.server_url, "shared-device"))
        .header("Authorization", app.auth_header(owner_a))
        .send()
        .await
        .expect("unregister failed");
    assert_eq!(resp.status(), 403);
}

/// Opening an owner's event stream returns an `event-stream` response that
/// starts flowing immediately, before any job event has been published.
#[tokio::test]
async fn owner_event_stream_opens_and_delivers_bytes() {
    let app = TestApp::spawn().await;
    let owner_id = Uuid::new_v4();

    let resp = app
        .client
        .get(format!("{}/events/jobs", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("sse connect failed");
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers().get("content-type").map(|v| v.to_str().unwrap_or_default()), Some("text/event-stream"));

    let mut stream = resp.bytes_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(2), stream.next()).await;
    assert!(chunk.is_ok(), "no bytes received from the owner event stream within the timeout");
}

/// A per-job event stream for a job that isn't owned by the caller is
/// rejected with 403 before the SSE upgrade happens.
#[tokio::test]
async fn job_event_stream_rejects_unowned_job() {
    let app = TestApp::spawn().await;
    let owner_a = Uuid::new_v4();
    let owner_b = Uuid::new_v4();

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_a))
        .json(&json!({"kind": "voice_clone", "voiceName": "A", "sampleUris": ["s3://x"]}))
        .send()
        .await
        .expect("submit failed");
    let job_id = resp.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    let resp = app
        .client
        .get(format!("{}/events/jobs/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_b))
        .send()
        .await
        .expect("sse connect failed");
    assert_eq!(resp.status(), 403);
}
