mod common;

use common::{ScriptedGenerator, TestApp};
use fableforge_server::domain::job::JobKind;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// S1 — happy path: submit, lease, progress stages, terminal result.
#[tokio::test]
async fn submit_and_poll_reaches_succeeded_with_monotonic_progress() {
    let app = TestApp::spawn().await;
    let owner_id = Uuid::new_v4();

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({
            "kind": "story_for_prompt",
            "themeIds": ["dragons"],
            "minAge": 3,
            "maxAge": 6,
            "language": "en",
            "prompt": "A dragon learns to share.",
        }))
        .send()
        .await
        .expect("submit request failed");
    assert_eq!(resp.status(), 202);

    let body: serde_json::Value = resp.json().await.expect("invalid submit response");
    let job_id = body["jobId"].as_str().expect("missing jobId").to_string();
    assert!(body["estimatedWaitSeconds"].is_number());

    let reached = app
        .wait_until(
            || {
                let app = &app;
                let job_id = job_id.clone();
                let owner_id = owner_id;
                async move {
                    let resp = app
                        .client
                        .get(format!("{}/generation/status/{}", app.server_url, job_id))
                        .header("Authorization", app.auth_header(owner_id))
                        .send()
                        .await
                        .expect("status request failed");
                    let status: serde_json::Value = resp.json().await.expect("invalid status body");
                    status["state"] == "succeeded"
                }
            },
            Duration::from_secs(5),
        )
        .await;
    assert!(reached, "job never reached Succeeded");

    let resp = app
        .client
        .get(format!("{}/generation/result/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("result request failed");
    assert_eq!(resp.status(), 200);
    let result: serde_json::Value = resp.json().await.expect("invalid result body");
    assert!(result["artifactId"].is_string());
}

/// S2 — priority ordering: with a single-slot pool, High leases before
/// Normal before Low regardless of submission order.
#[tokio::test]
async fn priority_ordering_leases_high_before_normal_before_low() {
    let generator = Arc::new(ScriptedGenerator::new(JobKind::VoiceClone, Duration::from_millis(200), 0));
    let app = TestApp::spawn_with_generators(vec![
        Arc::new(ScriptedGenerator::new(JobKind::StoryForPrompt, Duration::from_millis(30), 0)),
        Arc::new(ScriptedGenerator::new(JobKind::StoryForChild, Duration::from_millis(30), 0)),
        generator,
    ])
    .await;
    let owner_id = Uuid::new_v4();

    let submit = |priority: &'static str| {
        let app = &app;
        let owner_id = owner_id;
        async move {
            let resp = app
                .client
                .post(format!("{}/generation/async", app.server_url))
                .header("Authorization", app.auth_header(owner_id))
                .json(&json!({
                    "kind": "voice_clone",
                    "voiceName": "Grandma",
                    "sampleUris": ["s3://bucket/sample.wav"],
                    "priority": priority,
                }))
                .send()
                .await
                .expect("submit failed");
            let body: serde_json::Value = resp.json().await.expect("invalid body");
            body["jobId"].as_str().expect("missing jobId").to_string()
        }
    };

    let low = submit("low").await;
    let normal = submit("normal").await;
    let high = submit("high").await;

    let processing_order = app
        .wait_until(
            || {
                let app = &app;
                async move {
                    let row: Option<(String,)> = sqlx::query_as("SELECT kind FROM jobs WHERE state = 'processing' LIMIT 1")
                        .fetch_optional(&app.pool)
                        .await
                        .ok()
                        .flatten();
                    row.is_some()
                }
            },
            Duration::from_secs(2),
        )
        .await;
    assert!(processing_order, "no job ever started processing");

    let leased_first: (Uuid,) = sqlx::query_as("SELECT id FROM jobs WHERE state IN ('processing', 'succeeded') ORDER BY leased_at ASC LIMIT 1")
        .fetch_one(&app.pool)
        .await
        .expect("failed to read leased jobs");
    assert_eq!(leased_first.0.to_string(), high, "expected the High priority job to lease first");

    let _ = (low, normal);
}

/// S3 — retryable failures push the job back to Queued with backoff, and it
/// eventually succeeds without ever reaching Failed.
#[tokio::test]
async fn retryable_failures_recover_to_succeeded() {
    let generator = Arc::new(ScriptedGenerator::new(JobKind::StoryForPrompt, Duration::from_millis(10), 2));
    let app = TestApp::spawn_with_generators(vec![
        generator,
        Arc::new(ScriptedGenerator::new(JobKind::StoryForChild, Duration::from_millis(10), 0)),
        Arc::new(ScriptedGenerator::new(JobKind::VoiceClone, Duration::from_millis(10), 0)),
    ])
    .await;
    let owner_id = Uuid::new_v4();

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({
            "kind": "story_for_prompt",
            "themeIds": [],
            "minAge": 3,
            "maxAge": 6,
            "language": "en",
            "prompt": "A dragon learns to share.",
        }))
        .send()
        .await
        .expect("submit failed");
    let body: serde_json::Value = resp.json().await.expect("invalid body");
    let job_id = body["jobId"].as_str().expect("missing jobId").to_string();

    let succeeded = app
        .wait_until(
            || {
                let app = &app;
                let job_id = job_id.clone();
                async move {
                    let resp = app
                        .client
                        .get(format!("{}/generation/status/{}", app.server_url, job_id))
                        .header("Authorization", app.auth_header(owner_id))
                        .send()
                        .await
                        .expect("status failed");
                    let status: serde_json::Value = resp.json().await.expect("invalid body");
                    status["state"] == "succeeded"
                }
            },
            Duration::from_secs(10),
        )
        .await;
    assert!(succeeded, "job never recovered to Succeeded after retryable failures");
}

/// S5 — cancelling a job that is still Queued succeeds and it is never leased.
#[tokio::test]
async fn cancel_while_queued_succeeds_and_job_is_never_leased() {
    let generator = Arc::new(ScriptedGenerator::new(JobKind::VoiceClone, Duration::from_secs(30), 0));
    let app = TestApp::spawn_with_generators(vec![
        Arc::new(ScriptedGenerator::new(JobKind::StoryForPrompt, Duration::from_millis(10), 0)),
        Arc::new(ScriptedGenerator::new(JobKind::StoryForChild, Duration::from_millis(10), 0)),
        generator,
    ])
    .await;
    let owner_id = Uuid::new_v4();

    // Occupy the single voice-clone slot so the next submission stays Queued.
    let occupy = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "A", "sampleUris": ["s3://x"]}))
        .send()
        .await
        .expect("submit failed");
    let occupy_id = occupy.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    app.wait_until(
        || {
            let app = &app;
            let occupy_id = occupy_id.clone();
            async move {
                let resp = app
                    .client
                    .get(format!("{}/generation/status/{}", app.server_url, occupy_id))
                    .header("Authorization", app.auth_header(owner_id))
                    .send()
                    .await
                    .expect("status failed");
                let status: serde_json::Value = resp.json().await.expect("invalid body");
                status["state"] == "processing"
            }
        },
        Duration::from_secs(2),
    )
    .await;

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "B", "sampleUris": ["s3://y"]}))
        .send()
        .await
        .expect("submit failed");
    let job_id = resp.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    let resp = app
        .client
        .delete(format!("{}/generation/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("cancel failed");
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.expect("invalid body");
    assert_eq!(body["cancelled"], true);

    let row: (String,) = sqlx::query_as("SELECT state FROM jobs WHERE id = $1")
        .bind(Uuid::parse_str(&job_id).unwrap())
        .fetch_one(&app.pool)
        .await
        .expect("job row missing");
    assert_eq!(row.0, "cancelled");
}

/// S6 — cancelling a job that is already Processing is rejected with a
/// distinct conflict reason, and the job runs to completion regardless.
#[tokio::test]
async fn cancel_while_processing_returns_conflict() {
    let generator = Arc::new(ScriptedGenerator::new(JobKind::VoiceClone, Duration::from_millis(500), 0));
    let app = TestApp::spawn_with_generators(vec![
        Arc::new(ScriptedGenerator::new(JobKind::StoryForPrompt, Duration::from_millis(10), 0)),
        Arc::new(ScriptedGenerator::new(JobKind::StoryForChild, Duration::from_millis(10), 0)),
        generator,
    ])
    .await;
    let owner_id = Uuid::new_v4();

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "A", "sampleUris": ["s3://x"]}))
        .send()
        .await
        .expect("submit failed");
    let job_id = resp.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    app.wait_until(
        || {
            let app = &app;
            let job_id = job_id.clone();
            async move {
                let resp = app
                    .client
                    .get(format!("{}/generation/status/{}", app.server_url, job_id))
                    .header("Authorization", app.auth_header(owner_id))
                    .send()
                    .await
                    .expect("status failed");
                let status: serde_json::Value = resp.json().await.expect("invalid body");
                status["state"] == "processing"
            }
        },
        Duration::from_secs(2),
    )
    .await;

    let resp = app
        .client
        .delete(format!("{}/generation/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("cancel failed");
    assert_eq!(resp.status(), 409);
    let body: serde_json::Value = resp.json().await.expect("invalid body");
    assert_eq!(body["reason"], "already processing");
}

/// Ownership scoping: another owner's job id reports 403, not 404 — the job
/// exists, it just isn't the caller's.
#[tokio::test]
async fn status_on_another_owners_job_reports_forbidden() {
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
        .get(format!("{}/generation/status/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_b))
        .send()
        .await
        .expect("status failed");
    assert_eq!(resp.status(), 403);
}

/// Missing bearer token is rejected before any handler logic runs.
#[tokio::test]
async fn submit_without_bearer_token_is_rejected() {
    let app = TestApp::spawn().await;
    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .json(&json!({"kind": "voice_clone", "voiceName": "A", "sampleUris": ["s3://x"]}))
        .send()
        .await
        .expect("submit failed");
    assert_eq!(resp.status(), 403);
}

/// Invalid payloads are rejected before reaching the queue.
#[tokio::test]
async fn submit_with_invalid_payload_is_rejected() {
    let app = TestApp::spawn().await;
    let owner_id = Uuid::new_v4();
    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "", "sampleUris": []}))
        .send()
        .await
        .expect("submit failed");
    assert_eq!(resp.status(), 400);
}

/// S1 — an owner with two registered devices gets one multicast push
/// addressing both tokens, not two unicast calls.
#[tokio::test]
async fn succeeded_job_sends_one_multicast_push_to_every_device() {
    let app = TestApp::spawn().await;
    let owner_id = Uuid::new_v4();

    for token in ["t1", "t2"] {
        app.client
            .post(format!("{}/devices", app.server_url))
            .header("Authorization", app.auth_header(owner_id))
            .json(&json!({"token": token, "platform": "ios"}))
            .send()
            .await
            .expect("register failed");
    }

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "A", "sampleUris": ["s3://x"]}))
        .send()
        .await
        .expect("submit failed");
    let job_id = resp.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    let succeeded = app
        .wait_until(
            || {
                let app = &app;
                let job_id = job_id.clone();
                async move {
                    let resp = app
                        .client
                        .get(format!("{}/generation/status/{}", app.server_url, job_id))
                        .header("Authorization", app.auth_header(owner_id))
                        .send()
                        .await
                        .expect("status failed");
                    let status: serde_json::Value = resp.json().await.expect("invalid body");
                    status["state"] == "succeeded"
                }
            },
            Duration::from_secs(5),
        )
        .await;
    assert!(succeeded, "job never reached Succeeded");

    // Give the Notification Dispatcher a moment to drain the event off the bus.
    let dispatched = app.wait_until(|| async { !app.push_provider.calls().is_empty() }, Duration::from_secs(2)).await;
    assert!(dispatched, "no push was ever sent");

    let calls = app.push_provider.calls();
    assert_eq!(calls.len(), 1, "expected exactly one multicast call, got {}", calls.len());
    assert_eq!(calls[0].tokens.len(), 2);
    assert!(calls[0].tokens.contains(&"t1".to_string()));
    assert!(calls[0].tokens.contains(&"t2".to_string()));
}

/// S5 — cancelling a queued job produces no push notification at all.
#[tokio::test]
async fn cancel_while_queued_sends_no_push_notification() {
    let generator = Arc::new(ScriptedGenerator::new(JobKind::VoiceClone, Duration::from_secs(30), 0));
    let app = TestApp::spawn_with_generators(vec![
        Arc::new(ScriptedGenerator::new(JobKind::StoryForPrompt, Duration::from_millis(10), 0)),
        Arc::new(ScriptedGenerator::new(JobKind::StoryForChild, Duration::from_millis(10), 0)),
        generator,
    ])
    .await;
    let owner_id = Uuid::new_v4();

    app.client
        .post(format!("{}/devices", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"token": "t1", "platform": "ios"}))
        .send()
        .await
        .expect("register failed");

    // Occupy the single voice-clone slot so the next submission stays Queued.
    let occupy = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "A", "sampleUris": ["s3://x"]}))
        .send()
        .await
        .expect("submit failed");
    let occupy_id = occupy.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    app.wait_until(
        || {
            let app = &app;
            let occupy_id = occupy_id.clone();
            async move {
                let resp = app
                    .client
                    .get(format!("{}/generation/status/{}", app.server_url, occupy_id))
                    .header("Authorization", app.auth_header(owner_id))
                    .send()
                    .await
                    .expect("status failed");
                let status: serde_json::Value = resp.json().await.expect("invalid body");
                status["state"] == "processing"
            }
        },
        Duration::from_secs(2),
    )
    .await;

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "B", "sampleUris": ["s3://y"]}))
        .send()
        .await
        .expect("submit failed");
    let job_id = resp.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    let resp = app
        .client
        .delete(format!("{}/generation/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("cancel failed");
    assert_eq!(resp.status(), 200);

    // Give the dispatcher every opportunity to (wrongly) push before asserting silence.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(app.push_provider.calls().is_empty(), "cancelling a queued job must never trigger a push");
}

/// Property 9 — a token the provider reports as unregistered is deactivated
/// after the send, while the owner's other token stays untouched.
#[tokio::test]
async fn unregistered_token_is_deactivated_after_a_push() {
    let app = TestApp::spawn().await;
    let owner_id = Uuid::new_v4();

    for token in ["stale-token", "live-token"] {
        app.client
            .post(format!("{}/devices", app.server_url))
            .header("Authorization", app.auth_header(owner_id))
            .json(&json!({"token": token, "platform": "android"}))
            .send()
            .await
            .expect("register failed");
    }
    app.push_provider.mark_unregistered("stale-token");

    let resp = app
        .client
        .post(format!("{}/generation/async", app.server_url))
        .header("Authorization", app.auth_header(owner_id))
        .json(&json!({"kind": "voice_clone", "voiceName": "A", "sampleUris": ["s3://x"]}))
        .send()
        .await
        .expect("submit failed");
    let job_id = resp.json::<serde_json::Value>().await.expect("invalid body")["jobId"].as_str().unwrap().to_string();

    app.wait_until(
        || {
            let app = &app;
            let job_id = job_id.clone();
            async move {
                let resp = app
                    .client
                    .get(format!("{}/generation/status/{}", app.server_url, job_id))
                    .header("Authorization", app.auth_header(owner_id))
                    .send()
                    .await
                    .expect("status failed");
                let status: serde_json::Value = resp.json().await.expect("invalid body");
                status["state"] == "succeeded"
            }
        },
        Duration::from_secs(5),
    )
    .await;

    let deactivated = app
        .wait_until(
            || {
                let app = &app;
                async move {
                    let row: (bool,) = sqlx::query_as("SELECT active FROM device_tokens WHERE token = 'stale-token'")
                        .fetch_one(&app.pool)
                        .await
                        .expect("stale-token row missing");
                    !row.0
                }
            },
            Duration::from_secs(2),
        )
        .await;
    assert!(deactivated, "unregistered token was never deactivated");

    let row: (bool,) =
        sqlx::query_as("SELECT active FROM device_tokens WHERE token = 'live-token'").fetch_one(&app.pool).await.expect("live-token row missing");
    assert!(row.0, "the owner's other token must not be touched");
}
