mod common;

use common::{ScriptedGenerator, TestApp};
use fableforge_server::domain::job::JobKind;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

#[tokio::test]
async fn queue_stats_reports_one_row_per_kind_without_auth() {
    let app = TestApp::spawn().await;
    let resp = app.client.get(format!("{}/generation/queue-stats", app.server_url)).send().await.expect("queue-stats failed");
    assert_eq!(resp.status(), 200);
    let rows: Vec<serde_json::Value> = resp.json().await.expect("invalid body");
    assert_eq!(rows.len(), 3);
    for row in &rows {
        assert!(row["estimatedWaitSeconds"].is_number());
    }
}

/// A succeeded job's result becomes unreachable once it passes the
/// succeeded-retention window, reported as 410 rather than 404 — the caller
/// can tell "it existed and expired" from "never existed".
#[tokio::test]
async fn result_past_retention_window_reports_gone() {
    let mut config = common::get_test_config();
    config.jobs.succeeded_retention_secs = 1;
    config.jobs.retention_sweeper_interval_secs = 3600; // the sweeper's physical delete must not race the virtual-expiry check
    let app = TestApp::spawn_with_config(
        config,
        vec![
            Arc::new(ScriptedGenerator::new(JobKind::StoryForPrompt, Duration::from_millis(10), 0)),
            Arc::new(ScriptedGenerator::new(JobKind::StoryForChild, Duration::from_millis(10), 0)),
            Arc::new(ScriptedGenerator::new(JobKind::VoiceClone, Duration::from_millis(10), 0)),
        ],
    )
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
                status["state"] == "succeeded"
            }
        },
        Duration::from_secs(5),
    )
    .await;

    // Result is reachable immediately after completion.
    let resp = app
        .client
        .get(format!("{}/generation/result/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("result failed");
    assert_eq!(resp.status(), 200);

    // Past the one-second retention window, the same result is Gone.
    tokio::time::sleep(Duration::from_millis(1200)).await;
    let resp = app
        .client
        .get(format!("{}/generation/result/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("result failed");
    assert_eq!(resp.status(), 410);
}

#[tokio::test]
async fn result_before_terminal_reports_conflict() {
    let generator = Arc::new(ScriptedGenerator::new(JobKind::VoiceClone, Duration::from_secs(30), 0));
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

    let resp = app
        .client
        .get(format!("{}/generation/result/{}", app.server_url, job_id))
        .header("Authorization", app.auth_header(owner_id))
        .send()
        .await
        .expect("result failed");
    assert_eq!(resp.status(), 409);
}
