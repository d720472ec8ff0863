/// Integration tests for the job HTTP surface
///
/// Exercises the real handlers and pipeline against mock stage adapters so
/// no ffmpeg binary or remote GPU endpoint is required.
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{test, web, App};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use uuid::Uuid;

use pipeline_service::error::{AppError, Result};
use pipeline_service::handlers;
use pipeline_service::jobs::JobStore;
use pipeline_service::models::{EncodeOptions, UpscaleOptions, WatermarkOptions};
use pipeline_service::services::{
    EncodeStage, ProcessingPipeline, Progress, UpscaleStage, WatermarkOutcome, WatermarkStage,
};

struct MockWatermark;

#[async_trait]
impl WatermarkStage for MockWatermark {
    async fn remove(
        &self,
        input: &Path,
        output: &Path,
        _options: &WatermarkOptions,
        progress: Progress<'_>,
    ) -> Result<WatermarkOutcome> {
        progress(1.0);
        tokio::fs::copy(input, output).await?;
        Ok(WatermarkOutcome {
            method: "local-crop".to_string(),
            watermarks_detected: 1,
            frames_processed: 240,
        })
    }
}

struct MockUpscale {
    fail: bool,
}

#[async_trait]
impl UpscaleStage for MockUpscale {
    async fn upscale(
        &self,
        input: &Path,
        output: &Path,
        _options: &UpscaleOptions,
        progress: Progress<'_>,
    ) -> Result<()> {
        if self.fail {
            return Err(AppError::RemoteService("inference endpoint refused".into()));
        }
        progress(1.0);
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

struct MockEncoder;

#[async_trait]
impl EncodeStage for MockEncoder {
    async fn encode(&self, input: &Path, output: &Path, _options: &EncodeOptions) -> Result<()> {
        tokio::fs::copy(input, output).await?;
        Ok(())
    }
}

struct TestContext {
    store: Arc<JobStore>,
    pipeline: ProcessingPipeline,
    _work_dir: tempfile::TempDir,
}

fn context(upscale_fail: bool) -> TestContext {
    let store = Arc::new(JobStore::new());
    let work_dir = tempfile::tempdir().unwrap();
    let pipeline = ProcessingPipeline::new(
        Arc::clone(&store),
        Arc::new(MockWatermark),
        Arc::new(MockUpscale { fail: upscale_fail }),
        Arc::new(MockEncoder),
        work_dir.path().to_path_buf(),
    )
    .unwrap();
    TestContext {
        store,
        pipeline,
        _work_dir: work_dir,
    }
}

macro_rules! app {
    ($ctx:expr) => {
        test::init_service(
            App::new()
                .app_data(web::Data::new($ctx.pipeline.clone()))
                .service(
                    web::scope("/api/v1").service(
                        web::scope("/jobs")
                            .route("", web::post().to(handlers::submit_job))
                            .route("", web::get().to(handlers::list_jobs))
                            .route("/{id}", web::get().to(handlers::get_job))
                            .route("/{id}/download", web::get().to(handlers::download_job)),
                    ),
                ),
        )
        .await
    };
}

fn inline_payload() -> String {
    BASE64.encode(b"integration test video bytes")
}

/// Poll the store until the job reaches a terminal state
async fn wait_terminal(store: &JobStore, job_id: Uuid) {
    for _ in 0..200 {
        if let Some(job) = store.get(job_id) {
            if job.is_terminal() {
                return;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("job {} never reached a terminal state", job_id);
}

#[actix_web::test]
async fn test_get_unknown_job_returns_404() {
    let ctx = context(false);
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{}", Uuid::new_v4()))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 404);
}

#[actix_web::test]
async fn test_get_malformed_job_id_returns_400() {
    let ctx = context(false);
    let app = app!(ctx);

    let req = test::TestRequest::get()
        .uri("/api/v1/jobs/not-a-uuid")
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_submit_without_input_fails_the_job() {
    let ctx = context(false);
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs")
        .set_json(json!({}))
        .to_request();
    let resp = test::call_service(&app, req).await;
    // Accepted up front; the input problem surfaces on the job record
    assert_eq!(resp.status(), 202);

    let body: serde_json::Value = test::read_body_json(resp).await;
    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();
    wait_terminal(&ctx.store, job_id).await;

    let job = ctx.store.get(job_id).unwrap();
    assert!(job.error().unwrap().contains("No video input provided"));
}

#[actix_web::test]
async fn test_submit_invalid_options_returns_400() {
    let ctx = context(false);
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs")
        .set_json(json!({
            "video_bytes": inline_payload(),
            "options": {"encoding": {"crf": 99}}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_download_before_completion_returns_400() {
    let ctx = context(false);
    let app = app!(ctx);

    let job = ctx.store.create(
        pipeline_service::models::ProcessingOptions::default(),
        serde_json::Value::Null,
    );

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{}/download", job.id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 400);
}

#[actix_web::test]
async fn test_submit_and_process_happy_path() {
    let ctx = context(false);
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs")
        .set_json(json!({
            "video_bytes": inline_payload(),
            "options": {
                "watermark_removal": {"enabled": true, "platform": "tiktok"},
                "upscaling": {"enabled": false}
            },
            "metadata": {"source": "integration-test"}
        }))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 202);

    let body: serde_json::Value = test::read_body_json(resp).await;
    assert_eq!(body["status"], "queued");
    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    wait_terminal(&ctx.store, job_id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{}", job_id))
        .to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["progress"], 100);
    assert_eq!(status["result"]["stats"]["method"], "local-crop");
    assert_eq!(status["result"]["stats"]["watermarks_detected"], 1);
    assert!(status["error"].is_null());

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{}/download", job_id))
        .to_request();
    let resp = test::call_service(&app, req).await;
    assert_eq!(resp.status(), 200);
    assert_eq!(
        resp.headers().get("content-type").unwrap(),
        "video/mp4"
    );
    let bytes = test::read_body(resp).await;
    assert_eq!(&bytes[..], b"integration test video bytes");
}

#[actix_web::test]
async fn test_upscale_failure_still_completes_job() {
    let ctx = context(true);
    let app = app!(ctx);

    let req = test::TestRequest::post()
        .uri("/api/v1/jobs")
        .set_json(json!({
            "video_bytes": inline_payload(),
            "options": {
                "watermark_removal": {"enabled": true},
                "upscaling": {"enabled": true, "scale": 2}
            }
        }))
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let job_id: Uuid = body["job_id"].as_str().unwrap().parse().unwrap();

    wait_terminal(&ctx.store, job_id).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/v1/jobs/{}", job_id))
        .to_request();
    let status: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(status["status"], "completed");
    assert_eq!(status["result"]["stats"]["upscaled"], false);
    assert_eq!(status["result"]["stats"]["method"], "local-crop");
}

#[actix_web::test]
async fn test_list_jobs_newest_first() {
    let ctx = context(false);
    let app = app!(ctx);

    let first = ctx.store.create(
        pipeline_service::models::ProcessingOptions::default(),
        serde_json::Value::Null,
    );
    let second = ctx.store.create(
        pipeline_service::models::ProcessingOptions::default(),
        serde_json::Value::Null,
    );

    let req = test::TestRequest::get().uri("/api/v1/jobs").to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    let listed = body.as_array().unwrap();
    assert_eq!(listed.len(), 2);
    assert_eq!(listed[0]["job_id"], second.id.to_string());
    assert_eq!(listed[1]["job_id"], first.id.to_string());
    // Summaries never carry the result payload
    assert!(listed[0].get("result").is_none());

    let req = test::TestRequest::get()
        .uri("/api/v1/jobs?limit=1")
        .to_request();
    let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
    assert_eq!(body.as_array().unwrap().len(), 1);
}
