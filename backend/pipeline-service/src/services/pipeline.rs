/// Pipeline orchestrator
///
/// Drives the full stage sequence for one job: acquire input, remove the
/// watermark, upscale, encode, finalize. Stages run strictly in order
/// within a single spawned task; multiple jobs run as independent tasks
/// sharing the job store. Progress moves through fixed checkpoints:
///
///   5  downloading        input acquisition begins
///   10 analyzing          input persisted to the work directory
///   15-50 removing_watermark
///   55-80 upscaling
///   80-95 encoding
///   95-100 finalizing
///
/// Fatal errors mark the job failed with the message preserved verbatim and
/// are re-raised to the spawn wrapper for logging. Remote watermark failure
/// falls back inside the stage adapter; upscale failure skips the stage.
/// Webhook delivery and file cleanup are best-effort side effects.
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::jobs::JobStore;
use crate::models::{
    Job, JobResult, ProcessingStats, Stage, SubmitJobRequest, WebhookPayload, WebhookResult,
};
use crate::services::{webhook, EncodeStage, UpscaleStage, WatermarkStage};

const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

const MEGABYTE: f64 = 1024.0 * 1024.0;

/// Per-job scratch files under the shared work directory, job-id-qualified
/// so concurrent jobs never contend
struct Scratch {
    input: PathBuf,
    dewatermarked: PathBuf,
    upscaled: PathBuf,
    output: PathBuf,
}

impl Scratch {
    fn new(dir: &Path, job_id: Uuid) -> Self {
        Self {
            input: dir.join(format!("{}_input.mp4", job_id)),
            dewatermarked: dir.join(format!("{}_dewatermarked.mp4", job_id)),
            upscaled: dir.join(format!("{}_upscaled.mp4", job_id)),
            output: dir.join(format!("{}_output.mp4", job_id)),
        }
    }

    /// Best-effort removal of intermediate files; the final output survives
    /// unless the job failed
    async fn cleanup(&self, include_output: bool) {
        let mut targets = vec![&self.input, &self.dewatermarked, &self.upscaled];
        if include_output {
            targets.push(&self.output);
        }
        for path in targets {
            if path.exists() {
                if let Err(err) = tokio::fs::remove_file(path).await {
                    debug!(path = %path.display(), "cleanup failed: {}", err);
                }
            }
        }
    }
}

/// Orchestrates processing jobs asynchronously
#[derive(Clone)]
pub struct ProcessingPipeline {
    store: Arc<JobStore>,
    watermark: Arc<dyn WatermarkStage>,
    upscaler: Arc<dyn UpscaleStage>,
    encoder: Arc<dyn EncodeStage>,
    http: reqwest::Client,
    work_dir: PathBuf,
}

impl ProcessingPipeline {
    pub fn new(
        store: Arc<JobStore>,
        watermark: Arc<dyn WatermarkStage>,
        upscaler: Arc<dyn UpscaleStage>,
        encoder: Arc<dyn EncodeStage>,
        work_dir: PathBuf,
    ) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("HTTP client error: {}", e)))?;
        Ok(Self {
            store,
            watermark,
            upscaler,
            encoder,
            http,
            work_dir,
        })
    }

    pub fn store(&self) -> &Arc<JobStore> {
        &self.store
    }

    /// Validate the request, register the job, and kick off asynchronous
    /// processing. Returns immediately with the queued job.
    pub fn submit(&self, request: SubmitJobRequest) -> Result<Job> {
        let SubmitJobRequest {
            video_url,
            video_bytes,
            options,
            metadata,
        } = request;
        options.validate()?;
        let job = self.store.create(options, metadata);
        let job_id = job.id;

        let pipeline = self.clone();
        tokio::spawn(async move {
            if let Err(err) = pipeline.process_job(job_id, video_url, video_bytes).await {
                error!("video processing failed: job_id={}, error={}", job_id, err);
            }
        });

        Ok(job)
    }

    /// Run the full stage sequence for one job. Marks the job failed and
    /// re-raises on any fatal error; cleanup runs on both paths.
    pub async fn process_job(
        &self,
        job_id: Uuid,
        video_url: Option<String>,
        video_bytes: Option<String>,
    ) -> Result<()> {
        let started = Instant::now();
        self.store.start(job_id);
        let scratch = Scratch::new(&self.work_dir, job_id);

        match self
            .run_stages(job_id, video_url, video_bytes, started, &scratch)
            .await
        {
            Ok(()) => {
                scratch.cleanup(false).await;
                Ok(())
            }
            Err(err) => {
                self.store.fail(job_id, err.to_string());
                scratch.cleanup(true).await;
                Err(err)
            }
        }
    }

    async fn run_stages(
        &self,
        job_id: Uuid,
        video_url: Option<String>,
        video_bytes: Option<String>,
        started: Instant,
        scratch: &Scratch,
    ) -> Result<()> {
        let job = self
            .store
            .get(job_id)
            .ok_or_else(|| AppError::Internal("job not found in store".to_string()))?;
        let options = job.options.clone();

        tokio::fs::create_dir_all(&self.work_dir).await?;

        // Input acquisition
        self.store.report_progress(job_id, 5, Stage::Downloading);
        let input_size = self
            .acquire_input(&scratch.input, video_url, video_bytes)
            .await?;
        self.store.report_progress(job_id, 10, Stage::Analyzing);

        let mut working = scratch.input.clone();
        let mut method_label = String::new();
        let mut watermarks_detected = 0u32;
        let mut frames_processed = 0u64;
        let mut upscaled = false;

        // Watermark removal, 15 -> 50
        if options.watermark_removal.enabled {
            self.store
                .report_progress(job_id, 15, Stage::RemovingWatermark);
            let store = Arc::clone(&self.store);
            let progress = move |fraction: f32| {
                let pct = 15.0 + fraction.clamp(0.0, 1.0) * 35.0;
                store.report_progress(job_id, pct as u8, Stage::RemovingWatermark);
            };
            let outcome = self
                .watermark
                .remove(
                    &working,
                    &scratch.dewatermarked,
                    &options.watermark_removal,
                    &progress,
                )
                .await?;
            method_label = outcome.method;
            watermarks_detected = outcome.watermarks_detected;
            frames_processed = outcome.frames_processed;
            working = scratch.dewatermarked.clone();
            self.store
                .report_progress(job_id, 50, Stage::RemovingWatermark);
        }

        // Upscaling, 55 -> 80; failure skips the stage, never the job
        if options.upscaling.enabled {
            self.store.report_progress(job_id, 55, Stage::Upscaling);
            let store = Arc::clone(&self.store);
            let progress = move |fraction: f32| {
                let pct = 55.0 + fraction.clamp(0.0, 1.0) * 25.0;
                store.report_progress(job_id, pct as u8, Stage::Upscaling);
            };
            match self
                .upscaler
                .upscale(&working, &scratch.upscaled, &options.upscaling, &progress)
                .await
            {
                Ok(()) => {
                    upscaled = true;
                    method_label = if method_label.is_empty() {
                        "esrgan".to_string()
                    } else {
                        format!("{}+esrgan", method_label)
                    };
                    working = scratch.upscaled.clone();
                }
                Err(err) => {
                    warn!("upscaling failed for job {}, skipping stage: {}", job_id, err);
                }
            }
        }

        // Encoding, 80 -> 95; the single quality gate, failure is fatal
        self.store.report_progress(job_id, 80, Stage::Encoding);
        self.encoder
            .encode(&working, &scratch.output, &options.encoding)
            .await?;
        self.store.report_progress(job_id, 95, Stage::Finalizing);

        // Finalize
        let output_bytes = tokio::fs::read(&scratch.output).await?;
        let encoded_output = BASE64.encode(&output_bytes);
        let stats = ProcessingStats {
            input_size_mb: input_size as f64 / MEGABYTE,
            output_size_mb: output_bytes.len() as f64 / MEGABYTE,
            processing_time_seconds: started.elapsed().as_secs_f64(),
            watermarks_detected,
            frames_processed,
            upscaled,
            method: method_label,
        };
        let result = JobResult {
            video_base64: Some(encoded_output.clone()),
            video_path: Some(scratch.output.to_string_lossy().into_owned()),
            video_url: None,
            stats: stats.clone(),
        };
        self.store.complete(job_id, result);
        info!(
            %job_id,
            method = %stats.method,
            seconds = stats.processing_time_seconds,
            "processing pipeline completed"
        );

        if let Some(callback) = &options.callback {
            let payload = WebhookPayload {
                event: "video.processed".to_string(),
                job_id: job_id.to_string(),
                status: "completed".to_string(),
                result: WebhookResult {
                    video_bytes: callback.include_video.then_some(encoded_output),
                    stats,
                },
                metadata: job.metadata.clone(),
            };
            webhook::deliver(callback.url.clone(), payload);
        }

        Ok(())
    }

    /// Fetch the source URL or decode the inline payload into the job's
    /// input file; returns the input size in bytes
    async fn acquire_input(
        &self,
        input_path: &Path,
        video_url: Option<String>,
        video_bytes: Option<String>,
    ) -> Result<u64> {
        let bytes: Vec<u8> = if let Some(url) = video_url {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| AppError::Internal(format!("Failed to download video: {}", e)))?;
            if !response.status().is_success() {
                return Err(AppError::Internal(format!(
                    "Failed to download video: HTTP {}",
                    response.status()
                )));
            }
            response
                .bytes()
                .await
                .map_err(|e| AppError::Internal(format!("Failed to download video: {}", e)))?
                .to_vec()
        } else if let Some(encoded) = video_bytes {
            BASE64
                .decode(encoded.as_bytes())
                .map_err(|e| AppError::BadRequest(format!("Invalid base64 video payload: {}", e)))?
        } else {
            return Err(AppError::BadRequest("No video input provided".to_string()));
        };

        tokio::fs::write(input_path, &bytes).await?;
        Ok(bytes.len() as u64)
    }
}
