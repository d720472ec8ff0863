/// Data models for the pipeline service
///
/// This module defines structures for:
/// - Job: one tracked video processing request and its lifecycle state
/// - ProcessingOptions: resolved per-job configuration (defaults merged over
///   caller-supplied overrides at deserialization time)
/// - JobResult / ProcessingStats: the output artifact and its stats record
/// - Request/response DTOs for the HTTP surface
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{AppError, Result};

// ========================================
// Job lifecycle
// ========================================

/// Job lifecycle state
///
/// A terminal job carries exactly one of a result or an error; the variants
/// make any other combination unrepresentable.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Completed { result: JobResult },
    Failed { error: String },
}

/// Coarse job status label derived from the state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// Current pipeline activity, informational only
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Queued,
    Starting,
    Downloading,
    Analyzing,
    RemovingWatermark,
    Upscaling,
    Encoding,
    Finalizing,
    Completed,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Starting => "starting",
            Self::Downloading => "downloading",
            Self::Analyzing => "analyzing",
            Self::RemovingWatermark => "removing_watermark",
            Self::Upscaling => "upscaling",
            Self::Encoding => "encoding",
            Self::Finalizing => "finalizing",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

/// One tracked unit of video processing
#[derive(Debug, Clone, Serialize)]
pub struct Job {
    pub id: Uuid,
    pub state: JobState,
    /// Integer percentage 0-100, non-decreasing while processing
    pub progress: u8,
    pub stage: Stage,
    pub options: ProcessingOptions,
    /// Caller-supplied context, opaque to the pipeline
    pub metadata: serde_json::Value,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn status(&self) -> JobStatus {
        match self.state {
            JobState::Queued => JobStatus::Queued,
            JobState::Processing => JobStatus::Processing,
            JobState::Completed { .. } => JobStatus::Completed,
            JobState::Failed { .. } => JobStatus::Failed,
        }
    }

    pub fn result(&self) -> Option<&JobResult> {
        match &self.state {
            JobState::Completed { result } => Some(result),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&str> {
        match &self.state {
            JobState::Failed { error } => Some(error.as_str()),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            JobState::Completed { .. } | JobState::Failed { .. }
        )
    }
}

// ========================================
// Processing options
// ========================================

/// Watermark removal method selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WatermarkMethod {
    /// Remote inference when credentials are configured, local crop otherwise
    Auto,
    Modal,
    Local,
}

/// Target output codec
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Codec {
    Hevc,
    H264,
}

impl Codec {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hevc => "hevc",
            Self::H264 => "h264",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatermarkOptions {
    pub enabled: bool,
    pub method: WatermarkMethod,
    /// Affects local fallback crop geometry
    pub platform: String,
}

impl Default for WatermarkOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            method: WatermarkMethod::Auto,
            platform: "tiktok".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UpscaleOptions {
    pub enabled: bool,
    /// Integer scale factor, 2 or 4
    pub scale: u8,
    /// Informational for the remote path
    pub model: String,
}

impl Default for UpscaleOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            scale: 2,
            model: "realesrgan".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EncodeOptions {
    pub codec: Codec,
    /// Constant rate factor, 0-51, lower is better
    pub crf: u8,
    pub preset: String,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            codec: Codec::Hevc,
            crf: 23,
            preset: "medium".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackOptions {
    pub url: String,
    /// Inline the output bytes in the webhook payload
    #[serde(default)]
    pub include_video: bool,
}

/// Fully-resolved processing configuration for one job, immutable once the
/// job starts
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessingOptions {
    pub watermark_removal: WatermarkOptions,
    pub upscaling: UpscaleOptions,
    pub encoding: EncodeOptions,
    pub callback: Option<CallbackOptions>,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            watermark_removal: WatermarkOptions::default(),
            upscaling: UpscaleOptions::default(),
            encoding: EncodeOptions::default(),
            callback: None,
        }
    }
}

impl ProcessingOptions {
    /// Reject option combinations the pipeline cannot honor
    pub fn validate(&self) -> Result<()> {
        if self.encoding.crf > 51 {
            return Err(AppError::Validation(format!(
                "crf must be between 0 and 51, got {}",
                self.encoding.crf
            )));
        }
        if self.upscaling.enabled && !matches!(self.upscaling.scale, 2 | 4) {
            return Err(AppError::Validation(format!(
                "upscale factor must be 2 or 4, got {}",
                self.upscaling.scale
            )));
        }
        if let Some(callback) = &self.callback {
            if callback.url.is_empty() {
                return Err(AppError::Validation(
                    "callback url must not be empty".to_string(),
                ));
            }
        }
        Ok(())
    }
}

// ========================================
// Results and stats
// ========================================

/// Output artifact reference; at least one of the three forms is present
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_base64: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_url: Option<String>,
    pub stats: ProcessingStats,
}

/// Stats record for a completed job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingStats {
    pub input_size_mb: f64,
    pub output_size_mb: f64,
    pub processing_time_seconds: f64,
    pub watermarks_detected: u32,
    pub frames_processed: u64,
    pub upscaled: bool,
    /// Composite implementation-path label, e.g. "modal-inpaint+esrgan"
    pub method: String,
}

// ========================================
// HTTP DTOs
// ========================================

/// Job submission payload
#[derive(Debug, Clone, Deserialize)]
pub struct SubmitJobRequest {
    pub video_url: Option<String>,
    /// Base64-encoded inline video bytes
    pub video_bytes: Option<String>,
    #[serde(default)]
    pub options: ProcessingOptions,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: String,
}

/// Full job status document
#[derive(Debug, Clone, Serialize)]
pub struct JobStatusResponse {
    pub job_id: String,
    pub status: String,
    pub progress: u8,
    pub stage: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<JobResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<&Job> for JobStatusResponse {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status().as_str().to_string(),
            progress: job.progress,
            stage: job.stage.as_str().to_string(),
            created_at: job.created_at,
            started_at: job.started_at,
            completed_at: job.completed_at,
            result: job.result().cloned(),
            error: job.error().map(|e| e.to_string()),
        }
    }
}

/// Abbreviated listing entry, no result payload
#[derive(Debug, Clone, Serialize)]
pub struct JobSummary {
    pub job_id: String,
    pub status: String,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl From<&Job> for JobSummary {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status().as_str().to_string(),
            progress: job.progress,
            created_at: job.created_at,
            completed_at: job.completed_at,
        }
    }
}

/// Outbound webhook payload
#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: String,
    pub job_id: String,
    pub status: String,
    pub result: WebhookResult,
    pub metadata: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_bytes: Option<String>,
    pub stats: ProcessingStats,
}
