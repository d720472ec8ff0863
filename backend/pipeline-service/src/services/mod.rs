/// Service layer for the video pipeline
///
/// Contains the stage adapters (remote inference client, local ffmpeg
/// transcoder, watermark remover, upscaler), the orchestrator that drives
/// them, and webhook delivery. Stage adapters sit behind small traits so the
/// orchestrator can be exercised with substitute implementations in tests.
use std::path::Path;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{EncodeOptions, UpscaleOptions, WatermarkOptions};

pub mod ffmpeg;
pub mod modal;
pub mod pipeline;
pub mod upscale;
pub mod watermark;
pub mod webhook;

pub use ffmpeg::Transcoder;
pub use modal::ModalClient;
pub use pipeline::ProcessingPipeline;
pub use upscale::Upscaler;
pub use watermark::WatermarkRemover;

/// Fraction-of-stage progress callback; adapters report 0.0 to 1.0 and the
/// orchestrator maps that onto the job's checkpoint range.
pub type Progress<'a> = &'a (dyn Fn(f32) + Send + Sync);

/// What the watermark stage actually did
#[derive(Debug, Clone)]
pub struct WatermarkOutcome {
    /// Implementation-path label, "modal-inpaint" or "local-crop"
    pub method: String,
    pub watermarks_detected: u32,
    pub frames_processed: u64,
}

#[async_trait]
pub trait WatermarkStage: Send + Sync {
    /// Remove the watermark from `input`, writing the result to `output`.
    /// Implementations fall back internally from the remote path to the
    /// local crop; an error here is fatal to the job.
    async fn remove(
        &self,
        input: &Path,
        output: &Path,
        options: &WatermarkOptions,
        progress: Progress<'_>,
    ) -> Result<WatermarkOutcome>;
}

#[async_trait]
pub trait UpscaleStage: Send + Sync {
    /// Upscale `input` by the requested factor into `output`. An error here
    /// causes the orchestrator to skip the stage, never to fail the job.
    async fn upscale(
        &self,
        input: &Path,
        output: &Path,
        options: &UpscaleOptions,
        progress: Progress<'_>,
    ) -> Result<()>;
}

#[async_trait]
pub trait EncodeStage: Send + Sync {
    /// Re-encode `input` into the final deliverable. Errors are fatal; this
    /// is the single quality gate before delivery.
    async fn encode(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Result<()>;
}
