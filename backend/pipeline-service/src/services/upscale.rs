/// Upscaling stage
///
/// Remote-first: the Modal upscale endpoint is tried whenever credentials
/// are configured, and any remote failure falls back internally to a local
/// Lanczos resize. This is the only stage adapter with a self-fallback; the
/// orchestrator adds a second layer by skipping the stage entirely if even
/// the fallback fails.
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::UpscaleOptions;
use crate::services::ffmpeg::Transcoder;
use crate::services::modal::ModalClient;
use crate::services::{Progress, UpscaleStage};

/// Lanczos resize filter scaling both dimensions by an integer factor
pub fn scale_filter(factor: u8) -> String {
    format!("scale=iw*{0}:ih*{0}:flags=lanczos", factor)
}

pub struct Upscaler {
    modal: Arc<ModalClient>,
    transcoder: Arc<Transcoder>,
}

impl Upscaler {
    pub fn new(modal: Arc<ModalClient>, transcoder: Arc<Transcoder>) -> Self {
        Self { modal, transcoder }
    }

    async fn local_resize(&self, input: &Path, output: &Path, factor: u8) -> Result<()> {
        let filter = scale_filter(factor);
        info!(%filter, "upscaling via local resampling");
        self.transcoder.filter_encode(input, output, &filter).await
    }
}

#[async_trait]
impl UpscaleStage for Upscaler {
    async fn upscale(
        &self,
        input: &Path,
        output: &Path,
        options: &UpscaleOptions,
        progress: Progress<'_>,
    ) -> Result<()> {
        if self.modal.has_credentials() {
            match self
                .modal
                .upscale(input, output, options.scale, progress)
                .await
            {
                Ok(_) => return Ok(()),
                Err(err) => {
                    warn!("remote upscale failed, falling back to local resampling: {}", err);
                }
            }
        }
        self.local_resize(input, output, options.scale).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scale_filter_expression() {
        assert_eq!(scale_filter(2), "scale=iw*2:ih*2:flags=lanczos");
        assert_eq!(scale_filter(4), "scale=iw*4:ih*4:flags=lanczos");
    }
}
