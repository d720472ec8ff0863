/// Watermark removal stage
///
/// Primary path is remote inpainting via the Modal inference service;
/// fallback is a local crop that cuts the platform's watermark band off the
/// frame and re-encodes at fixed intermediate settings. An `auto` method
/// resolves to the remote path iff credentials are configured, optimistic
/// about remote health; a remote failure at call time still falls back.
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::Result;
use crate::models::{WatermarkMethod, WatermarkOptions};
use crate::services::ffmpeg::{MediaInfo, Transcoder};
use crate::services::modal::ModalClient;
use crate::services::{Progress, WatermarkOutcome, WatermarkStage};

pub const METHOD_MODAL: &str = "modal-inpaint";
pub const METHOD_LOCAL: &str = "local-crop";

/// Which side of the frame carries the watermark band
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CropPosition {
    Top,
    Bottom,
}

/// Platform-specific watermark band geometry
#[derive(Debug, Clone, Copy)]
pub struct CropRegion {
    pub position: CropPosition,
    pub pixels: u32,
}

/// Crop geometry keyed by platform; unrecognized platforms get the default
pub fn crop_region_for(platform: &str) -> CropRegion {
    match platform {
        "tiktok" | "douyin" => CropRegion {
            position: CropPosition::Bottom,
            pixels: 130,
        },
        "instagram" | "reels" => CropRegion {
            position: CropPosition::Bottom,
            pixels: 110,
        },
        "youtube" | "shorts" => CropRegion {
            position: CropPosition::Top,
            pixels: 100,
        },
        _ => CropRegion {
            position: CropPosition::Bottom,
            pixels: 100,
        },
    }
}

/// Build the ffmpeg crop filter expression for a region and frame size
pub fn crop_filter(region: &CropRegion, info: &MediaInfo) -> String {
    // Never crop away more than half the frame, and keep the output height
    // even for 4:2:0 encoding
    let band = region.pixels.min(info.height / 2);
    let mut out_height = info.height - band;
    if out_height % 2 == 1 {
        out_height -= 1;
    }
    match region.position {
        CropPosition::Bottom => format!("crop={}:{}:0:0", info.width, out_height),
        CropPosition::Top => format!(
            "crop={}:{}:0:{}",
            info.width,
            out_height,
            info.height - out_height
        ),
    }
}

/// Effective implementation path after `auto` resolution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedMethod {
    Remote,
    Local,
}

/// `auto` resolves to remote iff credentials are configured; no remote call
/// is made to decide
pub fn resolve_method(method: WatermarkMethod, has_credentials: bool) -> ResolvedMethod {
    match method {
        WatermarkMethod::Modal => ResolvedMethod::Remote,
        WatermarkMethod::Local => ResolvedMethod::Local,
        WatermarkMethod::Auto if has_credentials => ResolvedMethod::Remote,
        WatermarkMethod::Auto => ResolvedMethod::Local,
    }
}

pub struct WatermarkRemover {
    modal: Arc<ModalClient>,
    transcoder: Arc<Transcoder>,
}

impl WatermarkRemover {
    pub fn new(modal: Arc<ModalClient>, transcoder: Arc<Transcoder>) -> Self {
        Self { modal, transcoder }
    }

    async fn local_crop(
        &self,
        input: &Path,
        output: &Path,
        options: &WatermarkOptions,
    ) -> Result<WatermarkOutcome> {
        let info = self.transcoder.probe(input).await?;
        let region = crop_region_for(&options.platform);
        let filter = crop_filter(&region, &info);
        info!(platform = %options.platform, %filter, "removing watermark via local crop");
        self.transcoder.filter_encode(input, output, &filter).await?;
        Ok(WatermarkOutcome {
            method: METHOD_LOCAL.to_string(),
            watermarks_detected: 0,
            frames_processed: 0,
        })
    }
}

#[async_trait]
impl WatermarkStage for WatermarkRemover {
    async fn remove(
        &self,
        input: &Path,
        output: &Path,
        options: &WatermarkOptions,
        progress: Progress<'_>,
    ) -> Result<WatermarkOutcome> {
        if resolve_method(options.method, self.modal.has_credentials()) == ResolvedMethod::Remote {
            match self
                .modal
                .remove_watermark(input, output, &options.platform, progress)
                .await
            {
                Ok(stats) => {
                    return Ok(WatermarkOutcome {
                        method: METHOD_MODAL.to_string(),
                        watermarks_detected: stats.watermarks_detected,
                        frames_processed: stats.frames_processed,
                    });
                }
                Err(err) => {
                    warn!("remote watermark removal failed, falling back to local crop: {}", err);
                }
            }
        }
        self.local_crop(input, output, options).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(width: u32, height: u32) -> MediaInfo {
        MediaInfo {
            width,
            height,
            duration_seconds: 10.0,
            frame_rate: 30.0,
            codec: "h264".to_string(),
        }
    }

    #[test]
    fn test_auto_without_credentials_resolves_local() {
        assert_eq!(
            resolve_method(WatermarkMethod::Auto, false),
            ResolvedMethod::Local
        );
    }

    #[test]
    fn test_auto_with_credentials_resolves_remote() {
        assert_eq!(
            resolve_method(WatermarkMethod::Auto, true),
            ResolvedMethod::Remote
        );
    }

    #[test]
    fn test_explicit_methods_ignore_credentials() {
        assert_eq!(
            resolve_method(WatermarkMethod::Local, true),
            ResolvedMethod::Local
        );
        assert_eq!(
            resolve_method(WatermarkMethod::Modal, false),
            ResolvedMethod::Remote
        );
    }

    #[test]
    fn test_crop_region_lookup() {
        let tiktok = crop_region_for("tiktok");
        assert_eq!(tiktok.position, CropPosition::Bottom);
        assert_eq!(tiktok.pixels, 130);

        let shorts = crop_region_for("shorts");
        assert_eq!(shorts.position, CropPosition::Top);

        let unknown = crop_region_for("some-new-platform");
        assert_eq!(unknown.position, CropPosition::Bottom);
        assert_eq!(unknown.pixels, 100);
    }

    #[test]
    fn test_bottom_crop_filter() {
        let region = CropRegion {
            position: CropPosition::Bottom,
            pixels: 130,
        };
        assert_eq!(crop_filter(&region, &info(1080, 1920)), "crop=1080:1790:0:0");
    }

    #[test]
    fn test_top_crop_filter_offsets_y() {
        let region = CropRegion {
            position: CropPosition::Top,
            pixels: 100,
        };
        assert_eq!(crop_filter(&region, &info(1080, 1920)), "crop=1080:1820:0:100");
    }

    #[test]
    fn test_crop_filter_keeps_height_even() {
        let region = CropRegion {
            position: CropPosition::Bottom,
            pixels: 101,
        };
        // 1920 - 101 = 1819, rounded down to 1818
        assert_eq!(crop_filter(&region, &info(1080, 1920)), "crop=1080:1818:0:0");
    }

    #[test]
    fn test_crop_filter_clamps_oversized_band() {
        let region = CropRegion {
            position: CropPosition::Bottom,
            pixels: 5000,
        };
        // Band clamps to half the frame height
        assert_eq!(crop_filter(&region, &info(640, 480)), "crop=640:240:0:0");
    }
}
