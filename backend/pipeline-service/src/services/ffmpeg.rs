/// Local transcoding and media inspection
///
/// Wraps ffmpeg/ffprobe subprocess invocations: the final encode stage, the
/// fixed-settings filter re-encode used by the local watermark crop and the
/// Lanczos upscale fallback, and a read-only probe for stream metadata.
/// Every invocation carries a wall-clock timeout; a non-zero exit surfaces
/// the tail of stderr in the error message.
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

use crate::config::FfmpegConfig;
use crate::error::{AppError, Result};
use crate::models::{Codec, EncodeOptions};
use crate::services::EncodeStage;

/// Fixed quality settings for intermediate filter re-encodes
const FILTER_CRF: &str = "18";
const FILTER_PRESET: &str = "medium";

/// How much of stderr to include in error messages
const STDERR_TAIL_CHARS: usize = 800;

/// Stream metadata extracted via ffprobe
#[derive(Debug, Clone)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub duration_seconds: f64,
    pub frame_rate: f32,
    pub codec: String,
}

/// FFprobe JSON output structure
#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// Local ffmpeg/ffprobe adapter
pub struct Transcoder {
    cfg: FfmpegConfig,
}

impl Transcoder {
    pub fn new(cfg: FfmpegConfig) -> Self {
        Self { cfg }
    }

    /// Extract width, height, duration, frame rate, and codec name
    pub async fn probe(&self, input: &Path) -> Result<MediaInfo> {
        let args = [
            "-v",
            "error",
            "-show_streams",
            "-show_format",
            "-of",
            "json",
        ];
        let output = timeout(
            Duration::from_secs(self.cfg.timeout_secs),
            Command::new(&self.cfg.ffprobe_path)
                .args(args)
                .arg(input)
                .output(),
        )
        .await
        .map_err(|_| {
            AppError::Transcode(format!(
                "ffprobe timed out after {}s",
                self.cfg.timeout_secs
            ))
        })?
        .map_err(|e| AppError::Transcode(format!("ffprobe spawn error: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Transcode(format!(
                "ffprobe exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }

        parse_probe(&output.stdout)
    }

    /// Re-encode with a video filter at the fixed intermediate settings
    /// (h264, CRF 18, medium preset), copying the audio stream unchanged
    pub async fn filter_encode(&self, input: &Path, output: &Path, filter: &str) -> Result<()> {
        let args = filter_encode_args(input, output, filter);
        self.run_ffmpeg(&args).await
    }

    async fn run_ffmpeg(&self, args: &[String]) -> Result<()> {
        debug!(?args, "invoking ffmpeg");
        let output = timeout(
            Duration::from_secs(self.cfg.timeout_secs),
            Command::new(&self.cfg.ffmpeg_path).args(args).output(),
        )
        .await
        .map_err(|_| {
            AppError::Transcode(format!("ffmpeg timed out after {}s", self.cfg.timeout_secs))
        })?
        .map_err(|e| AppError::Transcode(format!("ffmpeg spawn error: {}", e)))?;

        if !output.status.success() {
            return Err(AppError::Transcode(format!(
                "ffmpeg exited with {}: {}",
                output.status,
                stderr_tail(&output.stderr)
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl EncodeStage for Transcoder {
    async fn encode(&self, input: &Path, output: &Path, options: &EncodeOptions) -> Result<()> {
        let args = encode_args(input, output, options);
        self.run_ffmpeg(&args).await
    }
}

/// ffmpeg codec library for a target codec
pub fn encoder_lib(codec: Codec) -> &'static str {
    match codec {
        Codec::Hevc => "libx265",
        Codec::H264 => "libx264",
    }
}

/// Argument list for the final encode: requested codec/CRF/preset, AAC audio
/// at 192kbps, 4:2:0 pixel format, faststart for progressive playback
fn encode_args(input: &Path, output: &Path, options: &EncodeOptions) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-c:v".into(),
        encoder_lib(options.codec).into(),
        "-crf".into(),
        options.crf.to_string(),
        "-preset".into(),
        options.preset.clone(),
        "-c:a".into(),
        "aac".into(),
        "-b:a".into(),
        "192k".into(),
        "-pix_fmt".into(),
        "yuv420p".into(),
        "-movflags".into(),
        "+faststart".into(),
        output.to_string_lossy().into_owned(),
    ]
}

fn filter_encode_args(input: &Path, output: &Path, filter: &str) -> Vec<String> {
    vec![
        "-y".into(),
        "-i".into(),
        input.to_string_lossy().into_owned(),
        "-vf".into(),
        filter.to_string(),
        "-c:v".into(),
        "libx264".into(),
        "-crf".into(),
        FILTER_CRF.into(),
        "-preset".into(),
        FILTER_PRESET.into(),
        "-c:a".into(),
        "copy".into(),
        output.to_string_lossy().into_owned(),
    ]
}

fn parse_probe(stdout: &[u8]) -> Result<MediaInfo> {
    let probe: ProbeOutput = serde_json::from_slice(stdout)
        .map_err(|e| AppError::Transcode(format!("ffprobe json parse: {}", e)))?;

    let video = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| AppError::Transcode("no video stream found".to_string()))?;

    let width = video.width.unwrap_or(0);
    let height = video.height.unwrap_or(0);
    if width == 0 || height == 0 {
        return Err(AppError::Transcode(
            "video stream has no pixel dimensions".to_string(),
        ));
    }

    let frame_rate = video
        .r_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .unwrap_or(30.0);

    let duration_seconds = probe
        .format
        .and_then(|f| f.duration)
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    Ok(MediaInfo {
        width,
        height,
        duration_seconds,
        frame_rate,
        codec: video.codec_name.clone().unwrap_or_default(),
    })
}

/// Parse a rational "num/den" frame rate string
fn parse_frame_rate(raw: &str) -> Option<f32> {
    let (num, den) = raw.split_once('/')?;
    let num = num.parse::<f32>().ok()?;
    let den = den.parse::<f32>().ok()?;
    if den > 0.0 {
        Some(num / den)
    } else {
        None
    }
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let trimmed = text.trim();
    if trimmed.len() <= STDERR_TAIL_CHARS {
        return trimmed.to_string();
    }
    let start = trimmed.len() - STDERR_TAIL_CHARS;
    // Avoid splitting a UTF-8 sequence
    let start = (start..trimmed.len())
        .find(|i| trimmed.is_char_boundary(*i))
        .unwrap_or(start);
    trimmed[start..].to_string()
}
