/// Configuration management for the pipeline service
///
/// Loads configuration from environment variables with sensible defaults.
use serde::Deserialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub modal: ModalConfig,
    pub ffmpeg: FfmpegConfig,
    pub storage: StorageConfig,
}

#[derive(Clone, Debug, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub env: String,
}

/// Remote GPU inference service (Modal) configuration
#[derive(Clone, Debug, Deserialize)]
pub struct ModalConfig {
    pub token_id: Option<String>,
    pub token_secret: Option<String>,
    pub workspace: String,
    pub app_name: String,
    /// Full endpoint overrides; when absent, endpoints are derived from
    /// workspace and app name.
    pub watermark_url: Option<String>,
    pub upscale_url: Option<String>,
    pub health_url: Option<String>,
    pub timeout_secs: u64,
}

impl ModalConfig {
    /// Both halves of the token must be present for the remote path
    pub fn has_credentials(&self) -> bool {
        self.token_id.is_some() && self.token_secret.is_some()
    }

    pub fn watermark_endpoint(&self) -> String {
        self.watermark_url
            .clone()
            .unwrap_or_else(|| self.derived_endpoint("remove-watermark"))
    }

    pub fn upscale_endpoint(&self) -> String {
        self.upscale_url
            .clone()
            .unwrap_or_else(|| self.derived_endpoint("upscale"))
    }

    pub fn health_endpoint(&self) -> String {
        self.health_url
            .clone()
            .unwrap_or_else(|| self.derived_endpoint("health"))
    }

    fn derived_endpoint(&self, function: &str) -> String {
        format!(
            "https://{}--{}-{}.modal.run",
            self.workspace, self.app_name, function
        )
    }
}

/// Local transcoder/prober configuration
#[derive(Clone, Debug, Deserialize)]
pub struct FfmpegConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Wall-clock limit for one ffmpeg/ffprobe invocation
    pub timeout_secs: u64,
}

#[derive(Clone, Debug, Deserialize)]
pub struct StorageConfig {
    /// Shared work directory; per-job files are job-id-qualified
    pub output_dir: PathBuf,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        Ok(Config {
            app: AppConfig {
                host: std::env::var("PIPELINE_SERVICE_HOST")
                    .unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: std::env::var("PIPELINE_SERVICE_PORT")
                    .unwrap_or_else(|_| "8090".to_string())
                    .parse()
                    .unwrap_or(8090),
                env: std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
            },
            modal: ModalConfig {
                token_id: std::env::var("MODAL_TOKEN_ID").ok(),
                token_secret: std::env::var("MODAL_TOKEN_SECRET").ok(),
                workspace: std::env::var("MODAL_WORKSPACE")
                    .unwrap_or_else(|_| "default".to_string()),
                app_name: std::env::var("MODAL_APP_NAME")
                    .unwrap_or_else(|_| "video-pipeline".to_string()),
                watermark_url: std::env::var("MODAL_WATERMARK_URL").ok(),
                upscale_url: std::env::var("MODAL_UPSCALE_URL").ok(),
                health_url: std::env::var("MODAL_HEALTH_URL").ok(),
                timeout_secs: std::env::var("MODAL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(300),
            },
            ffmpeg: FfmpegConfig {
                ffmpeg_path: std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string()),
                ffprobe_path: std::env::var("FFPROBE_PATH")
                    .unwrap_or_else(|_| "ffprobe".to_string()),
                timeout_secs: std::env::var("FFMPEG_TIMEOUT_SECS")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(1800),
            },
            storage: StorageConfig {
                output_dir: std::env::var("PIPELINE_OUTPUT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or_else(|_| std::env::temp_dir().join("pipeline-service")),
            },
        })
    }
}
