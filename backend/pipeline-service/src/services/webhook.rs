/// Outbound webhook delivery
///
/// Fire-and-forget: delivery runs on a detached task, failures are logged
/// and dropped, and nothing here can alter a job's outcome.
use std::time::Duration;

use tracing::{info, warn};

use crate::models::WebhookPayload;

const DELIVERY_TIMEOUT_SECS: u64 = 10;

/// POST the payload to the caller's webhook URL on a detached task
pub fn deliver(url: String, payload: WebhookPayload) {
    tokio::spawn(async move {
        let client = match reqwest::Client::builder()
            .timeout(Duration::from_secs(DELIVERY_TIMEOUT_SECS))
            .build()
        {
            Ok(client) => client,
            Err(err) => {
                warn!("failed to build webhook client: {}", err);
                return;
            }
        };

        match client.post(&url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                info!(%url, job_id = %payload.job_id, "webhook delivered");
            }
            Ok(response) => {
                warn!(%url, status = %response.status(), "webhook delivery rejected");
            }
            Err(err) => {
                warn!(%url, "webhook delivery failed: {}", err);
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProcessingStats, WebhookResult};

    #[test]
    fn test_payload_shape() {
        let payload = WebhookPayload {
            event: "video.processed".to_string(),
            job_id: "ad9509a4-0000-4000-8000-000000000000".to_string(),
            status: "completed".to_string(),
            result: WebhookResult {
                video_bytes: None,
                stats: ProcessingStats {
                    input_size_mb: 4.2,
                    output_size_mb: 3.1,
                    processing_time_seconds: 18.5,
                    watermarks_detected: 1,
                    frames_processed: 450,
                    upscaled: true,
                    method: "modal-inpaint+esrgan".to_string(),
                },
            },
            metadata: serde_json::json!({"campaign": "spring"}),
        };

        let value = serde_json::to_value(&payload).unwrap();
        assert_eq!(value["event"], "video.processed");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["result"]["stats"]["method"], "modal-inpaint+esrgan");
        // Inline bytes are omitted unless requested
        assert!(value["result"].get("video_bytes").is_none());
        assert_eq!(value["metadata"]["campaign"], "spring");
    }
}
