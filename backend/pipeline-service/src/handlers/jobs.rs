/// Job handlers - HTTP endpoints for job submission and status
use actix_web::web;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::{JobStatusResponse, JobSummary, SubmitJobRequest, SubmitJobResponse};
use crate::services::ProcessingPipeline;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<usize>,
}

/// Submit a video for processing. Returns 202 immediately; the pipeline
/// runs on a background task, so input problems (including a missing video
/// source) surface as a failed job rather than a synchronous error.
pub async fn submit_job(
    pipeline: web::Data<ProcessingPipeline>,
    req: web::Json<SubmitJobRequest>,
) -> Result<actix_web::HttpResponse> {
    let job = pipeline.submit(req.into_inner())?;

    Ok(actix_web::HttpResponse::Accepted().json(SubmitJobResponse {
        job_id: job.id.to_string(),
        status: job.status().as_str().to_string(),
    }))
}

/// Get the full status document for one job
pub async fn get_job(
    pipeline: web::Data<ProcessingPipeline>,
    job_id: web::Path<String>,
) -> Result<actix_web::HttpResponse> {
    let job_uuid = Uuid::parse_str(&job_id)
        .map_err(|_| AppError::BadRequest("Invalid job ID".to_string()))?;

    let job = pipeline
        .store()
        .get(job_uuid)
        .ok_or(AppError::NotFound("Job not found".to_string()))?;

    Ok(actix_web::HttpResponse::Ok().json(JobStatusResponse::from(&job)))
}

/// List jobs newest-first as abbreviated summaries
pub async fn list_jobs(
    pipeline: web::Data<ProcessingPipeline>,
    query: web::Query<ListQuery>,
) -> Result<actix_web::HttpResponse> {
    let jobs = pipeline.store().list(query.limit);
    let summaries: Vec<JobSummary> = jobs.iter().map(JobSummary::from).collect();
    Ok(actix_web::HttpResponse::Ok().json(summaries))
}

/// Download the processed video as an mp4 attachment. Only valid once the
/// job has completed.
pub async fn download_job(
    pipeline: web::Data<ProcessingPipeline>,
    job_id: web::Path<String>,
) -> Result<actix_web::HttpResponse> {
    let job_uuid = Uuid::parse_str(&job_id)
        .map_err(|_| AppError::BadRequest("Invalid job ID".to_string()))?;

    let job = pipeline
        .store()
        .get(job_uuid)
        .ok_or(AppError::NotFound("Job not found".to_string()))?;

    let result = job
        .result()
        .ok_or_else(|| AppError::BadRequest("Job is not completed".to_string()))?;

    let bytes = match (&result.video_path, &result.video_base64) {
        (Some(path), _) if tokio::fs::try_exists(path).await.unwrap_or(false) => {
            tokio::fs::read(path).await?
        }
        (_, Some(encoded)) => BASE64
            .decode(encoded.as_bytes())
            .map_err(|e| AppError::Internal(format!("Corrupt stored result: {}", e)))?,
        _ => {
            // Neither the file nor inline bytes survive; a recorded remote
            // URL still lets the caller fetch the artifact
            if let Some(url) = &result.video_url {
                return Ok(actix_web::HttpResponse::Found()
                    .insert_header(("Location", url.clone()))
                    .finish());
            }
            return Err(AppError::NotFound(
                "Processed video is no longer available".to_string(),
            ));
        }
    };

    Ok(actix_web::HttpResponse::Ok()
        .content_type("video/mp4")
        .insert_header((
            "Content-Disposition",
            format!("attachment; filename=\"{}.mp4\"", job_uuid),
        ))
        .body(bytes))
}
