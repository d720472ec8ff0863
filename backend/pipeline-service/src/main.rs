/// Pipeline Service - HTTP Server
///
/// Accepts video processing jobs, runs them through the watermark removal /
/// upscaling / encoding pipeline, and serves job status and results.
use actix_web::{middleware as actix_middleware, web, App, HttpResponse, HttpServer};
use pipeline_service::handlers;
use pipeline_service::jobs::JobStore;
use pipeline_service::services::{
    ModalClient, ProcessingPipeline, Transcoder, Upscaler, WatermarkRemover,
};
use pipeline_service::Config;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const SWEEP_INTERVAL_SECS: u64 = 3600;

#[actix_web::main]
async fn main() -> io::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    // Load configuration from environment
    let config = Config::from_env().expect("Failed to load configuration");

    let bind_address = format!("{}:{}", config.app.host, config.app.port);
    tracing::info!("Pipeline service starting HTTP server on {}", bind_address);

    if config.modal.has_credentials() {
        tracing::info!(
            "Modal credentials present; remote GPU inference enabled ({})",
            config.modal.watermark_endpoint()
        );
    } else {
        tracing::warn!("Modal credentials not set; all stages run on local ffmpeg fallbacks");
    }

    let modal = Arc::new(
        ModalClient::new(config.modal.clone())
            .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{}", e)))?,
    );
    let transcoder = Arc::new(Transcoder::new(config.ffmpeg.clone()));
    let store = Arc::new(JobStore::new());

    let pipeline = ProcessingPipeline::new(
        Arc::clone(&store),
        Arc::new(WatermarkRemover::new(
            Arc::clone(&modal),
            Arc::clone(&transcoder),
        )),
        Arc::new(Upscaler::new(Arc::clone(&modal), Arc::clone(&transcoder))),
        transcoder,
        config.storage.output_dir.clone(),
    )
    .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("{}", e)))?;

    // Hourly sweep of expired terminal jobs
    let sweep_store = Arc::clone(&store);
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(SWEEP_INTERVAL_SECS));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            let removed = sweep_store.sweep();
            if removed > 0 {
                tracing::info!("swept {} expired jobs", removed);
            }
        }
    });

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(config.clone()))
            .app_data(web::Data::new(pipeline.clone()))
            .app_data(web::Data::new(Arc::clone(&modal)))
            .app_data(web::JsonConfig::default().limit(256 * 1024 * 1024))
            .wrap(actix_middleware::Logger::default())
            .route(
                "/api/v1/health",
                web::get()
                    .to(|| async { HttpResponse::Ok().json(serde_json::json!({"status": "ok"})) }),
            )
            .route(
                "/api/v1/health/remote",
                web::get().to(|modal: web::Data<Arc<ModalClient>>| async move {
                    match modal.health().await {
                        Ok(()) => HttpResponse::Ok().json(serde_json::json!({"remote": "ok"})),
                        Err(err) => HttpResponse::BadGateway()
                            .json(serde_json::json!({"remote": "unavailable", "error": err.to_string()})),
                    }
                }),
            )
            .service(
                web::scope("/api/v1").service(
                    web::scope("/jobs")
                        .route("", web::post().to(handlers::submit_job))
                        .route("", web::get().to(handlers::list_jobs))
                        .route("/{id}", web::get().to(handlers::get_job))
                        .route("/{id}/download", web::get().to(handlers::download_job)),
                ),
            )
    })
    .bind(&bind_address)?
    .run()
    .await
}
