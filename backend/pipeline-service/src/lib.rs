//! Video Pipeline Service
//!
//! Job-tracked, multi-stage video processing: optional watermark removal via
//! a remote GPU service with a local crop fallback, optional upscaling with a
//! local Lanczos fallback, and a final re-encode to the requested codec and
//! quality. Jobs are held in an in-memory store and exposed over HTTP for
//! polling, listing, and download.

pub mod config;
pub mod error;
pub mod handlers;
pub mod jobs;
pub mod models;
pub mod services;

// Public re-exports
pub use config::Config;
pub use error::{AppError, Result};
