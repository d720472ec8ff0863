/// HTTP handlers - request routing and endpoint functions
pub mod jobs;

pub use jobs::{download_job, get_job, list_jobs, submit_job};
