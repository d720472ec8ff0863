/// In-memory job registry
///
/// Authoritative state for all processing jobs. Jobs are ephemeral compute
/// tasks; nothing is persisted across process restarts. The store is an
/// explicit shared object injected into the orchestrator and the HTTP
/// handlers, synchronized with an RwLock so concurrent job tasks can update
/// it safely.
///
/// Subscriber callbacks registered for a job id are invoked synchronously,
/// in registration order, before the triggering update call returns.
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;

use chrono::{Duration, Utc};
use tracing::debug;
use uuid::Uuid;

use crate::models::{Job, JobResult, JobState, ProcessingOptions, Stage};

/// Jobs older than this are removed by `sweep`
const RETENTION_HOURS: i64 = 24;

/// Default page size for `list`
const DEFAULT_LIST_LIMIT: usize = 50;

type SubscriberFn = Box<dyn Fn(&Job) + Send + Sync>;

/// Token identifying one registered subscriber callback
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    job_id: Uuid,
    token: u64,
}

#[derive(Default)]
pub struct JobStore {
    jobs: RwLock<HashMap<Uuid, Job>>,
    subscribers: RwLock<HashMap<Uuid, Vec<(u64, SubscriberFn)>>>,
    next_token: AtomicU64,
}

impl JobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh job in the `queued` state. Always succeeds.
    pub fn create(&self, options: ProcessingOptions, metadata: serde_json::Value) -> Job {
        let job = Job {
            id: Uuid::new_v4(),
            state: JobState::Queued,
            progress: 0,
            stage: Stage::Queued,
            options,
            metadata,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        };
        self.jobs
            .write()
            .expect("job map lock poisoned")
            .insert(job.id, job.clone());
        job
    }

    pub fn get(&self, id: Uuid) -> Option<Job> {
        self.jobs
            .read()
            .expect("job map lock poisoned")
            .get(&id)
            .cloned()
    }

    /// All jobs sorted by created-time descending, truncated to `limit`
    pub fn list(&self, limit: Option<usize>) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .expect("job map lock poisoned")
            .values()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs.truncate(limit.unwrap_or(DEFAULT_LIST_LIMIT));
        jobs
    }

    /// Apply a mutation to a job and notify its subscribers.
    ///
    /// Returns the updated job, or `None` if the id is unknown. Subscribers
    /// run after the job map lock is released but before this call returns.
    pub fn update(&self, id: Uuid, mutate: impl FnOnce(&mut Job)) -> Option<Job> {
        let updated = {
            let mut jobs = self.jobs.write().expect("job map lock poisoned");
            let job = jobs.get_mut(&id)?;
            mutate(job);
            job.clone()
        };
        self.notify(&updated);
        Some(updated)
    }

    /// Transition a job into `processing`
    pub fn start(&self, id: Uuid) -> Option<Job> {
        self.update(id, |job| {
            job.state = JobState::Processing;
            job.stage = Stage::Starting;
            // Entering the pipeline lands on the first checkpoint; 0 is
            // reserved for queued jobs.
            job.progress = 5;
            job.started_at = Some(Utc::now());
        })
    }

    /// Record progress and the current stage. Progress never decreases, and
    /// the call is a no-op unless the job is processing.
    pub fn report_progress(&self, id: Uuid, percent: u8, stage: Stage) -> Option<Job> {
        self.update(id, |job| {
            if matches!(job.state, JobState::Processing) {
                job.progress = job.progress.max(percent.min(100));
                job.stage = stage;
            }
        })
    }

    pub fn complete(&self, id: Uuid, result: JobResult) -> Option<Job> {
        self.update(id, |job| {
            job.state = JobState::Completed { result };
            job.progress = 100;
            job.stage = Stage::Completed;
            job.completed_at = Some(Utc::now());
        })
    }

    pub fn fail(&self, id: Uuid, message: impl Into<String>) -> Option<Job> {
        let message = message.into();
        self.update(id, |job| {
            job.state = JobState::Failed { error: message };
            job.stage = Stage::Failed;
            job.completed_at = Some(Utc::now());
        })
    }

    /// Register a callback invoked on every future update to the job.
    /// The returned token removes exactly this callback via `unsubscribe`.
    pub fn subscribe(&self, id: Uuid, callback: impl Fn(&Job) + Send + Sync + 'static) -> Subscription {
        let token = self.next_token.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .expect("subscriber map lock poisoned")
            .entry(id)
            .or_default()
            .push((token, Box::new(callback)));
        Subscription { job_id: id, token }
    }

    pub fn unsubscribe(&self, subscription: &Subscription) {
        let mut subscribers = self
            .subscribers
            .write()
            .expect("subscriber map lock poisoned");
        if let Some(entries) = subscribers.get_mut(&subscription.job_id) {
            entries.retain(|(token, _)| *token != subscription.token);
            if entries.is_empty() {
                subscribers.remove(&subscription.job_id);
            }
        }
    }

    /// Remove every job created more than the retention window ago, along
    /// with its subscriber list. Returns the number of jobs removed.
    pub fn sweep(&self) -> usize {
        let cutoff = Utc::now() - Duration::hours(RETENTION_HOURS);
        let expired: Vec<Uuid> = {
            let jobs = self.jobs.read().expect("job map lock poisoned");
            jobs.values()
                .filter(|job| job.created_at < cutoff)
                .map(|job| job.id)
                .collect()
        };
        if expired.is_empty() {
            return 0;
        }

        let mut jobs = self.jobs.write().expect("job map lock poisoned");
        let mut subscribers = self
            .subscribers
            .write()
            .expect("subscriber map lock poisoned");
        for id in &expired {
            jobs.remove(id);
            subscribers.remove(id);
        }
        debug!(removed = expired.len(), "swept expired jobs");
        expired.len()
    }

    fn notify(&self, job: &Job) {
        let subscribers = self
            .subscribers
            .read()
            .expect("subscriber map lock poisoned");
        if let Some(entries) = subscribers.get(&job.id) {
            for (_, callback) in entries {
                callback(job);
            }
        }
    }
}
