//! Job executor with retry and backoff logic.

use std::collections::HashMap;
use std::sync::{mpsc, Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use chrono::Utc;
use tracing::{debug, error, info, warn};

use super::store::JobStore;
use super::types::{Job, JobKind, JobResult, JobStatus};

/// Job handler function type.
pub type JobHandler = Box<dyn Fn(&Job) -> JobResult + Send + Sync>;

/// Job executor configuration.
#[derive(Debug, Clone)]
pub struct JobExecutorConfig {
    /// How often to poll for new jobs
    pub poll_interval: Duration,
    /// Name for logging
    pub name: String,
}

impl Default for JobExecutorConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            name: "job-executor".to_string(),
        }
    }
}

impl JobExecutorConfig {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

/// Handle to control a running executor.
#[derive(Debug)]
pub struct JobExecutorHandle {
    shutdown: mpsc::Sender<()>,
    join: Option<thread::JoinHandle<()>>,
    stats: Arc<Mutex<ExecutorStats>>,
}

impl JobExecutorHandle {
    /// Request graceful shutdown.
    pub fn shutdown(mut self) {
        let _ = self.shutdown.send(());
        if let Some(j) = self.join.take() {
            let _ = j.join();
        }
    }

    /// Get current executor statistics.
    pub fn stats(&self) -> ExecutorStats {
        self.stats.lock().unwrap().clone()
    }
}

/// Executor runtime statistics.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct ExecutorStats {
    pub jobs_processed: u64,
    pub jobs_succeeded: u64,
    pub jobs_failed: u64,
    pub jobs_dead_lettered: u64,
    pub uptime_secs: u64,
}

/// Background job executor.
///
/// Polls a job store for pending jobs, executes them with registered handlers,
/// and handles retries and dead-lettering.
pub struct JobExecutor<S: JobStore> {
    store: S,
    handlers: HashMap<String, JobHandler>,
}

impl<S: JobStore + 'static> JobExecutor<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a job kind. The pattern may be an exact type
    /// name, a category like `"report.*"`, or the wildcard `"*"`.
    pub fn register_handler<F>(&mut self, kind_pattern: impl Into<String>, handler: F)
    where
        F: Fn(&Job) -> JobResult + Send + Sync + 'static,
    {
        self.handlers.insert(kind_pattern.into(), Box::new(handler));
    }

    fn get_handler(&self, kind: &JobKind) -> Option<&JobHandler> {
        let type_name = kind.type_name();
        if let Some(h) = self.handlers.get(type_name) {
            return Some(h);
        }

        for (pattern, handler) in &self.handlers {
            if pattern.ends_with(".*") {
                let prefix = &pattern[..pattern.len() - 2];
                if type_name.starts_with(prefix) {
                    return Some(handler);
                }
            }
        }

        self.handlers.get("*")
    }

    /// Spawn the executor in a background thread.
    pub fn spawn(self, config: JobExecutorConfig) -> JobExecutorHandle
    where
        S: Send,
    {
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let stats = Arc::new(Mutex::new(ExecutorStats::default()));
        let stats_clone = stats.clone();

        let name = config.name.clone();
        let join = thread::Builder::new()
            .name(name)
            .spawn(move || {
                executor_loop(self, config, shutdown_rx, stats_clone);
            })
            .expect("failed to spawn job executor thread");

        JobExecutorHandle {
            shutdown: shutdown_tx,
            join: Some(join),
            stats,
        }
    }

    /// Execute a single job (for testing or synchronous use).
    pub fn execute_one(&self, job: &mut Job) -> Result<(), String> {
        let handler = self
            .get_handler(&job.kind)
            .ok_or_else(|| format!("no handler for job kind: {:?}", job.kind))?;

        let started = Utc::now();

        match handler(job) {
            JobResult::Success => {
                job.mark_completed(started);
                self.store.update(job).map_err(|e| e.to_string())?;
                Ok(())
            }
            JobResult::Failure(error) => {
                job.mark_failed(error.clone(), started);

                if matches!(job.status, JobStatus::DeadLettered { .. }) {
                    self.store
                        .dead_letter(job.clone(), error.clone())
                        .map_err(|e| e.to_string())?;
                } else {
                    self.store.update(job).map_err(|e| e.to_string())?;
                }

                Err(error)
            }
            JobResult::RetryNow => {
                job.mark_failed("retry requested".to_string(), started);
                job.scheduled_at = None;
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("retry requested".to_string())
            }
            JobResult::RetryAfter(delay) => {
                job.mark_failed("retry after delay".to_string(), started);
                job.scheduled_at =
                    Some(Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default());
                self.store.update(job).map_err(|e| e.to_string())?;
                Err("retry after delay".to_string())
            }
        }
    }
}

fn executor_loop<S: JobStore + 'static>(
    executor: JobExecutor<S>,
    config: JobExecutorConfig,
    shutdown_rx: mpsc::Receiver<()>,
    stats: Arc<Mutex<ExecutorStats>>,
) {
    info!(executor = %config.name, "job executor started");
    let start_time = Instant::now();

    loop {
        if shutdown_rx.try_recv().is_ok() {
            break;
        }

        {
            let mut s = stats.lock().unwrap();
            s.uptime_secs = start_time.elapsed().as_secs();
        }

        match executor.store.claim_next() {
            Ok(Some(mut job)) => {
                debug!(
                    executor = %config.name,
                    job_id = %job.id,
                    kind = ?job.kind,
                    "claimed job"
                );

                let result = run_claimed(&executor, &mut job);

                {
                    let mut s = stats.lock().unwrap();
                    s.jobs_processed += 1;
                    match result {
                        Ok(()) => s.jobs_succeeded += 1,
                        Err(_) => {
                            s.jobs_failed += 1;
                            if matches!(job.status, JobStatus::DeadLettered { .. }) {
                                s.jobs_dead_lettered += 1;
                            }
                        }
                    }
                }

                if let Err(e) = result {
                    debug!(
                        executor = %config.name,
                        job_id = %job.id,
                        error = %e,
                        status = ?job.status,
                        "job execution failed"
                    );
                }
            }
            Ok(None) => {
                thread::sleep(config.poll_interval);
            }
            Err(e) => {
                error!(executor = %config.name, error = ?e, "failed to claim job");
                thread::sleep(config.poll_interval);
            }
        }
    }

    info!(executor = %config.name, "job executor stopped");
}

fn run_claimed<S: JobStore + 'static>(executor: &JobExecutor<S>, job: &mut Job) -> Result<(), String> {
    if executor.get_handler(&job.kind).is_none() {
        let error = format!("no handler for job kind: {:?}", job.kind);
        warn!(job_id = %job.id, error = %error, "no handler for job");
        job.mark_failed(error.clone(), Utc::now());
        executor.store.update(job).ok();
        return Err(error);
    }

    let result = executor.execute_one(job);
    if matches!(job.status, JobStatus::DeadLettered { .. }) {
        warn!(job_id = %job.id, status = ?job.status, "job dead-lettered");
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::store::InMemoryJobStore;
    use crate::jobs::types::RetryPolicy;

    #[test]
    fn execute_successful_job() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());

        executor.register_handler("test", |_job| JobResult::Success);

        let job = Job::new(JobKind::custom("test"), serde_json::json!({}));
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        let result = executor.execute_one(&mut claimed);

        assert!(result.is_ok());
        assert!(matches!(claimed.status, JobStatus::Completed));
    }

    #[test]
    fn execute_failing_job_with_retry() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());

        executor.register_handler("test", |_job| JobResult::Failure("test error".to_string()));

        let job = Job::new(JobKind::custom("test"), serde_json::json!({}))
            .with_retry_policy(RetryPolicy::fixed(2, Duration::from_millis(10)));
        store.enqueue(job).unwrap();

        // First attempt fails but stays retriable.
        let mut claimed = store.claim_next().unwrap().unwrap();
        let result = executor.execute_one(&mut claimed);
        assert!(result.is_err());
        assert!(matches!(claimed.status, JobStatus::Failed { .. }));

        // Skip the backoff window for the test.
        claimed.scheduled_at = None;
        store.update(&claimed).unwrap();

        // Second attempt exhausts the policy.
        let mut claimed = store.claim_next().unwrap().unwrap();
        let result = executor.execute_one(&mut claimed);
        assert!(result.is_err());
        assert!(matches!(claimed.status, JobStatus::DeadLettered { .. }));

        let dls = store.list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
    }

    #[test]
    fn wildcard_handler() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());

        executor.register_handler("*", |_job| JobResult::Success);

        let job = Job::new(JobKind::custom("anything"), serde_json::json!({}));
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_ok());
    }

    #[test]
    fn category_handler() {
        let store = Arc::new(InMemoryJobStore::new());
        let mut executor = JobExecutor::new(store.clone());

        executor.register_handler("report.*", |_job| JobResult::Success);

        let job = Job::new(
            JobKind::report_export("report.movement_log"),
            serde_json::json!({}),
        );
        store.enqueue(job).unwrap();

        let mut claimed = store.claim_next().unwrap().unwrap();
        assert!(executor.execute_one(&mut claimed).is_ok());
    }
}
