//! Background job system with retry, backoff, and dead-letter handling.
//!
//! ## Design
//!
//! - Jobs are typed and carry a JSON payload
//! - Retry policy with fixed backoff by default, then dead-letter
//! - Dead-letter queue for inspection and manual replay
//! - Notifications back to the requesting user on export outcomes
//!
//! ## Components
//!
//! - `Job`: core job abstraction with payload and metadata
//! - `JobStore`: persistence for jobs (in-memory here)
//! - `JobExecutor`: runs jobs with retry logic
//! - `Notifier`: delivery channel for export outcome notifications

pub mod executor;
pub mod notifier;
pub mod store;
pub mod types;

pub use executor::{ExecutorStats, JobExecutor, JobExecutorConfig, JobExecutorHandle};
pub use notifier::{ExportNotification, InMemoryNotifier, Notifier};
pub use store::{InMemoryJobStore, JobStats, JobStore, JobStoreError};
pub use types::{
    BackoffStrategy, DeadLetterEntry, Job, JobId, JobKind, JobResult, JobStatus, RetryPolicy,
};
