//! Report exports run as background jobs.
//!
//! An export request becomes a `report.*` job. The handler renders the report
//! from the read models into a CSV artifact; the requesting user is notified
//! when the job completes or when it exhausts its retries and dead-letters.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gemstock_auth::{authorize, AuthzError, Permission, Role};
use gemstock_core::UserId;
use gemstock_stock::VariantId;

use crate::jobs::{
    ExportNotification, Job, JobExecutor, JobId, JobKind, JobResult, JobStatus, JobStore,
    JobStoreError, Notifier,
};
use crate::projections::{MovementLogEntry, MovementLogProjection, StockLevelRow, StockLevelsProjection};
use crate::read_model::ReadModelStore;

/// Reports that can be exported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportKind {
    MovementLog,
    StockLevels,
}

impl ReportKind {
    /// Job type string used for handler routing.
    pub fn job_type(&self) -> &'static str {
        match self {
            ReportKind::MovementLog => "report.movement_log",
            ReportKind::StockLevels => "report.stock_levels",
        }
    }

    pub fn from_job_type(s: &str) -> Option<Self> {
        match s {
            "report.movement_log" => Some(ReportKind::MovementLog),
            "report.stock_levels" => Some(ReportKind::StockLevels),
            _ => None,
        }
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.job_type())
    }
}

/// Export request failure.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    Unauthorized(#[from] AuthzError),
    #[error(transparent)]
    Store(#[from] JobStoreError),
    #[error("failed to encode export request: {0}")]
    Encode(String),
}

/// Job payload for an export request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportRequest {
    pub report: ReportKind,
    pub requested_by: UserId,
}

/// A rendered export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportArtifact {
    pub report: ReportKind,
    pub csv: String,
    pub row_count: usize,
    pub generated_at: DateTime<Utc>,
}

fn csv_field(value: &str) -> String {
    if value.contains(',') || value.contains('"') || value.contains('\n') {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Render the movement log as CSV, oldest first.
pub fn movement_log_csv(entries: &[MovementLogEntry]) -> String {
    let mut out = String::from(
        "event_id,variant_id,sequence,movement_type,quantity_before,quantity_delta,quantity_after,reason,actor,occurred_at\n",
    );
    for e in entries {
        let actor = serde_json::to_string(&e.actor).unwrap_or_default();
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{},{}\n",
            e.event_id,
            e.variant_id.0,
            e.sequence_number,
            e.movement_type,
            e.quantity_before,
            e.quantity_delta,
            e.quantity_after,
            csv_field(&e.reason),
            csv_field(&actor),
            e.occurred_at.to_rfc3339(),
        ));
    }
    out
}

/// Render current stock levels as CSV, sorted by SKU.
pub fn stock_levels_csv(rows: &[StockLevelRow]) -> String {
    let mut rows: Vec<_> = rows.iter().collect();
    rows.sort_by(|a, b| a.sku.cmp(&b.sku));

    let mut out = String::from(
        "variant_id,product_id,sku,quantity_on_hand,reorder_level,status,discontinued,active\n",
    );
    for r in rows {
        out.push_str(&format!(
            "{},{},{},{},{},{:?},{},{}\n",
            r.variant_id.0,
            r.product_id.0,
            csv_field(&r.sku),
            r.quantity_on_hand,
            r.reorder_level,
            r.status,
            r.discontinued,
            r.active,
        ));
    }
    out
}

/// Drives report export jobs end to end.
///
/// Owns a `JobExecutor` with a `report.*` handler; rendered artifacts are
/// kept in memory keyed by job id.
pub struct ReportExportService<J, N>
where
    J: JobStore + Clone + 'static,
    N: Notifier,
{
    jobs: J,
    executor: JobExecutor<J>,
    notifier: N,
    exports: Arc<RwLock<HashMap<JobId, ExportArtifact>>>,
}

impl<J, N> ReportExportService<J, N>
where
    J: JobStore + Clone + 'static,
    N: Notifier,
{
    pub fn new<S>(
        jobs: J,
        notifier: N,
        movements: Arc<MovementLogProjection>,
        stock: Arc<StockLevelsProjection<S>>,
    ) -> Self
    where
        S: ReadModelStore<VariantId, StockLevelRow> + 'static,
    {
        let exports: Arc<RwLock<HashMap<JobId, ExportArtifact>>> =
            Arc::new(RwLock::new(HashMap::new()));

        let mut executor = JobExecutor::new(jobs.clone());
        let handler_exports = exports.clone();
        executor.register_handler("report.*", move |job: &Job| {
            let Some(kind) = ReportKind::from_job_type(job.kind.type_name()) else {
                return JobResult::Failure(format!("unknown report: {}", job.kind.type_name()));
            };

            let (csv, row_count) = match kind {
                ReportKind::MovementLog => {
                    let entries = movements.entries();
                    (movement_log_csv(&entries), entries.len())
                }
                ReportKind::StockLevels => {
                    let rows = stock.list();
                    (stock_levels_csv(&rows), rows.len())
                }
            };

            let artifact = ExportArtifact {
                report: kind,
                csv,
                row_count,
                generated_at: Utc::now(),
            };
            match handler_exports.write() {
                Ok(mut exports) => {
                    exports.insert(job.id, artifact);
                    JobResult::Success
                }
                Err(_) => JobResult::Failure("export storage poisoned".to_string()),
            }
        });

        Self {
            jobs,
            executor,
            notifier,
            exports,
        }
    }

    /// Enqueue an export request. The requester must hold `reports.export`.
    /// Uses the default retry policy: three attempts, then dead-letter.
    pub fn request_export(
        &self,
        report: ReportKind,
        requested_by: UserId,
        roles: &[Role],
    ) -> Result<JobId, ExportError> {
        authorize(roles, &Permission::new("reports.export"))?;

        let request = ExportRequest {
            report,
            requested_by,
        };
        let payload =
            serde_json::to_value(&request).map_err(|e| ExportError::Encode(e.to_string()))?;
        let job = Job::new(JobKind::report_export(report.job_type()), payload);
        Ok(self.jobs.enqueue(job)?)
    }

    /// Claim and run the next ready job. Returns false when the queue is
    /// empty. Notifies the requesting user on completion or dead-letter.
    pub fn process_one(&self) -> Result<bool, JobStoreError> {
        let Some(mut job) = self.jobs.claim_next()? else {
            return Ok(false);
        };

        let outcome = self.executor.execute_one(&mut job);
        self.notify_outcome(&job, outcome.err());
        Ok(true)
    }

    /// Run jobs until the queue is drained.
    pub fn drain(&self) -> Result<usize, JobStoreError> {
        let mut processed = 0;
        while self.process_one()? {
            processed += 1;
        }
        Ok(processed)
    }

    /// Fetch a rendered export by job id.
    pub fn artifact(&self, job_id: JobId) -> Option<ExportArtifact> {
        self.exports.read().ok()?.get(&job_id).cloned()
    }

    fn notify_outcome(&self, job: &Job, error: Option<String>) {
        let Ok(request) = serde_json::from_value::<ExportRequest>(job.payload.clone()) else {
            return;
        };

        match &job.status {
            JobStatus::Completed => {
                let row_count = self
                    .artifact(job.id)
                    .map(|a| a.row_count)
                    .unwrap_or_default();
                self.notifier.notify(ExportNotification::completed(
                    job.id,
                    request.requested_by,
                    request.report.job_type(),
                    row_count,
                ));
            }
            JobStatus::DeadLettered { error: reason, .. } => {
                self.notifier.notify(ExportNotification::failed(
                    job.id,
                    request.requested_by,
                    request.report.job_type(),
                    error.unwrap_or_else(|| reason.clone()),
                ));
            }
            // Retriable failures stay quiet until the outcome is final.
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::{InMemoryJobStore, InMemoryNotifier, RetryPolicy};
    use crate::read_model::InMemoryReadModelStore;
    use chrono::Utc;
    use gemstock_catalog::ProductId;
    use gemstock_core::AggregateId;
    use gemstock_events::EventEnvelope;
    use gemstock_stock::variant::{StockMoved, VariantCreated};
    use gemstock_stock::{Actor, MovementRecord, MovementType, VariantEvent};
    use serde_json::Value as JsonValue;
    use std::time::Duration;
    use uuid::Uuid;

    type StockStore = InMemoryReadModelStore<VariantId, StockLevelRow>;

    fn service(
        jobs: Arc<InMemoryJobStore>,
        notifier: Arc<InMemoryNotifier>,
    ) -> (
        ReportExportService<Arc<InMemoryJobStore>, Arc<InMemoryNotifier>>,
        Arc<MovementLogProjection>,
        Arc<StockLevelsProjection<StockStore>>,
    ) {
        let movements = Arc::new(MovementLogProjection::new());
        let stock = Arc::new(StockLevelsProjection::new(InMemoryReadModelStore::new()));
        let svc = ReportExportService::new(jobs, notifier, movements.clone(), stock.clone());
        (svc, movements, stock)
    }

    fn envelope(variant_id: VariantId, seq: u64, event: &VariantEvent) -> EventEnvelope<JsonValue> {
        EventEnvelope::new(
            Uuid::now_v7(),
            variant_id.0,
            "stock.variant",
            seq,
            serde_json::to_value(event).unwrap(),
        )
    }

    fn seed_variant(
        movements: &MovementLogProjection,
        stock: &StockLevelsProjection<StockStore>,
    ) -> VariantId {
        let id = VariantId::new(AggregateId::new());
        let created = VariantEvent::VariantCreated(VariantCreated {
            variant_id: id,
            product_id: ProductId::new(AggregateId::new()),
            sku: "RING-001-A".to_string(),
            reorder_level: 5,
            occurred_at: Utc::now(),
        });
        let moved = VariantEvent::StockMoved(StockMoved {
            record: MovementRecord::new(
                id,
                MovementType::InitialStock,
                0,
                10,
                "opening balance",
                Actor::system(),
                Utc::now(),
            )
            .unwrap(),
        });

        for (seq, event) in [(1, &created), (2, &moved)] {
            let env = envelope(id, seq, event);
            movements.apply_envelope(&env).unwrap();
            stock.apply_envelope(&env).unwrap();
        }
        id
    }

    #[test]
    fn export_completes_and_notifies_the_requester() {
        let jobs = InMemoryJobStore::arc();
        let notifier = InMemoryNotifier::arc();
        let (svc, movements, stock) = service(jobs.clone(), notifier.clone());
        seed_variant(&movements, &stock);

        let user = UserId::new();
        let job_id = svc
            .request_export(ReportKind::MovementLog, user, &[Role::new("manager")])
            .unwrap();

        assert!(svc.process_one().unwrap());

        let artifact = svc.artifact(job_id).unwrap();
        assert_eq!(artifact.report, ReportKind::MovementLog);
        assert_eq!(artifact.row_count, 1);
        assert!(artifact.csv.contains("opening balance"));

        let sent = notifier.sent_to(user);
        assert_eq!(sent.len(), 1);
        assert!(matches!(
            sent[0],
            ExportNotification::Completed { row_count: 1, .. }
        ));
    }

    #[test]
    fn stock_levels_export_sorts_by_sku() {
        let jobs = InMemoryJobStore::arc();
        let notifier = InMemoryNotifier::arc();
        let (svc, movements, stock) = service(jobs.clone(), notifier.clone());
        seed_variant(&movements, &stock);

        let user = UserId::new();
        let job_id = svc
            .request_export(ReportKind::StockLevels, user, &[Role::new("admin")])
            .unwrap();
        svc.drain().unwrap();

        let artifact = svc.artifact(job_id).unwrap();
        assert_eq!(artifact.row_count, 1);
        assert!(artifact.csv.contains("RING-001-A"));
        assert!(artifact.csv.contains(",10,"));
    }

    #[test]
    fn exhausted_retries_dead_letter_and_notify_failure() {
        let jobs = InMemoryJobStore::arc();
        let notifier = InMemoryNotifier::arc();
        let (svc, _movements, _stock) = service(jobs.clone(), notifier.clone());

        let user = UserId::new();
        // An unroutable report name makes every attempt fail.
        let request = ExportRequest {
            report: ReportKind::MovementLog,
            requested_by: user,
        };
        let job = Job::new(
            JobKind::report_export("report.bogus"),
            serde_json::to_value(&request).unwrap(),
        )
        .with_retry_policy(RetryPolicy::fixed(2, Duration::ZERO));
        let job_id = jobs.enqueue(job).unwrap();

        // First attempt fails but is retriable; no notification yet.
        assert!(svc.process_one().unwrap());
        assert!(notifier.sent().is_empty());

        // Second attempt exhausts the policy.
        assert!(svc.process_one().unwrap());

        let dls = jobs.list_dead_letters(10).unwrap();
        assert_eq!(dls.len(), 1);
        assert_eq!(dls[0].job.id, job_id);

        let sent = notifier.sent_to(user);
        assert_eq!(sent.len(), 1);
        assert!(matches!(sent[0], ExportNotification::Failed { .. }));
    }

    #[test]
    fn clerks_cannot_request_exports() {
        let jobs = InMemoryJobStore::arc();
        let notifier = InMemoryNotifier::arc();
        let (svc, _movements, _stock) = service(jobs.clone(), notifier);

        let err = svc
            .request_export(ReportKind::MovementLog, UserId::new(), &[Role::new("clerk")])
            .unwrap_err();
        assert!(matches!(err, ExportError::Unauthorized(_)));
        assert_eq!(jobs.stats().unwrap().pending, 0);
    }

    #[test]
    fn csv_fields_with_commas_are_quoted() {
        let id = VariantId::new(AggregateId::new());
        let entry = MovementLogEntry {
            event_id: Uuid::now_v7(),
            variant_id: id,
            sequence_number: 1,
            movement_type: MovementType::Adjustment,
            quantity_before: 0,
            quantity_delta: 2,
            quantity_after: 2,
            reason: "recount, shelf B".to_string(),
            actor: Actor::system(),
            occurred_at: Utc::now(),
        };

        let csv = movement_log_csv(&[entry]);
        assert!(csv.contains("\"recount, shelf B\""));
    }
}
