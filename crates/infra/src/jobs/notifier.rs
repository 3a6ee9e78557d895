//! User notifications for background job outcomes.

use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gemstock_core::UserId;

use super::types::JobId;

/// Notification sent to the user who requested an export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum ExportNotification {
    Completed {
        job_id: JobId,
        user_id: UserId,
        report: String,
        row_count: usize,
        notified_at: DateTime<Utc>,
    },
    Failed {
        job_id: JobId,
        user_id: UserId,
        report: String,
        error: String,
        notified_at: DateTime<Utc>,
    },
}

impl ExportNotification {
    pub fn completed(job_id: JobId, user_id: UserId, report: impl Into<String>, row_count: usize) -> Self {
        Self::Completed {
            job_id,
            user_id,
            report: report.into(),
            row_count,
            notified_at: Utc::now(),
        }
    }

    pub fn failed(
        job_id: JobId,
        user_id: UserId,
        report: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self::Failed {
            job_id,
            user_id,
            report: report.into(),
            error: error.into(),
            notified_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> UserId {
        match self {
            Self::Completed { user_id, .. } | Self::Failed { user_id, .. } => *user_id,
        }
    }
}

/// Delivery channel for export notifications.
pub trait Notifier: Send + Sync {
    fn notify(&self, notification: ExportNotification);
}

impl<N: Notifier + ?Sized> Notifier for Arc<N> {
    fn notify(&self, notification: ExportNotification) {
        (**self).notify(notification);
    }
}

/// Collects notifications in memory, for tests and the desktop shell.
#[derive(Debug, Default)]
pub struct InMemoryNotifier {
    sent: RwLock<Vec<ExportNotification>>,
}

impl InMemoryNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }

    pub fn sent(&self) -> Vec<ExportNotification> {
        match self.sent.read() {
            Ok(s) => s.clone(),
            Err(_) => vec![],
        }
    }

    pub fn sent_to(&self, user_id: UserId) -> Vec<ExportNotification> {
        self.sent()
            .into_iter()
            .filter(|n| n.user_id() == user_id)
            .collect()
    }
}

impl Notifier for InMemoryNotifier {
    fn notify(&self, notification: ExportNotification) {
        if let Ok(mut sent) = self.sent.write() {
            sent.push(notification);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collects_notifications_per_user() {
        let notifier = InMemoryNotifier::new();
        let alice = UserId::new();
        let bob = UserId::new();

        notifier.notify(ExportNotification::completed(
            JobId::new(),
            alice,
            "movement_log",
            42,
        ));
        notifier.notify(ExportNotification::failed(
            JobId::new(),
            bob,
            "stock_levels",
            "boom",
        ));

        assert_eq!(notifier.sent().len(), 2);
        assert_eq!(notifier.sent_to(alice).len(), 1);
        assert!(matches!(
            notifier.sent_to(bob)[0],
            ExportNotification::Failed { .. }
        ));
    }
}
