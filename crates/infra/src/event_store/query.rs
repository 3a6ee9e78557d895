//! Event query interface for movement browsing and inspection.
//!
//! Read-only queries over stored events, paginated by default. This is what
//! backs the movement history screen: filter by variant, movement event type,
//! or time window, newest first.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use gemstock_core::AggregateId;

use crate::event_store::{EventStoreError, StoredEvent};

/// Pagination parameters for event queries.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Pagination {
    /// Maximum number of events to return.
    pub limit: u32,
    /// Offset for pagination (0-based).
    pub offset: u32,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            limit: 50,
            offset: 0,
        }
    }
}

impl Pagination {
    pub fn new(limit: Option<u32>, offset: Option<u32>) -> Self {
        Self {
            limit: limit.unwrap_or(50).min(1000),
            offset: offset.unwrap_or(0),
        }
    }
}

/// Filter criteria for event queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventFilter {
    /// Filter by aggregate ID (optional).
    pub aggregate_id: Option<AggregateId>,
    /// Filter by aggregate type (optional, e.g. "stock.variant").
    pub aggregate_type: Option<String>,
    /// Filter by event type (optional, e.g. "stock.variant.moved").
    pub event_type: Option<String>,
    /// Filter events that occurred after this time (optional).
    pub occurred_after: Option<DateTime<Utc>>,
    /// Filter events that occurred before this time (optional).
    pub occurred_before: Option<DateTime<Utc>>,
}

impl EventFilter {
    pub fn matches(&self, event: &StoredEvent) -> bool {
        if let Some(id) = self.aggregate_id {
            if event.aggregate_id != id {
                return false;
            }
        }
        if let Some(ref t) = self.aggregate_type {
            if &event.aggregate_type != t {
                return false;
            }
        }
        if let Some(ref t) = self.event_type {
            if &event.event_type != t {
                return false;
            }
        }
        if let Some(after) = self.occurred_after {
            if event.occurred_at <= after {
                return false;
            }
        }
        if let Some(before) = self.occurred_before {
            if event.occurred_at >= before {
                return false;
            }
        }
        true
    }
}

/// Paginated event query result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventQueryResult {
    /// The events matching the query.
    pub events: Vec<StoredEvent>,
    /// Total number of events matching the filter (across all pages).
    pub total: u64,
    /// Pagination parameters used.
    pub pagination: Pagination,
    /// Whether there are more events available.
    pub has_more: bool,
}

/// Query interface for event inspection.
pub trait EventQuery: Send + Sync {
    /// Query events with optional filters and pagination.
    ///
    /// Returns events ordered by occurred_at (descending), with sequence number
    /// breaking ties.
    fn query_events(
        &self,
        filter: EventFilter,
        pagination: Pagination,
    ) -> Result<EventQueryResult, EventStoreError>;

    /// Get events for a specific aggregate stream.
    fn get_aggregate_events(
        &self,
        aggregate_id: AggregateId,
        pagination: Option<Pagination>,
    ) -> Result<EventQueryResult, EventStoreError> {
        let filter = EventFilter {
            aggregate_id: Some(aggregate_id),
            ..Default::default()
        };
        self.query_events(filter, pagination.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_store::{EventStore, InMemoryEventStore, UncommittedEvent};
    use gemstock_core::ExpectedVersion;
    use uuid::Uuid;

    fn seed_event(aggregate_id: AggregateId, event_type: &str) -> UncommittedEvent {
        UncommittedEvent {
            event_id: Uuid::now_v7(),
            aggregate_id,
            aggregate_type: "stock.variant".to_string(),
            event_type: event_type.to_string(),
            event_version: 1,
            occurred_at: Utc::now(),
            payload: serde_json::json!({}),
        }
    }

    #[test]
    fn filter_by_event_type() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        store
            .append(
                vec![
                    seed_event(id, "stock.variant.created"),
                    seed_event(id, "stock.variant.moved"),
                    seed_event(id, "stock.variant.moved"),
                ],
                ExpectedVersion::Exact(0),
            )
            .unwrap();

        let result = store
            .query_events(
                EventFilter {
                    event_type: Some("stock.variant.moved".to_string()),
                    ..Default::default()
                },
                Pagination::default(),
            )
            .unwrap();

        assert_eq!(result.total, 2);
        assert!(result.events.iter().all(|e| e.event_type == "stock.variant.moved"));
    }

    #[test]
    fn pagination_reports_has_more() {
        let store = InMemoryEventStore::new();
        let id = AggregateId::new();

        let events: Vec<_> = (0..5).map(|_| seed_event(id, "stock.variant.moved")).collect();
        store.append(events, ExpectedVersion::Exact(0)).unwrap();

        let page = store
            .query_events(
                EventFilter::default(),
                Pagination {
                    limit: 2,
                    offset: 0,
                },
            )
            .unwrap();

        assert_eq!(page.events.len(), 2);
        assert_eq!(page.total, 5);
        assert!(page.has_more);

        let last = store
            .query_events(
                EventFilter::default(),
                Pagination {
                    limit: 2,
                    offset: 4,
                },
            )
            .unwrap();
        assert_eq!(last.events.len(), 1);
        assert!(!last.has_more);
    }

    #[test]
    fn stream_scoped_query_only_sees_its_aggregate() {
        let store = InMemoryEventStore::new();
        let a = AggregateId::new();
        let b = AggregateId::new();

        store
            .append(vec![seed_event(a, "stock.variant.created")], ExpectedVersion::Exact(0))
            .unwrap();
        store
            .append(vec![seed_event(b, "stock.variant.created")], ExpectedVersion::Exact(0))
            .unwrap();

        let result = store.get_aggregate_events(a, None).unwrap();
        assert_eq!(result.total, 1);
        assert_eq!(result.events[0].aggregate_id, a);
    }
}
