use gemstock_core::AggregateId;

/// A command targets a specific aggregate.
///
/// Commands represent **intent** - a request to perform an action on an aggregate.
/// They are transient (not persisted) and are transformed into events (which are).
///
/// - **Command**: intent to do something (e.g. "apply a stock delta of -3")
/// - **Event**: fact that something happened (e.g. "StockMoved { delta: -3, .. }")
///
/// Commands are rejected if invalid; events represent accepted changes. The
/// `target_aggregate_id` lets infrastructure route a command to the right stream
/// and keeps each command scoped to a single aggregate (the transaction boundary).
pub trait Command: Clone + core::fmt::Debug + Send + Sync + 'static {
    fn target_aggregate_id(&self) -> AggregateId;
}
