use crate::{Event, EventEnvelope};

/// A projection builds a read model from an append-only event stream.
///
/// Read models are **disposable**: events are the source of truth, and a
/// projection can always be rebuilt from scratch by replaying history. This is
/// what powers the dashboard and listing screens without touching the write side.
///
/// Projections must be **idempotent**: with at-least-once delivery, the same
/// envelope may be applied more than once. The usual strategy is a per-stream
/// sequence cursor (see `ProjectionRunner`), which skips already-seen envelopes.
///
/// Storage is out of scope here; implementations decide where the read model
/// lives (in-memory maps for tests, a database table in production).
pub trait Projection {
    type Ev: Event;

    /// Apply a single event to the projection, updating the read model.
    ///
    /// Must be idempotent; events that are not relevant to this projection
    /// should be ignored rather than treated as errors.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Ev>);
}
