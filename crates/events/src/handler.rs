/// Execute an aggregate command deterministically (no IO, no async).
///
/// Decide via `handle`, then evolve in place via `apply` for each emitted event.
/// For the full pipeline (persistence + publication) use the command dispatcher
/// in the infra layer; this helper is for inline processing and tests.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: gemstock_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
