/// Execute an aggregate command in place (decide, then evolve).
///
/// 1. Calls `aggregate.handle(command)` to get events (pure, no mutation)
/// 2. Applies each event via `aggregate.apply(event)`
///
/// Used by unit tests and by the infra unit of work, which stages the
/// returned events for an atomic append after every aggregate has decided.
pub fn execute<A>(aggregate: &mut A, command: &A::Command) -> Result<Vec<A::Event>, A::Error>
where
    A: borrowdesk_core::Aggregate,
{
    let events = A::handle(aggregate, command)?;
    for ev in &events {
        A::apply(aggregate, ev);
    }
    Ok(events)
}
