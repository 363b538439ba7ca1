//! Event commands: list, add, edit, delete.

use calctl_providers::{CalendarOperations, EventDraft, EventPatch, ListRequest, MutationOutcome};

use crate::error::ClientResult;

/// Print upcoming events.
pub async fn list(
    ops: &CalendarOperations,
    days: u32,
    max_results: u32,
    from: Option<String>,
    to: Option<String>,
) -> ClientResult<()> {
    let request = ListRequest {
        days_ahead: days,
        from,
        to,
        max_results,
    };
    let listing = ops.list(&request).await?;
    println!("{}", listing.trim_end());
    Ok(())
}

/// Create an event and print its identifier.
pub async fn add(ops: &CalendarOperations, draft: EventDraft) -> ClientResult<()> {
    let created = ops.add(&draft).await?;
    println!("{created}");
    Ok(())
}

/// Edit the event matching `query`.
pub async fn edit(ops: &CalendarOperations, query: &str, patch: EventPatch) -> ClientResult<()> {
    let outcome = ops.edit(query, &patch).await?;
    report(&outcome);
    Ok(())
}

/// Delete the event matching `query`.
pub async fn delete(ops: &CalendarOperations, query: &str) -> ClientResult<()> {
    let outcome = ops.delete(query).await?;
    report(&outcome);
    Ok(())
}

fn report(outcome: &MutationOutcome) {
    println!("{}", outcome.to_string().trim_end());
}
