use crate::compliance::domain::ComplianceStep;
use crate::compliance::error::ComplianceError;
use crate::compliance::store::{compare_and_set_step, load_step_by_number};
use crate::compliance::transitions::apply_unlock;
use rusqlite::Connection;

/// Moves step `completed_step_number + 1` from `locked` to `pending`.
///
/// Only the immediate successor is ever inspected. A missing successor (end
/// of chain) or one that has already left `locked` is a no-op, so re-running
/// this for the same step number never regresses the chain. Returns the
/// unlocked step when a change was made.
pub(crate) fn unlock_successor(
    connection: &Connection,
    deliverable_id: &str,
    completed_step_number: u32,
    now: i64,
) -> Result<Option<ComplianceStep>, ComplianceError> {
    let Some(next_number) = completed_step_number.checked_add(1) else {
        return Ok(None);
    };
    let Some(mut next) = load_step_by_number(connection, deliverable_id, next_number)? else {
        return Ok(None);
    };
    let Some(outcome) = apply_unlock(&mut next, now) else {
        return Ok(None);
    };
    compare_and_set_step(connection, &next, outcome.previous)?;
    Ok(Some(next))
}
