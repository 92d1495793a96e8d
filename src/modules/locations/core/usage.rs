// Usage-count bookkeeping.
//
// Purpose
// - A location's usage count follows the non-deleted events that reference it.
//
// Responsibilities
// - Express every change to an event's effective location list as per-location deltas.

use crate::modules::events::core::state::EventRecord;
use crate::shared::core::primitives::LocationId;

/// References that count towards usage. Deleted events count for nothing.
pub fn counted_locations(record: Option<&EventRecord>) -> &[LocationId] {
    match record {
        Some(record) if !record.is_deleted => &record.location_ids,
        _ => &[],
    }
}

/// `+1` for each id only in `after`, `-1` for each id only in `before`.
pub fn usage_deltas(before: &[LocationId], after: &[LocationId]) -> Vec<(LocationId, i64)> {
    let mut deltas: Vec<(LocationId, i64)> = Vec::new();
    for id in before {
        if !after.contains(id) && !deltas.iter().any(|(seen, _)| seen == id) {
            deltas.push((id.clone(), -1));
        }
    }
    for id in after {
        if !before.contains(id) && !deltas.iter().any(|(seen, _)| seen == id) {
            deltas.push((id.clone(), 1));
        }
    }
    deltas
}
