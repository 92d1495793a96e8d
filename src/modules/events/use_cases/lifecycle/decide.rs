// Pure deciders for the event lifecycle.
//
// Purpose
// - Turn (current record, actor, command) into at most one LifecycleEvent.
//
// Responsibilities
// - Guards are evaluated in a fixed order: permission, then state, then input validation.
//   A failing guard yields `Decision::Rejected` and nothing is emitted.
// - Deleting an already deleted event is `Decision::Unchanged`, not an error.
//
// Boundaries
// - No I/O and no clock. The handler supplies ids and timestamps.

use crate::modules::events::core::events::{DraftCreated, LifecycleEvent, Stamp};
use crate::modules::events::core::state::{
    EventChanges, EventRecord, EventStatus, PendingEditRequest,
};
use crate::modules::events::use_cases::lifecycle::commands::CreateDraft;
use crate::modules::events::use_cases::lifecycle::decision::{DecideError, Decision};
use crate::shared::core::primitives::{Actor, human_event_id};
use chrono::{DateTime, Utc};

fn rejected(reason: DecideError) -> Decision {
    Decision::Rejected { reason }
}

fn accepted(event: LifecycleEvent) -> Decision {
    Decision::Accepted { event }
}

fn require_reason(reason: &str, what: &str) -> Result<String, DecideError> {
    let trimmed = reason.trim();
    if trimmed.is_empty() {
        return Err(DecideError::Validation(format!("a reason is required to {what}")));
    }
    Ok(trimmed.to_string())
}

fn require_approver(actor: &Actor, what: &str) -> Result<(), DecideError> {
    if actor.is_approver() {
        Ok(())
    } else {
        Err(DecideError::Permission(format!("only approvers can {what}")))
    }
}

fn require_owner_or_approver(
    state: &EventRecord,
    actor: &Actor,
    what: &str,
) -> Result<(), DecideError> {
    if state.is_owned_by(&actor.user_id) || actor.is_approver() {
        Ok(())
    } else {
        Err(DecideError::Permission(format!(
            "only the owner or an approver can {what}"
        )))
    }
}

fn require_owner(state: &EventRecord, actor: &Actor, what: &str) -> Result<(), DecideError> {
    if state.is_owned_by(&actor.user_id) {
        Ok(())
    } else {
        Err(DecideError::Permission(format!("only the owner can {what}")))
    }
}

fn require_status(state: &EventRecord, expected: EventStatus, what: &str) -> Result<(), DecideError> {
    if state.status == expected {
        Ok(())
    } else {
        Err(DecideError::conflict(
            format!("cannot {what} an event that is {}", state.status),
            state.status,
        ))
    }
}

/// Title must stay non-empty and the resulting interval must be positive.
fn validate_changes(state: &EventRecord, changes: &EventChanges) -> Result<(), DecideError> {
    if let Some(title) = &changes.title {
        if title.trim().is_empty() {
            return Err(DecideError::Validation("title must not be empty".into()));
        }
    }
    let start = changes.start.unwrap_or(state.start);
    let end = changes.end.unwrap_or(state.end);
    if end <= start {
        return Err(DecideError::Validation("end must be after start".into()));
    }
    Ok(())
}

pub fn decide_create_draft(
    command: CreateDraft,
    actor: &Actor,
    id: String,
    now: DateTime<Utc>,
) -> Decision {
    let title = command.title.trim().to_string();
    if title.is_empty() {
        return rejected(DecideError::Validation("title is required".into()));
    }
    let (Some(start), Some(end)) = (command.start, command.end) else {
        return rejected(DecideError::Validation("start and end are required".into()));
    };
    if end <= start {
        return rejected(DecideError::Validation("end must be after start".into()));
    }

    let mut location_ids = Vec::with_capacity(command.location_ids.len());
    for location_id in command.location_ids {
        if !location_ids.contains(&location_id) {
            location_ids.push(location_id);
        }
    }

    accepted(LifecycleEvent::DraftCreated(DraftCreated {
        event_id: human_event_id(&id, now),
        id,
        calendar_id: command.calendar_id,
        title,
        description: command.description,
        category: command.category,
        start,
        end,
        utc_offset_minutes: command.utc_offset_minutes,
        time_zone: command.time_zone,
        is_all_day: command.is_all_day,
        location_ids,
        setup_minutes: command.setup_minutes,
        teardown_minutes: command.teardown_minutes,
        internal_notes: command.internal_notes,
        stamp: Stamp::new(actor, now),
    }))
}

pub fn decide_update_draft(
    state: &EventRecord,
    changes: EventChanges,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Decision {
    let checked = require_owner(state, actor, "update a draft")
        .and_then(|_| require_status(state, EventStatus::Draft, "update"))
        .and_then(|_| {
            if changes.is_empty() {
                Err(DecideError::Validation("no changes supplied".into()))
            } else {
                validate_changes(state, &changes)
            }
        });
    match checked {
        Ok(()) => accepted(LifecycleEvent::DraftUpdated {
            changes,
            stamp: Stamp::new(actor, now),
        }),
        Err(reason) => rejected(reason),
    }
}

pub fn decide_submit(state: &EventRecord, actor: &Actor, now: DateTime<Utc>) -> Decision {
    let checked = require_owner_or_approver(state, actor, "submit this event")
        .and_then(|_| require_status(state, EventStatus::Draft, "submit"));
    match checked {
        Ok(()) => accepted(LifecycleEvent::Submitted {
            stamp: Stamp::new(actor, now),
        }),
        Err(reason) => rejected(reason),
    }
}

/// Guard shared by the pre-flight check and the final decision of an approval.
pub fn ensure_can_approve(state: &EventRecord, actor: &Actor) -> Result<(), DecideError> {
    require_approver(actor, "approve events")?;
    if state.status == EventStatus::Approved {
        return Err(DecideError::conflict("event is already approved", state.status));
    }
    require_status(state, EventStatus::Pending, "approve")
}

pub fn decide_approve(
    state: &EventRecord,
    actor: &Actor,
    external_id: String,
    calendar_id: String,
    now: DateTime<Utc>,
) -> Decision {
    match ensure_can_approve(state, actor) {
        Ok(()) => accepted(LifecycleEvent::Approved {
            external_id,
            calendar_id,
            stamp: Stamp::new(actor, now),
        }),
        Err(reason) => rejected(reason),
    }
}

pub fn decide_reject(
    state: &EventRecord,
    reason: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Decision {
    let checked = require_approver(actor, "reject events")
        .and_then(|_| require_status(state, EventStatus::Pending, "reject"))
        .and_then(|_| require_reason(reason, "reject"));
    match checked {
        Ok(reason) => accepted(LifecycleEvent::Rejected {
            reason,
            stamp: Stamp::new(actor, now),
        }),
        Err(reason) => rejected(reason),
    }
}

pub fn decide_delete(
    state: &EventRecord,
    reason: Option<String>,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Decision {
    if let Err(reason) = require_owner_or_approver(state, actor, "delete this event") {
        return rejected(reason);
    }
    if state.status == EventStatus::Deleted {
        return Decision::Unchanged;
    }
    let reason = reason
        .map(|reason| reason.trim().to_string())
        .filter(|reason| !reason.is_empty());
    accepted(LifecycleEvent::Deleted {
        previous_status: state.status,
        reason,
        stamp: Stamp::new(actor, now),
    })
}

/// Delete restricted to drafts.
pub fn decide_delete_draft(state: &EventRecord, actor: &Actor, now: DateTime<Utc>) -> Decision {
    if let Err(reason) = require_owner_or_approver(state, actor, "delete this draft") {
        return rejected(reason);
    }
    match state.status {
        EventStatus::Deleted => Decision::Unchanged,
        EventStatus::Draft => decide_delete(state, None, actor, now),
        current => rejected(DecideError::conflict(
            format!("only drafts can be deleted this way, event is {current}"),
            current,
        )),
    }
}

pub fn decide_restore(state: &EventRecord, actor: &Actor, now: DateTime<Utc>) -> Decision {
    let checked = require_approver(actor, "restore events")
        .and_then(|_| require_status(state, EventStatus::Deleted, "restore"));
    if let Err(reason) = checked {
        return rejected(reason);
    }
    let restored_to = match state.previous_status {
        Some(EventStatus::Deleted) | None => EventStatus::Draft,
        Some(previous) => previous,
    };
    accepted(LifecycleEvent::Restored {
        restored_to,
        stamp: Stamp::new(actor, now),
    })
}

pub fn decide_request_edit(
    state: &EventRecord,
    changes: EventChanges,
    reason: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Decision {
    let checked = require_owner(state, actor, "request an edit")
        .and_then(|_| require_status(state, EventStatus::Approved, "request an edit on"))
        .and_then(|_| match state.pending_edit_request {
            Some(_) => Err(DecideError::conflict(
                "an edit request is already pending",
                state.status,
            )),
            None => Ok(()),
        })
        .and_then(|_| require_reason(reason, "request an edit"))
        .and_then(|reason| {
            if changes.is_empty() {
                return Err(DecideError::Validation("no changes supplied".into()));
            }
            validate_changes(state, &changes).map(|_| reason)
        });
    match checked {
        Ok(reason) => accepted(LifecycleEvent::EditRequested {
            request: PendingEditRequest {
                changes,
                reason,
                requested_by: actor.user_id.clone(),
                requested_by_email: actor.email.clone(),
                requested_at: now,
            },
        }),
        Err(reason) => rejected(reason),
    }
}

fn require_pending_edit<'a>(
    state: &'a EventRecord,
    what: &str,
) -> Result<&'a PendingEditRequest, DecideError> {
    match (&state.pending_edit_request, state.status) {
        (Some(request), EventStatus::Approved) => Ok(request),
        _ => Err(DecideError::conflict(
            format!("there is no pending edit request to {what}"),
            state.status,
        )),
    }
}

pub fn decide_approve_edit(state: &EventRecord, actor: &Actor, now: DateTime<Utc>) -> Decision {
    let checked = require_approver(actor, "approve edit requests")
        .and_then(|_| require_pending_edit(state, "approve"))
        .and_then(|request| validate_changes(state, &request.changes).map(|_| request));
    match checked {
        Ok(request) => accepted(LifecycleEvent::EditApproved {
            changes: request.changes.clone(),
            stamp: Stamp::new(actor, now),
        }),
        Err(reason) => rejected(reason),
    }
}

pub fn decide_reject_edit(
    state: &EventRecord,
    reason: &str,
    actor: &Actor,
    now: DateTime<Utc>,
) -> Decision {
    let checked = require_approver(actor, "reject edit requests")
        .and_then(|_| require_pending_edit(state, "reject"))
        .and_then(|_| require_reason(reason, "reject an edit request"));
    match checked {
        Ok(reason) => accepted(LifecycleEvent::EditRejected {
            reason,
            stamp: Stamp::new(actor, now),
        }),
        Err(reason) => rejected(reason),
    }
}
