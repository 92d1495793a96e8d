use crate::modules::events::core::events::{DraftCreated, LifecycleEvent, Stamp};
use crate::modules::events::core::state::{
    Enrichment, EventChanges, EventRecord, EventStatus, HistoryAction, StatusHistoryEntry,
};
use std::collections::BTreeMap;

/// Pure fold of a lifecycle event onto the current record.
/// Events that do not apply to the current state leave it unchanged.
pub fn evolve(state: Option<EventRecord>, event: LifecycleEvent) -> Option<EventRecord> {
    match (state, event) {
        (None, LifecycleEvent::DraftCreated(created)) => Some(created_record(created)),
        (Some(record), LifecycleEvent::DraftCreated(_)) => Some(record),
        (None, _) => None,
        (Some(record), event) => Some(apply(record, event)),
    }
}

fn apply(mut record: EventRecord, event: LifecycleEvent) -> EventRecord {
    match event {
        LifecycleEvent::DraftCreated(_) => record,
        LifecycleEvent::DraftUpdated { changes, stamp } => {
            apply_changes(&mut record, &changes);
            append(&mut record, HistoryAction::Updated, &stamp, None);
            record
        }
        LifecycleEvent::Submitted { stamp } => {
            record.status = EventStatus::Pending;
            record.submitted_at = Some(stamp.at);
            append(&mut record, HistoryAction::Submitted, &stamp, None);
            record
        }
        LifecycleEvent::Approved {
            external_id,
            calendar_id,
            stamp,
        } => {
            record.status = EventStatus::Approved;
            record.external_id = Some(external_id);
            record.calendar_id = Some(calendar_id);
            append(&mut record, HistoryAction::Approved, &stamp, None);
            record
        }
        LifecycleEvent::Rejected { reason, stamp } => {
            record.status = EventStatus::Rejected;
            append(&mut record, HistoryAction::Rejected, &stamp, Some(reason));
            record
        }
        LifecycleEvent::Deleted {
            previous_status,
            reason,
            stamp,
        } => {
            record.previous_status = Some(previous_status);
            record.status = EventStatus::Deleted;
            record.is_deleted = true;
            record.deleted_at = Some(stamp.at);
            record.deleted_by = Some(stamp.by.clone());
            record.pending_edit_request = None;
            append(&mut record, HistoryAction::Deleted, &stamp, reason);
            record
        }
        LifecycleEvent::Restored { restored_to, stamp } => {
            record.status = restored_to;
            record.is_deleted = false;
            record.deleted_at = None;
            record.deleted_by = None;
            record.previous_status = None;
            append(&mut record, HistoryAction::Restored, &stamp, None);
            record
        }
        LifecycleEvent::EditRequested { request } => {
            let stamp = Stamp {
                at: request.requested_at,
                by: request.requested_by.clone(),
                by_email: request.requested_by_email.clone(),
            };
            let reason = request.reason.clone();
            record.pending_edit_request = Some(request);
            append(&mut record, HistoryAction::EditRequested, &stamp, Some(reason));
            record
        }
        LifecycleEvent::EditApproved { changes, stamp } => {
            apply_changes(&mut record, &changes);
            record.pending_edit_request = None;
            append(&mut record, HistoryAction::EditApproved, &stamp, None);
            record
        }
        LifecycleEvent::EditRejected { reason, stamp } => {
            record.pending_edit_request = None;
            append(&mut record, HistoryAction::EditRejected, &stamp, Some(reason));
            record
        }
    }
}

fn created_record(created: DraftCreated) -> EventRecord {
    let stamp = created.stamp;
    let mut record = EventRecord {
        id: created.id,
        external_id: None,
        event_id: created.event_id,
        calendar_id: created.calendar_id,
        title: created.title,
        description: created.description,
        category: created.category,
        start: created.start,
        end: created.end,
        utc_offset_minutes: created.utc_offset_minutes,
        time_zone: created.time_zone,
        is_all_day: created.is_all_day,
        location_text: None,
        location_ids: created.location_ids,
        unresolved_locations: Vec::new(),
        status: EventStatus::Draft,
        is_deleted: false,
        previous_status: None,
        deleted_at: None,
        deleted_by: None,
        submitted_at: None,
        pending_edit_request: None,
        status_history: Vec::new(),
        enrichment: Enrichment {
            setup_minutes: created.setup_minutes,
            teardown_minutes: created.teardown_minutes,
            assigned_to: None,
            internal_notes: created.internal_notes,
            registration_event_id: None,
        },
        extensions: BTreeMap::new(),
        created_by: stamp.by.clone(),
        created_by_email: stamp.by_email.clone(),
        created_at: stamp.at,
        updated_at: stamp.at,
    };
    append(&mut record, HistoryAction::Created, &stamp, None);
    record
}

/// Applies the `Some` fields of `changes` onto the record.
pub fn apply_changes(record: &mut EventRecord, changes: &EventChanges) {
    if let Some(title) = &changes.title {
        record.title = title.clone();
    }
    if let Some(description) = &changes.description {
        record.description = description.clone();
    }
    if let Some(category) = &changes.category {
        record.category = Some(category.clone());
    }
    if let Some(start) = changes.start {
        record.start = start;
    }
    if let Some(end) = changes.end {
        record.end = end;
    }
    if let Some(is_all_day) = changes.is_all_day {
        record.is_all_day = is_all_day;
    }
    if let Some(location_ids) = &changes.location_ids {
        let mut deduplicated: Vec<String> = Vec::with_capacity(location_ids.len());
        for id in location_ids {
            if !deduplicated.contains(id) {
                deduplicated.push(id.clone());
            }
        }
        record.location_ids = deduplicated;
    }
    if let Some(minutes) = changes.setup_minutes {
        record.enrichment.setup_minutes = minutes;
    }
    if let Some(minutes) = changes.teardown_minutes {
        record.enrichment.teardown_minutes = minutes;
    }
    if let Some(assigned_to) = &changes.assigned_to {
        record.enrichment.assigned_to = Some(assigned_to.clone());
    }
    if let Some(notes) = &changes.internal_notes {
        record.enrichment.internal_notes = Some(notes.clone());
    }
}

fn append(record: &mut EventRecord, action: HistoryAction, stamp: &Stamp, reason: Option<String>) {
    record.updated_at = stamp.at;
    record.status_history.push(StatusHistoryEntry {
        status: record.status,
        action,
        changed_at: stamp.at,
        changed_by: stamp.by.clone(),
        changed_by_email: stamp.by_email.clone(),
        reason,
    });
}
