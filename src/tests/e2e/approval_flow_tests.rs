use tokio_util::sync::CancellationToken;

use crate::modules::events::core::state::{EventStatus, HistoryAction};
use crate::modules::sync::use_cases::load_events::cache::LoadSource;
use crate::tests::fixtures::{app_state, approver, create_draft_command, march_window, requester};

#[tokio::test]
async fn approves_a_draft_and_pushes_it_to_the_calendar() {
    let (state, adapters) = app_state();

    let draft = state
        .lifecycle
        .create_draft(&requester(), create_draft_command())
        .await
        .unwrap();
    let pending = state.lifecycle.submit(&requester(), &draft.id).await.unwrap();
    assert_eq!(pending.status, EventStatus::Pending);

    let approved = state.lifecycle.approve(&approver(), &draft.id).await.unwrap();

    let external_id = approved.external_id.clone().unwrap();
    let external = adapters.calendar.get("primary", &external_id).await.unwrap();
    assert_eq!(external.title, "Choir practice");
    assert_eq!(external.internal_event_id.as_deref(), Some(approved.event_id.as_str()));
    let actions: Vec<HistoryAction> = approved
        .status_history
        .iter()
        .map(|entry| entry.action)
        .collect();
    assert_eq!(
        actions,
        vec![
            HistoryAction::Created,
            HistoryAction::Submitted,
            HistoryAction::Approved
        ]
    );

    let report = state
        .reconciler
        .reconcile_calendar("primary", &march_window(), &CancellationToken::new())
        .await
        .unwrap();
    assert_eq!(report.created, 0);
    let after_sync = state.queries.get(&draft.id).await.unwrap();
    assert_eq!(after_sync.status, EventStatus::Approved);
    assert_eq!(after_sync.status_history, approved.status_history);
}

#[tokio::test]
async fn drops_a_deleted_event_from_the_next_snapshot_and_brings_it_back_on_restore() {
    let (state, _) = app_state();
    let cancel = CancellationToken::new();
    let draft = state
        .lifecycle
        .create_draft(&requester(), create_draft_command())
        .await
        .unwrap();

    let first = state
        .loader
        .load("primary", &march_window(), false, &cancel)
        .await
        .unwrap();
    assert_eq!(first.source, LoadSource::RegularLoad);
    assert_eq!(first.events.len(), 1);

    let deleted = state
        .lifecycle
        .delete(&requester(), &draft.id, Some("cancelled".into()))
        .await
        .unwrap();
    assert!(deleted.is_deleted);
    assert_eq!(deleted.previous_status, Some(EventStatus::Draft));

    let after_delete = state
        .loader
        .load("primary", &march_window(), false, &cancel)
        .await
        .unwrap();
    assert_eq!(after_delete.source, LoadSource::GraphFallback);
    assert!(after_delete.events.is_empty());

    let restored = state.lifecycle.restore(&approver(), &draft.id).await.unwrap();
    assert_eq!(restored.status, EventStatus::Draft);
    assert!(restored.is_consistent());

    let after_restore = state
        .loader
        .load("primary", &march_window(), false, &cancel)
        .await
        .unwrap();
    assert_eq!(after_restore.events.len(), 1);
}
