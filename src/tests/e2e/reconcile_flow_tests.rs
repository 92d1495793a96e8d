use tokio_util::sync::CancellationToken;

use crate::modules::events::adapters::outbound::event_records::EventRecordStore;
use crate::modules::events::core::state::{EventChanges, EventStatus};
use crate::modules::events::use_cases::lifecycle::commands::RequestEdit;
use crate::tests::fixtures::{
    ExternalEventBuilder, app_state, approver, create_draft_command, march_window, requester,
};

#[tokio::test]
async fn leaves_records_untouched_when_the_calendar_has_not_changed() {
    let (state, adapters) = app_state();
    for day in [4, 11, 18] {
        adapters
            .calendar
            .seed(ExternalEventBuilder::new(&format!("ext-{day}")).on_day(day).build())
            .await;
    }
    let cancel = CancellationToken::new();

    let first = state
        .reconciler
        .reconcile(&["primary".to_string()], &march_window(), &cancel)
        .await
        .unwrap();
    assert_eq!(first.calendars[0].created, 3);
    let versions: Vec<u64> = adapters
        .records
        .list(&Default::default())
        .await
        .unwrap()
        .into_iter()
        .map(|versioned| versioned.version)
        .collect();

    let second = state
        .reconciler
        .reconcile(&["primary".to_string()], &march_window(), &cancel)
        .await
        .unwrap();

    assert!(second.is_complete());
    let calendar = &second.calendars[0];
    assert_eq!((calendar.created, calendar.updated, calendar.unchanged), (0, 0, 3));
    let after: Vec<u64> = adapters
        .records
        .list(&Default::default())
        .await
        .unwrap()
        .into_iter()
        .map(|versioned| versioned.version)
        .collect();
    assert_eq!(after, versions);
}

#[tokio::test]
async fn keeps_internal_fields_when_only_the_title_changes_in_the_calendar() {
    let (state, adapters) = app_state();
    let mut command = create_draft_command();
    command.setup_minutes = 30;
    let draft = state
        .lifecycle
        .create_draft(&requester(), command)
        .await
        .unwrap();
    state.lifecycle.submit(&requester(), &draft.id).await.unwrap();
    let approved = state.lifecycle.approve(&approver(), &draft.id).await.unwrap();
    let requested = state
        .lifecycle
        .request_edit(
            &requester(),
            &draft.id,
            RequestEdit {
                changes: EventChanges {
                    teardown_minutes: Some(15),
                    ..EventChanges::default()
                },
                reason: "chairs need stacking".into(),
            },
        )
        .await
        .unwrap();
    let external_id = approved.external_id.clone().unwrap();
    adapters
        .calendar
        .edit("primary", &external_id, |event| {
            event.title = "Choir practice (extended)".into()
        })
        .await;

    let report = state
        .reconciler
        .reconcile_calendar("primary", &march_window(), &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(report.updated, 1);
    let synced = state.queries.get(&draft.id).await.unwrap();
    assert_eq!(synced.title, "Choir practice (extended)");
    assert_eq!(synced.status, EventStatus::Approved);
    assert_eq!(synced.enrichment.setup_minutes, 30);
    assert_eq!(synced.status_history, requested.status_history);
    assert_eq!(synced.pending_edit_request, requested.pending_edit_request);
    assert!(synced.is_consistent());
}
