use tokio_util::sync::CancellationToken;

use crate::modules::events::adapters::outbound::event_records::EventRecordStore;
use crate::modules::locations::adapters::outbound::location_store::LocationStore;
use crate::modules::locations::core::location::LocationStatus;
use crate::modules::locations::use_cases::merge_locations::MergeLocations;
use crate::tests::fixtures::{
    EventRecordBuilder, ExternalEventBuilder, LocationBuilder, admin, app_state, approver,
    march_window,
};

#[tokio::test]
async fn merges_usage_references_and_aliases_into_the_target() {
    let (state, adapters) = app_state();
    adapters
        .locations
        .insert(
            LocationBuilder::new()
                .id("loc-a")
                .name("Old Gym")
                .aliases(&["Gymnasium"])
                .usage_count(5)
                .build(),
        )
        .await
        .unwrap();
    adapters
        .locations
        .insert(
            LocationBuilder::new()
                .id("loc-b")
                .name("Sports Hall")
                .usage_count(3)
                .build(),
        )
        .await
        .unwrap();
    for n in 0..5 {
        adapters
            .records
            .insert(
                EventRecordBuilder::new()
                    .id(&format!("ev-a{n}"))
                    .location_ids(&["loc-a"])
                    .build(),
            )
            .await
            .unwrap();
    }
    for n in 0..3 {
        adapters
            .records
            .insert(
                EventRecordBuilder::new()
                    .id(&format!("ev-b{n}"))
                    .location_ids(&["loc-b"])
                    .build(),
            )
            .await
            .unwrap();
    }

    let summary = state
        .locations
        .merge_locations(
            &admin(),
            MergeLocations {
                source_ids: vec!["loc-a".into()],
                target_id: "loc-b".into(),
                merge_aliases: true,
            },
            &CancellationToken::new(),
        )
        .await
        .unwrap();

    assert!(summary.all_merged());
    let target = state.locations.get_location("loc-b").await.unwrap();
    assert_eq!(target.usage_count, 8);
    assert!(target.answers_to("Old Gym"));
    assert!(target.answers_to("gymnasium"));
    let source = state.locations.get_location("loc-a").await.unwrap();
    assert_eq!(source.status, LocationStatus::Merged);
    assert_eq!(source.merged_into.as_deref(), Some("loc-b"));
    assert!(
        adapters
            .records
            .ids_referencing_location("loc-a")
            .await
            .unwrap()
            .is_empty()
    );
    assert_eq!(
        adapters
            .records
            .ids_referencing_location("loc-b")
            .await
            .unwrap()
            .len(),
        8
    );
}

#[tokio::test]
async fn resolves_a_compound_location_and_assigns_the_leftover_segment() {
    let (state, adapters) = app_state();
    adapters
        .locations
        .insert(LocationBuilder::new().id("loc-chapel").name("Main Chapel").build())
        .await
        .unwrap();
    adapters
        .locations
        .insert(
            LocationBuilder::new()
                .id("loc-402")
                .name("Conference Room 402")
                .build(),
        )
        .await
        .unwrap();
    let mut event = ExternalEventBuilder::new("ext-1").on_day(3).build();
    event.location = Some("Main Chapel, Room 402".into());
    adapters.calendar.seed(event).await;

    state
        .reconciler
        .reconcile_calendar("primary", &march_window(), &CancellationToken::new())
        .await
        .unwrap();

    let unassigned = state.locations.list_unassigned().await.unwrap();
    assert_eq!(unassigned.len(), 1);
    assert_eq!(unassigned[0].raw, "Room 402");
    assert_eq!(unassigned[0].event_count, 1);

    let report = state
        .locations
        .assign_string(&approver(), "Room 402", "loc-402")
        .await
        .unwrap();
    assert!(report.alias_added);
    assert_eq!(report.events_updated, 1);

    let record = adapters
        .records
        .find_by_external_id("ext-1")
        .await
        .unwrap()
        .unwrap()
        .record;
    assert_eq!(
        record.location_ids,
        vec!["loc-chapel".to_string(), "loc-402".to_string()]
    );
    assert!(record.unresolved_locations.is_empty());
    let room = adapters.locations.load("loc-402").await.unwrap().unwrap().record;
    assert_eq!(room.usage_count, 1);
    assert!(state.locations.list_unassigned().await.unwrap().is_empty());
}

#[tokio::test]
async fn keeps_a_merge_without_aliases_across_the_next_sync() {
    let (state, adapters) = app_state();
    adapters
        .locations
        .insert(LocationBuilder::new().id("loc-a").name("Old Gym").build())
        .await
        .unwrap();
    adapters
        .locations
        .insert(LocationBuilder::new().id("loc-b").name("Sports Hall").build())
        .await
        .unwrap();
    let mut event = ExternalEventBuilder::new("ext-1").on_day(4).build();
    event.location = Some("Old Gym".into());
    adapters.calendar.seed(event).await;
    let cancel = CancellationToken::new();
    state
        .reconciler
        .reconcile_calendar("primary", &march_window(), &cancel)
        .await
        .unwrap();

    state
        .locations
        .merge_locations(
            &admin(),
            MergeLocations {
                source_ids: vec!["loc-a".into()],
                target_id: "loc-b".into(),
                merge_aliases: false,
            },
            &cancel,
        )
        .await
        .unwrap();
    let resynced = state
        .reconciler
        .reconcile_calendar("primary", &march_window(), &cancel)
        .await
        .unwrap();

    assert_eq!((resynced.updated, resynced.unchanged), (0, 1));
    let record = adapters
        .records
        .find_by_external_id("ext-1")
        .await
        .unwrap()
        .unwrap()
        .record;
    assert_eq!(record.location_ids, vec!["loc-b".to_string()]);
    assert!(record.unresolved_locations.is_empty());
    assert_eq!(state.locations.get_location("loc-b").await.unwrap().usage_count, 1);
    assert!(state.locations.list_unassigned().await.unwrap().is_empty());
}
