// Location use cases.
//
// Purpose
// - Registry maintenance (review, CRUD, aliases) and the bulk operations that keep event
//   references consistent (assign-string, merge, delete).
//
// Responsibilities
// - Event rewrites are one conditional save per event, retried on version conflicts. A bulk
//   operation is never rolled back; it reports how far it got.
// - Usage counts move with the references each operation adds or removes.
//
// Boundaries
// - The operations live in sibling modules as `impl LocationHandler` blocks.

use crate::modules::events::adapters::outbound::change_listener::{
    ChangedEvent, EventChangeListener,
};
use crate::modules::events::adapters::outbound::event_records::{EventFilter, EventRecordStore};
use crate::modules::events::core::state::EventRecord;
use crate::modules::locations::adapters::outbound::location_store::LocationStore;
use crate::modules::locations::core::location::Location;
use crate::modules::locations::core::resolver::LocationIndex;
use crate::shared::core::errors::ApplicationError;
use crate::shared::core::primitives::{Actor, Clock};
use crate::shared::infrastructure::progress::ProgressRegistry;
use crate::shared::infrastructure::record_store::{StoreError, Versioned};
use std::sync::Arc;
use tracing::debug;

const MAX_REWRITE_ATTEMPTS: u32 = 3;

pub struct LocationHandler {
    pub(super) locations: Arc<dyn LocationStore>,
    pub(super) records: Arc<dyn EventRecordStore>,
    pub(super) listener: Arc<dyn EventChangeListener>,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) progress: Arc<ProgressRegistry>,
}

impl LocationHandler {
    pub fn new(
        locations: Arc<dyn LocationStore>,
        records: Arc<dyn EventRecordStore>,
        listener: Arc<dyn EventChangeListener>,
        clock: Arc<dyn Clock>,
        progress: Arc<ProgressRegistry>,
    ) -> Self {
        Self {
            locations,
            records,
            listener,
            clock,
            progress,
        }
    }

    pub(super) fn require_approver(actor: &Actor, what: &str) -> Result<(), ApplicationError> {
        if actor.is_approver() {
            Ok(())
        } else {
            Err(ApplicationError::Permission(format!("only approvers can {what}")))
        }
    }

    pub(super) fn require_admin(actor: &Actor, what: &str) -> Result<(), ApplicationError> {
        if actor.is_admin() {
            Ok(())
        } else {
            Err(ApplicationError::Permission(format!("only admins can {what}")))
        }
    }

    pub(super) async fn load_location(
        &self,
        id: &str,
    ) -> Result<Versioned<Location>, ApplicationError> {
        self.locations
            .load(id)
            .await?
            .ok_or_else(|| ApplicationError::NotFound(format!("location {id}")))
    }

    pub(super) async fn index(&self) -> Result<LocationIndex, ApplicationError> {
        let locations = self.locations.list().await?;
        Ok(LocationIndex::build(locations.iter().map(|v| &v.record)))
    }

    pub(super) async fn active_events(&self) -> Result<Vec<EventRecord>, ApplicationError> {
        Ok(self
            .records
            .list(&EventFilter {
                is_deleted: Some(false),
                ..EventFilter::default()
            })
            .await?
            .into_iter()
            .map(|v| v.record)
            .collect())
    }

    /// Applies `change` to the latest version of an event and saves it conditionally.
    /// Returns the event as it was before the save, or `None` when it is gone or `change`
    /// reports nothing to do.
    pub(super) async fn rewrite_event<F>(
        &self,
        id: &str,
        change: F,
    ) -> Result<Option<EventRecord>, ApplicationError>
    where
        F: Fn(&mut EventRecord) -> bool + Send + Sync,
    {
        let mut attempt = 1;
        loop {
            let Some(current) = self.records.load(id).await? else {
                return Ok(None);
            };
            let mut next = current.record.clone();
            if !change(&mut next) {
                return Ok(None);
            }
            next.updated_at = self.clock.now();
            match self.records.save(next.clone(), current.version).await {
                Ok(_) => {
                    self.listener
                        .events_changed(&[ChangedEvent::from(&next)])
                        .await;
                    return Ok(Some(current.record));
                }
                Err(StoreError::VersionMismatch { .. }) if attempt < MAX_REWRITE_ATTEMPTS => {
                    debug!(id, attempt, "event changed during rewrite, retrying");
                    attempt += 1;
                }
                Err(error) => return Err(error.into()),
            }
        }
    }
}
