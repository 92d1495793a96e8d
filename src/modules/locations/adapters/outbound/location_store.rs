// Port for the Location Registry store.
//
// Responsibilities
// - Versioned conditional writes, same contract as the event store.
// - `adjust_usage` is an atomic counter update so concurrent rebalances never lose increments.

use crate::modules::locations::core::location::Location;
use crate::modules::locations::core::usage::usage_deltas;
use crate::shared::core::primitives::LocationId;
use crate::shared::infrastructure::record_store::{StoreError, Versioned};
use tracing::warn;

#[async_trait::async_trait]
pub trait LocationStore: Send + Sync {
    async fn load(&self, id: &str) -> Result<Option<Versioned<Location>>, StoreError>;

    async fn insert(&self, location: Location) -> Result<u64, StoreError>;

    async fn save(&self, location: Location, expected_version: u64) -> Result<u64, StoreError>;

    /// Every location regardless of status, ordered by name.
    async fn list(&self) -> Result<Vec<Versioned<Location>>, StoreError>;

    /// Adds `delta` to the usage count, saturating at zero. Returns the new count.
    async fn adjust_usage(&self, id: &str, delta: i64) -> Result<u64, StoreError>;

    /// Applies the usage difference between two effective location lists.
    /// Runs after the event write committed, so failures are logged rather than returned.
    async fn rebalance_usage(&self, before: &[LocationId], after: &[LocationId]) {
        for (location_id, delta) in usage_deltas(before, after) {
            if let Err(error) = self.adjust_usage(&location_id, delta).await {
                warn!(location_id = %location_id, delta, error = %error, "usage count not adjusted");
            }
        }
    }
}
