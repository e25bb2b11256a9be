// Item Store Port (Interface)
//
// The store is the sole synchronization point of the queue: `conditional_update`
// must be linearized with respect to concurrent conditional updates on the
// same `(configuration, identifier)` key. Predicate mismatches report zero
// rows affected; genuine store faults surface as errors, never as zero rows.

use crate::domain::{Item, ItemState};
use crate::error::Result;
use async_trait::async_trait;

/// Row predicate vocabulary for selects and counts.
#[derive(Debug, Clone, PartialEq)]
pub enum ItemFilter {
    All,
    State(ItemState),
    /// Terminal states: SUCCESS or ERROR.
    Finished,
    /// IN_PROGRESS rows carrying the given claim token.
    InProgressWithToken(String),
}

/// Fields to write in an update. Unset fields are left untouched; at least
/// one field must be set.
#[derive(Debug, Clone, Default)]
pub struct FieldPatch {
    pub state: Option<ItemState>,
    pub message: Option<String>,
    pub hash: Option<String>,
    pub timestamp: Option<i64>,
    pub data: Option<serde_json::Value>,
}

impl FieldPatch {
    pub fn is_empty(&self) -> bool {
        self.state.is_none()
            && self.message.is_none()
            && self.hash.is_none()
            && self.timestamp.is_none()
            && self.data.is_none()
    }
}

/// Store interface for Item persistence
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Insert the item as PENDING, or overwrite an existing row for the same
    /// key back to PENDING with cleared message/hash and replaced data.
    ///
    /// Returns rows affected. A duplicate-key conflict against a concurrent
    /// producer is the one store-level race reported as zero rows rather
    /// than an error.
    async fn upsert_reset(&self, item: &Item, now: i64) -> Result<u64>;

    /// Apply `patch` only if the row for the key currently has state
    /// `expected`. Must execute as a single atomic compare-and-set style
    /// update; returns rows affected (0 = predicate mismatch or missing row).
    async fn conditional_update(
        &self,
        configuration: &str,
        identifier: &str,
        expected: ItemState,
        patch: FieldPatch,
    ) -> Result<u64>;

    /// Apply `patch` to the row for the key regardless of its state.
    async fn unconditional_update(
        &self,
        configuration: &str,
        identifier: &str,
        patch: FieldPatch,
    ) -> Result<u64>;

    /// Select matching rows, ascending by timestamp (oldest first).
    async fn select_where(&self, filter: ItemFilter, limit: Option<u32>) -> Result<Vec<Item>>;

    /// Count matching rows.
    async fn count_where(&self, filter: ItemFilter) -> Result<i64>;
}
