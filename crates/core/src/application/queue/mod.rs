// Queue Manager - sole authority over item lifecycle transitions
//
// All coordination is pushed into the store's atomic conditional updates;
// the manager holds no state of its own and is safely reentrant across
// worker tasks. A `false` from `claim_one` or `resolve` is a normal race
// loss, not a fault.

#[cfg(test)]
mod manager_test;

use crate::domain::{DomainError, Item, ItemState};
use crate::error::Result;
use crate::port::{FieldPatch, ItemFilter, ItemStore, TimeProvider};
use std::sync::Arc;
use tracing::debug;

/// Work-queue manager for crawl items.
///
/// Invoked by producers (`enqueue`) and workers (`claim_batch`, `claim_one`,
/// `resolve`); the list/count queries serve operator tooling.
pub struct QueueManager {
    store: Arc<dyn ItemStore>,
    time_provider: Arc<dyn TimeProvider>,
}

impl QueueManager {
    pub fn new(store: Arc<dyn ItemStore>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            store,
            time_provider,
        }
    }

    /// Add an item, or reset an existing one for the same
    /// `(configuration, identifier)` back to PENDING.
    ///
    /// The reset is unconditional: whatever state the row is in, it comes
    /// back as PENDING with cleared message/hash, a fresh timestamp and the
    /// new payload. This is the only way an item re-enters PENDING.
    ///
    /// Returns `Ok(false)` when the store reports zero rows affected, which
    /// under concurrent producers means a duplicate-key conflict the caller
    /// should inspect rather than a fault.
    pub async fn enqueue(&self, item: &Item) -> Result<bool> {
        if item.configuration.is_empty() {
            return Err(DomainError::ValidationError(
                "configuration must not be empty".to_string(),
            )
            .into());
        }
        if item.identifier.is_empty() {
            return Err(DomainError::ValidationError(
                "identifier must not be empty".to_string(),
            )
            .into());
        }

        let now = self.time_provider.now_secs();
        let changed = self.store.upsert_reset(item, now).await?;
        debug!(
            configuration = %item.configuration,
            identifier = %item.identifier,
            changed,
            "enqueued item"
        );
        Ok(changed == 1)
    }

    /// Select up to `limit` PENDING items, oldest first.
    ///
    /// This is a snapshot, not a claim: the items stay PENDING. Callers
    /// must win `claim_one` on each item before processing it, and treat a
    /// lost claim as "skip" since the snapshot may be stale.
    pub async fn claim_batch(&self, limit: Option<u32>) -> Result<Vec<Item>> {
        self.store
            .select_where(ItemFilter::State(ItemState::Pending), limit)
            .await
    }

    /// Atomically claim a single PENDING item for exclusive processing.
    ///
    /// Guarded on `state == PENDING`: when two workers race on the same
    /// key, exactly one sees `Ok(true)`. `Ok(false)` means another worker
    /// claimed it first, it was re-enqueued concurrently, or it does not
    /// exist.
    pub async fn claim_one(
        &self,
        configuration: &str,
        identifier: &str,
        token: &str,
    ) -> Result<bool> {
        // An empty token would break the "hash non-empty iff IN_PROGRESS"
        // invariant.
        if token.is_empty() {
            return Err(
                DomainError::ValidationError("claim token must not be empty".to_string()).into(),
            );
        }

        let patch = FieldPatch {
            state: Some(ItemState::InProgress),
            hash: Some(token.to_string()),
            ..FieldPatch::default()
        };
        let changed = self
            .store
            .conditional_update(configuration, identifier, ItemState::Pending, patch)
            .await?;
        let won = changed == 1;
        debug!(configuration, identifier, won, "claim attempt");
        Ok(won)
    }

    /// Record the terminal outcome of processing an item.
    ///
    /// `item.state` must be SUCCESS or ERROR; anything else is a contract
    /// violation and fails fast without touching the store. The update is
    /// guarded on `state == IN_PROGRESS`, so an item that was concurrently
    /// re-enqueued stays PENDING and the resolve reports `Ok(false)`.
    pub async fn resolve(&self, item: &Item) -> Result<bool> {
        if !item.state.is_terminal() {
            return Err(DomainError::NonTerminalResolve(item.state.to_string()).into());
        }

        let patch = FieldPatch {
            state: Some(item.state),
            message: Some(item.message.clone()),
            hash: Some(String::new()),
            ..FieldPatch::default()
        };
        let changed = self
            .store
            .conditional_update(
                &item.configuration,
                &item.identifier,
                ItemState::InProgress,
                patch,
            )
            .await?;
        debug!(
            configuration = %item.configuration,
            identifier = %item.identifier,
            state = %item.state,
            changed,
            "resolved item"
        );
        Ok(changed == 1)
    }

    /// Every item, ascending by timestamp.
    pub async fn list_all(&self) -> Result<Vec<Item>> {
        self.store.select_where(ItemFilter::All, None).await
    }

    /// PENDING items, ascending by timestamp.
    pub async fn list_pending(&self, limit: Option<u32>) -> Result<Vec<Item>> {
        self.store
            .select_where(ItemFilter::State(ItemState::Pending), limit)
            .await
    }

    /// SUCCESS and ERROR items, ascending by timestamp.
    pub async fn list_finished(&self) -> Result<Vec<Item>> {
        self.store.select_where(ItemFilter::Finished, None).await
    }

    pub async fn list_successful(&self) -> Result<Vec<Item>> {
        self.store
            .select_where(ItemFilter::State(ItemState::Success), None)
            .await
    }

    pub async fn list_failed(&self) -> Result<Vec<Item>> {
        self.store
            .select_where(ItemFilter::State(ItemState::Error), None)
            .await
    }

    pub async fn count_all(&self) -> Result<i64> {
        self.store.count_where(ItemFilter::All).await
    }

    pub async fn count_finished(&self) -> Result<i64> {
        self.store.count_where(ItemFilter::Finished).await
    }

    /// IN_PROGRESS items carrying the given claim token, for diagnostics
    /// and recovery of a specific claim.
    pub async fn find_in_progress_by_token(&self, token: &str) -> Result<Vec<Item>> {
        self.store
            .select_where(ItemFilter::InProgressWithToken(token.to_string()), None)
            .await
    }
}
