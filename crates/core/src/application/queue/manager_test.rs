//! Unit tests for QueueManager over an in-memory store double

#[cfg(test)]
mod tests {
    use super::super::QueueManager;
    use crate::domain::{Item, ItemState};
    use crate::error::{AppError, Result};
    use crate::port::{FieldPatch, ItemFilter, ItemStore, TimeProvider};
    use async_trait::async_trait;
    use serde_json::json;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicI64, Ordering};
    use std::sync::{Arc, Mutex};

    /// In-memory ItemStore with the same rows-affected semantics as the
    /// SQLite adapter.
    #[derive(Default)]
    struct MemoryStore {
        rows: Mutex<BTreeMap<(String, String), Item>>,
    }

    impl MemoryStore {
        fn apply(item: &mut Item, patch: FieldPatch) {
            if let Some(state) = patch.state {
                item.state = state;
            }
            if let Some(message) = patch.message {
                item.message = message;
            }
            if let Some(hash) = patch.hash {
                item.hash = hash;
            }
            if let Some(timestamp) = patch.timestamp {
                item.timestamp = timestamp;
            }
            if let Some(data) = patch.data {
                item.data = data;
            }
        }

        fn matches(item: &Item, filter: &ItemFilter) -> bool {
            match filter {
                ItemFilter::All => true,
                ItemFilter::State(state) => item.state == *state,
                ItemFilter::Finished => item.state.is_terminal(),
                ItemFilter::InProgressWithToken(token) => {
                    item.state == ItemState::InProgress && item.hash == *token
                }
            }
        }

        fn get(&self, configuration: &str, identifier: &str) -> Option<Item> {
            self.rows
                .lock()
                .unwrap()
                .get(&(configuration.to_string(), identifier.to_string()))
                .cloned()
        }
    }

    #[async_trait]
    impl ItemStore for MemoryStore {
        async fn upsert_reset(&self, item: &Item, now: i64) -> Result<u64> {
            let mut rows = self.rows.lock().unwrap();
            let key = (item.configuration.clone(), item.identifier.clone());
            let mut fresh = Item::new(&item.configuration, &item.identifier, item.data.clone());
            fresh.timestamp = now;
            rows.insert(key, fresh);
            Ok(1)
        }

        async fn conditional_update(
            &self,
            configuration: &str,
            identifier: &str,
            expected: ItemState,
            patch: FieldPatch,
        ) -> Result<u64> {
            if patch.is_empty() {
                return Err(AppError::Internal("empty field patch".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            let key = (configuration.to_string(), identifier.to_string());
            match rows.get_mut(&key) {
                Some(item) if item.state == expected => {
                    Self::apply(item, patch);
                    Ok(1)
                }
                _ => Ok(0),
            }
        }

        async fn unconditional_update(
            &self,
            configuration: &str,
            identifier: &str,
            patch: FieldPatch,
        ) -> Result<u64> {
            if patch.is_empty() {
                return Err(AppError::Internal("empty field patch".to_string()));
            }
            let mut rows = self.rows.lock().unwrap();
            let key = (configuration.to_string(), identifier.to_string());
            match rows.get_mut(&key) {
                Some(item) => {
                    Self::apply(item, patch);
                    Ok(1)
                }
                None => Ok(0),
            }
        }

        async fn select_where(&self, filter: ItemFilter, limit: Option<u32>) -> Result<Vec<Item>> {
            let rows = self.rows.lock().unwrap();
            let mut items: Vec<Item> = rows
                .values()
                .filter(|item| Self::matches(item, &filter))
                .cloned()
                .collect();
            items.sort_by(|a, b| {
                a.timestamp
                    .cmp(&b.timestamp)
                    .then_with(|| a.configuration.cmp(&b.configuration))
                    .then_with(|| a.identifier.cmp(&b.identifier))
            });
            if let Some(limit) = limit {
                items.truncate(limit as usize);
            }
            Ok(items)
        }

        async fn count_where(&self, filter: ItemFilter) -> Result<i64> {
            let rows = self.rows.lock().unwrap();
            Ok(rows.values().filter(|item| Self::matches(item, &filter)).count() as i64)
        }
    }

    /// Monotonic fake clock: each call advances one second.
    struct TickingClock(AtomicI64);

    impl TimeProvider for TickingClock {
        fn now_secs(&self) -> i64 {
            self.0.fetch_add(1, Ordering::SeqCst)
        }
    }

    fn setup() -> (QueueManager, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::default());
        let clock = Arc::new(TickingClock(AtomicI64::new(1000)));
        (QueueManager::new(store.clone(), clock), store)
    }

    #[tokio::test]
    async fn test_enqueue_rejects_empty_configuration() {
        let (queue, _) = setup();
        let item = Item::new("", "/a", json!({}));
        let result = queue.enqueue(&item).await;
        assert!(matches!(result, Err(AppError::Domain(_))));
    }

    #[tokio::test]
    async fn test_enqueue_rejects_empty_identifier() {
        let (queue, _) = setup();
        let item = Item::new("site1", "", json!({}));
        let result = queue.enqueue(&item).await;
        assert!(matches!(result, Err(AppError::Domain(_))));
    }

    #[tokio::test]
    async fn test_enqueue_stamps_time_and_resets() {
        let (queue, store) = setup();

        assert!(queue.enqueue(&Item::new("site1", "/a", json!({"v": 1}))).await.unwrap());
        let stored = store.get("site1", "/a").unwrap();
        assert_eq!(stored.state, ItemState::Pending);
        assert_eq!(stored.timestamp, 1000);

        // Claim and resolve, then re-enqueue: everything resets.
        assert!(queue.claim_one("site1", "/a", "tok").await.unwrap());
        assert!(queue.resolve(&Item::failed("site1", "/a", "boom")).await.unwrap());

        assert!(queue.enqueue(&Item::new("site1", "/a", json!({"v": 2}))).await.unwrap());
        let stored = store.get("site1", "/a").unwrap();
        assert_eq!(stored.state, ItemState::Pending);
        assert!(stored.message.is_empty());
        assert!(stored.hash.is_empty());
        assert_eq!(stored.data, json!({"v": 2}));
        assert_eq!(stored.timestamp, 1001);
    }

    #[tokio::test]
    async fn test_claim_one_rejects_empty_token() {
        let (queue, _) = setup();
        queue.enqueue(&Item::new("site1", "/a", json!({}))).await.unwrap();
        let result = queue.claim_one("site1", "/a", "").await;
        assert!(matches!(result, Err(AppError::Domain(_))));
    }

    #[tokio::test]
    async fn test_claim_is_state_guarded() {
        let (queue, store) = setup();
        queue.enqueue(&Item::new("site1", "/a", json!({}))).await.unwrap();

        assert!(queue.claim_one("site1", "/a", "tok1").await.unwrap());
        let stored = store.get("site1", "/a").unwrap();
        assert_eq!(stored.state, ItemState::InProgress);
        assert_eq!(stored.hash, "tok1");

        // Already IN_PROGRESS: the second claim loses.
        assert!(!queue.claim_one("site1", "/a", "tok2").await.unwrap());
        assert_eq!(store.get("site1", "/a").unwrap().hash, "tok1");

        // Missing rows lose too.
        assert!(!queue.claim_one("site1", "/missing", "tok3").await.unwrap());
    }

    #[tokio::test]
    async fn test_resolve_rejects_non_terminal_state() {
        let (queue, store) = setup();
        queue.enqueue(&Item::new("site1", "/a", json!({}))).await.unwrap();
        queue.claim_one("site1", "/a", "tok").await.unwrap();

        let mut bogus = Item::new("site1", "/a", json!({}));
        bogus.state = ItemState::InProgress;
        let result = queue.resolve(&bogus).await;
        assert!(matches!(result, Err(AppError::Domain(_))));

        // No row was changed.
        assert_eq!(store.get("site1", "/a").unwrap().state, ItemState::InProgress);
    }

    #[tokio::test]
    async fn test_resolve_loses_against_reenqueue() {
        let (queue, store) = setup();
        queue.enqueue(&Item::new("site1", "/a", json!({}))).await.unwrap();
        queue.claim_one("site1", "/a", "tok").await.unwrap();

        // Producer re-enqueues mid-processing.
        queue.enqueue(&Item::new("site1", "/a", json!({"v": 2}))).await.unwrap();

        // The late resolve must not clobber the fresh PENDING row.
        assert!(!queue.resolve(&Item::succeeded("site1", "/a", "ok")).await.unwrap());
        assert_eq!(store.get("site1", "/a").unwrap().state, ItemState::Pending);
    }

    #[tokio::test]
    async fn test_claim_batch_is_fifo_and_limited() {
        let (queue, _) = setup();
        queue.enqueue(&Item::new("site1", "/first", json!({}))).await.unwrap();
        queue.enqueue(&Item::new("site1", "/second", json!({}))).await.unwrap();
        queue.enqueue(&Item::new("site1", "/third", json!({}))).await.unwrap();

        let batch = queue.claim_batch(Some(1)).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].identifier, "/first");

        let all = queue.claim_batch(None).await.unwrap();
        let ids: Vec<&str> = all.iter().map(|i| i.identifier.as_str()).collect();
        assert_eq!(ids, vec!["/first", "/second", "/third"]);

        // Selection does not transition state.
        assert_eq!(queue.list_pending(None).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_queries_partition_by_state() {
        let (queue, _) = setup();
        queue.enqueue(&Item::new("site1", "/ok", json!({}))).await.unwrap();
        queue.enqueue(&Item::new("site1", "/bad", json!({}))).await.unwrap();
        queue.enqueue(&Item::new("site1", "/pending", json!({}))).await.unwrap();
        queue.enqueue(&Item::new("site1", "/working", json!({}))).await.unwrap();

        queue.claim_one("site1", "/ok", "tok-ok").await.unwrap();
        queue.resolve(&Item::succeeded("site1", "/ok", "done")).await.unwrap();

        queue.claim_one("site1", "/bad", "tok-bad").await.unwrap();
        queue.resolve(&Item::failed("site1", "/bad", "HTTP 500")).await.unwrap();

        queue.claim_one("site1", "/working", "tok-work").await.unwrap();

        assert_eq!(queue.count_all().await.unwrap(), 4);
        assert_eq!(queue.count_finished().await.unwrap(), 2);
        assert_eq!(queue.list_pending(None).await.unwrap().len(), 1);
        assert_eq!(queue.list_successful().await.unwrap().len(), 1);
        assert_eq!(queue.list_failed().await.unwrap().len(), 1);
        assert_eq!(queue.list_finished().await.unwrap().len(), 2);
        assert_eq!(queue.list_all().await.unwrap().len(), 4);

        let by_token = queue.find_in_progress_by_token("tok-work").await.unwrap();
        assert_eq!(by_token.len(), 1);
        assert_eq!(by_token[0].identifier, "/working");

        // Resolved claims no longer carry their token.
        assert!(queue.find_in_progress_by_token("tok-ok").await.unwrap().is_empty());
    }
}
