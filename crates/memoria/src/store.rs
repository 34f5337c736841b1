//! Dual-tier memory store
//!
//! Active conversations live in a volatile in-process tier (a sharded map of
//! per-conversation slots); every write is also persisted to the durable tier
//! through an asynchronous write-behind with bounded retries. When the durable
//! tier is unreachable the store keeps serving from the volatile tier alone
//! (degraded mode), queues the missed writes, and replays them once the
//! backend recovers. Degraded operation is never surfaced to callers as a
//! failure.
//!
//! Operations on one conversation serialize on that conversation's slot lock;
//! operations on different conversations never block each other.

use crate::compression::{CompressionOutcome, ContextCompressor};
use crate::error::{MemoriaError, MemoriaResult};
use crate::events::EventSink;
use crate::item::MemoryItem;
use crate::storage::{conversation_prefix, item_key, DurableStore};
use dashmap::DashMap;
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Per-conversation lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConversationPhase {
    /// Accepting reads and writes
    Active,
    /// A read is compressing the window; held only under the slot lock
    Compressing,
    /// Terminal: the conversation was forgotten
    Deleted,
}

struct ConversationState {
    phase: ConversationPhase,
    items: Vec<MemoryItem>,
}

struct ConversationSlot {
    state: tokio::sync::Mutex<ConversationState>,
}

impl ConversationSlot {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            state: tokio::sync::Mutex::new(ConversationState {
                phase: ConversationPhase::Active,
                items: Vec::new(),
            }),
        })
    }
}

enum PendingOp {
    Set(String, serde_json::Value),
    Delete(String),
}

/// Write-behind for the durable tier: bounded retries, then queue-and-degrade
pub(crate) struct DurableWriter {
    durable: Arc<dyn DurableStore>,
    events: Arc<dyn EventSink>,
    retries: u32,
    degraded: AtomicBool,
    pending: parking_lot::Mutex<VecDeque<PendingOp>>,
}

impl DurableWriter {
    pub(crate) fn new(
        durable: Arc<dyn DurableStore>,
        events: Arc<dyn EventSink>,
        retries: u32,
    ) -> Arc<Self> {
        Arc::new(Self {
            durable,
            events,
            retries: retries.max(1),
            degraded: AtomicBool::new(false),
            pending: parking_lot::Mutex::new(VecDeque::new()),
        })
    }

    pub(crate) fn durable(&self) -> Arc<dyn DurableStore> {
        self.durable.clone()
    }

    pub(crate) fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Persist a record off the caller's path. Never blocks, never fails the
    /// caller; on exhausted retries the op is queued for replay.
    pub(crate) fn spawn_set(self: &Arc<Self>, key: String, value: serde_json::Value) {
        let writer = self.clone();
        tokio::spawn(async move {
            writer.run_with_retries(PendingOp::Set(key, value)).await;
        });
    }

    /// Delete a record off the caller's path, same absorption rules as writes
    pub(crate) fn spawn_delete(self: &Arc<Self>, key: String) {
        let writer = self.clone();
        tokio::spawn(async move {
            writer.run_with_retries(PendingOp::Delete(key)).await;
        });
    }

    async fn apply(&self, op: &PendingOp) -> MemoriaResult<()> {
        match op {
            PendingOp::Set(key, value) => self.durable.set(key, value.clone()).await,
            PendingOp::Delete(key) => self.durable.delete(key).await.map(|_| ()),
        }
    }

    async fn run_with_retries(&self, op: PendingOp) {
        for attempt in 0..self.retries {
            match self.apply(&op).await {
                Ok(()) => return,
                Err(e) => {
                    tracing::debug!(attempt = attempt + 1, error = %e, "durable write attempt failed");
                    let backoff = 10u64 * (1 << attempt) + fastrand::u64(0..10);
                    tokio::time::sleep(std::time::Duration::from_millis(backoff)).await;
                }
            }
        }

        let key = match &op {
            PendingOp::Set(k, _) | PendingOp::Delete(k) => k.clone(),
        };
        tracing::warn!(
            key = %key,
            retries = self.retries,
            "durable tier unreachable, queueing write for replay (degraded mode)"
        );
        self.events.emit(
            "durable_write_failed",
            vec![("key".into(), key), ("retries".into(), self.retries.to_string())],
        );

        self.pending.lock().push_back(op);
        self.degraded.store(true, Ordering::Relaxed);
    }

    /// Replay queued ops against the durable tier. Stops at the first failure
    /// (backend still down). Clears degraded mode once the queue drains.
    pub(crate) async fn replay_pending(&self) -> usize {
        let mut replayed = 0;

        loop {
            let op = match self.pending.lock().pop_front() {
                Some(op) => op,
                None => break,
            };

            match self.apply(&op).await {
                Ok(()) => replayed += 1,
                Err(e) => {
                    tracing::debug!(error = %e, "durable tier still unreachable during replay");
                    self.pending.lock().push_front(op);
                    return replayed;
                }
            }
        }

        if replayed > 0 && self.degraded.swap(false, Ordering::Relaxed) {
            tracing::info!(replayed, "durable tier recovered, replayed queued writes");
            self.events.emit(
                "durable_recovered",
                vec![("replayed".into(), replayed.to_string())],
            );
        }

        replayed
    }
}

/// Dual-tier store for conversation memory items
pub struct MemoryStore {
    writer: Arc<DurableWriter>,
    slots: DashMap<String, Arc<ConversationSlot>>,
    events: Arc<dyn EventSink>,
    max_short_term_items: usize,
}

impl MemoryStore {
    /// Create a store over the given durable backend
    pub fn new(
        durable: Arc<dyn DurableStore>,
        events: Arc<dyn EventSink>,
        max_short_term_items: usize,
        durable_write_retries: u32,
    ) -> Self {
        Self {
            writer: DurableWriter::new(durable, events.clone(), durable_write_retries),
            slots: DashMap::new(),
            events,
            max_short_term_items,
        }
    }

    pub(crate) fn writer(&self) -> Arc<DurableWriter> {
        self.writer.clone()
    }

    /// Whether the store is currently serving from the volatile tier only
    pub fn is_degraded(&self) -> bool {
        self.writer.is_degraded()
    }

    fn slot(&self, conversation_id: &str) -> Arc<ConversationSlot> {
        self.slots
            .entry(conversation_id.to_string())
            .or_insert_with(ConversationSlot::new)
            .clone()
    }

    /// Recover a stale transient phase left by a cancelled compression
    fn settle_phase(state: &mut ConversationState) {
        if state.phase == ConversationPhase::Compressing {
            state.phase = ConversationPhase::Active;
        }
    }

    /// Write an item: synchronous volatile write, asynchronous durable write.
    /// A second put with an existing id replaces the item in place (dedup),
    /// preserving the original creation time so the durable key is stable.
    pub async fn put(&self, item: MemoryItem) -> MemoriaResult<()> {
        let slot = self.slot(&item.conversation_id);
        let mut state = slot.state.lock().await;
        Self::settle_phase(&mut state);

        if state.phase == ConversationPhase::Deleted {
            return Err(MemoriaError::conversation_gone(item.conversation_id));
        }

        let stored = match state.items.iter_mut().find(|i| i.id == item.id) {
            Some(existing) => {
                let created_at = existing.created_at;
                *existing = item;
                existing.created_at = created_at;
                existing.clone()
            }
            None => {
                state.items.push(item.clone());
                item
            }
        };
        drop(state);

        let key = item_key(&stored.conversation_id, stored.created_at, &stored.id);
        let value = serde_json::to_value(&stored).map_err(|e| {
            MemoriaError::storage(
                "serialize_item",
                std::io::Error::new(std::io::ErrorKind::Other, e),
            )
        })?;
        self.writer.spawn_set(key, value);

        Ok(())
    }

    /// Non-expired items in creation order. Reflects every put that completed
    /// before this call began. Summarized-away sources are excluded.
    pub async fn get_active(&self, conversation_id: &str) -> MemoriaResult<Vec<MemoryItem>> {
        let slot = self.slot(conversation_id);
        let state = slot.state.lock().await;

        if state.phase == ConversationPhase::Deleted {
            return Err(MemoriaError::conversation_gone(conversation_id));
        }

        let now = chrono::Utc::now();
        let mut items: Vec<MemoryItem> = state
            .items
            .iter()
            .filter(|i| !i.is_expired(now) && !i.is_summarized_source())
            .cloned()
            .collect();
        items.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        Ok(items)
    }

    /// Enforce retention: drop expired items, then evict lowest-importance
    /// (oldest first on ties) until the conversation fits
    /// `max_short_term_items`. Returns how many items were removed.
    pub async fn prune(&self, conversation_id: &str) -> MemoriaResult<usize> {
        let slot = self.slot(conversation_id);
        let mut state = slot.state.lock().await;
        Self::settle_phase(&mut state);

        if state.phase == ConversationPhase::Deleted {
            return Ok(0);
        }

        let now = chrono::Utc::now();
        let mut removed: Vec<MemoryItem> = Vec::new();

        state.items.retain(|i| {
            if i.is_expired(now) {
                removed.push(i.clone());
                false
            } else {
                true
            }
        });

        if state.items.len() > self.max_short_term_items {
            let excess = state.items.len() - self.max_short_term_items;

            let mut order: Vec<usize> = (0..state.items.len()).collect();
            order.sort_by(|&a, &b| {
                state.items[a]
                    .importance
                    .partial_cmp(&state.items[b].importance)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(state.items[a].created_at.cmp(&state.items[b].created_at))
            });

            let evict: HashSet<String> = order
                .into_iter()
                .take(excess)
                .map(|i| state.items[i].id.clone())
                .collect();

            state.items.retain(|i| {
                if evict.contains(&i.id) {
                    removed.push(i.clone());
                    false
                } else {
                    true
                }
            });
        }
        drop(state);

        for item in &removed {
            self.writer
                .spawn_delete(item_key(&item.conversation_id, item.created_at, &item.id));
        }

        if !removed.is_empty() {
            tracing::debug!(
                conversation_id = conversation_id,
                removed = removed.len(),
                "pruned conversation"
            );
        }

        Ok(removed.len())
    }

    /// Hard delete for user-initiated conversation deletion. The conversation
    /// transitions to its terminal phase; later writes fail.
    pub async fn delete(&self, conversation_id: &str) -> MemoriaResult<()> {
        let slot = self.slot(conversation_id);
        let mut state = slot.state.lock().await;
        state.phase = ConversationPhase::Deleted;
        state.items.clear();
        drop(state);

        self.writer
            .durable()
            .delete_prefix(&conversation_prefix(conversation_id))
            .await?;

        self.events.emit(
            "conversation_deleted",
            vec![("conversation_id".into(), conversation_id.to_string())],
        );

        Ok(())
    }

    /// Read the active window and fit it to `token_budget`, committing any
    /// summarizations atomically before returning. The slot lock is held for
    /// the whole read-compress-commit sequence, so a concurrent put on the
    /// same conversation observes either the full replacement or none of it.
    pub async fn read_compressed(
        &self,
        conversation_id: &str,
        compressor: &ContextCompressor,
        token_budget: usize,
    ) -> MemoriaResult<(Vec<MemoryItem>, usize, CompressionOutcome)> {
        let slot = self.slot(conversation_id);
        let mut state = slot.state.lock().await;
        Self::settle_phase(&mut state);

        if state.phase == ConversationPhase::Deleted {
            return Err(MemoriaError::conversation_gone(conversation_id));
        }
        state.phase = ConversationPhase::Compressing;

        let now = chrono::Utc::now();
        let mut active: Vec<MemoryItem> = state
            .items
            .iter()
            .filter(|i| !i.is_expired(now) && !i.is_summarized_source())
            .cloned()
            .collect();
        active.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        let result = compressor.compress(active, token_budget).await;

        for replacement in &result.replacements {
            let group_key = replacement
                .summary
                .group_key
                .clone()
                .unwrap_or_default();

            for item in state.items.iter_mut() {
                if replacement.source_ids.contains(&item.id) {
                    item.mark_folded_into(&group_key);
                    // sources stay in the durable tier, marked as folded away
                    if let Ok(value) = serde_json::to_value(&*item) {
                        self.writer
                            .spawn_set(item_key(&item.conversation_id, item.created_at, &item.id), value);
                    }
                }
            }

            state.items.push(replacement.summary.clone());
            if let Ok(value) = serde_json::to_value(&replacement.summary) {
                self.writer.spawn_set(
                    item_key(
                        &replacement.summary.conversation_id,
                        replacement.summary.created_at,
                        &replacement.summary.id,
                    ),
                    value,
                );
            }
        }

        // folded sources leave the volatile working set
        state.items.retain(|i| !i.is_summarized_source());
        state.phase = ConversationPhase::Active;

        Ok((result.items, result.total_token_estimate, result.outcome))
    }

    /// Rehydrate a conversation's volatile tier from the durable tier (e.g.
    /// after a restart). Corrupt records are skipped and logged, never
    /// propagated as a read failure. Returns the number of items recovered.
    pub async fn recover_conversation(&self, conversation_id: &str) -> MemoriaResult<usize> {
        let records = self
            .writer
            .durable()
            .scan_prefix(&conversation_prefix(conversation_id))
            .await?;

        let now = chrono::Utc::now();
        let mut recovered: Vec<MemoryItem> = Vec::new();

        for (key, value) in records {
            match serde_json::from_value::<MemoryItem>(value) {
                Ok(item) => {
                    if !item.is_expired(now) && !item.is_summarized_source() {
                        recovered.push(item);
                    }
                }
                Err(e) => {
                    let err = MemoriaError::corrupt_item(&key, e.to_string());
                    tracing::warn!(key = %key, error = %err, "skipping corrupt durable record");
                    self.events
                        .emit("corrupt_item_skipped", vec![("key".into(), key)]);
                }
            }
        }

        let slot = self.slot(conversation_id);
        let mut state = slot.state.lock().await;
        Self::settle_phase(&mut state);

        if state.phase == ConversationPhase::Deleted {
            return Err(MemoriaError::conversation_gone(conversation_id));
        }

        let count = recovered.len();
        state.items = recovered;

        Ok(count)
    }

    /// Conversations known to the volatile tier (including tombstones)
    pub fn conversation_ids(&self) -> Vec<String> {
        self.slots.iter().map(|e| e.key().clone()).collect()
    }

    /// Replay durable writes queued while the backend was down
    pub async fn replay_pending(&self) -> usize {
        self.writer.replay_pending().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::{CompressorConfig, TermOverlapGrouping};
    use crate::events::{NullEventSink, RecordingEventSink};
    use crate::item::MemoryRole;
    use crate::storage::InMemoryDurableStore;
    use crate::summarizer::ExtractiveSummarizer;
    use async_trait::async_trait;

    fn store() -> (MemoryStore, Arc<InMemoryDurableStore>) {
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = MemoryStore::new(durable.clone(), Arc::new(NullEventSink), 50, 2);
        (store, durable)
    }

    /// Durable store whose writes can be switched off, for degraded-mode tests
    struct FlakyStore {
        inner: InMemoryDurableStore,
        down: AtomicBool,
    }

    impl FlakyStore {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                inner: InMemoryDurableStore::new(),
                down: AtomicBool::new(false),
            })
        }

        fn set_down(&self, down: bool) {
            self.down.store(down, Ordering::SeqCst);
        }

        fn check(&self) -> MemoriaResult<()> {
            if self.down.load(Ordering::SeqCst) {
                Err(MemoriaError::storage(
                    "durable_io",
                    std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "backend down"),
                ))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl DurableStore for FlakyStore {
        async fn set(&self, key: &str, value: serde_json::Value) -> MemoriaResult<()> {
            self.check()?;
            self.inner.set(key, value).await
        }

        async fn get(&self, key: &str) -> MemoriaResult<Option<serde_json::Value>> {
            self.check()?;
            self.inner.get(key).await
        }

        async fn delete(&self, key: &str) -> MemoriaResult<bool> {
            self.check()?;
            self.inner.delete(key).await
        }

        async fn scan_prefix(&self, prefix: &str) -> MemoriaResult<Vec<(String, serde_json::Value)>> {
            self.check()?;
            self.inner.scan_prefix(prefix).await
        }

        async fn delete_prefix(&self, prefix: &str) -> MemoriaResult<usize> {
            self.check()?;
            self.inner.delete_prefix(prefix).await
        }

        async fn count(&self, prefix: &str) -> MemoriaResult<usize> {
            self.check()?;
            self.inner.count(prefix).await
        }
    }

    #[tokio::test]
    async fn test_put_then_get_active_preserves_order() {
        let (store, _) = store();

        let base = chrono::Utc::now();
        for n in 0..5 {
            let mut item = MemoryItem::user("conv-1", "user-1", format!("turn {}", n));
            item.created_at = base + chrono::Duration::milliseconds(n);
            store.put(item).await.unwrap();
        }

        let items = store.get_active("conv-1").await.unwrap();
        assert_eq!(items.len(), 5);
        let contents: Vec<&str> = items.iter().map(|i| i.content.as_str()).collect();
        assert_eq!(contents, vec!["turn 0", "turn 1", "turn 2", "turn 3", "turn 4"]);
    }

    #[tokio::test]
    async fn test_put_is_idempotent_by_id() {
        let (store, durable) = store();

        let item = MemoryItem::user("conv-1", "user-1", "original").with_id("fixed-id");
        store.put(item.clone()).await.unwrap();
        store
            .put(MemoryItem::user("conv-1", "user-1", "revised").with_id("fixed-id"))
            .await
            .unwrap();

        let items = store.get_active("conv-1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "revised");

        // the durable key is derived from the original creation time, so the
        // write-behind lands on one record
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(durable.count("conversation::conv-1::").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expired_items_are_never_returned() {
        let (store, _) = store();

        let expired = MemoryItem::user("conv-1", "user-1", "old news")
            .with_expires_at(chrono::Utc::now() - chrono::Duration::hours(1));
        let live = MemoryItem::user("conv-1", "user-1", "fresh");

        store.put(expired).await.unwrap();
        store.put(live).await.unwrap();

        let items = store.get_active("conv-1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "fresh");

        let removed = store.prune("conv-1").await.unwrap();
        assert_eq!(removed, 1);
    }

    #[tokio::test]
    async fn test_prune_evicts_lowest_importance_oldest_first() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = MemoryStore::new(durable, Arc::new(NullEventSink), 50, 2);

        let base = chrono::Utc::now();
        let mut expected_removed: Vec<(f64, i64, String)> = Vec::new();

        for n in 0..60i64 {
            let importance = fastrand::f64();
            let mut item = MemoryItem::user("conv-1", "user-1", format!("turn {}", n))
                .with_importance(importance);
            item.created_at = base + chrono::Duration::milliseconds(n);
            expected_removed.push((item.importance, n, item.id.clone()));
            store.put(item).await.unwrap();
        }

        expected_removed.sort_by(|a, b| {
            a.0.partial_cmp(&b.0)
                .unwrap()
                .then(a.1.cmp(&b.1))
        });
        let lowest_ten: HashSet<String> =
            expected_removed.iter().take(10).map(|(_, _, id)| id.clone()).collect();

        let removed = store.prune("conv-1").await.unwrap();
        assert_eq!(removed, 10);

        let survivors = store.get_active("conv-1").await.unwrap();
        assert_eq!(survivors.len(), 50);
        assert!(survivors.iter().all(|i| !lowest_ten.contains(&i.id)));
    }

    #[tokio::test]
    async fn test_write_after_delete_fails_and_stores_nothing() {
        let (store, durable) = store();

        store.put(MemoryItem::user("conv-1", "user-1", "hello")).await.unwrap();
        store.delete("conv-1").await.unwrap();

        let err = store
            .put(MemoryItem::user("conv-1", "user-1", "too late"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoriaError::ConversationGone { .. }));

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(durable.count("conversation::conv-1::").await.unwrap(), 0);

        let err = store.get_active("conv-1").await.unwrap_err();
        assert!(matches!(err, MemoriaError::ConversationGone { .. }));
    }

    #[tokio::test]
    async fn test_degraded_mode_serves_volatile_and_replays() {
        let flaky = FlakyStore::new();
        let sink = RecordingEventSink::shared();
        let store = MemoryStore::new(flaky.clone(), sink.clone(), 50, 2);

        flaky.set_down(true);
        store.put(MemoryItem::user("conv-1", "user-1", "while down")).await.unwrap();

        // reads keep working from the volatile tier
        let items = store.get_active("conv-1").await.unwrap();
        assert_eq!(items.len(), 1);

        // the write-behind exhausts its retries and queues the record
        tokio::time::sleep(std::time::Duration::from_millis(200)).await;
        assert!(store.is_degraded());
        assert!(sink.saw("durable_write_failed"));
        assert_eq!(flaky.inner.len().await, 0);

        // backend recovers; replay drains the queue
        flaky.set_down(false);
        let replayed = store.replay_pending().await;
        assert_eq!(replayed, 1);
        assert!(!store.is_degraded());
        assert_eq!(flaky.inner.len().await, 1);
        assert!(sink.saw("durable_recovered"));
    }

    #[tokio::test]
    async fn test_recover_skips_corrupt_records() {
        let (store, durable) = store();
        let sink = RecordingEventSink::shared();
        let recovering_store = MemoryStore::new(durable.clone(), sink.clone(), 50, 2);

        let good = MemoryItem::user("conv-1", "user-1", "intact record");
        store.put(good).await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;

        durable
            .set(
                "conversation::conv-1::item::00000000000000000000::broken",
                serde_json::json!({"not": "an item"}),
            )
            .await
            .unwrap();

        let recovered = recovering_store.recover_conversation("conv-1").await.unwrap();
        assert_eq!(recovered, 1);
        assert!(sink.saw("corrupt_item_skipped"));

        let items = recovering_store.get_active("conv-1").await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].content, "intact record");
    }

    #[tokio::test]
    async fn test_read_compressed_commits_summaries() {
        let durable = Arc::new(InMemoryDurableStore::new());
        let store = MemoryStore::new(durable.clone(), Arc::new(NullEventSink), 100, 2);

        let tail = "Additional depth on the migration plan follows here. ".repeat(8);
        for n in 0..30 {
            store
                .put(MemoryItem::user(
                    "conv-1",
                    "user-1",
                    format!("schema migration step {}. {}", n, tail),
                ))
                .await
                .unwrap();
        }

        let compressor = ContextCompressor::new(
            Arc::new(ExtractiveSummarizer::new()),
            Arc::new(TermOverlapGrouping::default()),
            Arc::new(NullEventSink),
            CompressorConfig::default(),
        );

        let (items, total, outcome) = store
            .read_compressed("conv-1", &compressor, 800)
            .await
            .unwrap();

        assert!(total <= 800);
        assert!(items.iter().any(|i| i.role == MemoryRole::Summary));
        assert!(matches!(outcome, CompressionOutcome::Summarized { .. }));

        // the summary replaced its sources in the active window
        let active = store.get_active("conv-1").await.unwrap();
        assert!(active.iter().any(|i| i.role == MemoryRole::Summary));
        assert!(active.iter().all(|i| !i.is_summarized_source()));

        // sources remain durable, marked with the cluster key
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let records = durable.scan_prefix("conversation::conv-1::").await.unwrap();
        let folded = records
            .iter()
            .filter_map(|(_, v)| serde_json::from_value::<MemoryItem>(v.clone()).ok())
            .filter(|i| i.is_summarized_source())
            .count();
        assert!(folded > 0);
    }

    #[tokio::test]
    async fn test_conversations_do_not_block_each_other() {
        let (store, _) = store();
        let store = Arc::new(store);

        let mut handles = Vec::new();
        for conv in 0..8 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                let cid = format!("conv-{}", conv);
                for n in 0..20 {
                    store
                        .put(MemoryItem::user(&cid, "user-1", format!("turn {}", n)))
                        .await
                        .unwrap();
                }
                store.get_active(&cid).await.unwrap().len()
            }));
        }

        for handle in handles {
            assert_eq!(handle.await.unwrap(), 20);
        }
    }
}
