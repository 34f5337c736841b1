//! Durable-tier storage abstraction
//!
//! The durable tier is the system of record: it survives process restarts and
//! holds one record per memory item plus one record per learned user
//! preference. Records are namespaced JSON documents; any schema-capable
//! backend can implement [`DurableStore`] as long as prefix scans come back in
//! key order (the item key encodes `(conversation_id, created_at)`, so an
//! ordered scan is the secondary index the engine relies on).

mod memory;

pub use memory::InMemoryDurableStore;

use crate::error::MemoriaResult;
use async_trait::async_trait;

/// Persistent record store backing the memory engine
#[async_trait]
pub trait DurableStore: Send + Sync {
    /// Write a record, replacing any existing value at `key`
    async fn set(&self, key: &str, value: serde_json::Value) -> MemoriaResult<()>;

    /// Read a record
    async fn get(&self, key: &str) -> MemoriaResult<Option<serde_json::Value>>;

    /// Delete a record, returning whether it existed
    async fn delete(&self, key: &str) -> MemoriaResult<bool>;

    /// All records whose key starts with `prefix`, in ascending key order
    async fn scan_prefix(&self, prefix: &str) -> MemoriaResult<Vec<(String, serde_json::Value)>>;

    /// Delete all records whose key starts with `prefix`, returning the count
    async fn delete_prefix(&self, prefix: &str) -> MemoriaResult<usize>;

    /// Number of records under `prefix`
    async fn count(&self, prefix: &str) -> MemoriaResult<usize>;
}

/// Key for one memory item record. The zero-padded millisecond timestamp
/// keeps prefix scans ordered by creation time.
pub fn item_key(conversation_id: &str, created_at: chrono::DateTime<chrono::Utc>, id: &str) -> String {
    format!(
        "conversation::{}::item::{:020}::{}",
        conversation_id,
        created_at.timestamp_millis().max(0),
        id
    )
}

/// Prefix covering every item record of one conversation
pub fn conversation_prefix(conversation_id: &str) -> String {
    format!("conversation::{}::item::", conversation_id)
}

/// Key for one learned preference record
pub fn preference_key(user_id: &str, preference: &str) -> String {
    format!("user::{}::pref::{}", user_id, preference)
}

/// Prefix covering every preference record of one user
pub fn preference_prefix(user_id: &str) -> String {
    format!("user::{}::pref::", user_id)
}
