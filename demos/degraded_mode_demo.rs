//! # Degraded Mode Demo
//!
//! Shows the engine absorbing a durable-tier outage: writes keep succeeding
//! from the volatile tier, the miss is observable through the event sink, and
//! queued records replay once the backend recovers.
//!
//! ## Run This Demo
//!
//! ```bash
//! cargo run --bin degraded_mode_demo
//! ```

use async_trait::async_trait;
use memoria::storage::{DurableStore, InMemoryDurableStore};
use memoria::{MemoriaError, MemoriaResult, MemoryConfig, MemoryManager, RecordingEventSink, Turn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Durable store with a breakable connection
struct UnreliableStore {
    inner: InMemoryDurableStore,
    down: AtomicBool,
}

impl UnreliableStore {
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
impl DurableStore for UnreliableStore {
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

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let backend = UnreliableStore::new();
    let sink = RecordingEventSink::shared();

    let config = MemoryConfig::new(backend.clone()).with_events(sink.clone());
    // short maintenance interval so replay happens quickly after recovery
    let config = config.with_maintenance_interval(std::time::Duration::from_millis(200));
    let manager = MemoryManager::new(config);
    manager.start_maintenance();

    info!("=== Durable tier goes down ===");
    backend.set_down(true);

    for n in 0..5 {
        manager
            .record_turn(Turn::user("conv-1", "bob", format!("turn {} during outage", n)))
            .await?;
    }
    info!("writes during the outage all succeeded from the volatile tier");

    // reads are unaffected
    let context = manager.get_context("conv-1", 10_000).await?;
    info!(items = context.items.len(), "context served while degraded");

    // give the write-behind time to exhaust its retries
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;
    info!(
        degraded = manager.is_degraded(),
        saw_failure_event = sink.saw("durable_write_failed"),
        "degraded mode is observable, not a caller-facing failure"
    );

    info!("=== Durable tier recovers ===");
    backend.set_down(false);
    tokio::time::sleep(std::time::Duration::from_millis(600)).await;

    info!(
        degraded = manager.is_degraded(),
        recovered_event = sink.saw("durable_recovered"),
        durable_records = backend.inner.len().await,
        "queued writes replayed"
    );

    manager.shutdown().await;
    Ok(())
}
