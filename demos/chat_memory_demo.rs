//! # Chat Memory Demo
//!
//! Walks through the full engine surface: recording turns, budgeted context
//! reads with compression, preference learning, and personalization hints.
//!
//! ## Run This Demo
//!
//! ```bash
//! cargo run --bin chat_memory_demo
//! ```

use memoria::{
    FeedbackSignal, MemoryConfig, MemoryManager, MemoryRole, PreferenceSignal, Turn,
};
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let config = MemoryConfig::default()
        .with_compression_token_budget(600)
        .with_maintenance_interval(std::time::Duration::from_secs(5));
    let manager = MemoryManager::new(config);
    manager.start_maintenance();

    info!("=== Recording a conversation ===");
    let detail = "The partition key choice drives everything downstream, \
                  from shard balance to query fan-out behavior under load. ";
    for n in 0..12 {
        manager
            .record_turn(Turn::user(
                "conv-1",
                "alice",
                format!("Sharding question {}. {}", n, detail.repeat(4)),
            ))
            .await?;
        manager
            .record_turn(Turn::assistant(
                "conv-1",
                "alice",
                format!("Sharding answer {}. {}", n, detail.repeat(4)),
            ))
            .await?;
    }

    // an explicitly flagged turn scores high and survives eviction longest
    manager
        .record_turn(
            Turn::user("conv-1", "alice", "Important: we decided on hash sharding by tenant id.")
                .with_feedback(FeedbackSignal::Positive),
        )
        .await?;

    info!("=== Reading budgeted context ===");
    let context = manager.get_context_default("conv-1").await?;
    info!(
        items = context.items.len(),
        tokens = context.total_token_estimate,
        compression = ?context.compression,
        "assembled context"
    );
    for item in &context.items {
        let preview: String = item.content.chars().take(72).collect();
        info!("  [{}] ({:.2}) {}", item.role, item.importance, preview);
    }
    if context.items.iter().any(|i| i.role == MemoryRole::Summary) {
        info!("older turns were folded into a summary to fit the budget");
    }

    info!("=== Learning preferences ===");
    for _ in 0..3 {
        manager
            .record_preference_signal(
                "alice",
                PreferenceSignal::new("response_format", "code_first", 0.9)
                    .with_domain("distributed systems"),
            )
            .await?;
    }

    let preferences = manager.get_preferences("alice", 0.5).await;
    for preference in &preferences {
        info!(
            key = %preference.key,
            value = %preference.value,
            confidence = preference.confidence,
            evidence = preference.evidence_count,
            "authoritative preference"
        );
    }

    let hints = manager
        .get_personalized_context("alice", "how should I rebalance shards?")
        .await?;
    info!(
        domains = ?hints.preferred_domains,
        complexity = ?hints.complexity,
        formats = ?hints.format_preferences,
        "personalization hints"
    );

    info!("=== Forgetting the conversation ===");
    manager.forget_conversation("conv-1").await?;
    match manager
        .record_turn(Turn::user("conv-1", "alice", "anyone home?"))
        .await
    {
        Err(e) => info!("write after forget correctly rejected: {}", e),
        Ok(()) => anyhow::bail!("write after forget should have failed"),
    }

    manager.shutdown().await;
    Ok(())
}
