//! # Memoria
//!
//! Conversational memory engine for retrieval-augmented chat applications:
//! records dialogue turns, keeps a bounded importance-ranked working set per
//! conversation, compresses context to a token budget through a pluggable
//! summarizer, and learns long-lived per-user preferences with confidence
//! decay.
//!
//! ## Components
//!
//! - **Scorer**: deterministic importance scoring (recency, novelty, feedback)
//! - **Store**: volatile working set plus durable system of record, with
//!   write-behind persistence and degraded-mode absorption
//! - **Compressor**: topical grouping and summarization under a token budget,
//!   with an observable truncation fallback
//! - **Learner**: per-user preferences, domain expertise, and satisfaction,
//!   exposed as personalization hints
//! - **Scheduler**: periodic pruning, replay, and confidence decay
//! - **Manager**: the single facade consumed by the generation pipeline
//!
//! ## Example
//!
//! ```rust,no_run
//! use memoria::{MemoryConfig, MemoryManager, Turn};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = MemoryManager::new(MemoryConfig::default());
//! manager.start_maintenance();
//!
//! manager
//!     .record_turn(Turn::user("conv-1", "user-1", "How do I tune this index?"))
//!     .await?;
//!
//! let context = manager.get_context("conv-1", 4000).await?;
//! for item in &context.items {
//!     println!("{}: {}", item.role, item.content);
//! }
//! # Ok(())
//! # }
//! ```

mod compression;
mod config;
mod error;
mod events;
mod item;
mod manager;
mod preferences;
mod scheduler;
mod scoring;
pub mod storage;
mod store;
mod summarizer;

pub use compression::{
    ClusterReplacement, CompressedContext, CompressionOutcome, CompressorConfig, ContextCompressor,
    GroupingStrategy, TermOverlapGrouping,
};
pub use config::MemoryConfig;
pub use error::{MemoriaError, MemoriaResult};
pub use events::{EventSink, NullEventSink, RecordingEventSink, TracingEventSink};
pub use item::{estimate_tokens, ConversationContext, FeedbackSignal, MemoryItem, MemoryRole};
pub use manager::{MemoryManager, Turn};
pub use preferences::{
    ComplexityLevel, LearnerConfig, PersonalizationHints, PreferenceLearner, PreferenceSignal,
    UserPreference, UserProfile,
};
pub use scheduler::MaintenanceScheduler;
pub use scoring::{ImportanceScorer, ScoringConfig};
pub use store::{ConversationPhase, MemoryStore};
pub use summarizer::{ExtractiveSummarizer, Summarizer, SummaryOutput};
