//! Engine configuration

use crate::compression::{GroupingStrategy, TermOverlapGrouping};
use crate::events::{EventSink, NullEventSink};
use crate::preferences::LearnerConfig;
use crate::scoring::ScoringConfig;
use crate::storage::{DurableStore, InMemoryDurableStore};
use crate::summarizer::{ExtractiveSummarizer, Summarizer};
use std::sync::Arc;
use std::time::Duration;

/// Configuration for a [`MemoryManager`](crate::manager::MemoryManager)
#[derive(Clone)]
pub struct MemoryConfig {
    /// Durable-tier backend (system of record)
    pub durable: Arc<dyn DurableStore>,

    /// Summarizer collaborator used by compression
    pub summarizer: Arc<dyn Summarizer>,

    /// Telemetry sink for absorbed failures and lifecycle events
    pub events: Arc<dyn EventSink>,

    /// Topical grouping used by compression
    pub grouping: Arc<dyn GroupingStrategy>,

    /// Short-term items retained per conversation
    pub max_short_term_items: usize,

    /// Default lifetime of a recorded turn
    pub retention_window: Duration,

    /// Default token budget for context reads
    pub compression_token_budget: usize,

    /// Deadline per summarizer call before the truncation fallback
    pub summarizer_timeout: Duration,

    /// Maximum grouping/summarization passes per context read
    pub max_compression_passes: usize,

    /// How often the maintenance task runs
    pub maintenance_interval: Duration,

    /// Durable write attempts before queueing for replay
    pub durable_write_retries: u32,

    /// Importance scorer tuning
    pub scoring: ScoringConfig,

    /// Preference learner tuning
    pub learner: LearnerConfig,
}

impl MemoryConfig {
    /// Create a configuration over the given durable backend
    pub fn new(durable: Arc<dyn DurableStore>) -> Self {
        Self {
            durable,
            summarizer: Arc::new(ExtractiveSummarizer::new()),
            events: Arc::new(NullEventSink),
            grouping: Arc::new(TermOverlapGrouping::default()),
            max_short_term_items: 50,
            retention_window: Duration::from_secs(24 * 60 * 60),
            compression_token_budget: 4000,
            summarizer_timeout: Duration::from_secs(10),
            max_compression_passes: 3,
            maintenance_interval: Duration::from_secs(60),
            durable_write_retries: 3,
            scoring: ScoringConfig::default(),
            learner: LearnerConfig::default(),
        }
    }

    /// Set the summarizer collaborator
    pub fn with_summarizer(mut self, summarizer: Arc<dyn Summarizer>) -> Self {
        self.summarizer = summarizer;
        self
    }

    /// Set the telemetry sink
    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Set the topical grouping strategy
    pub fn with_grouping(mut self, grouping: Arc<dyn GroupingStrategy>) -> Self {
        self.grouping = grouping;
        self
    }

    /// Set the short-term item cap per conversation
    pub fn with_max_short_term_items(mut self, max: usize) -> Self {
        self.max_short_term_items = max;
        self
    }

    /// Set the default turn lifetime
    pub fn with_retention_window(mut self, window: Duration) -> Self {
        self.retention_window = window;
        self
    }

    /// Set the default context token budget
    pub fn with_compression_token_budget(mut self, budget: usize) -> Self {
        self.compression_token_budget = budget;
        self
    }

    /// Set the per-call summarizer deadline
    pub fn with_summarizer_timeout(mut self, timeout: Duration) -> Self {
        self.summarizer_timeout = timeout;
        self
    }

    /// Set the compression pass cap
    pub fn with_max_compression_passes(mut self, passes: usize) -> Self {
        self.max_compression_passes = passes.max(1);
        self
    }

    /// Set the maintenance cadence
    pub fn with_maintenance_interval(mut self, interval: Duration) -> Self {
        self.maintenance_interval = interval;
        self
    }

    /// Set the corroborations required before a preference is authoritative
    pub fn with_min_evidence_for_preference(mut self, min_evidence: u32) -> Self {
        self.learner.min_evidence = min_evidence;
        self
    }

    /// Set the idle window after which preference confidence decays
    pub fn with_preference_retention_window(mut self, window: Duration) -> Self {
        self.learner.retention_window = window;
        self
    }

    /// Set the importance scorer tuning
    pub fn with_scoring(mut self, scoring: ScoringConfig) -> Self {
        self.scoring = scoring;
        self
    }
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self::new(Arc::new(InMemoryDurableStore::new()))
    }
}
