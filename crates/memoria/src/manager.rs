//! Memory manager - the single API surface of the engine
//!
//! Coordinates the scorer, the dual-tier store, the compressor, and the
//! preference learner behind the operation set consumed by a generation
//! pipeline: record a turn, read budgeted context, learn preference signals,
//! serve personalization hints, forget a conversation.

use crate::compression::{CompressorConfig, ContextCompressor};
use crate::config::MemoryConfig;
use crate::error::MemoriaResult;
use crate::item::{ConversationContext, FeedbackSignal, MemoryItem, MemoryRole};
use crate::preferences::{PersonalizationHints, PreferenceLearner, PreferenceSignal, UserPreference};
use crate::scheduler::MaintenanceScheduler;
use crate::scoring::ImportanceScorer;
use crate::store::MemoryStore;
use std::sync::Arc;

/// One dialogue turn to record
#[derive(Debug, Clone)]
pub struct Turn {
    /// Conversation the turn belongs to
    pub conversation_id: String,

    /// User the conversation belongs to
    pub user_id: String,

    /// Who produced the turn
    pub role: MemoryRole,

    /// Turn text
    pub content: String,

    /// Caller-supplied id; recording the same id twice stores one item
    pub id: Option<String>,

    /// Explicit user feedback on the turn
    pub feedback: Option<FeedbackSignal>,

    /// Expiry override; defaults to the configured retention window
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Turn {
    /// Create a turn
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        role: MemoryRole,
        content: impl Into<String>,
    ) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            role,
            content: content.into(),
            id: None,
            feedback: None,
            expires_at: None,
        }
    }

    /// Create a user turn
    pub fn user(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(conversation_id, user_id, MemoryRole::User, content)
    }

    /// Create an assistant turn
    pub fn assistant(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self::new(conversation_id, user_id, MemoryRole::Assistant, content)
    }

    /// Use a caller-supplied id
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Attach explicit user feedback
    pub fn with_feedback(mut self, feedback: FeedbackSignal) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Override the default expiry
    pub fn with_expires_at(mut self, expires_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }
}

/// Conversational memory engine
pub struct MemoryManager {
    store: Arc<MemoryStore>,
    scorer: ImportanceScorer,
    compressor: ContextCompressor,
    learner: Arc<PreferenceLearner>,
    config: MemoryConfig,
    scheduler: parking_lot::Mutex<Option<MaintenanceScheduler>>,
}

impl MemoryManager {
    /// Build an engine from its configuration
    pub fn new(config: MemoryConfig) -> Self {
        let store = Arc::new(MemoryStore::new(
            config.durable.clone(),
            config.events.clone(),
            config.max_short_term_items,
            config.durable_write_retries,
        ));

        let learner = Arc::new(PreferenceLearner::new(
            store.writer(),
            config.events.clone(),
            config.learner.clone(),
        ));

        let compressor = ContextCompressor::new(
            config.summarizer.clone(),
            config.grouping.clone(),
            config.events.clone(),
            CompressorConfig {
                summarizer_timeout: config.summarizer_timeout,
                max_passes: config.max_compression_passes,
                ..CompressorConfig::default()
            },
        );

        Self {
            store,
            scorer: ImportanceScorer::new(config.scoring.clone()),
            compressor,
            learner,
            config,
            scheduler: parking_lot::Mutex::new(None),
        }
    }

    /// Score and store one dialogue turn.
    ///
    /// Fails with [`ConversationGone`](crate::MemoriaError::ConversationGone)
    /// after the conversation was forgotten; durable-tier trouble is absorbed
    /// and never fails the call.
    pub async fn record_turn(&self, turn: Turn) -> MemoriaResult<()> {
        let history = self.store.get_active(&turn.conversation_id).await?;

        let mut item = MemoryItem::new(turn.conversation_id, turn.user_id, turn.role, turn.content);
        if let Some(id) = turn.id {
            item = item.with_id(id);
        }
        if let Some(feedback) = turn.feedback {
            item = item.with_feedback(feedback);
        }

        let expires_at = turn.expires_at.unwrap_or_else(|| {
            item.created_at
                + chrono::Duration::from_std(self.config.retention_window)
                    .unwrap_or_else(|_| chrono::Duration::hours(24))
        });
        item = item.with_expires_at(expires_at);

        item.importance = self.scorer.score(&item, &history);

        if let Some(feedback) = item.feedback {
            let score = match feedback {
                FeedbackSignal::Positive => 1.0,
                FeedbackSignal::Negative => 0.0,
            };
            // satisfaction history is advisory; a failure here never fails the turn
            let _ = self.learner.record_satisfaction(&item.user_id, score).await;
        }

        self.store.put(item).await
    }

    /// Assemble the conversation's context within `token_budget`, compressing
    /// (and, if the summarizer fails or times out, truncating) as needed, and
    /// attach personalization hints for the owning user.
    pub async fn get_context(
        &self,
        conversation_id: &str,
        token_budget: usize,
    ) -> MemoriaResult<ConversationContext> {
        let (items, total_token_estimate, compression) = self
            .store
            .read_compressed(conversation_id, &self.compressor, token_budget)
            .await?;

        let hints = match items.first() {
            Some(item) => Some(
                self.learner
                    .get_personalized_context(&item.user_id, "")
                    .await,
            ),
            None => None,
        };

        Ok(ConversationContext {
            conversation_id: conversation_id.to_string(),
            items,
            total_token_estimate,
            compression,
            hints,
        })
    }

    /// Assemble context with the configured default token budget
    pub async fn get_context_default(
        &self,
        conversation_id: &str,
    ) -> MemoriaResult<ConversationContext> {
        self.get_context(conversation_id, self.config.compression_token_budget)
            .await
    }

    /// Hard-delete a conversation. Terminal: later writes fail.
    pub async fn forget_conversation(&self, conversation_id: &str) -> MemoriaResult<()> {
        self.store.delete(conversation_id).await
    }

    /// Fold one preference signal into the user's profile
    pub async fn record_preference_signal(
        &self,
        user_id: &str,
        signal: PreferenceSignal,
    ) -> MemoriaResult<()> {
        self.learner.record_signal(user_id, signal).await
    }

    /// Authoritative preferences at or above `min_confidence`
    pub async fn get_preferences(&self, user_id: &str, min_confidence: f64) -> Vec<UserPreference> {
        self.learner.get_preferences(user_id, min_confidence).await
    }

    /// Personalization hints for a query, to weight retrieval/generation
    pub async fn get_personalized_context(
        &self,
        user_id: &str,
        query: &str,
    ) -> MemoriaResult<PersonalizationHints> {
        Ok(self.learner.get_personalized_context(user_id, query).await)
    }

    /// Rehydrate a conversation from the durable tier (e.g. after restart)
    pub async fn recover_conversation(&self, conversation_id: &str) -> MemoriaResult<usize> {
        self.store.recover_conversation(conversation_id).await
    }

    /// Rehydrate a user's preferences from the durable tier
    pub async fn load_user(&self, user_id: &str) -> MemoriaResult<usize> {
        self.learner.load_user(user_id).await
    }

    /// Whether the engine is serving from the volatile tier only
    pub fn is_degraded(&self) -> bool {
        self.store.is_degraded()
    }

    /// Start the periodic maintenance task (prune, replay, decay). Idempotent.
    pub fn start_maintenance(&self) {
        let mut scheduler = self.scheduler.lock();
        if scheduler.is_none() {
            *scheduler = Some(MaintenanceScheduler::spawn(
                self.store.clone(),
                self.learner.clone(),
                self.config.maintenance_interval,
            ));
        }
    }

    /// Stop the maintenance task, waiting for an in-flight tick
    pub async fn shutdown(&self) {
        let scheduler = self.scheduler.lock().take();
        if let Some(scheduler) = scheduler {
            scheduler.shutdown().await;
        }
    }
}
