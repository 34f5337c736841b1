//! Importance scoring for memory items
//!
//! The scorer maps an item plus its conversation history to a retention score
//! in [0.0, 1.0]. It is deterministic and side-effect-free: recency decays
//! exponentially with age, the content signal rewards substance and lexical
//! novelty over filler, and explicit user feedback applies a fixed boost.
//! Malformed input (empty content) scores the minimum instead of failing.

use crate::item::{FeedbackSignal, MemoryItem};
use std::collections::HashSet;

/// Terms that mark a turn as decision-bearing
const CUE_TERMS: &[&str] = &[
    "important", "critical", "urgent", "key", "essential", "decide", "decision", "remember",
    "deadline", "must",
];

/// How many preceding items count as "recent" for the novelty signal
const NOVELTY_WINDOW: usize = 10;

/// Token count at which the length signal saturates
const LENGTH_SATURATION_TOKENS: f64 = 64.0;

/// Tuning weights for [`ImportanceScorer`]
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    /// Half-life of the recency signal
    pub recency_half_life: std::time::Duration,

    /// Weight of the recency signal
    pub recency_weight: f64,

    /// Weight of the content signal (length + novelty)
    pub content_weight: f64,

    /// Fixed boost for a decision-bearing cue term
    pub cue_boost: f64,

    /// Fixed boost applied on positive user feedback
    pub feedback_boost: f64,

    /// Fixed penalty applied on negative user feedback
    pub feedback_penalty: f64,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            recency_half_life: std::time::Duration::from_secs(60 * 60),
            recency_weight: 0.4,
            content_weight: 0.5,
            cue_boost: 0.1,
            feedback_boost: 0.3,
            feedback_penalty: 0.3,
        }
    }
}

/// Deterministic importance scorer
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    config: ScoringConfig,
}

impl ImportanceScorer {
    /// Create a scorer with the given tuning
    pub fn new(config: ScoringConfig) -> Self {
        Self { config }
    }

    /// Score an item against its conversation history. Always in [0.0, 1.0].
    pub fn score(&self, item: &MemoryItem, history: &[MemoryItem]) -> f64 {
        if item.content.trim().is_empty() {
            return 0.0;
        }

        let recency = self.recency_signal(item);
        let content = self.content_signal(item, history);

        let mut score = self.config.recency_weight * recency + self.config.content_weight * content;

        if contains_cue_term(&item.content) {
            score += self.config.cue_boost;
        }

        match item.feedback {
            Some(FeedbackSignal::Positive) => score += self.config.feedback_boost,
            Some(FeedbackSignal::Negative) => score -= self.config.feedback_penalty,
            None => {}
        }

        score.clamp(0.0, 1.0)
    }

    /// Exponential decay by age: 1.0 now, 0.5 after one half-life
    fn recency_signal(&self, item: &MemoryItem) -> f64 {
        let age = (chrono::Utc::now() - item.created_at)
            .to_std()
            .unwrap_or_default();
        let half_life = self.config.recency_half_life.as_secs_f64().max(1.0);

        0.5_f64.powf(age.as_secs_f64() / half_life)
    }

    /// Length saturation blended with lexical novelty against recent history
    fn content_signal(&self, item: &MemoryItem, history: &[MemoryItem]) -> f64 {
        let length = (item.token_estimate as f64 / LENGTH_SATURATION_TOKENS).min(1.0);

        let item_terms = term_set(&item.content);
        if item_terms.is_empty() {
            return 0.5 * length;
        }

        let mut seen: HashSet<String> = HashSet::new();
        for prior in history.iter().rev().take(NOVELTY_WINDOW) {
            seen.extend(term_set(&prior.content));
        }

        let novel = item_terms.iter().filter(|t| !seen.contains(*t)).count();
        let novelty = novel as f64 / item_terms.len() as f64;

        0.5 * length + 0.5 * novelty
    }
}

fn contains_cue_term(content: &str) -> bool {
    let lower = content.to_lowercase();
    CUE_TERMS.iter().any(|term| lower.contains(term))
}

/// Lowercased alphanumeric terms of a piece of text
pub(crate) fn term_set(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.len() > 2)
        .map(|t| t.to_lowercase())
        .collect()
}
