//! Memory items and derived conversation context
//!
//! A [`MemoryItem`] is one recorded dialogue turn or one summary produced by
//! compression. Items are created on record, mutated only to refresh their
//! importance or to be folded into a summary, and removed by pruning or by
//! explicit conversation deletion.

use crate::compression::CompressionOutcome;
use crate::preferences::PersonalizationHints;
use serde::{Deserialize, Serialize};

/// Who produced a memory item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryRole {
    /// End-user turn
    User,
    /// Assistant turn
    Assistant,
    /// System / instruction turn
    System,
    /// Derived summary replacing a cluster of source items
    Summary,
}

impl MemoryRole {
    /// Stable string form used in storage keys and summaries
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryRole::User => "user",
            MemoryRole::Assistant => "assistant",
            MemoryRole::System => "system",
            MemoryRole::Summary => "summary",
        }
    }
}

impl std::fmt::Display for MemoryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Explicit end-user feedback attached to a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedbackSignal {
    /// The user flagged the turn as useful/important
    Positive,
    /// The user flagged the turn as unhelpful
    Negative,
}

/// Metadata key marking an item folded into a later summary. Needed to tell
/// a live summary (group_key = its own cluster) from a summary that was
/// itself absorbed by a subsequent pass.
pub(crate) const FOLDED_INTO_KEY: &str = "folded_into";

/// Rough token count for a piece of text (~4 characters per token)
pub fn estimate_tokens(text: &str) -> usize {
    let chars = text.chars().count();
    if chars == 0 {
        0
    } else {
        (chars + 3) / 4
    }
}

/// One recorded turn or derived summary
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryItem {
    /// Unique identifier
    pub id: String,

    /// Conversation this item belongs to
    pub conversation_id: String,

    /// User the conversation belongs to
    pub user_id: String,

    /// Who produced the item
    pub role: MemoryRole,

    /// Turn or summary text
    pub content: String,

    /// Retention score (0.0 to 1.0), lowest evicted first
    pub importance: f64,

    /// When the item was recorded
    pub created_at: chrono::DateTime<chrono::Utc>,

    /// Optional expiry; an expired item is never returned by any read
    pub expires_at: Option<chrono::DateTime<chrono::Utc>>,

    /// Approximate generation-model tokens consumed by the content
    pub token_estimate: usize,

    /// Cluster key set when the item was folded into (or is) a summary
    pub group_key: Option<String>,

    /// Explicit user feedback, consumed by the importance scorer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feedback: Option<FeedbackSignal>,

    /// Optional extension fields
    #[serde(default)]
    pub metadata: std::collections::HashMap<String, String>,
}

impl MemoryItem {
    /// Create a new item with a generated id
    pub fn new(
        conversation_id: impl Into<String>,
        user_id: impl Into<String>,
        role: MemoryRole,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        let token_estimate = estimate_tokens(&content);

        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            user_id: user_id.into(),
            role,
            content,
            importance: 0.5,
            created_at: chrono::Utc::now(),
            expires_at: None,
            token_estimate,
            group_key: None,
            feedback: None,
            metadata: std::collections::HashMap::new(),
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

    /// Use a caller-supplied id (record dedup key)
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    /// Set the importance score, clamped to [0.0, 1.0]
    pub fn with_importance(mut self, importance: f64) -> Self {
        self.importance = importance.clamp(0.0, 1.0);
        self
    }

    /// Set the expiry. An expiry earlier than `created_at` is raised to
    /// `created_at` (the item expires immediately rather than in the past).
    pub fn with_expires_at(mut self, expires_at: chrono::DateTime<chrono::Utc>) -> Self {
        self.expires_at = Some(expires_at.max(self.created_at));
        self
    }

    /// Override the token estimate (e.g. from a summarizer's own count)
    pub fn with_token_estimate(mut self, token_estimate: usize) -> Self {
        self.token_estimate = token_estimate;
        self
    }

    /// Link the item to a summarized cluster
    pub fn with_group_key(mut self, group_key: impl Into<String>) -> Self {
        self.group_key = Some(group_key.into());
        self
    }

    /// Attach explicit user feedback
    pub fn with_feedback(mut self, feedback: FeedbackSignal) -> Self {
        self.feedback = Some(feedback);
        self
    }

    /// Add a metadata field
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether the item is expired relative to `now`
    pub fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        self.expires_at.map(|e| e <= now).unwrap_or(false)
    }

    /// Whether the item is a source folded into a summary and therefore
    /// excluded from active-context reads
    pub fn is_summarized_source(&self) -> bool {
        if self.metadata.contains_key(FOLDED_INTO_KEY) {
            return true;
        }
        self.group_key.is_some() && self.role != MemoryRole::Summary
    }

    /// Mark the item as folded into the given cluster
    pub(crate) fn mark_folded_into(&mut self, group_key: &str) {
        self.group_key = Some(group_key.to_string());
        self.metadata
            .insert(FOLDED_INTO_KEY.to_string(), group_key.to_string());
    }
}

/// Ordered view of one conversation's active memory, recomputed per read
#[derive(Debug, Clone)]
pub struct ConversationContext {
    /// Conversation the view belongs to
    pub conversation_id: String,

    /// Active items in creation order (summaries in place of their sources)
    pub items: Vec<MemoryItem>,

    /// Sum of the items' token estimates
    pub total_token_estimate: usize,

    /// How the view was fitted to the token budget
    pub compression: CompressionOutcome,

    /// Personalization hints for the owning user, when available
    pub hints: Option<PersonalizationHints>,
}

impl ConversationContext {
    /// Whether the lossy truncation path was used to fit the budget
    pub fn was_truncated(&self) -> bool {
        matches!(self.compression, CompressionOutcome::Truncated { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_estimate() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abc"), 1);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
        assert_eq!(estimate_tokens(&"x".repeat(400)), 100);
    }

    #[test]
    fn test_item_builder() {
        let item = MemoryItem::user("conv-1", "user-1", "Hello there")
            .with_importance(1.5)
            .with_metadata("channel", "web");

        assert_eq!(item.role, MemoryRole::User);
        assert_eq!(item.importance, 1.0); // clamped
        assert_eq!(item.token_estimate, estimate_tokens("Hello there"));
        assert_eq!(item.metadata.get("channel").map(String::as_str), Some("web"));
        assert!(item.expires_at.is_none());
    }

    #[test]
    fn test_expiry_never_precedes_creation() {
        let item = MemoryItem::user("conv-1", "user-1", "hi")
            .with_expires_at(chrono::Utc::now() - chrono::Duration::hours(1));

        assert_eq!(item.expires_at, Some(item.created_at));
        assert!(item.is_expired(chrono::Utc::now()));
    }

    #[test]
    fn test_summarized_source_detection() {
        let source = MemoryItem::user("c", "u", "text").with_group_key("g-1");
        assert!(source.is_summarized_source());

        let summary = MemoryItem::new("c", "u", MemoryRole::Summary, "gist").with_group_key("g-1");
        assert!(!summary.is_summarized_source());

        // a summary absorbed by a later pass is excluded like any source
        let mut absorbed = summary;
        absorbed.mark_folded_into("g-2");
        assert!(absorbed.is_summarized_source());
    }

    #[test]
    fn test_item_roundtrip_serde() {
        let item = MemoryItem::assistant("conv-9", "user-3", "The answer is 42")
            .with_feedback(FeedbackSignal::Positive);

        let json = serde_json::to_value(&item).unwrap();
        let back: MemoryItem = serde_json::from_value(json).unwrap();

        assert_eq!(back.id, item.id);
        assert_eq!(back.role, MemoryRole::Assistant);
        assert_eq!(back.feedback, Some(FeedbackSignal::Positive));
    }
}
