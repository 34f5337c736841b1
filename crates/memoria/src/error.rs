//! Error types for the memoria crate
//!
//! Recoverable conditions (durable tier unreachable, summarizer failure,
//! corrupt stored records) are absorbed inside the engine and reported through
//! the event sink; only state-machine violations and malformed input surface
//! to callers as hard errors.

use thiserror::Error;

/// Result type used throughout the crate
pub type MemoriaResult<T> = std::result::Result<T, MemoriaError>;

/// Errors produced by the memory engine
#[derive(Error, Debug)]
pub enum MemoriaError {
    /// Storage backend failure (volatile or durable tier)
    #[error("Storage error during '{operation}': {source}")]
    Storage {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// Write or read attempted on a deleted conversation. Terminal.
    #[error("Conversation '{conversation_id}' has been deleted")]
    ConversationGone { conversation_id: String },

    /// Malformed preference signal, rejected before any state mutation
    #[error("Invalid preference signal ({field}): {reason}")]
    InvalidSignal { field: String, reason: String },

    /// A stored record failed to deserialize; the record is skipped, never
    /// propagated as a read failure for the whole conversation
    #[error("Corrupt record at '{key}': {reason}")]
    CorruptItem { key: String, reason: String },

    /// Summarizer collaborator failure; compression falls back to truncation
    #[error("Summarizer error during '{operation}': {message}")]
    Summarizer { operation: String, message: String },

    /// An operation exceeded its deadline
    #[error("Operation '{operation}' timed out after {timeout_ms}ms")]
    Timeout { operation: String, timeout_ms: u64 },
}

impl MemoriaError {
    /// Create a storage error
    pub fn storage(operation: impl Into<String>, source: std::io::Error) -> Self {
        Self::Storage {
            operation: operation.into(),
            source,
        }
    }

    /// Create a conversation-gone error
    pub fn conversation_gone(conversation_id: impl Into<String>) -> Self {
        Self::ConversationGone {
            conversation_id: conversation_id.into(),
        }
    }

    /// Create an invalid-signal error
    pub fn invalid_signal(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSignal {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Create a corrupt-item error
    pub fn corrupt_item(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::CorruptItem {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Create a summarizer error
    pub fn summarizer(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Summarizer {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error
    pub fn timeout(operation: impl Into<String>, timeout: std::time::Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            timeout_ms: timeout.as_millis() as u64,
        }
    }

    /// Whether the engine absorbs this error instead of surfacing it
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::Storage { .. } | Self::CorruptItem { .. } | Self::Summarizer { .. } | Self::Timeout { .. }
        )
    }
}
