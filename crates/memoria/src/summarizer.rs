//! Summarizer collaborator interface
//!
//! Compression delegates the actual text reduction to a pluggable
//! [`Summarizer`]. Implementations must be safe to retry: summarizing the
//! same items twice may cost twice but must not corrupt anything. Errors are
//! non-fatal to the caller: compression falls back to truncation.

use crate::error::MemoriaResult;
use crate::item::{estimate_tokens, MemoryItem};
use async_trait::async_trait;

/// Output of one summarization call
#[derive(Debug, Clone)]
pub struct SummaryOutput {
    /// The summary text
    pub text: String,

    /// Token estimate for the summary itself
    pub token_estimate: usize,
}

/// Text summarization capability, typically backed by an LLM
#[async_trait]
pub trait Summarizer: Send + Sync {
    /// Produce a single summary covering all `items`
    async fn summarize(&self, items: &[MemoryItem]) -> MemoriaResult<SummaryOutput>;

    /// Implementation name, used in logs and events
    fn name(&self) -> &str;
}

/// Deterministic lead-sentence summarizer (for tests/demos, NOT a substitute
/// for an LLM-backed implementation)
pub struct ExtractiveSummarizer {
    /// Maximum sentences taken per source item
    max_sentences_per_item: usize,
}

impl ExtractiveSummarizer {
    /// Create an extractive summarizer
    pub fn new() -> Self {
        Self {
            max_sentences_per_item: 1,
        }
    }

    /// Take up to `n` leading sentences from each item
    pub fn with_max_sentences_per_item(mut self, n: usize) -> Self {
        self.max_sentences_per_item = n.max(1);
        self
    }

    fn lead_sentences(&self, content: &str) -> String {
        content
            .split_inclusive(['.', '!', '?'])
            .take(self.max_sentences_per_item)
            .collect::<String>()
            .trim()
            .to_string()
    }
}

impl Default for ExtractiveSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Summarizer for ExtractiveSummarizer {
    async fn summarize(&self, items: &[MemoryItem]) -> MemoriaResult<SummaryOutput> {
        let mut lines = Vec::with_capacity(items.len());

        for item in items {
            let lead = self.lead_sentences(&item.content);
            if !lead.is_empty() {
                lines.push(format!("{}: {}", item.role, lead));
            }
        }

        let text = lines.join("\n");
        let token_estimate = estimate_tokens(&text);

        Ok(SummaryOutput {
            text,
            token_estimate,
        })
    }

    fn name(&self) -> &str {
        "extractive"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::MemoryItem;

    #[tokio::test]
    async fn test_extractive_summary_is_deterministic() {
        let items = vec![
            MemoryItem::user("c", "u", "First question. Plus elaboration that is long."),
            MemoryItem::assistant("c", "u", "First answer. With caveats."),
        ];

        let summarizer = ExtractiveSummarizer::new();
        let a = summarizer.summarize(&items).await.unwrap();
        let b = summarizer.summarize(&items).await.unwrap();

        assert_eq!(a.text, b.text);
        assert!(a.text.contains("user: First question."));
        assert!(a.text.contains("assistant: First answer."));
    }

    #[tokio::test]
    async fn test_extractive_summary_shrinks_long_input() {
        let long = "Sentence one is here. ".repeat(40);
        let items = vec![
            MemoryItem::user("c", "u", long.clone()),
            MemoryItem::assistant("c", "u", long),
        ];

        let output = ExtractiveSummarizer::new().summarize(&items).await.unwrap();
        let input_tokens: usize = items.iter().map(|i| i.token_estimate).sum();

        assert!(output.token_estimate < input_tokens);
    }
}
