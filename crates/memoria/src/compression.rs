//! Token-budget compression of conversation context
//!
//! When a conversation's active items exceed the caller's token budget, the
//! compressor clusters them by topical proximity, asks the external
//! [`Summarizer`](crate::summarizer::Summarizer) for one summary per oversized
//! cluster, and repeats for a bounded number of passes. If the budget still
//! isn't met (or the summarizer fails or times out) it falls back to
//! truncating the least important items, and flags that in the result so
//! callers can detect lossy compression.
//!
//! The compressor never touches storage: it returns the replacement plan and
//! the store commits it atomically under the conversation lock.

use crate::item::{MemoryItem, MemoryRole};
use crate::scoring::term_set;
use crate::events::EventSink;
use crate::summarizer::Summarizer;
use std::collections::HashSet;
use std::sync::Arc;

/// How a context read was fitted to its token budget
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionOutcome {
    /// Already within budget; items returned unchanged
    Unnecessary,

    /// Fitted by summarization in the given number of passes
    Summarized { passes: usize },

    /// Lossy fallback: least-important items dropped (after any summaries).
    /// `dropped` counts the items removed by truncation alone.
    Truncated { dropped: usize },
}

/// One committed summarization: a summary item standing in for its sources
#[derive(Debug, Clone)]
pub struct ClusterReplacement {
    /// The summary item (role = summary, `group_key` = cluster id)
    pub summary: MemoryItem,

    /// Ids of the source items folded into the summary
    pub source_ids: Vec<String>,
}

/// Result of one compression run
#[derive(Debug, Clone)]
pub struct CompressedContext {
    /// Post-compression items in chronological order
    pub items: Vec<MemoryItem>,

    /// Sum of the items' token estimates
    pub total_token_estimate: usize,

    /// How the budget was met
    pub outcome: CompressionOutcome,

    /// Summarizations to commit to the store
    pub replacements: Vec<ClusterReplacement>,
}

/// Topical grouping over a conversation's items.
///
/// The exact similarity measure is deliberately pluggable; implementations
/// must return a disjoint partition of item indices.
pub trait GroupingStrategy: Send + Sync {
    /// Partition `items` into topical clusters (disjoint index lists)
    fn group(&self, items: &[MemoryItem]) -> Vec<Vec<usize>>;

    /// Strategy name, used in logs
    fn name(&self) -> &str;
}

/// Greedy clustering on shared-term (Jaccard) overlap
pub struct TermOverlapGrouping {
    threshold: f64,
}

impl TermOverlapGrouping {
    /// Create a grouping with the given similarity threshold in (0, 1]
    pub fn new(threshold: f64) -> Self {
        Self {
            threshold: threshold.clamp(f64::EPSILON, 1.0),
        }
    }
}

impl Default for TermOverlapGrouping {
    fn default() -> Self {
        Self::new(0.2)
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}

impl GroupingStrategy for TermOverlapGrouping {
    fn group(&self, items: &[MemoryItem]) -> Vec<Vec<usize>> {
        let terms: Vec<HashSet<String>> = items.iter().map(|i| term_set(&i.content)).collect();
        let mut assigned = vec![false; items.len()];
        let mut clusters = Vec::new();

        for seed in 0..items.len() {
            if assigned[seed] {
                continue;
            }
            assigned[seed] = true;

            let mut cluster = vec![seed];
            let mut cluster_terms = terms[seed].clone();

            for candidate in (seed + 1)..items.len() {
                if assigned[candidate] {
                    continue;
                }
                if jaccard(&cluster_terms, &terms[candidate]) >= self.threshold {
                    assigned[candidate] = true;
                    cluster_terms.extend(terms[candidate].iter().cloned());
                    cluster.push(candidate);
                }
            }

            clusters.push(cluster);
        }

        clusters
    }

    fn name(&self) -> &str {
        "term-overlap"
    }
}

/// Tuning for [`ContextCompressor`]
#[derive(Debug, Clone)]
pub struct CompressorConfig {
    /// Deadline per summarizer call; on expiry the truncation path is used
    pub summarizer_timeout: std::time::Duration,

    /// Maximum grouping/summarization passes before truncation
    pub max_passes: usize,

    /// Minimum cluster size worth summarizing
    pub min_group_size: usize,

    /// Combined token size a cluster must exceed to be summarized
    pub group_token_threshold: usize,
}

impl Default for CompressorConfig {
    fn default() -> Self {
        Self {
            summarizer_timeout: std::time::Duration::from_secs(10),
            max_passes: 3,
            min_group_size: 2,
            group_token_threshold: 128,
        }
    }
}

/// Fits a conversation's items into a token budget
pub struct ContextCompressor {
    summarizer: Arc<dyn Summarizer>,
    grouping: Arc<dyn GroupingStrategy>,
    events: Arc<dyn EventSink>,
    config: CompressorConfig,
}

impl ContextCompressor {
    /// Create a compressor
    pub fn new(
        summarizer: Arc<dyn Summarizer>,
        grouping: Arc<dyn GroupingStrategy>,
        events: Arc<dyn EventSink>,
        config: CompressorConfig,
    ) -> Self {
        Self {
            summarizer,
            grouping,
            events,
            config,
        }
    }

    /// Compress `items` to fit `token_budget`.
    ///
    /// Infallible by design: summarizer failures degrade to truncation, never
    /// to an error. The returned total is always ≤ `token_budget` provided
    /// the budget covers at least the smallest single item.
    pub async fn compress(&self, items: Vec<MemoryItem>, token_budget: usize) -> CompressedContext {
        let mut total: usize = items.iter().map(|i| i.token_estimate).sum();

        if total <= token_budget {
            return CompressedContext {
                items,
                total_token_estimate: total,
                outcome: CompressionOutcome::Unnecessary,
                replacements: Vec::new(),
            };
        }

        let mut working = items;
        let mut replacements: Vec<ClusterReplacement> = Vec::new();
        let mut passes = 0;
        let mut fallback = false;

        while total > token_budget && passes < self.config.max_passes && !fallback {
            let clusters = self.grouping.group(&working);

            let mut candidates: Vec<Vec<usize>> = clusters
                .into_iter()
                .filter(|c| {
                    c.len() >= self.config.min_group_size
                        && c.iter().map(|&i| working[i].token_estimate).sum::<usize>()
                            > self.config.group_token_threshold
                })
                .collect();

            if candidates.is_empty() {
                break;
            }

            // Largest clusters first: best reduction per summarizer call
            candidates.sort_by_key(|c| {
                std::cmp::Reverse(c.iter().map(|&i| working[i].token_estimate).sum::<usize>())
            });

            let mut pass_replacements: Vec<(Vec<usize>, MemoryItem)> = Vec::new();

            for cluster in candidates {
                let cluster_items: Vec<MemoryItem> =
                    cluster.iter().map(|&i| working[i].clone()).collect();

                let result = tokio::time::timeout(
                    self.config.summarizer_timeout,
                    self.summarizer.summarize(&cluster_items),
                )
                .await;

                match result {
                    Ok(Ok(output)) => {
                        let summary = build_summary_item(&cluster_items, output.text, output.token_estimate);
                        replacements.push(ClusterReplacement {
                            summary: summary.clone(),
                            source_ids: cluster_items.iter().map(|i| i.id.clone()).collect(),
                        });
                        pass_replacements.push((cluster, summary));
                    }
                    Ok(Err(e)) => {
                        tracing::warn!(
                            summarizer = self.summarizer.name(),
                            error = %e,
                            "summarizer failed, falling back to truncation"
                        );
                        self.events.emit(
                            "compression_fallback",
                            vec![("reason".into(), "summarizer_error".into())],
                        );
                        fallback = true;
                        break;
                    }
                    Err(_) => {
                        tracing::warn!(
                            summarizer = self.summarizer.name(),
                            timeout_ms = self.config.summarizer_timeout.as_millis() as u64,
                            "summarizer timed out, falling back to truncation"
                        );
                        self.events.emit(
                            "compression_fallback",
                            vec![("reason".into(), "summarizer_timeout".into())],
                        );
                        fallback = true;
                        break;
                    }
                }
            }

            if pass_replacements.is_empty() {
                break;
            }

            working = apply_replacements(working, &pass_replacements);
            total = working.iter().map(|i| i.token_estimate).sum();
            passes += 1;
        }

        if total > token_budget {
            let dropped = truncate_to_budget(&mut working, token_budget);
            total = working.iter().map(|i| i.token_estimate).sum();

            CompressedContext {
                items: working,
                total_token_estimate: total,
                outcome: CompressionOutcome::Truncated { dropped },
                replacements,
            }
        } else {
            CompressedContext {
                items: working,
                total_token_estimate: total,
                outcome: CompressionOutcome::Summarized { passes },
                replacements,
            }
        }
    }
}

/// Build the summary item standing in for `sources`. It inherits the earliest
/// creation time (keeps chronological ordering) and the highest importance
/// (a summary must not be evicted before the turns it replaced would have
/// been).
fn build_summary_item(sources: &[MemoryItem], text: String, token_estimate: usize) -> MemoryItem {
    let first = &sources[0];
    let created_at = sources.iter().map(|i| i.created_at).min().unwrap_or(first.created_at);
    let importance = sources
        .iter()
        .map(|i| i.importance)
        .fold(0.0_f64, f64::max);
    let source_ids: Vec<&str> = sources.iter().map(|i| i.id.as_str()).collect();

    let mut summary = MemoryItem::new(
        first.conversation_id.clone(),
        first.user_id.clone(),
        MemoryRole::Summary,
        text,
    )
    .with_token_estimate(token_estimate)
    .with_group_key(uuid::Uuid::new_v4().to_string())
    .with_importance(importance)
    .with_metadata("source_ids", source_ids.join(","));

    summary.created_at = created_at;
    summary
}

/// Replace each cluster with its summary, keeping chronological positions
fn apply_replacements(
    working: Vec<MemoryItem>,
    pass_replacements: &[(Vec<usize>, MemoryItem)],
) -> Vec<MemoryItem> {
    let mut replaced: std::collections::HashMap<usize, Option<&MemoryItem>> =
        std::collections::HashMap::new();

    for (cluster, summary) in pass_replacements {
        let Some(&anchor) = cluster.iter().min() else {
            continue;
        };
        for &idx in cluster {
            replaced.insert(idx, None);
        }
        replaced.insert(anchor, Some(summary));
    }

    working
        .into_iter()
        .enumerate()
        .filter_map(|(idx, item)| match replaced.get(&idx) {
            None => Some(item),
            Some(Some(summary)) => Some((*summary).clone()),
            Some(None) => None,
        })
        .collect()
}

/// Drop least-important (then oldest) items until the total fits the budget.
/// Returns how many were dropped.
fn truncate_to_budget(working: &mut Vec<MemoryItem>, token_budget: usize) -> usize {
    let mut total: usize = working.iter().map(|i| i.token_estimate).sum();
    let mut drop_order: Vec<usize> = (0..working.len()).collect();
    drop_order.sort_by(|&a, &b| {
        working[a]
            .importance
            .partial_cmp(&working[b].importance)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(working[a].created_at.cmp(&working[b].created_at))
    });

    let mut to_drop: HashSet<String> = HashSet::new();
    for idx in drop_order {
        if total <= token_budget {
            break;
        }
        total -= working[idx].token_estimate;
        to_drop.insert(working[idx].id.clone());
    }

    let dropped = to_drop.len();
    working.retain(|i| !to_drop.contains(&i.id));
    dropped
}
