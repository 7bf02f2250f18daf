//! Size-bounded, priority-ordered log of prior step outputs.
//!
//! Items are kept most-recent-first. After every append the accumulator
//! evicts until its total estimated size fits the budget: lowest priority
//! goes first, and among equal priorities the oldest goes first. The budget
//! therefore holds after every mutation, and a higher-priority item is never
//! evicted while a lower-priority one remains.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use tracing::debug;

pub const DEFAULT_CONTEXT_BUDGET: usize = 24_000;

/// Bounded ordinal importance of a context item.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::Low => write!(f, "low"),
            Priority::Normal => write!(f, "normal"),
            Priority::High => write!(f, "high"),
            Priority::Critical => write!(f, "critical"),
        }
    }
}

impl std::str::FromStr for Priority {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            _ => anyhow::bail!(
                "Invalid priority '{}'. Valid values: low, normal, high, critical",
                s
            ),
        }
    }
}

/// Estimates the size of a piece of content in budget units.
pub trait SizeEstimator: Send + Sync {
    fn estimate(&self, content: &str) -> usize;
}

impl<F> SizeEstimator for F
where
    F: Fn(&str) -> usize + Send + Sync,
{
    fn estimate(&self, content: &str) -> usize {
        self(content)
    }
}

/// One unit per character.
pub struct CharEstimator;

impl SizeEstimator for CharEstimator {
    fn estimate(&self, content: &str) -> usize {
        content.chars().count()
    }
}

/// Roughly one unit per four characters, the usual token rule of thumb.
pub struct TokenEstimator;

impl SizeEstimator for TokenEstimator {
    fn estimate(&self, content: &str) -> usize {
        content.chars().count().div_ceil(4)
    }
}

/// Config-level choice of estimator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EstimatorKind {
    #[default]
    Chars,
    Tokens,
}

impl std::fmt::Display for EstimatorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EstimatorKind::Chars => write!(f, "chars"),
            EstimatorKind::Tokens => write!(f, "tokens"),
        }
    }
}

impl EstimatorKind {
    pub fn build(self) -> Arc<dyn SizeEstimator> {
        match self {
            EstimatorKind::Chars => Arc::new(CharEstimator),
            EstimatorKind::Tokens => Arc::new(TokenEstimator),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextItem {
    pub content: String,
    pub priority: Priority,
    pub size: usize,
    /// Insertion counter; larger is more recent.
    seq: u64,
}

impl ContextItem {
    pub fn seq(&self) -> u64 {
        self.seq
    }
}

pub struct ContextAccumulator {
    /// Head (index 0) is the most recent item.
    items: VecDeque<ContextItem>,
    budget: usize,
    total: usize,
    next_seq: u64,
    estimator: Arc<dyn SizeEstimator>,
}

impl std::fmt::Debug for ContextAccumulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContextAccumulator")
            .field("items", &self.items.len())
            .field("total", &self.total)
            .field("budget", &self.budget)
            .finish()
    }
}

impl ContextAccumulator {
    /// Character-counting accumulator with the given budget.
    pub fn new(budget: usize) -> Self {
        Self::with_estimator(budget, Arc::new(CharEstimator))
    }

    pub fn with_estimator(budget: usize, estimator: Arc<dyn SizeEstimator>) -> Self {
        Self {
            items: VecDeque::new(),
            budget,
            total: 0,
            next_seq: 0,
            estimator,
        }
    }

    /// Add `content` at the head, then evict down to the budget.
    /// Returns the number of items evicted.
    pub fn append(&mut self, content: impl Into<String>, priority: Priority) -> usize {
        let content = content.into();
        let size = self.estimator.estimate(&content);
        let item = ContextItem {
            content,
            priority,
            size,
            seq: self.next_seq,
        };
        self.next_seq += 1;
        self.total += size;
        self.items.push_front(item);
        self.prune()
    }

    fn prune(&mut self) -> usize {
        let mut evicted = 0;
        while self.total > self.budget {
            // Lowest priority; among ties the largest index, i.e. the oldest.
            let victim = self
                .items
                .iter()
                .enumerate()
                .min_by(|(ia, a), (ib, b)| a.priority.cmp(&b.priority).then_with(|| ib.cmp(ia)))
                .map(|(index, _)| index);
            let Some(item) = victim.and_then(|index| self.items.remove(index)) else {
                break;
            };
            self.total -= item.size;
            evicted += 1;
            debug!(
                priority = %item.priority,
                size = item.size,
                total = self.total,
                budget = self.budget,
                "Evicted context item"
            );
        }
        evicted
    }

    /// Contents ordered by priority (descending), then recency, keeping the
    /// longest prefix of that order that fits `size_budget`. Does not mutate.
    pub fn snapshot(&self, size_budget: usize) -> Vec<String> {
        let mut ordered: Vec<&ContextItem> = self.items.iter().collect();
        ordered.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| b.seq.cmp(&a.seq)));

        let mut used = 0;
        ordered
            .into_iter()
            .take_while(|item| {
                used += item.size;
                used <= size_budget
            })
            .map(|item| item.content.clone())
            .collect()
    }

    /// The snapshot joined into one prompt section. Empty when nothing fits.
    pub fn render(&self, size_budget: usize) -> String {
        self.snapshot(size_budget).join("\n\n")
    }

    /// Items from most recent to oldest.
    pub fn items(&self) -> impl Iterator<Item = &ContextItem> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn total_size(&self) -> usize {
        self.total
    }

    pub fn budget(&self) -> usize {
        self.budget
    }
}
