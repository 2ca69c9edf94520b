//! Per-tick outcomes and the bounded record of recent ticks.

use crate::tree::MatchedNode;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// What one tick did.
///
/// Only [`TickOutcome::ActionFailed`] counts as a failure, and even that
/// never stops the loop.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum TickOutcome {
    /// Target found and clicked.
    Matched(MatchedNode),
    /// The host had no tree to offer.
    NoTreeAvailable,
    /// A tree was available but nothing satisfied the criterion.
    NoMatch,
    /// The click, the provider, or the tick body itself failed.
    ActionFailed(String),
}

impl TickOutcome {
    /// Whether this outcome counts toward failure backoff.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::ActionFailed(_))
    }

    /// Short machine-readable name, used as a log field.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Matched(_) => "matched",
            Self::NoTreeAvailable => "no_tree",
            Self::NoMatch => "no_match",
            Self::ActionFailed(_) => "action_failed",
        }
    }
}

impl std::fmt::Display for TickOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Matched(node) => {
                let text = node
                    .label
                    .as_deref()
                    .or(node.description.as_deref())
                    .unwrap_or("<unnamed>");
                write!(f, "clicked {text:?} at depth {}", node.depth)
            }
            Self::NoTreeAvailable => f.write_str("no tree available"),
            Self::NoMatch => f.write_str("no matching node"),
            Self::ActionFailed(reason) => write!(f, "action failed: {reason}"),
        }
    }
}

/// One completed tick.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TickRecord {
    /// 1-based tick number.
    pub tick: u64,
    /// Epoch milliseconds when the tick began.
    pub started_at_ms: u64,
    /// Epoch milliseconds when the outcome was recorded.
    pub finished_at_ms: u64,
    pub outcome: TickOutcome,
}

/// Running totals per outcome kind.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeCounters {
    /// Ticks that clicked the target.
    pub matched: u64,
    /// Ticks without a tree.
    pub no_tree: u64,
    /// Ticks where nothing matched.
    pub no_match: u64,
    /// Ticks that ended in `ActionFailed`.
    pub failed: u64,
}

impl OutcomeCounters {
    /// Count one outcome.
    pub fn record(&mut self, outcome: &TickOutcome) {
        let slot = match outcome {
            TickOutcome::Matched(_) => &mut self.matched,
            TickOutcome::NoTreeAvailable => &mut self.no_tree,
            TickOutcome::NoMatch => &mut self.no_match,
            TickOutcome::ActionFailed(_) => &mut self.failed,
        };
        *slot = slot.saturating_add(1);
    }
}

/// Bounded FIFO of recent tick records.
#[derive(Debug, Clone)]
pub struct TickHistory {
    records: VecDeque<TickRecord>,
    limit: usize,
}

impl TickHistory {
    /// Empty history keeping at most `limit` records (at least one).
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            records: VecDeque::with_capacity(limit.min(64)),
            limit,
        }
    }

    /// Append a record, evicting the oldest when full.
    pub fn push(&mut self, record: TickRecord) {
        if self.records.len() == self.limit {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Copy of the kept records, oldest first.
    pub fn to_vec(&self) -> Vec<TickRecord> {
        self.records.iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(tick: u64, outcome: TickOutcome) -> TickRecord {
        TickRecord {
            tick,
            started_at_ms: tick * 10,
            finished_at_ms: tick * 10 + 1,
            outcome,
        }
    }

    #[test]
    fn history_drops_oldest() {
        let mut history = TickHistory::new(2);
        history.push(record(1, TickOutcome::NoMatch));
        history.push(record(2, TickOutcome::NoTreeAvailable));
        history.push(record(3, TickOutcome::NoMatch));

        let ticks: Vec<u64> = history.to_vec().iter().map(|r| r.tick).collect();
        assert_eq!(ticks, vec![2, 3]);
    }

    #[test]
    fn counters_track_each_kind() {
        let mut counters = OutcomeCounters::default();
        counters.record(&TickOutcome::NoMatch);
        counters.record(&TickOutcome::NoMatch);
        counters.record(&TickOutcome::NoTreeAvailable);
        counters.record(&TickOutcome::ActionFailed("boom".to_owned()));

        assert_eq!(counters.no_match, 2);
        assert_eq!(counters.no_tree, 1);
        assert_eq!(counters.failed, 1);
        assert_eq!(counters.matched, 0);
    }

    #[test]
    fn only_action_failed_is_a_failure() {
        assert!(TickOutcome::ActionFailed("x".to_owned()).is_failure());
        assert!(!TickOutcome::NoTreeAvailable.is_failure());
        assert!(!TickOutcome::NoMatch.is_failure());
    }

    #[test]
    fn outcome_serializes_with_kind_tag() {
        let json = serde_json::to_string(&TickOutcome::NoMatch).unwrap_or_default();
        assert_eq!(json, r#"{"kind":"no_match"}"#);
    }
}
