// ⚖️ Consensus Engine - turn annotator votes into one label per axis
//
// Per item and axis:
//   top count == full_agree_threshold  → agree     (label)
//   top count >= majority_threshold    → majority  (label)
//   otherwise                          → split     (ambiguous)
//   fewer non-empty votes than majority_threshold → insufficient
//
// A blank label never wins: when blanks lead the tally the axis is a split.
//
// If explicitness settles on NOT, the target axis is forced empty and its
// statistics are left alone.

use crate::error::{ConsensusError, Result};
use crate::labels::{Axis, NOT};
use crate::record_store::Annotation;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ============================================================================
// CONFIGURATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusConfig {
    /// Number of independent annotators (max votes per item)
    pub annotator_count: usize,

    /// Votes needed for full agreement (usually every annotator)
    pub full_agree_threshold: usize,

    /// Votes needed for a majority decision
    pub majority_threshold: usize,
}

impl ConsensusConfig {
    /// Thresholds derived from the annotator count: all agree, or a strict majority
    pub fn for_annotators(annotator_count: usize) -> Self {
        ConsensusConfig {
            annotator_count,
            full_agree_threshold: annotator_count,
            majority_threshold: annotator_count / 2 + 1,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.majority_threshold == 0 {
            return Err(ConsensusError::InvalidConfig(
                "majority threshold must be at least 1".to_string(),
            ));
        }
        if self.majority_threshold > self.full_agree_threshold {
            return Err(ConsensusError::InvalidConfig(format!(
                "majority threshold {} exceeds full-agreement threshold {}",
                self.majority_threshold, self.full_agree_threshold
            )));
        }
        if self.full_agree_threshold > self.annotator_count {
            return Err(ConsensusError::InvalidConfig(format!(
                "full-agreement threshold {} exceeds annotator count {}",
                self.full_agree_threshold, self.annotator_count
            )));
        }
        Ok(())
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        ConsensusConfig::for_annotators(4)
    }
}

// ============================================================================
// STATISTICS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum OutcomeKind {
    Agree,
    Majority,
    Split,
    Skip,
}

impl OutcomeKind {
    pub fn name(&self) -> &'static str {
        match self {
            OutcomeKind::Agree => "agree",
            OutcomeKind::Majority => "majority",
            OutcomeKind::Split => "split",
            OutcomeKind::Skip => "skip",
        }
    }
}

/// Counter name: axis, outcome and optionally a label or "A+B" label pair
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StatKey {
    pub axis: Axis,
    pub kind: OutcomeKind,
    pub detail: Option<String>,
}

impl StatKey {
    pub fn overall(axis: Axis, kind: OutcomeKind) -> Self {
        StatKey { axis, kind, detail: None }
    }

    pub fn detailed(axis: Axis, kind: OutcomeKind, detail: &str) -> Self {
        StatKey {
            axis,
            kind,
            detail: Some(detail.to_string()),
        }
    }
}

impl std::fmt::Display for StatKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.axis.name(), self.kind.name())?;
        if let Some(detail) = &self.detail {
            write!(f, "-{}", detail)?;
        }
        Ok(())
    }
}

/// Outcome counters owned by one reconciliation session
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    counters: BTreeMap<StatKey, usize>,
}

impl Stats {
    pub fn new() -> Self {
        Stats::default()
    }

    pub fn increment(&mut self, key: StatKey) {
        *self.counters.entry(key).or_insert(0) += 1;
    }

    pub fn get(&self, key: &StatKey) -> usize {
        self.counters.get(key).copied().unwrap_or(0)
    }

    /// Shorthand for an axis/outcome total
    pub fn count(&self, axis: Axis, kind: OutcomeKind) -> usize {
        self.get(&StatKey::overall(axis, kind))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&StatKey, usize)> {
        self.counters.iter().map(|(k, v)| (k, *v))
    }

    /// One "name: count" line per counter, sorted by key
    pub fn report(&self) -> String {
        self.iter()
            .map(|(key, count)| format!("{}: {}", key, count))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

// ============================================================================
// RESULTS
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Resolution {
    /// A definite label (may be empty when the target axis is suppressed)
    Label(String),

    /// Split vote, needs adjudication
    Ambiguous,

    /// Not enough non-empty votes to decide
    Insufficient,
}

impl Resolution {
    pub fn label(&self) -> Option<&str> {
        match self {
            Resolution::Label(label) => Some(label.as_str()),
            _ => None,
        }
    }

    pub fn is_definite(&self) -> bool {
        matches!(self, Resolution::Label(_))
    }
}

/// Verdict for one item/axis plus the votes that produced it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsensusResult {
    pub resolution: Resolution,

    /// (label, count) in first-seen order; empty if the axis was skipped
    pub distribution: Vec<(String, usize)>,
}

impl ConsensusResult {
    fn suppressed() -> Self {
        ConsensusResult {
            resolution: Resolution::Label(String::new()),
            distribution: Vec::new(),
        }
    }
}

/// Both axes for one item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemConsensus {
    pub explicitness: ConsensusResult,
    pub target: ConsensusResult,
}

impl ItemConsensus {
    pub fn needs_adjudication(&self) -> bool {
        !self.explicitness.resolution.is_definite() || !self.target.resolution.is_definite()
    }
}

// ============================================================================
// ENGINE
// ============================================================================

pub struct ConsensusEngine {
    config: ConsensusConfig,
}

impl ConsensusEngine {
    pub fn new(config: ConsensusConfig) -> Result<Self> {
        config.validate()?;
        Ok(ConsensusEngine { config })
    }

    /// Resolve one axis from an item's votes.
    ///
    /// Ties between labels with the same count go to the label seen first in
    /// the vote list. Split counters use the lexicographically sorted pair so
    /// the key does not depend on vote order.
    pub fn resolve(&self, votes: &[Annotation], axis: Axis, stats: &mut Stats) -> ConsensusResult {
        let non_empty = votes
            .iter()
            .filter(|v| !v.vote(axis).trim().is_empty())
            .count();

        let distribution = tally(votes.iter().map(|v| v.vote(axis)));

        if non_empty < self.config.majority_threshold {
            stats.increment(StatKey::overall(axis, OutcomeKind::Skip));
            return ConsensusResult {
                resolution: Resolution::Insufficient,
                distribution,
            };
        }

        let (top_label, top_count) = ranked(&distribution, 0);

        let resolution = if top_label.is_empty() {
            self.split(&distribution, axis, stats)
        } else if top_count == self.config.full_agree_threshold {
            stats.increment(StatKey::overall(axis, OutcomeKind::Agree));
            stats.increment(StatKey::detailed(axis, OutcomeKind::Agree, top_label));
            Resolution::Label(top_label.to_string())
        } else if top_count >= self.config.majority_threshold {
            stats.increment(StatKey::overall(axis, OutcomeKind::Majority));
            stats.increment(StatKey::detailed(axis, OutcomeKind::Majority, top_label));
            Resolution::Label(top_label.to_string())
        } else {
            self.split(&distribution, axis, stats)
        };

        ConsensusResult {
            resolution,
            distribution,
        }
    }

    fn split(&self, distribution: &[(String, usize)], axis: Axis, stats: &mut Stats) -> Resolution {
        let mut pair = vec![ranked(distribution, 0).0];
        if distribution.len() > 1 {
            pair.push(ranked(distribution, 1).0);
        }
        pair.sort_unstable();
        stats.increment(StatKey::overall(axis, OutcomeKind::Split));
        stats.increment(StatKey::detailed(axis, OutcomeKind::Split, &pair.join("+")));
        Resolution::Ambiguous
    }

    /// Resolve both axes, applying the NOT → empty target rule
    pub fn resolve_item(&self, votes: &[Annotation], stats: &mut Stats) -> ItemConsensus {
        let explicitness = self.resolve(votes, Axis::Explicitness, stats);
        let target = if explicitness.resolution.label() == Some(NOT) {
            ConsensusResult::suppressed()
        } else {
            self.resolve(votes, Axis::Target, stats)
        };
        ItemConsensus { explicitness, target }
    }
}

/// Count labels, keeping first-seen order
fn tally<'a>(votes: impl Iterator<Item = &'a str>) -> Vec<(String, usize)> {
    let mut counts: Vec<(String, usize)> = Vec::new();
    for vote in votes {
        let vote = vote.trim();
        match counts.iter_mut().find(|(label, _)| label == vote) {
            Some((_, n)) => *n += 1,
            None => counts.push((vote.to_string(), 1)),
        }
    }
    counts
}

/// The `rank`-th most common label; equal counts keep first-seen order
fn ranked(distribution: &[(String, usize)], rank: usize) -> (&str, usize) {
    let mut order: Vec<usize> = (0..distribution.len()).collect();
    // stable sort keeps first-seen order among equal counts
    order.sort_by(|a, b| distribution[*b].1.cmp(&distribution[*a].1));
    let (label, count) = &distribution[order[rank]];
    (label.as_str(), *count)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn votes(pairs: &[(&str, &str)]) -> Vec<Annotation> {
        pairs
            .iter()
            .enumerate()
            .map(|(i, (expl, targ))| Annotation {
                item_id: "42".to_string(),
                explicitness: expl.to_string(),
                target: targ.to_string(),
                source_identity: format!("annotator-{}", i + 1),
            })
            .collect()
    }

    fn expl(labels: &[&str]) -> Vec<Annotation> {
        let pairs: Vec<(&str, &str)> = labels.iter().map(|l| (*l, "GROUP")).collect();
        votes(&pairs)
    }

    fn engine() -> ConsensusEngine {
        ConsensusEngine::new(ConsensusConfig::default()).unwrap()
    }

    #[test]
    fn test_full_agreement() {
        let mut stats = Stats::new();
        let result = engine().resolve(
            &expl(&["EXPLICIT", "EXPLICIT", "EXPLICIT", "EXPLICIT"]),
            Axis::Explicitness,
            &mut stats,
        );
        assert_eq!(result.resolution, Resolution::Label("EXPLICIT".to_string()));
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Agree), 1);
        assert_eq!(
            stats.get(&StatKey::detailed(Axis::Explicitness, OutcomeKind::Agree, "EXPLICIT")),
            1
        );
        assert_eq!(stats.iter().count(), 2);
    }

    #[test]
    fn test_majority_three_of_four() {
        let mut stats = Stats::new();
        let result = engine().resolve(
            &expl(&["IMPLICIT", "EXPLICIT", "IMPLICIT", "IMPLICIT"]),
            Axis::Explicitness,
            &mut stats,
        );
        assert_eq!(result.resolution, Resolution::Label("IMPLICIT".to_string()));
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Majority), 1);
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Agree), 0);
        assert_eq!(
            result.distribution,
            vec![("IMPLICIT".to_string(), 3), ("EXPLICIT".to_string(), 1)]
        );
    }

    #[test]
    fn test_split_key_is_order_independent() {
        let mut first = Stats::new();
        let mut second = Stats::new();
        let a = engine().resolve(&expl(&["B", "A", "A", "B"]), Axis::Explicitness, &mut first);
        let b = engine().resolve(&expl(&["A", "B", "B", "A"]), Axis::Explicitness, &mut second);

        assert_eq!(a.resolution, Resolution::Ambiguous);
        assert_eq!(b.resolution, Resolution::Ambiguous);
        let key = StatKey::detailed(Axis::Explicitness, OutcomeKind::Split, "A+B");
        assert_eq!(first.get(&key), 1);
        assert_eq!(second.get(&key), 1);
        assert_eq!(first, second);
        assert_eq!(key.to_string(), "explicitness-split-A+B");
    }

    #[test]
    fn test_two_one_one_is_split_on_top_two() {
        let mut stats = Stats::new();
        let result = engine().resolve(
            &expl(&["NOT", "IMPLICIT", "EXPLICIT", "IMPLICIT"]),
            Axis::Explicitness,
            &mut stats,
        );
        assert_eq!(result.resolution, Resolution::Ambiguous);
        // IMPLICIT leads, NOT wins the tie for second by appearing first
        let key = StatKey::detailed(Axis::Explicitness, OutcomeKind::Split, "IMPLICIT+NOT");
        assert_eq!(stats.get(&key), 1);
    }

    #[test]
    fn test_insufficient_votes_only_touch_skip_counter() {
        let mut stats = Stats::new();
        let result = engine().resolve(&expl(&["EXPLICIT", "EXPLICIT"]), Axis::Explicitness, &mut stats);
        assert_eq!(result.resolution, Resolution::Insufficient);
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Skip), 1);
        assert_eq!(stats.iter().count(), 1);
    }

    #[test]
    fn test_blank_votes_do_not_count_towards_threshold() {
        let mut stats = Stats::new();
        let result = engine().resolve(&expl(&["EXPLICIT", "", "EXPLICIT", " "]), Axis::Explicitness, &mut stats);
        assert_eq!(result.resolution, Resolution::Insufficient);
    }

    #[test]
    fn test_blank_is_its_own_label_in_the_tally() {
        let mut stats = Stats::new();
        let result = engine().resolve(
            &expl(&["EXPLICIT", "", "EXPLICIT", "EXPLICIT"]),
            Axis::Explicitness,
            &mut stats,
        );
        assert_eq!(result.resolution, Resolution::Label("EXPLICIT".to_string()));
        assert_eq!(result.distribution[1], (String::new(), 1));
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Majority), 1);
    }

    #[test]
    fn test_leading_blank_votes_are_a_split() {
        let config = ConsensusConfig {
            annotator_count: 4,
            full_agree_threshold: 4,
            majority_threshold: 2,
        };
        let mut stats = Stats::new();
        let result = ConsensusEngine::new(config)
            .unwrap()
            .resolve(&expl(&["", "", "A", "B"]), Axis::Explicitness, &mut stats);

        assert_eq!(result.resolution, Resolution::Ambiguous);
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Majority), 0);
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Split), 1);
        assert_eq!(
            stats.get(&StatKey::detailed(Axis::Explicitness, OutcomeKind::Split, "+A")),
            1
        );
    }

    #[test]
    fn test_not_explicitness_suppresses_target() {
        let mut stats = Stats::new();
        let item = engine().resolve_item(
            &votes(&[
                ("NOT", "GROUP"),
                ("NOT", "GROUP"),
                ("NOT", "GROUP"),
                ("NOT", "GROUP"),
            ]),
            &mut stats,
        );
        assert_eq!(item.explicitness.resolution, Resolution::Label("NOT".to_string()));
        assert_eq!(item.target.resolution, Resolution::Label(String::new()));
        assert!(item.target.distribution.is_empty());
        assert!(stats.iter().all(|(key, _)| key.axis == Axis::Explicitness));
        assert!(!item.needs_adjudication());
    }

    #[test]
    fn test_three_annotators_majority_of_two() {
        let config = ConsensusConfig::for_annotators(3);
        assert_eq!(config.majority_threshold, 2);
        let engine = ConsensusEngine::new(config).unwrap();
        let mut stats = Stats::new();
        let item = engine.resolve_item(
            &votes(&[
                ("EXPLICIT", "INDIVIDUAL"),
                ("EXPLICIT", "INDIVIDUAL"),
                ("IMPLICIT", "GROUP"),
            ]),
            &mut stats,
        );
        assert_eq!(item.explicitness.resolution, Resolution::Label("EXPLICIT".to_string()));
        assert_eq!(item.target.resolution, Resolution::Label("INDIVIDUAL".to_string()));
        assert_eq!(stats.count(Axis::Explicitness, OutcomeKind::Majority), 1);
        assert_eq!(stats.count(Axis::Target, OutcomeKind::Majority), 1);
    }

    #[test]
    fn test_resolve_does_not_mutate_votes() {
        let input = expl(&["A", "B", "A", "A"]);
        let before = input.clone();
        let mut stats = Stats::new();
        engine().resolve(&input, Axis::Explicitness, &mut stats);
        assert_eq!(input, before);
    }

    #[test]
    fn test_config_validation() {
        assert!(ConsensusConfig::default().validate().is_ok());
        let bad = ConsensusConfig {
            annotator_count: 3,
            full_agree_threshold: 4,
            majority_threshold: 2,
        };
        assert!(matches!(bad.validate(), Err(ConsensusError::InvalidConfig(_))));
        let zero = ConsensusConfig {
            annotator_count: 3,
            full_agree_threshold: 3,
            majority_threshold: 0,
        };
        assert!(ConsensusEngine::new(zero).is_err());
    }

    #[test]
    fn test_stats_report_lines() {
        let mut stats = Stats::new();
        stats.increment(StatKey::overall(Axis::Target, OutcomeKind::Skip));
        stats.increment(StatKey::detailed(Axis::Explicitness, OutcomeKind::Agree, "NOT"));
        assert_eq!(stats.report(), "explicitness-agree-NOT: 1\ntarget-skip: 1");
    }
}
