//! Turns classifier probabilities into a ranked, condition-valid shortlist.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::types::RankedCandidate;

/// Alternatives returned after the best strategy.
pub const MAX_ALTERNATIVES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RaceCondition {
    Dry,
    Wet,
}

impl RaceCondition {
    pub fn from_is_wet(is_wet: bool) -> Self {
        if is_wet {
            RaceCondition::Wet
        } else {
            RaceCondition::Dry
        }
    }

    /// Dry races never use wet or intermediate tyres; wet races use at
    /// least one of them.
    pub fn admits(&self, label: &StrategyLabel) -> bool {
        match self {
            RaceCondition::Dry => !label.has_wet_marker(),
            RaceCondition::Wet => label.has_wet_marker(),
        }
    }
}

impl fmt::Display for RaceCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RaceCondition::Dry => f.write_str("dry"),
            RaceCondition::Wet => f.write_str("wet"),
        }
    }
}

/// Compound sequence such as `M-H` or `W-I-M`, one letter per stint.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyLabel(pub String);

impl StrategyLabel {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn stints(&self) -> impl Iterator<Item = &str> {
        self.0.split('-')
    }

    pub fn has_wet_marker(&self) -> bool {
        self.0.contains(['W', 'I'])
    }

    pub fn starts_wet(&self) -> bool {
        matches!(self.stints().next(), Some("W") | Some("I"))
    }

    pub fn pit_stops(&self) -> usize {
        self.0.matches('-').count()
    }
}

impl fmt::Display for StrategyLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Shortlist {
    pub best: RankedCandidate,
    pub alternatives: Vec<RankedCandidate>,
}

/// Drops candidates the condition does not admit, narrows wet races to
/// wet-first strategies when any exist, and sorts by descending
/// probability (stable, so equal probabilities keep input order).
/// `None` only when nothing survives the condition filter.
pub fn rank_candidates(
    candidates: impl IntoIterator<Item = (StrategyLabel, f64)>,
    condition: RaceCondition,
) -> Option<Shortlist> {
    let mut kept: Vec<(StrategyLabel, f64)> = candidates
        .into_iter()
        .filter(|(label, _)| condition.admits(label))
        .collect();

    if condition == RaceCondition::Wet && kept.iter().any(|(l, _)| l.starts_wet()) {
        kept.retain(|(l, _)| l.starts_wet());
    }

    kept.sort_by(|a, b| b.1.total_cmp(&a.1));
    let mut ranked = kept.into_iter().map(|(label, probability)| RankedCandidate {
        strategy: label.0,
        probability,
    });
    let best = ranked.next()?;
    Some(Shortlist {
        best,
        alternatives: ranked.take(MAX_ALTERNATIVES).collect(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn cands(items: &[(&str, f64)]) -> Vec<(StrategyLabel, f64)> {
        items.iter().map(|(l, p)| (StrategyLabel::new(*l), *p)).collect()
    }

    #[test]
    fn test_label_markers() {
        let l = StrategyLabel::new("W-I-M");
        assert!(l.has_wet_marker());
        assert!(l.starts_wet());
        assert_eq!(l.pit_stops(), 2);
        assert_eq!(l.stints().collect::<Vec<_>>(), vec!["W", "I", "M"]);

        let dry = StrategyLabel::new("M-H");
        assert!(!dry.has_wet_marker());
        assert!(!dry.starts_wet());
        assert_eq!(dry.pit_stops(), 1);
    }

    #[test]
    fn test_dry_race_drops_wet_labels() {
        let out = rank_candidates(cands(&[("W-I", 0.5), ("M-H", 0.3), ("S-M", 0.2)]), RaceCondition::Dry).unwrap();
        assert_eq!(out.best.strategy, "M-H");
        assert_eq!(out.best.probability, 0.3);
        assert_eq!(out.alternatives.len(), 1);
        assert_eq!(out.alternatives[0].strategy, "S-M");
    }

    #[test]
    fn test_wet_race_prefers_wet_start() {
        let out = rank_candidates(
            cands(&[("M-I", 0.6), ("I-M", 0.3), ("W-I", 0.1), ("M-H", 0.9)]),
            RaceCondition::Wet,
        )
        .unwrap();
        assert_eq!(out.best.strategy, "I-M");
        assert_eq!(out.alternatives.iter().map(|c| c.strategy.as_str()).collect::<Vec<_>>(), vec!["W-I"]);
    }

    #[test]
    fn test_wet_race_falls_back_when_no_wet_start() {
        let out = rank_candidates(cands(&[("M-I", 0.2), ("H-W", 0.7)]), RaceCondition::Wet).unwrap();
        assert_eq!(out.best.strategy, "H-W");
        assert_eq!(out.alternatives[0].strategy, "M-I");
    }

    #[test]
    fn test_top_five_only() {
        let items: Vec<(String, f64)> = (0..8).map(|i| (format!("M-H-{i}"), i as f64 / 10.0)).collect();
        let out = rank_candidates(
            items.into_iter().map(|(l, p)| (StrategyLabel(l), p)),
            RaceCondition::Dry,
        )
        .unwrap();
        assert_eq!(out.best.strategy, "M-H-7");
        assert_eq!(out.alternatives.len(), MAX_ALTERNATIVES);
        assert_eq!(out.alternatives[3].strategy, "M-H-3");
    }

    #[test]
    fn test_nothing_survives() {
        assert!(rank_candidates(cands(&[("W-I", 1.0)]), RaceCondition::Dry).is_none());
        assert!(rank_candidates(Vec::new(), RaceCondition::Wet).is_none());
    }

    fn label_strategy() -> impl Strategy<Value = String> {
        proptest::collection::vec(prop::sample::select(vec!["S", "M", "H", "I", "W"]), 1..4)
            .prop_map(|v| v.join("-"))
    }

    proptest! {
        #[test]
        fn prop_shortlist_respects_condition(
            items in proptest::collection::vec((label_strategy(), 0.0f64..1.0), 0..12),
            is_wet in any::<bool>(),
        ) {
            let condition = RaceCondition::from_is_wet(is_wet);
            let input: Vec<(StrategyLabel, f64)> = items.iter().map(|(l, p)| (StrategyLabel::new(l.clone()), *p)).collect();
            let survivors = input.iter().filter(|(l, _)| condition.admits(l)).count();
            let out = rank_candidates(input.clone(), condition);

            prop_assert_eq!(out.is_some(), survivors > 0);
            if let Some(out) = out {
                let all: Vec<&RankedCandidate> = std::iter::once(&out.best).chain(&out.alternatives).collect();
                for w in all.windows(2) {
                    prop_assert!(w[0].probability >= w[1].probability);
                }
                for c in &all {
                    prop_assert!(condition.admits(&StrategyLabel::new(c.strategy.clone())));
                }
                if condition == RaceCondition::Wet && input.iter().any(|(l, _)| condition.admits(l) && l.starts_wet()) {
                    prop_assert!(all.iter().all(|c| StrategyLabel::new(c.strategy.clone()).starts_wet()));
                }
            }
        }
    }
}
