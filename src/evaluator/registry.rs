// src/evaluator/registry.rs

//! `(source, metric)` → measurement strategy table.

use std::collections::HashMap;

use crate::errors::{EthosError, Result};
use crate::types::{GoalType, SourceKind};

/// How a goal's current value is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Number of commits since the goal was created.
    CommitCount,
    /// Consecutive days with at least one commit.
    CommitStreak,
    /// Kilometers covered across activities.
    ActivityDistance,
    /// Calories burned across activities.
    ActivityCalories,
    /// Consecutive days with at least one activity.
    ActivityStreak,
    /// Progress is set outside the evaluator.
    Manual,
    /// No automated measurement exists for this pairing.
    Unsupported,
}

impl Strategy {
    /// Provider whose credentials the strategy needs, if any.
    pub fn provider(self) -> Option<SourceKind> {
        match self {
            Strategy::CommitCount | Strategy::CommitStreak => Some(SourceKind::Github),
            Strategy::ActivityDistance | Strategy::ActivityCalories | Strategy::ActivityStreak => {
                Some(SourceKind::Strava)
            }
            Strategy::Manual | Strategy::Unsupported => None,
        }
    }
}

fn standard_strategy(source: SourceKind, metric: GoalType) -> Strategy {
    match (source, metric) {
        (SourceKind::Github, GoalType::Commit) => Strategy::CommitCount,
        (SourceKind::Github, GoalType::Streak) => Strategy::CommitStreak,
        (SourceKind::Strava, GoalType::Distance) => Strategy::ActivityDistance,
        (SourceKind::Strava, GoalType::Calories) => Strategy::ActivityCalories,
        (SourceKind::Strava, GoalType::Streak) => Strategy::ActivityStreak,
        (SourceKind::Manual, _) => Strategy::Manual,
        (SourceKind::Onchain, _) => Strategy::Unsupported,
        (SourceKind::Github, _) | (SourceKind::Strava, _) => Strategy::Unsupported,
    }
}

#[derive(Debug, Clone)]
pub struct StrategyRegistry {
    table: HashMap<(SourceKind, GoalType), Strategy>,
}

impl StrategyRegistry {
    /// Build a registry from explicit entries.
    ///
    /// Every `(source, metric)` pair must be covered; a gap is reported here
    /// rather than surfacing later as a silent skip.
    pub fn new<I>(entries: I) -> Result<Self>
    where
        I: IntoIterator<Item = ((SourceKind, GoalType), Strategy)>,
    {
        let table: HashMap<_, _> = entries.into_iter().collect();

        let missing: Vec<String> = SourceKind::ALL
            .iter()
            .flat_map(|s| GoalType::ALL.iter().map(move |m| (*s, *m)))
            .filter(|pair| !table.contains_key(pair))
            .map(|(s, m)| format!("{s}/{m}"))
            .collect();

        if !missing.is_empty() {
            return Err(EthosError::ConfigError(format!(
                "strategy registry has no entry for: {}",
                missing.join(", ")
            )));
        }

        Ok(Self { table })
    }

    /// The built-in table.
    pub fn standard() -> Self {
        let table = SourceKind::ALL
            .iter()
            .flat_map(|s| GoalType::ALL.iter().map(move |m| (*s, *m)))
            .map(|(s, m)| ((s, m), standard_strategy(s, m)))
            .collect();
        Self { table }
    }

    pub fn lookup(&self, source: SourceKind, metric: GoalType) -> Strategy {
        self.table
            .get(&(source, metric))
            .copied()
            .unwrap_or(Strategy::Unsupported)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_table_dispatches_known_pairs() {
        let reg = StrategyRegistry::standard();
        assert_eq!(reg.lookup(SourceKind::Github, GoalType::Commit), Strategy::CommitCount);
        assert_eq!(reg.lookup(SourceKind::Strava, GoalType::Streak), Strategy::ActivityStreak);
        assert_eq!(reg.lookup(SourceKind::Manual, GoalType::Distance), Strategy::Manual);
        assert_eq!(reg.lookup(SourceKind::Onchain, GoalType::Pnl), Strategy::Unsupported);
        assert_eq!(reg.lookup(SourceKind::Github, GoalType::Calories), Strategy::Unsupported);
    }

    #[test]
    fn incomplete_table_is_rejected() {
        let entries = vec![((SourceKind::Github, GoalType::Commit), Strategy::CommitCount)];
        let err = StrategyRegistry::new(entries).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("strava/distance"), "got: {msg}");
        assert!(!msg.contains("github/commit"), "got: {msg}");
    }

    #[test]
    fn complete_table_is_accepted() {
        let entries = SourceKind::ALL
            .iter()
            .flat_map(|s| GoalType::ALL.iter().map(move |m| ((*s, *m), Strategy::Manual)));
        let reg = StrategyRegistry::new(entries).unwrap();
        assert_eq!(reg.lookup(SourceKind::Github, GoalType::Commit), Strategy::Manual);
    }

    #[test]
    fn provider_follows_strategy() {
        assert_eq!(Strategy::CommitStreak.provider(), Some(SourceKind::Github));
        assert_eq!(Strategy::ActivityCalories.provider(), Some(SourceKind::Strava));
        assert_eq!(Strategy::Manual.provider(), None);
    }
}
