// src/types.rs

//! Small shared enums used across the goal model, evaluator and config.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a goal.
///
/// `Completed`, `Failed` and `Cancelled` are terminal. `PendingVerification`
/// means the target was met but on-chain settlement is still outstanding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GoalStatus {
    Active,
    Completed,
    Failed,
    PendingVerification,
    Cancelled,
}

impl GoalStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            GoalStatus::Active => "active",
            GoalStatus::Completed => "completed",
            GoalStatus::Failed => "failed",
            GoalStatus::PendingVerification => "pending_verification",
            GoalStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            GoalStatus::Completed | GoalStatus::Failed | GoalStatus::Cancelled
        )
    }
}

impl fmt::Display for GoalStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The metric a goal is measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Commit,
    Streak,
    Distance,
    Calories,
    Volume,
    Pnl,
}

impl GoalType {
    pub const ALL: [GoalType; 6] = [
        GoalType::Commit,
        GoalType::Streak,
        GoalType::Distance,
        GoalType::Calories,
        GoalType::Volume,
        GoalType::Pnl,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            GoalType::Commit => "commit",
            GoalType::Streak => "streak",
            GoalType::Distance => "distance",
            GoalType::Calories => "calories",
            GoalType::Volume => "volume",
            GoalType::Pnl => "pnl",
        }
    }
}

impl fmt::Display for GoalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a goal's progress data comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Github,
    Strava,
    Onchain,
    #[default]
    Manual,
}

impl SourceKind {
    pub const ALL: [SourceKind; 4] = [
        SourceKind::Github,
        SourceKind::Strava,
        SourceKind::Onchain,
        SourceKind::Manual,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SourceKind::Github => "github",
            SourceKind::Strava => "strava",
            SourceKind::Onchain => "onchain",
            SourceKind::Manual => "manual",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "github" => Ok(SourceKind::Github),
            "strava" => Ok(SourceKind::Strava),
            "onchain" => Ok(SourceKind::Onchain),
            "manual" => Ok(SourceKind::Manual),
            other => Err(format!(
                "invalid data source: {other} (expected github, strava, onchain or manual)"
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Fitness,
    Productivity,
    Onchain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum Currency {
    #[default]
    Eth,
    Usdc,
}

/// Backend used by the document store gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    /// Ephemeral, process-lifetime store.
    #[default]
    Memory,
    /// One JSON file per collection under `[store].path`.
    File,
}
