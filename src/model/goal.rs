// src/model/goal.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Category, Currency, GoalStatus, GoalType, SourceKind};

/// A stake-backed commitment with a measurable target and a deadline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Goal {
    /// Store-assigned ID.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub category: Category,
    #[serde(rename = "type")]
    pub goal_type: GoalType,
    pub target_value: f64,
    #[serde(default)]
    pub current_value: f64,
    /// Staked amount, in `currency`.
    #[serde(default)]
    pub lock_amount: f64,
    #[serde(default)]
    pub currency: Currency,
    pub deadline: DateTime<Utc>,
    /// Owner's wallet address, lower-cased.
    pub user_address: String,
    #[serde(default)]
    pub contract_address: String,
    /// Transaction that created the goal contract.
    #[serde(default)]
    pub tx_hash: String,
    pub status: GoalStatus,
    #[serde(default)]
    pub data_source: DataSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_result: Option<VerificationResult>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Goal {
    pub fn is_active(&self) -> bool {
        self.status == GoalStatus::Active
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.deadline
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    #[serde(rename = "type")]
    pub kind: SourceKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Outcome recorded when a goal leaves the `active` state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationResult {
    pub achieved: bool,
    pub actual_value: f64,
    pub verified_at: DateTime<Utc>,
    /// Settlement transaction; empty while settlement is outstanding.
    #[serde(default)]
    pub tx_hash: String,
    pub verification_method: String,
}

/// Verification method recorded when the deadline passes first.
pub const DEADLINE_EXPIRED: &str = "deadline_expired";

impl VerificationResult {
    pub fn expired(actual_value: f64, at: DateTime<Utc>) -> Self {
        Self {
            achieved: false,
            actual_value,
            verified_at: at,
            tx_hash: String::new(),
            verification_method: DEADLINE_EXPIRED.to_string(),
        }
    }

    /// Target met; `tx_hash` stays empty until settlement confirms.
    pub fn achieved(actual_value: f64, at: DateTime<Utc>, method: &str, tx_hash: Option<String>) -> Self {
        Self {
            achieved: true,
            actual_value,
            verified_at: at,
            tx_hash: tx_hash.unwrap_or_default(),
            verification_method: method.to_string(),
        }
    }
}
