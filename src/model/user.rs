// src/model/user.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::SourceKind;

/// User profile keyed by lower-cased wallet address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EthosUser {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    pub wallet_address: String,
    #[serde(default)]
    pub profile: Profile,
    #[serde(default)]
    pub connected_accounts: ConnectedAccounts,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl EthosUser {
    /// The connected account for a provider, only if it is marked active.
    pub fn active_account(&self, source: SourceKind) -> Option<&ConnectedAccount> {
        let account = match source {
            SourceKind::Github => self.connected_accounts.github.as_ref(),
            SourceKind::Strava => self.connected_accounts.strava.as_ref(),
            SourceKind::Onchain | SourceKind::Manual => None,
        };
        account.filter(|a| a.is_active)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConnectedAccounts {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub github: Option<ConnectedAccount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strava: Option<ConnectedAccount>,
}

/// OAuth connection to a data provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectedAccount {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub athlete_id: Option<String>,
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_sync_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_active: bool,
}
