// src/evaluator/credentials.rs

//! Resolving and refreshing provider credentials stored on user profiles.

use chrono::{DateTime, Duration, Utc};
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::errors::Result;
use crate::fetchers::ActivityHistory;
use crate::model::{ConnectedAccount, EthosUser, USERS};
use crate::store::{Gateway, Query};
use crate::types::SourceKind;

/// What a fetcher needs to act on behalf of a user.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub username: Option<String>,
    pub access_token: Option<String>,
}

/// Load a user profile by wallet address (case-insensitive).
pub async fn find_user(gateway: &Gateway, address: &str) -> Result<Option<EthosUser>> {
    let query = Query::new()
        .eq("walletAddress", address.to_lowercase())
        .limit(1);
    let mut users: Vec<EthosUser> = gateway.query(USERS, &query).await?;
    Ok(users.pop())
}

/// Credentials for `source` on the user's active connection.
///
/// Returns `None` when the user has no usable connection. Activity tokens
/// expiring within `refresh_window` are exchanged first and the new token
/// triple is persisted before it is returned.
pub async fn resolve(
    gateway: &Gateway,
    activities: &dyn ActivityHistory,
    address: &str,
    source: SourceKind,
    refresh_window: Duration,
) -> Result<Option<Credential>> {
    let Some(user) = find_user(gateway, address).await? else {
        debug!(address, "no profile for goal owner");
        return Ok(None);
    };
    let Some(account) = user.active_account(source) else {
        return Ok(None);
    };

    match source {
        SourceKind::Github => Ok(account.username.clone().map(|username| Credential {
            username: Some(username),
            access_token: account.access_token.clone(),
        })),
        SourceKind::Strava => {
            let Some(token) = account.access_token.clone() else {
                return Ok(None);
            };
            let now = gateway.clock().now();
            let token = if expires_within(account, now, refresh_window) {
                refresh_activity_token(gateway, activities, &user.id, account)
                    .await?
                    .unwrap_or(token)
            } else {
                token
            };
            Ok(Some(Credential {
                username: account.username.clone(),
                access_token: Some(token),
            }))
        }
        SourceKind::Onchain | SourceKind::Manual => Ok(None),
    }
}

fn expires_within(account: &ConnectedAccount, now: DateTime<Utc>, window: Duration) -> bool {
    account
        .expires_at
        .is_some_and(|expires_at| expires_at - now <= window)
}

/// Exchange the account's refresh token and persist the result.
///
/// Returns the new access token, or `None` when no refresh token is stored.
async fn refresh_activity_token(
    gateway: &Gateway,
    activities: &dyn ActivityHistory,
    user_id: &str,
    account: &ConnectedAccount,
) -> Result<Option<String>> {
    let Some(refresh_token) = account.refresh_token.as_deref() else {
        warn!(user = %user_id, "activity token near expiry but no refresh token stored");
        return Ok(None);
    };

    let grant = activities.refresh_token(refresh_token).await?;
    gateway
        .update(
            USERS,
            user_id,
            json!({
                "connectedAccounts.strava.accessToken": grant.access_token,
                "connectedAccounts.strava.refreshToken": grant.refresh_token,
                "connectedAccounts.strava.expiresAt": grant.expires_at,
            }),
        )
        .await?;

    info!(user = %user_id, expires_at = %grant.expires_at, "refreshed activity token");
    Ok(Some(grant.access_token))
}

/// Counts from one token-maintenance pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TokenCleanupReport {
    pub checked: usize,
    pub refreshed: usize,
    pub deactivated: usize,
    pub failed: usize,
}

/// Refresh activity tokens that expire within `window`, and deactivate
/// connections whose token has already expired and cannot be refreshed.
pub async fn refresh_expiring_tokens(
    gateway: &Gateway,
    activities: &dyn ActivityHistory,
    window: Duration,
) -> Result<TokenCleanupReport> {
    let query = Query::new().eq("connectedAccounts.strava.isActive", true);
    let users: Vec<EthosUser> = gateway.query(USERS, &query).await?;
    let now = gateway.clock().now();

    let mut report = TokenCleanupReport::default();
    for user in users {
        let Some(account) = user.active_account(SourceKind::Strava) else {
            continue;
        };
        report.checked += 1;
        if !expires_within(account, now, window) {
            continue;
        }

        let expired = account.expires_at.is_some_and(|at| at <= now);
        match refresh_activity_token(gateway, activities, &user.id, account).await {
            Ok(Some(_)) => report.refreshed += 1,
            Ok(None) if !expired => {}
            Err(e) if !expired => {
                warn!(user = %user.id, error = %e, "token refresh failed");
                report.failed += 1;
            }
            outcome => {
                if let Err(e) = outcome {
                    warn!(user = %user.id, error = %e, "expired token could not be refreshed");
                }
                deactivate(gateway, &user.id).await?;
                report.deactivated += 1;
            }
        }
    }

    Ok(report)
}

async fn deactivate(gateway: &Gateway, user_id: &str) -> Result<()> {
    warn!(user = %user_id, "deactivating expired activity connection");
    gateway
        .update(
            USERS,
            user_id,
            json!({ "connectedAccounts.strava.isActive": Value::Bool(false) }),
        )
        .await
}
