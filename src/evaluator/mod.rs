// src/evaluator/mod.rs

//! Progress evaluation for single goals and batches of goals.
//!
//! One evaluation:
//! 1. loads the goal and checks it is still `active`
//! 2. fails it if the deadline has passed
//! 3. measures the current value using the strategy registered for its
//!    `(dataSource.type, type)` pair
//! 4. writes the new value and, if the target is met, settles on-chain
//!
//! Ineligible goals produce [`ProgressOutcome::Skipped`]; only upstream
//! failures (store, provider, malformed records) are errors. Batch variants
//! visit goals one at a time and never abort on a single goal's error.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde_json::json;
use tracing::{debug, error, info, warn};

use crate::errors::{EthosError, Result};
use crate::fetchers::{self, Fetchers};
use crate::ledger::{self, Ledger};
use crate::model::{GOALS, Goal, VerificationResult};
use crate::store::{Gateway, Query};
use crate::types::{GoalStatus, GoalType, SourceKind};

pub mod credentials;
pub mod registry;

pub use credentials::{Credential, TokenCleanupReport};
pub use registry::{Strategy, StrategyRegistry};

/// Tunables for the evaluator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorSettings {
    /// Minimum age of `updatedAt` before an on-demand refresh re-evaluates a goal.
    pub cooldown: Duration,
    /// Activity tokens expiring sooner than this are refreshed before use.
    pub token_refresh_window: Duration,
}

impl Default for EvaluatorSettings {
    fn default() -> Self {
        Self {
            cooldown: Duration::minutes(30),
            token_refresh_window: Duration::hours(1),
        }
    }
}

/// Why an evaluation did nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    NotActive(GoalStatus),
    /// The deadline had passed; the goal was moved to `failed`.
    Expired,
    ManualSource,
    Unsupported { source: SourceKind, metric: GoalType },
    NoConnectedAccount(SourceKind),
}

/// Result of a successful evaluation.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub goal_id: String,
    pub previous_value: f64,
    pub new_value: f64,
    pub target_value: f64,
    pub is_completed: bool,
    /// Status after the evaluation (`active`, `completed` or `pending_verification`).
    pub status: GoalStatus,
    pub data_source: SourceKind,
    pub last_updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressOutcome {
    Updated(ProgressUpdate),
    Skipped(SkipReason),
}

impl ProgressOutcome {
    pub fn updated(self) -> Option<ProgressUpdate> {
        match self {
            ProgressOutcome::Updated(update) => Some(update),
            ProgressOutcome::Skipped(_) => None,
        }
    }
}

/// Result of an on-demand refresh of one user's goals.
#[derive(Debug, Clone, PartialEq)]
pub struct OnDemandSummary {
    /// Active goals owned by the user.
    pub total_goals: usize,
    /// Goals that were past the cooldown and updated successfully.
    pub updated: usize,
    pub results: Vec<ProgressUpdate>,
}

/// A parked goal whose settlement went through on retry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettlementRetry {
    pub goal_id: String,
    pub tx_hash: String,
}

#[derive(Debug, Clone)]
pub struct ProgressEvaluator {
    gateway: Gateway,
    fetchers: Fetchers,
    ledger: Arc<dyn Ledger>,
    registry: StrategyRegistry,
    settings: EvaluatorSettings,
}

impl ProgressEvaluator {
    pub fn new(
        gateway: Gateway,
        fetchers: Fetchers,
        ledger: Arc<dyn Ledger>,
        registry: StrategyRegistry,
        settings: EvaluatorSettings,
    ) -> Self {
        Self {
            gateway,
            fetchers,
            ledger,
            registry,
            settings,
        }
    }

    pub fn gateway(&self) -> &Gateway {
        &self.gateway
    }

    pub fn fetchers(&self) -> &Fetchers {
        &self.fetchers
    }

    pub fn settings(&self) -> EvaluatorSettings {
        self.settings
    }

    fn now(&self) -> DateTime<Utc> {
        self.gateway.clock().now()
    }

    /// Bring one goal up to date.
    pub async fn update_goal_progress(&self, goal_id: &str) -> Result<ProgressOutcome> {
        let goal: Goal = self
            .gateway
            .get(GOALS, goal_id)
            .await?
            .ok_or_else(|| EthosError::GoalNotFound(goal_id.to_string()))?;

        if !goal.is_active() {
            debug!(goal_id, status = %goal.status, "goal not active, skipping");
            return Ok(ProgressOutcome::Skipped(SkipReason::NotActive(goal.status)));
        }

        let now = self.now();
        if goal.is_expired(now) {
            info!(goal_id, deadline = %goal.deadline, "goal expired, marking failed");
            self.mark_expired(&goal, now).await?;
            return Ok(ProgressOutcome::Skipped(SkipReason::Expired));
        }

        let source = goal.data_source.kind;
        let strategy = self.registry.lookup(source, goal.goal_type);
        let measured = match self.measure(&goal, strategy, now).await? {
            Measurement::Value(v) => v,
            Measurement::Skip(reason) => return Ok(ProgressOutcome::Skipped(reason)),
        };

        let previous_value = goal.current_value;
        let new_value = previous_value.max(measured);
        self.gateway
            .update(GOALS, &goal.id, json!({ "currentValue": new_value }))
            .await?;

        let is_completed = new_value >= goal.target_value;
        let status = if is_completed {
            self.settle(&goal, new_value, now).await?
        } else {
            GoalStatus::Active
        };

        info!(
            goal_id,
            previous = previous_value,
            new = new_value,
            target = goal.target_value,
            status = %status,
            "goal progress updated"
        );

        Ok(ProgressOutcome::Updated(ProgressUpdate {
            goal_id: goal.id,
            previous_value,
            new_value,
            target_value: goal.target_value,
            is_completed,
            status,
            data_source: source,
            last_updated: now,
        }))
    }

    async fn measure(&self, goal: &Goal, strategy: Strategy, now: DateTime<Utc>) -> Result<Measurement> {
        let Some(provider) = strategy.provider() else {
            let reason = match strategy {
                Strategy::Manual => SkipReason::ManualSource,
                _ => SkipReason::Unsupported {
                    source: goal.data_source.kind,
                    metric: goal.goal_type,
                },
            };
            debug!(goal_id = %goal.id, ?reason, "no automated measurement");
            return Ok(Measurement::Skip(reason));
        };

        let credential = credentials::resolve(
            &self.gateway,
            self.fetchers.activities.as_ref(),
            &goal.user_address,
            provider,
            self.settings.token_refresh_window,
        )
        .await?;
        let Some(credential) = credential else {
            warn!(goal_id = %goal.id, user = %goal.user_address, provider = %provider, "no connected account, skipping");
            return Ok(Measurement::Skip(SkipReason::NoConnectedAccount(provider)));
        };

        let since = goal.created_at;
        let value = match provider {
            SourceKind::Github => {
                let Some(username) = credential.username.as_deref() else {
                    return Ok(Measurement::Skip(SkipReason::NoConnectedAccount(provider)));
                };
                let commits = self
                    .fetchers
                    .commits
                    .commits_since(username, credential.access_token.as_deref(), since, now)
                    .await?;
                match strategy {
                    Strategy::CommitCount => commits.len() as f64,
                    _ => f64::from(fetchers::streak_days(commits.iter().map(|c| c.date), since, now)),
                }
            }
            SourceKind::Strava => {
                let Some(token) = credential.access_token.as_deref() else {
                    return Ok(Measurement::Skip(SkipReason::NoConnectedAccount(provider)));
                };
                let activities = self.fetchers.activities.activities(token, since, now).await?;
                match strategy {
                    Strategy::ActivityDistance => fetchers::total_distance_km(&activities),
                    Strategy::ActivityCalories => fetchers::total_calories(&activities),
                    _ => f64::from(fetchers::streak_days(
                        activities.iter().map(|a| a.start_date),
                        since,
                        now,
                    )),
                }
            }
            SourceKind::Onchain | SourceKind::Manual => {
                return Ok(Measurement::Skip(SkipReason::Unsupported {
                    source: goal.data_source.kind,
                    metric: goal.goal_type,
                }));
            }
        };

        Ok(Measurement::Value(value))
    }

    /// Attempt settlement for a goal that met its target and record the
    /// resulting status.
    async fn settle(&self, goal: &Goal, value: f64, now: DateTime<Utc>) -> Result<GoalStatus> {
        let method = goal.data_source.kind.as_str();
        let (status, tx_hash) = match self
            .ledger
            .settle(&goal.contract_address, ledger::score_for(value))
            .await
        {
            Ok(hash) => (GoalStatus::Completed, Some(hash)),
            Err(e) => {
                warn!(goal_id = %goal.id, error = %e, "settlement failed, parking goal for verification");
                (GoalStatus::PendingVerification, None)
            }
        };

        let result = VerificationResult::achieved(value, now, method, tx_hash);
        self.gateway
            .update(
                GOALS,
                &goal.id,
                json!({ "status": status, "verificationResult": result }),
            )
            .await?;
        Ok(status)
    }

    async fn mark_expired(&self, goal: &Goal, now: DateTime<Utc>) -> Result<()> {
        let result = VerificationResult::expired(goal.current_value, now);
        self.gateway
            .update(
                GOALS,
                &goal.id,
                json!({ "status": GoalStatus::Failed, "verificationResult": result }),
            )
            .await
    }

    /// Evaluate goals sequentially, keeping the successful updates.
    async fn run_batch(&self, label: &str, goals: Vec<Goal>) -> Vec<ProgressUpdate> {
        let total = goals.len();
        let mut results = Vec::new();

        for goal in goals {
            match self.update_goal_progress(&goal.id).await {
                Ok(ProgressOutcome::Updated(update)) => results.push(update),
                Ok(ProgressOutcome::Skipped(reason)) => {
                    debug!(goal_id = %goal.id, ?reason, "goal skipped");
                }
                Err(e) => {
                    error!(batch = label, goal_id = %goal.id, error = %e, "goal update failed");
                }
            }
        }

        info!(batch = label, total, updated = results.len(), "batch progress update finished");
        results
    }

    fn active_goals() -> Query {
        Query::new().eq("status", GoalStatus::Active.as_str())
    }

    pub async fn update_all_active_goals(&self) -> Result<Vec<ProgressUpdate>> {
        let goals: Vec<Goal> = self.gateway.query(GOALS, &Self::active_goals()).await?;
        info!(count = goals.len(), "updating all active goals");
        Ok(self.run_batch("all", goals).await)
    }

    pub async fn update_user_goals(&self, address: &str) -> Result<Vec<ProgressUpdate>> {
        let goals = self.user_active_goals(address).await?;
        Ok(self.run_batch("user", goals).await)
    }

    pub async fn update_goals_by_source(&self, source: SourceKind) -> Result<Vec<ProgressUpdate>> {
        let query = Self::active_goals().eq("dataSource.type", source.as_str());
        let goals: Vec<Goal> = self.gateway.query(GOALS, &query).await?;
        info!(source = %source, count = goals.len(), "updating goals by source");
        Ok(self.run_batch(source.as_str(), goals).await)
    }

    /// Refresh a user's goals, skipping those updated within the cooldown.
    pub async fn update_user_goals_on_demand(&self, address: &str) -> Result<OnDemandSummary> {
        let goals = self.user_active_goals(address).await?;
        let total_goals = goals.len();
        let now = self.now();

        let due: Vec<Goal> = goals
            .into_iter()
            .filter(|g| now - g.updated_at > self.settings.cooldown)
            .collect();
        debug!(address, due = due.len(), total_goals, "on-demand refresh");

        let results = if due.is_empty() {
            Vec::new()
        } else {
            self.run_batch("on-demand", due).await
        };

        Ok(OnDemandSummary {
            total_goals,
            updated: results.len(),
            results,
        })
    }

    async fn user_active_goals(&self, address: &str) -> Result<Vec<Goal>> {
        let query = Self::active_goals().eq("userAddress", address.to_lowercase());
        self.gateway.query(GOALS, &query).await
    }

    /// Re-attempt settlement for every goal parked in `pending_verification`.
    pub async fn retry_pending_settlements(&self) -> Result<Vec<SettlementRetry>> {
        let query = Query::new().eq("status", GoalStatus::PendingVerification.as_str());
        let goals: Vec<Goal> = self.gateway.query(GOALS, &query).await?;
        let now = self.now();

        let mut settled = Vec::new();
        for goal in goals {
            let score = ledger::score_for(goal.current_value);
            match self.ledger.settle(&goal.contract_address, score).await {
                Ok(tx_hash) => {
                    let result = VerificationResult::achieved(
                        goal.current_value,
                        now,
                        goal.data_source.kind.as_str(),
                        Some(tx_hash.clone()),
                    );
                    let patch = json!({ "status": GoalStatus::Completed, "verificationResult": result });
                    if let Err(e) = self.gateway.update(GOALS, &goal.id, patch).await {
                        error!(goal_id = %goal.id, tx_hash = %tx_hash, error = %e, "settled but failed to record");
                        continue;
                    }
                    info!(goal_id = %goal.id, tx_hash = %tx_hash, "pending settlement completed");
                    settled.push(SettlementRetry {
                        goal_id: goal.id,
                        tx_hash,
                    });
                }
                Err(e) => warn!(goal_id = %goal.id, error = %e, "settlement retry failed"),
            }
        }
        Ok(settled)
    }

    /// Refresh expiring activity tokens across all users.
    pub async fn refresh_expiring_tokens(&self, window: Duration) -> Result<TokenCleanupReport> {
        credentials::refresh_expiring_tokens(&self.gateway, self.fetchers.activities.as_ref(), window).await
    }
}

enum Measurement {
    Value(f64),
    Skip(SkipReason),
}
