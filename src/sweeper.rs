// src/sweeper.rs

//! Deadline sweeps over active goals.

use chrono::{Duration, SecondsFormat};
use serde_json::json;
use tracing::{debug, error, info};

use crate::errors::Result;
use crate::evaluator::{ProgressEvaluator, ProgressOutcome, ProgressUpdate};
use crate::model::{GOALS, Goal, VerificationResult};
use crate::store::{Direction, Gateway, Query};
use crate::types::GoalStatus;

/// Per-goal result of an expiry sweep.
#[derive(Debug, Clone, PartialEq)]
pub struct DeadlineOutcome {
    pub goal_id: String,
    pub title: String,
    pub current_value: f64,
    pub target_value: f64,
    /// Set when the goal could not be transitioned.
    pub error: Option<String>,
}

impl DeadlineOutcome {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Goals due within the look-ahead window.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpcomingDeadlines {
    pub goal_ids: Vec<String>,
    /// Progress refreshed ahead of the deadline, when enabled.
    pub refreshed: Vec<ProgressUpdate>,
}

#[derive(Debug, Clone)]
pub struct DeadlineSweeper {
    gateway: Gateway,
    evaluator: Option<ProgressEvaluator>,
    upcoming_window: Duration,
}

impl DeadlineSweeper {
    pub fn new(gateway: Gateway, upcoming_window: Duration) -> Self {
        Self {
            gateway,
            evaluator: None,
            upcoming_window,
        }
    }

    /// Refresh progress for goals found by [`check_upcoming_deadlines`](Self::check_upcoming_deadlines).
    pub fn with_refresh(mut self, evaluator: ProgressEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    /// Fail every active goal whose deadline has passed.
    ///
    /// Each goal is updated independently; one failed write is recorded in
    /// its outcome and does not stop the sweep.
    pub async fn check_expired_goals(&self) -> Result<Vec<DeadlineOutcome>> {
        let now = self.gateway.clock().now();
        let query = Query::new()
            .eq("status", GoalStatus::Active.as_str())
            .lt("deadline", now.to_rfc3339_opts(SecondsFormat::Millis, true))
            .order_by("deadline", Direction::Asc);
        let expired: Vec<Goal> = self.gateway.query(GOALS, &query).await?;

        if expired.is_empty() {
            debug!("no expired goals");
            return Ok(Vec::new());
        }
        info!(count = expired.len(), "failing expired goals");

        let mut outcomes = Vec::with_capacity(expired.len());
        for goal in expired {
            let result = VerificationResult::expired(goal.current_value, now);
            let patch = json!({ "status": GoalStatus::Failed, "verificationResult": result });
            let error = match self.gateway.update(GOALS, &goal.id, patch).await {
                Ok(()) => {
                    info!(goal_id = %goal.id, current = goal.current_value, target = goal.target_value, "goal failed: deadline passed");
                    None
                }
                Err(e) => {
                    error!(goal_id = %goal.id, error = %e, "could not fail expired goal");
                    Some(e.to_string())
                }
            };
            outcomes.push(DeadlineOutcome {
                goal_id: goal.id,
                title: goal.title,
                current_value: goal.current_value,
                target_value: goal.target_value,
                error,
            });
        }

        let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
        info!(marked = outcomes.len() - failed, errors = failed, "deadline sweep finished");
        Ok(outcomes)
    }

    /// List active goals due within the look-ahead window.
    ///
    /// Never changes a goal's status. With a refresh evaluator attached, each
    /// goal also gets a final progress update.
    pub async fn check_upcoming_deadlines(&self) -> Result<UpcomingDeadlines> {
        let now = self.gateway.clock().now();
        let horizon = now + self.upcoming_window;
        let query = Query::new()
            .eq("status", GoalStatus::Active.as_str())
            .gt("deadline", now.to_rfc3339_opts(SecondsFormat::Millis, true))
            .lte("deadline", horizon.to_rfc3339_opts(SecondsFormat::Millis, true))
            .order_by("deadline", Direction::Asc);
        let upcoming: Vec<Goal> = self.gateway.query(GOALS, &query).await?;
        info!(count = upcoming.len(), hours = self.upcoming_window.num_hours(), "goals due soon");

        let mut report = UpcomingDeadlines {
            goal_ids: upcoming.iter().map(|g| g.id.clone()).collect(),
            refreshed: Vec::new(),
        };

        if let Some(evaluator) = &self.evaluator {
            for goal in &upcoming {
                match evaluator.update_goal_progress(&goal.id).await {
                    Ok(ProgressOutcome::Updated(update)) => report.refreshed.push(update),
                    Ok(ProgressOutcome::Skipped(reason)) => {
                        debug!(goal_id = %goal.id, ?reason, "upcoming goal not refreshed");
                    }
                    Err(e) => error!(goal_id = %goal.id, error = %e, "refreshing upcoming goal failed"),
                }
            }
        }

        Ok(report)
    }
}
