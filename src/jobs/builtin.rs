// src/jobs/builtin.rs

//! The jobs Ethos registers at startup.

use std::sync::Arc;

use chrono::Duration;
use serde_json::json;
use tracing::{info, warn};

use crate::evaluator::ProgressEvaluator;
use crate::model::{GOALS, Goal, VERIFICATION_LOGS};
use crate::store::{Gateway, Query};
use crate::sweeper::DeadlineSweeper;
use crate::types::GoalStatus;

use super::orchestrator::JobSpec;
use super::task::JobTask;

pub const PROGRESS_SWEEP: &str = "progress-sweep";
pub const DEADLINE_SWEEP: &str = "deadline-sweep";
pub const TOKEN_CLEANUP: &str = "token-cleanup";
pub const HEALTH_CHECK: &str = "health-check";
pub const SETTLEMENT_RETRY: &str = "settlement-retry";

/// Default schedule, daily flag and enabled flag for a built-in job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobDefaults {
    pub name: &'static str,
    pub schedule: &'static str,
    pub daily: bool,
    pub enabled: bool,
}

pub const BUILTIN_JOBS: [JobDefaults; 5] = [
    JobDefaults {
        name: PROGRESS_SWEEP,
        schedule: "0 0 * * *",
        daily: true,
        enabled: true,
    },
    JobDefaults {
        name: DEADLINE_SWEEP,
        schedule: "0 */6 * * *",
        daily: false,
        enabled: true,
    },
    JobDefaults {
        name: TOKEN_CLEANUP,
        schedule: "0 2 * * *",
        daily: true,
        enabled: true,
    },
    JobDefaults {
        name: HEALTH_CHECK,
        schedule: "*/15 * * * *",
        daily: false,
        enabled: true,
    },
    JobDefaults {
        name: SETTLEMENT_RETRY,
        schedule: "30 * * * *",
        daily: false,
        enabled: false,
    },
];

pub fn defaults_for(name: &str) -> Option<JobDefaults> {
    BUILTIN_JOBS.iter().copied().find(|d| d.name == name)
}

/// Services the built-in tasks operate on.
#[derive(Debug, Clone)]
pub struct JobContext {
    pub gateway: Gateway,
    pub evaluator: ProgressEvaluator,
    pub sweeper: DeadlineSweeper,
}

/// Task for a built-in job name.
pub fn task_for(name: &str, ctx: &JobContext) -> Option<Arc<dyn JobTask>> {
    let task: Arc<dyn JobTask> = match name {
        PROGRESS_SWEEP => Arc::new(progress_sweep(ctx.clone())),
        DEADLINE_SWEEP => Arc::new(deadline_sweep(ctx.sweeper.clone())),
        TOKEN_CLEANUP => Arc::new(token_cleanup(ctx.evaluator.clone())),
        HEALTH_CHECK => Arc::new(health_check(ctx.gateway.clone())),
        SETTLEMENT_RETRY => Arc::new(settlement_retry(ctx.evaluator.clone())),
        _ => return None,
    };
    Some(task)
}

/// Build a [`JobSpec`] for a built-in job with the given schedule and flags.
pub fn builtin_spec(
    defaults: JobDefaults,
    schedule: &str,
    enabled: bool,
    daily: bool,
    ctx: &JobContext,
) -> Option<JobSpec> {
    let task = task_for(defaults.name, ctx)?;
    Some(JobSpec {
        name: defaults.name.to_string(),
        schedule: schedule.to_string(),
        enabled,
        daily,
        task,
    })
}

fn progress_sweep(ctx: JobContext) -> impl JobTask {
    move || run_progress_sweep(ctx.clone())
}

async fn run_progress_sweep(ctx: JobContext) -> anyhow::Result<()> {
    let active = Query::new().eq("status", GoalStatus::Active.as_str());
    let total = ctx.gateway.query::<Goal>(GOALS, &active).await?.len();

    let results = match ctx.evaluator.update_all_active_goals().await {
        Ok(results) => results,
        Err(e) => {
            let logged = ctx
                .gateway
                .create(
                    VERIFICATION_LOGS,
                    None,
                    &json!({
                        "type": "progress_sweep_error",
                        "error": e.to_string(),
                        "status": "error",
                    }),
                )
                .await;
            if let Err(log_err) = logged {
                warn!(error = %log_err, "could not record progress sweep failure");
            }
            return Err(e.into());
        }
    };

    let completed = results.iter().filter(|r| r.is_completed).count();
    let status = if results.len() == total { "success" } else { "partial_success" };
    ctx.gateway
        .create(
            VERIFICATION_LOGS,
            None,
            &json!({
                "type": "progress_sweep_summary",
                "totalGoals": total,
                "updated": results.len(),
                "completed": completed,
                "status": status,
            }),
        )
        .await?;

    info!(total, updated = results.len(), completed, "progress sweep finished");
    Ok(())
}

fn deadline_sweep(sweeper: DeadlineSweeper) -> impl JobTask {
    move || run_deadline_sweep(sweeper.clone())
}

async fn run_deadline_sweep(sweeper: DeadlineSweeper) -> anyhow::Result<()> {
    let outcomes = sweeper.check_expired_goals().await?;
    let failed = outcomes.iter().filter(|o| !o.succeeded()).count();
    if failed > 0 {
        warn!(failed, "some expired goals could not be updated");
    }

    if let Err(e) = sweeper.check_upcoming_deadlines().await {
        warn!(error = %e, "upcoming deadline check failed");
    }
    Ok(())
}

fn token_cleanup(evaluator: ProgressEvaluator) -> impl JobTask {
    move || run_token_cleanup(evaluator.clone())
}

async fn run_token_cleanup(evaluator: ProgressEvaluator) -> anyhow::Result<()> {
    let report = evaluator.refresh_expiring_tokens(Duration::hours(24)).await?;
    info!(
        checked = report.checked,
        refreshed = report.refreshed,
        deactivated = report.deactivated,
        failed = report.failed,
        "token cleanup finished"
    );
    Ok(())
}

fn health_check(gateway: Gateway) -> impl JobTask {
    move || run_health_check(gateway.clone())
}

async fn run_health_check(gateway: Gateway) -> anyhow::Result<()> {
    let active = Query::new().eq("status", GoalStatus::Active.as_str());
    let goals: Vec<Goal> = gateway.query(GOALS, &active).await?;
    info!(active_goals = goals.len(), "health check ok");
    Ok(())
}

fn settlement_retry(evaluator: ProgressEvaluator) -> impl JobTask {
    move || run_settlement_retry(evaluator.clone())
}

async fn run_settlement_retry(evaluator: ProgressEvaluator) -> anyhow::Result<()> {
    let settled = evaluator.retry_pending_settlements().await?;
    info!(settled = settled.len(), "settlement retry finished");
    Ok(())
}
