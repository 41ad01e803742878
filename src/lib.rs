// src/lib.rs

pub mod cli;
pub mod clock;
pub mod config;
pub mod errors;
pub mod evaluator;
pub mod fetchers;
pub mod jobs;
pub mod ledger;
pub mod logging;
pub mod model;
pub mod store;
pub mod sweeper;
pub mod types;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::clock::{Clock, SystemClock};
use crate::config::loader::load_and_validate;
use crate::config::model::ConfigFile;
use crate::errors::EthosError;
use crate::evaluator::{ProgressEvaluator, StrategyRegistry};
use crate::fetchers::{Fetchers, GitHubClient, StravaClient};
use crate::jobs::builtin::{JobContext, builtin_spec, defaults_for};
use crate::jobs::{Orchestrator, OrchestratorSettings, StoreExecutionLog};
use crate::ledger::{Ledger, RpcLedger, UnconfiguredLedger};
use crate::store::{DocumentStore, Gateway, JsonFileStore, MemoryStore};
use crate::sweeper::DeadlineSweeper;
use crate::types::StoreBackend;

/// Everything the jobs need, wired from one validated config.
#[derive(Debug, Clone)]
pub struct Services {
    pub gateway: Gateway,
    pub evaluator: ProgressEvaluator,
    pub sweeper: DeadlineSweeper,
    pub orchestrator: Orchestrator,
}

impl Services {
    pub fn job_context(&self) -> JobContext {
        JobContext {
            gateway: self.gateway.clone(),
            evaluator: self.evaluator.clone(),
            sweeper: self.sweeper.clone(),
        }
    }
}

/// Build the store, provider clients, ledger, evaluator, sweeper and an
/// empty orchestrator from `cfg`.
pub fn build_services(cfg: &ConfigFile, clock: Arc<dyn Clock>) -> errors::Result<Services> {
    let backend: Arc<dyn DocumentStore> = match cfg.store.backend {
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::File => {
            let path = cfg.store.path.clone().ok_or_else(|| {
                EthosError::ConfigError("[store].path is required for the file backend".into())
            })?;
            Arc::new(JsonFileStore::new(path))
        }
    };
    let gateway = Gateway::new(backend, clock.clone());

    if cfg.strava.client_id.is_none() || cfg.strava.client_secret.is_none() {
        warn!("strava client credentials are not configured; token refresh will fail");
    }
    let fetchers = Fetchers {
        commits: Arc::new(GitHubClient::new(
            cfg.github.base_url.clone(),
            cfg.github.token.clone(),
        )?),
        activities: Arc::new(StravaClient::new(
            cfg.strava.base_url.clone(),
            cfg.strava.token_url.clone(),
            cfg.strava.client_id.clone().unwrap_or_default(),
            cfg.strava.client_secret.clone().unwrap_or_default(),
        )?),
    };

    let ledger: Arc<dyn Ledger> = match &cfg.ledger {
        Some(section) => Arc::new(RpcLedger::new(
            section.rpc_url.clone(),
            section.from.clone(),
            Duration::from_millis(section.confirmation_poll_ms),
            section.confirmation_attempts,
        )?),
        None => {
            warn!("no [ledger] configured; completed goals will park in pending_verification");
            Arc::new(UnconfiguredLedger)
        }
    };

    let evaluator = ProgressEvaluator::new(
        gateway.clone(),
        fetchers,
        ledger,
        StrategyRegistry::standard(),
        cfg.evaluator.settings,
    );

    let mut sweeper = DeadlineSweeper::new(gateway.clone(), cfg.evaluator.upcoming_window);
    if cfg.evaluator.refresh_upcoming {
        sweeper = sweeper.with_refresh(evaluator.clone());
    }

    let orchestrator = Orchestrator::new(
        clock,
        Arc::new(StoreExecutionLog::new(gateway.clone())),
        OrchestratorSettings {
            timezone: cfg.scheduler.timezone,
            drain_timeout: cfg.scheduler.drain_timeout,
            drain_poll: cfg.scheduler.drain_poll,
        },
    );

    Ok(Services {
        gateway,
        evaluator,
        sweeper,
        orchestrator,
    })
}

/// Register every configured built-in job. With `schedule`, enabled jobs
/// also get their timers started.
pub fn register_builtin_jobs(services: &Services, cfg: &ConfigFile, schedule: bool) -> errors::Result<()> {
    let ctx = services.job_context();
    for job in &cfg.jobs {
        let spec = defaults_for(&job.name)
            .and_then(|defaults| builtin_spec(defaults, &job.schedule, job.enabled, job.daily, &ctx))
            .ok_or_else(|| EthosError::ConfigError(format!("unknown job '{}'", job.name)))?;

        if schedule {
            services.orchestrator.register_and_schedule(spec)?;
        } else {
            services.orchestrator.register(spec)?;
        }
    }
    Ok(())
}

/// High-level entry point used by `main.rs`.
///
/// This wires together:
/// - config loading
/// - store, provider clients and ledger
/// - the orchestrator and its built-in jobs
/// - Ctrl-C handling and drain on shutdown
pub async fn run(args: CliArgs) -> Result<()> {
    let config_path = PathBuf::from(&args.config);
    let cfg = load_and_validate(&config_path)?;
    debug!(path = %config_path.display(), "loaded config");

    let services = build_services(&cfg, Arc::new(SystemClock))?;
    let daemon = !args.dry_run && args.run_job.is_none() && args.history.is_none();
    register_builtin_jobs(&services, &cfg, daemon)?;

    if args.dry_run {
        print_dry_run(&services.orchestrator);
        return Ok(());
    }

    if let Some(job) = args.run_job.as_deref() {
        services.orchestrator.execute_job_manually(job).await?;
        println!("job '{job}' completed");
        return Ok(());
    }

    if let Some(job) = args.history.as_deref() {
        print_history(&services.orchestrator, job, args.days).await?;
        return Ok(());
    }

    match services.orchestrator.check_missed_jobs().await {
        Ok(missed) if !missed.is_empty() => info!(?missed, "daily jobs pending for today"),
        Ok(_) => {}
        Err(e) => warn!(error = %e, "could not check for missed jobs"),
    }

    info!(jobs = cfg.jobs.len(), "ethos scheduler running; press Ctrl+C to stop");
    tokio::signal::ctrl_c().await?;
    info!("shutdown requested");

    let still_running = services.orchestrator.stop_all_jobs().await;
    if !still_running.is_empty() {
        warn!(?still_running, "exiting with jobs still in flight");
    }
    Ok(())
}

/// Print every job with its schedule and next fire time.
fn print_dry_run(orchestrator: &Orchestrator) {
    println!("ethos dry-run");
    println!();

    let jobs = orchestrator.all_job_statuses();
    println!("jobs ({}):", jobs.len());
    for job in jobs {
        println!("  - {}", job.name);
        println!("      schedule: {}", job.schedule);
        println!("      enabled: {}", job.enabled);
        if job.daily {
            println!("      daily: true");
        }
        match job.next_run {
            Some(next) => println!("      next_run: {}", next.to_rfc3339()),
            None => println!("      next_run: -"),
        }
    }

    debug!("dry-run complete (no execution)");
}

async fn print_history(orchestrator: &Orchestrator, job: &str, days: u32) -> errors::Result<()> {
    let history = orchestrator.get_job_execution_history(job, days).await?;
    println!("{job}: last {days} day(s)");
    for day in history {
        match day.record {
            Some(record) => println!(
                "  {}  {:?}  at {}  ({} ms)",
                day.date,
                record.status,
                record.executed_at.to_rfc3339(),
                record.duration_ms
            ),
            None => println!("  {}  -", day.date),
        }
    }
    Ok(())
}
