// src/config/validate.rs

use std::time::Duration;

use crate::config::model::{
    ConfigFile, EvaluatorConfig, JobConfig, RawConfigFile, SchedulerConfig,
};
use crate::errors::{EthosError, Result};
use crate::evaluator::EvaluatorSettings;
use crate::jobs::builtin::{BUILTIN_JOBS, defaults_for};
use crate::jobs::{Schedule, parse_timezone};
use crate::types::StoreBackend;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = EthosError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        let scheduler = validate_scheduler(&raw)?;
        let jobs = validate_jobs(&raw, &scheduler)?;
        let evaluator = validate_evaluator(&raw)?;
        validate_store(&raw)?;
        validate_ledger(&raw)?;

        Ok(ConfigFile {
            scheduler,
            jobs,
            evaluator,
            store: raw.store,
            github: raw.github,
            strava: raw.strava,
            ledger: raw.ledger,
        })
    }
}

fn validate_scheduler(cfg: &RawConfigFile) -> Result<SchedulerConfig> {
    let timezone = parse_timezone(&cfg.scheduler.timezone)?;

    if cfg.scheduler.drain_poll_secs == 0 {
        return Err(EthosError::ConfigError(
            "[scheduler].drain_poll_secs must be >= 1 (got 0)".to_string(),
        ));
    }

    Ok(SchedulerConfig {
        timezone,
        drain_timeout: Duration::from_secs(cfg.scheduler.drain_timeout_secs),
        drain_poll: Duration::from_secs(cfg.scheduler.drain_poll_secs),
    })
}

fn validate_jobs(cfg: &RawConfigFile, scheduler: &SchedulerConfig) -> Result<Vec<JobConfig>> {
    for name in cfg.jobs.keys() {
        if defaults_for(name).is_none() {
            let known: Vec<&str> = BUILTIN_JOBS.iter().map(|d| d.name).collect();
            return Err(EthosError::ConfigError(format!(
                "unknown job '{}' in [jobs] (known jobs: {})",
                name,
                known.join(", ")
            )));
        }
    }

    BUILTIN_JOBS
        .iter()
        .map(|defaults| {
            let section = cfg.jobs.get(defaults.name);
            let schedule = section
                .and_then(|s| s.schedule.clone())
                .unwrap_or_else(|| defaults.schedule.to_string());

            Schedule::parse(&schedule, scheduler.timezone).map_err(|e| {
                EthosError::ConfigError(format!("[jobs.{}].schedule: {e}", defaults.name))
            })?;

            Ok(JobConfig {
                name: defaults.name.to_string(),
                schedule,
                enabled: section.and_then(|s| s.enabled).unwrap_or(defaults.enabled),
                daily: section.and_then(|s| s.daily).unwrap_or(defaults.daily),
            })
        })
        .collect()
}

fn validate_evaluator(cfg: &RawConfigFile) -> Result<EvaluatorConfig> {
    let e = &cfg.evaluator;
    for (field, value) in [
        ("cooldown_minutes", e.cooldown_minutes),
        ("token_refresh_window_minutes", e.token_refresh_window_minutes),
        ("upcoming_window_hours", e.upcoming_window_hours),
    ] {
        if value <= 0 {
            return Err(EthosError::ConfigError(format!(
                "[evaluator].{field} must be > 0 (got {value})"
            )));
        }
    }

    Ok(EvaluatorConfig {
        settings: EvaluatorSettings {
            cooldown: chrono::Duration::minutes(e.cooldown_minutes),
            token_refresh_window: chrono::Duration::minutes(e.token_refresh_window_minutes),
        },
        upcoming_window: chrono::Duration::hours(e.upcoming_window_hours),
        refresh_upcoming: e.refresh_upcoming,
    })
}

fn validate_store(cfg: &RawConfigFile) -> Result<()> {
    if cfg.store.backend == StoreBackend::File && cfg.store.path.is_none() {
        return Err(EthosError::ConfigError(
            "[store].path is required when backend = \"file\"".to_string(),
        ));
    }
    Ok(())
}

fn validate_ledger(cfg: &RawConfigFile) -> Result<()> {
    let Some(ledger) = &cfg.ledger else {
        return Ok(());
    };
    if ledger.rpc_url.trim().is_empty() {
        return Err(EthosError::ConfigError(
            "[ledger].rpc_url must not be empty".to_string(),
        ));
    }
    if ledger.from.trim().is_empty() {
        return Err(EthosError::ConfigError(
            "[ledger].from must not be empty".to_string(),
        ));
    }
    if ledger.confirmation_attempts == 0 {
        return Err(EthosError::ConfigError(
            "[ledger].confirmation_attempts must be >= 1 (got 0)".to_string(),
        ));
    }
    Ok(())
}
