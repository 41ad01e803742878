// src/jobs/orchestrator.rs

//! Registry of named periodic jobs and the guard wrapped around each run.
//!
//! Every registered job has its own timer task. When the timer fires it
//! spawns the run as a separate task, so a slow run never delays the timer
//! and an overlapping tick simply observes `running == true` and skips.
//!
//! A job that fails [`MAX_CONSECUTIVE_FAILURES`] times in a row is disabled
//! and its timer aborted; [`Orchestrator::enable_job`] resets it.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use chrono::{DateTime, Days, FixedOffset, NaiveDate, Offset, Utc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::errors::{EthosError, Result};

use super::execution_log::{ExecutionLog, ExecutionRecord, ExecutionStatus, daily_key};
use super::schedule::{Schedule, local_date};
use super::task::JobTask;

/// Consecutive failures after which a job disables itself.
pub const MAX_CONSECUTIVE_FAILURES: u32 = 5;

/// Definition of a job to register.
pub struct JobSpec {
    pub name: String,
    /// Five-field cron expression.
    pub schedule: String,
    pub enabled: bool,
    /// Run at most once per calendar day, recorded in the execution log.
    pub daily: bool,
    pub task: Arc<dyn JobTask>,
}

impl JobSpec {
    pub fn new(
        name: impl Into<String>,
        schedule: impl Into<String>,
        task: impl JobTask + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            schedule: schedule.into(),
            enabled: true,
            daily: false,
            task: Arc::new(task),
        }
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn daily(mut self, daily: bool) -> Self {
        self.daily = daily;
        self
    }
}

impl fmt::Debug for JobSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobSpec")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("enabled", &self.enabled)
            .field("daily", &self.daily)
            .finish_non_exhaustive()
    }
}

/// Point-in-time view of a job.
#[derive(Debug, Clone, PartialEq)]
pub struct JobState {
    pub name: String,
    pub schedule: String,
    pub enabled: bool,
    pub running: bool,
    pub daily: bool,
    /// Whether the job's timer is currently active.
    pub scheduled: bool,
    pub last_run: Option<DateTime<Utc>>,
    pub next_run: Option<DateTime<Utc>>,
    pub error_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipCause {
    AlreadyRunning,
    Disabled,
    AlreadyRanToday,
}

/// What happened on one guarded run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    Completed,
    Failed { error_count: u32, disabled: bool },
    Skipped(SkipCause),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DailyRun {
    Ran,
    AlreadyRan,
}

/// One calendar day of a job's execution history.
#[derive(Debug, Clone, PartialEq)]
pub struct DayExecution {
    pub date: NaiveDate,
    pub record: Option<ExecutionRecord>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrchestratorSettings {
    pub timezone: FixedOffset,
    /// How long [`Orchestrator::stop_all_jobs`] waits for running jobs.
    pub drain_timeout: Duration,
    pub drain_poll: Duration,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            timezone: Utc.fix(),
            drain_timeout: Duration::from_secs(30),
            drain_poll: Duration::from_secs(1),
        }
    }
}

struct JobEntry {
    schedule: Schedule,
    task: Arc<dyn JobTask>,
    enabled: bool,
    running: bool,
    daily: bool,
    last_run: Option<DateTime<Utc>>,
    error_count: u32,
    timer: Option<JoinHandle<()>>,
}

impl JobEntry {
    fn is_scheduled(&self) -> bool {
        self.timer.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn snapshot(&self, name: &str, now: DateTime<Utc>) -> JobState {
        JobState {
            name: name.to_string(),
            schedule: self.schedule.expr().to_string(),
            enabled: self.enabled,
            running: self.running,
            daily: self.daily,
            scheduled: self.is_scheduled(),
            last_run: self.last_run,
            next_run: self
                .enabled
                .then(|| self.schedule.next_after(now).ok())
                .flatten(),
            error_count: self.error_count,
        }
    }
}

type Jobs = BTreeMap<String, JobEntry>;

struct Inner {
    jobs: Mutex<Jobs>,
    clock: Arc<dyn Clock>,
    log: Arc<dyn ExecutionLog>,
    settings: OrchestratorSettings,
}

fn lock(jobs: &Mutex<Jobs>) -> MutexGuard<'_, Jobs> {
    jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Clears the running flag if a run is dropped before it finishes.
struct RunningGuard<'a> {
    inner: &'a Inner,
    name: &'a str,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = lock(&self.inner.jobs).get_mut(self.name) {
            entry.running = false;
        }
    }
}

/// Owns all jobs for the lifetime of the process. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("jobs", &lock(&self.inner.jobs).len())
            .field("settings", &self.inner.settings)
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    pub fn new(
        clock: Arc<dyn Clock>,
        log: Arc<dyn ExecutionLog>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                jobs: Mutex::new(BTreeMap::new()),
                clock,
                log,
                settings,
            }),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, Jobs> {
        lock(&self.inner.jobs)
    }

    fn now(&self) -> DateTime<Utc> {
        self.inner.clock.now()
    }

    fn today(&self) -> NaiveDate {
        local_date(self.now(), self.inner.settings.timezone)
    }

    /// Add a job without starting its timer.
    pub fn register(&self, spec: JobSpec) -> Result<()> {
        let schedule = Schedule::parse(&spec.schedule, self.inner.settings.timezone)?;
        let mut jobs = self.jobs();
        if jobs.contains_key(&spec.name) {
            return Err(EthosError::ConfigError(format!(
                "job '{}' is already registered",
                spec.name
            )));
        }

        info!(job = %spec.name, schedule = %schedule.expr(), enabled = spec.enabled, "registered job");
        jobs.insert(
            spec.name,
            JobEntry {
                schedule,
                task: spec.task,
                enabled: spec.enabled,
                running: false,
                daily: spec.daily,
                last_run: None,
                error_count: 0,
                timer: None,
            },
        );
        Ok(())
    }

    /// Register a job and start its timer if it is enabled.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn register_and_schedule(&self, spec: JobSpec) -> Result<()> {
        let name = spec.name.clone();
        let enabled = spec.enabled;
        self.register(spec)?;
        if enabled {
            self.start_job(&name)?;
        }
        Ok(())
    }

    /// Start the job's timer. Starting a running timer is a no-op.
    pub fn start_job(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs();
        let entry = jobs
            .get_mut(name)
            .ok_or_else(|| EthosError::JobNotFound(name.to_string()))?;
        if !entry.enabled {
            return Err(EthosError::JobDisabled(name.to_string()));
        }
        if entry.is_scheduled() {
            return Ok(());
        }

        entry.timer = Some(spawn_timer(
            Arc::downgrade(&self.inner),
            name.to_string(),
            entry.schedule.clone(),
        ));
        info!(job = name, "started job");
        Ok(())
    }

    /// Stop the job's timer. An in-flight run is left to finish.
    pub fn stop_job(&self, name: &str) -> Result<()> {
        let mut jobs = self.jobs();
        let entry = jobs
            .get_mut(name)
            .ok_or_else(|| EthosError::JobNotFound(name.to_string()))?;
        if let Some(timer) = entry.timer.take() {
            timer.abort();
            info!(job = name, "stopped job");
        }
        Ok(())
    }

    /// Re-enable a job, clear its failure count and restart its timer.
    pub fn enable_job(&self, name: &str) -> Result<()> {
        {
            let mut jobs = self.jobs();
            let entry = jobs
                .get_mut(name)
                .ok_or_else(|| EthosError::JobNotFound(name.to_string()))?;
            entry.enabled = true;
            entry.error_count = 0;
        }
        self.start_job(name)
    }

    pub fn disable_job(&self, name: &str) -> Result<()> {
        {
            let mut jobs = self.jobs();
            let entry = jobs
                .get_mut(name)
                .ok_or_else(|| EthosError::JobNotFound(name.to_string()))?;
            entry.enabled = false;
        }
        self.stop_job(name)
    }

    /// One guarded run, as performed on every timer tick.
    ///
    /// Skips when the job is disabled or already running. Daily jobs also
    /// skip when today's execution is already recorded.
    pub async fn run_scheduled(&self, name: &str) -> Result<TickOutcome> {
        self.run_guarded(name, None).await
    }

    /// Guarded run for the timer slot `slot`. Daily jobs are keyed by the
    /// slot's local date rather than the wall clock, which may trail the
    /// timer by a fraction of a second around midnight.
    async fn run_guarded(&self, name: &str, slot: Option<DateTime<Utc>>) -> Result<TickOutcome> {
        let (task, daily) = {
            let mut jobs = self.jobs();
            let entry = jobs
                .get_mut(name)
                .ok_or_else(|| EthosError::JobNotFound(name.to_string()))?;
            if !entry.enabled {
                debug!(job = name, "job disabled, skipping tick");
                return Ok(TickOutcome::Skipped(SkipCause::Disabled));
            }
            if entry.running {
                warn!(job = name, "job is already running, skipping tick");
                return Ok(TickOutcome::Skipped(SkipCause::AlreadyRunning));
            }
            entry.running = true;
            entry.last_run = Some(self.now());
            (entry.task.clone(), entry.daily)
        };
        let _guard = RunningGuard {
            inner: &self.inner,
            name,
        };

        info!(job = name, "starting job");
        let result = if daily {
            let date = local_date(slot.unwrap_or_else(|| self.now()), self.inner.settings.timezone);
            self.run_daily(name, task.as_ref(), date)
                .await
                .map(|run| run == DailyRun::Ran)
        } else {
            task.run().await.map(|()| true).map_err(EthosError::from)
        };

        Ok(self.finish(name, result))
    }

    fn finish(&self, name: &str, result: Result<bool>) -> TickOutcome {
        let mut jobs = self.jobs();
        let Some(entry) = jobs.get_mut(name) else {
            return TickOutcome::Skipped(SkipCause::Disabled);
        };
        entry.running = false;

        match result {
            Ok(true) => {
                entry.error_count = 0;
                info!(job = name, "job completed");
                TickOutcome::Completed
            }
            Ok(false) => TickOutcome::Skipped(SkipCause::AlreadyRanToday),
            Err(e) => {
                entry.error_count += 1;
                error!(job = name, error = %e, error_count = entry.error_count, "job failed");

                let disabled = entry.error_count >= MAX_CONSECUTIVE_FAILURES;
                if disabled {
                    error!(job = name, "disabling job after repeated failures");
                    entry.enabled = false;
                    if let Some(timer) = entry.timer.take() {
                        timer.abort();
                    }
                }
                TickOutcome::Failed {
                    error_count: entry.error_count,
                    disabled,
                }
            }
        }
    }

    /// Run a job's task once, outside the schedule, surfacing its error.
    pub async fn execute_job_manually(&self, name: &str) -> Result<()> {
        let task = self
            .jobs()
            .get(name)
            .map(|entry| entry.task.clone())
            .ok_or_else(|| EthosError::JobNotFound(name.to_string()))?;

        info!(job = name, "manually executing job");
        match task.run().await {
            Ok(()) => {
                info!(job = name, "manual execution completed");
                Ok(())
            }
            Err(e) => {
                error!(job = name, error = %e, "manual execution failed");
                Err(e.into())
            }
        }
    }

    /// Run `task` unless today's execution of `name` is already recorded;
    /// record it after a successful run.
    pub async fn execute_with_daily_check(&self, name: &str, task: &dyn JobTask) -> Result<DailyRun> {
        self.run_daily(name, task, self.today()).await
    }

    async fn run_daily(&self, name: &str, task: &dyn JobTask, date: NaiveDate) -> Result<DailyRun> {
        let started_at = self.now();
        let key = daily_key(name, date);

        if self.inner.log.has_run(&key).await? {
            info!(job = name, key = %key, "already ran today, skipping");
            return Ok(DailyRun::AlreadyRan);
        }

        let started = Instant::now();
        task.run().await?;

        let record = ExecutionRecord {
            job_name: name.to_string(),
            date: date.format("%Y-%m-%d").to_string(),
            status: ExecutionStatus::Completed,
            executed_at: started_at,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        self.inner.log.mark_run(&key, record).await?;
        debug!(job = name, key = %key, "recorded daily execution");
        Ok(DailyRun::Ran)
    }

    /// Warn about enabled daily jobs that have not run today.
    ///
    /// Nothing is backfilled; the next tick covers the gap.
    pub async fn check_missed_jobs(&self) -> Result<Vec<String>> {
        let daily: Vec<String> = self
            .jobs()
            .iter()
            .filter(|(_, entry)| entry.daily && entry.enabled)
            .map(|(name, _)| name.clone())
            .collect();

        let date = self.today();
        let mut missed = Vec::new();
        for name in daily {
            if !self.inner.log.has_run(&daily_key(&name, date)).await? {
                warn!(job = %name, %date, "daily job has not run today");
                missed.push(name);
            }
        }
        Ok(missed)
    }

    /// The last `days` calendar days (including today) of a job's
    /// executions, oldest first.
    pub async fn get_job_execution_history(&self, name: &str, days: u32) -> Result<Vec<DayExecution>> {
        if !self.jobs().contains_key(name) {
            return Err(EthosError::JobNotFound(name.to_string()));
        }

        let today = self.today();
        let mut history = Vec::with_capacity(days as usize);
        for back in (0..days).rev() {
            let Some(date) = today.checked_sub_days(Days::new(u64::from(back))) else {
                continue;
            };
            let record = self.inner.log.get(&daily_key(name, date)).await?;
            history.push(DayExecution { date, record });
        }
        Ok(history)
    }

    /// Stop every timer, then wait for in-flight runs to finish.
    ///
    /// Returns the jobs still running when the drain timeout expired.
    pub async fn stop_all_jobs(&self) -> Vec<String> {
        info!("stopping all jobs");
        for (name, entry) in self.jobs().iter_mut() {
            if let Some(timer) = entry.timer.take() {
                timer.abort();
                debug!(job = %name, "stopped job");
            }
        }

        let deadline = Instant::now() + self.inner.settings.drain_timeout;
        loop {
            let running = self.running_jobs();
            if running.is_empty() {
                info!("all jobs stopped");
                return running;
            }
            if Instant::now() >= deadline {
                warn!(?running, "drain timeout reached with jobs still running");
                return running;
            }
            info!(count = running.len(), "waiting for running jobs to finish");
            tokio::time::sleep(self.inner.settings.drain_poll).await;
        }
    }

    fn running_jobs(&self) -> Vec<String> {
        self.jobs()
            .iter()
            .filter(|(_, entry)| entry.running)
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn get_job_status(&self, name: &str) -> Option<JobState> {
        let now = self.now();
        self.jobs().get(name).map(|entry| entry.snapshot(name, now))
    }

    pub fn all_job_statuses(&self) -> Vec<JobState> {
        let now = self.now();
        self.jobs()
            .iter()
            .map(|(name, entry)| entry.snapshot(name, now))
            .collect()
    }
}

/// Timer loop for one job. Holds only a weak reference so dropping the
/// orchestrator ends the loop.
fn spawn_timer(inner: Weak<Inner>, name: String, schedule: Schedule) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut cursor: Option<DateTime<Utc>> = None;
        loop {
            let now = match inner.upgrade() {
                Some(inner) => inner.clock.now(),
                None => break,
            };
            // Never compute from before the last fire time, or a clock that
            // trails the timer would fire the same slot twice.
            let from = cursor.map_or(now, |last| last.max(now));
            let next = match schedule.next_after(from) {
                Ok(next) => next,
                Err(e) => {
                    error!(job = %name, error = %e, "cannot compute next run; timer stopped");
                    break;
                }
            };
            let wait = (next - now).to_std().unwrap_or_default();
            debug!(job = %name, next_run = %next, "waiting for next tick");
            tokio::time::sleep(wait).await;
            cursor = Some(next);

            let Some(inner) = inner.upgrade() else { break };
            let orchestrator = Orchestrator { inner };
            let job = name.clone();
            tokio::spawn(async move {
                if let Err(e) = orchestrator.run_guarded(&job, Some(next)).await {
                    error!(job = %job, error = %e, "scheduled run failed to start");
                }
            });
        }
    })
}
