// tests/orchestrator.rs

mod common;
use crate::common::*;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, FixedOffset, Utc};
use tokio::sync::Notify;

use ethos::errors::EthosError;
use ethos::jobs::{
    DailyRun, ExecutionLog, ExecutionStatus, JobSpec, JobTask, MAX_CONSECUTIVE_FAILURES,
    Orchestrator, OrchestratorSettings, SkipCause, StoreExecutionLog, TickOutcome, daily_key,
};

fn now() -> DateTime<Utc> {
    utc(2026, 3, 7, 10)
}

fn orchestrator(h: &Harness, settings: OrchestratorSettings) -> Orchestrator {
    Orchestrator::new(
        Arc::new(h.clock.clone()),
        Arc::new(StoreExecutionLog::new(h.gateway.clone())),
        settings,
    )
}

fn counting(counter: Arc<AtomicUsize>) -> impl JobTask {
    move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            anyhow::Ok(())
        }
    }
}

fn failing(counter: Arc<AtomicUsize>) -> impl JobTask {
    move || {
        let counter = counter.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Err::<(), _>(anyhow::anyhow!("provider unavailable"))
        }
    }
}

/// Counts, then blocks until `gate` is notified.
fn gated(counter: Arc<AtomicUsize>, gate: Arc<Notify>) -> impl JobTask {
    move || {
        let counter = counter.clone();
        let gate = gate.clone();
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            gate.notified().await;
            anyhow::Ok(())
        }
    }
}

async fn wait_until_running(orch: &Orchestrator, name: &str) {
    with_timeout(async {
        while !orch.get_job_status(name).is_some_and(|s| s.running) {
            tokio::task::yield_now().await;
        }
    })
    .await;
}

#[tokio::test]
async fn overlapping_tick_is_skipped_while_running() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let gate = Arc::new(Notify::new());
    orch.register(JobSpec::new("slow", "*/5 * * * *", gated(calls.clone(), gate.clone())))?;

    let first = {
        let orch = orch.clone();
        tokio::spawn(async move { orch.run_scheduled("slow").await })
    };
    wait_until_running(&orch, "slow").await;

    let second = orch.run_scheduled("slow").await?;
    assert_eq!(second, TickOutcome::Skipped(SkipCause::AlreadyRunning));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    gate.notify_one();
    let first = with_timeout(first).await??;
    assert_eq!(first, TickOutcome::Completed);

    let state = orch.get_job_status("slow").ok_or("job state")?;
    assert!(!state.running);
    assert_eq!(state.last_run, Some(now()));
    Ok(())
}

#[tokio::test]
async fn five_failures_disable_the_job() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register(JobSpec::new("flaky", "* * * * *", failing(calls.clone())))?;

    for attempt in 1..MAX_CONSECUTIVE_FAILURES {
        let outcome = orch.run_scheduled("flaky").await?;
        assert_eq!(
            outcome,
            TickOutcome::Failed {
                error_count: attempt,
                disabled: false
            }
        );
    }
    let fifth = orch.run_scheduled("flaky").await?;
    assert_eq!(
        fifth,
        TickOutcome::Failed {
            error_count: MAX_CONSECUTIVE_FAILURES,
            disabled: true
        }
    );

    let sixth = orch.run_scheduled("flaky").await?;
    assert_eq!(sixth, TickOutcome::Skipped(SkipCause::Disabled));
    assert_eq!(calls.load(Ordering::SeqCst), 5);

    let state = orch.get_job_status("flaky").ok_or("job state")?;
    assert!(!state.enabled);
    assert_eq!(state.next_run, None);

    // Re-enabling clears the counter.
    orch.enable_job("flaky")?;
    let state = orch.get_job_status("flaky").ok_or("job state")?;
    assert!(state.enabled);
    assert!(state.scheduled);
    assert_eq!(state.error_count, 0);
    orch.stop_all_jobs().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn scheduled_timer_stops_after_repeated_failures() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register_and_schedule(JobSpec::new("flaky", "* * * * *", failing(calls.clone())))?;
    assert!(orch.get_job_status("flaky").ok_or("job state")?.scheduled);

    tokio::time::sleep(Duration::from_secs(2 * 3600)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 5);
    let state = orch.get_job_status("flaky").ok_or("job state")?;
    assert!(!state.enabled);
    assert!(!state.scheduled);
    Ok(())
}

#[tokio::test]
async fn success_resets_the_failure_count() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let fail_next = Arc::new(AtomicUsize::new(2));
    let task = {
        let fail_next = fail_next.clone();
        move || {
            let fail_next = fail_next.clone();
            async move {
                if fail_next.load(Ordering::SeqCst) > 0 {
                    fail_next.fetch_sub(1, Ordering::SeqCst);
                    anyhow::bail!("transient");
                }
                anyhow::Ok(())
            }
        }
    };
    orch.register(JobSpec::new("wobbly", "0 * * * *", task))?;

    orch.run_scheduled("wobbly").await?;
    orch.run_scheduled("wobbly").await?;
    assert_eq!(orch.get_job_status("wobbly").ok_or("job state")?.error_count, 2);

    assert_eq!(orch.run_scheduled("wobbly").await?, TickOutcome::Completed);
    assert_eq!(orch.get_job_status("wobbly").ok_or("job state")?.error_count, 0);
    Ok(())
}

#[tokio::test]
async fn daily_check_runs_once_per_calendar_day() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let task = counting(calls.clone());
    orch.register(JobSpec::new("progress-sweep", "0 0 * * *", counting(calls.clone())).daily(true))?;

    assert_eq!(orch.execute_with_daily_check("progress-sweep", &task).await?, DailyRun::Ran);
    assert_eq!(orch.execute_with_daily_check("progress-sweep", &task).await?, DailyRun::AlreadyRan);
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // A scheduled tick on the same day is also suppressed.
    assert_eq!(
        orch.run_scheduled("progress-sweep").await?,
        TickOutcome::Skipped(SkipCause::AlreadyRanToday)
    );
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    h.clock.advance(chrono::Duration::days(1));
    assert_eq!(orch.run_scheduled("progress-sweep").await?, TickOutcome::Completed);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn failed_daily_run_is_not_recorded() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let task = failing(calls.clone());
    orch.register(JobSpec::new("token-cleanup", "0 2 * * *", failing(calls.clone())).daily(true))?;

    assert!(orch.execute_with_daily_check("token-cleanup", &task).await.is_err());
    assert!(orch.execute_with_daily_check("token-cleanup", &task).await.is_err());
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    let log = StoreExecutionLog::new(h.gateway.clone());
    assert!(!log.has_run(&daily_key("token-cleanup", now().date_naive())).await?);
    Ok(())
}

#[tokio::test]
async fn daily_key_follows_the_scheduler_timezone() -> TestResult {
    init_tracing();
    // 23:00 UTC on the 6th is already the 7th at +02:00.
    let h = Harness::new(utc(2026, 3, 6, 23));
    let tz = FixedOffset::east_opt(2 * 3600).ok_or("offset")?;
    let orch = orchestrator(
        &h,
        OrchestratorSettings {
            timezone: tz,
            ..OrchestratorSettings::default()
        },
    );
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register(JobSpec::new("progress-sweep", "0 0 * * *", counting(calls.clone())).daily(true))?;

    orch.run_scheduled("progress-sweep").await?;

    let log = StoreExecutionLog::new(h.gateway.clone());
    let record = log
        .get("progress-sweep_2026-03-07")
        .await?
        .ok_or("expected a record keyed by the local date")?;
    assert_eq!(record.date, "2026-03-07");
    assert_eq!(record.status, ExecutionStatus::Completed);
    assert_eq!(record.executed_at, utc(2026, 3, 6, 23));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn midnight_tick_counts_for_the_new_day_when_the_wall_clock_trails() -> TestResult {
    init_tracing();
    let h = Harness::new(utc(2026, 3, 7, 23) + chrono::Duration::seconds(3599));
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    let task = counting(calls.clone());
    orch.register(JobSpec::new("progress-sweep", "0 0 * * *", counting(calls.clone())).daily(true))?;
    assert_eq!(orch.execute_with_daily_check("progress-sweep", &task).await?, DailyRun::Ran);

    orch.start_job("progress-sweep")?;
    // The timer wakes one second later; the wall clock has only moved half of it.
    tokio::time::sleep(Duration::from_millis(500)).await;
    h.clock.advance(chrono::Duration::milliseconds(500));
    tokio::time::sleep(Duration::from_secs(2)).await;

    assert_eq!(calls.load(Ordering::SeqCst), 2);
    let log = StoreExecutionLog::new(h.gateway.clone());
    assert!(log.has_run("progress-sweep_2026-03-08").await?);
    let state = orch.get_job_status("progress-sweep").ok_or("job state")?;
    assert_eq!(state.next_run, Some(utc(2026, 3, 8, 0)));
    orch.stop_all_jobs().await;
    Ok(())
}

#[tokio::test]
async fn history_lists_days_oldest_first() -> TestResult {
    init_tracing();
    let h = Harness::new(utc(2026, 3, 5, 1));
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register(JobSpec::new("progress-sweep", "0 0 * * *", counting(calls.clone())).daily(true))?;

    // Runs on the 5th and 7th, nothing on the 6th.
    orch.run_scheduled("progress-sweep").await?;
    h.clock.advance(chrono::Duration::days(2));
    orch.run_scheduled("progress-sweep").await?;

    let history = orch.get_job_execution_history("progress-sweep", 4).await?;
    let days: Vec<String> = history.iter().map(|d| d.date.to_string()).collect();
    assert_eq!(days, vec!["2026-03-04", "2026-03-05", "2026-03-06", "2026-03-07"]);
    let ran: Vec<bool> = history.iter().map(|d| d.record.is_some()).collect();
    assert_eq!(ran, vec![false, true, false, true]);

    let err = orch.get_job_execution_history("nope", 3).await.unwrap_err();
    assert!(matches!(err, EthosError::JobNotFound(_)));
    Ok(())
}

#[tokio::test]
async fn missed_daily_jobs_are_reported() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register(JobSpec::new("progress-sweep", "0 0 * * *", counting(calls.clone())).daily(true))?;
    orch.register(JobSpec::new("token-cleanup", "0 2 * * *", counting(calls.clone())).daily(true))?;
    orch.register(
        JobSpec::new("archived", "0 3 * * *", counting(calls.clone()))
            .daily(true)
            .enabled(false),
    )?;
    orch.register(JobSpec::new("health-check", "*/15 * * * *", counting(calls.clone())))?;

    orch.run_scheduled("progress-sweep").await?;

    assert_eq!(orch.check_missed_jobs().await?, vec!["token-cleanup".to_string()]);
    // Reporting never runs anything.
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn manual_execution_surfaces_errors() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register(JobSpec::new("ok", "0 * * * *", counting(calls.clone())).enabled(false))?;
    orch.register(JobSpec::new("broken", "0 * * * *", failing(calls.clone())))?;

    // Disabled jobs can still be run by hand.
    orch.execute_job_manually("ok").await?;
    assert!(orch.execute_job_manually("broken").await.is_err());
    assert!(matches!(
        orch.execute_job_manually("missing").await,
        Err(EthosError::JobNotFound(_))
    ));
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    // A manual failure does not count toward auto-disable.
    assert_eq!(orch.get_job_status("broken").ok_or("job state")?.error_count, 0);
    Ok(())
}

#[tokio::test]
async fn lifecycle_transitions_are_idempotent() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(&h, OrchestratorSettings::default());
    let calls = Arc::new(AtomicUsize::new(0));
    orch.register(JobSpec::new("health-check", "*/15 * * * *", counting(calls.clone())))?;

    assert!(matches!(
        orch.register(JobSpec::new("health-check", "*/15 * * * *", counting(calls.clone()))),
        Err(EthosError::ConfigError(_))
    ));

    orch.start_job("health-check")?;
    orch.start_job("health-check")?;
    assert!(orch.get_job_status("health-check").ok_or("job state")?.scheduled);

    orch.stop_job("health-check")?;
    orch.stop_job("health-check")?;
    tokio::task::yield_now().await;
    assert!(!orch.get_job_status("health-check").ok_or("job state")?.scheduled);

    orch.disable_job("health-check")?;
    assert!(matches!(orch.start_job("health-check"), Err(EthosError::JobDisabled(_))));
    assert!(matches!(orch.stop_job("unknown"), Err(EthosError::JobNotFound(_))));

    let state = orch.get_job_status("health-check").ok_or("job state")?;
    assert_eq!(state.next_run, None);
    orch.enable_job("health-check")?;
    let state = orch.get_job_status("health-check").ok_or("job state")?;
    assert_eq!(state.next_run, Some(utc(2026, 3, 7, 10) + chrono::Duration::minutes(15)));
    orch.stop_all_jobs().await;
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn stop_all_jobs_drains_until_timeout() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    let orch = orchestrator(
        &h,
        OrchestratorSettings {
            drain_timeout: Duration::from_secs(3),
            drain_poll: Duration::from_millis(500),
            ..OrchestratorSettings::default()
        },
    );
    let calls = Arc::new(AtomicUsize::new(0));
    let stuck_gate = Arc::new(Notify::new());
    let quick_gate = Arc::new(Notify::new());
    orch.register(JobSpec::new("stuck", "0 * * * *", gated(calls.clone(), stuck_gate)))?;
    orch.register(JobSpec::new("quick", "0 * * * *", gated(calls.clone(), quick_gate.clone())))?;

    for name in ["stuck", "quick"] {
        let orch = orch.clone();
        tokio::spawn(async move { orch.run_scheduled(name).await });
    }
    wait_until_running(&orch, "stuck").await;
    wait_until_running(&orch, "quick").await;

    let release = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        quick_gate.notify_one();
    });

    let started = tokio::time::Instant::now();
    let still_running = orch.stop_all_jobs().await;

    assert_eq!(still_running, vec!["stuck".to_string()]);
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(!orch.get_job_status("quick").ok_or("job state")?.running);
    release.await?;
    Ok(())
}
