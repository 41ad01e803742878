// src/jobs/mod.rs

//! Scheduled job orchestration.
//!
//! - [`schedule`]: cron parsing and next-fire computation
//! - [`task`]: the [`JobTask`] abstraction
//! - [`execution_log`]: per-key idempotency markers
//! - [`orchestrator`]: job registry, run guard and lifecycle
//! - [`builtin`]: the jobs registered at startup

pub mod builtin;
pub mod execution_log;
pub mod orchestrator;
pub mod schedule;
pub mod task;

pub use execution_log::{ExecutionLog, ExecutionRecord, ExecutionStatus, StoreExecutionLog, daily_key};
pub use orchestrator::{
    DailyRun, DayExecution, JobSpec, JobState, MAX_CONSECUTIVE_FAILURES, Orchestrator,
    OrchestratorSettings, SkipCause, TickOutcome,
};
pub use schedule::{Schedule, parse_timezone};
pub use task::{JobTask, TaskFuture};
