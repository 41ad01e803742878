// src/jobs/execution_log.rs

//! Durable idempotency markers for job runs.
//!
//! The orchestrator asks [`ExecutionLog::has_run`] before a keyed run and
//! calls [`ExecutionLog::mark_run`] after it succeeds. Daily jobs use
//! [`daily_key`] so a job fires at most once per calendar day no matter how
//! often its timer ticks.

use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::Result;
use crate::model::JOB_EXECUTIONS;
use crate::store::Gateway;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionRecord {
    pub job_name: String,
    /// Calendar date (`YYYY-MM-DD`) in the scheduler timezone.
    pub date: String,
    pub status: ExecutionStatus,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Key for one job on one calendar day: `{job}_{YYYY-MM-DD}`.
pub fn daily_key(job: &str, date: NaiveDate) -> String {
    format!("{job}_{}", date.format("%Y-%m-%d"))
}

#[async_trait]
pub trait ExecutionLog: Send + Sync + Debug {
    async fn get(&self, key: &str) -> Result<Option<ExecutionRecord>>;

    async fn mark_run(&self, key: &str, record: ExecutionRecord) -> Result<()>;

    /// True when `key` has a `completed` record.
    async fn has_run(&self, key: &str) -> Result<bool> {
        Ok(self
            .get(key)
            .await?
            .is_some_and(|r| r.status == ExecutionStatus::Completed))
    }
}

/// Execution log kept in the `job_executions` collection.
#[derive(Debug, Clone)]
pub struct StoreExecutionLog {
    gateway: Gateway,
}

impl StoreExecutionLog {
    pub fn new(gateway: Gateway) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl ExecutionLog for StoreExecutionLog {
    async fn get(&self, key: &str) -> Result<Option<ExecutionRecord>> {
        self.gateway.get(JOB_EXECUTIONS, key).await
    }

    async fn mark_run(&self, key: &str, record: ExecutionRecord) -> Result<()> {
        self.gateway
            .create(JOB_EXECUTIONS, Some(key), &record)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use chrono::TimeZone;

    use crate::clock::ManualClock;
    use crate::store::MemoryStore;

    #[test]
    fn daily_key_uses_iso_date() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 7).unwrap();
        assert_eq!(daily_key("progress-sweep", date), "progress-sweep_2026-03-07");
    }

    #[tokio::test]
    async fn only_completed_records_count_as_run() {
        let now = Utc.with_ymd_and_hms(2026, 3, 7, 0, 0, 0).unwrap();
        let gateway = Gateway::new(Arc::new(MemoryStore::new()), Arc::new(ManualClock::new(now)));
        let log = StoreExecutionLog::new(gateway);

        let record = |status| ExecutionRecord {
            job_name: "token-cleanup".into(),
            date: "2026-03-07".into(),
            status,
            executed_at: now,
            duration_ms: 12,
        };

        assert!(!log.has_run("token-cleanup_2026-03-07").await.unwrap());

        log.mark_run("token-cleanup_2026-03-07", record(ExecutionStatus::Failed))
            .await
            .unwrap();
        assert!(!log.has_run("token-cleanup_2026-03-07").await.unwrap());

        log.mark_run("token-cleanup_2026-03-07", record(ExecutionStatus::Completed))
            .await
            .unwrap();
        assert!(log.has_run("token-cleanup_2026-03-07").await.unwrap());

        let stored = log.get("token-cleanup_2026-03-07").await.unwrap().unwrap();
        assert_eq!(stored.duration_ms, 12);
    }
}
