// src/model/mod.rs

//! Persisted entities and the collections they live in.

pub mod goal;
pub mod user;

pub use goal::{DEADLINE_EXPIRED, DataSource, Goal, VerificationResult};
pub use user::{ConnectedAccount, ConnectedAccounts, EthosUser, Profile};

pub const GOALS: &str = "goals";
pub const USERS: &str = "ethosuser";
pub const JOB_EXECUTIONS: &str = "job_executions";
pub const VERIFICATION_LOGS: &str = "verification_logs";
