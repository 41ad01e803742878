// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::evaluator::EvaluatorSettings;
use crate::types::StoreBackend;

/// Configuration as read from TOML, before validation.
///
/// ```toml
/// [scheduler]
/// timezone = "UTC"
///
/// [jobs.deadline-sweep]
/// schedule = "0 */6 * * *"
///
/// [jobs.settlement-retry]
/// enabled = true
///
/// [evaluator]
/// cooldown_minutes = 30
///
/// [store]
/// backend = "file"
/// path = "data"
///
/// [ledger]
/// rpc_url = "http://127.0.0.1:8545"
/// from = "0x..."
/// ```
///
/// Every section is optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub scheduler: SchedulerSection,

    /// Overrides for built-in jobs, keyed by job name.
    #[serde(default)]
    pub jobs: BTreeMap<String, JobSection>,

    #[serde(default)]
    pub evaluator: EvaluatorSection,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub github: GithubSection,

    #[serde(default)]
    pub strava: StravaSection,

    /// Absent means settlement is unavailable.
    #[serde(default)]
    pub ledger: Option<LedgerSection>,
}

/// `[scheduler]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerSection {
    /// `"UTC"` or a fixed offset such as `"+02:00"`.
    #[serde(default = "default_timezone")]
    pub timezone: String,

    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,

    #[serde(default = "default_drain_poll_secs")]
    pub drain_poll_secs: u64,
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_drain_timeout_secs() -> u64 {
    30
}

fn default_drain_poll_secs() -> u64 {
    1
}

impl Default for SchedulerSection {
    fn default() -> Self {
        Self {
            timezone: default_timezone(),
            drain_timeout_secs: default_drain_timeout_secs(),
            drain_poll_secs: default_drain_poll_secs(),
        }
    }
}

/// `[jobs.<name>]` section. Unset fields keep the built-in default.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JobSection {
    #[serde(default)]
    pub schedule: Option<String>,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub daily: Option<bool>,
}

/// `[evaluator]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct EvaluatorSection {
    #[serde(default = "default_cooldown_minutes")]
    pub cooldown_minutes: i64,

    #[serde(default = "default_token_refresh_window_minutes")]
    pub token_refresh_window_minutes: i64,

    #[serde(default = "default_upcoming_window_hours")]
    pub upcoming_window_hours: i64,

    /// Refresh progress of goals due within the upcoming window.
    #[serde(default)]
    pub refresh_upcoming: bool,
}

fn default_cooldown_minutes() -> i64 {
    30
}

fn default_token_refresh_window_minutes() -> i64 {
    60
}

fn default_upcoming_window_hours() -> i64 {
    24
}

impl Default for EvaluatorSection {
    fn default() -> Self {
        Self {
            cooldown_minutes: default_cooldown_minutes(),
            token_refresh_window_minutes: default_token_refresh_window_minutes(),
            upcoming_window_hours: default_upcoming_window_hours(),
            refresh_upcoming: false,
        }
    }
}

/// `[store]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct StoreSection {
    #[serde(default)]
    pub backend: StoreBackend,

    /// Directory for the file backend.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// `[github]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct GithubSection {
    #[serde(default = "default_github_url")]
    pub base_url: String,

    /// Service-wide token; `GITHUB_TOKEN` is used when unset.
    #[serde(default)]
    pub token: Option<String>,
}

fn default_github_url() -> String {
    "https://api.github.com".to_string()
}

impl Default for GithubSection {
    fn default() -> Self {
        Self {
            base_url: default_github_url(),
            token: None,
        }
    }
}

/// `[strava]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct StravaSection {
    #[serde(default = "default_strava_url")]
    pub base_url: String,

    #[serde(default = "default_strava_token_url")]
    pub token_url: String,

    #[serde(default)]
    pub client_id: Option<String>,

    #[serde(default)]
    pub client_secret: Option<String>,
}

fn default_strava_url() -> String {
    "https://www.strava.com/api/v3".to_string()
}

fn default_strava_token_url() -> String {
    "https://www.strava.com/oauth/token".to_string()
}

impl Default for StravaSection {
    fn default() -> Self {
        Self {
            base_url: default_strava_url(),
            token_url: default_strava_token_url(),
            client_id: None,
            client_secret: None,
        }
    }
}

/// `[ledger]` section.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LedgerSection {
    pub rpc_url: String,

    /// Settling account, unlocked on the node or signing relay.
    pub from: String,

    #[serde(default = "default_confirmation_poll_ms")]
    pub confirmation_poll_ms: u64,

    #[serde(default = "default_confirmation_attempts")]
    pub confirmation_attempts: u32,
}

fn default_confirmation_poll_ms() -> u64 {
    1000
}

fn default_confirmation_attempts() -> u32 {
    60
}

/// Validated configuration.
///
/// Built from [`RawConfigFile`] via `TryFrom`; every built-in job appears in
/// `jobs` with its defaults merged with any `[jobs.<name>]` overrides.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
    pub jobs: Vec<JobConfig>,
    pub evaluator: EvaluatorConfig,
    pub store: StoreSection,
    pub github: GithubSection,
    pub strava: StravaSection,
    pub ledger: Option<LedgerSection>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerConfig {
    pub timezone: FixedOffset,
    pub drain_timeout: Duration,
    pub drain_poll: Duration,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobConfig {
    pub name: String,
    pub schedule: String,
    pub enabled: bool,
    pub daily: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvaluatorConfig {
    pub settings: EvaluatorSettings,
    pub upcoming_window: chrono::Duration,
    pub refresh_upcoming: bool,
}

impl ConfigFile {
    pub fn job(&self, name: &str) -> Option<&JobConfig> {
        self.jobs.iter().find(|j| j.name == name)
    }
}
