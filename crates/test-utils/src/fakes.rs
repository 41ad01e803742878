//! In-memory stand-ins for the provider clients and the ledger.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use ethos::errors::{EthosError, Result};
use ethos::fetchers::{Activity, ActivityHistory, CommitEvent, CommitHistory, TokenGrant};
use ethos::ledger::Ledger;

/// Commit history keyed by username.
///
/// - returns the configured commit dates that fall in `[since, until]`
/// - fails for usernames registered with [`FakeCommits::fail_for`]
#[derive(Debug, Default)]
pub struct FakeCommits {
    by_user: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
    failing: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl FakeCommits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_commits(self, username: &str, dates: Vec<DateTime<Utc>>) -> Self {
        self.by_user
            .lock()
            .unwrap()
            .insert(username.to_string(), dates);
        self
    }

    pub fn fail_for(self, username: &str) -> Self {
        self.failing.lock().unwrap().insert(username.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CommitHistory for FakeCommits {
    async fn commits_since(
        &self,
        username: &str,
        _token: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CommitEvent>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(username) {
            return Err(EthosError::provider("github", format!("fake failure for {username}")));
        }

        let dates = self
            .by_user
            .lock()
            .unwrap()
            .get(username)
            .cloned()
            .unwrap_or_default();
        let mut events: Vec<CommitEvent> = dates
            .into_iter()
            .filter(|d| *d >= since && *d <= until)
            .enumerate()
            .map(|(i, date)| CommitEvent {
                sha: format!("{username}-{i:04}"),
                repo: format!("{username}/project"),
                date,
            })
            .collect();
        events.sort_by(|a, b| b.date.cmp(&a.date));
        Ok(events)
    }
}

/// Activity history keyed by access token.
#[derive(Debug, Default)]
pub struct FakeActivities {
    by_token: Mutex<HashMap<String, Vec<Activity>>>,
    failing: Mutex<HashSet<String>>,
    grant: Mutex<Option<TokenGrant>>,
    calls: AtomicUsize,
    refresh_calls: AtomicUsize,
}

impl FakeActivities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_activities(self, access_token: &str, activities: Vec<Activity>) -> Self {
        self.by_token
            .lock()
            .unwrap()
            .insert(access_token.to_string(), activities);
        self
    }

    pub fn fail_for(self, access_token: &str) -> Self {
        self.failing
            .lock()
            .unwrap()
            .insert(access_token.to_string());
        self
    }

    /// Token grant handed out by `refresh_token`. Without one, refresh fails.
    pub fn with_refresh(self, grant: TokenGrant) -> Self {
        *self.grant.lock().unwrap() = Some(grant);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> usize {
        self.refresh_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ActivityHistory for FakeActivities {
    async fn activities(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Activity>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.lock().unwrap().contains(access_token) {
            return Err(EthosError::provider("strava", "fake failure"));
        }

        Ok(self
            .by_token
            .lock()
            .unwrap()
            .get(access_token)
            .cloned()
            .unwrap_or_default()
            .into_iter()
            .filter(|a| a.start_date >= since && a.start_date <= until)
            .collect())
    }

    async fn refresh_token(&self, _refresh_token: &str) -> Result<TokenGrant> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.grant
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| EthosError::provider("strava", "refresh rejected"))
    }
}

/// An activity starting at `start`.
pub fn activity(id: u64, kind: &str, distance_m: f64, moving_time_s: u64, start: DateTime<Utc>) -> Activity {
    Activity {
        id,
        name: format!("{kind} {id}"),
        distance: distance_m,
        moving_time: moving_time_s,
        activity_type: kind.to_string(),
        start_date: start,
        calories: None,
    }
}

/// Ledger that records settlements instead of sending them.
#[derive(Debug, Default)]
pub struct FakeLedger {
    failing: AtomicBool,
    settled: Mutex<Vec<(String, u64)>>,
}

impl FakeLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        let ledger = Self::default();
        ledger.set_failing(true);
        ledger
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// `(contract, score)` for every successful settlement, in order.
    pub fn settlements(&self) -> Vec<(String, u64)> {
        self.settled.lock().unwrap().clone()
    }

    pub fn tx_hash_for(contract: &str) -> String {
        format!("0xfeed{}", contract.trim_start_matches("0x"))
    }
}

#[async_trait]
impl Ledger for FakeLedger {
    async fn settle(&self, contract: &str, score: u64) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(EthosError::Settlement("transaction reverted".to_string()));
        }
        if self.is_settled(contract).await? {
            return Err(EthosError::Settlement(format!("{contract} already settled")));
        }
        self.settled
            .lock()
            .unwrap()
            .push((contract.to_string(), score));
        Ok(Self::tx_hash_for(contract))
    }

    async fn is_settled(&self, contract: &str) -> Result<bool> {
        Ok(self.settled.lock().unwrap().iter().any(|(c, _)| c == contract))
    }
}
