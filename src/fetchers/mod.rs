// src/fetchers/mod.rs

//! External data fetchers.
//!
//! Each provider sits behind a small async trait so the evaluator can be
//! driven by fakes in tests:
//! - [`CommitHistory`] (implemented by [`github::GitHubClient`])
//! - [`ActivityHistory`] (implemented by [`strava::StravaClient`])
//!
//! The pure helpers at the bottom of this module turn raw provider records
//! into the numbers goals are measured in.

use std::collections::BTreeSet;
use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::Deserialize;

use crate::errors::Result;

pub mod github;
pub mod strava;

pub use github::GitHubClient;
pub use strava::StravaClient;

/// A single commit attributed to the tracked user.
#[derive(Debug, Clone, PartialEq)]
pub struct CommitEvent {
    pub sha: String,
    pub repo: String,
    pub date: DateTime<Utc>,
}

/// A recorded activity as returned by the activity provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Activity {
    pub id: u64,
    #[serde(default)]
    pub name: String,
    /// Meters.
    #[serde(default)]
    pub distance: f64,
    /// Seconds.
    #[serde(default)]
    pub moving_time: u64,
    #[serde(rename = "type", default)]
    pub activity_type: String,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub calories: Option<f64>,
}

/// Result of an OAuth refresh-token exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenGrant {
    pub access_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

#[async_trait]
pub trait CommitHistory: Send + Sync + Debug {
    /// Commits authored by `username` within `[since, until]`, newest first.
    ///
    /// `token` is the user's own token when one is connected; implementations
    /// may fall back to a service-wide token.
    async fn commits_since(
        &self,
        username: &str,
        token: Option<&str>,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<CommitEvent>>;
}

#[async_trait]
pub trait ActivityHistory: Send + Sync + Debug {
    async fn activities(
        &self,
        access_token: &str,
        since: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> Result<Vec<Activity>>;

    async fn refresh_token(&self, refresh_token: &str) -> Result<TokenGrant>;
}

/// The set of provider clients handed to the evaluator.
#[derive(Debug, Clone)]
pub struct Fetchers {
    pub commits: Arc<dyn CommitHistory>,
    pub activities: Arc<dyn ActivityHistory>,
}

/// Sum of activity distance, in kilometers.
pub fn total_distance_km(activities: &[Activity]) -> f64 {
    activities.iter().map(|a| a.distance).sum::<f64>() / 1000.0
}

/// Calories burned across activities, estimating where the provider omits
/// them. Rounded to the nearest whole calorie.
pub fn total_calories(activities: &[Activity]) -> f64 {
    activities
        .iter()
        .map(|a| a.calories.unwrap_or_else(|| estimate_calories(a)))
        .sum::<f64>()
        .round()
}

/// Rough per-hour burn rate by activity type.
pub fn estimate_calories(activity: &Activity) -> f64 {
    let hours = activity.moving_time as f64 / 3600.0;
    let per_hour = match activity.activity_type.to_lowercase().as_str() {
        "run" | "trail run" | "trailrun" => 600.0,
        "ride" | "mountain bike ride" | "mountainbikeride" | "gravel ride" | "gravelride" => 500.0,
        "swim" => 400.0,
        "walk" | "hike" => 300.0,
        "workout" | "crossfit" => 450.0,
        _ => 400.0,
    };
    hours * per_hour
}

/// Consecutive active days, walking forward from `start` to `today` (UTC
/// calendar days).
///
/// Any past day without activity resets the count to zero. `today` itself is
/// still in progress, so a missing event today does not break the streak.
pub fn streak_days<I>(events: I, start: DateTime<Utc>, today: DateTime<Utc>) -> u32
where
    I: IntoIterator<Item = DateTime<Utc>>,
{
    let active: BTreeSet<NaiveDate> = events.into_iter().map(|t| t.date_naive()).collect();
    let first = start.date_naive();
    let last = today.date_naive();

    let mut streak = 0;
    let mut day = first;
    while day <= last {
        if active.contains(&day) {
            streak += 1;
        } else if day != last {
            streak = 0;
        }
        match day.checked_add_days(Days::new(1)) {
            Some(next) => day = next,
            None => break,
        }
    }
    streak
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn at(day: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 4, day, hour, 0, 0).unwrap()
    }

    fn activity(kind: &str, meters: f64, secs: u64, calories: Option<f64>) -> Activity {
        Activity {
            id: 1,
            name: String::new(),
            distance: meters,
            moving_time: secs,
            activity_type: kind.to_string(),
            start_date: at(1, 7),
            calories,
        }
    }

    #[test]
    fn unbroken_run_counts_every_day() {
        let events = (1..=5).map(|d| at(d, 9));
        assert_eq!(streak_days(events, at(1, 0), at(5, 18)), 5);
    }

    #[test]
    fn no_activity_yet_today_keeps_streak() {
        let events = (1..=4).map(|d| at(d, 9));
        assert_eq!(streak_days(events, at(1, 0), at(5, 8)), 4);
    }

    #[test]
    fn gap_yesterday_resets_to_zero() {
        let events = (1..=3).map(|d| at(d, 9));
        assert_eq!(streak_days(events, at(1, 0), at(5, 8)), 0);
    }

    #[test]
    fn activity_before_start_is_ignored() {
        let events = vec![at(1, 9), at(2, 9), at(3, 9)];
        assert_eq!(streak_days(events, at(3, 0), at(3, 20)), 1);
    }

    #[test]
    fn start_after_today_is_zero() {
        assert_eq!(streak_days(vec![at(2, 1)], at(3, 0), at(2, 0)), 0);
    }

    #[test]
    fn several_events_on_one_day_count_once() {
        let events = vec![at(1, 1), at(1, 2), at(1, 3)];
        assert_eq!(streak_days(events, at(1, 0), at(1, 0) + Duration::hours(23)), 1);
    }

    #[test]
    fn distance_is_reported_in_kilometers() {
        let acts = vec![
            activity("Run", 5_000.0, 1_800, None),
            activity("Ride", 20_500.0, 3_600, None),
        ];
        assert!((total_distance_km(&acts) - 25.5).abs() < f64::EPSILON);
    }

    #[test]
    fn calories_prefer_provider_value_then_estimate() {
        let acts = vec![
            activity("Run", 0.0, 3_600, Some(710.0)),
            activity("Walk", 0.0, 1_800, None),
            activity("Yoga", 0.0, 3_600, None),
        ];
        // 710 + 150 + 400
        assert_eq!(total_calories(&acts), 1_260.0);
    }
}
