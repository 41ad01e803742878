#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use ethos::model::{ConnectedAccount, ConnectedAccounts, DataSource, EthosUser, Goal, Profile};
use ethos::types::{Category, Currency, GoalStatus, GoalType, SourceKind};

/// `YYYY-MM-DD HH:00:00Z`.
pub fn utc(year: i32, month: u32, day: u32, hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(year, month, day, hour, 0, 0)
        .single()
        .expect("valid test timestamp")
}

/// Builder for `Goal` to simplify test setup.
///
/// Defaults: an active GitHub commit goal with target 10, created
/// 2026-04-01 and due 30 days later.
pub struct GoalBuilder {
    goal: Goal,
}

impl GoalBuilder {
    pub fn new(id: &str, user_address: &str) -> Self {
        let created = utc(2026, 4, 1, 0);
        Self {
            goal: Goal {
                id: id.to_string(),
                title: format!("goal {id}"),
                description: None,
                category: Category::Productivity,
                goal_type: GoalType::Commit,
                target_value: 10.0,
                current_value: 0.0,
                lock_amount: 0.1,
                currency: Currency::Eth,
                deadline: created + Duration::days(30),
                user_address: user_address.to_lowercase(),
                contract_address: format!("0xc0{id}"),
                tx_hash: String::new(),
                status: GoalStatus::Active,
                data_source: DataSource {
                    kind: SourceKind::Github,
                    config: None,
                },
                verification_result: None,
                created_at: created,
                updated_at: created,
            },
        }
    }

    pub fn source(mut self, kind: SourceKind) -> Self {
        self.goal.data_source.kind = kind;
        self
    }

    pub fn metric(mut self, goal_type: GoalType) -> Self {
        self.goal.goal_type = goal_type;
        self.goal.category = match goal_type {
            GoalType::Distance | GoalType::Calories => Category::Fitness,
            GoalType::Volume | GoalType::Pnl => Category::Onchain,
            GoalType::Commit | GoalType::Streak => Category::Productivity,
        };
        self
    }

    pub fn target(mut self, value: f64) -> Self {
        self.goal.target_value = value;
        self
    }

    pub fn current(mut self, value: f64) -> Self {
        self.goal.current_value = value;
        self
    }

    pub fn deadline(mut self, at: DateTime<Utc>) -> Self {
        self.goal.deadline = at;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.goal.created_at = at;
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.goal.updated_at = at;
        self
    }

    pub fn status(mut self, status: GoalStatus) -> Self {
        self.goal.status = status;
        self
    }

    pub fn contract(mut self, address: &str) -> Self {
        self.goal.contract_address = address.to_string();
        self
    }

    pub fn build(self) -> Goal {
        self.goal
    }
}

/// Builder for `EthosUser`.
pub struct UserBuilder {
    user: EthosUser,
}

impl UserBuilder {
    pub fn new(wallet_address: &str) -> Self {
        let created = utc(2026, 3, 1, 0);
        Self {
            user: EthosUser {
                id: wallet_address.to_lowercase(),
                wallet_address: wallet_address.to_lowercase(),
                profile: Profile::default(),
                connected_accounts: ConnectedAccounts::default(),
                created_at: created,
                updated_at: created,
            },
        }
    }

    /// Active GitHub connection for `username`.
    pub fn github(mut self, username: &str) -> Self {
        self.user.connected_accounts.github = Some(ConnectedAccount {
            username: Some(username.to_string()),
            access_token: Some(format!("gh-{username}")),
            is_active: true,
            ..ConnectedAccount::default()
        });
        self
    }

    /// Active Strava connection with the given token triple.
    pub fn strava(mut self, access_token: &str, refresh_token: &str, expires_at: DateTime<Utc>) -> Self {
        self.user.connected_accounts.strava = Some(ConnectedAccount {
            athlete_id: Some("1001".to_string()),
            access_token: Some(access_token.to_string()),
            refresh_token: Some(refresh_token.to_string()),
            expires_at: Some(expires_at),
            is_active: true,
            ..ConnectedAccount::default()
        });
        self
    }

    pub fn build(self) -> EthosUser {
        self.user
    }
}
