//! A wired evaluator over an in-memory store, a manual clock and fakes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use ethos::clock::ManualClock;
use ethos::evaluator::{EvaluatorSettings, ProgressEvaluator, StrategyRegistry};
use ethos::fetchers::Fetchers;
use ethos::model::{EthosUser, GOALS, Goal, USERS};
use ethos::store::gateway::encode;
use ethos::store::{DocumentStore, Gateway, MemoryStore};

use crate::fakes::{FakeActivities, FakeCommits, FakeLedger};

pub struct Harness {
    pub clock: ManualClock,
    pub store: Arc<MemoryStore>,
    pub gateway: Gateway,
    pub commits: Arc<FakeCommits>,
    pub activities: Arc<FakeActivities>,
    pub ledger: Arc<FakeLedger>,
    pub evaluator: ProgressEvaluator,
}

impl Harness {
    /// Harness with empty fakes and a ledger that always succeeds.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self::with(now, FakeCommits::new(), FakeActivities::new(), FakeLedger::new())
    }

    pub fn with(
        now: DateTime<Utc>,
        commits: FakeCommits,
        activities: FakeActivities,
        ledger: FakeLedger,
    ) -> Self {
        let clock = ManualClock::new(now);
        let store = Arc::new(MemoryStore::new());
        let gateway = Gateway::new(store.clone(), Arc::new(clock.clone()));
        let commits = Arc::new(commits);
        let activities = Arc::new(activities);
        let ledger = Arc::new(ledger);

        let evaluator = ProgressEvaluator::new(
            gateway.clone(),
            Fetchers {
                commits: commits.clone(),
                activities: activities.clone(),
            },
            ledger.clone(),
            StrategyRegistry::standard(),
            EvaluatorSettings::default(),
        );

        Self {
            clock,
            store,
            gateway,
            commits,
            activities,
            ledger,
            evaluator,
        }
    }

    /// Store a goal as-is, keeping its own `createdAt`/`updatedAt`.
    pub async fn seed_goal(&self, goal: &Goal) {
        let doc = encode(GOALS, goal).expect("encode goal");
        self.store
            .put(GOALS, &goal.id, doc)
            .await
            .expect("seed goal");
    }

    pub async fn seed_user(&self, user: &EthosUser) {
        let doc = encode(USERS, user).expect("encode user");
        self.store
            .put(USERS, &user.wallet_address, doc)
            .await
            .expect("seed user");
    }

    pub async fn goal(&self, id: &str) -> Goal {
        self.gateway
            .get(GOALS, id)
            .await
            .expect("read goal")
            .expect("goal exists")
    }

    pub async fn user(&self, address: &str) -> EthosUser {
        self.gateway
            .get(USERS, address)
            .await
            .expect("read user")
            .expect("user exists")
    }
}
