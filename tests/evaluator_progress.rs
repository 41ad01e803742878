// tests/evaluator_progress.rs

mod common;
use crate::common::*;

use chrono::{DateTime, Duration, Utc};
use ethos::errors::EthosError;
use ethos::evaluator::{ProgressOutcome, SkipReason};
use ethos::fetchers::TokenGrant;
use ethos::model::DEADLINE_EXPIRED;
use ethos::types::{GoalStatus, GoalType, SourceKind};

fn now() -> DateTime<Utc> {
    utc(2026, 4, 10, 12)
}

/// `n` commit timestamps spread between goal creation and `now()`.
fn commits(n: i64) -> Vec<DateTime<Utc>> {
    (1..=n).map(|i| utc(2026, 4, 1, 1) + Duration::hours(i * 8)).collect()
}

#[tokio::test]
async fn commit_goal_reaching_target_is_settled_and_completed() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new().with_commits("alice", commits(10)),
        FakeActivities::new(),
        FakeLedger::new(),
    );
    h.seed_user(&UserBuilder::new("0xAAA").github("alice").build()).await;
    let goal = GoalBuilder::new("g1", "0xAAA")
        .target(10.0)
        .current(4.0)
        .deadline(utc(2026, 4, 11, 12))
        .build();
    h.seed_goal(&goal).await;

    let update = h
        .evaluator
        .update_goal_progress("g1")
        .await?
        .updated()
        .ok_or("expected an update")?;

    assert_eq!(update.previous_value, 4.0);
    assert_eq!(update.new_value, 10.0);
    assert!(update.is_completed);
    assert_eq!(update.status, GoalStatus::Completed);
    assert_eq!(update.data_source, SourceKind::Github);

    let stored = h.goal("g1").await;
    assert_eq!(stored.status, GoalStatus::Completed);
    assert_eq!(stored.current_value, 10.0);
    let result = stored.verification_result.ok_or("missing verification result")?;
    assert!(result.achieved);
    assert_eq!(result.tx_hash, FakeLedger::tx_hash_for(&goal.contract_address));
    assert_eq!(h.ledger.settlements(), vec![(goal.contract_address.clone(), 10)]);
    Ok(())
}

#[tokio::test]
async fn expired_goal_fails_without_fetching() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new().with_commits("alice", commits(10)),
        FakeActivities::new(),
        FakeLedger::new(),
    );
    h.seed_user(&UserBuilder::new("0xAAA").github("alice").build()).await;
    h.seed_goal(
        &GoalBuilder::new("g1", "0xAAA")
            .target(10.0)
            .current(4.0)
            .deadline(utc(2026, 4, 9, 12))
            .build(),
    )
    .await;

    let outcome = h.evaluator.update_goal_progress("g1").await?;
    assert_eq!(outcome, ProgressOutcome::Skipped(SkipReason::Expired));
    assert_eq!(h.commits.calls(), 0);

    let stored = h.goal("g1").await;
    assert_eq!(stored.status, GoalStatus::Failed);
    assert_eq!(stored.current_value, 4.0);
    let result = stored.verification_result.ok_or("missing verification result")?;
    assert!(!result.achieved);
    assert_eq!(result.actual_value, 4.0);
    assert_eq!(result.verification_method, DEADLINE_EXPIRED);

    // Second pass is a no-op on the now-terminal goal.
    let again = h.evaluator.update_goal_progress("g1").await?;
    assert_eq!(again, ProgressOutcome::Skipped(SkipReason::NotActive(GoalStatus::Failed)));
    Ok(())
}

#[tokio::test]
async fn one_failing_goal_does_not_abort_the_batch() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new()
            .with_commits("alice", commits(3))
            .with_commits("carol", commits(5))
            .fail_for("bob"),
        FakeActivities::new(),
        FakeLedger::new(),
    );
    for (address, name, id) in [("0xa1", "alice", "g1"), ("0xb2", "bob", "g2"), ("0xc3", "carol", "g3")] {
        h.seed_user(&UserBuilder::new(address).github(name).build()).await;
        h.seed_goal(&GoalBuilder::new(id, address).target(100.0).build()).await;
    }

    let results = h.evaluator.update_all_active_goals().await?;

    let mut ids: Vec<&str> = results.iter().map(|r| r.goal_id.as_str()).collect();
    ids.sort_unstable();
    assert_eq!(ids, vec!["g1", "g3"]);
    assert_eq!(h.commits.calls(), 3);
    assert_eq!(h.goal("g2").await.current_value, 0.0);
    assert_eq!(h.goal("g3").await.current_value, 5.0);
    Ok(())
}

#[tokio::test]
async fn inactive_goal_is_left_untouched() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new().with_commits("alice", commits(10)),
        FakeActivities::new(),
        FakeLedger::new(),
    );
    h.seed_user(&UserBuilder::new("0xAAA").github("alice").build()).await;
    for status in [GoalStatus::Completed, GoalStatus::PendingVerification, GoalStatus::Cancelled] {
        let id = format!("g-{status}");
        h.seed_goal(&GoalBuilder::new(&id, "0xAAA").status(status).current(2.0).build())
            .await;
        let before = h.goal(&id).await;

        let outcome = h.evaluator.update_goal_progress(&id).await?;

        assert_eq!(outcome, ProgressOutcome::Skipped(SkipReason::NotActive(status)));
        assert_eq!(h.goal(&id).await, before);
    }
    assert_eq!(h.commits.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn settlement_failure_parks_goal_in_pending_verification() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new().with_commits("alice", commits(12)),
        FakeActivities::new(),
        FakeLedger::failing(),
    );
    h.seed_user(&UserBuilder::new("0xAAA").github("alice").build()).await;
    h.seed_goal(&GoalBuilder::new("g1", "0xAAA").target(10.0).build()).await;

    let update = h
        .evaluator
        .update_goal_progress("g1")
        .await?
        .updated()
        .ok_or("expected an update")?;
    assert!(update.is_completed);
    assert_eq!(update.status, GoalStatus::PendingVerification);

    let stored = h.goal("g1").await;
    assert_eq!(stored.status, GoalStatus::PendingVerification);
    assert_eq!(stored.current_value, 12.0);
    let result = stored.verification_result.ok_or("missing verification result")?;
    assert!(result.achieved);
    assert!(result.tx_hash.is_empty());

    // Once the ledger recovers the retry pass completes it.
    h.ledger.set_failing(false);
    let settled = h.evaluator.retry_pending_settlements().await?;
    assert_eq!(settled.len(), 1);
    assert_eq!(settled[0].goal_id, "g1");

    let stored = h.goal("g1").await;
    assert_eq!(stored.status, GoalStatus::Completed);
    assert_eq!(
        stored.verification_result.ok_or("missing verification result")?.tx_hash,
        settled[0].tx_hash
    );
    assert_eq!(h.ledger.settlements()[0].1, 12);
    Ok(())
}

#[tokio::test]
async fn manual_and_onchain_goals_are_skipped() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    h.seed_goal(&GoalBuilder::new("m1", "0xAAA").source(SourceKind::Manual).build()).await;
    h.seed_goal(
        &GoalBuilder::new("o1", "0xAAA")
            .source(SourceKind::Onchain)
            .metric(GoalType::Volume)
            .build(),
    )
    .await;

    assert_eq!(
        h.evaluator.update_goal_progress("m1").await?,
        ProgressOutcome::Skipped(SkipReason::ManualSource)
    );
    assert_eq!(
        h.evaluator.update_goal_progress("o1").await?,
        ProgressOutcome::Skipped(SkipReason::Unsupported {
            source: SourceKind::Onchain,
            metric: GoalType::Volume,
        })
    );
    assert_eq!(h.goal("m1").await.status, GoalStatus::Active);
    Ok(())
}

#[tokio::test]
async fn missing_connection_is_a_skip_not_an_error() -> TestResult {
    init_tracing();
    let h = Harness::new(now());
    // Profile exists, but has no GitHub connection.
    h.seed_user(&UserBuilder::new("0xAAA").build()).await;
    h.seed_goal(&GoalBuilder::new("g1", "0xAAA").build()).await;
    h.seed_goal(&GoalBuilder::new("g2", "0xBBB").build()).await;

    for id in ["g1", "g2"] {
        assert_eq!(
            h.evaluator.update_goal_progress(id).await?,
            ProgressOutcome::Skipped(SkipReason::NoConnectedAccount(SourceKind::Github))
        );
    }
    assert_eq!(h.commits.calls(), 0);
    Ok(())
}

#[tokio::test]
async fn unknown_goal_is_not_found() {
    init_tracing();
    let h = Harness::new(now());

    let err = h.evaluator.update_goal_progress("nope").await.unwrap_err();

    assert!(matches!(err, EthosError::GoalNotFound(ref id) if id == "nope"));
    assert!(err.is_not_found());
}

#[tokio::test]
async fn commit_streak_counts_trailing_consecutive_days() -> TestResult {
    init_tracing();
    let days = vec![
        utc(2026, 4, 3, 9),
        utc(2026, 4, 4, 9),
        utc(2026, 4, 8, 9),
        utc(2026, 4, 9, 9),
        utc(2026, 4, 10, 9),
    ];
    let h = Harness::with(
        now(),
        FakeCommits::new().with_commits("alice", days),
        FakeActivities::new(),
        FakeLedger::new(),
    );
    h.seed_user(&UserBuilder::new("0xAAA").github("alice").build()).await;
    h.seed_goal(
        &GoalBuilder::new("s1", "0xAAA")
            .metric(GoalType::Streak)
            .target(7.0)
            .build(),
    )
    .await;
    h.seed_goal(
        &GoalBuilder::new("s2", "0xAAA")
            .metric(GoalType::Streak)
            .target(7.0)
            .current(4.0)
            .build(),
    )
    .await;

    let s1 = h.evaluator.update_goal_progress("s1").await?.updated().ok_or("s1")?;
    assert_eq!(s1.new_value, 3.0);
    assert!(!s1.is_completed);

    // Progress never moves backwards: a broken streak keeps the best value.
    let s2 = h.evaluator.update_goal_progress("s2").await?.updated().ok_or("s2")?;
    assert_eq!(s2.new_value, 4.0);
    Ok(())
}

#[tokio::test]
async fn activity_goal_refreshes_expiring_token_first() -> TestResult {
    init_tracing();
    let grant = TokenGrant {
        access_token: "fresh".to_string(),
        refresh_token: "refresh-2".to_string(),
        expires_at: now() + Duration::hours(6),
    };
    let h = Harness::with(
        now(),
        FakeCommits::new(),
        FakeActivities::new()
            .with_activities(
                "fresh",
                vec![
                    activity(1, "Run", 5_000.0, 1_800, utc(2026, 4, 3, 7)),
                    activity(2, "Run", 7_500.0, 2_700, utc(2026, 4, 6, 7)),
                ],
            )
            .with_refresh(grant.clone()),
        FakeLedger::new(),
    );
    h.seed_user(
        &UserBuilder::new("0xAAA")
            .strava("stale", "refresh-1", now() + Duration::minutes(30))
            .build(),
    )
    .await;
    h.seed_goal(
        &GoalBuilder::new("d1", "0xAAA")
            .source(SourceKind::Strava)
            .metric(GoalType::Distance)
            .target(20.0)
            .build(),
    )
    .await;

    let update = h.evaluator.update_goal_progress("d1").await?.updated().ok_or("d1")?;
    assert_eq!(update.new_value, 12.5);
    assert_eq!(update.status, GoalStatus::Active);
    assert_eq!(h.activities.refresh_calls(), 1);

    let user = h.user("0xaaa").await;
    let strava = user.connected_accounts.strava.ok_or("strava connection")?;
    assert_eq!(strava.access_token.as_deref(), Some("fresh"));
    assert_eq!(strava.refresh_token.as_deref(), Some("refresh-2"));
    assert_eq!(strava.expires_at, Some(grant.expires_at));
    Ok(())
}

#[tokio::test]
async fn calories_goal_uses_estimates_when_provider_omits_them() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new(),
        FakeActivities::new().with_activities(
            "tok",
            vec![
                activity(1, "Run", 10_000.0, 3_600, utc(2026, 4, 2, 7)),
                activity(2, "Ride", 20_000.0, 1_800, utc(2026, 4, 5, 7)),
            ],
        ),
        FakeLedger::new(),
    );
    h.seed_user(
        &UserBuilder::new("0xAAA")
            .strava("tok", "r", now() + Duration::days(3))
            .build(),
    )
    .await;
    h.seed_goal(
        &GoalBuilder::new("c1", "0xAAA")
            .source(SourceKind::Strava)
            .metric(GoalType::Calories)
            .target(800.0)
            .build(),
    )
    .await;

    let update = h.evaluator.update_goal_progress("c1").await?.updated().ok_or("c1")?;
    assert_eq!(update.new_value, 850.0);
    assert_eq!(update.status, GoalStatus::Completed);
    assert_eq!(h.activities.refresh_calls(), 0);
    assert_eq!(h.ledger.settlements(), vec![("0xc0c1".to_string(), 850)]);
    Ok(())
}

#[tokio::test]
async fn on_demand_refresh_respects_cooldown() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new().with_commits("alice", commits(2)),
        FakeActivities::new(),
        FakeLedger::new(),
    );
    h.seed_user(&UserBuilder::new("0xAAA").github("alice").build()).await;
    h.seed_goal(
        &GoalBuilder::new("recent", "0xAAA")
            .updated_at(now() - Duration::minutes(10))
            .build(),
    )
    .await;
    h.seed_goal(
        &GoalBuilder::new("stale", "0xAAA")
            .updated_at(now() - Duration::hours(2))
            .build(),
    )
    .await;

    let summary = h.evaluator.update_user_goals_on_demand("0xAAA").await?;

    assert_eq!(summary.total_goals, 2);
    assert_eq!(summary.updated, 1);
    assert_eq!(summary.results[0].goal_id, "stale");
    assert_eq!(h.commits.calls(), 1);

    // Immediately asking again finds both goals inside the cooldown.
    let again = h.evaluator.update_user_goals_on_demand("0xaaa").await?;
    assert_eq!(again.updated, 0);
    assert_eq!(h.commits.calls(), 1);
    Ok(())
}

#[tokio::test]
async fn source_batch_only_visits_that_source() -> TestResult {
    init_tracing();
    let h = Harness::with(
        now(),
        FakeCommits::new().with_commits("alice", commits(1)),
        FakeActivities::new(),
        FakeLedger::new(),
    );
    h.seed_user(
        &UserBuilder::new("0xAAA")
            .github("alice")
            .strava("tok", "r", now() + Duration::days(3))
            .build(),
    )
    .await;
    h.seed_goal(&GoalBuilder::new("gh", "0xAAA").build()).await;
    h.seed_goal(
        &GoalBuilder::new("run", "0xAAA")
            .source(SourceKind::Strava)
            .metric(GoalType::Distance)
            .build(),
    )
    .await;

    let results = h.evaluator.update_goals_by_source(SourceKind::Github).await?;

    assert_eq!(results.len(), 1);
    assert_eq!(results[0].goal_id, "gh");
    assert_eq!(h.activities.calls(), 0);
    Ok(())
}
