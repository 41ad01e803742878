#![allow(dead_code, unused_imports)]

pub use ethos_test_utils::builders::{GoalBuilder, UserBuilder, utc};
pub use ethos_test_utils::fakes::{FakeActivities, FakeCommits, FakeLedger, activity};
pub use ethos_test_utils::harness::Harness;
pub use ethos_test_utils::{init_tracing, with_timeout};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
