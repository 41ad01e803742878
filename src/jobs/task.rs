// src/jobs/task.rs

//! The unit of work a job runs on each tick.

use std::future::Future;
use std::pin::Pin;

pub type TaskFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + 'static>>;

/// Something the orchestrator can run repeatedly.
///
/// Each call must produce a fresh, independent future. Any
/// `Fn() -> impl Future<Output = anyhow::Result<()>>` closure qualifies, so
/// tests can register plain async closures.
pub trait JobTask: Send + Sync {
    fn run(&self) -> TaskFuture;
}

impl<F, Fut> JobTask for F
where
    F: Fn() -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn run(&self) -> TaskFuture {
        Box::pin(self())
    }
}
