// src/ledger/mod.rs

//! On-chain settlement of goal contracts.
//!
//! The evaluator only needs two capabilities from the chain:
//! - submit `settleGoal(score)` and wait for the receipt
//! - ask whether a contract has already been settled
//!
//! [`rpc::RpcLedger`] talks JSON-RPC to a node (or signing relay) that
//! manages the settling account. [`UnconfiguredLedger`] stands in when no
//! node is configured, so completed goals park in `pending_verification`.

use std::fmt::Debug;

use async_trait::async_trait;

use crate::errors::{EthosError, Result};

pub mod rpc;

pub use rpc::RpcLedger;

#[async_trait]
pub trait Ledger: Send + Sync + Debug {
    /// Settle `contract` with the achieved `score`. Returns the confirmed
    /// transaction hash.
    async fn settle(&self, contract: &str, score: u64) -> Result<String>;

    async fn is_settled(&self, contract: &str) -> Result<bool>;
}

/// Ledger used when no RPC endpoint is configured. Every settlement fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnconfiguredLedger;

#[async_trait]
impl Ledger for UnconfiguredLedger {
    async fn settle(&self, contract: &str, _score: u64) -> Result<String> {
        Err(EthosError::Settlement(format!(
            "no ledger configured; cannot settle {contract}"
        )))
    }

    async fn is_settled(&self, _contract: &str) -> Result<bool> {
        Ok(false)
    }
}

/// Contract score for an achieved value: floored, never negative.
pub fn score_for(value: f64) -> u64 {
    if value.is_finite() && value > 0.0 {
        value.floor() as u64
    } else {
        0
    }
}
