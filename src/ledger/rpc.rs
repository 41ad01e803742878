// src/ledger/rpc.rs

//! JSON-RPC ledger client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::{debug, info, warn};

use crate::errors::{EthosError, Result};

use super::Ledger;

/// `settleGoal(uint256)`
const SETTLE_GOAL_SELECTOR: &str = "06284197";
/// `isSettled()`
const IS_SETTLED_SELECTOR: &str = "3270bb5b";

#[derive(Debug)]
pub struct RpcLedger {
    client: reqwest::Client,
    rpc_url: String,
    from: String,
    poll_interval: Duration,
    max_polls: u32,
    next_id: AtomicU64,
}

impl RpcLedger {
    pub fn new(
        rpc_url: impl Into<String>,
        from: impl Into<String>,
        poll_interval: Duration,
        max_polls: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self {
            client,
            rpc_url: rpc_url.into(),
            from: from.into(),
            poll_interval,
            max_polls: max_polls.max(1),
            next_id: AtomicU64::new(1),
        })
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        let response = self.client.post(&self.rpc_url).json(&request).send().await?;
        if !response.status().is_success() {
            return Err(EthosError::Settlement(format!(
                "{method} returned HTTP {}",
                response.status()
            )));
        }

        let body: Value = response.json().await?;
        if let Some(error) = body.get("error") {
            return Err(EthosError::Settlement(format!("{method} failed: {error}")));
        }
        Ok(body.get("result").cloned().unwrap_or(Value::Null))
    }

    async fn wait_for_receipt(&self, tx_hash: &str) -> Result<Value> {
        for attempt in 1..=self.max_polls {
            let receipt = self
                .call("eth_getTransactionReceipt", json!([tx_hash]))
                .await?;
            if !receipt.is_null() {
                return Ok(receipt);
            }
            debug!(tx_hash, attempt, "receipt not yet available");
            tokio::time::sleep(self.poll_interval).await;
        }

        Err(EthosError::Settlement(format!(
            "transaction {tx_hash} not confirmed after {} polls",
            self.max_polls
        )))
    }
}

/// Calldata for `settleGoal(score)`: selector followed by a 32-byte
/// big-endian word.
pub fn settle_calldata(score: u64) -> String {
    format!("0x{SETTLE_GOAL_SELECTOR}{score:064x}")
}

/// Decode an ABI `bool` return word. Empty output (no code at the address)
/// reads as `false`.
fn decode_bool(word: &str) -> Result<bool> {
    let hex = word.trim_start_matches("0x");
    if hex.is_empty() {
        return Ok(false);
    }
    if !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(EthosError::Settlement(format!("malformed bool word: {word}")));
    }
    Ok(hex.chars().any(|c| c != '0'))
}

#[async_trait]
impl Ledger for RpcLedger {
    async fn settle(&self, contract: &str, score: u64) -> Result<String> {
        info!(contract, score, "settling goal contract");

        if self.is_settled(contract).await? {
            return Err(EthosError::Settlement(format!(
                "contract {contract} is already settled"
            )));
        }

        let tx_hash = self
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": self.from,
                    "to": contract,
                    "data": settle_calldata(score),
                }]),
            )
            .await?;
        let tx_hash = tx_hash
            .as_str()
            .ok_or_else(|| EthosError::Settlement(format!("unexpected tx hash: {tx_hash}")))?
            .to_string();
        debug!(contract, tx_hash = %tx_hash, "settlement transaction sent");

        let receipt = self.wait_for_receipt(&tx_hash).await?;
        match receipt.get("status").and_then(Value::as_str) {
            Some("0x1") => {
                info!(contract, tx_hash = %tx_hash, "goal settled");
                Ok(tx_hash)
            }
            status => {
                warn!(contract, tx_hash = %tx_hash, ?status, "settlement transaction reverted");
                Err(EthosError::Settlement(format!("transaction {tx_hash} reverted")))
            }
        }
    }

    async fn is_settled(&self, contract: &str) -> Result<bool> {
        let result = self
            .call(
                "eth_call",
                json!([
                    { "to": contract, "data": format!("0x{IS_SETTLED_SELECTOR}") },
                    "latest"
                ]),
            )
            .await?;

        match result.as_str() {
            Some(word) => decode_bool(word),
            None => Err(EthosError::Settlement(format!(
                "unexpected isSettled result: {result}"
            ))),
        }
    }
}
