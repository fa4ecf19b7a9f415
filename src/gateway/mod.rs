//! Contract gateways.
//!
//! [`ContractClient`] is the shared core: it holds the [`ContractHandle`] for
//! the connected account, submits transactions through the wallet, waits for
//! receipts and decodes `eth_call` results. The typed gateways in
//! [`tickets`] and [`betting`] sit on top of it.

pub mod betting;
pub mod tickets;

pub use betting::BettingGateway;
pub use tickets::TicketGateway;

use std::sync::Arc;
use std::time::Duration;

use alloy::sol_types::SolCall;
use alloy_primitives::{hex, Address, B256, U256};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::provider::{decode_string, ProviderError, WalletProvider};
use crate::session::Session;
use crate::units::AmountError;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("contract not initialized: no connected wallet")]
    Uninitialized,

    #[error(transparent)]
    Amount(#[from] AmountError),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("failed to decode {method} result: {reason}")]
    Decode { method: &'static str, reason: String },

    #[error("transaction {tx_hash} reverted")]
    Reverted { tx_hash: B256 },

    /// The transaction was broadcast but no receipt arrived in time. It may
    /// still be mined; check `tx_hash` before resubmitting.
    #[error("transaction {tx_hash} not confirmed after {timeout:?}")]
    Unconfirmed { tx_hash: B256, timeout: Duration },
}

impl GatewayError {
    pub(crate) fn decode(method: &'static str, reason: impl ToString) -> Self {
        GatewayError::Decode {
            method,
            reason: reason.to_string(),
        }
    }
}

/// Contract address plus the account that signs calls to it.
///
/// Only constructible from a connected [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContractHandle {
    contract: Address,
    signer: Address,
}

impl ContractHandle {
    /// `None` unless the session has an authorized account.
    pub fn for_session(contract: Address, session: &Session) -> Option<Self> {
        session.address.map(|signer| Self { contract, signer })
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn signer(&self) -> Address {
        self.signer
    }
}

/// How long to wait for a submitted transaction to be mined.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            timeout: Duration::from_secs(120),
        }
    }
}

/// Mined transaction summary.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    pub tx_hash: B256,
    pub block_number: Option<u64>,
    pub gas_used: Option<u64>,
    pub success: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: String,
    block_number: Option<String>,
    gas_used: Option<String>,
    status: Option<String>,
}

/// An undecoded contract log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawLog {
    pub topics: Vec<B256>,
    pub data: Vec<u8>,
    pub block_number: Option<u64>,
    pub tx_hash: Option<B256>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLogJson {
    topics: Vec<String>,
    data: String,
    block_number: Option<String>,
    transaction_hash: Option<String>,
}

fn parse_hex_u64(method: &'static str, raw: &str) -> Result<u64, GatewayError> {
    let digits = raw.strip_prefix("0x").unwrap_or(raw);
    u64::from_str_radix(digits, 16).map_err(|e| GatewayError::decode(method, e))
}

fn parse_hash(method: &'static str, raw: &str) -> Result<B256, GatewayError> {
    raw.parse::<B256>().map_err(|e| GatewayError::decode(method, e))
}

fn parse_receipt(value: Value) -> Result<TxReceipt, GatewayError> {
    const METHOD: &str = "eth_getTransactionReceipt";
    let raw: RawReceipt = serde_json::from_value(value).map_err(|e| GatewayError::decode(METHOD, e))?;

    Ok(TxReceipt {
        tx_hash: parse_hash(METHOD, &raw.transaction_hash)?,
        block_number: raw
            .block_number
            .as_deref()
            .map(|b| parse_hex_u64(METHOD, b))
            .transpose()?,
        gas_used: raw
            .gas_used
            .as_deref()
            .map(|g| parse_hex_u64(METHOD, g))
            .transpose()?,
        // pre-Byzantium receipts carry no status; treat them as successful
        success: raw.status.as_deref().map_or(true, |s| s == "0x1"),
    })
}

fn parse_logs(value: Value) -> Result<Vec<RawLog>, GatewayError> {
    const METHOD: &str = "eth_getLogs";
    let raw: Vec<RawLogJson> = serde_json::from_value(value).map_err(|e| GatewayError::decode(METHOD, e))?;

    raw.into_iter()
        .map(|log| {
            Ok(RawLog {
                topics: log
                    .topics
                    .iter()
                    .map(|t| parse_hash(METHOD, t))
                    .collect::<Result<_, _>>()?,
                data: hex::decode(&log.data).map_err(|e| GatewayError::decode(METHOD, e))?,
                block_number: log
                    .block_number
                    .as_deref()
                    .map(|b| parse_hex_u64(METHOD, b))
                    .transpose()?,
                tx_hash: log
                    .transaction_hash
                    .as_deref()
                    .map(|h| parse_hash(METHOD, h))
                    .transpose()?,
            })
        })
        .collect()
}

/// Narrow a uint256 field to u64, failing on overflow.
pub(crate) fn to_u64(method: &'static str, value: U256) -> Result<u64, GatewayError> {
    u64::try_from(value).map_err(|_| GatewayError::decode(method, format!("{} does not fit in u64", value)))
}

/// Shared core for a single deployed contract.
pub struct ContractClient<P> {
    provider: Arc<P>,
    contract: Address,
    handle: Option<ContractHandle>,
    confirmation: ConfirmationPolicy,
}

impl<P: WalletProvider> ContractClient<P> {
    pub fn new(provider: Arc<P>, contract: Address, confirmation: ConfirmationPolicy) -> Self {
        Self {
            provider,
            contract,
            handle: None,
            confirmation,
        }
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    /// Rebuild the handle from the session. Call whenever the account changes;
    /// a disconnected session leaves the client unbound.
    pub fn bind(&mut self, session: &Session) {
        self.handle = ContractHandle::for_session(self.contract, session);
        match &self.handle {
            Some(handle) => debug!(contract = %self.contract, signer = %handle.signer, "contract bound"),
            None => debug!(contract = %self.contract, "contract unbound"),
        }
    }

    pub fn is_bound(&self) -> bool {
        self.handle.is_some()
    }

    pub fn handle(&self) -> Result<&ContractHandle, GatewayError> {
        self.handle.as_ref().ok_or(GatewayError::Uninitialized)
    }

    /// Submit a state-changing call and wait for it to be mined.
    ///
    /// Not retried: a failure after broadcast leaves the outcome to be checked
    /// by transaction hash.
    pub async fn send<C: SolCall>(&self, call: &C, value: U256) -> Result<TxReceipt, GatewayError> {
        let result = self.send_inner(call, value).await;
        if let Err(e) = &result {
            error!(method = C::SIGNATURE, error = %e, "contract transaction failed");
        }
        result
    }

    /// Execute a read-only call and decode its return values.
    pub async fn call<C: SolCall>(&self, call: &C) -> Result<C::Return, GatewayError> {
        let result = self.call_inner(call).await;
        if let Err(e) = &result {
            warn!(method = C::SIGNATURE, error = %e, "contract call failed");
        }
        result
    }

    /// Logs emitted by the contract from `from_block` to the chain head.
    pub async fn logs(&self, from_block: u64) -> Result<Vec<RawLog>, GatewayError> {
        let handle = self.handle()?;
        let filter = json!({
            "address": handle.contract.to_string(),
            "fromBlock": format!("{:#x}", from_block),
            "toBlock": "latest",
        });
        let value = self.provider.request("eth_getLogs", json!([filter])).await?;
        parse_logs(value)
    }

    async fn send_inner<C: SolCall>(&self, call: &C, value: U256) -> Result<TxReceipt, GatewayError> {
        let handle = self.handle()?;

        let mut tx = json!({
            "from": handle.signer.to_string(),
            "to": handle.contract.to_string(),
            "data": hex::encode_prefixed(call.abi_encode()),
        });
        if !value.is_zero() {
            tx["value"] = json!(format!("{:#x}", value));
        }

        let raw = self
            .provider
            .request("eth_sendTransaction", json!([tx]))
            .await?;
        let tx_hash = parse_hash(C::SIGNATURE, &decode_string("eth_sendTransaction", raw)?)?;
        info!(method = C::SIGNATURE, %tx_hash, %value, "transaction submitted");

        self.wait_for_receipt(tx_hash).await
    }

    async fn call_inner<C: SolCall>(&self, call: &C) -> Result<C::Return, GatewayError> {
        let handle = self.handle()?;

        let request = json!({
            "from": handle.signer.to_string(),
            "to": handle.contract.to_string(),
            "data": hex::encode_prefixed(call.abi_encode()),
        });
        let raw = self
            .provider
            .request("eth_call", json!([request, "latest"]))
            .await?;
        let bytes = hex::decode(decode_string("eth_call", raw)?)
            .map_err(|e| GatewayError::decode(C::SIGNATURE, e))?;

        C::abi_decode_returns(&bytes).map_err(|e| GatewayError::decode(C::SIGNATURE, e))
    }

    async fn wait_for_receipt(&self, tx_hash: B256) -> Result<TxReceipt, GatewayError> {
        let deadline = Instant::now() + self.confirmation.timeout;

        loop {
            let value = self
                .provider
                .request("eth_getTransactionReceipt", json!([tx_hash.to_string()]))
                .await?;

            if !value.is_null() {
                let receipt = parse_receipt(value)?;
                if !receipt.success {
                    return Err(GatewayError::Reverted { tx_hash });
                }
                info!(%tx_hash, block = ?receipt.block_number, "transaction confirmed");
                return Ok(receipt);
            }

            if Instant::now() >= deadline {
                return Err(GatewayError::Unconfirmed {
                    tx_hash,
                    timeout: self.confirmation.timeout,
                });
            }
            tokio::time::sleep(self.confirmation.poll_interval).await;
        }
    }
}
