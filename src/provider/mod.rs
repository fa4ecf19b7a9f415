//! Wallet capability provider abstraction.
//!
//! Everything the crate needs from a wallet goes through [`WalletProvider`]:
//! a JSON-RPC style `request` plus a stream of pushed [`ProviderEvent`]s.
//! A browser bridge, an HTTP node or a scripted test double can sit behind it.

mod http;

pub use http::HttpProvider;

use alloy_primitives::U256;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::events::ProviderEvent;

/// EIP-1193: the user rejected the request.
pub const USER_REJECTED: i64 = 4001;
/// EIP-3326: the requested chain has not been added to the wallet.
pub const UNRECOGNIZED_CHAIN: i64 = 4902;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("no wallet provider detected")]
    Unavailable,

    #[error("request rejected by user")]
    UserRejected,

    #[error("chain not recognized by wallet: {0}")]
    UnrecognizedChain(String),

    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("transport error: {0}")]
    Transport(String),

    #[error("malformed response to {method}: {reason}")]
    Malformed { method: String, reason: String },
}

impl ProviderError {
    /// Map a JSON-RPC error object to the matching variant.
    pub fn from_rpc(code: i64, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            USER_REJECTED => ProviderError::UserRejected,
            UNRECOGNIZED_CHAIN => ProviderError::UnrecognizedChain(message),
            _ => ProviderError::Rpc { code, message },
        }
    }

    pub fn malformed(method: &str, reason: impl Into<String>) -> Self {
        ProviderError::Malformed {
            method: method.to_string(),
            reason: reason.into(),
        }
    }

    pub fn is_user_rejection(&self) -> bool {
        matches!(self, ProviderError::UserRejected)
    }
}

#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Whether a wallet is present at all. Checked before any request.
    fn is_available(&self) -> bool {
        true
    }

    /// Send one request and return its `result` value.
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError>;

    /// Subscribe to pushed account / chain / disconnect notifications.
    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent>;
}

/// Decode a `string[]` result (as returned by `eth_accounts`).
pub(crate) fn decode_accounts(method: &str, value: Value) -> Result<Vec<String>, ProviderError> {
    serde_json::from_value(value).map_err(|e| ProviderError::malformed(method, e.to_string()))
}

/// Decode a hex-string result into an owned `String`.
pub(crate) fn decode_string(method: &str, value: Value) -> Result<String, ProviderError> {
    match value {
        Value::String(s) => Ok(s),
        other => Err(ProviderError::malformed(
            method,
            format!("expected string, got {}", other),
        )),
    }
}

/// Decode a hex quantity result ("0xde0b6b3a7640000") into a `U256`.
pub(crate) fn decode_quantity(method: &str, value: Value) -> Result<U256, ProviderError> {
    let raw = decode_string(method, value)?;
    let digits = raw
        .strip_prefix("0x")
        .ok_or_else(|| ProviderError::malformed(method, format!("quantity without 0x prefix: {}", raw)))?;
    U256::from_str_radix(digits, 16).map_err(|e| ProviderError::malformed(method, e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_from_rpc_codes() {
        assert_eq!(ProviderError::from_rpc(4001, "nope"), ProviderError::UserRejected);
        assert_eq!(
            ProviderError::from_rpc(4902, "unknown chain"),
            ProviderError::UnrecognizedChain("unknown chain".into())
        );
        assert_eq!(
            ProviderError::from_rpc(-32000, "execution reverted"),
            ProviderError::Rpc {
                code: -32000,
                message: "execution reverted".into()
            }
        );
    }

    #[test]
    fn test_decode_accounts() {
        let accounts = decode_accounts("eth_accounts", json!(["0xabc", "0xdef"])).unwrap();
        assert_eq!(accounts, vec!["0xabc", "0xdef"]);

        let err = decode_accounts("eth_accounts", json!("0xabc")).unwrap_err();
        assert!(matches!(err, ProviderError::Malformed { .. }));
    }

    #[test]
    fn test_decode_string() {
        assert_eq!(decode_string("eth_chainId", json!("0xa4b1")).unwrap(), "0xa4b1");
        assert!(decode_string("eth_chainId", json!(42161)).is_err());
    }

    #[test]
    fn test_decode_quantity() {
        let wei = decode_quantity("eth_getBalance", json!("0xde0b6b3a7640000")).unwrap();
        assert_eq!(wei, U256::from(1_000_000_000_000_000_000u128));
        assert_eq!(decode_quantity("eth_getBalance", json!("0x0")).unwrap(), U256::ZERO);
        assert!(decode_quantity("eth_getBalance", json!("1000")).is_err());
    }
}
