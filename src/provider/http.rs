use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::sync::broadcast;
use tracing::debug;

use super::{ProviderError, WalletProvider};
use crate::events::ProviderEvent;

#[derive(Debug, Deserialize)]
struct RpcErrorObject {
    code: i64,
    message: String,
}

// JSON-RPC 2.0 response envelope
#[derive(Debug, Deserialize)]
struct RpcResponse {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// JSON-RPC over HTTP against a node that manages its own accounts
/// (a local dev node with unlocked accounts, for instance).
///
/// A plain HTTP endpoint cannot push notifications, so the event stream
/// stays silent for the provider's whole lifetime.
pub struct HttpProvider {
    url: String,
    client: reqwest::Client,
    next_id: AtomicU64,
    events: broadcast::Sender<ProviderEvent>,
}

impl HttpProvider {
    pub fn new(url: impl Into<String>) -> Self {
        let (events, _) = broadcast::channel(16);
        Self {
            url: url.into(),
            client: reqwest::Client::new(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Split a response envelope into its result or error.
fn decode_response(response: RpcResponse) -> Result<Value, ProviderError> {
    if let Some(err) = response.error {
        return Err(ProviderError::from_rpc(err.code, err.message));
    }
    // `null` is a legitimate result (e.g. a receipt that is not mined yet)
    Ok(response.result.unwrap_or(Value::Null))
}

#[async_trait]
impl WalletProvider for HttpProvider {
    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        });

        debug!(id, method, url = %self.url, "rpc request");

        let response = self
            .client
            .post(&self.url)
            .json(&body)
            .send()
            .await
            .map_err(|e| ProviderError::Transport(e.to_string()))?;

        let envelope: RpcResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::malformed(method, e.to_string()))?;

        decode_response(envelope)
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
