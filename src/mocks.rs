//! Scripted wallet provider for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::broadcast;

use crate::events::ProviderEvent;
use crate::provider::{ProviderError, WalletProvider};

type Reply = Result<Value, ProviderError>;

/// A provider whose replies are queued per method.
///
/// Queued replies are consumed in order; once a method's queue is empty the
/// sticky reply set with [`MockProvider::respond`] is returned. Methods with
/// neither fail with an rpc error so a missing script shows up in the test.
pub struct MockProvider {
    available: AtomicBool,
    queued: Mutex<HashMap<String, VecDeque<Reply>>>,
    sticky: Mutex<HashMap<String, Reply>>,
    calls: Mutex<Vec<(String, Value)>>,
    events: broadcast::Sender<ProviderEvent>,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(32);
        Self {
            available: AtomicBool::new(true),
            queued: Mutex::new(HashMap::new()),
            sticky: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            events,
        }
    }

    /// A provider that reports no wallet installed.
    pub fn unavailable() -> Self {
        let mock = Self::new();
        mock.available.store(false, Ordering::SeqCst);
        mock
    }

    /// Always answer `method` with `reply` (after any queued replies).
    pub fn respond(&self, method: &str, reply: Reply) -> &Self {
        self.sticky
            .lock()
            .unwrap()
            .insert(method.to_string(), reply);
        self
    }

    /// Answer the next call to `method` with `reply`.
    pub fn push(&self, method: &str, reply: Reply) -> &Self {
        self.queued
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Deliver an event to every subscriber.
    pub fn emit(&self, event: ProviderEvent) {
        let _ = self.events.send(event);
    }

    /// Every request seen so far, in order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().unwrap().clone()
    }

    /// Params of every call to `method`.
    pub fn calls_to(&self, method: &str) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl WalletProvider for MockProvider {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.calls
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        if let Some(reply) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|q| q.pop_front())
        {
            return reply;
        }

        self.sticky
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or_else(|| {
                Err(ProviderError::Rpc {
                    code: -32601,
                    message: format!("unscripted method {}", method),
                })
            })
    }

    fn subscribe(&self) -> broadcast::Receiver<ProviderEvent> {
        self.events.subscribe()
    }
}
