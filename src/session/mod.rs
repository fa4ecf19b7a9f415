//! Wallet session manager.
//!
//! Single source of truth for the current connection: which account is
//! authorized, which chain the wallet is on, and the native balance. Provider
//! notifications are folded into the same state.

mod poller;
mod store;

pub use poller::BalancePoller;
pub use store::{FileFlagStore, FlagStore, MemoryFlagStore, StoreError};

use std::sync::{Arc, Weak};
use std::time::Duration;

use alloy_primitives::Address;
use serde_json::json;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::events::{parse_chain_id, ProviderEvent};
use crate::network::NetworkConfig;
use crate::provider::{decode_accounts, decode_quantity, decode_string, ProviderError, WalletProvider};
use crate::units::{format_amount, DISPLAY_DECIMALS};

pub const NOT_INSTALLED_MSG: &str = "No wallet provider detected. Install a Web3 wallet to continue.";
pub const REJECTED_MSG: &str = "Connection rejected by user";
pub const CONNECT_FAILED_MSG: &str = "Failed to connect wallet";

/// Snapshot of the connection state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    pub address: Option<Address>,
    pub chain_id: Option<u64>,
    /// Advisory only: concurrent `connect` calls are not deduplicated.
    pub is_connecting: bool,
    /// Native balance as a decimal string, e.g. "0.05"
    pub balance: Option<String>,
    pub error: Option<String>,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.address.is_some()
    }

    /// True when no connection field is populated.
    pub fn is_empty(&self) -> bool {
        self.address.is_none() && self.chain_id.is_none() && self.balance.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Refresh the balance on this period while connected. `None` disables polling.
    pub balance_poll_interval: Option<Duration>,
    /// Fractional digits kept in `Session::balance`.
    pub display_decimals: usize,
    /// Switch (or add) this network as part of `connect`.
    pub required_network: Option<&'static NetworkConfig>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            balance_poll_interval: Some(Duration::from_secs(15)),
            display_decimals: DISPLAY_DECIMALS,
            required_network: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no wallet provider detected")]
    NotInstalled,

    #[error("connection rejected by user")]
    Rejected,

    #[error("wallet returned no accounts")]
    NoAccounts,

    #[error("invalid account {0:?}")]
    InvalidAccount(String),

    #[error("failed to switch wallet to {network}: {source}")]
    Network {
        network: &'static str,
        source: ProviderError,
    },

    #[error(transparent)]
    Provider(ProviderError),
}

impl From<ProviderError> for SessionError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::UserRejected => SessionError::Rejected,
            ProviderError::Unavailable => SessionError::NotInstalled,
            other => SessionError::Provider(other),
        }
    }
}

struct State {
    session: Session,
    // Bumped whenever the session is reset or the account / chain changes.
    // A balance read started under an older generation is discarded.
    generation: u64,
}

struct Inner<P> {
    provider: Arc<P>,
    store: Arc<dyn FlagStore>,
    config: SessionConfig,
    state: RwLock<State>,
    poller: Mutex<Option<BalancePoller>>,
}

/// Owns the wallet session. Cheap to clone; clones share state.
pub struct SessionManager<P> {
    inner: Arc<Inner<P>>,
}

impl<P> Clone for SessionManager<P> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<P: WalletProvider + 'static> SessionManager<P> {
    pub fn new(provider: Arc<P>, store: Arc<dyn FlagStore>, config: SessionConfig) -> Self {
        Self {
            inner: Arc::new(Inner {
                provider,
                store,
                config,
                state: RwLock::new(State {
                    session: Session::default(),
                    generation: 0,
                }),
                poller: Mutex::new(None),
            }),
        }
    }

    pub fn provider(&self) -> &Arc<P> {
        &self.inner.provider
    }

    pub async fn snapshot(&self) -> Session {
        self.inner.state.read().await.session.clone()
    }

    pub async fn is_polling(&self) -> bool {
        self.inner
            .poller
            .lock()
            .await
            .as_ref()
            .is_some_and(|p| !p.is_finished())
    }

    // =========================================================================
    // CONNECT / DISCONNECT
    // =========================================================================

    /// Pick up an already-authorized account without prompting the user.
    ///
    /// Does nothing if the user explicitly disconnected earlier. Failures are
    /// logged and leave the session empty.
    pub async fn probe_existing_session(&self) -> Option<Address> {
        match self.inner.store.is_set() {
            Ok(true) => {
                debug!("wallet explicitly disconnected, skipping probe");
                return None;
            }
            Ok(false) => {}
            Err(e) => warn!(error = %e, "failed to read disconnected flag"),
        }

        if !self.inner.provider.is_available() {
            debug!("no wallet provider, skipping probe");
            return None;
        }

        let accounts = match self.request_accounts("eth_accounts").await {
            Ok(accounts) => accounts,
            Err(e) => {
                warn!(error = %e, "failed to probe existing accounts");
                return None;
            }
        };

        let address = match first_account(&accounts) {
            Ok(Some(address)) => address,
            Ok(None) => {
                debug!("no authorized accounts");
                return None;
            }
            Err(e) => {
                warn!(error = %e, "wallet reported an invalid account");
                return None;
            }
        };

        let chain_id = match self.read_chain_id().await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to read chain id");
                None
            }
        };

        self.populate(address, chain_id).await;
        info!(%address, ?chain_id, "restored wallet session");

        self.refresh_balance().await;
        self.start_polling().await;
        Some(address)
    }

    /// Request account access, prompting the user if needed.
    ///
    /// The outcome is recorded in the session (`error` on failure) and also
    /// returned so callers can show it inline. Any failure other than a user
    /// rejection resets every field.
    pub async fn connect(&self) -> Result<Address, SessionError> {
        if !self.inner.provider.is_available() {
            self.inner.state.write().await.session.error = Some(NOT_INSTALLED_MSG.to_string());
            return Err(SessionError::NotInstalled);
        }

        {
            let mut state = self.inner.state.write().await;
            state.session.is_connecting = true;
            state.session.error = None;
        }

        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "failed to clear disconnected flag");
        }

        match self.establish().await {
            Ok((address, chain_id)) => {
                self.populate(address, chain_id).await;
                info!(%address, ?chain_id, "wallet connected");

                self.refresh_balance().await;
                self.start_polling().await;
                Ok(address)
            }
            Err(err) => {
                let message = match err {
                    SessionError::Rejected
                    | SessionError::Network {
                        source: ProviderError::UserRejected,
                        ..
                    } => {
                        info!("wallet connection rejected by user");
                        REJECTED_MSG
                    }
                    _ => {
                        error!(error = %err, "wallet connection failed");
                        CONNECT_FAILED_MSG
                    }
                };
                self.reset(Some(message.to_string())).await;
                Err(err)
            }
        }
    }

    /// Clear the session and remember that the user asked for it, so the next
    /// probe does not silently reconnect.
    pub async fn disconnect(&self) {
        self.reset(None).await;
        if let Err(e) = self.inner.store.set() {
            warn!(error = %e, "failed to persist disconnected flag");
        }
        info!("wallet disconnected");
    }

    /// Stop background balance refreshes without touching the session.
    pub async fn stop_polling(&self) {
        if let Some(poller) = self.inner.poller.lock().await.take() {
            poller.stop();
            debug!("balance polling stopped");
        }
    }

    /// Switch the wallet to `network`, adding it first if the wallet does not
    /// know it.
    pub async fn ensure_network(&self, network: &'static NetworkConfig) -> Result<(), SessionError> {
        self.switch_network(network).await?;

        match self.read_chain_id().await {
            Ok(id) => {
                let mut state = self.inner.state.write().await;
                if state.session.is_connected() && state.session.chain_id != Some(id) {
                    state.session.chain_id = Some(id);
                    state.generation += 1;
                }
            }
            Err(e) => warn!(error = %e, "failed to read chain id after switch"),
        }
        Ok(())
    }

    // =========================================================================
    // BALANCE
    // =========================================================================

    /// Re-read the native balance of the current account.
    ///
    /// No-op while disconnected. Failures are logged and the previous balance
    /// is kept.
    pub async fn refresh_balance(&self) {
        let (address, generation) = {
            let state = self.inner.state.read().await;
            match state.session.address {
                Some(address) => (address, state.generation),
                None => return,
            }
        };

        let result = self
            .inner
            .provider
            .request("eth_getBalance", json!([address.to_string(), "latest"]))
            .await
            .and_then(|v| decode_quantity("eth_getBalance", v));

        match result {
            Ok(wei) => {
                let mut state = self.inner.state.write().await;
                if state.generation != generation {
                    debug!(%address, "discarding balance read from a previous session");
                    return;
                }
                state.session.balance = Some(format_amount(wei, self.inner.config.display_decimals));
            }
            Err(e) => warn!(%address, error = %e, "failed to refresh balance"),
        }
    }

    // =========================================================================
    // PROVIDER EVENTS
    // =========================================================================

    /// Apply one provider notification to the session.
    pub async fn handle_event(&self, event: ProviderEvent) {
        debug!(event = event.name(), "provider event");

        match event {
            ProviderEvent::AccountsChanged(accounts) if accounts.is_empty() => {
                info!("wallet reported no accounts, disconnecting");
                self.disconnect().await;
            }
            ProviderEvent::AccountsChanged(accounts) => {
                let address = match first_account(&accounts) {
                    Ok(Some(address)) => address,
                    Ok(None) => return,
                    Err(e) => {
                        warn!(error = %e, "ignoring invalid account change");
                        return;
                    }
                };

                let needs_chain = {
                    let mut state = self.inner.state.write().await;
                    if state.session.address != Some(address) {
                        state.session.address = Some(address);
                        state.session.balance = None;
                        state.generation += 1;
                    }
                    state.session.chain_id.is_none()
                };
                info!(%address, "active account changed");

                if let Err(e) = self.inner.store.clear() {
                    warn!(error = %e, "failed to clear disconnected flag");
                }

                if needs_chain {
                    if let Ok(id) = self.read_chain_id().await {
                        self.inner.state.write().await.session.chain_id = Some(id);
                    }
                }

                self.refresh_balance().await;
                self.start_polling().await;
            }
            ProviderEvent::ChainChanged(raw) => {
                let Some(chain_id) = parse_chain_id(&raw) else {
                    warn!(chain = %raw, "ignoring unparseable chain id");
                    return;
                };

                {
                    let mut state = self.inner.state.write().await;
                    if !state.session.is_connected() {
                        debug!(chain_id, "ignoring chain change while disconnected");
                        return;
                    }
                    state.session.chain_id = Some(chain_id);
                    state.generation += 1;
                }
                info!(chain_id, "chain changed");

                self.refresh_balance().await;
            }
            ProviderEvent::Disconnect => {
                info!("provider disconnected");
                self.reset(None).await;
            }
        }
    }

    /// Forward provider notifications into [`Self::handle_event`] on a
    /// background task.
    ///
    /// The task holds only a weak reference to the session and exits once every
    /// `SessionManager` clone has been dropped and the next event arrives.
    pub fn spawn_event_listener(&self) -> JoinHandle<()> {
        let mut rx = self.inner.provider.subscribe();
        let weak: Weak<Inner<P>> = Arc::downgrade(&self.inner);

        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else { break };
                        SessionManager { inner }.handle_event(event).await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "provider event listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("provider event listener stopped");
        })
    }

    // =========================================================================
    // INTERNALS
    // =========================================================================

    async fn establish(&self) -> Result<(Address, Option<u64>), SessionError> {
        let accounts = self.request_accounts("eth_requestAccounts").await?;
        let address = first_account(&accounts)?.ok_or(SessionError::NoAccounts)?;

        if let Some(network) = self.inner.config.required_network {
            self.switch_network(network).await?;
        }

        let chain_id = self.read_chain_id().await?;
        Ok((address, Some(chain_id)))
    }

    async fn switch_network(&self, network: &'static NetworkConfig) -> Result<(), SessionError> {
        let provider = &self.inner.provider;
        let to_session_error = |source| SessionError::Network {
            network: network.chain_name,
            source,
        };

        match provider
            .request("wallet_switchEthereumChain", network.switch_params())
            .await
        {
            Ok(_) => Ok(()),
            Err(ProviderError::UnrecognizedChain(_)) => {
                info!(chain = network.chain_name, "network unknown to wallet, adding it");
                provider
                    .request("wallet_addEthereumChain", network.add_params())
                    .await
                    .map(|_| ())
                    .map_err(to_session_error)
            }
            Err(e) => Err(to_session_error(e)),
        }
    }

    async fn request_accounts(&self, method: &str) -> Result<Vec<String>, ProviderError> {
        let value = self.inner.provider.request(method, json!([])).await?;
        decode_accounts(method, value)
    }

    async fn read_chain_id(&self) -> Result<u64, ProviderError> {
        let value = self.inner.provider.request("eth_chainId", json!([])).await?;
        let raw = decode_string("eth_chainId", value)?;
        parse_chain_id(&raw).ok_or_else(|| ProviderError::malformed("eth_chainId", raw))
    }

    async fn populate(&self, address: Address, chain_id: Option<u64>) {
        let mut state = self.inner.state.write().await;
        state.generation += 1;
        state.session = Session {
            address: Some(address),
            chain_id,
            is_connecting: false,
            balance: None,
            error: None,
        };
    }

    async fn reset(&self, error: Option<String>) {
        if let Some(poller) = self.inner.poller.lock().await.take() {
            poller.stop();
        }

        let mut state = self.inner.state.write().await;
        state.generation += 1;
        state.session = Session {
            error,
            ..Session::default()
        };
    }

    async fn start_polling(&self) {
        let Some(interval) = self.inner.config.balance_poll_interval else {
            return;
        };

        let mut slot = self.inner.poller.lock().await;
        if slot.as_ref().is_some_and(|p| !p.is_finished()) {
            return;
        }

        let weak = Arc::downgrade(&self.inner);
        *slot = Some(BalancePoller::spawn(interval, move || {
            let weak = weak.clone();
            async move {
                match weak.upgrade() {
                    Some(inner) => {
                        SessionManager { inner }.refresh_balance().await;
                        true
                    }
                    None => false,
                }
            }
        }));
        debug!(?interval, "balance polling started");
    }
}

/// First entry of an accounts list, parsed as an address.
fn first_account(accounts: &[String]) -> Result<Option<Address>, SessionError> {
    match accounts.first() {
        Some(raw) => raw
            .parse::<Address>()
            .map(Some)
            .map_err(|_| SessionError::InvalidAccount(raw.clone())),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::MockProvider;
    use crate::network::ARBITRUM_SEPOLIA;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tokio::sync::Notify;

    const ALICE: &str = "0x1111111111111111111111111111111111111111";
    const BOB: &str = "0x2222222222222222222222222222222222222222";
    // 1 ETH in wei
    const ONE_ETH_HEX: &str = "0xde0b6b3a7640000";

    fn alice() -> Address {
        ALICE.parse().unwrap()
    }

    fn scripted_wallet() -> MockProvider {
        let mock = MockProvider::new();
        mock.respond("eth_requestAccounts", Ok(json!([ALICE])));
        mock.respond("eth_accounts", Ok(json!([ALICE])));
        mock.respond("eth_chainId", Ok(json!("0xa4b1")));
        mock.respond("eth_getBalance", Ok(json!(ONE_ETH_HEX)));
        mock
    }

    fn wallet() -> Arc<MockProvider> {
        Arc::new(scripted_wallet())
    }

    /// Holds `eth_getBalance` open until released, once `hold` is set.
    struct HeldBalance {
        inner: MockProvider,
        hold: AtomicBool,
        started: Notify,
        release: Notify,
    }

    #[async_trait::async_trait]
    impl WalletProvider for HeldBalance {
        async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
            if method == "eth_getBalance" && self.hold.load(Ordering::SeqCst) {
                self.started.notify_one();
                self.release.notified().await;
            }
            self.inner.request(method, params).await
        }

        fn subscribe(&self) -> tokio::sync::broadcast::Receiver<ProviderEvent> {
            self.inner.subscribe()
        }
    }

    fn no_polling() -> SessionConfig {
        SessionConfig {
            balance_poll_interval: None,
            ..SessionConfig::default()
        }
    }

    fn manager(
        provider: Arc<MockProvider>,
        config: SessionConfig,
    ) -> (SessionManager<MockProvider>, Arc<MemoryFlagStore>) {
        let store = Arc::new(MemoryFlagStore::new());
        (SessionManager::new(provider, store.clone(), config), store)
    }

    #[tokio::test]
    async fn test_connect_populates_session() {
        let (session, _) = manager(wallet(), no_polling());

        let address = session.connect().await.unwrap();
        assert_eq!(address, alice());

        let snap = session.snapshot().await;
        assert!(snap.is_connected());
        assert!(!snap.is_connecting);
        assert_eq!(snap.chain_id, Some(42161));
        assert_eq!(snap.balance.as_deref(), Some("1.0"));
        assert_eq!(snap.error, None);
    }

    #[tokio::test]
    async fn test_disconnect_then_probe_stays_empty() {
        let provider = wallet();
        let (session, store) = manager(provider.clone(), no_polling());

        session.connect().await.unwrap();
        session.disconnect().await;
        assert!(store.is_set().unwrap());

        assert_eq!(session.probe_existing_session().await, None);
        let snap = session.snapshot().await;
        assert!(snap.is_empty());
        assert!(!snap.is_connected());
        // the flag short-circuits before any provider call
        assert!(provider.calls_to("eth_accounts").is_empty());
    }

    #[tokio::test]
    async fn test_probe_restores_authorized_account() {
        let provider = wallet();
        let (session, _) = manager(provider.clone(), no_polling());

        assert_eq!(session.probe_existing_session().await, Some(alice()));
        let snap = session.snapshot().await;
        assert_eq!(snap.address, Some(alice()));
        assert_eq!(snap.balance.as_deref(), Some("1.0"));
        // no prompt
        assert!(provider.calls_to("eth_requestAccounts").is_empty());
    }

    #[tokio::test]
    async fn test_probe_with_no_accounts() {
        let provider = wallet();
        provider.push("eth_accounts", Ok(json!([])));
        let (session, _) = manager(provider, no_polling());

        assert_eq!(session.probe_existing_session().await, None);
        assert!(session.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn test_connect_clears_disconnected_flag() {
        let (session, store) = manager(wallet(), no_polling());
        store.set().unwrap();

        session.connect().await.unwrap();
        assert!(!store.is_set().unwrap());
    }

    #[tokio::test]
    async fn test_connect_rejected_by_user() {
        let provider = wallet();
        provider.push("eth_requestAccounts", Err(ProviderError::UserRejected));
        let (session, _) = manager(provider, no_polling());

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Rejected));

        let snap = session.snapshot().await;
        assert!(snap.is_empty());
        assert!(!snap.is_connecting);
        assert_eq!(snap.error.as_deref(), Some(REJECTED_MSG));
    }

    #[tokio::test]
    async fn test_connect_failure_resets_everything() {
        let provider = wallet();
        let (session, _) = manager(provider.clone(), no_polling());
        session.connect().await.unwrap();

        provider.push("eth_chainId", Err(ProviderError::Transport("connection reset".into())));
        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::Provider(ProviderError::Transport(_))));

        let snap = session.snapshot().await;
        assert_eq!(snap.address, None);
        assert_eq!(snap.chain_id, None);
        assert_eq!(snap.balance, None);
        assert_eq!(snap.error.as_deref(), Some(CONNECT_FAILED_MSG));
    }

    #[tokio::test]
    async fn test_connect_without_wallet() {
        let provider = Arc::new(MockProvider::unavailable());
        let (session, _) = manager(provider.clone(), no_polling());

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::NotInstalled));
        assert_eq!(session.snapshot().await.error.as_deref(), Some(NOT_INSTALLED_MSG));
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_connect_with_empty_account_list() {
        let provider = wallet();
        provider.push("eth_requestAccounts", Ok(json!([])));
        let (session, _) = manager(provider, no_polling());

        let err = session.connect().await.unwrap_err();
        assert!(matches!(err, SessionError::NoAccounts));
        assert_eq!(session.snapshot().await.error.as_deref(), Some(CONNECT_FAILED_MSG));
    }

    #[tokio::test]
    async fn test_empty_accounts_event_clears_session() {
        let (session, store) = manager(wallet(), no_polling());
        session.connect().await.unwrap();

        session.handle_event(ProviderEvent::AccountsChanged(vec![])).await;

        let snap = session.snapshot().await;
        assert_eq!(snap.address, None);
        assert_eq!(snap.chain_id, None);
        assert_eq!(snap.balance, None);
        assert!(store.is_set().unwrap());
    }

    #[tokio::test]
    async fn test_accounts_event_switches_account() {
        let provider = wallet();
        let (session, store) = manager(provider, no_polling());
        session.connect().await.unwrap();
        store.set().unwrap();

        session
            .handle_event(ProviderEvent::AccountsChanged(vec![BOB.to_string()]))
            .await;

        let snap = session.snapshot().await;
        assert_eq!(snap.address, Some(BOB.parse().unwrap()));
        assert_eq!(snap.chain_id, Some(42161));
        assert_eq!(snap.balance.as_deref(), Some("1.0"));
        assert!(!store.is_set().unwrap());
    }

    #[tokio::test]
    async fn test_chain_changed_keeps_account() {
        let (session, _) = manager(wallet(), no_polling());
        session.connect().await.unwrap();

        session
            .handle_event(ProviderEvent::ChainChanged("0x66eee".to_string()))
            .await;

        let snap = session.snapshot().await;
        assert_eq!(snap.chain_id, Some(421614));
        assert_eq!(snap.address, Some(alice()));
    }

    #[tokio::test]
    async fn test_chain_changed_while_disconnected_is_ignored() {
        let provider = wallet();
        let (session, _) = manager(provider.clone(), no_polling());
        session.connect().await.unwrap();
        session.disconnect().await;
        let balance_reads = provider.calls_to("eth_getBalance").len();

        session
            .handle_event(ProviderEvent::ChainChanged("0x66eee".to_string()))
            .await;

        let snap = session.snapshot().await;
        assert!(snap.is_empty());
        assert_eq!(snap.chain_id, None);
        assert_eq!(provider.calls_to("eth_getBalance").len(), balance_reads);
    }

    #[tokio::test]
    async fn test_balance_read_finishing_after_disconnect_is_discarded() {
        let provider = Arc::new(HeldBalance {
            inner: scripted_wallet(),
            hold: AtomicBool::new(false),
            started: Notify::new(),
            release: Notify::new(),
        });
        let session = SessionManager::new(provider.clone(), Arc::new(MemoryFlagStore::new()), no_polling());
        session.connect().await.unwrap();
        assert_eq!(session.snapshot().await.balance.as_deref(), Some("1.0"));

        provider.hold.store(true, Ordering::SeqCst);
        let refresh = tokio::spawn({
            let session = session.clone();
            async move { session.refresh_balance().await }
        });
        provider.started.notified().await;

        session.disconnect().await;
        provider.release.notify_one();
        refresh.await.unwrap();

        let snap = session.snapshot().await;
        assert!(snap.is_empty());
        assert_eq!(snap.balance, None);
    }

    #[tokio::test]
    async fn test_rejected_network_switch_reports_rejection() {
        let provider = wallet();
        provider.push("wallet_switchEthereumChain", Err(ProviderError::UserRejected));
        let config = SessionConfig {
            required_network: Some(&ARBITRUM_SEPOLIA),
            ..no_polling()
        };
        let (session, store) = manager(provider, config);

        let err = session.connect().await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Network {
                source: ProviderError::UserRejected,
                ..
            }
        ));
        let snap = session.snapshot().await;
        assert!(snap.address.is_none());
        assert_eq!(snap.error.as_deref(), Some(REJECTED_MSG));
        assert!(!store.is_set().unwrap());
    }

    #[tokio::test]
    async fn test_provider_disconnect_event() {
        let (session, store) = manager(wallet(), no_polling());
        session.connect().await.unwrap();

        session.handle_event(ProviderEvent::Disconnect).await;

        assert!(session.snapshot().await.is_empty());
        // not a user action, so the next probe may reconnect
        assert!(!store.is_set().unwrap());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_stale_balance() {
        let provider = wallet();
        let (session, _) = manager(provider.clone(), no_polling());
        session.connect().await.unwrap();

        provider.push("eth_getBalance", Err(ProviderError::Transport("timeout".into())));
        session.refresh_balance().await;

        let snap = session.snapshot().await;
        assert_eq!(snap.balance.as_deref(), Some("1.0"));
        assert_eq!(snap.error, None);
    }

    #[tokio::test]
    async fn test_refresh_without_address_is_noop() {
        let provider = wallet();
        let (session, _) = manager(provider.clone(), no_polling());

        session.refresh_balance().await;
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn test_polling_tied_to_session() {
        let config = SessionConfig {
            balance_poll_interval: Some(Duration::from_secs(60)),
            ..SessionConfig::default()
        };
        let (session, _) = manager(wallet(), config);

        assert!(!session.is_polling().await);
        session.connect().await.unwrap();
        assert!(session.is_polling().await);

        session.disconnect().await;
        assert!(!session.is_polling().await);

        session.connect().await.unwrap();
        assert!(session.is_polling().await);
        session.stop_polling().await;
        assert!(!session.is_polling().await);
        assert!(session.snapshot().await.is_connected());
    }

    #[tokio::test]
    async fn test_event_listener_applies_events() {
        let provider = wallet();
        let (session, _) = manager(provider.clone(), no_polling());
        session.connect().await.unwrap();

        let listener = session.spawn_event_listener();
        provider.emit(ProviderEvent::ChainChanged("0x66eee".to_string()));

        let mut chain_id = None;
        for _ in 0..100 {
            chain_id = session.snapshot().await.chain_id;
            if chain_id == Some(421614) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(chain_id, Some(421614));
        listener.abort();
    }

    #[tokio::test]
    async fn test_ensure_network_adds_unknown_chain() {
        let provider = wallet();
        provider.push(
            "wallet_switchEthereumChain",
            Err(ProviderError::UnrecognizedChain("Unrecognized chain ID".into())),
        );
        provider.respond("wallet_addEthereumChain", Ok(serde_json::Value::Null));
        let (session, _) = manager(provider.clone(), no_polling());

        session.ensure_network(&ARBITRUM_SEPOLIA).await.unwrap();

        let added = provider.calls_to("wallet_addEthereumChain");
        assert_eq!(added.len(), 1);
        assert_eq!(added[0][0]["chainId"], "0x66eee");
    }

    #[tokio::test]
    async fn test_ensure_network_failure_surfaces() {
        let provider = wallet();
        provider.push(
            "wallet_switchEthereumChain",
            Err(ProviderError::UnrecognizedChain("Unrecognized chain ID".into())),
        );
        provider.push("wallet_addEthereumChain", Err(ProviderError::UserRejected));
        let (session, _) = manager(provider, no_polling());

        let err = session.ensure_network(&ARBITRUM_SEPOLIA).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Network {
                network: "Arbitrum Sepolia",
                source: ProviderError::UserRejected
            }
        ));
    }

    #[tokio::test]
    async fn test_connect_with_required_network() {
        let provider = wallet();
        provider.respond("wallet_switchEthereumChain", Ok(serde_json::Value::Null));
        provider.push("eth_chainId", Ok(json!("0x66eee")));
        let config = SessionConfig {
            required_network: Some(&ARBITRUM_SEPOLIA),
            ..no_polling()
        };
        let (session, _) = manager(provider.clone(), config);

        session.connect().await.unwrap();
        assert_eq!(session.snapshot().await.chain_id, Some(421614));
        assert_eq!(provider.calls_to("wallet_switchEthereumChain").len(), 1);
    }

    #[tokio::test]
    async fn test_connect_network_failure_resets() {
        let provider = wallet();
        provider.push(
            "wallet_switchEthereumChain",
            Err(ProviderError::Rpc {
                code: -32002,
                message: "request already pending".into(),
            }),
        );
        let config = SessionConfig {
            required_network: Some(&ARBITRUM_SEPOLIA),
            ..no_polling()
        };
        let (session, _) = manager(provider, config);

        assert!(session.connect().await.is_err());
        let snap = session.snapshot().await;
        assert!(snap.is_empty());
        assert_eq!(snap.error.as_deref(), Some(CONNECT_FAILED_MSG));
    }
}
