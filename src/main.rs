use std::sync::Arc;

use chainticket_rs::config::Config;
use chainticket_rs::gateway::{BettingGateway, TicketGateway};
use chainticket_rs::provider::{HttpProvider, WalletProvider};
use chainticket_rs::session::{FileFlagStore, SessionManager};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cfg = Config::load_default()?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.general.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let network = cfg.network();
    info!(chain = network.chain_name, chain_id = network.chain_id, rpc = cfg.rpc_url(), "starting");

    let provider = Arc::new(HttpProvider::new(cfg.rpc_url()));
    if !provider.is_available() {
        anyhow::bail!("no wallet provider at {}", cfg.rpc_url());
    }

    let store = Arc::new(FileFlagStore::new(&cfg.general.data_dir));
    let manager = SessionManager::new(provider.clone(), store, cfg.session_config());
    let listener = manager.spawn_event_listener();

    let address = match manager.probe_existing_session().await {
        Some(address) => address,
        None => manager.connect().await?,
    };
    let session = manager.snapshot().await;
    info!(
        %address,
        chain_id = ?session.chain_id,
        balance = session.balance.as_deref().unwrap_or("-"),
        "wallet connected"
    );

    // Ticket listings
    let mut tickets = TicketGateway::new(provider.clone(), cfg.tickets_address()?, cfg.confirmation_policy());
    tickets.bind(&session);

    let active = tickets.read_active_ids().await?;
    info!(count = active.len(), "active listings");
    for id in active {
        match tickets.read_details(id).await {
            Ok(listing) => info!(
                id,
                name = %listing.name,
                price = %listing.price,
                left = listing.units_left(),
                "listing"
            ),
            Err(e) => warn!(id, error = %e, "failed to read listing"),
        }
    }

    // Betting market, if deployed
    if let Some(betting_address) = cfg.betting_address()? {
        let mut betting = BettingGateway::new(provider.clone(), betting_address, cfg.confirmation_policy());
        betting.bind(&session);

        match betting.contract_info().await {
            Ok(contract) => info!(version = %contract.version, network = %contract.network, "betting contract"),
            Err(e) => warn!(error = %e, "failed to read betting contract info"),
        }
        match betting.platform_fee().await {
            Ok(fee) => info!(%fee, "platform fee percent"),
            Err(e) => warn!(error = %e, "failed to read platform fee"),
        }
        match betting.read_user_holdings(address).await {
            Ok(bets) => info!(count = bets.len(), "bets joined"),
            Err(e) => warn!(error = %e, "failed to read bets"),
        }
    }

    info!("following wallet events (Ctrl+C to quit)");
    tokio::signal::ctrl_c().await?;

    info!("shutting down");
    manager.stop_polling().await;
    listener.abort();
    Ok(())
}
