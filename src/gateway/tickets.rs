use std::sync::Arc;

use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, U256};
use futures_util::future::try_join_all;
use tracing::{debug, info};

use super::{to_u64, ConfirmationPolicy, ContractClient, GatewayError, RawLog, TxReceipt};
use crate::provider::WalletProvider;
use crate::session::Session;
use crate::units::{format_amount, parse_amount, NATIVE_DECIMALS};

sol! {
    /// Event-ticket NFT marketplace.
    interface IEventTicket {
        function createEvent(string name, string description, uint256 price, uint256 maxTickets) external returns (uint256);
        function purchaseTicket(uint256 eventId) external payable returns (uint256);
        function cancelEvent(uint256 eventId) external;

        function getEventDetails(uint256 eventId) external view returns (string, string, uint256, uint256, uint256, bool);
        function getActiveEvents() external view returns (uint256[]);
        function balanceOf(address owner) external view returns (uint256);
        function tokenOfOwnerByIndex(address owner, uint256 index) external view returns (uint256);
        function getTicketEvent(uint256 tokenId) external view returns (uint256);

        event EventCreated(uint256 indexed eventId, string name, uint256 price, uint256 maxTickets);
        event TicketPurchased(uint256 indexed eventId, uint256 indexed tokenId, address buyer, uint256 price);
        event EventCancelled(uint256 indexed eventId);
    }
}

/// Positional result of `getEventDetails`.
pub type EventDetailsTuple = (String, String, U256, U256, U256, bool);

/// A ticketed event as stored by the contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDetails {
    pub name: String,
    pub description: String,
    /// Ticket price as a decimal string ("0.05")
    pub price: String,
    pub price_wei: U256,
    pub max_units: u64,
    pub units_sold: u64,
    pub is_active: bool,
}

impl EventDetails {
    /// Map the contract's 6-tuple in declaration order.
    pub fn from_tuple(tuple: EventDetailsTuple) -> Result<Self, GatewayError> {
        const METHOD: &str = "getEventDetails(uint256)";
        let (name, description, price_wei, max_units, units_sold, is_active) = tuple;
        Ok(Self {
            name,
            description,
            price: format_amount(price_wei, NATIVE_DECIMALS),
            price_wei,
            max_units: to_u64(METHOD, max_units)?,
            units_sold: to_u64(METHOD, units_sold)?,
            is_active,
        })
    }

    pub fn units_left(&self) -> u64 {
        self.max_units.saturating_sub(self.units_sold)
    }

    pub fn is_sold_out(&self) -> bool {
        self.units_left() == 0
    }
}

/// A ticket NFT held by an account, with the event it admits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OwnedTicket {
    pub token_id: U256,
    pub event_id: u64,
    pub event: EventDetails,
}

/// Decoded contract notifications.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TicketEvent {
    Created {
        event_id: U256,
        name: String,
        price: U256,
        max_tickets: U256,
    },
    Purchased {
        event_id: U256,
        token_id: U256,
        buyer: Address,
        price: U256,
    },
    Cancelled {
        event_id: U256,
    },
}

impl TicketEvent {
    /// Decode a log from the ticket contract. Unknown topics yield `None`.
    pub fn decode(log: &RawLog) -> Option<Result<Self, GatewayError>> {
        let topic0 = *log.topics.first()?;
        let topics = log.topics.iter().copied();

        let decoded = if topic0 == IEventTicket::EventCreated::SIGNATURE_HASH {
            IEventTicket::EventCreated::decode_raw_log(topics, &log.data).map(|e| TicketEvent::Created {
                event_id: e.eventId,
                name: e.name,
                price: e.price,
                max_tickets: e.maxTickets,
            })
        } else if topic0 == IEventTicket::TicketPurchased::SIGNATURE_HASH {
            IEventTicket::TicketPurchased::decode_raw_log(topics, &log.data).map(|e| TicketEvent::Purchased {
                event_id: e.eventId,
                token_id: e.tokenId,
                buyer: e.buyer,
                price: e.price,
            })
        } else if topic0 == IEventTicket::EventCancelled::SIGNATURE_HASH {
            IEventTicket::EventCancelled::decode_raw_log(topics, &log.data)
                .map(|e| TicketEvent::Cancelled { event_id: e.eventId })
        } else {
            return None;
        };

        Some(decoded.map_err(|e| GatewayError::decode("eth_getLogs", e)))
    }
}

/// Gateway to the event-ticket contract.
pub struct TicketGateway<P> {
    client: ContractClient<P>,
}

impl<P: WalletProvider> TicketGateway<P> {
    pub fn new(provider: Arc<P>, contract: Address, confirmation: ConfirmationPolicy) -> Self {
        Self {
            client: ContractClient::new(provider, contract, confirmation),
        }
    }

    pub fn bind(&mut self, session: &Session) {
        self.client.bind(session);
    }

    pub fn client(&self) -> &ContractClient<P> {
        &self.client
    }

    // =========================================================================
    // TRANSACTIONS
    // =========================================================================

    /// Create a ticketed event. `price` is per ticket, in ETH ("0.05").
    pub async fn create_listing(
        &self,
        name: &str,
        description: &str,
        price: &str,
        max_units: u64,
    ) -> Result<TxReceipt, GatewayError> {
        self.client.handle()?;
        let price_wei = parse_amount(price)?;
        info!(name, %price_wei, max_units, "creating event");

        let call = IEventTicket::createEventCall {
            name: name.to_string(),
            description: description.to_string(),
            price: price_wei,
            maxTickets: U256::from(max_units),
        };
        self.client.send(&call, U256::ZERO).await
    }

    /// Buy one ticket, attaching `price` ETH as payment.
    pub async fn purchase(&self, listing_id: u64, price: &str) -> Result<TxReceipt, GatewayError> {
        self.client.handle()?;
        let value = parse_amount(price)?;
        info!(listing_id, %value, "purchasing ticket");

        let call = IEventTicket::purchaseTicketCall {
            eventId: U256::from(listing_id),
        };
        self.client.send(&call, value).await
    }

    pub async fn cancel(&self, listing_id: u64) -> Result<TxReceipt, GatewayError> {
        info!(listing_id, "cancelling event");
        let call = IEventTicket::cancelEventCall {
            eventId: U256::from(listing_id),
        };
        self.client.send(&call, U256::ZERO).await
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn read_details(&self, listing_id: u64) -> Result<EventDetails, GatewayError> {
        let call = IEventTicket::getEventDetailsCall {
            eventId: U256::from(listing_id),
        };
        let r = self.client.call(&call).await?;
        EventDetails::from_tuple((r._0, r._1, r._2, r._3, r._4, r._5))
    }

    pub async fn read_active_ids(&self) -> Result<Vec<u64>, GatewayError> {
        let ids = self
            .client
            .call(&IEventTicket::getActiveEventsCall {})
            .await?;
        ids.into_iter()
            .map(|id| to_u64("getActiveEvents()", id))
            .collect()
    }

    /// Every ticket held by `owner`, resolved to its event.
    pub async fn read_user_holdings(&self, owner: Address) -> Result<Vec<OwnedTicket>, GatewayError> {
        let count = self
            .client
            .call(&IEventTicket::balanceOfCall { owner })
            .await?;
        let count = to_u64("balanceOf(address)", count)?;
        debug!(%owner, count, "reading ticket holdings");

        let token_ids = try_join_all((0..count).map(|i| async move {
            self.client
                .call(&IEventTicket::tokenOfOwnerByIndexCall {
                    owner,
                    index: U256::from(i),
                })
                .await
        }))
        .await?;

        let event_ids = try_join_all(token_ids.iter().map(|&token_id| async move {
            self.client
                .call(&IEventTicket::getTicketEventCall { tokenId: token_id })
                .await
        }))
        .await?
        .into_iter()
        .map(|id| to_u64("getTicketEvent(uint256)", id))
        .collect::<Result<Vec<_>, _>>()?;

        let events = try_join_all(event_ids.iter().map(|&id| self.read_details(id))).await?;

        Ok(token_ids
            .into_iter()
            .zip(event_ids)
            .zip(events)
            .map(|((token_id, event_id), event)| OwnedTicket {
                token_id,
                event_id,
                event,
            })
            .collect())
    }

    /// Decoded contract events since `from_block`. Logs with unknown topics
    /// are skipped.
    pub async fn fetch_events(&self, from_block: u64) -> Result<Vec<TicketEvent>, GatewayError> {
        let logs = self.client.logs(from_block).await?;
        logs.iter().filter_map(TicketEvent::decode).collect()
    }
}
