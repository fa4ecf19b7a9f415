use std::sync::Arc;

use alloy::sol;
use alloy::sol_types::SolEvent;
use alloy_primitives::{Address, U256};
use chrono::{DateTime, Utc};
use futures_util::future::try_join_all;
use rust_decimal::Decimal;
use tracing::info;

use super::{to_u64, ConfirmationPolicy, ContractClient, GatewayError, RawLog, TxReceipt};
use crate::provider::WalletProvider;
use crate::session::Session;
use crate::units::{format_amount, parse_amount, NATIVE_DECIMALS};

sol! {
    /// Pari-mutuel betting market.
    interface IBettingEcosystem {
        function createBet(string description, uint256 outcomeCount, uint256 durationInMinutes) external;
        function placeBet(uint256 betId, uint256 outcomeId) external payable;
        function resolveBet(uint256 betId, uint256 winningOutcome) external;
        function cancelBet(uint256 betId) external;
        function claimRewards(uint256 betId) external;

        function bets(uint256 betId) external view returns (uint256, string, uint256, uint256, uint256, bool, uint256, address, bool);
        function getUserBets(address user) external view returns (uint256[]);
        function getUserBetAmount(uint256 betId, uint256 outcomeId, address user) external view returns (uint256);
        function getContractInfo() external view returns (string, string);
        function platformFeePercent() external view returns (uint256);

        event BetCreated(uint256 indexed betId, string description, uint256 outcomeCount, uint256 deadline);
        event BetPlaced(uint256 indexed betId, uint256 outcomeId, address bettor, uint256 amount);
        event BetResolved(uint256 indexed betId, uint256 winningOutcome);
        event BetCancelled(uint256 indexed betId);
    }
}

/// Positional result of `bets(uint256)`.
pub type BetTuple = (U256, String, U256, U256, U256, bool, U256, Address, bool);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bet {
    pub id: u64,
    pub description: String,
    /// Total staked across all outcomes, as a decimal string
    pub total_bet_amount: String,
    pub total_bet_wei: U256,
    pub outcome_count: u64,
    pub deadline: DateTime<Utc>,
    pub resolved: bool,
    pub winning_outcome: u64,
    pub creator: Address,
    pub cancelled: bool,
}

impl Bet {
    /// Map the contract's 9-tuple in declaration order.
    pub fn from_tuple(tuple: BetTuple) -> Result<Self, GatewayError> {
        const METHOD: &str = "bets(uint256)";
        let (id, description, total, outcome_count, deadline, resolved, winning_outcome, creator, cancelled) =
            tuple;

        let deadline_secs = to_u64(METHOD, deadline)?;
        let deadline = i64::try_from(deadline_secs)
            .ok()
            .and_then(|secs| DateTime::from_timestamp(secs, 0))
            .ok_or_else(|| GatewayError::decode(METHOD, format!("deadline {} out of range", deadline_secs)))?;

        Ok(Self {
            id: to_u64(METHOD, id)?,
            description,
            total_bet_amount: format_amount(total, NATIVE_DECIMALS),
            total_bet_wei: total,
            outcome_count: to_u64(METHOD, outcome_count)?,
            deadline,
            resolved,
            winning_outcome: to_u64(METHOD, winning_outcome)?,
            creator,
            cancelled,
        })
    }

    /// Still accepting stakes at `now`.
    pub fn is_open(&self, now: DateTime<Utc>) -> bool {
        !self.resolved && !self.cancelled && now < self.deadline
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContractInfo {
    pub version: String,
    pub network: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BetEvent {
    Created {
        bet_id: U256,
        description: String,
        outcome_count: U256,
        deadline: U256,
    },
    Placed {
        bet_id: U256,
        outcome_id: U256,
        bettor: Address,
        amount: U256,
    },
    Resolved {
        bet_id: U256,
        winning_outcome: U256,
    },
    Cancelled {
        bet_id: U256,
    },
}

impl BetEvent {
    /// Decode a log from the betting contract. Unknown topics yield `None`.
    pub fn decode(log: &RawLog) -> Option<Result<Self, GatewayError>> {
        use IBettingEcosystem::{BetCancelled, BetCreated, BetPlaced, BetResolved};

        let topic0 = *log.topics.first()?;
        let topics = log.topics.iter().copied();

        let decoded = if topic0 == BetCreated::SIGNATURE_HASH {
            BetCreated::decode_raw_log(topics, &log.data).map(|e| BetEvent::Created {
                bet_id: e.betId,
                description: e.description,
                outcome_count: e.outcomeCount,
                deadline: e.deadline,
            })
        } else if topic0 == BetPlaced::SIGNATURE_HASH {
            BetPlaced::decode_raw_log(topics, &log.data).map(|e| BetEvent::Placed {
                bet_id: e.betId,
                outcome_id: e.outcomeId,
                bettor: e.bettor,
                amount: e.amount,
            })
        } else if topic0 == BetResolved::SIGNATURE_HASH {
            BetResolved::decode_raw_log(topics, &log.data).map(|e| BetEvent::Resolved {
                bet_id: e.betId,
                winning_outcome: e.winningOutcome,
            })
        } else if topic0 == BetCancelled::SIGNATURE_HASH {
            BetCancelled::decode_raw_log(topics, &log.data).map(|e| BetEvent::Cancelled { bet_id: e.betId })
        } else {
            return None;
        };

        Some(decoded.map_err(|e| GatewayError::decode("eth_getLogs", e)))
    }
}

/// Gateway to the betting contract.
pub struct BettingGateway<P> {
    client: ContractClient<P>,
}

impl<P: WalletProvider> BettingGateway<P> {
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

    pub async fn create_bet(
        &self,
        description: &str,
        outcome_count: u64,
        duration_minutes: u64,
    ) -> Result<TxReceipt, GatewayError> {
        info!(description, outcome_count, duration_minutes, "creating bet");
        let call = IBettingEcosystem::createBetCall {
            description: description.to_string(),
            outcomeCount: U256::from(outcome_count),
            durationInMinutes: U256::from(duration_minutes),
        };
        self.client.send(&call, U256::ZERO).await
    }

    /// Stake `amount` ETH on `outcome_id`.
    pub async fn purchase(&self, bet_id: u64, outcome_id: u64, amount: &str) -> Result<TxReceipt, GatewayError> {
        self.client.handle()?;
        let value = parse_amount(amount)?;
        info!(bet_id, outcome_id, %value, "placing bet");

        let call = IBettingEcosystem::placeBetCall {
            betId: U256::from(bet_id),
            outcomeId: U256::from(outcome_id),
        };
        self.client.send(&call, value).await
    }

    /// Declare the winning outcome. Whether the caller may do so is the
    /// contract's decision.
    pub async fn resolve(&self, bet_id: u64, winning_outcome: u64) -> Result<TxReceipt, GatewayError> {
        info!(bet_id, winning_outcome, "resolving bet");
        let call = IBettingEcosystem::resolveBetCall {
            betId: U256::from(bet_id),
            winningOutcome: U256::from(winning_outcome),
        };
        self.client.send(&call, U256::ZERO).await
    }

    pub async fn cancel(&self, bet_id: u64) -> Result<TxReceipt, GatewayError> {
        info!(bet_id, "cancelling bet");
        let call = IBettingEcosystem::cancelBetCall {
            betId: U256::from(bet_id),
        };
        self.client.send(&call, U256::ZERO).await
    }

    pub async fn claim(&self, bet_id: u64) -> Result<TxReceipt, GatewayError> {
        info!(bet_id, "claiming rewards");
        let call = IBettingEcosystem::claimRewardsCall {
            betId: U256::from(bet_id),
        };
        self.client.send(&call, U256::ZERO).await
    }

    // =========================================================================
    // READS
    // =========================================================================

    pub async fn read_details(&self, bet_id: u64) -> Result<Bet, GatewayError> {
        let call = IBettingEcosystem::betsCall {
            betId: U256::from(bet_id),
        };
        let r = self.client.call(&call).await?;
        Bet::from_tuple((r._0, r._1, r._2, r._3, r._4, r._5, r._6, r._7, r._8))
    }

    /// Bets `user` has taken part in.
    pub async fn read_user_holdings(&self, user: Address) -> Result<Vec<Bet>, GatewayError> {
        let ids = self
            .client
            .call(&IBettingEcosystem::getUserBetsCall { user })
            .await?
            .into_iter()
            .map(|id| to_u64("getUserBets(address)", id))
            .collect::<Result<Vec<_>, _>>()?;

        try_join_all(ids.into_iter().map(|id| self.read_details(id))).await
    }

    /// Amount `user` staked on one outcome, as a decimal string.
    pub async fn read_user_stake(&self, bet_id: u64, outcome_id: u64, user: Address) -> Result<String, GatewayError> {
        let call = IBettingEcosystem::getUserBetAmountCall {
            betId: U256::from(bet_id),
            outcomeId: U256::from(outcome_id),
            user,
        };
        let wei = self.client.call(&call).await?;
        Ok(format_amount(wei, NATIVE_DECIMALS))
    }

    pub async fn contract_info(&self) -> Result<ContractInfo, GatewayError> {
        let r = self
            .client
            .call(&IBettingEcosystem::getContractInfoCall {})
            .await?;
        Ok(ContractInfo {
            version: r._0,
            network: r._1,
        })
    }

    /// Platform fee as a percentage. The contract stores basis points.
    pub async fn platform_fee(&self) -> Result<Decimal, GatewayError> {
        let bps = self
            .client
            .call(&IBettingEcosystem::platformFeePercentCall {})
            .await?;
        let bps = to_u64("platformFeePercent()", bps)?;
        let bps = i64::try_from(bps).map_err(|e| GatewayError::decode("platformFeePercent()", e))?;
        Ok(Decimal::new(bps, 2))
    }

    pub async fn fetch_events(&self, from_block: u64) -> Result<Vec<BetEvent>, GatewayError> {
        let logs = self.client.logs(from_block).await?;
        logs.iter().filter_map(BetEvent::decode).collect()
    }
}
