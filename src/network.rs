use serde::Deserialize;
use serde_json::{json, Value};

/// Native currency metadata advertised to the wallet when adding a chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeCurrency {
    pub name: &'static str,
    pub symbol: &'static str,
    pub decimals: u8,
}

const ETHER: NativeCurrency = NativeCurrency {
    name: "Ether",
    symbol: "ETH",
    decimals: 18,
};

/// Static descriptor of a target network.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkConfig {
    pub chain_id: u64,
    pub chain_name: &'static str,
    pub native_currency: NativeCurrency,
    pub rpc_url: &'static str,
    pub explorer_url: &'static str,
}

pub const ARBITRUM_ONE: NetworkConfig = NetworkConfig {
    chain_id: 42161,
    chain_name: "Arbitrum One",
    native_currency: ETHER,
    rpc_url: "https://arb1.arbitrum.io/rpc",
    explorer_url: "https://arbiscan.io/",
};

pub const ARBITRUM_GOERLI: NetworkConfig = NetworkConfig {
    chain_id: 421613,
    chain_name: "Arbitrum Goerli",
    native_currency: ETHER,
    rpc_url: "https://goerli-rollup.arbitrum.io/rpc",
    explorer_url: "https://goerli.arbiscan.io/",
};

pub const ARBITRUM_SEPOLIA: NetworkConfig = NetworkConfig {
    chain_id: 421614,
    chain_name: "Arbitrum Sepolia",
    native_currency: ETHER,
    rpc_url: "https://sepolia-rollup.arbitrum.io/rpc",
    explorer_url: "https://sepolia.arbiscan.io/",
};

/// Key used in config to select a network.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKey {
    Mainnet,
    #[default]
    Testnet,
    Sepolia,
}

impl NetworkKey {
    pub fn config(&self) -> &'static NetworkConfig {
        match self {
            NetworkKey::Mainnet => &ARBITRUM_ONE,
            NetworkKey::Testnet => &ARBITRUM_GOERLI,
            NetworkKey::Sepolia => &ARBITRUM_SEPOLIA,
        }
    }
}

impl NetworkConfig {
    /// Chain id as the wallet expects it: lowercase hex with 0x prefix.
    pub fn chain_id_hex(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Params for `wallet_switchEthereumChain`.
    pub fn switch_params(&self) -> Value {
        json!([{ "chainId": self.chain_id_hex() }])
    }

    /// Params for `wallet_addEthereumChain` (EIP-3085 shape).
    pub fn add_params(&self) -> Value {
        json!([{
            "chainId": self.chain_id_hex(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": [self.rpc_url],
            "blockExplorerUrls": [self.explorer_url],
        }])
    }
}
