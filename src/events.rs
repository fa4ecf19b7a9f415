// Notifications pushed by the wallet provider. Each variant mirrors one
// EIP-1193 event name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    // Authorized accounts changed. Empty means the wallet locked or revoked us.
    AccountsChanged(Vec<String>),

    // Active chain switched (hex chain id, e.g. "0xa4b1")
    ChainChanged(String),

    // Provider lost its connection to every chain
    Disconnect,
}

impl ProviderEvent {
    /// The EIP-1193 event name this variant is delivered under.
    pub fn name(&self) -> &'static str {
        match self {
            ProviderEvent::AccountsChanged(_) => "accountsChanged",
            ProviderEvent::ChainChanged(_) => "chainChanged",
            ProviderEvent::Disconnect => "disconnect",
        }
    }
}

/// Parse a hex chain id ("0xa4b1") or a plain decimal one ("42161").
pub fn parse_chain_id(raw: &str) -> Option<u64> {
    let raw = raw.trim();
    match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16).ok(),
        None => raw.parse().ok(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_chain_id() {
        assert_eq!(parse_chain_id("0xa4b1"), Some(42161));
        assert_eq!(parse_chain_id("0xA4B1"), Some(42161));
        assert_eq!(parse_chain_id("421614"), Some(421614));
        assert_eq!(parse_chain_id("0x"), None);
        assert_eq!(parse_chain_id("arbitrum"), None);
    }

    #[test]
    fn test_event_names() {
        assert_eq!(ProviderEvent::AccountsChanged(vec![]).name(), "accountsChanged");
        assert_eq!(ProviderEvent::ChainChanged("0x1".into()).name(), "chainChanged");
        assert_eq!(ProviderEvent::Disconnect.name(), "disconnect");
    }
}
