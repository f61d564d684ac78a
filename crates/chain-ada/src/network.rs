/// Bech32 human-readable part for mainnet addresses.
pub const MAINNET_HRP: &str = "addr";

/// Bech32 human-readable part for testnet (preprod/preview) addresses.
pub const TESTNET_HRP: &str = "addr_test";

/// Default Blockfrost endpoint for mainnet.
pub const MAINNET_BLOCKFROST: &str = "https://cardano-mainnet.blockfrost.io/api/v0";

/// Default Blockfrost endpoint for the preprod testnet.
pub const PREPROD_BLOCKFROST: &str = "https://cardano-preprod.blockfrost.io/api/v0";

/// Network tag carried in the low nibble of every Shelley address header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdaNetwork {
    Mainnet,
    #[serde(alias = "preprod", alias = "preview")]
    Testnet,
}

impl AdaNetwork {
    /// The 4-bit network id written into address headers.
    pub fn network_id(self) -> u8 {
        match self {
            AdaNetwork::Mainnet => 1,
            AdaNetwork::Testnet => 0,
        }
    }

    /// Inverse of [`network_id`](Self::network_id).
    pub fn from_network_id(id: u8) -> Option<Self> {
        match id {
            1 => Some(AdaNetwork::Mainnet),
            0 => Some(AdaNetwork::Testnet),
            _ => None,
        }
    }

    /// Bech32 HRP used for payment addresses on this network.
    pub fn address_hrp(self) -> &'static str {
        match self {
            AdaNetwork::Mainnet => MAINNET_HRP,
            AdaNetwork::Testnet => TESTNET_HRP,
        }
    }

    /// Return the default Blockfrost endpoint for this network.
    pub fn default_provider_url(self) -> &'static str {
        match self {
            AdaNetwork::Mainnet => MAINNET_BLOCKFROST,
            AdaNetwork::Testnet => PREPROD_BLOCKFROST,
        }
    }

    /// Block explorer link for a submitted transaction.
    pub fn explorer_url(self, tx_id: &str) -> String {
        match self {
            AdaNetwork::Mainnet => format!("https://cardanoscan.io/transaction/{tx_id}"),
            AdaNetwork::Testnet => format!("https://preprod.cardanoscan.io/transaction/{tx_id}"),
        }
    }
}

impl std::fmt::Display for AdaNetwork {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdaNetwork::Mainnet => write!(f, "mainnet"),
            AdaNetwork::Testnet => write!(f, "testnet"),
        }
    }
}
