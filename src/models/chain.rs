use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::WalletError;

/// Ledger model a chain follows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Account balances, nonces and gas (Ethereum, BSC, Polygon).
    Evm,
    /// Unspent transaction outputs (Bitcoin).
    Utxo,
}

/// The closed set of networks the wallet supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Chain {
    Ethereum,
    Bsc,
    Polygon,
    Bitcoin,
}

impl Chain {
    pub const ALL: [Chain; 4] = [Chain::Ethereum, Chain::Bsc, Chain::Polygon, Chain::Bitcoin];

    /// EIP-155 chain id. Bitcoin has none.
    pub fn chain_id(&self) -> Option<u64> {
        match self {
            Chain::Ethereum => Some(1),
            Chain::Bsc => Some(56),
            Chain::Polygon => Some(137),
            Chain::Bitcoin => None,
        }
    }

    pub fn from_chain_id(chain_id: u64) -> Option<Chain> {
        match chain_id {
            1 => Some(Chain::Ethereum),
            56 => Some(Chain::Bsc),
            137 => Some(Chain::Polygon),
            _ => None,
        }
    }

    pub fn family(&self) -> ChainFamily {
        match self {
            Chain::Bitcoin => ChainFamily::Utxo,
            _ => ChainFamily::Evm,
        }
    }

    pub fn is_evm(&self) -> bool {
        self.family() == ChainFamily::Evm
    }

    pub fn name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bsc => "bsc",
            Chain::Polygon => "polygon",
            Chain::Bitcoin => "bitcoin",
        }
    }

    pub fn native_symbol(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ETH",
            Chain::Bsc => "BNB",
            Chain::Polygon => "POL",
            Chain::Bitcoin => "BTC",
        }
    }

    pub fn native_name(&self) -> &'static str {
        match self {
            Chain::Ethereum => "Ethereum",
            Chain::Bsc => "BNB",
            Chain::Polygon => "Polygon",
            Chain::Bitcoin => "Bitcoin",
        }
    }

    pub fn native_decimals(&self) -> u8 {
        match self {
            Chain::Bitcoin => 8,
            _ => 18,
        }
    }

    /// Platform key the market-data provider uses for token contracts on this chain.
    pub fn market_platform(&self) -> Option<&'static str> {
        match self {
            Chain::Ethereum => Some("ethereum"),
            Chain::Bsc => Some("binance-smart-chain"),
            Chain::Polygon => Some("polygon-pos"),
            Chain::Bitcoin => None,
        }
    }

    pub fn from_market_platform(platform: &str) -> Option<Chain> {
        Chain::ALL
            .into_iter()
            .find(|c| c.market_platform() == Some(platform))
    }

    /// Default market-data identifier of the native coin.
    pub fn default_coin_id(&self) -> &'static str {
        match self {
            Chain::Ethereum => "ethereum",
            Chain::Bsc => "binancecoin",
            Chain::Polygon => "matic-network",
            Chain::Bitcoin => "bitcoin",
        }
    }
}

impl fmt::Display for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chain {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s.trim().to_ascii_lowercase();
        if let Ok(id) = value.parse::<u64>() {
            return Chain::from_chain_id(id).ok_or_else(|| {
                WalletError::validation("chain", format!("unsupported chain id {}", id))
            });
        }
        match value.as_str() {
            "ethereum" | "eth" => Ok(Chain::Ethereum),
            "bsc" | "binance" | "bnb" => Ok(Chain::Bsc),
            "polygon" | "matic" | "pol" => Ok(Chain::Polygon),
            "bitcoin" | "btc" => Ok(Chain::Bitcoin),
            _ => Err(WalletError::validation(
                "chain",
                format!("unsupported chain '{}'", s),
            )),
        }
    }
}
