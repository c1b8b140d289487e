use std::collections::HashMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::Chain;

/// Reserved address standing for a chain's native coin instead of a contract.
pub const NATIVE_TOKEN_ADDRESS: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// Decimals of the native coin on every EVM chain.
pub const NATIVE_TOKEN_DECIMALS: u8 = 18;

pub fn is_native_token(address: &str) -> bool {
    address.eq_ignore_ascii_case(NATIVE_TOKEN_ADDRESS)
}

/// Identity of a token: chain plus normalized (lowercase) address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenKey {
    pub chain: Chain,
    pub address: String,
}

impl TokenKey {
    /// Callers are expected to pass an address already checked with
    /// `normalize_address`; lowercasing here keeps set membership exact.
    pub fn new(chain: Chain, address: &str) -> Self {
        Self {
            chain,
            address: address.to_lowercase(),
        }
    }
}

/// One entry of the market-data provider's tradable-token list.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MarketToken {
    /// Provider identifier (e.g. "ethereum", "tether")
    pub id: String,
    pub symbol: String,
    pub name: String,
    pub image: Option<String>,
    pub price_usd: Option<f64>,
    pub market_cap_usd: Option<f64>,
    pub price_change_24h: Option<f64>,
    /// Contract address per chain, lowercase
    #[serde(default)]
    pub addresses: HashMap<Chain, String>,
}

impl MarketToken {
    pub fn address_on(&self, chain: Chain) -> Option<&str> {
        self.addresses.get(&chain).map(String::as_str)
    }
}

/// A token the user added by hand to a chain's wallet view.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomToken {
    pub chain: Chain,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
}

impl CustomToken {
    pub fn key(&self) -> TokenKey {
        TokenKey::new(self.chain, &self.address)
    }
}

/// A balance line in the wallet view.
///
/// `balance` is the raw on-chain integer as a decimal string; `formatted_balance`
/// applies `decimals`. USD fields are absent when the market has no price.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct WalletToken {
    pub chain: Chain,
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub decimals: u8,
    pub balance: String,
    pub formatted_balance: String,
    pub price_usd: Option<f64>,
    pub value_usd: Option<f64>,
    pub logo_url: Option<String>,
    pub native: bool,
    pub custom: bool,
}

/// Native-coin balance of one address on one chain.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct NativeBalance {
    pub chain: Chain,
    pub address: String,
    pub symbol: String,
    pub decimals: u8,
    pub balance: String,
    pub formatted_balance: String,
    pub price_usd: Option<f64>,
    pub value_usd: Option<f64>,
}

/// Native-coin price on a past day, with the USD value of an amount when given.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct HistoricPrice {
    pub chain: Chain,
    pub date: NaiveDate,
    pub price_usd: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amount: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_usd: Option<f64>,
}
