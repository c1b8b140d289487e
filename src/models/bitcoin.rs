use serde::{Deserialize, Serialize};

/// Unspent output owned by an address.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Utxo {
    pub txid: String,
    pub vout: u32,
    /// Satoshis
    pub value: u64,
    pub confirmed: bool,
    pub block_height: Option<u64>,
}

/// Satoshi totals for an address, split by confirmation state.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct AddressStats {
    pub confirmed: u64,
    /// Mempool delta, negative while spends are unconfirmed
    pub unconfirmed: i64,
}

impl AddressStats {
    pub fn total(&self) -> u64 {
        (self.confirmed as i64 + self.unconfirmed).max(0) as u64
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct TxConfirmation {
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub block_time: Option<i64>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ConfirmationStatus {
    pub txid: String,
    pub confirmed: bool,
    pub block_height: Option<u64>,
    pub confirmations: u64,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BitcoinBalance {
    pub address: String,
    pub confirmed: String,
    pub unconfirmed: String,
    pub balance: String,
    pub formatted_balance: String,
    pub price_usd: Option<f64>,
    pub value_usd: Option<f64>,
}
