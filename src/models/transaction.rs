use chrono::{DateTime, NaiveDate, Utc};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use super::Chain;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Incoming,
    Outgoing,
    #[serde(rename = "self")]
    SelfTransfer,
}

impl Direction {
    /// Direction of a transfer as seen from `owner`.
    pub fn of(owner: &str, from: &str, to: Option<&str>) -> Self {
        let sent = from.eq_ignore_ascii_case(owner);
        let received = to.is_some_and(|t| t.eq_ignore_ascii_case(owner));
        match (sent, received) {
            (true, true) => Direction::SelfTransfer,
            (true, false) => Direction::Outgoing,
            _ => Direction::Incoming,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxStatus {
    Pending,
    Confirmed,
    Failed,
}

/// Chain-agnostic record of a transaction touching a wallet.
///
/// Amounts are raw integers as decimal strings; `formatted_amount` applies
/// `decimals`. `token` is the contract for ERC20 transfers and `None` for the
/// native coin.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WalletTransaction {
    pub chain: Chain,
    pub hash: String,
    pub direction: Direction,
    pub from: String,
    pub to: Option<String>,
    pub counterparty: Option<String>,
    pub amount: String,
    pub formatted_amount: String,
    pub symbol: String,
    pub decimals: u8,
    pub token: Option<String>,
    pub fee: Option<String>,
    pub timestamp: DateTime<Utc>,
    pub status: TxStatus,
    pub block_number: Option<u64>,
}

/// Transactions that occurred on one calendar day (UTC).
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct TransactionGroup {
    pub date: NaiveDate,
    pub transactions: Vec<WalletTransaction>,
}

/// Groups transactions by calendar date of occurrence.
///
/// Groups appear in the order their date is first seen and each group keeps
/// the relative order of its transactions.
pub fn group_by_date(transactions: Vec<WalletTransaction>) -> Vec<TransactionGroup> {
    let mut groups: Vec<TransactionGroup> = Vec::new();
    let mut index: FxHashMap<NaiveDate, usize> = FxHashMap::default();

    for tx in transactions {
        let date = tx.timestamp.date_naive();
        match index.get(&date) {
            Some(&i) => groups[i].transactions.push(tx),
            None => {
                index.insert(date, groups.len());
                groups.push(TransactionGroup {
                    date,
                    transactions: vec![tx],
                });
            },
        }
    }

    groups
}

/// Candidate EVM transaction, as submitted for gas estimation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct EvmCall {
    pub from: String,
    pub to: String,
    /// Wei, decimal or 0x-hex
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub data: Option<String>,
}

/// Unsigned transaction handed back to the client for signing.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UnsignedTransaction {
    pub chain_id: u64,
    pub from: String,
    pub to: String,
    pub data: String,
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<String>,
}

/// Result of a broadcast.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SubmittedTransaction {
    pub chain: Chain,
    pub hash: String,
}
