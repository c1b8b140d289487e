use serde::{Deserialize, Serialize};

use super::{Chain, UnsignedTransaction};

/// A token offered in the swap picker.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SwapToken {
    pub chain: Chain,
    pub address: String,
    pub symbol: String,
    pub name: String,
    pub logo_url: Option<String>,
    pub price_usd: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SwapRequest {
    pub src: String,
    pub dst: String,
    /// Raw source amount
    pub amount: String,
    pub from: String,
    #[serde(default)]
    pub slippage_percent: Option<String>,
}

/// Parameters forwarded to the swap router.
#[derive(Debug, Clone, PartialEq)]
pub struct RouterSwapParams {
    pub src: String,
    pub dst: String,
    pub amount: String,
    pub from: String,
    pub slippage_percent: String,
    /// Referrer fee as a percentage ("0.3" for 30 bps)
    pub fee_percent: String,
    pub referrer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SwapQuote {
    pub src: String,
    pub dst: String,
    pub amount: String,
    pub to_amount: String,
    pub referrer_fee: String,
    pub referrer_fee_bps: u32,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct SwapTransaction {
    pub to_amount: String,
    pub referrer_fee: String,
    pub tx: UnsignedTransaction,
}

/// Approval needed before the router can pull `amount` of `token`.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct AllowanceCheck {
    pub spender: String,
    pub allowance: String,
    pub transaction: Option<UnsignedTransaction>,
}
