use std::{collections::HashSet, str::FromStr};

use alloy::primitives::U256;
use async_trait::async_trait;
use log::debug;
use serde::Deserialize;
use url::Url;

use super::{ensure_success, evm::EvmTransfer, http_client};
use crate::{
    error::{Fault, WalletError},
    models::TxStatus,
};

/// Address transaction history for an EVM chain.
#[async_trait]
pub trait TransferHistory: Send + Sync {
    /// Native and ERC20 transfers involving `owner`, newest first.
    async fn transfers(&self, owner: &str) -> Result<Vec<EvmTransfer>, Fault>;
}

/// Etherscan-compatible explorer API (Etherscan, BscScan, PolygonScan).
pub struct EtherscanClient {
    http: reqwest::Client,
    base_url: Url,
    api_key: Option<String>,
    page_size: u32,
}

const DEFAULT_PAGE_SIZE: u32 = 100;

#[derive(Debug, Deserialize)]
struct ExplorerResponse {
    status: String,
    message: String,
    result: serde_json::Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ExplorerTx {
    hash: String,
    from: String,
    #[serde(default)]
    to: String,
    value: String,
    time_stamp: String,
    block_number: String,
    #[serde(default)]
    is_error: Option<String>,
    #[serde(default, rename = "txreceipt_status")]
    receipt_status: Option<String>,
    #[serde(default)]
    gas_used: Option<String>,
    #[serde(default)]
    gas_price: Option<String>,
    #[serde(default)]
    contract_address: Option<String>,
    #[serde(default)]
    token_symbol: Option<String>,
    #[serde(default)]
    token_decimal: Option<String>,
}

impl EtherscanClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, WalletError> {
        let base_url = Url::parse(base_url).map_err(|e| {
            WalletError::configuration(format!("invalid explorer URL {}: {}", base_url, e))
        })?;
        Ok(Self {
            http: http_client()?,
            base_url,
            api_key,
            page_size: DEFAULT_PAGE_SIZE,
        })
    }

    async fn fetch(&self, action: &str, owner: &str) -> Result<Vec<ExplorerTx>, Fault> {
        let mut url = self.base_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("module", "account")
                .append_pair("action", action)
                .append_pair("address", owner)
                .append_pair("page", "1")
                .append_pair("offset", &self.page_size.to_string())
                .append_pair("sort", "desc");
            if let Some(key) = &self.api_key {
                query.append_pair("apikey", key);
            }
        }

        let response = self.http.get(url).send().await?;
        let body: ExplorerResponse = ensure_success(response).await?.json().await?;
        parse_result(action, body)
    }
}

/// Explorers answer HTTP 200 with `status: "0"` for both "no data" and errors.
fn parse_result(action: &str, body: ExplorerResponse) -> Result<Vec<ExplorerTx>, Fault> {
    if body.status == "1" {
        return serde_json::from_value(body.result)
            .map_err(|e| Fault::permanent(format!("{}: malformed result: {}", action, e)));
    }

    if body.message.starts_with("No transactions found") {
        return Ok(Vec::new());
    }

    let detail = body.result.as_str().unwrap_or(&body.message).to_string();
    if detail.to_ascii_lowercase().contains("rate limit") {
        Err(Fault::transient(format!("{}: {}", action, detail)))
    } else {
        Err(Fault::permanent(format!("{}: {}", action, detail)))
    }
}

fn parse_u256(value: Option<&str>) -> Option<U256> {
    value.and_then(|v| U256::from_str(v).ok())
}

fn convert(tx: ExplorerTx, token_transfer: bool) -> EvmTransfer {
    let failed = tx.is_error.as_deref() == Some("1") || tx.receipt_status.as_deref() == Some("0");
    let fee = match (parse_u256(tx.gas_used.as_deref()), parse_u256(tx.gas_price.as_deref())) {
        (Some(used), Some(price)) => Some(used * price),
        _ => None,
    };

    EvmTransfer {
        hash: tx.hash.to_lowercase(),
        from: tx.from.to_lowercase(),
        to: (!tx.to.is_empty()).then(|| tx.to.to_lowercase()),
        value: parse_u256(Some(&tx.value)).unwrap_or_default(),
        token: if token_transfer {
            tx.contract_address.map(|a| a.to_lowercase())
        } else {
            None
        },
        token_symbol: if token_transfer { tx.token_symbol } else { None },
        token_decimals: if token_transfer {
            tx.token_decimal.and_then(|d| d.parse().ok())
        } else {
            None
        },
        fee,
        timestamp: tx.time_stamp.parse().unwrap_or_default(),
        block_number: tx.block_number.parse().ok(),
        status: if failed { TxStatus::Failed } else { TxStatus::Confirmed },
    }
}

/// Merge plain and token transfer lists.
///
/// A token transfer shows up in the plain list as a zero-value call to the
/// token contract; that entry is dropped in favour of the token record.
fn merge_transfers(normal: Vec<ExplorerTx>, tokens: Vec<ExplorerTx>) -> Vec<EvmTransfer> {
    let token_hashes: HashSet<String> = tokens.iter().map(|t| t.hash.to_lowercase()).collect();

    let mut merged: Vec<EvmTransfer> = normal
        .into_iter()
        .map(|tx| convert(tx, false))
        .filter(|tx| !(tx.value.is_zero() && token_hashes.contains(&tx.hash)))
        .chain(tokens.into_iter().map(|tx| convert(tx, true)))
        .collect();

    // Stable sort keeps explorer order for equal timestamps
    merged.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    merged
}

#[async_trait]
impl TransferHistory for EtherscanClient {
    async fn transfers(&self, owner: &str) -> Result<Vec<EvmTransfer>, Fault> {
        let (normal, tokens) = tokio::try_join!(
            self.fetch("txlist", owner),
            self.fetch("tokentx", owner)
        )?;
        debug!(
            "Explorer returned {} transactions and {} token transfers for {}",
            normal.len(),
            tokens.len(),
            owner
        );
        Ok(merge_transfers(normal, tokens))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(value: serde_json::Value) -> ExplorerResponse {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_no_transactions_is_empty() {
        let parsed = parse_result(
            "txlist",
            body(json!({"status": "0", "message": "No transactions found", "result": []})),
        )
        .unwrap();
        assert!(parsed.is_empty());
    }

    #[test]
    fn test_rate_limit_is_transient() {
        let err = parse_result(
            "txlist",
            body(json!({"status": "0", "message": "NOTOK", "result": "Max rate limit reached"})),
        )
        .unwrap_err();
        assert!(err.is_transient());

        let err = parse_result(
            "txlist",
            body(json!({"status": "0", "message": "NOTOK", "result": "Invalid API Key"})),
        )
        .unwrap_err();
        assert!(!err.is_transient());
    }

    #[test]
    fn test_merge_drops_token_call_duplicates() {
        let normal = parse_result(
            "txlist",
            body(json!({"status": "1", "message": "OK", "result": [
                {"hash": "0xAA", "from": "0x1", "to": "0xtoken", "value": "0", "timeStamp": "200",
                 "blockNumber": "10", "isError": "0", "txreceipt_status": "1", "gasUsed": "21000", "gasPrice": "2"},
                {"hash": "0xbb", "from": "0x2", "to": "0x1", "value": "5", "timeStamp": "100",
                 "blockNumber": "9", "isError": "1", "txreceipt_status": "0", "gasUsed": "21000", "gasPrice": "2"}
            ]})),
        )
        .unwrap();
        let tokens = parse_result(
            "tokentx",
            body(json!({"status": "1", "message": "OK", "result": [
                {"hash": "0xaa", "from": "0x1", "to": "0x3", "value": "700", "timeStamp": "200",
                 "blockNumber": "10", "contractAddress": "0xTOKEN", "tokenSymbol": "USDT", "tokenDecimal": "6"}
            ]})),
        )
        .unwrap();

        let merged = merge_transfers(normal, tokens);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].hash, "0xaa");
        assert_eq!(merged[0].token.as_deref(), Some("0xtoken"));
        assert_eq!(merged[0].token_decimals, Some(6));
        assert_eq!(merged[0].value, U256::from(700u64));
        assert_eq!(merged[1].status, TxStatus::Failed);
        assert_eq!(merged[1].fee, Some(U256::from(42_000u64)));
    }
}
