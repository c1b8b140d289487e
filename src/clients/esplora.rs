use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{ensure_success, http_client};
use crate::{
    error::{Fault, WalletError},
    models::{AddressStats, TxConfirmation, Utxo},
};

/// Bitcoin node/indexer access.
#[async_trait]
pub trait UtxoRpc: Send + Sync {
    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, Fault>;

    async fn address_stats(&self, address: &str) -> Result<AddressStats, Fault>;

    /// Most recent transactions first
    async fn transactions(&self, address: &str) -> Result<Vec<EsploraTx>, Fault>;

    async fn transaction(&self, txid: &str) -> Result<Option<EsploraTx>, Fault>;

    async fn transaction_status(&self, txid: &str) -> Result<TxConfirmation, Fault>;

    async fn tip_height(&self) -> Result<u64, Fault>;

    /// Broadcast hex, returns txid
    async fn broadcast(&self, raw_hex: &str) -> Result<String, Fault>;

    /// Confirmation target (blocks) to sat/vB
    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, Fault>;
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EsploraTx {
    pub txid: String,
    pub status: TxConfirmation,
    #[serde(default)]
    pub vin: Vec<EsploraInput>,
    #[serde(default)]
    pub vout: Vec<EsploraOutput>,
    #[serde(default)]
    pub fee: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EsploraInput {
    #[serde(default)]
    pub prevout: Option<EsploraOutput>,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct EsploraOutput {
    #[serde(default)]
    pub scriptpubkey_address: Option<String>,
    pub value: u64,
}

#[derive(Debug, Deserialize)]
struct EsploraUtxo {
    txid: String,
    vout: u32,
    value: u64,
    status: TxConfirmation,
}

#[derive(Debug, Deserialize)]
struct EsploraAddress {
    chain_stats: EsploraStats,
    mempool_stats: EsploraStats,
}

#[derive(Debug, Deserialize)]
struct EsploraStats {
    funded_txo_sum: u64,
    spent_txo_sum: u64,
}

/// Esplora HTTP API (Blockstream, mempool.space).
pub struct EsploraClient {
    http: reqwest::Client,
    base_url: String,
}

impl EsploraClient {
    pub fn new(base_url: &str) -> Result<Self, WalletError> {
        Url::parse(base_url).map_err(|e| {
            WalletError::configuration(format!("invalid esplora URL {}: {}", base_url, e))
        })?;
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, path: &str) -> Result<T, Fault> {
        let response = self.http.get(self.url(path)).send().await?;
        Ok(ensure_success(response).await?.json().await?)
    }
}

impl From<EsploraUtxo> for Utxo {
    fn from(u: EsploraUtxo) -> Self {
        Utxo {
            txid: u.txid,
            vout: u.vout,
            value: u.value,
            confirmed: u.status.confirmed,
            block_height: u.status.block_height,
        }
    }
}

impl From<EsploraAddress> for AddressStats {
    fn from(a: EsploraAddress) -> Self {
        let confirmed = a
            .chain_stats
            .funded_txo_sum
            .saturating_sub(a.chain_stats.spent_txo_sum);
        let unconfirmed =
            a.mempool_stats.funded_txo_sum as i64 - a.mempool_stats.spent_txo_sum as i64;
        AddressStats {
            confirmed,
            unconfirmed,
        }
    }
}

#[async_trait]
impl UtxoRpc for EsploraClient {
    async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, Fault> {
        let raw: Vec<EsploraUtxo> = self.get_json(&format!("/address/{}/utxo", address)).await?;
        Ok(raw.into_iter().map(Utxo::from).collect())
    }

    async fn address_stats(&self, address: &str) -> Result<AddressStats, Fault> {
        let raw: EsploraAddress = self.get_json(&format!("/address/{}", address)).await?;
        Ok(raw.into())
    }

    async fn transactions(&self, address: &str) -> Result<Vec<EsploraTx>, Fault> {
        self.get_json(&format!("/address/{}/txs", address)).await
    }

    async fn transaction(&self, txid: &str) -> Result<Option<EsploraTx>, Fault> {
        let response = self.http.get(self.url(&format!("/tx/{}", txid))).send().await?;
        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        Ok(Some(ensure_success(response).await?.json().await?))
    }

    async fn transaction_status(&self, txid: &str) -> Result<TxConfirmation, Fault> {
        self.get_json(&format!("/tx/{}/status", txid)).await
    }

    async fn tip_height(&self) -> Result<u64, Fault> {
        let response = self.http.get(self.url("/blocks/tip/height")).send().await?;
        let text = ensure_success(response).await?.text().await?;
        text.trim()
            .parse()
            .map_err(|_| Fault::permanent(format!("unexpected tip height '{}'", text.trim())))
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, Fault> {
        let response = self
            .http
            .post(self.url("/tx"))
            .body(raw_hex.to_string())
            .send()
            .await?;
        let txid = ensure_success(response).await?.text().await?;
        Ok(txid.trim().to_string())
    }

    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, Fault> {
        self.get_json("/fee-estimates").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_address_stats_from_esplora() {
        let raw: EsploraAddress = serde_json::from_value(json!({
            "address": "bc1q",
            "chain_stats": {"funded_txo_sum": 150000, "spent_txo_sum": 50000, "tx_count": 3},
            "mempool_stats": {"funded_txo_sum": 0, "spent_txo_sum": 20000, "tx_count": 1}
        }))
        .unwrap();
        let stats: AddressStats = raw.into();
        assert_eq!(stats.confirmed, 100_000);
        assert_eq!(stats.unconfirmed, -20_000);
        assert_eq!(stats.total(), 80_000);
    }

    #[test]
    fn test_unconfirmed_tx_parses() {
        let tx: EsploraTx = serde_json::from_value(json!({
            "txid": "ab",
            "status": {"confirmed": false},
            "vin": [{"prevout": {"scriptpubkey_address": "bc1qa", "value": 1000}}],
            "vout": [{"scriptpubkey_address": "bc1qb", "value": 900}],
            "fee": 100
        }))
        .unwrap();
        assert!(!tx.status.confirmed);
        assert_eq!(tx.status.block_height, None);
        assert_eq!(tx.fee, Some(100));
    }
}
