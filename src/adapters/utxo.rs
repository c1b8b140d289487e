use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};

use crate::{
    clients::{EsploraTx, UtxoRpc},
    error::WalletError,
    models::{
        AddressStats, Chain, ConfirmationStatus, Direction, TxStatus, Utxo, WalletTransaction,
    },
    utils::{format_sats, validate_btc_address, validate_raw_btc_transaction, validate_txid, RetryPolicy},
};

/// UTXO-model chain (Bitcoin) backed by an Esplora-style indexer.
pub struct UtxoAdapter {
    chain: Chain,
    rpc: Arc<dyn UtxoRpc>,
    retry: RetryPolicy,
}

impl UtxoAdapter {
    pub fn new(chain: Chain, rpc: Arc<dyn UtxoRpc>, retry: RetryPolicy) -> Self {
        Self { chain, rpc, retry }
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub async fn utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        let address = validate_btc_address(address)?;
        self.retry
            .run("esplora.utxo", || self.rpc.utxos(&address))
            .await
            .map_err(|e| e.context(format!("{} {}", self.chain, address)))
    }

    pub async fn balance(&self, address: &str) -> Result<AddressStats, WalletError> {
        let address = validate_btc_address(address)?;
        self.retry
            .run("esplora.address", || self.rpc.address_stats(&address))
            .await
            .map_err(|e| e.context(format!("{} {}", self.chain, address)))
    }

    pub async fn transactions(&self, address: &str) -> Result<Vec<WalletTransaction>, WalletError> {
        let address = validate_btc_address(address)?;
        let txs = self
            .retry
            .run("esplora.address_txs", || self.rpc.transactions(&address))
            .await
            .map_err(|e| e.context(format!("{} {}", self.chain, address)))?;

        Ok(txs
            .into_iter()
            .map(|tx| to_wallet_transaction(self.chain, &address, tx))
            .collect())
    }

    /// Transaction as seen from `owner`, or from its first input when absent.
    pub async fn transaction(
        &self,
        txid: &str,
        owner: Option<&str>,
    ) -> Result<WalletTransaction, WalletError> {
        let txid = validate_txid(txid)?;
        let owner = owner.map(validate_btc_address).transpose()?;

        let tx = self
            .retry
            .run("esplora.tx", || self.rpc.transaction(&txid))
            .await
            .map_err(|e| e.context(self.chain))?
            .ok_or_else(|| WalletError::NotFound(format!("transaction {} on {}", txid, self.chain)))?;

        let owner = owner.unwrap_or_else(|| {
            tx.vin
                .iter()
                .find_map(|i| i.prevout.as_ref()?.scriptpubkey_address.clone())
                .unwrap_or_default()
        });
        Ok(to_wallet_transaction(self.chain, &owner, tx))
    }

    pub async fn confirmation_status(&self, txid: &str) -> Result<ConfirmationStatus, WalletError> {
        let txid = validate_txid(txid)?;
        let status = self
            .retry
            .run("esplora.tx_status", || self.rpc.transaction_status(&txid))
            .await
            .map_err(|e| e.context(format!("{} {}", self.chain, txid)))?;

        let confirmations = match (status.confirmed, status.block_height) {
            (true, Some(height)) => {
                let tip = self
                    .retry
                    .run("esplora.tip_height", || self.rpc.tip_height())
                    .await
                    .map_err(|e| e.context(self.chain))?;
                tip.saturating_sub(height) + 1
            },
            _ => 0,
        };

        Ok(ConfirmationStatus {
            txid,
            confirmed: status.confirmed,
            block_height: status.block_height,
            confirmations,
        })
    }

    /// Broadcast a client-signed transaction, returning its txid.
    pub async fn send_raw_transaction(&self, raw: &str) -> Result<String, WalletError> {
        let raw = validate_raw_btc_transaction(raw)?;
        self.retry
            .run("esplora.broadcast", || self.rpc.broadcast(&raw))
            .await
            .map_err(|e| e.context(self.chain))
    }

    /// Fee rate in sat/vB keyed by confirmation target in blocks.
    pub async fn fee_estimates(&self) -> Result<HashMap<String, f64>, WalletError> {
        self.retry
            .run("esplora.fee_estimates", || self.rpc.fee_estimates())
            .await
            .map_err(|e| e.context(self.chain))
    }
}

/// Collapse inputs and outputs into one transfer relative to `owner`.
///
/// Outgoing amounts exclude change and fee; a transaction that only pays the
/// owner back is a self transfer of the change amount.
fn to_wallet_transaction(chain: Chain, owner: &str, tx: EsploraTx) -> WalletTransaction {
    let is_owner = |a: &Option<String>| a.as_deref() == Some(owner);

    let spent: u64 = tx
        .vin
        .iter()
        .filter_map(|i| i.prevout.as_ref())
        .filter(|o| is_owner(&o.scriptpubkey_address))
        .map(|o| o.value)
        .sum();
    let received: u64 = tx
        .vout
        .iter()
        .filter(|o| is_owner(&o.scriptpubkey_address))
        .map(|o| o.value)
        .sum();
    let paid_out: u64 = tx
        .vout
        .iter()
        .filter(|o| !is_owner(&o.scriptpubkey_address))
        .map(|o| o.value)
        .sum();

    let first_sender = tx
        .vin
        .iter()
        .find_map(|i| i.prevout.as_ref()?.scriptpubkey_address.clone())
        .unwrap_or_default();
    let first_recipient = tx
        .vout
        .iter()
        .find(|o| !is_owner(&o.scriptpubkey_address))
        .and_then(|o| o.scriptpubkey_address.clone());

    let (direction, amount, from, to, counterparty) = if spent == 0 {
        (
            Direction::Incoming,
            received,
            first_sender.clone(),
            Some(owner.to_string()),
            Some(first_sender),
        )
    } else if paid_out == 0 {
        (
            Direction::SelfTransfer,
            received,
            owner.to_string(),
            Some(owner.to_string()),
            None,
        )
    } else {
        (
            Direction::Outgoing,
            paid_out,
            owner.to_string(),
            first_recipient.clone(),
            first_recipient,
        )
    };

    let decimals = chain.native_decimals();
    let timestamp = tx
        .status
        .block_time
        .and_then(|t| DateTime::from_timestamp(t, 0))
        .unwrap_or_else(Utc::now);

    WalletTransaction {
        chain,
        hash: tx.txid,
        direction,
        from,
        to,
        counterparty,
        amount: amount.to_string(),
        formatted_amount: format_sats(amount, decimals),
        symbol: chain.native_symbol().to_string(),
        decimals,
        token: None,
        fee: tx.fee.map(|f| f.to_string()),
        timestamp,
        status: if tx.status.confirmed {
            TxStatus::Confirmed
        } else {
            TxStatus::Pending
        },
        block_number: tx.status.block_height,
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use serde_json::json;

    use super::*;
    use crate::{
        error::Fault,
        mocks::{fast_retry, MockUtxo},
    };

    const OWNER: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
    const OTHER: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";

    fn tx(txid: &str, inputs: &[(&str, u64)], outputs: &[(&str, u64)], block: Option<(u64, i64)>) -> EsploraTx {
        let vin: Vec<_> = inputs
            .iter()
            .map(|(a, v)| json!({"prevout": {"scriptpubkey_address": a, "value": v}}))
            .collect();
        let vout: Vec<_> = outputs
            .iter()
            .map(|(a, v)| json!({"scriptpubkey_address": a, "value": v}))
            .collect();
        let status = match block {
            Some((height, time)) => json!({"confirmed": true, "block_height": height, "block_time": time}),
            None => json!({"confirmed": false}),
        };
        serde_json::from_value(json!({
            "txid": txid, "status": status, "vin": vin, "vout": vout, "fee": 500
        }))
        .unwrap()
    }

    fn adapter(rpc: Arc<MockUtxo>) -> UtxoAdapter {
        UtxoAdapter::new(Chain::Bitcoin, rpc, fast_retry(3))
    }

    #[test]
    fn test_outgoing_excludes_change() {
        let tx = tx(
            &"a".repeat(64),
            &[(OWNER, 100_000)],
            &[(OTHER, 60_000), (OWNER, 39_500)],
            Some((800_000, 1_690_000_000)),
        );
        let wt = to_wallet_transaction(Chain::Bitcoin, OWNER, tx);
        assert_eq!(wt.direction, Direction::Outgoing);
        assert_eq!(wt.amount, "60000");
        assert_eq!(wt.formatted_amount, "0.0006");
        assert_eq!(wt.counterparty.as_deref(), Some(OTHER));
        assert_eq!(wt.status, TxStatus::Confirmed);
    }

    #[test]
    fn test_incoming_and_pending() {
        let tx = tx(&"b".repeat(64), &[(OTHER, 20_000)], &[(OWNER, 19_500)], None);
        let wt = to_wallet_transaction(Chain::Bitcoin, OWNER, tx);
        assert_eq!(wt.direction, Direction::Incoming);
        assert_eq!(wt.amount, "19500");
        assert_eq!(wt.counterparty.as_deref(), Some(OTHER));
        assert_eq!(wt.status, TxStatus::Pending);
        assert_eq!(wt.symbol, "BTC");
    }

    #[tokio::test]
    async fn test_confirmations_use_tip_height() {
        let txid = "c".repeat(64);
        let rpc = Arc::new(
            MockUtxo::default()
                .with_txs(vec![tx(&txid, &[(OTHER, 1)], &[(OWNER, 1)], Some((800_000, 0)))])
                .with_tip(800_005),
        );
        let status = adapter(rpc).confirmation_status(&txid).await.unwrap();
        assert!(status.confirmed);
        assert_eq!(status.confirmations, 6);
    }

    #[tokio::test]
    async fn test_broadcast_rejects_non_hex() {
        let rpc = Arc::new(MockUtxo::default());
        let err = adapter(rpc.clone())
            .send_raw_transaction("not-a-tx")
            .await
            .unwrap_err();
        assert!(matches!(err, WalletError::Validation { .. }));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_indexer_outage_exhausts_retries() {
        let rpc = Arc::new(MockUtxo::default());
        rpc.fail_with(Fault::transient("503 Service Unavailable"));

        let err = adapter(rpc.clone()).utxos(OWNER).await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_UNAVAILABLE");
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 3);
    }
}
