use std::{collections::HashMap, sync::Arc};

use alloy::primitives::U256;

use super::wallet::notify_submitted;
use crate::{
    adapters::{ChainRegistry, UtxoAdapter},
    cache::TokenMarketCache,
    error::WalletError,
    models::{
        group_by_date, BitcoinBalance, Chain, ConfirmationStatus, SubmittedTransaction,
        TransactionGroup, UserId, Utxo,
    },
    store::UserStore,
    utils::{format_sats, usd_value, validate_btc_address},
};

/// Bitcoin wallet operations over the UTXO adapter.
pub struct BitcoinService {
    registry: Arc<ChainRegistry>,
    market: Arc<TokenMarketCache>,
    store: Arc<dyn UserStore>,
}

impl BitcoinService {
    pub fn new(
        registry: Arc<ChainRegistry>,
        market: Arc<TokenMarketCache>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            registry,
            market,
            store,
        }
    }

    fn adapter(&self) -> Result<&UtxoAdapter, WalletError> {
        self.registry.utxo(Chain::Bitcoin)
    }

    pub async fn get_balance(&self, address: &str) -> Result<BitcoinBalance, WalletError> {
        let address = validate_btc_address(address)?;
        let stats = self.adapter()?.balance(&address).await?;

        let decimals = Chain::Bitcoin.native_decimals();
        let total = stats.total();
        let price_usd = self.market.native_price(Chain::Bitcoin);
        Ok(BitcoinBalance {
            address,
            confirmed: stats.confirmed.to_string(),
            unconfirmed: stats.unconfirmed.to_string(),
            balance: total.to_string(),
            formatted_balance: format_sats(total, decimals),
            price_usd,
            value_usd: price_usd.and_then(|p| usd_value(U256::from(total), decimals, p)),
        })
    }

    pub async fn get_utxos(&self, address: &str) -> Result<Vec<Utxo>, WalletError> {
        self.adapter()?.utxos(address).await
    }

    pub async fn get_transactions(
        &self,
        address: &str,
    ) -> Result<Vec<TransactionGroup>, WalletError> {
        let transactions = self.adapter()?.transactions(address).await?;
        Ok(group_by_date(transactions))
    }

    pub async fn get_transaction_status(
        &self,
        txid: &str,
    ) -> Result<ConfirmationStatus, WalletError> {
        self.adapter()?.confirmation_status(txid).await
    }

    pub async fn send_transaction(
        &self,
        user: &UserId,
        raw: &str,
    ) -> Result<SubmittedTransaction, WalletError> {
        let hash = self.adapter()?.send_raw_transaction(raw).await?;
        notify_submitted(self.store.as_ref(), user, Chain::Bitcoin, &hash).await;
        Ok(SubmittedTransaction {
            chain: Chain::Bitcoin,
            hash,
        })
    }

    /// sat/vB by confirmation target.
    pub async fn get_fee_estimates(&self) -> Result<HashMap<String, f64>, WalletError> {
        self.adapter()?.fee_estimates().await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use chrono::Utc;

    use super::*;
    use crate::{
        adapters::ChainAdapter,
        clients::esplora::{EsploraInput, EsploraOutput, EsploraTx},
        config::MarketSettings,
        error::Fault,
        mocks::{fast_retry, market_token, MockMarket, MockUtxo},
        models::TxConfirmation,
        store::MemoryUserStore,
    };

    const ALICE: &str = "bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq";
    const BOB: &str = "bc1qxy2kgdygjrsqtzq2n0yrf2493p83kkfjhx0wlh";

    fn confirmed_at(height: u64, time: i64) -> TxConfirmation {
        TxConfirmation {
            confirmed: true,
            block_height: Some(height),
            block_time: Some(time),
        }
    }

    fn payment(txid: &str, from: &str, to: &str, value: u64, status: TxConfirmation) -> EsploraTx {
        EsploraTx {
            txid: txid.to_string(),
            status,
            vin: vec![EsploraInput {
                prevout: Some(EsploraOutput {
                    scriptpubkey_address: Some(from.to_string()),
                    value: value + 1_000,
                }),
            }],
            vout: vec![EsploraOutput {
                scriptpubkey_address: Some(to.to_string()),
                value,
            }],
            fee: Some(1_000),
        }
    }

    fn service(utxo: MockUtxo) -> (BitcoinService, Arc<MockUtxo>, Arc<MemoryUserStore>) {
        let utxo = Arc::new(utxo);
        let retry = fast_retry(2);
        let mut registry = ChainRegistry::new();
        registry.insert(ChainAdapter::Utxo(UtxoAdapter::new(
            Chain::Bitcoin,
            utxo.clone(),
            retry,
        )));

        let market = Arc::new(TokenMarketCache::new(
            Arc::new(MockMarket::default()),
            MarketSettings::default().resolved_coin_ids(),
            retry,
        ));
        market.apply(Utc::now(), vec![market_token("bitcoin", "BTC", None, 40_000.0)]);

        let store = Arc::new(MemoryUserStore::new());
        (
            BitcoinService::new(Arc::new(registry), market, store.clone()),
            utxo,
            store,
        )
    }

    #[tokio::test]
    async fn test_balance_includes_mempool() {
        let (service, _, _) = service(MockUtxo::default().with_stats(250_000_000, -50_000_000));
        let balance = service.get_balance(ALICE).await.unwrap();
        assert_eq!(balance.confirmed, "250000000");
        assert_eq!(balance.unconfirmed, "-50000000");
        assert_eq!(balance.balance, "200000000");
        assert_eq!(balance.formatted_balance, "2");
        assert_eq!(balance.value_usd, Some(80_000.0));
    }

    #[tokio::test]
    async fn test_invalid_address_is_not_dispatched() {
        let (service, utxo, _) = service(MockUtxo::default());
        let err = service.get_utxos("0x1111111111111111111111111111111111111111").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(utxo.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_transactions_grouped_by_day() {
        let day1 = 1_672_570_800; // 2023-01-01 11:00 UTC
        let txs = vec![
            payment(&"a".repeat(64), BOB, ALICE, 5_000, confirmed_at(800_000, day1 + 3600)),
            payment(&"b".repeat(64), ALICE, BOB, 2_000, confirmed_at(799_990, day1)),
            payment(&"c".repeat(64), BOB, ALICE, 7_000, confirmed_at(800_100, day1 + 86_400)),
        ];
        let (service, _, _) = service(MockUtxo::default().with_txs(txs));

        let groups = service.get_transactions(ALICE).await.unwrap();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].transactions.len(), 2);
        assert_eq!(groups[0].transactions[1].amount, "2000");
        assert_eq!(groups[1].transactions[0].formatted_amount, "0.00007");
    }

    #[tokio::test]
    async fn test_status_counts_confirmations() {
        let txid = "d".repeat(64);
        let (service, _, _) = service(
            MockUtxo::default()
                .with_txs(vec![payment(&txid, BOB, ALICE, 1, confirmed_at(800_000, 0))])
                .with_tip(800_005),
        );
        let status = service.get_transaction_status(&txid).await.unwrap();
        assert!(status.confirmed);
        assert_eq!(status.confirmations, 6);
    }

    #[tokio::test]
    async fn test_broadcast_failure_is_rejected_without_notification() {
        let (service, utxo, store) = service(MockUtxo::default());
        utxo.fail_with(Fault::permanent("400 Bad Request: bad-txns-inputs-missingorspent"));

        let err = service
            .send_transaction(&"alice".to_string(), "0200000001")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_REJECTED");
        assert!(store.notifications(&"alice".to_string()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_broadcast_records_notification() {
        let (service, utxo, store) = service(MockUtxo::default());
        let submitted = service
            .send_transaction(&"alice".to_string(), "0200000001")
            .await
            .unwrap();
        assert_eq!(submitted.hash, "f".repeat(64));
        assert_eq!(utxo.broadcasts.lock().unwrap().as_slice(), ["0200000001"]);

        let notifications = store.notifications(&"alice".to_string()).await.unwrap();
        assert_eq!(notifications[0].chain, Chain::Bitcoin);
    }
}
