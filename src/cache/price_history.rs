use std::{collections::HashMap, sync::Arc};

use chrono::NaiveDate;
use moka::future::Cache;

use crate::{
    clients::MarketData,
    error::WalletError,
    models::Chain,
    utils::RetryPolicy,
};

/// Native-coin USD price per (chain, calendar day).
///
/// A past day's price does not change, so entries never expire.
pub struct PriceHistoryCache {
    market: Arc<dyn MarketData>,
    coin_ids: HashMap<Chain, String>,
    entries: Cache<(Chain, NaiveDate), f64>,
    retry: RetryPolicy,
}

impl PriceHistoryCache {
    pub fn new(
        market: Arc<dyn MarketData>,
        coin_ids: HashMap<Chain, String>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            market,
            coin_ids,
            entries: Cache::builder().build(),
            retry,
        }
    }

    pub async fn get_price(&self, chain: Chain, date: NaiveDate) -> Result<f64, WalletError> {
        let coin_id = self.coin_ids.get(&chain).ok_or_else(|| {
            WalletError::configuration(format!("no market coin id configured for {}", chain))
        })?;

        self.entries
            .try_get_with((chain, date), async {
                self.retry
                    .run("market.historical_price", || {
                        self.market.historical_price(coin_id, date)
                    })
                    .await
                    .map_err(|e| e.context(format!("{} on {}", chain, date)))
            })
            .await
            .map_err(|e| (*e).clone())
    }
}
