use std::{collections::HashMap, sync::Arc};

use chrono::{DateTime, Utc};
use log::{error, info};
use tokio::sync::watch;

use crate::{
    clients::MarketData,
    error::WalletError,
    models::{is_native_token, Chain, MarketToken, TokenKey},
    utils::RetryPolicy,
};

/// Immutable view of the market token list at one refresh.
#[derive(Debug, Default)]
pub struct TokenMarketSnapshot {
    /// Start time of the refresh that produced this list; `None` before the first one
    pub fetched_at: Option<DateTime<Utc>>,
    pub tokens: Vec<MarketToken>,
    by_contract: HashMap<TokenKey, usize>,
    by_id: HashMap<String, usize>,
}

impl TokenMarketSnapshot {
    pub fn new(fetched_at: DateTime<Utc>, tokens: Vec<MarketToken>) -> Self {
        let mut by_contract = HashMap::new();
        let mut by_id = HashMap::with_capacity(tokens.len());

        for (i, token) in tokens.iter().enumerate() {
            by_id.entry(token.id.clone()).or_insert(i);
            for (chain, address) in &token.addresses {
                // List is ordered by market cap; the first claim on a contract wins
                by_contract.entry(TokenKey::new(*chain, address)).or_insert(i);
            }
        }

        Self {
            fetched_at: Some(fetched_at),
            tokens,
            by_contract,
            by_id,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    /// Token deployed at `address` on `chain`.
    pub fn by_contract(&self, chain: Chain, address: &str) -> Option<&MarketToken> {
        self.by_contract
            .get(&TokenKey::new(chain, address))
            .map(|&i| &self.tokens[i])
    }

    pub fn by_id(&self, id: &str) -> Option<&MarketToken> {
        self.by_id.get(id).map(|&i| &self.tokens[i])
    }
}

/// Periodically refreshed market token list.
///
/// Readers get an `Arc` of the latest snapshot and never wait on the network.
/// A refresh replaces the snapshot only when it started after the refresh that
/// produced the current one.
pub struct TokenMarketCache {
    market: Arc<dyn MarketData>,
    coin_ids: HashMap<Chain, String>,
    retry: RetryPolicy,
    snapshot: watch::Sender<Arc<TokenMarketSnapshot>>,
}

impl TokenMarketCache {
    pub fn new(
        market: Arc<dyn MarketData>,
        coin_ids: HashMap<Chain, String>,
        retry: RetryPolicy,
    ) -> Self {
        let (snapshot, _) = watch::channel(Arc::new(TokenMarketSnapshot::default()));
        Self {
            market,
            coin_ids,
            retry,
            snapshot,
        }
    }

    /// Latest snapshot; empty until the first refresh succeeds.
    pub fn get_tokens(&self) -> Arc<TokenMarketSnapshot> {
        self.snapshot.borrow().clone()
    }

    /// Fetch the market list and apply it if no later refresh got there first.
    ///
    /// Failures are logged and leave the current snapshot in place. Returns
    /// whether the snapshot was replaced.
    pub async fn refresh(&self) -> bool {
        let started_at = Utc::now();

        match self
            .retry
            .run("market.token_markets", || self.market.token_markets())
            .await
        {
            Ok(tokens) => {
                let count = tokens.len();
                let applied = self.apply(started_at, tokens);
                if applied {
                    info!("Token market snapshot refreshed with {} tokens", count);
                } else {
                    info!(
                        "Discarded token market refresh started at {}: a newer snapshot is in place",
                        started_at
                    );
                }
                applied
            },
            Err(e) => {
                error!("Token market refresh failed, keeping previous snapshot: {}", e);
                false
            },
        }
    }

    /// Replace the snapshot if `started_at` is newer than the current one's.
    pub fn apply(&self, started_at: DateTime<Utc>, tokens: Vec<MarketToken>) -> bool {
        let mut fresh = Some(TokenMarketSnapshot::new(started_at, tokens));
        self.snapshot.send_if_modified(|current| {
            if current.fetched_at >= Some(started_at) {
                return false;
            }
            match fresh.take() {
                Some(snapshot) => {
                    *current = Arc::new(snapshot);
                    true
                },
                None => false,
            }
        })
    }

    /// Market entry of a chain's native coin.
    pub fn native_token(&self, chain: Chain) -> Option<MarketToken> {
        let coin_id = self.coin_ids.get(&chain)?;
        self.get_tokens().by_id(coin_id).cloned()
    }

    /// USD price of a chain's native coin from the snapshot.
    pub fn native_price(&self, chain: Chain) -> Option<f64> {
        self.native_token(chain)?.price_usd
    }

    /// USD price of a chain's native coin, asking the provider directly while
    /// the snapshot has none (cold start, or the coin fell off the list).
    pub async fn coin_price(&self, chain: Chain) -> Result<f64, WalletError> {
        if let Some(price) = self.native_price(chain) {
            return Ok(price);
        }

        let coin_id = self.coin_ids.get(&chain).ok_or_else(|| {
            WalletError::configuration(format!("no market coin id configured for {}", chain))
        })?;
        let ids = [coin_id.clone()];
        let prices = self
            .retry
            .run("market.current_prices", || self.market.current_prices(&ids))
            .await
            .map_err(|e| e.context(chain))?;

        prices
            .get(coin_id)
            .copied()
            .ok_or_else(|| WalletError::NotFound(format!("no USD price for {}", coin_id)))
    }

    /// USD price of a token on `chain`; native sentinel resolves to the coin price.
    pub fn token_price(&self, chain: Chain, address: &str) -> Option<f64> {
        if is_native_token(address) {
            return self.native_price(chain);
        }
        self.get_tokens().by_contract(chain, address)?.price_usd
    }
}
