use std::{collections::HashSet, sync::Arc};

use chrono::{DateTime, Utc};
use futures::future::try_join_all;
use log::{debug, warn};

use crate::{
    adapters::{ChainRegistry, EvmAdapter},
    cache::{PriceHistoryCache, TokenMarketCache},
    error::WalletError,
    models::{
        group_by_date, is_native_token, Chain, ChainFamily, CustomToken, EvmCall, HistoricPrice,
        NativeBalance, NewNotification, Notification, NotificationKind, SubmittedTransaction,
        TokenKey, TransactionGroup, UserId, UserSettings, WalletToken, WalletTransaction,
        NATIVE_TOKEN_ADDRESS, NATIVE_TOKEN_DECIMALS,
    },
    store::UserStore,
    utils::{format_units, normalize_address, normalize_address_field, parse_amount, usd_value},
};

/// Where a wallet-view token came from; decides whether a zero balance is shown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Native,
    Default,
    Custom,
}

struct Candidate {
    address: String,
    origin: Origin,
    /// Known for custom tokens, which store it when added
    decimals: Option<u8>,
    symbol: Option<String>,
}

/// Balance, transaction and price queries for a user's wallets.
pub struct WalletService {
    registry: Arc<ChainRegistry>,
    market: Arc<TokenMarketCache>,
    prices: Arc<PriceHistoryCache>,
    store: Arc<dyn UserStore>,
}

impl WalletService {
    pub fn new(
        registry: Arc<ChainRegistry>,
        market: Arc<TokenMarketCache>,
        prices: Arc<PriceHistoryCache>,
        store: Arc<dyn UserStore>,
    ) -> Self {
        Self {
            registry,
            market,
            prices,
            store,
        }
    }

    /// Native balance on every configured chain the caller supplied an address for.
    pub async fn get_balances(
        &self,
        evm_address: Option<&str>,
        btc_address: Option<&str>,
    ) -> Result<Vec<NativeBalance>, WalletError> {
        let mut targets = Vec::new();
        for chain in self.registry.chains() {
            let address = match chain.family() {
                ChainFamily::Evm => evm_address,
                ChainFamily::Utxo => btc_address,
            };
            if let Some(address) = address {
                let adapter = self.registry.get(chain)?;
                targets.push((adapter, adapter.normalize_address(address)?));
            }
        }

        try_join_all(targets.into_iter().map(|(adapter, address)| async move {
            let chain = adapter.chain();
            let balance = adapter.native_balance(&address).await?;
            let decimals = chain.native_decimals();
            let price_usd = self.market.native_price(chain);
            Ok::<_, WalletError>(NativeBalance {
                chain,
                symbol: chain.native_symbol().to_string(),
                decimals,
                balance: balance.to_string(),
                formatted_balance: format_units(balance, decimals),
                price_usd,
                value_usd: price_usd.and_then(|p| usd_value(balance, decimals, p)),
                address,
            })
        }))
        .await
    }

    /// Native coin, default tokens and the user's custom tokens on `chain`,
    /// minus hidden ones, with balances and USD values.
    pub async fn get_wallet_tokens(
        &self,
        user: &UserId,
        chain: Chain,
        address: &str,
    ) -> Result<Vec<WalletToken>, WalletError> {
        let evm = self.registry.evm(chain)?;
        let owner = normalize_address(address)?;

        let (hidden, custom, settings) = tokio::try_join!(
            self.store.hidden_tokens(user),
            self.store.custom_tokens(user, Some(chain)),
            self.store.settings(user),
        )?;

        let candidates = wallet_candidates(evm, &hidden, custom);
        debug!(
            "Wallet view for {} on {}: {} candidate tokens",
            owner,
            chain,
            candidates.len()
        );

        let tokens = try_join_all(
            candidates
                .into_iter()
                .map(|c| self.wallet_token(evm, &owner, c)),
        )
        .await?;

        Ok(tokens
            .into_iter()
            .filter(|(token, origin)| {
                let zero = token.balance == "0";
                match origin {
                    Origin::Native => true,
                    Origin::Default => !zero,
                    Origin::Custom => !(zero && settings.hide_zero_balances),
                }
            })
            .map(|(token, _)| token)
            .collect())
    }

    async fn wallet_token(
        &self,
        evm: &EvmAdapter,
        owner: &str,
        candidate: Candidate,
    ) -> Result<(WalletToken, Origin), WalletError> {
        let chain = evm.chain();
        let market = if candidate.origin == Origin::Native {
            self.market.native_token(chain)
        } else {
            self.market
                .get_tokens()
                .by_contract(chain, &candidate.address)
                .cloned()
        };

        let decimals = match candidate.decimals {
            Some(d) => d,
            None if candidate.origin == Origin::Native => NATIVE_TOKEN_DECIMALS,
            None => evm.decimals(&candidate.address).await?,
        };
        let balance = evm.token_balance(&candidate.address, owner).await?;

        let origin = candidate.origin;
        let (symbol, name) = if origin == Origin::Native {
            (
                chain.native_symbol().to_string(),
                chain.native_name().to_string(),
            )
        } else if let Some(m) = &market {
            (m.symbol.to_uppercase(), m.name.clone())
        } else if let Some(symbol) = candidate.symbol {
            (symbol.clone(), symbol)
        } else {
            let symbol = evm.symbol(&candidate.address).await.unwrap_or_else(|e| {
                debug!("No symbol for {} on {}: {}", candidate.address, chain, e);
                "ERC20".to_string()
            });
            (symbol.clone(), symbol)
        };

        let price_usd = market.as_ref().and_then(|m| m.price_usd);
        let token = WalletToken {
            chain,
            address: candidate.address,
            symbol,
            name,
            decimals,
            balance: balance.to_string(),
            formatted_balance: format_units(balance, decimals),
            price_usd,
            value_usd: price_usd.and_then(|p| usd_value(balance, decimals, p)),
            logo_url: market.and_then(|m| m.image),
            native: origin == Origin::Native,
            custom: origin == Origin::Custom,
        };
        Ok((token, origin))
    }

    /// History on `chain` grouped by calendar day, newest first.
    pub async fn get_transactions(
        &self,
        chain: Chain,
        address: &str,
    ) -> Result<Vec<TransactionGroup>, WalletError> {
        let transactions = self.registry.get(chain)?.transactions(address).await?;
        Ok(group_by_date(transactions))
    }

    pub async fn get_transaction_info(
        &self,
        chain: Chain,
        hash: &str,
        address: Option<&str>,
    ) -> Result<Vec<WalletTransaction>, WalletError> {
        self.registry.get(chain)?.transaction(hash, address).await
    }

    pub async fn get_nonce(&self, chain: Chain, address: &str) -> Result<u64, WalletError> {
        self.registry.evm(chain)?.nonce(address).await
    }

    /// Gas price in wei.
    pub async fn get_gas_price(&self, chain: Chain) -> Result<String, WalletError> {
        Ok(self.registry.evm(chain)?.gas_price().await?.to_string())
    }

    pub async fn estimate_gas(&self, chain: Chain, call: &EvmCall) -> Result<u64, WalletError> {
        self.registry.evm(chain)?.estimate_gas(call).await
    }

    /// Broadcast a signed transaction and record a notification for the user.
    pub async fn send_transaction(
        &self,
        user: &UserId,
        chain: Chain,
        raw: &str,
    ) -> Result<SubmittedTransaction, WalletError> {
        let hash = self.registry.get(chain)?.send_raw_transaction(raw).await?;
        notify_submitted(self.store.as_ref(), user, chain, &hash).await;
        Ok(SubmittedTransaction { chain, hash })
    }

    /// Current USD price of the chain's native coin.
    pub async fn get_chain_coin_price(&self, chain: Chain) -> Result<f64, WalletError> {
        self.market.coin_price(chain).await
    }

    /// Native-coin price on the day of `timestamp`, and the USD value of
    /// `amount` (raw units) at that price.
    pub async fn get_historic_value_price(
        &self,
        chain: Chain,
        timestamp: DateTime<Utc>,
        amount: Option<&str>,
    ) -> Result<HistoricPrice, WalletError> {
        let amount = amount.map(|a| parse_amount("amount", a)).transpose()?;
        let date = timestamp.date_naive();
        let price_usd = self.prices.get_price(chain, date).await?;

        let decimals = chain.native_decimals();
        Ok(HistoricPrice {
            chain,
            date,
            price_usd,
            amount: amount.map(|a| a.to_string()),
            value_usd: amount.and_then(|a| usd_value(a, decimals, price_usd)),
        })
    }

    /// Confirm each contract on-chain, then store it as a custom token and un-hide it.
    pub async fn add_wallet_tokens_to_custom_tokens(
        &self,
        user: &UserId,
        chain: Chain,
        addresses: &[String],
    ) -> Result<Vec<CustomToken>, WalletError> {
        let evm = self.registry.evm(chain)?;
        if addresses.is_empty() {
            return Err(WalletError::validation("addresses", "at least one token is required"));
        }

        let mut seen = HashSet::new();
        let mut normalized = Vec::with_capacity(addresses.len());
        for address in addresses {
            let address = normalize_address_field("addresses", address)?;
            if is_native_token(&address) {
                return Err(WalletError::validation(
                    "addresses",
                    "the native coin is always shown and cannot be added",
                ));
            }
            if seen.insert(address.clone()) {
                normalized.push(address);
            }
        }

        let snapshot = self.market.get_tokens();
        let tokens = try_join_all(normalized.into_iter().map(|address| {
            let snapshot = snapshot.clone();
            async move {
                let decimals = evm.decimals(&address).await?;
                let symbol = match snapshot.by_contract(chain, &address) {
                    Some(m) => m.symbol.to_uppercase(),
                    None => evm.symbol(&address).await?,
                };
                Ok::<_, WalletError>(CustomToken {
                    chain,
                    address,
                    symbol,
                    decimals,
                })
            }
        }))
        .await?;

        self.store.add_custom_tokens(user, &tokens).await?;
        for token in &tokens {
            self.store.set_token_hidden(user, &token.key(), false).await?;
        }

        let settings = self.store.settings(user).await?;
        if settings.notifications_enabled {
            let symbols: Vec<&str> = tokens.iter().map(|t| t.symbol.as_str()).collect();
            let notification = NewNotification {
                kind: NotificationKind::CustomTokenAdded,
                chain,
                message: format!("Added {} to your {} wallet", symbols.join(", "), chain),
                tx_hash: None,
            };
            if let Err(e) = self.store.add_notification(user, notification).await {
                warn!("Failed to record notification for {}: {}", user, e);
            }
        }

        Ok(tokens)
    }

    pub async fn set_token_hidden(
        &self,
        user: &UserId,
        chain: Chain,
        address: &str,
        hidden: bool,
    ) -> Result<(), WalletError> {
        self.registry.evm(chain)?;
        let address = normalize_address(address)?;
        self.store
            .set_token_hidden(user, &TokenKey::new(chain, &address), hidden)
            .await
    }

    pub async fn get_notifications(&self, user: &UserId) -> Result<Vec<Notification>, WalletError> {
        self.store.notifications(user).await
    }

    pub async fn mark_notifications_read(
        &self,
        user: &UserId,
        ids: Option<&[i64]>,
    ) -> Result<u64, WalletError> {
        self.store.mark_notifications_read(user, ids).await
    }

    pub async fn get_settings(&self, user: &UserId) -> Result<UserSettings, WalletError> {
        self.store.settings(user).await
    }

    pub async fn save_settings(
        &self,
        user: &UserId,
        settings: &UserSettings,
    ) -> Result<(), WalletError> {
        if let Some(chain) = settings.default_chain {
            if self.registry.get(chain).is_err() {
                return Err(WalletError::validation(
                    "default_chain",
                    format!("{} is not enabled", chain),
                ));
            }
        }
        self.store.save_settings(user, settings).await
    }
}

/// Native coin first, then default tokens, then custom tokens; hidden and
/// duplicate addresses dropped.
fn wallet_candidates(
    evm: &EvmAdapter,
    hidden: &HashSet<TokenKey>,
    custom: Vec<CustomToken>,
) -> Vec<Candidate> {
    let chain = evm.chain();
    let custom_addresses: HashSet<String> = custom.iter().map(|t| t.key().address).collect();
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    let is_visible = |address: &str| !hidden.contains(&TokenKey::new(chain, address));

    if is_visible(NATIVE_TOKEN_ADDRESS) {
        seen.insert(NATIVE_TOKEN_ADDRESS.to_string());
        out.push(Candidate {
            address: NATIVE_TOKEN_ADDRESS.to_string(),
            origin: Origin::Native,
            decimals: Some(NATIVE_TOKEN_DECIMALS),
            symbol: None,
        });
    }

    for address in evm.default_tokens() {
        if custom_addresses.contains(address) || !is_visible(address) {
            continue;
        }
        if seen.insert(address.clone()) {
            out.push(Candidate {
                address: address.clone(),
                origin: Origin::Default,
                decimals: None,
                symbol: None,
            });
        }
    }

    for token in custom {
        let key = token.key();
        if !is_visible(&key.address) || !seen.insert(key.address.clone()) {
            continue;
        }
        out.push(Candidate {
            address: key.address,
            origin: Origin::Custom,
            decimals: Some(token.decimals),
            symbol: Some(token.symbol),
        });
    }

    out
}

/// Record a "transaction submitted" notification when the user wants them.
///
/// The broadcast already happened, so store failures are only logged.
pub(crate) async fn notify_submitted(store: &dyn UserStore, user: &UserId, chain: Chain, hash: &str) {
    let result = async {
        if !store.settings(user).await?.notifications_enabled {
            return Ok(());
        }
        store
            .add_notification(
                user,
                NewNotification {
                    kind: NotificationKind::TransactionSubmitted,
                    chain,
                    message: format!("Transaction submitted on {}", chain),
                    tx_hash: Some(hash.to_string()),
                },
            )
            .await
            .map(|_| ())
    }
    .await;

    if let Err(e) = result {
        warn!("Failed to record notification for {}: {}", user, e);
    }
}
