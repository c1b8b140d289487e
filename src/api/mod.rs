//! HTTP surface: JSON in, JSON out.
//!
//! Handlers deserialize the body, resolve the session when the operation is
//! user-scoped, call one service method and wrap the result. Every error is
//! rendered by [`ApiError`] as `{success: false, error: {code, message}}`.

mod bitcoin;
mod error;
mod swap;
mod wallet;

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header::AUTHORIZATION, HeaderMap},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::cors::CorsLayer;

pub use error::{ApiError, ApiResult, JsonBody};

use crate::{
    adapters::ChainRegistry,
    cache::TokenMarketCache,
    error::WalletError,
    models::{Chain, UserId},
    services::{BitcoinService, SwapService, WalletService},
    store::UserStore,
};

#[derive(Clone)]
pub struct AppState {
    pub wallet: Arc<WalletService>,
    pub swap: Arc<SwapService>,
    pub bitcoin: Arc<BitcoinService>,
    pub registry: Arc<ChainRegistry>,
    pub market: Arc<TokenMarketCache>,
    pub store: Arc<dyn UserStore>,
}

#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T> ApiResponse<T> {
    pub fn success(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data,
        })
    }
}

/// Resolve `Authorization: Bearer <session>` to a user.
pub async fn require_user(headers: &HeaderMap, state: &AppState) -> ApiResult<UserId> {
    let token = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(WalletError::Unauthorized)?;
    Ok(state.store.authenticate(token).await?)
}

pub(crate) fn parse_chain(chain: &str) -> Result<Chain, WalletError> {
    chain.parse()
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub chains: Vec<Chain>,
    pub market_tokens: usize,
    pub market_fetched_at: Option<chrono::DateTime<chrono::Utc>>,
}

/// GET /health
pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let snapshot = state.market.get_tokens();
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        chains: state.registry.chains(),
        market_tokens: snapshot.len(),
        market_fetched_at: snapshot.fetched_at,
    })
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Wallet
        .route("/api/v1/wallet/balances", post(wallet::get_balances))
        .route("/api/v1/wallet/tokens", post(wallet::get_wallet_tokens))
        .route("/api/v1/wallet/transactions", post(wallet::get_transactions))
        .route("/api/v1/wallet/transaction", post(wallet::get_transaction_info))
        .route("/api/v1/wallet/nonce", post(wallet::get_nonce))
        .route("/api/v1/wallet/gas-price", post(wallet::get_gas_price))
        .route("/api/v1/wallet/estimate-gas", post(wallet::estimate_gas))
        .route("/api/v1/wallet/send", post(wallet::send_transaction))
        .route("/api/v1/wallet/coin-price", post(wallet::get_chain_coin_price))
        .route("/api/v1/wallet/historic-price", post(wallet::get_historic_value_price))
        .route("/api/v1/wallet/custom-tokens", post(wallet::add_custom_tokens))
        .route("/api/v1/wallet/hidden-tokens", post(wallet::set_token_hidden))
        .route("/api/v1/wallet/notifications", get(wallet::get_notifications))
        .route("/api/v1/wallet/notifications/read", post(wallet::mark_notifications_read))
        .route(
            "/api/v1/wallet/settings",
            get(wallet::get_settings).post(wallet::save_settings),
        )
        // Swap
        .route("/api/v1/swap/tokens", post(swap::get_tokens))
        .route("/api/v1/swap/quote", post(swap::get_quote))
        .route("/api/v1/swap/allowance", post(swap::get_allowance_transaction))
        .route("/api/v1/swap/transaction", post(swap::get_swap_transaction))
        .route("/api/v1/swap/referrer-fee", post(swap::get_referrer_fee))
        // Bitcoin
        .route("/api/v1/bitcoin/balance", post(bitcoin::get_balance))
        .route("/api/v1/bitcoin/utxos", post(bitcoin::get_utxos))
        .route("/api/v1/bitcoin/transactions", post(bitcoin::get_transactions))
        .route("/api/v1/bitcoin/transaction-status", post(bitcoin::get_transaction_status))
        .route("/api/v1/bitcoin/send", post(bitcoin::send_transaction))
        .route("/api/v1/bitcoin/fee-estimates", get(bitcoin::get_fee_estimates))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
