use std::collections::HashMap;

use axum::{extract::State, http::HeaderMap, Json};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{parse_chain, require_user, ApiResponse, ApiResult, AppState, JsonBody};
use crate::models::{
    CustomToken, EvmCall, HistoricPrice, NativeBalance, Notification, SubmittedTransaction,
    TransactionGroup, UserSettings, WalletToken, WalletTransaction,
};

type Reply<T> = ApiResult<Json<ApiResponse<T>>>;

#[derive(Debug, Deserialize)]
pub struct BalancesRequest {
    #[serde(default)]
    pub evm_address: Option<String>,
    #[serde(default)]
    pub btc_address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChainRequest {
    pub chain: String,
}

#[derive(Debug, Deserialize)]
pub struct ChainAddressRequest {
    pub chain: String,
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct TransactionInfoRequest {
    pub chain: String,
    pub hash: String,
    #[serde(default)]
    pub address: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct EstimateGasRequest {
    pub chain: String,
    #[serde(flatten)]
    pub call: EvmCall,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub chain: String,
    pub raw_transaction: String,
}

#[derive(Debug, Deserialize)]
pub struct HistoricPriceRequest {
    pub chain: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub amount: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CustomTokensRequest {
    pub chain: String,
    pub addresses: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct HiddenTokenRequest {
    pub chain: String,
    pub address: String,
    pub hidden: bool,
}

#[derive(Debug, Deserialize, Default)]
pub struct MarkReadRequest {
    /// All unread when absent
    #[serde(default)]
    pub ids: Option<Vec<i64>>,
}

#[derive(Debug, Serialize)]
pub struct GasPrice {
    pub gas_price: String,
}

#[derive(Debug, Serialize)]
pub struct Nonce {
    pub nonce: u64,
}

#[derive(Debug, Serialize)]
pub struct GasEstimate {
    pub gas: u64,
}

#[derive(Debug, Serialize)]
pub struct CoinPrice {
    pub price_usd: f64,
}

#[derive(Debug, Serialize)]
pub struct MarkedRead {
    pub updated: u64,
}

/// POST /api/v1/wallet/balances
pub async fn get_balances(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<BalancesRequest>,
) -> Reply<Vec<NativeBalance>> {
    let balances = state
        .wallet
        .get_balances(req.evm_address.as_deref(), req.btc_address.as_deref())
        .await?;
    Ok(ApiResponse::success(balances))
}

/// POST /api/v1/wallet/tokens
pub async fn get_wallet_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<ChainAddressRequest>,
) -> Reply<Vec<WalletToken>> {
    let user = require_user(&headers, &state).await?;
    let chain = parse_chain(&req.chain)?;
    let tokens = state
        .wallet
        .get_wallet_tokens(&user, chain, &req.address)
        .await?;
    Ok(ApiResponse::success(tokens))
}

/// POST /api/v1/wallet/transactions
pub async fn get_transactions(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ChainAddressRequest>,
) -> Reply<Vec<TransactionGroup>> {
    let chain = parse_chain(&req.chain)?;
    let groups = state.wallet.get_transactions(chain, &req.address).await?;
    Ok(ApiResponse::success(groups))
}

/// POST /api/v1/wallet/transaction
pub async fn get_transaction_info(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TransactionInfoRequest>,
) -> Reply<Vec<WalletTransaction>> {
    let chain = parse_chain(&req.chain)?;
    let legs = state
        .wallet
        .get_transaction_info(chain, &req.hash, req.address.as_deref())
        .await?;
    Ok(ApiResponse::success(legs))
}

/// POST /api/v1/wallet/nonce
pub async fn get_nonce(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ChainAddressRequest>,
) -> Reply<Nonce> {
    let chain = parse_chain(&req.chain)?;
    let nonce = state.wallet.get_nonce(chain, &req.address).await?;
    Ok(ApiResponse::success(Nonce { nonce }))
}

/// POST /api/v1/wallet/gas-price
pub async fn get_gas_price(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ChainRequest>,
) -> Reply<GasPrice> {
    let chain = parse_chain(&req.chain)?;
    let gas_price = state.wallet.get_gas_price(chain).await?;
    Ok(ApiResponse::success(GasPrice { gas_price }))
}

/// POST /api/v1/wallet/estimate-gas
pub async fn estimate_gas(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<EstimateGasRequest>,
) -> Reply<GasEstimate> {
    let chain = parse_chain(&req.chain)?;
    let gas = state.wallet.estimate_gas(chain, &req.call).await?;
    Ok(ApiResponse::success(GasEstimate { gas }))
}

/// POST /api/v1/wallet/send
pub async fn send_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<SendRequest>,
) -> Reply<SubmittedTransaction> {
    let user = require_user(&headers, &state).await?;
    let chain = parse_chain(&req.chain)?;
    let submitted = state
        .wallet
        .send_transaction(&user, chain, &req.raw_transaction)
        .await?;
    Ok(ApiResponse::success(submitted))
}

/// POST /api/v1/wallet/coin-price
pub async fn get_chain_coin_price(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ChainRequest>,
) -> Reply<CoinPrice> {
    let chain = parse_chain(&req.chain)?;
    let price_usd = state.wallet.get_chain_coin_price(chain).await?;
    Ok(ApiResponse::success(CoinPrice { price_usd }))
}

/// POST /api/v1/wallet/historic-price
pub async fn get_historic_value_price(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<HistoricPriceRequest>,
) -> Reply<HistoricPrice> {
    let chain = parse_chain(&req.chain)?;
    let price = state
        .wallet
        .get_historic_value_price(chain, req.timestamp, req.amount.as_deref())
        .await?;
    Ok(ApiResponse::success(price))
}

/// POST /api/v1/wallet/custom-tokens
pub async fn add_custom_tokens(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<CustomTokensRequest>,
) -> Reply<Vec<CustomToken>> {
    let user = require_user(&headers, &state).await?;
    let chain = parse_chain(&req.chain)?;
    let tokens = state
        .wallet
        .add_wallet_tokens_to_custom_tokens(&user, chain, &req.addresses)
        .await?;
    Ok(ApiResponse::success(tokens))
}

/// POST /api/v1/wallet/hidden-tokens
pub async fn set_token_hidden(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<HiddenTokenRequest>,
) -> Reply<HashMap<&'static str, bool>> {
    let user = require_user(&headers, &state).await?;
    let chain = parse_chain(&req.chain)?;
    state
        .wallet
        .set_token_hidden(&user, chain, &req.address, req.hidden)
        .await?;
    Ok(ApiResponse::success(HashMap::from([("hidden", req.hidden)])))
}

/// GET /api/v1/wallet/notifications
pub async fn get_notifications(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Reply<Vec<Notification>> {
    let user = require_user(&headers, &state).await?;
    let notifications = state.wallet.get_notifications(&user).await?;
    Ok(ApiResponse::success(notifications))
}

/// POST /api/v1/wallet/notifications/read
pub async fn mark_notifications_read(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<MarkReadRequest>,
) -> Reply<MarkedRead> {
    let user = require_user(&headers, &state).await?;
    let updated = state
        .wallet
        .mark_notifications_read(&user, req.ids.as_deref())
        .await?;
    Ok(ApiResponse::success(MarkedRead { updated }))
}

/// GET /api/v1/wallet/settings
pub async fn get_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Reply<UserSettings> {
    let user = require_user(&headers, &state).await?;
    Ok(ApiResponse::success(state.wallet.get_settings(&user).await?))
}

/// POST /api/v1/wallet/settings
pub async fn save_settings(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(settings): JsonBody<UserSettings>,
) -> Reply<UserSettings> {
    let user = require_user(&headers, &state).await?;
    state.wallet.save_settings(&user, &settings).await?;
    Ok(ApiResponse::success(settings))
}
