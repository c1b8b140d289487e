use std::collections::HashMap;

use axum::{extract::State, http::HeaderMap, Json};
use serde::Deserialize;

use super::{require_user, ApiResponse, ApiResult, AppState, JsonBody};
use crate::models::{BitcoinBalance, ConfirmationStatus, SubmittedTransaction, TransactionGroup, Utxo};

type Reply<T> = ApiResult<Json<ApiResponse<T>>>;

#[derive(Debug, Deserialize)]
pub struct AddressRequest {
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct TxidRequest {
    pub txid: String,
}

#[derive(Debug, Deserialize)]
pub struct SendRequest {
    pub raw_transaction: String,
}

/// POST /api/v1/bitcoin/balance
pub async fn get_balance(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AddressRequest>,
) -> Reply<BitcoinBalance> {
    Ok(ApiResponse::success(state.bitcoin.get_balance(&req.address).await?))
}

/// POST /api/v1/bitcoin/utxos
pub async fn get_utxos(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AddressRequest>,
) -> Reply<Vec<Utxo>> {
    Ok(ApiResponse::success(state.bitcoin.get_utxos(&req.address).await?))
}

/// POST /api/v1/bitcoin/transactions
pub async fn get_transactions(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AddressRequest>,
) -> Reply<Vec<TransactionGroup>> {
    Ok(ApiResponse::success(
        state.bitcoin.get_transactions(&req.address).await?,
    ))
}

/// POST /api/v1/bitcoin/transaction-status
pub async fn get_transaction_status(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TxidRequest>,
) -> Reply<ConfirmationStatus> {
    Ok(ApiResponse::success(
        state.bitcoin.get_transaction_status(&req.txid).await?,
    ))
}

/// POST /api/v1/bitcoin/send
pub async fn send_transaction(
    State(state): State<AppState>,
    headers: HeaderMap,
    JsonBody(req): JsonBody<SendRequest>,
) -> Reply<SubmittedTransaction> {
    let user = require_user(&headers, &state).await?;
    let submitted = state
        .bitcoin
        .send_transaction(&user, &req.raw_transaction)
        .await?;
    Ok(ApiResponse::success(submitted))
}

/// GET /api/v1/bitcoin/fee-estimates
pub async fn get_fee_estimates(State(state): State<AppState>) -> Reply<HashMap<String, f64>> {
    Ok(ApiResponse::success(state.bitcoin.get_fee_estimates().await?))
}
