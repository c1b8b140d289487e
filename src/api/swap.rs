use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use super::{parse_chain, ApiResponse, ApiResult, AppState, JsonBody};
use crate::models::{AllowanceCheck, SwapQuote, SwapRequest, SwapToken, SwapTransaction};

type Reply<T> = ApiResult<Json<ApiResponse<T>>>;

#[derive(Debug, Deserialize)]
pub struct TokensRequest {
    pub chain: String,
}

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
    pub chain: String,
    pub src: String,
    pub dst: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct AllowanceRequest {
    pub chain: String,
    pub token: String,
    pub owner: String,
    pub amount: String,
}

#[derive(Debug, Deserialize)]
pub struct SwapTransactionRequest {
    pub chain: String,
    #[serde(flatten)]
    pub swap: SwapRequest,
}

#[derive(Debug, Deserialize)]
pub struct ReferrerFeeRequest {
    pub amount: String,
}

#[derive(Debug, Serialize)]
pub struct ReferrerFee {
    pub referrer_fee: String,
    pub referrer_fee_bps: u32,
}

/// POST /api/v1/swap/tokens
pub async fn get_tokens(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TokensRequest>,
) -> Reply<Vec<SwapToken>> {
    let chain = parse_chain(&req.chain)?;
    Ok(ApiResponse::success(state.swap.get_tokens(chain)?))
}

/// POST /api/v1/swap/quote
pub async fn get_quote(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<QuoteRequest>,
) -> Reply<SwapQuote> {
    let chain = parse_chain(&req.chain)?;
    let quote = state
        .swap
        .get_quote(chain, &req.src, &req.dst, &req.amount)
        .await?;
    Ok(ApiResponse::success(quote))
}

/// POST /api/v1/swap/allowance
pub async fn get_allowance_transaction(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<AllowanceRequest>,
) -> Reply<AllowanceCheck> {
    let chain = parse_chain(&req.chain)?;
    let check = state
        .swap
        .get_allowance_transaction(chain, &req.token, &req.owner, &req.amount)
        .await?;
    Ok(ApiResponse::success(check))
}

/// POST /api/v1/swap/transaction
pub async fn get_swap_transaction(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<SwapTransactionRequest>,
) -> Reply<SwapTransaction> {
    let chain = parse_chain(&req.chain)?;
    let tx = state.swap.get_swap_transaction(chain, &req.swap).await?;
    Ok(ApiResponse::success(tx))
}

/// POST /api/v1/swap/referrer-fee
pub async fn get_referrer_fee(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<ReferrerFeeRequest>,
) -> Reply<ReferrerFee> {
    let referrer_fee = state.swap.get_referrer_fee(&req.amount)?;
    Ok(ApiResponse::success(ReferrerFee {
        referrer_fee,
        referrer_fee_bps: state.swap.referrer_fee_bps(),
    }))
}
