use async_trait::async_trait;
use serde::Deserialize;
use url::Url;

use super::{ensure_success, http_client};
use crate::{
    error::{Fault, WalletError},
    models::RouterSwapParams,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterQuote {
    /// Raw destination amount
    pub to_amount: String,
}

/// Router-built swap call, ready for the client to sign.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterSwap {
    pub to_amount: String,
    pub tx: RouterTx,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterTx {
    pub from: String,
    pub to: String,
    pub data: String,
    pub value: String,
    #[serde(default)]
    pub gas: Option<u64>,
    #[serde(default)]
    pub gas_price: Option<String>,
}

/// DEX aggregation router.
#[async_trait]
pub trait SwapRouter: Send + Sync {
    /// Contract that must be approved to spend the source token.
    async fn spender(&self, chain_id: u64) -> Result<String, Fault>;

    async fn quote(
        &self,
        chain_id: u64,
        src: &str,
        dst: &str,
        amount: &str,
        fee_percent: &str,
    ) -> Result<RouterQuote, Fault>;

    async fn swap(&self, chain_id: u64, params: &RouterSwapParams) -> Result<RouterSwap, Fault>;
}

/// 1inch Swap API.
pub struct OneInchClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SpenderResponse {
    address: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteResponse {
    to_amount: String,
}

impl OneInchClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self, WalletError> {
        Url::parse(base_url).map_err(|e| {
            WalletError::configuration(format!("invalid swap API URL {}: {}", base_url, e))
        })?;
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn get<T: serde::de::DeserializeOwned>(
        &self,
        chain_id: u64,
        path: &str,
        params: &[(&str, &str)],
    ) -> Result<T, Fault> {
        let mut url = Url::parse(&format!("{}/{}{}", self.base_url, chain_id, path))
            .map_err(|e| Fault::permanent(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(params);

        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = ensure_success(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl SwapRouter for OneInchClient {
    async fn spender(&self, chain_id: u64) -> Result<String, Fault> {
        let body: SpenderResponse = self.get(chain_id, "/approve/spender", &[]).await?;
        Ok(body.address.to_lowercase())
    }

    async fn quote(
        &self,
        chain_id: u64,
        src: &str,
        dst: &str,
        amount: &str,
        fee_percent: &str,
    ) -> Result<RouterQuote, Fault> {
        let body: QuoteResponse = self
            .get(
                chain_id,
                "/quote",
                &[("src", src), ("dst", dst), ("amount", amount), ("fee", fee_percent)],
            )
            .await?;
        Ok(RouterQuote {
            to_amount: body.to_amount,
        })
    }

    async fn swap(&self, chain_id: u64, params: &RouterSwapParams) -> Result<RouterSwap, Fault> {
        let mut query = vec![
            ("src", params.src.as_str()),
            ("dst", params.dst.as_str()),
            ("amount", params.amount.as_str()),
            ("from", params.from.as_str()),
            ("slippage", params.slippage_percent.as_str()),
            ("fee", params.fee_percent.as_str()),
            ("disableEstimate", "true"),
        ];
        if let Some(referrer) = &params.referrer {
            query.push(("referrer", referrer.as_str()));
        }
        self.get(chain_id, "/swap", &query).await
    }
}
