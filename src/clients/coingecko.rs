use std::collections::HashMap;

use async_trait::async_trait;
use chrono::NaiveDate;
use log::debug;
use serde::Deserialize;
use url::Url;

use super::{ensure_success, http_client};
use crate::{
    error::{Fault, WalletError},
    models::{Chain, MarketToken},
};

/// Market-data provider: token list, spot prices and daily history.
#[async_trait]
pub trait MarketData: Send + Sync {
    /// Full tradable-token list with USD prices and per-chain contracts.
    async fn token_markets(&self) -> Result<Vec<MarketToken>, Fault>;

    /// USD price of `coin_id` on `date` (UTC day).
    async fn historical_price(&self, coin_id: &str, date: NaiveDate) -> Result<f64, Fault>;

    /// Current USD prices for the given coin ids. Unknown ids are omitted.
    async fn current_prices(&self, coin_ids: &[String]) -> Result<HashMap<String, f64>, Fault>;
}

/// CoinGecko REST API (public or pro).
pub struct CoinGeckoClient {
    http: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    pages: u32,
}

const PAGE_SIZE: u32 = 250;

#[derive(Debug, Deserialize)]
struct CoinListEntry {
    id: String,
    #[serde(default)]
    platforms: HashMap<String, Option<String>>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    id: String,
    symbol: String,
    name: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    current_price: Option<f64>,
    #[serde(default)]
    market_cap: Option<f64>,
    #[serde(default)]
    price_change_percentage_24h: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    market_data: Option<HistoryMarketData>,
}

#[derive(Debug, Deserialize)]
struct HistoryMarketData {
    current_price: HashMap<String, f64>,
}

impl CoinGeckoClient {
    pub fn new(base_url: &str, api_key: Option<String>, pages: u32) -> Result<Self, WalletError> {
        Url::parse(base_url).map_err(|e| {
            WalletError::configuration(format!("invalid market API URL {}: {}", base_url, e))
        })?;
        Ok(Self {
            http: http_client()?,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            pages: pages.max(1),
        })
    }

    fn url(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, Fault> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, path))
            .map_err(|e| Fault::permanent(e.to_string()))?;
        url.query_pairs_mut().extend_pairs(params);
        Ok(url)
    }

    async fn get<T: serde::de::DeserializeOwned>(&self, url: Url) -> Result<T, Fault> {
        let mut request = self.http.get(url);
        if let Some(key) = &self.api_key {
            // Pro keys and demo keys use different headers; sending both is accepted
            request = request
                .header("x-cg-pro-api-key", key)
                .header("x-cg-demo-api-key", key);
        }
        let response = ensure_success(request.send().await?).await?;
        Ok(response.json().await?)
    }
}

/// Attach contract addresses of supported chains to market entries.
fn join_markets(
    markets: Vec<MarketEntry>,
    platforms: HashMap<String, HashMap<String, Option<String>>>,
) -> Vec<MarketToken> {
    markets
        .into_iter()
        .map(|m| {
            let addresses = platforms
                .get(&m.id)
                .map(|p| {
                    p.iter()
                        .filter_map(|(platform, address)| {
                            let chain = Chain::from_market_platform(platform)?;
                            let address = address.as_deref()?.trim();
                            (!address.is_empty()).then(|| (chain, address.to_lowercase()))
                        })
                        .collect()
                })
                .unwrap_or_default();

            MarketToken {
                id: m.id,
                symbol: m.symbol.to_uppercase(),
                name: m.name,
                image: m.image,
                price_usd: m.current_price,
                market_cap_usd: m.market_cap,
                price_change_24h: m.price_change_percentage_24h,
                addresses,
            }
        })
        .collect()
}

#[async_trait]
impl MarketData for CoinGeckoClient {
    async fn token_markets(&self) -> Result<Vec<MarketToken>, Fault> {
        let list_url = self.url("/coins/list", &[("include_platform", "true")])?;
        let coins: Vec<CoinListEntry> = self.get(list_url).await?;
        let platforms: HashMap<String, HashMap<String, Option<String>>> =
            coins.into_iter().map(|c| (c.id, c.platforms)).collect();

        let per_page = PAGE_SIZE.to_string();
        let mut markets: Vec<MarketEntry> = Vec::new();
        for page in 1..=self.pages {
            let page = page.to_string();
            let url = self.url(
                "/coins/markets",
                &[
                    ("vs_currency", "usd"),
                    ("order", "market_cap_desc"),
                    ("per_page", &per_page),
                    ("page", &page),
                ],
            )?;
            let batch: Vec<MarketEntry> = self.get(url).await?;
            let last = (batch.len() as u32) < PAGE_SIZE;
            markets.extend(batch);
            if last {
                break;
            }
        }

        debug!(
            "Fetched {} market entries ({} coins listed)",
            markets.len(),
            platforms.len()
        );
        Ok(join_markets(markets, platforms))
    }

    async fn historical_price(&self, coin_id: &str, date: NaiveDate) -> Result<f64, Fault> {
        let date_param = date.format("%d-%m-%Y").to_string();
        let url = self.url(
            &format!("/coins/{}/history", coin_id),
            &[("date", &date_param), ("localization", "false")],
        )?;
        let body: HistoryResponse = self.get(url).await?;

        body.market_data
            .and_then(|m| m.current_price.get("usd").copied())
            .ok_or_else(|| {
                Fault::permanent(format!("no USD price for {} on {}", coin_id, date))
            })
    }

    async fn current_prices(&self, coin_ids: &[String]) -> Result<HashMap<String, f64>, Fault> {
        let ids = coin_ids.join(",");
        let url = self.url("/simple/price", &[("ids", &ids), ("vs_currencies", "usd")])?;
        let body: HashMap<String, HashMap<String, f64>> = self.get(url).await?;

        Ok(body
            .into_iter()
            .filter_map(|(id, prices)| prices.get("usd").map(|p| (id, *p)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_markets_keeps_supported_platforms() {
        let markets = vec![MarketEntry {
            id: "tether".to_string(),
            symbol: "usdt".to_string(),
            name: "Tether".to_string(),
            image: None,
            current_price: Some(1.0),
            market_cap: None,
            price_change_percentage_24h: None,
        }];
        let mut platforms = HashMap::new();
        platforms.insert(
            "tether".to_string(),
            HashMap::from([
                (
                    "ethereum".to_string(),
                    Some("0xDAC17F958D2ee523a2206206994597C13D831ec7".to_string()),
                ),
                ("tron".to_string(), Some("TR7NHq".to_string())),
                ("polygon-pos".to_string(), Some("".to_string())),
            ]),
        );

        let tokens = join_markets(markets, platforms);
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].symbol, "USDT");
        assert_eq!(
            tokens[0].address_on(Chain::Ethereum),
            Some("0xdac17f958d2ee523a2206206994597c13d831ec7")
        );
        assert_eq!(tokens[0].address_on(Chain::Polygon), None);
        assert_eq!(tokens[0].addresses.len(), 1);
    }
}
