use std::collections::HashMap;

use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

use crate::models::Chain;

/// HTTP listener configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

/// Endpoints for one EVM network.
///
/// `explorer_url` points at an Etherscan-compatible API and is only needed
/// for transaction history. `default_tokens` are contracts every wallet view
/// checks for a balance in addition to the user's own custom tokens.
#[derive(Debug, Deserialize, Clone)]
pub struct EvmChainSettings {
    pub rpc_url: String,
    #[serde(default)]
    pub explorer_url: Option<String>,
    #[serde(default)]
    pub explorer_api_key: Option<String>,
    #[serde(default)]
    pub default_tokens: Vec<String>,
}

/// Esplora-compatible indexer (Blockstream, mempool.space).
#[derive(Debug, Deserialize, Clone)]
pub struct BitcoinSettings {
    pub esplora_url: String,
}

/// Networks enabled in this deployment. A missing entry disables the chain.
#[derive(Debug, Deserialize, Clone, Default)]
pub struct ChainSettings {
    #[serde(default)]
    pub ethereum: Option<EvmChainSettings>,
    #[serde(default)]
    pub bsc: Option<EvmChainSettings>,
    #[serde(default)]
    pub polygon: Option<EvmChainSettings>,
    #[serde(default)]
    pub bitcoin: Option<BitcoinSettings>,
}

impl ChainSettings {
    pub fn evm(&self, chain: Chain) -> Option<&EvmChainSettings> {
        match chain {
            Chain::Ethereum => self.ethereum.as_ref(),
            Chain::Bsc => self.bsc.as_ref(),
            Chain::Polygon => self.polygon.as_ref(),
            Chain::Bitcoin => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ethereum.is_none()
            && self.bsc.is_none()
            && self.polygon.is_none()
            && self.bitcoin.is_none()
    }
}

/// Market-data provider (CoinGecko API).
#[derive(Debug, Deserialize, Clone)]
pub struct MarketSettings {
    #[serde(default = "default_market_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Number of 250-entry market pages pulled per refresh
    #[serde(default = "default_market_pages")]
    pub pages: u32,
    #[serde(default = "default_refresh_interval")]
    pub refresh_interval_secs: u64,
    /// Overrides for the provider's native-coin identifiers, keyed by chain name
    #[serde(default)]
    pub coin_ids: HashMap<String, String>,
}

impl Default for MarketSettings {
    fn default() -> Self {
        Self {
            api_url: default_market_api_url(),
            api_key: None,
            pages: default_market_pages(),
            refresh_interval_secs: default_refresh_interval(),
            coin_ids: HashMap::new(),
        }
    }
}

impl MarketSettings {
    /// Native-coin identifier for every chain, configured overrides first.
    pub fn resolved_coin_ids(&self) -> HashMap<Chain, String> {
        let mut ids: HashMap<Chain, String> = Chain::ALL
            .into_iter()
            .map(|c| (c, c.default_coin_id().to_string()))
            .collect();
        for (name, id) in &self.coin_ids {
            if let Ok(chain) = name.parse::<Chain>() {
                ids.insert(chain, id.clone());
            }
        }
        ids
    }
}

fn default_market_api_url() -> String {
    "https://api.coingecko.com/api/v3".to_string()
}

fn default_market_pages() -> u32 {
    4
}

fn default_refresh_interval() -> u64 {
    600 // 10 minutes
}

/// Swap router (1inch-compatible API) and referrer fee.
#[derive(Debug, Deserialize, Clone)]
pub struct SwapSettings {
    #[serde(default = "default_swap_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub referrer_address: Option<String>,
    #[serde(default = "default_referrer_fee_bps")]
    pub referrer_fee_bps: u32,
    #[serde(default = "default_slippage")]
    pub slippage_percent: f64,
    /// Swap-eligible contracts per chain name or id. Empty or missing means unrestricted.
    #[serde(default)]
    pub allowed_tokens: HashMap<String, Vec<String>>,
}

impl Default for SwapSettings {
    fn default() -> Self {
        Self {
            api_url: default_swap_api_url(),
            api_key: None,
            referrer_address: None,
            referrer_fee_bps: default_referrer_fee_bps(),
            slippage_percent: default_slippage(),
            allowed_tokens: HashMap::new(),
        }
    }
}

impl SwapSettings {
    /// Allow-lists keyed by chain, with name and id aliases merged and
    /// addresses lowercased.
    pub fn resolved_allowed_tokens(&self) -> HashMap<Chain, Vec<String>> {
        let mut resolved: HashMap<Chain, Vec<String>> = HashMap::new();
        for (name, addresses) in &self.allowed_tokens {
            if let Ok(chain) = name.parse::<Chain>() {
                let list = resolved.entry(chain).or_default();
                for address in addresses {
                    let address = address.trim().to_lowercase();
                    if !list.contains(&address) {
                        list.push(address);
                    }
                }
            }
        }
        resolved
    }
}

fn default_swap_api_url() -> String {
    "https://api.1inch.dev/swap/v5.2".to_string()
}

fn default_referrer_fee_bps() -> u32 {
    30
}

fn default_slippage() -> f64 {
    1.0
}

/// Maximum referrer fee the router accepts (3%).
pub const MAX_REFERRER_FEE_BPS: u32 = 300;

/// Retry policy applied to every outbound call.
#[derive(Debug, Deserialize, Clone)]
pub struct RetrySettings {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_call_timeout_secs")]
    pub call_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            call_timeout_secs: default_call_timeout_secs(),
        }
    }
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    2_000
}

fn default_call_timeout_secs() -> u64 {
    30
}

/// PostgreSQL connection for the user store.
#[derive(Debug, Deserialize, Clone)]
pub struct PostgresSettings {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: usize,
}

fn default_pool_size() -> usize {
    16
}

/// Root application configuration.
///
/// Loaded from `config.yaml` at startup, with `HOARD__SECTION__KEY`
/// environment variables taking precedence.
#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub chains: ChainSettings,
    #[serde(default)]
    pub market: MarketSettings,
    #[serde(default)]
    pub swap: SwapSettings,
    #[serde(default)]
    pub retry: RetrySettings,
    /// Without a database, user state lives in memory for the process lifetime
    #[serde(default)]
    pub postgres: Option<PostgresSettings>,
    /// Session token to user id, seeding the in-memory store (development only)
    #[serde(default)]
    pub sessions: HashMap<String, String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            chains: ChainSettings::default(),
            market: MarketSettings::default(),
            swap: SwapSettings::default(),
            retry: RetrySettings::default(),
            postgres: None,
            sessions: HashMap::new(),
            log_level: default_log_level(),
        }
    }
}

impl Settings {
    pub fn new() -> Result<Self, ConfigError> {
        let s = Config::builder()
            .add_source(File::with_name("config"))
            .add_source(Environment::with_prefix("HOARD").separator("__"))
            .build()?;

        let settings: Settings = s.try_deserialize()?;
        settings.validate()?;

        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.chains.is_empty() {
            return Err(ConfigError::Message(
                "at least one chain must be configured under `chains`".to_string(),
            ));
        }
        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Message(
                "retry.max_attempts must be at least 1".to_string(),
            ));
        }
        if self.swap.referrer_fee_bps > MAX_REFERRER_FEE_BPS {
            return Err(ConfigError::Message(format!(
                "swap.referrer_fee_bps must not exceed {}",
                MAX_REFERRER_FEE_BPS
            )));
        }
        for name in self
            .swap
            .allowed_tokens
            .keys()
            .chain(self.market.coin_ids.keys())
        {
            if name.parse::<Chain>().is_err() {
                return Err(ConfigError::Message(format!("unknown chain '{}'", name)));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> Settings {
        Settings {
            chains: ChainSettings {
                bitcoin: Some(BitcoinSettings {
                    esplora_url: "https://blockstream.info/api".to_string(),
                }),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_minimal_settings_validate() {
        assert!(minimal().validate().is_ok());
    }

    #[test]
    fn test_rejects_excessive_referrer_fee() {
        let mut settings = minimal();
        settings.swap.referrer_fee_bps = 301;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_unknown_chain_keys() {
        let mut settings = minimal();
        settings
            .swap
            .allowed_tokens
            .insert("solana".to_string(), vec![]);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_allowed_tokens_resolve_aliases() {
        let mut settings = minimal();
        settings.swap.allowed_tokens.insert(
            "eth".to_string(),
            vec![" 0x6B175474E89094C44DA98B954EEDEAC495271D0F ".to_string()],
        );
        settings.swap.allowed_tokens.insert(
            "1".to_string(),
            vec!["0x6b175474e89094c44da98b954eedeac495271d0f".to_string()],
        );
        settings
            .swap
            .allowed_tokens
            .insert("matic".to_string(), vec![]);
        assert!(settings.validate().is_ok());

        let allowed = settings.swap.resolved_allowed_tokens();
        assert_eq!(
            allowed[&Chain::Ethereum],
            vec!["0x6b175474e89094c44da98b954eedeac495271d0f".to_string()]
        );
        assert!(allowed[&Chain::Polygon].is_empty());
        assert!(!allowed.contains_key(&Chain::Bsc));
    }

    #[test]
    fn test_coin_id_overrides() {
        let mut settings = minimal();
        settings
            .market
            .coin_ids
            .insert("polygon".to_string(), "polygon-ecosystem-token".to_string());
        let ids = settings.market.resolved_coin_ids();
        assert_eq!(ids[&Chain::Polygon], "polygon-ecosystem-token");
        assert_eq!(ids[&Chain::Ethereum], "ethereum");
    }
}
