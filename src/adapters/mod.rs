//! Chain-family adapters.
//!
//! Services talk to a [`ChainAdapter`] and never branch on chain names
//! themselves. EVM-only operations (nonce, gas, ERC20 reads) are reached through
//! [`ChainAdapter::as_evm`], which rejects UTXO chains with a validation error.

mod evm;
mod utxo;

use std::{collections::HashMap, sync::Arc};

use alloy::primitives::U256;
use log::info;

pub use evm::EvmAdapter;
pub use utxo::UtxoAdapter;

use crate::{
    cache::DecimalsCache,
    clients::{AlloyRpc, EsploraClient, EtherscanClient, TransferHistory},
    config::Settings,
    error::WalletError,
    models::{Chain, WalletTransaction},
    utils::{normalize_address, validate_btc_address, RetryPolicy},
};

pub enum ChainAdapter {
    Evm(EvmAdapter),
    Utxo(UtxoAdapter),
}

impl ChainAdapter {
    pub fn chain(&self) -> Chain {
        match self {
            ChainAdapter::Evm(a) => a.chain(),
            ChainAdapter::Utxo(a) => a.chain(),
        }
    }

    pub fn as_evm(&self) -> Result<&EvmAdapter, WalletError> {
        match self {
            ChainAdapter::Evm(a) => Ok(a),
            ChainAdapter::Utxo(a) => Err(WalletError::validation(
                "chain",
                format!("{} is not an EVM chain", a.chain()),
            )),
        }
    }

    pub fn as_utxo(&self) -> Result<&UtxoAdapter, WalletError> {
        match self {
            ChainAdapter::Utxo(a) => Ok(a),
            ChainAdapter::Evm(a) => Err(WalletError::validation(
                "chain",
                format!("{} is not a UTXO chain", a.chain()),
            )),
        }
    }

    /// Canonical form of an address on this chain.
    pub fn normalize_address(&self, address: &str) -> Result<String, WalletError> {
        match self {
            ChainAdapter::Evm(_) => normalize_address(address),
            ChainAdapter::Utxo(_) => validate_btc_address(address),
        }
    }

    /// Native coin balance in the chain's smallest unit (wei, satoshi).
    pub async fn native_balance(&self, address: &str) -> Result<U256, WalletError> {
        match self {
            ChainAdapter::Evm(a) => a.native_balance(address).await,
            ChainAdapter::Utxo(a) => a.balance(address).await.map(|s| U256::from(s.total())),
        }
    }

    pub async fn transactions(&self, address: &str) -> Result<Vec<WalletTransaction>, WalletError> {
        match self {
            ChainAdapter::Evm(a) => a.transactions(address).await,
            ChainAdapter::Utxo(a) => a.transactions(address).await,
        }
    }

    pub async fn transaction(
        &self,
        hash: &str,
        owner: Option<&str>,
    ) -> Result<Vec<WalletTransaction>, WalletError> {
        match self {
            ChainAdapter::Evm(a) => a.transaction(hash, owner).await,
            ChainAdapter::Utxo(a) => a.transaction(hash, owner).await.map(|tx| vec![tx]),
        }
    }

    /// Broadcast a client-signed transaction, returning its hash/txid.
    pub async fn send_raw_transaction(&self, raw: &str) -> Result<String, WalletError> {
        match self {
            ChainAdapter::Evm(a) => a.send_raw_transaction(raw).await,
            ChainAdapter::Utxo(a) => a.send_raw_transaction(raw).await,
        }
    }
}

/// The configured adapters, one per chain.
#[derive(Default)]
pub struct ChainRegistry {
    adapters: HashMap<Chain, ChainAdapter>,
}

impl ChainRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build adapters for every chain with endpoints in `settings`.
    pub fn from_settings(
        settings: &Settings,
        decimals: Arc<DecimalsCache>,
        retry: RetryPolicy,
    ) -> Result<Self, WalletError> {
        let mut registry = Self::new();

        for chain in Chain::ALL {
            if let Some(evm) = settings.chains.evm(chain) {
                let rpc = Arc::new(AlloyRpc::new(&evm.rpc_url)?);
                let history = evm
                    .explorer_url
                    .as_deref()
                    .map(|url| EtherscanClient::new(url, evm.explorer_api_key.clone()))
                    .transpose()?
                    .map(|c| Arc::new(c) as Arc<dyn TransferHistory>);

                let adapter = EvmAdapter::new(chain, rpc, history, decimals.clone(), retry)?
                    .with_default_tokens(evm.default_tokens.clone());
                registry.insert(ChainAdapter::Evm(adapter));
                info!("Configured {} (chain id {})", chain, chain.chain_id().unwrap_or_default());
            }
        }

        if let Some(btc) = &settings.chains.bitcoin {
            let rpc = Arc::new(EsploraClient::new(&btc.esplora_url)?);
            registry.insert(ChainAdapter::Utxo(UtxoAdapter::new(Chain::Bitcoin, rpc, retry)));
            info!("Configured {} via {}", Chain::Bitcoin, btc.esplora_url);
        }

        Ok(registry)
    }

    pub fn insert(&mut self, adapter: ChainAdapter) {
        self.adapters.insert(adapter.chain(), adapter);
    }

    pub fn get(&self, chain: Chain) -> Result<&ChainAdapter, WalletError> {
        self.adapters.get(&chain).ok_or_else(|| {
            WalletError::configuration(format!("chain {} is not configured", chain))
        })
    }

    pub fn evm(&self, chain: Chain) -> Result<&EvmAdapter, WalletError> {
        self.get(chain)?.as_evm()
    }

    pub fn utxo(&self, chain: Chain) -> Result<&UtxoAdapter, WalletError> {
        self.get(chain)?.as_utxo()
    }

    /// Configured chains in declaration order.
    pub fn chains(&self) -> Vec<Chain> {
        Chain::ALL
            .into_iter()
            .filter(|c| self.adapters.contains_key(c))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::{BitcoinSettings, EvmChainSettings},
        mocks::{fast_retry, MockUtxo},
    };

    #[test]
    fn test_unconfigured_chain_is_configuration_error() {
        let mut registry = ChainRegistry::new();
        registry.insert(ChainAdapter::Utxo(UtxoAdapter::new(
            Chain::Bitcoin,
            Arc::new(MockUtxo::default()),
            fast_retry(3),
        )));

        assert!(registry.get(Chain::Bitcoin).is_ok());
        assert_eq!(
            registry.get(Chain::Polygon).err().map(|e| e.code()),
            Some("CONFIGURATION_ERROR")
        );
        assert_eq!(
            registry.evm(Chain::Bitcoin).err().map(|e| e.code()),
            Some("VALIDATION_ERROR")
        );
    }

    #[test]
    fn test_from_settings_builds_configured_chains() {
        let mut settings = Settings::default();
        settings.chains.polygon = Some(EvmChainSettings {
            rpc_url: "https://polygon-rpc.com".to_string(),
            explorer_url: Some("https://api.polygonscan.com/api".to_string()),
            explorer_api_key: None,
            default_tokens: vec!["0x2791Bca1f2de4661ED88A30C99A7a9449Aa84174".to_string()],
        });
        settings.chains.bitcoin = Some(BitcoinSettings {
            esplora_url: "https://blockstream.info/api".to_string(),
        });

        let registry = ChainRegistry::from_settings(
            &settings,
            Arc::new(DecimalsCache::new(fast_retry(3))),
            fast_retry(3),
        )
        .unwrap();

        assert_eq!(registry.chains(), vec![Chain::Polygon, Chain::Bitcoin]);
        assert_eq!(
            registry.evm(Chain::Polygon).unwrap().default_tokens(),
            ["0x2791bca1f2de4661ed88a30c99a7a9449aa84174".to_string()]
        );
    }

    #[test]
    fn test_bad_rpc_url_is_configuration_error() {
        let mut settings = Settings::default();
        settings.chains.ethereum = Some(EvmChainSettings {
            rpc_url: "not a url".to_string(),
            explorer_url: None,
            explorer_api_key: None,
            default_tokens: Vec::new(),
        });
        let err = ChainRegistry::from_settings(
            &settings,
            Arc::new(DecimalsCache::new(fast_retry(3))),
            fast_retry(3),
        )
        .err()
        .unwrap();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }
}
