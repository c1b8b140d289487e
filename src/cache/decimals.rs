use moka::future::Cache;

use crate::{
    clients::EvmRpc,
    error::WalletError,
    models::{is_native_token, NATIVE_TOKEN_DECIMALS},
    utils::{parse_evm_address, RetryPolicy},
};

/// ERC20 decimals per (chain id, lowercase contract address).
///
/// Entries are never evicted or overwritten: decimals cannot change for a
/// deployed contract. Concurrent misses for the same key share one fetch.
pub struct DecimalsCache {
    entries: Cache<(u64, String), u8>,
    retry: RetryPolicy,
}

impl DecimalsCache {
    pub fn new(retry: RetryPolicy) -> Self {
        Self {
            entries: Cache::builder().build(),
            retry,
        }
    }

    pub async fn get_decimals(
        &self,
        chain_id: u64,
        contract_address: &str,
        rpc: &dyn EvmRpc,
    ) -> Result<u8, WalletError> {
        if is_native_token(contract_address.trim()) {
            return Ok(NATIVE_TOKEN_DECIMALS);
        }

        let token = parse_evm_address("contract_address", contract_address)?;
        let key = (chain_id, contract_address.trim().to_ascii_lowercase());

        self.entries
            .try_get_with(key, async {
                self.retry
                    .run("erc20.decimals", || rpc.decimals(token))
                    .await
                    .map_err(|e| e.context(format!("chain {} token {}", chain_id, token)))
            })
            .await
            .map_err(|e| (*e).clone())
    }

    /// Number of memoized entries.
    pub async fn len(&self) -> u64 {
        self.entries.run_pending_tasks().await;
        self.entries.entry_count()
    }
}
