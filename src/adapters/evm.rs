use std::sync::Arc;

use alloy::primitives::{Address, U256};
use chrono::{DateTime, Utc};
use log::debug;

use crate::{
    cache::DecimalsCache,
    clients::{EvmRpc, EvmTransfer, TransferHistory},
    error::WalletError,
    models::{
        is_native_token, Chain, Direction, EvmCall, TxStatus, WalletTransaction,
        NATIVE_TOKEN_DECIMALS,
    },
    utils::{
        format_units, hex_encode, parse_amount, parse_calldata, parse_evm_address,
        parse_raw_evm_transaction, parse_tx_hash, RetryPolicy,
    },
};

/// Account-model chain (Ethereum, BSC, Polygon).
///
/// Every outbound call goes through the retry policy; upstream errors are
/// tagged with the chain they came from.
pub struct EvmAdapter {
    chain: Chain,
    chain_id: u64,
    rpc: Arc<dyn EvmRpc>,
    history: Option<Arc<dyn TransferHistory>>,
    decimals: Arc<DecimalsCache>,
    retry: RetryPolicy,
    default_tokens: Vec<String>,
}

impl EvmAdapter {
    pub fn new(
        chain: Chain,
        rpc: Arc<dyn EvmRpc>,
        history: Option<Arc<dyn TransferHistory>>,
        decimals: Arc<DecimalsCache>,
        retry: RetryPolicy,
    ) -> Result<Self, WalletError> {
        let chain_id = chain
            .chain_id()
            .ok_or_else(|| WalletError::configuration(format!("{} is not an EVM chain", chain)))?;
        Ok(Self {
            chain,
            chain_id,
            rpc,
            history,
            decimals,
            retry,
            default_tokens: Vec::new(),
        })
    }

    /// Tokens shown in every wallet view on this chain, lowercase.
    pub fn with_default_tokens(mut self, tokens: Vec<String>) -> Self {
        self.default_tokens = tokens.into_iter().map(|t| t.trim().to_lowercase()).collect();
        self
    }

    pub fn chain(&self) -> Chain {
        self.chain
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    pub fn default_tokens(&self) -> &[String] {
        &self.default_tokens
    }

    pub async fn native_balance(&self, owner: &str) -> Result<U256, WalletError> {
        let owner = parse_evm_address("address", owner)?;
        self.retry
            .run("eth_getBalance", || self.rpc.native_balance(owner))
            .await
            .map_err(|e| e.context(format!("{} {}", self.chain, owner)))
    }

    /// Balance of `token` held by `owner`; the native sentinel reads the coin balance.
    pub async fn token_balance(&self, token: &str, owner: &str) -> Result<U256, WalletError> {
        if is_native_token(token) {
            return self.native_balance(owner).await;
        }
        let token = parse_evm_address("token", token)?;
        let owner = parse_evm_address("address", owner)?;
        self.retry
            .run("erc20.balanceOf", || self.rpc.token_balance(token, owner))
            .await
            .map_err(|e| e.context(format!("{} token {}", self.chain, token)))
    }

    pub async fn decimals(&self, token: &str) -> Result<u8, WalletError> {
        self.decimals
            .get_decimals(self.chain_id, token, self.rpc.as_ref())
            .await
    }

    pub async fn symbol(&self, token: &str) -> Result<String, WalletError> {
        if is_native_token(token) {
            return Ok(self.chain.native_symbol().to_string());
        }
        let token = parse_evm_address("token", token)?;
        self.retry
            .run("erc20.symbol", || self.rpc.symbol(token))
            .await
            .map_err(|e| e.context(format!("{} token {}", self.chain, token)))
    }

    pub async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, WalletError> {
        self.retry
            .run("erc20.allowance", || self.rpc.allowance(token, owner, spender))
            .await
            .map_err(|e| e.context(format!("{} token {}", self.chain, token)))
    }

    /// Wei per gas.
    pub async fn gas_price(&self) -> Result<U256, WalletError> {
        self.retry
            .run("eth_gasPrice", || self.rpc.gas_price())
            .await
            .map(U256::from)
            .map_err(|e| e.context(self.chain))
    }

    pub async fn nonce(&self, owner: &str) -> Result<u64, WalletError> {
        let owner = parse_evm_address("address", owner)?;
        self.retry
            .run("eth_getTransactionCount", || self.rpc.nonce(owner))
            .await
            .map_err(|e| e.context(format!("{} {}", self.chain, owner)))
    }

    pub async fn estimate_gas(&self, call: &EvmCall) -> Result<u64, WalletError> {
        let from = parse_evm_address("from", &call.from)?;
        let to = parse_evm_address("to", &call.to)?;
        let value = match call.value.as_deref() {
            Some(v) if !v.trim().is_empty() => parse_amount("value", v)?,
            _ => U256::ZERO,
        };
        let data = parse_calldata(call.data.as_deref())?;

        self.retry
            .run("eth_estimateGas", || {
                self.rpc.estimate_gas(from, to, value, data.clone())
            })
            .await
            .map_err(|e| e.context(format!("{} {} -> {}", self.chain, from, to)))
    }

    /// Broadcast a client-signed transaction, returning its hash.
    pub async fn send_raw_transaction(&self, raw: &str) -> Result<String, WalletError> {
        let raw = parse_raw_evm_transaction(raw)?;
        let hash = self
            .retry
            .run("eth_sendRawTransaction", || self.rpc.send_raw_transaction(&raw))
            .await
            .map_err(|e| e.context(self.chain))?;
        Ok(hex_encode(hash.as_slice()))
    }

    /// Native and token transfers involving `owner`, newest first.
    pub async fn transactions(&self, owner: &str) -> Result<Vec<WalletTransaction>, WalletError> {
        let owner = parse_evm_address("address", owner)?;
        let history = self.history.as_ref().ok_or_else(|| {
            WalletError::configuration(format!("no block explorer configured for {}", self.chain))
        })?;

        let owner_hex = hex_encode(owner.as_slice());
        let transfers = self
            .retry
            .run("explorer.transfers", || history.transfers(&owner_hex))
            .await
            .map_err(|e| e.context(format!("{} {}", self.chain, owner)))?;

        debug!("{} history for {}: {} transfers", self.chain, owner_hex, transfers.len());

        let mut out = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            out.push(self.to_wallet_transaction(&owner_hex, transfer).await?);
        }
        Ok(out)
    }

    /// One transaction and the token transfers it emitted.
    ///
    /// Directions are relative to `owner`, or to the sender when no owner is given.
    pub async fn transaction(
        &self,
        hash: &str,
        owner: Option<&str>,
    ) -> Result<Vec<WalletTransaction>, WalletError> {
        let hash = parse_tx_hash(hash)?;
        let owner = owner
            .map(|o| parse_evm_address("address", o).map(|a| hex_encode(a.as_slice())))
            .transpose()?;

        let transfers = self
            .retry
            .run("eth_getTransactionByHash", || self.rpc.transaction(hash))
            .await
            .map_err(|e| e.context(self.chain))?
            .ok_or_else(|| {
                WalletError::NotFound(format!("transaction {} on {}", hash, self.chain))
            })?;

        let owner = match owner {
            Some(owner) => owner,
            None => transfers.first().map(|t| t.from.clone()).unwrap_or_default(),
        };

        let mut out = Vec::with_capacity(transfers.len());
        for transfer in transfers {
            out.push(self.to_wallet_transaction(&owner, transfer).await?);
        }

        // A token transfer's native leg is a zero-value contract call
        if out.len() > 1 && out[0].token.is_none() && out[0].amount == "0" {
            out.remove(0);
        }
        Ok(out)
    }

    async fn to_wallet_transaction(
        &self,
        owner: &str,
        transfer: EvmTransfer,
    ) -> Result<WalletTransaction, WalletError> {
        let (symbol, decimals) = match &transfer.token {
            None => (self.chain.native_symbol().to_string(), NATIVE_TOKEN_DECIMALS),
            Some(token) => {
                let decimals = match transfer.token_decimals {
                    Some(d) => d,
                    None => self.decimals(token).await?,
                };
                let symbol = match transfer.token_symbol.clone() {
                    Some(s) => s,
                    None => self.symbol(token).await.unwrap_or_else(|e| {
                        debug!("No symbol for {} on {}: {}", token, self.chain, e);
                        "ERC20".to_string()
                    }),
                };
                (symbol, decimals)
            },
        };

        let direction = Direction::of(owner, &transfer.from, transfer.to.as_deref());
        let counterparty = match direction {
            Direction::Incoming => Some(transfer.from.clone()),
            Direction::Outgoing => transfer.to.clone(),
            Direction::SelfTransfer => None,
        };

        let timestamp = if transfer.status == TxStatus::Pending || transfer.timestamp == 0 {
            Utc::now()
        } else {
            DateTime::from_timestamp(transfer.timestamp, 0).unwrap_or_else(Utc::now)
        };

        Ok(WalletTransaction {
            chain: self.chain,
            hash: transfer.hash,
            direction,
            from: transfer.from,
            to: transfer.to,
            counterparty,
            amount: transfer.value.to_string(),
            formatted_amount: format_units(transfer.value, decimals),
            symbol,
            decimals,
            token: transfer.token,
            fee: transfer.fee.map(|f| f.to_string()),
            timestamp,
            status: transfer.status,
            block_number: transfer.block_number,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use alloy::primitives::{address, b256};

    use super::*;
    use crate::{
        error::Fault,
        mocks::{fast_retry, MockEvmRpc, MockHistory},
    };

    const OWNER: &str = "0x1111111111111111111111111111111111111111";
    const OTHER: &str = "0x2222222222222222222222222222222222222222";
    const USDC: &str = "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48";

    fn transfer(hash: &str, from: &str, to: &str, value: u64, token: Option<&str>) -> EvmTransfer {
        EvmTransfer {
            hash: hash.to_string(),
            from: from.to_string(),
            to: Some(to.to_string()),
            value: U256::from(value),
            token: token.map(str::to_string),
            token_symbol: None,
            token_decimals: None,
            fee: Some(U256::from(21_000u64)),
            timestamp: 1_672_574_400,
            block_number: Some(16_000_000),
            status: TxStatus::Confirmed,
        }
    }

    fn adapter(rpc: Arc<MockEvmRpc>, history: Option<Arc<MockHistory>>) -> EvmAdapter {
        EvmAdapter::new(
            Chain::Ethereum,
            rpc,
            history.map(|h| h as Arc<dyn TransferHistory>),
            Arc::new(DecimalsCache::new(fast_retry(3))),
            fast_retry(3),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_native_balance() {
        let rpc = Arc::new(
            MockEvmRpc::default().with_native(address!("1111111111111111111111111111111111111111"), 5),
        );
        let adapter = adapter(rpc, None);
        assert_eq!(adapter.native_balance(OWNER).await.unwrap(), U256::from(5u64));
    }

    #[tokio::test]
    async fn test_invalid_address_makes_no_call() {
        let rpc = Arc::new(MockEvmRpc::default());
        let adapter = adapter(rpc.clone(), None);

        let err = adapter.native_balance("0xnothex").await.unwrap_err();
        assert!(matches!(err, WalletError::Validation { .. }));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_revert_is_not_retried() {
        let rpc = Arc::new(MockEvmRpc::default());
        rpc.fail_with(Fault::permanent("execution reverted"));
        let adapter = adapter(rpc.clone(), None);

        let call = EvmCall {
            from: OWNER.to_string(),
            to: OTHER.to_string(),
            value: Some("1000".to_string()),
            data: Some("0xa9059cbb".to_string()),
        };
        let err = adapter.estimate_gas(&call).await.unwrap_err();
        assert_eq!(err.code(), "UPSTREAM_REJECTED");
        assert!(err.to_string().contains("ethereum"));
        assert_eq!(rpc.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_resolves_token_decimals() {
        let usdc = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        let rpc = Arc::new(MockEvmRpc::default().with_token(
            usdc,
            address!("1111111111111111111111111111111111111111"),
            0,
            6,
            "USDC",
        ));
        let history = Arc::new(MockHistory::default().with_transfers(vec![
            transfer("0xaa", OTHER, OWNER, 2_500_000, Some(USDC)),
            transfer("0xbb", OWNER, OTHER, 1_000_000_000_000_000_000, None),
        ]));
        let adapter = adapter(rpc.clone(), Some(history));

        let txs = adapter.transactions(OWNER).await.unwrap();
        assert_eq!(txs.len(), 2);

        assert_eq!(txs[0].direction, Direction::Incoming);
        assert_eq!(txs[0].symbol, "USDC");
        assert_eq!(txs[0].formatted_amount, "2.5");
        assert_eq!(txs[0].counterparty.as_deref(), Some(OTHER));

        assert_eq!(txs[1].direction, Direction::Outgoing);
        assert_eq!(txs[1].symbol, "ETH");
        assert_eq!(txs[1].formatted_amount, "1");
        assert_eq!(rpc.decimals_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_needs_explorer() {
        let adapter = adapter(Arc::new(MockEvmRpc::default()), None);
        let err = adapter.transactions(OWNER).await.unwrap_err();
        assert_eq!(err.code(), "CONFIGURATION_ERROR");
    }

    #[tokio::test]
    async fn test_transaction_detail_prefers_token_legs() {
        let hash = b256!("00000000000000000000000000000000000000000000000000000000000000aa");
        let hash_str = hex_encode(hash.as_slice());
        let usdc = address!("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48");
        let rpc = Arc::new(
            MockEvmRpc::default()
                .with_decimals(usdc, 6)
                .with_transaction(
                    hash,
                    vec![
                        transfer(&hash_str, OWNER, USDC, 0, None),
                        transfer(&hash_str, OWNER, OTHER, 3_000_000, Some(USDC)),
                    ],
                ),
        );
        let adapter = adapter(rpc, None);

        let legs = adapter.transaction(&hash_str, None).await.unwrap();
        assert_eq!(legs.len(), 1);
        assert_eq!(legs[0].direction, Direction::Outgoing);
        assert_eq!(legs[0].formatted_amount, "3");
        // No on-chain symbol for the token in the mock
        assert_eq!(legs[0].symbol, "ERC20");
    }

    #[tokio::test]
    async fn test_unknown_transaction_is_not_found() {
        let adapter = adapter(Arc::new(MockEvmRpc::default()), None);
        let err = adapter
            .transaction(&format!("0x{}", "ab".repeat(32)), Some(OWNER))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }
}
