use alloy::{
    consensus::Transaction as _,
    eips::BlockNumberOrTag,
    network::{ReceiptResponse, TransactionResponse},
    primitives::{Address, Bytes, B256, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::{
        json_rpc::RpcError,
        types::{TransactionInput, TransactionRequest},
    },
    transports::{TransportError, TransportErrorKind},
};
use async_trait::async_trait;
use url::Url;

use crate::{
    abis::IERC20,
    error::{Fault, WalletError},
    models::TxStatus,
    utils::hex_encode,
};

/// A value movement as reported by an EVM node or block explorer.
///
/// `token` is the ERC20 contract for token transfers, `None` for the native
/// coin. Token symbol/decimals are filled in when the source knows them.
#[derive(Debug, Clone, PartialEq)]
pub struct EvmTransfer {
    pub hash: String,
    pub from: String,
    pub to: Option<String>,
    pub value: U256,
    pub token: Option<String>,
    pub token_symbol: Option<String>,
    pub token_decimals: Option<u8>,
    pub fee: Option<U256>,
    /// Unix seconds; 0 while pending
    pub timestamp: i64,
    pub block_number: Option<u64>,
    pub status: TxStatus,
}

/// Read/write access to one EVM network.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    async fn native_balance(&self, owner: Address) -> Result<U256, Fault>;

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, Fault>;

    /// ERC20 `decimals()`
    async fn decimals(&self, token: Address) -> Result<u8, Fault>;

    /// ERC20 `symbol()`
    async fn symbol(&self, token: Address) -> Result<String, Fault>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address)
        -> Result<U256, Fault>;

    /// Wei per gas
    async fn gas_price(&self) -> Result<u128, Fault>;

    /// Next nonce, counting pending transactions
    async fn nonce(&self, owner: Address) -> Result<u64, Fault>;

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<u64, Fault>;

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, Fault>;

    /// Transaction detail with receipt status. Token transfers are taken
    /// from the receipt's ERC20 `Transfer` logs.
    async fn transaction(&self, hash: B256) -> Result<Option<Vec<EvmTransfer>>, Fault>;
}

/// [`EvmRpc`] over an alloy HTTP provider.
#[derive(Clone)]
pub struct AlloyRpc {
    provider: DynProvider,
}

impl AlloyRpc {
    pub fn new(rpc_url: &str) -> Result<Self, WalletError> {
        let url = Url::parse(rpc_url)
            .map_err(|e| WalletError::configuration(format!("invalid RPC URL {}: {}", rpc_url, e)))?;

        let client = ProviderBuilder::new().connect_http(url);

        Ok(Self {
            provider: DynProvider::new(client),
        })
    }
}

/// JSON-RPC error codes providers use for throttling.
const RATE_LIMIT_CODES: [i64; 3] = [429, -32005, -32090];

/// Classify a transport-level error.
///
/// Connection problems, throttling and 5xx are transient. JSON-RPC error
/// responses (reverts, nonce too low, invalid params) are permanent.
pub(crate) fn rpc_fault(err: TransportError) -> Fault {
    match &err {
        RpcError::Transport(TransportErrorKind::HttpError(http)) => {
            if http.status == 429 || http.status >= 500 {
                Fault::transient(err.to_string())
            } else {
                Fault::permanent(err.to_string())
            }
        },
        RpcError::Transport(_) => Fault::transient(err.to_string()),
        RpcError::ErrorResp(payload) => {
            let message = payload.message.to_ascii_lowercase();
            if RATE_LIMIT_CODES.contains(&payload.code)
                || message.contains("rate limit")
                || message.contains("too many requests")
            {
                Fault::transient(err.to_string())
            } else {
                Fault::permanent(err.to_string())
            }
        },
        RpcError::NullResp => Fault::transient(err.to_string()),
        _ => Fault::permanent(err.to_string()),
    }
}

/// Contract calls fail either in transport (classified like RPC errors) or in
/// ABI decoding / empty return data, which means "not an ERC20".
pub(crate) fn contract_fault(err: alloy::contract::Error) -> Fault {
    match err {
        alloy::contract::Error::TransportError(e) => rpc_fault(e),
        other => Fault::permanent(other.to_string()),
    }
}

fn address_string(address: Address) -> String {
    hex_encode(address.as_slice())
}

#[async_trait]
impl EvmRpc for AlloyRpc {
    async fn native_balance(&self, owner: Address) -> Result<U256, Fault> {
        self.provider.get_balance(owner).await.map_err(rpc_fault)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, Fault> {
        IERC20::new(token, &self.provider)
            .balanceOf(owner)
            .call()
            .await
            .map_err(contract_fault)
    }

    async fn decimals(&self, token: Address) -> Result<u8, Fault> {
        IERC20::new(token, &self.provider)
            .decimals()
            .call()
            .await
            .map_err(contract_fault)
    }

    async fn symbol(&self, token: Address) -> Result<String, Fault> {
        IERC20::new(token, &self.provider)
            .symbol()
            .call()
            .await
            .map_err(contract_fault)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, Fault> {
        IERC20::new(token, &self.provider)
            .allowance(owner, spender)
            .call()
            .await
            .map_err(contract_fault)
    }

    async fn gas_price(&self) -> Result<u128, Fault> {
        self.provider.get_gas_price().await.map_err(rpc_fault)
    }

    async fn nonce(&self, owner: Address) -> Result<u64, Fault> {
        self.provider
            .get_transaction_count(owner)
            .pending()
            .await
            .map_err(rpc_fault)
    }

    async fn estimate_gas(
        &self,
        from: Address,
        to: Address,
        value: U256,
        data: Bytes,
    ) -> Result<u64, Fault> {
        let request = TransactionRequest::default()
            .from(from)
            .to(to)
            .value(value)
            .input(TransactionInput::new(data));

        self.provider.estimate_gas(request).await.map_err(rpc_fault)
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, Fault> {
        let pending = self
            .provider
            .send_raw_transaction(raw)
            .await
            .map_err(rpc_fault)?;
        Ok(*pending.tx_hash())
    }

    async fn transaction(&self, hash: B256) -> Result<Option<Vec<EvmTransfer>>, Fault> {
        let Some(tx) = self
            .provider
            .get_transaction_by_hash(hash)
            .await
            .map_err(rpc_fault)?
        else {
            return Ok(None);
        };

        let receipt = self
            .provider
            .get_transaction_receipt(hash)
            .await
            .map_err(rpc_fault)?;

        let block_number = tx.block_number();
        let timestamp = match block_number {
            Some(number) => self
                .provider
                .get_block_by_number(BlockNumberOrTag::Number(number))
                .await
                .map_err(rpc_fault)?
                .map(|block| block.header.timestamp as i64)
                .unwrap_or_default(),
            None => 0,
        };

        let (status, fee) = match &receipt {
            Some(r) => {
                let status = if r.status() { TxStatus::Confirmed } else { TxStatus::Failed };
                let fee = U256::from(r.gas_used) * U256::from(r.effective_gas_price);
                (status, Some(fee))
            },
            None => (TxStatus::Pending, None),
        };

        let hash_str = hex_encode(hash.as_slice());
        let from = address_string(tx.from());
        let mut transfers = vec![EvmTransfer {
            hash: hash_str.clone(),
            from: from.clone(),
            to: tx.to().map(address_string),
            value: tx.value(),
            token: None,
            token_symbol: None,
            token_decimals: None,
            fee,
            timestamp,
            block_number,
            status,
        }];

        if let Some(r) = &receipt {
            for log in r.inner.logs() {
                let Ok(decoded) = log.log_decode::<IERC20::Transfer>() else {
                    continue;
                };
                let event = &decoded.inner.data;
                transfers.push(EvmTransfer {
                    hash: hash_str.clone(),
                    from: address_string(event.from),
                    to: Some(address_string(event.to)),
                    value: event.value,
                    token: Some(address_string(decoded.inner.address)),
                    token_symbol: None,
                    token_decimals: None,
                    fee: None,
                    timestamp,
                    block_number,
                    status,
                });
            }
        }

        Ok(Some(transfers))
    }
}
