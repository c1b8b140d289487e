//! In-process fakes of the external clients, with call counters.

use std::{
    collections::{HashMap, VecDeque},
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
    time::Duration,
};

use alloy::primitives::{Address, Bytes, B256, U256};
use async_trait::async_trait;
use chrono::NaiveDate;

use crate::{
    clients::{
        EsploraTx, EvmRpc, EvmTransfer, MarketData, RouterQuote, RouterSwap, SwapRouter,
        TransferHistory, UtxoRpc,
    },
    error::Fault,
    models::{AddressStats, Chain, MarketToken, RouterSwapParams, TxConfirmation, Utxo},
    utils::RetryPolicy,
};

/// Retry policy with millisecond delays for tests.
pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        base_delay: Duration::from_millis(1),
        max_delay: Duration::from_millis(4),
        call_timeout: Duration::from_millis(300),
    }
}

pub fn market_token(
    id: &str,
    symbol: &str,
    contract: Option<(Chain, &str)>,
    price_usd: f64,
) -> MarketToken {
    MarketToken {
        id: id.to_string(),
        symbol: symbol.to_string(),
        name: symbol.to_string(),
        image: Some(format!("https://img.example/{}.png", id)),
        price_usd: Some(price_usd),
        market_cap_usd: None,
        price_change_24h: None,
        addresses: contract
            .map(|(chain, address)| HashMap::from([(chain, address.to_lowercase())]))
            .unwrap_or_default(),
    }
}

/// Shared failure switch: a configured fault, or hanging past any deadline.
#[derive(Default)]
struct Failure {
    fault: Mutex<Option<Fault>>,
    hang: AtomicBool,
}

impl Failure {
    async fn check(&self) -> Result<(), Fault> {
        if self.hang.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_secs(3600)).await;
        }
        match self.fault.lock().unwrap().clone() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }
}

#[derive(Default)]
pub struct MockEvmRpc {
    failure: Failure,
    native: Mutex<HashMap<Address, U256>>,
    balances: Mutex<HashMap<(Address, Address), U256>>,
    decimals: Mutex<HashMap<Address, u8>>,
    symbols: Mutex<HashMap<Address, String>>,
    allowance: Mutex<U256>,
    transactions: Mutex<HashMap<B256, Vec<EvmTransfer>>>,
    pub sent: Mutex<Vec<Bytes>>,
    pub calls: AtomicUsize,
    pub decimals_calls: AtomicUsize,
}

impl MockEvmRpc {
    pub fn with_native(self, owner: Address, value: u64) -> Self {
        self.native.lock().unwrap().insert(owner, U256::from(value));
        self
    }

    pub fn with_token(self, token: Address, owner: Address, value: u64, decimals: u8, symbol: &str) -> Self {
        self.balances
            .lock()
            .unwrap()
            .insert((token, owner), U256::from(value));
        self.symbols.lock().unwrap().insert(token, symbol.to_string());
        self.with_decimals(token, decimals)
    }

    pub fn with_decimals(self, token: Address, decimals: u8) -> Self {
        self.decimals.lock().unwrap().insert(token, decimals);
        self
    }

    pub fn with_allowance(self, value: u64) -> Self {
        *self.allowance.lock().unwrap() = U256::from(value);
        self
    }

    pub fn with_transaction(self, hash: B256, transfers: Vec<EvmTransfer>) -> Self {
        self.transactions.lock().unwrap().insert(hash, transfers);
        self
    }

    pub fn fail_with(&self, fault: Fault) {
        *self.failure.fault.lock().unwrap() = Some(fault);
    }

    pub fn hang(&self) {
        self.failure.hang.store(true, Ordering::SeqCst);
    }

    pub fn recover(&self) {
        *self.failure.fault.lock().unwrap() = None;
        self.failure.hang.store(false, Ordering::SeqCst);
    }

    async fn enter(&self) -> Result<(), Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        tokio::task::yield_now().await;
        self.failure.check().await
    }
}

#[async_trait]
impl EvmRpc for MockEvmRpc {
    async fn native_balance(&self, owner: Address) -> Result<U256, Fault> {
        self.enter().await?;
        Ok(self.native.lock().unwrap().get(&owner).copied().unwrap_or_default())
    }

    async fn token_balance(&self, token: Address, owner: Address) -> Result<U256, Fault> {
        self.enter().await?;
        Ok(self
            .balances
            .lock()
            .unwrap()
            .get(&(token, owner))
            .copied()
            .unwrap_or_default())
    }

    async fn decimals(&self, token: Address) -> Result<u8, Fault> {
        self.decimals_calls.fetch_add(1, Ordering::SeqCst);
        self.enter().await?;
        self.decimals
            .lock()
            .unwrap()
            .get(&token)
            .copied()
            .ok_or_else(|| Fault::permanent("execution reverted"))
    }

    async fn symbol(&self, token: Address) -> Result<String, Fault> {
        self.enter().await?;
        self.symbols
            .lock()
            .unwrap()
            .get(&token)
            .cloned()
            .ok_or_else(|| Fault::permanent("execution reverted"))
    }

    async fn allowance(&self, _token: Address, _owner: Address, _spender: Address) -> Result<U256, Fault> {
        self.enter().await?;
        Ok(*self.allowance.lock().unwrap())
    }

    async fn gas_price(&self) -> Result<u128, Fault> {
        self.enter().await?;
        Ok(25_000_000_000)
    }

    async fn nonce(&self, _owner: Address) -> Result<u64, Fault> {
        self.enter().await?;
        Ok(7)
    }

    async fn estimate_gas(&self, _from: Address, _to: Address, _value: U256, data: Bytes) -> Result<u64, Fault> {
        self.enter().await?;
        Ok(if data.is_empty() { 21_000 } else { 65_000 })
    }

    async fn send_raw_transaction(&self, raw: &Bytes) -> Result<B256, Fault> {
        self.enter().await?;
        self.sent.lock().unwrap().push(raw.clone());
        Ok(alloy::primitives::keccak256(raw))
    }

    async fn transaction(&self, hash: B256) -> Result<Option<Vec<EvmTransfer>>, Fault> {
        self.enter().await?;
        Ok(self.transactions.lock().unwrap().get(&hash).cloned())
    }
}

#[derive(Default)]
pub struct MockHistory {
    failure: Failure,
    transfers: Mutex<Vec<EvmTransfer>>,
    pub calls: AtomicUsize,
}

impl MockHistory {
    pub fn with_transfers(self, transfers: Vec<EvmTransfer>) -> Self {
        *self.transfers.lock().unwrap() = transfers;
        self
    }

    pub fn hang(&self) {
        self.failure.hang.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl TransferHistory for MockHistory {
    async fn transfers(&self, _owner: &str) -> Result<Vec<EvmTransfer>, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failure.check().await?;
        Ok(self.transfers.lock().unwrap().clone())
    }
}

type ScriptedMarkets = (Duration, Result<Vec<MarketToken>, Fault>);

#[derive(Default)]
pub struct MockMarket {
    failure: Failure,
    tokens: Mutex<Vec<MarketToken>>,
    scripted: Mutex<VecDeque<ScriptedMarkets>>,
    prices: Mutex<HashMap<String, f64>>,
    history: Mutex<HashMap<String, f64>>,
    pub markets_calls: AtomicUsize,
    pub history_calls: AtomicUsize,
    pub price_calls: AtomicUsize,
}

impl MockMarket {
    pub fn with_tokens(self, tokens: Vec<MarketToken>) -> Self {
        *self.tokens.lock().unwrap() = tokens;
        self
    }

    pub fn with_price(self, coin_id: &str, price: f64) -> Self {
        self.prices.lock().unwrap().insert(coin_id.to_string(), price);
        self
    }

    pub fn with_history(self, coin_id: &str, price: f64) -> Self {
        self.set_history(coin_id, price);
        self
    }

    pub fn set_history(&self, coin_id: &str, price: f64) {
        self.history.lock().unwrap().insert(coin_id.to_string(), price);
    }

    /// Queue a response (after `delay`) for the next `token_markets` call.
    pub fn script_markets(&self, delay: Duration, response: Result<Vec<MarketToken>, Fault>) {
        self.scripted.lock().unwrap().push_back((delay, response));
    }

    pub fn fail_with(&self, fault: Fault) {
        *self.failure.fault.lock().unwrap() = Some(fault);
    }
}

#[async_trait]
impl MarketData for MockMarket {
    async fn token_markets(&self) -> Result<Vec<MarketToken>, Fault> {
        self.markets_calls.fetch_add(1, Ordering::SeqCst);
        self.failure.check().await?;
        let scripted = self.scripted.lock().unwrap().pop_front();
        match scripted {
            Some((delay, response)) => {
                tokio::time::sleep(delay).await;
                response
            },
            None => Ok(self.tokens.lock().unwrap().clone()),
        }
    }

    async fn historical_price(&self, coin_id: &str, date: NaiveDate) -> Result<f64, Fault> {
        self.history_calls.fetch_add(1, Ordering::SeqCst);
        self.failure.check().await?;
        self.history
            .lock()
            .unwrap()
            .get(coin_id)
            .copied()
            .ok_or_else(|| Fault::permanent(format!("no price for {} on {}", coin_id, date)))
    }

    async fn current_prices(&self, coin_ids: &[String]) -> Result<HashMap<String, f64>, Fault> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        self.failure.check().await?;
        let prices = self.prices.lock().unwrap();
        Ok(coin_ids
            .iter()
            .filter_map(|id| prices.get(id).map(|p| (id.clone(), *p)))
            .collect())
    }
}

#[derive(Default)]
pub struct MockUtxo {
    failure: Failure,
    utxos: Mutex<Vec<Utxo>>,
    stats: Mutex<AddressStats>,
    txs: Mutex<Vec<EsploraTx>>,
    tip: Mutex<u64>,
    fees: Mutex<HashMap<String, f64>>,
    pub broadcasts: Mutex<Vec<String>>,
    pub calls: AtomicUsize,
}

impl MockUtxo {
    pub fn with_utxos(self, utxos: Vec<Utxo>) -> Self {
        *self.utxos.lock().unwrap() = utxos;
        self
    }

    pub fn with_stats(self, confirmed: u64, unconfirmed: i64) -> Self {
        *self.stats.lock().unwrap() = AddressStats {
            confirmed,
            unconfirmed,
        };
        self
    }

    pub fn with_txs(self, txs: Vec<EsploraTx>) -> Self {
        *self.txs.lock().unwrap() = txs;
        self
    }

    pub fn with_tip(self, tip: u64) -> Self {
        *self.tip.lock().unwrap() = tip;
        self
    }

    pub fn with_fees(self, fees: HashMap<String, f64>) -> Self {
        *self.fees.lock().unwrap() = fees;
        self
    }

    pub fn fail_with(&self, fault: Fault) {
        *self.failure.fault.lock().unwrap() = Some(fault);
    }

    async fn enter(&self) -> Result<(), Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.failure.check().await
    }
}

#[async_trait]
impl UtxoRpc for MockUtxo {
    async fn utxos(&self, _address: &str) -> Result<Vec<Utxo>, Fault> {
        self.enter().await?;
        Ok(self.utxos.lock().unwrap().clone())
    }

    async fn address_stats(&self, _address: &str) -> Result<AddressStats, Fault> {
        self.enter().await?;
        Ok(*self.stats.lock().unwrap())
    }

    async fn transactions(&self, _address: &str) -> Result<Vec<EsploraTx>, Fault> {
        self.enter().await?;
        Ok(self.txs.lock().unwrap().clone())
    }

    async fn transaction(&self, txid: &str) -> Result<Option<EsploraTx>, Fault> {
        self.enter().await?;
        Ok(self
            .txs
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.txid == txid)
            .cloned())
    }

    async fn transaction_status(&self, txid: &str) -> Result<TxConfirmation, Fault> {
        self.enter().await?;
        self.txs
            .lock()
            .unwrap()
            .iter()
            .find(|tx| tx.txid == txid)
            .map(|tx| tx.status)
            .ok_or_else(|| Fault::permanent("404 Not Found: Transaction not found"))
    }

    async fn tip_height(&self) -> Result<u64, Fault> {
        self.enter().await?;
        Ok(*self.tip.lock().unwrap())
    }

    async fn broadcast(&self, raw_hex: &str) -> Result<String, Fault> {
        self.enter().await?;
        self.broadcasts.lock().unwrap().push(raw_hex.to_string());
        Ok("f".repeat(64))
    }

    async fn fee_estimates(&self) -> Result<HashMap<String, f64>, Fault> {
        self.enter().await?;
        Ok(self.fees.lock().unwrap().clone())
    }
}

pub struct MockRouter {
    pub spender: String,
    pub to_amount: String,
    pub last_quote_fee: Mutex<Option<String>>,
    pub last_swap: Mutex<Option<RouterSwapParams>>,
    pub calls: AtomicUsize,
}

impl Default for MockRouter {
    fn default() -> Self {
        Self {
            spender: "0x1111111254eeb25477b68fb85ed929f73a960582".to_string(),
            to_amount: "995".to_string(),
            last_quote_fee: Mutex::new(None),
            last_swap: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SwapRouter for MockRouter {
    async fn spender(&self, _chain_id: u64) -> Result<String, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.spender.clone())
    }

    async fn quote(
        &self,
        _chain_id: u64,
        _src: &str,
        _dst: &str,
        _amount: &str,
        fee_percent: &str,
    ) -> Result<RouterQuote, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_quote_fee.lock().unwrap() = Some(fee_percent.to_string());
        Ok(RouterQuote {
            to_amount: self.to_amount.clone(),
        })
    }

    async fn swap(&self, _chain_id: u64, params: &RouterSwapParams) -> Result<RouterSwap, Fault> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_swap.lock().unwrap() = Some(params.clone());
        Ok(RouterSwap {
            to_amount: self.to_amount.clone(),
            tx: crate::clients::RouterTx {
                from: params.from.clone(),
                to: self.spender.clone(),
                data: "0x12aa3caf".to_string(),
                value: "0".to_string(),
                gas: Some(180_000),
                gas_price: Some("30000000000".to_string()),
            },
        })
    }
}
