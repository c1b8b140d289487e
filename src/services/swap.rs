use std::{collections::HashMap, sync::Arc};

use alloy::{primitives::U256, sol_types::SolCall};
use log::debug;

use crate::{
    abis::IERC20,
    adapters::{ChainRegistry, EvmAdapter},
    cache::TokenMarketCache,
    clients::SwapRouter,
    config::SwapSettings,
    error::WalletError,
    models::{
        is_native_token, AllowanceCheck, Chain, RouterSwapParams, SwapQuote, SwapRequest,
        SwapToken, SwapTransaction, UnsignedTransaction, NATIVE_TOKEN_ADDRESS,
    },
    utils::{
        hex_encode, normalize_address_field, parse_evm_address, parse_positive_amount,
        RetryPolicy,
    },
};

/// Referrer fee for a trade: `amount * bps / 10_000`, rounded down.
///
/// Split on the divisor so the product never exceeds `U256::MAX`.
pub fn referrer_fee(amount: U256, fee_bps: u32) -> U256 {
    let divisor = U256::from(10_000u32);
    let bps = U256::from(fee_bps);
    (amount / divisor).saturating_mul(bps) + (amount % divisor) * bps / divisor
}

/// Fee as the percentage string the router expects (30 bps -> "0.3").
fn fee_percent(fee_bps: u32) -> String {
    (f64::from(fee_bps) / 100.0).to_string()
}

/// Swap quotes and unsigned swap/approval transactions through the DEX router.
pub struct SwapService {
    registry: Arc<ChainRegistry>,
    market: Arc<TokenMarketCache>,
    router: Arc<dyn SwapRouter>,
    settings: SwapSettings,
    allowed_tokens: HashMap<Chain, Vec<String>>,
    retry: RetryPolicy,
}

impl SwapService {
    pub fn new(
        registry: Arc<ChainRegistry>,
        market: Arc<TokenMarketCache>,
        router: Arc<dyn SwapRouter>,
        settings: SwapSettings,
        retry: RetryPolicy,
    ) -> Self {
        let allowed_tokens = settings.resolved_allowed_tokens();
        Self {
            registry,
            market,
            router,
            settings,
            allowed_tokens,
            retry,
        }
    }

    pub fn referrer_fee_bps(&self) -> u32 {
        self.settings.referrer_fee_bps
    }

    /// Swap-eligible tokens on `chain`: the native coin, then every market
    /// token with a contract there, restricted to the allow-list if one is set.
    pub fn get_tokens(&self, chain: Chain) -> Result<Vec<SwapToken>, WalletError> {
        self.registry.evm(chain)?;

        let allowed: &[String] = self
            .allowed_tokens
            .get(&chain)
            .map(Vec::as_slice)
            .unwrap_or_default();

        let mut tokens = vec![SwapToken {
            chain,
            address: NATIVE_TOKEN_ADDRESS.to_string(),
            symbol: chain.native_symbol().to_string(),
            name: chain.native_name().to_string(),
            logo_url: self.market.native_token(chain).and_then(|t| t.image),
            price_usd: self.market.native_price(chain),
        }];

        let snapshot = self.market.get_tokens();
        for token in &snapshot.tokens {
            let Some(address) = token.address_on(chain) else {
                continue;
            };
            if !allowed.is_empty() && !allowed.iter().any(|a| a == address) {
                continue;
            }
            tokens.push(SwapToken {
                chain,
                address: address.to_string(),
                symbol: token.symbol.to_uppercase(),
                name: token.name.clone(),
                logo_url: token.image.clone(),
                price_usd: token.price_usd,
            });
        }

        debug!("{} swap tokens on {}", tokens.len(), chain);
        Ok(tokens)
    }

    pub async fn get_quote(
        &self,
        chain: Chain,
        src: &str,
        dst: &str,
        amount: &str,
    ) -> Result<SwapQuote, WalletError> {
        let evm = self.registry.evm(chain)?;
        let (src, dst) = swap_pair(src, dst)?;
        let amount = parse_positive_amount("amount", amount)?;
        let bps = self.settings.referrer_fee_bps;
        let fee = fee_percent(bps);
        let amount_str = amount.to_string();

        let quote = self
            .retry
            .run("router.quote", || {
                self.router
                    .quote(evm.chain_id(), &src, &dst, &amount_str, &fee)
            })
            .await
            .map_err(|e| e.context(chain))?;

        Ok(SwapQuote {
            src,
            dst,
            amount: amount_str,
            to_amount: quote.to_amount,
            referrer_fee: referrer_fee(amount, bps).to_string(),
            referrer_fee_bps: bps,
        })
    }

    /// Approval the router needs before pulling `amount` of `token` from `owner`.
    ///
    /// `transaction` is `None` when the current allowance already covers it.
    pub async fn get_allowance_transaction(
        &self,
        chain: Chain,
        token: &str,
        owner: &str,
        amount: &str,
    ) -> Result<AllowanceCheck, WalletError> {
        let evm = self.registry.evm(chain)?;
        let amount = parse_positive_amount("amount", amount)?;
        let owner = parse_evm_address("from", owner)?;
        let spender = self.spender(evm).await?;

        if is_native_token(token) {
            return Ok(AllowanceCheck {
                spender: spender.to_string().to_lowercase(),
                allowance: U256::MAX.to_string(),
                transaction: None,
            });
        }

        let token = parse_evm_address("token", token)?;
        let allowance = evm.allowance(token, owner, spender).await?;

        let transaction = (allowance < amount).then(|| {
            let data = IERC20::approveCall { spender, amount }.abi_encode();
            UnsignedTransaction {
                chain_id: evm.chain_id(),
                from: owner.to_string().to_lowercase(),
                to: token.to_string().to_lowercase(),
                data: hex_encode(&data),
                value: "0".to_string(),
                gas: None,
                gas_price: None,
            }
        });

        Ok(AllowanceCheck {
            spender: spender.to_string().to_lowercase(),
            allowance: allowance.to_string(),
            transaction,
        })
    }

    /// Router-built swap call with the referrer fee applied, ready to sign.
    pub async fn get_swap_transaction(
        &self,
        chain: Chain,
        request: &SwapRequest,
    ) -> Result<SwapTransaction, WalletError> {
        let evm = self.registry.evm(chain)?;
        let (src, dst) = swap_pair(&request.src, &request.dst)?;
        let amount = parse_positive_amount("amount", &request.amount)?;
        let from = normalize_address_field("from", &request.from)?;

        let slippage_percent = match request.slippage_percent.as_deref().map(str::trim) {
            Some(s) if !s.is_empty() => {
                let value: f64 = s
                    .parse()
                    .map_err(|_| WalletError::validation("slippage_percent", "not a number"))?;
                if !(0.0..=50.0).contains(&value) {
                    return Err(WalletError::validation(
                        "slippage_percent",
                        "must be between 0 and 50",
                    ));
                }
                s.to_string()
            },
            _ => self.settings.slippage_percent.to_string(),
        };

        let bps = self.settings.referrer_fee_bps;
        let params = RouterSwapParams {
            src,
            dst,
            amount: amount.to_string(),
            from,
            slippage_percent,
            fee_percent: fee_percent(bps),
            referrer: self.settings.referrer_address.clone(),
        };

        let swap = self
            .retry
            .run("router.swap", || self.router.swap(evm.chain_id(), &params))
            .await
            .map_err(|e| e.context(chain))?;

        Ok(SwapTransaction {
            to_amount: swap.to_amount,
            referrer_fee: referrer_fee(amount, bps).to_string(),
            tx: UnsignedTransaction {
                chain_id: evm.chain_id(),
                from: swap.tx.from.to_lowercase(),
                to: swap.tx.to.to_lowercase(),
                data: swap.tx.data,
                value: swap.tx.value,
                gas: swap.tx.gas,
                gas_price: swap.tx.gas_price,
            },
        })
    }

    /// Referrer fee owed on a trade of `amount` raw units.
    pub fn get_referrer_fee(&self, amount: &str) -> Result<String, WalletError> {
        let amount = parse_positive_amount("amount", amount)?;
        Ok(referrer_fee(amount, self.settings.referrer_fee_bps).to_string())
    }

    async fn spender(&self, evm: &EvmAdapter) -> Result<alloy::primitives::Address, WalletError> {
        let spender = self
            .retry
            .run("router.spender", || self.router.spender(evm.chain_id()))
            .await
            .map_err(|e| e.context(evm.chain()))?;
        parse_evm_address("spender", &spender).map_err(|_| WalletError::UpstreamRejected {
            operation: "router.spender".to_string(),
            message: format!("router returned malformed spender '{}'", spender),
        })
    }
}

fn swap_pair(src: &str, dst: &str) -> Result<(String, String), WalletError> {
    let src = normalize_address_field("src", src)?;
    let dst = normalize_address_field("dst", dst)?;
    if src == dst {
        return Err(WalletError::validation("dst", "must differ from src"));
    }
    Ok((src, dst))
}
