//! In-process caches shared by the chain adapters and services.
//!
//! All three are constructed once at startup and handed out as `Arc`s.

mod decimals;
mod price_history;
mod token_market;

pub use decimals::DecimalsCache;
pub use price_history::PriceHistoryCache;
pub use token_market::{TokenMarketCache, TokenMarketSnapshot};
