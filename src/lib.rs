pub mod abis;
pub mod adapters;
pub mod api;
pub mod cache;
pub mod clients;
pub mod config;
pub mod cron;
pub mod error;
pub mod models;
pub mod services;
pub mod store;
pub mod utils;

#[cfg(test)]
pub(crate) mod mocks;

pub use adapters::{ChainAdapter, ChainRegistry};
pub use cache::{DecimalsCache, PriceHistoryCache, TokenMarketCache};
pub use config::Settings;
pub use cron::{CronScheduler, CronSettings};
pub use error::{Fault, WalletError};
pub use services::{BitcoinService, SwapService, WalletService};
