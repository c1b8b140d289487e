//! Job to refresh the market token list.
//!
//! A failed refresh keeps the previous snapshot, so this job never errors;
//! the cache logs the outcome itself.

use log::debug;

use crate::cache::TokenMarketCache;

/// Pulls the provider's token list and publishes it if it is the newest.
pub async fn run(cache: &TokenMarketCache) {
    let start = std::time::Instant::now();
    let applied = cache.refresh().await;
    debug!(
        "Completed refresh_token_market job in {:?} (applied: {})",
        start.elapsed(),
        applied
    );
}
