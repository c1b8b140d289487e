//! Cron scheduler for periodic background tasks.
//!
//! Runs jobs like:
//! - Refreshing the market token list behind the wallet and swap views

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use log::info;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;

use crate::{cache::TokenMarketCache, config::MarketSettings};

use super::jobs;

/// Cron scheduler that manages periodic background jobs.
pub struct CronScheduler {
    market: Arc<TokenMarketCache>,
    settings: CronSettings,
}

/// Configuration for cron job intervals
#[derive(Debug, Clone)]
pub struct CronSettings {
    /// Interval for refreshing the market token list - default 10 minutes
    pub token_market_interval_secs: u64,
}

impl Default for CronSettings {
    fn default() -> Self {
        Self {
            token_market_interval_secs: 600,
        }
    }
}

impl From<&MarketSettings> for CronSettings {
    fn from(market: &MarketSettings) -> Self {
        Self {
            token_market_interval_secs: market.refresh_interval_secs.max(1),
        }
    }
}

impl CronScheduler {
    pub fn new(market: Arc<TokenMarketCache>, settings: CronSettings) -> Self {
        Self { market, settings }
    }

    /// Starts the cron scheduler and runs until cancellation.
    pub async fn run(&self, cancellation_token: CancellationToken) -> Result<()> {
        let mut scheduler = JobScheduler::new().await?;

        self.register_token_market_job(&scheduler).await?;

        scheduler.start().await?;
        info!("Cron scheduler started with {} jobs", 1);

        cancellation_token.cancelled().await;
        info!("Cron scheduler shutting down...");

        scheduler.shutdown().await?;
        Ok(())
    }

    async fn register_token_market_job(&self, scheduler: &JobScheduler) -> Result<()> {
        let market = self.market.clone();
        let interval = self.settings.token_market_interval_secs;

        let job = Job::new_repeated_async(Duration::from_secs(interval), move |_uuid, _lock| {
            let market = market.clone();
            Box::pin(async move {
                jobs::refresh_token_market::run(&market).await;
            })
        })?;

        scheduler.add(job).await?;
        info!("Registered refresh_token_market job (every {}s)", interval);
        Ok(())
    }
}
