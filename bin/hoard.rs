use std::{str::FromStr, sync::Arc};

use anyhow::Context;
use jemallocator::Jemalloc;
use log::{error, info, warn, LevelFilter};
use simple_logger::SimpleLogger;
use tokio_util::sync::CancellationToken;

#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use hoard::{
    api::{self, AppState},
    clients::{CoinGeckoClient, OneInchClient},
    store::{MemoryUserStore, PostgresUserStore, UserStore},
    utils::RetryPolicy,
    BitcoinService, ChainRegistry, CronScheduler, CronSettings, DecimalsCache, PriceHistoryCache,
    Settings, SwapService, TokenMarketCache, WalletService,
};

#[tokio::main()]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    let settings = Settings::new()
        .context("Failed to load config.yaml. Please ensure it exists and is valid")?;

    let level = LevelFilter::from_str(&settings.log_level).unwrap_or(LevelFilter::Info);
    SimpleLogger::new()
        .with_level(level)
        .init()
        .context("Failed to initialize logger")?;

    let retry = RetryPolicy::from(&settings.retry);
    let coin_ids = settings.market.resolved_coin_ids();

    // Process-wide caches, shared by every service
    let market_data = Arc::new(
        CoinGeckoClient::new(
            &settings.market.api_url,
            settings.market.api_key.clone(),
            settings.market.pages,
        )
        .context("Failed to create market-data client")?,
    );
    let decimals = Arc::new(DecimalsCache::new(retry));
    let prices = Arc::new(PriceHistoryCache::new(market_data.clone(), coin_ids.clone(), retry));
    let market = Arc::new(TokenMarketCache::new(market_data, coin_ids, retry));

    let registry = Arc::new(
        ChainRegistry::from_settings(&settings, decimals, retry)
            .context("Failed to configure chains")?,
    );

    let store: Arc<dyn UserStore> = match &settings.postgres {
        Some(pg) => {
            let store = PostgresUserStore::new(pg)
                .await
                .context("Failed to initialize database connection")?;
            store.migrate().await.context("Failed to apply schema")?;
            Arc::new(store)
        },
        None => {
            warn!("No postgres configured, user state is kept in memory");
            Arc::new(MemoryUserStore::with_sessions(settings.sessions.clone()))
        },
    };

    let router = Arc::new(
        OneInchClient::new(&settings.swap.api_url, settings.swap.api_key.clone())
            .context("Failed to create swap router client")?,
    );

    let state = AppState {
        wallet: Arc::new(WalletService::new(
            registry.clone(),
            market.clone(),
            prices,
            store.clone(),
        )),
        swap: Arc::new(SwapService::new(
            registry.clone(),
            market.clone(),
            router,
            settings.swap.clone(),
            retry,
        )),
        bitcoin: Arc::new(BitcoinService::new(
            registry.clone(),
            market.clone(),
            store.clone(),
        )),
        registry,
        market: market.clone(),
        store,
    };

    let cancellation_token = CancellationToken::new();

    // First snapshot without waiting for the first tick
    {
        let market = market.clone();
        tokio::spawn(async move {
            market.refresh().await;
        });
    }

    let cron_scheduler = CronScheduler::new(market, CronSettings::from(&settings.market));
    let cron_token = cancellation_token.child_token();
    let cron_handle = tokio::spawn(async move {
        if let Err(e) = cron_scheduler.run(cron_token).await {
            error!("Cron scheduler failed: {:#}", e);
        }
    });

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    info!("Listening on {}", addr);

    let server_token = cancellation_token.clone();
    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            server_token.cancel();
        })
        .await
        .context("HTTP server failed")?;

    // Cancel all running tasks
    info!("Finishing all tasks...");
    cancellation_token.cancel();

    info!("Waiting for cron scheduler to stop...");
    let _ = cron_handle.await;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {
                        info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
                    },
                    _ = sigterm.recv() => {
                        info!("Received SIGTERM, exiting gracefully...");
                    },
                };
                return;
            },
            Err(e) => error!("Failed to install SIGTERM handler: {}", e),
        }
    }

    let _ = tokio::signal::ctrl_c().await;
    info!("Received shutdown signal (Ctrl+C), exiting gracefully...");
}
