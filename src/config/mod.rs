mod settings;

pub use settings::{
    BitcoinSettings, ChainSettings, EvmChainSettings, MarketSettings, PostgresSettings,
    RetrySettings, ServerSettings, Settings, SwapSettings,
};
