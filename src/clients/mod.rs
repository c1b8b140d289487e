//! Clients for the external services the wallet depends on.
//!
//! Each service sits behind a trait so adapters and caches can be exercised
//! against in-process fakes. Implementations report failures as [`Fault`]s
//! and never retry on their own; retrying is the caller's job.

pub mod coingecko;
pub mod esplora;
pub mod evm;
pub mod explorer;
pub mod oneinch;

use std::time::Duration;

use reqwest::{Response, StatusCode};

use crate::error::{Fault, WalletError};

pub use coingecko::{CoinGeckoClient, MarketData};
pub use esplora::{EsploraClient, EsploraTx, UtxoRpc};
pub use evm::{AlloyRpc, EvmRpc, EvmTransfer};
pub use explorer::{EtherscanClient, TransferHistory};
pub use oneinch::{OneInchClient, RouterQuote, RouterSwap, RouterTx, SwapRouter};

/// Connect timeout for all outbound HTTP clients; the per-call deadline is
/// enforced by the retry policy.
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

pub(crate) fn http_client() -> Result<reqwest::Client, WalletError> {
    reqwest::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .user_agent(concat!("hoard/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| WalletError::configuration(format!("failed to build HTTP client: {}", e)))
}

impl From<reqwest::Error> for Fault {
    fn from(e: reqwest::Error) -> Self {
        if let Some(status) = e.status() {
            return status_fault(status, &e.to_string());
        }
        if e.is_timeout() || e.is_connect() || e.is_request() || e.is_body() {
            Fault::transient(e.to_string())
        } else {
            // Decoding and builder errors repeat on every attempt
            Fault::permanent(e.to_string())
        }
    }
}

/// Rate limits and server errors are transient; any other status is not.
pub(crate) fn status_fault(status: StatusCode, message: &str) -> Fault {
    if status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
    {
        Fault::transient(format!("{}: {}", status, message))
    } else {
        Fault::permanent(format!("{}: {}", status, message))
    }
}

/// Pass successful responses through, classify the rest with their body text.
pub(crate) async fn ensure_success(response: Response) -> Result<Response, Fault> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    let snippet: String = body.chars().take(200).collect();
    Err(status_fault(status, &snippet))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(status_fault(StatusCode::TOO_MANY_REQUESTS, "slow down").is_transient());
        assert!(status_fault(StatusCode::BAD_GATEWAY, "").is_transient());
        assert!(!status_fault(StatusCode::BAD_REQUEST, "bad address").is_transient());
        assert!(!status_fault(StatusCode::NOT_FOUND, "").is_transient());
    }
}
