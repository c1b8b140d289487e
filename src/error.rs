//! Error types shared by every layer of the wallet backend.
//!
//! Two levels exist:
//! - [`Fault`] is what an external client (RPC node, indexer, market data,
//!   swap router) reports. It only says whether retrying could help.
//! - [`WalletError`] is what callers of the library see. Only the retry
//!   utility turns a `Fault` into a `WalletError`.

use std::fmt::Display;

use thiserror::Error;

/// Outcome of a single failed call to an external service.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Fault {
    /// Timeout, connection reset, rate limit, 5xx. Worth retrying.
    #[error("transient: {0}")]
    Transient(String),
    /// Malformed request, contract revert, 4xx. Retrying returns the same answer.
    #[error("{0}")]
    Permanent(String),
}

impl Fault {
    pub fn transient(message: impl Into<String>) -> Self {
        Fault::Transient(message.into())
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Fault::Permanent(message.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Fault::Transient(_))
    }

    pub fn message(&self) -> &str {
        match self {
            Fault::Transient(m) | Fault::Permanent(m) => m,
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum WalletError {
    #[error("invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("{operation} unavailable after {attempts} attempt(s): {message}")]
    UpstreamUnavailable {
        operation: String,
        attempts: u32,
        message: String,
    },

    #[error("{operation} rejected: {message}")]
    UpstreamRejected { operation: String, message: String },

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("missing or invalid session")]
    Unauthorized,

    #[error("storage error: {0}")]
    Storage(String),
}

impl WalletError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        WalletError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        WalletError::Configuration(message.into())
    }

    /// Stable machine-readable kind, exposed at the HTTP boundary.
    pub fn code(&self) -> &'static str {
        match self {
            WalletError::Validation { .. } => "VALIDATION_ERROR",
            WalletError::UpstreamUnavailable { .. } => "UPSTREAM_UNAVAILABLE",
            WalletError::UpstreamRejected { .. } => "UPSTREAM_REJECTED",
            WalletError::Configuration(_) => "CONFIGURATION_ERROR",
            WalletError::NotFound(_) => "NOT_FOUND",
            WalletError::Unauthorized => "UNAUTHORIZED",
            WalletError::Storage(_) => "STORAGE_ERROR",
        }
    }

    /// Prefix upstream failures with the chain/address they concern.
    ///
    /// Validation and configuration errors already name their subject and are
    /// returned unchanged.
    pub fn context(self, ctx: impl Display) -> Self {
        match self {
            WalletError::UpstreamUnavailable {
                operation,
                attempts,
                message,
            } => WalletError::UpstreamUnavailable {
                operation: format!("{} ({})", operation, ctx),
                attempts,
                message,
            },
            WalletError::UpstreamRejected { operation, message } => {
                WalletError::UpstreamRejected {
                    operation: format!("{} ({})", operation, ctx),
                    message,
                }
            },
            other => other,
        }
    }
}

impl From<deadpool_postgres::PoolError> for WalletError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        WalletError::Storage(e.to_string())
    }
}

impl From<tokio_postgres::Error> for WalletError {
    fn from(e: tokio_postgres::Error) -> Self {
        WalletError::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, WalletError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_only_touches_upstream_errors() {
        let err = WalletError::UpstreamUnavailable {
            operation: "eth_getBalance".to_string(),
            attempts: 3,
            message: "timed out".to_string(),
        }
        .context("ethereum 0xabc");
        assert_eq!(
            err.to_string(),
            "eth_getBalance (ethereum 0xabc) unavailable after 3 attempt(s): timed out"
        );

        let err = WalletError::validation("address", "bad").context("ethereum");
        assert_eq!(err, WalletError::validation("address", "bad"));
    }

    #[test]
    fn test_codes_are_stable() {
        assert_eq!(WalletError::Unauthorized.code(), "UNAUTHORIZED");
        assert_eq!(
            WalletError::configuration("no rpc").code(),
            "CONFIGURATION_ERROR"
        );
    }
}
