//! Utility functions shared across the wallet backend.
//!
//! - [`conversion`] - Raw amount formatting and USD valuation
//! - [`retry`] - Bounded retry with backoff for external calls
//! - [`validation`] - Address, amount and raw-transaction checks

mod conversion;
mod retry;
mod validation;

// Conversion utilities
pub use conversion::{format_sats, format_units, hex_encode, usd_value};

// Retry utilities
pub use retry::RetryPolicy;

// Validation utilities
pub use validation::{
    normalize_address, normalize_address_field, parse_amount, parse_calldata, parse_evm_address,
    parse_positive_amount, parse_raw_evm_transaction, parse_tx_hash, validate_btc_address,
    validate_raw_btc_transaction, validate_txid,
};
