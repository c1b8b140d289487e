//! Input validation for addresses, amounts and raw transactions.
//!
//! Everything here runs before any external call is made, so malformed
//! requests fail fast with a [`WalletError::Validation`] naming the field.

use std::str::FromStr;

use alloy::primitives::{hex, Address, Bytes, B256, U256};

use crate::error::WalletError;

/// Canonical form of an EVM address: `0x` + 40 lowercase hex chars.
pub fn normalize_address(address: &str) -> Result<String, WalletError> {
    normalize_address_field("address", address)
}

pub fn normalize_address_field(field: &str, address: &str) -> Result<String, WalletError> {
    let lower = address.trim().to_ascii_lowercase();
    let hex = lower.strip_prefix("0x").ok_or_else(|| {
        WalletError::validation(field, format!("'{}' must start with 0x", address))
    })?;
    if hex.len() != 40 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(WalletError::validation(
            field,
            format!("'{}' is not a 20-byte hex address", address),
        ));
    }
    Ok(lower)
}

/// Normalize and parse into an alloy [`Address`].
pub fn parse_evm_address(field: &str, address: &str) -> Result<Address, WalletError> {
    let normalized = normalize_address_field(field, address)?;
    Address::from_str(&normalized)
        .map_err(|e| WalletError::validation(field, format!("'{}': {}", address, e)))
}

const BECH32_PREFIXES: [&str; 3] = ["bc1", "tb1", "bcrt1"];
const BECH32_CHARSET: &str = "qpzry9x8gf2tvdw0s3jn54khce6mua7l";
const BASE58_CHARSET: &str = "123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";

/// Shape check for a Bitcoin address (bech32 or base58check).
///
/// Checksums are left to the indexer, which rejects unknown addresses.
pub fn validate_btc_address(address: &str) -> Result<String, WalletError> {
    let trimmed = address.trim();
    let lower = trimmed.to_ascii_lowercase();

    if let Some(prefix) = BECH32_PREFIXES.iter().find(|p| lower.starts_with(*p)) {
        // Mixed case is invalid in bech32
        let single_case = trimmed == lower || trimmed == trimmed.to_ascii_uppercase();
        let data = &lower[prefix.len()..];
        if single_case
            && (14..=74).contains(&lower.len())
            && data.chars().all(|c| BECH32_CHARSET.contains(c))
        {
            return Ok(lower);
        }
        return Err(WalletError::validation(
            "address",
            format!("'{}' is not a valid bech32 address", address),
        ));
    }

    let starts_ok = matches!(trimmed.chars().next(), Some('1' | '3' | 'm' | 'n' | '2'));
    if starts_ok
        && (26..=35).contains(&trimmed.len())
        && trimmed.chars().all(|c| BASE58_CHARSET.contains(c))
    {
        return Ok(trimmed.to_string());
    }

    Err(WalletError::validation(
        "address",
        format!("'{}' is not a valid bitcoin address", address),
    ))
}

/// Parse a non-negative integer amount given in decimal or `0x` hex.
pub fn parse_amount(field: &str, value: &str) -> Result<U256, WalletError> {
    let trimmed = value.trim();
    let parsed = match trimmed.strip_prefix("0x") {
        Some(hex) if !hex.is_empty() => U256::from_str_radix(hex, 16),
        Some(_) => {
            return Err(WalletError::validation(field, "empty hex amount"));
        },
        None if !trimmed.is_empty() && trimmed.chars().all(|c| c.is_ascii_digit()) => {
            U256::from_str_radix(trimmed, 10)
        },
        None => {
            return Err(WalletError::validation(
                field,
                format!("'{}' is not a non-negative integer", value),
            ));
        },
    };
    parsed.map_err(|e| WalletError::validation(field, format!("'{}': {}", value, e)))
}

/// Like [`parse_amount`] but rejects zero.
pub fn parse_positive_amount(field: &str, value: &str) -> Result<U256, WalletError> {
    let amount = parse_amount(field, value)?;
    if amount.is_zero() {
        return Err(WalletError::validation(field, "must be greater than zero"));
    }
    Ok(amount)
}

/// Decode a signed EVM transaction given as `0x`-prefixed hex.
pub fn parse_raw_evm_transaction(raw: &str) -> Result<Bytes, WalletError> {
    let trimmed = raw.trim();
    if !trimmed.starts_with("0x") || trimmed.len() <= 2 {
        return Err(WalletError::validation(
            "raw_transaction",
            "expected 0x-prefixed hex",
        ));
    }
    Bytes::from_str(trimmed)
        .map_err(|e| WalletError::validation("raw_transaction", e.to_string()))
}

/// Signed Bitcoin transaction as plain hex (no prefix).
pub fn validate_raw_btc_transaction(raw: &str) -> Result<String, WalletError> {
    let trimmed = raw.trim().trim_start_matches("0x").to_ascii_lowercase();
    if trimmed.is_empty() || trimmed.len() % 2 != 0 || !trimmed.chars().all(|c| c.is_ascii_hexdigit())
    {
        return Err(WalletError::validation(
            "raw_transaction",
            "expected an even-length hex string",
        ));
    }
    Ok(trimmed)
}

/// 32-byte transaction hash, with or without `0x`.
pub fn parse_tx_hash(hash: &str) -> Result<B256, WalletError> {
    let trimmed = hash.trim();
    let hex = trimmed.strip_prefix("0x").unwrap_or(trimmed);
    if hex.len() != 64 {
        return Err(WalletError::validation(
            "hash",
            format!("'{}' is not a 32-byte hash", hash),
        ));
    }
    B256::from_str(hex).map_err(|e| WalletError::validation("hash", e.to_string()))
}

/// Bitcoin txid: 64 hex chars, returned lowercase.
pub fn validate_txid(txid: &str) -> Result<String, WalletError> {
    parse_tx_hash(txid).map(|h| hex::encode(h.as_slice()))
}

/// Optional hex calldata.
pub fn parse_calldata(data: Option<&str>) -> Result<Bytes, WalletError> {
    match data.map(str::trim) {
        None | Some("") | Some("0x") => Ok(Bytes::new()),
        Some(d) => Bytes::from_str(d).map_err(|e| WalletError::validation("data", e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIXED: &str = "0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48";

    #[test]
    fn test_normalize_address_lowercases() {
        assert_eq!(
            normalize_address(MIXED).unwrap(),
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
        assert_eq!(
            normalize_address("  0XA0B86991C6218B36C1D19D4A2E9EB0CE3606EB48 ").unwrap(),
            "0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48"
        );
    }

    #[test]
    fn test_normalize_address_rejects_bad_input() {
        assert!(normalize_address("a0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());
        assert!(normalize_address("0x1234").is_err());
        assert!(normalize_address("0xz0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());

        let err = normalize_address_field("to", "nope").unwrap_err();
        assert!(matches!(err, WalletError::Validation { ref field, .. } if field == "to"));
    }

    #[test]
    fn test_btc_addresses() {
        assert!(validate_btc_address("bc1qar0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_ok());
        assert!(validate_btc_address("1BvBMSEYstWetqTFn5Au4m4GFg7xJaNVN2").is_ok());
        assert!(validate_btc_address("3J98t1WpEZ73CNmQviecrnyiWrnqRhWNLy").is_ok());
        assert!(validate_btc_address("bc1qAr0srrr7xfkvy5l643lydnw9re59gtzzwf5mdq").is_err());
        assert!(validate_btc_address("0xa0b86991c6218b36c1d19d4a2e9eb0ce3606eb48").is_err());
        assert!(validate_btc_address("").is_err());
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("value", "1000").unwrap(), U256::from(1000u64));
        assert_eq!(parse_amount("value", "0x10").unwrap(), U256::from(16u64));
        assert!(parse_amount("value", "-5").is_err());
        assert!(parse_amount("value", "1.5").is_err());
        assert!(parse_amount("value", "").is_err());
        assert!(parse_positive_amount("amount", "0").is_err());
        assert!(parse_positive_amount("amount", "1").is_ok());
    }

    #[test]
    fn test_raw_transactions() {
        assert!(parse_raw_evm_transaction("0x02f8").is_ok());
        assert!(parse_raw_evm_transaction("02f8").is_err());
        assert!(parse_raw_evm_transaction("0x").is_err());
        assert_eq!(validate_raw_btc_transaction("0200AB").unwrap(), "0200ab");
        assert!(validate_raw_btc_transaction("abc").is_err());
    }

    #[test]
    fn test_tx_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert!(parse_tx_hash(&hash).is_ok());
        assert_eq!(validate_txid(&"AB".repeat(32)).unwrap(), "ab".repeat(32));
        assert!(parse_tx_hash("0x1234").is_err());
    }
}
