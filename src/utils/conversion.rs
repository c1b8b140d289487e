//! Type conversion and formatting utilities.
//!
//! On-chain amounts travel as `U256` (or `u64` satoshis) and are only turned
//! into human-readable decimals here, at the presentation boundary.

use alloy::primitives::{hex, U256};
use bigdecimal::BigDecimal;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use once_cell::sync::Lazy;

// ============================================
// Hex Encoding
// ============================================

/// Encode bytes as a lowercase hex string with 0x prefix.
pub fn hex_encode(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

// ============================================
// Decimal Formatting
// ============================================

/// Render a raw integer amount as an exact decimal string.
///
/// Trailing fractional zeros are dropped; no rounding ever happens.
///
/// # Example
/// ```ignore
/// assert_eq!(format_units(U256::from(1_500_000u64), 6), "1.5");
/// ```
pub fn format_units(value: U256, decimals: u8) -> String {
    let digits = value.to_string();
    if decimals == 0 {
        return digits;
    }

    let width = decimals as usize;
    let (int_part, frac_part) = if digits.len() > width {
        let (i, f) = digits.split_at(digits.len() - width);
        (i.to_string(), f.to_string())
    } else {
        ("0".to_string(), format!("{:0>width$}", digits, width = width))
    };

    let frac = frac_part.trim_end_matches('0');
    if frac.is_empty() {
        int_part
    } else {
        format!("{}.{}", int_part, frac)
    }
}

/// Same as [`format_units`] for satoshi-style `u64` amounts.
pub fn format_sats(value: u64, decimals: u8) -> String {
    format_units(U256::from(value), decimals)
}

// ============================================
// U256 Conversions
// ============================================

/// Convert U256 to f64 with decimal adjustment.
///
/// Uses BigDecimal for precise conversion of large U256 values.
/// Returns None if the value cannot be converted to a valid f64.
fn u256_to_f64(value: U256, decimals: u8) -> Option<f64> {
    // Convert U256 to BigDecimal via bytes (faster than string parsing)
    let bytes: [u8; 32] = value.to_le_bytes();
    let big_int = BigInt::from_bytes_le(num_bigint::Sign::Plus, &bytes);
    let big_value = BigDecimal::from(big_int);

    let adjusted = big_value / big_pow10(decimals);

    let result = adjusted.to_f64()?;

    if result.is_finite() {
        Some(result)
    } else {
        None
    }
}

/// USD value of a raw amount at `price_usd` per whole token.
pub fn usd_value(value: U256, decimals: u8, price_usd: f64) -> Option<f64> {
    if !price_usd.is_finite() || price_usd < 0.0 {
        return None;
    }
    let amount = u256_to_f64(value, decimals)?;
    let usd = amount * price_usd;
    usd.is_finite().then_some(usd)
}

// ============================================
// Internal Helpers
// ============================================

static POW10_CACHE: Lazy<[BigDecimal; 25]> =
    Lazy::new(|| std::array::from_fn(|i| BigDecimal::from(BigInt::from(10u32).pow(i as u32))));

/// Compute 10^exp as BigDecimal.
pub(crate) fn big_pow10(exp: u8) -> BigDecimal {
    if (exp as usize) < POW10_CACHE.len() {
        POW10_CACHE[exp as usize].clone()
    } else {
        BigDecimal::from(BigInt::from(10u32).pow(exp as u32))
    }
}
