//! Smallest-unit balance arithmetic.
//!
//! Balances travel as integer strings (or JSON numbers) of the chain's smallest unit
//! and are formatted with the chain's fixed decimal-place count. All arithmetic goes
//! through [`BigUint`]; nothing passes through floating point.

use num_bigint::BigUint;
use num_traits::{pow, Zero};
use serde_json::Value;

/// Parses a non-negative integer amount of smallest units.
///
/// Accepts decimal strings, `0x`-prefixed hex strings and unsigned JSON numbers.
pub fn parse_units(value: &Value) -> Option<BigUint> {
    match value {
        Value::String(s) => parse_units_str(s),
        Value::Number(n) => n.as_u64().map(BigUint::from),
        _ => None,
    }
}

pub fn parse_units_str(s: &str) -> Option<BigUint> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        return BigUint::parse_bytes(hex.as_bytes(), 16);
    }
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    BigUint::parse_bytes(s.as_bytes(), 10)
}

/// Formats `value` with `decimals` fractional digits.
///
/// Trailing zeros of the fraction are trimmed; the integer part is always kept,
/// so zero formats as `"0"`.
pub fn format_units(value: &BigUint, decimals: u32) -> String {
    if decimals == 0 {
        return value.to_string();
    }

    let divisor = pow(BigUint::from(10u32), decimals as usize);
    let whole = value / &divisor;
    let fraction = value % &divisor;

    if fraction.is_zero() {
        return whole.to_string();
    }

    let padded = format!("{:0>width$}", fraction.to_string(), width = decimals as usize);
    format!("{whole}.{}", padded.trim_end_matches('0'))
}

/// Inverse of [`format_units`]: reads a decimal string back into smallest units.
///
/// Fails if the string has more fractional digits than `decimals`.
pub fn parse_decimal(s: &str, decimals: u32) -> Option<BigUint> {
    let (whole, fraction) = match s.split_once('.') {
        Some((w, f)) => (w, f),
        None => (s, ""),
    };

    if whole.is_empty() || fraction.len() > decimals as usize {
        return None;
    }

    let digits = format!("{whole}{fraction:0<width$}", width = decimals as usize);
    parse_units_str(&digits)
}
