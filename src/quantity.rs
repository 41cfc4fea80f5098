//! Exact-decimal parsing of Kubernetes resource quantity strings.
//!
//! `k8s_openapi::apimachinery::pkg::api::resource::Quantity` is just a
//! string wrapper with no parsing; Kubernetes quantities mix SI suffixes
//! (`m`, `k`, `M`, `G`, ...) with binary suffixes (`Ki`, `Mi`, `Gi`, ...) and
//! decimal points (`1.5`, `100m`). Comparing free-vs-requested capacity must
//! not lose precision to float rounding, so everything here is done with
//! `i64` arithmetic in a fixed base unit: millicores for CPU, bytes for
//! memory.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseError;

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid resource quantity")
    }
}

impl std::error::Error for ParseError {}

/// Parses a CPU quantity string (e.g. `"100m"`, `"2"`, `"1.5"`) into
/// millicores.
pub fn parse_cpu_millis(raw: &str) -> Result<i64, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    if let Some(digits) = raw.strip_suffix('m') {
        return parse_decimal_scaled(digits, 1);
    }
    parse_decimal_scaled(raw, 1000)
}

/// Parses a memory quantity string (e.g. `"128Mi"`, `"1.5G"`, `"512"`) into
/// bytes.
pub fn parse_memory_bytes(raw: &str) -> Result<i64, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    for (suffix, scale) in BINARY_SUFFIXES.iter().chain(SI_SUFFIXES.iter()) {
        if let Some(digits) = raw.strip_suffix(suffix) {
            if !suffix.is_empty() {
                return parse_decimal_scaled(digits, *scale);
            }
        }
    }
    parse_decimal_scaled(raw, 1)
}

/// Parses a bare integer quantity (e.g. `nvidia.com/gpu` counts). GPU
/// requests never carry an SI or binary suffix - just a plain integer.
pub fn parse_int(raw: &str) -> Result<i64, ParseError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<i64>().map_err(|_| ParseError)
}

const BINARY_SUFFIXES: &[(&str, i64)] = &[
    ("Ki", 1024),
    ("Mi", 1024 * 1024),
    ("Gi", 1024 * 1024 * 1024),
    ("Ti", 1024 * 1024 * 1024 * 1024),
];

const SI_SUFFIXES: &[(&str, i64)] = &[
    ("k", 1_000),
    ("M", 1_000_000),
    ("G", 1_000_000_000),
    ("T", 1_000_000_000_000),
];

/// Parses `digits` (an optionally decimal-pointed, unsigned or signed
/// integer string) as an exact value multiplied by `scale`, with no
/// floating-point intermediate. E.g. `parse_decimal_scaled("1.5", 1000) ==
/// 1500`.
fn parse_decimal_scaled(digits: &str, scale: i64) -> Result<i64, ParseError> {
    let digits = digits.trim();
    if digits.is_empty() {
        return Err(ParseError);
    }
    let (sign, digits) = match digits.strip_prefix('-') {
        Some(rest) => (-1i64, rest),
        None => (1i64, digits.strip_prefix('+').unwrap_or(digits)),
    };

    let value = match digits.split_once('.') {
        None => {
            let whole: i64 = digits.parse().map_err(|_| ParseError)?;
            whole.checked_mul(scale).ok_or(ParseError)?
        }
        Some((whole_str, frac_str)) => {
            if frac_str.chars().any(|c| !c.is_ascii_digit()) {
                return Err(ParseError);
            }
            let whole: i64 = if whole_str.is_empty() {
                0
            } else {
                whole_str.parse().map_err(|_| ParseError)?
            };
            let whole_part = whole.checked_mul(scale).ok_or(ParseError)?;

            // Scale the fractional digits against `scale` exactly: e.g.
            // scale=1000, frac="5" -> 500; frac="025" -> 25. Precision
            // beyond `scale`'s own resolution (e.g. sub-millicore CPU) is
            // truncated, same as Kubernetes' own quantity semantics.
            let frac_part = if frac_str.is_empty() {
                0
            } else {
                let frac_len = frac_str.len() as u32;
                let frac_numerator: i64 = frac_str.parse().map_err(|_| ParseError)?;
                let ten_pow_frac_len = 10i64.checked_pow(frac_len).ok_or(ParseError)?;
                (frac_numerator * scale) / ten_pow_frac_len
            };

            whole_part.checked_add(frac_part).ok_or(ParseError)?
        }
    };

    Ok(sign * value)
}
