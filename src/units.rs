use alloy_primitives::utils::{format_ether, parse_ether};
use alloy_primitives::U256;
use thiserror::Error;

/// Decimal places of the native currency's base unit (wei).
pub const NATIVE_DECIMALS: usize = 18;

/// Default number of fractional digits kept when displaying an amount.
pub const DISPLAY_DECIMALS: usize = 4;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum AmountError {
    #[error("amount is empty")]
    Empty,

    #[error("amount must not be negative: {0}")]
    Negative(String),

    #[error("invalid amount {input:?}: {reason}")]
    Invalid { input: String, reason: String },
}

/// Convert a human-entered decimal string ("0.05") into base units.
///
/// Digits past the 18th decimal place are dropped, not rounded.
pub fn parse_amount(input: &str) -> Result<U256, AmountError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(AmountError::Empty);
    }
    if trimmed.starts_with('-') {
        return Err(AmountError::Negative(trimmed.to_string()));
    }

    let truncated = match trimmed.split_once('.') {
        Some((_, frac)) if !frac.bytes().all(|b| b.is_ascii_digit()) => {
            return Err(AmountError::Invalid {
                input: trimmed.to_string(),
                reason: "fraction must contain only digits".to_string(),
            });
        }
        Some((whole, frac)) if frac.len() > NATIVE_DECIMALS => {
            format!("{}.{}", whole, &frac[..NATIVE_DECIMALS])
        }
        _ => trimmed.to_string(),
    };

    parse_ether(&truncated).map_err(|e| AmountError::Invalid {
        input: trimmed.to_string(),
        reason: e.to_string(),
    })
}

/// Format base units as a decimal string, truncated to `decimals` fractional digits.
///
/// Trailing zeros are trimmed but at least one fractional digit is kept, so
/// 10^18 formats as "1.0".
pub fn format_amount(amount: U256, decimals: usize) -> String {
    let full = format_ether(amount);
    let (whole, frac) = full.split_once('.').unwrap_or((full.as_str(), ""));

    let kept = &frac[..frac.len().min(decimals)];
    let kept = kept.trim_end_matches('0');
    if kept.is_empty() {
        format!("{}.0", whole)
    } else {
        format!("{}.{}", whole, kept)
    }
}
