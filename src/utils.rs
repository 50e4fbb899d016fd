// src/utils.rs
use ethers::types::U256;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::types::Timestamp;

/// Largest decimals for which one whole token still fits in a `U256`.
pub const MAX_DECIMALS: u8 = 77;

/// Renders a base-unit amount with `decimals` fractional digits, dropping
/// trailing zeros: `1500000000000000000` at 18 decimals is `"1.5"`.
pub fn to_human_amount(value: U256, decimals: u8) -> String {
    if decimals == 0 {
        return value.to_string();
    }
    let (whole, fraction) = match U256::from(10).checked_pow(U256::from(decimals)) {
        Some(unit) => value.div_mod(unit),
        None => (U256::zero(), value),
    };
    let width = usize::from(decimals);
    let fraction = format!("{:0>width$}", fraction.to_string());
    let fraction = fraction.trim_end_matches('0');
    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{whole}.{fraction}")
    }
}

/// Whole-token amount scaled to base units; `None` if it does not fit.
pub fn from_whole_tokens(amount: u64, decimals: u8) -> Option<U256> {
    U256::from(10)
        .checked_pow(U256::from(decimals))?
        .checked_mul(U256::from(amount))
}

pub fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_fractions_without_trailing_zeros() {
        assert_eq!(to_human_amount(U256::from(1_500_000_000_000_000_000u64), 18), "1.5");
        assert_eq!(to_human_amount(U256::from(5_000), 18), "0.000000000000005");
        assert_eq!(to_human_amount(from_whole_tokens(42, 6).unwrap(), 6), "42");
        assert_eq!(to_human_amount(U256::from(7), 0), "7");
    }

    #[test]
    fn oversized_decimals_do_not_overflow() {
        assert!(from_whole_tokens(1, MAX_DECIMALS).is_some());
        assert_eq!(from_whole_tokens(1, MAX_DECIMALS + 1), None);
        assert_eq!(from_whole_tokens(u64::MAX, MAX_DECIMALS), None);
        assert_eq!(to_human_amount(U256::from(12), 200), format!("0.{}12", "0".repeat(198)));
    }
}
