//! Rupee formatting with Indian digit grouping (1,23,45,678)
//!
//! The compact form abbreviates to thousands (K), lakhs (L) and crores (CR)
//! and is what the assistant uses inside chat messages.

use num_format::{Locale, ToFormattedString as _};

const CRORE: f64 = 10_000_000.0;
const LAKH: f64 = 100_000.0;
const THOUSAND: f64 = 1_000.0;

pub fn format_currency(amount: f64, compact: bool) -> String {
    if !amount.is_finite() {
        return "₹0".to_string();
    }

    let abs = amount.abs();
    let sign = if amount < 0.0 { "-" } else { "" };

    if compact && abs >= CRORE {
        format!("₹{}{:.1}CR", sign, abs / CRORE)
    } else if compact && abs >= LAKH {
        format!("₹{}{:.1}L", sign, abs / LAKH)
    } else if compact && abs >= THOUSAND {
        format!("₹{}{:.1}K", sign, abs / THOUSAND)
    } else {
        format!("₹{}", (amount.round() as i64).to_formatted_string(&Locale::en_IN))
    }
}

/// Full amount with exactly two decimals, e.g. `₹1,23,456.50`
pub fn format_currency_detailed(amount: f64) -> String {
    if !amount.is_finite() {
        return "₹0".to_string();
    }

    let cents = (amount.abs() * 100.0).round() as i64;
    let sign = if amount < 0.0 && cents != 0 { "-" } else { "" };

    format!(
        "₹{}{}.{:02}",
        sign,
        (cents / 100).to_formatted_string(&Locale::en_IN),
        cents % 100
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compact_thresholds() {
        assert_eq!(format_currency(450.0, true), "₹450");
        assert_eq!(format_currency(1_500.0, true), "₹1.5K");
        assert_eq!(format_currency(250_000.0, true), "₹2.5L");
        assert_eq!(format_currency(32_000_000.0, true), "₹3.2CR");
        assert_eq!(format_currency(-2_000.0, true), "₹-2.0K");
    }

    #[test]
    fn test_standard_uses_indian_grouping() {
        assert_eq!(format_currency(1_234_567.0, false), "₹12,34,567");
        assert_eq!(format_currency(999.6, false), "₹1,000");
        assert_eq!(format_currency(f64::NAN, true), "₹0");
    }

    #[test]
    fn test_detailed() {
        assert_eq!(format_currency_detailed(123_456.5), "₹1,23,456.50");
        assert_eq!(format_currency_detailed(1_234.999), "₹1,235.00");
        assert_eq!(format_currency_detailed(0.0), "₹0.00");
        assert_eq!(format_currency_detailed(-75.25), "₹-75.25");
    }
}
