//! Conversions between base units and human-readable decimal strings

use alloy_primitives::utils::{format_units, parse_units};
use alloy_primitives::{I256, U256};
use eyre::{eyre, Result};

/// Format base units with `decimals`, trimming trailing zeros ("4.0", "0.25")
pub fn format_amount(value: U256, decimals: u8) -> String {
    match format_units(value, decimals) {
        Ok(s) => trim_decimal(&s),
        // decimals above 77 are rejected by the formatter
        Err(_) => value.to_string(),
    }
}

fn trim_decimal(s: &str) -> String {
    match s.split_once('.') {
        Some((whole, frac)) => {
            let frac = frac.trim_end_matches('0');
            if frac.is_empty() {
                format!("{}.0", whole)
            } else {
                format!("{}.{}", whole, frac)
            }
        }
        None => format!("{}.0", s),
    }
}

/// Extra fractional digits would be truncated by `parse_units`
fn check_precision(input: &str, decimals: u8) -> Result<()> {
    match input.split_once('.') {
        Some((_, frac)) if frac.len() > decimals as usize => {
            Err(eyre!("Too many decimal places (max {})", decimals))
        }
        _ => Ok(()),
    }
}

/// Parse a user-typed positive amount into base units
pub fn parse_amount(input: &str, decimals: u8) -> Result<U256> {
    let input = input.trim();
    if input.is_empty() {
        return Err(eyre!("Enter an amount"));
    }
    if input.starts_with('-') {
        return Err(eyre!("Amount must be positive"));
    }
    check_precision(input, decimals)?;

    let parsed = parse_units(input, decimals).map_err(|e| eyre!("Invalid amount '{}': {}", input, e))?;
    let value = parsed.get_absolute();
    if value.is_zero() {
        return Err(eyre!("Amount must be greater than zero"));
    }
    Ok(value)
}

/// Parse a signed, non-zero delta ("-1.5") into base units
pub fn parse_signed_amount(input: &str, decimals: u8) -> Result<I256> {
    let input = input.trim();
    if input.is_empty() {
        return Err(eyre!("Enter an amount"));
    }
    check_precision(input, decimals)?;

    let parsed = parse_units(input, decimals).map_err(|e| eyre!("Invalid amount '{}': {}", input, e))?;
    let value = parsed.get_signed();
    if value.is_zero() {
        return Err(eyre!("Delta must not be zero"));
    }
    Ok(value)
}

/// WAD ratio as a percentage string ("75.5%")
pub fn format_wad_percent(value: U256) -> String {
    // WAD has 18 decimals, a percentage moves the point two places
    format!("{}%", format_amount(value, 16))
}
