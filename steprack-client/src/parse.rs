// Copyright 2023-Present StepRack maintainers
// SPDX-License-Identifier: Apache-2.0
//! Token parsing helpers shared by the command surfaces.

use crate::error::{Error, Result};

pub(crate) fn parse_i64(token: &str) -> Result<i64> {
    token
        .parse()
        .map_err(|_| Error::Protocol(format!("expected an integer, got {token:?}")))
}

pub(crate) fn parse_f64(token: &str) -> Result<f64> {
    token
        .parse()
        .map_err(|_| Error::Protocol(format!("expected a number, got {token:?}")))
}

/// Hex status/signature tokens come in `0x…` form; accept bare hex too.
pub(crate) fn parse_hex_u32(token: &str) -> Result<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    u32::from_str_radix(digits, 16)
        .map_err(|_| Error::Protocol(format!("expected a hex word, got {token:?}")))
}

pub(crate) fn parse_on_off(token: &str) -> Result<bool> {
    match token.to_uppercase().as_str() {
        "ON" => Ok(true),
        "OFF" => Ok(false),
        _ => Err(Error::Protocol(format!("expected ON or OFF, got {token:?}"))),
    }
}

/// Parse one token per requested axis, preserving order and enforcing the
/// result-length invariant of multi-axis queries.
pub(crate) fn parse_list<T>(
    tokens: &[String],
    expected: usize,
    parse: impl Fn(&str) -> Result<T>,
) -> Result<Vec<T>> {
    if tokens.len() != expected {
        return Err(Error::Protocol(format!(
            "expected {expected} values, got {}",
            tokens.len()
        )));
    }
    tokens.iter().map(|t| parse(t)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_with_and_without_prefix() {
        assert_eq!(parse_hex_u32("0x8001").unwrap(), 0x8001);
        assert_eq!(parse_hex_u32("0X11").unwrap(), 0x11);
        assert_eq!(parse_hex_u32("A0").unwrap(), 0xA0);
        assert!(parse_hex_u32("zz").is_err());
    }

    #[test]
    fn on_off() {
        assert!(parse_on_off("ON").unwrap());
        assert!(!parse_on_off("off").unwrap());
        assert!(parse_on_off("MAYBE").is_err());
    }

    #[test]
    fn list_length_enforced() {
        let tokens = vec!["55".to_string(), "-3".to_string()];
        assert_eq!(parse_list(&tokens, 2, parse_i64).unwrap(), vec![55, -3]);
        assert!(parse_list(&tokens, 3, parse_i64).is_err());
    }
}
