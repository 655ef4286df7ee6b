//! Parsing operator-supplied addresses.
//!
//! The control channel accepts the same notation as a base-0 `strtoul`:
//! `0x`/`0X` selects hexadecimal, a leading `0` followed by more digits selects
//! octal, anything else is decimal. Surrounding whitespace (including the
//! trailing newline a shell `echo` adds) and a leading `+` are accepted.

use crate::error::ParseError;
use crate::types::Address;

/// Parse `raw` into an address.
///
/// ## Example
///
/// ```rust
/// use hwwatch_core::parse::parse_address;
///
/// assert_eq!(parse_address("0xffff8880\n").unwrap().value(), 0xffff_8880);
/// assert_eq!(parse_address("4096").unwrap().value(), 4096);
/// assert_eq!(parse_address("010").unwrap().value(), 8);
/// assert!(parse_address("0xzz").is_err());
/// ```
///
/// ## Errors
///
/// - [`ParseError::Empty`] for blank input or a lone sign
/// - [`ParseError::InvalidDigit`] for characters outside the selected base,
///   including a bare `0x`
/// - [`ParseError::Overflow`] for values above `u64::MAX`
pub fn parse_address(raw: &str) -> Result<Address, ParseError>
{
    let input = raw.trim();
    let unsigned = input.strip_prefix('+').unwrap_or(input);
    if unsigned.is_empty() {
        return Err(ParseError::Empty);
    }

    let (digits, radix) = split_radix(unsigned);
    if digits.is_empty() {
        // "0x" with nothing after it
        return Err(ParseError::InvalidDigit {
            input: input.to_string(),
            digit: 'x',
            radix,
        });
    }

    let mut value: u64 = 0;
    for ch in digits.chars() {
        let digit = ch.to_digit(radix).ok_or_else(|| ParseError::InvalidDigit {
            input: input.to_string(),
            digit: ch,
            radix,
        })?;
        value = value
            .checked_mul(u64::from(radix))
            .and_then(|v| v.checked_add(u64::from(digit)))
            .ok_or_else(|| ParseError::Overflow(input.to_string()))?;
    }

    Ok(Address::new(value))
}

fn split_radix(s: &str) -> (&str, u32)
{
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        (hex, 16)
    } else if s.len() > 1 && s.starts_with('0') {
        (&s[1..], 8)
    } else {
        (s, 10)
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_parse_hex_with_prefix()
    {
        assert_eq!(parse_address("0x1000").unwrap(), Address::new(0x1000));
        assert_eq!(parse_address("0XDEADbeef").unwrap(), Address::new(0xdead_beef));
        assert_eq!(
            parse_address("0xffffffffffffffff").unwrap(),
            Address::new(u64::MAX)
        );
    }

    #[test]
    fn test_parse_decimal_and_octal()
    {
        assert_eq!(parse_address("4096").unwrap(), Address::new(4096));
        assert_eq!(parse_address("0").unwrap(), Address::ZERO);
        assert_eq!(parse_address("0755").unwrap(), Address::new(0o755));
    }

    #[test]
    fn test_parse_ignores_whitespace_and_plus()
    {
        assert_eq!(parse_address("  0x10\n").unwrap(), Address::new(0x10));
        assert_eq!(parse_address("+42").unwrap(), Address::new(42));
    }

    #[test]
    fn test_parse_rejects_empty()
    {
        assert_eq!(parse_address(""), Err(ParseError::Empty));
        assert_eq!(parse_address(" \n"), Err(ParseError::Empty));
        assert_eq!(parse_address("+"), Err(ParseError::Empty));
    }

    #[test]
    fn test_parse_rejects_bad_digits()
    {
        assert!(matches!(
            parse_address("0x"),
            Err(ParseError::InvalidDigit { radix: 16, .. })
        ));
        assert!(matches!(
            parse_address("12ab"),
            Err(ParseError::InvalidDigit { digit: 'a', radix: 10, .. })
        ));
        assert!(matches!(
            parse_address("089"),
            Err(ParseError::InvalidDigit { digit: '8', radix: 8, .. })
        ));
        assert!(matches!(parse_address("-1"), Err(ParseError::InvalidDigit { .. })));
    }

    #[test]
    fn test_parse_rejects_overflow()
    {
        assert!(matches!(
            parse_address("0x10000000000000000"),
            Err(ParseError::Overflow(_))
        ));
        assert!(matches!(
            parse_address("18446744073709551616"),
            Err(ParseError::Overflow(_))
        ));
    }
}
