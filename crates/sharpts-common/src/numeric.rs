//! Utilities for parsing numeric literals.

use num_bigint::BigInt;

/// Parse a numeric literal text representation into an f64 value.
/// Supports standard floating point literals as well as 0x, 0b, and 0o
/// prefixes. Numeric separators (`_`) are stripped; their placement is
/// validated separately by [`check_separators`].
pub fn parse_numeric_literal_value(text: &str) -> Option<f64> {
    if text.is_empty() {
        return None;
    }

    if text.len() > 2 {
        let prefix = &text[0..2];
        if prefix.eq_ignore_ascii_case("0x") {
            return parse_radix_digits(&text[2..], 16);
        } else if prefix.eq_ignore_ascii_case("0b") {
            return parse_radix_digits(&text[2..], 2);
        } else if prefix.eq_ignore_ascii_case("0o") {
            return parse_radix_digits(&text[2..], 8);
        }
    }

    if text.contains('_') {
        let cleaned: String = text.chars().filter(|&c| c != '_').collect();
        return cleaned.parse::<f64>().ok();
    }

    text.parse::<f64>().ok()
}

fn parse_radix_digits(text: &str, base: u32) -> Option<f64> {
    if text.is_empty() {
        return None;
    }

    let mut value = 0.0;
    let base_float = f64::from(base);

    for byte in text.bytes() {
        if byte == b'_' {
            continue;
        }

        let digit = match byte {
            b'0'..=b'9' => u32::from(byte - b'0'),
            b'a'..=b'f' => u32::from(byte - b'a' + 10),
            b'A'..=b'F' => u32::from(byte - b'A' + 10),
            _ => return None,
        };

        if digit >= base {
            return None;
        }

        value = value * base_float + f64::from(digit);
    }

    Some(value)
}

/// Parse a bigint literal (without the trailing `n`) into a [`BigInt`].
/// Accepts the same radix prefixes and separators as number literals.
pub fn parse_bigint_literal_value(text: &str) -> Option<BigInt> {
    let (digits, radix) = if text.len() > 2 {
        let prefix = &text[0..2];
        if prefix.eq_ignore_ascii_case("0x") {
            (&text[2..], 16)
        } else if prefix.eq_ignore_ascii_case("0b") {
            (&text[2..], 2)
        } else if prefix.eq_ignore_ascii_case("0o") {
            (&text[2..], 8)
        } else {
            (text, 10)
        }
    } else {
        (text, 10)
    };
    let cleaned: String = digits.chars().filter(|&c| c != '_').collect();
    if cleaned.is_empty() {
        return None;
    }
    BigInt::parse_bytes(cleaned.as_bytes(), radix)
}

/// Validate numeric separator placement in a literal's raw text.
///
/// Separators are rejected when leading, trailing, doubled, or adjacent
/// to the decimal point, the radix prefix, or the exponent marker.
/// Returns the byte offset of the offending `_` on failure.
pub fn check_separators(text: &str) -> Result<(), usize> {
    let bytes = text.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b != b'_' {
            continue;
        }
        let prev = if i > 0 { bytes[i - 1] } else { 0 };
        let next = bytes.get(i + 1).copied().unwrap_or(0);
        let prev_ok = prev.is_ascii_alphanumeric() && prev != b'_';
        let next_ok = next.is_ascii_alphanumeric() && next != b'_';
        // A separator needs a digit on both sides; `0x_1`, `1_.0`, `1._0`,
        // `1__0`, `_1`, and `1_` all fail here. `e_1` style also fails
        // because the byte after `e`/`E` must be a digit or sign.
        if !prev_ok || !next_ok || prev == b'.' || next == b'.' {
            return Err(i);
        }
        if i == 2 && (text.starts_with("0x") || text.starts_with("0X")
            || text.starts_with("0b") || text.starts_with("0B")
            || text.starts_with("0o") || text.starts_with("0O"))
        {
            return Err(i);
        }
    }
    Ok(())
}

/// Format an f64 the way JavaScript's number-to-string conversion does for
/// the common cases: no trailing `.0` on integral values, `NaN`,
/// `Infinity`, and `-0` printed as `0`.
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        return "NaN".to_string();
    }
    if value.is_infinite() {
        return if value > 0.0 { "Infinity" } else { "-Infinity" }.to_string();
    }
    if value == 0.0 {
        return "0".to_string();
    }
    if value == value.trunc() && value.abs() < 1e21 {
        // Integral values print without a decimal point.
        return format!("{}", value as i64);
    }
    format!("{value}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_radix_and_separator_literals() {
        assert_eq!(parse_numeric_literal_value("123"), Some(123.0));
        assert_eq!(parse_numeric_literal_value("123.456"), Some(123.456));
        assert_eq!(parse_numeric_literal_value("1_000_000"), Some(1_000_000.0));
        assert_eq!(parse_numeric_literal_value("0b11"), Some(3.0));
        assert_eq!(parse_numeric_literal_value("0o10"), Some(8.0));
        assert_eq!(parse_numeric_literal_value("0xFF"), Some(255.0));
        assert_eq!(parse_numeric_literal_value("0Xabc"), Some(2748.0));
        assert_eq!(parse_numeric_literal_value("0b2"), None);
        assert_eq!(parse_numeric_literal_value("0o8"), None);
        assert_eq!(parse_numeric_literal_value("0xg"), None);
    }

    #[test]
    fn rejects_misplaced_separators() {
        assert!(check_separators("1_000_000").is_ok());
        assert!(check_separators("0b1_0").is_ok());
        assert!(check_separators("1__000").is_err());
        assert!(check_separators("1_").is_err());
        assert!(check_separators("_1").is_err());
        assert!(check_separators("1_.0").is_err());
        assert!(check_separators("1._0").is_err());
        assert!(check_separators("0x_1").is_err());
    }

    #[test]
    fn parses_bigint_literals() {
        use num_bigint::BigInt;
        assert_eq!(
            parse_bigint_literal_value("123"),
            Some(BigInt::from(123))
        );
        assert_eq!(
            parse_bigint_literal_value("0xFF"),
            Some(BigInt::from(255))
        );
        assert_eq!(
            parse_bigint_literal_value("1_000"),
            Some(BigInt::from(1000))
        );
        // Arbitrary precision: beyond u64.
        let big = parse_bigint_literal_value("123456789012345678901234567890").unwrap();
        assert_eq!(big.to_string(), "123456789012345678901234567890");
    }

    #[test]
    fn formats_numbers_like_javascript() {
        assert_eq!(format_number(1_000_000.0), "1000000");
        assert_eq!(format_number(0.5), "0.5");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(10.0), "10");
    }
}
