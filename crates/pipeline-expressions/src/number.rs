/*
 * number.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Number parsing and formatting shared by coercion, `toJson` and literals.

/// Significant digits used when rendering numbers as text.
const SIGNIFICANT_DIGITS: i32 = 15;

/// Parse text the way string-to-number coercion does.
///
/// Leading and trailing whitespace is ignored, empty text is zero, `0x` and
/// `0o` prefixes select hexadecimal and octal integers. Anything that fails
/// to parse is NaN.
pub fn parse_number(text: &str) -> f64 {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return 0.0;
    }
    if let Some(hex) = trimmed.strip_prefix("0x") {
        return parse_radix(hex, 16);
    }
    if let Some(octal) = trimmed.strip_prefix("0o") {
        return parse_radix(octal, 8);
    }
    match trimmed {
        "Infinity" | "+Infinity" => return f64::INFINITY,
        "-Infinity" => return f64::NEG_INFINITY,
        "NaN" => return f64::NAN,
        _ => {}
    }
    if !is_decimal_literal(trimmed) {
        return f64::NAN;
    }
    trimmed.parse::<f64>().unwrap_or(f64::NAN)
}

fn parse_radix(digits: &str, radix: u32) -> f64 {
    if digits.is_empty() {
        return f64::NAN;
    }
    i64::from_str_radix(digits, radix).map_or(f64::NAN, |n| n as f64)
}

/// `[+-]? digits? (. digits?)? ([eE] [+-]? digits)?` with at least one mantissa digit.
pub(crate) fn is_decimal_literal(text: &str) -> bool {
    let bytes = text.as_bytes();
    let mut i = 0;
    if matches!(bytes.first(), Some(b'+' | b'-')) {
        i += 1;
    }
    let integer_start = i;
    while i < bytes.len() && bytes[i].is_ascii_digit() {
        i += 1;
    }
    let mut mantissa_digits = i - integer_start;
    if i < bytes.len() && bytes[i] == b'.' {
        i += 1;
        let fraction_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        mantissa_digits += i - fraction_start;
    }
    if mantissa_digits == 0 {
        return false;
    }
    if i < bytes.len() && matches!(bytes[i], b'e' | b'E') {
        i += 1;
        if i < bytes.len() && matches!(bytes[i], b'+' | b'-') {
            i += 1;
        }
        let exponent_start = i;
        while i < bytes.len() && bytes[i].is_ascii_digit() {
            i += 1;
        }
        if i == exponent_start {
            return false;
        }
    }
    i == bytes.len()
}

/// Render a number with up to 15 significant digits.
///
/// Integral values print without a decimal point. Very large or very small
/// magnitudes switch to exponent notation such as `1E+15` or `1.5E-07`.
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

    let scientific = format!("{:.*e}", (SIGNIFICANT_DIGITS - 1) as usize, value);
    let (mantissa, exponent) = scientific.split_once('e').unwrap_or((&scientific, "0"));
    let exponent: i32 = exponent.parse().unwrap_or(0);
    let sign = if mantissa.starts_with('-') { "-" } else { "" };
    let digits: String = mantissa.chars().filter(char::is_ascii_digit).collect();
    let digits = digits.trim_end_matches('0');

    if exponent >= SIGNIFICANT_DIGITS || exponent < -5 {
        let (first, rest) = digits.split_at(1);
        let exponent_sign = if exponent < 0 { '-' } else { '+' };
        if rest.is_empty() {
            format!("{sign}{first}E{exponent_sign}{:02}", exponent.abs())
        } else {
            format!("{sign}{first}.{rest}E{exponent_sign}{:02}", exponent.abs())
        }
    } else if exponent < 0 {
        let zeros = "0".repeat((-exponent - 1) as usize);
        format!("{sign}0.{zeros}{digits}")
    } else {
        let integer_len = exponent as usize + 1;
        if digits.len() <= integer_len {
            let padding = "0".repeat(integer_len - digits.len());
            format!("{sign}{digits}{padding}")
        } else {
            let (integer, fraction) = digits.split_at(integer_len);
            format!("{sign}{integer}.{fraction}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_decimal_text() {
        assert_eq!(parse_number(" 42 "), 42.0);
        assert_eq!(parse_number("-1.5"), -1.5);
        assert_eq!(parse_number(".5"), 0.5);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("   "), 0.0);
    }

    #[test]
    fn parses_prefixed_integers() {
        assert_eq!(parse_number("0xff"), 255.0);
        assert_eq!(parse_number("0o17"), 15.0);
        assert!(parse_number("0x").is_nan());
        assert!(parse_number("0xzz").is_nan());
    }

    #[test]
    fn rejects_non_numeric_text() {
        assert!(parse_number("abc").is_nan());
        assert!(parse_number("1.2.3").is_nan());
        assert!(parse_number("inf").is_nan());
        assert!(parse_number("e5").is_nan());
        assert_eq!(parse_number("Infinity"), f64::INFINITY);
    }

    #[test]
    fn formats_integral_values_without_fraction() {
        assert_eq!(format_number(1.0), "1");
        assert_eq!(format_number(-42.0), "-42");
        assert_eq!(format_number(123_456_789_012_345.0), "123456789012345");
    }

    #[test]
    fn formats_fractions() {
        assert_eq!(format_number(0.1), "0.1");
        assert_eq!(format_number(1.5), "1.5");
        assert_eq!(format_number(0.0001), "0.0001");
        assert_eq!(format_number(1.0 / 3.0), "0.333333333333333");
    }

    #[test]
    fn formats_with_exponent_outside_fixed_range() {
        assert_eq!(format_number(1e15), "1E+15");
        assert_eq!(format_number(1.5e-7), "1.5E-07");
        assert_eq!(format_number(-2.5e20), "-2.5E+20");
    }

    #[test]
    fn formats_special_values() {
        assert_eq!(format_number(f64::NAN), "NaN");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
        assert_eq!(format_number(-0.0), "0");
    }
}
