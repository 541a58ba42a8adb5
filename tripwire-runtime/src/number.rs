/// Formats a number the way the host renders it as a string.
///
/// Integral values print without a fractional part, and the special values print as `NaN`,
/// `Infinity` and `-Infinity`. Negative zero prints as `0`.
///
/// # Example
///
/// ```
/// use tripwire_runtime::format_number;
///
/// assert_eq!(format_number(5.0), "5");
/// assert_eq!(format_number(1.5), "1.5");
/// assert_eq!(format_number(f64::NAN), "NaN");
/// ```
pub fn format_number(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_owned()
    } else if value.is_infinite() {
        if value > 0.0 { "Infinity" } else { "-Infinity" }.to_owned()
    } else if value == 0.0 {
        "0".to_owned()
    } else if value.fract() == 0.0 && value.abs() < 1e21 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}

/// Converts a string to a number following the host's numeric coercion.
///
/// Surrounding whitespace is ignored and an empty string is `0`. Strings that are not valid
/// numbers produce `NaN`.
pub fn parse_number(value: &str) -> f64 {
    let trimmed = value.trim();
    match trimmed {
        "" => 0.0,
        "Infinity" | "+Infinity" => f64::INFINITY,
        "-Infinity" => f64::NEG_INFINITY,
        _ => {
            let radix = match trimmed.get(..2) {
                Some("0x") | Some("0X") => Some(16),
                Some("0o") | Some("0O") => Some(8),
                Some("0b") | Some("0B") => Some(2),
                _ => None,
            };

            // Rust accepts spellings like "inf" and "nan" that the host does not.
            let has_letters = trimmed
                .bytes()
                .any(|b| b.is_ascii_alphabetic() && !matches!(b, b'e' | b'E'));

            match radix {
                Some(radix) => u64::from_str_radix(&trimmed[2..], radix)
                    .map(|n| n as f64)
                    .unwrap_or(f64::NAN),
                None if has_letters => f64::NAN,
                None => trimmed.parse().unwrap_or(f64::NAN),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use similar_asserts::assert_eq;

    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0.0), "0");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(-42.0), "-42");
        assert_eq!(format_number(0.25), "0.25");
        assert_eq!(format_number(f64::INFINITY), "Infinity");
        assert_eq!(format_number(f64::NEG_INFINITY), "-Infinity");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(" 12 "), 12.0);
        assert_eq!(parse_number(""), 0.0);
        assert_eq!(parse_number("0x10"), 16.0);
        assert_eq!(parse_number("1e3"), 1000.0);
        assert!(parse_number("abc").is_nan());
        assert!(parse_number("inf").is_nan());
    }
}
