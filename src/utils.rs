//! Small helpers shared by conversions and the builtin functions.

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::{Decimal, RoundingStrategy};

/// Significant digits kept by arithmetic that can produce unbounded expansions.
pub const DECIMAL_PRECISION: u32 = 28;

/// Rounds to [`DECIMAL_PRECISION`] significant digits, half-even.
pub fn precise(value: Decimal) -> Decimal {
    value
        .round_sf_with_strategy(DECIMAL_PRECISION, RoundingStrategy::MidpointNearestEven)
        .unwrap_or(value)
}

/// Formats a decimal without trailing fractional zeros.
pub fn format_decimal(value: &Decimal) -> String {
    value.normalize().to_string()
}

/// Rounds to `digits` places, where negative `digits` rounds to tens, hundreds...
pub fn decimal_round(value: Decimal, digits: i64, strategy: RoundingStrategy) -> Option<Decimal> {
    if digits >= 0 {
        let dp = digits.min(DECIMAL_PRECISION as i64) as u32;
        return Some(value.round_dp_with_strategy(dp, strategy));
    }
    let exponent = u32::try_from(-digits).ok()?;
    if exponent > DECIMAL_PRECISION {
        return Some(Decimal::ZERO);
    }
    let factor = Decimal::from_i128_with_scale(10i128.checked_pow(exponent)?, 0);
    let scaled = value.checked_div(factor)?.round_dp_with_strategy(0, strategy);
    scaled.checked_mul(factor)
}

/// Raises `number` to `power`. Goes through `f64` so fractional powers work.
pub fn decimal_pow(number: Decimal, power: Decimal) -> Option<Decimal> {
    let result = number.to_f64()?.powf(power.to_f64()?);
    if !result.is_finite() {
        return None;
    }
    Decimal::from_f64(result).map(precise)
}

/// Encodes text for inclusion in a URL query string, spaces as `%20`.
pub fn urlquote(text: &str) -> String {
    url::form_urlencoded::byte_serialize(text.as_bytes()).collect::<String>().replace('+', "%20")
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn is_emoji_char(c: char) -> bool {
    matches!(
        c as u32,
        0x20A0..=0x20CF | 0x2600..=0x27BF | 0x1F300..=0x1F5FF | 0x1F600..=0x1F64F | 0x1F680..=0x1F6FF | 0x1F900..=0x1F9FF
    )
}

/// Splits text into words on non-word characters. Emoji are words of their own.
pub fn tokenize(text: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    for c in text.chars() {
        if is_emoji_char(c) {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            words.push(c.to_string());
        } else if is_word_char(c) {
            current.push(c);
        } else if !current.is_empty() {
            words.push(std::mem::take(&mut current));
        }
    }
    if !current.is_empty() {
        words.push(current);
    }
    words
}

/// Python-style slice: negative indexes count from the end, out of range clamps.
pub fn slice<T>(items: &[T], start: Option<i64>, stop: Option<i64>) -> &[T] {
    let len = items.len() as i64;
    let clamp = |i: i64| if i < 0 { (len + i).max(0) } else { i.min(len) };
    let start = start.map(clamp).unwrap_or(0);
    let stop = stop.map(clamp).unwrap_or(len);
    if start >= stop {
        &[]
    } else {
        &items[start as usize..stop as usize]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[test]
    fn slices_like_python() {
        let items = [1, 2, 3, 4];
        assert_eq!(slice(&items, None, None), &[1, 2, 3, 4]);
        assert_eq!(slice(&items, Some(1), Some(3)), &[2, 3]);
        assert_eq!(slice(&items, Some(1), Some(-1)), &[2, 3]);
        assert_eq!(slice(&items, Some(-3), Some(-1)), &[2, 3]);
        assert!(slice(&items, Some(3), Some(2)).is_empty());
        assert!(slice(&items, Some(7), Some(9)).is_empty());
    }

    #[test]
    fn quotes_reserved_characters() {
        assert_eq!(urlquote(""), "");
        assert_eq!(urlquote("?!=Jow&Flow"), "%3F%21%3DJow%26Flow");
        assert_eq!(urlquote("a b"), "a%20b");
    }

    #[test]
    fn tokenizes_on_non_word_characters() {
        assert_eq!(tokenize("this is a sentence"), vec!["this", "is", "a", "sentence"]);
        assert_eq!(tokenize("  hey  \t@ there  "), vec!["hey", "there"]);
        assert_eq!(tokenize("واحد اثنين ثلاثة"), vec!["واحد", "اثنين", "ثلاثة"]);
        assert_eq!(tokenize("ok👍cool"), vec!["ok", "👍", "cool"]);
    }

    #[test]
    fn rounds_to_negative_digits() {
        let rounded = decimal_round(dec("1234.5678"), -2, RoundingStrategy::MidpointAwayFromZero).unwrap();
        assert_eq!(format_decimal(&rounded), "1200");
        let rounded = decimal_round(dec("1234.5678"), 2, RoundingStrategy::MidpointAwayFromZero).unwrap();
        assert_eq!(rounded, dec("1234.57"));
    }

    #[test]
    fn pow_handles_fractional_and_negative_powers() {
        assert_eq!(decimal_pow(dec("4"), dec("0.5")), Some(dec("2")));
        assert_eq!(decimal_pow(dec("4"), dec("-1")), Some(dec("0.25")));
        assert_eq!(decimal_pow(dec("2"), dec("10")), Some(dec("1024")));
    }

    #[test]
    fn formats_without_trailing_zeros() {
        assert_eq!(format_decimal(&dec("1.500")), "1.5");
        assert_eq!(format_decimal(&dec("100")), "100");
        assert_eq!(format_decimal(&dec("-0.0")), "0");
    }
}
