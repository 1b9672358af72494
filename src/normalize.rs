//! Field normalizers: pure functions from a raw cell to a canonical value,
//! with `None` standing for an absent field.

use chrono::NaiveDate;
use once_cell::sync::Lazy;
use regex::Regex;

use crate::constants::{DATE_LAYOUTS, MISSING_TOKENS, PHONE_COUNTRY_CODE, PHONE_DIGITS};

static NON_DIGIT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\D").expect("static regex"));

/// Trimmed cell contents, or `None` when the cell is missing, blank, or one
/// of the upstream "no value" tokens.
pub fn present(raw: Option<&str>) -> Option<&str> {
    let value = raw?.trim();
    if value.is_empty() || MISSING_TOKENS.contains(&value) {
        None
    } else {
        Some(value)
    }
}

/// Trimmed owned text, absent when `present` says so
pub fn trim_text(raw: Option<&str>) -> Option<String> {
    present(raw).map(str::to_string)
}

/// Canonical phone number `+91-XXXXXXXXXX`.
///
/// Every non-digit is stripped and only the last ten digits are kept. Inputs
/// with fewer than ten digits still produce a (shorter) prefixed number.
pub fn normalize_phone(raw: Option<&str>) -> Option<String> {
    let raw = present(raw)?;
    let digits: Vec<char> = NON_DIGIT.replace_all(raw, "").chars().collect();
    let start = digits.len().saturating_sub(PHONE_DIGITS);
    let tail: String = digits[start..].iter().collect();
    Some(format!("+{PHONE_COUNTRY_CODE}-{tail}"))
}

/// Parse a calendar date using the first matching layout of `DATE_LAYOUTS`.
/// The year must be written with exactly four digits.
pub fn parse_date(raw: Option<&str>) -> Option<NaiveDate> {
    let raw = present(raw)?;
    DATE_LAYOUTS
        .iter()
        .filter(|layout| has_four_digit_year(raw, layout))
        .find_map(|layout| NaiveDate::parse_from_str(raw, layout).ok())
}

// chrono's %Y also accepts one to three digits
fn has_four_digit_year(raw: &str, layout: &str) -> bool {
    let not_digit = |c: char| !c.is_ascii_digit();
    let year = if layout.starts_with("%Y") {
        raw.split(not_digit).next()
    } else {
        raw.rsplit(not_digit).next()
    };
    year.map_or(false, |digits| digits.len() == 4)
}

/// Trimmed, title-cased category
pub fn normalize_category(raw: Option<&str>) -> Option<String> {
    present(raw).map(title_case)
}

/// Upper-case the first letter of every word and lower-case the rest. A word
/// starts after any character that is not a letter.
pub fn title_case(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut prev_is_letter = false;
    for ch in value.chars() {
        if ch.is_alphabetic() {
            if prev_is_letter {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_is_letter = true;
        } else {
            out.push(ch);
            prev_is_letter = false;
        }
    }
    out
}
