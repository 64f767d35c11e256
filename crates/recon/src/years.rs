//! Year canonicalization.
//!
//! Catalog year cells are free text. Normalization only pads numeric years to
//! a fixed width (`1881`, `0881`, `-055`); anything else is returned as-is and
//! carries no matching constraint. Placeholder tokens such as `187X` are NOT
//! expanded into ranges.

use std::collections::BTreeSet;

/// Pad a numeric year to 4 digits (or `-` + 3 digits for BCE years).
/// Non-numeric tokens are returned unchanged (trimmed).
pub fn normalize_year(token: &str) -> String {
    let trimmed = token.trim();
    let (negative, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };

    let numeric = !digits.is_empty()
        && digits.len() <= 4
        && digits.bytes().all(|b| b.is_ascii_digit());
    if !numeric {
        return trimmed.to_string();
    }

    if negative {
        // 4-digit BCE years keep their width; shorter ones pad to 3.
        format!("-{:0>3}", digits)
    } else {
        format!("{:0>4}", digits)
    }
}

/// Whether a (normalized) token is a usable year.
pub fn is_numeric_year(token: &str) -> bool {
    let digits = token.strip_prefix('-').unwrap_or(token);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}

/// Years a local cell admits for membership tests. Empty = no constraint.
pub fn year_constraint(token: &str) -> BTreeSet<String> {
    let normalized = normalize_year(token);
    let mut years = BTreeSet::new();
    if is_numeric_year(&normalized) {
        years.insert(normalized);
    }
    years
}

/// Reduce a knowledge-base timestamp (`1881-09-25T00:00:00Z`,
/// `-0551-01-01T00:00:00Z`, or a bare year) to a normalized year.
pub fn year_of_date(value: &str) -> Option<String> {
    let value = value.trim();
    let (negative, rest) = match value.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, value.strip_prefix('+').unwrap_or(value)),
    };
    let year: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if year.is_empty() {
        return None;
    }
    let year = year.trim_start_matches('0');
    let year = if year.is_empty() { "0" } else { year };
    if year.len() > 4 {
        return None;
    }
    let token = if negative { format!("-{year}") } else { year.to_string() };
    Some(normalize_year(&token))
}
