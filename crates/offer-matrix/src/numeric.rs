// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Lenient amount parsing for user-entered and extracted money values.
//!
//! Accepts `"123,45"`, `"1 234,50 €"`, `"1,234.50"`, `"EUR 99"`. When both
//! `.` and `,` occur the later one is the decimal separator; a single `,` is a
//! decimal comma; a separator that repeats is a thousand separator.

use thiserror::Error;

/// Rejected user input. Never leaves the client.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {input:?} is not a number")]
pub struct ValidationError {
    /// Field that failed validation.
    pub field: String,
    /// Raw input as entered.
    pub input: String,
}

const CURRENCY_CODES: &[&str] = &["eur", "usd", "gbp"];

/// Parse an amount, or `None` if nothing numeric remains after normalization.
pub fn parse_amount(input: &str) -> Option<f64> {
    let mut s: String = input
        .chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '€' | '$' | '£' | '\'' | '’'))
        .collect::<String>()
        .to_lowercase();
    for code in CURRENCY_CODES {
        s = s.replace(code, "");
    }
    if s.is_empty() || !s.chars().all(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-' | '+')) {
        return None;
    }

    let dots = s.matches('.').count();
    let commas = s.matches(',').count();
    let normalized = match (dots, commas) {
        (0, 0) => s,
        (_, 0) if dots > 1 => s.replace('.', ""),
        (_, 0) => s,
        (0, 1) => s.replace(',', "."),
        (0, _) => s.replace(',', ""),
        _ => {
            let last_dot = s.rfind('.')?;
            let last_comma = s.rfind(',')?;
            let (decimal, thousands) = if last_dot > last_comma {
                ('.', ',')
            } else {
                (',', '.')
            };
            if s.matches(decimal).count() > 1 {
                return None;
            }
            s.replace(thousands, "").replace(decimal, ".")
        }
    };

    normalized.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse `input` for `field`, mapping failure to a [`ValidationError`].
pub fn validate_amount(field: &str, input: &str) -> Result<f64, ValidationError> {
    parse_amount(input).ok_or_else(|| ValidationError {
        field: field.to_string(),
        input: input.to_string(),
    })
}
