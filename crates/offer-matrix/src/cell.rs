// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Comparison-ready classification of feature values.

use std::fmt;

use crate::numeric::parse_amount;
use crate::value::FeatureValue;

const INCLUDED: &[&str] = &["v", "✓", "✔", "+", "jā", "ja", "yes", "y", "ir", "true", "iekļauts"];
const EXCLUDED: &[&str] = &["-", "–", "—", "x", "nē", "ne", "no", "n", "nav", "false", "neiekļauts"];

/// A matrix cell as the UI should present it.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    /// Benefit is covered (rendered as a checkmark).
    Included,
    /// Benefit is explicitly not covered.
    Excluded,
    /// Limit, count or price.
    Amount(f64),
    /// Anything else, verbatim.
    Text(String),
    /// No value for this offer.
    Empty,
}

impl Cell {
    /// Classify a raw feature value.
    pub fn from_value(value: &FeatureValue) -> Self {
        match value {
            FeatureValue::Bool(true) => Self::Included,
            FeatureValue::Bool(false) => Self::Excluded,
            FeatureValue::Number(n) => Self::Amount(*n),
            FeatureValue::Missing => Self::Empty,
            FeatureValue::Text(text) => {
                let trimmed = text.trim();
                let lower = trimmed.to_lowercase();
                if trimmed.is_empty() {
                    Self::Empty
                } else if INCLUDED.contains(&lower.as_str()) {
                    Self::Included
                } else if EXCLUDED.contains(&lower.as_str()) {
                    Self::Excluded
                } else if let Some(n) = parse_amount(trimmed) {
                    Self::Amount(n)
                } else {
                    Self::Text(trimmed.to_string())
                }
            }
        }
    }

    /// Classify an optional value (absent keys render as [`Cell::Empty`]).
    pub fn from_option(value: Option<&FeatureValue>) -> Self {
        value.map_or(Self::Empty, Self::from_value)
    }

    /// True for [`Cell::Included`].
    pub fn is_checkmark(&self) -> bool {
        matches!(self, Self::Included)
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Included => f.write_str("✓"),
            Self::Excluded => f.write_str("–"),
            Self::Amount(n) if n.fract() == 0.0 => write!(f, "{n:.0}"),
            Self::Amount(n) => write!(f, "{n:.2}"),
            Self::Text(t) => f.write_str(t),
            Self::Empty => Ok(()),
        }
    }
}
