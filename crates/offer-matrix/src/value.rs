// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Feature values as delivered by the extraction backend.

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Raw label → value mapping for one offer. Labels are free text and may be
/// historical aliases or canonical keys.
pub type FeatureBag = BTreeMap<String, FeatureValue>;

/// One feature cell value.
///
/// On the wire a value is a bool, number, string, `null`, or an object
/// `{"value": ...}` wrapping one of those. Anything else is kept as its JSON
/// text so nothing extracted is silently lost.
#[derive(Debug, Clone, PartialEq, Serialize, Default)]
#[serde(untagged)]
pub enum FeatureValue {
    /// Yes/no flag.
    Bool(bool),
    /// Numeric amount or count.
    Number(f64),
    /// Free text.
    Text(String),
    /// Explicitly absent.
    #[default]
    Missing,
}

impl FeatureValue {
    /// True for [`FeatureValue::Missing`] and for blank text.
    pub fn is_missing(&self) -> bool {
        match self {
            Self::Missing => true,
            Self::Text(s) => s.trim().is_empty(),
            Self::Bool(_) | Self::Number(_) => false,
        }
    }

    /// Convert a JSON value, unwrapping `{"value": ...}` envelopes.
    pub fn from_json(value: &serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Missing,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_f64()
                .map_or_else(|| Self::Text(n.to_string()), Self::Number),
            Value::String(s) => Self::Text(s.clone()),
            Value::Object(map) => match map.get("value") {
                Some(inner) => Self::from_json(inner),
                None => Self::Text(value.to_string()),
            },
            Value::Array(_) => Self::Text(value.to_string()),
        }
    }
}

impl<'de> Deserialize<'de> for FeatureValue {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = serde_json::Value::deserialize(deserializer)?;
        Ok(Self::from_json(&raw))
    }
}

impl From<bool> for FeatureValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<f64> for FeatureValue {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for FeatureValue {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn wire_shapes_decode() {
        let bag: FeatureBag = serde_json::from_str(
            r#"{"a": true, "b": 12.5, "c": "v", "d": {"value": "wrapped"},
                "e": null, "f": {"value": {"value": 3}}, "g": [1, 2]}"#,
        )
        .unwrap();
        assert_eq!(bag["a"], FeatureValue::Bool(true));
        assert_eq!(bag["b"], FeatureValue::Number(12.5));
        assert_eq!(bag["c"], FeatureValue::Text("v".into()));
        assert_eq!(bag["d"], FeatureValue::Text("wrapped".into()));
        assert_eq!(bag["e"], FeatureValue::Missing);
        assert_eq!(bag["f"], FeatureValue::Number(3.0));
        assert_eq!(bag["g"], FeatureValue::Text("[1,2]".into()));
    }

    #[test]
    fn blank_text_counts_as_missing() {
        assert!(FeatureValue::Text("  ".into()).is_missing());
        assert!(!FeatureValue::Bool(false).is_missing());
    }

    #[test]
    fn serializes_untagged() {
        let json = serde_json::to_string(&vec![
            FeatureValue::Bool(true),
            FeatureValue::Number(1.5),
            FeatureValue::Text("x".into()),
            FeatureValue::Missing,
        ])
        .unwrap();
        assert_eq!(json, r#"[true,1.5,"x",null]"#);
    }
}
