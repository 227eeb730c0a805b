// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Local snapshot of matrix view preferences (column order + hidden rows),
//! namespaced by a human-chosen company/context name.

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigService, ConfigStore};

/// Prefix shared by every matrix preference key.
pub const PREFS_KEY_PREFIX: &str = "offer-matrix";

/// Saved preferences for one matrix context.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct MatrixPrefs {
    /// Column identity keys in display order.
    #[serde(default)]
    pub column_order: Vec<String>,
    /// Canonical feature keys hidden from the matrix.
    #[serde(default)]
    pub hidden_features: Vec<String>,
}

impl MatrixPrefs {
    /// True when neither order nor hidden rows are recorded.
    pub fn is_empty(&self) -> bool {
        self.column_order.is_empty() && self.hidden_features.is_empty()
    }
}

/// Storage key for the given company/context name (`offer-matrix.<slug>`).
pub fn storage_key(context: &str) -> String {
    format!("{PREFS_KEY_PREFIX}.{}", slug(context))
}

/// Lowercase, keep alphanumerics (Unicode included), fold everything else into single dashes.
fn slug(context: &str) -> String {
    let mut out = String::with_capacity(context.len());
    let mut dash = false;
    for ch in context.trim().chars() {
        if ch.is_alphanumeric() {
            out.extend(ch.to_lowercase());
            dash = false;
        } else if !dash && !out.is_empty() {
            out.push('-');
            dash = true;
        }
    }
    while out.ends_with('-') {
        out.pop();
    }
    if out.is_empty() {
        out.push_str("default");
    }
    out
}

/// Port for loading/saving matrix preferences.
pub trait PrefsPort {
    /// Load preferences for `context` (None if missing or unreadable).
    fn load_prefs(&self, context: &str) -> Option<MatrixPrefs>;
    /// Persist preferences for `context`.
    fn save_prefs(&self, context: &str, prefs: &MatrixPrefs) -> Result<(), ConfigError>;
}

impl<S> PrefsPort for ConfigService<S>
where
    S: ConfigStore,
{
    fn load_prefs(&self, context: &str) -> Option<MatrixPrefs> {
        self.load::<MatrixPrefs>(&storage_key(context)).ok().flatten()
    }

    fn save_prefs(&self, context: &str, prefs: &MatrixPrefs) -> Result<(), ConfigError> {
        self.save(&storage_key(context), prefs)
    }
}
