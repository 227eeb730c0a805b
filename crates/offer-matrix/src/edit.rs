// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! User edits: raw input ([`ChangeSet`]) and the validated, diffable patch
//! ([`OfferPatch`]) that is applied optimistically and sent to the backend.

use serde::{Deserialize, Serialize};

use crate::canon;
use crate::column::{ColumnKey, OfferColumn};
use crate::numeric::{validate_amount, ValidationError};
use crate::value::{FeatureBag, FeatureValue};

/// Fields a user changed, as typed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    /// Premium as entered (`"123,45"`).
    #[serde(default)]
    pub premium_eur: Option<String>,
    /// Base sum as entered.
    #[serde(default)]
    pub base_sum_eur: Option<String>,
    /// New insurer name.
    #[serde(default)]
    pub insurer: Option<String>,
    /// New program code.
    #[serde(default)]
    pub program_code: Option<String>,
    /// New payment method.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Feature values by any label.
    #[serde(default)]
    pub features: FeatureBag,
}

impl ChangeSet {
    /// Set the premium.
    pub fn premium(mut self, input: impl Into<String>) -> Self {
        self.premium_eur = Some(input.into());
        self
    }

    /// Set the base sum.
    pub fn base_sum(mut self, input: impl Into<String>) -> Self {
        self.base_sum_eur = Some(input.into());
        self
    }

    /// Set the insurer.
    pub fn insurer(mut self, insurer: impl Into<String>) -> Self {
        self.insurer = Some(insurer.into());
        self
    }

    /// Set the program code.
    pub fn program_code(mut self, code: impl Into<String>) -> Self {
        self.program_code = Some(code.into());
        self
    }

    /// Set one feature value.
    pub fn feature(mut self, label: impl Into<String>, value: impl Into<FeatureValue>) -> Self {
        self.features.insert(label.into(), value.into());
        self
    }

    /// Parse amounts and canonicalize feature labels.
    ///
    /// Blank insurer or program code is ignored: a column identity is never
    /// blanked by an edit.
    pub fn validate(&self) -> Result<OfferPatch, ValidationError> {
        let amount = |field: &str, input: &Option<String>| {
            input
                .as_deref()
                .map(|raw| validate_amount(field, raw))
                .transpose()
        };
        let ident = |input: &Option<String>| {
            input
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        Ok(OfferPatch {
            premium_eur: amount("premium_eur", &self.premium_eur)?,
            base_sum_eur: amount("base_sum_eur", &self.base_sum_eur)?,
            insurer: ident(&self.insurer),
            program_code: ident(&self.program_code),
            payment_method: self.payment_method.clone(),
            features: self
                .features
                .iter()
                .map(|(label, value)| (canon::canonical_key(label), value.clone()))
                .collect(),
        })
    }
}

/// Validated field changes for one offer. `None` means untouched.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OfferPatch {
    /// Premium in EUR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub premium_eur: Option<f64>,
    /// Base sum in EUR.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_sum_eur: Option<f64>,
    /// Insurer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub insurer: Option<String>,
    /// Program code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program_code: Option<String>,
    /// Payment method.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payment_method: Option<String>,
    /// Feature values by canonical key.
    #[serde(default, skip_serializing_if = "FeatureBag::is_empty")]
    pub features: FeatureBag,
}

fn changed<T: PartialEq + Clone>(new: Option<&T>, old: Option<&T>) -> Option<T> {
    match new {
        Some(v) if old != Some(v) => Some(v.clone()),
        _ => None,
    }
}

impl OfferPatch {
    /// True when nothing would change.
    pub fn is_empty(&self) -> bool {
        self.premium_eur.is_none()
            && self.base_sum_eur.is_none()
            && self.insurer.is_none()
            && self.program_code.is_none()
            && self.payment_method.is_none()
            && self.features.is_empty()
    }

    /// True if insurer or program code is touched.
    pub fn changes_identity(&self) -> bool {
        self.insurer.is_some() || self.program_code.is_some()
    }

    /// Only the fields that differ from `base`.
    pub fn diff(&self, base: &OfferColumn) -> Self {
        let features = self
            .features
            .iter()
            .filter(|(key, value)| match base.feature(key) {
                Some(current) => current != *value,
                None => !value.is_missing(),
            })
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        Self {
            premium_eur: changed(self.premium_eur.as_ref(), base.premium.as_ref()),
            base_sum_eur: changed(self.base_sum_eur.as_ref(), base.base_sum.as_ref()),
            insurer: changed(self.insurer.as_ref(), Some(&base.insurer)),
            program_code: changed(self.program_code.as_ref(), Some(&base.program_code)),
            payment_method: changed(self.payment_method.as_ref(), base.payment_method.as_ref()),
            features,
        }
    }

    /// Fold a newer patch into this one; newer fields win.
    pub fn merge(&mut self, newer: &Self) {
        if newer.premium_eur.is_some() {
            self.premium_eur = newer.premium_eur;
        }
        if newer.base_sum_eur.is_some() {
            self.base_sum_eur = newer.base_sum_eur;
        }
        if newer.insurer.is_some() {
            self.insurer.clone_from(&newer.insurer);
        }
        if newer.program_code.is_some() {
            self.program_code.clone_from(&newer.program_code);
        }
        if newer.payment_method.is_some() {
            self.payment_method.clone_from(&newer.payment_method);
        }
        self.features
            .extend(newer.features.iter().map(|(k, v)| (k.clone(), v.clone())));
    }

    /// Identity the column would have after this patch. Unchanged identity
    /// keeps the current key, including any duplicate suffix.
    pub fn identity_after(&self, column: &OfferColumn) -> ColumnKey {
        if !self.changes_identity() {
            return column.key.clone();
        }
        ColumnKey::new(
            &column.source_file,
            self.insurer.as_deref().unwrap_or(&column.insurer),
            self.program_code.as_deref().unwrap_or(&column.program_code),
        )
    }

    /// Write the patch into `column`, rekeying it if the identity changed.
    ///
    /// Feature keys are canonical; raw aliases of the same key are removed so
    /// a stale alias cannot shadow the new value.
    pub fn apply_to(&self, column: &mut OfferColumn) {
        let key = self.identity_after(column);
        if let Some(v) = self.premium_eur {
            column.premium = Some(v);
        }
        if let Some(v) = self.base_sum_eur {
            column.base_sum = Some(v);
        }
        if let Some(v) = &self.insurer {
            column.insurer.clone_from(v);
        }
        if let Some(v) = &self.program_code {
            column.program_code.clone_from(v);
        }
        if let Some(v) = &self.payment_method {
            column.payment_method = Some(v.clone());
        }
        for (canonical, value) in &self.features {
            column
                .features
                .retain(|raw, _| raw == canonical || canon::canonicalize(raw) != canonical);
            column.features.insert(canonical.clone(), value.clone());
        }
        column.key = key;
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::canon::HIGH_TECH_DIAGNOSTICS;
    use crate::column::{build_columns, OfferGroup};

    fn column() -> OfferColumn {
        let group: OfferGroup = serde_json::from_str(
            r#"{"source_file":"a.pdf","insurer":"BTA","programs":[
                {"program_code":"P1","premium_eur":100,"features":{"MR":"v","Homeopāts":true}}]}"#,
        )
        .unwrap();
        build_columns(&[group])
            .remove(0)
            .as_offer()
            .cloned()
            .unwrap()
    }

    #[test]
    fn validation_parses_amounts_and_canonicalizes_labels() {
        let patch = ChangeSet::default()
            .premium("123,45")
            .feature("mr", "nav")
            .validate()
            .unwrap();
        assert_eq!(patch.premium_eur, Some(123.45));
        assert!(patch.features.contains_key(HIGH_TECH_DIAGNOSTICS));
    }

    #[test]
    fn validation_rejects_bad_amounts() {
        let err = ChangeSet::default().base_sum("lots").validate().unwrap_err();
        assert_eq!(err.field, "base_sum_eur");
    }

    #[test]
    fn blank_identity_fields_are_ignored() {
        let patch = ChangeSet::default().insurer("  ").validate().unwrap();
        assert!(patch.is_empty());
    }

    #[test]
    fn diff_drops_unchanged_fields() {
        let col = column();
        let patch = ChangeSet::default()
            .premium("100")
            .insurer("BTA")
            .feature("MR", "v")
            .feature("Sporta ārsts", FeatureValue::Missing)
            .validate()
            .unwrap();
        assert!(patch.diff(&col).is_empty());

        let patch = ChangeSet::default().premium("100,5").validate().unwrap();
        assert_eq!(patch.diff(&col).premium_eur, Some(100.5));
    }

    #[test]
    fn apply_replaces_aliases_and_rekeys() {
        let mut col = column();
        let patch = ChangeSet::default()
            .program_code("P9")
            .feature("Augsto tehnoloģiju izmeklējumi", "nav")
            .validate()
            .unwrap();
        assert_eq!(patch.identity_after(&col).as_str(), "a.pdf::BTA::P9");
        patch.apply_to(&mut col);
        assert_eq!(col.key.as_str(), "a.pdf::BTA::P9");
        assert!(!col.features.contains_key("MR"));
        assert_eq!(
            col.feature("MR"),
            Some(&FeatureValue::Text("nav".into()))
        );
    }

    #[test]
    fn merge_prefers_newer_fields() {
        let mut older = ChangeSet::default()
            .premium("1")
            .insurer("BTA")
            .validate()
            .unwrap();
        let newer = ChangeSet::default().premium("2").validate().unwrap();
        older.merge(&newer);
        assert_eq!(older.premium_eur, Some(2.0));
        assert_eq!(older.insurer.as_deref(), Some("BTA"));
    }

    #[test]
    fn patch_serializes_only_touched_fields() {
        let patch = ChangeSet::default().premium("5").validate().unwrap();
        assert_eq!(serde_json::to_string(&patch).unwrap(), r#"{"premium_eur":5.0}"#);
    }
}
