// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Column model: backend offer groups flattened into typed matrix columns.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

use crate::canon;
use crate::numeric::parse_amount;
use crate::value::{FeatureBag, FeatureValue};

/// Backend row identifier of a persisted offer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(pub u64);

impl fmt::Display for RowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Column identity: `sourceFile::insurer::programCode`.
///
/// Stable for as long as insurer and program code do not change. Callers must
/// re-derive keys after every refresh rather than hold on to column objects.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnKey(String);

impl ColumnKey {
    /// Key for an offer column.
    pub fn new(source_file: &str, insurer: &str, program_code: &str) -> Self {
        Self(format!("{source_file}::{insurer}::{program_code}"))
    }

    /// Key for the error column of a failed source document.
    pub fn error(source_file: &str) -> Self {
        Self(format!("{source_file}::!error"))
    }

    /// Borrow the key text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn with_suffix(&self, n: usize) -> Self {
        Self(format!("{}#{n}", self.0))
    }
}

impl fmt::Display for ColumnKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ColumnKey {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ColumnKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// Extraction state of one source document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupStatus {
    /// Offers extracted.
    #[default]
    #[serde(alias = "done")]
    Completed,
    /// Extraction still running.
    #[serde(alias = "pending", alias = "running")]
    Processing,
    /// Extraction failed.
    #[serde(alias = "error")]
    Failed,
}

/// One program offered in a source document, as delivered by the backend.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProgramOffer {
    /// Insurer override; falls back to the group insurer.
    #[serde(default)]
    pub insurer: Option<String>,
    /// Program code.
    pub program_code: String,
    /// Premium (number or text such as `"123,45 €"`).
    #[serde(default)]
    pub premium_eur: Option<FeatureValue>,
    /// Base sum insured.
    #[serde(default)]
    pub base_sum_eur: Option<FeatureValue>,
    /// Payment method.
    #[serde(default)]
    pub payment_method: Option<String>,
    /// Extracted features.
    #[serde(default)]
    pub features: FeatureBag,
    /// Backend row id when already known.
    #[serde(default)]
    pub row_id: Option<RowId>,
}

/// All offers extracted from one source document.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OfferGroup {
    /// Source document file name.
    pub source_file: String,
    /// Backend document id.
    #[serde(default)]
    pub document_id: Option<String>,
    /// Insurer for every program unless overridden.
    #[serde(default)]
    pub insurer: Option<String>,
    /// Extraction state.
    #[serde(default)]
    pub status: GroupStatus,
    /// Failure reason for [`GroupStatus::Failed`].
    #[serde(default)]
    pub error: Option<String>,
    /// Programs found in the document.
    #[serde(default)]
    pub programs: Vec<ProgramOffer>,
}

/// A column carrying offer data.
#[derive(Debug, Clone, PartialEq)]
pub struct OfferColumn {
    /// Identity key.
    pub key: ColumnKey,
    /// Source document file name.
    pub source_file: String,
    /// Backend document id.
    pub document_id: Option<String>,
    /// Insurer name.
    pub insurer: String,
    /// Program code.
    pub program_code: String,
    /// Premium in EUR.
    pub premium: Option<f64>,
    /// Base sum in EUR.
    pub base_sum: Option<f64>,
    /// Payment method.
    pub payment_method: Option<String>,
    /// Raw feature bag.
    pub features: FeatureBag,
    /// Backend row id, absent until resolved.
    pub row_id: Option<RowId>,
}

impl OfferColumn {
    /// Resolve a feature by canonical key (see [`canon::lookup`]).
    pub fn feature(&self, key: &str) -> Option<&FeatureValue> {
        canon::lookup(&self.features, key)
    }

    /// Identity key derived from the current triple (without duplicate suffix).
    pub fn derived_key(&self) -> ColumnKey {
        ColumnKey::new(&self.source_file, &self.insurer, &self.program_code)
    }
}

/// Placeholder column for a source document whose extraction failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorColumn {
    /// Identity key.
    pub key: ColumnKey,
    /// Source document file name.
    pub source_file: String,
    /// Failure reason.
    pub message: String,
}

/// A matrix column.
#[derive(Debug, Clone, PartialEq)]
pub enum Column {
    /// Offer data.
    Offer(OfferColumn),
    /// Failed extraction; no features, not editable.
    Error(ErrorColumn),
}

impl Column {
    /// Identity key.
    pub fn key(&self) -> &ColumnKey {
        match self {
            Self::Offer(c) => &c.key,
            Self::Error(c) => &c.key,
        }
    }

    /// Source document file name.
    pub fn source_file(&self) -> &str {
        match self {
            Self::Offer(c) => &c.source_file,
            Self::Error(c) => &c.source_file,
        }
    }

    /// True for error columns.
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    /// Offer data, if any.
    pub fn as_offer(&self) -> Option<&OfferColumn> {
        match self {
            Self::Offer(c) => Some(c),
            Self::Error(_) => None,
        }
    }

    /// Mutable offer data, if any.
    pub fn as_offer_mut(&mut self) -> Option<&mut OfferColumn> {
        match self {
            Self::Offer(c) => Some(c),
            Self::Error(_) => None,
        }
    }

    /// Backend row id of an offer column.
    pub fn row_id(&self) -> Option<RowId> {
        self.as_offer().and_then(|c| c.row_id)
    }
}

fn amount_of(value: Option<&FeatureValue>, field: &str, key: &ColumnKey) -> Option<f64> {
    match value? {
        FeatureValue::Number(n) => Some(*n),
        FeatureValue::Text(t) => {
            let parsed = parse_amount(t);
            if parsed.is_none() {
                debug!(%key, field, input = %t, "unparsable amount dropped");
            }
            parsed
        }
        FeatureValue::Bool(_) | FeatureValue::Missing => None,
    }
}

/// Flatten offer groups into columns, in arrival order.
///
/// Failed groups yield one error column each; groups still processing yield
/// nothing. Duplicate identity triples get a `#n` suffix so keys stay unique.
pub fn build_columns(groups: &[OfferGroup]) -> Vec<Column> {
    let mut seen: HashMap<ColumnKey, usize> = HashMap::new();
    let mut unique = |base: ColumnKey| -> ColumnKey {
        let n = seen.entry(base.clone()).or_insert(0);
        *n += 1;
        if *n == 1 {
            base
        } else {
            base.with_suffix(*n)
        }
    };

    let mut columns = Vec::new();
    for group in groups {
        match group.status {
            GroupStatus::Processing => continue,
            GroupStatus::Failed => {
                columns.push(Column::Error(ErrorColumn {
                    key: unique(ColumnKey::error(&group.source_file)),
                    source_file: group.source_file.clone(),
                    message: group
                        .error
                        .clone()
                        .unwrap_or_else(|| "extraction failed".to_string()),
                }));
            }
            GroupStatus::Completed => {
                for program in &group.programs {
                    let insurer = program
                        .insurer
                        .clone()
                        .or_else(|| group.insurer.clone())
                        .unwrap_or_default();
                    let key = unique(ColumnKey::new(
                        &group.source_file,
                        &insurer,
                        &program.program_code,
                    ));
                    let premium = amount_of(program.premium_eur.as_ref(), "premium_eur", &key);
                    let base_sum = amount_of(program.base_sum_eur.as_ref(), "base_sum_eur", &key);
                    columns.push(Column::Offer(OfferColumn {
                        key,
                        source_file: group.source_file.clone(),
                        document_id: group.document_id.clone(),
                        insurer,
                        program_code: program.program_code.clone(),
                        premium,
                        base_sum,
                        payment_method: program.payment_method.clone(),
                        features: program.features.clone(),
                        row_id: program.row_id,
                    }));
                }
            }
        }
    }
    columns
}

/// Canonical keys with a non-missing value in at least one offer column.
/// Error columns never contribute.
pub fn present_keys(columns: &[Column]) -> BTreeSet<String> {
    columns
        .iter()
        .filter_map(Column::as_offer)
        .flat_map(|c| c.features.iter())
        .filter(|(_, v)| !v.is_missing())
        .map(|(raw, _)| canon::canonical_key(raw))
        .collect()
}

/// True while any group is still being extracted.
pub fn has_processing(groups: &[OfferGroup]) -> bool {
    groups.iter().any(|g| g.status == GroupStatus::Processing)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use crate::canon::HIGH_TECH_DIAGNOSTICS;

    fn group(json: &str) -> OfferGroup {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn programs_become_keyed_columns() {
        let g = group(
            r#"{"source_file":"a.pdf","insurer":"BTA","programs":[
                {"program_code":"P1","premium_eur":"123,45","features":{"MR":"v"}},
                {"program_code":"P2","insurer":"ERGO","premium_eur":99,"row_id":7}
            ]}"#,
        );
        let cols = build_columns(&[g]);
        assert_eq!(cols.len(), 2);
        assert_eq!(cols[0].key().as_str(), "a.pdf::BTA::P1");
        assert_eq!(cols[1].key().as_str(), "a.pdf::ERGO::P2");
        let first = cols[0].as_offer().unwrap();
        assert_eq!(first.premium, Some(123.45));
        assert_eq!(first.row_id, None);
        assert_eq!(cols[1].row_id(), Some(RowId(7)));
        assert!(first.feature(HIGH_TECH_DIAGNOSTICS).is_some());
    }

    #[test]
    fn failed_groups_become_error_columns_without_features() {
        let ok = group(
            r#"{"source_file":"a.pdf","insurer":"BTA","programs":[
                {"program_code":"P1","features":{"Homeopāts":true}}]}"#,
        );
        let failed = group(
            r#"{"source_file":"b.pdf","status":"failed","error":"OCR timeout",
                "programs":[{"program_code":"X","features":{"Sporta ārsts":true}}]}"#,
        );
        let cols = build_columns(&[ok, failed]);
        assert_eq!(cols.len(), 2);
        assert!(cols[1].is_error());
        assert_eq!(cols[1].key().as_str(), "b.pdf::!error");
        let present = present_keys(&cols);
        assert!(present.contains("Homeopāts"));
        assert!(!present.contains("Sporta ārsts"));
    }

    #[test]
    fn processing_groups_are_skipped_and_reported() {
        let g = group(r#"{"source_file":"c.pdf","status":"processing"}"#);
        assert!(build_columns(std::slice::from_ref(&g)).is_empty());
        assert!(has_processing(&[g]));
    }

    #[test]
    fn duplicate_triples_get_suffixes() {
        let g = group(
            r#"{"source_file":"a.pdf","insurer":"BTA","programs":[
                {"program_code":"P1"},{"program_code":"P1"},{"program_code":"P1"}]}"#,
        );
        let keys: Vec<_> = build_columns(&[g])
            .iter()
            .map(|c| c.key().to_string())
            .collect();
        assert_eq!(keys, vec!["a.pdf::BTA::P1", "a.pdf::BTA::P1#2", "a.pdf::BTA::P1#3"]);
    }

    #[test]
    fn missing_values_do_not_count_as_present() {
        let g = group(
            r#"{"source_file":"a.pdf","insurer":"BTA","programs":[
                {"program_code":"P1","features":{"Homeopāts":null,"Optika":""}}]}"#,
        );
        assert!(present_keys(&build_columns(&[g])).is_empty());
    }
}
