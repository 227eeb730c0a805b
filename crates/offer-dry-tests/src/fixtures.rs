// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Builders for offer groups as the backend would deliver them.

use offer_matrix::{FeatureValue, GroupStatus, OfferGroup, ProgramOffer, RowId};

/// Builder for one source document's offers.
///
/// # Example
///
/// ```
/// use offer_dry_tests::{GroupBuilder, ProgramBuilder};
///
/// let group = GroupBuilder::new("bta.pdf", "BTA")
///     .program(ProgramBuilder::new("B1").premium(120.0).feature("MR", "v"))
///     .build();
/// assert_eq!(group.programs.len(), 1);
/// ```
pub struct GroupBuilder {
    group: OfferGroup,
}

impl GroupBuilder {
    /// Completed group for `source_file` from `insurer`.
    pub fn new(source_file: &str, insurer: &str) -> Self {
        Self {
            group: OfferGroup {
                source_file: source_file.to_string(),
                document_id: Some(format!("doc-{source_file}")),
                insurer: Some(insurer.to_string()),
                ..OfferGroup::default()
            },
        }
    }

    /// Group whose extraction failed with `message`.
    pub fn failed(source_file: &str, message: &str) -> OfferGroup {
        OfferGroup {
            source_file: source_file.to_string(),
            status: GroupStatus::Failed,
            error: Some(message.to_string()),
            ..OfferGroup::default()
        }
    }

    /// Group still being extracted.
    pub fn processing(source_file: &str) -> OfferGroup {
        OfferGroup {
            source_file: source_file.to_string(),
            status: GroupStatus::Processing,
            ..OfferGroup::default()
        }
    }

    /// Add a program.
    pub fn program(mut self, program: ProgramBuilder) -> Self {
        self.group.programs.push(program.build());
        self
    }

    /// Finish.
    pub fn build(self) -> OfferGroup {
        self.group
    }
}

/// Builder for one program offer.
pub struct ProgramBuilder {
    program: ProgramOffer,
}

impl ProgramBuilder {
    /// Program with the given code and nothing else.
    pub fn new(program_code: &str) -> Self {
        Self {
            program: ProgramOffer {
                program_code: program_code.to_string(),
                ..ProgramOffer::default()
            },
        }
    }

    /// Inline backend row id.
    pub fn row(mut self, id: u64) -> Self {
        self.program.row_id = Some(RowId(id));
        self
    }

    /// Override the group insurer.
    pub fn insurer(mut self, insurer: &str) -> Self {
        self.program.insurer = Some(insurer.to_string());
        self
    }

    /// Premium as number or text.
    pub fn premium(mut self, value: impl Into<FeatureValue>) -> Self {
        self.program.premium_eur = Some(value.into());
        self
    }

    /// Base sum as number or text.
    pub fn base_sum(mut self, value: impl Into<FeatureValue>) -> Self {
        self.program.base_sum_eur = Some(value.into());
        self
    }

    /// One feature value under a raw label.
    pub fn feature(mut self, label: &str, value: impl Into<FeatureValue>) -> Self {
        self.program
            .features
            .insert(label.to_string(), value.into());
        self
    }

    /// Finish.
    pub fn build(self) -> ProgramOffer {
        self.program
    }
}
