// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Read-only projection of engine state for rendering.

use crate::canon::{self, RowGroup};
use crate::cell::Cell;
use crate::column::{present_keys, Column, ColumnKey};
use crate::engine::EditPhase;
use crate::order::ViewPreferences;

/// One feature row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowView {
    /// Canonical feature key.
    pub key: String,
    /// Section the row belongs to.
    pub group: RowGroup,
}

/// One offer column as displayed.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnView {
    /// Column data, optimistic edits included.
    pub column: Column,
    /// Whether edit and delete are offered.
    pub editable: bool,
    /// Save state of the column's edits.
    pub phase: EditPhase,
}

impl ColumnView {
    /// Identity key.
    pub fn key(&self) -> &ColumnKey {
        self.column.key()
    }

    /// Cell at row `key`. Error columns are empty everywhere.
    pub fn cell(&self, key: &str) -> Cell {
        match &self.column {
            Column::Offer(offer) => Cell::from_option(offer.feature(key)),
            Column::Error(_) => Cell::Empty,
        }
    }
}

/// Rows in catalogue order, columns in preference order.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MatrixView {
    /// Visible feature rows.
    pub rows: Vec<RowView>,
    /// Visible columns.
    pub columns: Vec<ColumnView>,
    /// Present labels outside the catalogue.
    pub unmapped: Vec<String>,
    /// Some source documents are still being extracted.
    pub processing: bool,
}

impl MatrixView {
    /// Project `columns` through `prefs`.
    pub fn build<F>(
        columns: &[Column],
        prefs: &ViewPreferences,
        editable: bool,
        processing: bool,
        phase_of: F,
    ) -> Self
    where
        F: Fn(&ColumnKey) -> EditPhase,
    {
        let present = present_keys(columns);
        let rows = canon::visible_order(&present, prefs.hidden.as_set())
            .into_iter()
            .filter_map(|key| canon::group_of(&key).map(|group| RowView { key, group }))
            .collect();

        let current: Vec<ColumnKey> = columns.iter().map(|c| c.key().clone()).collect();
        let columns = prefs
            .order
            .visible(&current)
            .iter()
            .filter_map(|key| columns.iter().find(|c| c.key() == key))
            .map(|column| ColumnView {
                editable: editable && !column.is_error(),
                phase: phase_of(column.key()),
                column: column.clone(),
            })
            .collect();

        Self {
            rows,
            columns,
            unmapped: canon::unmapped(&present),
            processing,
        }
    }

    /// Column by identity key.
    pub fn column(&self, key: &ColumnKey) -> Option<&ColumnView> {
        self.columns.iter().find(|c| c.key() == key)
    }

    /// Cell at (`column`, `row`), `None` if the column is not shown.
    pub fn cell(&self, column: &ColumnKey, row: &str) -> Option<Cell> {
        self.column(column).map(|c| c.cell(row))
    }

    /// Column keys in display order.
    pub fn column_keys(&self) -> Vec<ColumnKey> {
        self.columns.iter().map(|c| c.key().clone()).collect()
    }

    /// Row keys in display order.
    pub fn row_keys(&self) -> Vec<&str> {
        self.rows.iter().map(|r| r.key.as_str()).collect()
    }
}
