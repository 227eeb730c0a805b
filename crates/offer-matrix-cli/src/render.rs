// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Comparison table output.

use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use offer_matrix::column::has_processing;
use offer_matrix::{build_columns, Cell, Column, EditPhase, MatrixView, OfferGroup, ViewPreferences};

fn heading(column: &Column) -> String {
    match column {
        Column::Offer(offer) => format!("{}\n{}", offer.insurer, offer.program_code),
        Column::Error(error) => format!("{}\nfailed: {}", error.source_file, error.message),
    }
}

fn amount(value: Option<f64>) -> String {
    value.map(|n| Cell::Amount(n).to_string()).unwrap_or_default()
}

fn amount_row(label: &str, view: &MatrixView, pick: fn(&Column) -> Option<f64>) -> Vec<String> {
    std::iter::once(label.to_string())
        .chain(view.columns.iter().map(|c| amount(pick(&c.column))))
        .collect()
}

/// Render `groups` as a table: one row per visible canonical feature, one
/// column per offer in preference order.
pub fn table(groups: &[OfferGroup], prefs: &ViewPreferences) -> String {
    let columns = build_columns(groups);
    let view = MatrixView::build(&columns, prefs, false, has_processing(groups), |_| {
        EditPhase::Clean
    });

    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_header(
            std::iter::once(String::new()).chain(view.columns.iter().map(|c| heading(&c.column))),
        );
    table.add_row(amount_row("Premium (EUR)", &view, |c| {
        c.as_offer().and_then(|o| o.premium)
    }));
    table.add_row(amount_row("Base sum (EUR)", &view, |c| {
        c.as_offer().and_then(|o| o.base_sum)
    }));
    for row in &view.rows {
        table.add_row(
            std::iter::once(row.key.clone())
                .chain(view.columns.iter().map(|c| c.cell(&row.key).to_string())),
        );
    }

    let mut out = table.to_string();
    if !view.unmapped.is_empty() {
        out.push_str("\nunmapped: ");
        out.push_str(&view.unmapped.join(", "));
    }
    if view.processing {
        out.push_str("\nstill processing: some documents have no offers yet");
    }
    out
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use offer_matrix::canon::{HIGH_TECH_DIAGNOSTICS, HOMEOPATH};

    fn groups() -> Vec<OfferGroup> {
        serde_json::from_str(
            r#"[
              {"source_file":"bta.pdf","insurer":"BTA","programs":[
                {"program_code":"B1","premium_eur":"120,50","features":{"MR":"v","Homeopāts":"nav","Akupunktūra":"v"}}]},
              {"source_file":"ergo.pdf","insurer":"ERGO","programs":[
                {"program_code":"E1","premium_eur":99,"features":{"Augsto tehnoloģiju izmeklējumi":"v"}}]},
              {"source_file":"bad.pdf","status":"failed","error":"OCR timeout"}
            ]"#,
        )
        .unwrap()
    }

    #[test]
    fn aliases_land_on_one_row_and_failures_get_a_column() {
        let out = table(&groups(), &ViewPreferences::default());
        assert_eq!(out.matches(HIGH_TECH_DIAGNOSTICS).count(), 1);
        assert!(out.contains("120.50"));
        assert!(out.contains("failed: OCR timeout"));
        assert!(out.contains("unmapped: Akupunktūra"));
    }

    #[test]
    fn hidden_rows_are_left_out() {
        let prefs = ViewPreferences {
            hidden: [HOMEOPATH].into_iter().collect(),
            ..ViewPreferences::default()
        };
        assert!(!table(&groups(), &prefs).contains(HOMEOPATH));
        assert!(table(&groups(), &ViewPreferences::default()).contains(HOMEOPATH));
    }
}
