use colored::Colorize;
use comfy_table::{Cell, Table};

use journal_batch::fmt::{money, percent};
use journal_batch::models::{BatchAnalysisResult, EntryGroup, SuggestionType};

fn row_span(group: &EntryGroup) -> String {
    let (first, last) = (group.first_row(), group.last_row());
    if first == last {
        format!("row {first}")
    } else {
        format!("rows {first}-{last}")
    }
}

fn group_issues(group: &EntryGroup) -> Option<Table> {
    if group.errors.is_empty() && group.ai_suggestions.is_empty() {
        return None;
    }
    let mut table = Table::new();
    table.set_header(vec!["Row", "Kind", "Detail", "Confidence"]);
    for err in &group.errors {
        table.add_row(vec![
            Cell::new(err.original_row),
            Cell::new(err.error_type.as_str().red()),
            Cell::new(&err.message),
            Cell::new(""),
        ]);
    }
    for s in &group.ai_suggestions {
        let kind = match s.suggestion_type {
            SuggestionType::Suggestion => "SUGGESTION".cyan(),
            SuggestionType::Anomaly => "ANOMALY".yellow(),
        };
        table.add_row(vec![
            Cell::new(s.original_row),
            Cell::new(kind),
            Cell::new(&s.message),
            Cell::new(percent(s.confidence)),
        ]);
    }
    Some(table)
}

/// Human-readable report of one analyzed batch.
pub fn render_text(result: &BatchAnalysisResult) -> String {
    let mut out = String::new();
    let summary = &result.batch_summary;

    let mut table = Table::new();
    table.set_header(vec!["Entries", "Valid", "With errors", "Suggestions", "Anomalies", "New values"]);
    table.add_row(vec![
        Cell::new(summary.total_entries),
        Cell::new(summary.valid_entries.to_string().green()),
        Cell::new(summary.entries_with_errors.to_string().red()),
        Cell::new(summary.total_suggestions),
        Cell::new(summary.total_anomalies),
        Cell::new(summary.new_dimension_values),
    ]);
    out.push_str(&format!("{}\n{table}\n", "Batch summary".bold()));
    if result.timed_out {
        out.push_str(&format!(
            "{}\n",
            "Deadline reached: some entries were not analyzed.".yellow().bold()
        ));
    }

    for group in &result.entry_groups {
        let status = if group.is_valid {
            "VALID".green().bold()
        } else {
            "INVALID".red().bold()
        };
        let key = group
            .group_key
            .as_deref()
            .map(|k| format!(" [{k}]"))
            .unwrap_or_default();
        out.push_str(&format!(
            "\nEntry {}{key} ({}, {} lines), balance {}  {status}\n",
            group.group_index + 1,
            row_span(group),
            group.lines.len(),
            money(group.balance_cents),
        ));
        if let Some(issues) = group_issues(group) {
            out.push_str(&format!("{issues}\n"));
        }
    }

    if !result.new_dimension_value_suggestions.is_empty() {
        let mut table = Table::new();
        table.set_header(vec!["Dimension", "Value", "Rows"]);
        for nv in &result.new_dimension_value_suggestions {
            let rows: Vec<String> = nv.rows.iter().map(|r| r.to_string()).collect();
            table.add_row(vec![
                Cell::new(&nv.dimension),
                Cell::new(&nv.value),
                Cell::new(rows.join(", ")),
            ]);
        }
        out.push_str(&format!("\n{}\n{table}\n", "New dimension values".bold()));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use journal_batch::models::RawImportRow;
    use journal_batch::{analyze_batch, AnalyzeOptions, ReferenceSnapshot};

    #[test]
    fn test_render_text_lists_groups_and_issues() {
        colored::control::set_override(false);
        let reference = ReferenceSnapshot::default()
            .with_account("1000", "asset")
            .with_account("4000", "income")
            .with_dimension("Location", &[("BOS", Some("Boston"))]);
        let rows = vec![
            RawImportRow::new(2, [("Account", "1000"), ("Amount", "100"), ("Location", "Austin")]),
            RawImportRow::new(3, [("Account", "4000"), ("Amount", "-100"), ("Location", "")]),
            RawImportRow::new(4, [("Account", "9999"), ("Amount", "5"), ("Location", "")]),
        ];
        let result = analyze_batch(&rows, &reference, &AnalyzeOptions::default()).unwrap();
        let text = render_text(&result);
        assert!(text.contains("Entry 1 (rows 2-3, 2 lines), balance $0.00  VALID"));
        assert!(text.contains("Entry 2 (row 4, 1 lines), balance $0.05  INVALID"));
        assert!(text.contains("INVALID_ACCOUNT"));
        assert!(text.contains("New dimension values"));
        assert!(text.contains("Austin"));
    }
}
