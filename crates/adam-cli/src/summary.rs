use std::cmp::Ordering;

use comfy_table::modifiers::{UTF8_ROUND_CORNERS, UTF8_SOLID_INNER_BORDERS};
use comfy_table::presets::{UTF8_FULL, UTF8_FULL_CONDENSED};
use comfy_table::{Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};

use adam_model::{DataQualityIssue, IssueSeverity};

use adam_cli::types::{RunResult, StageOutcome, StageStatus};

/// Keys listed per issue before the rest are counted.
const MAX_KEYS_SHOWN: usize = 3;

pub fn print_summary(result: &RunResult) {
    println!("SDTM: {}", result.sdtm_dir.display());
    println!("Output: {}", result.output_dir.display());
    if let Some(path) = &result.manifest {
        println!("Manifest: {}", path.display());
    }
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Dataset"),
        header_cell("Status"),
        header_cell("Records"),
        header_cell("Errors"),
        header_cell("Warnings"),
        header_cell("Notes"),
        header_cell("Time (ms)"),
    ]);
    apply_summary_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    for index in 2..=6 {
        align_column(&mut table, index, CellAlignment::Right);
    }
    let mut total_records = 0usize;
    for outcome in &result.outcomes {
        total_records += outcome.records.unwrap_or(0);
        table.add_row(vec![
            Cell::new(outcome.stage.dataset())
                .fg(Color::Blue)
                .add_attribute(Attribute::Bold),
            status_cell(&outcome.status),
            outcome.records.map_or_else(|| dim_cell("-"), Cell::new),
            count_cell(outcome.report.error_count(), Color::Red),
            count_cell(outcome.report.warning_count(), Color::Yellow),
            count_cell(note_count(outcome), Color::Cyan),
            dim_cell(outcome.duration_ms),
        ]);
    }
    table.add_row(vec![
        Cell::new("TOTAL")
            .fg(Color::Cyan)
            .add_attribute(Attribute::Bold),
        dim_cell("-"),
        Cell::new(total_records).add_attribute(Attribute::Bold),
        dim_cell("-"),
        dim_cell("-"),
        dim_cell("-"),
        dim_cell("-"),
    ]);
    println!("{table}");
    print_issue_table(result);

    let failures: Vec<String> = result
        .outcomes
        .iter()
        .filter_map(|outcome| match &outcome.status {
            StageStatus::Failed { message, .. } => Some(message.clone()),
            StageStatus::Skipped { upstream } => Some(format!(
                "{}: skipped because {upstream} is not available",
                outcome.stage
            )),
            _ => None,
        })
        .collect();
    if !failures.is_empty() {
        eprintln!("Errors:");
        for failure in failures {
            eprintln!("- {failure}");
        }
    }
}

fn print_issue_table(result: &RunResult) {
    let mut issues: Vec<&DataQualityIssue> = result
        .outcomes
        .iter()
        .flat_map(|outcome| outcome.report.issues.iter())
        .collect();
    if issues.is_empty() {
        return;
    }
    issues.sort_by(|a, b| {
        let severity = a.severity.cmp(&b.severity);
        if severity != Ordering::Equal {
            return severity;
        }
        a.dataset.cmp(&b.dataset).then_with(|| a.rule.cmp(&b.rule))
    });
    let mut table = Table::new();
    table.set_header(vec![
        header_cell("Dataset"),
        header_cell("Severity"),
        header_cell("Rule"),
        header_cell("Message"),
        header_cell("Keys"),
    ]);
    apply_issue_table_style(&mut table);
    align_column(&mut table, 1, CellAlignment::Center);
    for issue in issues {
        table.add_row(vec![
            Cell::new(&issue.dataset).fg(Color::Blue),
            severity_cell(issue.severity),
            Cell::new(&issue.rule),
            Cell::new(&issue.message),
            keys_cell(&issue.keys),
        ]);
    }
    println!();
    println!("Issues:");
    println!("{table}");
}

pub fn apply_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_summary_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_width(120);
}

fn apply_issue_table_style(table: &mut Table) {
    table
        .load_preset(UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .apply_modifier(UTF8_SOLID_INNER_BORDERS)
        .set_content_arrangement(ContentArrangement::DynamicFullWidth)
        .set_width(160);
}

fn align_column(table: &mut Table, index: usize, alignment: CellAlignment) {
    if let Some(column) = table.column_mut(index) {
        column.set_cell_alignment(alignment);
    }
}

fn note_count(outcome: &StageOutcome) -> usize {
    outcome
        .report
        .issues
        .iter()
        .filter(|issue| issue.severity == IssueSeverity::Note)
        .count()
}

fn status_cell(status: &StageStatus) -> Cell {
    let cell = Cell::new(status.label());
    match status {
        StageStatus::Persisted { .. } => cell.fg(Color::Green).add_attribute(Attribute::Bold),
        StageStatus::Validated | StageStatus::Reused { .. } => cell.fg(Color::Green),
        StageStatus::Failed { .. } => cell.fg(Color::Red).add_attribute(Attribute::Bold),
        StageStatus::Skipped { .. } => cell.fg(Color::DarkGrey),
    }
}

fn severity_cell(severity: IssueSeverity) -> Cell {
    match severity {
        IssueSeverity::Error => Cell::new("ERROR")
            .fg(Color::Red)
            .add_attribute(Attribute::Bold),
        IssueSeverity::Warning => Cell::new("WARN").fg(Color::Yellow),
        IssueSeverity::Note => Cell::new("NOTE").fg(Color::Cyan),
    }
}

fn count_cell(count: usize, color: Color) -> Cell {
    if count > 0 {
        Cell::new(count).fg(color).add_attribute(Attribute::Bold)
    } else {
        dim_cell(count)
    }
}

fn keys_cell(keys: &[String]) -> Cell {
    if keys.is_empty() {
        return dim_cell("-");
    }
    Cell::new(format_keys(keys))
}

fn format_keys(keys: &[String]) -> String {
    let shown = keys
        .iter()
        .take(MAX_KEYS_SHOWN)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(", ");
    if keys.len() > MAX_KEYS_SHOWN {
        format!("{shown} (+{} more)", keys.len() - MAX_KEYS_SHOWN)
    } else {
        shown
    }
}

fn header_cell(label: &str) -> Cell {
    Cell::new(label)
        .fg(Color::Cyan)
        .add_attribute(Attribute::Bold)
}

fn dim_cell<T: ToString>(value: T) -> Cell {
    Cell::new(value).fg(Color::DarkGrey)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn long_key_lists_are_shortened() {
        let keys: Vec<String> = ["01-701-1015", "01-701-1023", "01-702-1034", "01-702-1040"]
            .iter()
            .map(|key| (*key).to_string())
            .collect();
        insta::assert_snapshot!(
            format_keys(&keys),
            @"01-701-1015, 01-701-1023, 01-702-1034 (+1 more)"
        );
        insta::assert_snapshot!(format_keys(&keys[..1]), @"01-701-1015");
    }
}
