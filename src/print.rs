//! Plain-text rendering for the terminal.

use serde_json::Value;
use tabula_storage::{PreprocessReport, PreviewRow, RemoteItem};
use tabula_table::{Column, TableView};
use tabula_upload::{Queue, Status, TaskId};
use time::format_description::well_known::Rfc3339;

const TEXT_COLUMNS: [Column; 3] = [Column::Name, Column::Kind, Column::Uploaded];

fn cell(item: &RemoteItem, column: Column) -> String {
    match column {
        Column::Name => item.name.clone(),
        Column::Kind => item.kind.to_string(),
        Column::Uploaded => item.modified.and_then(|at| at.format(&Rfc3339).ok()).unwrap_or_else(|| "-".to_string()),
        Column::Select | Column::Actions => String::new(),
    }
}

/// The current page of the table, one line per row.
pub fn table(view: &TableView) -> String {
    let columns: Vec<Column> = TEXT_COLUMNS.into_iter().filter(|column| view.visibility().is_visible(*column)).collect();
    let rows: Vec<Vec<String>> = view
        .rows()
        .iter()
        .map(|row| columns.iter().map(|column| cell(row.item, *column)).collect())
        .collect();
    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(index, column)| {
            rows.iter().map(|row| row[index].len()).chain([column.to_string().len()]).max().unwrap_or_default()
        })
        .collect();

    let line = |cells: Vec<String>| {
        cells
            .iter()
            .zip(&widths)
            .map(|(cell, width)| format!("{cell:<width$}"))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    let mut out = Vec::with_capacity(rows.len() + 2);
    out.push(line(columns.iter().map(|column| column.to_string().to_uppercase()).collect()));
    out.extend(rows.into_iter().map(line));
    out.push(format!(
        "page {}/{} ({} of {} items)",
        view.page() + 1,
        view.page_count(),
        view.filtered_count(),
        view.items().len()
    ));
    out.join("\n")
}

/// One line per task of a batch, in processing order.
pub fn tasks(queue: &Queue, ids: &[TaskId]) -> String {
    ids.iter()
        .filter_map(|id| queue.get(*id))
        .map(|task| {
            let status = task.status.to_string();
            match (task.status, &task.receipt, &task.error) {
                (Status::Done, Some(receipt), _) => {
                    format!("{status:<9} {} -> {} ({} columns)", task.name, receipt.dataset_id, receipt.columns.len())
                },
                (Status::Error, _, Some(error)) => format!("{status:<9} {}: {error}", task.name),
                _ => format!("{status:<9} {}", task.name),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn number(value: Option<f64>) -> String {
    value.map(|value| format!("{value:.4}")).unwrap_or_else(|| "-".to_string())
}

pub fn report(report: &PreprocessReport) -> String {
    let mut out = Vec::new();
    if !report.message.is_empty() {
        out.push(report.message.clone());
    }
    out.push(format!("{} rows, {} columns", report.num_rows, report.columns.len()));
    let width = report.columns.iter().map(String::len).max().unwrap_or_default();
    for column in &report.columns {
        let kind = report.column_types.get(column).map(String::as_str).unwrap_or("?");
        let missing = report.missing_values.get(column).copied().unwrap_or_default();
        let mut line = format!("  {column:<width$}  {kind:<8}  missing={missing}");
        if let Some(stats) = report.summary.as_ref().and_then(|summary| summary.get(column)) {
            for (name, value) in stats {
                line.push_str(&format!("  {name}={}", number(*value)));
            }
        }
        out.push(line);
    }
    out.join("\n")
}

/// Preview rows as JSON lines.
pub fn rows(rows: Vec<PreviewRow>) -> String {
    rows.into_iter().map(|row| Value::Object(row).to_string()).collect::<Vec<_>>().join("\n")
}
