use super::SecretRedactor;
use std::fmt::Display;

/// Widest a rendered cell may get before it is cut and marked with `..`.
pub const DEFAULT_VALUE_CAP: usize = 30;

const COLUMN_JOIN: &str = " | ";
const SEPARATOR_JOIN: &str = "-+-";

/// Aligned text rendering of one result set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Table {
    pub header: String,
    pub separator: String,
    pub rows: Vec<String>,
}

impl Table {
    /// Header and separator lines, as they open the first page.
    pub fn header_block(&self) -> String {
        format!("{}\n{}", self.header, self.separator)
    }
}

/// Renders one cell: secrets redacted, newlines escaped, cut to `value_cap`
/// characters.
pub fn render_cell(value: &dyn Display, value_cap: usize, redactor: &SecretRedactor) -> String {
    let text = value.to_string();
    // A secret cut by the cap would no longer match, so redact the whole value.
    let text = redactor.redact(&text).replace('\n', "\\n");
    if text.chars().count() <= value_cap {
        return text;
    }

    let mut cut: String = text.chars().take(value_cap.saturating_sub(2)).collect();
    cut.push_str("..");
    cut
}

/// Formats `rows` under `columns`. Returns `None` for an empty row set so the
/// caller can acknowledge instead of printing a bodiless table.
///
/// Cells are matched to columns by position; every value only needs `Display`.
pub fn format_table<V: Display>(
    columns: &[String],
    rows: &[Vec<V>],
    value_cap: usize,
    redactor: &SecretRedactor,
) -> Option<Table> {
    if rows.is_empty() {
        return None;
    }

    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            row.iter()
                .map(|value| render_cell(value, value_cap, redactor))
                .collect()
        })
        .collect();

    let columns: Vec<String> = columns
        .iter()
        .map(|name| redactor.redact(name).into_owned())
        .collect();
    let mut widths: Vec<usize> = columns.iter().map(|name| name.chars().count()).collect();
    for row in &cells {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }
    for width in &mut widths {
        *width = (*width).min(value_cap);
    }

    let header = columns
        .iter()
        .zip(&widths)
        .map(|(name, width)| format!("{name:^width$}"))
        .collect::<Vec<_>>()
        .join(COLUMN_JOIN);
    let separator = widths
        .iter()
        .map(|width| "-".repeat(*width))
        .collect::<Vec<_>>()
        .join(SEPARATOR_JOIN);
    let rows = cells
        .iter()
        .map(|row| {
            row.iter()
                .zip(&widths)
                .map(|(cell, width)| format!("{cell:<width$}"))
                .collect::<Vec<_>>()
                .join(COLUMN_JOIN)
        })
        .collect();

    Some(Table {
        header,
        separator,
        rows,
    })
}
