use std::borrow::Cow;
use std::fmt::Write as _;

/// Elastic, space-separated table for terminal output.
pub fn render_table(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths = column_widths(headers, rows, 1, false);
    let mut output = String::new();

    let _ = writeln!(output, "{}", format_plain_row(headers, &widths));
    let separator_widths = widths.iter().map(|w| (*w).max(3)).collect::<Vec<usize>>();
    let separator_cells = separator_widths
        .iter()
        .map(|w| "-".repeat(*w))
        .collect::<Vec<_>>();
    let _ = writeln!(
        output,
        "{}",
        format_plain_row(&separator_cells, &separator_widths)
    );
    for row in rows {
        let _ = writeln!(output, "{}", format_plain_row(row, &widths));
    }
    output
}

pub fn print_table(headers: &[String], rows: &[Vec<String>]) {
    print!("{}", render_table(headers, rows));
}

/// Pipe table in the shape oracles are prompted with.
pub fn render_markdown(headers: &[String], rows: &[Vec<String>]) -> String {
    let widths = column_widths(headers, rows, 3, true);
    let mut output = String::new();

    let _ = writeln!(output, "{}", format_pipe_row(headers, &widths));
    let rule = widths
        .iter()
        .map(|w| ":".to_string() + &"-".repeat(w.saturating_sub(1)))
        .collect::<Vec<_>>();
    let _ = writeln!(output, "{}", format_pipe_row(&rule, &widths));
    for row in rows {
        let _ = writeln!(output, "{}", format_pipe_row(row, &widths));
    }
    output
}

fn column_widths(
    headers: &[String],
    rows: &[Vec<String>],
    minimum: usize,
    escape_pipes: bool,
) -> Vec<usize> {
    let column_count = headers.len();
    let mut widths = headers.iter().map(|h| display_width(h)).collect::<Vec<_>>();
    for row in rows {
        for (idx, cell) in row.iter().enumerate().take(column_count) {
            widths[idx] = widths[idx].max(display_width(&sanitize_cell(cell, escape_pipes)));
        }
    }
    for width in &mut widths {
        *width = (*width).max(minimum);
    }
    widths
}

fn padded_cells(values: &[String], widths: &[usize], escape_pipes: bool) -> Vec<String> {
    let mut cells = Vec::with_capacity(widths.len());
    for (idx, width) in widths.iter().enumerate() {
        let value = values.get(idx).map(String::as_str).unwrap_or("");
        let sanitized = sanitize_cell(value, escape_pipes);
        let padding = width.saturating_sub(display_width(sanitized.as_ref()));
        let mut cell = sanitized.into_owned();
        cell.push_str(&" ".repeat(padding));
        cells.push(cell);
    }
    cells
}

fn format_plain_row(values: &[String], widths: &[usize]) -> String {
    let mut line = padded_cells(values, widths, false).join("  ");
    while line.ends_with(' ') {
        line.pop();
    }
    line
}

fn format_pipe_row(values: &[String], widths: &[usize]) -> String {
    format!("| {} |", padded_cells(values, widths, true).join(" | "))
}

fn display_width(value: &str) -> usize {
    let mut width = 0usize;
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch == '\u{1b}' {
            // ANSI escape, e.g. \x1b[31m
            for next in chars.by_ref() {
                if next == 'm' {
                    break;
                }
            }
        } else {
            width += 1;
        }
    }
    width
}

fn sanitize_cell(value: &str, escape_pipes: bool) -> Cow<'_, str> {
    if value.contains(['\n', '\r', '\t']) || (escape_pipes && value.contains('|')) {
        let sanitized = value
            .chars()
            .map(|ch| match ch {
                '\n' | '\r' | '\t' => ' ',
                '|' if escape_pipes => '/',
                other => other,
            })
            .collect();
        Cow::Owned(sanitized)
    } else {
        Cow::Borrowed(value)
    }
}
