//! Compact textual summaries of datasets, embedded verbatim into prompts.
//!
//! Output depends only on the dataset contents, so repeated calls produce
//! identical text.

use crate::{dataset::Dataset, table};

pub const DEFAULT_SAMPLE_ROWS: usize = 5;

/// First `rows` rows as a pipe table with a leading row-index column.
pub fn describe_rows(dataset: &Dataset, rows: usize) -> String {
    let mut headers = Vec::with_capacity(dataset.headers.len() + 1);
    headers.push(String::new());
    headers.extend(dataset.headers.iter().cloned());
    let body = dataset
        .head(rows)
        .iter()
        .enumerate()
        .map(|(idx, row)| {
            let mut cells = Vec::with_capacity(headers.len());
            cells.push(idx.to_string());
            cells.extend(
                (0..dataset.headers.len()).map(|col| row.get(col).cloned().unwrap_or_default()),
            );
            cells
        })
        .collect::<Vec<_>>();
    table::render_markdown(&headers, &body)
}

/// Inferred type per column, one row each.
pub fn describe_types(dataset: &Dataset) -> String {
    let headers = vec![String::new(), "0".to_string()];
    let body = dataset
        .column_types()
        .into_iter()
        .map(|meta| vec![meta.name, meta.data_type.to_string()])
        .collect::<Vec<_>>();
    table::render_markdown(&headers, &body)
}

pub fn describe(dataset: &Dataset, rows: usize) -> String {
    format!(
        "{}\n{}",
        describe_rows(dataset, rows),
        describe_types(dataset)
    )
}
