//! Runs mapping code against the live datasets.
//!
//! Execution works on a copy of the input and only evaluates expressions
//! through the sandboxed `evalexpr` context, so generated code cannot touch
//! the filesystem, the network or the caller's datasets. Any failure is
//! reported as [`RemapError::Execution`].

use log::{debug, info};

use crate::{
    data::{Value, parse_typed_value},
    dataset::Dataset,
    error::{RemapError, RemapResult},
    expr,
    metadata::ColumnType,
    program::{MappingCode, Statement},
};

pub const OUTPUT_NAME: &str = "output_df.csv";

pub fn execute(code: &MappingCode, template: &Dataset, input: &Dataset) -> RemapResult<Dataset> {
    let statements = code.statements()?;
    let base = expr::base_context().map_err(|err| RemapError::Execution(format!("{err:#}")))?;
    let mut working = input.clone();
    let mut output = None;

    for statement in &statements {
        match statement {
            Statement::Assign { line, column } => {
                let typed_rows = typed_rows(&working);
                let mut values = Vec::with_capacity(working.row_count());
                for (idx, (raw, typed)) in working.rows.iter().zip(&typed_rows).enumerate() {
                    let value = column
                        .evaluate(&base, &working.headers, raw, typed, idx + 1)
                        .map_err(|err| {
                            RemapError::Execution(format!("line {line}, row {}: {err:#}", idx + 1))
                        })?;
                    values.push(value);
                }
                debug!("Line {line} derived column '{}'", column.name);
                working.with_column(&column.name, values).map_err(|err| {
                    RemapError::Execution(format!("line {line}: {err}"))
                })?;
            }
            Statement::Project { line } => {
                let projected = working
                    .project(OUTPUT_NAME, &template.headers)
                    .map_err(|err| RemapError::Execution(format!("line {line}: {err}")))?;
                output = Some(projected);
            }
        }
    }

    let output = output.ok_or_else(|| {
        RemapError::Execution("mapping code never assigns output_df".to_string())
    })?;
    info!(
        "Mapping produced {} row(s) across {} column(s)",
        output.row_count(),
        output.headers.len()
    );
    Ok(output)
}

/// Numeric cells are bound typed; every other cell stays its raw text, so a
/// plain column copy reproduces the input byte for byte.
pub(crate) fn typed_rows(dataset: &Dataset) -> Vec<Vec<Option<Value>>> {
    let types = dataset.column_types();
    dataset
        .rows
        .iter()
        .map(|row| {
            types
                .iter()
                .enumerate()
                .map(|(idx, meta)| {
                    let raw = row.get(idx).map(String::as_str).unwrap_or("");
                    numeric_binding(raw, &meta.data_type)
                })
                .collect()
        })
        .collect()
}

fn numeric_binding(raw: &str, ty: &ColumnType) -> Option<Value> {
    match ty {
        ColumnType::Float => parse_typed_value(raw, ty).ok().flatten(),
        // Zero-padded codes such as `007` keep their padding.
        ColumnType::Integer => parse_typed_value(raw, ty)
            .ok()
            .flatten()
            .filter(|value| value.as_display() == raw),
        _ => None,
    }
}
