//! In-memory tabular datasets.
//!
//! A [`Dataset`] is a list of named columns with row-aligned string cells.
//! Its `name` is the display name supplied at load time and doubles as the
//! identity used by the correspondence store.

use std::path::Path;

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::debug;

use crate::{
    error::{RemapError, RemapResult},
    io_utils,
    metadata::{ColumnMeta, infer_column_types},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Dataset {
    pub fn new(name: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Dataset {
            name: name.into(),
            headers,
            rows,
        }
    }

    /// Loads delimited text from `path`; the file name becomes the dataset name.
    pub fn load(path: &Path, delimiter: Option<u8>, encoding: &'static Encoding) -> Result<Self> {
        let name = if io_utils::is_dash(path) {
            "stdin".to_string()
        } else {
            path.file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string())
        };
        Self::load_named(path, &name, delimiter, encoding)
    }

    pub fn load_named(
        path: &Path,
        name: &str,
        delimiter: Option<u8>,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
        let mut reader = io_utils::open_csv_reader_from_path(path, delimiter)?;
        let headers = io_utils::reader_headers(&mut reader, encoding)
            .with_context(|| format!("Reading headers from {path:?}"))?;
        let mut rows = Vec::new();
        for (idx, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {} of {path:?}", idx + 2))?;
            rows.push(io_utils::decode_record(&record, encoding)?);
        }
        debug!(
            "Loaded '{name}' with {} column(s) and {} row(s)",
            headers.len(),
            rows.len()
        );
        Ok(Dataset::new(name, headers, rows))
    }

    /// Parses an in-memory delimited document.
    pub fn from_csv_str(name: &str, text: &str) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader(text.as_bytes(), io_utils::DEFAULT_CSV_DELIMITER);
        let headers = reader
            .headers()
            .with_context(|| format!("Reading headers of '{name}'"))?
            .iter()
            .map(str::to_string)
            .collect();
        let rows = reader
            .records()
            .map(|record| {
                record
                    .map(|r| r.iter().map(str::to_string).collect::<Vec<_>>())
                    .with_context(|| format!("Reading rows of '{name}'"))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Dataset::new(name, headers, rows))
    }

    /// Text before the first `.` of the display name.
    pub fn stem(&self) -> &str {
        name_stem(&self.name)
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    pub fn column(&self, name: &str) -> Option<Vec<&str>> {
        let idx = self.column_index(name)?;
        Some(
            self.rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect(),
        )
    }

    pub fn head(&self, n: usize) -> &[Vec<String>] {
        &self.rows[..n.min(self.rows.len())]
    }

    pub fn column_types(&self) -> Vec<ColumnMeta> {
        infer_column_types(&self.headers, &self.rows)
    }

    /// Appends `name`, or overwrites it in place when it already exists.
    pub fn with_column(&mut self, name: &str, values: Vec<String>) -> RemapResult<()> {
        if values.len() != self.rows.len() {
            return Err(RemapError::Dataset {
                name: self.name.clone(),
                reason: format!(
                    "column '{name}' has {} value(s) for {} row(s)",
                    values.len(),
                    self.rows.len()
                ),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    if row.len() <= idx {
                        row.resize(idx + 1, String::new());
                    }
                    row[idx] = value;
                }
            }
            None => {
                self.headers.push(name.to_string());
                let width = self.headers.len();
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.resize(width - 1, String::new());
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Selects `columns` in the given order into a new dataset.
    pub fn project(&self, name: &str, columns: &[String]) -> RemapResult<Dataset> {
        let indices = columns
            .iter()
            .map(|column| {
                self.column_index(column).ok_or_else(|| RemapError::Dataset {
                    name: self.name.clone(),
                    reason: format!("column '{column}' does not exist"),
                })
            })
            .collect::<RemapResult<Vec<_>>>()?;
        let rows = self
            .rows
            .iter()
            .map(|row| {
                indices
                    .iter()
                    .map(|&idx| row.get(idx).cloned().unwrap_or_default())
                    .collect()
            })
            .collect();
        Ok(Dataset::new(name, columns.to_vec(), rows))
    }

    pub fn write_csv(&self, path: Option<&Path>, delimiter: u8) -> Result<()> {
        let mut writer = io_utils::open_csv_writer(path, delimiter)?;
        writer.write_record(&self.headers)?;
        for row in &self.rows {
            writer.write_record(row)?;
        }
        writer.flush().context("Flushing output")?;
        Ok(())
    }
}

pub fn name_stem(name: &str) -> &str {
    name.split('.').next().unwrap_or(name)
}
