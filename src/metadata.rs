//! Column type inference for in-memory datasets.
//!
//! Every column starts out as a candidate for each non-string type; a value
//! that fails to parse eliminates that type. Empty cells never eliminate.

use std::fmt;

use uuid::Uuid;

use crate::data::{parse_naive_date, parse_naive_datetime};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    String,
    Integer,
    Float,
    Boolean,
    Date,
    DateTime,
    Guid,
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ColumnType::String => "string",
            ColumnType::Integer => "integer",
            ColumnType::Float => "float",
            ColumnType::Boolean => "boolean",
            ColumnType::Date => "date",
            ColumnType::DateTime => "datetime",
            ColumnType::Guid => "guid",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnMeta {
    pub name: String,
    pub data_type: ColumnType,
}

#[derive(Debug, Clone, Copy)]
struct TypeCandidate {
    possible_integer: bool,
    possible_float: bool,
    possible_boolean: bool,
    possible_date: bool,
    possible_datetime: bool,
    possible_guid: bool,
}

impl TypeCandidate {
    fn new() -> Self {
        Self {
            possible_integer: true,
            possible_float: true,
            possible_boolean: true,
            possible_date: true,
            possible_datetime: true,
            possible_guid: true,
        }
    }

    fn observe(&mut self, value: &str) {
        if self.possible_boolean
            && !matches!(
                value.to_ascii_lowercase().as_str(),
                "true" | "false" | "t" | "f" | "yes" | "no" | "y" | "n"
            )
        {
            self.possible_boolean = false;
        }
        if self.possible_integer && value.parse::<i64>().is_err() {
            self.possible_integer = false;
        }
        if self.possible_float && value.parse::<f64>().is_err() {
            self.possible_float = false;
        }
        if self.possible_date && parse_naive_date(value).is_err() {
            self.possible_date = false;
        }
        if self.possible_datetime && parse_naive_datetime(value).is_err() {
            self.possible_datetime = false;
        }
        if self.possible_guid
            && Uuid::parse_str(value.trim().trim_matches(|c| matches!(c, '{' | '}'))).is_err()
        {
            self.possible_guid = false;
        }
    }

    fn decide(&self, observed: bool) -> ColumnType {
        if !observed {
            ColumnType::String
        } else if self.possible_boolean {
            ColumnType::Boolean
        } else if self.possible_integer {
            ColumnType::Integer
        } else if self.possible_float {
            ColumnType::Float
        } else if self.possible_date {
            ColumnType::Date
        } else if self.possible_datetime {
            ColumnType::DateTime
        } else if self.possible_guid {
            ColumnType::Guid
        } else {
            ColumnType::String
        }
    }
}

/// Infers one type per header from row-aligned string cells.
pub fn infer_column_types(headers: &[String], rows: &[Vec<String>]) -> Vec<ColumnMeta> {
    let mut candidates = vec![TypeCandidate::new(); headers.len()];
    let mut observed = vec![false; headers.len()];
    for row in rows {
        for (idx, field) in row.iter().enumerate().take(headers.len()) {
            if field.is_empty() {
                continue;
            }
            observed[idx] = true;
            candidates[idx].observe(field);
        }
    }
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| ColumnMeta {
            name: name.clone(),
            data_type: candidates[idx].decide(observed[idx]),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn inference_prefers_narrowest_type() {
        let headers = strings(&["id", "amount", "flag", "day", "note"]);
        let rows = vec![
            strings(&["1", "10.5", "yes", "2024-01-01", "hello"]),
            strings(&["2", "3", "no", "2024-02-01", "42"]),
        ];
        let types = infer_column_types(&headers, &rows)
            .into_iter()
            .map(|meta| meta.data_type)
            .collect::<Vec<_>>();
        assert_eq!(
            types,
            vec![
                ColumnType::Integer,
                ColumnType::Float,
                ColumnType::Boolean,
                ColumnType::Date,
                ColumnType::String,
            ]
        );
    }

    #[test]
    fn empty_columns_fall_back_to_string() {
        let headers = strings(&["blank"]);
        let rows = vec![strings(&[""]), strings(&[""])];
        assert_eq!(
            infer_column_types(&headers, &rows)[0].data_type,
            ColumnType::String
        );
    }
}
