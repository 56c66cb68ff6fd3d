//! Oracle-proposed correspondence between template and input columns.
//!
//! The oracle is prompted once with both dataset descriptors and asked for a
//! literal mapping. Its reply is normalised so every template column ends up
//! with exactly one entry: a single input column, an ordered candidate list,
//! or unresolved.

use log::{debug, warn};

use crate::{
    dataset::Dataset,
    describe,
    error::RemapResult,
    literal::{Literal, parse_mapping},
    oracle::{Oracle, OracleAnswer},
};

pub const COLUMN_MAP_PROMPT: &str = "
Analyze the columns of template_df, and for each column in template_df, find the possible matching column from input_df based on the dataframe info provided below. Return a dictionary. Key is the column name from template_df and value is the column name in input_df. Only if there are ambiguous columns, list all of them as values.

This is the result of `print(template_df.head())`:
{template_df}

This is the result of `print(input_df.head())`:
{input_df}

Start Answer.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Candidates {
    Single(String),
    /// Ordered and never empty.
    List(Vec<String>),
    Unresolved,
}

impl Candidates {
    pub fn is_ambiguous(&self) -> bool {
        matches!(self, Candidates::List(items) if items.len() > 1)
    }
}

/// One entry per template column, in template column order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ColumnCorrespondence {
    entries: Vec<(String, Candidates)>,
}

impl ColumnCorrespondence {
    pub fn new(entries: Vec<(String, Candidates)>) -> Self {
        ColumnCorrespondence { entries }
    }

    /// Every template column unresolved.
    pub fn unresolved(template_columns: &[String]) -> Self {
        ColumnCorrespondence {
            entries: template_columns
                .iter()
                .map(|column| (column.clone(), Candidates::Unresolved))
                .collect(),
        }
    }

    pub fn get(&self, template_column: &str) -> Option<&Candidates> {
        self.entries
            .iter()
            .find(|(column, _)| column == template_column)
            .map(|(_, candidates)| candidates)
    }

    pub fn entries(&self) -> &[(String, Candidates)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn ambiguous_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, candidates)| candidates.is_ambiguous())
            .count()
    }

    /// Rows for terminal display: template column, kind, candidates.
    pub fn display_rows(&self) -> Vec<Vec<String>> {
        self.entries
            .iter()
            .map(|(column, candidates)| {
                let (kind, shown) = match candidates {
                    Candidates::Single(value) => ("single", value.clone()),
                    Candidates::List(values) => ("choice", values.join(", ")),
                    Candidates::Unresolved => ("unresolved", String::new()),
                };
                vec![column.clone(), kind.to_string(), shown]
            })
            .collect()
    }
}

pub fn build_prompt(template_descriptor: &str, input_descriptor: &str) -> String {
    COLUMN_MAP_PROMPT
        .replace("{template_df}", template_descriptor)
        .replace("{input_df}", input_descriptor)
}

/// Turns a raw reply into a correspondence over the given column universes.
pub fn parse_correspondence(
    reply: String,
    template_columns: &[String],
    input_columns: &[String],
) -> OracleAnswer<ColumnCorrespondence> {
    OracleAnswer::from_reply(reply, |raw| {
        let entries = parse_mapping(raw)?;
        Ok(normalize(&entries, template_columns, input_columns))
    })
}

fn normalize(
    entries: &[(String, Literal)],
    template_columns: &[String],
    input_columns: &[String],
) -> ColumnCorrespondence {
    for (key, _) in entries {
        if match_column(key, template_columns).is_none() {
            debug!("Ignoring correspondence key '{key}' which is not a template column");
        }
    }
    let normalized = template_columns
        .iter()
        .map(|column| {
            // Later duplicates win, as they would in a dict literal.
            let value = entries
                .iter()
                .rev()
                .find(|(key, _)| match_column(key, template_columns) == Some(column.as_str()))
                .map(|(_, value)| value);
            let candidates = match value {
                None | Some(Literal::None) => Candidates::Unresolved,
                Some(Literal::Str(name)) => match match_column(name, input_columns) {
                    Some(found) => Candidates::Single(found.to_string()),
                    None => {
                        warn!("Dropping unknown input column '{name}' proposed for '{column}'");
                        Candidates::Unresolved
                    }
                },
                Some(Literal::List(items)) => {
                    let mut names: Vec<String> = Vec::with_capacity(items.len());
                    for item in items {
                        match item.as_str().and_then(|name| match_column(name, input_columns)) {
                            Some(found) if !names.iter().any(|n| n == found) => {
                                names.push(found.to_string())
                            }
                            Some(_) => {}
                            None => warn!(
                                "Dropping unknown input column {item:?} proposed for '{column}'"
                            ),
                        }
                    }
                    if names.is_empty() {
                        Candidates::Unresolved
                    } else {
                        Candidates::List(names)
                    }
                }
                Some(other) => {
                    warn!("Ignoring non-column value {other:?} proposed for '{column}'");
                    Candidates::Unresolved
                }
            };
            (column.clone(), candidates)
        })
        .collect();
    ColumnCorrespondence::new(normalized)
}

/// Exact match first, then a unique case-insensitive match.
fn match_column<'a>(name: &str, universe: &'a [String]) -> Option<&'a str> {
    let trimmed = name.trim();
    if let Some(exact) = universe.iter().find(|c| c.as_str() == trimmed) {
        return Some(exact.as_str());
    }
    let mut folded = universe.iter().filter(|c| c.eq_ignore_ascii_case(trimmed));
    match (folded.next(), folded.next()) {
        (Some(only), None) => Some(only.as_str()),
        _ => None,
    }
}

pub struct MappingResolver<'o> {
    oracle: &'o dyn Oracle,
    sample_rows: usize,
}

impl<'o> MappingResolver<'o> {
    pub fn new(oracle: &'o dyn Oracle, sample_rows: usize) -> Self {
        MappingResolver {
            oracle,
            sample_rows,
        }
    }

    /// One oracle round trip; no retry on a malformed reply.
    pub fn resolve(&self, template: &Dataset, input: &Dataset) -> RemapResult<ColumnCorrespondence> {
        self.request(template, input)?.into_result()
    }

    pub fn request(
        &self,
        template: &Dataset,
        input: &Dataset,
    ) -> RemapResult<OracleAnswer<ColumnCorrespondence>> {
        let prompt = build_prompt(
            &describe::describe_rows(template, self.sample_rows),
            &describe::describe_rows(input, self.sample_rows),
        );
        debug!("Column map prompt:\n{prompt}");
        let reply = self.oracle.complete(&prompt)?;
        debug!("Column map reply:\n{reply}");
        Ok(parse_correspondence(reply, &template.headers, &input.headers))
    }
}
