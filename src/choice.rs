//! Reduces each correspondence entry to one concrete input column.
//!
//! Policy:
//! - a single proposed column passes through untouched;
//! - several candidates in automatic mode resolve to the first one, with a warning;
//! - interactive picks must be members of the offered options;
//! - unresolved columns offer every input column.

use std::{
    collections::BTreeMap,
    io::{BufRead, Write},
};

use log::warn;

use crate::{
    correspond::{Candidates, ColumnCorrespondence},
    error::{RemapError, RemapResult},
};

/// What a presentation layer offers for one template column.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChoiceField {
    pub template_column: String,
    pub options: Vec<String>,
    /// A single proposed column, shown read-only.
    pub locked: bool,
    pub unresolved: bool,
}

pub fn present(correspondence: &ColumnCorrespondence, input_columns: &[String]) -> Vec<ChoiceField> {
    correspondence
        .entries()
        .iter()
        .map(|(column, candidates)| {
            let (options, locked, unresolved) = match candidates {
                Candidates::Single(value) => (vec![value.clone()], true, false),
                Candidates::List(values) => (values.clone(), false, false),
                Candidates::Unresolved => (input_columns.to_vec(), false, true),
            };
            ChoiceField {
                template_column: column.clone(),
                options,
                locked,
                unresolved,
            }
        })
        .collect()
}

/// Supplies a pick for a field that needs one.
pub trait ChoiceSource {
    fn choose(&mut self, field: &ChoiceField) -> RemapResult<String>;
}

/// Asks on a line-oriented terminal.
pub struct PromptChoiceSource<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> PromptChoiceSource<R, W> {
    pub fn new(input: R, output: W) -> Self {
        PromptChoiceSource { input, output }
    }
}

impl<R: BufRead, W: Write> ChoiceSource for PromptChoiceSource<R, W> {
    fn choose(&mut self, field: &ChoiceField) -> RemapResult<String> {
        let prompt_failed = |err: std::io::Error| RemapError::InvalidChoice {
            column: field.template_column.clone(),
            choice: format!("<{err}>"),
            candidates: field.options.clone(),
        };
        write!(
            self.output,
            "Column '{}': please choose one from {:?}: ",
            field.template_column, field.options
        )
        .and_then(|_| self.output.flush())
        .map_err(prompt_failed)?;
        let mut line = String::new();
        self.input.read_line(&mut line).map_err(prompt_failed)?;
        Ok(line.trim().to_string())
    }
}

/// One concrete input column per template column, in template column order.
/// Several template columns may draw from the same input column.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ResolvedChoice {
    entries: Vec<(String, String)>,
}

impl ResolvedChoice {
    pub fn new(entries: Vec<(String, String)>) -> Self {
        ResolvedChoice { entries }
    }

    pub fn get(&self, template_column: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(column, _)| column == template_column)
            .map(|(_, chosen)| chosen.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub enum ChoiceMode<'s> {
    Automatic,
    Interactive(&'s mut dyn ChoiceSource),
}

pub struct AmbiguityResolver<'s> {
    mode: ChoiceMode<'s>,
    preset: BTreeMap<String, String>,
}

impl<'s> AmbiguityResolver<'s> {
    pub fn automatic() -> Self {
        AmbiguityResolver {
            mode: ChoiceMode::Automatic,
            preset: BTreeMap::new(),
        }
    }

    pub fn interactive(source: &'s mut dyn ChoiceSource) -> Self {
        AmbiguityResolver {
            mode: ChoiceMode::Interactive(source),
            preset: BTreeMap::new(),
        }
    }

    /// Picks made up front; validated like interactive answers.
    pub fn with_preset(mut self, preset: BTreeMap<String, String>) -> Self {
        self.preset = preset;
        self
    }

    pub fn resolve_choice(&mut self, field: &ChoiceField) -> RemapResult<String> {
        if let Some(picked) = self.preset.get(&field.template_column) {
            return validate(field, picked.clone());
        }
        if field.locked || field.options.len() == 1 {
            return field.options.first().cloned().ok_or_else(|| no_options(field));
        }
        match &mut self.mode {
            ChoiceMode::Automatic => {
                let first = field.options.first().cloned().ok_or_else(|| no_options(field))?;
                if field.unresolved {
                    warn!(
                        "No input column was proposed for column {} in the template.",
                        field.template_column
                    );
                } else {
                    warn!(
                        "There are ambiguous columns ({:?}) that can map to column {} in the template.",
                        field.options, field.template_column
                    );
                }
                warn!(
                    "Choosing ({first}) by default for {} in the template.",
                    field.template_column
                );
                Ok(first)
            }
            ChoiceMode::Interactive(source) => {
                let picked = source.choose(field)?;
                validate(field, picked)
            }
        }
    }

    pub fn resolve_all(
        &mut self,
        correspondence: &ColumnCorrespondence,
        input_columns: &[String],
    ) -> RemapResult<ResolvedChoice> {
        let fields = present(correspondence, input_columns);
        let mut entries = Vec::with_capacity(fields.len());
        for field in &fields {
            let chosen = self.resolve_choice(field)?;
            entries.push((field.template_column.clone(), chosen));
        }
        Ok(ResolvedChoice::new(entries))
    }
}

fn validate(field: &ChoiceField, picked: String) -> RemapResult<String> {
    if field.options.iter().any(|option| *option == picked) {
        Ok(picked)
    } else {
        Err(RemapError::InvalidChoice {
            column: field.template_column.clone(),
            choice: picked,
            candidates: field.options.clone(),
        })
    }
}

fn no_options(field: &ChoiceField) -> RemapError {
    RemapError::InvalidChoice {
        column: field.template_column.clone(),
        choice: String::new(),
        candidates: Vec::new(),
    }
}

/// Parses `template_column=input_column` selections.
pub fn parse_presets(specs: &[String]) -> anyhow::Result<BTreeMap<String, String>> {
    let mut preset = BTreeMap::new();
    for spec in specs {
        let (column, chosen) = spec
            .split_once('=')
            .map(|(c, v)| (c.trim(), v.trim()))
            .filter(|(c, v)| !c.is_empty() && !v.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Choice '{spec}' must look like column=input_column"))?;
        preset.insert(column.to_string(), chosen.to_string());
    }
    Ok(preset)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;

    fn field(options: &[&str]) -> ChoiceField {
        ChoiceField {
            template_column: "amount".to_string(),
            options: options.iter().map(|o| o.to_string()).collect(),
            locked: false,
            unresolved: false,
        }
    }

    #[test]
    fn prompt_source_reads_trimmed_line() {
        let mut out = Vec::new();
        let mut source = PromptChoiceSource::new(Cursor::new("total \n"), &mut out);
        let picked = source.choose(&field(&["amt", "total"])).unwrap();
        assert_eq!(picked, "total");
        let shown = String::from_utf8(out).unwrap();
        assert!(shown.contains("please choose one from [\"amt\", \"total\"]"));
    }

    #[test]
    fn presets_parse_and_reject_garbage() {
        let parsed = parse_presets(&["amount = amt".to_string()]).unwrap();
        assert_eq!(parsed.get("amount").map(String::as_str), Some("amt"));
        assert!(parse_presets(&["amount".to_string()]).is_err());
        assert!(parse_presets(&["=amt".to_string()]).is_err());
    }

    #[test]
    fn empty_universe_cannot_resolve() {
        let mut resolver = AmbiguityResolver::automatic();
        let mut unresolved = field(&[]);
        unresolved.unresolved = true;
        assert!(resolver.resolve_choice(&unresolved).is_err());
    }
}
