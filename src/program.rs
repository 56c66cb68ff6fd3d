//! Mapping code: per-column fragments joined with a fixed projection trailer.
//!
//! The text is line oriented. Each non-blank line is either an assignment
//! (see [`DerivedColumn`]) or the projection statement that selects the
//! template's columns, in template order, as the output dataset. Blank
//! lines, `#` comments and Markdown code-fence lines are skipped so agent
//! answers can be stored verbatim.

use std::{fmt, sync::OnceLock};

use regex::Regex;

use crate::{
    derive::DerivedColumn,
    error::{RemapError, RemapResult},
};

/// Closing statement appended to every assembled program.
pub const PROJECTION_STATEMENT: &str = "output_df = input_df[template_df.columns]";

const TRAILER: &str = "\n    \noutput_df = input_df[template_df.columns]\n";

fn projection_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^output_df\s*=\s*input_df\[\s*template_df\.columns\s*\]$")
            .expect("static projection pattern")
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Assign { line: usize, column: DerivedColumn },
    Project { line: usize },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingCode {
    text: String,
}

impl MappingCode {
    /// Concatenates fragments in template-column order and appends the trailer.
    pub fn assemble<S: AsRef<str>>(fragments: &[S]) -> Self {
        let mut text = String::new();
        for fragment in fragments {
            text.push_str(fragment.as_ref());
            if !text.ends_with('\n') {
                text.push('\n');
            }
        }
        text.push_str(TRAILER);
        MappingCode { text }
    }

    /// Wraps stored or hand-edited text as is.
    pub fn from_text(text: impl Into<String>) -> Self {
        MappingCode { text: text.into() }
    }

    pub fn has_projection(&self) -> bool {
        has_projection(&self.text)
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn statements(&self) -> RemapResult<Vec<Statement>> {
        parse_statements(&self.text)
    }
}

impl fmt::Display for MappingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn is_skipped(line: &str) -> bool {
    line.is_empty() || line.starts_with('#') || line.starts_with("```")
}

fn has_projection(text: &str) -> bool {
    text.lines()
        .map(str::trim)
        .any(|line| projection_pattern().is_match(line))
}

pub fn parse_statements(text: &str) -> RemapResult<Vec<Statement>> {
    let mut statements = Vec::new();
    for (idx, raw) in text.lines().enumerate() {
        let line = raw.trim();
        if is_skipped(line) {
            continue;
        }
        let number = idx + 1;
        if projection_pattern().is_match(line) {
            statements.push(Statement::Project { line: number });
            continue;
        }
        let column = DerivedColumn::parse(line)
            .map_err(|err| RemapError::Execution(format!("line {number}: {err:#}")))?;
        statements.push(Statement::Assign {
            line: number,
            column,
        });
    }
    Ok(statements)
}
