use std::sync::OnceLock;

use anyhow::{Context, Result, anyhow, bail};
use evalexpr::HashMapContext;
use regex::{Captures, Regex};

use crate::{
    data::{Value, evalexpr_to_cell, normalize_column_name},
    expr,
};

/// One assignment of a mapping program: `input_df['name'] = expression` or
/// the short form `name = expression`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedColumn {
    pub name: String,
    /// Expression with `input_df['col']` references rewritten to bound names.
    pub expression: String,
}

fn indexed_target() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"^input_df\[\s*(?:'([^']+)'|"([^"]+)")\s*\]\s*=([^=].*)$"#)
            .expect("static assignment pattern")
    })
}

fn column_reference() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"input_df\[\s*(?:'([^']+)'|"([^"]+)")\s*\]"#).expect("static reference pattern")
    })
}

fn quoted_name<'a>(caps: &Captures<'a>) -> &'a str {
    caps.get(1)
        .or_else(|| caps.get(2))
        .map(|m| m.as_str())
        .unwrap_or_default()
}

/// Rewrites `input_df['Order ID']` into the bound identifier `order_id`.
pub fn rewrite_references(expression: &str) -> String {
    column_reference()
        .replace_all(expression, |caps: &Captures<'_>| {
            normalize_column_name(quoted_name(caps))
        })
        .into_owned()
}

impl DerivedColumn {
    pub fn parse(spec: &str) -> Result<Self> {
        let spec = spec.trim();
        let (name, expression) = if let Some(caps) = indexed_target().captures(spec) {
            let expression = caps.get(3).map(|m| m.as_str()).unwrap_or_default();
            (quoted_name(&caps).to_string(), expression.trim().to_string())
        } else {
            let (name, expression) = spec
                .split_once('=')
                .ok_or_else(|| anyhow!("'{spec}' is not an assignment"))?;
            if expression.starts_with('=') || name.ends_with(['!', '<', '>']) {
                bail!("'{spec}' is a comparison, not an assignment");
            }
            (name.trim().to_string(), expression.trim().to_string())
        };
        if name.is_empty() {
            bail!("Derived column is missing a name");
        }
        if expression.is_empty() {
            bail!("Derived column '{name}' is missing an expression");
        }
        Ok(DerivedColumn {
            name,
            expression: rewrite_references(&expression),
        })
    }

    pub fn evaluate(
        &self,
        base: &HashMapContext,
        headers: &[String],
        raw_row: &[String],
        typed_row: &[Option<Value>],
        row_number: usize,
    ) -> Result<String> {
        let context = expr::row_context(base, headers, raw_row, typed_row, row_number)?;
        let result = expr::evaluate(&self.expression, &context)
            .with_context(|| format!("Evaluating expression for column '{}'", self.name))?;
        Ok(evalexpr_to_cell(result))
    }
}
