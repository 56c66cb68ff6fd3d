//! Expression evaluation context for mapping programs and agent probes.
//!
//! A base context carrying the helper functions is built once and cloned per
//! row; row values are bound by normalised column name and by `cN` position.
//! Nothing reachable from an expression performs I/O.

use anyhow::{Context, Result};
use chrono::{Duration, NaiveDate};
use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, EvalexprError, Function,
    HashMapContext, Value as EvalValue, eval_with_context,
};
use heck::{ToLowerCamelCase, ToSnakeCase, ToUpperCamelCase};
use regex::Regex;

use crate::data::{
    Value, evalexpr_to_cell, normalize_column_name, parse_naive_date, parse_naive_datetime,
    value_to_evalexpr,
};

type EvalResult = Result<EvalValue, EvalexprError>;

fn register<F>(context: &mut HashMapContext, name: &str, function: F) -> Result<()>
where
    F: Fn(&EvalValue) -> EvalResult + Send + Sync + Clone + 'static,
{
    context
        .set_function(name.to_string(), Function::new(function))
        .map_err(anyhow::Error::from)
        .with_context(|| format!("Registering function '{name}'"))
}

fn register_temporal_functions(context: &mut HashMapContext) -> Result<()> {
    register(context, "date_add", |arguments| {
        let args = expect_args(arguments, 2, "date_add")?;
        let date = parse_date_arg(&args[0])?;
        let days = parse_i64_arg(&args[1], "days")?;
        let result = Duration::try_days(days)
            .and_then(|delta| date.checked_add_signed(delta))
            .ok_or_else(|| eval_error("date_add overflow"))?;
        Ok(EvalValue::String(result.format("%Y-%m-%d").to_string()))
    })?;
    register(context, "date_diff_days", |arguments| {
        let args = expect_args(arguments, 2, "date_diff_days")?;
        let end = parse_date_arg(&args[0])?;
        let start = parse_date_arg(&args[1])?;
        Ok(EvalValue::Int((end - start).num_days()))
    })?;
    register(context, "date_format", |arguments| {
        let args = expect_args(arguments, 2, "date_format")?;
        let date = parse_date_arg(&args[0])?;
        let fmt = expect_string(&args[1], "format")?;
        Ok(EvalValue::String(date.format(fmt).to_string()))
    })?;
    register(context, "parse_date", |arguments| {
        let args = expect_args(arguments, 2, "parse_date")?;
        let raw = expect_string(&args[0], "value")?;
        let fmt = expect_string(&args[1], "format")?;
        let date = NaiveDate::parse_from_str(raw.trim(), fmt)
            .map_err(|err| eval_error(&format!("parse_date('{raw}', '{fmt}'): {err}")))?;
        Ok(EvalValue::String(date.format("%Y-%m-%d").to_string()))
    })?;
    register(context, "datetime_format", |arguments| {
        let args = expect_args(arguments, 2, "datetime_format")?;
        let raw = expect_string(&args[0], "datetime")?;
        let dt = parse_naive_datetime(raw).map_err(|err| eval_error(&err.to_string()))?;
        let fmt = expect_string(&args[1], "format")?;
        Ok(EvalValue::String(dt.format(fmt).to_string()))
    })?;
    register(context, "datetime_to_date", |arguments| {
        let args = expect_args(arguments, 1, "datetime_to_date")?;
        let raw = expect_string(&args[0], "datetime")?;
        let dt = parse_naive_datetime(raw).map_err(|err| eval_error(&err.to_string()))?;
        Ok(EvalValue::String(dt.date().format("%Y-%m-%d").to_string()))
    })?;
    Ok(())
}

fn register_string_functions(context: &mut HashMapContext) -> Result<()> {
    register(context, "lowercase", |arguments| {
        let args = expect_args(arguments, 1, "lowercase")?;
        Ok(EvalValue::String(expect_string(&args[0], "value")?.to_lowercase()))
    })?;
    register(context, "uppercase", |arguments| {
        let args = expect_args(arguments, 1, "uppercase")?;
        Ok(EvalValue::String(expect_string(&args[0], "value")?.to_uppercase()))
    })?;
    register(context, "trim", |arguments| {
        let args = expect_args(arguments, 1, "trim")?;
        Ok(EvalValue::String(expect_string(&args[0], "value")?.trim().to_string()))
    })?;
    register(context, "snake_case", |arguments| {
        let args = expect_args(arguments, 1, "snake_case")?;
        Ok(EvalValue::String(expect_string(&args[0], "value")?.to_snake_case()))
    })?;
    register(context, "camel_case", |arguments| {
        let args = expect_args(arguments, 1, "camel_case")?;
        Ok(EvalValue::String(
            expect_string(&args[0], "value")?.to_lower_camel_case(),
        ))
    })?;
    register(context, "pascal_case", |arguments| {
        let args = expect_args(arguments, 1, "pascal_case")?;
        Ok(EvalValue::String(
            expect_string(&args[0], "value")?.to_upper_camel_case(),
        ))
    })?;
    register(context, "substring", |arguments| {
        let args = expect_args(arguments, 3, "substring")?;
        let value = expect_string(&args[0], "value")?;
        let start = parse_i64_arg(&args[1], "start")?.max(0) as usize;
        let length = parse_i64_arg(&args[2], "length")?.max(0) as usize;
        Ok(EvalValue::String(
            value.chars().skip(start).take(length).collect(),
        ))
    })?;
    register(context, "regex_replace", |arguments| {
        let args = expect_args(arguments, 3, "regex_replace")?;
        let value = expect_string(&args[0], "value")?;
        let pattern = expect_string(&args[1], "pattern")?;
        let replacement = expect_string(&args[2], "replacement")?;
        let regex =
            Regex::new(pattern).map_err(|err| eval_error(&format!("Invalid regex: {err}")))?;
        Ok(EvalValue::String(
            regex.replace_all(value, replacement).into_owned(),
        ))
    })?;
    Ok(())
}

fn register_conversion_functions(context: &mut HashMapContext) -> Result<()> {
    register(context, "to_string", |arguments| {
        let args = expect_args(arguments, 1, "to_string")?;
        Ok(EvalValue::String(evalexpr_to_cell(args[0].clone())))
    })?;
    register(context, "to_int", |arguments| {
        let args = expect_args(arguments, 1, "to_int")?;
        match &args[0] {
            EvalValue::Int(i) => Ok(EvalValue::Int(*i)),
            EvalValue::Float(f) => Ok(EvalValue::Int(f.trunc() as i64)),
            EvalValue::Boolean(b) => Ok(EvalValue::Int(i64::from(*b))),
            EvalValue::String(s) => {
                let cleaned = s.trim().replace(',', "");
                cleaned
                    .parse::<i64>()
                    .or_else(|_| cleaned.parse::<f64>().map(|f| f.trunc() as i64))
                    .map(EvalValue::Int)
                    .map_err(|_| eval_error(&format!("to_int cannot convert '{s}'")))
            }
            other => Err(eval_error(&format!("to_int cannot convert {other:?}"))),
        }
    })?;
    register(context, "to_float", |arguments| {
        let args = expect_args(arguments, 1, "to_float")?;
        match &args[0] {
            EvalValue::Int(i) => Ok(EvalValue::Float(*i as f64)),
            EvalValue::Float(f) => Ok(EvalValue::Float(*f)),
            EvalValue::String(s) => s
                .trim()
                .replace(',', "")
                .parse::<f64>()
                .map(EvalValue::Float)
                .map_err(|_| eval_error(&format!("to_float cannot convert '{s}'"))),
            other => Err(eval_error(&format!("to_float cannot convert {other:?}"))),
        }
    })?;
    register(context, "coalesce", |arguments| {
        let args = expect_args(arguments, 2, "coalesce")?;
        let empty = matches!(&args[0], EvalValue::Empty)
            || matches!(&args[0], EvalValue::String(s) if s.is_empty());
        Ok(if empty { args[1].clone() } else { args[0].clone() })
    })?;
    Ok(())
}

fn expect_args(arguments: &EvalValue, expected: usize, name: &str) -> Result<Vec<EvalValue>, EvalexprError> {
    match arguments {
        EvalValue::Empty if expected == 0 => Ok(Vec::new()),
        value if expected == 1 && !matches!(value, EvalValue::Tuple(_)) => Ok(vec![value.clone()]),
        EvalValue::Tuple(values) => {
            if values.len() != expected {
                return Err(EvalexprError::wrong_function_argument_amount(
                    values.len(),
                    expected,
                ));
            }
            Ok(values.clone())
        }
        _ => Err(eval_error(&format!(
            "{name} expects {expected} arguments provided as a tuple"
        ))),
    }
}

fn eval_error(message: &str) -> EvalexprError {
    EvalexprError::CustomMessage(message.to_string())
}

fn parse_date_arg(value: &EvalValue) -> Result<NaiveDate, EvalexprError> {
    let raw = expect_string(value, "date")?;
    parse_naive_date(raw).map_err(|err| eval_error(&err.to_string()))
}

fn parse_i64_arg(value: &EvalValue, name: &str) -> Result<i64, EvalexprError> {
    match value {
        EvalValue::Int(i) => Ok(*i),
        EvalValue::Float(f) => Ok(*f as i64),
        other => Err(eval_error(&format!(
            "Expected integer for {name}, got {other:?}",
        ))),
    }
}

fn expect_string<'a>(value: &'a EvalValue, name: &str) -> Result<&'a str, EvalexprError> {
    if let EvalValue::String(s) = value {
        Ok(s)
    } else {
        Err(eval_error(&format!("Expected string for {name}")))
    }
}

/// Context with every helper function registered and no variables bound.
pub fn base_context() -> Result<HashMapContext> {
    let mut context = HashMapContext::new();
    register_temporal_functions(&mut context)?;
    register_string_functions(&mut context)?;
    register_conversion_functions(&mut context)?;
    Ok(context)
}

/// Clones `base` and binds one row. Typed cells win over raw strings.
pub fn row_context(
    base: &HashMapContext,
    headers: &[String],
    raw_row: &[String],
    typed_row: &[Option<Value>],
    row_number: usize,
) -> Result<HashMapContext> {
    let mut context = base.clone();
    for (idx, header) in headers.iter().enumerate() {
        let value = match typed_row.get(idx) {
            Some(Some(typed)) => value_to_evalexpr(typed),
            _ => EvalValue::String(raw_row.get(idx).cloned().unwrap_or_default()),
        };
        context
            .set_value(normalize_column_name(header), value.clone())
            .with_context(|| format!("Binding column '{header}'"))?;
        context
            .set_value(format!("c{idx}"), value)
            .with_context(|| format!("Binding column index {idx}"))?;
    }
    context
        .set_value("row_number".to_string(), EvalValue::Int(row_number as i64))
        .context("Binding row_number")?;
    Ok(context)
}

pub fn evaluate(expression: &str, context: &HashMapContext) -> Result<EvalValue> {
    eval_with_context(expression, context)
        .with_context(|| format!("Evaluating expression '{expression}'"))
}
