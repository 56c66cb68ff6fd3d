//! Append-only store of previously generated mapping code.
//!
//! Durable state lives in a directory:
//! - `index.txt`, one free-text line per recorded mapping;
//! - `<input_stem>-<template_stem>.txt`, the mapping code itself.
//!
//! Lookups are best effort. In oracle mode the whole log is handed to the
//! oracle, which names a file; whatever it answers is only trusted once the
//! file actually opens. Every failure on the read path is a miss.

use std::path::PathBuf;

use log::{debug, info, warn};

use crate::{
    config::LookupMode,
    dataset::name_stem,
    error::RemapResult,
    io_utils,
    oracle::Oracle,
    program::MappingCode,
};

pub const INDEX_FILE: &str = "index.txt";

pub const MAP_SEARCH_PROMPT: &str = "
    Based on the following data:
    ```
    {database}
    ```
    Try to find the file name for mapping {input_df_name} to {template_df_name}. If you find it, return the file name.
    if you cannot find it just return `none`.
";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MappingRecord {
    pub template_name: String,
    pub input_name: String,
    pub path: PathBuf,
}

impl MappingRecord {
    pub fn log_line(&self) -> String {
        format!(
            "File name for mapping {} to {}: {}\n",
            self.input_name,
            self.template_name,
            self.path.display()
        )
    }
}

#[derive(Debug, Clone)]
pub struct CorrespondenceStore {
    dir: PathBuf,
    mode: LookupMode,
}

impl CorrespondenceStore {
    pub fn new(dir: impl Into<PathBuf>, mode: LookupMode) -> Self {
        CorrespondenceStore {
            dir: dir.into(),
            mode,
        }
    }

    pub fn index_path(&self) -> PathBuf {
        self.dir.join(INDEX_FILE)
    }

    /// Deterministic location for a (template, input) pair.
    pub fn mapping_path(&self, template_name: &str, input_name: &str) -> PathBuf {
        self.dir.join(format!(
            "{}-{}.txt",
            name_stem(input_name),
            name_stem(template_name)
        ))
    }

    pub fn lookup(
        &self,
        oracle: &dyn Oracle,
        template_name: &str,
        input_name: &str,
    ) -> Option<MappingCode> {
        let index_path = self.index_path();
        let database = match io_utils::load_text(&index_path) {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                debug!("Mapping log {index_path:?} is empty");
                return None;
            }
            Err(err) => {
                debug!("No usable mapping log: {err}");
                return None;
            }
        };
        let located = match self.mode {
            LookupMode::Exact => exact_match(&database, template_name, input_name),
            LookupMode::Oracle => {
                match self.ask_oracle(oracle, &database, template_name, input_name) {
                    Ok(answer) => answer,
                    Err(err) => {
                        warn!("Mapping search failed, generating new map code: {err}");
                        None
                    }
                }
            }
        }?;
        self.open(&located)
    }

    fn ask_oracle(
        &self,
        oracle: &dyn Oracle,
        database: &str,
        template_name: &str,
        input_name: &str,
    ) -> RemapResult<Option<String>> {
        let prompt = MAP_SEARCH_PROMPT
            .replace("{database}", database)
            .replace("{input_df_name}", input_name)
            .replace("{template_df_name}", template_name);
        let reply = oracle.complete(&prompt)?;
        debug!("Mapping search reply: {reply:?}");
        Ok(clean_answer(&reply))
    }

    fn open(&self, located: &str) -> Option<MappingCode> {
        for candidate in self.candidate_paths(located) {
            match io_utils::load_text(&candidate) {
                Ok(text) if !text.trim().is_empty() => {
                    info!("Found existing map code in {candidate:?}");
                    return Some(MappingCode::from_text(text));
                }
                Ok(_) => debug!("Mapping file {candidate:?} is empty"),
                Err(err) => debug!("Cannot use {candidate:?}: {err}"),
            }
        }
        None
    }

    fn candidate_paths(&self, located: &str) -> Vec<PathBuf> {
        let path = PathBuf::from(located);
        let mut candidates = vec![path.clone()];
        if path.is_relative() {
            if let Some(parent) = self.dir.parent() {
                candidates.push(parent.join(&path));
            }
            if let Some(file_name) = path.file_name() {
                candidates.push(self.dir.join(file_name));
            }
        }
        candidates.dedup();
        candidates
    }

    /// Writes the code to its derived path and appends one log line.
    pub fn record(
        &self,
        template_name: &str,
        input_name: &str,
        code: &MappingCode,
    ) -> RemapResult<MappingRecord> {
        let record = MappingRecord {
            template_name: template_name.to_string(),
            input_name: input_name.to_string(),
            path: self.mapping_path(template_name, input_name),
        };
        io_utils::save_text(&record.path, code.text())?;
        io_utils::append_text(&self.index_path(), &record.log_line())?;
        info!(
            "Saved mapping {} -> {} to {:?}",
            input_name, template_name, record.path
        );
        Ok(record)
    }
}

/// Newest log line naming exactly this pair.
fn exact_match(database: &str, template_name: &str, input_name: &str) -> Option<String> {
    let prefix = format!("File name for mapping {input_name} to {template_name}: ");
    database
        .lines()
        .rev()
        .find_map(|line| line.strip_prefix(prefix.as_str()))
        .map(|path| path.trim().to_string())
        .filter(|path| !path.is_empty())
}

/// Reduces an oracle reply to a path, or `None` for the `none` sentinel.
fn clean_answer(reply: &str) -> Option<String> {
    let strip = |s: &str| {
        s.trim()
            .trim_matches(|c: char| matches!(c, '`' | '"' | '\'' | '\n'))
            .trim()
            .to_string()
    };
    let cleaned = strip(reply);
    if cleaned.is_empty() || cleaned.eq_ignore_ascii_case("none") {
        return None;
    }
    if !cleaned.contains(char::is_whitespace) {
        return Some(cleaned);
    }
    // Prose answer: pick the token that looks like a saved mapping file.
    cleaned
        .split_whitespace()
        .map(|token| strip(token.trim_end_matches(['.', ',', ';'])))
        .find(|token| token.ends_with(".txt"))
}
