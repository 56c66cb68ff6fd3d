#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use csv_remap::{
    choice::{ChoiceField, ChoiceSource},
    config::RemapConfig,
    dataset::Dataset,
    error::{RemapError, RemapResult},
    oracle::Oracle,
};
use tempfile::{TempDir, tempdir};

pub const TEMPLATE_CSV: &str = "id,amount\n1,2.5\n2,4.75\n";
pub const INPUT_CSV: &str = "uid,amt,ts\n7,1.5,2024-01-01\n8,3.25,2024-01-02\n";

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

pub fn template() -> Dataset {
    Dataset::from_csv_str("template.csv", TEMPLATE_CSV).expect("template dataset")
}

pub fn input() -> Dataset {
    Dataset::from_csv_str("input.csv", INPUT_CSV).expect("input dataset")
}

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }

    pub fn store_dir(&self) -> PathBuf {
        self.path().join("saved")
    }

    /// Default settings with the store kept inside the workspace.
    pub fn config(&self) -> RemapConfig {
        RemapConfig {
            store_dir: self.store_dir(),
            ..RemapConfig::default()
        }
    }
}

/// Replays canned replies in order and remembers every prompt it was sent.
pub struct ScriptedOracle {
    replies: RefCell<VecDeque<String>>,
    prompts: RefCell<Vec<String>>,
}

impl ScriptedOracle {
    pub fn new(replies: &[&str]) -> Self {
        Self {
            replies: RefCell::new(replies.iter().map(|r| r.to_string()).collect()),
            prompts: RefCell::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.borrow().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.borrow().len()
    }

    pub fn remaining(&self) -> usize {
        self.replies.borrow().len()
    }
}

impl Oracle for ScriptedOracle {
    fn complete(&self, prompt: &str) -> RemapResult<String> {
        self.prompts.borrow_mut().push(prompt.to_string());
        self.replies
            .borrow_mut()
            .pop_front()
            .ok_or_else(|| RemapError::Oracle("scripted replies exhausted".to_string()))
    }
}

/// Answers choice prompts from a fixed list.
pub struct FixedChoices {
    answers: VecDeque<String>,
    pub asked: Vec<ChoiceField>,
}

impl FixedChoices {
    pub fn new(answers: &[&str]) -> Self {
        Self {
            answers: answers.iter().map(|a| a.to_string()).collect(),
            asked: Vec::new(),
        }
    }
}

impl ChoiceSource for FixedChoices {
    fn choose(&mut self, field: &ChoiceField) -> RemapResult<String> {
        self.asked.push(field.clone());
        Ok(self.answers.pop_front().unwrap_or_default())
    }
}
