use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use log::{error, info};
use serde::Serialize;

use crate::compiler::SolutionBinary;
use crate::runner::{input_file_name, run_case, TestCaseArtifact};

pub const DEFAULT_DELIMITER: &str = "---";

/// One test case cut out of the raw test file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestSection {
    /// 1-based, contiguous in file order.
    pub index: usize,
    pub lines: Vec<String>,
}

impl TestSection {
    /// Every line right-trimmed and newline-terminated, then blank lines
    /// stripped off both ends of the whole text.
    pub fn serialize(&self) -> String {
        let joined: String = self
            .lines
            .iter()
            .map(|line| format!("{}\n", line.trim_end()))
            .collect();
        joined.trim_matches('\n').to_string()
    }
}

/// Lazily splits lines into sections at every delimiter line.
///
/// Chunks holding nothing but blank lines never become sections and don't use
/// up an index. The Python tool this replaces wrote those out as empty
/// `input{N}.txt` files instead.
pub struct Sections<'a, I> {
    lines: I,
    delimiter: &'a str,
    next_index: usize,
    pending: Vec<String>,
    done: bool,
}

impl<'a, I> Sections<'a, I>
where
    I: Iterator<Item = &'a str>,
{
    pub fn new(lines: I, delimiter: &'a str) -> Self {
        Self {
            lines,
            delimiter,
            next_index: 1,
            pending: Vec::new(),
            done: false,
        }
    }

    fn flush(&mut self) -> Option<TestSection> {
        let lines = std::mem::take(&mut self.pending);
        if lines.iter().all(|line| line.trim().is_empty()) {
            return None;
        }
        let section = TestSection {
            index: self.next_index,
            lines,
        };
        self.next_index += 1;
        Some(section)
    }
}

impl<'a, I> Iterator for Sections<'a, I>
where
    I: Iterator<Item = &'a str>,
{
    type Item = TestSection;

    fn next(&mut self) -> Option<TestSection> {
        if self.done {
            return None;
        }
        while let Some(line) = self.lines.next() {
            if line.trim() == self.delimiter {
                if let Some(section) = self.flush() {
                    return Some(section);
                }
            } else {
                self.pending.push(line.trim_end().to_string());
            }
        }
        self.done = true;
        self.flush()
    }
}

pub fn split_sections<'a>(content: &'a str, delimiter: &'a str) -> Sections<'a, std::str::Lines<'a>> {
    Sections::new(content.lines(), delimiter)
}

#[derive(Debug, Serialize)]
pub struct SkippedCase {
    pub index: usize,
    pub reason: String,
}

#[derive(Debug, Default, Serialize)]
pub struct SplitReport {
    pub sections: usize,
    pub artifacts: Vec<TestCaseArtifact>,
    pub skipped: Vec<SkippedCase>,
}

/// Writes every section of `raw` to `tests_dir/input{N}.txt` and runs the
/// solution on it before moving on to the next one.
///
/// With a binary, a section the solution fails on is dropped entirely and the
/// next section takes over its file number, so `tests_dir` only ever holds
/// complete, contiguous pairs. Without one every input is kept.
pub fn split_file_and_run(
    raw: &Path,
    tests_dir: &Path,
    delimiter: &str,
    binary: Option<&SolutionBinary>,
    run_limit: Duration,
) -> Result<SplitReport> {
    let content = fs::read_to_string(raw)
        .with_context(|| format!("Failed to read test file {}", raw.display()))?;
    fs::create_dir_all(tests_dir)
        .with_context(|| format!("Failed to create {}", tests_dir.display()))?;

    let mut report = SplitReport::default();
    let mut case = 1;
    for section in split_sections(&content, delimiter) {
        let input = tests_dir.join(input_file_name(case));
        fs::write(&input, section.serialize())
            .with_context(|| format!("Failed to write {}", input.display()))?;
        info!("Written section {} to {}", section.index, input.display());
        report.sections += 1;

        match run_case(&input, tests_dir, case, binary, run_limit) {
            Ok(artifact) => {
                report.artifacts.push(artifact);
                case += 1;
            }
            Err(e) => {
                error!("Skipping section {}: {e}", section.index);
                if binary.is_some() {
                    fs::remove_file(&input)
                        .with_context(|| format!("Failed to remove {}", input.display()))?;
                } else {
                    case += 1;
                }
                report.skipped.push(SkippedCase {
                    index: section.index,
                    reason: e.to_string(),
                });
            }
        }
    }

    Ok(report)
}
