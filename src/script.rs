use std::fmt;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use clap::ValueEnum;
use log::info;
use serde::Serialize;

use crate::error::PipelineError;
use crate::runner::{input_file_name, output_file_name};
use crate::runner_file_utils::count_test_pairs;

pub const TEMPLATE_NAME: &str = "run_tests_template.py";
pub const SCRIPT_NAME: &str = "run_tests_final.py";

const STUDENT_ANCHOR: &str = "student_cpp_path = \"LabX.cpp\"";
const CASES_ANCHOR: &str = "test_cases = []";

/// Gradescope visibility of a test case.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Visible,
    Hidden,
    AfterDueDate,
    AfterPublished,
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Visibility::Visible => "visible",
            Visibility::Hidden => "hidden",
            Visibility::AfterDueDate => "after_due_date",
            Visibility::AfterPublished => "after_published",
        })
    }
}

fn python_string(s: &str) -> String {
    format!("\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\""))
}

fn test_case_list(pairs: usize, visibility: Visibility) -> String {
    if pairs == 0 {
        return CASES_ANCHOR.to_string();
    }
    let tuples: Vec<String> = (1..=pairs)
        .map(|i| {
            format!(
                "({}, {}, {})",
                python_string(&format!("tests/{}", input_file_name(i))),
                python_string(&format!("tests/{}", output_file_name(i))),
                python_string(&visibility.to_string()),
            )
        })
        .collect();
    format!("test_cases = [\n    {}\n]", tuples.join(",\n    "))
}

/// Substitutes the student filename and `pairs` test cases into `template`.
pub fn render(
    template: &str,
    template_path: &Path,
    student_file: &str,
    pairs: usize,
    visibility: Visibility,
) -> Result<String, PipelineError> {
    for anchor in [STUDENT_ANCHOR, CASES_ANCHOR] {
        if !template.contains(anchor) {
            return Err(PipelineError::TemplateAnchor {
                path: template_path.to_path_buf(),
                anchor,
            });
        }
    }

    let student = format!("student_cpp_path = {}", python_string(student_file));
    Ok(template
        .replace(STUDENT_ANCHOR, &student)
        .replace(CASES_ANCHOR, &test_case_list(pairs, visibility)))
}

/// Renders the grading script for the fixtures in `tests_dir` and writes it
/// to `out`. Returns the number of test cases listed.
pub fn render_grading_script(
    template_path: &Path,
    tests_dir: &Path,
    student_file: &str,
    visibility: Visibility,
    out: &Path,
) -> Result<usize> {
    if !template_path.is_file() {
        return Err(PipelineError::TemplateMissing(template_path.to_path_buf()).into());
    }
    let template = fs::read_to_string(template_path)
        .with_context(|| format!("Failed to read {}", template_path.display()))?;

    let pairs = count_test_pairs(tests_dir)?;
    let script = render(&template, template_path, student_file, pairs, visibility)?;

    fs::write(out, script).with_context(|| format!("Failed to write {}", out.display()))?;
    info!("Updated grading script {} with {pairs} test cases", out.display());
    Ok(pairs)
}
