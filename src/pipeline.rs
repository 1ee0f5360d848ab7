use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;
use tempdir::TempDir;

use crate::archive::zip_dir;
use crate::compiler::{check_source, compile_solution, CompilerOptions};
use crate::error::PipelineError;
use crate::runner::TestCaseArtifact;
use crate::runner_file_utils::copy_static_assets;
use crate::script::{render_grading_script, Visibility, SCRIPT_NAME, TEMPLATE_NAME};
use crate::test_parser::{split_file_and_run, SkippedCase, DEFAULT_DELIMITER};

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub compiler: CompilerOptions,
    pub run_limit: Duration,
    pub delimiter: String,
    pub templates_dir: PathBuf,
    pub output: PathBuf,
    /// Defaults to the solution's file name.
    pub student_file: Option<String>,
    pub visibility: Visibility,
    /// Carry on without expected outputs when the solution doesn't compile.
    pub keep_going: bool,
    pub keep_build: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            compiler: CompilerOptions::default(),
            run_limit: Duration::from_secs(5),
            delimiter: DEFAULT_DELIMITER.to_string(),
            templates_dir: PathBuf::from("template_files"),
            output: PathBuf::from("autograder.zip"),
            student_file: None,
            visibility: Visibility::default(),
            keep_going: false,
            keep_build: false,
        }
    }
}

/// What ended up in a working directory.
#[derive(Debug, Serialize)]
pub struct BuildReport {
    pub sections: usize,
    pub cases: Vec<TestCaseArtifact>,
    pub skipped: Vec<SkippedCase>,
    pub listed_cases: usize,
}

#[derive(Debug, Serialize)]
pub struct PipelineReport {
    #[serde(flatten)]
    pub build: BuildReport,
    pub archive: PathBuf,
    /// Set when the working directory was kept.
    pub build_dir: Option<PathBuf>,
    pub elapsed_secs: f64,
}

fn require_file(path: &Path) -> Result<(), PipelineError> {
    if path.is_file() {
        Ok(())
    } else {
        Err(PipelineError::MissingInput(path.to_path_buf()))
    }
}

fn student_file_name(solution: &Path, options: &PipelineOptions) -> String {
    options.student_file.clone().unwrap_or_else(|| {
        solution
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    })
}

/// Compiles, splits, runs, renders and copies assets into `work_dir`.
///
/// The solution binary only lives for the duration of this call.
pub fn build_into(
    work_dir: &Path,
    input: &Path,
    solution: &Path,
    options: &PipelineOptions,
) -> Result<BuildReport> {
    check_source(solution)?;
    let tests_dir = work_dir.join("tests");
    fs::create_dir_all(&tests_dir)
        .with_context(|| format!("Failed to create {}", tests_dir.display()))?;

    let binary = match compile_solution(solution, &options.compiler) {
        Ok(binary) => Some(binary),
        Err(e) if options.keep_going => {
            warn!("{e}");
            warn!("Continuing without expected outputs");
            None
        }
        Err(e) => return Err(e.into()),
    };

    let split = split_file_and_run(
        input,
        &tests_dir,
        &options.delimiter,
        binary.as_ref(),
        options.run_limit,
    )?;
    let compiled = binary.is_some();
    drop(binary);

    if split.sections == 0 || (compiled && split.artifacts.is_empty()) {
        return Err(PipelineError::NoTestCases(input.to_path_buf()).into());
    }

    let listed_cases = render_grading_script(
        &options.templates_dir.join(TEMPLATE_NAME),
        &tests_dir,
        &student_file_name(solution, options),
        options.visibility,
        &work_dir.join(SCRIPT_NAME),
    )?;
    copy_static_assets(&options.templates_dir, work_dir)?;

    Ok(BuildReport {
        sections: split.sections,
        cases: split.artifacts,
        skipped: split.skipped,
        listed_cases,
    })
}

/// Runs the whole pipeline and writes the bundle to `options.output`.
///
/// The working directory is temporary and goes away with this call unless
/// `keep_build` is set.
pub fn generate(input: &Path, solution: &Path, options: &PipelineOptions) -> Result<PipelineReport> {
    require_file(input)?;
    require_file(solution)?;

    let start = Instant::now();
    let work_dir = TempDir::new("autograder_build").context("Failed to create build directory")?;
    info!("Generating files in {}", work_dir.path().display());

    let build = build_into(work_dir.path(), input, solution, options)?;
    info!("File generation completed");

    let entries = zip_dir(work_dir.path(), &options.output)?;
    info!("Created {} with {entries} files", options.output.display());

    let build_dir = if options.keep_build {
        Some(work_dir.into_path())
    } else {
        work_dir
            .close()
            .context("Failed to remove build directory")?;
        None
    };

    Ok(PipelineReport {
        build,
        archive: options.output.clone(),
        build_dir,
        elapsed_secs: start.elapsed().as_secs_f64(),
    })
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::compiler::executable_path;
    use crate::compiler::tests::{copy_compiler, failing_compiler};
    use crate::runner_file_utils::STATIC_ASSETS;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use zip::ZipArchive;

    const TEMPLATE: &str =
        "def grade():\n    student_cpp_path = \"LabX.cpp\"\n    test_cases = []\n";

    struct Fixture {
        dir: TempDir,
        options: PipelineOptions,
    }

    impl Fixture {
        fn new(raw: &str) -> Self {
            let dir = TempDir::new("pipeline_test").unwrap();
            let templates = dir.path().join("template_files");
            fs::create_dir(&templates).unwrap();
            fs::write(templates.join(TEMPLATE_NAME), TEMPLATE).unwrap();
            for (from, _) in STATIC_ASSETS {
                fs::write(templates.join(from), "#!/bin/sh\n").unwrap();
            }
            fs::write(dir.path().join("cases.txt"), raw).unwrap();

            let options = PipelineOptions {
                compiler: copy_compiler(dir.path()),
                templates_dir: templates,
                output: dir.path().join("autograder.zip"),
                ..Default::default()
            };
            Self { dir, options }
        }

        fn solution(&self, name: &str, body: &str) -> PathBuf {
            let path = self.dir.path().join(name);
            fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            path
        }

        fn input(&self) -> PathBuf {
            self.dir.path().join("cases.txt")
        }

        fn work_dir(&self) -> PathBuf {
            let work = self.dir.path().join("build");
            fs::create_dir(&work).unwrap();
            work
        }
    }

    const SUM: &str = "awk '{ s += $1 } END { print s }'";

    #[test]
    fn sums_two_sections() {
        let fx = Fixture::new("3\n4\n---\n5\n6\n");
        let solution = fx.solution("Lab1.sh", SUM);
        let work = fx.work_dir();

        let report = build_into(&work, &fx.input(), &solution, &fx.options).unwrap();

        assert_eq!(report.sections, 2);
        assert_eq!(report.listed_cases, 2);
        let read = |name: &str| fs::read_to_string(work.join("tests").join(name)).unwrap();
        assert_eq!(read("input1.txt"), "3\n4");
        assert_eq!(read("output1.txt"), "7");
        assert_eq!(read("input2.txt"), "5\n6");
        assert_eq!(read("output2.txt"), "11");

        let script = fs::read_to_string(work.join(SCRIPT_NAME)).unwrap();
        assert!(script.contains("student_cpp_path = \"Lab1.sh\""));
        assert!(script.contains("(\"tests/input2.txt\", \"tests/output2.txt\", \"visible\")"));
        assert!(work.join("run_autograder").exists());
        assert!(!executable_path(&solution).exists());
    }

    #[test]
    fn compile_failure_stops_before_any_section() {
        let mut fx = Fixture::new("1\n---\n2\n");
        fx.options.compiler = failing_compiler(fx.dir.path());
        let solution = fx.solution("Broken.cpp", "");
        let work = fx.work_dir();

        let err = build_into(&work, &fx.input(), &solution, &fx.options).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::Compilation { .. })
        ));
        assert_eq!(fs::read_dir(work.join("tests")).unwrap().count(), 0);
        assert!(!work.join(SCRIPT_NAME).exists());
    }

    #[test]
    fn keep_going_writes_inputs_only() {
        let mut fx = Fixture::new("1\n---\n2\n");
        fx.options.compiler = failing_compiler(fx.dir.path());
        fx.options.keep_going = true;
        let solution = fx.solution("Broken.cpp", "");
        let work = fx.work_dir();

        let report = build_into(&work, &fx.input(), &solution, &fx.options).unwrap();

        assert_eq!(report.sections, 2);
        assert!(report.cases.is_empty());
        assert_eq!(report.skipped.len(), 2);
        assert!(work.join("tests/input2.txt").exists());
        assert!(!work.join("tests/output1.txt").exists());
    }

    #[test]
    fn timed_out_case_gives_up_its_number() {
        let mut fx = Fixture::new("slow\n---\nfast\n---\nfast2\n");
        fx.options.run_limit = Duration::from_millis(300);
        let solution = fx.solution(
            "Lab.sh",
            "read line; if [ \"$line\" = slow ]; then sleep 10; fi; echo \"$line\"",
        );
        let work = fx.work_dir();

        let report = build_into(&work, &fx.input(), &solution, &fx.options).unwrap();

        assert_eq!(report.sections, 3);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].index, 1);
        assert_eq!(report.cases.len(), 2);
        assert_eq!(report.listed_cases, 2);

        let read = |name: &str| fs::read_to_string(work.join("tests").join(name)).unwrap();
        assert_eq!(read("input1.txt"), "fast");
        assert_eq!(read("output1.txt"), "fast");
        assert_eq!(read("input2.txt"), "fast2");
        assert_eq!(read("output2.txt"), "fast2");
        assert!(!work.join("tests/input3.txt").exists());

        let script = fs::read_to_string(work.join(SCRIPT_NAME)).unwrap();
        assert!(script.contains("(\"tests/input1.txt\", \"tests/output1.txt\", \"visible\")"));
        assert!(script.contains("(\"tests/input2.txt\", \"tests/output2.txt\", \"visible\")"));
        assert!(!script.contains("input3.txt"));
    }

    #[test]
    fn every_case_failing_is_rejected() {
        let fx = Fixture::new("1\n---\n2\n");
        let solution = fx.solution("Lab.sh", "kill -SEGV $$");
        let work = fx.work_dir();

        let err = build_into(&work, &fx.input(), &solution, &fx.options).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoTestCases(_))
        ));
        assert!(!work.join(SCRIPT_NAME).exists());
    }

    #[test]
    fn empty_input_is_rejected() {
        let fx = Fixture::new("---\n\n---\n");
        let solution = fx.solution("Lab.sh", "cat");
        let work = fx.work_dir();

        let err = build_into(&work, &fx.input(), &solution, &fx.options).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::NoTestCases(_))
        ));
    }

    #[test]
    fn missing_template_is_fatal() {
        let fx = Fixture::new("1\n");
        fs::remove_file(fx.options.templates_dir.join(TEMPLATE_NAME)).unwrap();
        let solution = fx.solution("Lab.sh", "cat");

        let err = generate(&fx.input(), &solution, &fx.options).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::TemplateMissing(_))
        ));
        assert!(!fx.options.output.exists());
        assert!(!executable_path(&solution).exists());
    }

    #[test]
    fn missing_input_is_reported() {
        let fx = Fixture::new("1\n");
        let solution = fx.solution("Lab.sh", "cat");

        let err = generate(&fx.dir.path().join("nope.txt"), &solution, &fx.options).unwrap_err();

        assert!(matches!(
            err.downcast_ref::<PipelineError>(),
            Some(PipelineError::MissingInput(_))
        ));
    }

    #[test]
    fn generates_bundle_and_cleans_up() {
        let fx = Fixture::new("a\n---\nb\n---\nc\n");
        let solution = fx.solution("Echo.sh", "cat");

        let report = generate(&fx.input(), &solution, &fx.options).unwrap();

        assert_eq!(report.build.cases.len(), 3);
        assert!(report.build_dir.is_none());
        assert!(!report.build.cases[0].input.exists());
        assert!(!executable_path(&solution).exists());

        let mut archive = ZipArchive::new(File::open(&report.archive).unwrap()).unwrap();
        for name in [
            "run_autograder",
            "setup.sh",
            "requirements.txt",
            SCRIPT_NAME,
            "tests/input3.txt",
            "tests/output3.txt",
        ] {
            assert!(archive.by_name(name).is_ok(), "{name} missing from bundle");
        }
        assert_eq!(archive.len(), 10);
    }

    #[test]
    fn keep_build_leaves_directory() {
        let mut fx = Fixture::new("a\n");
        fx.options.keep_build = true;
        let solution = fx.solution("Echo.sh", "cat");

        let report = generate(&fx.input(), &solution, &fx.options).unwrap();

        let build_dir = report.build_dir.unwrap();
        assert!(build_dir.join("tests/output1.txt").exists());
        fs::remove_dir_all(build_dir).unwrap();
    }
}
