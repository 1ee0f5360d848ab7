use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::compiler::CompilerOptions;
use crate::pipeline::PipelineOptions;
use crate::script::Visibility;
use crate::test_parser::DEFAULT_DELIMITER;

/// Turn a test case file and a reference solution into a Gradescope
/// autograder bundle.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Test case file, cases separated by delimiter lines
    pub input: PathBuf,

    /// Reference solution source file
    pub solution: PathBuf,

    /// Where to write the bundle
    #[arg(short = 'o', long, default_value = "autograder.zip")]
    pub output: PathBuf,

    /// Directory holding the grading script template and static assets
    #[arg(short = 't', long, default_value = "template_files")]
    pub templates: PathBuf,

    /// Compiler used for the reference solution
    #[arg(long, default_value = "g++")]
    pub compiler: String,

    /// Add comma-separated args for compiler
    #[arg(short = 'a', long, allow_hyphen_values = true)]
    pub args: Option<String>,

    /// Student file name the grading script compiles (defaults to the solution's name)
    #[arg(long)]
    pub student_file: Option<String>,

    /// Visibility of every test case on Gradescope
    #[arg(long, value_enum, default_value_t = Visibility::Visible)]
    pub visibility: Visibility,

    /// Line separating two test cases
    #[arg(long, default_value = DEFAULT_DELIMITER)]
    pub delimiter: String,

    /// Compiler time limit (60 seconds)
    #[arg(long, value_parser = clap::value_parser!(u32), default_value = "60")]
    pub limit_compile: u32,

    /// Execution time limit per test case (5 seconds)
    #[arg(long, value_parser = clap::value_parser!(u32), default_value = "5")]
    pub limit_run: u32,

    /// Keep going when the solution fails to compile
    #[arg(long)]
    pub keep_going: bool,

    /// Keep the build directory instead of deleting it
    #[arg(long)]
    pub keep_build: bool,

    /// Print a JSON report
    #[arg(long)]
    pub json: bool,

    /// Terminal coloring
    #[arg(short = 'c', long, value_parser = ["on", "off"])]
    pub color: Option<String>,

    /// Quiet (use -q through -qq)
    #[arg(short = 'q', action = clap::ArgAction::Count, conflicts_with = "verbose")]
    pub quiet: u8,

    /// Verbose (use -v through -vv)
    #[arg(short = 'v', action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Cli {
    pub fn log_level(&self) -> log::LevelFilter {
        match (self.quiet, self.verbose) {
            (0, 0) => log::LevelFilter::Info,
            (0, 1) => log::LevelFilter::Debug,
            (0, _) => log::LevelFilter::Trace,
            (1, _) => log::LevelFilter::Warn,
            _ => log::LevelFilter::Error,
        }
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        let args = self
            .args
            .as_deref()
            .map(|a| {
                a.split(',')
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        PipelineOptions {
            compiler: CompilerOptions {
                compiler: self.compiler.clone(),
                args,
                limit: Duration::from_secs(self.limit_compile.into()),
            },
            run_limit: Duration::from_secs(self.limit_run.into()),
            delimiter: self.delimiter.clone(),
            templates_dir: self.templates.clone(),
            output: self.output.clone(),
            student_file: self.student_file.clone(),
            visibility: self.visibility,
            keep_going: self.keep_going,
            keep_build: self.keep_build,
        }
    }
}
