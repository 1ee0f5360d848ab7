use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Why the reference solution produced no expected output for a section.
#[derive(Error, Debug)]
pub enum ExecutionFailure {
    #[error("no compiled solution available")]
    NotCompiled,
    #[error("could not launch solution: {0}")]
    Launch(io::Error),
    #[error("timed out after {0:?}")]
    TimedOut(Duration),
    #[error("killed by {}", signal_name(.0))]
    Signal(i32),
    #[error("could not read solution output: {0}")]
    Output(io::Error),
}

/// Failures the pipeline reports by kind. Anything else travels as a plain
/// `anyhow::Error` with context attached.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing required input file {}", .0.display())]
    MissingInput(PathBuf),
    #[error("could not launch compiler `{compiler}`: {error}")]
    CompilerLaunch { compiler: String, error: io::Error },
    #[error("compilation of {} failed:\n{stderr}", .path.display())]
    Compilation { path: PathBuf, stderr: String },
    #[error("compilation of {} timed out after {limit:?}", .path.display())]
    CompileTimeout { path: PathBuf, limit: Duration },
    #[error("case {index}: {failure}")]
    Execution {
        index: usize,
        failure: ExecutionFailure,
    },
    #[error("grading script template {} not found", .0.display())]
    TemplateMissing(PathBuf),
    #[error("template {} has no `{anchor}` line", .path.display())]
    TemplateAnchor { path: PathBuf, anchor: &'static str },
    #[error("no test cases found in {}", .0.display())]
    NoTestCases(PathBuf),
}

pub(crate) fn signal_name(signal: &i32) -> &'static str {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            match *signal {
                libc::SIGABRT => "SIGABRT",
                libc::SIGSEGV => "SIGSEGV",
                libc::SIGFPE => "SIGFPE",
                libc::SIGBUS => "SIGBUS",
                libc::SIGKILL => "SIGKILL",
                libc::SIGTERM => "SIGTERM",
                _ => "a signal",
            }
        } else {
            let _ = signal;
            "a signal"
        }
    }
}
