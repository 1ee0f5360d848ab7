use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use log::{debug, info, warn};
use serde::Serialize;
use wait_timeout::ChildExt;

use crate::compiler::SolutionBinary;
use crate::error::{ExecutionFailure, PipelineError};

/// One finished test case: its input and the reference output next to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseArtifact {
    pub index: usize,
    pub input: PathBuf,
    pub output: PathBuf,
}

pub fn input_file_name(index: usize) -> String {
    format!("input{index}.txt")
}

pub fn output_file_name(index: usize) -> String {
    format!("output{index}.txt")
}

#[derive(Debug)]
enum ProcessResult {
    Exited(ExitStatus, Vec<u8>),
    Timeout,
}

/// Puts the child in a process group of its own, so a timeout can take down
/// everything it forked.
pub(crate) fn isolate(cmd: &mut Command) -> &mut Command {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0)
        } else {
            cmd
        }
    }
}

/// Kills the process group led by `child`. Falls back to the child alone.
pub(crate) fn kill_group(child: &mut Child) {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            // SAFETY: plain syscall; the pid names a group created by `isolate`.
            let ret = unsafe { libc::kill(-(child.id() as libc::pid_t), libc::SIGKILL) };
            if ret == 0 {
                return;
            }
        }
    }
    let _ = child.kill();
}

fn execute(exe: &Path, stdin: File, limit: Duration) -> Result<ProcessResult, ExecutionFailure> {
    let mut child = isolate(
        Command::new(exe)
            .stdin(Stdio::from(stdin))
            .stdout(Stdio::piped()),
    )
    .spawn()
    .map_err(ExecutionFailure::Launch)?;

    let mut stdout = child.stdout.take();
    let reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stdout.as_mut() {
            pipe.read_to_end(&mut buf)?;
        }
        Ok::<_, std::io::Error>(buf)
    });

    let status = match child.wait_timeout(limit).map_err(ExecutionFailure::Output)? {
        Some(status) => status,
        None => {
            kill_group(&mut child);
            child.wait().map_err(ExecutionFailure::Output)?;
            // Not joined: a stray holder of the pipe would block us past the limit.
            drop(reader);
            return Ok(ProcessResult::Timeout);
        }
    };

    // Background leftovers would keep stdout open forever.
    kill_group(&mut child);

    let output = reader
        .join()
        .map_err(|_| {
            ExecutionFailure::Output(std::io::Error::other("stdout reader panicked"))
        })?
        .map_err(ExecutionFailure::Output)?;

    Ok(ProcessResult::Exited(status, output))
}

fn killed_by(status: &ExitStatus) -> Option<i32> {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            use std::os::unix::process::ExitStatusExt;
            status.signal()
        } else {
            let _ = status;
            None
        }
    }
}

/// Runs the reference solution on `input` and stores its right-trimmed stdout
/// as `output{index}.txt` in `tests_dir`.
///
/// Without a binary the case is skipped. A non-zero exit code still records
/// the output; a signal or a timeout does not.
pub fn run_case(
    input: &Path,
    tests_dir: &Path,
    index: usize,
    binary: Option<&SolutionBinary>,
    limit: Duration,
) -> Result<TestCaseArtifact, PipelineError> {
    let fail = |failure| PipelineError::Execution { index, failure };

    let binary = binary.ok_or_else(|| fail(ExecutionFailure::NotCompiled))?;
    let stdin = File::open(input).map_err(|e| fail(ExecutionFailure::Launch(e)))?;

    let (status, stdout) = match execute(binary.path(), stdin, limit).map_err(fail)? {
        ProcessResult::Exited(status, stdout) => (status, stdout),
        ProcessResult::Timeout => return Err(fail(ExecutionFailure::TimedOut(limit))),
    };

    if let Some(signal) = killed_by(&status) {
        return Err(fail(ExecutionFailure::Signal(signal)));
    }
    if !status.success() {
        warn!("Solution exited with {status} on case {index}; keeping its output");
    }

    let stdout = String::from_utf8_lossy(&stdout);
    let output = tests_dir.join(output_file_name(index));
    fs::write(&output, stdout.trim_end()).map_err(|e| fail(ExecutionFailure::Output(e)))?;
    info!("Solution output saved to {}", output.display());
    debug!("Case {index} output: {} bytes", stdout.trim_end().len());

    Ok(TestCaseArtifact {
        index,
        input: input.to_path_buf(),
        output,
    })
}
