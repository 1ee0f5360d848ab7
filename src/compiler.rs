use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{bail, Result};
use colored::Colorize;
use log::{debug, error, info, warn};
use wait_timeout::ChildExt;

use crate::error::PipelineError;
use crate::runner::{isolate, kill_group};

cfg_if::cfg_if! {
    if #[cfg(windows)] {
        const EXE_EXTENSION: &str = "exe";
    } else {
        const EXE_EXTENSION: &str = "";
    }
}

#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub compiler: String,
    /// Passed before the source file.
    pub args: Vec<String>,
    pub limit: Duration,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            compiler: "g++".to_string(),
            args: Vec::new(),
            limit: Duration::from_secs(60),
        }
    }
}

/// The compiled reference solution. The executable is removed when this is
/// dropped, whichever way the run ends.
#[derive(Debug)]
pub struct SolutionBinary {
    path: PathBuf,
}

impl SolutionBinary {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for SolutionBinary {
    fn drop(&mut self) {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed {}", self.path.display()),
            Err(e) => warn!("Could not remove {}: {e}", self.path.display()),
        }
    }
}

/// Where the executable for `source` goes: next to it, extension stripped.
pub fn executable_path(source: &Path) -> PathBuf {
    source.with_extension(EXE_EXTENSION)
}

pub fn compile_solution(
    source: &Path,
    options: &CompilerOptions,
) -> Result<SolutionBinary, PipelineError> {
    let exe_path = executable_path(source);

    let mut child = isolate(
        Command::new(&options.compiler)
            .args(&options.args)
            .arg(source)
            .arg("-o")
            .arg(&exe_path)
            .stdout(Stdio::null())
            .stderr(Stdio::piped()),
    )
    .spawn()
    .map_err(|error| PipelineError::CompilerLaunch {
        compiler: options.compiler.clone(),
        error,
    })?;

    // Drain stderr off-thread so a chatty compiler can't fill the pipe and stall.
    let mut stderr_pipe = child.stderr.take();
    let stderr_reader = thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(pipe) = stderr_pipe.as_mut() {
            let _ = pipe.read_to_end(&mut buf);
        }
        String::from_utf8_lossy(&buf).into_owned()
    });

    let status = child
        .wait_timeout(options.limit)
        .map_err(|error| PipelineError::CompilerLaunch {
            compiler: options.compiler.clone(),
            error,
        })?;

    let status = match status {
        Some(status) => status,
        None => {
            kill_group(&mut child);
            let _ = child.wait();
            // Left detached: a surviving driver subprocess may still hold stderr.
            drop(stderr_reader);
            // The compiler may have left a partial executable behind.
            let _ = fs::remove_file(&exe_path);
            error!("Compiling {} timed out", source.display());
            return Err(PipelineError::CompileTimeout {
                path: source.to_path_buf(),
                limit: options.limit,
            });
        }
    };

    kill_group(&mut child);
    let stderr = stderr_reader.join().unwrap_or_default();

    if !status.success() {
        error!("Compilation of {} failed ({status})", source.display());
        return Err(PipelineError::Compilation {
            path: source.to_path_buf(),
            stderr: stderr.trim_end().to_string(),
        });
    }

    if !stderr.trim().is_empty() {
        debug!("Compiler diagnostics:\n{}", stderr.trim_end());
    }

    info!("{}", format!("Compiled {} successfully", source.display()).green());
    Ok(SolutionBinary { path: exe_path })
}

/// Refuses sources that would be overwritten by their own executable.
pub(crate) fn check_source(source: &Path) -> Result<()> {
    if executable_path(source) == source {
        bail!(
            "Solution {} has no extension; its executable would overwrite it",
            source.display()
        );
    }
    Ok(())
}
