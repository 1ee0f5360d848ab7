use anyhow::{Context, Result};
use log::debug;
use std::fs;
use std::path::{Path, PathBuf};

/// Static files shipped next to the grading script, as
/// `(name in the template directory, name in the bundle)`.
pub const STATIC_ASSETS: [(&str, &str); 3] = [
    ("run_autograder_template", "run_autograder"),
    ("setup.sh", "setup.sh"),
    ("requirements.txt", "requirements.txt"),
];

/// Collects all files from a directory recursively
pub fn collect_files(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();

    if !dir.is_dir() {
        return Err(anyhow::anyhow!(
            "Path is not a directory: {}",
            dir.display()
        ));
    }

    for entry in fs::read_dir(dir).context("Failed to read directory")? {
        let entry = entry.context("Failed to read directory entry")?;
        let path = entry.path();

        if path.is_file() {
            files.push(path);
        } else if path.is_dir() {
            files.extend(collect_files(&path)?);
        }
    }

    files.sort();
    Ok(files)
}

fn is_fixture(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let Some(stem) = name.strip_suffix(".txt") else {
        return false;
    };
    let digits = stem
        .strip_prefix("input")
        .or_else(|| stem.strip_prefix("output"));
    matches!(digits, Some(d) if !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
}

/// Number of input/output pairs in `tests_dir`, assuming each input has its
/// output.
pub fn count_test_pairs(tests_dir: &Path) -> Result<usize> {
    let fixtures = collect_files(tests_dir)?
        .into_iter()
        .filter(|p| is_fixture(p))
        .count();
    Ok(fixtures / 2)
}

/// Copies the static assets into `work_dir`, making the shell scripts
/// executable.
pub fn copy_static_assets(templates_dir: &Path, work_dir: &Path) -> Result<()> {
    for (from, to) in STATIC_ASSETS {
        let src = templates_dir.join(from);
        let dst = work_dir.join(to);
        fs::copy(&src, &dst)
            .with_context(|| format!("Failed to copy {} to {}", src.display(), dst.display()))?;
        debug!("Copied {} to {}", src.display(), dst.display());

        #[cfg(unix)]
        if to != "requirements.txt" {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&dst, fs::Permissions::from_mode(0o755))?;
        }
    }
    Ok(())
}
