use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::debug;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

use crate::runner_file_utils::collect_files;

/// Zips every file under `dir` into `zip_path`, with paths relative to `dir`.
/// Returns the number of entries written.
pub fn zip_dir(dir: &Path, zip_path: &Path) -> Result<usize> {
    let files = collect_files(dir)?;
    let mut zip = ZipWriter::new(
        File::create(zip_path)
            .with_context(|| format!("Failed to create {}", zip_path.display()))?,
    );
    let options = SimpleFileOptions::default().compression_method(zip::CompressionMethod::Stored);

    for file in &files {
        let relative = file.strip_prefix(dir)?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_str())
            .collect::<Option<Vec<_>>>()
            .ok_or(anyhow!("Invalid path {}", relative.display()))?
            .join("/");

        let mut file_options = options;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            file_options = file_options.unix_permissions(fs::metadata(file)?.permissions().mode());
        }

        zip.start_file(name.clone(), file_options)?;
        zip.write_all(&fs::read(file)?)?;
        debug!("Added {name} to {}", zip_path.display());
    }

    zip.finish()?;
    Ok(files.len())
}
