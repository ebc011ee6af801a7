//! Destination resolution
//!
//! Maps the optional directory and file name of a request onto the absolute
//! path a download writes to. Missing parts fall back to the temp folder and
//! a generated name.

use getr_types::KnownFolders;
use std::io;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Resolve the destination path for a download.
///
/// Empty values count as unset. Relative results are anchored at the
/// current working directory.
pub fn resolve_destination(
    directory: Option<&Path>,
    file_name: Option<&str>,
    folders: &KnownFolders,
) -> io::Result<PathBuf> {
    let directory = directory.filter(|d| !d.as_os_str().is_empty());
    let file_name = file_name.filter(|n| !n.is_empty());

    let base = match directory {
        Some(dir) => dir.to_path_buf(),
        None => folders.temp.clone(),
    };
    let name = match file_name {
        Some(name) => name.to_string(),
        None => generate_file_name(),
    };

    absolute(base.join(name))
}

/// Name used when a request does not provide one
pub fn generate_file_name() -> String {
    Uuid::new_v4().simple().to_string()
}

fn absolute(path: PathBuf) -> io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path)
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}
