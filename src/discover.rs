//! Finding the tarballs a batch flow should process.

use std::path::{Path, PathBuf};

use log::warn;
use walkdir::WalkDir;

use crate::error::{Error, Result};

pub const TAR_EXTENSION: &str = "tar";

fn has_tar_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == TAR_EXTENSION)
}

/// Recursively finds all `*.tar` files under `directory`, in file name order.
///
/// Entries that can't be read (including a missing `directory`) are logged and skipped.
pub fn find_tar_files(directory: &Path) -> Vec<PathBuf> {
    let mut tar_files = vec![];
    for entry in WalkDir::new(directory).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(err) => {
                warn!("Skipping unreadable path under {}: {err}", directory.display());
                continue;
            }
        };
        if entry.file_type().is_file() && has_tar_extension(entry.path()) {
            tar_files.push(entry.into_path());
        }
    }
    if tar_files.is_empty() {
        warn!("No .tar files found in directory: {}", directory.display());
    }
    tar_files
}

/// Expands a command-line input into tarballs: a single `.tar` file, or every `.tar` file in a
/// directory tree.
pub fn resolve_inputs(input: &Path) -> Result<Vec<PathBuf>> {
    if input.is_file() && has_tar_extension(input) {
        Ok(vec![input.to_path_buf()])
    } else if input.is_dir() {
        Ok(find_tar_files(input))
    } else {
        Err(Error::InvalidInput(format!(
            "{} is neither a .tar file nor a directory",
            input.display()
        )))
    }
}

/// Like [`resolve_inputs`], except that a path which doesn't exist is an empty batch.
pub fn resolve_inputs_allow_missing(input: &Path) -> Result<Vec<PathBuf>> {
    if input.exists() {
        resolve_inputs(input)
    } else {
        warn!("{} does not exist; no .tar files to process", input.display());
        Ok(vec![])
    }
}
