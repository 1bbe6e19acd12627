//! Scratch files for multi-pass work such as large delta chains.

use std::fs::File;

use crate::UtilError;

/// Open an anonymous temporary file for read/write scratch use.
///
/// The file has no name in the filesystem and disappears when the last
/// handle is dropped.
pub fn scratch_file() -> Result<File, UtilError> {
    Ok(tempfile::tempfile()?)
}

/// Create a named temporary file in `dir`, returning the handle and its
/// guard. The file is removed when the guard is dropped.
pub fn named_in(dir: &std::path::Path) -> Result<tempfile::NamedTempFile, UtilError> {
    Ok(tempfile::NamedTempFile::new_in(dir)?)
}
