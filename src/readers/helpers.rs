// src/readers/helpers.rs

//! Miscellaneous helper functions for _Readers_.

use std;

use crate::common::FPath;

/// Helper function for a slightly annoying set of calls.
pub fn path_to_fpath(path: &std::path::Path) -> FPath {
    // `PathBuf` to `String` https://stackoverflow.com/q/37388107/471376
    (*(path.to_string_lossy())).to_string()
}

/// Helper function for completeness.
pub fn fpath_to_path(path: &FPath) -> &std::path::Path {
    std::path::Path::new(path)
}

/// Absolute `FPath` of `path`, relative paths are taken from the current
/// directory. The file need not exist.
pub fn absolute_fpath(path: &std::path::Path) -> std::io::Result<FPath> {
    if path.is_absolute() {
        return Ok(path_to_fpath(path));
    }
    let cwd = std::env::current_dir()?;

    Ok(path_to_fpath(&cwd.join(path)))
}
