// src/debug/helpers.rs

//! Temporary file helpers for testing.

use crate::common::FPath;

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;

use ::lazy_static::lazy_static;
#[allow(unused_imports)]
use ::si_trace_print::{defo, defñ};

#[doc(hidden)]
pub use ::tempfile::NamedTempFile;
#[doc(hidden)]
pub use ::tempfile::TempDir;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// temporary file helper functions
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// NamedTempFile instances default to this file name prefix.
///
/// See <https://github.com/Stebalien/tempfile/issues/183>.
pub const STR_TEMPFILE_PREFIX: &str = "tmp-logsnap-test-";

lazy_static! {
    pub static ref STRING_TEMPFILE_PREFIX: String = String::from(STR_TEMPFILE_PREFIX);
}

/// Small helper function for copying `NamedTempFile` path to a `FPath`.
pub fn ntf_fpath(ntf: &NamedTempFile) -> FPath {
    FPath::from(ntf.path().to_str().unwrap())
}

/// Testing helper function to write a `[u8]` to a temporary file.
///
/// BUG: `NamedTempFile` created within `lazy_static` will fail to remove itself
///      <https://github.com/Stebalien/tempfile/issues/183>.
pub fn create_temp_file_bytes(data: &[u8]) -> NamedTempFile {
    let mut ntf = match ::tempfile::Builder::new()
        // use known prefix for easier cleanup
        .prefix::<str>(&STRING_TEMPFILE_PREFIX)
        .tempfile()
    {
        Ok(val) => val,
        Err(err) => {
            panic!("tempfile::Builder::new()..tempfile() return Err {}", err);
        }
    };
    match ntf.write_all(data) {
        Ok(_) => {}
        Err(err) => {
            panic!("NamedTempFile::write_all() return Err {}", err);
        }
    }
    defo!("created {:?} with {} bytes", ntf.path(), data.len());

    ntf
}

/// Testing helper function to write a `str` to a temporary file.
pub fn create_temp_file(data: &str) -> NamedTempFile {
    create_temp_file_bytes(data.as_bytes())
}

/// Testing helper function to append `data` to an existing file.
pub fn append_to_file(path: &Path, data: &[u8]) {
    defñ!("({:?}, {} bytes)", path, data.len());
    let mut file = match OpenOptions::new().append(true).open(path) {
        Ok(f) => f,
        Err(err) => panic!("OpenOptions::open({:?}) return Err {}", path, err),
    };
    file.write_all(data).unwrap();
}

/// Testing helper function to replace the entire content of an existing file.
pub fn rewrite_file(path: &Path, data: &[u8]) {
    defñ!("({:?}, {} bytes)", path, data.len());
    let mut file = match File::create(path) {
        Ok(f) => f,
        Err(err) => panic!("File::create({:?}) return Err {}", path, err),
    };
    file.write_all(data).unwrap();
}

/// Create a temporary directory
pub fn create_temp_dir() -> TempDir {
    defñ!();
    ::tempfile::Builder::new()
        .prefix::<str>(&STRING_TEMPFILE_PREFIX)
        .tempdir()
        .unwrap()
}

/// Testing helper function to write a `[u8]` to file `name` in `tempdir`.
/// Returns the path of the new file.
pub fn create_file_bytes_name_in_tmpdir(
    data: &[u8],
    name: &str,
    tempdir: &TempDir,
) -> FPath {
    let path = tempdir.path().join(name);
    defo!("File::create({:?})", path);
    rewrite_file(&path, data);

    FPath::from(path.to_str().unwrap())
}
