//! Temp-file-then-rename writes.

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{OutputError, Result};

/// Writes `bytes` to `path` so readers never observe a partial file.
///
/// The content goes to a sibling `.tmp` file first, is synced, and then
/// renamed over the target.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| OutputError::io("create_dir", parent, e))?;
    }

    let mut temp_name = path.as_os_str().to_owned();
    temp_name.push(".tmp");
    let temp_path = PathBuf::from(temp_name);

    {
        let mut file =
            File::create(&temp_path).map_err(|e| OutputError::io("create", &temp_path, e))?;
        file.write_all(bytes)
            .map_err(|e| OutputError::io("write", &temp_path, e))?;
        file.sync_all()
            .map_err(|e| OutputError::io("sync", &temp_path, e))?;
    }

    fs::rename(&temp_path, path).map_err(|e| {
        let _ = fs::remove_file(&temp_path);
        OutputError::AtomicWriteFailed {
            temp_path: temp_path.clone(),
            target_path: path.to_path_buf(),
            source: e,
        }
    })
}
