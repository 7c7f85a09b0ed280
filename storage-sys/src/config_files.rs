// SPDX-License-Identifier: GPL-3.0-only

//! Atomic configuration file writes
//!
//! Files are written to a temporary sibling in the target directory and then
//! renamed over the destination, so readers see either the old or the new
//! content and the rename never crosses a filesystem boundary.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use tracing::debug;

use crate::{Result, SysError};

/// Replace `path` with `contents`, creating parent directories as needed
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let dir = path
        .parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| {
            SysError::OperationFailed(format!("{} has no parent directory", path.display()))
        })?;
    let file_name = path
        .file_name()
        .ok_or_else(|| SysError::OperationFailed(format!("{} has no file name", path.display())))?;
    fs::create_dir_all(dir)?;

    let tmp_path = dir.join(format!(
        ".{}.tmp-{}",
        file_name.to_string_lossy(),
        std::process::id()
    ));
    let result = (|| -> Result<()> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o644)
            .open(&tmp_path)?;
        file.write_all(contents.as_bytes())?;
        file.sync_all()?;
        fs::rename(&tmp_path, path)?;
        // Persist the rename itself
        File::open(dir)?.sync_all()?;
        Ok(())
    })();
    match &result {
        Ok(()) => debug!("Wrote {}", path.display()),
        Err(_) => {
            let _ = fs::remove_file(&tmp_path);
        }
    }
    result
}

/// Remove `path`; a file that is already gone is not an error
pub fn remove_if_exists(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_into_missing_directories() {
        let root = tempfile::tempdir().expect("tempdir");
        let target = root.path().join("zram.conf.d").join("zram0-env");

        write_atomic(&target, "ZRAM_NUM_STR=0\n").expect("write");

        assert_eq!(fs::read_to_string(&target).expect("read"), "ZRAM_NUM_STR=0\n");
    }

    #[test]
    fn replaces_existing_content_without_leftovers() {
        let root = tempfile::tempdir().expect("tempdir");
        let target = root.path().join("zram.conf");
        write_atomic(&target, "zram\n").expect("first write");

        write_atomic(&target, "options zram num_devices=2\n").expect("second write");

        assert_eq!(
            fs::read_to_string(&target).expect("read"),
            "options zram num_devices=2\n"
        );
        let entries: Vec<_> = fs::read_dir(root.path())
            .expect("read_dir")
            .filter_map(|entry| entry.ok())
            .collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn removing_a_missing_file_succeeds() {
        let root = tempfile::tempdir().expect("tempdir");
        remove_if_exists(&root.path().join("absent")).expect("remove");
    }
}
