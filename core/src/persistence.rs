//! Persistence: PID records and the versioned run manifest
//!
//! Both files are written crash-safe via write-to-temp + fsync + rename, so an
//! external reader (or a later `--stop`) never observes a half-written PID.
//! Reads validate structure; corrupted files surface errors so callers can
//! decide whether to skip the instance.

use crate::{CoreError, Result};
use schema::{RunManifest, MANIFEST_VERSION};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// File name of the run manifest inside the base home directory
pub const MANIFEST_FILE: &str = "flotilla.json";

/// Manifest location for a base home directory
pub fn manifest_path(base: &Path) -> PathBuf {
    base.join(MANIFEST_FILE)
}

/// Atomically write `contents` to `path`.
///
/// Steps:
/// - Write to a temp file in the same directory
/// - `flush` + `sync_all` on the temp file
/// - `rename` temp file over the destination
/// - Best-effort fsync of the directory to persist rename
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    {
        let mut f = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;
        f.write_all(contents)?;
        f.flush()?;
        // Best-effort durability
        let _ = f.sync_all();
    }

    fs::rename(&tmp_path, path)?;

    if let Some(parent) = path.parent() {
        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
    }
    Ok(())
}

/// Write a PID record as a plain decimal number followed by a newline
pub fn write_pid_file(path: &Path, pid: u32) -> std::io::Result<()> {
    write_atomic(path, format!("{pid}\n").as_bytes())
}

/// Read a PID record written by [`write_pid_file`] or by external tooling
pub fn read_pid_file(path: &Path) -> Result<u32> {
    let text = fs::read_to_string(path).map_err(|e| {
        CoreError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to read PID record {}: {}", path.display(), e),
        ))
    })?;
    let trimmed = text.trim();
    // pid_t is signed; anything outside 1..=i32::MAX would address a group or every process
    let pid: i32 = trimmed.parse().map_err(|_| {
        CoreError::ValidationError(format!(
            "PID record {} is not a valid PID: {:?}",
            path.display(),
            trimmed
        ))
    })?;
    if pid <= 0 {
        return Err(CoreError::ValidationError(format!(
            "PID record {} holds non-positive PID {}",
            path.display(),
            pid
        )));
    }
    Ok(pid as u32)
}

/// Atomically write the run manifest
pub fn write_manifest(path: &Path, manifest: &RunManifest) -> Result<()> {
    let json = serde_json::to_vec_pretty(manifest)?;
    write_atomic(path, &json).map_err(|e| {
        CoreError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to write manifest {}: {}", path.display(), e),
        ))
    })
}

/// Load a run manifest, validating its version
pub fn load_manifest(path: &Path) -> Result<RunManifest> {
    let data = fs::read(path).map_err(|e| {
        CoreError::IoError(std::io::Error::new(
            e.kind(),
            format!("Failed to read manifest {}: {}", path.display(), e),
        ))
    })?;
    let manifest: RunManifest = serde_json::from_slice(&data)?;
    if manifest.version != MANIFEST_VERSION {
        return Err(CoreError::ValidationError(format!(
            "Unsupported manifest version {} (expected {})",
            manifest.version, MANIFEST_VERSION
        )));
    }
    Ok(manifest)
}
