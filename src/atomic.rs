//! Atomic writes and run-output locking for bundle persistence (§4.8).
//!
//! Every mismatch bundle file (`case.json`, `target_a.json`, `diff.json`,
//! …) is written via temp-file-plus-rename so a reader polling the
//! mismatches directory never sees a half-written file. `summary.json` and
//! `replay_summary.json` are the one artifact a parallel run against the
//! same output directory can race on, so writing them additionally holds an
//! exclusive advisory lock on the output directory for the duration.
//!
//! # Cross-platform notes
//!
//! - On POSIX systems, `rename(2)` is atomic within the same filesystem.
//! - On Windows, `std::fs::rename` uses `MoveFileEx` with
//!   `MOVEFILE_REPLACE_EXISTING`, which is atomic for same-volume renames.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// Serializes `value` as pretty JSON and writes it to `path` atomically, via
/// a temporary sibling file and rename. The temp file lives in the same
/// directory as `path` so the rename stays on one filesystem.
///
/// # Errors
///
/// Returns an error if `value` fails to serialize, the temp file cannot be
/// created or written, or the rename fails.
pub async fn write_bundle_file<T: Serialize>(path: &Path, value: &T) -> Result<(), Error> {
    let bytes = serde_json::to_vec_pretty(value)?;
    let temp_path = temp_sibling(path);

    tokio::fs::write(&temp_path, &bytes).await.map_err(Error::Io)?;
    if let Err(e) = tokio::fs::rename(&temp_path, path).await {
        let _ = tokio::fs::remove_file(&temp_path).await;
        return Err(Error::Io(e));
    }
    Ok(())
}

/// Generates a unique temporary file path as a sibling of `path`, using a
/// random suffix to avoid collisions between concurrent bundle writers.
fn temp_sibling(path: &Path) -> std::path::PathBuf {
    let random_suffix = fastrand::u64(..);
    let file_name = path
        .file_name()
        .map_or_else(|| "bundle".to_string(), |n| n.to_string_lossy().to_string());

    let temp_name = format!(".{file_name}.{random_suffix:016x}.tmp");
    path.with_file_name(temp_name)
}

/// Name of the advisory lock file placed in the run output directory.
const LOCK_FILE_NAME: &str = ".parity-fuzz.lock";

/// An advisory exclusive lock scoped to a run's output directory, held while
/// `summary.json` or `replay_summary.json` is being written.
///
/// This uses `fs2` advisory locking, which coordinates between cooperating
/// `parity-fuzz` processes — it does **not** prevent an unrelated process
/// from writing into the same directory.
pub struct RunOutputLock {
    _file: std::fs::File,
}

impl RunOutputLock {
    /// Acquires an exclusive advisory lock on `dir`, creating both `dir` and
    /// its lock file (`<dir>/.parity-fuzz.lock`) if they don't exist yet.
    /// Blocks until the lock is available.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or lock file cannot be created, or
    /// the lock cannot be taken.
    pub fn acquire(dir: &Path) -> std::io::Result<Self> {
        use fs2::FileExt;

        std::fs::create_dir_all(dir)?;
        let lock_path = dir.join(LOCK_FILE_NAME);
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        file.lock_exclusive()?;
        Ok(Self { _file: file })
    }
}

// Released on drop — `fs2` advisory locks are released when the fd closes.

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[derive(Serialize, Deserialize)]
    struct Metadata {
        tool_version: String,
        cases_sent: u32,
    }

    #[tokio::test]
    async fn write_bundle_file_creates_file_with_no_temp_left_behind() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("metadata.json");

        write_bundle_file(&path, &Metadata { tool_version: "0.1.0".to_string(), cases_sent: 3 })
            .await
            .unwrap();

        let entries: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().filter_map(Result::ok).collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].file_name().to_string_lossy(), "metadata.json");

        let parsed: Metadata = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.cases_sent, 3);
    }

    #[tokio::test]
    async fn write_bundle_file_overwrites_existing() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("summary.json");

        write_bundle_file(&path, &Metadata { tool_version: "0.1.0".to_string(), cases_sent: 1 }).await.unwrap();
        write_bundle_file(&path, &Metadata { tool_version: "0.1.0".to_string(), cases_sent: 2 }).await.unwrap();

        let parsed: Metadata = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.cases_sent, 2);
    }

    #[tokio::test]
    async fn concurrent_bundle_writes_to_the_same_path_never_interleave() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("diff.json");

        let mut handles = Vec::new();
        for i in 0..20u32 {
            let p = path.clone();
            handles.push(tokio::spawn(async move {
                write_bundle_file(&p, &Metadata { tool_version: "0.1.0".to_string(), cases_sent: i }).await.unwrap();
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        // Whichever writer won, the file holds one complete, parseable record.
        let _: Metadata = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    }

    #[test]
    fn run_output_lock_acquire_and_release() {
        let dir = TempDir::new().unwrap();

        let lock = RunOutputLock::acquire(dir.path()).unwrap();
        assert!(dir.path().join(LOCK_FILE_NAME).exists());

        drop(lock);
        assert!(dir.path().join(LOCK_FILE_NAME).exists());
    }

    #[test]
    fn run_output_lock_creates_missing_directory() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("out").join("run-1");

        let _lock = RunOutputLock::acquire(&nested).unwrap();
        assert!(nested.is_dir());
    }

    #[test]
    fn temp_sibling_stays_in_same_directory_and_is_hidden() {
        let path = Path::new("/tmp/mismatches/diff.json");
        let t1 = temp_sibling(path);
        let t2 = temp_sibling(path);
        assert_eq!(t1.parent(), t2.parent());
        let name1 = t1.file_name().unwrap().to_string_lossy();
        assert!(name1.starts_with('.'));
        assert!(name1.ends_with(".tmp"));
        assert_ne!(t1, t2);
    }
}
