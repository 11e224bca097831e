//! Temp file tracking for pipeline runs.
//!
//! Every run registers its work dir and every file it creates before or
//! immediately after creation, so one `cleanup()` call at the end of the
//! run (success or failure) leaves nothing behind. A periodic sweep handles
//! anything orphaned by a crashed process.

use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, warn};

use crate::error::MediaResult;

/// Temp files older than this are considered orphaned by the sweep.
pub const TEMP_MAX_AGE: Duration = Duration::from_secs(3600);

/// Tracks paths created during a single pipeline run.
///
/// Paths are removed in reverse registration order so files are deleted
/// before the directories that contain them. Removal is best-effort: a
/// failed delete is logged and the rest of the list is still processed.
#[derive(Debug, Default)]
pub struct CleanupContext {
    paths: Mutex<Vec<PathBuf>>,
}

impl CleanupContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a path for removal at the end of the run. Register
    /// directories before spawning the process that fills them, so a
    /// mid-spawn failure still gets swept.
    pub fn register(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        debug!("Registering temp path: {}", path.display());
        if let Ok(mut paths) = self.paths.lock() {
            paths.push(path);
        }
    }

    /// Number of currently registered paths.
    pub fn len(&self) -> usize {
        self.paths.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Remove every registered path, best-effort. Returns the number of
    /// paths that could not be removed.
    pub async fn cleanup(&self) -> usize {
        let paths: Vec<PathBuf> = match self.paths.lock() {
            Ok(mut guard) => guard.drain(..).rev().collect(),
            Err(_) => return 0,
        };

        let mut failures = 0;
        for path in paths {
            let result = match fs::metadata(&path).await {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(&path).await,
                Ok(_) => fs::remove_file(&path).await,
                // Already gone, nothing to do
                Err(_) => continue,
            };
            if let Err(e) = result {
                warn!("Failed to remove temp path {}: {}", path.display(), e);
                failures += 1;
            }
        }
        failures
    }
}

/// Remove entries under `base_dir` whose modification time is older than
/// `max_age`. Covers temp files orphaned by crashed runs.
pub async fn cleanup_old_temp_files(base_dir: impl AsRef<Path>, max_age: Duration) -> MediaResult<usize> {
    let base_dir = base_dir.as_ref();
    if !base_dir.exists() {
        return Ok(0);
    }

    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut removed = 0;
    let mut entries = fs::read_dir(base_dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let meta = match entry.metadata().await {
            Ok(meta) => meta,
            Err(_) => continue,
        };
        let modified = match meta.modified() {
            Ok(modified) => modified,
            Err(_) => continue,
        };
        if modified >= cutoff {
            continue;
        }

        let result = if meta.is_dir() {
            fs::remove_dir_all(&path).await
        } else {
            fs::remove_file(&path).await
        };
        match result {
            Ok(()) => {
                debug!("Swept orphaned temp path: {}", path.display());
                removed += 1;
            }
            Err(e) => warn!("Failed to sweep temp path {}: {}", path.display(), e),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_cleanup_removes_registered_paths() {
        let dir = TempDir::new().unwrap();
        let run_dir = dir.path().join("run");
        fs::create_dir(&run_dir).await.unwrap();
        let file = run_dir.join("frame_0001.jpg");
        fs::write(&file, b"jpeg").await.unwrap();

        let ctx = CleanupContext::new();
        ctx.register(&run_dir);
        ctx.register(&file);

        assert_eq!(ctx.cleanup().await, 0);
        assert!(!file.exists());
        assert!(!run_dir.exists());
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn test_cleanup_tolerates_missing_paths() {
        let ctx = CleanupContext::new();
        ctx.register("/nonexistent/path/file.jpg");
        assert_eq!(ctx.cleanup().await, 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_only_old_entries() {
        let dir = TempDir::new().unwrap();
        let fresh = dir.path().join("fresh.jpg");
        fs::write(&fresh, b"x").await.unwrap();

        // Nothing is older than an hour in a fresh temp dir
        let removed = cleanup_old_temp_files(dir.path(), TEMP_MAX_AGE).await.unwrap();
        assert_eq!(removed, 0);
        assert!(fresh.exists());

        // With a zero max age everything qualifies
        let removed = cleanup_old_temp_files(dir.path(), Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(removed, 1);
        assert!(!fresh.exists());
    }

    #[tokio::test]
    async fn test_sweep_missing_base_dir_is_ok() {
        let removed = cleanup_old_temp_files("/nonexistent/handarc-tmp", TEMP_MAX_AGE)
            .await
            .unwrap();
        assert_eq!(removed, 0);
    }
}
