use std::{
    io,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

// ============== Timestamp Helpers ==============

/// RFC3339 timestamp in UTC (for logs/state files).
pub fn iso_timestamp_utc() -> String {
    Utc::now().to_rfc3339()
}

// ============== Temp Files ==============

/// Collision-free temp path: `<prefix>_<utc millis timestamp>_<uuid>.<ext>`.
///
/// The timestamp keeps directory listings sortable; the uuid makes names
/// unique even for requests started within the same millisecond.
pub fn unique_temp_path(dir: &Path, prefix: &str, ext: &str) -> PathBuf {
    let ts = Utc::now().format("%Y%m%d%H%M%S%3f");
    let id = Uuid::new_v4().simple();
    dir.join(format!("{prefix}_{ts}_{id}.{ext}"))
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_file_if_exists(path: &Path) -> io::Result<()> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Remove `path` and every file next to it that shares its stem (`<stem>.*`).
///
/// Extractors write `<out>.part`, `<out>.ytdl` and per-format `<stem>.fNNN.*`
/// intermediates and only rename onto `<out>` once they finish. Callers must
/// pass a path from [`unique_temp_path`] so the stem belongs to one run.
pub async fn remove_with_siblings(path: &Path) -> io::Result<()> {
    remove_file_if_exists(path).await?;

    let (Some(dir), Some(stem)) = (path.parent(), path.file_stem()) else {
        return Ok(());
    };
    let prefix = format!("{}.", stem.to_string_lossy());

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(rd) => rd,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            remove_file_if_exists(&entry.path()).await?;
        }
    }
    Ok(())
}

/// Poll for `path` to become visible, up to `timeout`.
///
/// External tools sometimes finish (and exit) a moment before the final file
/// shows up under its target name.
pub async fn wait_for_file(path: &Path, timeout: Duration) -> bool {
    const STEP: Duration = Duration::from_millis(100);

    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if tokio::fs::try_exists(path).await.unwrap_or(false) {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(STEP).await;
    }
}

pub fn bytes_to_mb(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

/// A temp file owned by one pipeline run.
///
/// Call [`TempArtifact::remove`] on every normal exit path. If the owning task
/// is cancelled or panics first, `Drop` removes the file synchronously.
#[derive(Debug)]
pub struct TempArtifact {
    path: PathBuf,
    armed: bool,
}

impl TempArtifact {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            armed: true,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn remove(mut self) {
        self.armed = false;
        match remove_file_if_exists(&self.path).await {
            Ok(()) => debug!(path = %self.path.display(), "removed temp file"),
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove temp file"),
        }
    }
}

impl Drop for TempArtifact {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "removed temp file on drop"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "failed to remove temp file"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn removes_intermediates_sharing_the_stem() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("youtube_1_abc.mp4");
        for name in [
            "youtube_1_abc.mp4",
            "youtube_1_abc.mp4.part",
            "youtube_1_abc.mp4.ytdl",
            "youtube_1_abc.f137.mp4",
            "youtube_1_abc.mp4.f137.mp4.part",
            "youtube_2_def.mp4.part",
        ] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        remove_with_siblings(&out).await.unwrap();

        let mut left: Vec<String> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        left.sort();
        assert_eq!(left, vec!["youtube_2_def.mp4.part"]);

        // Nothing to remove is fine too.
        remove_with_siblings(&out).await.unwrap();
    }

    #[test]
    fn temp_paths_are_unique_and_prefixed() {
        let dir = Path::new("/tmp/vdb");
        let a = unique_temp_path(dir, "youtube", "mp4");
        let b = unique_temp_path(dir, "youtube", "mp4");
        assert_ne!(a, b);
        assert_eq!(a.parent(), Some(dir));
        let name = a.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("youtube_"));
        assert!(name.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn artifact_is_removed_explicitly_or_on_drop() {
        let dir = tempfile::tempdir().unwrap();

        let explicit = dir.path().join("a.mp4");
        std::fs::write(&explicit, b"x").unwrap();
        TempArtifact::new(&explicit).remove().await;
        assert!(!explicit.exists());

        let dropped = dir.path().join("b.mp4");
        std::fs::write(&dropped, b"x").unwrap();
        drop(TempArtifact::new(&dropped));
        assert!(!dropped.exists());

        // Missing files are not an error.
        TempArtifact::new(dir.path().join("missing.mp4")).remove().await;
    }

    #[tokio::test]
    async fn wait_for_file_gives_up_after_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("late.mp4");
        assert!(!wait_for_file(&path, Duration::from_millis(150)).await);
        std::fs::write(&path, b"x").unwrap();
        assert!(wait_for_file(&path, Duration::from_millis(150)).await);
    }

    #[test]
    fn converts_bytes_to_megabytes() {
        assert_eq!(bytes_to_mb(16 * 1024 * 1024), 16.0);
        assert_eq!(bytes_to_mb(0), 0.0);
    }
}
