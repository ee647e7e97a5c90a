use std::io;
use std::path::Path;
use std::time::{Duration, SystemTime};

use tokio::fs;
use tracing::{debug, warn};

/// Delete regular files in `dir` whose modification time is older than
/// `max_age`. Returns the number of files removed.
///
/// A missing directory is not an error. A file that cannot be inspected or
/// removed is logged and skipped; the sweep continues with the rest.
pub async fn sweep_stale(dir: &Path, max_age: Duration) -> io::Result<usize> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };

    let now = SystemTime::now();
    let mut removed = 0;

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();

        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!("failed to inspect {:?}: {}", path, e);
                continue;
            }
        };
        if !metadata.is_file() {
            continue;
        }

        let modified = match metadata.modified() {
            Ok(modified) => modified,
            Err(e) => {
                warn!("failed to read mtime of {:?}: {}", path, e);
                continue;
            }
        };

        let age = now.duration_since(modified).unwrap_or_default();
        if age > max_age {
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("failed to remove stale file {:?}: {}", path, e),
            }
        }
    }

    if removed > 0 {
        debug!("removed {} stale files from {:?}", removed, dir);
    }
    Ok(removed)
}
