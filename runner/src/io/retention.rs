//! Retention pruning for dated artifact folders.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, warn};

/// Keep the `keep` most recently modified day folders under `root`,
/// deleting the rest. The `reserved` folder (the current day) is never
/// deleted, even when it would fall outside the window.
///
/// A missing root or `keep == 0` disables pruning.
pub fn prune_runs(root: &Path, keep: usize, reserved: &str) -> Result<()> {
    if keep == 0 || !root.exists() {
        return Ok(());
    }

    let mut dirs: Vec<(std::time::SystemTime, std::path::PathBuf)> = Vec::new();
    let entries = fs::read_dir(root).with_context(|| format!("scan {}", root.display()))?;
    for entry in entries {
        let path = entry?.path();
        if !path.is_dir() {
            continue;
        }
        let mtime = path
            .metadata()
            .and_then(|m| m.modified())
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        dirs.push((mtime, path));
    }
    if dirs.len() <= keep {
        return Ok(());
    }

    // Oldest first; stop deleting once within the window.
    dirs.sort();
    let mut remaining = dirs.len();
    for (_, path) in dirs {
        if remaining <= keep {
            break;
        }
        if path.file_name().and_then(|n| n.to_str()) == Some(reserved) {
            continue;
        }
        debug!(path = %path.display(), "pruning old run folder");
        if let Err(err) = fs::remove_dir_all(&path) {
            // Retention is housekeeping; a locked folder must not fail the run.
            warn!(path = %path.display(), error = %err, "failed to prune run folder");
            continue;
        }
        remaining -= 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mkdirs(root: &Path, names: &[&str]) {
        for name in names {
            fs::create_dir_all(root.join(name)).expect("mkdir");
            // Space out mtimes so ordering is deterministic.
            std::thread::sleep(std::time::Duration::from_millis(10));
        }
    }

    #[test]
    fn keeps_most_recent_folders() {
        let temp = tempfile::tempdir().expect("tempdir");
        mkdirs(temp.path(), &["2026-08-25", "2026-08-26", "2026-08-27"]);

        prune_runs(temp.path(), 2, "2026-08-27").expect("prune");

        assert!(!temp.path().join("2026-08-25").exists());
        assert!(temp.path().join("2026-08-26").exists());
        assert!(temp.path().join("2026-08-27").exists());
    }

    #[test]
    fn reserved_folder_survives_even_when_old() {
        let temp = tempfile::tempdir().expect("tempdir");
        mkdirs(temp.path(), &["2026-08-20", "2026-08-26", "2026-08-27"]);

        prune_runs(temp.path(), 2, "2026-08-20").expect("prune");

        assert!(temp.path().join("2026-08-20").exists());
        assert!(!temp.path().join("2026-08-26").exists());
        assert!(temp.path().join("2026-08-27").exists());
    }

    #[test]
    fn zero_keep_and_missing_root_are_noops() {
        let temp = tempfile::tempdir().expect("tempdir");
        mkdirs(temp.path(), &["2026-08-25"]);
        prune_runs(temp.path(), 0, "2026-08-25").expect("prune");
        assert!(temp.path().join("2026-08-25").exists());

        prune_runs(&temp.path().join("nope"), 3, "x").expect("prune");
    }

    #[test]
    fn within_window_nothing_is_deleted() {
        let temp = tempfile::tempdir().expect("tempdir");
        mkdirs(temp.path(), &["2026-08-26", "2026-08-27"]);
        prune_runs(temp.path(), 5, "2026-08-27").expect("prune");
        assert!(temp.path().join("2026-08-26").exists());
    }
}
