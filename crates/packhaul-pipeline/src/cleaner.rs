//! Pre-run artifact cleanup.
//!
//! Before a run touches an item, the cleaner restores any `*.bak` backups a
//! previous patch pass left behind and removes stale artifacts from an
//! interrupted run. Every individual restore/delete is best-effort: one
//! failing file is logged and never aborts the item or the run. Running the
//! cleaner twice in a row leaves the tree in the same state as running it
//! once.

use std::fs;
use std::path::Path;

/// File names a previous run may have left in an item's folder.
const STALE_FILE_NAMES: &[&str] = &["packhaul.upload.json", ".packhaul.lock"];

/// Directory names a previous run may have left in an item's folder.
const STALE_DIR_NAMES: &[&str] = &[".packhaul-tmp"];

/// Suffix used for partially written archives.
const PARTIAL_SUFFIX: &str = ".partial";

/// Extension of backup files created by the patch pass.
const BACKUP_EXTENSION: &str = "bak";

/// What one cleaning pass did.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanReport {
    /// Backups restored to their original names.
    pub restored: u32,
    /// Stale artifacts removed.
    pub removed: u32,
    /// Individual operations that failed (logged, not fatal).
    pub failures: Vec<String>,
}

impl CleanReport {
    /// Whether anything was actually changed.
    #[must_use]
    pub const fn changed_anything(&self) -> bool {
        self.restored > 0 || self.removed > 0
    }

    fn merge(&mut self, other: Self) {
        self.restored += other.restored;
        self.removed += other.removed;
        self.failures.extend(other.failures);
    }

    fn soft_fail(&mut self, path: &Path, action: &str, err: &std::io::Error) {
        tracing::warn!(
            path = %path.display(),
            action,
            error = %err,
            "Cleanup step failed, continuing"
        );
        self.failures.push(format!("{action} {}: {err}", path.display()));
    }
}

/// Best-effort, idempotent cleanup of one item's source folder.
#[derive(Clone, Copy, Debug, Default)]
pub struct ArtifactCleaner;

impl ArtifactCleaner {
    /// Create a cleaner.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Clean one item folder.
    ///
    /// Restores `*.bak` files (recursively) and removes known stale
    /// artifacts from the folder's top level. Safe to call on a path that
    /// does not exist.
    pub fn clean(&self, source_path: &Path) -> CleanReport {
        let mut report = CleanReport::default();

        if !source_path.is_dir() {
            tracing::debug!(path = %source_path.display(), "Clean skipped: not a directory");
            return report;
        }

        report.merge(Self::restore_backups(source_path));
        report.merge(Self::remove_stale_artifacts(source_path));

        if report.changed_anything() {
            tracing::info!(
                path = %source_path.display(),
                restored = report.restored,
                removed = report.removed,
                "Cleaned stale artifacts"
            );
        }
        report
    }

    /// Recursively restore `*.bak` files to their original names.
    ///
    /// If the original file still exists it is deleted first, then the
    /// backup is renamed over it.
    fn restore_backups(dir: &Path) -> CleanReport {
        let mut report = CleanReport::default();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.soft_fail(dir, "read dir", &e);
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                report.merge(Self::restore_backups(&path));
                continue;
            }
            if path.extension().and_then(|e| e.to_str()) != Some(BACKUP_EXTENSION) {
                continue;
            }
            let original = path.with_extension("");
            if original.exists() {
                if let Err(e) = fs::remove_file(&original) {
                    report.soft_fail(&original, "remove patched file", &e);
                    continue;
                }
            }
            match fs::rename(&path, &original) {
                Ok(()) => {
                    tracing::debug!(
                        backup = %path.display(),
                        restored = %original.display(),
                        "Restored backup"
                    );
                    report.restored += 1;
                }
                Err(e) => report.soft_fail(&path, "restore backup", &e),
            }
        }
        report
    }

    /// Remove known stale artifact files/directories from the top level.
    fn remove_stale_artifacts(dir: &Path) -> CleanReport {
        let mut report = CleanReport::default();

        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) => {
                report.soft_fail(dir, "read dir", &e);
                return report;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
                continue;
            };

            let is_stale_file = STALE_FILE_NAMES.contains(&name) || name.ends_with(PARTIAL_SUFFIX);
            let is_stale_dir = STALE_DIR_NAMES.contains(&name);

            if is_stale_dir && path.is_dir() {
                match fs::remove_dir_all(&path) {
                    Ok(()) => report.removed += 1,
                    Err(e) => report.soft_fail(&path, "remove stale dir", &e),
                }
            } else if is_stale_file && path.is_file() {
                match fs::remove_file(&path) {
                    Ok(()) => report.removed += 1,
                    Err(e) => report.soft_fail(&path, "remove stale file", &e),
                }
            }
        }
        report
    }
}
