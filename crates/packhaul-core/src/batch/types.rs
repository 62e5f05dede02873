//! Work item identity and intents.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Canonical identifier for a work item.
///
/// Derived from the item's display name. This is the single identifier
/// format used throughout the system (slot registry, outcomes, events).
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ItemId(String);

impl ItemId {
    /// Create an item ID from a display name.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// The underlying name.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// One unit of batch work: a game installation folder with independent
/// patch/archive/publish intents.
///
/// Immutable once a run starts. Intents are independent booleans except for
/// the invariant `publish ⇒ archive` (publishing needs an archive to
/// upload), which the orchestrator enforces via [`WorkItem::normalized`]
/// before the run begins.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkItem {
    /// Human-readable display name (also the item's identity).
    pub name: String,
    /// Path to the installation folder on disk.
    pub source_path: PathBuf,
    /// Detected external id (store AppID or similar), if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub external_id: Option<String>,
    /// Apply the patch provider to this item.
    #[serde(default)]
    pub patch: bool,
    /// Compress this item into an archive.
    #[serde(default)]
    pub archive: bool,
    /// Upload the archive (implies `archive`).
    #[serde(default)]
    pub publish: bool,
}

impl WorkItem {
    /// Create a work item with no intents set.
    pub fn new(name: impl Into<String>, source_path: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            source_path: source_path.into(),
            external_id: None,
            patch: false,
            archive: false,
            publish: false,
        }
    }

    /// Set the external id.
    #[must_use]
    pub fn with_external_id(mut self, id: impl Into<String>) -> Self {
        self.external_id = Some(id.into());
        self
    }

    /// Set the patch intent.
    #[must_use]
    pub const fn with_patch(mut self, patch: bool) -> Self {
        self.patch = patch;
        self
    }

    /// Set the archive intent.
    #[must_use]
    pub const fn with_archive(mut self, archive: bool) -> Self {
        self.archive = archive;
        self
    }

    /// Set the publish intent.
    #[must_use]
    pub const fn with_publish(mut self, publish: bool) -> Self {
        self.publish = publish;
        self
    }

    /// The item's canonical identifier.
    #[must_use]
    pub fn id(&self) -> ItemId {
        ItemId::new(&self.name)
    }

    /// Return a copy with the `publish ⇒ archive` invariant enforced.
    ///
    /// The boolean is `true` when the item had to be corrected, so the
    /// caller can log the auto-correction instead of failing silently.
    #[must_use]
    pub fn normalized(&self) -> (Self, bool) {
        let mut item = self.clone();
        let corrected = item.publish && !item.archive;
        if corrected {
            item.archive = true;
        }
        (item, corrected)
    }

    /// Whether this item requests any work at all.
    #[must_use]
    pub const fn has_work(&self) -> bool {
        self.patch || self.archive || self.publish
    }

    /// The source folder's parent directory, if it has one.
    #[must_use]
    pub fn parent_dir(&self) -> Option<&Path> {
        self.source_path.parent()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalized_forces_archive_for_publish() {
        let item = WorkItem::new("Game", "/tmp/game").with_publish(true);
        let (fixed, corrected) = item.normalized();
        assert!(corrected);
        assert!(fixed.archive);
        assert!(fixed.publish);
    }

    #[test]
    fn normalized_is_identity_for_valid_items() {
        let item = WorkItem::new("Game", "/tmp/game")
            .with_archive(true)
            .with_publish(true);
        let (fixed, corrected) = item.normalized();
        assert!(!corrected);
        assert_eq!(fixed, item);
    }

    #[test]
    fn item_id_round_trips_display() {
        let id = ItemId::new("My Game (v1.2)");
        assert_eq!(id.to_string(), "My Game (v1.2)");
        assert_eq!(id.as_str(), "My Game (v1.2)");
    }

    #[test]
    fn work_item_serde_defaults_intents_to_false() {
        let item: WorkItem =
            serde_json::from_str(r#"{"name":"G","source_path":"/tmp/g"}"#).unwrap();
        assert!(!item.has_work());
    }
}
