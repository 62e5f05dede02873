//! Batch manifest loading.
//!
//! A manifest is a JSON file describing the work items, the run settings
//! and the external tool command templates. Settings fields all have
//! defaults, so a minimal manifest is just an item list plus the commands
//! for the phases those items request.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

use packhaul_core::batch::{RunSettings, WorkItem};

/// Command templates for the external tools.
///
/// Placeholders are substituted per invocation: `{source}`, `{archive}`,
/// `{external_id}`, `{engine}`, `{format}`, `{level}`, `{link}`, `{size}`.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(default)]
pub struct ToolConfig {
    /// Patch provider invocation.
    pub patch_command: Option<String>,
    /// Archiver invocation.
    pub archive_command: Option<String>,
    /// Uploader invocation; must print the link on stdout.
    pub upload_command: Option<String>,
    /// Link converter invocation; prints the mirror link on stdout, prints
    /// nothing while the upstream host is still processing.
    pub convert_command: Option<String>,
}

/// One parsed batch manifest.
#[derive(Debug, Deserialize)]
pub struct Manifest {
    /// The items to process.
    pub items: Vec<WorkItem>,
    /// Run settings (all fields optional).
    #[serde(default)]
    pub settings: RunSettings,
    /// External tool commands.
    #[serde(default)]
    pub tools: ToolConfig,
}

/// Load and validate a manifest file.
pub fn load(path: &Path) -> Result<Manifest> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("cannot read manifest {}", path.display()))?;
    let manifest: Manifest = serde_json::from_str(&raw)
        .with_context(|| format!("manifest {} is not valid JSON", path.display()))?;
    validate(&manifest)?;
    Ok(manifest)
}

fn validate(manifest: &Manifest) -> Result<()> {
    if manifest.items.is_empty() {
        bail!("manifest contains no items");
    }
    manifest
        .settings
        .validate()
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let wants_patch = manifest.items.iter().any(|i| i.patch);
    let wants_archive = manifest.items.iter().any(|i| i.archive || i.publish);
    let wants_publish = manifest.items.iter().any(|i| i.publish);

    if wants_patch && manifest.tools.patch_command.is_none() {
        bail!("items request patching but tools.patch_command is not set");
    }
    if wants_archive && manifest.tools.archive_command.is_none() {
        bail!("items request archiving but tools.archive_command is not set");
    }
    if wants_publish && manifest.tools.upload_command.is_none() {
        bail!("items request publishing but tools.upload_command is not set");
    }
    if manifest.settings.convert_links && manifest.tools.convert_command.is_none() {
        bail!("convert_links is enabled but tools.convert_command is not set");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(json: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(json.as_bytes()).unwrap();
        file
    }

    #[test]
    fn minimal_manifest_loads() {
        let file = write_manifest(
            r#"{
                "items": [{"name": "G", "source_path": "/games/G", "patch": true}],
                "tools": {"patch_command": "patcher {source}"}
            }"#,
        );
        let manifest = load(file.path()).unwrap();
        assert_eq!(manifest.items.len(), 1);
        assert_eq!(manifest.settings, RunSettings::default());
    }

    #[test]
    fn empty_item_list_is_rejected() {
        let file = write_manifest(r#"{"items": []}"#);
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("no items"));
    }

    #[test]
    fn missing_tool_for_requested_phase_is_rejected() {
        let file = write_manifest(
            r#"{"items": [{"name": "G", "source_path": "/g", "publish": true}],
                "tools": {"archive_command": "7z a {archive} {source}"}}"#,
        );
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("upload_command"));
    }

    #[test]
    fn publish_intent_requires_archive_command() {
        let file = write_manifest(
            r#"{"items": [{"name": "G", "source_path": "/g", "publish": true}],
                "tools": {"upload_command": "up {archive}"}}"#,
        );
        let err = load(file.path()).unwrap_err();
        assert!(err.to_string().contains("archive_command"));
    }
}
