//! Run settings and validation.
//!
//! `RunSettings` is validated once at run start and immutable for the
//! duration of the run.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::PipelineError;

/// Default bound on concurrent uploads.
pub const DEFAULT_MAX_CONCURRENT_UPLOADS: u32 = 3;

/// Default number of upload attempts per item.
pub const DEFAULT_MAX_UPLOAD_ATTEMPTS: u32 = 3;

/// Default base delay for the linear upload backoff (`delay * attempt`).
pub const DEFAULT_RETRY_BASE_DELAY: Duration = Duration::from_secs(5);

/// Output archive container format.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArchiveFormat {
    /// 7z container.
    #[default]
    SevenZip,
    /// Zip container.
    Zip,
}

impl ArchiveFormat {
    /// File extension for this format (without the dot).
    #[must_use]
    pub const fn extension(&self) -> &'static str {
        match self {
            Self::SevenZip => "7z",
            Self::Zip => "zip",
        }
    }
}

/// Compression level, clamped to 0..=9.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CompressionLevel(u8);

impl CompressionLevel {
    /// Create a level, clamping out-of-range values into 0..=9.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self(if level > 9 { 9 } else { level })
    }

    /// The numeric level.
    #[must_use]
    pub const fn value(&self) -> u8 {
        self.0
    }
}

impl Default for CompressionLevel {
    fn default() -> Self {
        Self(5)
    }
}

/// Which patch engine the external provider should apply.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatchEngine {
    /// The provider's current engine.
    #[default]
    Standard,
    /// The provider's legacy engine, for titles the standard one rejects.
    Legacy,
}

impl PatchEngine {
    /// String form passed through to the provider.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Legacy => "legacy",
        }
    }
}

/// Retry shape for link conversion.
///
/// Larger archives need longer before the upstream host finishes scanning
/// and a mirror link becomes valid, so attempts and per-attempt delay scale
/// with file size. The exact values are an external-service property, not a
/// core design requirement, so they live here as configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertRetrySettings {
    /// Attempts for a zero-sized file.
    pub base_attempts: u32,
    /// Extra attempts added per GiB of archive size.
    pub attempts_per_gib: u32,
    /// Hard cap on attempts regardless of size.
    pub max_attempts: u32,
    /// Delay before the first retry for a zero-sized file.
    pub base_delay: Duration,
    /// Extra delay added per GiB of archive size.
    pub delay_per_gib: Duration,
    /// Hard cap on the per-attempt delay.
    pub max_delay: Duration,
    /// Hard cap on total time spent waiting across all attempts.
    pub max_total_wait: Duration,
}

impl Default for ConvertRetrySettings {
    fn default() -> Self {
        Self {
            base_attempts: 3,
            attempts_per_gib: 1,
            max_attempts: 10,
            base_delay: Duration::from_secs(15),
            delay_per_gib: Duration::from_secs(15),
            max_delay: Duration::from_secs(90),
            max_total_wait: Duration::from_secs(600),
        }
    }
}

/// Settings for one batch run.
///
/// Validated once at run start via [`RunSettings::validate`]; immutable
/// during the run.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Archive container format.
    pub archive_format: ArchiveFormat,
    /// Compression level (0-9).
    pub compression_level: CompressionLevel,
    /// Password-protect produced archives.
    pub password_protect: bool,
    /// Patch engine selector passed to the provider.
    pub patch_engine: PatchEngine,
    /// Bound on concurrently running uploads.
    pub max_concurrent_uploads: u32,
    /// Upload attempts per item before reporting failure.
    pub max_upload_attempts: u32,
    /// Base delay for the linear upload backoff (`delay * attempt`).
    pub retry_base_delay: Duration,
    /// Chain link conversion after each successful upload.
    pub convert_links: bool,
    /// Retry shape for link conversion.
    pub convert_retry: ConvertRetrySettings,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            archive_format: ArchiveFormat::default(),
            compression_level: CompressionLevel::default(),
            password_protect: false,
            patch_engine: PatchEngine::default(),
            max_concurrent_uploads: DEFAULT_MAX_CONCURRENT_UPLOADS,
            max_upload_attempts: DEFAULT_MAX_UPLOAD_ATTEMPTS,
            retry_base_delay: DEFAULT_RETRY_BASE_DELAY,
            convert_links: false,
            convert_retry: ConvertRetrySettings::default(),
        }
    }
}

impl RunSettings {
    /// Set the bound on concurrent uploads.
    #[must_use]
    pub const fn with_max_concurrent_uploads(mut self, max: u32) -> Self {
        self.max_concurrent_uploads = max;
        self
    }

    /// Set the number of upload attempts per item.
    #[must_use]
    pub const fn with_max_upload_attempts(mut self, attempts: u32) -> Self {
        self.max_upload_attempts = attempts;
        self
    }

    /// Set the base retry delay.
    #[must_use]
    pub const fn with_retry_base_delay(mut self, delay: Duration) -> Self {
        self.retry_base_delay = delay;
        self
    }

    /// Enable or disable link conversion.
    #[must_use]
    pub const fn with_convert_links(mut self, convert: bool) -> Self {
        self.convert_links = convert;
        self
    }

    /// Validate the settings.
    ///
    /// Rejects zero concurrency and zero attempts; everything else has a
    /// sane clamp or default.
    pub fn validate(&self) -> Result<(), PipelineError> {
        if self.max_concurrent_uploads == 0 {
            return Err(PipelineError::invalid_settings(
                "max_concurrent_uploads must be at least 1",
            ));
        }
        if self.max_upload_attempts == 0 {
            return Err(PipelineError::invalid_settings(
                "max_upload_attempts must be at least 1",
            ));
        }
        if self.convert_retry.max_attempts == 0 {
            return Err(PipelineError::invalid_settings(
                "convert_retry.max_attempts must be at least 1",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(RunSettings::default().validate().is_ok());
    }

    #[test]
    fn zero_concurrency_is_rejected() {
        let settings = RunSettings::default().with_max_concurrent_uploads(0);
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("max_concurrent_uploads"));
    }

    #[test]
    fn zero_attempts_is_rejected() {
        let settings = RunSettings::default().with_max_upload_attempts(0);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn compression_level_clamps() {
        assert_eq!(CompressionLevel::new(12).value(), 9);
        assert_eq!(CompressionLevel::new(3).value(), 3);
    }

    #[test]
    fn settings_deserialize_from_empty_object() {
        let settings: RunSettings = serde_json::from_str("{}").unwrap();
        assert_eq!(settings, RunSettings::default());
        assert_eq!(settings.max_concurrent_uploads, 3);
    }

    #[test]
    fn archive_format_extensions() {
        assert_eq!(ArchiveFormat::SevenZip.extension(), "7z");
        assert_eq!(ArchiveFormat::Zip.extension(), "zip");
    }
}
