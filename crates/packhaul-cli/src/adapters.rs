//! Command-template implementations of the provider ports.
//!
//! The byte-level work belongs to external binaries (a patch tool, 7z, an
//! upload client); these adapters substitute per-item placeholders into a
//! configured command line and run it through the shell. Success is the
//! exit status; failure reasons come from the stderr tail; the uploader
//! and converter read their links from stdout.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use packhaul_core::batch::PipelineError;
use packhaul_core::ports::{
    ArchiveJob, ArchiverPort, ConvertPoll, LinkConverterPort, PatchJob, PatchProviderPort,
    PatchReport, PercentFn, StatusFn, TransferFn, TransferSample, UploaderPort,
};

/// Keep this many trailing characters of stderr in failure reasons.
const STDERR_TAIL: usize = 400;

struct CommandOutput {
    success: bool,
    stdout: String,
    stderr_tail: String,
}

/// Run a substituted command line through the shell, killing it if the
/// token fires.
async fn run_command(
    command_line: &str,
    cancel: Option<&CancellationToken>,
) -> Result<CommandOutput, PipelineError> {
    tracing::debug!(command = %command_line, "Running external tool");

    let child = Command::new("sh")
        .arg("-c")
        .arg(command_line)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| PipelineError::from_io_error(&e))?;

    let output = if let Some(cancel) = cancel {
        tokio::select! {
            biased;

            // Dropping the in-flight future drops the child, and
            // kill_on_drop terminates the tool.
            () = cancel.cancelled() => return Err(PipelineError::Cancelled),

            output = child.wait_with_output() => output,
        }
    } else {
        child.wait_with_output().await
    }
    .map_err(|e| PipelineError::from_io_error(&e))?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    Ok(CommandOutput {
        success: output.status.success(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr_tail: tail(&stderr, STDERR_TAIL).trim().to_string(),
    })
}

/// Last `max` bytes of `s`, nudged forward to a char boundary.
fn tail(s: &str, max: usize) -> &str {
    let mut start = s.len().saturating_sub(max);
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}

fn substitute(template: &str, pairs: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in pairs {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

fn quoted(path: &Path) -> String {
    format!("'{}'", path.display().to_string().replace('\'', r"'\''"))
}

/// Patch provider that shells out to a configured command.
pub struct CommandPatchProvider {
    template: String,
}

impl CommandPatchProvider {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl PatchProviderPort for CommandPatchProvider {
    async fn patch(
        &self,
        job: &PatchJob,
        on_status: StatusFn<'_>,
    ) -> Result<PatchReport, PipelineError> {
        on_status("running patch tool");
        let command_line = substitute(
            &self.template,
            &[
                ("source", quoted(&job.source_path)),
                ("external_id", job.external_id.clone().unwrap_or_default()),
                ("engine", job.engine.as_str().to_string()),
            ],
        );
        let output = run_command(&command_line, None).await?;
        if output.success {
            Ok(PatchReport::ok())
        } else {
            Ok(PatchReport::failed(if output.stderr_tail.is_empty() {
                "patch tool exited with a failure status".to_string()
            } else {
                output.stderr_tail
            }))
        }
    }
}

/// Archiver that shells out to a configured command (e.g. 7z).
pub struct CommandArchiver {
    template: String,
}

impl CommandArchiver {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl ArchiverPort for CommandArchiver {
    async fn compress(
        &self,
        job: &ArchiveJob,
        on_percent: PercentFn<'_>,
    ) -> Result<(), PipelineError> {
        on_percent(0.0);
        let command_line = substitute(
            &self.template,
            &[
                ("source", quoted(&job.source_path)),
                ("archive", quoted(&job.output_path)),
                ("format", job.format.extension().to_string()),
                ("level", job.level.value().to_string()),
            ],
        );
        let output = run_command(&command_line, None).await?;
        if !output.success {
            return Err(PipelineError::archive(if output.stderr_tail.is_empty() {
                "compressor exited with a failure status".to_string()
            } else {
                output.stderr_tail
            }));
        }
        on_percent(100.0);
        Ok(())
    }
}

/// Uploader that shells out to a configured command which prints the link
/// on stdout.
pub struct CommandUploader {
    template: String,
}

impl CommandUploader {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl UploaderPort for CommandUploader {
    async fn upload(
        &self,
        path: &Path,
        on_progress: TransferFn<'_>,
        cancel: &CancellationToken,
    ) -> Result<Option<String>, PipelineError> {
        let total = std::fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| PipelineError::from_io_error(&e))?;
        on_progress(TransferSample::new(0, total, 0.0));

        let command_line = substitute(&self.template, &[("archive", quoted(path))]);
        let output = run_command(&command_line, Some(cancel)).await?;
        if !output.success {
            return Err(PipelineError::upload(if output.stderr_tail.is_empty() {
                "upload tool exited with a failure status".to_string()
            } else {
                output.stderr_tail
            }));
        }

        on_progress(TransferSample::new(total, total, 0.0));
        let link = output
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .map(ToString::to_string);
        Ok(link)
    }
}

/// Link converter that shells out to a configured command.
///
/// Protocol: exit 0 with the mirror link on stdout means ready; exit 0
/// with empty stdout means the host is still processing (retry later);
/// any failure status is terminal.
pub struct CommandLinkConverter {
    template: String,
}

impl CommandLinkConverter {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
        }
    }
}

#[async_trait]
impl LinkConverterPort for CommandLinkConverter {
    async fn convert(
        &self,
        link: &str,
        file_size_bytes: u64,
        cancel: &CancellationToken,
    ) -> Result<ConvertPoll, PipelineError> {
        let command_line = substitute(
            &self.template,
            &[
                ("link", link.to_string()),
                ("size", file_size_bytes.to_string()),
            ],
        );
        let output = run_command(&command_line, Some(cancel)).await?;
        if !output.success {
            return Err(PipelineError::other(if output.stderr_tail.is_empty() {
                "convert tool exited with a failure status".to_string()
            } else {
                output.stderr_tail
            }));
        }
        let converted = output
            .stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty());
        Ok(converted.map_or(ConvertPoll::Pending, |link| {
            ConvertPoll::Ready(link.to_string())
        }))
    }
}

/// Build the full provider set from a tool configuration.
///
/// Phases without a configured command get a provider that fails with an
/// explanatory message; the manifest validator prevents that combination
/// for requested phases.
pub struct Providers {
    pub patcher: std::sync::Arc<dyn PatchProviderPort>,
    pub archiver: std::sync::Arc<dyn ArchiverPort>,
    pub uploader: std::sync::Arc<dyn UploaderPort>,
    pub converter: std::sync::Arc<dyn LinkConverterPort>,
}

impl Providers {
    pub fn from_tools(tools: &crate::manifest::ToolConfig) -> Self {
        let missing = |what: &str| format!("tools.{what} is not configured");
        Self {
            patcher: match &tools.patch_command {
                Some(template) => std::sync::Arc::new(CommandPatchProvider::new(template.as_str())),
                None => std::sync::Arc::new(UnconfiguredPatcher(missing("patch_command"))),
            },
            archiver: match &tools.archive_command {
                Some(template) => std::sync::Arc::new(CommandArchiver::new(template.as_str())),
                None => std::sync::Arc::new(UnconfiguredArchiver(missing("archive_command"))),
            },
            uploader: match &tools.upload_command {
                Some(template) => std::sync::Arc::new(CommandUploader::new(template.as_str())),
                None => std::sync::Arc::new(UnconfiguredUploader(missing("upload_command"))),
            },
            converter: match &tools.convert_command {
                Some(template) => {
                    std::sync::Arc::new(CommandLinkConverter::new(template.as_str()))
                }
                None => std::sync::Arc::new(UnconfiguredConverter(missing("convert_command"))),
            },
        }
    }
}

struct UnconfiguredPatcher(String);

#[async_trait]
impl PatchProviderPort for UnconfiguredPatcher {
    async fn patch(
        &self,
        _job: &PatchJob,
        _on_status: StatusFn<'_>,
    ) -> Result<PatchReport, PipelineError> {
        Err(PipelineError::other(self.0.clone()))
    }
}

struct UnconfiguredArchiver(String);

#[async_trait]
impl ArchiverPort for UnconfiguredArchiver {
    async fn compress(
        &self,
        _job: &ArchiveJob,
        _on_percent: PercentFn<'_>,
    ) -> Result<(), PipelineError> {
        Err(PipelineError::other(self.0.clone()))
    }
}

struct UnconfiguredUploader(String);

#[async_trait]
impl UploaderPort for UnconfiguredUploader {
    async fn upload(
        &self,
        _path: &Path,
        _on_progress: TransferFn<'_>,
        _cancel: &CancellationToken,
    ) -> Result<Option<String>, PipelineError> {
        Err(PipelineError::other(self.0.clone()))
    }
}

struct UnconfiguredConverter(String);

#[async_trait]
impl LinkConverterPort for UnconfiguredConverter {
    async fn convert(
        &self,
        _link: &str,
        _file_size_bytes: u64,
        _cancel: &CancellationToken,
    ) -> Result<ConvertPoll, PipelineError> {
        Err(PipelineError::other(self.0.clone()))
    }
}
