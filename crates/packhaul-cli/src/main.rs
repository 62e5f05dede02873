//! packhaul CLI entry point.

mod adapters;
mod display;
mod manifest;
mod parser;

use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use packhaul_core::batch::RunResult;
use packhaul_pipeline::{BatchPipeline, BatchPipelineDeps};

use crate::adapters::Providers;
use crate::display::ConsoleProgress;
use crate::parser::{Cli, Command};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Command::Run {
            manifest,
            max_concurrent_uploads,
            max_upload_attempts,
            convert_links,
        } => {
            run(
                &manifest,
                max_concurrent_uploads,
                max_upload_attempts,
                convert_links,
            )
            .await
        }
        Command::Validate { manifest } => validate(&manifest),
    }
}

async fn run(
    manifest_path: &Path,
    max_concurrent_uploads: Option<u32>,
    max_upload_attempts: Option<u32>,
    convert_links: bool,
) -> Result<()> {
    let manifest = manifest::load(manifest_path)?;

    let mut settings = manifest.settings.clone();
    if let Some(max) = max_concurrent_uploads {
        settings = settings.with_max_concurrent_uploads(max);
    }
    if let Some(attempts) = max_upload_attempts {
        settings = settings.with_max_upload_attempts(attempts);
    }
    if convert_links {
        settings = settings.with_convert_links(true);
    }
    settings
        .validate()
        .map_err(|e| anyhow::anyhow!(e.user_message()))?;

    let providers = Providers::from_tools(&manifest.tools);
    let progress = ConsoleProgress::new();

    let pipeline = BatchPipeline::new(
        BatchPipelineDeps {
            patcher: providers.patcher,
            archiver: providers.archiver,
            uploader: providers.uploader,
            converter: providers.converter,
            emitter: Arc::new(progress.clone()),
        },
        settings,
    );

    // Ctrl-C is the global cancel: nothing new starts, in-flight transfers
    // finish their current attempt.
    let cancel = CancellationToken::new();
    let ctrl_c_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, cancelling remaining work");
            ctrl_c_cancel.cancel();
        }
    });

    let result = pipeline.run(&manifest.items, cancel).await;
    progress.finish();
    print_summary(&result);

    if result.is_clean() {
        Ok(())
    } else {
        bail!("run finished with failures")
    }
}

fn validate(manifest_path: &Path) -> Result<()> {
    let manifest = manifest::load(manifest_path)?;
    println!(
        "Manifest OK: {} item(s), {} to patch, {} to archive, {} to publish",
        manifest.items.len(),
        manifest.items.iter().filter(|i| i.patch).count(),
        manifest.items.iter().filter(|i| i.archive || i.publish).count(),
        manifest.items.iter().filter(|i| i.publish).count(),
    );
    Ok(())
}

fn print_summary(result: &RunResult) {
    println!(
        "patch: {} ok / {} failed   archive: {} ok / {} failed   publish: {} ok / {} failed / {} cancelled",
        result.patch.succeeded,
        result.patch.failed,
        result.archive.succeeded,
        result.archive.failed,
        result.publish.succeeded,
        result.publish.failed,
        result.publish.cancelled,
    );
    for outcome in &result.outcomes {
        if let Some(link) = outcome.best_link() {
            println!("  {}: {link}", outcome.id);
        }
    }
    for failure in &result.failures {
        eprintln!("  failure: {failure}");
    }
}
