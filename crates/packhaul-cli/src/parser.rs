//! Command-line argument definitions.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Batch patcher, archiver and publisher for game install folders.
#[derive(Parser, Debug)]
#[command(name = "packhaul", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a batch manifest.
    Run {
        /// Path to the manifest JSON file.
        manifest: PathBuf,

        /// Override the bound on concurrent uploads.
        #[arg(long)]
        max_concurrent_uploads: Option<u32>,

        /// Override the upload attempts per item.
        #[arg(long)]
        max_upload_attempts: Option<u32>,

        /// Chain link conversion after each successful upload.
        #[arg(long)]
        convert_links: bool,
    },

    /// Parse and validate a manifest without running it.
    Validate {
        /// Path to the manifest JSON file.
        manifest: PathBuf,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn run_parses_overrides() {
        let cli = Cli::parse_from([
            "packhaul",
            "run",
            "batch.json",
            "--max-concurrent-uploads",
            "5",
            "--convert-links",
        ]);
        match cli.command {
            Command::Run {
                manifest,
                max_concurrent_uploads,
                convert_links,
                ..
            } => {
                assert_eq!(manifest, PathBuf::from("batch.json"));
                assert_eq!(max_concurrent_uploads, Some(5));
                assert!(convert_links);
            }
            Command::Validate { .. } => panic!("expected run"),
        }
    }
}
