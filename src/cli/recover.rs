//! Recover command implementation.

use crate::config::Config;
use crate::copier::CopyEngine;
use crate::manifest::ManifestStore;
use crate::recover::{RecoverEngine, RecoverOptions};
use crate::types::VolumeSerial;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the recover command
#[derive(Args)]
pub struct RecoverArgs {
    /// Volume to recover
    #[arg(short, long)]
    pub serial: VolumeSerial,

    /// Directory to restore into
    #[arg(short, long)]
    pub target: PathBuf,

    /// Replace files that already exist in the target
    #[arg(long)]
    pub overwrite: bool,
}

/// Run the recover command
pub async fn run(args: RecoverArgs, config: Config) -> Result<()> {
    println!("Recovering volume {} into {}", args.serial, args.target.display());

    let target = args.target.clone();
    let serial = args.serial;
    let options = RecoverOptions {
        overwrite: args.overwrite,
    };
    let report = tokio::task::spawn_blocking(move || {
        let store = ManifestStore::from_config(&config);
        let copier = CopyEngine::new(&config.archive_dir);
        RecoverEngine::new(&store, &copier).recover(serial, &target, &options)
    })
    .await??;

    println!("Recovery completed:");
    println!("  Restored: {} files ({} bytes)", report.restored, report.bytes_restored);
    println!("  Skipped:  {} existing files", report.skipped);
    if !report.failed.is_empty() {
        println!("  Failed:   {}", report.failed.len());
        for (path, error) in &report.failed {
            println!("    {}: {}", path.display(), error);
        }
    }

    Ok(())
}
