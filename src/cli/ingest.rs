//! Ingest command implementation.

use crate::config::Config;
use crate::copier::ConsoleProgress;
use crate::ingest::Ingestor;
use crate::types::VolumeSerial;
use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the ingest command
#[derive(Args)]
pub struct IngestArgs {
    /// Mount point or drive root of the volume
    #[arg(short, long)]
    pub root: PathBuf,

    /// Volume serial number (decimal, 0x hex, or XXXX-XXXX)
    #[arg(short, long)]
    pub serial: VolumeSerial,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Run the ingest command
pub async fn run(args: IngestArgs, config: Config) -> Result<()> {
    println!(
        "Volume detected: {} (serial {}, {})",
        args.root.display(),
        args.serial,
        args.serial.label()
    );

    let root = args.root.clone();
    let serial = args.serial;
    let report = tokio::task::spawn_blocking(move || {
        Ingestor::new(config).ingest(&root, serial, &ConsoleProgress::new())
    })
    .await??;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if report.nothing_new() {
        println!("No new files to copy ({} files considered)", report.considered);
        return Ok(());
    }

    println!("Ingestion completed:");
    println!("  Files considered: {}", report.considered);
    println!("  Files copied:     {}/{}", report.copied, report.accepted);
    println!("  Bytes copied:     {}", report.bytes_copied);
    if report.failed > 0 {
        println!("  Failed:           {}", report.failed);
    }
    if !report.manifest_written {
        println!("  Manifest unchanged");
    }

    Ok(())
}
