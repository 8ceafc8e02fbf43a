//! Scan command implementation: a dry run of the next ingestion pass.

use crate::cli::format_time;
use crate::config::Config;
use crate::dedup::{Decision, DedupEngine};
use crate::ingest::Ingestor;
use crate::types::VolumeSerial;
use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

/// Arguments for the scan command
#[derive(Args)]
pub struct ScanArgs {
    /// Mount point or drive root of the volume
    #[arg(short, long)]
    pub root: PathBuf,

    /// Volume serial number (decimal, 0x hex, or XXXX-XXXX)
    #[arg(short, long)]
    pub serial: VolumeSerial,

    /// Print the candidate list as JSON
    #[arg(long)]
    pub json: bool,
}

#[derive(Serialize)]
struct Candidate {
    path: PathBuf,
    size: u64,
    modified_time: i64,
    decision: Decision,
}

/// Run the scan command
pub async fn run(args: ScanArgs, config: Config) -> Result<()> {
    let root = args.root.clone();
    let serial = args.serial;
    let (manifest, scan) = tokio::task::spawn_blocking(move || Ingestor::new(config).plan(&root, serial)).await??;

    // Keywords were already applied during the scan
    let classifier = DedupEngine::with_keywords(&[]);
    let candidates: Vec<Candidate> = scan
        .files
        .into_iter()
        .map(|mut file| {
            let decision = classifier.decide(&mut file, &manifest);
            Candidate {
                path: file.path,
                size: file.size,
                modified_time: file.modified_time,
                decision,
            }
        })
        .collect();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&candidates)?);
        return Ok(());
    }

    println!("Scanning volume {} ({})", args.root.display(), args.serial.label());
    for candidate in &candidates {
        println!(
            "  {:<14} {:>12} bytes  {}  {}",
            format!("{:?}", candidate.decision),
            candidate.size,
            format_time(candidate.modified_time),
            candidate.path.display()
        );
    }

    let stats = &scan.stats;
    println!("Scan summary:");
    println!("  Files seen:        {}", stats.files_seen);
    println!("  Considered:        {}", stats.considered);
    println!("  Would copy:        {}", candidates.len());
    println!("  Already current:   {}", stats.already_current);
    println!("  Too large:         {}", stats.too_large);
    println!("  Wrong extension:   {}", stats.extension_rejected);
    println!("  No keyword match:  {}", stats.keyword_rejected);
    if stats.lossy_names > 0 {
        println!("  Non-UTF-8 names:   {}", stats.lossy_names);
    }
    if stats.errors > 0 {
        println!("  Unreadable:        {}", stats.errors);
    }

    Ok(())
}
