//! Command-line interface for nova-ingest.
//!
//! Volume arrival is delivered explicitly: whatever watches for removable
//! media invokes `nova-ingest ingest --root <mount> --serial <serial>`.

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

pub mod ingest;
pub mod manifest;
pub mod recover;
pub mod scan;

/// nova-ingest - incremental removable-volume ingestion
#[derive(Parser)]
#[command(name = "nova-ingest")]
#[command(about = "Copy new and changed files from removable volumes into a local archive")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Config file (JSON)
    #[arg(short, long, global = true, default_value = crate::config::DEFAULT_CONFIG_FILE)]
    pub config: PathBuf,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Write logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Run an ingestion pass for a mounted volume
    Ingest(ingest::IngestArgs),
    /// Show which files the next pass would copy
    Scan(scan::ScanArgs),
    /// Inspect a volume's manifest
    Manifest(manifest::ManifestArgs),
    /// Restore archived files under their original names
    Recover(recover::RecoverArgs),
}

/// Render a manifest timestamp (UNIX seconds) for display
pub fn format_time(secs: i64) -> String {
    match DateTime::<Utc>::from_timestamp(secs, 0) {
        Some(time) => time.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => secs.to_string(),
    }
}
