//! Manifest command implementation for inspecting per-volume manifests.

use crate::cli::format_time;
use crate::config::Config;
use crate::keys::KEY_SCHEME;
use crate::manifest::ManifestStore;
use crate::types::VolumeSerial;
use anyhow::{Context, Result};
use clap::Args;

/// Arguments for the manifest command
#[derive(Args)]
pub struct ManifestArgs {
    /// Volume whose manifest to show; lists known volumes when omitted
    #[arg(short, long)]
    pub serial: Option<VolumeSerial>,

    /// Output format (summary, json)
    #[arg(long, default_value = "summary")]
    pub format: String,
}

/// Run the manifest command
pub async fn run(args: ManifestArgs, config: Config) -> Result<()> {
    let store = ManifestStore::from_config(&config);

    let Some(serial) = args.serial else {
        return list_volumes(&store);
    };

    let manifest = store
        .load_existing(serial)
        .with_context(|| format!("Failed to read manifest for volume {}", serial))?;

    match args.format.as_str() {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&manifest)?);
        }
        "summary" => {
            println!("Manifest for volume {} ({})", serial, serial.label());
            println!("  Document:    {}", store.manifest_path(serial).display());
            println!("  Directories: {}", manifest.directories().count());
            println!("  Files:       {}", manifest.file_count());
            println!("  Key scheme:  {}", KEY_SCHEME);
            println!();
            for (dir_key, directory) in manifest.directories() {
                let bytes: u64 = directory.files.values().map(|f| f.size).sum();
                let latest = directory
                    .files
                    .values()
                    .map(|f| f.modified_time)
                    .max()
                    .map(format_time)
                    .unwrap_or_default();
                println!(
                    "  {}  {:>5} files {:>12} bytes  {:<19}  {}",
                    dir_key,
                    directory.files.len(),
                    bytes,
                    latest,
                    directory.original_path
                );
            }
        }
        other => anyhow::bail!("Unknown format: {} (expected summary or json)", other),
    }

    Ok(())
}

fn list_volumes(store: &ManifestStore) -> Result<()> {
    let serials = store.list_volumes()?;
    if serials.is_empty() {
        println!("No manifests found in {}", store.manifests_path().display());
        return Ok(());
    }

    println!("Known volumes:");
    for serial in serials {
        let files = store.load(serial).file_count();
        println!("  {:<12} {}  {} files", serial, serial.label(), files);
    }
    Ok(())
}
