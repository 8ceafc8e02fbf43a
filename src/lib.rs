//! # nova-ingest
//!
//! Incremental ingestion of removable volumes into a local archive.
//!
//! The first time a volume is seen every qualifying file is copied. On later
//! insertions of the same volume (identified by its serial number) only files
//! that are new or have a newer modification time are copied, based on a
//! per-volume manifest.
//!
//! ## Pipeline
//!
//! - **Manifest store**: loads the manifest for the volume serial
//! - **Tree scanner**: walks the volume, applying size and extension filters
//! - **Dedup engine**: keyword filter plus manifest lookup by anonymized keys
//! - **Copy engine**: archives accepted files, reporting which copies succeeded
//! - **Manifest writer**: merges successful copies and persists the manifest
//!
//! ```rust,no_run
//! use nova_ingest::{Config, Ingestor, VolumeSerial};
//! use nova_ingest::copier::ConsoleProgress;
//!
//! # fn main() -> nova_ingest::Result<()> {
//! let config = Config::load("config.json")?;
//! let ingestor = Ingestor::new(config);
//!
//! let report = ingestor.ingest("/media/usb0", VolumeSerial(0x1234_5678), &ConsoleProgress::new())?;
//! println!("Copied {} of {} files", report.copied, report.accepted);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod copier;
pub mod dedup;
pub mod error;
pub mod ingest;
pub mod keys;
pub mod logging;
pub mod manifest;
pub mod recover;
pub mod scanner;
pub mod types;

// Re-export commonly used types
pub use config::Config;
pub use error::{Error, Result};
pub use ingest::{IngestReport, Ingestor};
pub use manifest::{Manifest, ManifestStore};
pub use types::{FileDescriptor, VolumeSerial};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
