//! The ingestion pass: load manifest, scan, decide, copy, merge, persist.

use crate::config::Config;
use crate::copier::{CopyEngine, CopyProgress};
use crate::manifest::{Manifest, ManifestStore};
use crate::scanner::{ScanResult, ScanStats, TreeScanner};
use crate::types::VolumeSerial;
use crate::{Error, Result};
use serde::Serialize;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, span, Level};

/// Summary of one ingestion pass
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub serial: VolumeSerial,
    pub volume_root: PathBuf,
    /// Files that passed the size and extension filters
    pub considered: usize,
    /// Files selected for copying
    pub accepted: usize,
    pub copied: usize,
    pub failed: usize,
    pub bytes_copied: u64,
    pub manifest_written: bool,
    pub scan: ScanStats,
    pub duration_ms: u64,
}

impl IngestReport {
    /// Whether the volume had nothing new
    pub fn nothing_new(&self) -> bool {
        self.accepted == 0
    }
}

/// Runs ingestion passes for arriving volumes.
///
/// Passes for the same volume are serialized through the volume lock, across
/// threads and processes: a second pass waits until the running one has
/// persisted its manifest. Passes for different volumes may overlap.
#[derive(Debug)]
pub struct Ingestor {
    config: Config,
    store: ManifestStore,
    copier: CopyEngine,
}

impl Ingestor {
    pub fn new(config: Config) -> Self {
        let store = ManifestStore::from_config(&config);
        let copier = CopyEngine::new(&config.archive_dir).with_parallel(config.parallel_copy);
        Self {
            config,
            store,
            copier,
        }
    }

    /// Replace the manifest store, e.g. to use another codec
    pub fn with_store(mut self, store: ManifestStore) -> Self {
        self.store = store;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &ManifestStore {
        &self.store
    }

    pub fn copier(&self) -> &CopyEngine {
        &self.copier
    }

    /// Scan and decide without copying or persisting anything
    pub fn plan<P: AsRef<Path>>(&self, volume_root: P, serial: VolumeSerial) -> Result<(Manifest, ScanResult)> {
        let volume_root = volume_root.as_ref();
        ensure_root(volume_root)?;

        let manifest = self.store.load(serial);
        let scan = TreeScanner::new(&self.config).scan(volume_root, &manifest);
        Ok((manifest, scan))
    }

    /// Run one full ingestion pass for a volume
    pub fn ingest<P: AsRef<Path>>(
        &self,
        volume_root: P,
        serial: VolumeSerial,
        progress: &dyn CopyProgress,
    ) -> Result<IngestReport> {
        let volume_root = volume_root.as_ref();
        let span = span!(Level::INFO, "ingest", serial = %serial, label = %serial.label());
        let _enter = span.enter();
        let started = Instant::now();

        info!("Volume {} detected at {}", serial, volume_root.display());
        ensure_root(volume_root)?;
        let _lock = self.store.lock_volume(serial)?;
        let (manifest, scan) = self.plan(volume_root, serial)?;
        let accepted = scan.files.len();

        let mut report = IngestReport {
            serial,
            volume_root: volume_root.to_path_buf(),
            considered: scan.stats.considered,
            accepted,
            copied: 0,
            failed: 0,
            bytes_copied: 0,
            manifest_written: false,
            scan: scan.stats,
            duration_ms: 0,
        };

        if accepted == 0 {
            info!("No new files on volume {}", serial);
            report.duration_ms = started.elapsed().as_millis() as u64;
            return Ok(report);
        }

        let mut outcome = self.copier.copy_accepted(scan.files, serial, progress);
        report.copied = outcome.copied.len();
        report.failed = outcome.failed;
        report.bytes_copied = outcome.bytes_copied;

        report.manifest_written = self
            .store
            .write_successes(serial, manifest, &mut outcome.copied)?
            .is_some();

        report.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            "Ingestion of volume {} finished: {}/{} copied, {} failed in {} ms",
            serial, report.copied, report.accepted, report.failed, report.duration_ms
        );
        Ok(report)
    }
}

fn ensure_root(volume_root: &Path) -> Result<()> {
    if volume_root.is_dir() {
        Ok(())
    } else {
        Err(Error::Io(std::io::Error::new(
            ErrorKind::NotFound,
            format!("volume root {} is not a directory", volume_root.display()),
        )))
    }
}
