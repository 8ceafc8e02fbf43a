//! Copy pass: archives accepted files under their anonymized keys.
//!
//! Layout: `<archive_root>/<serial>/<dir_key>/<file_key>`. Only files whose
//! copy completed are returned, and only those ever reach the manifest.

use crate::types::{FileDescriptor, VolumeSerial};
use crate::Result;
use rayon::prelude::*;
use std::collections::HashSet;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Progress callbacks for the copy pass. Called from worker threads when
/// copying in parallel.
pub trait CopyProgress: Sync {
    /// A file finished copying; `done` counts successes so far
    fn on_file_copied(&self, done: usize, total: usize, path: &Path);

    fn on_file_failed(&self, path: &Path, error: &str);

    fn on_complete(&self, copied: usize, total: usize);
}

/// Discards progress
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentProgress;

impl CopyProgress for SilentProgress {
    fn on_file_copied(&self, _done: usize, _total: usize, _path: &Path) {}

    fn on_file_failed(&self, _path: &Path, _error: &str) {}

    fn on_complete(&self, _copied: usize, _total: usize) {}
}

/// Single-line running count on stdout
#[derive(Debug, Default)]
pub struct ConsoleProgress {
    stdout: Mutex<()>,
}

impl ConsoleProgress {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CopyProgress for ConsoleProgress {
    fn on_file_copied(&self, done: usize, total: usize, _path: &Path) {
        let _guard = self.stdout.lock();
        let percent = if total == 0 { 100 } else { done * 100 / total };
        print!("\rCopy progress: {}/{} ({}%)", done, total, percent);
        let _ = std::io::stdout().flush();
    }

    fn on_file_failed(&self, path: &Path, error: &str) {
        let _guard = self.stdout.lock();
        eprintln!("\nFailed to copy {}: {}", path.display(), error);
    }

    fn on_complete(&self, _copied: usize, total: usize) {
        if total > 0 {
            println!();
        }
    }
}

/// Result of one copy pass
#[derive(Debug, Default)]
pub struct CopyOutcome {
    /// Files whose copy completed
    pub copied: Vec<FileDescriptor>,
    pub failed: usize,
    pub bytes_copied: u64,
}

struct CopyJob {
    descriptor: FileDescriptor,
    destination: PathBuf,
}

/// Copies accepted files into the per-volume archive
#[derive(Debug, Clone)]
pub struct CopyEngine {
    archive_root: PathBuf,
    parallel: bool,
}

impl CopyEngine {
    pub fn new<P: AsRef<Path>>(archive_root: P) -> Self {
        Self {
            archive_root: archive_root.as_ref().to_path_buf(),
            parallel: false,
        }
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn archive_root(&self) -> &Path {
        &self.archive_root
    }

    /// Archive directory for one volume
    pub fn volume_dir(&self, serial: VolumeSerial) -> PathBuf {
        self.archive_root.join(serial.to_string())
    }

    /// Copy every descriptor, returning the ones that made it.
    ///
    /// Failures to create a directory skip that directory's files; failures
    /// to copy skip that file. Neither stops the pass.
    pub fn copy_accepted(
        &self,
        descriptors: Vec<FileDescriptor>,
        serial: VolumeSerial,
        progress: &dyn CopyProgress,
    ) -> CopyOutcome {
        let total = descriptors.len();
        let mut outcome = CopyOutcome::default();
        if total == 0 {
            return outcome;
        }

        let volume_dir = self.volume_dir(serial);
        if let Err(e) = fs::create_dir_all(&volume_dir) {
            warn!("Failed to create archive directory {}: {}", volume_dir.display(), e);
            outcome.failed = total;
            progress.on_complete(0, total);
            return outcome;
        }

        let (jobs, unplaced) = plan_jobs(&volume_dir, descriptors, progress);
        outcome.failed += unplaced;

        let done = AtomicUsize::new(0);
        let run = |job: CopyJob| -> Option<(FileDescriptor, u64)> {
            match copy_file(&job.descriptor.path, &job.destination) {
                Ok(bytes) => {
                    let n = done.fetch_add(1, Ordering::SeqCst) + 1;
                    debug!("Copied {} -> {}", job.descriptor.path.display(), job.destination.display());
                    progress.on_file_copied(n, total, &job.descriptor.path);
                    Some((job.descriptor, bytes))
                }
                Err(e) => {
                    warn!("Failed to copy {}: {}", job.descriptor.path.display(), e);
                    progress.on_file_failed(&job.descriptor.path, &e.to_string());
                    None
                }
            }
        };

        let results: Vec<_> = if self.parallel {
            // Per-thread accumulation, merged once at the end
            jobs.into_par_iter()
                .fold(Vec::new, |mut acc, job| {
                    acc.push(run(job));
                    acc
                })
                .reduce(Vec::new, |mut left, mut right| {
                    left.append(&mut right);
                    left
                })
        } else {
            jobs.into_iter().map(run).collect()
        };

        for result in results {
            match result {
                Some((descriptor, bytes)) => {
                    outcome.bytes_copied += bytes;
                    outcome.copied.push(descriptor);
                }
                None => outcome.failed += 1,
            }
        }

        progress.on_complete(outcome.copied.len(), total);
        info!(
            "Copied {}/{} files ({} bytes) for volume {}",
            outcome.copied.len(),
            total,
            outcome.bytes_copied,
            serial
        );
        outcome
    }
}

/// Create each destination directory once and pair files with destinations.
/// Returns the jobs and the number of files whose directory could not be
/// created.
fn plan_jobs(
    volume_dir: &Path,
    descriptors: Vec<FileDescriptor>,
    progress: &dyn CopyProgress,
) -> (Vec<CopyJob>, usize) {
    let mut created: HashSet<String> = HashSet::new();
    let mut broken: HashSet<String> = HashSet::new();
    let mut jobs = Vec::with_capacity(descriptors.len());
    let mut unplaced = 0;

    for mut descriptor in descriptors {
        let (dir_key, file_key) = descriptor.keys();
        let dir_path = volume_dir.join(dir_key.as_str());

        if broken.contains(dir_key.as_str()) {
            unplaced += 1;
            continue;
        }

        if !created.contains(dir_key.as_str()) {
            if let Err(e) = fs::create_dir_all(&dir_path) {
                warn!("Failed to create directory {}: {}", dir_path.display(), e);
                progress.on_file_failed(&descriptor.path, &e.to_string());
                broken.insert(dir_key.as_str().to_string());
                unplaced += 1;
                continue;
            }
            created.insert(dir_key.as_str().to_string());
        }

        jobs.push(CopyJob {
            destination: dir_path.join(file_key.as_str()),
            descriptor,
        });
    }

    (jobs, unplaced)
}

/// Copy one file, replacing any previous archived version
fn copy_file(source: &Path, destination: &Path) -> Result<u64> {
    Ok(fs::copy(source, destination)?)
}
