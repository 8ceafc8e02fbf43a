//! Rebuilds the original directory layout of a volume from its archive.
//!
//! Every manifest entry records the original parent path and file name, so an
//! archived file `<archive>/<serial>/<dir_key>/<file_key>` can be restored to
//! `<target>/<original parent>/<original name>`. Original paths are made
//! relative first (drive prefixes, roots and `..` are dropped) so nothing is
//! written outside the target directory.

use crate::copier::CopyEngine;
use crate::keys::AnonymizedKey;
use crate::manifest::ManifestStore;
use crate::types::VolumeSerial;
use crate::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Options for a recovery run
#[derive(Debug, Clone, Default)]
pub struct RecoverOptions {
    /// Replace files that already exist in the target
    pub overwrite: bool,
}

/// Summary of a recovery run
#[derive(Debug, Default, Serialize)]
pub struct RecoverReport {
    pub restored: usize,
    pub skipped: usize,
    pub failed: Vec<(PathBuf, String)>,
    pub bytes_restored: u64,
}

/// Restores archived files for one volume
#[derive(Debug)]
pub struct RecoverEngine<'a> {
    store: &'a ManifestStore,
    copier: &'a CopyEngine,
}

impl<'a> RecoverEngine<'a> {
    pub fn new(store: &'a ManifestStore, copier: &'a CopyEngine) -> Self {
        Self { store, copier }
    }

    pub fn recover<P: AsRef<Path>>(
        &self,
        serial: VolumeSerial,
        target: P,
        options: &RecoverOptions,
    ) -> Result<RecoverReport> {
        let target = target.as_ref();
        let manifest = self.store.load_existing(serial)?;
        let volume_dir = self.copier.volume_dir(serial);

        info!(
            "Recovering {} files of volume {} into {}",
            manifest.file_count(),
            serial,
            target.display()
        );
        fs::create_dir_all(target)?;

        let mut report = RecoverReport::default();

        for (dir_key, directory) in manifest.directories() {
            let restore_dir = target.join(relative_original(&directory.original_path));

            for (file_key, entry) in &directory.files {
                let source = archived_path(&volume_dir, dir_key, file_key);
                let destination = restore_dir.join(sanitize_file_name(&entry.original_filename));

                if destination.exists() && !options.overwrite {
                    debug!("Skipping existing {}", destination.display());
                    report.skipped += 1;
                    continue;
                }

                match restore_file(&source, &destination) {
                    Ok(bytes) => {
                        report.restored += 1;
                        report.bytes_restored += bytes;
                    }
                    Err(e) => {
                        warn!("Failed to restore {}: {}", destination.display(), e);
                        report.failed.push((destination, e.to_string()));
                    }
                }
            }
        }

        info!(
            "Recovery finished: {} restored, {} skipped, {} failed",
            report.restored,
            report.skipped,
            report.failed.len()
        );
        Ok(report)
    }
}

fn archived_path(volume_dir: &Path, dir_key: &AnonymizedKey, file_key: &AnonymizedKey) -> PathBuf {
    volume_dir.join(dir_key.as_str()).join(file_key.as_str())
}

fn restore_file(source: &Path, destination: &Path) -> Result<u64> {
    if let Some(parent) = destination.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(fs::copy(source, destination)?)
}

/// Turn a recorded absolute path (`E:\docs\q3`, `/media/usb/docs`) into a
/// relative one. Both separator styles are accepted since manifests may come
/// from another platform.
fn relative_original(original_path: &str) -> PathBuf {
    original_path
        .split(['/', '\\'])
        .enumerate()
        // Drive letters such as `E:` are dropped
        .filter(|(index, part)| !(*index == 0 && part.ends_with(':')))
        .map(|(_, part)| part)
        .filter(|part| !matches!(*part, "" | "." | ".."))
        .collect()
}

fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::copier::SilentProgress;
    use crate::manifest::merge;
    use crate::manifest::Manifest;
    use crate::types::FileDescriptor;
    use tempfile::TempDir;

    #[test]
    fn test_relative_original() {
        assert_eq!(relative_original("E:\\docs\\q3"), PathBuf::from("docs").join("q3"));
        assert_eq!(relative_original("/media/usb/docs"), PathBuf::from("media").join("usb").join("docs"));
        assert_eq!(relative_original("/vol/../../etc"), PathBuf::from("vol").join("etc"));
        assert_eq!(relative_original("E:\\"), PathBuf::new());
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("report.txt"), "report.txt");
        assert_eq!(sanitize_file_name("../evil"), ".._evil");
        assert_eq!(sanitize_file_name(".."), "_");
    }

    #[test]
    fn test_recover_round_trip() -> Result<()> {
        let temp_dir = TempDir::new()?;
        let volume = temp_dir.path().join("volume");
        fs::create_dir_all(volume.join("docs"))?;
        fs::write(volume.join("docs/a.txt"), "alpha")?;
        fs::write(volume.join("docs/b.txt"), "beta")?;

        let store = ManifestStore::new(temp_dir.path().join("manifests"));
        let copier = CopyEngine::new(temp_dir.path().join("data"));
        let serial = VolumeSerial(77);

        let files = vec![
            FileDescriptor::new(&volume.join("docs/a.txt"), 5, 1),
            FileDescriptor::new(&volume.join("docs/b.txt"), 4, 1),
        ];
        let mut outcome = copier.copy_accepted(files, serial, &SilentProgress);
        store.persist(serial, &merge(Manifest::new(), &mut outcome.copied))?;

        // One archived file goes missing
        let (dir_key, file_key) = FileDescriptor::new(&volume.join("docs/b.txt"), 4, 1).keys();
        fs::remove_file(archived_path(&copier.volume_dir(serial), &dir_key, &file_key))?;

        let target = temp_dir.path().join("restored");
        let engine = RecoverEngine::new(&store, &copier);
        let report = engine.recover(serial, &target, &RecoverOptions::default())?;

        assert_eq!(report.restored, 1);
        assert_eq!(report.failed.len(), 1);
        let restored = target
            .join(relative_original(&volume.join("docs").to_string_lossy()))
            .join("a.txt");
        assert_eq!(fs::read_to_string(&restored)?, "alpha");

        let again = engine.recover(serial, &target, &RecoverOptions::default())?;
        assert_eq!(again.skipped, 1);
        Ok(())
    }

    #[test]
    fn test_recover_unknown_volume_fails() {
        let temp_dir = TempDir::new().unwrap();
        let store = ManifestStore::new(temp_dir.path().join("manifests"));
        let copier = CopyEngine::new(temp_dir.path().join("data"));

        let result = RecoverEngine::new(&store, &copier).recover(
            VolumeSerial(1),
            temp_dir.path().join("out"),
            &RecoverOptions::default(),
        );
        assert!(result.is_err());
    }
}
