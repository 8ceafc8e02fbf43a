//! Per-volume manifest of archived files.
//!
//! A manifest maps anonymized directory keys to the original directory path
//! and the files archived from it. There is one manifest document per volume
//! serial. Documents are only ever extended or updated; entries for files that
//! disappeared from the volume are kept.

use crate::config::Config;
use crate::keys::AnonymizedKey;
use crate::types::{FileDescriptor, VolumeSerial};
use crate::{Error, Result};
use fs2::FileExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// A file previously archived from a directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub original_filename: String,
    #[serde(default)]
    pub size: u64,
    /// Seconds since the UNIX epoch
    pub modified_time: i64,
}

/// A source directory and the files archived from it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectoryEntry {
    /// Most recently observed original path, kept for inspection and recovery
    #[serde(default)]
    pub original_path: String,
    #[serde(default)]
    pub files: BTreeMap<AnonymizedKey, FileEntry>,
}

/// All directories archived from one volume
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    directories: BTreeMap<AnonymizedKey, DirectoryEntry>,
}

impl Manifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.directories.is_empty()
    }

    pub fn directory(&self, key: &AnonymizedKey) -> Option<&DirectoryEntry> {
        self.directories.get(key)
    }

    pub fn directories(&self) -> impl Iterator<Item = (&AnonymizedKey, &DirectoryEntry)> {
        self.directories.iter()
    }

    /// Recorded entry for a file, if any
    pub fn file(&self, dir_key: &AnonymizedKey, file_key: &AnonymizedKey) -> Option<&FileEntry> {
        self.directories.get(dir_key)?.files.get(file_key)
    }

    pub fn file_count(&self) -> usize {
        self.directories.values().map(|d| d.files.len()).sum()
    }

    /// Upsert one successfully archived file
    pub fn record(&mut self, descriptor: &mut FileDescriptor) {
        let (dir_key, file_key) = descriptor.keys();
        let directory = self.directories.entry(dir_key).or_default();
        directory.original_path = descriptor.parent_path.clone();
        directory.files.insert(
            file_key,
            FileEntry {
                original_filename: descriptor.file_name.clone(),
                size: descriptor.size,
                modified_time: descriptor.modified_time,
            },
        );
    }
}

/// Merge successfully copied files into a manifest.
///
/// Directory paths and file entries are overwritten with the latest
/// observation. Nothing is removed.
pub fn merge(mut manifest: Manifest, successes: &mut [FileDescriptor]) -> Manifest {
    for descriptor in successes.iter_mut() {
        manifest.record(descriptor);
    }
    manifest
}

/// Encodes manifests to and from their persisted byte form
pub trait ManifestCodec: Send + Sync {
    fn encode(&self, manifest: &Manifest) -> Result<Vec<u8>>;

    fn decode(&self, bytes: &[u8]) -> Result<Manifest>;

    /// File extension of persisted documents
    fn extension(&self) -> &'static str;
}

/// Plain pretty-printed JSON documents
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl ManifestCodec for JsonCodec {
    fn encode(&self, manifest: &Manifest) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(manifest)?)
    }

    fn decode(&self, bytes: &[u8]) -> Result<Manifest> {
        serde_json::from_slice(bytes).map_err(|e| Error::InvalidManifest {
            reason: e.to_string(),
        })
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

/// JSON documents with every byte inverted, the format legacy deployments
/// write. Anyone can undo the inversion; it is not a protection.
#[derive(Debug, Clone, Copy, Default)]
pub struct InvertedJsonCodec;

impl ManifestCodec for InvertedJsonCodec {
    fn encode(&self, manifest: &Manifest) -> Result<Vec<u8>> {
        Ok(invert_bytes(&JsonCodec.encode(manifest)?))
    }

    fn decode(&self, bytes: &[u8]) -> Result<Manifest> {
        JsonCodec.decode(&invert_bytes(bytes))
    }

    fn extension(&self) -> &'static str {
        "json"
    }
}

/// Bitwise complement of every byte
pub fn invert_bytes(bytes: &[u8]) -> Vec<u8> {
    bytes.iter().map(|b| !b).collect()
}

/// Exclusive hold on one volume's manifest, shared across processes through
/// `<manifest_dir>/<serial>.lock`. Released on drop.
#[derive(Debug)]
pub struct VolumeLock {
    file: File,
    lock_path: PathBuf,
}

impl VolumeLock {
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }
}

impl Drop for VolumeLock {
    fn drop(&mut self) {
        debug!("Releasing volume lock {}", self.lock_path.display());
        // Closing the file releases the lock as well
        let _ = FileExt::unlock(&self.file);
    }
}

/// Loads and persists manifests, one document per volume serial
pub struct ManifestStore {
    manifests_path: PathBuf,
    codec: Box<dyn ManifestCodec>,
}

impl std::fmt::Debug for ManifestStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ManifestStore")
            .field("manifests_path", &self.manifests_path)
            .finish()
    }
}

impl ManifestStore {
    /// Create a store using JSON documents. The directory is created lazily
    /// on the first write.
    pub fn new<P: AsRef<Path>>(manifests_path: P) -> Self {
        Self::with_codec(manifests_path, JsonCodec)
    }

    /// Create a store using the codec selected in `config`
    pub fn from_config(config: &Config) -> Self {
        if config.obfuscate_manifests {
            Self::with_codec(&config.manifest_dir, InvertedJsonCodec)
        } else {
            Self::new(&config.manifest_dir)
        }
    }

    pub fn with_codec<P: AsRef<Path>, C: ManifestCodec + 'static>(manifests_path: P, codec: C) -> Self {
        Self {
            manifests_path: manifests_path.as_ref().to_path_buf(),
            codec: Box::new(codec),
        }
    }

    pub fn manifests_path(&self) -> &Path {
        &self.manifests_path
    }

    /// Path of the document for `serial`
    pub fn manifest_path(&self, serial: VolumeSerial) -> PathBuf {
        self.manifests_path
            .join(format!("{}.{}", serial, self.codec.extension()))
    }

    /// Load the manifest for a volume.
    ///
    /// A missing document yields an empty manifest. So does an unreadable or
    /// malformed one: that is logged and the files get copied again.
    pub fn load(&self, serial: VolumeSerial) -> Manifest {
        let path = self.manifest_path(serial);

        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("No manifest for volume {} at {}", serial, path.display());
                return Manifest::new();
            }
            Err(e) => {
                warn!("Failed to read manifest {}: {}", path.display(), e);
                return Manifest::new();
            }
        };

        match self.codec.decode(&bytes) {
            Ok(manifest) => {
                debug!(
                    "Loaded manifest for volume {}: {} directories, {} files",
                    serial,
                    manifest.directories.len(),
                    manifest.file_count()
                );
                manifest
            }
            Err(e) => {
                warn!("Ignoring corrupt manifest {}: {}", path.display(), e);
                Manifest::new()
            }
        }
    }

    /// Strict variant of `load` that reports missing or malformed documents
    pub fn load_existing(&self, serial: VolumeSerial) -> Result<Manifest> {
        let path = self.manifest_path(serial);
        let bytes = fs::read(&path)?;
        self.codec.decode(&bytes)
    }

    /// Block until this process holds the volume's lock.
    ///
    /// Two passes for the same volume would each merge into the manifest
    /// they loaded and the later rename would drop the other's entries, so
    /// a pass holds this from load to persist.
    pub fn lock_volume(&self, serial: VolumeSerial) -> Result<VolumeLock> {
        fs::create_dir_all(&self.manifests_path)?;
        let lock_path = self.manifests_path.join(format!("{}.lock", serial));

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)?;

        debug!("Waiting for volume lock {}", lock_path.display());
        FileExt::lock_exclusive(&file)?;
        debug!("Acquired volume lock {}", lock_path.display());

        Ok(VolumeLock {
            file,
            lock_path,
        })
    }

    /// Write the full manifest for a volume.
    ///
    /// The document is written to a temporary file in the same directory,
    /// synced, then renamed over the previous one.
    pub fn persist(&self, serial: VolumeSerial, manifest: &Manifest) -> Result<PathBuf> {
        fs::create_dir_all(&self.manifests_path)?;

        let path = self.manifest_path(serial);
        let temp_path = self
            .manifests_path
            .join(format!(".{}.{}.tmp", serial, Uuid::new_v4()));

        let bytes = self.codec.encode(manifest)?;
        let written = write_synced(&temp_path, &bytes).and_then(|_| {
            fs::rename(&temp_path, &path)?;
            Ok(())
        });

        if let Err(e) = written {
            let _ = fs::remove_file(&temp_path);
            return Err(e);
        }

        info!(
            "Manifest for volume {} saved to {} ({} files)",
            serial,
            path.display(),
            manifest.file_count()
        );
        Ok(path)
    }

    /// Merge `successes` into `manifest` and persist the result.
    ///
    /// Returns `None` without touching disk when there is nothing to record.
    pub fn write_successes(
        &self,
        serial: VolumeSerial,
        manifest: Manifest,
        successes: &mut [FileDescriptor],
    ) -> Result<Option<Manifest>> {
        if successes.is_empty() {
            debug!("No successful copies for volume {}, manifest untouched", serial);
            return Ok(None);
        }

        let updated = merge(manifest, successes);
        self.persist(serial, &updated)?;
        Ok(Some(updated))
    }

    /// Serials that have a manifest document
    pub fn list_volumes(&self) -> Result<Vec<VolumeSerial>> {
        let mut serials = Vec::new();

        let entries = match fs::read_dir(&self.manifests_path) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(serials),
            Err(e) => return Err(e.into()),
        };

        for entry in entries {
            let path = entry?.path();
            if path.extension().map_or(false, |ext| ext == self.codec.extension()) {
                if let Some(serial) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u32>().ok())
                {
                    serials.push(VolumeSerial(serial));
                }
            }
        }

        serials.sort();
        Ok(serials)
    }
}

fn write_synced(path: &Path, bytes: &[u8]) -> Result<()> {
    let mut file = File::create(path)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    Ok(())
}
