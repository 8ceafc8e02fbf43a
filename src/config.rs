//! Engine configuration.
//!
//! The config file keeps the PascalCase key layout used by existing
//! deployments (`MaxFileSize`, `Keywords`, `AllowedExtensions`), extended with
//! the archive and manifest locations.

use crate::manifest::invert_bytes;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Default maximum file size (1000 MiB)
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1_048_576_000;

/// Default config file name, resolved against the working directory
pub const DEFAULT_CONFIG_FILE: &str = "config.json";

/// Process-wide ingestion settings, immutable once loaded
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    /// Files larger than this (in bytes) are never copied
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Substrings of which at least one must occur in a file's full path.
    /// Empty means no keyword filtering.
    #[serde(default)]
    pub keywords: Vec<String>,
    /// Extensions including the leading dot, matched case-sensitively.
    /// Empty means no file is allowed.
    #[serde(default)]
    pub allowed_extensions: Vec<String>,
    /// Root under which archived files are stored, one subdirectory per serial
    #[serde(default = "default_archive_dir")]
    pub archive_dir: PathBuf,
    /// Directory holding one manifest document per serial
    #[serde(default = "default_manifest_dir")]
    pub manifest_dir: PathBuf,
    /// Copy files on the rayon pool instead of sequentially
    #[serde(default)]
    pub parallel_copy: bool,
    /// Store manifests with every byte inverted, as legacy deployments do.
    /// This only keeps documents from being read at a glance.
    #[serde(default)]
    pub obfuscate_manifests: bool,
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

fn default_archive_dir() -> PathBuf {
    PathBuf::from("data")
}

fn default_manifest_dir() -> PathBuf {
    PathBuf::from("manifests")
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            keywords: Vec::new(),
            allowed_extensions: Vec::new(),
            archive_dir: default_archive_dir(),
            manifest_dir: default_manifest_dir(),
            parallel_copy: false,
            obfuscate_manifests: false,
        }
    }
}

impl Config {
    /// Load and validate config from a JSON file. Files written by legacy
    /// tooling with inverted bytes are accepted as well.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        debug!("Loading config from {}", path.display());

        let bytes = fs::read(path).map_err(|e| Error::Configuration {
            reason: format!("Failed to read config file {}: {}", path.display(), e),
        })?;

        let bytes = if looks_inverted(&bytes) {
            debug!("Config {} is stored inverted", path.display());
            invert_bytes(&bytes)
        } else {
            bytes
        };

        let content = String::from_utf8(bytes).map_err(|e| Error::Configuration {
            reason: format!("Config file {} is not UTF-8: {}", path.display(), e),
        })?;

        Self::from_json(&content)
    }

    /// Parse and validate config from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json).map_err(|e| Error::Configuration {
            reason: format!("Failed to parse config: {}", e),
        })?;

        let config = config.normalized();
        config.validate()?;
        Ok(config)
    }

    /// Sort and de-duplicate the extension set
    pub fn normalized(mut self) -> Self {
        self.allowed_extensions.sort();
        self.allowed_extensions.dedup();
        self
    }

    /// Validate config settings
    pub fn validate(&self) -> Result<()> {
        if self.max_file_size == 0 {
            return Err(Error::Configuration {
                reason: "MaxFileSize must be greater than 0".to_string(),
            });
        }

        if self.archive_dir.as_os_str().is_empty() || self.manifest_dir.as_os_str().is_empty() {
            return Err(Error::Configuration {
                reason: "ArchiveDir and ManifestDir must not be empty".to_string(),
            });
        }

        if self.archive_dir == self.manifest_dir {
            return Err(Error::Configuration {
                reason: format!(
                    "ArchiveDir and ManifestDir must differ (both are {})",
                    self.archive_dir.display()
                ),
            });
        }

        if self.allowed_extensions.is_empty() {
            warn!("AllowedExtensions is empty: no file will be copied");
        }

        for ext in &self.allowed_extensions {
            if !ext.starts_with('.') {
                warn!("Extension {:?} has no leading dot and will never match", ext);
            }
        }

        Ok(())
    }

    /// Whether `extension` (with leading dot) is in the allowed set
    pub fn allows_extension(&self, extension: &str) -> bool {
        self.allowed_extensions
            .iter()
            .any(|allowed| allowed == extension)
    }
}

/// A plain JSON document starts with `{` after optional whitespace; an
/// inverted one starts with its complement.
fn looks_inverted(bytes: &[u8]) -> bool {
    bytes
        .iter()
        .find(|b| !b.is_ascii_whitespace())
        .map_or(false, |&b| b == !b'{')
}
