use crate::keys::AnonymizedKey;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Platform-assigned identifier of a removable volume; the manifest partition key
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VolumeSerial(pub u32);

impl VolumeSerial {
    /// The `XXXX-XXXX` form shown by volume tools
    pub fn label(&self) -> String {
        format!("{:04X}-{:04X}", self.0 >> 16, self.0 & 0xFFFF)
    }
}

/// Decimal renders as the on-disk namespace (`data/<serial>`, `<serial>.json`)
impl fmt::Display for VolumeSerial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for VolumeSerial {
    fn from(value: u32) -> Self {
        Self(value)
    }
}

/// Accepts decimal (`305419896`), `0x12345678`, or the label form `1234-5678`
impl FromStr for VolumeSerial {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let input = s.trim();
        let invalid = || Error::InvalidSerial {
            input: s.to_string(),
        };

        let parsed = if let Some((high, low)) = input.split_once('-') {
            if high.len() != 4 || low.len() != 4 {
                return Err(invalid());
            }
            u32::from_str_radix(&format!("{}{}", high, low), 16)
        } else if let Some(hex) = input
            .strip_prefix("0x")
            .or_else(|| input.strip_prefix("0X"))
        {
            u32::from_str_radix(hex, 16)
        } else {
            input.parse::<u32>()
        };

        parsed.map(VolumeSerial).map_err(|_| invalid())
    }
}

/// One file considered during an ingestion pass
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDescriptor {
    /// Absolute source path on the volume
    pub path: PathBuf,
    /// Parent directory, as recorded in the manifest
    pub parent_path: String,
    pub file_name: String,
    pub size: u64,
    /// Seconds since the UNIX epoch
    pub modified_time: i64,
    dir_key: Option<AnonymizedKey>,
    file_key: Option<AnonymizedKey>,
}

impl FileDescriptor {
    pub fn new(path: &Path, size: u64, modified_time: i64) -> Self {
        let parent_path = path
            .parent()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        Self {
            path: path.to_path_buf(),
            parent_path,
            file_name,
            size,
            modified_time,
            dir_key: None,
            file_key: None,
        }
    }

    /// Full path as text, used for keyword matching
    pub fn path_str(&self) -> std::borrow::Cow<'_, str> {
        self.path.to_string_lossy()
    }

    /// Derive the anonymized keys if not done yet
    pub fn assign_keys(&mut self) {
        self.keys();
    }

    pub fn dir_key(&self) -> Option<&AnonymizedKey> {
        self.dir_key.as_ref()
    }

    pub fn file_key(&self) -> Option<&AnonymizedKey> {
        self.file_key.as_ref()
    }

    /// Both keys, deriving them first when needed
    pub fn keys(&mut self) -> (AnonymizedKey, AnonymizedKey) {
        let Self {
            parent_path,
            file_name,
            dir_key,
            file_key,
            ..
        } = self;
        let dir = dir_key.get_or_insert_with(|| AnonymizedKey::derive(parent_path));
        let file = file_key.get_or_insert_with(|| AnonymizedKey::derive(file_name));
        (dir.clone(), file.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serial_parsing() {
        assert_eq!("305419896".parse::<VolumeSerial>().unwrap(), VolumeSerial(0x1234_5678));
        assert_eq!("1234-5678".parse::<VolumeSerial>().unwrap(), VolumeSerial(0x1234_5678));
        assert_eq!("abcd-EF01".parse::<VolumeSerial>().unwrap(), VolumeSerial(0xABCD_EF01));
        assert_eq!("0x10".parse::<VolumeSerial>().unwrap(), VolumeSerial(16));

        assert!("12-345678".parse::<VolumeSerial>().is_err());
        assert!("4294967296".parse::<VolumeSerial>().is_err());
        assert!("volume".parse::<VolumeSerial>().is_err());
    }

    #[test]
    fn test_serial_display() {
        let serial = VolumeSerial(0x1234_5678);
        assert_eq!(serial.to_string(), "305419896");
        assert_eq!(serial.label(), "1234-5678");
    }

    #[test]
    fn test_descriptor_components() {
        let mut descriptor = FileDescriptor::new(Path::new("/media/usb/docs/report.txt"), 42, 1_700_000_000);
        assert_eq!(descriptor.parent_path, "/media/usb/docs");
        assert_eq!(descriptor.file_name, "report.txt");
        assert!(descriptor.dir_key().is_none());

        let (dir, file) = descriptor.keys();
        assert_eq!(dir, AnonymizedKey::derive("/media/usb/docs"));
        assert_eq!(file, AnonymizedKey::derive("report.txt"));
        assert_eq!(descriptor.dir_key(), Some(&dir));
    }
}
