//! Volume tree scanner.
//!
//! Walks every reachable file below a volume root and returns the files that
//! pass the size, extension, keyword and dedup filters. Unreadable entries are
//! logged and skipped; they never stop the walk.

use crate::config::Config;
use crate::dedup::{Decision, DedupEngine};
use crate::manifest::Manifest;
use crate::types::FileDescriptor;
use serde::Serialize;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, info, span, warn, Level};
use walkdir::WalkDir;

/// Maps filesystem timestamps onto the engine's reference epoch (UNIX
/// seconds, UTC).
///
/// `SystemTime` already counts from the UNIX epoch on every platform std
/// supports, so the detected offset is zero. A non-zero offset is only for
/// timestamps taken from a clock with another epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeBase {
    offset_secs: i64,
}

impl TimeBase {
    pub fn detect() -> Self {
        Self { offset_secs: 0 }
    }

    pub fn with_offset(offset_secs: i64) -> Self {
        Self { offset_secs }
    }

    /// Whole seconds since the reference epoch; pre-epoch times are negative
    pub fn normalize(&self, modified: SystemTime) -> i64 {
        let since_epoch = match modified.duration_since(SystemTime::UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_secs() as i64,
            Err(e) => {
                let before = e.duration();
                -(before.as_secs() as i64) - i64::from(before.subsec_nanos() > 0)
            }
        };
        since_epoch + self.offset_secs
    }
}

impl Default for TimeBase {
    fn default() -> Self {
        Self::detect()
    }
}

/// Counters collected during one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanStats {
    pub entries_visited: usize,
    pub files_seen: usize,
    /// Files that passed the size and extension filters
    pub considered: usize,
    pub too_large: usize,
    pub extension_rejected: usize,
    pub keyword_rejected: usize,
    pub already_current: usize,
    /// Considered files whose path is not valid UTF-8. Their keys come from
    /// a lossy rendering, so two such names can share one archive slot.
    pub lossy_names: usize,
    pub errors: usize,
}

/// Result of a scan: the accepted candidates and counters
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    pub files: Vec<FileDescriptor>,
    pub stats: ScanStats,
}

/// Walks a volume and filters candidates
#[derive(Debug, Clone)]
pub struct TreeScanner<'a> {
    config: &'a Config,
    dedup: DedupEngine<'a>,
    time_base: TimeBase,
}

impl<'a> TreeScanner<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            config,
            dedup: DedupEngine::new(config),
            time_base: TimeBase::detect(),
        }
    }

    pub fn with_time_base(mut self, time_base: TimeBase) -> Self {
        self.time_base = time_base;
        self
    }

    /// Scan `root`, returning files that need archiving given `manifest`
    pub fn scan<P: AsRef<Path>>(&self, root: P, manifest: &Manifest) -> ScanResult {
        let root = root.as_ref();
        let span = span!(Level::INFO, "scan", root = %root.display());
        let _enter = span.enter();

        let mut result = ScanResult::default();

        // walkdir keeps its own stack of open directories, so deep trees do
        // not grow the call stack. Links are not followed, which rules out
        // cycles.
        for entry in WalkDir::new(root).follow_links(false).into_iter() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!("Skipping entry due to error: {}", e);
                    result.stats.errors += 1;
                    continue;
                }
            };
            result.stats.entries_visited += 1;

            if !entry.file_type().is_file() {
                continue;
            }
            result.stats.files_seen += 1;

            let metadata = match entry.metadata() {
                Ok(metadata) => metadata,
                Err(e) => {
                    warn!("Failed to stat {}: {}", entry.path().display(), e);
                    result.stats.errors += 1;
                    continue;
                }
            };

            let size = metadata.len();
            if size > self.config.max_file_size {
                debug!("Too large ({} bytes): {}", size, entry.path().display());
                result.stats.too_large += 1;
                continue;
            }

            if !self.config.allows_extension(&dotted_extension(entry.path())) {
                result.stats.extension_rejected += 1;
                continue;
            }

            let modified = match metadata.modified() {
                Ok(modified) => self.time_base.normalize(modified),
                Err(e) => {
                    warn!("No modification time for {}: {}", entry.path().display(), e);
                    result.stats.errors += 1;
                    continue;
                }
            };

            result.stats.considered += 1;
            if entry.path().to_str().is_none() {
                warn!(
                    "Path is not valid UTF-8, keys use a lossy rendering: {}",
                    entry.path().display()
                );
                result.stats.lossy_names += 1;
            }

            let mut descriptor = FileDescriptor::new(entry.path(), size, modified);
            match self.dedup.decide(&mut descriptor, manifest) {
                Decision::KeywordMismatch => result.stats.keyword_rejected += 1,
                Decision::Current => result.stats.already_current += 1,
                _ => result.files.push(descriptor),
            }
        }

        info!(
            "Scan of {} complete: {} candidates from {} files ({} errors)",
            root.display(),
            result.files.len(),
            result.stats.files_seen,
            result.stats.errors
        );

        result
    }
}

/// Extension with its leading dot, or an empty string
fn dotted_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::merge;
    use pretty_assertions::assert_eq;
    use std::fs;
    use std::time::Duration;
    use tempfile::TempDir;

    fn config(max_file_size: u64, extensions: &[&str], keywords: &[&str]) -> Config {
        Config {
            max_file_size,
            allowed_extensions: extensions.iter().map(|s| s.to_string()).collect(),
            keywords: keywords.iter().map(|s| s.to_string()).collect(),
            ..Config::default()
        }
        .normalized()
    }

    fn write(root: &Path, relative: &str, len: usize) {
        let path = root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, vec![b'x'; len]).unwrap();
    }

    fn names(result: &ScanResult) -> Vec<String> {
        let mut names: Vec<String> = result.files.iter().map(|f| f.file_name.clone()).collect();
        names.sort();
        names
    }

    #[test]
    fn test_dotted_extension() {
        assert_eq!(dotted_extension(Path::new("/a/b.txt")), ".txt");
        assert_eq!(dotted_extension(Path::new("/a/b.tar.gz")), ".gz");
        assert_eq!(dotted_extension(Path::new("/a/.profile")), "");
        assert_eq!(dotted_extension(Path::new("/a/README")), "");
    }

    #[test]
    fn test_time_base() {
        let time_base = TimeBase::detect();
        let t = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        assert_eq!(time_base.normalize(t), 1_700_000_000);
        assert_eq!(time_base.normalize(SystemTime::UNIX_EPOCH), 0);

        let before = SystemTime::UNIX_EPOCH - Duration::from_secs(60);
        assert_eq!(time_base.normalize(before), -60);

        assert_eq!(TimeBase::with_offset(10).normalize(t), 1_700_000_010);
    }

    #[test]
    fn test_walks_nested_directories() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "top.txt", 1);
        write(temp_dir.path(), "a/b/c/d/deep.txt", 1);
        write(temp_dir.path(), "a/skip.bin", 1);

        let config = config(1000, &[".txt"], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path(), &Manifest::new());

        assert_eq!(names(&result), vec!["deep.txt", "top.txt"]);
        assert_eq!(result.stats.files_seen, 3);
        assert_eq!(result.stats.extension_rejected, 1);
        assert!(result.files.iter().all(|f| f.dir_key().is_some()));
    }

    #[test]
    fn test_size_limit_is_inclusive() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "exact.txt", 100);
        write(temp_dir.path(), "over.txt", 101);

        let config = config(100, &[".txt"], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path(), &Manifest::new());

        assert_eq!(names(&result), vec!["exact.txt"]);
        assert_eq!(result.stats.too_large, 1);
    }

    #[test]
    fn test_extension_match_is_case_sensitive() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "lower.txt", 1);
        write(temp_dir.path(), "upper.TXT", 1);

        let config = config(1000, &[".txt"], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path(), &Manifest::new());
        assert_eq!(names(&result), vec!["lower.txt"]);
    }

    #[test]
    fn test_empty_extension_set_selects_nothing() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", 1);

        let config = config(1000, &[], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path(), &Manifest::new());
        assert!(result.files.is_empty());
        assert_eq!(result.stats.considered, 0);
    }

    #[test]
    fn test_current_files_are_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "docs/a.txt", 1);
        write(temp_dir.path(), "docs/b.txt", 1);

        let config = config(1000, &[".txt"], &[]);
        let scanner = TreeScanner::new(&config);
        let mut first = scanner.scan(temp_dir.path(), &Manifest::new());
        assert_eq!(first.files.len(), 2);

        let manifest = merge(Manifest::new(), &mut first.files[..1]);
        let second = scanner.scan(temp_dir.path(), &manifest);

        assert_eq!(second.files.len(), 1);
        assert_eq!(second.stats.already_current, 1);
        assert_eq!(second.stats.considered, 2);
    }

    #[test]
    fn test_missing_root_is_not_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let config = config(1000, &[".txt"], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path().join("gone"), &Manifest::new());

        assert!(result.files.is_empty());
        assert_eq!(result.stats.errors, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_does_not_stop_walk() {
        use std::os::unix::fs::PermissionsExt;

        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "open/ok.txt", 1);
        write(temp_dir.path(), "locked/hidden.txt", 1);
        write(temp_dir.path(), "z.txt", 1);

        let locked = temp_dir.path().join("locked");
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
        if fs::read_dir(&locked).is_ok() {
            // Running as root: permissions are not enforced
            fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();
            return;
        }

        let config = config(1000, &[".txt"], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path(), &Manifest::new());
        fs::set_permissions(&locked, fs::Permissions::from_mode(0o755)).unwrap();

        assert_eq!(names(&result), vec!["ok.txt", "z.txt"]);
        assert!(result.stats.errors >= 1);
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_are_counted() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join(OsStr::from_bytes(b"bad\xff.txt")), "x").unwrap();
        write(temp_dir.path(), "good.txt", 1);

        let config = config(1000, &[".txt"], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path(), &Manifest::new());

        assert_eq!(result.files.len(), 2);
        assert_eq!(result.stats.lossy_names, 1);
    }

    #[cfg(unix)]
    #[test]
    fn test_symlink_cycle_does_not_loop() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "dir/a.txt", 1);
        std::os::unix::fs::symlink(temp_dir.path(), temp_dir.path().join("dir/loop")).unwrap();

        let config = config(1000, &[".txt"], &[]);
        let result = TreeScanner::new(&config).scan(temp_dir.path(), &Manifest::new());
        assert_eq!(names(&result), vec!["a.txt"]);
    }
}
