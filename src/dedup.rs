//! Decides whether a scanned file needs to be archived.

use crate::config::Config;
use crate::manifest::Manifest;
use crate::types::FileDescriptor;
use serde::Serialize;
use tracing::debug;

/// Outcome of the dedup decision for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Decision {
    /// Directory never archived before
    NewDirectory,
    /// Known directory, file not archived before
    NewFile,
    /// Archived before with an older modification time
    Modified,
    /// No configured keyword occurs in the path
    KeywordMismatch,
    /// Archived copy is up to date
    Current,
}

impl Decision {
    pub fn is_accepted(self) -> bool {
        matches!(self, Self::NewDirectory | Self::NewFile | Self::Modified)
    }
}

/// Keyword filter plus manifest lookup. Never does I/O and never mutates the
/// manifest.
#[derive(Debug, Clone, Copy)]
pub struct DedupEngine<'a> {
    keywords: &'a [String],
}

impl<'a> DedupEngine<'a> {
    pub fn new(config: &'a Config) -> Self {
        Self {
            keywords: &config.keywords,
        }
    }

    pub fn with_keywords(keywords: &'a [String]) -> Self {
        Self { keywords }
    }

    /// Whether the full path contains at least one keyword; always true
    /// without keywords
    pub fn matches_keywords(&self, descriptor: &FileDescriptor) -> bool {
        if self.keywords.is_empty() {
            return true;
        }

        let path = descriptor.path_str();
        self.keywords
            .iter()
            .any(|keyword| path.contains(keyword.as_str()))
    }

    /// Classify a descriptor against the manifest, deriving its anonymized
    /// keys when the keyword filter passes
    pub fn decide(&self, descriptor: &mut FileDescriptor, manifest: &Manifest) -> Decision {
        if !self.matches_keywords(descriptor) {
            return Decision::KeywordMismatch;
        }

        let (dir_key, file_key) = descriptor.keys();

        let decision = match manifest.directory(&dir_key) {
            None => Decision::NewDirectory,
            Some(directory) => match directory.files.get(&file_key) {
                None => Decision::NewFile,
                Some(entry) if descriptor.modified_time > entry.modified_time => Decision::Modified,
                Some(_) => Decision::Current,
            },
        };

        debug!("{:?}: {}", decision, descriptor.path.display());
        decision
    }

    pub fn should_include(&self, descriptor: &mut FileDescriptor, manifest: &Manifest) -> bool {
        self.decide(descriptor, manifest).is_accepted()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::merge;
    use std::path::Path;

    fn descriptor(path: &str, modified_time: i64) -> FileDescriptor {
        FileDescriptor::new(Path::new(path), 100, modified_time)
    }

    fn manifest_with(path: &str, modified_time: i64) -> Manifest {
        merge(Manifest::new(), &mut [descriptor(path, modified_time)])
    }

    #[test]
    fn test_keyword_filter() {
        let keywords = vec!["report".to_string(), "budget".to_string()];
        let engine = DedupEngine::with_keywords(&keywords);
        let manifest = Manifest::new();

        let mut hit = descriptor("/vol/q3/report.txt", 1);
        let mut dir_hit = descriptor("/vol/budget/notes.txt", 1);
        let mut miss = descriptor("/vol/q3/memo.txt", 1);

        assert!(engine.should_include(&mut hit, &manifest));
        assert!(engine.should_include(&mut dir_hit, &manifest));
        assert_eq!(engine.decide(&mut miss, &manifest), Decision::KeywordMismatch);
        assert!(miss.dir_key().is_none());
    }

    #[test]
    fn test_keywords_are_case_sensitive() {
        let keywords = vec!["Report".to_string()];
        let engine = DedupEngine::with_keywords(&keywords);
        let mut lower = descriptor("/vol/report.txt", 1);
        assert!(!engine.should_include(&mut lower, &Manifest::new()));
    }

    #[test]
    fn test_no_keywords_accepts_everything() {
        let engine = DedupEngine::with_keywords(&[]);
        let mut file = descriptor("/vol/anything.bin", 1);
        assert_eq!(engine.decide(&mut file, &Manifest::new()), Decision::NewDirectory);
        assert!(file.dir_key().is_some());
        assert!(file.file_key().is_some());
    }

    #[test]
    fn test_new_file_in_known_directory() {
        let engine = DedupEngine::with_keywords(&[]);
        let manifest = manifest_with("/vol/docs/a.txt", 100);
        let mut other = descriptor("/vol/docs/b.txt", 1);
        assert_eq!(engine.decide(&mut other, &manifest), Decision::NewFile);
    }

    #[test]
    fn test_staleness_is_strict() {
        let engine = DedupEngine::with_keywords(&[]);
        let manifest = manifest_with("/vol/docs/a.txt", 100);

        let mut older = descriptor("/vol/docs/a.txt", 99);
        let mut same = descriptor("/vol/docs/a.txt", 100);
        let mut newer = descriptor("/vol/docs/a.txt", 101);

        assert_eq!(engine.decide(&mut older, &manifest), Decision::Current);
        assert_eq!(engine.decide(&mut same, &manifest), Decision::Current);
        assert_eq!(engine.decide(&mut newer, &manifest), Decision::Modified);
    }

    #[test]
    fn test_decision_leaves_manifest_untouched() {
        let engine = DedupEngine::with_keywords(&[]);
        let manifest = manifest_with("/vol/docs/a.txt", 100);
        let before = manifest.clone();

        let mut file = descriptor("/vol/new/z.txt", 5);
        engine.decide(&mut file, &manifest);
        assert_eq!(manifest, before);
    }
}
