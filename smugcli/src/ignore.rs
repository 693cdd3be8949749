use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};

use globset::{Glob, GlobSet, GlobSetBuilder};
use thiserror::Error;

use crate::config::atomic_write;

#[derive(Debug, Error)]
pub enum IgnoreError {
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),
    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] globset::Error),
}

/// Persisted set of absolute-path globs excluded from sync scans.
///
/// Patterns are kept sorted on disk and matched as a set, so the order in
/// which they were added never affects the result.
#[derive(Debug)]
pub struct IgnorePatternSet {
    path: PathBuf,
    patterns: BTreeSet<String>,
    matcher: GlobSet,
}

impl IgnorePatternSet {
    pub fn load(path: PathBuf) -> Result<Self, IgnoreError> {
        let patterns = match std::fs::read_to_string(&path) {
            Ok(text) => text
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_string)
                .collect(),
            Err(err) if err.kind() == io::ErrorKind::NotFound => BTreeSet::new(),
            Err(err) => return Err(err.into()),
        };
        let matcher = build_matcher(&patterns)?;
        Ok(Self {
            path,
            patterns,
            matcher,
        })
    }

    pub fn empty(path: PathBuf) -> Self {
        Self {
            path,
            patterns: BTreeSet::new(),
            matcher: GlobSet::empty(),
        }
    }

    /// Adds a pattern; returns false if it was already present.
    pub fn add(&mut self, pattern: &str) -> Result<bool, IgnoreError> {
        // Validate before mutating so a bad glob never lands on disk.
        Glob::new(pattern)?;
        if !self.patterns.insert(pattern.to_string()) {
            return Ok(false);
        }
        self.matcher = build_matcher(&self.patterns)?;
        self.persist()?;
        Ok(true)
    }

    /// Removes a pattern; idempotent.
    pub fn remove(&mut self, pattern: &str) -> Result<bool, IgnoreError> {
        if !self.patterns.remove(pattern) {
            return Ok(false);
        }
        self.matcher = build_matcher(&self.patterns)?;
        self.persist()?;
        Ok(true)
    }

    pub fn matches(&self, path: &Path) -> bool {
        self.matcher.is_match(path)
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    fn persist(&self) -> io::Result<()> {
        let mut text = self
            .patterns
            .iter()
            .cloned()
            .collect::<Vec<_>>()
            .join("\n");
        if !text.is_empty() {
            text.push('\n');
        }
        atomic_write(&self.path, text.as_bytes())
    }
}

fn build_matcher(patterns: &BTreeSet<String>) -> Result<GlobSet, globset::Error> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    builder.build()
}

/// Expands a user-supplied path to the absolute form patterns are stored
/// in. Globs may not exist on disk, so this never canonicalizes.
pub fn normalize_pattern(pattern: &str) -> io::Result<String> {
    let path = Path::new(pattern);
    if path.is_absolute() {
        return Ok(pattern.to_string());
    }
    let joined = std::env::current_dir()?.join(path);
    Ok(joined.to_string_lossy().into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn add_matches_and_round_trips() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ignore");
        let mut set = IgnorePatternSet::load(path.clone()).unwrap();
        assert!(set.is_empty());

        assert!(set.add("/photos/*.tmp").unwrap());
        assert!(!set.add("/photos/*.tmp").unwrap());
        assert!(set.matches(Path::new("/photos/a.tmp")));
        assert!(!set.matches(Path::new("/photos/a.jpg")));

        let reloaded = IgnorePatternSet::load(path).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert!(reloaded.matches(Path::new("/photos/b.tmp")));
    }

    #[test]
    fn ignore_then_include_is_a_no_op_on_disk() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ignore");
        let mut set = IgnorePatternSet::load(path.clone()).unwrap();
        set.add("/a/keep").unwrap();
        let before = std::fs::read_to_string(&path).unwrap();

        set.add("/b/transient").unwrap();
        assert!(set.remove("/b/transient").unwrap());
        assert!(!set.remove("/b/transient").unwrap());

        let after = std::fs::read_to_string(&path).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn match_results_are_insertion_order_independent() {
        let dir = tempdir().unwrap();
        let mut forward = IgnorePatternSet::load(dir.path().join("a")).unwrap();
        forward.add("/x/*.raw").unwrap();
        forward.add("/x/cache/**").unwrap();

        let mut reverse = IgnorePatternSet::load(dir.path().join("b")).unwrap();
        reverse.add("/x/cache/**").unwrap();
        reverse.add("/x/*.raw").unwrap();

        for candidate in ["/x/a.raw", "/x/cache/deep/b.jpg", "/x/b.jpg"] {
            assert_eq!(
                forward.matches(Path::new(candidate)),
                reverse.matches(Path::new(candidate)),
                "diverged on {candidate}"
            );
        }
        assert_eq!(
            std::fs::read_to_string(dir.path().join("a")).unwrap(),
            std::fs::read_to_string(dir.path().join("b")).unwrap()
        );
    }

    #[test]
    fn character_classes_and_single_wildcards_match() {
        let dir = tempdir().unwrap();
        let mut set = IgnorePatternSet::load(dir.path().join("ignore")).unwrap();
        set.add("/shots/IMG_000[0-5].jpg").unwrap();
        set.add("/shots/video?.mov").unwrap();

        assert!(set.matches(Path::new("/shots/IMG_0003.jpg")));
        assert!(!set.matches(Path::new("/shots/IMG_0007.jpg")));
        assert!(set.matches(Path::new("/shots/video1.mov")));
        assert!(!set.matches(Path::new("/shots/video12.mov")));
    }

    #[test]
    fn invalid_pattern_is_rejected_without_persisting() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("ignore");
        let mut set = IgnorePatternSet::load(path.clone()).unwrap();
        assert!(set.add("/photos/[unclosed").is_err());
        assert!(set.is_empty());
        assert!(!path.exists());
    }
}
