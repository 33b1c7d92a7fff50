//! In-memory build artifact consumed by exactly one commit: a target digest algorithm,
//! a logical-path → digest map, and a lookup from digest to a fresh byte stream.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::ocfl::checksum::{ChecksumJob, ChecksumPipeline};
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs_capability::CancellationToken;
use crate::ocfl::{InventoryPath, LogicalPath};

/// A lookup from digest to a reader that will yield exactly the bytes that hash to it.
/// Consumers must close the reader after use; a fresh reader is produced on every call.
pub trait ContentSource {
    fn open(&self, digest: &HexDigest) -> Result<Box<dyn Read>>;
}

/// A content source backed by files on the local filesystem, keyed by digest.
pub struct FileContentSource {
    paths: HashMap<HexDigest, PathBuf>,
}

impl FileContentSource {
    pub fn new() -> Self {
        Self {
            paths: HashMap::new(),
        }
    }

    pub fn insert(&mut self, digest: HexDigest, path: PathBuf) {
        self.paths.entry(digest).or_insert(path);
    }
}

impl Default for FileContentSource {
    fn default() -> Self {
        Self::new()
    }
}

impl ContentSource for FileContentSource {
    fn open(&self, digest: &HexDigest) -> Result<Box<dyn Read>> {
        match self.paths.get(digest) {
            Some(path) => Ok(Box::new(BufReader::new(File::open(path)?))),
            None => Err(OcflError::NotFound(format!(
                "no staged content for digest {}",
                digest
            ))),
        }
    }
}

/// The staged logical-path → digest map, plus the content needed to realize it.
pub struct Stage {
    pub digest_algorithm: DigestAlgorithm,
    /// Insertion order matters: the first logical path to introduce a digest names the
    /// physical content file when the stage is composed into a new inventory.
    pub entries: Vec<(LogicalPath, HexDigest)>,
    pub content: Box<dyn ContentSource>,
}

impl Stage {
    pub fn new(digest_algorithm: DigestAlgorithm, content: Box<dyn ContentSource>) -> Self {
        Self {
            digest_algorithm,
            entries: Vec::new(),
            content,
        }
    }

    pub fn add(&mut self, logical_path: LogicalPath, digest: HexDigest) {
        self.entries.push((logical_path, digest));
    }

    /// Scans `dir` recursively, hashing every regular file in parallel over the checksum
    /// pipeline, and stages each one under its path relative to `dir`.
    pub fn from_directory(
        dir: impl AsRef<Path>,
        digest_algorithm: DigestAlgorithm,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Result<Self> {
        let dir = dir.as_ref();
        let mut files = Vec::new();

        for entry in WalkDir::new(dir) {
            let entry = entry?;
            if entry.file_type().is_file() {
                let relative = entry
                    .path()
                    .strip_prefix(dir)
                    .unwrap()
                    .to_string_lossy()
                    .replace('\\', "/");
                files.push((relative, entry.path().to_path_buf()));
            }
        }

        type Opener = Box<dyn FnOnce() -> std::io::Result<Box<dyn Read>> + Send>;
        let pipeline: ChecksumPipeline<Opener> = ChecksumPipeline::new(worker_count, cancel);

        for (name, path) in &files {
            let path = path.clone();
            let opener: Opener =
                Box::new(move || Ok(Box::new(BufReader::new(File::open(path)?)) as Box<dyn Read>));
            pipeline.submit(ChecksumJob::new(name.clone(), opener, vec![digest_algorithm]))?;
        }

        let results = pipeline.shutdown();

        let mut digests_by_name = HashMap::new();
        for result in results {
            let digests = result.outcome?;
            let digest = digests.get(&digest_algorithm).cloned().ok_or_else(|| {
                OcflError::IllegalArgument(
                    "checksum pipeline did not compute the requested algorithm".to_string(),
                )
            })?;
            digests_by_name.insert(result.name, digest);
        }

        // Stable order: sort by relative path so the same directory always stages the
        // same way regardless of the order `WalkDir` happened to visit entries in.
        files.sort_by(|a, b| a.0.cmp(&b.0));

        let mut content = FileContentSource::new();
        let mut stage = Stage::new(digest_algorithm, Box::new(FileContentSource::new()));

        for (name, path) in files {
            let digest = digests_by_name.remove(&name).expect("digested above");
            content.insert(digest.clone(), path);
            stage.add(name.as_str().try_into()?, digest);
        }

        stage.content = Box::new(content);

        Ok(stage)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn scans_directory_and_hashes_every_file() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        fs::create_dir(dir.path().join("sub")).unwrap();
        fs::write(dir.path().join("sub/b.txt"), b"world").unwrap();

        let stage = Stage::from_directory(
            dir.path(),
            DigestAlgorithm::Sha256,
            2,
            CancellationToken::new(),
        )
        .unwrap();

        assert_eq!(2, stage.entries.len());
        let names: Vec<&str> = stage.entries.iter().map(|(p, _)| p.as_str()).collect();
        assert!(names.contains(&"a.txt"));
        assert!(names.contains(&"sub/b.txt"));

        for (_, digest) in &stage.entries {
            assert!(stage.content.open(digest).is_ok());
        }
    }
}
