//! Uniform read/list/write/remove surface over heterogeneous storage backends.

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::SystemTime;

use log::debug;

use crate::ocfl::error::{OcflError, Result};

/// A cooperative cancellation flag threaded through every filesystem capability call.
/// Cloning shares the same underlying flag; firing it from any clone cancels all of them.
#[derive(Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Returns `Err(OcflError::Cancelled)` tagged with `path` if this token has fired.
    pub fn check(&self, path: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(OcflError::Cancelled(path.to_string()));
        }
        Ok(())
    }
}

/// Stat information returned alongside an opened file's byte stream.
#[derive(Debug, Clone)]
pub struct FileStat {
    pub size: u64,
    pub modified: Option<SystemTime>,
}

/// A single entry returned by `DirEntries`.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// The four-method surface the rest of the engine speaks to. `/` must always be used as
/// the path separator, regardless of backend.
pub trait FsCapability {
    /// Opens `path` for reading, returning the byte stream plus its size and last-modified
    /// time. Fails with `OcflError::NotFound` if the path does not exist.
    fn open_file(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(Box<dyn Read>, FileStat)>;

    /// Lists the immediate children of `path`. Order is unspecified. An absent or empty
    /// directory yields an empty vector, not an error.
    fn dir_entries(&self, path: &str, cancel: &CancellationToken) -> Result<Vec<DirEntry>>;

    /// Writes the bytes read from `reader` to `path`, creating parent directories as
    /// needed. From the caller's perspective the write is atomic.
    fn write(&self, path: &str, reader: &mut dyn Read, cancel: &CancellationToken)
        -> Result<u64>;

    /// Removes a single file.
    fn remove(&self, path: &str, cancel: &CancellationToken) -> Result<()>;

    /// Removes everything under `prefix`, including `prefix` itself. The root directory
    /// (`.` or empty) must never be removable.
    fn remove_all(&self, prefix: &str, cancel: &CancellationToken) -> Result<()>;
}

/// Rejects absolute paths, `..` segments, and empty segments before any I/O happens.
pub fn validate_path(path: &str) -> Result<()> {
    if path.starts_with('/') {
        return Err(OcflError::InvalidPath {
            path: path.to_string(),
            message: "path must not be absolute".to_string(),
        });
    }

    for part in path.split('/') {
        if part == ".." {
            return Err(OcflError::InvalidPath {
                path: path.to_string(),
                message: "path must not contain '..'".to_string(),
            });
        }
        if part.is_empty() && path != "." && !path.is_empty() {
            return Err(OcflError::InvalidPath {
                path: path.to_string(),
                message: "path must not contain empty segments".to_string(),
            });
        }
    }

    Ok(())
}

fn is_root(prefix: &str) -> bool {
    prefix.is_empty() || prefix == "."
}

/// Local filesystem backend, rooted at an absolute directory.
pub struct LocalFs {
    root: PathBuf,
}

impl LocalFs {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> Result<PathBuf> {
        validate_path(path)?;
        Ok(if is_root(path) {
            self.root.clone()
        } else {
            self.root.join(path)
        })
    }
}

impl FsCapability for LocalFs {
    fn open_file(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(Box<dyn Read>, FileStat)> {
        cancel.check(path)?;
        let full = self.resolve(path)?;

        let file = File::open(&full).map_err(|e| map_io_not_found(path, e))?;
        let meta = file.metadata()?;

        let stat = FileStat {
            size: meta.len(),
            modified: meta.modified().ok(),
        };

        Ok((Box::new(file), stat))
    }

    fn dir_entries(&self, path: &str, cancel: &CancellationToken) -> Result<Vec<DirEntry>> {
        cancel.check(path)?;
        let full = self.resolve(path)?;

        if !full.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&full)? {
            cancel.check(path)?;
            let entry = entry?;
            let name = entry.file_name().to_string_lossy().to_string();
            let is_dir = entry.file_type()?.is_dir();
            entries.push(DirEntry { name, is_dir });
        }

        Ok(entries)
    }

    fn write(
        &self,
        path: &str,
        reader: &mut dyn Read,
        cancel: &CancellationToken,
    ) -> Result<u64> {
        cancel.check(path)?;
        let full = self.resolve(path)?;

        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent)?;
            set_dir_mode(parent)?;
        }

        // Write to a temp file in the same directory, then rename, so that readers never
        // observe a partially written file.
        let tmp_path = full.with_extension(format!(
            "tmp-{}",
            std::process::id()
        ));

        {
            let mut tmp_file = OpenOptions::new()
                .create(true)
                .truncate(true)
                .write(true)
                .open(&tmp_path)?;

            set_file_mode(&tmp_file)?;

            let mut buf = [0u8; 64 * 1024];
            let mut written = 0u64;
            loop {
                cancel.check(path)?;
                let n = reader.read(&mut buf)?;
                if n == 0 {
                    break;
                }
                tmp_file.write_all(&buf[..n])?;
                written += n as u64;
            }
            tmp_file.flush()?;

            fs::rename(&tmp_path, &full)?;
            return Ok(written);
        }
    }

    fn remove(&self, path: &str, cancel: &CancellationToken) -> Result<()> {
        cancel.check(path)?;
        let full = self.resolve(path)?;
        if full.exists() {
            fs::remove_file(&full)?;
        }
        Ok(())
    }

    fn remove_all(&self, prefix: &str, cancel: &CancellationToken) -> Result<()> {
        cancel.check(prefix)?;

        if is_root(prefix) {
            return Err(OcflError::IllegalArgument(
                "the root directory may never be removed".to_string(),
            ));
        }

        let full = self.resolve(prefix)?;
        if full.exists() {
            if full.is_dir() {
                fs::remove_dir_all(&full)?;
            } else {
                fs::remove_file(&full)?;
            }
        }
        Ok(())
    }
}

#[cfg(unix)]
fn set_file_mode(file: &File) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    file.set_permissions(fs::Permissions::from_mode(0o644))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_file_mode(_file: &File) -> Result<()> {
    Ok(())
}

#[cfg(unix)]
fn set_dir_mode(dir: &Path) -> Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(dir, fs::Permissions::from_mode(0o755))?;
    Ok(())
}

#[cfg(not(unix))]
fn set_dir_mode(_dir: &Path) -> Result<()> {
    Ok(())
}

fn map_io_not_found(path: &str, e: io::Error) -> OcflError {
    if e.kind() == io::ErrorKind::NotFound {
        OcflError::NotFound(path.to_string())
    } else {
        OcflError::Io(e)
    }
}

/// Read-only HTTP backend. Demonstrates that the engine's core logic is not tied to the
/// local filesystem; write/remove always fail with `unsupported`.
pub struct HttpFs {
    base_url: String,
    client: reqwest::blocking::Client,
}

impl HttpFs {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            client: reqwest::blocking::Client::new(),
        }
    }

    fn url_for(&self, path: &str) -> Result<String> {
        validate_path(path)?;
        let base = self.base_url.trim_end_matches('/');
        if is_root(path) {
            Ok(base.to_string())
        } else {
            Ok(format!("{}/{}", base, path))
        }
    }
}

impl FsCapability for HttpFs {
    fn open_file(
        &self,
        path: &str,
        cancel: &CancellationToken,
    ) -> Result<(Box<dyn Read>, FileStat)> {
        cancel.check(path)?;
        let url = self.url_for(path)?;

        debug!("HEAD {}", url);
        let head = self
            .client
            .head(&url)
            .send()
            .map_err(|e| OcflError::Wrapped(Box::new(e)))?;

        if head.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(OcflError::NotFound(path.to_string()));
        }
        if !head.status().is_success() {
            return Err(OcflError::Wrapped(Box::new(io::Error::new(io::ErrorKind::Other, format!(
                "HEAD {} returned {}",
                url,
                head.status()
            )))));
        }

        let size = head
            .content_length()
            .or_else(|| {
                head.headers()
                    .get(reqwest::header::CONTENT_LENGTH)
                    .and_then(|v| v.to_str().ok())
                    .and_then(|v| v.parse().ok())
            })
            .unwrap_or(0);

        cancel.check(path)?;
        let resp = self
            .client
            .get(&url)
            .send()
            .map_err(|e| OcflError::Wrapped(Box::new(e)))?;

        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(OcflError::NotFound(path.to_string()));
        }
        if !resp.status().is_success() {
            return Err(OcflError::Wrapped(Box::new(io::Error::new(io::ErrorKind::Other, format!(
                "GET {} returned {}",
                url,
                resp.status()
            )))));
        }

        let stat = FileStat {
            size,
            modified: None,
        };

        Ok((Box::new(resp), stat))
    }

    fn dir_entries(&self, _path: &str, _cancel: &CancellationToken) -> Result<Vec<DirEntry>> {
        Err(OcflError::Unsupported(
            "directory listing is not supported over the HTTP backend".to_string(),
        ))
    }

    fn write(
        &self,
        _path: &str,
        _reader: &mut dyn Read,
        _cancel: &CancellationToken,
    ) -> Result<u64> {
        Err(OcflError::Unsupported(
            "writes are not supported over the HTTP backend".to_string(),
        ))
    }

    fn remove(&self, _path: &str, _cancel: &CancellationToken) -> Result<()> {
        Err(OcflError::Unsupported(
            "removal is not supported over the HTTP backend".to_string(),
        ))
    }

    fn remove_all(&self, _prefix: &str, _cancel: &CancellationToken) -> Result<()> {
        Err(OcflError::Unsupported(
            "removal is not supported over the HTTP backend".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use std::io::Read as _;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn write_then_read_round_trips_bytes() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let cancel = CancellationToken::new();

        let written = fs
            .write("a/b/file.txt", &mut "hello".as_bytes(), &cancel)
            .unwrap();
        assert_eq!(5, written);

        let (mut reader, stat) = fs.open_file("a/b/file.txt", &cancel).unwrap();
        assert_eq!(5, stat.size);

        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!("hello", buf);
    }

    #[test]
    fn open_missing_file_is_not_found() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let cancel = CancellationToken::new();

        let err = fs.open_file("missing.txt", &cancel).unwrap_err();
        assert!(matches!(err, OcflError::NotFound(_)));
    }

    #[test]
    fn dir_entries_on_missing_directory_is_empty() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let cancel = CancellationToken::new();

        assert!(fs.dir_entries("nope", &cancel).unwrap().is_empty());
    }

    #[test]
    fn root_directory_cannot_be_removed() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let cancel = CancellationToken::new();

        assert!(fs.remove_all(".", &cancel).is_err());
        assert!(fs.remove_all("", &cancel).is_err());
    }

    #[test]
    fn rejects_path_traversal() {
        assert!(validate_path("../escape").is_err());
        assert!(validate_path("/absolute").is_err());
        assert!(validate_path("a//b").is_err());
    }

    #[test]
    fn cancelled_token_blocks_further_io() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = fs.open_file("a.txt", &cancel).unwrap_err();
        assert!(matches!(err, OcflError::Cancelled(_)));
    }
}
