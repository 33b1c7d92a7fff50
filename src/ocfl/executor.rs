//! Executes a single `Activity` against a filesystem capability, deciding idempotently
//! whether the target already reflects the bytes the activity would write.

use std::io::Read;

use crate::ocfl::consts::{SKIP_ALREADY_EXISTS_IDENTICAL, SKIP_CONTENT_VERIFIED};
use crate::ocfl::digest::DigestAlgorithm;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs_capability::{CancellationToken, FsCapability};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::plan::{Activity, InventoryLocation};
use crate::ocfl::stage::ContentSource;
use crate::ocfl::InventoryPath;

/// The outcome of executing one activity.
pub struct ExecuteResult {
    pub bytes_written: u64,
    pub skipped: bool,
    pub skip_reason: Option<&'static str>,
}

impl ExecuteResult {
    fn written(bytes_written: u64) -> Self {
        Self {
            bytes_written,
            skipped: false,
            skip_reason: None,
        }
    }

    fn skipped(reason: &'static str) -> Self {
        Self {
            bytes_written: 0,
            skipped: true,
            skip_reason: Some(reason),
        }
    }
}

/// Executes `activity` against `object_dir` (the object root, relative to `fs`'s root),
/// using `new_inventory` to resolve what the version-scoped / root-scoped inventory
/// writes should contain, and `content_source` to resolve `CopyContent` bytes.
pub fn execute<F: FsCapability>(
    activity: &Activity,
    fs: &F,
    object_dir: &str,
    new_inventory: &Inventory,
    content_source: &dyn ContentSource,
    cancel: &CancellationToken,
) -> Result<ExecuteResult> {
    match activity {
        Activity::WriteNamaste { filename, content, .. } => {
            let path = join(object_dir, filename);
            write_if_absent_or_identical(fs, &path, content.as_bytes(), cancel)
        }

        Activity::CreateVersionDir { version, .. } => {
            let path = join(object_dir, &version.to_string());
            let entries = fs.dir_entries(&path, cancel)?;

            // `write` below creates parent directories as needed, so nothing but the
            // content directory needs to be explicitly materialized here. What matters
            // beyond that is recognizing whether any content already sitting under this
            // version dir belongs to this plan (content/, inventory.json, its sidecar)
            // or is foreign.
            let content_dir_name = new_inventory.defaulted_content_dir();
            let foreign = entries.iter().any(|entry| {
                entry.name != content_dir_name
                    && entry.name != "inventory.json"
                    && !entry.name.starts_with("inventory.json.")
            });

            if foreign {
                return Err(OcflError::Conflict {
                    path,
                    message: "version directory already contains unrecognized content"
                        .to_string(),
                });
            }

            if !entries.iter().any(|entry| entry.name == content_dir_name) {
                // The capability surface has no standalone "create directory" primitive
                // (`write` creates parents as needed instead), so the content directory
                // is materialized by writing and immediately removing a placeholder file
                // under it -- `remove` only unlinks the file, leaving the now-empty
                // directory behind.
                let placeholder = join(&join(&path, content_dir_name), ".ocfl-placeholder");
                fs.write(&placeholder, &mut &[][..], cancel)?;
                fs.remove(&placeholder, cancel)?;
            }

            Ok(ExecuteResult::skipped(SKIP_ALREADY_EXISTS_IDENTICAL))
        }

        Activity::CopyContent {
            source_digest,
            dest_content_path,
            ..
        } => {
            let path = join(object_dir, dest_content_path.as_str());

            if let Ok((mut existing, _)) = fs.open_file(&path, cancel) {
                let algorithm = new_inventory.digest_algorithm;
                let existing_digest = algorithm.hash_hex(&mut existing)?;
                if &existing_digest == source_digest {
                    return Ok(ExecuteResult::skipped(SKIP_CONTENT_VERIFIED));
                }
                return Err(OcflError::Conflict {
                    path,
                    message: "destination content path already exists with different content"
                        .to_string(),
                });
            }

            let mut source = content_source.open(source_digest)?;
            let mut tee = DigestTee::new(&mut source, new_inventory.digest_algorithm);
            let written = fs.write(&path, &mut tee, cancel)?;
            let computed = tee.finalize();

            if &computed != source_digest {
                let _ = fs.remove(&path, cancel);
                return Err(OcflError::DigestMismatch {
                    path,
                    expected: source_digest.to_string(),
                    actual: computed.to_string(),
                });
            }

            Ok(ExecuteResult::written(written))
        }

        Activity::WriteInventory { location, .. } => {
            let path = inventory_path(object_dir, new_inventory, *location);
            let bytes = new_inventory.to_canonical_json()?;
            write_if_absent_or_identical(fs, &path, &bytes, cancel)
        }

        Activity::WriteSidecar {
            location,
            digest_algorithm,
            ..
        } => {
            let path = sidecar_path(object_dir, new_inventory, *location, *digest_algorithm);
            let inventory_bytes = new_inventory.to_canonical_json()?;
            let digest = digest_algorithm.hash_hex(&mut inventory_bytes.as_slice())?;
            let sidecar = format!("{}  inventory.json\n", digest);
            write_if_absent_or_identical(fs, &path, sidecar.as_bytes(), cancel)
        }
    }
}

fn write_if_absent_or_identical<F: FsCapability>(
    fs: &F,
    path: &str,
    content: &[u8],
    cancel: &CancellationToken,
) -> Result<ExecuteResult> {
    if let Ok((mut existing, _)) = fs.open_file(path, cancel) {
        let mut buf = Vec::new();
        existing.read_to_end(&mut buf)?;
        if buf == content {
            return Ok(ExecuteResult::skipped(SKIP_ALREADY_EXISTS_IDENTICAL));
        }
        return Err(OcflError::Conflict {
            path: path.to_string(),
            message: "target already exists with different content".to_string(),
        });
    }

    let written = fs.write(path, &mut &content[..], cancel)?;
    Ok(ExecuteResult::written(written))
}

fn inventory_path(object_dir: &str, inventory: &Inventory, location: InventoryLocation) -> String {
    match location {
        InventoryLocation::VersionScoped => {
            join(&join(object_dir, &inventory.head.to_string()), "inventory.json")
        }
        InventoryLocation::RootScoped => join(object_dir, "inventory.json"),
    }
}

fn sidecar_path(
    object_dir: &str,
    inventory: &Inventory,
    location: InventoryLocation,
    algorithm: DigestAlgorithm,
) -> String {
    format!("{}.{}", inventory_path(object_dir, inventory, location), algorithm)
}

fn join(a: &str, b: &str) -> String {
    if a.is_empty() || a == "." {
        b.to_string()
    } else {
        format!("{}/{}", a, b)
    }
}

/// Streams bytes through to an inner `Write`r-compatible reader while accumulating a
/// digest, so `CopyContent` can verify as it copies rather than re-reading afterward.
struct DigestTee<'a> {
    inner: &'a mut dyn Read,
    writer: crate::ocfl::digest::DigestWriter<std::io::Sink>,
}

impl<'a> DigestTee<'a> {
    fn new(inner: &'a mut dyn Read, algorithm: DigestAlgorithm) -> Self {
        Self {
            inner,
            writer: algorithm.writer(std::io::sink()),
        }
    }

    fn finalize(self) -> crate::ocfl::digest::HexDigest {
        self.writer.finalize_hex()
    }
}

impl<'a> Read for DigestTee<'a> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            std::io::Write::write_all(&mut self.writer, &buf[..n])?;
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::ocfl::fs_capability::LocalFs;
    use crate::ocfl::plan::build_plan;
    use crate::ocfl::stage::FileContentSource;
    use crate::ocfl::CommitMeta;

    #[test]
    fn executes_full_first_version_plan() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let cancel = CancellationToken::new();

        let content_dir = tempdir().unwrap();
        std::fs::write(content_dir.path().join("readme.txt"), b"hello").unwrap();
        let real_digest = DigestAlgorithm::Sha256
            .hash_hex(&mut "hello".as_bytes())
            .unwrap();

        let staged = vec![("readme.txt".try_into().unwrap(), real_digest.clone())];
        let inventory = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        let mut content = FileContentSource::new();
        content.insert(real_digest, content_dir.path().join("readme.txt"));

        let plan = build_plan(&inventory, None, true).unwrap();

        for activity in &plan.activities {
            let result =
                execute(activity, &fs, "obj", &inventory, &content, &cancel).unwrap();
            assert!(!result.skipped || result.skip_reason.is_some());
        }

        assert!(dir
            .path()
            .join("obj/v1/inventory.json")
            .exists());
        assert!(dir.path().join("obj/inventory.json").exists());
        assert!(dir.path().join("obj/v1/content/readme.txt").exists());
    }

    #[test]
    fn copy_content_is_idempotent_on_identical_retry() {
        let dir = tempdir().unwrap();
        let fs = LocalFs::new(dir.path());
        let cancel = CancellationToken::new();

        let content_dir = tempdir().unwrap();
        std::fs::write(content_dir.path().join("readme.txt"), b"hello").unwrap();
        let real_digest = DigestAlgorithm::Sha256
            .hash_hex(&mut "hello".as_bytes())
            .unwrap();

        let staged = vec![("readme.txt".try_into().unwrap(), real_digest.clone())];
        let inventory = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        let mut content = FileContentSource::new();
        content.insert(real_digest, content_dir.path().join("readme.txt"));

        let copy_activity = build_plan(&inventory, None, true)
            .unwrap()
            .activities
            .into_iter()
            .find(|a| matches!(a, Activity::CopyContent { .. }))
            .unwrap();

        let first = execute(&copy_activity, &fs, "obj", &inventory, &content, &cancel).unwrap();
        assert!(!first.skipped);

        let second = execute(&copy_activity, &fs, "obj", &inventory, &content, &cancel).unwrap();
        assert!(second.skipped);
        assert_eq!(Some(SKIP_CONTENT_VERIFIED), second.skip_reason);
    }
}
