//! Replay-verifies an object's on-disk state against its own inventories, one version at a
//! time from v1 to head, without mutating anything.
//!
//! Unlike `checksum.rs`'s pipeline (which defers opening to a worker thread so its opener
//! closures can be `'static`), this walks `&F` borrowed from the caller, so content digests
//! are fanned out over `std::thread::scope` instead -- real concurrency without requiring
//! the capability to be owned or cloned.

use std::convert::TryFrom;
use std::io::Read;

use crate::ocfl::digest::HexDigest;
use crate::ocfl::error::Result;
use crate::ocfl::fs_capability::{CancellationToken, FsCapability};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::{ContentPath, InventoryPath, VersionNum};

/// A single validation defect: a stable short code plus a human-readable message. Codes
/// are namespaced `E-` for errors and `W-` for warnings.
#[derive(Debug, Clone)]
pub struct Defect {
    pub code: &'static str,
    pub message: String,
}

impl Defect {
    fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// The tally returned by a validation run.
#[derive(Debug, Default)]
pub struct ValidationResult {
    pub object_id: String,
    pub errors: Vec<Defect>,
    pub warnings: Vec<Defect>,
}

impl ValidationResult {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Runs the full replay: inventory consistency across versions, sidecar digests, manifest
/// coverage of version states, content digests, and orphaned files.
pub fn validate_object<F: FsCapability + Sync>(
    fs: &F,
    object_dir: &str,
    object_id: &str,
    worker_count: usize,
    cancel: &CancellationToken,
) -> Result<ValidationResult> {
    let mut result = ValidationResult {
        object_id: object_id.to_string(),
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    let root_inv_path = join(object_dir, "inventory.json");
    let root_bytes = match read_bytes(fs, &root_inv_path, cancel) {
        Ok(bytes) => bytes,
        Err(e) => {
            result.errors.push(Defect::new(
                "E-INVENTORY-MISSING",
                format!("failed to read {}: {}", root_inv_path, e),
            ));
            return Ok(result);
        }
    };

    let root_inventory: Inventory = match serde_json::from_slice(&root_bytes) {
        Ok(inv) => inv,
        Err(e) => {
            result
                .errors
                .push(Defect::new("E-INVENTORY-PARSE", format!("{}: {}", root_inv_path, e)));
            return Ok(result);
        }
    };

    check_sidecar(
        fs,
        &root_inv_path,
        &root_bytes,
        root_inventory.digest_algorithm,
        &mut result,
        cancel,
    );

    check_version_inventories(fs, object_dir, &root_inventory, &root_bytes, &mut result, cancel);

    check_state_manifest_coverage(&root_inventory, &mut result);

    verify_content_digests(fs, object_dir, &root_inventory, worker_count, &mut result, cancel);

    check_for_orphans(fs, object_dir, &root_inventory, &mut result, cancel)?;

    Ok(result)
}

fn check_version_inventories<F: FsCapability>(
    fs: &F,
    object_dir: &str,
    root_inventory: &Inventory,
    root_bytes: &[u8],
    result: &mut ValidationResult,
    cancel: &CancellationToken,
) {
    let head = root_inventory.head;
    let mut number = 1u32;

    loop {
        let version_num = VersionNum::with_width(number, head.width);
        if version_num.number > head.number {
            break;
        }

        let version_dir = join(object_dir, &version_num.to_string());
        let version_inv_path = join(&version_dir, "inventory.json");

        match read_bytes(fs, &version_inv_path, cancel) {
            Ok(bytes) => match serde_json::from_slice::<Inventory>(&bytes) {
                Ok(version_inventory) => {
                    if version_inventory.head != version_num {
                        result.errors.push(Defect::new(
                            "E-VERSION-HEAD-MISMATCH",
                            format!(
                                "{} declares head {} but lives under {}",
                                version_inv_path, version_inventory.head, version_num
                            ),
                        ));
                    }

                    if version_num == head && bytes != root_bytes {
                        result.errors.push(Defect::new(
                            "E-HEAD-INVENTORY-MISMATCH",
                            format!("{} is not byte-identical to the root inventory", version_inv_path),
                        ));
                    }

                    check_sidecar(
                        fs,
                        &version_inv_path,
                        &bytes,
                        version_inventory.digest_algorithm,
                        result,
                        cancel,
                    );
                }
                Err(e) => result
                    .errors
                    .push(Defect::new("E-INVENTORY-PARSE", format!("{}: {}", version_inv_path, e))),
            },
            Err(e) => result
                .errors
                .push(Defect::new("E-INVENTORY-MISSING", format!("{}: {}", version_inv_path, e))),
        }

        number += 1;
    }
}

fn check_sidecar<F: FsCapability>(
    fs: &F,
    inv_path: &str,
    inv_bytes: &[u8],
    algorithm: crate::ocfl::digest::DigestAlgorithm,
    result: &mut ValidationResult,
    cancel: &CancellationToken,
) {
    let sidecar_path = format!("{}.{}", inv_path, algorithm);
    let expected_digest = match algorithm.hash_hex(&mut &inv_bytes[..]) {
        Ok(d) => d,
        Err(_) => return,
    };

    match read_bytes(fs, &sidecar_path, cancel) {
        Ok(bytes) => {
            let text = String::from_utf8_lossy(&bytes);
            let recorded = text.split_whitespace().next().unwrap_or("");
            if recorded != expected_digest.to_string() {
                result.errors.push(Defect::new(
                    "E-SIDECAR-MISMATCH",
                    format!(
                        "{} records {} but {} hashes to {}",
                        sidecar_path, recorded, inv_path, expected_digest
                    ),
                ));
            }
        }
        Err(e) => result
            .errors
            .push(Defect::new("E-SIDECAR-MISSING", format!("{}: {}", sidecar_path, e))),
    }
}

fn check_state_manifest_coverage(inventory: &Inventory, result: &mut ValidationResult) {
    for (_, version) in &inventory.versions {
        for (_, digest) in version.state.iter() {
            if !inventory.manifest.contains_id(digest.as_ref()) {
                result.errors.push(Defect::new(
                    "E-STATE-DIGEST-MISSING",
                    format!("digest {} is referenced in a version state but absent from the manifest", digest),
                ));
            }
        }
    }
}

fn verify_content_digests<F: FsCapability + Sync>(
    fs: &F,
    object_dir: &str,
    inventory: &Inventory,
    worker_count: usize,
    result: &mut ValidationResult,
    cancel: &CancellationToken,
) {
    let mut jobs: Vec<(HexDigest, ContentPath)> = Vec::new();
    for (digest, paths) in inventory.manifest.iter_id_paths() {
        for path in paths {
            jobs.push(((**digest).clone(), (**path).clone()));
        }
    }

    if jobs.is_empty() {
        return;
    }

    let worker_count = worker_count.max(1).min(jobs.len());
    let chunk_size = (jobs.len() + worker_count - 1) / worker_count;

    let mut findings: Vec<Defect> = Vec::new();
    std::thread::scope(|scope| {
        let mut handles = Vec::new();

        for chunk in jobs.chunks(chunk_size.max(1)) {
            let handle = scope.spawn(move || {
                let mut local = Vec::new();

                for (digest, content_path) in chunk {
                    if cancel.is_cancelled() {
                        local.push(Defect::new("E-CANCELLED", "validation cancelled"));
                        break;
                    }

                    let full_path = join(object_dir, content_path.as_str());
                    match fs.open_file(&full_path, cancel) {
                        Ok((mut reader, _)) => match inventory.digest_algorithm.hash_hex(&mut reader) {
                            Ok(actual) => {
                                if &actual != digest {
                                    local.push(Defect::new(
                                        "E-CONTENT-DIGEST-MISMATCH",
                                        format!(
                                            "{} hashes to {} but the manifest expects {}",
                                            full_path, actual, digest
                                        ),
                                    ));
                                }
                            }
                            Err(e) => local.push(Defect::new(
                                "E-CONTENT-UNREADABLE",
                                format!("{}: {}", full_path, e),
                            )),
                        },
                        Err(e) => local.push(Defect::new("E-CONTENT-MISSING", format!("{}: {}", full_path, e))),
                    }
                }

                local
            });
            handles.push(handle);
        }

        for handle in handles {
            if let Ok(local) = handle.join() {
                findings.extend(local);
            }
        }
    });

    result.errors.extend(findings);
}

fn check_for_orphans<F: FsCapability>(
    fs: &F,
    object_dir: &str,
    inventory: &Inventory,
    result: &mut ValidationResult,
    cancel: &CancellationToken,
) -> Result<()> {
    let mut stack = vec![object_dir.to_string()];

    while let Some(dir) = stack.pop() {
        for entry in fs.dir_entries(&dir, cancel)? {
            if entry.name == "extensions" {
                continue;
            }

            let full_path = join(&dir, &entry.name);

            if entry.is_dir {
                stack.push(full_path);
                continue;
            }

            if is_reserved_file(&entry.name) {
                continue;
            }

            let relative = full_path
                .strip_prefix(object_dir)
                .unwrap_or(&full_path)
                .trim_start_matches('/')
                .to_string();

            match ContentPath::try_from(relative.as_str()) {
                Ok(content_path) if inventory.manifest.contains_path(&content_path) => {}
                _ => {
                    result
                        .warnings
                        .push(Defect::new("W-EXTRA-FILE", format!("{} is not referenced by the manifest", full_path)));
                }
            }
        }
    }

    Ok(())
}

fn is_reserved_file(name: &str) -> bool {
    name == crate::ocfl::consts::INVENTORY_FILE
        || name.starts_with(crate::ocfl::consts::INVENTORY_SIDECAR_PREFIX)
        || name.starts_with(crate::ocfl::consts::OBJECT_NAMASTE_FILE_PREFIX)
}

fn read_bytes<F: FsCapability>(fs: &F, path: &str, cancel: &CancellationToken) -> Result<Vec<u8>> {
    let (mut reader, _) = fs.open_file(path, cancel)?;
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf)?;
    Ok(buf)
}

fn join(a: &str, b: &str) -> String {
    if a.is_empty() || a == "." {
        b.to_string()
    } else {
        format!("{}/{}", a, b)
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use tempfile::tempdir;

    use super::*;
    use crate::ocfl::consts::SpecVersion;
    use crate::ocfl::executor::execute;
    use crate::ocfl::fs_capability::LocalFs;
    use crate::ocfl::layout::{LayoutExtensionName, StorageLayout};
    use crate::ocfl::plan::build_plan;
    use crate::ocfl::root::Root;
    use crate::ocfl::stage::FileContentSource;
    use crate::ocfl::CommitMeta;
    use crate::ocfl::DigestAlgorithm;

    fn commit_single_file(root_path: &std::path::Path, object_dir: &str, text: &[u8]) -> (LocalFs, Inventory) {
        let layout = StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap();
        Root::init_local(root_path, SpecVersion::Ocfl1_1, Some(layout), None).unwrap();
        let fs = LocalFs::new(root_path);
        let cancel = CancellationToken::new();

        let digest = DigestAlgorithm::Sha256.hash_hex(&mut &text[..]).unwrap();
        let staged = vec![("a.txt".try_into().unwrap(), digest.clone())];
        let inventory = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .with_object_root(object_dir)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        let mut content = FileContentSource::new();
        let content_file = root_path.join("staged-a.txt");
        std::fs::write(&content_file, text).unwrap();
        content.insert(digest, content_file);

        let plan = build_plan(&inventory, None, true).unwrap();
        for activity in &plan.activities {
            execute(activity, &fs, object_dir, &inventory, &content, &cancel).unwrap();
        }

        (fs, inventory)
    }

    #[test]
    fn valid_object_has_no_errors() {
        let dir = tempdir().unwrap();
        let (fs, _inv) = commit_single_file(dir.path(), "obj", b"hello");
        let cancel = CancellationToken::new();

        let result = validate_object(&fs, "obj", "ex:1", 2, &cancel).unwrap();
        assert!(result.is_valid(), "unexpected errors: {:?}", result.errors);
    }

    #[test]
    fn tampered_content_is_a_digest_mismatch() {
        let dir = tempdir().unwrap();
        let (fs, _inv) = commit_single_file(dir.path(), "obj", b"hello");
        let cancel = CancellationToken::new();

        std::fs::write(dir.path().join("obj/v1/content/a.txt"), b"tampered").unwrap();

        let result = validate_object(&fs, "obj", "ex:1", 2, &cancel).unwrap();
        assert!(result
            .errors
            .iter()
            .any(|d| d.code == "E-CONTENT-DIGEST-MISMATCH"));
    }

    #[test]
    fn extra_file_is_a_warning() {
        let dir = tempdir().unwrap();
        let (fs, _inv) = commit_single_file(dir.path(), "obj", b"hello");
        let cancel = CancellationToken::new();

        std::fs::write(dir.path().join("obj/v1/content/stray.txt"), b"stray").unwrap();

        let result = validate_object(&fs, "obj", "ex:1", 2, &cancel).unwrap();
        assert!(result.is_valid());
        assert!(result.warnings.iter().any(|d| d.code == "W-EXTRA-FILE"));
    }
}
