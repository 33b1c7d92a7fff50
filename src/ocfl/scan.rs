//! Repository-wide object discovery: crawls a storage root looking for object namaste
//! files, the way a directory-backed repository has always had to when it has no
//! persistent object index (see the Non-goals in the crate's top-level docs).

use crate::ocfl::consts::OBJECT_NAMASTE_FILE_PREFIX;
use crate::ocfl::error::Result;
use crate::ocfl::fs_capability::{CancellationToken, FsCapability};
use crate::ocfl::{DirEntry, OcflError};

/// Recursively walks `fs` from the root looking for object directories (identified by an
/// object namaste file) and returns the IDs recorded in each one's inventory. Directories
/// under `extensions/` are skipped, since those never contain objects.
pub fn scan_object_ids<F: FsCapability>(fs: &F, cancel: &CancellationToken) -> Result<Vec<String>> {
    let mut ids = Vec::new();
    let mut stack = vec![String::new()];

    while let Some(dir) = stack.pop() {
        cancel.check(&dir)?;
        let entries = fs.dir_entries(&dir, cancel)?;

        if is_object_dir(&entries) {
            if let Some(id) = read_object_id(fs, &dir, cancel)? {
                ids.push(id);
            }
            continue;
        }

        for entry in entries {
            if !entry.is_dir || entry.name == "extensions" {
                continue;
            }
            stack.push(join(&dir, &entry.name));
        }
    }

    ids.sort();
    Ok(ids)
}

fn is_object_dir(entries: &[DirEntry]) -> bool {
    entries
        .iter()
        .any(|e| e.name.starts_with(OBJECT_NAMASTE_FILE_PREFIX))
}

fn read_object_id<F: FsCapability>(
    fs: &F,
    object_dir: &str,
    cancel: &CancellationToken,
) -> Result<Option<String>> {
    use std::io::Read;

    let inv_path = join(object_dir, "inventory.json");
    let mut buf = Vec::new();
    match fs.open_file(&inv_path, cancel) {
        Ok((mut reader, _)) => {
            reader.read_to_end(&mut buf)?;
        }
        Err(OcflError::NotFound(_)) => return Ok(None),
        Err(e) => return Err(e),
    }

    let inventory: crate::ocfl::Inventory = serde_json::from_slice(&buf)?;
    Ok(Some(inventory.id))
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
    use tempfile::tempdir;

    use super::*;
    use crate::ocfl::consts::SpecVersion;
    use crate::ocfl::fs_capability::LocalFs;
    use crate::ocfl::layout::{LayoutExtensionName, StorageLayout};
    use crate::ocfl::object::Object;
    use crate::ocfl::root::Root;
    use crate::ocfl::stage::FileContentSource;
    use crate::ocfl::{CommitMeta, DigestAlgorithm, Stage};

    #[test]
    fn finds_every_committed_object() {
        let dir = tempdir().unwrap();
        let layout = StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap();
        let root = Root::init_local(dir.path().join("root"), SpecVersion::Ocfl1_1, Some(layout), None)
            .unwrap();
        let cancel = CancellationToken::new();

        for id in ["ex:1", "ex:2"] {
            let mut content = FileContentSource::new();
            content.insert("d".into(), dir.path().join("nonexistent"));
            let mut stage = Stage::new(DigestAlgorithm::Sha256, Box::new(content));
            stage.add("a.txt".try_into().unwrap(), "d".into());

            let mut object = Object::open(&root, id, &cancel).unwrap();
            object
                .commit(stage, CommitMeta::new(), chrono::Utc::now(), &cancel)
                .unwrap();
        }

        let ids = scan_object_ids(root.fs(), &cancel).unwrap();
        assert_eq!(vec!["ex:1".to_string(), "ex:2".to_string()], ids);
    }
}
