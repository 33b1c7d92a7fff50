//! The object version engine: locates an object under a storage root, opens its current
//! inventory (if any), and drives commits through the planner and executor.

use std::io::Read;

use chrono::{DateTime, Utc};

use crate::ocfl::consts::SpecVersion;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::executor::execute;
use crate::ocfl::fs_capability::{CancellationToken, FsCapability};
use crate::ocfl::inventory::Inventory;
use crate::ocfl::plan::{build_plan, Activity, InventoryLocation, Plan};
use crate::ocfl::root::Root;
use crate::ocfl::stage::Stage;
use crate::ocfl::types::{CommitMeta, ObjectVersion, ObjectVersionDetails, VersionRef};
use crate::ocfl::{InventoryPath, VersionNum};

/// A located object: its directory under the storage root, and its current inventory if
/// one has been committed yet.
pub struct Object<'r, F: FsCapability> {
    fs: &'r F,
    object_dir: String,
    id: String,
    spec_version: SpecVersion,
    inventory: Option<Inventory>,
}

impl<'r, F: FsCapability> Object<'r, F> {
    /// Locates `id` under `root` via its layout extension and reads the head inventory if
    /// one exists. A missing object is not an error -- the handle just reports
    /// `exists() == false`. An object namaste with no readable inventory is `corrupt-object`.
    pub fn open(root: &'r Root<F>, id: &str, cancel: &CancellationToken) -> Result<Self> {
        let object_dir = root.map_object_id(id)?;
        let fs = root.fs();

        let namaste_version = detect_object_namaste(fs, &object_dir, cancel)?;

        let inventory = match namaste_version {
            None => None,
            Some(_) => {
                let inv_path = join(&object_dir, "inventory.json");
                let bytes = match fs.open_file(&inv_path, cancel) {
                    Ok((mut reader, _)) => {
                        let mut buf = Vec::new();
                        reader.read_to_end(&mut buf)?;
                        buf
                    }
                    Err(OcflError::NotFound(_)) => {
                        return Err(OcflError::CorruptObject {
                            object_id: id.to_string(),
                            message: "object namaste is present but inventory.json is missing"
                                .to_string(),
                        });
                    }
                    Err(e) => return Err(e),
                };

                let inventory: Inventory = serde_json::from_slice(&bytes)?;
                Some(inventory.with_object_root(object_dir.clone()))
            }
        };

        Ok(Self {
            fs,
            object_dir,
            id: id.to_string(),
            spec_version: namaste_version.unwrap_or_else(|| root.spec_version()),
            inventory,
        })
    }

    pub fn exists(&self) -> bool {
        self.inventory.is_some()
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn object_dir(&self) -> &str {
        &self.object_dir
    }

    pub fn inventory(&self) -> Option<&Inventory> {
        self.inventory.as_ref()
    }

    /// Overrides the OCFL spec version used if this object does not yet exist and the
    /// next `commit` call creates it. Has no effect on an object that already exists --
    /// its spec version was fixed at creation.
    pub fn set_spec_version_for_new_object(&mut self, version: SpecVersion) {
        if self.inventory.is_none() {
            self.spec_version = version;
        }
    }

    /// Builds the logical state of a version (`VersionRef::Head` for the current head)
    /// without checking anything against the filesystem.
    pub fn version_state(&self, version: VersionRef) -> Result<ObjectVersion> {
        let inventory = self.require_inventory()?;
        ObjectVersion::from_inventory(inventory, version)
    }

    pub fn version_details(&self, version: VersionRef) -> Result<ObjectVersionDetails> {
        let inventory = self.require_inventory()?;
        ObjectVersionDetails::from_inventory(inventory, version)
    }

    /// Opens a logical path at `version` for reading, resolving it through the inventory's
    /// manifest to its content path and then through the underlying capability. Does not
    /// verify the bytes against their recorded digest; see `validate`.
    pub fn open_logical_path(
        &self,
        version: VersionRef,
        logical_path: &crate::ocfl::LogicalPath,
        cancel: &CancellationToken,
    ) -> Result<Box<dyn Read>> {
        let inventory = self.require_inventory()?;
        let state = ObjectVersion::from_inventory(inventory, version)?;

        let details = state
            .state
            .get(logical_path)
            .ok_or_else(|| OcflError::NotFound(format!("{} @ {}", logical_path, self.id)))?;

        let full_path = join(&self.object_dir, details.content_path.as_str());
        let (reader, _) = self.fs.open_file(&full_path, cancel)?;
        Ok(reader)
    }

    /// Builds and applies a new version in one step. Returns the committed inventory.
    pub fn commit(
        &mut self,
        stage: Stage,
        meta: CommitMeta,
        created: DateTime<Utc>,
        cancel: &CancellationToken,
    ) -> Result<&Inventory> {
        if let Some(existing) = &self.inventory {
            if existing.digest_algorithm != stage.digest_algorithm {
                return Err(OcflError::DigestAlgorithmMismatch {
                    existing: existing.digest_algorithm.to_string(),
                    requested: stage.digest_algorithm.to_string(),
                });
            }
        }

        let new_inventory = match &self.inventory {
            Some(existing) => existing.compose_next(&stage.entries, meta, created)?,
            None => Inventory::builder(&self.id)
                .with_spec_version(self.spec_version)
                .with_digest_algorithm(stage.digest_algorithm)
                .with_object_root(&self.object_dir)
                .build_from_stage(&stage.entries, meta, created)?,
        };

        let namaste_needed = self.inventory.is_none();
        let plan = build_plan(&new_inventory, self.inventory.as_ref(), namaste_needed)?;

        if let Err(err) = self.apply(&plan, &new_inventory, stage.content.as_ref(), cancel) {
            self.rollback_partial_version(&plan, &new_inventory, cancel);
            return Err(err);
        }

        self.inventory = Some(new_inventory);
        Ok(self.inventory.as_ref().unwrap())
    }

    fn apply(
        &self,
        plan: &Plan,
        new_inventory: &Inventory,
        content: &dyn crate::ocfl::stage::ContentSource,
        cancel: &CancellationToken,
    ) -> Result<()> {
        for activity in &plan.activities {
            execute(activity, self.fs, &self.object_dir, new_inventory, content, cancel)?;
        }
        Ok(())
    }

    /// Best-effort rollback: if the failure happened before the root-scoped inventory
    /// write (the commit point), the partial `v<new>` directory is safe to discard. Once
    /// the commit point has been reached, the object already reflects the new version in
    /// every way that matters except the final pointer update, so nothing is removed --
    /// a retried plan resumes at the root-scoped write instead.
    fn rollback_partial_version(
        &self,
        plan: &Plan,
        new_inventory: &Inventory,
        cancel: &CancellationToken,
    ) {
        let commit_point_reached = plan.activities.iter().any(|a| {
            matches!(
                a,
                Activity::WriteInventory {
                    location: InventoryLocation::RootScoped,
                    ..
                }
            )
        }) && self.fs
            .open_file(&join(&self.object_dir, "inventory.json"), cancel)
            .map(|(mut r, _)| {
                let mut buf = Vec::new();
                r.read_to_end(&mut buf).is_ok() && new_inventory.to_canonical_json().map(|b| b == buf).unwrap_or(false)
            })
            .unwrap_or(false);

        if commit_point_reached {
            return;
        }

        let version_dir = join(&self.object_dir, &new_inventory.head.to_string());
        let _ = self.fs.remove_all(&version_dir, cancel);
    }

    /// Replay-verifies this object's on-disk state against its own inventories. See
    /// `crate::ocfl::validate`.
    pub fn validate(&self, worker_count: usize, cancel: &CancellationToken) -> Result<crate::ocfl::validate::ValidationResult>
    where
        F: Sync,
    {
        crate::ocfl::validate::validate_object(self.fs, &self.object_dir, &self.id, worker_count, cancel)
    }

    fn require_inventory(&self) -> Result<&Inventory> {
        self.inventory
            .as_ref()
            .ok_or_else(|| OcflError::NotFound(self.id.clone()))
    }
}

fn detect_object_namaste<F: FsCapability>(
    fs: &F,
    object_dir: &str,
    cancel: &CancellationToken,
) -> Result<Option<SpecVersion>> {
    let entries = fs.dir_entries(object_dir, cancel)?;
    for version in [SpecVersion::Ocfl1_1, SpecVersion::Ocfl1_0] {
        let name = version.object_namaste().filename;
        if entries.iter().any(|e| e.name == name) {
            return Ok(Some(version));
        }
    }
    Ok(None)
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
    use crate::ocfl::fs_capability::LocalFs;
    use crate::ocfl::layout::{LayoutExtensionName, StorageLayout};
    use crate::ocfl::stage::FileContentSource;
    use crate::ocfl::DigestAlgorithm;

    fn new_root(dir: &std::path::Path) -> Root<LocalFs> {
        let layout = StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap();
        Root::init_local(dir, SpecVersion::Ocfl1_1, Some(layout), None).unwrap()
    }

    #[test]
    fn open_on_missing_object_reports_not_exists() {
        let dir = tempdir().unwrap();
        let root = new_root(&dir.path().join("root"));
        let cancel = CancellationToken::new();

        let object = Object::open(&root, "ex:missing", &cancel).unwrap();
        assert!(!object.exists());
    }

    #[test]
    fn commit_then_reopen_round_trips_state() {
        let dir = tempdir().unwrap();
        let root = new_root(&dir.path().join("root"));
        let cancel = CancellationToken::new();

        let content_dir = tempdir().unwrap();
        std::fs::write(content_dir.path().join("a.txt"), b"hello").unwrap();

        let stage = Stage::from_directory(
            content_dir.path(),
            DigestAlgorithm::Sha256,
            2,
            cancel.clone(),
        )
        .unwrap();

        let mut object = Object::open(&root, "ex:1", &cancel).unwrap();
        assert!(!object.exists());

        object
            .commit(stage, CommitMeta::new(), Utc::now(), &cancel)
            .unwrap();
        assert!(object.exists());
        assert_eq!(VersionNum::new(1), object.inventory().unwrap().head);

        let reopened = Object::open(&root, "ex:1", &cancel).unwrap();
        assert!(reopened.exists());
        assert_eq!(VersionNum::new(1), reopened.inventory().unwrap().head);

        let logical_path: crate::ocfl::LogicalPath = "a.txt".try_into().unwrap();
        let mut reader = reopened
            .open_logical_path(VersionRef::Head, &logical_path, &cancel)
            .unwrap();
        let mut buf = String::new();
        reader.read_to_string(&mut buf).unwrap();
        assert_eq!("hello", buf);
    }

    #[test]
    fn digest_algorithm_mismatch_is_rejected() {
        let dir = tempdir().unwrap();
        let root = new_root(&dir.path().join("root"));
        let cancel = CancellationToken::new();

        let mut object = Object::open(&root, "ex:1", &cancel).unwrap();

        let mut content = FileContentSource::new();
        content.insert("a".into(), dir.path().join("nonexistent"));
        let mut stage = Stage::new(DigestAlgorithm::Sha256, Box::new(content));
        stage.add("a.txt".try_into().unwrap(), "a".into());

        object
            .commit(stage, CommitMeta::new(), Utc::now(), &cancel)
            .unwrap();

        let mut content2 = FileContentSource::new();
        content2.insert("b".into(), dir.path().join("nonexistent"));
        let mut stage2 = Stage::new(DigestAlgorithm::Sha512, Box::new(content2));
        stage2.add("b.txt".try_into().unwrap(), "b".into());

        let err = object
            .commit(stage2, CommitMeta::new(), Utc::now(), &cancel)
            .unwrap_err();
        assert!(matches!(err, OcflError::DigestAlgorithmMismatch { .. }));
    }
}
