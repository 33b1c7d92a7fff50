//! Durable update planner: turns a composed-but-not-yet-applied next inventory into an
//! ordered, idempotent list of activities.

use crate::ocfl::digest::DigestAlgorithm;
use crate::ocfl::error::Result;
use crate::ocfl::inventory::Inventory;
use crate::ocfl::{ContentPath, InventoryPath, VersionNum};

/// Where a `WriteInventory`/`WriteSidecar` activity targets.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InventoryLocation {
    /// `v<new>/inventory.json[.alg]`
    VersionScoped,
    /// `inventory.json[.alg]`
    RootScoped,
}

/// A single durable, idempotent unit of work.
#[derive(Debug, Clone)]
pub enum Activity {
    WriteNamaste {
        name: String,
        filename: &'static str,
        content: &'static str,
    },
    CreateVersionDir {
        name: String,
        version: VersionNum,
    },
    CopyContent {
        name: String,
        source_digest: crate::ocfl::digest::HexDigest,
        dest_content_path: ContentPath,
    },
    WriteInventory {
        name: String,
        location: InventoryLocation,
    },
    WriteSidecar {
        name: String,
        location: InventoryLocation,
        digest_algorithm: DigestAlgorithm,
    },
}

impl Activity {
    /// The stable, human-readable idempotency key.
    pub fn name(&self) -> &str {
        match self {
            Activity::WriteNamaste { name, .. } => name,
            Activity::CreateVersionDir { name, .. } => name,
            Activity::CopyContent { name, .. } => name,
            Activity::WriteInventory { name, .. } => name,
            Activity::WriteSidecar { name, .. } => name,
        }
    }
}

/// An ordered list of activities that bring an object from its previous on-disk state to
/// the state described by `new_inventory`.
pub struct Plan {
    pub activities: Vec<Activity>,
}

/// Builds the activity list for committing `new_inventory`, which must already be
/// `previous` plus one staged version (see `Inventory::compose_next`).
///
/// `namaste_needed` is true the first time an object is written (no prior head exists);
/// `previous` is `None` in that case too.
pub fn build_plan(
    new_inventory: &Inventory,
    previous: Option<&Inventory>,
    namaste_needed: bool,
) -> Result<Plan> {
    let mut activities = Vec::new();
    let new_head = new_inventory.head;

    if namaste_needed {
        let namaste = new_inventory.spec_version()?.object_namaste();
        activities.push(Activity::WriteNamaste {
            name: "write namaste".to_string(),
            filename: namaste.filename,
            content: namaste.content,
        });
    }

    activities.push(Activity::CreateVersionDir {
        name: format!("create dir {}", new_head),
        version: new_head,
    });

    let mut new_content_paths: Vec<ContentPath> = Vec::new();
    for (_, paths) in new_inventory.manifest.iter_id_paths() {
        for path in paths {
            let already_existed = previous
                .map(|prev| prev.manifest.contains_path(path.as_ref()))
                .unwrap_or(false);
            if !already_existed {
                new_content_paths.push((**path).clone());
            }
        }
    }
    new_content_paths.sort_by(|a, b| a.as_str().cmp(b.as_str()));

    for content_path in &new_content_paths {
        let digest = new_inventory
            .manifest
            .get_id(content_path)
            .expect("path came from this manifest")
            .as_ref()
            .clone();

        activities.push(Activity::CopyContent {
            name: format!("copy {}", content_path),
            source_digest: digest,
            dest_content_path: content_path.clone(),
        });
    }

    activities.push(Activity::WriteInventory {
        name: format!("write {}/inventory.json", new_head),
        location: InventoryLocation::VersionScoped,
    });
    activities.push(Activity::WriteSidecar {
        name: format!("write {}/inventory.json.{}", new_head, new_inventory.digest_algorithm),
        location: InventoryLocation::VersionScoped,
        digest_algorithm: new_inventory.digest_algorithm,
    });

    activities.push(Activity::WriteInventory {
        name: "write inventory.json".to_string(),
        location: InventoryLocation::RootScoped,
    });
    activities.push(Activity::WriteSidecar {
        name: format!("write inventory.json.{}", new_inventory.digest_algorithm),
        location: InventoryLocation::RootScoped,
        digest_algorithm: new_inventory.digest_algorithm,
    });

    Ok(Plan { activities })
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::*;
    use crate::ocfl::CommitMeta;

    fn digest(s: &str) -> crate::ocfl::digest::HexDigest {
        format!("{:0>64}", s).as_str().into()
    }

    #[test]
    fn first_version_plan_includes_namaste_and_is_ordered() {
        let staged = vec![("readme.txt".try_into().unwrap(), digest("a"))];
        let v1 = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        let plan = build_plan(&v1, None, true).unwrap();

        assert!(matches!(plan.activities[0], Activity::WriteNamaste { .. }));
        assert!(matches!(plan.activities[1], Activity::CreateVersionDir { .. }));

        let names: Vec<&str> = plan.activities.iter().map(|a| a.name()).collect();
        let version_inv_pos = names.iter().position(|n| *n == "write v1/inventory.json").unwrap();
        let root_inv_pos = names.iter().position(|n| *n == "write inventory.json").unwrap();
        assert!(version_inv_pos < root_inv_pos);

        let copy_pos = names.iter().position(|n| n.starts_with("copy")).unwrap();
        assert!(copy_pos < version_inv_pos);
    }

    #[test]
    fn later_version_plan_skips_namaste_and_only_copies_new_digests() {
        let staged = vec![("readme.txt".try_into().unwrap(), digest("a"))];
        let v1 = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        let staged2 = vec![
            ("readme.txt".try_into().unwrap(), digest("a")),
            ("new.txt".try_into().unwrap(), digest("b")),
        ];
        let v2 = v1.compose_next(&staged2, CommitMeta::new(), Utc::now()).unwrap();

        let plan = build_plan(&v2, Some(&v1), false).unwrap();

        assert!(!matches!(plan.activities[0], Activity::WriteNamaste { .. }));

        let copy_count = plan
            .activities
            .iter()
            .filter(|a| matches!(a, Activity::CopyContent { .. }))
            .count();
        assert_eq!(1, copy_count);
    }
}
