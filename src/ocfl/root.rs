//! A storage root: a filesystem capability rooted at a prefix, plus the layout extension
//! that maps object IDs to object directories.

use std::fs::{self, File};
use std::io::Write as _;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::ocfl::consts::*;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::fs_capability::{CancellationToken, FsCapability, LocalFs};
use crate::ocfl::layout::{LayoutExtensionName, StorageLayout};
use crate::ocfl::paths;

/// `ocfl_layout.json` serialization object.
#[derive(Deserialize, Serialize, Debug)]
pub struct OcflLayoutDescriptor {
    pub extension: LayoutExtensionName,
    pub description: String,
}

/// An opened OCFL storage root.
pub struct Root<F: FsCapability> {
    fs: F,
    spec_version: SpecVersion,
    layout: Option<StorageLayout>,
}

impl Root<LocalFs> {
    /// Initializes a new, empty storage root on the local filesystem. `description`
    /// overrides the default text written into `ocfl_layout.json` when a layout is given.
    pub fn init_local(
        storage_root: impl AsRef<Path>,
        spec_version: SpecVersion,
        layout: Option<StorageLayout>,
        description: Option<&str>,
    ) -> Result<Self> {
        let root = storage_root.as_ref();

        if root.exists() {
            if !root.is_dir() {
                return Err(OcflError::InvalidConfiguration(format!(
                    "storage root {} is not a directory",
                    root.display()
                )));
            }
            if fs::read_dir(root)?.next().is_some() {
                return Err(OcflError::InvalidConfiguration(format!(
                    "storage root {} must be empty to initialize",
                    root.display()
                )));
            }
        }

        info!("Initializing OCFL storage root at {}", root.display());
        fs::create_dir_all(root)?;

        write!(
            File::create(paths::root_namaste_path(root, spec_version))?,
            "{}",
            spec_version.root_namaste().content
        )?;

        if let Some(layout) = &layout {
            write_layout_config(root, layout, description)?;
        }

        Ok(Self {
            fs: LocalFs::new(root),
            spec_version,
            layout,
        })
    }

    /// Opens an existing storage root on the local filesystem.
    pub fn open_local(storage_root: impl AsRef<Path>) -> Result<Self> {
        let root = storage_root.as_ref();

        if !root.exists() || !root.is_dir() {
            return Err(OcflError::NotFound(format!(
                "storage root {}",
                root.display()
            )));
        }

        let spec_version = read_root_namaste(root)?;
        check_extensions(root);
        let layout = load_storage_layout(root);

        Ok(Self {
            fs: LocalFs::new(root),
            spec_version,
            layout,
        })
    }
}

impl<F: FsCapability> Root<F> {
    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub fn spec_version(&self) -> SpecVersion {
        self.spec_version
    }

    pub fn layout(&self) -> Option<&StorageLayout> {
        self.layout.as_ref()
    }

    /// Maps an object ID to its root-relative object directory. Fails with
    /// `OcflError::Unsupported` if the root has no configured layout.
    pub fn map_object_id(&self, object_id: &str) -> Result<String> {
        match &self.layout {
            Some(layout) => Ok(layout.map_object_id(object_id)),
            None => Err(OcflError::Unsupported(
                "storage root has no layout extension configured; ID-based resolution requires one".to_string(),
            )),
        }
    }
}

fn read_root_namaste(root: &Path) -> Result<SpecVersion> {
    for version in [SpecVersion::Ocfl1_1, SpecVersion::Ocfl1_0] {
        if paths::root_namaste_path(root, version).exists() {
            return Ok(version);
        }
    }

    Err(OcflError::CorruptObject {
        object_id: root.display().to_string(),
        message: "no OCFL root namaste file found".to_string(),
    })
}

fn check_extensions(storage_root: &Path) {
    let extensions_dir = paths::extensions_path(storage_root);

    if !extensions_dir.exists() {
        return;
    }

    match fs::read_dir(&extensions_dir) {
        Ok(entries) => {
            for entry in entries.flatten() {
                let name = entry.file_name().to_string_lossy().to_string();
                if !SUPPORTED_EXTENSIONS.contains(&name.as_str()) {
                    warn!("Storage root extension {} is not supported", name);
                }
            }
        }
        Err(e) => warn!("Failed to list storage root extensions: {}", e),
    }
}

fn load_storage_layout(storage_root: &Path) -> Option<StorageLayout> {
    let layout_file = paths::ocfl_layout_path(storage_root);
    if !layout_file.exists() {
        info!(
            "{} does not contain an ocfl_layout.json file",
            storage_root.display()
        );
        return None;
    }

    let descriptor: OcflLayoutDescriptor = match File::open(&layout_file)
        .map_err(OcflError::from)
        .and_then(|f| serde_json::from_reader(f).map_err(OcflError::from))
    {
        Ok(descriptor) => descriptor,
        Err(e) => {
            warn!("Failed to parse ocfl_layout.json: {}", e);
            return None;
        }
    };

    let config_path =
        paths::extension_config_path(storage_root, &descriptor.extension.to_string());
    let config_bytes = fs::read(&config_path).ok();

    match StorageLayout::new(descriptor.extension, config_bytes.as_deref()) {
        Ok(layout) => Some(layout),
        Err(e) => {
            warn!(
                "Failed to load storage layout extension {}: {}",
                descriptor.extension, e
            );
            None
        }
    }
}

fn write_layout_config(
    root: &Path,
    layout: &StorageLayout,
    description: Option<&str>,
) -> Result<()> {
    let extension_name = layout.extension_name().to_string();

    let descriptor = OcflLayoutDescriptor {
        extension: layout.extension_name(),
        description: description.map(String::from).unwrap_or_else(|| {
            format!("See the specification document {}.md", extension_name)
        }),
    };

    serde_json::to_writer_pretty(File::create(paths::ocfl_layout_path(root))?, &descriptor)?;

    let ext_config = paths::extension_config_path(root, &extension_name);
    if let Some(parent) = ext_config.parent() {
        fs::create_dir_all(parent)?;
    }
    File::create(ext_config)?.write_all(&layout.serialize()?)?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;
    use crate::ocfl::layout::LayoutExtensionName;

    #[test]
    fn init_then_reopen_preserves_layout() {
        let dir = tempdir().unwrap();
        let root_path = dir.path().join("root");

        let layout = StorageLayout::new(LayoutExtensionName::HashedNTupleLayout, None).unwrap();
        Root::init_local(&root_path, SpecVersion::Ocfl1_1, Some(layout), None).unwrap();

        let reopened = Root::open_local(&root_path).unwrap();
        assert_eq!(SpecVersion::Ocfl1_1, reopened.spec_version());
        assert!(reopened.layout().is_some());
        assert!(!reopened.map_object_id("ex:1").unwrap().is_empty());
    }

    #[test]
    fn init_fails_on_nonempty_directory() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join("stray.txt"), b"hi").unwrap();

        let err = Root::init_local(dir.path(), SpecVersion::Ocfl1_1, None, None).unwrap_err();
        assert!(matches!(err, OcflError::InvalidConfiguration(_)));
    }

    #[test]
    fn open_missing_root_is_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        let err = Root::open_local(&missing).unwrap_err();
        assert!(matches!(err, OcflError::NotFound(_)));
    }

    #[test]
    fn cancellation_token_is_threaded_through_fs() {
        let dir = tempdir().unwrap();
        let root = Root::init_local(dir.path().join("root2"), SpecVersion::Ocfl1_1, None, None).unwrap();

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = root.fs().dir_entries(".", &cancel).unwrap_err();
        assert!(matches!(err, OcflError::Cancelled(_)));
    }
}
