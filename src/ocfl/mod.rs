//! A storage-backend-agnostic OCFL repository engine: content-addressed storage, durable
//! version commits, and replay validation.
//!
//! ```no_run
//! use ocfl_engine::ocfl::root::Root;
//! use ocfl_engine::ocfl::consts::SpecVersion;
//!
//! let root = Root::open_local("path/to/ocfl/storage/root").unwrap();
//! let _ = root.spec_version();
//! ```

pub use self::checksum::{ChecksumJob, ChecksumPipeline, ChecksumResult};
pub use self::consts::SpecVersion;
pub use self::digest::{DigestAlgorithm, HexDigest};
pub use self::error::{OcflError, Result};
pub use self::fs_capability::{CancellationToken, DirEntry, FileStat, FsCapability, HttpFs, LocalFs};
pub use self::inventory::{Inventory, InventoryBuilder, User, Version};
pub use self::layout::{LayoutExtensionName, StorageLayout};
pub use self::lock::{LockManager, ObjectLock};
pub use self::manifest::Manifest;
pub use self::object::Object;
pub use self::plan::{build_plan, Activity, InventoryLocation, Plan};
pub use self::root::Root;
pub use self::scan::scan_object_ids;
pub use self::stage::{ContentSource, FileContentSource, Stage};
pub use self::types::{
    CommitMeta, ContentPath, FileDetails, InventoryPath, LogicalPath, ObjectVersion,
    ObjectVersionDetails, VersionDetails, VersionNum, VersionRef,
};
pub use self::validate::{Defect, ValidationResult};

pub mod checksum;
pub mod consts;
pub mod digest;
pub mod error;
pub mod executor;
pub mod fs_capability;
pub mod inventory;
pub mod layout;
pub mod lock;
pub mod manifest;
pub mod object;
pub mod paths;
pub mod plan;
pub mod root;
pub mod scan;
pub mod stage;
pub mod types;
pub mod util;
pub mod validate;
