pub const REPO_NAMASTE_FILE_1_0: &str = "0=ocfl_1.0";
pub const REPO_NAMASTE_FILE_1_1: &str = "0=ocfl_1.1";
pub const OBJECT_NAMASTE_FILE_1_0: &str = "0=ocfl_object_1.0";
pub const OBJECT_NAMASTE_FILE_1_1: &str = "0=ocfl_object_1.1";
pub const OBJECT_NAMASTE_FILE_PREFIX: &str = "0=ocfl_object_";

pub const INVENTORY_FILE: &str = "inventory.json";
pub const INVENTORY_SIDECAR_PREFIX: &str = "inventory.json.";
pub const OCFL_LAYOUT_FILE: &str = "ocfl_layout.json";
pub const EXTENSIONS_DIR: &str = "extensions";
pub const EXTENSIONS_CONFIG_FILE: &str = "config.json";

pub const INVENTORY_TYPE_1_0: &str = "https://ocfl.io/1.0/spec/#inventory";
pub const INVENTORY_TYPE_1_1: &str = "https://ocfl.io/1.1/spec/#inventory";

pub const DEFAULT_CONTENT_DIR: &str = "content";

pub const FLAT_DIRECT_LAYOUT_EXTENSION: &str = "0002-flat-direct-storage-layout";
pub const HASHED_NTUPLE_OBJECT_ID_LAYOUT_EXTENSION: &str =
    "0003-hash-and-id-n-tuple-storage-layout";
pub const HASHED_NTUPLE_LAYOUT_EXTENSION: &str = "0004-hashed-n-tuple-storage-layout";

pub const SUPPORTED_EXTENSIONS: &[&str] = &[
    FLAT_DIRECT_LAYOUT_EXTENSION,
    HASHED_NTUPLE_OBJECT_ID_LAYOUT_EXTENSION,
    HASHED_NTUPLE_LAYOUT_EXTENSION,
];

/// Skip reasons an activity execution can report when it decides the target already
/// reflects the bytes it was about to write.
pub const SKIP_ALREADY_EXISTS_IDENTICAL: &str = "already_exists_identical";
pub const SKIP_CONTENT_VERIFIED: &str = "content_verified";

/// A namaste declaration file: a fixed filename and a single line of content.
pub struct Namaste {
    pub filename: &'static str,
    pub content: &'static str,
}

/// The OCFL spec version a root or object declares itself as conforming to.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum SpecVersion {
    Ocfl1_0,
    Ocfl1_1,
}

impl SpecVersion {
    pub fn root_namaste(&self) -> Namaste {
        match self {
            SpecVersion::Ocfl1_0 => Namaste {
                filename: REPO_NAMASTE_FILE_1_0,
                content: "ocfl_1.0\n",
            },
            SpecVersion::Ocfl1_1 => Namaste {
                filename: REPO_NAMASTE_FILE_1_1,
                content: "ocfl_1.1\n",
            },
        }
    }

    pub fn object_namaste(&self) -> Namaste {
        match self {
            SpecVersion::Ocfl1_0 => Namaste {
                filename: OBJECT_NAMASTE_FILE_1_0,
                content: "ocfl_object_1.0\n",
            },
            SpecVersion::Ocfl1_1 => Namaste {
                filename: OBJECT_NAMASTE_FILE_1_1,
                content: "ocfl_object_1.1\n",
            },
        }
    }

    pub fn inventory_type(&self) -> &'static str {
        match self {
            SpecVersion::Ocfl1_0 => INVENTORY_TYPE_1_0,
            SpecVersion::Ocfl1_1 => INVENTORY_TYPE_1_1,
        }
    }
}

impl std::str::FromStr for SpecVersion {
    type Err = crate::ocfl::error::OcflError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1.0" => Ok(SpecVersion::Ocfl1_0),
            "1.1" => Ok(SpecVersion::Ocfl1_1),
            _ => Err(crate::ocfl::error::OcflError::IllegalArgument(format!(
                "Unknown OCFL spec version: {}",
                s
            ))),
        }
    }
}

impl std::fmt::Display for SpecVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SpecVersion::Ocfl1_0 => write!(f, "1.0"),
            SpecVersion::Ocfl1_1 => write!(f, "1.1"),
        }
    }
}
