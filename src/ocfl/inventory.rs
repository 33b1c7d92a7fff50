use std::collections::BTreeMap;
use std::collections::HashMap;
use std::convert::TryInto;
use std::fmt::Formatter;
use std::rc::Rc;

use chrono::{DateTime, Utc};
use serde::de::{Error as SerdeError, MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ocfl::consts::{
    DEFAULT_CONTENT_DIR, INVENTORY_TYPE_1_0, INVENTORY_TYPE_1_1, SpecVersion,
};
use crate::ocfl::digest::{DigestAlgorithm, HexDigest};
use crate::ocfl::error::{not_found, OcflError, Result};
use crate::ocfl::manifest::Manifest;
use crate::ocfl::{CommitMeta, ContentPath, InventoryPath, LogicalPath, VersionNum};

const ENGINE_USER: &str = "ocfl-engine";

const ID_FIELD: &str = "id";
const TYPE_FIELD: &str = "type";
const DIGEST_ALGORITHM_FIELD: &str = "digestAlgorithm";
const HEAD_FIELD: &str = "head";
const CONTENT_DIRECTORY_FIELD: &str = "contentDirectory";
const MANIFEST_FIELD: &str = "manifest";
const VERSIONS_FIELD: &str = "versions";
const FIXITY_FIELD: &str = "fixity";
const INVENTORY_FIELDS: &[&str] = &[
    ID_FIELD,
    TYPE_FIELD,
    DIGEST_ALGORITHM_FIELD,
    HEAD_FIELD,
    CONTENT_DIRECTORY_FIELD,
    MANIFEST_FIELD,
    VERSIONS_FIELD,
    FIXITY_FIELD,
];

const CREATED_FIELD: &str = "created";
const STATE_FIELD: &str = "state";
const MESSAGE_FIELD: &str = "message";
const USER_FIELD: &str = "user";
const VERSION_FIELDS: &[&str] = &[CREATED_FIELD, STATE_FIELD, MESSAGE_FIELD, USER_FIELD];

/// OCFL inventory serialization object. Parsing and serialization are hand-written
/// (field-enum plus `MapAccess` visitor) rather than `#[derive]`, so that duplicate
/// top-level keys are rejected and the emitted field order always matches the
/// documented canonical order regardless of struct-field declaration order.
#[derive(Debug)]
pub struct Inventory {
    pub id: String,
    pub type_declaration: String,
    pub digest_algorithm: DigestAlgorithm,
    pub head: VersionNum,
    pub content_directory: Option<String>,
    pub manifest: Manifest<ContentPath>,
    pub versions: BTreeMap<VersionNum, Version>,
    pub fixity: Option<HashMap<String, HashMap<String, Vec<String>>>>,

    /// Path to the object's root relative to the storage root, using `/` separators.
    /// Not part of the serialized form.
    pub object_root: String,
}

/// Used to build the very first inventory for a new object.
pub struct InventoryBuilder {
    id: String,
    spec_version: SpecVersion,
    digest_algorithm: DigestAlgorithm,
    content_directory: String,
    object_root: String,
}

/// OCFL version serialization object.
#[derive(Debug, Clone)]
pub struct Version {
    pub created: DateTime<Utc>,
    pub state: Manifest<LogicalPath>,
    pub message: Option<String>,
    pub user: Option<User>,
}

/// OCFL user serialization object.
#[derive(Deserialize, Serialize, Debug, Clone)]
pub struct User {
    pub name: Option<String>,
    pub address: Option<String>,
}

impl Inventory {
    pub fn builder(object_id: &str) -> InventoryBuilder {
        InventoryBuilder::new(object_id)
    }

    pub fn head_version(&self) -> &Version {
        // Invariant: the head version always exists once an inventory is constructed.
        self.versions.get(&self.head).unwrap()
    }

    pub fn get_version(&self, version_num: VersionNum) -> Result<&Version> {
        match self.versions.get(&version_num) {
            Some(v) => Ok(v),
            None => Err(not_found(&self.id, Some(version_num))),
        }
    }

    /// Recovers the OCFL spec version this inventory declares conformance to from its
    /// `type_declaration`, so callers that only have the inventory (not the `SpecVersion`
    /// the object was opened with) can still get at the namaste that matches it.
    pub fn spec_version(&self) -> Result<SpecVersion> {
        match self.type_declaration.as_str() {
            INVENTORY_TYPE_1_0 => Ok(SpecVersion::Ocfl1_0),
            INVENTORY_TYPE_1_1 => Ok(SpecVersion::Ocfl1_1),
            other => Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("unrecognized inventory type declaration: {}", other),
            }),
        }
    }

    /// Sets the object root path. Not part of the serialized form, so it must be filled
    /// in by the caller after parsing an inventory read off disk.
    pub fn with_object_root(mut self, object_root: impl Into<String>) -> Self {
        self.object_root = object_root.into();
        self
    }

    /// Serializes this inventory as canonical, pretty-printed JSON ending in a single
    /// trailing newline.
    pub fn to_canonical_json(&self) -> Result<Vec<u8>> {
        let mut bytes = serde_json::to_vec_pretty(self)?;
        bytes.push(b'\n');
        Ok(bytes)
    }

    pub fn defaulted_content_dir(&self) -> &str {
        match &self.content_directory {
            Some(dir) => dir.as_str(),
            None => DEFAULT_CONTENT_DIR,
        }
    }

    /// Returns the content path holding the bytes for `digest`, preferring the one that
    /// matches `logical_path` directly when several content paths share the digest.
    pub fn content_path_for_digest(
        &self,
        digest: &HexDigest,
        logical_path: Option<&LogicalPath>,
    ) -> Result<Rc<ContentPath>> {
        match self.manifest.get_paths(digest) {
            Some(paths) if !paths.is_empty() => {
                if let Some(logical_path) = logical_path {
                    let suffix = format!("/{}/{}", self.defaulted_content_dir(), logical_path);
                    for path in paths {
                        if path.as_str().ends_with(&suffix) {
                            return Ok(path.clone());
                        }
                    }
                }
                Ok(paths[0].clone())
            }
            _ => Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("Digest {} not found in manifest", digest),
            }),
        }
    }

    /// Performs a spot check that the inventory is internally coherent. This does not
    /// replace full validation (see `crate::ocfl::validate`).
    pub fn validate(&self) -> Result<()> {
        if !self.versions.contains_key(&self.head) {
            return Err(OcflError::CorruptObject {
                object_id: self.id.clone(),
                message: format!("HEAD version {} was not found", self.head),
            });
        }
        Ok(())
    }

    /// Composes the next inventory from `self` (the current head) plus a staged set of
    /// logical-path → digest entries and their content sources. This implements the
    /// "composing a new inventory" algorithm: a new version number is allocated, new
    /// digests get new content paths named after their first introducing logical path
    /// (in stage insertion order), and the manifest only ever grows.
    pub fn compose_next(
        &self,
        staged: &[(LogicalPath, HexDigest)],
        meta: CommitMeta,
        created: DateTime<Utc>,
    ) -> Result<Inventory> {
        let new_head = self.head.next()?;

        let mut manifest = self.manifest.clone();
        let mut state = Manifest::new();

        for (path, digest) in staged {
            if manifest.get_paths(digest).is_none() {
                let content_path = new_content_path(new_head, self.defaulted_content_dir(), path)?;
                manifest.insert(digest.clone(), content_path);
            }
            state.insert(digest.clone(), path.clone());
        }

        let (user_name, user_address) = (meta.user_name.clone(), meta.user_address.clone());

        let version = Version {
            created,
            state,
            message: meta.message.clone(),
            user: user_name.map(|name| User {
                name: Some(name),
                address: user_address,
            }),
        };

        let mut versions = self.versions.clone();
        versions.insert(new_head, version);

        Ok(Inventory {
            id: self.id.clone(),
            type_declaration: self.type_declaration.clone(),
            digest_algorithm: self.digest_algorithm,
            head: new_head,
            content_directory: self.content_directory.clone(),
            manifest,
            versions,
            fixity: self.fixity.clone(),
            object_root: self.object_root.clone(),
        })
    }
}

fn new_content_path(
    version_num: VersionNum,
    content_dir: &str,
    logical_path: &LogicalPath,
) -> Result<ContentPath> {
    format!("{}/{}/{}", version_num, content_dir, logical_path.as_str()).try_into()
}

impl InventoryBuilder {
    pub fn new(object_id: &str) -> Self {
        Self {
            id: object_id.to_string(),
            spec_version: SpecVersion::Ocfl1_1,
            digest_algorithm: DigestAlgorithm::Sha512,
            content_directory: DEFAULT_CONTENT_DIR.to_string(),
            object_root: String::new(),
        }
    }

    pub fn with_spec_version(mut self, spec_version: SpecVersion) -> Self {
        self.spec_version = spec_version;
        self
    }

    pub fn with_digest_algorithm(mut self, digest_algorithm: DigestAlgorithm) -> Self {
        self.digest_algorithm = digest_algorithm;
        self
    }

    pub fn with_content_directory(mut self, content_directory: &str) -> Self {
        self.content_directory = content_directory.to_string();
        self
    }

    pub fn with_object_root(mut self, object_root: &str) -> Self {
        self.object_root = object_root.to_string();
        self
    }

    /// Builds the first (`v1`) inventory from a stage, performing the first iteration of
    /// the "composing a new inventory" algorithm against an empty prior inventory.
    pub fn build_from_stage(
        self,
        staged: &[(LogicalPath, HexDigest)],
        meta: CommitMeta,
        created: DateTime<Utc>,
    ) -> Result<Inventory> {
        let head = VersionNum::new(1);

        let mut manifest = Manifest::new();
        let mut state = Manifest::new();

        for (path, digest) in staged {
            if manifest.get_paths(digest).is_none() {
                let content_path = new_content_path(head, &self.content_directory, path)?;
                manifest.insert(digest.clone(), content_path);
            }
            state.insert(digest.clone(), path.clone());
        }

        let mut versions = BTreeMap::new();
        versions.insert(
            head,
            Version {
                created,
                state,
                message: meta.message.clone(),
                user: meta.user_name.clone().map(|name| User {
                    name: Some(name),
                    address: meta.user_address.clone(),
                }),
            },
        );

        let inventory = Inventory {
            id: self.id,
            type_declaration: self.spec_version.inventory_type().to_string(),
            digest_algorithm: self.digest_algorithm,
            head,
            content_directory: Some(self.content_directory),
            manifest,
            versions,
            fixity: None,
            object_root: self.object_root,
        };

        inventory.validate()?;

        Ok(inventory)
    }
}

impl User {
    pub fn new(name: String, address: Option<String>) -> Self {
        Self {
            name: Some(name),
            address,
        }
    }
}

#[allow(dead_code)]
fn engine_user() -> User {
    User::new(ENGINE_USER.to_string(), None)
}

impl Serialize for Inventory {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(INVENTORY_FIELDS.len()))?;
        map.serialize_entry(ID_FIELD, &self.id)?;
        map.serialize_entry(TYPE_FIELD, &self.type_declaration)?;
        map.serialize_entry(DIGEST_ALGORITHM_FIELD, &self.digest_algorithm)?;
        map.serialize_entry(HEAD_FIELD, &self.head)?;
        if let Some(content_directory) = &self.content_directory {
            map.serialize_entry(CONTENT_DIRECTORY_FIELD, content_directory)?;
        }
        map.serialize_entry(MANIFEST_FIELD, &self.manifest)?;
        map.serialize_entry(VERSIONS_FIELD, &self.versions)?;
        if let Some(fixity) = &self.fixity {
            map.serialize_entry(FIXITY_FIELD, fixity)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Inventory {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        enum Field {
            Id,
            Type,
            DigestAlgorithm,
            Head,
            ContentDirectory,
            Manifest,
            Versions,
            Fixity,
        }

        impl<'de> Deserialize<'de> for Field {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct FieldVisitor;

                impl<'de> Visitor<'de> for FieldVisitor {
                    type Value = Field;

                    fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                        f.write_str("an OCFL inventory field name")
                    }

                    fn visit_str<E: SerdeError>(self, value: &str) -> Result<Self::Value, E> {
                        match value {
                            ID_FIELD => Ok(Field::Id),
                            TYPE_FIELD => Ok(Field::Type),
                            DIGEST_ALGORITHM_FIELD => Ok(Field::DigestAlgorithm),
                            HEAD_FIELD => Ok(Field::Head),
                            CONTENT_DIRECTORY_FIELD => Ok(Field::ContentDirectory),
                            MANIFEST_FIELD => Ok(Field::Manifest),
                            VERSIONS_FIELD => Ok(Field::Versions),
                            FIXITY_FIELD => Ok(Field::Fixity),
                            _ => Err(SerdeError::unknown_field(value, INVENTORY_FIELDS)),
                        }
                    }
                }

                deserializer.deserialize_identifier(FieldVisitor)
            }
        }

        struct InventoryVisitor;

        impl<'de> Visitor<'de> for InventoryVisitor {
            type Value = Inventory;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                f.write_str("an OCFL inventory object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut id = None;
                let mut type_declaration = None;
                let mut digest_algorithm = None;
                let mut head = None;
                let mut content_directory = None;
                let mut manifest = None;
                let mut versions = None;
                let mut fixity = None;

                while let Some(key) = map.next_key()? {
                    match key {
                        Field::Id => {
                            if id.is_some() {
                                return Err(SerdeError::duplicate_field(ID_FIELD));
                            }
                            id = Some(map.next_value()?);
                        }
                        Field::Type => {
                            if type_declaration.is_some() {
                                return Err(SerdeError::duplicate_field(TYPE_FIELD));
                            }
                            type_declaration = Some(map.next_value()?);
                        }
                        Field::DigestAlgorithm => {
                            if digest_algorithm.is_some() {
                                return Err(SerdeError::duplicate_field(DIGEST_ALGORITHM_FIELD));
                            }
                            digest_algorithm = Some(map.next_value()?);
                        }
                        Field::Head => {
                            if head.is_some() {
                                return Err(SerdeError::duplicate_field(HEAD_FIELD));
                            }
                            head = Some(map.next_value()?);
                        }
                        Field::ContentDirectory => {
                            if content_directory.is_some() {
                                return Err(SerdeError::duplicate_field(CONTENT_DIRECTORY_FIELD));
                            }
                            content_directory = Some(map.next_value()?);
                        }
                        Field::Manifest => {
                            if manifest.is_some() {
                                return Err(SerdeError::duplicate_field(MANIFEST_FIELD));
                            }
                            manifest = Some(map.next_value()?);
                        }
                        Field::Versions => {
                            if versions.is_some() {
                                return Err(SerdeError::duplicate_field(VERSIONS_FIELD));
                            }
                            versions = Some(map.next_value()?);
                        }
                        Field::Fixity => {
                            if fixity.is_some() {
                                return Err(SerdeError::duplicate_field(FIXITY_FIELD));
                            }
                            fixity = Some(map.next_value()?);
                        }
                    }
                }

                Ok(Inventory {
                    id: id.ok_or_else(|| SerdeError::missing_field(ID_FIELD))?,
                    type_declaration: type_declaration
                        .ok_or_else(|| SerdeError::missing_field(TYPE_FIELD))?,
                    digest_algorithm: digest_algorithm
                        .ok_or_else(|| SerdeError::missing_field(DIGEST_ALGORITHM_FIELD))?,
                    head: head.ok_or_else(|| SerdeError::missing_field(HEAD_FIELD))?,
                    content_directory,
                    manifest: manifest.ok_or_else(|| SerdeError::missing_field(MANIFEST_FIELD))?,
                    versions: versions.ok_or_else(|| SerdeError::missing_field(VERSIONS_FIELD))?,
                    fixity,
                    // Filled in by the caller once the path on disk is known.
                    object_root: String::new(),
                })
            }
        }

        deserializer.deserialize_struct("Inventory", INVENTORY_FIELDS, InventoryVisitor)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(VERSION_FIELDS.len()))?;
        map.serialize_entry(CREATED_FIELD, &self.created)?;
        map.serialize_entry(STATE_FIELD, &self.state)?;
        if let Some(message) = &self.message {
            map.serialize_entry(MESSAGE_FIELD, message)?;
        }
        if let Some(user) = &self.user {
            map.serialize_entry(USER_FIELD, user)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Version {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        enum Field {
            Created,
            State,
            Message,
            User,
        }

        impl<'de> Deserialize<'de> for Field {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
                struct FieldVisitor;

                impl<'de> Visitor<'de> for FieldVisitor {
                    type Value = Field;

                    fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                        f.write_str("an OCFL version field name")
                    }

                    fn visit_str<E: SerdeError>(self, value: &str) -> Result<Self::Value, E> {
                        match value {
                            CREATED_FIELD => Ok(Field::Created),
                            STATE_FIELD => Ok(Field::State),
                            MESSAGE_FIELD => Ok(Field::Message),
                            USER_FIELD => Ok(Field::User),
                            _ => Err(SerdeError::unknown_field(value, VERSION_FIELDS)),
                        }
                    }
                }

                deserializer.deserialize_identifier(FieldVisitor)
            }
        }

        struct VersionVisitor;

        impl<'de> Visitor<'de> for VersionVisitor {
            type Value = Version;

            fn expecting(&self, f: &mut Formatter) -> std::fmt::Result {
                f.write_str("an OCFL version object")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut created = None;
                let mut state = None;
                let mut message = None;
                let mut user = None;

                while let Some(key) = map.next_key()? {
                    match key {
                        Field::Created => {
                            if created.is_some() {
                                return Err(SerdeError::duplicate_field(CREATED_FIELD));
                            }
                            created = Some(map.next_value()?);
                        }
                        Field::State => {
                            if state.is_some() {
                                return Err(SerdeError::duplicate_field(STATE_FIELD));
                            }
                            state = Some(map.next_value()?);
                        }
                        Field::Message => {
                            if message.is_some() {
                                return Err(SerdeError::duplicate_field(MESSAGE_FIELD));
                            }
                            message = Some(map.next_value()?);
                        }
                        Field::User => {
                            if user.is_some() {
                                return Err(SerdeError::duplicate_field(USER_FIELD));
                            }
                            user = Some(map.next_value()?);
                        }
                    }
                }

                Ok(Version {
                    created: created.ok_or_else(|| SerdeError::missing_field(CREATED_FIELD))?,
                    state: state.ok_or_else(|| SerdeError::missing_field(STATE_FIELD))?,
                    message,
                    user,
                })
            }
        }

        deserializer.deserialize_struct("Version", VERSION_FIELDS, VersionVisitor)
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;

    use super::*;

    fn digest(s: &str) -> HexDigest {
        format!("{:0>64}", s).as_str().into()
    }

    #[test]
    fn build_first_version_allocates_content_paths_per_first_reference() {
        let staged = vec![
            ("readme.txt".try_into().unwrap(), digest("a")),
            ("data/a.txt".try_into().unwrap(), digest("b")),
        ];

        let inventory = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        assert_eq!(VersionNum::new(1), inventory.head);
        assert_eq!(2, inventory.manifest.len());
        assert!(inventory
            .manifest
            .contains_path(&"v1/content/readme.txt".try_into().unwrap()));
    }

    #[test]
    fn compose_next_reuses_existing_digests_without_new_content_path() {
        let staged = vec![("readme.txt".try_into().unwrap(), digest("a"))];
        let v1 = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        let staged2 = vec![
            ("readme.txt".try_into().unwrap(), digest("a")),
            ("copy.txt".try_into().unwrap(), digest("a")),
        ];
        let v2 = v1
            .compose_next(&staged2, CommitMeta::new(), Utc::now())
            .unwrap();

        assert_eq!(VersionNum::new(2), v2.head);
        // Same digest, so no new content path is allocated -- still just v1/content/readme.txt
        assert_eq!(1, v2.manifest.len());
    }

    #[test]
    fn inventory_round_trips_through_canonical_json() {
        let staged = vec![("readme.txt".try_into().unwrap(), digest("a"))];
        let inventory = Inventory::builder("ex:1")
            .with_digest_algorithm(DigestAlgorithm::Sha256)
            .build_from_stage(&staged, CommitMeta::new(), Utc::now())
            .unwrap();

        let json = inventory.to_canonical_json().unwrap();
        assert!(json.ends_with(b"\n"));

        let parsed: Inventory = serde_json::from_slice(&json).unwrap();
        assert_eq!(inventory.id, parsed.id);
        assert_eq!(inventory.head, parsed.head);
        assert_eq!(inventory.manifest.len(), parsed.manifest.len());
    }

    #[test]
    fn rejects_duplicate_top_level_keys() {
        let bad = r#"{"id":"ex:1","id":"ex:2","type":"t","digestAlgorithm":"sha256","head":"v1","manifest":{},"versions":{}}"#;
        let result: Result<Inventory> = serde_json::from_str(bad).map_err(OcflError::from);
        assert!(result.is_err());
    }
}
