use core::fmt;
use std::borrow::Cow;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::convert::{TryFrom, TryInto};
use std::fmt::{Display, Formatter};
use std::hash::{Hash, Hasher};
use std::path::Path;
use std::rc::Rc;
use std::str::{FromStr, Split};

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::de::Visitor;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ocfl::digest::HexDigest;
use crate::ocfl::error::{OcflError, Result};
use crate::ocfl::inventory::{Inventory, Version};
use crate::ocfl::DigestAlgorithm;

static VERSION_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r#"^v\d+$"#).unwrap());

/// Represents an [OCFL object version](https://ocfl.io/1.0/spec/#version-directories).
#[derive(Deserialize, Serialize, Debug, Copy, Clone)]
#[serde(try_from = "&str")]
#[serde(into = "String")]
pub struct VersionNum {
    pub number: u32,
    pub width: u32,
}

/// Represents either a specific version number or whatever the current head version is
#[derive(Copy, Clone)]
pub enum VersionRef {
    Number(VersionNum),
    Head,
}

pub trait InventoryPath {
    /// Returns an iterable containing each segment of the path split on the `/` separator
    fn parts(&self) -> Split<char>;

    /// Returns the parent path of this path.
    fn parent(&self) -> Self;

    /// Returns the part of the path that's after the final `/`, or the entire path if
    /// there is no `/`
    fn filename(&self) -> &str;

    /// Creates a new path by joining this path with another
    fn resolve(&self, other: &Self) -> Self;

    /// Returns true if the path starts with the given prefix
    fn starts_with(&self, prefix: &str) -> bool;

    /// Returns a reference to the path represented as a `Path`
    fn as_path(&self) -> &Path;

    /// Returns a reference to the path represented as a `str`
    fn as_str(&self) -> &str;

    /// Returns true if the path is empty
    fn is_empty(&self) -> bool;
}

#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
struct InventoryPathInner(String);

/// The logical path to a file in an object, as recorded in a version's state map.
#[derive(Deserialize, Serialize, Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
#[serde(transparent)]
pub struct LogicalPath {
    inner: InventoryPathInner,
}

/// A path within a version's content directory, relative to the object root. Always
/// begins with the version directory the content was introduced in.
#[derive(Debug, Eq, Ord, PartialOrd, PartialEq, Hash, Clone)]
pub struct ContentPath {
    inner: InventoryPathInner,
    pub version: VersionNum,
}

impl VersionNum {
    pub fn new(number: u32) -> Self {
        Self { number, width: 0 }
    }

    pub fn with_width(number: u32, width: u32) -> Self {
        Self { number, width }
    }

    /// Returns the previous version, or an error if the previous version would be less than 1.
    pub fn previous(&self) -> Result<VersionNum> {
        if self.number < 2 {
            return Err(OcflError::IllegalArgument(
                "Versions cannot be less than 1".to_string(),
            ));
        }

        Ok(Self {
            number: self.number - 1,
            width: self.width,
        })
    }

    /// Returns the next version. Zero-padded version numbers have a maximum value
    /// determined by their width; unpadded version numbers do not.
    pub fn next(&self) -> Result<VersionNum> {
        let max = match self.width {
            0 => u32::MAX,
            _ => 10_u32.pow(self.width) - 1,
        };

        if self.number + 1 > max {
            return Err(OcflError::IllegalArgument(format!(
                "Version cannot be greater than {}",
                max
            )));
        }

        Ok(Self {
            number: self.number + 1,
            width: self.width,
        })
    }
}

impl TryFrom<&str> for VersionNum {
    type Error = OcflError;

    /// Parses a string formatted like `v1` or `v0002` into a `VersionNum`.
    fn try_from(version: &str) -> Result<Self, Self::Error> {
        if !VERSION_REGEX.is_match(version) {
            return Err(OcflError::IllegalArgument(format!(
                "Invalid version {}",
                version
            )));
        }

        match version[1..].parse::<u32>() {
            Ok(num) => {
                if num < 1 {
                    return Err(OcflError::IllegalArgument(format!(
                        "Invalid version {}",
                        version
                    )));
                }

                let width = match version.starts_with("v0") {
                    true => version.len() - 1,
                    false => 0,
                };

                Ok(Self {
                    number: num,
                    width: width as u32,
                })
            }
            Err(_) => Err(OcflError::IllegalArgument(format!(
                "Invalid version {}",
                version
            ))),
        }
    }
}

impl TryFrom<u32> for VersionNum {
    type Error = OcflError;

    fn try_from(version: u32) -> Result<Self, Self::Error> {
        if version < 1 {
            return Err(OcflError::IllegalArgument(format!(
                "Invalid version number {}",
                version
            )));
        }

        Ok(Self {
            number: version,
            width: 0,
        })
    }
}

impl FromStr for VersionNum {
    type Err = OcflError;

    /// Accepts strings formatted like `v3`, `v00009`, or the bare number `8`, so that
    /// callers on the command line don't have to type the `v` prefix.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match VersionNum::try_from(s) {
            Ok(v) => Ok(v),
            Err(_) => match u32::from_str(s) {
                Ok(parsed) => VersionNum::try_from(parsed),
                Err(_) => Err(OcflError::IllegalArgument(format!(
                    "Invalid version number {}",
                    s
                ))),
            },
        }
    }
}

impl fmt::Display for VersionNum {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "v{:0width$}", self.number, width = self.width as usize)
    }
}

impl From<VersionNum> for String {
    fn from(version_num: VersionNum) -> Self {
        format!("{}", version_num)
    }
}

impl PartialEq for VersionNum {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl Eq for VersionNum {}

impl Hash for VersionNum {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.number.hash(state)
    }
}

impl PartialOrd for VersionNum {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for VersionNum {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

impl VersionRef {
    pub fn resolve(&self, head_num: VersionNum) -> VersionNum {
        match self {
            VersionRef::Number(num) => *num,
            VersionRef::Head => head_num,
        }
    }
}

impl From<VersionNum> for VersionRef {
    fn from(num: VersionNum) -> Self {
        Self::Number(num)
    }
}

impl From<Option<VersionNum>> for VersionRef {
    fn from(num: Option<VersionNum>) -> Self {
        num.map_or(VersionRef::Head, VersionRef::Number)
    }
}

impl InventoryPath for InventoryPathInner {
    fn parts(&self) -> Split<char> {
        self.0.split('/')
    }

    fn parent(&self) -> Self {
        match self.0.rfind('/') {
            Some(last_slash) => Self(self.0.as_str()[0..last_slash].into()),
            None => Self("".to_string()),
        }
    }

    fn filename(&self) -> &str {
        match self.0.rfind('/') {
            Some(last_slash) => &self.0.as_str()[last_slash + 1..],
            None => self.0.as_str(),
        }
    }

    fn resolve(&self, other: &Self) -> Self {
        if self.0.is_empty() {
            other.clone()
        } else {
            Self(format!("{}/{}", self.0, other.0))
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }

    fn as_path(&self) -> &Path {
        self.as_ref()
    }

    fn as_str(&self) -> &str {
        self.as_ref()
    }

    fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl InventoryPath for LogicalPath {
    fn parts(&self) -> Split<char> {
        self.inner.parts()
    }

    fn parent(&self) -> Self {
        Self {
            inner: self.inner.parent(),
        }
    }

    fn filename(&self) -> &str {
        self.inner.filename()
    }

    fn resolve(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.resolve(&other.inner),
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.inner.starts_with(prefix)
    }

    fn as_path(&self) -> &Path {
        self.as_ref()
    }

    fn as_str(&self) -> &str {
        self.as_ref()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl InventoryPath for ContentPath {
    fn parts(&self) -> Split<char> {
        self.inner.parts()
    }

    fn parent(&self) -> Self {
        Self {
            inner: self.inner.parent(),
            version: self.version,
        }
    }

    fn filename(&self) -> &str {
        self.inner.filename()
    }

    fn resolve(&self, other: &Self) -> Self {
        Self {
            inner: self.inner.resolve(&other.inner),
            version: self.version,
        }
    }

    fn starts_with(&self, prefix: &str) -> bool {
        self.inner.starts_with(prefix)
    }

    fn as_path(&self) -> &Path {
        self.as_ref()
    }

    fn as_str(&self) -> &str {
        self.as_ref()
    }

    fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

/// Validates a raw path string. A leading `/`, or a `.`, `..`, or empty segment
/// anywhere in the path is always rejected with an error; this never silently
/// rewrites the input the way trimming a stray slash would.
impl TryFrom<&str> for InventoryPathInner {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        if value.starts_with('/') {
            return Err(OcflError::InvalidPath {
                path: value.to_string(),
                message: "paths must not begin with '/'".to_string(),
            });
        }

        let trimmed = value.trim_end_matches('/');

        if trimmed.is_empty() {
            return Err(OcflError::InvalidPath {
                path: value.to_string(),
                message: "paths must not be empty".to_string(),
            });
        }

        let has_illegal_part = trimmed
            .split('/')
            .any(|part| part == "." || part == ".." || part.is_empty());

        if has_illegal_part {
            return Err(OcflError::InvalidPath {
                path: value.to_string(),
                message: "paths may not contain '.', '..', or empty segments".to_string(),
            });
        }

        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<&str> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Ok(Self {
            inner: InventoryPathInner::try_from(value)?,
        })
    }
}

impl TryFrom<&str> for ContentPath {
    type Error = OcflError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let inner = InventoryPathInner::try_from(value)?;

        let version = match value.find('/') {
            Some(index) => value[0..index].try_into()?,
            None => {
                return Err(OcflError::InvalidPath {
                    path: value.to_string(),
                    message: "content paths must begin with a version directory".to_string(),
                });
            }
        };

        Ok(Self { inner, version })
    }
}

impl TryFrom<String> for InventoryPathInner {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.as_str().try_into()
    }
}

impl TryFrom<String> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Ok(Self {
            inner: InventoryPathInner::try_from(value)?,
        })
    }
}

impl TryFrom<String> for ContentPath {
    type Error = OcflError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::try_from(value.as_str())
    }
}

impl TryFrom<&String> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: &String) -> Result<Self, Self::Error> {
        Ok(Self {
            inner: InventoryPathInner::try_from(value.as_str())?,
        })
    }
}

impl TryFrom<Cow<'_, str>> for LogicalPath {
    type Error = OcflError;

    fn try_from(value: Cow<'_, str>) -> Result<Self, Self::Error> {
        Ok(Self {
            inner: InventoryPathInner::try_from(value.as_ref())?,
        })
    }
}

impl From<LogicalPath> for String {
    fn from(path: LogicalPath) -> Self {
        path.inner.0
    }
}

impl From<ContentPath> for String {
    fn from(path: ContentPath) -> Self {
        path.inner.0
    }
}

impl AsRef<str> for InventoryPathInner {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for LogicalPath {
    fn as_ref(&self) -> &str {
        self.inner.as_ref()
    }
}

impl AsRef<str> for ContentPath {
    fn as_ref(&self) -> &str {
        self.inner.as_ref()
    }
}

impl AsRef<Path> for InventoryPathInner {
    fn as_ref(&self) -> &Path {
        self.0.as_ref()
    }
}

impl AsRef<Path> for LogicalPath {
    fn as_ref(&self) -> &Path {
        self.inner.as_ref()
    }
}

impl AsRef<Path> for ContentPath {
    fn as_ref(&self) -> &Path {
        self.inner.as_ref()
    }
}

impl Display for InventoryPathInner {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Display for LogicalPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl Display for ContentPath {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        self.inner.fmt(f)
    }
}

impl Serialize for ContentPath {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ContentPath {
    fn deserialize<D>(deserializer: D) -> Result<ContentPath, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(ContentPathVisitor)
    }
}

struct ContentPathVisitor;

impl<'de> Visitor<'de> for ContentPathVisitor {
    type Value = ContentPath;

    fn expecting(&self, formatter: &mut Formatter) -> std::fmt::Result {
        formatter.write_str("a path string that is a valid OCFL content path")
    }

    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
    where
        E: serde::de::Error,
    {
        v.try_into()
            .map_err(|e: OcflError| E::custom(e.to_string()))
    }
}

/// The logical state of an object at a specific version, as returned by `ls` and `export`.
#[derive(Debug, Clone)]
pub struct ObjectVersion {
    pub id: String,
    pub object_root: String,
    pub digest_algorithm: DigestAlgorithm,
    pub version_details: VersionDetails,
    pub state: HashMap<Rc<LogicalPath>, FileDetails>,
}

/// Details about a single file in an object's logical state.
#[derive(Debug, Clone)]
pub struct FileDetails {
    pub digest: Rc<HexDigest>,
    pub digest_algorithm: DigestAlgorithm,
    pub content_path: Rc<ContentPath>,
    pub last_update: Rc<VersionDetails>,
}

/// Metadata about a single version.
#[derive(Debug, Clone)]
pub struct VersionDetails {
    pub version_num: VersionNum,
    pub created: DateTime<Utc>,
    pub user_name: Option<String>,
    pub user_address: Option<String>,
    pub message: Option<String>,
}

/// Like `ObjectVersion`, but without the state map -- cheap to build for `ls` listings.
#[derive(Debug, Clone)]
pub struct ObjectVersionDetails {
    pub id: String,
    pub object_root: String,
    pub digest_algorithm: DigestAlgorithm,
    pub version_details: VersionDetails,
}

/// Caller-supplied metadata for a commit.
#[derive(Debug, Default, Clone)]
pub struct CommitMeta {
    pub(crate) user_name: Option<String>,
    pub(crate) user_address: Option<String>,
    pub(crate) message: Option<String>,
    pub(crate) created: Option<DateTime<Utc>>,
}

impl CommitMeta {
    pub fn new() -> Self {
        Self::default()
    }

    /// `address` may only be set when `name` is also set.
    pub fn with_user(mut self, name: Option<String>, address: Option<String>) -> Result<Self> {
        if address.is_some() && name.is_none() {
            return Err(OcflError::IllegalArgument(
                "User name must be set when user address is set.".to_string(),
            ));
        }
        self.user_name = name;
        self.user_address = address;
        Ok(self)
    }

    pub fn with_message(mut self, message: Option<String>) -> Self {
        self.message = message;
        self
    }

    pub fn with_created(mut self, created: Option<DateTime<Utc>>) -> Self {
        self.created = created;
        self
    }
}

impl ObjectVersion {
    /// Builds the logical state at `version_num` (or head) by walking backwards through
    /// the inventory's versions until every path's last update is accounted for.
    pub fn from_inventory(inventory: &Inventory, version_num: VersionRef) -> Result<Self> {
        let version_num = version_num.resolve(inventory.head);
        let version = inventory.get_version(version_num)?;
        let version_details = VersionDetails::new(version_num, version);

        let state = Self::construct_state(inventory, version_num)?;

        Ok(Self {
            id: inventory.id.clone(),
            object_root: inventory.object_root.clone(),
            digest_algorithm: inventory.digest_algorithm,
            version_details,
            state,
        })
    }

    fn construct_state(
        inventory: &Inventory,
        target: VersionNum,
    ) -> Result<HashMap<Rc<LogicalPath>, FileDetails>> {
        let mut state = HashMap::new();
        let mut remaining: HashMap<Rc<LogicalPath>, Rc<HexDigest>> = inventory
            .get_version(target)?
            .state
            .iter()
            .map(|(p, d)| (p.clone(), d.clone()))
            .collect();

        let mut current = target;

        loop {
            let version_details =
                Rc::new(VersionDetails::new(current, inventory.get_version(current)?));

            if current.number == 1 {
                for (path, digest) in remaining {
                    let content_path = inventory.content_path_for_digest(&digest, Some(&path))?;
                    state.insert(
                        path,
                        FileDetails {
                            content_path,
                            digest,
                            digest_algorithm: inventory.digest_algorithm,
                            last_update: version_details.clone(),
                        },
                    );
                }
                break;
            }

            let previous = current.previous()?;
            let previous_state = &inventory.get_version(previous)?.state;

            let mut still_remaining = HashMap::new();

            for (path, digest) in remaining {
                match previous_state.get(&path) {
                    Some(prev_digest) if *prev_digest == digest => {
                        still_remaining.insert(path, digest);
                    }
                    _ => {
                        let content_path =
                            inventory.content_path_for_digest(&digest, Some(&path))?;
                        state.insert(
                            path,
                            FileDetails {
                                content_path,
                                digest,
                                digest_algorithm: inventory.digest_algorithm,
                                last_update: version_details.clone(),
                            },
                        );
                    }
                }
            }

            remaining = still_remaining;
            current = previous;
        }

        Ok(state)
    }
}

impl VersionDetails {
    pub fn new(version_num: VersionNum, version: &Version) -> Self {
        let (user_name, user_address) = match &version.user {
            Some(user) => (user.name.clone(), user.address.clone()),
            None => (None, None),
        };

        Self {
            version_num,
            created: version.created,
            user_name,
            user_address,
            message: version.message.clone(),
        }
    }
}

impl ObjectVersionDetails {
    pub fn from_inventory(inventory: &Inventory, version_num: VersionRef) -> Result<Self> {
        let version_num = version_num.resolve(inventory.head);
        let version_details =
            VersionDetails::new(version_num, inventory.get_version(version_num)?);

        Ok(Self {
            id: inventory.id.clone(),
            object_root: inventory.object_root.clone(),
            digest_algorithm: inventory.digest_algorithm,
            version_details,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryFrom;

    use crate::ocfl::LogicalPath;

    use super::VersionNum;

    #[test]
    fn padded_version_next_allows_up_to_width_ceiling() {
        let v = VersionNum::with_width(9998, 4);
        assert_eq!(9999, v.next().unwrap().number);
    }

    #[test]
    fn padded_version_next_rejects_past_width_ceiling() {
        let v = VersionNum::with_width(9999, 4);
        assert!(v.next().is_err());
    }

    #[test]
    fn unpadded_version_next_has_no_ceiling() {
        let v = VersionNum::new(9999);
        assert_eq!(10000, v.next().unwrap().number);
    }

    #[test]
    fn create_logical_path_when_valid() {
        let value = "foo/.bar/baz.txt";
        let path = LogicalPath::try_from(value).unwrap();
        assert_eq!(value, path.inner.0);
    }

    #[test]
    fn remove_trailing_slash_from_logical_paths() {
        let path = LogicalPath::try_from("foo/bar/baz/").unwrap();
        assert_eq!("foo/bar/baz", path.inner.0);
    }

    #[test]
    fn reject_logical_paths_with_leading_slash() {
        assert!(LogicalPath::try_from("/foo/bar").is_err());
    }

    #[test]
    fn reject_empty_logical_path() {
        assert!(LogicalPath::try_from("").is_err());
        assert!(LogicalPath::try_from("/").is_err());
    }

    #[test]
    fn reject_logical_paths_with_empty_parts() {
        assert!(LogicalPath::try_from("foo//bar/baz").is_err());
    }

    #[test]
    fn reject_logical_paths_with_single_dot() {
        assert!(LogicalPath::try_from("foo/bar/./baz").is_err());
    }

    #[test]
    fn reject_logical_paths_with_double_dot() {
        assert!(LogicalPath::try_from("foo/bar/../baz").is_err());
    }
}
