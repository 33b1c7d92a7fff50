use std::collections::hash_map::Iter;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::fmt;
use std::fmt::Formatter;
use std::hash::Hash;
use std::marker::PhantomData;
use std::rc::Rc;

use serde::de::{DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ocfl::digest::HexDigest;

/// A bidirectional map from a digest to the ordered set of content paths that hold its
/// bytes, and from a content path back to its digest. A digest may have many paths; a
/// path may only have one digest.
///
/// Path lists preserve first-insertion order rather than hashing into a `HashSet`, and
/// serialization walks digests in sorted order, so two manifests with the same logical
/// content always serialize to byte-identical JSON regardless of build order.
#[derive(Debug, Clone)]
pub struct Manifest<P>
where
    P: Eq + Hash + DeserializeOwned + Serialize,
{
    id_to_paths: BTreeMap<Rc<HexDigest>, Vec<Rc<P>>>,
    path_to_id: HashMap<Rc<P>, Rc<HexDigest>>,
}

impl<P> Manifest<P>
where
    P: Eq + Hash + DeserializeOwned + Serialize,
{
    pub fn new() -> Self {
        Self {
            id_to_paths: BTreeMap::new(),
            path_to_id: HashMap::new(),
        }
    }

    /// Inserts a new digest-to-path mapping. If the path already has a mapping, the
    /// existing mapping is removed first.
    pub fn insert(&mut self, id: HexDigest, path: P) {
        self.insert_rc(Rc::new(id), Rc::new(path));
    }

    pub fn insert_rc(&mut self, id_ref: Rc<HexDigest>, path_ref: Rc<P>) {
        if self.path_to_id.contains_key(&path_ref) {
            self.remove_path(&path_ref);
        }

        let paths = self.id_to_paths.entry(id_ref.clone()).or_default();
        if !paths.iter().any(|p| p == &path_ref) {
            paths.push(path_ref.clone());
        }

        self.path_to_id.insert(path_ref, id_ref);
    }

    fn insert_ordered(&mut self, id: HexDigest, paths: Vec<P>) {
        if paths.is_empty() {
            return;
        }

        let id_ref = Rc::new(id);
        let entry = self.id_to_paths.entry(id_ref.clone()).or_default();

        for path in paths {
            let path_ref = Rc::new(path);
            entry.push(path_ref.clone());
            self.path_to_id.insert(path_ref, id_ref.clone());
        }
    }

    pub fn get_paths(&self, id: &HexDigest) -> Option<&Vec<Rc<P>>> {
        self.id_to_paths.get(id)
    }

    pub fn get_id(&self, path: &P) -> Option<&Rc<HexDigest>> {
        self.path_to_id.get(path)
    }

    pub fn get_id_rc(&self, id: &HexDigest) -> Option<&Rc<HexDigest>> {
        self.id_to_paths.get_key_value(id).map(|(id, _)| id)
    }

    pub fn contains_path(&self, path: &P) -> bool {
        self.path_to_id.contains_key(path)
    }

    pub fn contains_id(&self, id: &HexDigest) -> bool {
        self.id_to_paths.contains_key(id)
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_paths.is_empty()
    }

    pub fn len(&self) -> usize {
        self.path_to_id.len()
    }

    /// Removes a path mapping, dropping the digest entry entirely once its last path is gone.
    pub fn remove_path(&mut self, path: &P) -> Option<(Rc<P>, Rc<HexDigest>)> {
        if let Some((path, id)) = self.path_to_id.remove_entry(path) {
            let mut remove = false;
            if let Some(paths) = self.id_to_paths.get_mut(&id) {
                paths.retain(|p| p.as_ref() != path.as_ref());
                remove = paths.is_empty();
            }
            if remove {
                self.id_to_paths.remove(&id);
            }
            Some((path, id))
        } else {
            None
        }
    }

    pub fn iter(&self) -> Iter<Rc<P>, Rc<HexDigest>> {
        self.path_to_id.iter()
    }

    pub fn iter_id_paths(&self) -> std::collections::btree_map::Iter<Rc<HexDigest>, Vec<Rc<P>>> {
        self.id_to_paths.iter()
    }
}

impl<P> Default for Manifest<P>
where
    P: Eq + Hash + DeserializeOwned + Serialize,
{
    fn default() -> Self {
        Self::new()
    }
}

struct ManifestVisitor<P>
where
    P: Eq + Hash + DeserializeOwned + Serialize,
{
    brand: PhantomData<P>,
}

impl<'a, P> Visitor<'a> for ManifestVisitor<P>
where
    P: Eq + Hash + DeserializeOwned + Serialize,
{
    type Value = Manifest<P>;

    fn expecting(&self, formatter: &mut Formatter) -> fmt::Result {
        formatter.write_str("a map of digests to content paths")
    }

    fn visit_map<M: MapAccess<'a>>(self, mut access: M) -> Result<Self::Value, M::Error> {
        let mut map = Manifest::new();

        while let Some((key, value)) = access.next_entry()? {
            map.insert_ordered(key, value);
        }

        Ok(map)
    }
}

impl<'a, P> Deserialize<'a> for Manifest<P>
where
    P: Eq + Hash + DeserializeOwned + Serialize,
{
    fn deserialize<D: Deserializer<'a>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_map(ManifestVisitor {
            brand: Default::default(),
        })
    }
}

impl<P> Serialize for Manifest<P>
where
    P: Eq + Hash + DeserializeOwned + Serialize,
{
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.id_to_paths.iter())
    }
}

#[cfg(test)]
mod tests {
    use std::convert::TryInto;
    use std::rc::Rc;

    use crate::ocfl::digest::HexDigest;
    use crate::ocfl::manifest::Manifest;
    use crate::ocfl::LogicalPath;

    #[test]
    fn insert_retrieve_remove() {
        let mut map = Manifest::new();
        map.insert("abcd".into(), path("foo/bar"));
        map.insert("efgh".into(), path("foo/baz"));
        map.insert("abcd".into(), path("2"));

        assert_eq!(
            &vec![path_rc("foo/bar"), path_rc("2")],
            map.get_paths(&"abcd".into()).unwrap()
        );

        assert_eq!(&hex_rc("abcd"), map.get_id(&path("2")).unwrap());
        assert_eq!(None, map.get_id(&path("bogus")));

        map.remove_path(&path("foo/bar"));
        assert_eq!(&vec![path_rc("2")], map.get_paths(&"abcd".into()).unwrap());
    }

    #[test]
    fn serialize_is_sorted_by_digest() {
        let mut map = Manifest::new();
        map.insert("efgh".into(), path("foo/baz"));
        map.insert("abcd".into(), path("foo/bar"));
        map.insert("abcd".into(), path("2"));

        let json = serde_json::to_string(&map).unwrap();
        assert_eq!(r#"{"abcd":["foo/bar","2"],"efgh":["foo/baz"]}"#, json);

        let value: Manifest<LogicalPath> = serde_json::from_str(&json).unwrap();
        assert_eq!(map.path_to_id, value.path_to_id);
    }

    #[test]
    fn serialize_empty() {
        let map: Manifest<LogicalPath> = Manifest::new();
        let json = serde_json::to_string(&map).unwrap();
        assert_eq!("{}", json);
    }

    fn path(p: &str) -> LogicalPath {
        p.try_into().unwrap()
    }

    fn path_rc(p: &str) -> Rc<LogicalPath> {
        Rc::new(path(p))
    }

    fn hex_rc(d: &str) -> Rc<HexDigest> {
        Rc::new(HexDigest::from(d))
    }
}
