//! Hierarchical property containers.
//!
//! Keys are `/`-separated paths such as `BackupShipping/PrefNic`. A namespace is a
//! key prefix; looking a key up "in" a namespace means looking up `namespace/key`.

mod priority;

pub use priority::{PriorityProps, ValueWithDescription};

use std::collections::BTreeMap;

/// Path separator for property keys.
pub const PATH_SEPARATOR: char = '/';

/// Join an optional namespace and a key into a normalized full key.
///
/// Repeated separators collapse into one; leading and trailing separators are
/// dropped. A key that normalizes to the empty string is rejected.
pub fn normalize_key(namespace: Option<&str>, key: &str) -> crate::Result<String> {
    let joined = match namespace {
        Some(ns) => format!("{ns}{PATH_SEPARATOR}{key}"),
        None => key.to_string(),
    };
    let normalized = normalize_path(&joined);
    if normalized.is_empty() {
        return Err(crate::Error::InvalidPropKey(joined));
    }
    Ok(normalized)
}

/// Normalize a namespace path. Unlike keys, the empty namespace (root) is valid.
pub fn normalize_path(path: &str) -> String {
    path.split(PATH_SEPARATOR)
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Strip `namespace` from `full_key`, returning the key relative to it.
///
/// Returns `None` when `full_key` is not inside the namespace. Both arguments
/// must already be normalized.
pub fn relative_key<'k>(namespace: &str, full_key: &'k str) -> Option<&'k str> {
    if namespace.is_empty() {
        return Some(full_key);
    }
    full_key
        .strip_prefix(namespace)
        .and_then(|rest| rest.strip_prefix(PATH_SEPARATOR))
        .filter(|rest| !rest.is_empty())
}

/// Read access to a property container.
pub trait ReadOnlyProps {
    /// Look up `key` inside `namespace`.
    fn get_prop(&self, key: &str, namespace: Option<&str>) -> Option<String>;

    /// Every entry below `namespace` (recursively), keyed relative to it.
    fn namespace_entries(&self, namespace: &str) -> BTreeMap<String, String>;

    /// Whether at least one entry exists below `namespace`.
    fn contains_namespace(&self, namespace: &str) -> bool {
        !self.namespace_entries(namespace).is_empty()
    }
}

/// Plain, non-transactional property map.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropsMap {
    entries: BTreeMap<String, String>,
}

impl PropsMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a map from root-level entries. Fails on the first invalid key.
    pub fn from_entries<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> crate::Result<Self>
    where
        K: AsRef<str>,
        V: Into<String>,
    {
        let mut map = Self::new();
        for (key, value) in entries {
            map.set_prop(key.as_ref(), value, None)?;
        }
        Ok(map)
    }

    pub fn set_prop(
        &mut self,
        key: &str,
        value: impl Into<String>,
        namespace: Option<&str>,
    ) -> crate::Result<Option<String>> {
        let full_key = normalize_key(namespace, key)?;
        Ok(self.entries.insert(full_key, value.into()))
    }

    pub fn remove_prop(&mut self, key: &str, namespace: Option<&str>) -> crate::Result<Option<String>> {
        let full_key = normalize_key(namespace, key)?;
        Ok(self.entries.remove(&full_key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.entries.iter()
    }
}

impl ReadOnlyProps for PropsMap {
    fn get_prop(&self, key: &str, namespace: Option<&str>) -> Option<String> {
        let full_key = normalize_key(namespace, key).ok()?;
        self.entries.get(&full_key).cloned()
    }

    fn namespace_entries(&self, namespace: &str) -> BTreeMap<String, String> {
        collect_namespace(&self.entries, namespace)
    }
}

/// Collect the entries of an already-normalized map that live below `namespace`.
pub fn collect_namespace(
    entries: &BTreeMap<String, String>,
    namespace: &str,
) -> BTreeMap<String, String> {
    let namespace = normalize_path(namespace);
    entries
        .iter()
        .filter_map(|(full_key, value)| {
            relative_key(&namespace, full_key).map(|rel| (rel.to_string(), value.clone()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key(Some("A/"), "/b").unwrap(), "A/b");
        assert_eq!(normalize_key(Some("//A//B//"), "c").unwrap(), "A/B/c");
        assert_eq!(normalize_key(None, "x").unwrap(), "x");
        assert!(normalize_key(Some("/"), "/").is_err());
        assert!(normalize_key(None, "").is_err());
    }

    #[test]
    fn test_relative_key() {
        assert_eq!(relative_key("A", "A/b"), Some("b"));
        assert_eq!(relative_key("A", "AB/c"), None);
        assert_eq!(relative_key("A", "A"), None);
        assert_eq!(relative_key("", "A/b"), Some("A/b"));
    }

    #[test]
    fn test_from_entries_rejects_empty_keys() {
        let props = PropsMap::from_entries([("/A//b/", "1"), ("c", "2")]).unwrap();
        assert_eq!(props.get_prop("b", Some("A")).as_deref(), Some("1"));
        assert_eq!(props.len(), 2);

        let err = PropsMap::from_entries([("a", "1"), ("//", "2")]).unwrap_err();
        assert!(matches!(err, crate::Error::InvalidPropKey(_)));
    }

    #[test]
    fn test_props_map_namespace() {
        let mut props = PropsMap::new();
        props.set_prop("one", "1", Some("Ns")).unwrap();
        props.set_prop("Sub/two", "2", Some("Ns")).unwrap();
        props.set_prop("other", "x", None).unwrap();

        assert_eq!(props.get_prop("one", Some("/Ns/")).as_deref(), Some("1"));
        let entries = props.namespace_entries("Ns");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries.get("Sub/two").map(String::as_str), Some("2"));
        assert!(props.contains_namespace("Ns/Sub"));
        assert!(!props.contains_namespace("Missing"));
    }
}
