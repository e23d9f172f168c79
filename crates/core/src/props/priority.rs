//! Ordered overlay of property containers.

use super::{PropsMap, ReadOnlyProps, normalize_key, normalize_path};
use std::collections::BTreeMap;

/// Description reported for values that come from the fallback map.
pub const FALLBACK_DESCRIPTION: &str = "default";

/// A value together with the description of the container that defined it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueWithDescription {
    pub value: String,
    pub description: String,
}

/// Effective configuration computed from scoped property containers.
///
/// Containers are consulted in the order they were added: the first container
/// that defines a key wins. The fallback map is consulted last. Keeping the
/// containers separate (instead of merging them) preserves which scope set which
/// value for conflict diagnostics.
#[derive(Default)]
pub struct PriorityProps<'a> {
    props: Vec<(&'a dyn ReadOnlyProps, String)>,
    fallback: PropsMap,
}

impl<'a> PriorityProps<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from containers in priority order (highest first).
    pub fn with_props(props: impl IntoIterator<Item = (&'a dyn ReadOnlyProps, String)>) -> Self {
        Self {
            props: props.into_iter().collect(),
            fallback: PropsMap::new(),
        }
    }

    /// Append a container with lower priority than every container added so far.
    pub fn add_props(&mut self, props: &'a dyn ReadOnlyProps, description: impl Into<String>) {
        self.props.push((props, description.into()));
    }

    pub fn get_prop(&self, key: &str, namespace: Option<&str>) -> Option<String> {
        self.props
            .iter()
            .find_map(|(props, _)| props.get_prop(key, namespace))
            .or_else(|| self.fallback.get_prop(key, namespace))
    }

    pub fn get_prop_or(&self, key: &str, namespace: Option<&str>, default: &str) -> String {
        self.get_prop(key, namespace)
            .unwrap_or_else(|| default.to_string())
    }

    /// Insert or overwrite a fallback entry, returning the previous fallback value.
    pub fn set_fallback_prop(
        &mut self,
        key: &str,
        value: impl Into<String>,
        namespace: Option<&str>,
    ) -> crate::Result<Option<String>> {
        self.fallback.set_prop(key, value, namespace)
    }

    /// Merged view of every key below `namespace`, relative to it.
    ///
    /// Earlier containers shadow later ones; fallback entries fill the gaps.
    pub fn render_relative_map(&self, namespace: &str) -> BTreeMap<String, String> {
        let mut rendered = BTreeMap::new();
        let sources = self
            .props
            .iter()
            .map(|(props, _)| *props)
            .chain(std::iter::once(&self.fallback as &dyn ReadOnlyProps));
        for props in sources {
            for (key, value) in props.namespace_entries(namespace) {
                rendered.entry(key).or_insert(value);
            }
        }
        rendered
    }

    /// Every definition of `key`, in container order, with the fallback last.
    pub fn get_conflicting_prop(&self, key: &str, namespace: Option<&str>) -> Vec<ValueWithDescription> {
        let mut values: Vec<ValueWithDescription> = self
            .props
            .iter()
            .filter_map(|(props, description)| {
                props.get_prop(key, namespace).map(|value| ValueWithDescription {
                    value,
                    description: description.clone(),
                })
            })
            .collect();
        if let Some(value) = self.fallback.get_prop(key, namespace) {
            values.push(ValueWithDescription {
                value,
                description: FALLBACK_DESCRIPTION.to_string(),
            });
        }
        values
    }

    /// All definitions of every key below `namespace`.
    pub fn render_conflicting_map(
        &self,
        namespace: &str,
    ) -> BTreeMap<String, Vec<ValueWithDescription>> {
        let mut rendered: BTreeMap<String, Vec<ValueWithDescription>> = BTreeMap::new();
        for (props, description) in &self.props {
            for (key, value) in props.namespace_entries(namespace) {
                rendered.entry(key).or_default().push(ValueWithDescription {
                    value,
                    description: description.clone(),
                });
            }
        }
        for (key, value) in self.fallback.namespace_entries(namespace) {
            rendered.entry(key).or_default().push(ValueWithDescription {
                value,
                description: FALLBACK_DESCRIPTION.to_string(),
            });
        }
        rendered
    }

    pub fn any_props_has_namespace(&self, namespace: &str) -> bool {
        let namespace = normalize_path(namespace);
        self.props
            .iter()
            .any(|(props, _)| props.contains_namespace(&namespace))
            || self.fallback.contains_namespace(&namespace)
    }

    /// Full normalized fallback key for `key` in `namespace`.
    pub fn fallback_key(key: &str, namespace: Option<&str>) -> crate::Result<String> {
        normalize_key(namespace, key)
    }
}
