//! Object identity

use std::fmt;

use kube::Resource;
use serde::{Deserialize, Serialize};

/// Identifies a single stored object by namespace and name
///
/// A `None` namespace addresses a cluster-scoped object.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectKey {
    pub namespace: Option<String>,
    pub name: String,
}

impl ObjectKey {
    /// Key for a namespaced object
    ///
    /// A blank namespace yields the same key as [`ObjectKey::cluster`].
    pub fn namespaced(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: non_blank(namespace.into()),
            name: name.into(),
        }
    }

    /// Key for a cluster-scoped object
    pub fn cluster(name: impl Into<String>) -> Self {
        Self {
            namespace: None,
            name: name.into(),
        }
    }

    /// Key taken from an object's metadata
    ///
    /// An empty namespace is treated as cluster scope and a missing name
    /// becomes the empty string.
    pub fn from_object<K: Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            namespace: meta.namespace.clone().and_then(non_blank),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.trim().is_empty())
    }
}

fn non_blank(namespace: String) -> Option<String> {
    Some(namespace).filter(|ns| !ns.trim().is_empty())
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.namespace() {
            Some(ns) => write!(f, "{}/{}", ns, self.name),
            None => f.write_str(&self.name),
        }
    }
}

impl From<(&str, &str)> for ObjectKey {
    fn from((namespace, name): (&str, &str)) -> Self {
        Self::namespaced(namespace, name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ConfigMap, Namespace};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn key_from_namespaced_object() {
        let cm = ConfigMap {
            metadata: ObjectMeta {
                name: Some("obj1".to_string()),
                namespace: Some("ns1".to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        let key = ObjectKey::from_object(&cm);
        assert_eq!(key, ObjectKey::namespaced("ns1", "obj1"));
        assert_eq!(key.to_string(), "ns1/obj1");
    }

    #[test]
    fn key_from_cluster_object() {
        let ns = Namespace {
            metadata: ObjectMeta {
                name: Some("team-a".to_string()),
                namespace: Some(String::new()),
                ..Default::default()
            },
            ..Default::default()
        };

        let key = ObjectKey::from_object(&ns);
        assert_eq!(key, ObjectKey::cluster("team-a"));
        assert_eq!(key.namespace(), None);
        assert_eq!(key.to_string(), "team-a");
    }

    #[test]
    fn key_equality_is_by_value() {
        assert_eq!(ObjectKey::from(("ns1", "obj1")), ObjectKey::namespaced("ns1", "obj1"));
        assert_ne!(ObjectKey::namespaced("ns1", "obj1"), ObjectKey::namespaced("ns2", "obj1"));
    }

    #[test]
    fn blank_namespace_is_cluster_scope() {
        assert_eq!(ObjectKey::from(("", "team-a")), ObjectKey::cluster("team-a"));
        assert_eq!(ObjectKey::namespaced("  ", "team-a"), ObjectKey::cluster("team-a"));
        assert_eq!(ObjectKey::from(("", "team-a")).to_string(), "team-a");

        let literal = ObjectKey {
            namespace: Some(String::new()),
            name: "team-a".to_string(),
        };
        assert_eq!(literal.namespace(), None);
    }
}
