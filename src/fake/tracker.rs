//! In-memory object store behind the fake client
//!
//! Objects are held as JSON so one tracker can serve every resource type.

use std::collections::BTreeMap;

use chrono::{SecondsFormat, Utc};
use kube::api::Preconditions;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use tracing::debug;

use crate::fake::selector::{FieldSelector, LabelSelector};
use crate::key::ObjectKey;
use crate::{Error, Result};

/// Characters the API server draws `generateName` suffixes from
const NAME_SUFFIX_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";
const NAME_SUFFIX_LEN: usize = 5;

const CONFLICT_MESSAGE: &str =
    "the object has been modified; please apply your changes to the latest version and try again";

/// apiVersion and kind of a stored object
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub(crate) struct ResourceType {
    pub api_version: String,
    pub kind: String,
}

impl ResourceType {
    pub fn of<K: kube::Resource<DynamicType = ()>>() -> Self {
        Self {
            api_version: K::api_version(&()).into_owned(),
            kind: K::kind(&()).into_owned(),
        }
    }

    /// Read the type from a manifest document
    pub fn from_value(obj: &Value) -> Result<Self> {
        let field = |name: &str| {
            obj.get(name)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .ok_or_else(|| Error::InvalidObject(format!("manifest is missing {}", name)))
        };

        Ok(Self {
            api_version: field("apiVersion")?,
            kind: field("kind")?,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct StoreKey {
    resource: ResourceType,
    key: ObjectKey,
}

impl StoreKey {
    fn new(resource: &ResourceType, key: &ObjectKey) -> Self {
        Self {
            resource: resource.clone(),
            key: ObjectKey {
                namespace: key.namespace().map(str::to_string),
                name: key.name.clone(),
            },
        }
    }
}

#[derive(Default)]
struct State {
    objects: BTreeMap<StoreKey, Value>,
    resource_version: u64,
}

impl State {
    fn next_resource_version(&mut self) -> u64 {
        self.resource_version += 1;
        self.resource_version
    }

    fn stored(&self, resource: &ResourceType, key: &ObjectKey) -> Result<Value> {
        self.objects
            .get(&StoreKey::new(resource, key))
            .cloned()
            .ok_or_else(|| Error::NotFound {
                kind: resource.kind.clone(),
                key: key.clone(),
            })
    }
}

/// Shared object store
#[derive(Default)]
pub(crate) struct Tracker {
    state: RwLock<State>,
}

impl Tracker {
    pub async fn create(&self, resource: &ResourceType, mut obj: Value, dry_run: bool) -> Result<Value> {
        let mut state = self.state.write().await;

        let meta = metadata_mut(&mut obj)?;
        if string_field(meta, "resourceVersion").is_some() {
            return Err(Error::InvalidObject(
                "resourceVersion can not be set for Create requests".to_string(),
            ));
        }

        if string_field(meta, "name").is_none() {
            let prefix = string_field(meta, "generateName").ok_or_else(|| {
                Error::InvalidObject("metadata.name or metadata.generateName is required".to_string())
            })?;
            let name = format!("{}{}", prefix, name_suffix(state.resource_version + 1));
            meta.insert("name".to_string(), Value::String(name));
        }

        let key = key_of(&obj);
        let store_key = StoreKey::new(resource, &key);
        if state.objects.contains_key(&store_key) {
            return Err(Error::AlreadyExists {
                kind: resource.kind.clone(),
                key,
            });
        }

        // Dry runs never assign a resourceVersion
        let sequence = if dry_run {
            state.resource_version + 1
        } else {
            state.next_resource_version()
        };

        set_type(&mut obj, resource);
        let meta = metadata_mut(&mut obj)?;
        meta.insert("uid".to_string(), Value::String(fake_uid(sequence)));
        meta.insert("creationTimestamp".to_string(), Value::String(now()));
        meta.insert("generation".to_string(), Value::from(1));
        if !dry_run {
            meta.insert("resourceVersion".to_string(), Value::String(sequence.to_string()));
            state.objects.insert(store_key, obj.clone());
            debug!("Tracker stored {} {} at version {}", resource.kind, key, sequence);
        }

        Ok(obj)
    }

    pub async fn get(&self, resource: &ResourceType, key: &ObjectKey) -> Result<Value> {
        self.state.read().await.stored(resource, key)
    }

    pub async fn update(&self, resource: &ResourceType, mut obj: Value, dry_run: bool) -> Result<Value> {
        let mut state = self.state.write().await;

        let key = key_of(&obj);
        let stored = state.stored(resource, &key)?;
        check_resource_version(resource, &key, &obj, &stored)?;

        // Server-owned fields come from the stored copy
        let stored_meta = stored.get("metadata").and_then(Value::as_object);
        let copy = |field: &str| stored_meta.and_then(|m| m.get(field)).cloned();
        let (uid, created, deleted) = (copy("uid"), copy("creationTimestamp"), copy("deletionTimestamp"));
        let mut generation = copy("generation").and_then(|g| g.as_i64()).unwrap_or(1);

        match stored.get("status") {
            Some(status) => {
                as_object_mut(&mut obj)?.insert("status".to_string(), status.clone());
            }
            None => {
                as_object_mut(&mut obj)?.remove("status");
            }
        }
        if desired_state(&obj) != desired_state(&stored) {
            generation += 1;
        }

        set_type(&mut obj, resource);
        let meta = metadata_mut(&mut obj)?;
        for (field, value) in [("uid", uid), ("creationTimestamp", created), ("deletionTimestamp", deleted)] {
            match value {
                Some(value) => meta.insert(field.to_string(), value),
                None => meta.remove(field),
            };
        }
        meta.insert("generation".to_string(), Value::from(generation));

        // A dry run reports the version the store already holds
        if dry_run {
            if let Some(current) = copy("resourceVersion") {
                meta.insert("resourceVersion".to_string(), current);
            }
            return Ok(obj);
        }

        let version = state.next_resource_version();
        meta.insert("resourceVersion".to_string(), Value::String(version.to_string()));

        let store_key = StoreKey::new(resource, &key);
        if meta.contains_key("deletionTimestamp") && finalizers(&obj).is_empty() {
            state.objects.remove(&store_key);
            debug!("Tracker removed {} {} after its last finalizer", resource.kind, key);
        } else {
            state.objects.insert(store_key, obj.clone());
        }

        Ok(obj)
    }

    pub async fn update_status(&self, resource: &ResourceType, obj: Value, dry_run: bool) -> Result<Value> {
        let mut state = self.state.write().await;

        let key = key_of(&obj);
        let stored = state.stored(resource, &key)?;
        check_resource_version(resource, &key, &obj, &stored)?;

        let status = obj.get("status").cloned();
        self.write_status(&mut state, resource, key, stored, status, dry_run)
    }

    pub async fn patch_status(
        &self,
        resource: &ResourceType,
        key: &ObjectKey,
        patch: &Value,
        dry_run: bool,
    ) -> Result<Value> {
        let mut state = self.state.write().await;

        let stored = state.stored(resource, key)?;
        let mut patched = stored.clone();
        json_patch::merge(&mut patched, patch);
        check_resource_version(resource, key, &patched, &stored)?;

        let status = patched.get("status").cloned();
        self.write_status(&mut state, resource, key.clone(), stored, status, dry_run)
    }

    fn write_status(
        &self,
        state: &mut State,
        resource: &ResourceType,
        key: ObjectKey,
        mut obj: Value,
        status: Option<Value>,
        dry_run: bool,
    ) -> Result<Value> {
        match status {
            Some(status) => {
                as_object_mut(&mut obj)?.insert("status".to_string(), status);
            }
            None => {
                as_object_mut(&mut obj)?.remove("status");
            }
        }

        if dry_run {
            return Ok(obj);
        }

        let version = state.next_resource_version();
        metadata_mut(&mut obj)?.insert("resourceVersion".to_string(), Value::String(version.to_string()));
        state.objects.insert(
            StoreKey::new(resource, &key),
            obj.clone(),
        );
        Ok(obj)
    }

    pub async fn delete(
        &self,
        resource: &ResourceType,
        key: &ObjectKey,
        preconditions: Option<&Preconditions>,
        dry_run: bool,
    ) -> Result<()> {
        let mut state = self.state.write().await;

        let mut stored = state.stored(resource, key)?;
        if let Some(pre) = preconditions {
            let stored_meta = metadata_mut(&mut stored)?;
            let checks = [("uid", &pre.uid), ("resourceVersion", &pre.resource_version)];
            for (field, expected) in checks {
                if let Some(expected) = expected {
                    if string_field(stored_meta, field) != Some(expected.as_str()) {
                        return Err(Error::Conflict {
                            kind: resource.kind.clone(),
                            key: key.clone(),
                            message: format!(
                                "precondition failed: {} in precondition: {}, {} in object meta: {}",
                                field,
                                expected,
                                field,
                                string_field(stored_meta, field).unwrap_or_default()
                            ),
                        });
                    }
                }
            }
        }

        if dry_run {
            return Ok(());
        }

        let store_key = StoreKey::new(resource, key);

        if finalizers(&stored).is_empty() {
            state.objects.remove(&store_key);
            debug!("Tracker deleted {} {}", resource.kind, key);
            return Ok(());
        }

        let meta = metadata_mut(&mut stored)?;
        if !meta.contains_key("deletionTimestamp") {
            let version = state.next_resource_version();
            meta.insert("deletionTimestamp".to_string(), Value::String(now()));
            meta.insert("resourceVersion".to_string(), Value::String(version.to_string()));
            state.objects.insert(store_key, stored);
            debug!("Tracker marked {} {} for deletion pending finalizers", resource.kind, key);
        }

        Ok(())
    }

    /// Matching objects ordered by namespace and name, plus the store's current version
    pub async fn list(
        &self,
        resource: &ResourceType,
        namespace: Option<&str>,
        labels: &LabelSelector,
        fields: &FieldSelector,
    ) -> (Vec<Value>, u64) {
        let state = self.state.read().await;

        let items = state
            .objects
            .iter()
            .filter(|(k, _)| &k.resource == resource)
            .filter(|(k, _)| namespace.map_or(true, |ns| k.key.namespace() == Some(ns)))
            .filter(|(_, obj)| labels.matches(obj) && fields.matches(obj))
            .map(|(_, obj)| obj.clone())
            .collect();

        (items, state.resource_version)
    }
}

fn check_resource_version(resource: &ResourceType, key: &ObjectKey, obj: &Value, stored: &Value) -> Result<()> {
    let incoming = obj
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str)
        .filter(|rv| !rv.is_empty());
    let current = stored.pointer("/metadata/resourceVersion").and_then(Value::as_str);

    match incoming {
        Some(rv) if Some(rv) != current => Err(Error::Conflict {
            kind: resource.kind.clone(),
            key: key.clone(),
            message: CONFLICT_MESSAGE.to_string(),
        }),
        _ => Ok(()),
    }
}

fn key_of(obj: &Value) -> ObjectKey {
    let field = |name: &str| {
        obj.pointer(&format!("/metadata/{}", name))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
    };

    ObjectKey {
        namespace: field("namespace"),
        name: field("name").unwrap_or_default(),
    }
}

/// Everything outside metadata and status
fn desired_state(obj: &Value) -> Value {
    let mut obj = obj.clone();
    if let Some(map) = obj.as_object_mut() {
        for field in ["apiVersion", "kind", "metadata", "status"] {
            map.remove(field);
        }
    }
    obj
}

fn finalizers(obj: &Value) -> Vec<&str> {
    obj.pointer("/metadata/finalizers")
        .and_then(Value::as_array)
        .map(|f| f.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default()
}

fn set_type(obj: &mut Value, resource: &ResourceType) {
    if let Some(map) = obj.as_object_mut() {
        map.insert("apiVersion".to_string(), Value::String(resource.api_version.clone()));
        map.insert("kind".to_string(), Value::String(resource.kind.clone()));
    }
}

fn as_object_mut(obj: &mut Value) -> Result<&mut Map<String, Value>> {
    obj.as_object_mut()
        .ok_or_else(|| Error::InvalidObject("object must serialize to a JSON map".to_string()))
}

fn metadata_mut(obj: &mut Value) -> Result<&mut Map<String, Value>> {
    as_object_mut(obj)?
        .entry("metadata")
        .or_insert_with(|| Value::Object(Map::new()))
        .as_object_mut()
        .ok_or_else(|| Error::InvalidObject("metadata must be a JSON map".to_string()))
}

fn string_field<'a>(meta: &'a Map<String, Value>, field: &str) -> Option<&'a str> {
    meta.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn name_suffix(seed: u64) -> String {
    let base = NAME_SUFFIX_ALPHABET.len() as u64;
    let mut n = seed;
    (0..NAME_SUFFIX_LEN)
        .map(|_| {
            let c = NAME_SUFFIX_ALPHABET[(n % base) as usize] as char;
            n /= base;
            c
        })
        .collect()
}

fn fake_uid(seed: u64) -> String {
    format!("00000000-0000-4000-8000-{:012x}", seed)
}

fn now() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn config_maps() -> ResourceType {
        ResourceType {
            api_version: "v1".to_string(),
            kind: "ConfigMap".to_string(),
        }
    }

    #[test]
    fn name_suffix_is_fixed_length_and_distinct() {
        let a = name_suffix(1);
        let b = name_suffix(2);
        assert_eq!(a.len(), NAME_SUFFIX_LEN);
        assert_ne!(a, b);
    }

    #[test]
    fn desired_state_ignores_metadata_and_status() {
        let a = json!({ "kind": "X", "metadata": { "name": "a" }, "data": { "k": "v" }, "status": 1 });
        let b = json!({ "kind": "X", "metadata": { "name": "b" }, "data": { "k": "v" }, "status": 2 });
        assert_eq!(desired_state(&a), desired_state(&b));
    }

    #[tokio::test]
    async fn create_assigns_server_fields() {
        let tracker = Tracker::default();
        let created = tracker
            .create(&config_maps(), json!({ "metadata": { "name": "a", "namespace": "ns1" } }), false)
            .await
            .unwrap();

        assert_eq!(created["apiVersion"], "v1");
        assert_eq!(created["kind"], "ConfigMap");
        assert_eq!(created["metadata"]["resourceVersion"], "1");
        assert_eq!(created["metadata"]["generation"], 1);
        assert!(created["metadata"]["uid"].is_string());
        assert!(created["metadata"]["creationTimestamp"].is_string());
    }

    #[tokio::test]
    async fn dry_run_create_is_not_stored() {
        let tracker = Tracker::default();
        let key = ObjectKey::namespaced("ns1", "a");
        tracker
            .create(&config_maps(), json!({ "metadata": { "name": "a", "namespace": "ns1" } }), true)
            .await
            .unwrap();

        assert!(tracker.get(&config_maps(), &key).await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_only_returns_requested_type() {
        let tracker = Tracker::default();
        let secrets = ResourceType {
            api_version: "v1".to_string(),
            kind: "Secret".to_string(),
        };
        let obj = json!({ "metadata": { "name": "a", "namespace": "ns1" } });
        tracker.create(&config_maps(), obj.clone(), false).await.unwrap();
        tracker.create(&secrets, obj, false).await.unwrap();

        let (items, version) = tracker
            .list(&secrets, None, &LabelSelector::default(), &FieldSelector::default())
            .await;
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["kind"], "Secret");
        assert_eq!(version, 2);
    }
}
