//! In-memory [`ObjectClient`] for unit tests
//!
//! The fake keeps every object in a shared store and mimics the API server
//! behaviour callers observe: resourceVersion conflicts, `AlreadyExists` on
//! duplicate creates, finalizer-gated deletion and label/field selectors.
//!
//! ```rust
//! use k8s_openapi::api::core::v1::ConfigMap;
//! use kube::api::GetParams;
//! use kube_object_client::fake::FakeClient;
//! use kube_object_client::{ObjectClient, ObjectKey};
//!
//! # #[tokio::main]
//! # async fn main() -> kube_object_client::Result<()> {
//! let client = FakeClient::builder()
//!     .with_manifest(
//!         r#"
//! apiVersion: v1
//! kind: ConfigMap
//! metadata:
//!   name: settings
//!   namespace: ns1
//! data:
//!   mode: fast
//! "#,
//!     )
//!     .build()
//!     .await?;
//!
//! let cm: ConfigMap = client
//!     .get(&ObjectKey::namespaced("ns1", "settings"), &GetParams::default())
//!     .await?;
//! assert_eq!(cm.data.unwrap()["mode"], "fast");
//! # Ok(())
//! # }
//! ```

mod selector;
mod tracker;

pub use selector::{FieldSelector, LabelSelector};

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use kube::api::{DeleteParams, GetParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::ObjectList;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, instrument};

use crate::client::{Object, ObjectClient, StatusWriter, Verb};
use crate::key::ObjectKey;
use crate::{Error, Result};

use tracker::{ResourceType, Tracker};

type FailureFn = Box<dyn Fn(&ObjectKey) -> Error + Send + Sync>;

/// Errors to return instead of touching the store, by verb
#[derive(Default)]
struct Failures(HashMap<Verb, FailureFn>);

impl Failures {
    fn check(&self, verb: Verb, key: &ObjectKey) -> Result<()> {
        match self.0.get(&verb) {
            Some(fail) => {
                let err = fail(key);
                debug!("Injecting {} failure for {}: {}", verb, key, err);
                Err(err)
            }
            None => Ok(()),
        }
    }
}

/// In-memory object client
///
/// Clones share the same store, so a test can hand one clone to the code
/// under test and inspect the store through another.
#[derive(Clone, Default)]
pub struct FakeClient {
    tracker: Arc<Tracker>,
    failures: Arc<Failures>,
}

impl FakeClient {
    /// Empty store with no injected failures
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> FakeClientBuilder {
        FakeClientBuilder::new()
    }
}

impl fmt::Debug for FakeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FakeClient")
            .field("injected_failures", &self.failures.0.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn to_value<K: Object>(obj: &K) -> Result<Value> {
    Ok(serde_json::to_value(obj)?)
}

fn from_value<K: Object>(value: Value) -> Result<K> {
    Ok(serde_json::from_value(value)?)
}

fn list_key(namespace: Option<&str>) -> ObjectKey {
    ObjectKey {
        namespace: namespace.map(str::to_string),
        name: String::new(),
    }
}

#[async_trait]
impl ObjectClient for FakeClient {
    type Status = FakeStatusWriter;

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn create<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K> {
        self.failures.check(Verb::Create, &ObjectKey::from_object(obj))?;

        let created = self
            .tracker
            .create(&ResourceType::of::<K>(), to_value(obj)?, pp.dry_run)
            .await?;
        from_value(created)
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %key))]
    async fn get<K: Object>(&self, key: &ObjectKey, _gp: &GetParams) -> Result<K> {
        self.failures.check(Verb::Get, key)?;

        let obj = self.tracker.get(&ResourceType::of::<K>(), key).await?;
        from_value(obj)
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn update<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K> {
        self.failures.check(Verb::Update, &ObjectKey::from_object(obj))?;

        let updated = self
            .tracker
            .update(&ResourceType::of::<K>(), to_value(obj)?, pp.dry_run)
            .await?;
        from_value(updated)
    }

    fn status(&self) -> FakeStatusWriter {
        FakeStatusWriter {
            tracker: Arc::clone(&self.tracker),
            failures: Arc::clone(&self.failures),
        }
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn delete<K: Object>(&self, obj: &K, dp: &DeleteParams) -> Result<()> {
        let key = ObjectKey::from_object(obj);
        self.failures.check(Verb::Delete, &key)?;

        self.tracker
            .delete(
                &ResourceType::of::<K>(),
                &key,
                dp.preconditions.as_ref(),
                dp.dry_run,
            )
            .await
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), namespace = namespace.unwrap_or("*")))]
    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        lp: &ListParams,
    ) -> Result<ObjectList<K>> {
        let namespace = namespace.filter(|ns| !ns.trim().is_empty());
        self.failures.check(Verb::List, &list_key(namespace))?;

        let labels = LabelSelector::parse(lp.label_selector.as_deref().unwrap_or_default())?;
        let fields = FieldSelector::parse(lp.field_selector.as_deref().unwrap_or_default())?;
        let resource = ResourceType::of::<K>();

        let (items, version) = self
            .tracker
            .list(&resource, namespace, &labels, &fields)
            .await;
        debug!("Fake list matched {} {} objects", items.len(), resource.kind);

        from_list(json!({
            "apiVersion": resource.api_version,
            "kind": format!("{}List", resource.kind),
            "metadata": { "resourceVersion": version.to_string() },
            "items": items,
        }))
    }
}

fn from_list<K: Object>(value: Value) -> Result<ObjectList<K>> {
    Ok(serde_json::from_value(value)?)
}

/// Status subresource writer sharing the fake's store
#[derive(Clone)]
pub struct FakeStatusWriter {
    tracker: Arc<Tracker>,
    failures: Arc<Failures>,
}

#[async_trait]
impl StatusWriter for FakeStatusWriter {
    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn update<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K> {
        self.failures
            .check(Verb::StatusUpdate, &ObjectKey::from_object(obj))?;

        let updated = self
            .tracker
            .update_status(&ResourceType::of::<K>(), to_value(obj)?, pp.dry_run)
            .await?;
        from_value(updated)
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %key))]
    async fn patch<K, P>(&self, key: &ObjectKey, patch: &Patch<P>, pp: &PatchParams) -> Result<K>
    where
        K: Object,
        P: Serialize + fmt::Debug + Send + Sync,
    {
        self.failures.check(Verb::StatusPatch, key)?;

        let patch = match patch {
            Patch::Merge(p) | Patch::Apply(p) | Patch::Strategic(p) => serde_json::to_value(p)?,
            _ => {
                return Err(Error::InvalidObject(
                    "fake status patch supports merge, apply and strategic patches".to_string(),
                ))
            }
        };

        let patched = self
            .tracker
            .patch_status(&ResourceType::of::<K>(), key, &patch, pp.dry_run)
            .await?;
        from_value(patched)
    }
}

enum Seed {
    Object(serde_json::Result<(ResourceType, Value)>),
    Manifest(String),
    ManifestFile(PathBuf),
}

/// Builds a [`FakeClient`] with seeded objects and injected failures
#[derive(Default)]
pub struct FakeClientBuilder {
    seeds: Vec<Seed>,
    failures: HashMap<Verb, FailureFn>,
}

impl FakeClientBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed one typed object
    pub fn with_object<K: Object>(mut self, obj: K) -> Self {
        let seed = serde_json::to_value(&obj).map(|value| (ResourceType::of::<K>(), value));
        self.seeds.push(Seed::Object(seed));
        self
    }

    /// Seed several typed objects of one kind
    pub fn with_objects<K: Object>(self, objs: impl IntoIterator<Item = K>) -> Self {
        objs.into_iter().fold(self, |builder, obj| builder.with_object(obj))
    }

    /// Seed every document of a multi-document YAML manifest
    pub fn with_manifest(mut self, yaml: impl Into<String>) -> Self {
        self.seeds.push(Seed::Manifest(yaml.into()));
        self
    }

    /// Seed every document of a YAML manifest file, read at build time
    pub fn with_manifest_file(mut self, path: impl AsRef<Path>) -> Self {
        self.seeds.push(Seed::ManifestFile(path.as_ref().to_path_buf()));
        self
    }

    /// Fail every call of `verb` with the error produced by `fail`
    pub fn fail_on<F>(mut self, verb: Verb, fail: F) -> Self
    where
        F: Fn(&ObjectKey) -> Error + Send + Sync + 'static,
    {
        self.failures.insert(verb, Box::new(fail));
        self
    }

    /// Create the store and load the seeds in order
    pub async fn build(self) -> Result<FakeClient> {
        let tracker = Tracker::default();

        for seed in self.seeds {
            let objects = match seed {
                Seed::Object(object) => vec![object?],
                Seed::Manifest(yaml) => parse_manifest(&yaml)?,
                Seed::ManifestFile(path) => parse_manifest(&tokio::fs::read_to_string(&path).await?)?,
            };

            for (resource, mut value) in objects {
                // Seeds may be copies of live objects; the store assigns its own versions
                if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
                    meta.remove("resourceVersion");
                }
                tracker.create(&resource, value, false).await?;
            }
        }

        Ok(FakeClient {
            tracker: Arc::new(tracker),
            failures: Arc::new(Failures(self.failures)),
        })
    }
}

fn parse_manifest(yaml: &str) -> Result<Vec<(ResourceType, Value)>> {
    let mut objects = Vec::new();
    for document in serde_yaml::Deserializer::from_str(yaml) {
        let value = Value::deserialize(document)?;
        if value.is_null() {
            continue;
        }
        objects.push((ResourceType::from_value(&value)?, value));
    }
    Ok(objects)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_documents_are_split() {
        let objects = parse_manifest(
            r#"
apiVersion: v1
kind: ConfigMap
metadata:
  name: a
---
apiVersion: apps/v1
kind: Deployment
metadata:
  name: b
---
"#,
        )
        .unwrap();

        assert_eq!(objects.len(), 2);
        assert_eq!(objects[0].0.kind, "ConfigMap");
        assert_eq!(objects[1].0.api_version, "apps/v1");
    }

    #[test]
    fn manifest_without_kind_is_rejected() {
        let err = parse_manifest("apiVersion: v1\nmetadata:\n  name: a\n").unwrap_err();
        assert!(err.to_string().contains("kind"));
    }
}
