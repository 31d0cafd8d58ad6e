//! The object client seam
//!
//! Code that talks to the cluster depends on [`ObjectClient`] instead of a
//! concrete client type. Production wiring passes a [`KubeClient`]; unit tests
//! pass a [`FakeClient`](crate::fake::FakeClient).

pub mod kube_client;

pub use kube_client::{KubeClient, KubeStatusWriter};

use std::fmt;

use async_trait::async_trait;
use kube::api::{DeleteParams, GetParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::ObjectList;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::key::ObjectKey;
use crate::Result;

/// Any statically typed resource the client can store
///
/// Covers k8s-openapi types and kube-derive custom resources.
pub trait Object:
    Resource<DynamicType = ()> + Clone + fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
}

impl<K> Object for K where
    K: Resource<DynamicType = ()>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Operations exposed by the client, used in logs and for fault injection
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    Create,
    Get,
    Update,
    Delete,
    List,
    StatusUpdate,
    StatusPatch,
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verb::Create => "create",
            Verb::Get => "get",
            Verb::Update => "update",
            Verb::Delete => "delete",
            Verb::List => "list",
            Verb::StatusUpdate => "status-update",
            Verb::StatusPatch => "status-patch",
        };
        f.write_str(s)
    }
}

/// Create, get, update, delete and list objects, and reach the status subresource
#[async_trait]
pub trait ObjectClient: Send + Sync {
    /// Handle returned by [`ObjectClient::status`]
    type Status: StatusWriter;

    /// Persist a new object and return the stored copy
    async fn create<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K>;

    /// Fetch the object identified by `key`
    async fn get<K: Object>(&self, key: &ObjectKey, gp: &GetParams) -> Result<K>;

    /// Replace an existing object with the desired state in `obj`
    async fn update<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K>;

    /// Writer scoped to the status subresource
    fn status(&self) -> Self::Status;

    /// Delete the object identified by `obj`'s metadata
    async fn delete<K: Object>(&self, obj: &K, dp: &DeleteParams) -> Result<()>;

    /// List objects of kind `K`, in one namespace or across all of them
    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        lp: &ListParams,
    ) -> Result<ObjectList<K>>;
}

/// Writes to the status subresource only
#[async_trait]
pub trait StatusWriter: Send + Sync {
    /// Replace the status of an existing object
    async fn update<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K>;

    /// Patch the status of the object identified by `key`
    async fn patch<K, P>(&self, key: &ObjectKey, patch: &Patch<P>, pp: &PatchParams) -> Result<K>
    where
        K: Object,
        P: Serialize + fmt::Debug + Send + Sync;
}
