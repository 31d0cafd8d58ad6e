//! Production client backed by `kube::Client`

use std::fmt;

use async_trait::async_trait;
use kube::api::{DeleteParams, GetParams, ListParams, Patch, PatchParams, PostParams};
use kube::core::{ObjectList, Request};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::client::{Object, ObjectClient, StatusWriter};
use crate::config::ClientConfig;
use crate::key::ObjectKey;
use crate::Result;

/// Forwards every operation to the wrapped `kube::Client`
///
/// Requests are built exactly as `kube::Api` builds them and the API server's
/// answer, success or failure, is returned unchanged.
#[derive(Clone)]
pub struct KubeClient {
    client: kube::Client,
}

impl KubeClient {
    /// Wrap an existing client
    pub fn new(client: kube::Client) -> Self {
        Self { client }
    }

    /// Build a client from the ambient kube config and environment overrides
    pub async fn try_default() -> Result<Self> {
        Self::try_from_config(&ClientConfig::from_env()?).await
    }

    /// Build a client from the ambient kube config with the given overrides
    pub async fn try_from_config(config: &ClientConfig) -> Result<Self> {
        let mut kube_config = kube::Config::infer()
            .await
            .map_err(kube::Error::InferConfig)?;
        config.apply(&mut kube_config);

        info!(
            "Connecting to Kubernetes API server at {} (namespace {})",
            kube_config.cluster_url, kube_config.default_namespace
        );

        let client = kube::Client::try_from(kube_config)?;
        Ok(Self::new(client))
    }

    /// The wrapped client
    pub fn inner(&self) -> &kube::Client {
        &self.client
    }
}

impl fmt::Debug for KubeClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeClient")
            .field("default_namespace", &self.client.default_namespace())
            .finish()
    }
}

impl From<kube::Client> for KubeClient {
    fn from(client: kube::Client) -> Self {
        Self::new(client)
    }
}

fn request_for<K: Object>(namespace: Option<&str>) -> Request {
    Request::new(K::url_path(&(), namespace))
}

#[async_trait]
impl ObjectClient for KubeClient {
    type Status = KubeStatusWriter;

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn create<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K> {
        let key = ObjectKey::from_object(obj);
        let req = request_for::<K>(key.namespace())
            .create(pp, serde_json::to_vec(obj)?)
            .map_err(kube::Error::BuildRequest)?;

        let created = self.client.request::<K>(req).await?;
        debug!("Created {} {}", K::kind(&()), ObjectKey::from_object(&created));
        Ok(created)
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %key))]
    async fn get<K: Object>(&self, key: &ObjectKey, gp: &GetParams) -> Result<K> {
        let req = request_for::<K>(key.namespace())
            .get(&key.name, gp)
            .map_err(kube::Error::BuildRequest)?;

        let obj = self.client.request::<K>(req).await?;
        debug!("Fetched {} {}", K::kind(&()), key);
        Ok(obj)
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn update<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K> {
        let key = ObjectKey::from_object(obj);
        let req = request_for::<K>(key.namespace())
            .replace(&key.name, pp, serde_json::to_vec(obj)?)
            .map_err(kube::Error::BuildRequest)?;

        let updated = self.client.request::<K>(req).await?;
        debug!("Updated {} {}", K::kind(&()), key);
        Ok(updated)
    }

    fn status(&self) -> KubeStatusWriter {
        KubeStatusWriter {
            client: self.client.clone(),
        }
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn delete<K: Object>(&self, obj: &K, dp: &DeleteParams) -> Result<()> {
        let key = ObjectKey::from_object(obj);
        let req = request_for::<K>(key.namespace())
            .delete(&key.name, dp)
            .map_err(kube::Error::BuildRequest)?;

        // The server answers with either the object (pending finalizers) or a Status
        self.client.request_status::<K>(req).await?;
        debug!("Deleted {} {}", K::kind(&()), key);
        Ok(())
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), namespace = namespace.unwrap_or("*")))]
    async fn list<K: Object>(
        &self,
        namespace: Option<&str>,
        lp: &ListParams,
    ) -> Result<ObjectList<K>> {
        let namespace = namespace.filter(|ns| !ns.trim().is_empty());
        let req = request_for::<K>(namespace)
            .list(lp)
            .map_err(kube::Error::BuildRequest)?;

        let list = self.client.request::<ObjectList<K>>(req).await?;
        debug!("Listed {} {} objects", list.items.len(), K::kind(&()));
        Ok(list)
    }
}

/// Status subresource writer sharing the wrapped `kube::Client`
#[derive(Clone)]
pub struct KubeStatusWriter {
    client: kube::Client,
}

#[async_trait]
impl StatusWriter for KubeStatusWriter {
    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %ObjectKey::from_object(obj)))]
    async fn update<K: Object>(&self, obj: &K, pp: &PostParams) -> Result<K> {
        let key = ObjectKey::from_object(obj);
        let req = request_for::<K>(key.namespace())
            .replace_subresource("status", &key.name, pp, serde_json::to_vec(obj)?)
            .map_err(kube::Error::BuildRequest)?;

        let updated = self.client.request::<K>(req).await?;
        debug!("Updated status of {} {}", K::kind(&()), key);
        Ok(updated)
    }

    #[instrument(skip_all, fields(kind = %K::kind(&()), key = %key))]
    async fn patch<K, P>(&self, key: &ObjectKey, patch: &Patch<P>, pp: &PatchParams) -> Result<K>
    where
        K: Object,
        P: Serialize + fmt::Debug + Send + Sync,
    {
        let req = request_for::<K>(key.namespace())
            .patch_subresource("status", &key.name, pp, patch)
            .map_err(kube::Error::BuildRequest)?;

        let patched = self.client.request::<K>(req).await?;
        debug!("Patched status of {} {}", K::kind(&()), key);
        Ok(patched)
    }
}
