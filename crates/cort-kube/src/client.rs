//! Object store backed by the Kubernetes API
//!
//! Template lookups are synchronous while `kube` is async. Lookups therefore
//! block the rendering thread through `block_in_place`, which requires the
//! multi-threaded tokio runtime.

use kube::{
    Client,
    api::{Api, DynamicObject},
    core::GroupVersionKind,
    discovery::{Discovery, Scope},
};
use serde_json::Value as JsonValue;
use tokio::runtime::{Handle, RuntimeFlavor};

use cort_core::TypeInfo;
use cort_engine::{LookupError, ObjectStore};

use crate::error::{KubeError, Result};

/// Read-only object store over a live cluster
pub struct KubeObjectStore {
    client: Client,
    /// Cached discovery information
    discovery: Discovery,
    handle: Handle,
}

impl KubeObjectStore {
    /// Create a store, running API discovery once
    pub async fn new(client: Client) -> Result<Self> {
        let discovery = Discovery::new(client.clone())
            .run()
            .await
            .map_err(KubeError::Api)?;

        Ok(Self {
            client,
            discovery,
            handle: Handle::current(),
        })
    }

    /// Create from an existing client and discovery
    pub fn with_discovery(client: Client, discovery: Discovery, handle: Handle) -> Self {
        Self {
            client,
            discovery,
            handle,
        }
    }

    async fn fetch(
        &self,
        type_info: &TypeInfo,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<JsonValue>, LookupError> {
        let gvk = GroupVersionKind::gvk(&type_info.group, &type_info.version, &type_info.kind);
        let (api_resource, capabilities) =
            self.discovery
                .resolve_gvk(&gvk)
                .ok_or_else(|| LookupError::UnknownType {
                    type_info: type_info.clone(),
                })?;

        let api: Api<DynamicObject> = if capabilities.scope == Scope::Namespaced && !namespace.is_empty() {
            Api::namespaced_with(self.client.clone(), namespace, &api_resource)
        } else {
            Api::all_with(self.client.clone(), &api_resource)
        };

        let object = api.get_opt(name).await.map_err(|e| LookupError::Request {
            message: e.to_string(),
        })?;

        object
            .map(|o| serde_json::to_value(o))
            .transpose()
            .map_err(|e| LookupError::Request {
                message: e.to_string(),
            })
    }
}

impl ObjectStore for KubeObjectStore {
    fn get(
        &self,
        type_info: &TypeInfo,
        namespace: &str,
        name: &str,
    ) -> std::result::Result<Option<JsonValue>, LookupError> {
        if self.handle.runtime_flavor() == RuntimeFlavor::CurrentThread {
            return Err(LookupError::Runtime {
                message: "current-thread runtime cannot block on lookups".to_string(),
            });
        }

        tracing::debug!(%type_info, namespace, name, "looking up cluster object");
        tokio::task::block_in_place(|| self.handle.block_on(self.fetch(type_info, namespace, name)))
    }
}
