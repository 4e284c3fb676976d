//! Read-only object lookups from templates
//!
//! Templates can read existing cluster objects through `lookup` and
//! `mustLookup`. The helpers are bound per engine instance to an explicit
//! [`ObjectStore`] handle; there is no ambient client.

use minijinja::{Environment, Error, ErrorKind, Value};
use serde_json::Value as JsonValue;
use std::collections::BTreeMap;
use std::sync::Arc;

use cort_core::{DecodedObject, TypeInfo, object::split_api_version};

use crate::error::LookupError;

/// Synchronous, read-only access to existing objects
pub trait ObjectStore: Send + Sync {
    /// Fetch an object, `None` when it does not exist
    fn get(
        &self,
        type_info: &TypeInfo,
        namespace: &str,
        name: &str,
    ) -> Result<Option<JsonValue>, LookupError>;
}

/// In-memory object store
///
/// Objects are matched by group, kind, namespace and name; any version of a
/// group is served, as the API server would.
#[derive(Debug, Clone, Default)]
pub struct StaticObjectStore {
    objects: BTreeMap<(String, String, String, String), JsonValue>,
}

impl StaticObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_objects(objects: impl IntoIterator<Item = DecodedObject>) -> Self {
        let mut store = Self::new();
        for object in objects {
            store.insert(object);
        }
        store
    }

    pub fn insert(&mut self, object: DecodedObject) {
        let key = object.key();
        let index = (
            key.group.clone(),
            key.kind.clone(),
            key.namespace.clone(),
            key.name.clone(),
        );
        self.objects.insert(index, object.into_body());
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

impl ObjectStore for StaticObjectStore {
    fn get(
        &self,
        type_info: &TypeInfo,
        namespace: &str,
        name: &str,
    ) -> Result<Option<JsonValue>, LookupError> {
        let index = (
            type_info.group.clone(),
            type_info.kind.clone(),
            namespace.to_string(),
            name.to_string(),
        );
        Ok(self.objects.get(&index).cloned())
    }
}

fn fetch(
    store: &dyn ObjectStore,
    api_version: &str,
    kind: &str,
    namespace: &str,
    name: &str,
) -> Result<Option<JsonValue>, Error> {
    let (group, version) = split_api_version(api_version);
    let type_info = TypeInfo::new(group, version, kind);

    tracing::debug!(%type_info, namespace, name, "template lookup");

    store
        .get(&type_info, namespace, name)
        .map_err(|e| Error::new(ErrorKind::InvalidOperation, format!("lookup failed: {}", e)))
}

/// Register `lookup` and `mustLookup` bound to `store`
///
/// `lookup(apiVersion, kind, namespace, name)` returns the object, or an empty
/// mapping when it does not exist. `mustLookup` fails instead.
pub fn register(env: &mut Environment<'static>, store: Arc<dyn ObjectStore>) {
    let lookup_store = Arc::clone(&store);
    env.add_function(
        "lookup",
        move |api_version: String, kind: String, namespace: String, name: String| {
            let found = fetch(lookup_store.as_ref(), &api_version, &kind, &namespace, &name)?;
            Ok::<_, Error>(Value::from_serialize(
                found.unwrap_or_else(|| JsonValue::Object(serde_json::Map::new())),
            ))
        },
    );

    env.add_function(
        "mustLookup",
        move |api_version: String, kind: String, namespace: String, name: String| {
            match fetch(store.as_ref(), &api_version, &kind, &namespace, &name)? {
                Some(object) => Ok(Value::from_serialize(object)),
                None => Err(Error::new(
                    ErrorKind::InvalidOperation,
                    format!(
                        "object {}/{} {} not found",
                        api_version,
                        kind,
                        if namespace.is_empty() {
                            name
                        } else {
                            format!("{}/{}", namespace, name)
                        }
                    ),
                )),
            }
        },
    );
}
