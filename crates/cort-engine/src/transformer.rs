//! Parameter and object transformers

use cort_core::{DecodedObject, Parameters};

use crate::error::BoxError;

/// Rewrites the parameters before rendering
pub trait ParameterTransformer: Send + Sync {
    fn transform_parameters(
        &self,
        namespace: &str,
        name: &str,
        parameters: Parameters,
    ) -> Result<Parameters, BoxError>;
}

/// Rewrites the decoded object list after generation
pub trait ObjectTransformer: Send + Sync {
    fn transform_objects(
        &self,
        namespace: &str,
        name: &str,
        objects: Vec<DecodedObject>,
    ) -> Result<Vec<DecodedObject>, BoxError>;
}

impl<F> ParameterTransformer for F
where
    F: Fn(&str, &str, Parameters) -> Result<Parameters, BoxError> + Send + Sync,
{
    fn transform_parameters(
        &self,
        namespace: &str,
        name: &str,
        parameters: Parameters,
    ) -> Result<Parameters, BoxError> {
        self(namespace, name, parameters)
    }
}

impl<F> ObjectTransformer for F
where
    F: Fn(&str, &str, Vec<DecodedObject>) -> Result<Vec<DecodedObject>, BoxError> + Send + Sync,
{
    fn transform_objects(
        &self,
        namespace: &str,
        name: &str,
        objects: Vec<DecodedObject>,
    ) -> Result<Vec<DecodedObject>, BoxError> {
        self(namespace, name, objects)
    }
}

/// Places namespaced objects without a namespace into the deployment namespace
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultNamespace;

impl ObjectTransformer for DefaultNamespace {
    fn transform_objects(
        &self,
        namespace: &str,
        _name: &str,
        mut objects: Vec<DecodedObject>,
    ) -> Result<Vec<DecodedObject>, BoxError> {
        for object in &mut objects {
            object.set_namespace_if_missing(namespace);
        }
        Ok(objects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_closure_parameter_transformer() {
        let transformer = |_: &str, name: &str, mut parameters: Parameters| -> Result<Parameters, BoxError> {
            parameters.set("fullname", json!(format!("{}-app", name)))?;
            Ok(parameters)
        };

        let out = transformer
            .transform_parameters("apps", "shop", Parameters::new())
            .unwrap();
        assert_eq!(out.get("fullname"), Some(&json!("shop-app")));
    }

    #[test]
    fn test_default_namespace() {
        let objects = vec![
            DecodedObject::from_value(json!({
                "apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "a"}
            }))
            .unwrap(),
            DecodedObject::from_value(json!({
                "apiVersion": "v1", "kind": "ConfigMap", "metadata": {"name": "b", "namespace": "other"}
            }))
            .unwrap(),
        ];

        let out = DefaultNamespace.transform_objects("apps", "shop", objects).unwrap();
        assert_eq!(out[0].key().namespace, "apps");
        assert_eq!(out[0].body().pointer("/metadata/namespace"), Some(&json!("apps")));
        assert_eq!(out[1].key().namespace, "other");
    }

    #[test]
    fn test_default_namespace_skips_cluster_scoped() {
        let objects = vec![
            DecodedObject::from_value(json!({
                "apiVersion": "v1", "kind": "Namespace", "metadata": {"name": "prod"}
            }))
            .unwrap(),
            DecodedObject::from_value(json!({
                "apiVersion": "rbac.authorization.k8s.io/v1", "kind": "ClusterRole", "metadata": {"name": "reader"}
            }))
            .unwrap(),
        ];

        let out = DefaultNamespace.transform_objects("apps", "shop", objects).unwrap();
        assert_eq!(out[0].key().namespace, "");
        assert!(out[0].body().pointer("/metadata/namespace").is_none());
        assert_eq!(out[0].key().to_string(), "v1/Namespace prod");
        assert_eq!(out[1].key().namespace, "");
        assert!(out[1].body().pointer("/metadata/namespace").is_none());
    }
}
