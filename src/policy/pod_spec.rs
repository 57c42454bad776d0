//! Locating the pod spec inside workload objects.
//!
//! Pods carry their spec directly; controllers carry a pod template whose
//! metadata and spec are what the pods they create will run with.

use k8s_openapi::api::core::v1::{
    Container, ContainerPort, EphemeralContainer, PodSpec, SecurityContext,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kube::core::DynamicObject;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur when extracting a pod spec from an object
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("kind {0:?} does not carry a pod spec")]
    Unsupported(String),
    #[error("missing required field {0}")]
    MissingField(String),
    #[error("malformed {path}: {source}")]
    Malformed {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Pod metadata and spec as the kubelet would see them
#[derive(Debug, Clone, Default)]
pub struct PodContext {
    pub metadata: ObjectMeta,
    pub spec: PodSpec,
}

/// Path from the object root to its pod template, `None` for non pod-bearing kinds
fn template_path(kind: &str) -> Option<&'static [&'static str]> {
    match kind {
        "Pod" => Some(&[]),
        "PodTemplate" => Some(&["template"]),
        "Deployment" | "ReplicaSet" | "StatefulSet" | "DaemonSet" | "Job"
        | "ReplicationController" => Some(&["spec", "template"]),
        "CronJob" => Some(&["spec", "jobTemplate", "spec", "template"]),
        _ => None,
    }
}

/// Whether objects of this kind carry a pod spec
pub fn is_pod_bearing(kind: &str) -> bool {
    template_path(kind).is_some()
}

fn lookup<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(root, |value, key| value.get(key))
}

/// Extract pod metadata and spec from a pod or workload object
pub fn extract(kind: &str, object: &DynamicObject) -> Result<PodContext, ExtractError> {
    let path = template_path(kind).ok_or_else(|| ExtractError::Unsupported(kind.to_string()))?;

    if path.is_empty() {
        let spec = object
            .data
            .get("spec")
            .ok_or_else(|| ExtractError::MissingField("spec".to_string()))?;
        return Ok(PodContext {
            metadata: object.metadata.clone(),
            spec: decode(spec.clone(), "spec")?,
        });
    }

    let joined = path.join(".");
    let template = lookup(&object.data, path).ok_or_else(|| ExtractError::MissingField(joined.clone()))?;

    let metadata = match template.get("metadata") {
        Some(meta) => decode(meta.clone(), &format!("{joined}.metadata"))?,
        None => ObjectMeta::default(),
    };
    let spec = template
        .get("spec")
        .ok_or_else(|| ExtractError::MissingField(format!("{joined}.spec")))?;

    Ok(PodContext {
        metadata,
        spec: decode(spec.clone(), &format!("{joined}.spec"))?,
    })
}

fn decode<T: serde::de::DeserializeOwned>(value: Value, path: &str) -> Result<T, ExtractError> {
    serde_json::from_value(value).map_err(|source| ExtractError::Malformed {
        path: path.to_string(),
        source,
    })
}

/// `runtimeClassName` of the pod an object would create, without a full decode
pub fn runtime_class_name(kind: &str, object: &DynamicObject) -> Option<String> {
    let path = template_path(kind)?;
    lookup(&object.data, path)?
        .get("spec")?
        .get("runtimeClassName")?
        .as_str()
        .map(str::to_string)
}

/// Borrowed view over the fields shared by regular and ephemeral containers
#[derive(Debug, Clone, Copy)]
pub struct ContainerRef<'a> {
    pub name: &'a str,
    pub security_context: Option<&'a SecurityContext>,
    pub ports: &'a [ContainerPort],
}

impl<'a> From<&'a Container> for ContainerRef<'a> {
    fn from(c: &'a Container) -> Self {
        Self {
            name: &c.name,
            security_context: c.security_context.as_ref(),
            ports: c.ports.as_deref().unwrap_or_default(),
        }
    }
}

impl<'a> From<&'a EphemeralContainer> for ContainerRef<'a> {
    fn from(c: &'a EphemeralContainer) -> Self {
        Self {
            name: &c.name,
            security_context: c.security_context.as_ref(),
            ports: c.ports.as_deref().unwrap_or_default(),
        }
    }
}

impl PodContext {
    /// Every container in the pod: init containers, containers, then ephemeral containers
    pub fn containers(&self) -> impl Iterator<Item = ContainerRef<'_>> {
        let init = self.spec.init_containers.iter().flatten().map(ContainerRef::from);
        let regular = self.spec.containers.iter().map(ContainerRef::from);
        let ephemeral = self
            .spec
            .ephemeral_containers
            .iter()
            .flatten()
            .map(ContainerRef::from);
        init.chain(regular).chain(ephemeral)
    }
}
