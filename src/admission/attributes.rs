//! Description of a single admission check.

use std::fmt;
use std::sync::Arc;

use kube::core::admission::Operation;
use kube::core::{DynamicObject, GroupVersionKind};
use serde::Serialize;

/// Identity of the API resource an object is served from
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct GroupVersionResource {
    pub group: String,
    pub version: String,
    pub resource: String,
}

impl GroupVersionResource {
    pub fn new(group: &str, version: &str, resource: &str) -> Self {
        Self {
            group: group.to_string(),
            version: version.to_string(),
            resource: resource.to_string(),
        }
    }
}

impl fmt::Display for GroupVersionResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{}/{}", self.version, self.resource)
        } else {
            write!(f, "{}/{}/{}", self.group, self.version, self.resource)
        }
    }
}

/// Everything needed to evaluate one object.
///
/// Built once by the caller and never mutated; the object payload is shared
/// with every level task through an `Arc`.
#[derive(Debug, Clone)]
pub struct AttributesRecord {
    /// Object namespace, empty for cluster-scoped objects
    pub namespace: String,
    pub name: String,
    pub resource: GroupVersionResource,
    pub kind: GroupVersionKind,
    pub operation: Operation,
    pub object: Arc<DynamicObject>,
}

impl AttributesRecord {
    /// Attributes for creating `object`.
    ///
    /// Namespace and name are taken from the object metadata.
    pub fn for_create(
        object: DynamicObject,
        kind: GroupVersionKind,
        resource: GroupVersionResource,
    ) -> Self {
        Self {
            namespace: object.metadata.namespace.clone().unwrap_or_default(),
            name: object.metadata.name.clone().unwrap_or_default(),
            resource,
            kind,
            operation: Operation::Create,
            object: Arc::new(object),
        }
    }

    pub fn is_cluster_scoped(&self) -> bool {
        self.namespace.is_empty()
    }
}

/// Render a kind as `<group>/<version>, Kind=<Kind>`, omitting an empty group
pub fn gvk_string(gvk: &GroupVersionKind) -> String {
    if gvk.group.is_empty() {
        format!("/{}, Kind={}", gvk.version, gvk.kind)
    } else {
        format!("{}/{}, Kind={}", gvk.group, gvk.version, gvk.kind)
    }
}
