//! Namespace context for purely local checks.

use std::collections::{BTreeMap, HashMap};

use kube::core::DynamicObject;
use tracing::debug;

use super::{NamespaceExemption, NamespaceGetter};
use crate::error::LookupError;

/// Namespace getter that never talks to a cluster.
///
/// Every namespace resolves as non-exempt. Labels are taken from Namespace
/// objects supplied alongside the workloads, and unknown namespaces resolve
/// as unlabeled.
#[derive(Debug, Clone, Default)]
pub struct LocalNamespaceGetter {
    labels: HashMap<String, BTreeMap<String, String>>,
}

impl LocalNamespaceGetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare labels for a namespace
    pub fn with_namespace(mut self, name: &str, labels: BTreeMap<String, String>) -> Self {
        self.labels.insert(name.to_string(), labels);
        self
    }

    /// Collect labels from Namespace objects, ignoring every other kind
    pub fn from_objects<'a>(objects: impl IntoIterator<Item = &'a DynamicObject>) -> Self {
        let mut getter = Self::new();
        for obj in objects {
            let is_namespace = obj
                .types
                .as_ref()
                .is_some_and(|t| t.kind == "Namespace" && t.api_version == "v1");
            if let (true, Some(name)) = (is_namespace, obj.metadata.name.as_deref()) {
                debug!(namespace = %name, "Using labels from local Namespace manifest");
                getter = getter.with_namespace(name, obj.metadata.labels.clone().unwrap_or_default());
            }
        }
        getter
    }

    /// Number of namespaces with declared labels
    pub(crate) fn len(&self) -> usize {
        self.labels.len()
    }
}

impl NamespaceGetter for LocalNamespaceGetter {
    async fn resolve(&self, namespace: &str) -> Result<NamespaceExemption, LookupError> {
        Ok(NamespaceExemption::from_labels(
            namespace,
            self.labels.get(namespace),
            false,
        ))
    }
}
