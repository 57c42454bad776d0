//! Explicit registry of known kinds.
//!
//! Built once at startup and passed to the [`Checker`](super::Checker). Kinds
//! not in the registry fall back to a pluralisation guess, which is lossy
//! for irregular plurals but good enough for objects that never touch a
//! cluster.

use std::collections::HashMap;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, ReplicaSet, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{Namespace, Pod, PodTemplate, ReplicationController};
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::Resource;
use kube::core::GroupVersionKind;
use kube::discovery::ApiResource;
use tracing::debug;

use crate::admission::GroupVersionResource;

/// Resource mapping of a kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindMapping {
    pub resource: GroupVersionResource,
    pub namespaced: bool,
    /// True when the mapping came from the pluralisation fallback
    pub guessed: bool,
}

#[derive(Debug, Clone, Default)]
pub struct KindRegistry {
    kinds: HashMap<GroupVersionKind, KindMapping>,
}

impl KindRegistry {
    /// An empty registry; every lookup is guessed
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the core/v1, apps/v1 and batch/v1 workload kinds
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register_namespaced::<Pod>();
        registry.register_namespaced::<PodTemplate>();
        registry.register_namespaced::<ReplicationController>();
        registry.register_namespaced::<Deployment>();
        registry.register_namespaced::<ReplicaSet>();
        registry.register_namespaced::<StatefulSet>();
        registry.register_namespaced::<DaemonSet>();
        registry.register_namespaced::<Job>();
        registry.register_namespaced::<CronJob>();
        registry.register_cluster::<Namespace>();
        registry
    }

    pub fn register_namespaced<K>(&mut self)
    where
        K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
    {
        self.insert::<K>(true);
    }

    pub fn register_cluster<K>(&mut self)
    where
        K: Resource<DynamicType = (), Scope = ClusterResourceScope>,
    {
        self.insert::<K>(false);
    }

    fn insert<K: Resource<DynamicType = ()>>(&mut self, namespaced: bool) {
        let gvk = GroupVersionKind::gvk(&K::group(&()), &K::version(&()), &K::kind(&()));
        let resource = GroupVersionResource::new(&K::group(&()), &K::version(&()), &K::plural(&()));
        self.kinds.insert(
            gvk,
            KindMapping {
                resource,
                namespaced,
                guessed: false,
            },
        );
    }

    /// Map a kind to its resource, guessing for unregistered kinds.
    ///
    /// Guessed kinds are assumed to be namespaced.
    pub fn resolve(&self, gvk: &GroupVersionKind) -> KindMapping {
        if let Some(mapping) = self.kinds.get(gvk) {
            return mapping.clone();
        }

        let guess = ApiResource::from_gvk(gvk);
        debug!(kind = %gvk.kind, resource = %guess.plural, "Guessed resource for unregistered kind");
        KindMapping {
            resource: GroupVersionResource::new(&guess.group, &guess.version, &guess.plural),
            namespaced: true,
            guessed: true,
        }
    }

}
