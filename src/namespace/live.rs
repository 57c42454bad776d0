//! Namespace context read from a live cluster.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::Namespace;
use kube::{Api, Client};
use tracing::{debug, instrument};

use super::{NamespaceExemption, NamespaceGetter};
use crate::error::LookupError;

/// Namespace getter backed by the Kubernetes API.
///
/// Namespaces on the exemption list resolve without any request; every
/// other namespace costs exactly one `GET`.
#[derive(Clone)]
pub struct ClientNamespaceGetter {
    api: Api<Namespace>,
    exempt_namespaces: BTreeSet<String>,
}

impl ClientNamespaceGetter {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
            exempt_namespaces: BTreeSet::new(),
        }
    }

    /// Exempt the given namespaces from evaluation
    pub fn with_exempt_namespaces(mut self, namespaces: impl IntoIterator<Item = String>) -> Self {
        self.exempt_namespaces.extend(namespaces);
        self
    }
}

impl NamespaceGetter for ClientNamespaceGetter {
    #[instrument(skip(self))]
    async fn resolve(&self, namespace: &str) -> Result<NamespaceExemption, LookupError> {
        if self.exempt_namespaces.contains(namespace) {
            debug!("Namespace is on the exemption list");
            return Ok(NamespaceExemption::from_labels(namespace, None, true));
        }

        let ns = self
            .api
            .get(namespace)
            .await
            .map_err(|e| LookupError::from_kube(namespace, &e))?;
        debug!(labels = ?ns.metadata.labels, "Fetched namespace");

        Ok(NamespaceExemption::from_labels(
            namespace,
            ns.metadata.labels.as_ref(),
            false,
        ))
    }
}
