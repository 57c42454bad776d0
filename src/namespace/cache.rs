//! Single-flight namespace cache.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OnceCell};
use tracing::debug;

use super::{NamespaceExemption, NamespaceGetter};
use crate::error::LookupError;

type Entry = Arc<OnceCell<Result<Arc<NamespaceExemption>, LookupError>>>;

/// Caches namespace resolutions for the duration of a run.
///
/// The first caller for a namespace performs the lookup; concurrent callers
/// wait on the same cell and observe the same value. Failures are cached
/// too, so a missing namespace is reported identically to every object in it.
pub struct NamespaceCache<G> {
    getter: G,
    entries: Mutex<HashMap<String, Entry>>,
}

impl<G: NamespaceGetter> NamespaceCache<G> {
    pub fn new(getter: G) -> Self {
        Self {
            getter,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Resolve a namespace, performing at most one lookup per name
    pub async fn resolve(&self, namespace: &str) -> Result<Arc<NamespaceExemption>, LookupError> {
        let cell = {
            let mut entries = self.entries.lock().await;
            Arc::clone(entries.entry(namespace.to_string()).or_default())
        };

        cell.get_or_init(|| async {
            debug!(namespace = %namespace, "Resolving namespace");
            self.getter.resolve(namespace).await.map(Arc::new)
        })
        .await
        .clone()
    }

    /// Access the wrapped getter
    pub fn getter(&self) -> &G {
        &self.getter
    }

    /// Number of namespaces seen so far
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }
}
