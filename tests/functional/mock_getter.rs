//! Mock namespace getter for functional tests.
//!
//! Simulates the cluster's namespace endpoint without a Kubernetes API
//! server: namespaces are declared up front, every lookup is counted, and
//! lookups can be slowed down or made to hang to exercise single-flight and
//! cancellation behavior.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use psa_checker::error::LookupError;
use psa_checker::namespace::{LABEL_ENFORCE, NamespaceExemption, NamespaceGetter};

/// What a mocked namespace lookup returns
#[derive(Debug, Clone)]
enum MockNamespace {
    Present(NamespaceExemption),
    Failing(String),
}

#[derive(Debug, Default)]
pub struct MockNamespaceGetter {
    namespaces: HashMap<String, MockNamespace>,
    delay: Option<Duration>,
    hang: bool,
    lookups: AtomicUsize,
}

impl MockNamespaceGetter {
    pub fn new() -> Self {
        Self::default()
    }

    /// An unlabeled, non-exempt namespace
    pub fn with_namespace(mut self, name: &str) -> Self {
        self.namespaces.insert(
            name.to_string(),
            MockNamespace::Present(NamespaceExemption::unlabeled(name)),
        );
        self
    }

    /// A namespace enforcing `level` through its label
    pub fn with_enforced_namespace(mut self, name: &str, level: &str) -> Self {
        let labels: BTreeMap<String, String> =
            [(LABEL_ENFORCE.to_string(), level.to_string())].into();
        self.namespaces.insert(
            name.to_string(),
            MockNamespace::Present(NamespaceExemption::from_labels(name, Some(&labels), false)),
        );
        self
    }

    /// A namespace exempt from evaluation
    pub fn with_exempt_namespace(mut self, name: &str) -> Self {
        self.namespaces.insert(
            name.to_string(),
            MockNamespace::Present(NamespaceExemption::from_labels(name, None, true)),
        );
        self
    }

    /// A namespace whose lookup fails like an unreachable API server
    pub fn with_failing_namespace(mut self, name: &str, message: &str) -> Self {
        self.namespaces
            .insert(name.to_string(), MockNamespace::Failing(message.to_string()));
        self
    }

    /// Delay every lookup
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make every lookup hang forever
    pub fn hanging(mut self) -> Self {
        self.hang = true;
        self
    }

    /// Number of lookups issued so far
    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

impl NamespaceGetter for MockNamespaceGetter {
    async fn resolve(&self, namespace: &str) -> Result<NamespaceExemption, LookupError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.hang {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.namespaces.get(namespace) {
            Some(MockNamespace::Present(context)) => Ok(context.clone()),
            Some(MockNamespace::Failing(message)) => Err(LookupError::Failed {
                namespace: namespace.to_string(),
                message: message.clone(),
            }),
            None => Err(LookupError::NotFound {
                namespace: namespace.to_string(),
            }),
        }
    }
}
