//! Namespace context for Pod Security evaluation.
//!
//! A namespace contributes two facts to an evaluation: whether it is exempt
//! from enforcement, and which level (if any) it currently enforces through
//! its `pod-security.kubernetes.io/enforce` label.
//!
//! Two providers exist:
//! - [`LocalNamespaceGetter`]: no cluster access, labels come from manifests
//! - [`ClientNamespaceGetter`]: one namespace `GET` against the cluster
//!
//! [`NamespaceCache`] wraps either so each namespace is resolved once per run.

mod cache;
mod live;
mod local;

pub use cache::NamespaceCache;
pub use live::ClientNamespaceGetter;
pub use local::LocalNamespaceGetter;

use std::collections::BTreeMap;
use std::future::Future;

use tracing::warn;

use crate::error::LookupError;
use crate::policy::Level;

/// Namespace label selecting the enforced level
pub const LABEL_ENFORCE: &str = "pod-security.kubernetes.io/enforce";
/// Namespace label pinning the enforced policy version
pub const LABEL_ENFORCE_VERSION: &str = "pod-security.kubernetes.io/enforce-version";

/// Resolved Pod Security context of one namespace
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamespaceExemption {
    /// Namespace name
    pub namespace: String,
    /// Whether objects in this namespace skip evaluation entirely
    pub exempt: bool,
    /// Level the namespace enforces, if labelled with a valid level
    pub enforce_level: Option<Level>,
    /// Version the namespace pins its enforced level to
    pub enforce_version: Option<String>,
}

impl NamespaceExemption {
    /// Context for a namespace with no Pod Security labels
    pub fn unlabeled(namespace: &str) -> Self {
        Self {
            namespace: namespace.to_string(),
            ..Default::default()
        }
    }

    /// Build the context from namespace labels
    pub fn from_labels(
        namespace: &str,
        labels: Option<&BTreeMap<String, String>>,
        exempt: bool,
    ) -> Self {
        let mut context = Self::unlabeled(namespace);
        context.exempt = exempt;

        let Some(labels) = labels else {
            return context;
        };

        if let Some(value) = labels.get(LABEL_ENFORCE) {
            match value.parse::<Level>() {
                Ok(level) => context.enforce_level = Some(level),
                Err(e) => warn!(namespace = %namespace, error = %e, "Ignoring invalid enforce label"),
            }
        }
        context.enforce_version = labels.get(LABEL_ENFORCE_VERSION).cloned();

        context
    }
}

/// Resolves namespace names into their Pod Security context
pub trait NamespaceGetter: Send + Sync {
    /// Resolve one namespace.
    ///
    /// Implementations talking to a cluster must issue at most one request
    /// per call; caching across calls is the job of [`NamespaceCache`].
    fn resolve(
        &self,
        namespace: &str,
    ) -> impl Future<Output = Result<NamespaceExemption, LookupError>> + Send;
}
