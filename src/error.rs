//! Error types for psa-checker.
//!
//! Errors are classified so the binary can tell setup problems, namespace
//! lookup failures and cancellation apart. Per-level evaluation problems are
//! never errors: they surface as failing verdicts.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to resolve a namespace's Pod Security context.
///
/// Cloneable so a single cached lookup result can be handed to every
/// evaluation waiting on the same namespace.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The namespace does not exist in the cluster
    #[error("namespace {namespace:?} not found")]
    NotFound { namespace: String },

    /// The lookup request itself failed (network, auth, server error)
    #[error("namespace lookup failed for {namespace:?}: {message}")]
    Failed { namespace: String, message: String },
}

impl LookupError {
    /// Name of the namespace the lookup was for
    pub fn namespace(&self) -> &str {
        match self {
            LookupError::NotFound { namespace } | LookupError::Failed { namespace, .. } => {
                namespace
            }
        }
    }

    /// Build a lookup error from a Kubernetes client error
    pub fn from_kube(namespace: &str, err: &kube::Error) -> Self {
        match err {
            kube::Error::Api(resp) if resp.code == 404 => LookupError::NotFound {
                namespace: namespace.to_string(),
            },
            other => LookupError::Failed {
                namespace: namespace.to_string(),
                message: other.to_string(),
            },
        }
    }
}

/// Error type for psa-checker operations
#[derive(Error, Debug)]
pub enum Error {
    /// One or more problems with the command setup, reported together
    #[error("there were errors while setting up the command: {}", .0.join("; "))]
    Setup(Vec<String>),

    /// An input object could not be turned into an admission check
    #[error("{0}")]
    Resolution(String),

    /// Namespace context could not be resolved
    #[error(transparent)]
    Lookup(#[from] LookupError),

    /// The caller cancelled the evaluation before it completed
    #[error("evaluation cancelled")]
    Cancelled,

    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// Kubeconfig could not be loaded
    #[error("Kubeconfig error: {0}")]
    Kubeconfig(#[from] kube::config::KubeconfigError),

    /// A manifest file could not be read
    #[error("failed to read {}: {source}", path.display())]
    Manifest {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A manifest document could not be decoded
    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },

    /// Writing results failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Check if this error is a cancellation rather than a failure
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    /// Check if this error indicates a not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Lookup(LookupError::NotFound { .. }))
            || matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }

    /// Check if this error was raised before any evaluation started
    pub fn is_setup(&self) -> bool {
        matches!(self, Error::Setup(_) | Error::Kubeconfig(_))
    }
}

/// Result type alias for psa-checker operations
pub type Result<T> = std::result::Result<T, Error>;
