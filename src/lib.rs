//! psa-checker library crate
//!
//! Finds the least privileged Pod Security Standards level a set of
//! workloads can run under. Objects come from manifests or a live cluster,
//! each one is evaluated against every level concurrently, and the per-level
//! verdicts are reduced to a single answer.

pub mod admission;
pub mod checker;
pub mod error;
pub mod namespace;
pub mod output;
pub mod policy;

pub use admission::{
    AttributesRecord, Exemption, GroupVersionResource, Outcome, ParallelAdmission,
    ParallelAdmissionResult,
};
pub use checker::{
    CheckResults, Checker, CheckerOptions, ClusterInspector, InspectOptions, InspectResults,
    KindRegistry, NamespaceSummary,
};
pub use error::{Error, LookupError, Result};
pub use namespace::{
    ClientNamespaceGetter, LocalNamespaceGetter, NamespaceCache, NamespaceExemption,
    NamespaceGetter,
};
pub use policy::{Level, LevelEvaluator, LevelVerdict, PodSecurityEvaluator};
