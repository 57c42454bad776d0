//! Parallel multi-level admission.
//!
//! [`ParallelAdmission::validate`] evaluates one object against every Pod
//! Security level at once:
//!
//! 1. The namespace context is resolved through the run-wide cache.
//! 2. Exempt namespaces and exempt runtime classes short-circuit.
//! 3. One task per level is spawned into a `JoinSet` and all are joined.
//! 4. Verdicts are reduced in `Level::ALL` order, never completion order.
//!
//! Cancellation races both the namespace lookup and the join loop. A
//! cancelled call aborts the outstanding level tasks and returns
//! [`Error::Cancelled`] rather than a partial result.

mod attributes;
mod result;

pub use attributes::{AttributesRecord, GroupVersionResource, gvk_string};
pub use result::{Exemption, Outcome, ParallelAdmissionResult};

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::error::{Error, Result};
use crate::namespace::{NamespaceCache, NamespaceGetter};
use crate::policy::{Level, LevelEvaluator, LevelVerdict, PodSecurityEvaluator, pod_spec};

/// Evaluates objects against every level concurrently.
///
/// Safe to share between concurrent evaluations of different objects: the
/// namespace cache is the only state, and it is written once per namespace.
pub struct ParallelAdmission<G, E = PodSecurityEvaluator> {
    namespaces: NamespaceCache<G>,
    evaluator: Arc<E>,
    exempt_runtime_classes: BTreeSet<String>,
}

impl<G: NamespaceGetter> ParallelAdmission<G> {
    /// Evaluator using the standard Pod Security check table
    pub fn new(getter: G) -> Self {
        Self {
            namespaces: NamespaceCache::new(getter),
            evaluator: Arc::new(PodSecurityEvaluator),
            exempt_runtime_classes: BTreeSet::new(),
        }
    }
}

impl<G, E> ParallelAdmission<G, E>
where
    G: NamespaceGetter,
    E: LevelEvaluator + 'static,
{
    /// Replace the level evaluator
    pub fn with_evaluator<E2: LevelEvaluator + 'static>(
        self,
        evaluator: E2,
    ) -> ParallelAdmission<G, E2> {
        ParallelAdmission {
            namespaces: self.namespaces,
            evaluator: Arc::new(evaluator),
            exempt_runtime_classes: self.exempt_runtime_classes,
        }
    }

    /// Exempt pods running under the given runtime classes
    pub fn with_exempt_runtime_classes(
        mut self,
        classes: impl IntoIterator<Item = String>,
    ) -> Self {
        self.exempt_runtime_classes.extend(classes);
        self
    }

    /// The run-wide namespace cache
    pub fn namespaces(&self) -> &NamespaceCache<G> {
        &self.namespaces
    }

    /// Evaluate one object against every level.
    ///
    /// Returns a lookup error when the namespace cannot be resolved and
    /// [`Error::Cancelled`] when `cancel` fires first. Per-level failures
    /// are reported as failing verdicts, never as errors.
    #[instrument(skip_all, fields(kind = %attributes.kind.kind, namespace = %attributes.namespace, name = %attributes.name))]
    pub async fn validate(
        &self,
        cancel: &CancellationToken,
        attributes: &AttributesRecord,
    ) -> Result<ParallelAdmissionResult> {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let namespace = if attributes.is_cluster_scoped() {
            None
        } else {
            let resolved = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(Error::Cancelled),
                resolved = self.namespaces.resolve(&attributes.namespace) => resolved?,
            };
            Some(resolved)
        };

        if let Some(ns) = &namespace
            && ns.exempt
        {
            debug!("Namespace is exempt, skipping evaluation");
            return Ok(ParallelAdmissionResult::exempt(Exemption::Namespace(
                ns.namespace.clone(),
            )));
        }

        if let Some(class) = pod_spec::runtime_class_name(&attributes.kind.kind, &attributes.object)
            && self.exempt_runtime_classes.contains(&class)
        {
            debug!(runtime_class = %class, "RuntimeClass is exempt, skipping evaluation");
            return Ok(ParallelAdmissionResult::exempt(Exemption::RuntimeClass(
                class,
            )));
        }

        let verdicts = self.evaluate_levels(cancel, attributes).await?;
        let result = ParallelAdmissionResult::reduce(verdicts);

        Ok(match namespace {
            Some(ns) => {
                result.with_namespace_labels(ns.enforce_level, ns.enforce_version.clone())
            }
            None => result,
        })
    }

    async fn evaluate_levels(
        &self,
        cancel: &CancellationToken,
        attributes: &AttributesRecord,
    ) -> Result<BTreeMap<Level, LevelVerdict>> {
        let mut tasks = JoinSet::new();
        for level in Level::ALL {
            let evaluator = Arc::clone(&self.evaluator);
            let attributes = attributes.clone();
            tasks.spawn(async move {
                debug!(level = %level, "Dispatching level evaluation");
                (level, evaluator.evaluate(level, &attributes))
            });
        }

        let mut verdicts = BTreeMap::new();
        let mut failures = Vec::new();
        loop {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tasks.abort_all();
                    return Err(Error::Cancelled);
                }
                joined = tasks.join_next() => joined,
            };

            match joined {
                Some(Ok((level, verdict))) => {
                    verdicts.insert(level, verdict);
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Level evaluation task failed");
                    failures.push(e.to_string());
                }
                None => break,
            }
        }

        // Levels whose task failed have no verdict yet
        for level in Level::ALL {
            verdicts.entry(level).or_insert_with(|| {
                LevelVerdict::denied(vec![format!(
                    "evaluation did not complete: {}",
                    failures.join("; ")
                )])
            });
        }

        Ok(verdicts)
    }
}
