//! Cluster-wide inspection.
//!
//! Evaluates what already runs in the cluster and reports, per namespace,
//! the strictest level every object in it satisfies: the most restrictive
//! `enforce` label the namespace could carry without rejecting its current
//! workloads.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use k8s_openapi::api::core::v1::Namespace;
use kube::Client;
use kube::api::{Api, ListParams};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::live::{self, ResourceArgs};
use super::{CheckResults, DEFAULT_CONCURRENCY, evaluate_all, object_key};
use crate::admission::{AttributesRecord, ParallelAdmission, ParallelAdmissionResult};
use crate::error::{Error, LookupError, Result};
use crate::namespace::{NamespaceExemption, NamespaceGetter};
use crate::policy::{Level, LevelEvaluator};

/// Resource type inspected when none is given
pub const DEFAULT_INSPECT_TYPE: &str = "pods";

/// Summaries keyed by namespace name
pub type InspectResults = BTreeMap<String, NamespaceSummary>;

/// What a namespace runs, reduced to one level
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NamespaceSummary {
    /// Strictest level every evaluated object passes; `None` when an object passes none
    pub level: Option<Level>,
    /// The whole namespace is exempt from evaluation
    pub exempt: bool,
    /// Objects found in the namespace
    pub objects: usize,
    /// Objects skipped through a runtimeClass exemption
    pub exempt_objects: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_level: Option<Level>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enforce_version: Option<String>,
}

impl NamespaceSummary {
    /// An empty namespace could enforce anything
    fn new(context: &NamespaceExemption) -> Self {
        Self {
            level: Some(Level::Restricted),
            exempt: context.exempt,
            objects: 0,
            exempt_objects: 0,
            enforce_level: context.enforce_level,
            enforce_version: context.enforce_version.clone(),
        }
    }

    fn record(&mut self, result: &ParallelAdmissionResult) {
        self.objects += 1;
        if result.is_exempt() {
            self.exempt_objects += 1;
            return;
        }
        // None orders below every level
        self.level = self.level.min(result.strictest_level());
    }

    /// Whether the current enforce label admits every object, if labelled
    pub fn admits_current_workloads(&self) -> Option<bool> {
        let enforced = self.enforce_level?;
        Some(self.exempt || self.level.is_some_and(|level| level >= enforced))
    }
}

impl fmt::Display for NamespaceSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.exempt {
            return f.write_str("exempt");
        }
        match self.level {
            Some(level) => write!(f, "{level}"),
            None => f.write_str("no level satisfies every object"),
        }
    }
}

/// What to inspect and how
#[derive(Debug, Clone)]
pub struct InspectOptions {
    /// Inspect one namespace instead of the whole cluster
    pub namespace: Option<String>,
    pub resource_types: Vec<String>,
    pub exempt_namespaces: Vec<String>,
    pub exempt_runtime_classes: Vec<String>,
    pub concurrency: usize,
}

impl Default for InspectOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            resource_types: vec![DEFAULT_INSPECT_TYPE.to_string()],
            exempt_namespaces: Vec::new(),
            exempt_runtime_classes: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl InspectOptions {
    /// Collect every setup problem
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.resource_types.is_empty() {
            errors.push("at least one resource type must be inspected".to_string());
        }
        if self.resource_types.iter().any(|t| t.trim().is_empty()) {
            errors.push("resource types must not be empty".to_string());
        }
        if self.concurrency == 0 {
            errors.push("--concurrency must be at least 1".to_string());
        }
        errors
    }
}

/// Namespaces already listed from the cluster, served without further requests
struct ListedNamespaces {
    namespaces: HashMap<String, NamespaceExemption>,
}

impl ListedNamespaces {
    fn new(namespaces: &[NamespaceExemption]) -> Self {
        Self {
            namespaces: namespaces
                .iter()
                .map(|ns| (ns.namespace.clone(), ns.clone()))
                .collect(),
        }
    }
}

impl NamespaceGetter for ListedNamespaces {
    async fn resolve(&self, namespace: &str) -> std::result::Result<NamespaceExemption, LookupError> {
        // Created after the listing; nothing is known about its labels
        Ok(self
            .namespaces
            .get(namespace)
            .cloned()
            .unwrap_or_else(|| NamespaceExemption::unlabeled(namespace)))
    }
}

/// Evaluates everything running in the cluster, grouped by namespace
pub struct ClusterInspector {
    options: InspectOptions,
    client: Client,
}

impl ClusterInspector {
    /// Fails with every setup problem at once
    pub fn new(options: InspectOptions, client: Client) -> Result<Self> {
        let errors = options.validate();
        if !errors.is_empty() {
            return Err(Error::Setup(errors));
        }
        Ok(Self { options, client })
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<InspectResults> {
        let (namespaces, records) = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            collected = self.collect() => collected?,
        };
        info!(
            namespaces = namespaces.len(),
            objects = records.len(),
            "Inspecting cluster"
        );

        let admission = ParallelAdmission::new(ListedNamespaces::new(&namespaces))
            .with_exempt_runtime_classes(self.options.exempt_runtime_classes.iter().cloned());
        inspect(&admission, namespaces, records, self.options.concurrency, cancel).await
    }

    async fn collect(&self) -> Result<(Vec<NamespaceExemption>, Vec<AttributesRecord>)> {
        let namespaces = self.namespaces().await?;

        let mut records = Vec::new();
        for resource_type in &self.options.resource_types {
            let args = ResourceArgs {
                resource_type: resource_type.clone(),
                names: Vec::new(),
            };
            let fetched = live::fetch(&self.client, &args, self.options.namespace.as_deref()).await?;
            records.extend(
                fetched
                    .into_iter()
                    .filter(|r| r.namespaced)
                    .map(|r| AttributesRecord::for_create(r.object, r.kind, r.resource)),
            );
        }
        Ok((namespaces, records))
    }

    async fn namespaces(&self) -> Result<Vec<NamespaceExemption>> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        let items = match self.options.namespace.as_deref() {
            Some(ns) => vec![
                api.get(ns)
                    .await
                    .map_err(|e| LookupError::from_kube(ns, &e))?,
            ],
            None => api.list(&ListParams::default()).await?.items,
        };

        Ok(items
            .iter()
            .filter_map(|ns| {
                let name = ns.metadata.name.as_deref()?;
                let exempt = self.options.exempt_namespaces.iter().any(|e| e == name);
                Some(NamespaceExemption::from_labels(
                    name,
                    ns.metadata.labels.as_ref(),
                    exempt,
                ))
            })
            .collect())
    }
}

/// Evaluate `records` and reduce the results per namespace.
///
/// Every namespace in `namespaces` gets a summary even when it runs nothing.
pub async fn inspect<G, E>(
    admission: &ParallelAdmission<G, E>,
    namespaces: Vec<NamespaceExemption>,
    records: Vec<AttributesRecord>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<InspectResults>
where
    G: NamespaceGetter,
    E: LevelEvaluator + 'static,
{
    let owners: Vec<(String, String)> = records
        .iter()
        .filter(|attributes| !attributes.is_cluster_scoped())
        .map(|attributes| (object_key(attributes), attributes.namespace.clone()))
        .collect();
    let results = evaluate_all(admission, records, concurrency, cancel).await?;

    Ok(summarize(&namespaces, &owners, &results))
}

fn summarize(
    namespaces: &[NamespaceExemption],
    owners: &[(String, String)],
    results: &CheckResults,
) -> InspectResults {
    let mut summaries: InspectResults = namespaces
        .iter()
        .map(|ns| (ns.namespace.clone(), NamespaceSummary::new(ns)))
        .collect();

    for (key, namespace) in owners {
        let Some(result) = results.get(key) else {
            continue;
        };
        summaries
            .entry(namespace.clone())
            .or_insert_with(|| NamespaceSummary::new(&NamespaceExemption::unlabeled(namespace)))
            .record(result);
    }
    debug!(namespaces = summaries.len(), "Summarized namespaces");
    summaries
}
