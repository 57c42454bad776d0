//! Batch runner.
//!
//! Turns manifests or live resources into [`AttributesRecord`]s, evaluates
//! each through a [`ParallelAdmission`] and collects the results keyed by
//! kind, namespace and name.

pub mod inspect;
pub mod live;
pub mod manifest;
pub mod registry;

pub use inspect::{ClusterInspector, InspectOptions, InspectResults, NamespaceSummary};
pub use live::ResourceArgs;
pub use registry::{KindMapping, KindRegistry};

use std::collections::BTreeMap;

use futures::{StreamExt, TryStreamExt, stream};
use kube::Client;
use kube::core::{DynamicObject, GroupVersionKind};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::admission::{
    AttributesRecord, GroupVersionResource, ParallelAdmission, ParallelAdmissionResult, gvk_string,
};
use crate::error::{Error, Result};
use crate::namespace::{ClientNamespaceGetter, LocalNamespaceGetter, NamespaceGetter};
use crate::policy::LevelEvaluator;

/// Default number of objects evaluated at once
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Results of a run, ordered by key
pub type CheckResults = BTreeMap<String, ParallelAdmissionResult>;

/// What to check and how
#[derive(Debug, Clone)]
pub struct CheckerOptions {
    /// Manifest files or directories; `-` reads stdin
    pub filenames: Vec<String>,
    /// Walk directories recursively
    pub recursive: bool,
    /// Positional resource arguments for live mode
    pub resource_args: Vec<String>,
    pub namespace: Option<String>,
    /// Put namespaced manifests without a namespace into `namespace`
    pub default_namespaces: bool,
    pub exempt_namespaces: Vec<String>,
    pub exempt_runtime_classes: Vec<String>,
    pub concurrency: usize,
}

impl Default for CheckerOptions {
    fn default() -> Self {
        Self {
            filenames: Vec::new(),
            recursive: false,
            resource_args: Vec::new(),
            namespace: None,
            default_namespaces: false,
            exempt_namespaces: Vec::new(),
            exempt_runtime_classes: Vec::new(),
            concurrency: DEFAULT_CONCURRENCY,
        }
    }
}

impl CheckerOptions {
    /// Local mode reads manifests and never contacts a cluster
    pub fn is_local(&self) -> bool {
        !self.filenames.is_empty()
    }

    fn namespace_override(&self) -> Option<&str> {
        self.namespace.as_deref().filter(|ns| !ns.is_empty())
    }

    /// Collect every setup problem
    pub fn validate(&self, has_client: bool) -> Vec<String> {
        let mut errors = Vec::new();

        if self.filenames.is_empty() && self.resource_args.is_empty() {
            errors.push(
                "you must specify either --filename or the type of resource to check".to_string(),
            );
        }
        if !self.filenames.is_empty() && !self.resource_args.is_empty() {
            errors.push("cannot specify both --filename and resource arguments".to_string());
        }
        if !self.is_local() && !has_client {
            errors.push("missing kube client".to_string());
        }
        if self.default_namespaces && self.namespace_override().is_none() {
            errors.push(
                "cannot specify --default-namespaces without also specifying a value for --namespace"
                    .to_string(),
            );
        }
        if self.concurrency == 0 {
            errors.push("--concurrency must be at least 1".to_string());
        }

        errors
    }
}

/// An object with its kind and resource identity resolved
#[derive(Debug, Clone)]
pub struct ResolvedObject {
    pub object: DynamicObject,
    pub kind: GroupVersionKind,
    pub resource: GroupVersionResource,
    pub namespaced: bool,
}

impl ResolvedObject {
    /// Resolve a manifest object through the kind registry
    pub fn from_manifest(object: DynamicObject, registry: &KindRegistry) -> Result<Self> {
        let kind = object
            .types
            .as_ref()
            .map(GroupVersionKind::try_from)
            .transpose()
            .map_err(|e| Error::Resolution(e.to_string()))?
            .ok_or_else(|| {
                Error::Resolution(format!(
                    "{:?} is missing apiVersion or kind",
                    object.metadata.name.as_deref().unwrap_or_default()
                ))
            })?;

        let mapping = registry.resolve(&kind);
        if mapping.guessed {
            warn!(kind = %kind.kind, resource = %mapping.resource, "Guessed resource for unregistered kind");
        }

        Ok(Self {
            object,
            kind,
            resource: mapping.resource,
            namespaced: mapping.namespaced,
        })
    }
}

/// Display key of an object
pub fn object_key(attributes: &AttributesRecord) -> String {
    format!(
        "gvk: {:?} - {}/{}",
        gvk_string(&attributes.kind),
        attributes.namespace,
        attributes.name
    )
}

fn is_namespace(object: &DynamicObject) -> bool {
    object
        .types
        .as_ref()
        .is_some_and(|t| t.api_version == "v1" && t.kind == "Namespace")
}

/// Runs Pod Security evaluation over a batch of objects
pub struct Checker {
    options: CheckerOptions,
    client: Option<Client>,
    registry: KindRegistry,
}

impl Checker {
    /// Fails with every setup problem at once
    pub fn new(options: CheckerOptions, client: Option<Client>, registry: KindRegistry) -> Result<Self> {
        let errors = options.validate(client.is_some());
        if !errors.is_empty() {
            return Err(Error::Setup(errors));
        }
        Ok(Self {
            options,
            client,
            registry,
        })
    }

    pub fn options(&self) -> &CheckerOptions {
        &self.options
    }

    /// Evaluate every input object
    pub async fn run(&self, cancel: &CancellationToken) -> Result<CheckResults> {
        if self.options.is_local() {
            return self.run_local(cancel).await;
        }
        match &self.client {
            Some(client) => self.run_live(client, cancel).await,
            None => Err(Error::Setup(vec!["missing kube client".to_string()])),
        }
    }

    async fn run_local(&self, cancel: &CancellationToken) -> Result<CheckResults> {
        let objects = manifest::load(&self.options.filenames, self.options.recursive)?;
        let getter = LocalNamespaceGetter::from_objects(&objects);
        if !self.options.exempt_namespaces.is_empty() {
            warn!("Namespace exemptions only apply when checking live resources");
        }

        let mut records = Vec::new();
        for object in objects {
            if is_namespace(&object) {
                continue;
            }
            let resolved = ResolvedObject::from_manifest(object, &self.registry)?;
            records.push(self.local_attributes(resolved)?);
        }
        debug!(objects = records.len(), namespaces = getter.len(), "Resolved local objects");

        let admission = ParallelAdmission::new(getter)
            .with_exempt_runtime_classes(self.options.exempt_runtime_classes.iter().cloned());
        evaluate_all(&admission, records, self.options.concurrency, cancel).await
    }

    fn local_attributes(&self, mut resolved: ResolvedObject) -> Result<AttributesRecord> {
        let has_namespace = resolved
            .object
            .metadata
            .namespace
            .as_deref()
            .is_some_and(|ns| !ns.is_empty());

        if !resolved.namespaced {
            resolved.object.metadata.namespace = None;
        } else if !has_namespace {
            match self.options.namespace_override() {
                Some(ns) if self.options.default_namespaces => {
                    resolved.object.metadata.namespace = Some(ns.to_string());
                }
                _ => {
                    return Err(Error::Resolution(format!(
                        "\"{}/{}\" is missing namespace in its definition",
                        resolved.kind.kind,
                        resolved.object.metadata.name.as_deref().unwrap_or_default()
                    )));
                }
            }
        }

        Ok(AttributesRecord::for_create(
            resolved.object,
            resolved.kind,
            resolved.resource,
        ))
    }

    async fn run_live(&self, client: &Client, cancel: &CancellationToken) -> Result<CheckResults> {
        let args = ResourceArgs::parse(&self.options.resource_args)?;
        let namespace = self
            .options
            .namespace_override()
            .unwrap_or_else(|| client.default_namespace())
            .to_string();

        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            fetched = live::fetch(client, &args, Some(&namespace)) => fetched?,
        };
        let records = fetched
            .into_iter()
            .map(|r| AttributesRecord::for_create(r.object, r.kind, r.resource))
            .collect();

        let getter = ClientNamespaceGetter::new(client.clone())
            .with_exempt_namespaces(self.options.exempt_namespaces.iter().cloned());
        let admission = ParallelAdmission::new(getter)
            .with_exempt_runtime_classes(self.options.exempt_runtime_classes.iter().cloned());
        evaluate_all(&admission, records, self.options.concurrency, cancel).await
    }
}

/// Evaluate records with at most `concurrency` in flight.
///
/// The first lookup error or cancellation fails the whole batch.
pub async fn evaluate_all<G, E>(
    admission: &ParallelAdmission<G, E>,
    records: Vec<AttributesRecord>,
    concurrency: usize,
    cancel: &CancellationToken,
) -> Result<CheckResults>
where
    G: NamespaceGetter,
    E: LevelEvaluator + 'static,
{
    stream::iter(records)
        .map(|attributes| async move {
            let result = admission.validate(cancel, &attributes).await?;
            let key = object_key(&attributes);
            info!(key = %key, outcome = %result.outcome, "Evaluated object");
            Ok::<_, Error>((key, result))
        })
        .buffer_unordered(concurrency.max(1))
        .try_collect()
        .await
}
