//! Live resource lookup through API discovery.

use kube::api::{Api, ListParams};
use kube::core::{DynamicObject, GroupVersionKind, TypeMeta};
use kube::discovery::{ApiCapabilities, ApiResource, Discovery, Scope};
use kube::Client;
use tracing::{debug, info};

use super::ResolvedObject;
use crate::admission::GroupVersionResource;
use crate::error::{Error, Result};

/// kubectl short names for the workload resources
const SHORT_NAMES: &[(&str, &str)] = &[
    ("po", "pods"),
    ("rc", "replicationcontrollers"),
    ("deploy", "deployments"),
    ("rs", "replicasets"),
    ("sts", "statefulsets"),
    ("ds", "daemonsets"),
    ("cj", "cronjobs"),
];

/// Positional resource arguments: `TYPE`, `TYPE NAME...` or `TYPE/NAME...`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceArgs {
    pub resource_type: String,
    /// Names to fetch; empty means every object of the type
    pub names: Vec<String>,
}

impl ResourceArgs {
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(first) = args.first() else {
            return Err(Error::Setup(vec![
                "you must specify the type of resource to check".to_string(),
            ]));
        };

        if !first.contains('/') {
            let names = args.iter().skip(1).cloned().collect::<Vec<_>>();
            if let Some(bad) = names.iter().find(|n| n.contains('/')) {
                return Err(Error::Setup(vec![format!(
                    "there is no need to specify a resource type as a separate argument when passing arguments in resource/name form ({bad:?})"
                )]));
            }
            return Ok(Self {
                resource_type: first.clone(),
                names,
            });
        }

        let mut resource_type: Option<&str> = None;
        let mut names = Vec::new();
        for arg in args {
            let Some((kind, name)) = arg.split_once('/').filter(|(k, n)| !k.is_empty() && !n.is_empty())
            else {
                return Err(Error::Setup(vec![format!(
                    "arguments in resource/name form must have a single resource and name: {arg:?}"
                )]));
            };
            match resource_type {
                Some(existing) if existing != kind => {
                    return Err(Error::Setup(vec![format!(
                        "only one resource type may be checked at a time, got {existing:?} and {kind:?}"
                    )]));
                }
                _ => resource_type = Some(kind),
            }
            names.push(name.to_string());
        }

        Ok(Self {
            resource_type: resource_type.unwrap_or_default().to_string(),
            names,
        })
    }
}

/// Split `name.group` and expand short names
fn normalize_type(resource_type: &str) -> (String, Option<String>) {
    let lowered = resource_type.to_lowercase();
    let (name, group) = match lowered.split_once('.') {
        Some((name, group)) => (name.to_string(), Some(group.to_string())),
        None => (lowered, None),
    };
    let name = SHORT_NAMES
        .iter()
        .find(|(short, _)| *short == name)
        .map_or(name, |(_, plural)| plural.to_string());
    (name, group)
}

/// Find the API resource serving `resource_type`
pub async fn discover(
    client: &Client,
    resource_type: &str,
) -> Result<(ApiResource, ApiCapabilities)> {
    let discovery = Discovery::new(client.clone()).run().await?;
    let (name, group) = normalize_type(resource_type);

    for api_group in discovery.groups_alphabetical() {
        if group.as_deref().is_some_and(|g| g != api_group.name()) {
            continue;
        }
        for (resource, caps) in api_group.recommended_resources() {
            if resource.plural == name || resource.kind.to_lowercase() == name {
                debug!(kind = %resource.kind, plural = %resource.plural, "Resolved resource type");
                return Ok((resource, caps));
            }
        }
    }

    Err(Error::Resolution(format!(
        "the server doesn't have a resource type {resource_type:?}"
    )))
}

/// Fetch the objects named by `args` from `namespace`, or from every
/// namespace when `namespace` is `None`
pub async fn fetch(
    client: &Client,
    args: &ResourceArgs,
    namespace: Option<&str>,
) -> Result<Vec<ResolvedObject>> {
    let (resource, caps) = discover(client, &args.resource_type).await?;
    let namespaced = matches!(caps.scope, Scope::Namespaced);
    let api: Api<DynamicObject> = match namespace {
        Some(ns) if namespaced => Api::namespaced_with(client.clone(), ns, &resource),
        _ => Api::all_with(client.clone(), &resource),
    };

    let objects = if args.names.is_empty() {
        api.list(&ListParams::default()).await?.items
    } else {
        let mut objects = Vec::with_capacity(args.names.len());
        for name in &args.names {
            objects.push(api.get(name).await?);
        }
        objects
    };
    info!(kind = %resource.kind, count = objects.len(), "Fetched objects");

    let kind = GroupVersionKind::gvk(&resource.group, &resource.version, &resource.kind);
    let gvr = GroupVersionResource::new(&resource.group, &resource.version, &resource.plural);

    Ok(objects
        .into_iter()
        .map(|mut object| {
            // List items come back without type information
            object.types.get_or_insert_with(|| TypeMeta {
                api_version: resource.api_version.clone(),
                kind: resource.kind.clone(),
            });
            ResolvedObject {
                object,
                kind: kind.clone(),
                resource: gvr.clone(),
                namespaced,
            }
        })
        .collect())
}
