//! Restricted controls: current pod hardening practice.

use std::collections::BTreeSet;

use super::{CheckResult, describe_containers, describe_subjects, quote_all};
use crate::policy::pod_spec::PodContext;

/// Volume sources allowed at the restricted level, by their manifest field name
const ALLOWED_VOLUME_TYPES: &[&str] = &[
    "configMap",
    "csi",
    "downwardAPI",
    "emptyDir",
    "ephemeral",
    "persistentVolumeClaim",
    "projected",
    "secret",
];

const ALLOWED_SECCOMP_TYPES: &[&str] = &["RuntimeDefault", "Localhost"];

/// Linux-only controls are skipped for pods that declare a Windows OS.
///
/// Checks that override a baseline check fall back to it instead, so a
/// Windows pod never passes restricted while failing baseline.
fn is_windows(pod: &PodContext) -> bool {
    pod.spec.os.as_ref().is_some_and(|os| os.name == "windows")
}

pub(super) fn volume_types(pod: &PodContext) -> CheckResult {
    let mut problems = Vec::new();

    for volume in pod.spec.volumes.iter().flatten() {
        let source = match serde_json::to_value(volume) {
            Ok(serde_json::Value::Object(fields)) => fields
                .keys()
                .find(|k| k.as_str() != "name")
                .cloned()
                .unwrap_or_default(),
            _ => String::new(),
        };
        if source.is_empty() {
            // An empty source defaults to emptyDir
            continue;
        }
        if !ALLOWED_VOLUME_TYPES.contains(&source.as_str()) {
            problems.push(format!(
                "volume {:?} uses restricted volume type {:?}",
                volume.name, source
            ));
        }
    }

    if problems.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden("restricted volume types", problems.join("; "))
}

pub(super) fn allow_privilege_escalation(pod: &PodContext) -> CheckResult {
    if is_windows(pod) {
        return CheckResult::allowed();
    }
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| {
            c.security_context
                .and_then(|sc| sc.allow_privilege_escalation)
                != Some(false)
        })
        .map(|c| c.name)
        .collect();

    if names.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden(
        "allowPrivilegeEscalation != false",
        format!(
            "{} must set securityContext.allowPrivilegeEscalation=false",
            describe_containers(&names)
        ),
    )
}

pub(super) fn run_as_non_root(pod: &PodContext) -> CheckResult {
    let pod_value = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.run_as_non_root);

    let mut explicit = Vec::new();
    let mut implicit = Vec::new();
    for container in pod.containers() {
        match container.security_context.and_then(|sc| sc.run_as_non_root) {
            Some(false) => explicit.push(container.name),
            None if pod_value != Some(true) => implicit.push(container.name),
            _ => {}
        }
    }

    let mut problems = Vec::new();
    if pod_value == Some(false) {
        problems.push("pod must not set securityContext.runAsNonRoot=false".to_string());
    }
    if !explicit.is_empty() {
        problems.push(format!(
            "{} must not set securityContext.runAsNonRoot=false",
            describe_containers(&explicit)
        ));
    }
    if !implicit.is_empty() {
        problems.push(format!(
            "pod or {} must set securityContext.runAsNonRoot=true",
            describe_containers(&implicit)
        ));
    }

    if problems.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden("runAsNonRoot != true", problems.join("; "))
}

pub(super) fn run_as_user(pod: &PodContext) -> CheckResult {
    let pod_root = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.run_as_user)
        == Some(0);
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| c.security_context.and_then(|sc| sc.run_as_user) == Some(0))
        .map(|c| c.name)
        .collect();

    if !pod_root && names.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden(
        "runAsUser=0",
        format!(
            "{} must not set runAsUser=0",
            describe_subjects(pod_root, &names)
        ),
    )
}

pub(super) fn seccomp(pod: &PodContext) -> CheckResult {
    if is_windows(pod) {
        return super::baseline::seccomp(pod);
    }
    let pod_type = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.seccomp_profile.as_ref())
        .map(|p| p.type_.as_str());
    let pod_valid = pod_type.is_some_and(|t| ALLOWED_SECCOMP_TYPES.contains(&t));

    let mut explicit = Vec::new();
    let mut implicit = Vec::new();
    for container in pod.containers() {
        let container_type = container
            .security_context
            .and_then(|sc| sc.seccomp_profile.as_ref())
            .map(|p| p.type_.as_str());
        match container_type {
            Some(t) if !ALLOWED_SECCOMP_TYPES.contains(&t) => explicit.push(container.name),
            None if !pod_valid => implicit.push(container.name),
            _ => {}
        }
    }

    let mut problems = Vec::new();
    if let Some(t) = pod_type
        && !pod_valid
    {
        problems.push(format!(
            "pod must not set securityContext.seccompProfile.type to {t:?}"
        ));
    }
    if !explicit.is_empty() {
        problems.push(format!(
            "{} must not set securityContext.seccompProfile.type to a value other than \"RuntimeDefault\" or \"Localhost\"",
            describe_containers(&explicit)
        ));
    }
    if !implicit.is_empty() {
        problems.push(format!(
            "pod or {} must set securityContext.seccompProfile.type to \"RuntimeDefault\" or \"Localhost\"",
            describe_containers(&implicit)
        ));
    }

    if problems.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden("seccompProfile", problems.join("; "))
}

pub(super) fn capabilities(pod: &PodContext) -> CheckResult {
    if is_windows(pod) {
        return super::baseline::capabilities(pod);
    }
    let mut missing_drop = Vec::new();
    let mut adders = Vec::new();
    let mut added = BTreeSet::new();

    for container in pod.containers() {
        let caps = container
            .security_context
            .and_then(|sc| sc.capabilities.as_ref());

        let drops_all = caps
            .and_then(|c| c.drop.as_ref())
            .is_some_and(|drop| drop.iter().any(|d| d == "ALL"));
        if !drops_all {
            missing_drop.push(container.name);
        }

        let mut offends = false;
        for cap in caps.and_then(|c| c.add.as_ref()).into_iter().flatten() {
            if cap != "NET_BIND_SERVICE" {
                added.insert(cap.as_str());
                offends = true;
            }
        }
        if offends {
            adders.push(container.name);
        }
    }

    let mut problems = Vec::new();
    if !missing_drop.is_empty() {
        problems.push(format!(
            "{} must set securityContext.capabilities.drop=[\"ALL\"]",
            describe_containers(&missing_drop)
        ));
    }
    if !adders.is_empty() {
        let added: Vec<&str> = added.into_iter().collect();
        problems.push(format!(
            "{} must not include {} in securityContext.capabilities.add",
            describe_containers(&adders),
            quote_all(&added)
        ));
    }

    if problems.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden("unrestricted capabilities", problems.join("; "))
}
