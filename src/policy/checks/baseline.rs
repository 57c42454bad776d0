//! Baseline controls: block known privilege escalations.

use std::collections::BTreeSet;

use k8s_openapi::api::core::v1::SELinuxOptions;

use super::{CheckResult, describe_containers, describe_subjects, quote_all};
use crate::policy::pod_spec::PodContext;

/// Capabilities a container may add at the baseline level
const ALLOWED_CAPABILITIES: &[&str] = &[
    "AUDIT_WRITE",
    "CHOWN",
    "DAC_OVERRIDE",
    "FOWNER",
    "FSETID",
    "KILL",
    "MKNOD",
    "NET_BIND_SERVICE",
    "SETFCAP",
    "SETGID",
    "SETPCAP",
    "SETUID",
    "SYS_CHROOT",
];

/// Namespaced sysctls considered safe
const SAFE_SYSCTLS: &[&str] = &[
    "kernel.shm_rmid_forced",
    "net.ipv4.ip_local_port_range",
    "net.ipv4.ip_unprivileged_port_start",
    "net.ipv4.tcp_syncookies",
    "net.ipv4.ping_group_range",
    "net.ipv4.ip_local_reserved_ports",
    "net.ipv4.tcp_keepalive_time",
    "net.ipv4.tcp_fin_timeout",
    "net.ipv4.tcp_keepalive_intvl",
    "net.ipv4.tcp_keepalive_probes",
];

const ALLOWED_SELINUX_TYPES: &[&str] = &[
    "",
    "container_t",
    "container_init_t",
    "container_kvm_t",
    "container_engine_t",
];

const APPARMOR_ANNOTATION_PREFIX: &str = "container.apparmor.security.beta.kubernetes.io/";

pub(super) fn host_namespaces(pod: &PodContext) -> CheckResult {
    let spec = &pod.spec;
    let mut set = Vec::new();
    if spec.host_network == Some(true) {
        set.push("hostNetwork=true");
    }
    if spec.host_pid == Some(true) {
        set.push("hostPID=true");
    }
    if spec.host_ipc == Some(true) {
        set.push("hostIPC=true");
    }

    if set.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden("host namespaces", set.join(", "))
}

pub(super) fn privileged(pod: &PodContext) -> CheckResult {
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| c.security_context.and_then(|sc| sc.privileged) == Some(true))
        .map(|c| c.name)
        .collect();

    if names.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden(
        "privileged",
        format!(
            "{} must not set securityContext.privileged=true",
            describe_containers(&names)
        ),
    )
}

pub(super) fn capabilities(pod: &PodContext) -> CheckResult {
    let mut names = Vec::new();
    let mut forbidden = BTreeSet::new();

    for container in pod.containers() {
        let added = container
            .security_context
            .and_then(|sc| sc.capabilities.as_ref())
            .and_then(|caps| caps.add.as_ref());
        let mut offends = false;
        for cap in added.into_iter().flatten() {
            if !ALLOWED_CAPABILITIES.contains(&cap.as_str()) {
                forbidden.insert(cap.as_str());
                offends = true;
            }
        }
        if offends {
            names.push(container.name);
        }
    }

    if names.is_empty() {
        return CheckResult::allowed();
    }
    let caps: Vec<&str> = forbidden.into_iter().collect();
    CheckResult::forbidden(
        "non-default capabilities",
        format!(
            "{} must not include {} in securityContext.capabilities.add",
            describe_containers(&names),
            quote_all(&caps)
        ),
    )
}

pub(super) fn host_path_volumes(pod: &PodContext) -> CheckResult {
    let names: Vec<&str> = pod
        .spec
        .volumes
        .iter()
        .flatten()
        .filter(|v| v.host_path.is_some())
        .map(|v| v.name.as_str())
        .collect();

    if names.is_empty() {
        return CheckResult::allowed();
    }
    let noun = if names.len() == 1 { "volume" } else { "volumes" };
    CheckResult::forbidden("hostPath volumes", format!("{} {}", noun, quote_all(&names)))
}

pub(super) fn host_ports(pod: &PodContext) -> CheckResult {
    let mut names = Vec::new();
    let mut ports = BTreeSet::new();

    for container in pod.containers() {
        let mut offends = false;
        for port in container.ports {
            if let Some(host_port) = port.host_port
                && host_port != 0
            {
                ports.insert(host_port);
                offends = true;
            }
        }
        if offends {
            names.push(container.name);
        }
    }

    if names.is_empty() {
        return CheckResult::allowed();
    }
    let ports: Vec<String> = ports.into_iter().map(|p| p.to_string()).collect();
    CheckResult::forbidden(
        "hostPort",
        format!(
            "{} uses hostPort {}",
            describe_containers(&names),
            ports.join(", ")
        ),
    )
}

pub(super) fn windows_host_process(pod: &PodContext) -> CheckResult {
    let pod_level = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.windows_options.as_ref())
        .and_then(|w| w.host_process)
        == Some(true);
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| {
            c.security_context
                .and_then(|sc| sc.windows_options.as_ref())
                .and_then(|w| w.host_process)
                == Some(true)
        })
        .map(|c| c.name)
        .collect();

    if !pod_level && names.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden(
        "hostProcess",
        format!(
            "{} must not set securityContext.windowsOptions.hostProcess=true",
            describe_subjects(pod_level, &names)
        ),
    )
}

fn apparmor_annotation_allowed(value: &str) -> bool {
    value.is_empty() || value == "runtime/default" || value.starts_with("localhost/")
}

pub(super) fn app_armor(pod: &PodContext) -> CheckResult {
    let mut problems = Vec::new();

    for (key, value) in pod.metadata.annotations.iter().flatten() {
        if key.starts_with(APPARMOR_ANNOTATION_PREFIX) && !apparmor_annotation_allowed(value) {
            problems.push(format!("annotation {key}={value:?}"));
        }
    }

    let pod_unconfined = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.app_armor_profile.as_ref())
        .is_some_and(|p| p.type_ == "Unconfined");
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| {
            c.security_context
                .and_then(|sc| sc.app_armor_profile.as_ref())
                .is_some_and(|p| p.type_ == "Unconfined")
        })
        .map(|c| c.name)
        .collect();
    if pod_unconfined || !names.is_empty() {
        problems.push(format!(
            "{} must not set securityContext.appArmorProfile.type to \"Unconfined\"",
            describe_subjects(pod_unconfined, &names)
        ));
    }

    if problems.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden("forbidden AppArmor profile", problems.join("; "))
}

fn se_linux_allowed(options: &SELinuxOptions) -> bool {
    let type_ok = options
        .type_
        .as_deref()
        .is_none_or(|t| ALLOWED_SELINUX_TYPES.contains(&t));
    let user_ok = options.user.as_deref().is_none_or(str::is_empty);
    let role_ok = options.role.as_deref().is_none_or(str::is_empty);
    type_ok && user_ok && role_ok
}

pub(super) fn se_linux(pod: &PodContext) -> CheckResult {
    let pod_level = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.se_linux_options.as_ref())
        .is_some_and(|o| !se_linux_allowed(o));
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| {
            c.security_context
                .and_then(|sc| sc.se_linux_options.as_ref())
                .is_some_and(|o| !se_linux_allowed(o))
        })
        .map(|c| c.name)
        .collect();

    if !pod_level && names.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden(
        "seLinuxOptions",
        format!(
            "{} set forbidden securityContext.seLinuxOptions",
            describe_subjects(pod_level, &names)
        ),
    )
}

pub(super) fn proc_mount(pod: &PodContext) -> CheckResult {
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| {
            c.security_context
                .and_then(|sc| sc.proc_mount.as_deref())
                .is_some_and(|m| m != "Default")
        })
        .map(|c| c.name)
        .collect();

    if names.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden(
        "procMount",
        format!(
            "{} must not set securityContext.procMount other than \"Default\"",
            describe_containers(&names)
        ),
    )
}

pub(super) fn seccomp(pod: &PodContext) -> CheckResult {
    let pod_unconfined = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.seccomp_profile.as_ref())
        .is_some_and(|p| p.type_ == "Unconfined");
    let names: Vec<&str> = pod
        .containers()
        .filter(|c| {
            c.security_context
                .and_then(|sc| sc.seccomp_profile.as_ref())
                .is_some_and(|p| p.type_ == "Unconfined")
        })
        .map(|c| c.name)
        .collect();

    if !pod_unconfined && names.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden(
        "seccompProfile",
        format!(
            "{} must not set securityContext.seccompProfile.type to \"Unconfined\"",
            describe_subjects(pod_unconfined, &names)
        ),
    )
}

pub(super) fn sysctls(pod: &PodContext) -> CheckResult {
    let forbidden: Vec<&str> = pod
        .spec
        .security_context
        .as_ref()
        .and_then(|sc| sc.sysctls.as_ref())
        .into_iter()
        .flatten()
        .map(|s| s.name.as_str())
        .filter(|name| !SAFE_SYSCTLS.contains(name))
        .collect();

    if forbidden.is_empty() {
        return CheckResult::allowed();
    }
    CheckResult::forbidden("forbidden sysctls", forbidden.join(", "))
}
