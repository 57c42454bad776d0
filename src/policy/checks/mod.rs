//! Pod Security Standards check table.
//!
//! Every check belongs to the lowest level that enforces it and applies to
//! all more restrictive levels as well. A check may override a less strict
//! check of the same concern (e.g. restricted capabilities replace baseline
//! capabilities), in which case only the stricter one runs.

mod baseline;
mod restricted;

use std::fmt;

use super::Level;
use super::pod_spec::PodContext;

/// Result of a single security check
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckResult {
    /// Whether the check passed
    pub allowed: bool,
    /// Short name of the violated control
    pub reason: String,
    /// Offending fields and containers
    pub detail: String,
}

impl CheckResult {
    /// Create a passing result
    pub fn allowed() -> Self {
        Self {
            allowed: true,
            reason: String::new(),
            detail: String::new(),
        }
    }

    /// Create a failing result
    pub fn forbidden(reason: &str, detail: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: reason.to_string(),
            detail: detail.into(),
        }
    }
}

impl fmt::Display for CheckResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.detail.is_empty() {
            f.write_str(&self.reason)
        } else {
            write!(f, "{} ({})", self.reason, self.detail)
        }
    }
}

/// A single Pod Security Standards control
pub struct Check {
    /// Stable identifier
    pub id: &'static str,
    /// Lowest level enforcing this check
    pub level: Level,
    /// Identifier of a less strict check this one replaces
    pub overrides: Option<&'static str>,
    check: fn(&PodContext) -> CheckResult,
}

impl Check {
    pub fn run(&self, pod: &PodContext) -> CheckResult {
        (self.check)(pod)
    }
}

impl fmt::Debug for Check {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Check")
            .field("id", &self.id)
            .field("level", &self.level)
            .field("overrides", &self.overrides)
            .finish()
    }
}

static CHECKS: &[Check] = &[
    // Baseline
    Check {
        id: "hostNamespaces",
        level: Level::Baseline,
        overrides: None,
        check: baseline::host_namespaces,
    },
    Check {
        id: "privileged",
        level: Level::Baseline,
        overrides: None,
        check: baseline::privileged,
    },
    Check {
        id: "capabilities_baseline",
        level: Level::Baseline,
        overrides: None,
        check: baseline::capabilities,
    },
    Check {
        id: "hostPathVolumes",
        level: Level::Baseline,
        overrides: None,
        check: baseline::host_path_volumes,
    },
    Check {
        id: "hostPorts",
        level: Level::Baseline,
        overrides: None,
        check: baseline::host_ports,
    },
    Check {
        id: "windowsHostProcess",
        level: Level::Baseline,
        overrides: None,
        check: baseline::windows_host_process,
    },
    Check {
        id: "appArmorProfile",
        level: Level::Baseline,
        overrides: None,
        check: baseline::app_armor,
    },
    Check {
        id: "seLinuxOptions",
        level: Level::Baseline,
        overrides: None,
        check: baseline::se_linux,
    },
    Check {
        id: "procMount",
        level: Level::Baseline,
        overrides: None,
        check: baseline::proc_mount,
    },
    Check {
        id: "seccompProfile_baseline",
        level: Level::Baseline,
        overrides: None,
        check: baseline::seccomp,
    },
    Check {
        id: "sysctls",
        level: Level::Baseline,
        overrides: None,
        check: baseline::sysctls,
    },
    // Restricted
    Check {
        id: "restrictedVolumes",
        level: Level::Restricted,
        overrides: None,
        check: restricted::volume_types,
    },
    Check {
        id: "allowPrivilegeEscalation",
        level: Level::Restricted,
        overrides: None,
        check: restricted::allow_privilege_escalation,
    },
    Check {
        id: "runAsNonRoot",
        level: Level::Restricted,
        overrides: None,
        check: restricted::run_as_non_root,
    },
    Check {
        id: "runAsUser",
        level: Level::Restricted,
        overrides: None,
        check: restricted::run_as_user,
    },
    Check {
        id: "seccompProfile_restricted",
        level: Level::Restricted,
        overrides: Some("seccompProfile_baseline"),
        check: restricted::seccomp,
    },
    Check {
        id: "capabilities_restricted",
        level: Level::Restricted,
        overrides: Some("capabilities_baseline"),
        check: restricted::capabilities,
    },
];

/// The full check table in evaluation order
pub fn all() -> &'static [Check] {
    CHECKS
}

/// Checks enforced at `level`, in table order, with overridden checks removed
pub fn checks_for(level: Level) -> Vec<&'static Check> {
    let applicable: Vec<&'static Check> = CHECKS
        .iter()
        .filter(|c| c.level != Level::Privileged && c.level <= level)
        .collect();
    let overridden: Vec<&str> = applicable.iter().filter_map(|c| c.overrides).collect();

    applicable
        .into_iter()
        .filter(|c| !overridden.contains(&c.id))
        .collect()
}

/// `container "a"` or `containers "a", "b"`
fn describe_containers(names: &[&str]) -> String {
    let noun = if names.len() == 1 {
        "container"
    } else {
        "containers"
    };
    format!("{} {}", noun, quote_all(names))
}

fn quote_all<S: AsRef<str>>(items: &[S]) -> String {
    items
        .iter()
        .map(|s| format!("{:?}", s.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Join `pod` and container subjects: `pod and container "a"`
fn describe_subjects(pod: bool, containers: &[&str]) -> String {
    match (pod, containers.is_empty()) {
        (true, true) => "pod".to_string(),
        (true, false) => format!("pod and {}", describe_containers(containers)),
        (false, _) => describe_containers(containers),
    }
}
