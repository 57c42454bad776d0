// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Property-based tests for psa-checker.
//!
//! Uses proptest to generate random pod security settings and verify
//! invariants of the level ladder and of parallel admission.

#[path = "../common/mod.rs"]
mod common;

use proptest::prelude::*;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;

use psa_checker::admission::{AttributesRecord, Outcome, ParallelAdmission};
use psa_checker::namespace::{LocalNamespaceGetter, NamespaceExemption, NamespaceGetter};
use psa_checker::policy::{Level, LevelEvaluator, PodSecurityEvaluator};
use psa_checker::LookupError;

use common::fixtures::PodBuilder;

/// Security settings of one generated container
#[derive(Debug, Clone)]
struct ContainerSettings {
    privileged: Option<bool>,
    allow_privilege_escalation: Option<bool>,
    run_as_non_root: Option<bool>,
    run_as_user: Option<i64>,
    seccomp: Option<&'static str>,
    drop_all: bool,
    add: Vec<&'static str>,
    host_port: Option<i32>,
}

impl ContainerSettings {
    fn to_json(&self, name: &str) -> Value {
        let mut sc = Map::new();
        if let Some(v) = self.privileged {
            sc.insert("privileged".into(), json!(v));
        }
        if let Some(v) = self.allow_privilege_escalation {
            sc.insert("allowPrivilegeEscalation".into(), json!(v));
        }
        if let Some(v) = self.run_as_non_root {
            sc.insert("runAsNonRoot".into(), json!(v));
        }
        if let Some(v) = self.run_as_user {
            sc.insert("runAsUser".into(), json!(v));
        }
        if let Some(t) = self.seccomp {
            sc.insert("seccompProfile".into(), json!({"type": t}));
        }
        let mut caps = Map::new();
        if self.drop_all {
            caps.insert("drop".into(), json!(["ALL"]));
        }
        if !self.add.is_empty() {
            caps.insert("add".into(), json!(self.add));
        }
        if !caps.is_empty() {
            sc.insert("capabilities".into(), Value::Object(caps));
        }

        let mut container = json!({"name": name, "image": "app:1", "securityContext": sc});
        if let Some(port) = self.host_port {
            container["ports"] = json!([{"containerPort": 8080, "hostPort": port}]);
        }
        container
    }
}

/// Strategy for generating container security settings.
fn container_settings() -> impl Strategy<Value = ContainerSettings> {
    (
        proptest::option::of(any::<bool>()),
        proptest::option::of(any::<bool>()),
        proptest::option::of(any::<bool>()),
        proptest::option::of(prop_oneof![Just(0i64), Just(1000i64)]),
        proptest::option::of(prop_oneof![
            Just("RuntimeDefault"),
            Just("Localhost"),
            Just("Unconfined")
        ]),
        any::<bool>(),
        proptest::collection::vec(
            prop_oneof![Just("NET_BIND_SERVICE"), Just("CHOWN"), Just("SYS_ADMIN")],
            0..3,
        ),
        proptest::option::of(prop_oneof![Just(0i32), Just(8080i32)]),
    )
        .prop_map(
            |(privileged, ape, non_root, user, seccomp, drop_all, add, host_port)| {
                ContainerSettings {
                    privileged,
                    allow_privilege_escalation: ape,
                    run_as_non_root: non_root,
                    run_as_user: user,
                    seccomp,
                    drop_all,
                    add,
                    host_port,
                }
            },
        )
}

/// Strategy for generating whole pod workloads.
fn any_workload() -> impl Strategy<Value = AttributesRecord> {
    (
        prop_oneof![Just("pod"), Just("deployment"), Just("cronjob")],
        any::<bool>(),
        any::<bool>(),
        proptest::option::of(any::<bool>()),
        proptest::option::of(prop_oneof![Just("RuntimeDefault"), Just("Unconfined")]),
        any::<bool>(),
        any::<bool>(),
        proptest::collection::vec(container_settings(), 1..4),
    )
        .prop_map(
            |(kind, host_network, host_pid, non_root, seccomp, host_path, windows, containers)| {
                let mut builder = match kind {
                    "deployment" => PodBuilder::deployment("w"),
                    "cronjob" => PodBuilder::cron_job("w"),
                    _ => PodBuilder::pod("w"),
                }
                .namespace("team-a")
                .field("hostNetwork", json!(host_network))
                .field("hostPID", json!(host_pid));

                let mut pod_sc = Map::new();
                if let Some(v) = non_root {
                    pod_sc.insert("runAsNonRoot".into(), json!(v));
                }
                if let Some(t) = seccomp {
                    pod_sc.insert("seccompProfile".into(), json!({"type": t}));
                }
                builder = builder.field("securityContext", Value::Object(pod_sc));

                if host_path {
                    builder = builder.field(
                        "volumes",
                        json!([{"name": "h", "hostPath": {"path": "/var/run"}}]),
                    );
                }
                if windows {
                    builder = builder.field("os", json!({"name": "windows"}));
                }
                for (i, settings) in containers.iter().enumerate() {
                    builder = builder.container(settings.to_json(&format!("c{i}")));
                }
                builder.build()
            },
        )
}

struct ExemptEverything;

impl NamespaceGetter for ExemptEverything {
    async fn resolve(&self, namespace: &str) -> Result<NamespaceExemption, LookupError> {
        Ok(NamespaceExemption::from_labels(namespace, None, true))
    }
}

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    /// Property: passing a level implies passing every less restrictive level.
    #[test]
    fn prop_ladder_is_monotonic(attrs in any_workload()) {
        let evaluator = PodSecurityEvaluator;
        let passes: Vec<bool> = Level::ALL
            .iter()
            .map(|level| evaluator.evaluate(*level, &attrs).allowed)
            .collect();

        for (i, stricter) in passes.iter().enumerate() {
            if *stricter {
                prop_assert!(
                    passes[..i].iter().all(|p| *p),
                    "passes {:?} are not monotonic",
                    passes
                );
            }
        }
    }

    /// Property: evaluation is deterministic.
    #[test]
    fn prop_evaluation_is_deterministic(attrs in any_workload()) {
        for level in Level::ALL {
            prop_assert_eq!(
                PodSecurityEvaluator.evaluate(level, &attrs),
                PodSecurityEvaluator.evaluate(level, &attrs)
            );
        }
    }

    /// Property: a failing verdict always carries at least one reason.
    #[test]
    fn prop_denials_have_reasons(attrs in any_workload()) {
        for level in Level::ALL {
            let verdict = PodSecurityEvaluator.evaluate(level, &attrs);
            prop_assert_eq!(verdict.allowed, verdict.reasons.is_empty());
        }
    }

    /// Property: validate is idempotent and agrees with the sequential evaluator.
    #[test]
    fn prop_validate_is_idempotent(attrs in any_workload()) {
        let rt = runtime();
        let admission = ParallelAdmission::new(LocalNamespaceGetter::new());
        let cancel = CancellationToken::new();

        let (first, second) = rt.block_on(async {
            let first = admission.validate(&cancel, &attrs).await.unwrap();
            let second = admission.validate(&cancel, &attrs).await.unwrap();
            (first, second)
        });
        prop_assert_eq!(&first, &second);

        let expected = Level::ALL
            .into_iter()
            .find(|level| PodSecurityEvaluator.evaluate(*level, &attrs).allowed)
            .map_or(Outcome::NoLevel, Outcome::Allowed);
        prop_assert_eq!(first.outcome, expected);
        prop_assert_eq!(first.verdicts.len(), Level::ALL.len());
    }

    /// Property: exempt namespaces always yield an exempt result.
    #[test]
    fn prop_exempt_namespace_is_always_exempt(attrs in any_workload()) {
        let rt = runtime();
        let admission = ParallelAdmission::new(ExemptEverything);

        let result = rt
            .block_on(admission.validate(&CancellationToken::new(), &attrs))
            .unwrap();
        prop_assert!(result.is_exempt());
        prop_assert!(result.verdicts.is_empty());
    }
}
