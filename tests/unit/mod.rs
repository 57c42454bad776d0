// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for psa-checker.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components through the public API.

#[path = "../common/mod.rs"]
mod common;

mod level_tests {
    use psa_checker::policy::Level;

    #[test]
    fn test_level_display() {
        assert_eq!(Level::Privileged.to_string(), "privileged");
        assert_eq!(Level::Baseline.to_string(), "baseline");
        assert_eq!(Level::Restricted.to_string(), "restricted");
    }

    #[test]
    fn test_level_default() {
        assert_eq!(Level::default(), Level::Privileged);
    }

    #[test]
    fn test_level_all_is_ascending() {
        assert!(Level::ALL.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_invalid_level_message() {
        let err = "locked".parse::<Level>().unwrap_err();
        assert_eq!(
            err.to_string(),
            "unknown Pod Security level \"locked\", expected one of privileged, baseline, restricted"
        );
    }
}

mod check_table_tests {
    use psa_checker::policy::Level;
    use psa_checker::policy::checks::{all, checks_for};

    #[test]
    fn test_privileged_has_no_checks() {
        assert!(checks_for(Level::Privileged).is_empty());
    }

    #[test]
    fn test_restricted_overrides_baseline_checks() {
        let restricted: Vec<&str> = checks_for(Level::Restricted).iter().map(|c| c.id).collect();
        assert!(restricted.contains(&"seccompProfile_restricted"));
        assert!(!restricted.contains(&"seccompProfile_baseline"));
        assert!(restricted.contains(&"capabilities_restricted"));
        assert!(!restricted.contains(&"capabilities_baseline"));
        assert!(restricted.contains(&"hostNamespaces"));
    }

    #[test]
    fn test_every_override_names_a_baseline_check() {
        for check in all() {
            if let Some(overridden) = check.overrides {
                let target = all().iter().find(|c| c.id == overridden).unwrap();
                assert!(target.level < check.level);
            }
        }
    }
}

mod evaluator_tests {
    use psa_checker::policy::{Level, LevelEvaluator, PodSecurityEvaluator};
    use serde_json::json;

    use crate::common::fixtures::{PodBuilder, plain_container, restricted_container};

    #[test]
    fn test_privileged_always_passes_pod_bearing_kinds() {
        let attrs = PodBuilder::deployment("root")
            .host_network()
            .field("hostIPC", json!(true))
            .container(json!({"name": "c", "securityContext": {"privileged": true, "runAsUser": 0}}))
            .build();
        assert!(PodSecurityEvaluator.evaluate(Level::Privileged, &attrs).allowed);
    }

    #[test]
    fn test_reasons_name_offending_containers() {
        let attrs = PodBuilder::pod("web")
            .container(restricted_container("good"))
            .container(json!({"name": "bad", "securityContext": {"privileged": true}}))
            .build();
        let verdict = PodSecurityEvaluator.evaluate(Level::Baseline, &attrs);
        assert_eq!(
            verdict.reasons,
            vec!["privileged (container \"bad\" must not set securityContext.privileged=true)"]
        );
    }

    #[test]
    fn test_init_containers_are_checked() {
        let attrs = PodBuilder::pod("web")
            .restricted()
            .field("initContainers", json!([plain_container("setup")]))
            .build();
        let verdict = PodSecurityEvaluator.evaluate(Level::Restricted, &attrs);
        assert!(!verdict.allowed);
        assert!(verdict.reasons.iter().all(|r| r.contains("\"setup\"")));
    }

    #[test]
    fn test_malformed_template_fails_with_diagnostic() {
        let mut attrs = PodBuilder::deployment("broken").build();
        let mut object = (*attrs.object).clone();
        object.data["spec"] = json!({"template": {"spec": {"containers": "nope"}}});
        attrs.object = std::sync::Arc::new(object);

        assert!(PodSecurityEvaluator.evaluate(Level::Privileged, &attrs).allowed);
        for level in [Level::Baseline, Level::Restricted] {
            let verdict = PodSecurityEvaluator.evaluate(level, &attrs);
            assert!(!verdict.allowed);
            assert!(verdict.reasons[0].starts_with("unable to evaluate Deployment \"broken\""));
        }
    }
}

mod result_tests {
    use std::collections::BTreeMap;

    use psa_checker::admission::{Outcome, ParallelAdmissionResult};
    use psa_checker::policy::{Level, LevelVerdict};

    #[test]
    fn test_reduction_uses_level_order() {
        let verdicts: BTreeMap<Level, LevelVerdict> = [
            (Level::Restricted, LevelVerdict::allowed()),
            (Level::Baseline, LevelVerdict::allowed()),
            (Level::Privileged, LevelVerdict::denied(vec!["x".into()])),
        ]
        .into_iter()
        .collect();

        let result = ParallelAdmissionResult::reduce(verdicts);
        assert_eq!(result.outcome, Outcome::Allowed(Level::Baseline));
        assert_eq!(result.minimum_level(), Some(Level::Baseline));
        assert!(!result.passes(Level::Privileged));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::Allowed(Level::Restricted).to_string(), "restricted");
        assert_eq!(
            Outcome::NoLevel.to_string(),
            "no level satisfies this object"
        );
    }
}

mod namespace_tests {
    use std::collections::BTreeMap;

    use psa_checker::namespace::{
        LABEL_ENFORCE, LABEL_ENFORCE_VERSION, LocalNamespaceGetter, NamespaceCache,
        NamespaceGetter,
    };
    use psa_checker::policy::Level;

    #[tokio::test]
    async fn test_local_getter_is_never_exempt() {
        let labels: BTreeMap<String, String> = [
            (LABEL_ENFORCE.to_string(), "baseline".to_string()),
            (LABEL_ENFORCE_VERSION.to_string(), "latest".to_string()),
        ]
        .into();
        let getter = LocalNamespaceGetter::new().with_namespace("kube-system", labels);

        let context = getter.resolve("kube-system").await.unwrap();
        assert!(!context.exempt);
        assert_eq!(context.enforce_level, Some(Level::Baseline));
        assert_eq!(context.enforce_version.as_deref(), Some("latest"));
    }

    #[tokio::test]
    async fn test_cache_returns_shared_value() {
        let cache = NamespaceCache::new(LocalNamespaceGetter::new());
        let first = cache.resolve("a").await.unwrap();
        let second = cache.resolve("a").await.unwrap();
        assert!(std::sync::Arc::ptr_eq(&first, &second));
    }
}

mod manifest_tests {
    use std::path::Path;

    use psa_checker::checker::manifest;

    use crate::common::fixtures::fixture_path;

    #[test]
    fn test_load_fixture_directory() {
        let objects = manifest::load(&[fixture_path("manifests")], false).unwrap();
        // Namespace, Deployment and Pod from shop.yaml
        assert_eq!(objects.len(), 3);

        let objects = manifest::load(&[fixture_path("manifests")], true).unwrap();
        assert_eq!(objects.len(), 4);
    }

    #[test]
    fn test_empty_documents_are_skipped() {
        let objects = manifest::parse(Path::new("empty.yaml"), "---\n---\n").unwrap();
        assert!(objects.is_empty());
    }
}

mod registry_tests {
    use kube::core::GroupVersionKind;
    use psa_checker::checker::KindRegistry;

    #[test]
    fn test_irregular_kind_guess_is_marked() {
        let registry = KindRegistry::new();
        let mapping = registry.resolve(&GroupVersionKind::gvk("apps", "v1", "Deployment"));
        assert!(mapping.guessed);
        assert_eq!(mapping.resource.resource, "deployments");

        let registry = KindRegistry::with_defaults();
        assert!(!registry.resolve(&GroupVersionKind::gvk("apps", "v1", "Deployment")).guessed);
    }
}
