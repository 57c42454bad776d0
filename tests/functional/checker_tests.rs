//! Full local runs over the fixture manifests.

use psa_checker::checker::{Checker, CheckerOptions, KindRegistry};
use psa_checker::output;
use psa_checker::policy::Level;
use tokio_util::sync::CancellationToken;

use crate::common::fixtures::fixture_path;

fn local(filenames: &[&str]) -> CheckerOptions {
    CheckerOptions {
        filenames: filenames.iter().map(|f| fixture_path(f)).collect(),
        ..Default::default()
    }
}

async fn run(options: CheckerOptions) -> psa_checker::Result<psa_checker::CheckResults> {
    Checker::new(options, None, KindRegistry::with_defaults())?
        .run(&CancellationToken::new())
        .await
}

#[tokio::test]
async fn test_directory_is_loaded_without_recursion() {
    let results = run(local(&["manifests"])).await.unwrap();

    let keys: Vec<&str> = results.keys().map(String::as_str).collect();
    assert_eq!(
        keys,
        vec![
            "gvk: \"/v1, Kind=Pod\" - shop/debug",
            "gvk: \"apps/v1, Kind=Deployment\" - shop/web",
        ]
    );
}

#[tokio::test]
async fn test_recursive_directory() {
    let mut options = local(&["manifests"]);
    options.recursive = true;
    let results = run(options).await.unwrap();

    let cleanup = &results["gvk: \"batch/v1, Kind=CronJob\" - shop/cleanup"];
    assert!(!cleanup.passes(Level::Baseline));
    assert!(
        cleanup.verdicts[&Level::Baseline]
            .reasons
            .iter()
            .any(|r| r.starts_with("privileged"))
    );
}

#[tokio::test]
async fn test_namespace_labels_come_from_manifests() {
    let results = run(local(&["manifests/shop.yaml"])).await.unwrap();

    let web = &results["gvk: \"apps/v1, Kind=Deployment\" - shop/web"];
    assert!(web.passes(Level::Restricted));
    assert_eq!(web.namespace_level, Some(Level::Baseline));
    assert_eq!(web.namespace_version.as_deref(), Some("v1.30"));
    assert_eq!(web.admitted_by_namespace(), Some(true));

    let debug = &results["gvk: \"/v1, Kind=Pod\" - shop/debug"];
    assert!(debug.passes(Level::Privileged));
    assert!(!debug.passes(Level::Baseline));
    assert_eq!(debug.admitted_by_namespace(), Some(false));
}

#[tokio::test]
async fn test_json_list_is_flattened() {
    let results = run(local(&["pods.json"])).await.unwrap();
    assert_eq!(results.len(), 2);

    let a = &results["gvk: \"/v1, Kind=Pod\" - team-a/worker-a"];
    assert!(!a.passes(Level::Baseline));
    let b = &results["gvk: \"/v1, Kind=Pod\" - team-a/worker-b"];
    assert!(b.passes(Level::Baseline));
    assert!(!b.passes(Level::Restricted));
}

#[tokio::test]
async fn test_missing_namespace_fails_the_run() {
    let err = run(local(&["missing-namespace.yaml", "pods.json"]))
        .await
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "\"StatefulSet/db\" is missing namespace in its definition"
    );
}

#[tokio::test]
async fn test_missing_namespace_is_defaulted() {
    let mut options = local(&["missing-namespace.yaml"]);
    options.namespace = Some("data".to_string());
    options.default_namespaces = true;

    let results = run(options).await.unwrap();
    assert!(results.contains_key("gvk: \"apps/v1, Kind=StatefulSet\" - data/db"));
}

#[tokio::test]
async fn test_default_namespaces_requires_namespace() {
    let mut options = local(&["missing-namespace.yaml"]);
    options.default_namespaces = true;

    let err = run(options).await.unwrap_err();
    assert!(err.is_setup());
    assert!(err.to_string().contains("--default-namespaces"));
}

#[tokio::test]
async fn test_live_mode_without_client_is_setup_error() {
    let options = CheckerOptions {
        resource_args: vec!["pods".to_string()],
        ..Default::default()
    };
    let err = run(options).await.unwrap_err();
    assert_eq!(
        err.to_string(),
        "there were errors while setting up the command: missing kube client"
    );
}

#[tokio::test]
async fn test_cancelled_run() {
    let cancel = CancellationToken::new();
    cancel.cancel();
    let err = Checker::new(local(&["pods.json"]), None, KindRegistry::with_defaults())
        .unwrap()
        .run(&cancel)
        .await
        .unwrap_err();
    assert!(err.is_cancelled());
}

#[tokio::test]
async fn test_rendered_output() {
    let results = run(local(&["manifests/shop.yaml"])).await.unwrap();
    assert_eq!(
        output::render(&results, false),
        "gvk: \"/v1, Kind=Pod\" - shop/debug: privileged\n\
         gvk: \"apps/v1, Kind=Deployment\" - shop/web: privileged\n"
    );
}
