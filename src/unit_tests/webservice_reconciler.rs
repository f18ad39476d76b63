// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::common::*;
use crate::error::Error;
use crate::executable_model::*;
use crate::kubernetes_api::{APIError, ApiServer};
use crate::reconciler::*;
use crate::tracker::last_applied_spec;
use crate::unit_tests::*;
use crate::webservice_types::*;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use std::time::Duration;

fn created_kinds(api: &SimulatedApiServer) -> Vec<(String, String)> {
    api.requests()
        .into_iter()
        .filter(|req| req.verb == Verb::Create)
        .map(|req| (req.kind, req.name))
        .collect()
}

fn pair(kind: &str, name: &str) -> (String, String) {
    (kind.to_string(), name.to_string())
}

/// Runs the controller until the frontend tier exists and the snapshot is recorded.
async fn provisioned(name: &str) -> Data<SimulatedApiServer> {
    let data = new_data();
    seed_webservice(&data, &webservice(name)).await;
    reconcile_webservice(&data, NAMESPACE, name).await.unwrap();
    data.api
        .set_ready_replicas(NAMESPACE, &format!("{}-mysql", name), 1);
    reconcile_webservice(&data, NAMESPACE, name).await.unwrap();
    data.api.clear_requests();
    data
}

async fn update_spec<F: FnOnce(&mut WebServiceSpec)>(
    data: &Data<SimulatedApiServer>,
    name: &str,
    change: F,
) {
    let mut ws = data.api.object::<WebService>(NAMESPACE, name).unwrap();
    change(&mut ws.spec);
    data.api.replace(NAMESPACE, &ws).await.unwrap();
    data.api.clear_requests();
}

fn node_port(service: &corev1::Service) -> Option<i32> {
    service.spec.as_ref()?.ports.as_ref()?.first()?.node_port
}

fn cluster_ip(service: &corev1::Service) -> Option<String> {
    service.spec.as_ref()?.cluster_ip.clone()
}

#[tokio::test]
pub async fn test_frontend_waits_for_database() {
    let data = new_data();
    seed_webservice(&data, &webservice("shop")).await;

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::WaitingOnDependency, report.phase);
    assert_eq!(Some(Duration::from_secs(5)), report.retry_after);
    assert_eq!(
        vec![
            pair("Secret", "shop-mysql-auth"),
            pair("Deployment", "shop-mysql"),
            pair("Service", "shop-mysql"),
        ],
        created_kinds(&data.api)
    );
    assert!(data.api.object::<appsv1::Deployment>(NAMESPACE, "shop-web").is_none());

    // Still not ready: nothing new is created.
    data.api.clear_requests();
    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::WaitingOnDependency, report.phase);
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_provisioning_after_database_is_ready() {
    let data = new_data();
    seed_webservice(&data, &webservice("shop")).await;
    reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    data.api.set_ready_replicas(NAMESPACE, "shop-mysql", 1);
    data.api.clear_requests();

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcileReport::done(ReconcilePhase::Provisioning), report);
    assert_eq!(
        vec![pair("Deployment", "shop-web"), pair("Service", "shop-web")],
        created_kinds(&data.api)
    );
    let ws = data.api.object::<WebService>(NAMESPACE, "shop").unwrap();
    assert_eq!(Some(ws.spec.clone()), last_applied_spec(&ws).unwrap());

    let frontend = data
        .api
        .object::<corev1::Service>(NAMESPACE, "shop-web")
        .unwrap();
    assert_eq!(
        Some("NodePort".to_string()),
        frontend.spec.and_then(|spec| spec.type_)
    );
}

#[tokio::test]
pub async fn test_unchanged_spec_is_a_noop() {
    let data = provisioned("shop").await;
    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Steady, report.phase);
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_frontend_change_updates_frontend_children() {
    let data = provisioned("shop").await;
    let service_before = data
        .api
        .object::<corev1::Service>(NAMESPACE, "shop-web")
        .unwrap();
    update_spec(&data, "shop", |spec| {
        spec.frontend.image = "nginx:1.27".to_string()
    })
    .await;

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Updating, report.phase);
    assert_eq!(1, data.api.request_count(Verb::Update, "Deployment"));
    assert_eq!(1, data.api.request_count(Verb::Update, "Service"));
    assert_eq!(1, data.api.request_count(Verb::Update, "WebService"));
    assert_eq!(0, data.api.request_count(Verb::Create, "Deployment"));

    let deployment = data
        .api
        .object::<appsv1::Deployment>(NAMESPACE, "shop-web")
        .unwrap();
    let image = deployment
        .spec
        .and_then(|spec| spec.template.spec)
        .and_then(|pod| pod.containers[0].image.clone());
    assert_eq!(Some("nginx:1.27".to_string()), image);

    let service_after = data
        .api
        .object::<corev1::Service>(NAMESPACE, "shop-web")
        .unwrap();
    assert!(cluster_ip(&service_before).is_some());
    assert_eq!(cluster_ip(&service_before), cluster_ip(&service_after));
    assert_eq!(node_port(&service_before), node_port(&service_after));

    let ws = data.api.object::<WebService>(NAMESPACE, "shop").unwrap();
    assert_eq!(Some(ws.spec.clone()), last_applied_spec(&ws).unwrap());

    data.api.clear_requests();
    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Steady, report.phase);
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_database_change_keeps_credentials() {
    let data = provisioned("shop").await;
    let secret_before = data
        .api
        .object::<corev1::Secret>(NAMESPACE, "shop-mysql-auth")
        .unwrap();
    let database_ip = cluster_ip(
        &data
            .api
            .object::<corev1::Service>(NAMESPACE, "shop-mysql")
            .unwrap(),
    );
    update_spec(&data, "shop", |spec| spec.database.size = Some(2)).await;

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Updating, report.phase);
    assert_eq!(0, data.api.request_count(Verb::Update, "Secret"));
    assert_eq!(
        secret_before.string_data,
        data.api
            .object::<corev1::Secret>(NAMESPACE, "shop-mysql-auth")
            .unwrap()
            .string_data
    );

    let database = data
        .api
        .object::<appsv1::Deployment>(NAMESPACE, "shop-mysql")
        .unwrap();
    assert_eq!(Some(2), database.spec.as_ref().and_then(|spec| spec.replicas));
    assert_eq!(
        Some(1),
        database.status.and_then(|status| status.ready_replicas)
    );
    assert_eq!(
        database_ip,
        cluster_ip(
            &data
                .api
                .object::<corev1::Service>(NAMESPACE, "shop-mysql")
                .unwrap()
        )
    );
}

#[tokio::test]
pub async fn test_renamed_tier_prunes_old_children() {
    let data = provisioned("shop").await;
    update_spec(&data, "shop", |spec| spec.frontend.name = "site".to_string()).await;

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Provisioning, report.phase);
    assert!(data.api.object::<appsv1::Deployment>(NAMESPACE, "shop-site").is_some());
    assert!(data.api.object::<corev1::Service>(NAMESPACE, "shop-site").is_some());
    assert!(data.api.object::<appsv1::Deployment>(NAMESPACE, "shop-web").is_none());
    assert!(data.api.object::<corev1::Service>(NAMESPACE, "shop-web").is_none());
    assert_eq!(2, data.api.count::<appsv1::Deployment>());
    assert_eq!(1, data.api.count::<corev1::Secret>());
}

#[tokio::test]
pub async fn test_resume_after_crash_between_frontend_children() {
    let data = new_data();
    seed_webservice(&data, &webservice("shop")).await;
    reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    data.api.set_ready_replicas(NAMESPACE, "shop-mysql", 1);

    data.api.fail_nth_mutation(2);
    match reconcile_webservice(&data, NAMESPACE, "shop").await {
        Err(Error::ReconcileServiceFailed(name, _)) => assert_eq!("shop-web", name),
        other => panic!("expected the injected failure, got {:?}", other),
    }
    let ws = data.api.object::<WebService>(NAMESPACE, "shop").unwrap();
    assert_eq!(None, last_applied_spec(&ws).unwrap());

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Provisioning, report.phase);
    assert_eq!(2, data.api.count::<appsv1::Deployment>());
    assert_eq!(2, data.api.count::<corev1::Service>());
    assert_eq!(1, data.api.count::<corev1::Secret>());

    data.api.clear_requests();
    reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_corrupt_snapshot_is_an_error() {
    let data = provisioned("shop").await;
    let mut ws = data.api.object::<WebService>(NAMESPACE, "shop").unwrap();
    ws.metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(LAST_APPLIED_SPEC_ANNOTATION.to_string(), "[1,".to_string());
    data.api.replace(NAMESPACE, &ws).await.unwrap();
    data.api.clear_requests();

    assert!(matches!(
        reconcile_webservice(&data, NAMESPACE, "shop").await,
        Err(Error::SnapshotDecodeFailed(..))
    ));
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_deleting_webservice_is_left_alone() {
    let data = provisioned("shop").await;
    let mut ws = data.api.object::<WebService>(NAMESPACE, "shop").unwrap();
    ws.metadata.finalizers = Some(vec!["example.com/protect".to_string()]);
    data.api.replace(NAMESPACE, &ws).await.unwrap();
    data.api.delete::<WebService>(NAMESPACE, "shop").await.unwrap();
    data.api.clear_requests();

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Terminating, report.phase);
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_deleted_webservice_takes_children_along() {
    let data = provisioned("shop").await;
    data.api.delete::<WebService>(NAMESPACE, "shop").await.unwrap();
    assert_eq!(0, data.api.count::<appsv1::Deployment>());
    assert_eq!(0, data.api.count::<corev1::Service>());
    assert_eq!(0, data.api.count::<corev1::Secret>());

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Absent, report.phase);
}

#[tokio::test]
pub async fn test_foreign_secret_is_not_adopted() {
    let data = new_data();
    let ws = seed_webservice(&data, &webservice("shop")).await;
    let secret = crate::resources::make_database_secret(
        &ws,
        &crate::resources::DatabaseCredentials {
            username: "x".to_string(),
            password: "y".to_string(),
            root_password: "z".to_string(),
        },
    );
    data.api.create(NAMESPACE, &secret).await.unwrap();

    match reconcile_webservice(&data, NAMESPACE, "shop").await {
        Err(Error::ChildNotOwned { kind, .. }) => assert_eq!("Secret", kind),
        other => panic!("expected an ownership error, got {:?}", other),
    }
    assert_eq!(0, data.api.count::<appsv1::Deployment>());
}

#[tokio::test]
pub async fn test_database_service_recreated_alongside_database_change() {
    let data = provisioned("shop").await;
    data.api
        .delete::<corev1::Service>(NAMESPACE, "shop-mysql")
        .await
        .unwrap();
    update_spec(&data, "shop", |spec| spec.database.size = Some(3)).await;

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Updating, report.phase);
    assert_eq!(vec![pair("Service", "shop-mysql")], created_kinds(&data.api));
    let database = data
        .api
        .object::<appsv1::Deployment>(NAMESPACE, "shop-mysql")
        .unwrap();
    assert_eq!(Some(3), database.spec.and_then(|spec| spec.replicas));

    data.api.clear_requests();
    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Steady, report.phase);
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_database_fix_lands_while_waiting() {
    let data = new_data();
    seed_webservice(&data, &webservice("shop")).await;
    reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    update_spec(&data, "shop", |spec| {
        spec.database.image = "mysql:8.0".to_string()
    })
    .await;

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::WaitingOnDependency, report.phase);
    let database = data
        .api
        .object::<appsv1::Deployment>(NAMESPACE, "shop-mysql")
        .unwrap();
    let image = database
        .spec
        .and_then(|spec| spec.template.spec)
        .and_then(|pod| pod.containers.first().and_then(|c| c.image.clone()));
    assert_eq!(Some("mysql:8.0".to_string()), image);
    assert_eq!(1, data.api.request_count(Verb::Update, "Deployment"));
    assert_eq!(1, data.api.count::<corev1::Service>());

    data.api.clear_requests();
    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::WaitingOnDependency, report.phase);
    assert_eq!(0, data.api.mutation_count());
}

#[tokio::test]
pub async fn test_webservice_written_concurrently_is_a_conflict() {
    let data = concurrent_data("WebService");
    data.api
        .inner
        .create(NAMESPACE, &webservice("shop"))
        .await
        .unwrap();
    reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    data.api.inner.set_ready_replicas(NAMESPACE, "shop-mysql", 1);
    reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    let mut ws = data.api.inner.object::<WebService>(NAMESPACE, "shop").unwrap();
    let recorded = last_applied_spec(&ws).unwrap();
    assert_eq!(Some(webservice("shop").spec), recorded);
    ws.spec.frontend.image = "nginx:1.27".to_string();
    data.api.inner.replace(NAMESPACE, &ws).await.unwrap();
    data.api.arm();

    match reconcile_webservice(&data, NAMESPACE, "shop").await {
        Err(Error::CRUpdateFailed(name, APIError::Conflict)) => assert_eq!("shop", name),
        other => panic!("expected a conflict, got {:?}", other),
    }
    let ws = data.api.inner.object::<WebService>(NAMESPACE, "shop").unwrap();
    assert_eq!(recorded, last_applied_spec(&ws).unwrap());

    let report = reconcile_webservice(&data, NAMESPACE, "shop").await.unwrap();
    assert_eq!(ReconcilePhase::Updating, report.phase);
    let ws = data.api.inner.object::<WebService>(NAMESPACE, "shop").unwrap();
    assert_eq!(Some(ws.spec.clone()), last_applied_spec(&ws).unwrap());
}
