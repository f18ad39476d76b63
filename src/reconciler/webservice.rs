// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::common::*;
use crate::error::Error;
use crate::gate::deployment_ready;
use crate::kubernetes_api::{delete_ignoring_absent, get_opt, ApiServer};
use crate::reconciler::*;
use crate::resources::*;
use crate::tracker::*;
use crate::webservice_types::*;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::Resource;
use rand::{distributions::Alphanumeric, Rng};
use tracing::*;

const GENERATED_PASSWORD_LEN: usize = 24;

/// reconcile_webservice brings up the database tier, waits until it serves,
/// then brings up the frontend tier. Database children are kept at the tier spec
/// they were written with on every call, ready or not. Frontend changes are
/// detected against the snapshot recorded on the WebService.
pub async fn reconcile_webservice<A: ApiServer>(
    data: &Data<A>,
    namespace: &str,
    name: &str,
) -> Result<ReconcileReport, Error> {
    let api = &data.api;
    let mut ws = match get_opt::<WebService, A>(api, namespace, name)
        .await
        .map_err(|e| Error::CRGetFailed(name.to_string(), e))?
    {
        None => {
            info!(webservice = name, "not found, end reconcile");
            return Ok(ReconcileReport::done(ReconcilePhase::Absent));
        }
        Some(ws) => ws,
    };

    if ws.meta().deletion_timestamp.is_some() {
        // Children go away with the owner references.
        info!(webservice = name, "being deleted, end reconcile");
        return Ok(ReconcileReport::done(ReconcilePhase::Terminating));
    }

    // A corrupt snapshot ends the invocation before any child is touched.
    let last_applied = last_applied_spec(&ws)?;

    let database = reconcile_database_tier(api, namespace, &ws).await?;

    let database_name = tier_workload_name(name, &ws.spec.database);
    let ready = deployment_ready(api, namespace, &database_name)
        .await
        .map_err(|e| Error::ReconcileDeploymentFailed(database_name.clone(), e))?;
    if !ready {
        let delay = data.config.dependency_retry_delay;
        info!(
            webservice = name,
            "Deployment {} is not ready, waiting for {:?}", database_name, delay
        );
        return Ok(ReconcileReport::retry_after(
            ReconcilePhase::WaitingOnDependency,
            delay,
        ));
    }

    let frontend_deployment_created = ensure_child(
        api,
        &ws,
        namespace,
        make_frontend_deployment(&ws),
        "Deployment",
        Error::ReconcileDeploymentFailed,
    )
    .await?;
    let frontend_service_created = ensure_child(
        api,
        &ws,
        namespace,
        make_frontend_service(&ws),
        "Service",
        Error::ReconcileServiceFailed,
    )
    .await?;
    let provisioned = frontend_deployment_created || frontend_service_created;

    if !needs_update(&ws.spec, last_applied.as_ref()) && !provisioned {
        if database.updated {
            info!(webservice = name, "database tier brought back to the current spec");
            return Ok(ReconcileReport::done(ReconcilePhase::Updating));
        }
        debug!(webservice = name, "up to date");
        return Ok(ReconcileReport::done(ReconcilePhase::Steady));
    }

    if needs_update(&ws.spec, last_applied.as_ref()) {
        if !frontend_deployment_created {
            rewrite_deployment(api, namespace, make_frontend_deployment(&ws)).await?;
        }
        if !frontend_service_created {
            rewrite_service(api, namespace, make_frontend_service(&ws)).await?;
        }
    }

    prune_stale_children(api, namespace, name, last_applied.as_ref(), &ws.spec).await?;

    record_applied_spec(&mut ws)?;
    api.replace(namespace, &ws)
        .await
        .map_err(|e| Error::CRUpdateFailed(name.to_string(), e))?;

    if provisioned {
        info!(webservice = name, "provisioned frontend tier");
        Ok(ReconcileReport::done(ReconcilePhase::Provisioning))
    } else {
        info!(webservice = name, "updated to the current spec");
        Ok(ReconcileReport::done(ReconcilePhase::Updating))
    }
}

/// What reconciling the database tier did.
#[derive(Debug, Clone, Copy, Default)]
struct DatabaseTier {
    updated: bool,
}

/// Brings the database tier in line with the current spec: credentials, workload,
/// then the service in front of it. Missing children are created; existing ones
/// written for a different tier spec are rewritten. This runs before the
/// readiness gate so a fix to a tier that never becomes ready still lands.
async fn reconcile_database_tier<A: ApiServer>(
    api: &A,
    namespace: &str,
    ws: &WebService,
) -> Result<DatabaseTier, Error> {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    let tier = &ws.spec.database;
    let secret_name = database_secret_name(&ws_name, tier);
    ensure_child_with(
        api,
        ws,
        namespace,
        &secret_name,
        "Secret",
        || make_database_secret(ws, &generate_credentials()),
        Error::ReconcileSecretFailed,
    )
    .await?;

    let mut outcome = DatabaseTier::default();
    let deployment = stamp_applied_tier(make_database_deployment(ws), tier)?;
    let deployment_created = ensure_child(
        api,
        ws,
        namespace,
        deployment.clone(),
        "Deployment",
        Error::ReconcileDeploymentFailed,
    )
    .await?;
    if !deployment_created {
        outcome.updated |= refresh_deployment(api, namespace, deployment, tier).await?;
    }

    let service = stamp_applied_tier(make_database_service(ws), tier)?;
    let service_created = ensure_child(
        api,
        ws,
        namespace,
        service.clone(),
        "Service",
        Error::ReconcileServiceFailed,
    )
    .await?;
    if !service_created {
        outcome.updated |= refresh_service(api, namespace, service, tier).await?;
    }
    Ok(outcome)
}

fn generate_credentials() -> DatabaseCredentials {
    DatabaseCredentials {
        username: DEFAULT_DATABASE_USER.to_string(),
        password: random_password(),
        root_password: random_password(),
    }
}

fn random_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Overwrites the spec of the live deployment with the desired one.
async fn rewrite_deployment<A: ApiServer>(
    api: &A,
    namespace: &str,
    desired: appsv1::Deployment,
) -> Result<(), Error> {
    let name = object_name(&desired)?;
    let live = api
        .get::<appsv1::Deployment>(namespace, &name)
        .await
        .map_err(|e| Error::ReconcileDeploymentFailed(name.clone(), e))?;
    replace_deployment(api, namespace, live, desired).await
}

/// Rewrites the live deployment unless it was last written for `tier`.
/// Returns whether it was rewritten.
async fn refresh_deployment<A: ApiServer>(
    api: &A,
    namespace: &str,
    desired: appsv1::Deployment,
    tier: &TierSpec,
) -> Result<bool, Error> {
    let name = object_name(&desired)?;
    let live = api
        .get::<appsv1::Deployment>(namespace, &name)
        .await
        .map_err(|e| Error::ReconcileDeploymentFailed(name.clone(), e))?;
    if applied_tier(&live).as_ref() == Some(tier) {
        return Ok(false);
    }
    replace_deployment(api, namespace, live, desired).await?;
    Ok(true)
}

async fn replace_deployment<A: ApiServer>(
    api: &A,
    namespace: &str,
    live: appsv1::Deployment,
    desired: appsv1::Deployment,
) -> Result<(), Error> {
    let name = object_name(&desired)?;
    info!("Update deployment: {}", name);
    let mut updated = appsv1::Deployment {
        spec: desired.spec,
        ..live
    };
    merge_annotations(&mut updated, desired.metadata.annotations);
    api.replace(namespace, &updated)
        .await
        .map_err(|e| Error::ReconcileDeploymentFailed(name, e))?;
    Ok(())
}

/// Overwrites the spec of the live service with the desired one, keeping the
/// addresses the API server allocated to it.
async fn rewrite_service<A: ApiServer>(
    api: &A,
    namespace: &str,
    desired: corev1::Service,
) -> Result<(), Error> {
    let name = object_name(&desired)?;
    let live = api
        .get::<corev1::Service>(namespace, &name)
        .await
        .map_err(|e| Error::ReconcileServiceFailed(name.clone(), e))?;
    replace_service(api, namespace, live, desired).await
}

async fn refresh_service<A: ApiServer>(
    api: &A,
    namespace: &str,
    desired: corev1::Service,
    tier: &TierSpec,
) -> Result<bool, Error> {
    let name = object_name(&desired)?;
    let live = api
        .get::<corev1::Service>(namespace, &name)
        .await
        .map_err(|e| Error::ReconcileServiceFailed(name.clone(), e))?;
    if applied_tier(&live).as_ref() == Some(tier) {
        return Ok(false);
    }
    replace_service(api, namespace, live, desired).await?;
    Ok(true)
}

async fn replace_service<A: ApiServer>(
    api: &A,
    namespace: &str,
    live: corev1::Service,
    desired: corev1::Service,
) -> Result<(), Error> {
    let name = object_name(&desired)?;
    info!("Update service: {}", name);
    let spec = preserve_allocated_fields(desired.spec.unwrap_or_default(), live.spec.as_ref());
    let mut updated = corev1::Service {
        spec: Some(spec),
        ..live
    };
    merge_annotations(&mut updated, desired.metadata.annotations);
    api.replace(namespace, &updated)
        .await
        .map_err(|e| Error::ReconcileServiceFailed(name, e))?;
    Ok(())
}

fn object_name<K: Resource>(obj: &K) -> Result<String, Error> {
    obj.meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.name"))
}

fn merge_annotations<K: Resource>(
    obj: &mut K,
    annotations: Option<std::collections::BTreeMap<String, String>>,
) {
    if let Some(annotations) = annotations {
        obj.meta_mut()
            .annotations
            .get_or_insert_with(Default::default)
            .extend(annotations);
    }
}

/// preserve_allocated_fields copies what the API server assigned to a service
/// (its cluster addresses and node ports) into a freshly built spec. These fields
/// are immutable or would otherwise be reallocated on every update.
pub fn preserve_allocated_fields(
    mut desired: corev1::ServiceSpec,
    live: Option<&corev1::ServiceSpec>,
) -> corev1::ServiceSpec {
    // ExternalName services are given no cluster address.
    let live = match live {
        Some(live) if desired.type_.as_deref() != Some("ExternalName") => live,
        _ => return desired,
    };
    if desired.cluster_ip.is_none() {
        desired.cluster_ip = live.cluster_ip.clone();
        desired.cluster_ips = live.cluster_ips.clone();
    }
    if desired.ip_families.is_none() {
        desired.ip_families = live.ip_families.clone();
    }
    if desired.ip_family_policy.is_none() {
        desired.ip_family_policy = live.ip_family_policy.clone();
    }
    let exposes_node_ports = matches!(
        desired.type_.as_deref(),
        Some("NodePort") | Some("LoadBalancer")
    );
    if exposes_node_ports {
        if desired.health_check_node_port.is_none() {
            desired.health_check_node_port = live.health_check_node_port;
        }
        let live_ports = live.ports.clone().unwrap_or_default();
        for port in desired.ports.iter_mut().flatten() {
            if port.node_port.is_some() {
                continue;
            }
            port.node_port = live_ports
                .iter()
                .find(|live_port| {
                    live_port.port == port.port && protocol(live_port) == protocol(port)
                })
                .and_then(|live_port| live_port.node_port);
        }
    }
    desired
}

fn protocol(port: &corev1::ServicePort) -> &str {
    port.protocol.as_deref().unwrap_or("TCP")
}

/// Deletes children named by the previous spec that the current spec no longer
/// names, network objects first so nothing points at a removed workload.
async fn prune_stale_children<A: ApiServer>(
    api: &A,
    namespace: &str,
    ws_name: &str,
    last_applied: Option<&WebServiceSpec>,
    current: &WebServiceSpec,
) -> Result<(), Error> {
    let last = match last_applied {
        None => return Ok(()),
        Some(last) => last,
    };
    let stale = webservice_child_names(ws_name, last)
        .stale_relative_to(&webservice_child_names(ws_name, current));
    if stale.is_empty() {
        return Ok(());
    }
    for name in &stale.services {
        info!("Delete stale service: {}", name);
        delete_ignoring_absent::<corev1::Service, A>(api, namespace, name)
            .await
            .map_err(|e| Error::ReconcileServiceFailed(name.clone(), e))?;
    }
    for name in &stale.deployments {
        info!("Delete stale deployment: {}", name);
        delete_ignoring_absent::<appsv1::Deployment, A>(api, namespace, name)
            .await
            .map_err(|e| Error::ReconcileDeploymentFailed(name.clone(), e))?;
    }
    for name in &stale.secrets {
        info!("Delete stale secret: {}", name);
        delete_ignoring_absent::<corev1::Secret, A>(api, namespace, name)
            .await
            .map_err(|e| Error::ReconcileSecretFailed(name.clone(), e))?;
    }
    Ok(())
}
