// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::config::ControllerConfig;
use crate::error::Error;
use crate::kubernetes_api::ApiServer;
use crate::podset_types::PodSet;
use crate::reconciler::*;
use crate::shim_layer::KubeApiServer;
use crate::webservice_types::WebService;
use anyhow::Result;
use futures::StreamExt;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::{
    api::Api,
    runtime::{
        controller::{self, Action, Controller},
        reflector::ObjectRef,
        watcher,
    },
    Client, Resource,
};
use std::sync::Arc;
use tracing::*;

pub fn report_controller_reconciled<K, QueueErr>(
    controller_name: &str,
    result: &Result<(ObjectRef<K>, Action), controller::Error<Error, QueueErr>>,
) where
    K: Resource,
    QueueErr: std::error::Error,
{
    match result {
        Ok((obj, _)) => {
            info!(
                controller.name = controller_name,
                object = %obj,
                "Reconciled object"
            );
        }
        Err(err) => {
            error!(
                controller.name = controller_name,
                error = err as &dyn std::error::Error,
                "Failed to reconcile object",
            );
        }
    }
}

/// run_controllers runs the PodSet and WebService controllers until a shutdown signal.
/// Each controller is also triggered by changes to the children it owns.
pub async fn run_controllers(config: ControllerConfig) -> Result<()> {
    let client = Client::try_default().await?;
    let data = Arc::new(Data {
        api: KubeApiServer::new(client.clone()),
        config,
    });

    let podset_controller = Controller::new(
        Api::<PodSet>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<corev1::Pod>::all(client.clone()),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(podset_reconcile, error_policy, data.clone())
    .map(|res| report_controller_reconciled("podset-controller", &res));

    let webservice_controller = Controller::new(
        Api::<WebService>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<appsv1::Deployment>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<corev1::Service>::all(client.clone()),
        watcher::Config::default(),
    )
    .owns(
        Api::<corev1::Secret>::all(client.clone()),
        watcher::Config::default(),
    )
    .shutdown_on_signal()
    .run(webservice_reconcile, error_policy, data)
    .map(|res| report_controller_reconciled("webservice-controller", &res));

    futures::stream::select(podset_controller, webservice_controller)
        .collect::<()>()
        .await;
    info!("controllers terminated");
    Ok(())
}

pub async fn podset_reconcile<A: ApiServer>(
    ps: Arc<PodSet>,
    data: Arc<Data<A>>,
) -> Result<Action, Error> {
    let (namespace, name) = object_key(ps.as_ref())?;
    let report = reconcile_podset(&data, &namespace, &name).await?;
    Ok(requeue_action(&report, &data.config))
}

pub async fn webservice_reconcile<A: ApiServer>(
    ws: Arc<WebService>,
    data: Arc<Data<A>>,
) -> Result<Action, Error> {
    let (namespace, name) = object_key(ws.as_ref())?;
    let report = reconcile_webservice(&data, &namespace, &name).await?;
    Ok(requeue_action(&report, &data.config))
}

pub fn error_policy<K: Resource, A>(obj: Arc<K>, error: &Error, data: Arc<Data<A>>) -> Action {
    warn!(
        "Reconcile of {} failed: {}, requeue after {:?}",
        obj.meta().name.as_deref().unwrap_or_default(),
        error,
        data.config.error_requeue_delay
    );
    Action::requeue(data.config.error_requeue_delay)
}

/// Turns what a reconcile decided into when it should run next.
pub fn requeue_action(report: &ReconcileReport, config: &ControllerConfig) -> Action {
    match (report.retry_after, report.phase) {
        (Some(delay), _) => Action::requeue(delay),
        (None, ReconcilePhase::Absent) => Action::await_change(),
        (None, _) => Action::requeue(config.resync_period),
    }
}

fn object_key<K: Resource>(obj: &K) -> Result<(String, String), Error> {
    let name = obj
        .meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    let namespace = obj
        .meta()
        .namespace
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.namespace"))?;
    Ok((namespace, name))
}
