// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::error::Error;
use crate::kubernetes_api::{delete_ignoring_absent, get_opt, ApiServer};
use crate::podset_types::*;
use crate::reconciler::*;
use crate::resources::make_pods;
use crate::tracker::TrackedPods;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::Resource;
use tracing::*;

/// reconcile_podset drives the pods of one PodSet towards `spec.replicas`.
///
/// The decision is taken afresh from the cluster on every call:
/// a PodSet being deleted, or tracking more pods than it wants, loses pods from
/// the tail of its tracked list; otherwise every missing position is created and
/// recorded. Calling it again with nothing changed issues no writes.
pub async fn reconcile_podset<A: ApiServer>(
    data: &Data<A>,
    namespace: &str,
    name: &str,
) -> Result<ReconcileReport, Error> {
    let api = &data.api;
    let ps = match get_opt::<PodSet, A>(api, namespace, name)
        .await
        .map_err(|e| Error::CRGetFailed(name.to_string(), e))?
    {
        None => {
            info!(podset = name, "not found, end reconcile");
            return Ok(ReconcileReport::done(ReconcilePhase::Absent));
        }
        Some(ps) => ps,
    };

    let tracked = TrackedPods::from_podset(&ps)?;
    let deleting = ps.meta().deletion_timestamp.is_some();
    let desired = if deleting {
        0
    } else {
        ps.spec.desired_replicas()
    };

    if deleting || tracked.len() > desired {
        scale_down(api, namespace, ps, tracked, desired).await
    } else {
        scale_up(api, namespace, ps, tracked).await
    }
}

async fn scale_down<A: ApiServer>(
    api: &A,
    namespace: &str,
    mut ps: PodSet,
    mut tracked: TrackedPods,
    desired: usize,
) -> Result<ReconcileReport, Error> {
    let surplus = tracked.truncate(desired);
    if surplus.is_empty() {
        return Ok(ReconcileReport::done(ReconcilePhase::Terminating));
    }
    info!(
        podset = tracked.podset_name(),
        from = tracked.len() + surplus.len(),
        to = desired,
        "Scale down"
    );
    for pod in &surplus {
        info!("Delete pod: {}", pod);
        delete_ignoring_absent::<corev1::Pod, A>(api, namespace, pod)
            .await
            .map_err(|e| Error::ReconcilePodFailed(pod.clone(), e))?;
    }
    tracked.apply_to(&mut ps);
    api.replace(namespace, &ps)
        .await
        .map_err(|e| Error::CRUpdateFailed(tracked.podset_name().to_string(), e))?;
    Ok(ReconcileReport::done(ReconcilePhase::Terminating))
}

async fn scale_up<A: ApiServer>(
    api: &A,
    namespace: &str,
    mut ps: PodSet,
    mut tracked: TrackedPods,
) -> Result<ReconcileReport, Error> {
    let mut created = 0;
    let mut list_changed = false;
    for pod in make_pods(&ps) {
        let pod_name = pod.meta().name.clone().unwrap_or_default();
        if ensure_child(api, &ps, namespace, pod, "Pod", Error::ReconcilePodFailed).await? {
            created += 1;
        }
        list_changed |= tracked.track(&pod_name);
    }

    if list_changed {
        tracked.apply_to(&mut ps);
        api.replace(namespace, &ps)
            .await
            .map_err(|e| Error::CRUpdateFailed(tracked.podset_name().to_string(), e))?;
    }

    if created > 0 || list_changed {
        info!(
            podset = tracked.podset_name(),
            created,
            tracked = tracked.len(),
            "Scale up"
        );
        Ok(ReconcileReport::done(ReconcilePhase::Scaling))
    } else {
        Ok(ReconcileReport::done(ReconcilePhase::Steady))
    }
}
