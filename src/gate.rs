// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api::{get_opt, APIError, ApiServer};
use k8s_openapi::api::apps::v1 as appsv1;

/// deployment_ready reports whether at least one replica of the deployment is ready.
/// It is read afresh on every call. A deployment that does not exist is simply
/// not ready; only failures to ask are errors.
pub async fn deployment_ready<A: ApiServer>(
    api: &A,
    namespace: &str,
    name: &str,
) -> Result<bool, APIError> {
    let deployment = get_opt::<appsv1::Deployment, A>(api, namespace, name).await?;
    Ok(deployment
        .and_then(|d| d.status)
        .and_then(|status| status.ready_replicas)
        .map(|ready| ready >= 1)
        .unwrap_or(false))
}
