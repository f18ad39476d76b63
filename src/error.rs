// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::kubernetes_api::APIError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Failed to get CR {0}: {1}")]
    CRGetFailed(String, #[source] APIError),
    #[error("Failed to update CR {0}: {1}")]
    CRUpdateFailed(String, #[source] APIError),
    #[error("Failed to reconcile Pod {0}: {1}")]
    ReconcilePodFailed(String, #[source] APIError),
    #[error("Failed to reconcile Secret {0}: {1}")]
    ReconcileSecretFailed(String, #[source] APIError),
    #[error("Failed to reconcile Deployment {0}: {1}")]
    ReconcileDeploymentFailed(String, #[source] APIError),
    #[error("Failed to reconcile Service {0}: {1}")]
    ReconcileServiceFailed(String, #[source] APIError),
    #[error("Failed to encode last applied spec: {0}")]
    SnapshotEncodeFailed(#[source] serde_json::Error),
    #[error("Failed to decode last applied spec of {0}: {1}")]
    SnapshotDecodeFailed(String, #[source] serde_json::Error),
    #[error("{kind} {name} exists but is not controlled by {owner}")]
    ChildNotOwned {
        kind: &'static str,
        name: String,
        owner: String,
    },
    #[error("Tracked pod list of {0} is corrupted: {1}")]
    InvariantViolation(String, String),
    #[error("MissingObjectKey: {0}")]
    MissingObjectKey(&'static str),
}
