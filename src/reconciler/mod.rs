// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod podset;
pub mod webservice;

pub use podset::reconcile_podset;
pub use webservice::reconcile_webservice;

use crate::config::ControllerConfig;
use crate::error::Error;
use crate::kubernetes_api::{get_opt, APIError, ApiServer, KubeObject};
use crate::resources::{is_controlled_by, set_controller_owner};
use kube::api::Resource;
use std::time::Duration;
use tracing::*;

/// Data is shared by every reconcile invocation of a controller.
pub struct Data<A> {
    pub api: A,
    pub config: ControllerConfig,
}

/// ReconcilePhase names the decision an invocation made. It is inferred from
/// the cluster every time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcilePhase {
    /// The parent no longer exists.
    Absent,
    Terminating,
    Scaling,
    WaitingOnDependency,
    Provisioning,
    Updating,
    Steady,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileReport {
    pub phase: ReconcilePhase,
    /// Set when the invocation should be repeated after a delay without counting as a failure.
    pub retry_after: Option<Duration>,
}

impl ReconcileReport {
    pub fn done(phase: ReconcilePhase) -> ReconcileReport {
        ReconcileReport {
            phase,
            retry_after: None,
        }
    }

    pub fn retry_after(phase: ReconcilePhase, delay: Duration) -> ReconcileReport {
        ReconcileReport {
            phase,
            retry_after: Some(delay),
        }
    }
}

/// ensure_child creates `desired` unless an object with its name already exists.
/// Returns whether it created anything.
pub(crate) async fn ensure_child<K, P, A>(
    api: &A,
    parent: &P,
    namespace: &str,
    desired: K,
    kind: &'static str,
    wrap: fn(String, APIError) -> Error,
) -> Result<bool, Error>
where
    K: KubeObject,
    P: Resource<DynamicType = ()> + Sync,
    A: ApiServer,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    ensure_child_with(api, parent, namespace, &name, kind, move || desired, wrap).await
}

/// ensure_child_with is ensure_child for objects that should only be built when
/// they are actually missing.
pub(crate) async fn ensure_child_with<K, P, A, F>(
    api: &A,
    parent: &P,
    namespace: &str,
    name: &str,
    kind: &'static str,
    build: F,
    wrap: fn(String, APIError) -> Error,
) -> Result<bool, Error>
where
    K: KubeObject,
    P: Resource<DynamicType = ()> + Sync,
    A: ApiServer,
    F: FnOnce() -> K + Send,
{
    let existing = get_opt::<K, A>(api, namespace, name)
        .await
        .map_err(|e| wrap(name.to_string(), e))?;
    match existing {
        Some(obj) => {
            check_controlled(&obj, parent, kind, name)?;
            Ok(false)
        }
        None => create_child(api, parent, namespace, build(), kind, wrap).await,
    }
}

/// create_child sets the owner reference and creates the object. `AlreadyExists`
/// means an earlier invocation got there first; that is fine as long as the
/// object belongs to `parent`.
pub(crate) async fn create_child<K, P, A>(
    api: &A,
    parent: &P,
    namespace: &str,
    mut desired: K,
    kind: &'static str,
    wrap: fn(String, APIError) -> Error,
) -> Result<bool, Error>
where
    K: KubeObject,
    P: Resource<DynamicType = ()> + Sync,
    A: ApiServer,
{
    let name = desired
        .meta()
        .name
        .clone()
        .ok_or(Error::MissingObjectKey(".metadata.name"))?;
    set_controller_owner(&mut desired, parent)?;
    info!("Create {}: {}", kind, name);
    match api.create(namespace, &desired).await {
        Ok(_) => Ok(true),
        Err(e) if e.is_object_already_exists() => {
            let existing = api
                .get::<K>(namespace, &name)
                .await
                .map_err(|e| wrap(name.clone(), e))?;
            check_controlled(&existing, parent, kind, &name)?;
            debug!("{} {} was created by an earlier reconcile", kind, name);
            Ok(false)
        }
        Err(e) => Err(wrap(name, e)),
    }
}

fn check_controlled<K, P>(obj: &K, parent: &P, kind: &'static str, name: &str) -> Result<(), Error>
where
    K: Resource,
    P: Resource,
{
    if is_controlled_by(obj, parent) {
        Ok(())
    } else {
        Err(Error::ChildNotOwned {
            kind,
            name: name.to_string(),
            owner: parent.meta().name.clone().unwrap_or_default(),
        })
    }
}
