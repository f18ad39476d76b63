// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod error;

pub use error::APIError;

use async_trait::async_trait;
use core::fmt::Debug;
use kube::Resource;
use kube_core::NamespaceResourceScope;
use serde::{de::DeserializeOwned, Serialize};

/// Any namespaced object the reconcilers read or write.
pub trait KubeObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + DeserializeOwned
    + Serialize
    + Send
    + Sync
    + 'static
{
}

impl<K> KubeObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + Debug
        + DeserializeOwned
        + Serialize
        + Send
        + Sync
        + 'static
{
}

/// ApiServer is everything the reconcilers need from the cluster.
/// Each call is a single request; nothing is cached or retried here.
#[async_trait]
pub trait ApiServer: Send + Sync {
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K, APIError>;

    async fn create<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError>;

    /// Replaces the whole object. A set `.metadata.resourceVersion` that is
    /// no longer current fails with `APIError::Conflict`.
    async fn replace<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError>;

    async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), APIError>;
}

/// get_opt turns `ObjectNotFound` into `None`; every other failure is kept.
pub async fn get_opt<K, A>(api: &A, namespace: &str, name: &str) -> Result<Option<K>, APIError>
where
    K: KubeObject,
    A: ApiServer,
{
    match api.get::<K>(namespace, name).await {
        Ok(obj) => Ok(Some(obj)),
        Err(e) if e.is_object_not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

/// delete_ignoring_absent treats deleting an object that is already gone as success.
pub async fn delete_ignoring_absent<K, A>(
    api: &A,
    namespace: &str,
    name: &str,
) -> Result<(), APIError>
where
    K: KubeObject,
    A: ApiServer,
{
    match api.delete::<K>(namespace, name).await {
        Err(e) if e.is_object_not_found() => Ok(()),
        res => res,
    }
}
