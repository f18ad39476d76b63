// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

//! The shim layer connects the reconcilers to the kube-rs APIs.
//!
//! Reconcilers only see the `ApiServer` trait; here it is backed by a real
//! `kube::Client`, and the kube-rs `Controller` decides when to invoke them.
pub mod controller_runtime;

pub use controller_runtime::*;

use crate::kubernetes_api::{APIError, ApiServer, KubeObject};
use async_trait::async_trait;
use kube::{
    api::{Api, DeleteParams, PostParams},
    Client,
};

/// KubeApiServer sends every request straight to the cluster.
#[derive(Clone)]
pub struct KubeApiServer {
    client: Client,
}

impl KubeApiServer {
    pub fn new(client: Client) -> KubeApiServer {
        KubeApiServer { client }
    }

    fn api<K: KubeObject>(&self, namespace: &str) -> Api<K> {
        Api::<K>::namespaced(self.client.clone(), namespace)
    }
}

#[async_trait]
impl ApiServer for KubeApiServer {
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K, APIError> {
        self.api::<K>(namespace)
            .get(name)
            .await
            .map_err(APIError::from)
    }

    async fn create<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        self.api::<K>(namespace)
            .create(&PostParams::default(), obj)
            .await
            .map_err(APIError::from)
    }

    async fn replace<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        let name = obj
            .meta()
            .name
            .clone()
            .ok_or_else(|| APIError::Invalid("metadata.name is required".to_string()))?;
        self.api::<K>(namespace)
            .replace(&name, &PostParams::default(), obj)
            .await
            .map_err(APIError::from)
    }

    async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), APIError> {
        self.api::<K>(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .map(|_| ())
            .map_err(APIError::from)
    }
}
