// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const DEFAULT_POD_IMAGE: &str = "redis:5-alpine";

/// PodSet asks for `replicas` identical pods named `<podset>-0 .. <podset>-(replicas-1)`.
/// The pods the controller believes it created are recorded, in scale order,
/// as finalizers on the PodSet itself.
#[derive(CustomResource, Debug, Clone, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(group = "anvil.dev", version = "v1", kind = "PodSet")]
#[kube(shortname = "ps", namespaced)]
pub struct PodSetSpec {
    pub replicas: i32,
    pub port: i32,
    #[serde(default = "default_pod_image")]
    pub image: String,
}

fn default_pod_image() -> String {
    DEFAULT_POD_IMAGE.to_string()
}

impl PodSetSpec {
    pub fn desired_replicas(&self) -> usize {
        usize::try_from(self.replicas).unwrap_or(0)
    }
}
