// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::common::*;
use crate::podset_types::*;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{ObjectMeta, Resource};

/// make_pods returns the pods the PodSet asks for, in scale order:
/// the i-th pod is named `<podset>-i`.
pub fn make_pods(ps: &PodSet) -> Vec<corev1::Pod> {
    (0..ps.spec.desired_replicas())
        .map(|index| make_pod(ps, index))
        .collect()
}

pub fn make_pod(ps: &PodSet, index: usize) -> corev1::Pod {
    let ps_name = ps.meta().name.clone().unwrap_or_default();
    let mut labels = podset_labels(&ps_name);
    labels.insert(POD_INDEX_LABEL.to_string(), index.to_string());
    corev1::Pod {
        metadata: ObjectMeta {
            name: Some(pod_name(&ps_name, index)),
            namespace: ps.meta().namespace.clone(),
            labels: Some(labels),
            ..ObjectMeta::default()
        },
        spec: Some(corev1::PodSpec {
            containers: vec![corev1::Container {
                name: ps_name,
                image: Some(ps.spec.image.clone()),
                image_pull_policy: Some("IfNotPresent".to_string()),
                ports: Some(vec![corev1::ContainerPort {
                    container_port: ps.spec.port,
                    ..corev1::ContainerPort::default()
                }]),
                ..corev1::Container::default()
            }],
            ..corev1::PodSpec::default()
        }),
        ..corev1::Pod::default()
    }
}
