// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

//! Builders for every child object the controllers create.
//! They are pure functions of the parent: no cluster state is consulted,
//! and the same parent always yields the same objects.
pub mod database;
pub mod frontend;
pub mod pod;

pub use database::*;
pub use frontend::*;
pub use pod::*;

use crate::error::Error;
use crate::webservice_types::*;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use k8s_openapi::apimachinery::pkg::apis::meta::v1 as metav1;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::api::{ObjectMeta, Resource};
use std::collections::BTreeMap;

/// set_controller_owner makes `parent` the controlling owner of `child`, so deleting
/// the parent cascades to the child.
pub fn set_controller_owner<P, C>(child: &mut C, parent: &P) -> Result<(), Error>
where
    P: Resource<DynamicType = ()>,
    C: Resource,
{
    let owner_ref = parent
        .controller_owner_ref(&())
        .ok_or(Error::MissingObjectKey(".metadata.uid"))?;
    child.meta_mut().owner_references = Some(vec![owner_ref]);
    Ok(())
}

/// is_controlled_by checks whether `child` carries a controller owner reference to `parent`.
pub fn is_controlled_by<P, C>(child: &C, parent: &P) -> bool
where
    P: Resource,
    C: Resource,
{
    match parent.meta().uid.as_ref() {
        None => false,
        Some(uid) => child
            .meta()
            .owner_references
            .as_ref()
            .map(|refs| {
                refs.iter()
                    .any(|oref| oref.controller == Some(true) && &oref.uid == uid)
            })
            .unwrap_or(false),
    }
}

pub(crate) fn secret_env_var(name: &str, secret_name: &str, key: &str) -> corev1::EnvVar {
    corev1::EnvVar {
        name: name.to_string(),
        value_from: Some(corev1::EnvVarSource {
            secret_key_ref: Some(corev1::SecretKeySelector {
                name: Some(secret_name.to_string()),
                key: key.to_string(),
                ..corev1::SecretKeySelector::default()
            }),
            ..corev1::EnvVarSource::default()
        }),
        ..corev1::EnvVar::default()
    }
}

pub(crate) fn container_ports(tier: &TierSpec) -> Vec<corev1::ContainerPort> {
    tier.ports
        .iter()
        .map(|svc_port| corev1::ContainerPort {
            name: svc_port.name.clone(),
            container_port: match svc_port.target_port {
                Some(IntOrString::Int(port)) => port,
                _ => svc_port.port,
            },
            protocol: svc_port.protocol.clone(),
            ..corev1::ContainerPort::default()
        })
        .collect()
}

pub(crate) fn make_tier_deployment(
    ws: &WebService,
    tier: &TierSpec,
    labels: BTreeMap<String, String>,
    env: Vec<corev1::EnvVar>,
) -> appsv1::Deployment {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    appsv1::Deployment {
        metadata: ObjectMeta {
            name: Some(crate::common::tier_workload_name(&ws_name, tier)),
            namespace: ws.meta().namespace.clone(),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(appsv1::DeploymentSpec {
            replicas: tier.size,
            selector: metav1::LabelSelector {
                match_labels: Some(labels.clone()),
                ..metav1::LabelSelector::default()
            },
            template: corev1::PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels),
                    ..ObjectMeta::default()
                }),
                spec: Some(corev1::PodSpec {
                    containers: vec![corev1::Container {
                        name: tier.name.clone(),
                        image: Some(tier.image.clone()),
                        image_pull_policy: Some("IfNotPresent".to_string()),
                        resources: tier.resources.clone(),
                        ports: Some(container_ports(tier)),
                        env: Some(env),
                        ..corev1::Container::default()
                    }],
                    ..corev1::PodSpec::default()
                }),
            },
            ..appsv1::DeploymentSpec::default()
        }),
        ..appsv1::Deployment::default()
    }
}

pub(crate) fn make_tier_service(
    ws: &WebService,
    tier: &TierSpec,
    labels: BTreeMap<String, String>,
    default_type: &str,
) -> corev1::Service {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    corev1::Service {
        metadata: ObjectMeta {
            name: Some(crate::common::tier_service_name(&ws_name, tier)),
            namespace: ws.meta().namespace.clone(),
            labels: Some(labels.clone()),
            ..ObjectMeta::default()
        },
        spec: Some(corev1::ServiceSpec {
            type_: Some(
                tier.service_type
                    .clone()
                    .unwrap_or_else(|| default_type.to_string()),
            ),
            ports: Some(tier.ports.clone()),
            selector: Some(labels),
            ..corev1::ServiceSpec::default()
        }),
        ..corev1::Service::default()
    }
}
