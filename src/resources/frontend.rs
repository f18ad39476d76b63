// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::common::*;
use crate::resources::*;
use crate::webservice_types::*;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::Resource;

pub fn make_frontend_deployment(ws: &WebService) -> appsv1::Deployment {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    let database = &ws.spec.database;
    let secret_name = database_secret_name(&ws_name, database);
    let mut env = ws.spec.frontend.envs.clone().unwrap_or_default();
    env.push(corev1::EnvVar {
        name: "DATABASE_HOST".to_string(),
        value: Some(tier_service_name(&ws_name, database)),
        ..corev1::EnvVar::default()
    });
    if let Some(port) = database.ports.first() {
        env.push(corev1::EnvVar {
            name: "DATABASE_PORT".to_string(),
            value: Some(port.port.to_string()),
            ..corev1::EnvVar::default()
        });
    }
    env.extend([
        secret_env_var("DATABASE_USER", &secret_name, SECRET_USERNAME_KEY),
        secret_env_var("DATABASE_PASSWORD", &secret_name, SECRET_PASSWORD_KEY),
    ]);
    make_tier_deployment(
        ws,
        &ws.spec.frontend,
        tier_labels(&ws_name, FRONTEND_TIER),
        env,
    )
}

pub fn make_frontend_service(ws: &WebService) -> corev1::Service {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    make_tier_service(
        ws,
        &ws.spec.frontend,
        tier_labels(&ws_name, FRONTEND_TIER),
        "NodePort",
    )
}
