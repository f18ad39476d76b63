// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::common::*;
use crate::resources::*;
use crate::webservice_types::*;
use k8s_openapi::api::apps::v1 as appsv1;
use k8s_openapi::api::core::v1 as corev1;
use kube::api::{ObjectMeta, Resource};
use std::collections::BTreeMap;

/// Credentials stored in the database secret.
/// They are only generated when the secret is first created.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseCredentials {
    pub username: String,
    pub password: String,
    pub root_password: String,
}

pub fn make_database_secret(ws: &WebService, credentials: &DatabaseCredentials) -> corev1::Secret {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    corev1::Secret {
        metadata: ObjectMeta {
            name: Some(database_secret_name(&ws_name, &ws.spec.database)),
            namespace: ws.meta().namespace.clone(),
            labels: Some(tier_labels(&ws_name, DATABASE_TIER)),
            ..ObjectMeta::default()
        },
        type_: Some("Opaque".to_string()),
        string_data: Some(BTreeMap::from([
            (
                SECRET_USERNAME_KEY.to_string(),
                credentials.username.clone(),
            ),
            (
                SECRET_PASSWORD_KEY.to_string(),
                credentials.password.clone(),
            ),
            (
                SECRET_ROOT_PASSWORD_KEY.to_string(),
                credentials.root_password.clone(),
            ),
        ])),
        ..corev1::Secret::default()
    }
}

pub fn make_database_deployment(ws: &WebService) -> appsv1::Deployment {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    let secret_name = database_secret_name(&ws_name, &ws.spec.database);
    let mut env = ws.spec.database.envs.clone().unwrap_or_default();
    env.extend([
        secret_env_var("MYSQL_ROOT_PASSWORD", &secret_name, SECRET_ROOT_PASSWORD_KEY),
        corev1::EnvVar {
            name: "MYSQL_DATABASE".to_string(),
            value: Some(DATABASE_SCHEMA.to_string()),
            ..corev1::EnvVar::default()
        },
        secret_env_var("MYSQL_USER", &secret_name, SECRET_USERNAME_KEY),
        secret_env_var("MYSQL_PASSWORD", &secret_name, SECRET_PASSWORD_KEY),
    ]);
    make_tier_deployment(
        ws,
        &ws.spec.database,
        tier_labels(&ws_name, DATABASE_TIER),
        env,
    )
}

pub fn make_database_service(ws: &WebService) -> corev1::Service {
    let ws_name = ws.meta().name.clone().unwrap_or_default();
    make_tier_service(
        ws,
        &ws.spec.database,
        tier_labels(&ws_name, DATABASE_TIER),
        "ClusterIP",
    )
}
