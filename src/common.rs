// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::webservice_types::*;
use std::collections::BTreeMap;

pub const TRACKING_FINALIZER_PREFIX: &str = "podset.anvil.dev/";
pub const POD_INDEX_LABEL: &str = "podset.anvil.dev/index";
pub const LAST_APPLIED_SPEC_ANNOTATION: &str = "webservice.anvil.dev/last-applied-spec";
pub const APPLIED_TIER_ANNOTATION: &str = "webservice.anvil.dev/applied-tier";

pub const DATABASE_TIER: &str = "database";
pub const FRONTEND_TIER: &str = "frontend";
pub const DATABASE_SCHEMA: &str = "webservice";

pub const SECRET_USERNAME_KEY: &str = "username";
pub const SECRET_PASSWORD_KEY: &str = "password";
pub const SECRET_ROOT_PASSWORD_KEY: &str = "root-password";
pub const DEFAULT_DATABASE_USER: &str = "demo";

pub fn pod_name(podset_name: &str, index: usize) -> String {
    format!("{}-{}", podset_name, index)
}

pub fn tracking_finalizer(pod_name: &str) -> String {
    format!("{}{}", TRACKING_FINALIZER_PREFIX, pod_name)
}

pub fn podset_labels(podset_name: &str) -> BTreeMap<String, String> {
    BTreeMap::from([("app".to_string(), podset_name.to_string())])
}

pub fn tier_workload_name(ws_name: &str, tier: &TierSpec) -> String {
    format!("{}-{}", ws_name, tier.name)
}

pub fn tier_service_name(ws_name: &str, tier: &TierSpec) -> String {
    format!("{}-{}", ws_name, tier.name)
}

pub fn database_secret_name(ws_name: &str, database: &TierSpec) -> String {
    format!("{}-{}-auth", ws_name, database.name)
}

pub fn tier_labels(ws_name: &str, tier_role: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        ("app".to_string(), "webservice".to_string()),
        ("tier".to_string(), tier_role.to_string()),
        ("webservice-cr".to_string(), ws_name.to_string()),
    ])
}

/// Names of every child a WebService with this spec owns, grouped by kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebServiceChildNames {
    pub secrets: Vec<String>,
    pub deployments: Vec<String>,
    pub services: Vec<String>,
}

pub fn webservice_child_names(ws_name: &str, spec: &WebServiceSpec) -> WebServiceChildNames {
    WebServiceChildNames {
        secrets: vec![database_secret_name(ws_name, &spec.database)],
        deployments: vec![
            tier_workload_name(ws_name, &spec.database),
            tier_workload_name(ws_name, &spec.frontend),
        ],
        services: vec![
            tier_service_name(ws_name, &spec.database),
            tier_service_name(ws_name, &spec.frontend),
        ],
    }
}

impl WebServiceChildNames {
    /// Names present in `self` but not in `current`.
    pub fn stale_relative_to(&self, current: &WebServiceChildNames) -> WebServiceChildNames {
        fn missing(old: &[String], new: &[String]) -> Vec<String> {
            old.iter().filter(|name| !new.contains(name)).cloned().collect()
        }
        WebServiceChildNames {
            secrets: missing(&self.secrets, &current.secrets),
            deployments: missing(&self.deployments, &current.deployments),
            services: missing(&self.services, &current.services),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty() && self.deployments.is_empty() && self.services.is_empty()
    }
}
