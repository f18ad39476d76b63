// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use crate::executable_model::object_map::*;
use crate::kubernetes_api::{APIError, ApiServer, KubeObject};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::{json, Value};
use std::sync::{Mutex, MutexGuard, PoisonError};

const CUSTOM_RESOURCE_GROUP_SUFFIX: &str = "anvil.dev";
const DELETION_TIMESTAMP: &str = "2024-01-01T00:00:00Z";
const CLUSTER_IP_PREFIX: &str = "10.96.0.";
const NODE_PORT_BASE: i64 = 30000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Get,
    Create,
    Update,
    Delete,
}

impl Verb {
    pub fn mutates(self) -> bool {
        self != Verb::Get
    }
}

/// One request as seen by the simulated API server, recorded whether or not it succeeded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub verb: Verb,
    pub kind: String,
    pub name: String,
}

#[derive(Debug, Default)]
struct ApiServerState {
    resources: ObjectMap,
    resource_version_counter: i64,
    uid_counter: i64,
    cluster_ip_counter: u32,
    node_port_counter: i64,
    requests: Vec<Request>,
    mutation_counter: usize,
    fail_at_mutation: Option<usize>,
}

/// SimulatedApiServer is an in-memory stand-in for the Kubernetes API server.
///
/// It keeps the parts of the real behavior the controllers depend on:
/// resource versions and uids are assigned on write, custom resources can only be
/// replaced with a current resourceVersion, status survives a replace, an unchanged
/// replace is a no-op, objects with finalizers are only marked on delete, and
/// deleting an owner deletes what it owns. Services get a cluster IP and node
/// ports allocated the way a real cluster would, and the cluster IP is immutable.
///
/// Every request is logged, and the n-th mutating request can be made to fail
/// to simulate a controller crashing part-way through a reconcile.
#[derive(Debug, Default)]
pub struct SimulatedApiServer {
    state: Mutex<ApiServerState>,
}

impl SimulatedApiServer {
    pub fn new() -> SimulatedApiServer {
        SimulatedApiServer::default()
    }

    fn lock(&self) -> MutexGuard<'_, ApiServerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn handle_get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K, APIError> {
        let key = key_of::<K>(namespace, name);
        let mut s = self.lock();
        s.record(Verb::Get, &key)?;
        let value = s.resources.get(&key).cloned().ok_or(APIError::ObjectNotFound)?;
        decode(value)
    }

    fn handle_create<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        let name = required_name(obj.meta())?;
        let key = key_of::<K>(namespace, &name);
        let mut s = self.lock();
        s.record(Verb::Create, &key)?;
        if let Some(ns) = obj.meta().namespace.as_deref() {
            if ns != namespace {
                return Err(APIError::Invalid(format!(
                    "namespace {} does not match the request namespace {}",
                    ns, namespace
                )));
            }
        }
        if s.resources.contains_key(&key) {
            return Err(APIError::ObjectAlreadyExists);
        }
        metadata_validity_check(obj.meta())?;

        let mut created = encode(obj)?;
        let resource_version = s.next_resource_version();
        let uid = s.next_uid();
        set_meta_field(&mut created, "namespace", json!(namespace));
        set_meta_field(&mut created, "resourceVersion", json!(resource_version));
        set_meta_field(&mut created, "uid", json!(uid));
        remove_meta_field(&mut created, "deletionTimestamp");
        if key.kind == "Service" {
            s.allocate_service_addresses(&mut created);
        }
        s.resources.insert(key, created.clone());
        decode(created)
    }

    fn handle_replace<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        let name = required_name(obj.meta())?;
        let key = key_of::<K>(namespace, &name);
        let mut s = self.lock();
        s.record(Verb::Update, &key)?;
        let old = s.resources.get(&key).cloned().ok_or(APIError::ObjectNotFound)?;
        let old_meta = object_meta(&old);
        match obj.meta().resource_version.as_deref() {
            None if !allow_unconditional_update::<K>() => {
                return Err(APIError::Invalid(
                    "metadata.resourceVersion must be specified for an update".to_string(),
                ))
            }
            Some(rv) if Some(rv) != old_meta.resource_version.as_deref() => {
                return Err(APIError::Conflict)
            }
            _ => {}
        }
        metadata_validity_check(obj.meta())?;
        metadata_transition_validity_check(obj.meta(), &old_meta)?;

        let mut updated = encode(obj)?;
        set_meta_field(&mut updated, "namespace", json!(namespace));
        copy_meta_field(&mut updated, &old, "resourceVersion");
        copy_meta_field(&mut updated, &old, "uid");
        copy_meta_field(&mut updated, &old, "deletionTimestamp");
        copy_status(&mut updated, &old);
        if key.kind == "Service" {
            service_transition_validity_check(&updated, &old)?;
            s.allocate_service_addresses(&mut updated);
        }
        if updated == old {
            return decode(old);
        }

        let resource_version = s.next_resource_version();
        set_meta_field(&mut updated, "resourceVersion", json!(resource_version));
        let updated_meta = object_meta(&updated);
        let finalized = updated_meta.deletion_timestamp.is_some()
            && updated_meta.finalizers.iter().flatten().next().is_none();
        if finalized {
            s.resources.remove(&key);
            if let Some(uid) = updated_meta.uid.as_deref() {
                s.delete_owned_by(uid);
            }
        } else {
            s.resources.insert(key, updated.clone());
        }
        decode(updated)
    }

    fn handle_delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), APIError> {
        let key = key_of::<K>(namespace, name);
        let mut s = self.lock();
        s.record(Verb::Delete, &key)?;
        if !s.resources.contains_key(&key) {
            return Err(APIError::ObjectNotFound);
        }
        s.delete_object(&key);
        Ok(())
    }

    /// Makes the n-th mutating request from now on fail, counting from 1.
    pub fn fail_nth_mutation(&self, n: usize) {
        let mut s = self.lock();
        s.fail_at_mutation = Some(s.mutation_counter + n);
    }

    pub fn requests(&self) -> Vec<Request> {
        self.lock().requests.clone()
    }

    pub fn request_count(&self, verb: Verb, kind: &str) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|req| req.verb == verb && req.kind == kind)
            .count()
    }

    pub fn mutation_count(&self) -> usize {
        self.lock()
            .requests
            .iter()
            .filter(|req| req.verb.mutates())
            .count()
    }

    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    /// Reads an object without going through (or being recorded as) a request.
    pub fn object<K: KubeObject>(&self, namespace: &str, name: &str) -> Option<K> {
        let value = self.lock().resources.get(&key_of::<K>(namespace, name)).cloned()?;
        serde_json::from_value(value).ok()
    }

    pub fn count<K: KubeObject>(&self) -> usize {
        self.lock().resources.count_kind(&K::kind(&()))
    }

    /// Plays the part of the deployment controller by setting `status.readyReplicas`.
    /// Returns false if there is no such deployment.
    pub fn set_ready_replicas(&self, namespace: &str, name: &str, ready: i32) -> bool {
        let key = ObjectMapKey::new("Deployment", namespace, name);
        let mut s = self.lock();
        let resource_version = s.next_resource_version();
        match s.resources.get_mut(&key).and_then(Value::as_object_mut) {
            Some(deployment) => {
                if let Some(status) = deployment
                    .entry("status")
                    .or_insert_with(|| json!({}))
                    .as_object_mut()
                {
                    status.insert("readyReplicas".to_string(), json!(ready));
                }
                set_meta_field_of(deployment, "resourceVersion", json!(resource_version));
                true
            }
            None => false,
        }
    }
}

#[async_trait]
impl ApiServer for SimulatedApiServer {
    async fn get<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<K, APIError> {
        self.handle_get(namespace, name)
    }

    async fn create<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        self.handle_create(namespace, obj)
    }

    async fn replace<K: KubeObject>(&self, namespace: &str, obj: &K) -> Result<K, APIError> {
        self.handle_replace(namespace, obj)
    }

    async fn delete<K: KubeObject>(&self, namespace: &str, name: &str) -> Result<(), APIError> {
        self.handle_delete::<K>(namespace, name)
    }
}

impl ApiServerState {
    fn record(&mut self, verb: Verb, key: &ObjectMapKey) -> Result<(), APIError> {
        self.requests.push(Request {
            verb,
            kind: key.kind.clone(),
            name: key.name.clone(),
        });
        if verb.mutates() {
            self.mutation_counter += 1;
            if self.fail_at_mutation == Some(self.mutation_counter) {
                self.fail_at_mutation = None;
                return Err(APIError::Other(format!(
                    "injected fault on {:?} {} {}",
                    verb, key.kind, key.name
                )));
            }
        }
        Ok(())
    }

    fn next_resource_version(&mut self) -> String {
        self.resource_version_counter += 1;
        self.resource_version_counter.to_string()
    }

    fn next_uid(&mut self) -> String {
        self.uid_counter += 1;
        format!("uid-{}", self.uid_counter)
    }

    /// Deletes the object, or only marks it if finalizers hold it back,
    /// then does the same to everything it owned.
    fn delete_object(&mut self, key: &ObjectMapKey) {
        let mut pending = vec![key.clone()];
        while let Some(key) = pending.pop() {
            let meta = match self.resources.get(&key) {
                Some(value) => object_meta(value),
                None => continue,
            };
            let has_finalizers = meta.finalizers.iter().flatten().next().is_some();
            if has_finalizers {
                if meta.deletion_timestamp.is_none() {
                    let resource_version = self.next_resource_version();
                    if let Some(value) = self.resources.get_mut(&key) {
                        set_meta_field(value, "deletionTimestamp", json!(DELETION_TIMESTAMP));
                        set_meta_field(value, "resourceVersion", json!(resource_version));
                    }
                }
            } else {
                self.resources.remove(&key);
                self.next_resource_version();
                if let Some(uid) = meta.uid.as_deref() {
                    pending.extend(self.resources.keys_owned_by(uid));
                }
            }
        }
    }

    fn delete_owned_by(&mut self, uid: &str) {
        for key in self.resources.keys_owned_by(uid) {
            self.delete_object(&key);
        }
    }

    fn allocate_service_addresses(&mut self, service: &mut Value) {
        let spec = match service.get_mut("spec").and_then(Value::as_object_mut) {
            Some(spec) => spec,
            None => return,
        };
        let has_cluster_ip = spec
            .get("clusterIP")
            .and_then(Value::as_str)
            .map_or(false, |ip| !ip.is_empty());
        if !has_cluster_ip {
            self.cluster_ip_counter += 1;
            let ip = format!("{}{}", CLUSTER_IP_PREFIX, self.cluster_ip_counter);
            spec.insert("clusterIP".to_string(), json!(ip));
            spec.insert("clusterIPs".to_string(), json!([ip]));
        }
        let exposes_node_ports = matches!(
            spec.get("type").and_then(Value::as_str),
            Some("NodePort") | Some("LoadBalancer")
        );
        if !exposes_node_ports {
            return;
        }
        for port in spec
            .get_mut("ports")
            .and_then(Value::as_array_mut)
            .into_iter()
            .flatten()
            .filter_map(Value::as_object_mut)
        {
            if !port.contains_key("nodePort") {
                self.node_port_counter += 1;
                port.insert(
                    "nodePort".to_string(),
                    json!(NODE_PORT_BASE + self.node_port_counter),
                );
            }
        }
    }
}

fn key_of<K: KubeObject>(namespace: &str, name: &str) -> ObjectMapKey {
    ObjectMapKey::new(&K::kind(&()), namespace, name)
}

fn allow_unconditional_update<K: KubeObject>() -> bool {
    !K::group(&()).ends_with(CUSTOM_RESOURCE_GROUP_SUFFIX)
}

fn required_name(meta: &ObjectMeta) -> Result<String, APIError> {
    meta.name
        .clone()
        .ok_or_else(|| APIError::Invalid("metadata.name is required".to_string()))
}

fn metadata_validity_check(meta: &ObjectMeta) -> Result<(), APIError> {
    let controllers = meta
        .owner_references
        .iter()
        .flatten()
        .filter(|owner| owner.controller == Some(true))
        .count();
    if controllers > 1 {
        Err(APIError::Invalid(
            "only one owner reference can be a controller".to_string(),
        ))
    } else {
        Ok(())
    }
}

fn metadata_transition_validity_check(meta: &ObjectMeta, old: &ObjectMeta) -> Result<(), APIError> {
    if old.deletion_timestamp.is_none() {
        return Ok(());
    }
    let old_finalizers = old.finalizers.clone().unwrap_or_default();
    let adds_finalizer = meta
        .finalizers
        .iter()
        .flatten()
        .any(|finalizer| !old_finalizers.contains(finalizer));
    if adds_finalizer {
        Err(APIError::Invalid(
            "no new finalizers can be added if the object is being deleted".to_string(),
        ))
    } else {
        Ok(())
    }
}

fn service_transition_validity_check(service: &Value, old: &Value) -> Result<(), APIError> {
    let cluster_ip = |value: &Value| {
        value
            .get("spec")
            .and_then(|spec| spec.get("clusterIP"))
            .and_then(Value::as_str)
            .map(str::to_string)
    };
    match cluster_ip(old) {
        Some(old_ip) if cluster_ip(service).as_deref() != Some(old_ip.as_str()) => Err(
            APIError::Invalid("spec.clusterIP: field is immutable".to_string()),
        ),
        _ => Ok(()),
    }
}

fn encode<K: KubeObject>(obj: &K) -> Result<Value, APIError> {
    serde_json::to_value(obj).map_err(|e| APIError::Other(format!("cannot encode object: {}", e)))
}

fn decode<K: KubeObject>(value: Value) -> Result<K, APIError> {
    serde_json::from_value(value).map_err(|e| APIError::Other(format!("cannot decode object: {}", e)))
}

fn set_meta_field(value: &mut Value, field: &str, field_value: Value) {
    if let Some(obj) = value.as_object_mut() {
        set_meta_field_of(obj, field, field_value);
    }
}

fn set_meta_field_of(obj: &mut serde_json::Map<String, Value>, field: &str, field_value: Value) {
    if let Some(meta) = obj
        .entry("metadata")
        .or_insert_with(|| json!({}))
        .as_object_mut()
    {
        meta.insert(field.to_string(), field_value);
    }
}

fn remove_meta_field(value: &mut Value, field: &str) {
    if let Some(meta) = value.get_mut("metadata").and_then(Value::as_object_mut) {
        meta.remove(field);
    }
}

fn copy_meta_field(value: &mut Value, from: &Value, field: &str) {
    match from.get("metadata").and_then(|meta| meta.get(field)) {
        Some(field_value) => set_meta_field(value, field, field_value.clone()),
        None => remove_meta_field(value, field),
    }
}

fn copy_status(value: &mut Value, from: &Value) {
    if let Some(obj) = value.as_object_mut() {
        match from.get("status") {
            Some(status) => obj.insert("status".to_string(), status.clone()),
            None => obj.remove("status"),
        };
    }
}
