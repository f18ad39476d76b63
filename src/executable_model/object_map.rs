// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Ord, PartialOrd, Eq, PartialEq)]
pub struct ObjectMapKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectMapKey {
    pub fn new(kind: &str, namespace: &str, name: &str) -> ObjectMapKey {
        ObjectMapKey {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        }
    }
}

/// ObjectMap is the stored state of the simulated API server.
/// Objects are kept in their serialized form so any kind can live side by side.
#[derive(Debug, Clone, Default)]
pub struct ObjectMap {
    inner: BTreeMap<ObjectMapKey, Value>,
}

impl ObjectMap {
    pub fn contains_key(&self, key: &ObjectMapKey) -> bool {
        self.inner.contains_key(key)
    }

    pub fn get(&self, key: &ObjectMapKey) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn get_mut(&mut self, key: &ObjectMapKey) -> Option<&mut Value> {
        self.inner.get_mut(key)
    }

    pub fn insert(&mut self, key: ObjectMapKey, value: Value) -> Option<Value> {
        self.inner.insert(key, value)
    }

    pub fn remove(&mut self, key: &ObjectMapKey) -> Option<Value> {
        self.inner.remove(key)
    }

    pub fn count_kind(&self, kind: &str) -> usize {
        self.inner.keys().filter(|key| key.kind == kind).count()
    }

    /// Keys of every object with an owner reference to `uid`.
    pub fn keys_owned_by(&self, uid: &str) -> Vec<ObjectMapKey> {
        self.inner
            .iter()
            .filter(|(_, value)| {
                object_meta(value)
                    .owner_references
                    .iter()
                    .flatten()
                    .any(|owner| owner.uid == uid)
            })
            .map(|(key, _)| key.clone())
            .collect()
    }
}

/// Reads the metadata of a stored object. Objects that lost their metadata read as empty.
pub fn object_meta(value: &Value) -> ObjectMeta {
    value
        .get("metadata")
        .cloned()
        .and_then(|meta| serde_json::from_value(meta).ok())
        .unwrap_or_default()
}
