// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT

//! What the controllers believe already exists.
//!
//! PodSets record the pods they created positionally, as finalizers on the parent.
//! WebServices record a snapshot of the spec they last applied, as an annotation.
//! Database tier children additionally carry the tier spec they were last written
//! with, so they can be brought up to date before the tier is ready.
use crate::common::*;
use crate::error::Error;
use crate::podset_types::*;
use crate::webservice_types::*;
use kube::api::Resource;

/// TrackedPods is the ordered list of pods a PodSet believes exist.
/// Entry i always names `<podset>-i`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedPods {
    podset_name: String,
    pods: Vec<String>,
    other_finalizers: Vec<String>,
}

impl TrackedPods {
    /// Reads the list from the PodSet's finalizers. Finalizers that are not ours are
    /// kept aside untouched. A list that is not exactly `<podset>-0 .. <podset>-(k-1)`
    /// is reported as corrupted.
    pub fn from_podset(ps: &PodSet) -> Result<TrackedPods, Error> {
        let podset_name = ps
            .meta()
            .name
            .clone()
            .ok_or(Error::MissingObjectKey(".metadata.name"))?;
        let mut pods = Vec::new();
        let mut other_finalizers = Vec::new();
        for finalizer in ps.meta().finalizers.iter().flatten() {
            match finalizer.strip_prefix(TRACKING_FINALIZER_PREFIX) {
                Some(pod) => pods.push(pod.to_string()),
                None => other_finalizers.push(finalizer.clone()),
            }
        }
        for (index, pod) in pods.iter().enumerate() {
            let expected = pod_name(&podset_name, index);
            if *pod != expected {
                return Err(Error::InvariantViolation(
                    podset_name,
                    format!("position {} holds {} instead of {}", index, pod, expected),
                ));
            }
        }
        Ok(TrackedPods {
            podset_name,
            pods,
            other_finalizers,
        })
    }

    pub fn len(&self) -> usize {
        self.pods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pods.is_empty()
    }

    pub fn pods(&self) -> &[String] {
        &self.pods
    }

    pub fn contains(&self, pod: &str) -> bool {
        self.pods.iter().any(|p| p == pod)
    }

    /// Appends `pod` unless it is already tracked. Returns whether the list changed.
    pub fn track(&mut self, pod: &str) -> bool {
        if self.contains(pod) {
            false
        } else {
            self.pods.push(pod.to_string());
            true
        }
    }

    /// Keeps the first `keep` entries and returns the removed tail,
    /// highest position first.
    pub fn truncate(&mut self, keep: usize) -> Vec<String> {
        if keep >= self.pods.len() {
            return Vec::new();
        }
        let mut surplus = self.pods.split_off(keep);
        surplus.reverse();
        surplus
    }

    /// Writes the list back into the PodSet's finalizers, after the ones that are not ours.
    pub fn apply_to(&self, ps: &mut PodSet) {
        let finalizers: Vec<String> = self
            .other_finalizers
            .iter()
            .cloned()
            .chain(self.pods.iter().map(|pod| tracking_finalizer(pod)))
            .collect();
        ps.meta_mut().finalizers = if finalizers.is_empty() {
            None
        } else {
            Some(finalizers)
        };
    }

    pub fn podset_name(&self) -> &str {
        &self.podset_name
    }
}

/// Reads the spec snapshot recorded by the last successful provisioning or update.
pub fn last_applied_spec(ws: &WebService) -> Result<Option<WebServiceSpec>, Error> {
    let raw = ws
        .meta()
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(LAST_APPLIED_SPEC_ANNOTATION));
    match raw {
        None => Ok(None),
        Some(raw) => serde_json::from_str(raw).map(Some).map_err(|e| {
            Error::SnapshotDecodeFailed(ws.meta().name.clone().unwrap_or_default(), e)
        }),
    }
}

/// Records the current spec as the last applied one.
pub fn record_applied_spec(ws: &mut WebService) -> Result<(), Error> {
    let snapshot = serde_json::to_string(&ws.spec).map_err(Error::SnapshotEncodeFailed)?;
    ws.meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(LAST_APPLIED_SPEC_ANNOTATION.to_string(), snapshot);
    Ok(())
}

/// needs_update is the coarse change detector: any difference from the snapshot,
/// or no snapshot at all, means the children have to be rewritten.
pub fn needs_update(current: &WebServiceSpec, last_applied: Option<&WebServiceSpec>) -> bool {
    last_applied != Some(current)
}

/// Records on a child the tier spec it is being written with.
pub fn stamp_applied_tier<K: Resource>(mut obj: K, tier: &TierSpec) -> Result<K, Error> {
    let snapshot = serde_json::to_string(tier).map_err(Error::SnapshotEncodeFailed)?;
    obj.meta_mut()
        .annotations
        .get_or_insert_with(Default::default)
        .insert(APPLIED_TIER_ANNOTATION.to_string(), snapshot);
    Ok(obj)
}

/// Reads the tier spec a child was last written with. A missing or unreadable
/// annotation reads as `None`: the child is ours and is simply rewritten.
pub fn applied_tier<K: Resource>(obj: &K) -> Option<TierSpec> {
    obj.meta()
        .annotations
        .as_ref()?
        .get(APPLIED_TIER_ANNOTATION)
        .and_then(|raw| serde_json::from_str(raw).ok())
}
