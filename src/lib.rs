// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod common;
pub mod config;
pub mod error;
pub mod executable_model;
pub mod gate;
pub mod kubernetes_api;
pub mod podset_types;
pub mod reconciler;
pub mod resources;
pub mod shim_layer;
pub mod tracker;
pub mod webservice_types;

#[cfg(test)]
mod unit_tests;

pub use error::Error;
