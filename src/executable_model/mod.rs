// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
pub mod api_server;
pub mod object_map;

pub use api_server::{Request, SimulatedApiServer, Verb};
