// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use anyhow::Result;
use kube::CustomResourceExt;
use std::env;
use tiered_controller::config::ControllerConfig;
use tiered_controller::podset_types::PodSet;
use tiered_controller::shim_layer::run_controllers;
use tiered_controller::webservice_types::WebService;
use tracing::*;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args: Vec<String> = env::args().collect();
    let cmd = args.get(1).map(String::as_str).unwrap_or_default();
    if cmd == "export" {
        info!("exporting custom resource definitions");
        println!("{}", serde_yaml::to_string(&PodSet::crd())?);
        println!("---");
        println!("{}", serde_yaml::to_string(&WebService::crd())?);
    } else if cmd == "run" {
        let config = ControllerConfig::from_env()?;
        info!("running tiered-controller with {:?}", config);
        run_controllers(config).await?;
    } else {
        warn!("wrong command; please use \"export\" or \"run\"");
    }
    Ok(())
}
