// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use std::env;
use std::time::Duration;
use thiserror::Error;

pub const DEPENDENCY_RETRY_ENV: &str = "TIERED_CONTROLLER_DEPENDENCY_RETRY_SECS";
pub const ERROR_REQUEUE_ENV: &str = "TIERED_CONTROLLER_ERROR_REQUEUE_SECS";
pub const RESYNC_ENV: &str = "TIERED_CONTROLLER_RESYNC_SECS";

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{var} must be a whole number of seconds, got {value:?}")]
pub struct ConfigError {
    pub var: &'static str,
    pub value: String,
}

/// Timing knobs shared by both controllers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControllerConfig {
    /// How long to wait before looking at a dependency that is not ready yet.
    pub dependency_retry_delay: Duration,
    pub error_requeue_delay: Duration,
    /// Requeue interval after a successful reconcile.
    pub resync_period: Duration,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            dependency_retry_delay: Duration::from_secs(5),
            error_requeue_delay: Duration::from_secs(10),
            resync_period: Duration::from_secs(60),
        }
    }
}

impl ControllerConfig {
    pub fn from_env() -> Result<ControllerConfig, ConfigError> {
        Self::from_lookup(|var| env::var(var).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<ControllerConfig, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = ControllerConfig::default();
        Ok(ControllerConfig {
            dependency_retry_delay: seconds_or(
                &lookup,
                DEPENDENCY_RETRY_ENV,
                defaults.dependency_retry_delay,
            )?,
            error_requeue_delay: seconds_or(
                &lookup,
                ERROR_REQUEUE_ENV,
                defaults.error_requeue_delay,
            )?,
            resync_period: seconds_or(&lookup, RESYNC_ENV, defaults.resync_period)?,
        })
    }
}

fn seconds_or<F>(lookup: &F, var: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&'static str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(default),
        Some(value) => value
            .trim()
            .parse::<u64>()
            .map(Duration::from_secs)
            .map_err(|_| ConfigError { var, value }),
    }
}
