// Copyright 2022 VMware, Inc.
// SPDX-License-Identifier: MIT
use kube_core::ErrorResponse;
use thiserror::Error;

/// APIError is the outcome of a failed request to the API server,
/// classified coarsely enough for the reconcilers to decide what is benign.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum APIError {
    #[error("object not found")]
    ObjectNotFound,
    #[error("object already exists")]
    ObjectAlreadyExists,
    #[error("conflicting resource version")]
    Conflict,
    #[error("invalid request: {0}")]
    Invalid(String),
    #[error("{0}")]
    Other(String),
}

impl APIError {
    pub fn is_object_not_found(&self) -> bool {
        matches!(self, APIError::ObjectNotFound)
    }

    pub fn is_object_already_exists(&self) -> bool {
        matches!(self, APIError::ObjectAlreadyExists)
    }
}

impl From<kube::Error> for APIError {
    fn from(error: kube::Error) -> APIError {
        match error {
            kube::Error::Api(ErrorResponse {
                ref reason,
                code,
                ref message,
                ..
            }) => match reason.as_str() {
                "NotFound" => APIError::ObjectNotFound,
                "AlreadyExists" => APIError::ObjectAlreadyExists,
                "Conflict" => APIError::Conflict,
                "Invalid" => APIError::Invalid(message.clone()),
                _ if code == 404 => APIError::ObjectNotFound,
                _ => APIError::Other(error.to_string()),
            },
            _ => APIError::Other(error.to_string()),
        }
    }
}
