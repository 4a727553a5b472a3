// Copyright (C) 2025 Matías Salinas (support@fenden.com)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Error taxonomy shared across the store, projection, proxy and module
//! cache layers. Each variant maps to exactly one HTTP surfacing rule.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Clone, Serialize)]
pub struct FieldError {
    pub name: String,
    pub message: String,
}

impl FieldError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            message: message.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EdgeError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("validation failed")]
    Validation(Vec<FieldError>),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("restricted by rule")]
    Restriction,

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EdgeError {
    pub fn validation(errors: Vec<FieldError>) -> Self {
        EdgeError::Validation(errors)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            EdgeError::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
            EdgeError::NotFound(_) => StatusCode::BAD_GATEWAY,
            EdgeError::AlreadyExists(_) => StatusCode::BAD_REQUEST,
            EdgeError::Validation(_) => StatusCode::BAD_REQUEST,
            EdgeError::Upstream(_) => StatusCode::BAD_GATEWAY,
            EdgeError::Restriction => StatusCode::FORBIDDEN,
            EdgeError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            EdgeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct FailureBody {
    message: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

impl IntoResponse for EdgeError {
    fn into_response(self) -> Response {
        let status = self.status();
        let errors = match &self {
            EdgeError::Validation(errs) => Some(errs.clone()),
            _ => None,
        };
        let body = FailureBody {
            message: "failed",
            errors,
        };
        (status, axum::Json(body)).into_response()
    }
}
