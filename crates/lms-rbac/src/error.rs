// LMS RBAC
// Copyright (C) 2025 Synerthink

// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.

// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.

// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <http://www.gnu.org/licenses/>.

//! Error handling for the RBAC engine
//!
//! Write-time violations (scope, hierarchy, date ordering, uniqueness) are
//! returned to the caller. Evaluation-time failures are collapsed into a
//! denial at the public boundary and only surface through the audit stream.

use hyper::StatusCode;
use thiserror::Error;

/// RBAC error types
#[derive(Error, Debug)]
pub enum RbacError {
    #[error("Authentication required")]
    AuthenticationMissing,

    #[error("Unknown permission: {codename}")]
    UnknownPermission { codename: String },

    #[error("Invalid scope configuration: {message}")]
    ScopeConfigurationInvalid { message: String },

    #[error("Circular role hierarchy: {message}")]
    CircularRoleHierarchy { message: String },

    #[error("Evaluation failed: {message}")]
    EvaluationInternal { message: String },

    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Conflict: {message}")]
    Conflict { message: String },

    #[error("Storage error: {message}")]
    Storage { message: String },

    #[error("Invalid configuration: {message}")]
    Configuration { message: String },

    #[error("Serde JSON error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl RbacError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            RbacError::AuthenticationMissing => StatusCode::UNAUTHORIZED,
            // Unknown codenames and internal faults look like plain denials to callers
            RbacError::UnknownPermission { .. } | RbacError::EvaluationInternal { .. } => StatusCode::FORBIDDEN,
            RbacError::ScopeConfigurationInvalid { .. } | RbacError::CircularRoleHierarchy { .. } => StatusCode::BAD_REQUEST,
            RbacError::NotFound { .. } => StatusCode::NOT_FOUND,
            RbacError::Conflict { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Get the error type identifier
    pub fn error_type(&self) -> &'static str {
        match self {
            RbacError::AuthenticationMissing => "authentication_missing",
            RbacError::UnknownPermission { .. } => "unknown_permission",
            RbacError::ScopeConfigurationInvalid { .. } => "scope_configuration_invalid",
            RbacError::CircularRoleHierarchy { .. } => "circular_role_hierarchy",
            RbacError::EvaluationInternal { .. } => "evaluation_internal_error",
            RbacError::NotFound { .. } => "not_found",
            RbacError::Conflict { .. } => "conflict",
            RbacError::Storage { .. } => "storage_error",
            RbacError::Configuration { .. } => "configuration_error",
            RbacError::SerdeJsonError(_) => "json_error",
            RbacError::IoError(_) => "io_error",
        }
    }

    /// Whether this error was raised by write-time validation
    pub fn is_validation_error(&self) -> bool {
        matches!(self, RbacError::ScopeConfigurationInvalid { .. } | RbacError::CircularRoleHierarchy { .. })
    }
}

impl From<toml::de::Error> for RbacError {
    fn from(err: toml::de::Error) -> Self {
        RbacError::Configuration { message: err.to_string() }
    }
}

/// Result type for RBAC operations
pub type RbacResult<T> = Result<T, RbacError>;
