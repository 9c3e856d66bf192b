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

//! Configuration for the RBAC engine and its enforcement layer

use crate::error::RbacResult;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use std::time::Duration;

/// Configuration for permission evaluation and request enforcement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RbacConfig {
    /// Only paths under this prefix are annotated by the middleware
    pub api_prefix: String,

    /// Path prefixes that skip enforcement entirely
    pub skip_paths: Vec<String>,

    /// Add permission count and role code headers to responses
    pub expose_headers: bool,

    /// Add the standard security headers to API responses
    pub security_headers: bool,

    /// Checks slower than this are logged as warnings
    pub slow_check_threshold_ms: u64,
}

impl Default for RbacConfig {
    fn default() -> Self {
        Self {
            api_prefix: "/api/".to_string(),
            skip_paths: default_skip_paths(),
            expose_headers: true,
            security_headers: true,
            slow_check_threshold_ms: 5,
        }
    }
}

fn default_skip_paths() -> Vec<String> {
    vec![
        "/admin/".to_string(),
        "/api/v1/users/auth/login/".to_string(),
        "/api/v1/users/auth/register/".to_string(),
        "/api/v1/users/auth/logout/".to_string(),
        "/static/".to_string(),
        "/media/".to_string(),
    ]
}

impl RbacConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let defaults = Self::default();

        Self {
            api_prefix: env::var("LMS_RBAC_API_PREFIX").unwrap_or(defaults.api_prefix),

            skip_paths: env::var("LMS_RBAC_SKIP_PATHS")
                .map(|v| v.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
                .unwrap_or(defaults.skip_paths),

            expose_headers: env::var("LMS_RBAC_EXPOSE_HEADERS").map(|v| v.parse().unwrap_or(true)).unwrap_or(true),

            security_headers: env::var("LMS_RBAC_SECURITY_HEADERS").map(|v| v.parse().unwrap_or(true)).unwrap_or(true),

            slow_check_threshold_ms: env::var("LMS_RBAC_SLOW_CHECK_MS").map(|v| v.parse().unwrap_or(5)).unwrap_or(5),
        }
    }

    /// Load configuration from a TOML file
    pub fn load_from_file(path: impl AsRef<Path>) -> RbacResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Whether enforcement is skipped for this path
    pub fn is_skipped(&self, path: &str) -> bool {
        self.skip_paths.iter().any(|prefix| path.starts_with(prefix.as_str()))
    }

    /// Whether the path belongs to the API surface
    pub fn is_api_path(&self, path: &str) -> bool {
        path.starts_with(self.api_prefix.as_str())
    }

    pub fn slow_check_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_check_threshold_ms)
    }
}
