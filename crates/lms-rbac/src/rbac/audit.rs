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

//! Audit logging for permission evaluations

use crate::auth::{User, UserId};
use crate::error::RbacResult;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use tracing::{info, warn};

/// Outcome of a single evaluation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuditResult {
    Granted,
    Denied,
    /// Unknown codename or internal failure
    Error,
}

impl AuditResult {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditResult::Granted => "GRANTED",
            AuditResult::Denied => "DENIED",
            AuditResult::Error => "ERROR",
        }
    }
}

impl fmt::Display for AuditResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AuditResult {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GRANTED" => Ok(AuditResult::Granted),
            "DENIED" => Ok(AuditResult::Denied),
            "ERROR" => Ok(AuditResult::Error),
            other => Err(format!("unknown audit result '{}'", other)),
        }
    }
}

/// Append-only record of one evaluation
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PermissionAudit {
    /// Unique entry ID
    pub id: String,

    /// Evaluated user; `None` for system checks
    pub user_id: Option<UserId>,

    pub username: Option<String>,

    /// Action being performed
    pub action: String,

    /// Codename as requested, kept as text so it survives permission removal
    pub permission: String,

    pub resource_type: String,

    pub resource_id: Option<u64>,

    pub result: AuditResult,

    pub ip_address: Option<String>,

    pub user_agent: String,

    pub request_path: String,

    /// Free-form context such as error messages
    pub additional_data: serde_json::Value,

    pub timestamp: DateTime<Utc>,
}

impl PermissionAudit {
    /// Create a new audit entry
    pub fn new(user: Option<&User>, permission: impl Into<String>, result: AuditResult) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            user_id: user.map(|u| u.id),
            username: user.map(|u| u.username.clone()),
            action: "permission_check".to_string(),
            permission: permission.into(),
            resource_type: String::new(),
            resource_id: None,
            result,
            ip_address: None,
            user_agent: String::new(),
            request_path: String::new(),
            additional_data: serde_json::Value::Object(serde_json::Map::new()),
            timestamp: Utc::now(),
        }
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.action = action.into();
        self
    }

    /// Set resource type and id
    pub fn with_resource(mut self, resource_type: impl Into<String>, resource_id: Option<u64>) -> Self {
        self.resource_type = resource_type.into();
        self.resource_id = resource_id;
        self
    }

    /// Set client information
    pub fn with_client_info(mut self, ip_address: Option<String>, user_agent: impl Into<String>, request_path: impl Into<String>) -> Self {
        self.ip_address = ip_address;
        self.user_agent = user_agent.into();
        self.request_path = request_path.into();
        self
    }

    /// Add detail
    pub fn with_detail(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        if let serde_json::Value::Object(map) = &mut self.additional_data {
            map.insert(key.to_string(), value.into());
        }
        self
    }
}

/// Destination for audit entries written by the evaluator
pub trait AuditSink: Send + Sync {
    fn record(&self, entry: PermissionAudit) -> RbacResult<()>;
}

/// Filters for the audit report
#[derive(Debug, Clone, Default)]
pub struct AuditQuery {
    /// Username substring
    pub username: Option<String>,

    /// Codename substring
    pub permission: Option<String>,

    pub result: Option<AuditResult>,

    pub since: Option<DateTime<Utc>>,

    pub until: Option<DateTime<Utc>>,

    pub limit: Option<usize>,
}

impl AuditQuery {
    fn matches(&self, entry: &PermissionAudit) -> bool {
        if let Some(username) = &self.username {
            if !entry.username.as_deref().is_some_and(|u| u.contains(username.as_str())) {
                return false;
            }
        }
        if let Some(permission) = &self.permission {
            if !entry.permission.contains(permission.as_str()) {
                return false;
            }
        }
        if self.result.is_some_and(|result| result != entry.result) {
            return false;
        }
        if self.since.is_some_and(|since| entry.timestamp < since) {
            return false;
        }
        if self.until.is_some_and(|until| entry.timestamp > until) {
            return false;
        }
        true
    }
}

/// Outcome counts over a window
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditSummary {
    pub total: usize,
    pub granted: usize,
    pub denied: usize,
    pub error: usize,
}

/// In-memory audit log
#[derive(Debug, Default)]
pub struct AuditLog {
    entries: RwLock<Vec<PermissionAudit>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_entries(entries: Vec<PermissionAudit>) -> Self {
        Self { entries: RwLock::new(entries) }
    }

    /// All entries in insertion order
    pub fn entries(&self) -> Vec<PermissionAudit> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Matching entries, newest first
    pub fn query(&self, query: &AuditQuery) -> Vec<PermissionAudit> {
        let entries = self.entries.read();
        let matching = entries.iter().rev().filter(|entry| query.matches(entry)).cloned();

        match query.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        }
    }

    /// Result counts for entries inside the window
    pub fn summary(&self, since: Option<DateTime<Utc>>, until: Option<DateTime<Utc>>) -> AuditSummary {
        let window = AuditQuery {
            since,
            until,
            ..AuditQuery::default()
        };

        let entries = self.entries.read();
        let mut summary = AuditSummary::default();

        for entry in entries.iter().filter(|entry| window.matches(entry)) {
            summary.total += 1;
            match entry.result {
                AuditResult::Granted => summary.granted += 1,
                AuditResult::Denied => summary.denied += 1,
                AuditResult::Error => summary.error += 1,
            }
        }

        summary
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> RbacResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<PermissionAudit> = serde_json::from_str(&content)?;
        Ok(Self::from_entries(entries))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> RbacResult<()> {
        let content = serde_json::to_string_pretty(&*self.entries.read())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl AuditSink for AuditLog {
    fn record(&self, entry: PermissionAudit) -> RbacResult<()> {
        match entry.result {
            AuditResult::Granted => {
                info!(
                    user_id = ?entry.user_id,
                    permission = %entry.permission,
                    resource_type = %entry.resource_type,
                    resource_id = ?entry.resource_id,
                    ip_address = ?entry.ip_address,
                    "Audit: {}", entry.result
                );
            }
            AuditResult::Denied | AuditResult::Error => {
                warn!(
                    user_id = ?entry.user_id,
                    permission = %entry.permission,
                    resource_type = %entry.resource_type,
                    resource_id = ?entry.resource_id,
                    ip_address = ?entry.ip_address,
                    details = %entry.additional_data,
                    "Audit: {}", entry.result
                );
            }
        }

        self.entries.write().push(entry);
        Ok(())
    }
}
