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

//! Role assignments and contextual grants

use crate::auth::UserId;
use crate::error::{RbacError, RbacResult};
use crate::rbac::roles::RoleId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type AssignmentId = u64;
pub type GrantId = u64;

/// Context type that matches checks made without a resource
pub const GLOBAL_CONTEXT: &str = "GLOBAL";

/// Scope object kind that binds a COURSE assignment to one course offering
pub const COURSE_OFFERING_KIND: &str = "course_offering";

/// Declared scope kind of an assignment as received at the write boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ScopeType {
    #[default]
    Global,
    Department,
    Course,
    Custom,
}

impl ScopeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScopeType::Global => "GLOBAL",
            ScopeType::Department => "DEPARTMENT",
            ScopeType::Course => "COURSE",
            ScopeType::Custom => "CUSTOM",
        }
    }
}

impl fmt::Display for ScopeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ScopeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GLOBAL" => Ok(ScopeType::Global),
            "DEPARTMENT" => Ok(ScopeType::Department),
            "COURSE" => Ok(ScopeType::Course),
            "CUSTOM" => Ok(ScopeType::Custom),
            other => Err(format!("unknown scope type '{}'", other)),
        }
    }
}

/// Reference to the object a scoped assignment is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScopeObject {
    /// Object kind, e.g. "department" or a custom kind name
    pub kind: String,
    pub id: u64,
}

impl ScopeObject {
    pub fn new(kind: impl Into<String>, id: u64) -> Self {
        Self { kind: kind.into(), id }
    }
}

/// Validated assignment scope
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "UPPERCASE")]
pub enum Scope {
    Global,
    Department { id: u64 },
    Course { id: u64 },
    #[serde(rename = "COURSE_OFFERING")]
    CourseOffering { id: u64 },
    Custom { kind: String, id: u64 },
}

impl Scope {
    /// Build a scope from the loose write-boundary form
    pub fn from_parts(scope_type: ScopeType, scope_object: Option<ScopeObject>) -> RbacResult<Self> {
        match (scope_type, scope_object) {
            (ScopeType::Global, _) => Ok(Scope::Global),
            (ScopeType::Department, Some(object)) => Ok(Scope::Department { id: object.id }),
            (ScopeType::Course, Some(object)) if object.kind.eq_ignore_ascii_case(COURSE_OFFERING_KIND) => Ok(Scope::CourseOffering { id: object.id }),
            (ScopeType::Course, Some(object)) => Ok(Scope::Course { id: object.id }),
            (ScopeType::Custom, Some(object)) => Ok(Scope::Custom { kind: object.kind, id: object.id }),
            (scope_type, None) => Err(RbacError::ScopeConfigurationInvalid {
                message: format!("Scope object is required for {} scope", scope_type),
            }),
        }
    }

    pub fn scope_type(&self) -> ScopeType {
        match self {
            Scope::Global => ScopeType::Global,
            Scope::Department { .. } => ScopeType::Department,
            Scope::Course { .. } | Scope::CourseOffering { .. } => ScopeType::Course,
            Scope::Custom { .. } => ScopeType::Custom,
        }
    }

    pub fn object_id(&self) -> Option<u64> {
        match self {
            Scope::Global => None,
            Scope::Department { id } | Scope::Course { id } | Scope::CourseOffering { id } | Scope::Custom { id, .. } => Some(*id),
        }
    }

    /// Context type name this scope corresponds to for contextual grants
    pub fn context_type(&self) -> &str {
        match self {
            Scope::Global => GLOBAL_CONTEXT,
            Scope::Department { .. } => "department",
            Scope::Course { .. } => "course",
            Scope::CourseOffering { .. } => COURSE_OFFERING_KIND,
            Scope::Custom { kind, .. } => kind,
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Global => f.write_str("GLOBAL"),
            Scope::Department { id } => write!(f, "DEPARTMENT:{}", id),
            Scope::Course { id } => write!(f, "COURSE:{}", id),
            Scope::CourseOffering { id } => write!(f, "COURSE_OFFERING:{}", id),
            Scope::Custom { kind, id } => write!(f, "CUSTOM:{}:{}", kind, id),
        }
    }
}

/// Binding of a user to a role within a scope
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserRoleAssignment {
    pub id: AssignmentId,

    pub user_id: UserId,

    pub role_id: RoleId,

    /// Assigning user; `None` means system-assigned
    pub assigned_by: Option<UserId>,

    pub scope: Scope,

    pub is_active: bool,

    pub start_date: DateTime<Utc>,

    /// Open-ended when `None`
    pub end_date: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl UserRoleAssignment {
    /// Whether the assignment grants at `now`: active and inside `[start_date, end_date)`
    pub fn is_current_at(&self, now: DateTime<Utc>) -> bool {
        self.is_active && self.start_date <= now && self.end_date.is_none_or(|end| end > now)
    }
}

/// Unsaved assignment as received from a caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAssignment {
    pub user_id: UserId,
    pub role_id: RoleId,
    pub assigned_by: Option<UserId>,
    pub scope: Scope,
    pub start_date: DateTime<Utc>,
    pub end_date: Option<DateTime<Utc>>,
}

impl NewAssignment {
    /// Validate the date window at the write boundary
    pub fn validate(&self) -> RbacResult<()> {
        if let Some(end) = self.end_date {
            if end <= self.start_date {
                return Err(RbacError::ScopeConfigurationInvalid {
                    message: "End date must be after start date".to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn into_assignment(self, id: AssignmentId) -> UserRoleAssignment {
        let now = Utc::now();

        UserRoleAssignment {
            id,
            user_id: self.user_id,
            role_id: self.role_id,
            assigned_by: self.assigned_by,
            scope: self.scope,
            is_active: true,
            start_date: self.start_date,
            end_date: self.end_date,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One-off permission grant tied to a context object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ContextualPermission {
    pub id: GrantId,

    pub user_id: UserId,

    /// Codename of the granted permission
    pub permission: String,

    /// Free-text context kind (e.g. "course"), or [`GLOBAL_CONTEXT`]
    pub context_type: String,

    pub context_id: u64,

    pub granted_by: Option<UserId>,

    pub granted_at: DateTime<Utc>,

    /// Never expires when `None`
    pub expires_at: Option<DateTime<Utc>>,
}

impl ContextualPermission {
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.granted_at <= now && self.expires_at.is_none_or(|expires| expires > now)
    }

    /// Whether the grant applies to checks made without a resource
    pub fn is_global(&self) -> bool {
        self.context_type == GLOBAL_CONTEXT
    }
}
