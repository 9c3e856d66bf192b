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

//! Role definitions and hierarchy resolution

use crate::error::{RbacError, RbacResult};
use crate::rbac::store::PolicyStore;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

pub type RoleId = u64;

/// Named bundle of permissions with an optional single parent
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Role {
    /// Store-assigned identifier
    pub id: RoleId,

    /// Unique human-readable role name
    pub name: String,

    /// Unique role code used by role-based enforcement (e.g. "FACULTY")
    pub code: String,

    pub description: String,

    /// Codenames of the permissions granted directly by this role
    pub permissions: BTreeSet<String>,

    pub is_system_role: bool,

    pub is_active: bool,

    /// Parent role whose permissions are inherited
    pub parent_role: Option<RoleId>,

    /// Higher is more senior; used for ordering only
    pub priority: i32,

    pub created_at: DateTime<Utc>,

    pub updated_at: DateTime<Utc>,
}

impl Role {
    /// Create a new role
    pub fn new(code: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();

        Self {
            id: 0,
            name: name.into(),
            code: code.into(),
            description: description.into(),
            permissions: BTreeSet::new(),
            is_system_role: false,
            is_active: true,
            parent_role: None,
            priority: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a system role
    pub fn system_role(code: impl Into<String>, name: impl Into<String>, description: impl Into<String>, priority: i32) -> Self {
        let mut role = Self::new(code, name, description);
        role.is_system_role = true;
        role.priority = priority;
        role
    }

    /// Add a permission to this role
    pub fn add_permission(&mut self, codename: impl Into<String>) {
        if self.permissions.insert(codename.into()) {
            self.updated_at = Utc::now();
        }
    }

    /// Remove a permission from this role
    pub fn remove_permission(&mut self, codename: &str) {
        if self.permissions.remove(codename) {
            self.updated_at = Utc::now();
        }
    }

    /// Set or clear the parent role
    pub fn set_parent(&mut self, parent: Option<RoleId>) {
        self.parent_role = parent;
        self.updated_at = Utc::now();
    }

    pub fn with_parent(mut self, parent: RoleId) -> Self {
        self.parent_role = Some(parent);
        self
    }
}

/// Reject a parent assignment that would make `role_id` its own ancestor.
///
/// `parent_of` returns the parent of a stored role, or `Err` when the role
/// does not exist. The walk relies on the stored chain already being acyclic.
pub fn validate_parent_chain<F>(role_id: RoleId, parent: Option<RoleId>, mut parent_of: F) -> RbacResult<()>
where
    F: FnMut(RoleId) -> RbacResult<Option<RoleId>>,
{
    let Some(parent_id) = parent else {
        return Ok(());
    };

    if parent_id == role_id {
        return Err(RbacError::CircularRoleHierarchy {
            message: "Role cannot be its own parent".to_string(),
        });
    }

    let mut current = Some(parent_id);
    while let Some(ancestor) = current {
        if ancestor == role_id {
            return Err(RbacError::CircularRoleHierarchy {
                message: format!("Circular reference detected in role hierarchy for role {}", role_id),
            });
        }
        current = parent_of(ancestor)?;
    }

    Ok(())
}

/// Read-only view of the role tree backed by the policy store.
///
/// Every call re-reads roles from storage so a revoked permission is never
/// observed after the revocation committed.
pub struct RoleGraph<'a> {
    store: &'a dyn PolicyStore,
}

impl<'a> RoleGraph<'a> {
    pub fn new(store: &'a dyn PolicyStore) -> Self {
        Self { store }
    }

    /// The role followed by each of its ancestors, nearest first
    pub fn lineage(&self, role: &Role) -> RbacResult<Vec<Role>> {
        let mut lineage = vec![role.clone()];
        let mut next = role.parent_role;

        while let Some(parent_id) = next {
            let parent = self.store.role(parent_id)?.ok_or_else(|| RbacError::NotFound {
                message: format!("Parent role {} of role '{}' not found", parent_id, role.code),
            })?;
            next = parent.parent_role;
            lineage.push(parent);
        }

        Ok(lineage)
    }

    /// Direct permissions of the role unioned with every ancestor's
    pub fn effective_permissions(&self, role: &Role) -> RbacResult<BTreeSet<String>> {
        let mut permissions = BTreeSet::new();
        for member in self.lineage(role)? {
            permissions.extend(member.permissions);
        }
        Ok(permissions)
    }

    /// Codes of the role and all of its ancestors
    pub fn lineage_codes(&self, role: &Role) -> RbacResult<Vec<String>> {
        Ok(self.lineage(role)?.into_iter().map(|r| r.code).collect())
    }
}
