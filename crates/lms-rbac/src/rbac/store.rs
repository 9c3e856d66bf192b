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

//! Policy storage
//!
//! The store owns the write-time invariants: unique codenames, role names and
//! codes, acyclic parent chains, and unique (user, role, scope) assignments.

use crate::auth::UserId;
use crate::error::{RbacError, RbacResult};
use crate::rbac::assignments::{AssignmentId, ContextualPermission, GrantId, NewAssignment, UserRoleAssignment};
use crate::rbac::permissions::{Permission, PermissionId};
use crate::rbac::roles::{Role, RoleId, validate_parent_chain};
use chrono::Utc;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Storage backend for permissions, roles, assignments and contextual grants
pub trait PolicyStore: Send + Sync {
    fn permission_by_codename(&self, codename: &str) -> RbacResult<Option<Permission>>;

    fn permissions(&self) -> RbacResult<Vec<Permission>>;

    /// Persist a new permission, assigning its id
    fn insert_permission(&self, permission: Permission) -> RbacResult<Permission>;

    fn role(&self, id: RoleId) -> RbacResult<Option<Role>>;

    fn role_by_code(&self, code: &str) -> RbacResult<Option<Role>>;

    /// All roles, highest priority first then by name
    fn roles(&self) -> RbacResult<Vec<Role>>;

    /// Insert (id 0) or update a role after validating uniqueness and the parent chain
    fn save_role(&self, role: Role) -> RbacResult<Role>;

    fn insert_assignment(&self, assignment: NewAssignment) -> RbacResult<UserRoleAssignment>;

    fn assignment(&self, id: AssignmentId) -> RbacResult<Option<UserRoleAssignment>>;

    fn assignments_for_user(&self, user_id: UserId) -> RbacResult<Vec<UserRoleAssignment>>;

    fn assignments_for_role(&self, role_id: RoleId) -> RbacResult<Vec<UserRoleAssignment>>;

    fn set_assignment_active(&self, id: AssignmentId, is_active: bool) -> RbacResult<UserRoleAssignment>;

    fn insert_contextual(&self, grant: ContextualPermission) -> RbacResult<ContextualPermission>;

    fn contextual_for_user(&self, user_id: UserId) -> RbacResult<Vec<ContextualPermission>>;
}

/// Serializable image of an in-memory store
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PolicySnapshot {
    pub permissions: Vec<Permission>,
    pub roles: Vec<Role>,
    pub assignments: Vec<UserRoleAssignment>,
    pub contextual_permissions: Vec<ContextualPermission>,
}

#[derive(Debug, Default)]
struct Tables {
    permissions: BTreeMap<PermissionId, Permission>,
    roles: BTreeMap<RoleId, Role>,
    assignments: BTreeMap<AssignmentId, UserRoleAssignment>,
    contextual: BTreeMap<GrantId, ContextualPermission>,
    next_id: u64,
}

impl Tables {
    fn allocate_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn parent_of(&self, id: RoleId) -> RbacResult<Option<RoleId>> {
        self.roles.get(&id).map(|role| role.parent_role).ok_or_else(|| RbacError::NotFound {
            message: format!("Role {} not found", id),
        })
    }
}

/// In-memory policy store
#[derive(Debug, Default)]
pub struct InMemoryPolicyStore {
    tables: RwLock<Tables>,
}

impl InMemoryPolicyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot
    pub fn from_snapshot(snapshot: PolicySnapshot) -> Self {
        let mut tables = Tables::default();

        let ids = snapshot
            .permissions
            .iter()
            .map(|p| p.id)
            .chain(snapshot.roles.iter().map(|r| r.id))
            .chain(snapshot.assignments.iter().map(|a| a.id))
            .chain(snapshot.contextual_permissions.iter().map(|c| c.id));
        tables.next_id = ids.max().unwrap_or(0);

        tables.permissions = snapshot.permissions.into_iter().map(|p| (p.id, p)).collect();
        tables.roles = snapshot.roles.into_iter().map(|r| (r.id, r)).collect();
        tables.assignments = snapshot.assignments.into_iter().map(|a| (a.id, a)).collect();
        tables.contextual = snapshot.contextual_permissions.into_iter().map(|c| (c.id, c)).collect();

        Self { tables: RwLock::new(tables) }
    }

    pub fn snapshot(&self) -> PolicySnapshot {
        let tables = self.tables.read();

        PolicySnapshot {
            permissions: tables.permissions.values().cloned().collect(),
            roles: tables.roles.values().cloned().collect(),
            assignments: tables.assignments.values().cloned().collect(),
            contextual_permissions: tables.contextual.values().cloned().collect(),
        }
    }

    pub fn load_from_file(path: impl AsRef<Path>) -> RbacResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let snapshot: PolicySnapshot = serde_json::from_str(&content)?;
        Ok(Self::from_snapshot(snapshot))
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> RbacResult<()> {
        let content = serde_json::to_string_pretty(&self.snapshot())?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

impl PolicyStore for InMemoryPolicyStore {
    fn permission_by_codename(&self, codename: &str) -> RbacResult<Option<Permission>> {
        let tables = self.tables.read();
        Ok(tables.permissions.values().find(|p| p.codename == codename).cloned())
    }

    fn permissions(&self) -> RbacResult<Vec<Permission>> {
        let tables = self.tables.read();
        let mut permissions: Vec<Permission> = tables.permissions.values().cloned().collect();
        permissions.sort_by(|a, b| (&a.resource_type, a.action_type, &a.name).cmp(&(&b.resource_type, b.action_type, &b.name)));
        Ok(permissions)
    }

    fn insert_permission(&self, mut permission: Permission) -> RbacResult<Permission> {
        let mut tables = self.tables.write();

        if tables.permissions.values().any(|p| p.codename == permission.codename || p.name == permission.name) {
            return Err(RbacError::Conflict {
                message: format!("Permission '{}' already exists", permission.codename),
            });
        }

        permission.id = tables.allocate_id();
        tables.permissions.insert(permission.id, permission.clone());
        Ok(permission)
    }

    fn role(&self, id: RoleId) -> RbacResult<Option<Role>> {
        Ok(self.tables.read().roles.get(&id).cloned())
    }

    fn role_by_code(&self, code: &str) -> RbacResult<Option<Role>> {
        let tables = self.tables.read();
        Ok(tables.roles.values().find(|r| r.code == code).cloned())
    }

    fn roles(&self) -> RbacResult<Vec<Role>> {
        let tables = self.tables.read();
        let mut roles: Vec<Role> = tables.roles.values().cloned().collect();
        roles.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.name.cmp(&b.name)));
        Ok(roles)
    }

    fn save_role(&self, mut role: Role) -> RbacResult<Role> {
        let mut tables = self.tables.write();

        if role.id != 0 && !tables.roles.contains_key(&role.id) {
            return Err(RbacError::NotFound {
                message: format!("Role {} not found", role.id),
            });
        }

        if tables.roles.values().any(|r| r.id != role.id && (r.code == role.code || r.name == role.name)) {
            return Err(RbacError::Conflict {
                message: format!("Role with code '{}' or name '{}' already exists", role.code, role.name),
            });
        }

        if let Some(missing) = role.permissions.iter().find(|codename| !tables.permissions.values().any(|p| &p.codename == *codename)) {
            return Err(RbacError::UnknownPermission { codename: missing.clone() });
        }

        validate_parent_chain(role.id, role.parent_role, |id| tables.parent_of(id))?;

        if role.id == 0 {
            role.id = tables.allocate_id();
        }
        role.updated_at = Utc::now();
        tables.roles.insert(role.id, role.clone());
        Ok(role)
    }

    fn insert_assignment(&self, assignment: NewAssignment) -> RbacResult<UserRoleAssignment> {
        assignment.validate()?;

        let mut tables = self.tables.write();

        if !tables.roles.contains_key(&assignment.role_id) {
            return Err(RbacError::NotFound {
                message: format!("Role {} not found", assignment.role_id),
            });
        }

        let duplicate = tables
            .assignments
            .values()
            .any(|a| a.user_id == assignment.user_id && a.role_id == assignment.role_id && a.scope == assignment.scope);
        if duplicate {
            return Err(RbacError::Conflict {
                message: format!("User {} already holds role {} in scope {}", assignment.user_id, assignment.role_id, assignment.scope),
            });
        }

        let id = tables.allocate_id();
        let assignment = assignment.into_assignment(id);
        tables.assignments.insert(id, assignment.clone());
        Ok(assignment)
    }

    fn assignment(&self, id: AssignmentId) -> RbacResult<Option<UserRoleAssignment>> {
        Ok(self.tables.read().assignments.get(&id).cloned())
    }

    fn assignments_for_user(&self, user_id: UserId) -> RbacResult<Vec<UserRoleAssignment>> {
        let tables = self.tables.read();
        Ok(tables.assignments.values().filter(|a| a.user_id == user_id).cloned().collect())
    }

    fn assignments_for_role(&self, role_id: RoleId) -> RbacResult<Vec<UserRoleAssignment>> {
        let tables = self.tables.read();
        Ok(tables.assignments.values().filter(|a| a.role_id == role_id).cloned().collect())
    }

    fn set_assignment_active(&self, id: AssignmentId, is_active: bool) -> RbacResult<UserRoleAssignment> {
        let mut tables = self.tables.write();

        let assignment = tables.assignments.get_mut(&id).ok_or_else(|| RbacError::NotFound {
            message: format!("Role assignment {} not found", id),
        })?;
        assignment.is_active = is_active;
        assignment.updated_at = Utc::now();
        Ok(assignment.clone())
    }

    fn insert_contextual(&self, mut grant: ContextualPermission) -> RbacResult<ContextualPermission> {
        let mut tables = self.tables.write();

        if !tables.permissions.values().any(|p| p.codename == grant.permission) {
            return Err(RbacError::UnknownPermission { codename: grant.permission });
        }

        let duplicate = tables
            .contextual
            .values()
            .any(|c| c.user_id == grant.user_id && c.permission == grant.permission && c.context_type == grant.context_type && c.context_id == grant.context_id);
        if duplicate {
            return Err(RbacError::Conflict {
                message: format!(
                    "User {} already holds '{}' for {} {}",
                    grant.user_id, grant.permission, grant.context_type, grant.context_id
                ),
            });
        }

        grant.id = tables.allocate_id();
        tables.contextual.insert(grant.id, grant.clone());
        Ok(grant)
    }

    fn contextual_for_user(&self, user_id: UserId) -> RbacResult<Vec<ContextualPermission>> {
        let tables = self.tables.read();
        Ok(tables.contextual.values().filter(|c| c.user_id == user_id).cloned().collect())
    }
}
