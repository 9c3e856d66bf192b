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

//! Permission evaluation
//!
//! [`PermissionEvaluator::evaluate`] is the fallible core and reports why a
//! check failed. The collaborator-facing methods (`user_has_permission` and
//! friends) fail closed: every error becomes a denial, recorded in the audit
//! stream with result `ERROR`.

use crate::auth::User;
use crate::config::RbacConfig;
use crate::error::{RbacError, RbacResult};
use crate::rbac::assignments::{AssignmentId, ContextualPermission, GrantId, NewAssignment, Scope, ScopeObject, ScopeType, UserRoleAssignment};
use crate::rbac::audit::{AuditResult, AuditSink, PermissionAudit};
use crate::rbac::catalog::{self, SeedReport};
use crate::rbac::permissions::scope_codename;
use crate::rbac::roles::{Role, RoleGraph, RoleId};
use crate::rbac::scope::ScopeMatcher;
use crate::rbac::store::PolicyStore;
use crate::resources::ScopableResource;
use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

/// Where a granted permission came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GrantSource {
    Role { assignment_id: AssignmentId, role_code: String },
    Contextual { grant_id: GrantId },
}

/// Result of a successful evaluation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Granted(GrantSource),
    Denied,
}

impl Decision {
    pub fn is_granted(&self) -> bool {
        matches!(self, Decision::Granted(_))
    }

    fn audit_result(&self) -> AuditResult {
        match self {
            Decision::Granted(_) => AuditResult::Granted,
            Decision::Denied => AuditResult::Denied,
        }
    }
}

/// Client details recorded with checks made on behalf of a request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestInfo {
    pub ip_address: Option<String>,
    pub user_agent: String,
    pub path: String,
}

/// Optional inputs of a single check
#[derive(Clone, Copy, Default)]
pub struct CheckContext<'a> {
    /// Target of the operation
    pub resource: Option<&'a dyn ScopableResource>,

    /// Restrict role assignments to this scope
    pub scope: Option<&'a Scope>,

    pub request: Option<&'a RequestInfo>,
}

impl<'a> CheckContext<'a> {
    pub fn for_resource(resource: &'a dyn ScopableResource) -> Self {
        Self {
            resource: Some(resource),
            ..Self::default()
        }
    }

    pub fn with_request(mut self, request: &'a RequestInfo) -> Self {
        self.request = Some(request);
        self
    }
}

/// Optional parts of a role assignment
#[derive(Debug, Clone, Default)]
pub struct AssignOptions {
    pub assigned_by: Option<User>,
    pub scope_type: ScopeType,
    pub scope_object: Option<ScopeObject>,
    /// Defaults to the time of assignment
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
}

impl AssignOptions {
    pub fn scoped(scope_type: ScopeType, scope_object: ScopeObject) -> Self {
        Self {
            scope_type,
            scope_object: Some(scope_object),
            ..Self::default()
        }
    }

    pub fn assigned_by(mut self, user: &User) -> Self {
        self.assigned_by = Some(user.clone());
        self
    }

    pub fn window(mut self, start_date: Option<DateTime<Utc>>, end_date: Option<DateTime<Utc>>) -> Self {
        self.start_date = start_date;
        self.end_date = end_date;
        self
    }
}

/// Administrative view of a role
#[derive(Debug, Clone, Serialize)]
pub struct RoleSummary {
    pub role: Role,
    pub effective_permissions: BTreeSet<String>,
    /// Distinct users holding a current assignment of the role
    pub user_count: usize,
    pub parent_name: Option<String>,
    pub child_count: usize,
}

/// Audit labelling for a check
struct AuditTarget<'a> {
    action: &'a str,
    resource_type: Option<&'a str>,
    resource_id: Option<u64>,
}

impl Default for AuditTarget<'_> {
    fn default() -> Self {
        Self {
            action: "permission_check",
            resource_type: None,
            resource_id: None,
        }
    }
}

/// Permission evaluator backed by a policy store and an audit sink
#[derive(Clone)]
pub struct PermissionEvaluator {
    store: Arc<dyn PolicyStore>,
    audit: Arc<dyn AuditSink>,
    config: RbacConfig,
}

impl PermissionEvaluator {
    /// Create a new evaluator with default configuration
    pub fn new(store: Arc<dyn PolicyStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self {
            store,
            audit,
            config: RbacConfig::default(),
        }
    }

    pub fn with_config(mut self, config: RbacConfig) -> Self {
        self.config = config;
        self
    }

    pub fn store(&self) -> &dyn PolicyStore {
        self.store.as_ref()
    }

    pub fn config(&self) -> &RbacConfig {
        &self.config
    }

    /// Evaluate a permission without auditing.
    ///
    /// Role assignments are tried first, then contextual grants. The first
    /// source that grants wins; assignment order carries no priority.
    pub fn evaluate(&self, user: &User, codename: &str, resource: Option<&dyn ScopableResource>, scope: Option<&Scope>) -> RbacResult<Decision> {
        if self.store.permission_by_codename(codename)?.is_none() {
            return Err(RbacError::UnknownPermission { codename: codename.to_string() });
        }

        let now = Utc::now();
        let graph = RoleGraph::new(self.store.as_ref());

        for assignment in self.store.assignments_for_user(user.id)? {
            if !assignment.is_current_at(now) || !ScopeMatcher::within(&assignment.scope, scope) || !ScopeMatcher::matches(&assignment.scope, resource) {
                continue;
            }

            let role = self.assigned_role(&assignment)?;
            if graph.effective_permissions(&role)?.contains(codename) {
                return Ok(Decision::Granted(GrantSource::Role {
                    assignment_id: assignment.id,
                    role_code: role.code,
                }));
            }
        }

        let contextual = self
            .store
            .contextual_for_user(user.id)?
            .into_iter()
            .find(|grant| grant.permission == codename && grant.is_active_at(now) && ScopeMatcher::context_within(grant, scope) && ScopeMatcher::context_matches(grant, resource));

        Ok(match contextual {
            Some(grant) => Decision::Granted(GrantSource::Contextual { grant_id: grant.id }),
            None => Decision::Denied,
        })
    }

    /// Whether `user` holds `codename` for the optional resource and scope.
    ///
    /// Missing users are denied without an audit record. Every other call
    /// writes exactly one audit entry.
    pub fn user_has_permission(&self, user: Option<&User>, codename: &str, resource: Option<&dyn ScopableResource>, scope: Option<&Scope>) -> bool {
        self.check(
            user,
            codename,
            CheckContext {
                resource,
                scope,
                request: None,
            },
        )
    }

    /// [`user_has_permission`](Self::user_has_permission) with every optional input in one place
    pub fn check(&self, user: Option<&User>, codename: &str, context: CheckContext<'_>) -> bool {
        self.audited_check(user, codename, context, AuditTarget::default())
    }

    /// Check the conventional `{action}_{resource_type}` permission for a resource id
    pub fn check_scope_permission(&self, user: Option<&User>, action: &str, resource_type: &str, resource_id: Option<u64>) -> bool {
        self.check_scope_permission_for_request(user, action, resource_type, resource_id, None)
    }

    pub fn check_scope_permission_for_request(
        &self,
        user: Option<&User>,
        action: &str,
        resource_type: &str,
        resource_id: Option<u64>,
        request: Option<&RequestInfo>,
    ) -> bool {
        let codename = scope_codename(action, resource_type);
        let context = CheckContext {
            request,
            ..CheckContext::default()
        };
        let target = AuditTarget {
            resource_type: Some(resource_type),
            resource_id,
            ..AuditTarget::default()
        };

        self.audited_check(user, &codename, context, target)
    }

    /// Check several permissions against the same resource
    pub fn check_permissions<'c>(&self, user: Option<&User>, codenames: impl IntoIterator<Item = &'c str>, resource: Option<&dyn ScopableResource>) -> BTreeMap<String, bool> {
        codenames
            .into_iter()
            .map(|codename| (codename.to_string(), self.user_has_permission(user, codename, resource, None)))
            .collect()
    }

    fn audited_check(&self, user: Option<&User>, codename: &str, context: CheckContext<'_>, target: AuditTarget<'_>) -> bool {
        let Some(user) = user else {
            debug!(permission = %codename, "Permission check without identity denied");
            return false;
        };

        let started = Instant::now();
        let outcome = self.evaluate(user, codename, context.resource, context.scope);
        let elapsed = started.elapsed();

        let resource_type = target
            .resource_type
            .map(str::to_string)
            .or_else(|| context.resource.map(|r| r.resource_type().to_string()))
            .unwrap_or_else(|| "None".to_string());
        let resource_id = target.resource_id.or_else(|| context.resource.and_then(|r| r.resource_id()));

        let mut entry = PermissionAudit::new(Some(user), codename, AuditResult::Error)
            .with_action(target.action)
            .with_resource(resource_type, resource_id);

        if let Some(request) = context.request {
            entry = entry.with_client_info(request.ip_address.clone(), request.user_agent.clone(), request.path.clone());
        }

        let granted = match outcome {
            Ok(decision) => {
                entry.result = decision.audit_result();
                if let Decision::Granted(source) = &decision {
                    entry = entry.with_detail("source", grant_source_detail(source));
                }
                debug!(user_id = %user.id, permission = %codename, result = %entry.result, elapsed_us = elapsed.as_micros() as u64, "Permission evaluated");
                decision.is_granted()
            }
            Err(RbacError::UnknownPermission { codename: unknown }) => {
                warn!(user_id = %user.id, permission = %unknown, "Permission does not exist");
                entry = entry.with_detail("error", "unknown_permission");
                false
            }
            Err(err) => {
                error!(user_id = %user.id, permission = %codename, error = %err, "Error checking permission");
                entry = entry.with_detail("error", err.to_string());
                false
            }
        };

        if elapsed > self.config.slow_check_threshold() {
            warn!(user_id = %user.id, permission = %codename, elapsed_ms = elapsed.as_millis() as u64, "Slow permission check");
        }

        counter!("rbac_permission_checks_total", 1, "result" => entry.result.as_str());

        if let Err(err) = self.audit.record(entry) {
            error!(user_id = %user.id, permission = %codename, error = %err, "Failed to log permission check");
        }

        granted
    }

    /// Codenames available to the user through current assignments and grants.
    ///
    /// With no scope this is the union over everything the user holds. With a
    /// scope, only global assignments and assignments declared for exactly that
    /// scope count, together with contextual grants in that context.
    pub fn get_user_permissions(&self, user: Option<&User>, scope: Option<&Scope>) -> BTreeSet<String> {
        let Some(user) = user else {
            return BTreeSet::new();
        };

        self.collect_user_permissions(user, scope).unwrap_or_else(|err| {
            error!(user_id = %user.id, error = %err, "Failed to resolve user permissions");
            BTreeSet::new()
        })
    }

    fn collect_user_permissions(&self, user: &User, scope: Option<&Scope>) -> RbacResult<BTreeSet<String>> {
        let now = Utc::now();
        let graph = RoleGraph::new(self.store.as_ref());
        let mut permissions = BTreeSet::new();

        for assignment in self.store.assignments_for_user(user.id)? {
            if !assignment.is_current_at(now) || !ScopeMatcher::within(&assignment.scope, scope) {
                continue;
            }
            let role = self.assigned_role(&assignment)?;
            permissions.extend(graph.effective_permissions(&role)?);
        }

        permissions.extend(
            self.store
                .contextual_for_user(user.id)?
                .into_iter()
                .filter(|grant| grant.is_active_at(now) && ScopeMatcher::context_within(grant, scope))
                .map(|grant| grant.permission),
        );

        Ok(permissions)
    }

    /// Create a role assignment
    pub fn assign_role_to_user(&self, user: &User, role: &Role, options: AssignOptions) -> RbacResult<UserRoleAssignment> {
        let scope = Scope::from_parts(options.scope_type, options.scope_object).map_err(|err| rejected_write("assign_role", err))?;

        let assignment = self
            .store
            .insert_assignment(NewAssignment {
                user_id: user.id,
                role_id: role.id,
                assigned_by: options.assigned_by.as_ref().map(|u| u.id),
                scope,
                start_date: options.start_date.unwrap_or_else(Utc::now),
                end_date: options.end_date,
            })
            .map_err(|err| rejected_write("assign_role", err))?;

        info!(
            user = %user.username,
            role = %role.name,
            scope = %assignment.scope,
            assigned_by = %options.assigned_by.as_ref().map(|u| u.username.as_str()).unwrap_or("system"),
            "Role assigned"
        );

        Ok(assignment)
    }

    /// Grant a single permission tied to a context object
    pub fn grant_contextual_permission(
        &self,
        user: &User,
        codename: &str,
        context_type: &str,
        context_id: u64,
        granted_by: Option<&User>,
        expires_at: Option<DateTime<Utc>>,
    ) -> RbacResult<ContextualPermission> {
        let grant = self.store.insert_contextual(ContextualPermission {
            id: 0,
            user_id: user.id,
            permission: codename.to_string(),
            context_type: context_type.to_string(),
            context_id,
            granted_by: granted_by.map(|u| u.id),
            granted_at: Utc::now(),
            expires_at,
        })?;

        info!(
            user = %user.username,
            permission = %codename,
            context_type = %context_type,
            context_id = context_id,
            "Contextual permission granted"
        );

        Ok(grant)
    }

    /// Stop an assignment from granting
    pub fn deactivate_assignment(&self, assignment_id: AssignmentId) -> RbacResult<UserRoleAssignment> {
        let assignment = self.store.set_assignment_active(assignment_id, false)?;
        info!(assignment_id = assignment_id, user_id = %assignment.user_id, "Role assignment deactivated");
        Ok(assignment)
    }

    pub fn current_assignments(&self, user: &User) -> RbacResult<Vec<UserRoleAssignment>> {
        let now = Utc::now();
        Ok(self.store.assignments_for_user(user.id)?.into_iter().filter(|a| a.is_current_at(now)).collect())
    }

    /// Literal codes of the user's currently assigned roles
    pub fn current_role_codes(&self, user: &User) -> RbacResult<BTreeSet<String>> {
        self.current_assignments(user)?
            .iter()
            .map(|assignment| self.assigned_role(assignment).map(|role| role.code))
            .collect()
    }

    /// Current role codes plus the codes of every ancestor role
    pub fn effective_role_codes(&self, user: &User) -> RbacResult<BTreeSet<String>> {
        let graph = RoleGraph::new(self.store.as_ref());
        let mut codes = BTreeSet::new();

        for assignment in self.current_assignments(user)? {
            let role = self.assigned_role(&assignment)?;
            codes.extend(graph.lineage_codes(&role)?);
        }

        Ok(codes)
    }

    /// Give a user the system role matching their profile role.
    ///
    /// Returns `None` when the profile role has no RBAC counterpart or when
    /// the user already holds it globally.
    pub fn assign_base_role(&self, user: &User, profile_role: &str) -> RbacResult<Option<UserRoleAssignment>> {
        let Some(code) = catalog::base_role_code(profile_role) else {
            warn!(user = %user.username, profile_role = %profile_role, "No RBAC role for profile role");
            return Ok(None);
        };

        let Some(role) = self.store.role_by_code(code)? else {
            warn!(user = %user.username, role = %code, "Role not found for user");
            return Ok(None);
        };

        let already_assigned = self
            .store
            .assignments_for_user(user.id)?
            .iter()
            .any(|a| a.role_id == role.id && a.scope == Scope::Global);
        if already_assigned {
            return Ok(None);
        }

        self.assign_role_to_user(user, &role, AssignOptions::default()).map(Some)
    }

    /// Persist a new role
    pub fn create_role(&self, role: Role) -> RbacResult<Role> {
        if role.id != 0 {
            return Err(RbacError::Conflict {
                message: format!("Role {} already exists", role.id),
            });
        }

        let role = self.store.save_role(role).map_err(|err| rejected_write("create_role", err))?;
        info!(role_id = role.id, role = %role.code, "Role created");
        Ok(role)
    }

    /// Replace a stored role
    pub fn update_role(&self, role: Role) -> RbacResult<Role> {
        if role.id == 0 {
            return Err(RbacError::NotFound {
                message: "Role has not been created".to_string(),
            });
        }

        let role = self.store.save_role(role).map_err(|err| rejected_write("update_role", err))?;
        info!(role_id = role.id, role = %role.code, "Role updated");
        Ok(role)
    }

    pub fn role_summary(&self, role_id: RoleId) -> RbacResult<RoleSummary> {
        let role = self.store.role(role_id)?.ok_or_else(|| RbacError::NotFound {
            message: format!("Role {} not found", role_id),
        })?;

        let effective_permissions = RoleGraph::new(self.store.as_ref()).effective_permissions(&role)?;

        let now = Utc::now();
        let user_count = self
            .store
            .assignments_for_role(role_id)?
            .into_iter()
            .filter(|a| a.is_current_at(now))
            .map(|a| a.user_id)
            .collect::<BTreeSet<_>>()
            .len();

        let parent_name = match role.parent_role {
            Some(parent_id) => self.store.role(parent_id)?.map(|parent| parent.name),
            None => None,
        };

        let child_count = self.store.roles()?.iter().filter(|r| r.parent_role == Some(role_id)).count();

        Ok(RoleSummary {
            role,
            effective_permissions,
            user_count,
            parent_name,
            child_count,
        })
    }

    /// Install the built-in permissions and system roles
    pub fn seed_defaults(&self) -> RbacResult<SeedReport> {
        catalog::seed_defaults(self.store.as_ref())
    }

    fn assigned_role(&self, assignment: &UserRoleAssignment) -> RbacResult<Role> {
        self.store.role(assignment.role_id)?.ok_or_else(|| RbacError::EvaluationInternal {
            message: format!("Role {} referenced by assignment {} not found", assignment.role_id, assignment.id),
        })
    }
}

fn grant_source_detail(source: &GrantSource) -> serde_json::Value {
    match source {
        GrantSource::Role { assignment_id, role_code } => serde_json::json!({
            "kind": "role",
            "assignment_id": assignment_id,
            "role": role_code,
        }),
        GrantSource::Contextual { grant_id } => serde_json::json!({
            "kind": "contextual",
            "grant_id": grant_id,
        }),
    }
}

/// Log validation failures of policy writes
fn rejected_write(operation: &'static str, err: RbacError) -> RbacError {
    if err.is_validation_error() {
        warn!(operation = operation, error = %err, "Policy write rejected");
    }
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::audit::AuditLog;
    use crate::rbac::permissions::{ActionType, Permission};
    use crate::rbac::store::InMemoryPolicyStore;
    use crate::resources::{Course, ResourceRef};
    use chrono::Duration;

    struct Fixture {
        store: Arc<InMemoryPolicyStore>,
        audit: Arc<AuditLog>,
        evaluator: PermissionEvaluator,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryPolicyStore::new());
        let audit = Arc::new(AuditLog::new());
        let evaluator = PermissionEvaluator::new(store.clone(), audit.clone());
        evaluator.seed_defaults().unwrap();
        Fixture { store, audit, evaluator }
    }

    fn role(fixture: &Fixture, code: &str) -> Role {
        fixture.store.role_by_code(code).unwrap().unwrap()
    }

    #[test]
    fn test_unknown_permission_is_an_error_internally() {
        let f = fixture();
        let user = User::new(1, "alice");

        let err = f.evaluator.evaluate(&user, "can_fly", None, None).unwrap_err();
        assert!(matches!(err, RbacError::UnknownPermission { .. }));

        assert!(!f.evaluator.user_has_permission(Some(&user), "can_fly", None, None));
        let entries = f.audit.entries();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].result, AuditResult::Error);
    }

    #[test]
    fn test_decision_reports_source() {
        let f = fixture();
        let user = User::new(1, "alice");
        let assignment = f.evaluator.assign_role_to_user(&user, &role(&f, "FACULTY"), AssignOptions::default()).unwrap();

        let decision = f.evaluator.evaluate(&user, "can_grade_assignments", None, None).unwrap();
        assert_eq!(
            decision,
            Decision::Granted(GrantSource::Role {
                assignment_id: assignment.id,
                role_code: "FACULTY".to_string()
            })
        );
        assert_eq!(f.evaluator.evaluate(&user, "can_manage_roles", None, None).unwrap(), Decision::Denied);
    }

    #[test]
    fn test_request_info_recorded() {
        let f = fixture();
        let user = User::new(1, "alice");
        let request = RequestInfo {
            ip_address: Some("203.0.113.9".to_string()),
            user_agent: "Mozilla/5.0".to_string(),
            path: "/api/v1/courses/".to_string(),
        };
        let course = Course {
            id: 4,
            code: "CS101".to_string(),
            department_id: 1,
        };

        f.evaluator.check(Some(&user), "can_view_courses", CheckContext::for_resource(&course).with_request(&request));

        let entry = &f.audit.entries()[0];
        assert_eq!(entry.result, AuditResult::Denied);
        assert_eq!(entry.resource_type, "Course");
        assert_eq!(entry.resource_id, Some(4));
        assert_eq!(entry.ip_address.as_deref(), Some("203.0.113.9"));
        assert_eq!(entry.request_path, "/api/v1/courses/");
    }

    #[test]
    fn test_check_scope_permission_derives_codename() {
        let f = fixture();
        let user = User::new(1, "alice");

        let mut custom = Role::new("VIEWER", "Viewer", "");
        f.store
            .insert_permission(Permission::new("read_course", "Read Course", "course", ActionType::Read))
            .unwrap();
        custom.add_permission("read_course");
        let custom = f.evaluator.create_role(custom).unwrap();
        f.evaluator.assign_role_to_user(&user, &custom, AssignOptions::default()).unwrap();

        assert!(f.evaluator.check_scope_permission(Some(&user), "read", "Course", Some(3)));
        assert!(!f.evaluator.check_scope_permission(Some(&user), "delete", "Course", Some(3)));

        let entries = f.audit.entries();
        assert_eq!(entries[0].resource_type, "Course");
        assert_eq!(entries[0].resource_id, Some(3));
        // delete_course is not registered
        assert_eq!(entries[1].result, AuditResult::Error);
    }

    #[test]
    fn test_scope_argument_narrows_assignments() {
        let f = fixture();
        let user = User::new(1, "alice");
        f.evaluator
            .assign_role_to_user(&user, &role(&f, "FACULTY"), AssignOptions::scoped(ScopeType::Department, ScopeObject::new("department", 1)))
            .unwrap();
        let resource = ResourceRef::new("Course", Some(9)).in_department(1);

        assert!(f.evaluator.user_has_permission(Some(&user), "can_grade_assignments", Some(&resource), Some(&Scope::Department { id: 1 })));
        assert!(!f.evaluator.user_has_permission(Some(&user), "can_grade_assignments", Some(&resource), Some(&Scope::Department { id: 2 })));
    }

    #[test]
    fn test_get_user_permissions_with_scope() {
        let f = fixture();
        let user = User::new(1, "alice");
        f.evaluator.assign_role_to_user(&user, &role(&f, "STUDENT"), AssignOptions::default()).unwrap();
        f.evaluator
            .assign_role_to_user(&user, &role(&f, "FACULTY"), AssignOptions::scoped(ScopeType::Course, ScopeObject::new("course", 7)))
            .unwrap();
        f.evaluator.grant_contextual_permission(&user, "can_manage_enrollments", "course", 8, None, None).unwrap();

        let everywhere = f.evaluator.get_user_permissions(Some(&user), None);
        assert!(everywhere.contains("can_grade_assignments"));
        assert!(everywhere.contains("can_manage_enrollments"));

        let course_seven = f.evaluator.get_user_permissions(Some(&user), Some(&Scope::Course { id: 7 }));
        assert!(course_seven.contains("can_grade_assignments"));
        assert!(!course_seven.contains("can_manage_enrollments"));

        let elsewhere = f.evaluator.get_user_permissions(Some(&user), Some(&Scope::Department { id: 1 }));
        assert_eq!(elsewhere, BTreeSet::from(["can_view_courses".to_string(), "can_message_users".to_string()]));

        assert!(f.evaluator.get_user_permissions(None, None).is_empty());
    }

    #[test]
    fn test_role_codes_literal_and_effective() {
        let f = fixture();
        let user = User::new(1, "alice");
        let ta = f.evaluator.create_role(Role::new("TA", "Teaching Assistant", "").with_parent(role(&f, "FACULTY").id)).unwrap();
        f.evaluator.assign_role_to_user(&user, &ta, AssignOptions::default()).unwrap();

        assert_eq!(f.evaluator.current_role_codes(&user).unwrap(), BTreeSet::from(["TA".to_string()]));
        assert_eq!(
            f.evaluator.effective_role_codes(&user).unwrap(),
            BTreeSet::from(["TA".to_string(), "FACULTY".to_string()])
        );
    }

    #[test]
    fn test_deactivated_assignment_stops_granting() {
        let f = fixture();
        let user = User::new(1, "alice");
        let assignment = f.evaluator.assign_role_to_user(&user, &role(&f, "FACULTY"), AssignOptions::default()).unwrap();
        assert!(f.evaluator.user_has_permission(Some(&user), "can_grade_assignments", None, None));

        f.evaluator.deactivate_assignment(assignment.id).unwrap();
        assert!(!f.evaluator.user_has_permission(Some(&user), "can_grade_assignments", None, None));
        assert!(f.evaluator.current_assignments(&user).unwrap().is_empty());
    }

    #[test]
    fn test_assign_base_role_once() {
        let f = fixture();
        let user = User::new(1, "alice").with_profile_role("STUDENT");

        assert!(f.evaluator.assign_base_role(&user, "STUDENT").unwrap().is_some());
        assert!(f.evaluator.assign_base_role(&user, "STUDENT").unwrap().is_none());
        assert!(f.evaluator.assign_base_role(&user, "ALUMNI").unwrap().is_none());
        assert!(f.evaluator.user_has_permission(Some(&user), "can_view_courses", None, None));
    }

    #[test]
    fn test_invalid_writes_are_rejected_as_validation_errors() {
        let f = fixture();
        let user = User::new(1, "alice");
        let faculty = role(&f, "FACULTY");

        let options = AssignOptions {
            scope_type: ScopeType::Department,
            ..AssignOptions::default()
        };
        let err = f.evaluator.assign_role_to_user(&user, &faculty, options).unwrap_err();
        assert!(err.is_validation_error());
        assert!(f.store.assignments_for_user(user.id).unwrap().is_empty());

        let child = f.evaluator.create_role(Role::new("TA", "Teaching Assistant", "").with_parent(faculty.id)).unwrap();
        let mut looped = faculty.clone();
        looped.set_parent(Some(child.id));
        assert!(f.evaluator.update_role(looped).unwrap_err().is_validation_error());
    }

    #[test]
    fn test_role_summary() {
        let f = fixture();
        let faculty = role(&f, "FACULTY");
        f.evaluator.create_role(Role::new("TA", "Teaching Assistant", "").with_parent(faculty.id)).unwrap();
        for id in 1..=3 {
            f.evaluator.assign_role_to_user(&User::new(id, format!("user{}", id)), &faculty, AssignOptions::default()).unwrap();
        }
        let expired = AssignOptions::scoped(ScopeType::Department, ScopeObject::new("department", 1))
            .window(Some(Utc::now() - Duration::days(10)), Some(Utc::now() - Duration::days(1)));
        f.evaluator.assign_role_to_user(&User::new(4, "user4"), &faculty, expired).unwrap();

        let summary = f.evaluator.role_summary(faculty.id).unwrap();
        assert_eq!(summary.user_count, 3);
        assert_eq!(summary.child_count, 1);
        assert_eq!(summary.parent_name, None);
        assert_eq!(summary.effective_permissions.len(), 9);
    }

    #[test]
    fn test_bulk_check() {
        let f = fixture();
        let user = User::new(1, "alice");
        f.evaluator.assign_role_to_user(&user, &role(&f, "PARENT"), AssignOptions::default()).unwrap();

        let results = f.evaluator.check_permissions(Some(&user), ["can_message_users", "can_view_courses"], None);
        assert_eq!(results.get("can_message_users"), Some(&true));
        assert_eq!(results.get("can_view_courses"), Some(&false));
        assert_eq!(f.audit.len(), 2);
    }
}
