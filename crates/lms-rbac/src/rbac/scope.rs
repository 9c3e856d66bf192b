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

//! Scope and context matching

use crate::rbac::assignments::{ContextualPermission, Scope};
use crate::resources::ScopableResource;

/// Decides whether an assignment scope or a contextual grant covers a target
#[derive(Debug, Clone, Copy, Default)]
pub struct ScopeMatcher;

impl ScopeMatcher {
    /// Whether an assignment declared with `scope` applies to `resource`.
    ///
    /// A global scope always applies. Any other scope needs a resource.
    pub fn matches(scope: &Scope, resource: Option<&dyn ScopableResource>) -> bool {
        let resource = match (scope, resource) {
            (Scope::Global, _) => return true,
            (_, None) => return false,
            (_, Some(resource)) => resource,
        };

        match scope {
            Scope::Global => true,
            Scope::Department { id } => resource.department_id() == Some(*id),
            Scope::Course { id } => resource.course_id() == Some(*id),
            Scope::CourseOffering { id } => resource.course_offering_id() == Some(*id),
            Scope::Custom { kind, id } => resource.custom_scope_id(kind) == Some(*id),
        }
    }

    /// Whether an assignment survives an explicit scope restriction.
    ///
    /// Global assignments survive every restriction; scoped ones only an equal scope.
    pub fn within(scope: &Scope, requested: Option<&Scope>) -> bool {
        match requested {
            None => true,
            Some(requested) => matches!(scope, Scope::Global) || scope == requested,
        }
    }

    /// Whether a contextual grant's context matches the check target
    pub fn context_matches(grant: &ContextualPermission, resource: Option<&dyn ScopableResource>) -> bool {
        match resource {
            Some(resource) => resource.context_id(&grant.context_type) == Some(grant.context_id),
            None => grant.is_global(),
        }
    }

    /// Whether a contextual grant belongs to a requested scope in aggregate views
    pub fn context_within(grant: &ContextualPermission, requested: Option<&Scope>) -> bool {
        match requested {
            None | Some(Scope::Global) => true,
            Some(scope) => grant.is_global() || (grant.context_type.eq_ignore_ascii_case(scope.context_type()) && scope.object_id() == Some(grant.context_id)),
        }
    }
}
