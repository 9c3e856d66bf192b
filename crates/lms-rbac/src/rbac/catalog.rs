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

//! Built-in permissions and system roles

use crate::error::RbacResult;
use crate::rbac::permissions::ActionType::{self, Create, Delete, Execute, Read, Update};
use crate::rbac::permissions::Permission;
use crate::rbac::roles::Role;
use crate::rbac::store::PolicyStore;
use tracing::info;

/// (codename, name, resource type, action, description)
type PermissionSpec = (&'static str, &'static str, &'static str, ActionType, &'static str);

const PERMISSIONS: &[PermissionSpec] = &[
    // User management
    ("can_create_users", "Create Users", "user", Create, "Can create new user accounts"),
    ("can_edit_all_users", "Edit All Users", "user", Update, "Can edit any user account"),
    ("can_delete_users", "Delete Users", "user", Delete, "Can delete user accounts"),
    ("can_view_all_users", "View All Users", "user", Read, "Can view all user accounts"),
    ("can_assign_roles", "Assign Roles", "role", Execute, "Can assign roles to users"),
    // Courses
    ("can_create_courses", "Create Courses", "course", Create, "Can create new courses"),
    ("can_edit_courses", "Edit Courses", "course", Update, "Can edit course information"),
    ("can_delete_courses", "Delete Courses", "course", Delete, "Can delete courses"),
    ("can_view_courses", "View Courses", "course", Read, "Can view course information"),
    ("can_manage_course_offerings", "Manage Course Offerings", "course_offering", Execute, "Can manage course offerings"),
    ("can_manage_enrollments", "Manage Enrollments", "enrollment", Execute, "Can manage student enrollments"),
    // Coursework
    ("can_create_assignments", "Create Assignments", "assignment", Create, "Can create assignments"),
    ("can_edit_assignments", "Edit Assignments", "assignment", Update, "Can edit assignments"),
    ("can_delete_assignments", "Delete Assignments", "assignment", Delete, "Can delete assignments"),
    ("can_grade_assignments", "Grade Assignments", "assignment", Execute, "Can grade student assignments"),
    ("can_view_all_submissions", "View All Submissions", "submission", Read, "Can view all assignment submissions"),
    // Academic structure
    ("can_manage_departments", "Manage Departments", "department", Execute, "Can manage academic departments"),
    ("can_manage_programs", "Manage Programs", "program", Execute, "Can manage academic programs"),
    ("can_manage_semesters", "Manage Semesters", "semester", Execute, "Can manage academic semesters"),
    // Communication
    ("can_moderate_forums", "Moderate Forums", "forum", Execute, "Can moderate discussion forums"),
    ("can_send_announcements", "Send Announcements", "announcement", Create, "Can send system announcements"),
    ("can_message_users", "Message Users", "message", Create, "Can send messages to other users"),
    // System administration
    ("can_access_admin_panel", "Access Admin Panel", "admin", Read, "Can access the admin panel"),
    ("can_modify_system_settings", "Modify System Settings", "system", Update, "Can modify system settings"),
    ("can_view_system_logs", "View System Logs", "log", Read, "Can view system logs"),
    ("can_generate_reports", "Generate Reports", "report", Execute, "Can generate system reports"),
    // Access control
    ("can_manage_permissions", "Manage Permissions", "permission", Execute, "Can manage system permissions"),
    ("can_manage_roles", "Manage Roles", "role", Execute, "Can manage system roles"),
    ("can_view_all_role_assignments", "View All Role Assignments", "role_assignment", Read, "Can view all role assignments"),
    ("can_manage_permission_templates", "Manage Permission Templates", "permission_template", Execute, "Can manage permission templates"),
    ("can_manage_contextual_permissions", "Manage Contextual Permissions", "contextual_permission", Execute, "Can manage contextual permissions"),
    ("can_view_audit_logs", "View Audit Logs", "audit_log", Read, "Can view audit logs"),
    ("can_view_all_audit_logs", "View All Audit Logs", "audit_log", Read, "Can view all audit logs"),
];

/// Permission bundle of a system role
#[derive(Debug, Clone, Copy)]
enum Bundle {
    All,
    Only(&'static [&'static str]),
}

/// (code, name, description, priority, permissions)
type RoleSpec = (&'static str, &'static str, &'static str, i32, Bundle);

const ROLES: &[RoleSpec] = &[
    ("ADMIN", "Administrator", "Full system access with all permissions", 100, Bundle::All),
    (
        "FACULTY",
        "Faculty",
        "Faculty member with course and student management permissions",
        80,
        Bundle::Only(&[
            "can_view_courses",
            "can_create_assignments",
            "can_edit_assignments",
            "can_grade_assignments",
            "can_view_all_submissions",
            "can_manage_course_offerings",
            "can_moderate_forums",
            "can_message_users",
            "can_generate_reports",
        ]),
    ),
    (
        "STUDENT",
        "Student",
        "Student with access to courses and assignments",
        60,
        Bundle::Only(&["can_view_courses", "can_message_users"]),
    ),
    ("PARENT", "Parent", "Parent with access to child information", 40, Bundle::Only(&["can_message_users"])),
    (
        "LIBRARIAN",
        "Librarian",
        "Library staff with resource management permissions",
        20,
        Bundle::Only(&["can_view_courses", "can_message_users", "can_generate_reports"]),
    ),
];

/// Codes of the built-in system roles, most senior first
pub fn system_role_codes() -> impl Iterator<Item = &'static str> {
    ROLES.iter().map(|(code, ..)| *code)
}

/// RBAC role code for a profile role, if one exists
pub fn base_role_code(profile_role: &str) -> Option<&'static str> {
    system_role_codes().find(|code| code.eq_ignore_ascii_case(profile_role))
}

/// Number of built-in permissions
pub fn permission_count() -> usize {
    PERMISSIONS.len()
}

/// What a seeding run created
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SeedReport {
    pub permissions_created: usize,
    pub roles_created: usize,
}

/// Create any missing built-in permissions and system roles.
///
/// Existing entries are left as they are, so running this twice is harmless.
pub fn seed_defaults(store: &dyn PolicyStore) -> RbacResult<SeedReport> {
    let mut report = SeedReport::default();

    for (codename, name, resource_type, action_type, description) in PERMISSIONS.iter().copied() {
        if store.permission_by_codename(codename)?.is_some() {
            continue;
        }
        store.insert_permission(Permission::new(codename, name, resource_type, action_type).with_description(description).system())?;
        report.permissions_created += 1;
    }

    for (code, name, description, priority, bundle) in ROLES.iter().copied() {
        if store.role_by_code(code)?.is_some() {
            continue;
        }

        let mut role = Role::system_role(code, name, description, priority);
        match bundle {
            Bundle::All => {
                for permission in store.permissions()? {
                    role.add_permission(permission.codename);
                }
            }
            Bundle::Only(codenames) => {
                for codename in codenames {
                    role.add_permission(*codename);
                }
            }
        }

        store.save_role(role)?;
        report.roles_created += 1;
        info!(role = %code, "Created system role");
    }

    info!(
        permissions_created = report.permissions_created,
        roles_created = report.roles_created,
        "Default RBAC catalog seeded"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rbac::store::InMemoryPolicyStore;

    #[test]
    fn test_seed_is_idempotent() {
        let store = InMemoryPolicyStore::new();

        let first = seed_defaults(&store).unwrap();
        assert_eq!(first.permissions_created, 33);
        assert_eq!(first.roles_created, 5);

        let second = seed_defaults(&store).unwrap();
        assert_eq!(second, SeedReport::default());
        assert_eq!(store.permissions().unwrap().len(), permission_count());
    }

    #[test]
    fn test_role_bundles() {
        let store = InMemoryPolicyStore::new();
        seed_defaults(&store).unwrap();

        let admin = store.role_by_code("ADMIN").unwrap().unwrap();
        assert_eq!(admin.permissions.len(), 33);
        assert_eq!(admin.priority, 100);

        let faculty = store.role_by_code("FACULTY").unwrap().unwrap();
        assert!(faculty.permissions.contains("can_grade_assignments"));
        assert!(!faculty.permissions.contains("can_manage_roles"));

        let parent = store.role_by_code("PARENT").unwrap().unwrap();
        assert_eq!(parent.permissions.iter().collect::<Vec<_>>(), vec!["can_message_users"]);
    }

    #[test]
    fn test_base_role_mapping() {
        assert_eq!(base_role_code("STUDENT"), Some("STUDENT"));
        assert_eq!(base_role_code("librarian"), Some("LIBRARIAN"));
        assert_eq!(base_role_code("ALUMNI"), None);
    }
}
