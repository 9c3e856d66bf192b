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

//! Domain entities that can be the target of a permission check
//!
//! Each entity reports the academic relationships it sits under. Scope
//! matching and contextual grants only ever look at these accessors.

use serde::{Deserialize, Serialize};

pub type DepartmentId = u64;
pub type CourseId = u64;
pub type CourseOfferingId = u64;

/// A resource that can be located inside the academic hierarchy
pub trait ScopableResource {
    /// Resource category recorded in audit entries (e.g. "Course")
    fn resource_type(&self) -> &str;

    /// Primary key of the resource, if it has one
    fn resource_id(&self) -> Option<u64>;

    /// Department the resource belongs to, resolved through any course chain
    fn department_id(&self) -> Option<DepartmentId> {
        None
    }

    fn course_id(&self) -> Option<CourseId> {
        None
    }

    fn course_offering_id(&self) -> Option<CourseOfferingId> {
        None
    }

    /// Identifier under a custom scope kind; nothing matches unless overridden
    fn custom_scope_id(&self, _kind: &str) -> Option<u64> {
        None
    }

    /// Identifier of the related object named by a contextual grant's context type
    fn context_id(&self, context_type: &str) -> Option<u64> {
        match context_type.to_ascii_lowercase().as_str() {
            "department" => self.department_id(),
            "course" => self.course_id(),
            "course_offering" => self.course_offering_id(),
            _ => None,
        }
    }
}

/// Academic department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Department {
    pub id: DepartmentId,
    pub code: String,
}

impl ScopableResource for Department {
    fn resource_type(&self) -> &str {
        "Department"
    }

    fn resource_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn department_id(&self) -> Option<DepartmentId> {
        Some(self.id)
    }
}

/// Catalog course owned by a department
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Course {
    pub id: CourseId,
    pub code: String,
    pub department_id: DepartmentId,
}

impl ScopableResource for Course {
    fn resource_type(&self) -> &str {
        "Course"
    }

    fn resource_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn department_id(&self) -> Option<DepartmentId> {
        Some(self.department_id)
    }

    fn course_id(&self) -> Option<CourseId> {
        Some(self.id)
    }
}

/// A course taught in a particular semester
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CourseOffering {
    pub id: CourseOfferingId,
    pub course_id: CourseId,
    pub department_id: DepartmentId,
}

impl ScopableResource for CourseOffering {
    fn resource_type(&self) -> &str {
        "CourseOffering"
    }

    fn resource_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn department_id(&self) -> Option<DepartmentId> {
        Some(self.department_id)
    }

    fn course_id(&self) -> Option<CourseId> {
        Some(self.course_id)
    }

    fn course_offering_id(&self) -> Option<CourseOfferingId> {
        Some(self.id)
    }
}

/// Coursework attached to a course offering
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: u64,
    pub title: String,
    pub offering: CourseOffering,
}

impl ScopableResource for Assignment {
    fn resource_type(&self) -> &str {
        "Assignment"
    }

    fn resource_id(&self) -> Option<u64> {
        Some(self.id)
    }

    fn department_id(&self) -> Option<DepartmentId> {
        self.offering.department_id()
    }

    fn course_id(&self) -> Option<CourseId> {
        self.offering.course_id()
    }

    fn course_offering_id(&self) -> Option<CourseOfferingId> {
        Some(self.offering.id)
    }
}

/// Loosely-typed resource reference built from request or command-line input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceRef {
    pub resource_type: String,
    pub id: Option<u64>,
    pub department_id: Option<DepartmentId>,
    pub course_id: Option<CourseId>,
    pub course_offering_id: Option<CourseOfferingId>,
}

impl ResourceRef {
    pub fn new(resource_type: impl Into<String>, id: Option<u64>) -> Self {
        Self {
            resource_type: resource_type.into(),
            id,
            ..Self::default()
        }
    }

    pub fn in_department(mut self, department_id: DepartmentId) -> Self {
        self.department_id = Some(department_id);
        self
    }

    pub fn in_course(mut self, course_id: CourseId) -> Self {
        self.course_id = Some(course_id);
        self
    }

    pub fn in_offering(mut self, course_offering_id: CourseOfferingId) -> Self {
        self.course_offering_id = Some(course_offering_id);
        self
    }
}

impl ScopableResource for ResourceRef {
    fn resource_type(&self) -> &str {
        &self.resource_type
    }

    fn resource_id(&self) -> Option<u64> {
        self.id
    }

    fn department_id(&self) -> Option<DepartmentId> {
        self.department_id
    }

    fn course_id(&self) -> Option<CourseId> {
        self.course_id
    }

    fn course_offering_id(&self) -> Option<CourseOfferingId> {
        self.course_offering_id
    }
}
