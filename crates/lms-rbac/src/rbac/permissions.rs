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

//! Permission definitions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type PermissionId = u64;

/// Kind of action a permission allows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ActionType {
    Create,
    Read,
    Update,
    Delete,
    Execute,
}

impl ActionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Create => "CREATE",
            ActionType::Read => "READ",
            ActionType::Update => "UPDATE",
            ActionType::Delete => "DELETE",
            ActionType::Execute => "EXECUTE",
        }
    }
}

impl fmt::Display for ActionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ActionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "CREATE" => Ok(ActionType::Create),
            "READ" => Ok(ActionType::Read),
            "UPDATE" => Ok(ActionType::Update),
            "DELETE" => Ok(ActionType::Delete),
            "EXECUTE" => Ok(ActionType::Execute),
            other => Err(format!("unknown action type '{}'", other)),
        }
    }
}

/// Atomic capability, looked up by its codename during evaluation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    /// Store-assigned identifier
    pub id: PermissionId,

    /// Unique human-readable name
    pub name: String,

    /// Unique, stable machine identifier
    pub codename: String,

    pub description: String,

    /// Category of resource this permission applies to (e.g. "course")
    pub resource_type: String,

    pub action_type: ActionType,

    pub is_system_permission: bool,

    pub created_at: DateTime<Utc>,
}

impl Permission {
    /// Create a permission; the id is assigned when the store persists it
    pub fn new(codename: impl Into<String>, name: impl Into<String>, resource_type: impl Into<String>, action_type: ActionType) -> Self {
        Self {
            id: 0,
            name: name.into(),
            codename: codename.into(),
            description: String::new(),
            resource_type: resource_type.into(),
            action_type,
            is_system_permission: false,
            created_at: Utc::now(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn system(mut self) -> Self {
        self.is_system_permission = true;
        self
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.codename)
    }
}

/// Derive the conventional codename for an action on a resource type
pub fn scope_codename(action: &str, resource_type: &str) -> String {
    format!("{}_{}", action, resource_type.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_action_type_parsing() {
        assert_eq!("execute".parse::<ActionType>(), Ok(ActionType::Execute));
        assert_eq!("READ".parse::<ActionType>(), Ok(ActionType::Read));
        assert!("grade".parse::<ActionType>().is_err());
    }

    #[test]
    fn test_action_type_serde() {
        let json = serde_json::to_string(&ActionType::Update).unwrap();
        assert_eq!(json, "\"UPDATE\"");
    }

    #[test]
    fn test_scope_codename() {
        assert_eq!(scope_codename("read", "Course"), "read_course");
        assert_eq!(scope_codename("delete", "COURSE_OFFERING"), "delete_course_offering");
    }

    #[test]
    fn test_permission_display() {
        let permission = Permission::new("can_grade_assignments", "Grade Assignments", "assignment", ActionType::Execute).system();
        assert!(permission.is_system_permission);
        assert_eq!(permission.to_string(), "Grade Assignments (can_grade_assignments)");
    }
}
