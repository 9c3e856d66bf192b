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

//! Role-Based Access Control (RBAC) engine
//!
//! This module provides:
//! - Hierarchical roles with single-parent inheritance
//! - Scoped, time-bounded role assignments
//! - Contextual, expiring permission grants
//! - Fail-closed permission evaluation with audit logging
//! - Tower layers for request enforcement

pub mod assignments;
pub mod audit;
pub mod catalog;
pub mod enforcement;
pub mod evaluator;
pub mod middleware;
pub mod permissions;
pub mod roles;
pub mod scope;
pub mod store;

pub use assignments::*;
pub use audit::*;
pub use catalog::*;
pub use enforcement::*;
pub use evaluator::*;
pub use middleware::*;
pub use permissions::*;
pub use roles::*;
pub use scope::*;
pub use store::*;
