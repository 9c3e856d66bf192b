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

//! LMS role-based access control
//!
//! Decides whether an authenticated user may perform an operation on a
//! resource of the learning management system, and records every decision.

pub mod auth;
pub mod config;
pub mod error;
pub mod rbac;
pub mod resources;

pub use auth::{Identity, User, UserId};
pub use config::RbacConfig;
pub use error::{RbacError, RbacResult};
