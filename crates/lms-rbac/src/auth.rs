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

//! Request identities
//!
//! Authentication itself happens upstream; the enforcement layer only reads
//! the [`Identity`] an authentication layer placed in the request extensions.

use serde::{Deserialize, Serialize};

/// User identifier
pub type UserId = u64;

/// Authenticated user as seen by the RBAC engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,

    pub username: String,

    /// Base role recorded on the user's profile (e.g. "STUDENT")
    #[serde(default)]
    pub profile_role: Option<String>,
}

impl User {
    pub fn new(id: UserId, username: impl Into<String>) -> Self {
        Self {
            id,
            username: username.into(),
            profile_role: None,
        }
    }

    pub fn with_profile_role(mut self, role: impl Into<String>) -> Self {
        self.profile_role = Some(role.into());
        self
    }
}

/// Identity attached to an inbound request
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    #[default]
    Anonymous,
    Authenticated(User),
}

impl Identity {
    /// The authenticated user, if any
    pub fn user(&self) -> Option<&User> {
        match self {
            Identity::Anonymous => None,
            Identity::Authenticated(user) => Some(user),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Identity::Authenticated(_))
    }
}

impl From<User> for Identity {
    fn from(user: User) -> Self {
        Identity::Authenticated(user)
    }
}
