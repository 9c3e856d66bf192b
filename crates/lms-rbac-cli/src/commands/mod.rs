pub mod assign;
pub mod audit;
pub mod check;
pub mod roles;
pub mod setup;
pub mod users;

use crate::config::RbacCliConfig;
use crate::registry::UserRegistry;
use anyhow::{Result, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use lms_rbac::User;
use lms_rbac::rbac::{AuditLog, InMemoryPolicyStore, PermissionEvaluator, PolicyStore};
use std::sync::Arc;
use tracing::debug;

pub struct CommandContext {
    pub config: RbacCliConfig,
    pub users: UserRegistry,
    pub store: Arc<InMemoryPolicyStore>,
    pub audit: Arc<AuditLog>,
    pub evaluator: PermissionEvaluator,
}

impl CommandContext {
    pub fn new(config: RbacCliConfig) -> Result<Self> {
        let policy_path = config.policy_path();
        let store = if policy_path.exists() {
            InMemoryPolicyStore::load_from_file(&policy_path)?
        } else {
            InMemoryPolicyStore::new()
        };

        let audit_path = config.audit_path();
        let audit = if audit_path.exists() {
            AuditLog::load_from_file(&audit_path)?
        } else {
            AuditLog::new()
        };

        let users = UserRegistry::load(config.users_path())?;
        let role_count = store.roles()?.len();
        debug!(
            data_dir = %config.data_dir.display(),
            roles = role_count,
            audit_entries = audit.len(),
            users = users.list().len(),
            "Loaded RBAC state"
        );

        let store = Arc::new(store);
        let audit = Arc::new(audit);
        let evaluator = PermissionEvaluator::new(store.clone(), audit.clone()).with_config(config.rbac.clone());

        Ok(Self {
            config,
            users,
            store,
            audit,
            evaluator,
        })
    }

    /// Persist policy, audit and user state back to the data directory
    pub fn save(&self) -> Result<()> {
        self.store.save_to_file(self.config.policy_path())?;
        self.audit.save_to_file(self.config.audit_path())?;
        self.users.save(self.config.users_path())?;
        debug!(data_dir = %self.config.data_dir.display(), audit_entries = self.audit.len(), "Saved RBAC state");
        Ok(())
    }

    pub fn resolve_user(&self, key: &str) -> Result<User> {
        self.users.find(key).ok_or_else(|| anyhow!("User '{}' is not registered", key))
    }
}

/// Parse an RFC 3339 timestamp or a plain date taken as midnight UTC
pub fn parse_datetime(value: &str) -> Result<DateTime<Utc>> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc));
    }

    let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|_| anyhow!("Invalid date '{}': expected RFC 3339 or YYYY-MM-DD", value))?;
    date.and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .ok_or_else(|| anyhow!("Invalid date '{}'", value))
}

#[cfg(test)]
pub(crate) fn test_context(dir: &std::path::Path) -> CommandContext {
    let config = RbacCliConfig {
        data_dir: dir.to_path_buf(),
        rbac_config_file: None,
        rbac: lms_rbac::RbacConfig::default(),
    };
    CommandContext::new(config).unwrap()
}
