use anyhow::{Result, bail};
use lms_rbac::{User, UserId};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::path::Path;

/// Users known to the CLI, keyed by id
#[derive(Debug, Default)]
pub struct UserRegistry {
    users: RwLock<BTreeMap<UserId, User>>,
}

impl UserRegistry {
    /// Load the registry, starting empty when the file does not exist yet
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let users: Vec<User> = serde_json::from_str(&content)?;
        Ok(Self {
            users: RwLock::new(users.into_iter().map(|u| (u.id, u)).collect()),
        })
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let content = serde_json::to_string_pretty(&self.list())?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn add(&self, user: User) -> Result<()> {
        let mut users = self.users.write();
        if users.contains_key(&user.id) {
            bail!("User {} already registered", user.id);
        }
        if users.values().any(|u| u.username == user.username) {
            bail!("Username '{}' already registered", user.username);
        }
        users.insert(user.id, user);
        Ok(())
    }

    /// Look a user up by numeric id or by username
    pub fn find(&self, key: &str) -> Option<User> {
        let users = self.users.read();
        if let Ok(id) = key.parse::<UserId>() {
            if let Some(user) = users.get(&id) {
                return Some(user.clone());
            }
        }
        users.values().find(|u| u.username == key).cloned()
    }

    pub fn list(&self) -> Vec<User> {
        self.users.read().values().cloned().collect()
    }
}
