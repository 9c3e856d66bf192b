use anyhow::{Context, Result};
use lms_rbac::RbacConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const POLICY_FILE: &str = "policy.json";
const AUDIT_FILE: &str = "audit.json";
const USERS_FILE: &str = "users.json";

const CONFIG_ENV: &str = "LMS_RBAC_CONFIG";
const DATA_DIR_ENV: &str = "LMS_RBAC_DATA_DIR";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RbacCliConfig {
    pub data_dir: PathBuf,

    /// Separate `RbacConfig` TOML file; replaces the inline `[rbac]` table when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rbac_config_file: Option<PathBuf>,

    #[serde(default)]
    pub rbac: RbacConfig,
}

impl Default for RbacCliConfig {
    fn default() -> Self {
        Self {
            data_dir: dirs::data_local_dir().unwrap_or_else(|| PathBuf::from(".")).join("lms-rbac"),
            rbac_config_file: None,
            rbac: RbacConfig::from_env(),
        }
    }
}

impl RbacCliConfig {
    /// Load a CLI config, pulling in the engine config file it names
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).with_context(|| format!("reading config {}", path.display()))?;
        let mut config: Self = toml::from_str(&content).with_context(|| format!("parsing config {}", path.display()))?;

        if let Some(rbac_path) = &config.rbac_config_file {
            config.rbac = RbacConfig::load_from_file(rbac_path).with_context(|| format!("loading RBAC config {}", rbac_path.display()))?;
        }
        Ok(config)
    }

    pub fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        std::fs::write(path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    /// `--config`, then `$LMS_RBAC_CONFIG`, then defaults; the data dir comes from
    /// `--data-dir`, then `$LMS_RBAC_DATA_DIR`, then the config
    pub fn resolve_config(cli_config: Option<PathBuf>, cli_data_dir: Option<PathBuf>) -> Result<Self> {
        let config_path = cli_config.or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from));
        let mut config = match config_path {
            Some(path) => Self::load_from_file(path)?,
            None => Self::default(),
        };

        if let Some(data_dir) = cli_data_dir.or_else(|| std::env::var_os(DATA_DIR_ENV).map(PathBuf::from)) {
            config.data_dir = data_dir;
        }

        std::fs::create_dir_all(&config.data_dir).with_context(|| format!("creating data dir {}", config.data_dir.display()))?;
        Ok(config)
    }

    pub fn policy_path(&self) -> PathBuf {
        self.data_dir.join(POLICY_FILE)
    }

    pub fn audit_path(&self) -> PathBuf {
        self.data_dir.join(AUDIT_FILE)
    }

    pub fn users_path(&self) -> PathBuf {
        self.data_dir.join(USERS_FILE)
    }
}
