//! Persistent configuration under `~/.telegram-terminal/`
//!
//! The config file carries the bot credential, the user whitelist and the
//! web UI password hash. Written atomically with owner-only permissions.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const CONFIG_DIR_NAME: &str = ".telegram-terminal";
const CONFIG_FILE_NAME: &str = "config.json";

/// Environment override for the config directory (used by tests and by
/// operators who want state somewhere other than $HOME).
pub const CONFIG_DIR_ENV: &str = "REMOTE_TERM_CONFIG_DIR";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub bot_token: String,
    #[serde(default)]
    pub allowed_users: Vec<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webui_password_hash: Option<String>,
}

/// Path of the configuration directory, created on first use (mode 0700).
pub fn config_dir() -> PathBuf {
    let dir = match std::env::var_os(CONFIG_DIR_ENV) {
        Some(d) => PathBuf::from(d),
        None => dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(CONFIG_DIR_NAME),
    };
    if !dir.exists() {
        let _ = std::fs::create_dir_all(&dir);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = std::fs::set_permissions(&dir, std::fs::Permissions::from_mode(0o700));
        }
    }
    dir
}

pub fn config_path() -> PathBuf {
    config_dir().join(CONFIG_FILE_NAME)
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_from(&config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let data = std::fs::read(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        let config = serde_json::from_slice(&data)
            .with_context(|| format!("invalid config JSON: {}", path.display()))?;
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&config_path())
    }

    /// Atomic write: serialize to a sibling temp file, restrict permissions,
    /// then rename over the target so readers never see a partial file.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let data = serde_json::to_vec(self)?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &data)
            .with_context(|| format!("failed to write config: {}", tmp.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))?;
        }
        std::fs::rename(&tmp, path)
            .with_context(|| format!("failed to install config: {}", path.display()))?;
        Ok(())
    }
}
