use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

use crate::error::{Result, SatchelError};

/// Name of the repository marker / config file.
pub const CONFIG_FILE: &str = ".satchel";

/// Default bucket when no branch has been checked out.
pub const DEFAULT_BRANCH: &str = "main";

/// Repository configuration stored in `.satchel`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Remote host connection string.
    pub conn_string: String,

    /// Path to the hex-encoded 32-byte AEAD key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_file: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branches: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_branch: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub db: Option<String>,

    /// Directory the config was loaded from.
    #[serde(skip)]
    pub dir: PathBuf,
}

impl Config {
    /// The bucket the current branch maps to.
    pub fn bucket(&self) -> &str {
        self.current_branch.as_deref().unwrap_or(DEFAULT_BRANCH)
    }

    /// Load the AEAD key referenced by `keyFile`, if configured.
    pub fn load_key(&self) -> Result<Option<Zeroizing<[u8; 32]>>> {
        let Some(key_file) = &self.key_file else {
            return Ok(None);
        };
        let path = self.dir.join(key_file);
        let text = fs::read_to_string(&path)
            .map_err(|e| SatchelError::Config(format!("failed to read key file {path:?}: {e}")))?;
        let raw = Zeroizing::new(hex::decode(text.trim()).map_err(|_| {
            SatchelError::Config(format!("key file {path:?} is not valid hex"))
        })?);
        let key: [u8; 32] = raw.as_slice().try_into().map_err(|_| {
            SatchelError::Config(format!("key file {path:?} must hold a 32-byte key"))
        })?;
        Ok(Some(Zeroizing::new(key)))
    }
}

/// Whether `path` is a satchel repository (contains a `.satchel` config).
pub fn is_repository(path: &Path) -> bool {
    path.join(CONFIG_FILE).is_file()
}

/// Load the configuration from a repository directory.
pub fn load(path: &Path) -> Result<Config> {
    let config_path = path.join(CONFIG_FILE);
    let raw = match fs::read_to_string(&config_path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(SatchelError::ConfigAbsent(path.display().to_string()))
        }
        Err(e) => return Err(e.into()),
    };

    let mut config: Config = serde_yaml::from_str(&raw)
        .map_err(|e| SatchelError::Config(format!("failed to parse {config_path:?}: {e}")))?;
    config.dir = path.to_path_buf();
    Ok(config)
}

/// Write the configuration back to its repository directory.
pub fn store(config: &Config) -> Result<()> {
    let raw = serde_yaml::to_string(config)
        .map_err(|e| SatchelError::Config(format!("failed to serialize config: {e}")))?;
    fs::write(config.dir.join(CONFIG_FILE), raw)?;
    Ok(())
}
