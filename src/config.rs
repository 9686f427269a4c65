use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, TechNotesError};
use crate::service::{MAX_COST, MIN_COST};
use crate::storage::{Backend, DATA_DIR};

pub const CONFIG_FILE: &str = "config.yaml";
pub const DEFAULT_PORT: u16 = 3500;

fn default_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "https://www.dandrepairshop.com".to_string(),
        "https://dandrepairshop.com".to_string(),
    ]
}

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_cost() -> u32 {
    crate::service::DEFAULT_COST
}

/// Project configuration stored in `.technotes/config.yaml`.
///
/// Missing keys take their defaults, so a partial file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub backend: Backend,
    /// Origins allowed to make credentialed cross-origin requests
    #[serde(default = "default_origins")]
    pub allowed_origins: Vec<String>,
    #[serde(default = "default_cost")]
    pub bcrypt_cost: u32,
    /// Directory for `technotes.log`; stdout only when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            backend: Backend::default(),
            allowed_origins: default_origins(),
            bcrypt_cost: default_cost(),
            log_dir: None,
        }
    }
}

impl Config {
    pub fn path(root: &Path) -> PathBuf {
        root.join(DATA_DIR).join(CONFIG_FILE)
    }

    /// Load the project config, falling back to defaults if the file is absent
    pub fn load(root: &Path) -> Result<Self> {
        let path = Self::path(root);
        if !path.exists() {
            return Ok(Self::default());
        }

        let text = fs::read_to_string(&path)?;
        let config: Config = serde_yaml::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, root: &Path) -> Result<()> {
        let text = serde_yaml::to_string(self)?;
        fs::write(Self::path(root), text)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(TechNotesError::Config("port must not be 0".to_string()));
        }
        if !(MIN_COST..=MAX_COST).contains(&self.bcrypt_cost) {
            return Err(TechNotesError::Config(format!(
                "bcrypt_cost must be between {} and {}",
                MIN_COST, MAX_COST
            )));
        }
        if let Some(origin) = self.allowed_origins.iter().find(|o| o.trim().is_empty()) {
            return Err(TechNotesError::Config(format!(
                "invalid allowed origin '{}'",
                origin
            )));
        }
        Ok(())
    }
}
