use super::Config;
use crate::error::{Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// File looked up in the working directory when no config path is given.
pub const DEFAULT_CONFIG_FILE: &str = "civic311.toml";

pub struct ConfigLoader {
    path: Option<PathBuf>,
    use_env: bool,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            path: None,
            use_env: true,
        }
    }

    /// Read configuration from an explicit file; a missing file is an error.
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Skip `CIVIC311_*` environment overrides.
    pub fn without_env(mut self) -> Self {
        self.use_env = false;
        self
    }

    pub async fn load(&self) -> Result<Config> {
        let mut config = match &self.path {
            Some(path) => Self::read_file(path).await?,
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::read_file(default_path).await?
                } else {
                    debug!("No {DEFAULT_CONFIG_FILE} found, using built-in defaults");
                    Config::new()
                }
            }
        };

        if self.use_env {
            config.merge_env_vars();
        }

        config.validate()?;
        Ok(config)
    }

    async fn read_file(path: &Path) -> Result<Config> {
        let content = fs::read_to_string(path).await.map_err(|e| {
            Error::Config(format!("failed to read config {}: {e}", path.display()))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
