use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::orchestration::pool::DEFAULT_MAX_CONCURRENT;
use crate::{Error, Result};

fn default_max_concurrent() -> usize {
    DEFAULT_MAX_CONCURRENT
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrewConfig {
    /// Worker ceiling; 0 selects the default.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    /// Replaces the synthesizer's system instruction.
    pub synthesis_prompt: Option<String>,
    /// Synthesis context used when the caller gives none.
    pub default_context: Option<String>,
}

impl Default for CrewConfig {
    fn default() -> Self {
        Self {
            max_concurrent: DEFAULT_MAX_CONCURRENT,
            synthesis_prompt: None,
            default_context: None,
        }
    }
}

impl CrewConfig {
    pub fn crew_dir() -> Result<PathBuf> {
        Ok(dirs::home_dir().ok_or(Error::NoHomeDir)?.join(".crew"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::crew_dir()?.join("crew.toml"))
    }

    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::crew_dir()?.join("crew.log"))
    }

    pub fn effective_max_concurrent(&self) -> usize {
        if self.max_concurrent == 0 {
            DEFAULT_MAX_CONCURRENT
        } else {
            self.max_concurrent
        }
    }

    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        debug!(path = %path.display(), "loading config");
        if !path.exists() {
            debug!("config file not found, using defaults");
            return Ok(Self::default());
        }
        let config: Self = toml::from_str(&fs::read_to_string(path)?)?;
        debug!(
            max_concurrent = config.max_concurrent,
            synthesis_prompt = config.synthesis_prompt.is_some(),
            "config loaded"
        );
        Ok(config)
    }

    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path()?)
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            if !dir.as_os_str().is_empty() && !dir.exists() {
                debug!(dir = %dir.display(), "creating config directory");
                fs::create_dir_all(dir)?;
            }
        }
        fs::write(path, toml::to_string_pretty(self)?)?;
        debug!(path = %path.display(), "config saved");
        Ok(())
    }
}

/// Expand a leading `~/` to the home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(path)
}
