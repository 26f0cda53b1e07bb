//! `prompt-canvas.toml` loading.
//!
//! Search order: an explicit path, `./prompt-canvas.toml`,
//! `./.prompt-canvas/config.toml`, then the per-user config directory.
//! No file means defaults; a file that does not parse is an error.

use crate::error::{CanvasError, CanvasResult};
use crate::megadraft::{ComposeOptions, HeaderStyle};
use crate::store::DEFAULT_MAX_BACKUPS;
use crate::variables::StaticContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const APP_DIR: &str = "prompt-canvas";
pub const CONFIG_FILE: &str = "prompt-canvas.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CanvasConfig {
    pub user: UserConfig,
    pub storage: StorageConfig,
    pub compose: ComposeConfig,
    pub log: LogConfig,
}

/// Backs the `user.*` smart variables.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserConfig {
    pub name: Option<String>,
    pub email: Option<String>,
    pub company: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: Option<PathBuf>,
    pub max_backups: usize,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            max_backups: DEFAULT_MAX_BACKUPS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ComposeConfig {
    pub include_headers: bool,
    pub header_style: HeaderStyle,
}

impl Default for ComposeConfig {
    fn default() -> Self {
        Self {
            include_headers: true,
            header_style: HeaderStyle::Markdown,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub filter: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

impl CanvasConfig {
    pub fn from_toml(content: &str) -> CanvasResult<Self> {
        toml::from_str(content).map_err(|e| CanvasError::config(e.to_string()))
    }

    /// Configured data directory, else `<data_dir>/prompt-canvas`.
    pub fn data_dir(&self) -> PathBuf {
        self.storage.data_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
        })
    }

    pub fn compose_options(&self) -> ComposeOptions {
        ComposeOptions {
            include_headers: self.compose.include_headers,
            header_style: self.compose.header_style,
        }
    }

    pub fn user_context(&self) -> StaticContext {
        StaticContext {
            user_name: self.user.name.clone(),
            user_email: self.user.email.clone(),
            user_company: self.user.company.clone(),
            ..Default::default()
        }
    }
}

/// Candidate files in lookup order.
pub fn search_paths(explicit: Option<&Path>, workdir: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(path) = explicit {
        paths.push(path.to_path_buf());
    }
    paths.push(workdir.join(CONFIG_FILE));
    paths.push(workdir.join(".prompt-canvas").join("config.toml"));
    if let Some(dir) = dirs::config_dir() {
        paths.push(dir.join(APP_DIR).join("config.toml"));
    }
    paths
}

/// Load the first config file found. Returns the path it came from, if any.
pub fn load_config(
    explicit: Option<&Path>,
    workdir: &Path,
) -> CanvasResult<(CanvasConfig, Option<PathBuf>)> {
    if let Some(path) = explicit {
        if !path.exists() {
            return Err(CanvasError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
    }

    for path in search_paths(explicit, workdir) {
        if !path.exists() {
            continue;
        }
        let content = std::fs::read_to_string(&path).map_err(|e| {
            CanvasError::config(format!("Failed to read {}: {}", path.display(), e))
        })?;
        let config: CanvasConfig = toml::from_str(&content).map_err(|e| {
            CanvasError::config(format!("Failed to parse {}: {}", path.display(), e))
        })?;
        tracing::info!("Loaded config from {}", path.display());
        return Ok((config, Some(path)));
    }

    tracing::debug!("No config file found, using defaults");
    Ok((CanvasConfig::default(), None))
}
