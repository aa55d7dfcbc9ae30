use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Directory under the project root holding config and state.
pub const NEWSLINE_DIR: &str = ".newsline";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NewslineConfig {
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub conflict: ConflictConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    #[serde(default)]
    pub extra_stop_words: Vec<String>,
    #[serde(default = "default_max_title_tokens")]
    pub max_title_tokens: usize,
    #[serde(default = "default_fallback_token_limit")]
    pub fallback_token_limit: usize,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            extra_stop_words: Vec::new(),
            max_title_tokens: default_max_title_tokens(),
            fallback_token_limit: default_fallback_token_limit(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConflictConfig {
    #[serde(default)]
    pub extra_aggregator_signatures: Vec<String>,
}

/// Durable backing for the first-seen sequence record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    File,
    Sqlite,
    Memory,
}

impl StoreBackend {
    const fn default_file_name(self) -> &'static str {
        match self {
            Self::File | Self::Memory => "sequence.json",
            Self::Sqlite => "sequence.db",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackend,
    #[serde(default)]
    pub path: Option<PathBuf>,
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackend::default(),
            path: None,
            lock_timeout_ms: default_lock_timeout_ms(),
        }
    }
}

impl StoreConfig {
    /// Resolve the state path for `backend` against `project_root`.
    #[must_use]
    pub fn resolved_path(&self, project_root: &Path, backend: StoreBackend) -> PathBuf {
        match &self.path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => project_root.join(path),
            None => project_root
                .join(NEWSLINE_DIR)
                .join(backend.default_file_name()),
        }
    }

    #[must_use]
    pub const fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default)]
    pub max_items: Option<usize>,
    #[serde(default)]
    pub format: Option<String>,
}

/// Path of the project config file under `project_root`.
#[must_use]
pub fn project_config_path(project_root: &Path) -> PathBuf {
    project_root.join(NEWSLINE_DIR).join("config.toml")
}

/// Load `.newsline/config.toml`, falling back to defaults when absent.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(project_root: &Path) -> Result<NewslineConfig> {
    let path = project_config_path(project_root);
    if !path.exists() {
        return Ok(NewslineConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    toml::from_str::<NewslineConfig>(&content)
        .with_context(|| format!("Failed to parse {}", path.display()))
}

const fn default_max_title_tokens() -> usize {
    12
}

const fn default_fallback_token_limit() -> usize {
    8
}

const fn default_lock_timeout_ms() -> u64 {
    5_000
}
