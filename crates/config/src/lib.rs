//! Layered configuration for tabula.
//!
//! Sources, lowest precedence first:
//!
//! 1. compiled defaults ([`Config::default`]),
//! 2. a configuration file: either the explicit path given to [`load`], or
//!    `config.{toml,yaml,yml,json}` in the platform configuration directory,
//! 3. environment variables prefixed `TABULA_`, with `__` separating
//!    sections from keys (`TABULA_API__BASE_URL`, `TABULA_AUTH__TOKEN`).

pub mod error;

use crate::error::{ErrorKind, Result};
use directories::ProjectDirs;
use exn::ResultExt;
use figment::Figment;
use figment::providers::{Env, Format, Json, Serialized, Toml, Yaml};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "TABULA_";
const CONFIG_FILES: [&str; 4] = ["config.toml", "config.yaml", "config.yml", "config.json"];

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api: ApiConfig,
    pub auth: AuthConfig,
    pub upload: UploadConfig,
    pub table: TableConfig,
}

/// Where the dataset service lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}
impl Default for ApiConfig {
    fn default() -> Self {
        Self { base_url: "http://localhost:8000".to_string(), timeout_secs: 60 }
    }
}
impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Bearer token. Without one, nothing is fetched automatically.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}
impl Debug for AuthConfig {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("AuthConfig").field("token", &self.token.as_ref().map(|_| "<redacted>")).finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Most files accepted in a single drop.
    pub max_files: usize,
    /// Largest accepted file, in bytes.
    pub max_file_size: u64,
    /// Extensions accepted for upload; case and a leading dot are ignored.
    pub allowed_extensions: Vec<String>,
}
impl Default for UploadConfig {
    fn default() -> Self {
        Self { max_files: 10, max_file_size: 50 * 1024 * 1024, allowed_extensions: vec!["csv".to_string()] }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableConfig {
    pub page_size: usize,
}
impl Default for TableConfig {
    fn default() -> Self {
        Self { page_size: 10 }
    }
}

impl Config {
    fn normalize(mut self) -> Self {
        self.api.base_url = self.api.base_url.trim_end_matches('/').to_string();
        self.auth.token = self.auth.token.filter(|token| !token.trim().is_empty());
        self.upload.allowed_extensions = self
            .upload
            .allowed_extensions
            .iter()
            .map(|ext| ext.trim().trim_start_matches('.').to_lowercase())
            .filter(|ext| !ext.is_empty())
            .collect();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.api.base_url.is_empty() {
            exn::bail!(ErrorKind::Invalid("api.base_url"));
        }
        if self.api.timeout_secs == 0 {
            exn::bail!(ErrorKind::Invalid("api.timeout_secs"));
        }
        if self.upload.max_files == 0 {
            exn::bail!(ErrorKind::Invalid("upload.max_files"));
        }
        if self.upload.max_file_size == 0 {
            exn::bail!(ErrorKind::Invalid("upload.max_file_size"));
        }
        if self.upload.allowed_extensions.is_empty() {
            exn::bail!(ErrorKind::Invalid("upload.allowed_extensions"));
        }
        if self.table.page_size == 0 {
            exn::bail!(ErrorKind::Invalid("table.page_size"));
        }
        Ok(())
    }
}

/// The platform configuration directory, e.g. `~/.config/tabula` on Linux.
pub fn config_dir() -> Option<PathBuf> {
    ProjectDirs::from("", "", "tabula").map(|dirs| dirs.config_dir().to_path_buf())
}

fn file_provider(figment: Figment, path: &Path) -> Result<Figment> {
    let extension = path.extension().and_then(|ext| ext.to_str()).map(str::to_lowercase);
    Ok(match extension.as_deref() {
        Some("toml") => figment.merge(Toml::file(path)),
        Some("yaml" | "yml") => figment.merge(Yaml::file(path)),
        Some("json") => figment.merge(Json::file(path)),
        _ => exn::bail!(ErrorKind::UnsupportedFormat(path.to_path_buf())),
    })
}

/// The unextracted layer stack, for callers that want to add their own layers.
pub fn figment(path: Option<&Path>) -> Result<Figment> {
    let mut figment = Figment::from(Serialized::defaults(Config::default()));
    match path {
        Some(path) => {
            if !path.is_file() {
                exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
            }
            figment = file_provider(figment, path)?;
        },
        None => {
            if let Some(dir) = config_dir() {
                for name in CONFIG_FILES {
                    let candidate = dir.join(name);
                    if candidate.is_file() {
                        tracing::debug!(path = %candidate.display(), "Using configuration file");
                        figment = file_provider(figment, &candidate)?;
                    }
                }
            }
        },
    }
    Ok(figment.merge(Env::prefixed(ENV_PREFIX).split("__")))
}

/// Load, normalize and validate the configuration.
pub fn load(path: Option<&Path>) -> Result<Config> {
    extract(figment(path)?)
}

fn extract(figment: Figment) -> Result<Config> {
    let config = figment.extract::<Config>().or_raise(|| ErrorKind::Load)?.normalize();
    config.validate()?;
    Ok(config)
}
