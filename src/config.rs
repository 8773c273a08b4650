//! TOML configuration.
//!
//! ```toml
//! [server]
//! bind = "127.0.0.1:8080"
//!
//! [directory]
//! path = "./data/directory.sqlite"
//!
//! [storage]
//! backend = "local"          # or "remote"
//! timeout_secs = 30
//!
//! [storage.local]
//! root = "./data/loggers"
//!
//! [storage.remote]
//! folder_id = "1AbC..."
//! credentials_file = "./credentials.json"
//! # access_token_env = "DRIVE_ACCESS_TOKEN"
//!
//! [session]
//! secret_env = "LGX_SESSION_SECRET"
//! operator_user = "admin"
//! operator_password_env = "LGX_OPERATOR_PASSWORD"
//! ```
//!
//! Secrets never live in the file itself; the file names the environment
//! variables that hold them.

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub directory: DirectoryConfig,
    pub storage: StorageConfig,
    #[serde(default)]
    pub table: TableConfig,
    #[serde(default)]
    pub policy: PolicyConfig,
    #[serde(default)]
    pub session: Option<SessionConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DirectoryConfig {
    /// SQLite catalog holding the `devices` table.
    pub path: PathBuf,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Remote,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: BackendKind,
    /// Upper bound on resolve + load for a single request.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub local: Option<LocalStorageConfig>,
    #[serde(default)]
    pub remote: Option<RemoteStorageConfig>,
}

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Deserialize, Clone)]
pub struct LocalStorageConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub follow_symlinks: bool,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RemoteStorageConfig {
    pub folder_id: String,
    /// Service-account JSON key file.
    #[serde(default)]
    pub credentials_file: Option<PathBuf>,
    /// Environment variable holding a ready bearer token.
    #[serde(default)]
    pub access_token_env: Option<String>,
    #[serde(default = "default_api_base")]
    pub api_base: String,
}

fn default_api_base() -> String {
    "https://www.googleapis.com".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct TableConfig {
    #[serde(default = "default_timestamp_column")]
    pub timestamp_column: String,
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
}

impl Default for TableConfig {
    fn default() -> Self {
        Self {
            timestamp_column: default_timestamp_column(),
            timestamp_format: default_timestamp_format(),
        }
    }
}

fn default_timestamp_column() -> String {
    "date_time".to_string()
}
fn default_timestamp_format() -> String {
    "%d/%m/%y %H:%M".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct PolicyConfig {
    #[serde(default = "default_preview_recent_days")]
    pub preview_recent_days: usize,
    #[serde(default = "default_document_max_rows")]
    pub document_max_rows: usize,
    #[serde(default = "default_document_max_cell_chars")]
    pub document_max_cell_chars: usize,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            preview_recent_days: default_preview_recent_days(),
            document_max_rows: default_document_max_rows(),
            document_max_cell_chars: default_document_max_cell_chars(),
        }
    }
}

fn default_preview_recent_days() -> usize {
    4
}
fn default_document_max_rows() -> usize {
    40
}
fn default_document_max_cell_chars() -> usize {
    15
}

#[derive(Debug, Deserialize, Clone)]
pub struct SessionConfig {
    pub secret_env: String,
    #[serde(default = "default_lifetime_minutes")]
    pub lifetime_minutes: i64,
    pub operator_user: String,
    pub operator_password_env: String,
}

fn default_lifetime_minutes() -> i64 {
    30
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    let config: Config = toml::from_str(&content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    match config.storage.backend {
        BackendKind::Local => {
            if config.storage.local.is_none() {
                bail!("storage.backend is 'local' but [storage.local] is missing");
            }
        }
        BackendKind::Remote => {
            let Some(remote) = &config.storage.remote else {
                bail!("storage.backend is 'remote' but [storage.remote] is missing");
            };
            if remote.folder_id.trim().is_empty() {
                bail!("storage.remote.folder_id must not be empty");
            }
            if remote.folder_id.contains('\'') || remote.folder_id.contains('\\') {
                bail!("storage.remote.folder_id contains quote characters");
            }
            match (&remote.credentials_file, &remote.access_token_env) {
                (None, None) => bail!(
                    "storage.remote needs either credentials_file or access_token_env"
                ),
                (Some(_), Some(_)) => bail!(
                    "storage.remote.credentials_file and access_token_env are mutually exclusive"
                ),
                _ => {}
            }
        }
    }

    if config.storage.timeout_secs == 0 {
        bail!("storage.timeout_secs must be > 0");
    }

    if config.policy.preview_recent_days == 0 {
        bail!("policy.preview_recent_days must be >= 1");
    }
    if config.policy.document_max_rows == 0 {
        bail!("policy.document_max_rows must be >= 1");
    }
    // Room for at least one character before the "..." marker.
    if config.policy.document_max_cell_chars < 4 {
        bail!("policy.document_max_cell_chars must be >= 4");
    }

    if config.table.timestamp_column.trim().is_empty() {
        bail!("table.timestamp_column must not be empty");
    }

    if let Some(session) = &config.session {
        if session.lifetime_minutes < 1 {
            bail!("session.lifetime_minutes must be >= 1");
        }
        if !crate::session::is_token_safe_user(&session.operator_user) {
            bail!(
                "session.operator_user {:?} must be printable ASCII without spaces, ';', ',', '\"' or '\\'",
                session.operator_user
            );
        }
    }

    Ok(())
}
