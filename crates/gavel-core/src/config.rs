// Configuration loading and parsing (gavel.toml, credentials.toml).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::session::{DEFAULT_ID_LENGTH, MAX_ID_LENGTH, MIN_ID_LENGTH};

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    FileNotFound { path: PathBuf },

    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("validation error for field `{field}`: {message}")]
    ValidationError { field: String, message: String },

    #[error("failed to initialize config from defaults: {message}")]
    DefaultsCopyError { message: String },
}

// ---------------------------------------------------------------------------
// Assembled Config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Config {
    pub remote: RemoteConfig,
    /// Resolved path of the local SQLite store.
    pub db_path: PathBuf,
    pub session: SessionConfig,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteConfig {
    /// Root URL of the realtime database, e.g. `https://example.firebaseio.com`.
    pub base_url: String,
    /// Path segment under which auction documents live.
    pub collection: String,
    pub auth_token: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_id_length")]
    pub id_length: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            id_length: DEFAULT_ID_LENGTH,
        }
    }
}

// ---------------------------------------------------------------------------
// File structs
// ---------------------------------------------------------------------------

const CONFIG_FILE: &str = "gavel.toml";
const CREDENTIALS_FILE: &str = "credentials.toml";

/// Raw deserialization target for gavel.toml.
#[derive(Debug, Clone, Deserialize)]
struct GavelFile {
    remote: RemoteSection,
    #[serde(default)]
    database: DatabaseSection,
    #[serde(default)]
    session: SessionConfig,
}

#[derive(Debug, Clone, Deserialize)]
struct RemoteSection {
    base_url: String,
    #[serde(default = "default_collection")]
    collection: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct DatabaseSection {
    /// Empty means the platform data directory.
    #[serde(default)]
    path: String,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct CredentialsFile {
    remote_auth_token: Option<String>,
}

fn default_collection() -> String {
    "auctions".to_string()
}

fn default_id_length() -> usize {
    DEFAULT_ID_LENGTH
}

// ---------------------------------------------------------------------------
// Loading logic
// ---------------------------------------------------------------------------

/// Environment variable overriding `remote.base_url`.
pub const ENV_REMOTE_URL: &str = "GAVEL_REMOTE_URL";
/// Environment variable overriding the remote auth token.
pub const ENV_REMOTE_TOKEN: &str = "GAVEL_REMOTE_TOKEN";

/// Load and validate configuration from `config/gavel.toml` and (optionally)
/// `config/credentials.toml`, both relative to `base_dir`. Environment
/// overrides are read through `env`.
pub fn load_config_from(
    base_dir: &Path,
    env: impl Fn(&str) -> Option<String>,
) -> Result<Config, ConfigError> {
    let config_dir = base_dir.join("config");

    // --- gavel.toml (required) ---
    let gavel_path = config_dir.join(CONFIG_FILE);
    let gavel_text = read_file(&gavel_path)?;
    let file: GavelFile = toml::from_str(&gavel_text).map_err(|e| ConfigError::ParseError {
        path: gavel_path.clone(),
        source: e,
    })?;

    // --- credentials.toml (optional) ---
    let credentials_path = config_dir.join(CREDENTIALS_FILE);
    let credentials: CredentialsFile = if credentials_path.exists() {
        let cred_text = read_file(&credentials_path)?;
        toml::from_str(&cred_text).map_err(|e| ConfigError::ParseError {
            path: credentials_path.clone(),
            source: e,
        })?
    } else {
        CredentialsFile::default()
    };

    let base_url = env(ENV_REMOTE_URL).unwrap_or(file.remote.base_url);
    let auth_token = env(ENV_REMOTE_TOKEN)
        .or(credentials.remote_auth_token)
        .filter(|t| !t.trim().is_empty());

    let config = Config {
        remote: RemoteConfig {
            base_url,
            collection: file.remote.collection,
            auth_token,
        },
        db_path: resolve_db_path(base_dir, &file.database.path),
        session: file.session,
    };

    validate(&config)?;

    Ok(config)
}

/// Files seeded into `config/` from `defaults/`. Credentials are never
/// seeded; `defaults/credentials.toml.example` is documentation only.
const SEEDED_FILES: &[&str] = &[CONFIG_FILE];

/// Copy each seeded file that `config/` lacks from `defaults/`. Existing
/// files are left alone. Returns the paths that were written.
pub fn ensure_config_files(base_dir: &Path) -> Result<Vec<PathBuf>, ConfigError> {
    let config_dir = base_dir.join("config");
    let mut copied = Vec::new();

    for name in SEEDED_FILES {
        let target = config_dir.join(name);
        if target.exists() {
            continue;
        }
        let template = base_dir.join("defaults").join(name);
        if !template.is_file() {
            return Err(ConfigError::DefaultsCopyError {
                message: format!(
                    "{} is missing and no template exists at {}",
                    target.display(),
                    template.display()
                ),
            });
        }

        std::fs::create_dir_all(&config_dir).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to create {}: {e}", config_dir.display()),
        })?;
        std::fs::copy(&template, &target).map_err(|e| ConfigError::DefaultsCopyError {
            message: format!("failed to seed {}: {e}", target.display()),
        })?;
        copied.push(target);
    }

    Ok(copied)
}

/// Convenience wrapper: loads config relative to the current working
/// directory with process environment overrides. Seeds missing files from
/// `defaults/` first.
pub fn load_config() -> Result<Config, ConfigError> {
    let cwd = std::env::current_dir().map_err(|_| ConfigError::FileNotFound {
        path: PathBuf::from("."),
    })?;
    ensure_config_files(&cwd)?;
    load_config_from(&cwd, |key| std::env::var(key).ok())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|_| ConfigError::FileNotFound {
        path: path.to_path_buf(),
    })
}

/// Relative paths are taken from `base_dir`; an empty path falls back to the
/// platform data directory.
fn resolve_db_path(base_dir: &Path, configured: &str) -> PathBuf {
    let configured = configured.trim();
    if !configured.is_empty() {
        let path = PathBuf::from(configured);
        return if path.is_absolute() {
            path
        } else {
            base_dir.join(path)
        };
    }

    match directories::ProjectDirs::from("org", "gavel", "gavel") {
        Some(dirs) => dirs.data_dir().join("gavel.db"),
        None => base_dir.join("gavel.db"),
    }
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate(config: &Config) -> Result<(), ConfigError> {
    let url = config.remote.base_url.trim();
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        return Err(ConfigError::ValidationError {
            field: "remote.base_url".into(),
            message: format!("must be an http(s) URL, got `{url}`"),
        });
    }

    if config.remote.collection.trim_matches('/').is_empty() {
        return Err(ConfigError::ValidationError {
            field: "remote.collection".into(),
            message: "must not be empty".into(),
        });
    }

    let len = config.session.id_length;
    if !(MIN_ID_LENGTH..=MAX_ID_LENGTH).contains(&len) {
        return Err(ConfigError::ValidationError {
            field: "session.id_length".into(),
            message: format!(
                "must be between {MIN_ID_LENGTH} and {MAX_ID_LENGTH} inclusive, got {len}"
            ),
        });
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
