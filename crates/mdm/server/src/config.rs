use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use mdm_service::CertAuthOptions;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "MDM_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "mdm.toml";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("config file not found at {0}")]
    NotFound(PathBuf),
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub listen: SocketAddr,
    /// Default tracing filter; `RUST_LOG` takes precedence.
    pub log_filter: String,
    pub storage: StorageConfig,
    pub certauth: CertAuthConfig,
    pub user_authenticate: UserAuthenticateConfig,
    pub push: PushConfig,
    /// CA bundle device identity certificates must chain to.
    pub ca_pem: Option<PathBuf>,
    /// Static GetToken table: service type to token.
    pub get_token: HashMap<String, String>,
    /// Values for `$MDM_SECRET_<NAME>` placeholders in commands.
    pub secrets: HashMap<String, String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    #[default]
    Sqlite,
    File,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: Backend,
    /// SQLite database path or file storage directory.
    pub path: String,
    /// Read replica database path (SQLite only).
    pub replica: Option<String>,
    /// Batch last-seen writes (SQLite only).
    pub last_seen: Option<LastSeenConfig>,
    /// Backends every write is mirrored to.
    #[serde(rename = "mirror")]
    pub mirrors: Vec<MirrorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MirrorConfig {
    pub backend: Backend,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct LastSeenConfig {
    pub interval_secs: u64,
    pub capacity: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CertAuthConfig {
    pub enabled: bool,
    #[serde(flatten)]
    pub options: CertAuthOptions,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserAuthenticateConfig {
    pub empty_digest_challenge: bool,
    pub store_rejected: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PushConfig {
    /// Use the APNs development environment.
    pub sandbox: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 9000)),
            log_filter: "info".to_string(),
            storage: StorageConfig::default(),
            certauth: CertAuthConfig::default(),
            user_authenticate: UserAuthenticateConfig::default(),
            push: PushConfig::default(),
            ca_pem: None,
            get_token: HashMap::new(),
            secrets: HashMap::new(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: Backend::Sqlite,
            path: "mdm.db".to_string(),
            replica: None,
            last_seen: None,
            mirrors: Vec::new(),
        }
    }
}

impl Default for LastSeenConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30,
            capacity: 1000,
        }
    }
}

impl LastSeenConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

impl Default for CertAuthConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            options: CertAuthOptions::default(),
        }
    }
}

impl Config {
    /// Load from `$MDM_CONFIG`, or `mdm.toml` if unset.
    ///
    /// A missing default file yields the default configuration; a missing
    /// explicitly named file is an error.
    pub fn load() -> Result<Self, ConfigError> {
        match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::load_from(Path::new(&path)),
            None => {
                let path = Path::new(DEFAULT_CONFIG_PATH);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// GetToken table as raw token bytes.
    pub fn get_tokens(&self) -> HashMap<String, Vec<u8>> {
        self.get_token
            .iter()
            .map(|(service, token)| (service.clone(), token.clone().into_bytes()))
            .collect()
    }
}
