use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{ConfigError, env_optional, parse_bool, parse_u64_value};

pub(crate) const DB_PATH_ENV: &str = "IMESSAGES_DB_PATH";
pub(crate) const CONTACTS_ENV: &str = "IMESSAGE_MCP_CONTACTS";
pub(crate) const HTTP_PORT_ENV: &str = "IMESSAGE_MCP_HTTP_PORT";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ContactsConfig {
    /// `None` means "on for macOS builds".
    pub(crate) enabled: Option<bool>,
    pub(crate) count_timeout_secs: u64,
    pub(crate) probe_timeout_secs: u64,
    pub(crate) query_timeout_secs: u64,
    pub(crate) load_timeout_secs: u64,
    pub(crate) send_timeout_secs: u64,
    /// Records scanned by the name-search fallback.
    pub(crate) fallback_scan: usize,
}

impl Default for ContactsConfig {
    fn default() -> Self {
        Self {
            enabled: None,
            count_timeout_secs: 5,
            probe_timeout_secs: 5,
            query_timeout_secs: 30,
            load_timeout_secs: 60,
            send_timeout_secs: 30,
            fallback_scan: 100,
        }
    }
}

impl ContactsConfig {
    pub(crate) fn count_timeout(&self) -> Duration {
        Duration::from_secs(self.count_timeout_secs)
    }

    pub(crate) fn probe_timeout(&self) -> Duration {
        Duration::from_secs(self.probe_timeout_secs)
    }

    pub(crate) fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub(crate) fn load_timeout(&self) -> Duration {
        Duration::from_secs(self.load_timeout_secs)
    }

    pub(crate) fn send_timeout(&self) -> Duration {
        Duration::from_secs(self.send_timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct HttpConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8008,
        }
    }
}

/// Optional JSON file passed with `--config`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub(crate) struct FileConfig {
    #[serde(default)]
    pub(crate) db_path: Option<PathBuf>,
    #[serde(default)]
    pub(crate) contacts: ContactsConfig,
    #[serde(default)]
    pub(crate) http: HttpConfig,
}

pub(crate) fn load_file_config(path: &Path) -> Result<FileConfig, ConfigError> {
    let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

pub(crate) fn expand_home(raw: &str) -> PathBuf {
    match raw.strip_prefix("~/") {
        Some(rest) => dirs::home_dir().unwrap_or_default().join(rest),
        None if raw == "~" => dirs::home_dir().unwrap_or_default(),
        None => PathBuf::from(raw),
    }
}

pub(crate) fn default_db_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join("Library")
        .join("Messages")
        .join("chat.db")
}

/// Values given on the command line; they win over everything else.
#[derive(Debug, Clone, Default)]
pub(crate) struct ConfigOverrides {
    pub(crate) db: Option<PathBuf>,
    pub(crate) config: Option<PathBuf>,
    pub(crate) contacts: Option<bool>,
}

#[derive(Debug, Clone)]
pub(crate) struct ServerConfig {
    pub(crate) db_path: PathBuf,
    pub(crate) contacts_enabled: bool,
    pub(crate) contacts: ContactsConfig,
    pub(crate) http: HttpConfig,
}

pub(crate) fn resolve_config(overrides: &ConfigOverrides) -> Result<ServerConfig, ConfigError> {
    resolve_config_with(overrides, env_optional)
}

/// Precedence: command line, environment (`.env` included), config file,
/// built-in default.
pub(crate) fn resolve_config_with(
    overrides: &ConfigOverrides,
    env: impl Fn(&str) -> Option<String>,
) -> Result<ServerConfig, ConfigError> {
    let file = match &overrides.config {
        Some(path) => load_file_config(path)?,
        None => FileConfig::default(),
    };

    let db_path = overrides
        .db
        .clone()
        .or_else(|| env(DB_PATH_ENV).map(|raw| expand_home(raw.trim())))
        .or_else(|| file.db_path.clone())
        .unwrap_or_else(default_db_path);

    let contacts_enabled = overrides
        .contacts
        .or_else(|| env(CONTACTS_ENV).map(|raw| parse_bool(&raw)))
        .or(file.contacts.enabled)
        .unwrap_or(cfg!(target_os = "macos"));

    let mut http = file.http;
    if let Some(raw) = env(HTTP_PORT_ENV) {
        let port = parse_u64_value(HTTP_PORT_ENV, &raw)?;
        http.port = u16::try_from(port).map_err(|_| ConfigError::InvalidValue {
            name: HTTP_PORT_ENV,
            value: raw,
        })?;
    }

    Ok(ServerConfig {
        db_path,
        contacts_enabled,
        contacts: file.contacts,
        http,
    })
}
