//! Library credentials and client settings.
//!
//! Settings are captured once at startup into a [`Config`] and passed to the
//! clients explicitly. Environment variables win over the optional JSON file
//! at `~/.zotero_add.json`.

use crate::error::{Result, ZoteroError};
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Zotero Web API base URL
pub const DEFAULT_API_BASE_URL: &str = "https://api.zotero.org";

/// Crossref API base URL
pub const DEFAULT_CROSSREF_BASE_URL: &str = "https://api.crossref.org";

/// Per-request timeout used when nothing else is configured
pub const DEFAULT_REQUEST_TIMEOUT_SECONDS: u64 = 30;

const ENV_API_KEY: &str = "ZOTERO_API_KEY";
const ENV_LIBRARY_ID: &str = "ZOTERO_LIBRARY_ID";
const ENV_LIBRARY_TYPE: &str = "ZOTERO_LIBRARY_TYPE";
const ENV_API_BASE_URL: &str = "ZOTERO_API_BASE_URL";
const ENV_REQUEST_TIMEOUT: &str = "ZOTERO_REQUEST_TIMEOUT_SECONDS";

/// Default config file path: `~/.zotero_add.json`
pub fn default_config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|p| p.join(".zotero_add.json"))
        .ok_or_else(|| ZoteroError::Config("Cannot determine home directory".to_string()))
}

/// Kind of library the credentials address
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LibraryType {
    User,
    Group,
}

impl LibraryType {
    /// URL path segment, e.g. `users` in `/users/123/items`
    pub fn path_segment(&self) -> &'static str {
        match self {
            LibraryType::User => "users",
            LibraryType::Group => "groups",
        }
    }
}

impl FromStr for LibraryType {
    type Err = ZoteroError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" | "users" => Ok(LibraryType::User),
            "group" | "groups" => Ok(LibraryType::Group),
            other => Err(ZoteroError::Config(format!(
                "Invalid library type '{}', expected 'user' or 'group'",
                other
            ))),
        }
    }
}

/// On-disk settings, every field optional
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigFile {
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub library_id: Option<String>,
    #[serde(default)]
    pub library_type: Option<String>,
    #[serde(default)]
    pub api_base_url: Option<String>,
    #[serde(default)]
    pub crossref_base_url: Option<String>,
    #[serde(default)]
    pub request_timeout_seconds: Option<u64>,
}

impl ConfigFile {
    /// Load settings from file
    ///
    /// A missing file yields empty settings; a malformed one is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("Config file not found: {:?}", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)?;
        let file = serde_json::from_str::<ConfigFile>(&content).map_err(|e| {
            ZoteroError::Config(format!("Invalid config file {:?}: {}", path, e))
        })?;
        info!("Loaded settings from {:?}", path);
        Ok(file)
    }
}

/// Settings shared by every remote client
#[derive(Clone)]
pub struct Config {
    pub api_key: String,
    pub library_id: String,
    pub library_type: LibraryType,
    pub api_base_url: String,
    pub crossref_base_url: String,
    pub request_timeout_seconds: u64,
}

impl Config {
    /// Create a config with default endpoints and timeout
    pub fn new(
        api_key: impl Into<String>,
        library_id: impl Into<String>,
        library_type: LibraryType,
    ) -> Self {
        Self {
            api_key: api_key.into(),
            library_id: library_id.into(),
            library_type,
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            crossref_base_url: DEFAULT_CROSSREF_BASE_URL.to_string(),
            request_timeout_seconds: DEFAULT_REQUEST_TIMEOUT_SECONDS,
        }
    }

    /// Load from the process environment and the config file
    ///
    /// # Arguments
    ///
    /// * `config_path` - File to read; `None` uses [`default_config_path`]
    pub fn load(config_path: Option<&Path>) -> Result<Self> {
        let path = match config_path {
            Some(p) => p.to_path_buf(),
            None => default_config_path()?,
        };
        let file = ConfigFile::load(&path)?;
        Self::from_sources(|name| std::env::var(name).ok(), file)
    }

    /// Merge an environment lookup over file settings
    pub fn from_sources<F>(env: F, file: ConfigFile) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let pick = |name: &str, fallback: Option<String>| {
            env(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .or(fallback.filter(|v| !v.trim().is_empty()))
        };

        let api_key = pick(ENV_API_KEY, file.api_key).ok_or_else(|| missing(ENV_API_KEY))?;
        let library_id =
            pick(ENV_LIBRARY_ID, file.library_id).ok_or_else(|| missing(ENV_LIBRARY_ID))?;
        let library_type = pick(ENV_LIBRARY_TYPE, file.library_type)
            .ok_or_else(|| missing(ENV_LIBRARY_TYPE))?
            .parse::<LibraryType>()?;

        let mut config = Self::new(api_key, library_id, library_type);

        if let Some(url) = pick(ENV_API_BASE_URL, file.api_base_url) {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
        if let Some(url) = file.crossref_base_url.filter(|u| !u.trim().is_empty()) {
            config.crossref_base_url = url.trim_end_matches('/').to_string();
        }

        let timeout = match env(ENV_REQUEST_TIMEOUT).filter(|v| !v.trim().is_empty()) {
            Some(raw) => Some(raw.trim().parse::<u64>().map_err(|_| {
                ZoteroError::Config(format!(
                    "{} must be a whole number of seconds, got '{}'",
                    ENV_REQUEST_TIMEOUT, raw
                ))
            })?),
            None => file.request_timeout_seconds,
        };
        if let Some(secs) = timeout {
            config = config.with_timeout(secs)?;
        }

        debug!(
            library_type = config.library_type.path_segment(),
            library_id = %config.library_id,
            timeout_secs = config.request_timeout_seconds,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Override the per-request timeout
    pub fn with_timeout(mut self, seconds: u64) -> Result<Self> {
        if seconds == 0 {
            return Err(ZoteroError::Config(
                "Request timeout must be at least 1 second".to_string(),
            ));
        }
        self.request_timeout_seconds = seconds;
        Ok(self)
    }

    /// Library root, e.g. `https://api.zotero.org/users/123`
    pub fn library_url(&self) -> String {
        format!(
            "{}/{}/{}",
            self.api_base_url.trim_end_matches('/'),
            self.library_type.path_segment(),
            self.library_id
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("api_key", &"<redacted>")
            .field("library_id", &self.library_id)
            .field("library_type", &self.library_type)
            .field("api_base_url", &self.api_base_url)
            .field("crossref_base_url", &self.crossref_base_url)
            .field("request_timeout_seconds", &self.request_timeout_seconds)
            .finish()
    }
}

fn missing(name: &str) -> ZoteroError {
    ZoteroError::Config(format!("Missing {} (set it in the environment)", name))
}
