use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_CONFIG_PATH: &str = "config/chat.json";

/// Spacing between backend calls when talking to a rate-limited service.
const RATE_LIMITED_SPACING_MS: u64 = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Http,
    Sqlite,
    Memory,
}

impl BackendKind {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "http" => Some(Self::Http),
            "sqlite" => Some(Self::Sqlite),
            "memory" => Some(Self::Memory),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpStoreConfig {
    pub url: String,
    /// Header carrying `api_key`, e.g. `X-Access-Key`.
    pub auth_header: String,
    pub api_key: Option<String>,
    /// Key the service wraps the document in on read, e.g. `record`.
    pub envelope: Option<String>,
}

impl Default for HttpStoreConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            auth_header: "X-Access-Key".to_string(),
            api_key: None,
            envelope: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteStoreConfig {
    pub path: String,
    pub document: String,
}

impl Default for SqliteStoreConfig {
    fn default() -> Self {
        Self {
            path: "data/chat.db".to_string(),
            document: "messages".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub backend: BackendKind,
    pub http: HttpStoreConfig,
    pub sqlite: SqliteStoreConfig,
    pub username: Option<String>,
    /// Display width and storage retention ceiling.
    pub max_visible_lines: usize,
    /// Most messages kept in the local mirror.
    pub storage_buffer_size: usize,
    pub poll_interval_ms: u64,
    pub cleanup_interval_ms: u64,
    /// Defaults by backend when unset: 2000 for http, 0 otherwise.
    pub min_request_interval_ms: Option<u64>,
    pub retry_initial_delay_ms: u64,
    pub retry_max_attempts: u32,
    pub send_max_attempts: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            http: HttpStoreConfig::default(),
            sqlite: SqliteStoreConfig::default(),
            username: None,
            max_visible_lines: 6,
            storage_buffer_size: 20,
            poll_interval_ms: 4000,
            cleanup_interval_ms: 20000,
            min_request_interval_ms: None,
            retry_initial_delay_ms: 2000,
            retry_max_attempts: 5,
            send_max_attempts: 3,
        }
    }
}

impl AppConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn min_request_interval(&self) -> Duration {
        let millis = self.min_request_interval_ms.unwrap_or(match self.backend {
            BackendKind::Http => RATE_LIMITED_SPACING_MS,
            BackendKind::Sqlite | BackendKind::Memory => 0,
        });
        Duration::from_millis(millis)
    }

    pub fn retry_initial_delay(&self) -> Duration {
        Duration::from_millis(self.retry_initial_delay_ms)
    }

    /// Applies `CHAT_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(raw) = lookup("CHAT_BACKEND") {
            match BackendKind::parse(&raw) {
                Some(kind) => self.backend = kind,
                None => log::warn!("Ignoring unknown CHAT_BACKEND `{raw}`"),
            }
        }
        if let Some(url) = lookup("CHAT_STORE_URL") {
            self.http.url = url;
        }
        if let Some(key) = lookup("CHAT_API_KEY") {
            self.http.api_key = Some(key);
        }
        if let Some(name) = lookup("CHAT_USERNAME") {
            self.username = Some(name);
        }
    }
}

pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    match fs::read_to_string(path) {
        Ok(content) => match serde_json::from_str::<AppConfig>(&content) {
            Ok(config) => config,
            Err(err) => {
                log::warn!("Failed to parse config file {}: {err}", path.display());
                AppConfig::default()
            }
        },
        Err(err) => {
            log::info!(
                "Config file {} not found ({err}); using defaults",
                path.display()
            );
            AppConfig::default()
        }
    }
}

pub fn save_config(path: &str, config: &AppConfig) -> std::io::Result<()> {
    crate::storage::ensure_parent_dir(path)?;
    let json = serde_json::to_string_pretty(config)?;
    fs::write(path, json)
}
