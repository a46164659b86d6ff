//! # Sync Configuration
//!
//! Every tunable of the sync layer, in one TOML document.
//!
//! ```text
//! SyncConfig::default()
//!        │
//!        ▼  config.toml (platform config dir, or --config)
//! sections present in the file replace the defaults
//!        │
//!        ▼  TASKSYNC_* environment variables
//! individual fields replaced
//!        │
//!        ▼
//! validate() ──► InvalidConfig on the first bad field
//! ```
//!
//! ## File layout
//! ```toml
//! [remote]
//! base_url = "https://jsonplaceholder.typicode.com"
//! user_id = "1"
//! request_timeout_ms = 5000
//!
//! [network]
//! probe_url = "https://jsonplaceholder.typicode.com"
//! probe_timeout_ms = 3000
//! online_interval_secs = 30
//! offline_interval_secs = 3
//!
//! [sync]
//! enabled = true
//! periodic_interval_secs = 0
//!
//! [storage]
//! database_path = "/home/me/.local/share/tasksync/tasks.db"
//! ```
//!
//! | Variable | Field |
//! |----------|-------|
//! | `TASKSYNC_BASE_URL` | `remote.base_url` |
//! | `TASKSYNC_USER_ID` | `remote.user_id` |
//! | `TASKSYNC_PROBE_URL` | `network.probe_url` |
//! | `TASKSYNC_DATABASE_PATH` | `storage.database_path` |
//! | `TASKSYNC_SYNC_ENABLED` | `sync.enabled` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

/// Upper bound for a remote call before it counts as failed.
pub const MAX_REQUEST_TIMEOUT_MS: u64 = 5_000;

/// Upper bound for a reachability probe.
pub const MAX_PROBE_TIMEOUT_MS: u64 = 3_000;

// =============================================================================
// Remote Settings
// =============================================================================

/// Where the remote task API lives and how long to wait for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteSettings {
    /// Base URL of the CRUD API; `/todos` is appended.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// User whose tasks are listed and created.
    #[serde(default = "default_user_id")]
    pub user_id: String,

    /// Per-call timeout (milliseconds). At most 5000.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://jsonplaceholder.typicode.com".to_string()
}

fn default_user_id() -> String {
    "1".to_string()
}

fn default_request_timeout() -> u64 {
    MAX_REQUEST_TIMEOUT_MS
}

impl Default for RemoteSettings {
    fn default() -> Self {
        RemoteSettings {
            base_url: default_base_url(),
            user_id: default_user_id(),
            request_timeout_ms: default_request_timeout(),
        }
    }
}

// =============================================================================
// Network Settings
// =============================================================================

/// Connectivity sampling.
///
/// ```text
/// offline ──(every offline_interval_secs)──► sample ──► still offline
///    ▲                                          │
///    │                                          ▼ online
///    └───────── sample ◄──(every online_interval_secs)── online
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    /// URL probed to decide internet reachability.
    #[serde(default = "default_base_url")]
    pub probe_url: String,

    /// Probe timeout (milliseconds). At most 3000.
    #[serde(default = "default_probe_timeout")]
    pub probe_timeout_ms: u64,

    /// Sampling interval while online (seconds).
    #[serde(default = "default_online_interval")]
    pub online_interval_secs: u64,

    /// Sampling interval while offline (seconds).
    #[serde(default = "default_offline_interval")]
    pub offline_interval_secs: u64,
}

fn default_probe_timeout() -> u64 {
    MAX_PROBE_TIMEOUT_MS
}

fn default_online_interval() -> u64 {
    30
}

fn default_offline_interval() -> u64 {
    3
}

impl Default for NetworkSettings {
    fn default() -> Self {
        NetworkSettings {
            probe_url: default_base_url(),
            probe_timeout_ms: default_probe_timeout(),
            online_interval_secs: default_online_interval(),
            offline_interval_secs: default_offline_interval(),
        }
    }
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Sync behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// When false the engine never talks to the remote; every mutation is
    /// queued.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Interval of the optional periodic sync tick (seconds). 0 disables it.
    #[serde(default)]
    pub periodic_interval_secs: u64,
}

fn default_true() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            enabled: true,
            periodic_interval_secs: 0,
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

/// Local database location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to the platform data directory.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub remote: RemoteSettings,

    #[serde(default)]
    pub network: NetworkSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "tasksync";
const APPLICATION: &str = "tasksync";

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the effective configuration: defaults, then the file at
    /// `config_path` (or the platform location) if it exists, then the
    /// `TASKSYNC_*` environment. The result is validated.
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let path = config_path.or_else(Self::default_config_path);
        let mut config = match path {
            Some(ref path) => Self::read_file(path)?.unwrap_or_default(),
            None => Self::default(),
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Like [`SyncConfig::load`], but a missing or broken config never
    /// stops the app.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        match Self::load(config_path) {
            Ok(config) => config,
            Err(error) => {
                warn!(%error, "Config rejected, falling back to defaults");
                Self::default()
            }
        }
    }

    /// `Ok(None)` when there is no file at `path`.
    fn read_file(path: &Path) -> SyncResult<Option<Self>> {
        if !path.is_file() {
            debug!(path = %path.display(), "No config file");
            return Ok(None);
        }

        let text = std::fs::read_to_string(path)?;
        let parsed = toml::from_str(&text)?;
        info!(path = %path.display(), "Config file read");
        Ok(Some(parsed))
    }

    /// Writes the document as pretty TOML, creating parent directories.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let Some(path) = config_path.or_else(Self::default_config_path) else {
            return Err(SyncError::ConfigSaveFailed(
                "platform config directory unavailable".into(),
            ));
        };

        let text = toml::to_string_pretty(self)?;
        path.parent()
            .map(std::fs::create_dir_all)
            .transpose()
            .and_then(|_| std::fs::write(&path, text))
            .map_err(|e| SyncError::ConfigSaveFailed(format!("{}: {}", path.display(), e)))?;

        info!(path = %path.display(), "Config written");
        Ok(())
    }

    /// Rejects the first out-of-range field.
    pub fn validate(&self) -> SyncResult<()> {
        validate_http_url("remote.base_url", &self.remote.base_url)?;
        validate_http_url("network.probe_url", &self.network.probe_url)?;

        if self.remote.user_id.trim().is_empty() {
            return Err(SyncError::InvalidConfig("remote.user_id is empty".into()));
        }

        let request = self.remote.request_timeout_ms;
        if !(1..=MAX_REQUEST_TIMEOUT_MS).contains(&request) {
            return Err(SyncError::InvalidConfig(format!(
                "remote.request_timeout_ms = {} is outside 1..={}",
                request, MAX_REQUEST_TIMEOUT_MS
            )));
        }

        let probe = self.network.probe_timeout_ms;
        if !(1..=MAX_PROBE_TIMEOUT_MS).contains(&probe) {
            return Err(SyncError::InvalidConfig(format!(
                "network.probe_timeout_ms = {} is outside 1..={}",
                probe, MAX_PROBE_TIMEOUT_MS
            )));
        }

        let NetworkSettings {
            online_interval_secs: online,
            offline_interval_secs: offline,
            ..
        } = self.network;
        if offline == 0 || offline > online {
            return Err(SyncError::InvalidConfig(format!(
                "network.offline_interval_secs = {} must be in 1..={} (online interval)",
                offline, online
            )));
        }

        Ok(())
    }

    /// Replaces fields from `lookup`, which maps a `TASKSYNC_*` name to its
    /// value. `load` passes the process environment.
    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup("TASKSYNC_BASE_URL") {
            debug!(%url, "remote.base_url from environment");
            self.remote.base_url = url;
        }
        if let Some(user_id) = lookup("TASKSYNC_USER_ID") {
            self.remote.user_id = user_id;
        }
        if let Some(url) = lookup("TASKSYNC_PROBE_URL") {
            debug!(%url, "network.probe_url from environment");
            self.network.probe_url = url;
        }
        if let Some(path) = lookup("TASKSYNC_DATABASE_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
        if let Some(raw) = lookup("TASKSYNC_SYNC_ENABLED") {
            match parse_flag(&raw) {
                Some(enabled) => self.sync.enabled = enabled,
                None => warn!(value = %raw, "TASKSYNC_SYNC_ENABLED ignored"),
            }
        }
    }

    /// `config.toml` under the platform config directory.
    pub fn default_config_path() -> Option<PathBuf> {
        project_dirs().map(|dirs| dirs.config_dir().join("config.toml"))
    }

    // =========================================================================
    // Derived Values
    // =========================================================================

    /// `storage.database_path`, else `tasks.db` in the platform data dir.
    pub fn database_path(&self) -> Option<PathBuf> {
        match &self.storage.database_path {
            Some(path) => Some(path.clone()),
            None => project_dirs().map(|dirs| dirs.data_dir().join("tasks.db")),
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.remote.request_timeout_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.network.probe_timeout_ms)
    }

    pub fn online_interval(&self) -> Duration {
        Duration::from_secs(self.network.online_interval_secs)
    }

    pub fn offline_interval(&self) -> Duration {
        Duration::from_secs(self.network.offline_interval_secs)
    }

    /// `None` when the periodic tick is off.
    pub fn periodic_interval(&self) -> Option<Duration> {
        (self.sync.periodic_interval_secs > 0)
            .then(|| Duration::from_secs(self.sync.periodic_interval_secs))
    }

    pub fn is_sync_enabled(&self) -> bool {
        self.sync.enabled
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn validate_http_url(field: &str, value: &str) -> SyncResult<()> {
    let url = Url::parse(value)?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(SyncError::InvalidConfig(format!(
            "{} must use http or https, got: {}",
            field, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SyncConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.remote.request_timeout_ms, 5000);
        assert_eq!(config.network.offline_interval_secs, 3);
        assert_eq!(config.network.online_interval_secs, 30);
        assert!(config.periodic_interval().is_none());
        assert!(config.is_sync_enabled());
    }

    #[test]
    fn test_config_validation() {
        let mut config = SyncConfig::default();

        config.remote.base_url = "ws://localhost:8080".to_string();
        assert!(config.validate().is_err());

        config.remote.base_url = "not a url".to_string();
        assert!(config.validate().is_err());

        config.remote.base_url = "http://localhost:8080".to_string();
        assert!(config.validate().is_ok());

        config.remote.request_timeout_ms = 10_000;
        assert!(config.validate().is_err());
        config.remote.request_timeout_ms = 2_000;

        config.network.probe_timeout_ms = 0;
        assert!(config.validate().is_err());
        config.network.probe_timeout_ms = 1_000;

        config.network.offline_interval_secs = 60;
        assert!(config.validate().is_err());
        config.network.offline_interval_secs = 3;

        config.remote.user_id = "  ".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: SyncConfig = toml::from_str(
            r#"
            [remote]
            base_url = "http://127.0.0.1:9000"

            [sync]
            periodic_interval_secs = 60
            "#,
        )
        .unwrap();

        assert_eq!(config.remote.base_url, "http://127.0.0.1:9000");
        assert_eq!(config.remote.user_id, "1");
        assert_eq!(config.periodic_interval(), Some(Duration::from_secs(60)));
        assert!(config.sync.enabled);
    }

    #[test]
    fn test_overrides_replace_fields() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|key| match key {
            "TASKSYNC_BASE_URL" => Some("http://127.0.0.1:4000".to_string()),
            "TASKSYNC_DATABASE_PATH" => Some("/tmp/override.db".to_string()),
            "TASKSYNC_SYNC_ENABLED" => Some(" Off ".to_string()),
            _ => None,
        });

        assert_eq!(config.remote.base_url, "http://127.0.0.1:4000");
        assert_eq!(config.database_path(), Some(PathBuf::from("/tmp/override.db")));
        assert!(!config.is_sync_enabled());
        assert_eq!(config.remote.user_id, "1");
    }

    #[test]
    fn test_unrecognized_flag_is_ignored() {
        let mut config = SyncConfig::default();
        config.apply_overrides(|key| (key == "TASKSYNC_SYNC_ENABLED").then(|| "maybe".to_string()));
        assert!(config.is_sync_enabled());
    }

    #[test]
    fn test_save_then_load() {
        let path = std::env::temp_dir().join(format!(
            "tasksync-config-{}.toml",
            uuid::Uuid::new_v4().simple()
        ));

        let mut config = SyncConfig::default();
        config.remote.user_id = "42".to_string();
        config.sync.periodic_interval_secs = 120;
        config.save(Some(path.clone())).unwrap();

        let loaded = SyncConfig::read_file(&path).unwrap().unwrap();
        assert_eq!(loaded.remote.user_id, "42");
        assert_eq!(loaded.periodic_interval(), Some(Duration::from_secs(120)));

        std::fs::remove_file(&path).unwrap();
        assert!(SyncConfig::read_file(&path).unwrap().is_none());
    }

    #[test]
    fn test_broken_file_is_a_load_error() {
        let path = std::env::temp_dir().join(format!(
            "tasksync-broken-{}.toml",
            uuid::Uuid::new_v4().simple()
        ));
        std::fs::write(&path, "[remote\nbase_url = ").unwrap();

        let err = SyncConfig::read_file(&path).unwrap_err();
        assert!(err.is_config_error());

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn test_toml_sections() {
        let text = toml::to_string_pretty(&SyncConfig::default()).unwrap();
        for section in ["[remote]", "[network]", "[sync]"] {
            assert!(text.contains(section), "missing {}", section);
        }
    }
}
