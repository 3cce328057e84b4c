//! Configuration management for installrecord.
//!
//! This module provides configuration loading and validation using figment,
//! supporting TOML config files, environment variables, and defaults. The
//! resulting [`Config`] is built once at startup and passed down explicitly.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::storage::validate_identifier;
use crate::timestamp;

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "config.toml";

/// Default data directory name.
const DATA_DIR_NAME: &str = "installrecord";

/// Default database file name.
const DATABASE_FILE_NAME: &str = "data.db";

/// Default record collection.
pub const DEFAULT_COLLECTION: &str = "_dev_telemetry_data";

/// Placeholder shown instead of passwords.
const REDACTED: &str = "<redacted>";

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "INSTREC_";

/// Application configuration.
///
/// Configuration is loaded from (in order of precedence, highest first):
/// 1. Environment variables (prefixed with `INSTREC_`, `__` between sections)
/// 2. TOML config file at `~/.config/installrecord/config.toml`
/// 3. Default values
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Record store configuration.
    pub backend: BackendConfig,
    /// Runtime reporting configuration.
    pub telemetry: TelemetryConfig,
    /// HTTP migration configuration.
    pub migration: MigrationConfig,
    /// Direct database import configuration.
    pub import: ImportConfig,
}

/// Record store configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the record store.
    pub url: String,
    /// Collection holding telemetry records.
    pub collection: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

/// Runtime reporting configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Explicit opt-in for sending diagnostics.
    pub diagnostics: bool,
}

/// HTTP migration configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Base URL of the legacy source API.
    pub source_url: String,
    /// Records fetched per page.
    pub batch_size: u32,
    /// First page to fetch (1-based), for resuming.
    pub start_page: u32,
    /// Pause between pages in milliseconds.
    pub page_delay_ms: u64,
    /// Skip records created before this time.
    pub since: Option<String>,
    /// Skip records created after this time.
    pub until: Option<String>,
    /// Label stored in `repo_source` on migrated records.
    pub repo_source: Option<String>,
    /// Credentials allowed to set timestamps directly.
    pub privileged: Option<Credentials>,
    /// Auth collection for privileged credentials.
    pub privileged_collection: String,
    /// Credentials without timestamp permission.
    pub restricted: Option<Credentials>,
    /// Auth collection for restricted credentials.
    pub restricted_collection: String,
}

/// Direct database import configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportConfig {
    /// Path to the record store's database file.
    /// Defaults to `~/.local/share/installrecord/data.db`
    pub database_path: Option<PathBuf>,
    /// Table written by imports and fixups.
    pub table: String,
    /// Label stored in `repo_source` on imported records.
    pub repo_source: Option<String>,
}

/// An identity/password pair for the record store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Login identity (usually an email).
    pub identity: String,
    /// Password.
    pub password: String,
}

impl Credentials {
    /// Create credentials.
    #[must_use]
    pub fn new(identity: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            identity: identity.into(),
            password: password.into(),
        }
    }

    fn is_complete(&self) -> bool {
        !self.identity.trim().is_empty() && !self.password.is_empty()
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("password", &REDACTED)
            .finish()
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            collection: DEFAULT_COLLECTION.to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            source_url: String::new(),
            batch_size: 500,
            start_page: 1,
            page_delay_ms: 100,
            since: None,
            until: None,
            repo_source: None,
            privileged: None,
            privileged_collection: "_superusers".to_string(),
            restricted: None,
            restricted_collection: "users".to_string(),
        }
    }
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            database_path: None, // Will be resolved to default at runtime
            table: DEFAULT_COLLECTION.to_string(),
            repo_source: None,
        }
    }
}

impl Config {
    /// Load configuration from all sources.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Load configuration with an optional custom config path.
    ///
    /// # Errors
    ///
    /// Returns an error if configuration loading or parsing fails.
    pub fn load_from(config_path: Option<PathBuf>) -> Result<Self> {
        let config_file = config_path.unwrap_or_else(Self::default_config_path);

        let figment = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Toml::file(&config_file))
            .merge(Env::prefixed(ENV_PREFIX).split("__"));

        let config: Config = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default configuration file path.
    #[must_use]
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from(".config"))
            .join(DATA_DIR_NAME)
            .join(CONFIG_FILE_NAME)
    }

    /// Get the default data directory path.
    #[must_use]
    pub fn default_data_dir() -> PathBuf {
        dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from(".local/share"))
            .join(DATA_DIR_NAME)
    }

    /// Validate the configuration.
    ///
    /// Checks that apply to every command. Command-specific requirements
    /// (such as URLs being present) are checked by [`Config::require_backend`]
    /// and [`Config::require_source`].
    ///
    /// # Errors
    ///
    /// Returns an error if any configuration values are invalid.
    pub fn validate(&self) -> Result<()> {
        if self.backend.timeout_secs == 0 {
            return Err(Error::config("backend.timeout_secs must be greater than 0"));
        }

        if self.backend.collection.trim().is_empty() {
            return Err(Error::config("backend.collection must not be empty"));
        }

        if self.migration.batch_size == 0 {
            return Err(Error::config("migration.batch_size must be greater than 0"));
        }

        if self.migration.start_page == 0 {
            return Err(Error::config("migration.start_page starts at 1"));
        }

        for (name, value) in [
            ("migration.since", &self.migration.since),
            ("migration.until", &self.migration.until),
        ] {
            if let Some(value) = value {
                if timestamp::parse(value).is_none() {
                    return Err(Error::config(format!("{name} is not a date: {value}")));
                }
            }
        }

        for (name, creds) in [
            ("migration.privileged", &self.migration.privileged),
            ("migration.restricted", &self.migration.restricted),
        ] {
            if let Some(creds) = creds {
                if !creds.is_complete() {
                    return Err(Error::config(format!(
                        "{name} needs both identity and password"
                    )));
                }
            }
        }

        validate_identifier(&self.import.table)?;
        Ok(())
    }

    /// Ensure a record store URL is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if `backend.url` is empty.
    pub fn require_backend(&self) -> Result<&str> {
        let url = self.backend.url.trim();
        if url.is_empty() {
            return Err(Error::config("backend.url is required"));
        }
        Ok(url)
    }

    /// Ensure a legacy source URL is configured.
    ///
    /// # Errors
    ///
    /// Returns an error if `migration.source_url` is empty.
    pub fn require_source(&self) -> Result<&str> {
        let url = self.migration.source_url.trim();
        if url.is_empty() {
            return Err(Error::config("migration.source_url is required"));
        }
        Ok(url)
    }

    /// Get the database path, resolving defaults if not set.
    #[must_use]
    pub fn database_path(&self) -> PathBuf {
        self.import
            .database_path
            .clone()
            .unwrap_or_else(|| Self::default_data_dir().join(DATABASE_FILE_NAME))
    }

    /// Get the request timeout as a Duration.
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.backend.timeout_secs)
    }

    /// Copy of this configuration with passwords masked, for display.
    #[must_use]
    pub fn redacted(&self) -> Self {
        let mut shown = self.clone();
        for creds in [&mut shown.migration.privileged, &mut shown.migration.restricted]
            .into_iter()
            .flatten()
        {
            creds.password = REDACTED.to_string();
        }
        shown
    }

    /// Get the inter-page delay as a Duration.
    #[must_use]
    pub fn page_delay(&self) -> Duration {
        Duration::from_millis(self.migration.page_delay_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();

        assert!(!config.telemetry.diagnostics);
        assert_eq!(config.backend.collection, DEFAULT_COLLECTION);
        assert_eq!(config.backend.timeout_secs, 10);
        assert_eq!(config.migration.batch_size, 500);
        assert_eq!(config.migration.start_page, 1);
        assert_eq!(config.migration.privileged_collection, "_superusers");
        assert_eq!(config.migration.restricted_collection, "users");
    }

    #[test]
    fn test_redacted_masks_passwords() {
        let mut config = Config::default();
        config.migration.privileged = Some(Credentials::new("admin@example.test", "hunter2"));

        let shown = config.redacted();
        let privileged = shown.migration.privileged.unwrap();
        assert_eq!(privileged.identity, "admin@example.test");
        assert_eq!(privileged.password, REDACTED);
        assert!(shown.migration.restricted.is_none());
        assert!(!format!("{:?}", config.migration.privileged).contains("hunter2"));
    }

    #[test]
    fn test_validate_valid_config() {
        let config = Config::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_zero_batch_size() {
        let mut config = Config::default();
        config.migration.batch_size = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("batch_size"));
    }

    #[test]
    fn test_validate_zero_start_page() {
        let mut config = Config::default();
        config.migration.start_page = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("start_page"));
    }

    #[test]
    fn test_validate_zero_timeout() {
        let mut config = Config::default();
        config.backend.timeout_secs = 0;

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("timeout_secs"));
    }

    #[test]
    fn test_validate_bad_date_filter() {
        let mut config = Config::default();
        config.migration.since = Some("yesterday-ish".to_string());

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("migration.since"));
    }

    #[test]
    fn test_validate_incomplete_credentials() {
        let mut config = Config::default();
        config.migration.restricted = Some(Credentials::new("user@example.test", ""));

        let err = config.validate().unwrap_err().to_string();
        assert!(err.contains("migration.restricted"));
    }

    #[test]
    fn test_validate_bad_table_name() {
        let mut config = Config::default();
        config.import.table = "records; DROP TABLE x".to_string();

        assert!(matches!(
            config.validate(),
            Err(Error::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_require_backend() {
        let mut config = Config::default();
        assert!(config.require_backend().is_err());

        config.backend.url = " http://db.local ".to_string();
        assert_eq!(config.require_backend().unwrap(), "http://db.local");
    }

    #[test]
    fn test_require_source() {
        let mut config = Config::default();
        assert!(config.require_source().is_err());

        config.migration.source_url = "http://legacy.local".to_string();
        assert!(config.require_source().is_ok());
    }

    #[test]
    fn test_database_path_default() {
        let config = Config::default();
        assert!(config.database_path().to_string_lossy().contains("data.db"));
    }

    #[test]
    fn test_database_path_custom() {
        let mut config = Config::default();
        config.import.database_path = Some(PathBuf::from("/srv/pb_data/data.db"));

        assert_eq!(config.database_path(), PathBuf::from("/srv/pb_data/data.db"));
    }

    #[test]
    fn test_durations() {
        let config = Config::default();
        assert_eq!(config.timeout(), Duration::from_secs(10));
        assert_eq!(config.page_delay(), Duration::from_millis(100));
    }

    #[test]
    fn test_credentials_debug_redacts_password() {
        let creds = Credentials::new("admin@example.test", "hunter2");
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin@example.test"));
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn test_default_config_path() {
        let path = Config::default_config_path();
        assert!(path.to_string_lossy().contains("installrecord"));
        assert!(path.to_string_lossy().contains("config.toml"));
    }

    #[test]
    fn test_load_nonexistent_config() {
        let result = Config::load_from(Some(PathBuf::from("/nonexistent/config.toml")));
        assert!(result.is_ok());
    }

    #[test]
    fn test_load_from_toml_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            r#"
[backend]
url = "http://db.local:8090"
collection = "telemetry"

[telemetry]
diagnostics = true

[migration]
batch_size = 100

[migration.restricted]
identity = "importer@example.test"
password = "pw"
"#,
        )
        .unwrap();

        let config = Config::load_from(Some(path)).unwrap();
        assert_eq!(config.backend.url, "http://db.local:8090");
        assert_eq!(config.backend.collection, "telemetry");
        assert!(config.telemetry.diagnostics);
        assert_eq!(config.migration.batch_size, 100);
        assert_eq!(
            config.migration.restricted,
            Some(Credentials::new("importer@example.test", "pw"))
        );
        assert_eq!(config.migration.start_page, 1);
    }

    #[test]
    fn test_config_serialize_roundtrip_shape() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json["backend"].get("collection").is_some());
        assert!(json["migration"].get("batch_size").is_some());
    }
}
