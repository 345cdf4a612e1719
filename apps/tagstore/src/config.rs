//! # Configuration
//!
//! Settings come from four places, highest priority first:
//! 1. Command-line flags (`--store`)
//! 2. Environment variables (`TAGSTORE_STORE_DIR`, `TAGSTORE_REMOTE_URL`,
//!    `TAGSTORE_REMOTE_TOKEN`)
//! 3. A TOML file (`--config PATH`, or `tagstore.toml` in the working directory)
//! 4. Compiled defaults
//!
//! ```toml
//! [store]
//! dir = "tagstore_data"
//! offensive_dir = "tagstore_data/offensive"
//!
//! [buffer]
//! threshold = 10
//!
//! [autosave]
//! interval_secs = 30
//!
//! [remote]
//! database_url = "https://example-project.firebaseio.com"
//! collection = "image_tags"
//! auth_token = "..."
//! timeout_secs = 10
//! max_read_attempts = 3
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tagstore_core::TagError;
use tagstore_core::primitives::{DEFAULT_AUTOSAVE_INTERVAL_SECS, DEFAULT_FLUSH_THRESHOLD};

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "tagstore.toml";

pub const ENV_STORE_DIR: &str = "TAGSTORE_STORE_DIR";
pub const ENV_REMOTE_URL: &str = "TAGSTORE_REMOTE_URL";
pub const ENV_REMOTE_TOKEN: &str = "TAGSTORE_REMOTE_TOKEN";

// =============================================================================
// SECTIONS
// =============================================================================

/// `[store]`: where the canonical files live.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct StoreSection {
    pub dir: PathBuf,
    /// Directory of the offensive-image log. Defaults to `dir`.
    pub offensive_dir: Option<PathBuf>,
}

impl Default for StoreSection {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("tagstore_data"),
            offensive_dir: None,
        }
    }
}

/// `[buffer]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct BufferSection {
    pub threshold: usize,
}

impl Default for BufferSection {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_FLUSH_THRESHOLD,
        }
    }
}

/// `[autosave]`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AutosaveSection {
    pub interval_secs: u64,
}

impl Default for AutosaveSection {
    fn default() -> Self {
        Self {
            interval_secs: DEFAULT_AUTOSAVE_INTERVAL_SECS,
        }
    }
}

/// `[remote]`: the mirror target. No `database_url` means local-only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RemoteSection {
    pub database_url: Option<String>,
    pub collection: String,
    pub auth_token: Option<String>,
    pub timeout_secs: u64,
    pub max_read_attempts: u32,
}

impl Default for RemoteSection {
    fn default() -> Self {
        Self {
            database_url: None,
            collection: "image_tags".to_string(),
            auth_token: None,
            timeout_secs: 10,
            max_read_attempts: 3,
        }
    }
}

impl RemoteSection {
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

// =============================================================================
// CONFIG
// =============================================================================

/// Full application configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub store: StoreSection,
    pub buffer: BufferSection,
    pub autosave: AutosaveSection,
    pub remote: RemoteSection,
}

impl Config {
    /// Load configuration: file (if any), then environment, then validate.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, TagError> {
        let mut config = match path {
            Some(p) => Self::from_file(p)?,
            None if Path::new(DEFAULT_CONFIG_FILE).is_file() => {
                Self::from_file(Path::new(DEFAULT_CONFIG_FILE))?
            }
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, TagError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            TagError::ConfigError(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_toml(&text)
            .map_err(|e| TagError::ConfigError(format!("{}: {}", path.display(), e)))
    }

    /// Parse TOML text.
    pub fn from_toml(text: &str) -> Result<Self, TagError> {
        toml::from_str(text).map_err(|e| TagError::ConfigError(e.to_string()))
    }

    /// Overlay environment variables read through `lookup`.
    ///
    /// Empty values are ignored.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(dir) = get(ENV_STORE_DIR) {
            self.store.dir = PathBuf::from(dir);
        }
        if let Some(url) = get(ENV_REMOTE_URL) {
            self.remote.database_url = Some(url);
        }
        if let Some(token) = get(ENV_REMOTE_TOKEN) {
            self.remote.auth_token = Some(token);
        }
    }

    /// Apply a `--store` override.
    #[must_use]
    pub fn with_store_dir(mut self, dir: Option<PathBuf>) -> Self {
        if let Some(dir) = dir {
            self.store.dir = dir;
        }
        self
    }

    /// Directory of the offensive-image log.
    #[must_use]
    pub fn offensive_dir(&self) -> &Path {
        self.store
            .offensive_dir
            .as_deref()
            .unwrap_or(&self.store.dir)
    }

    #[must_use]
    pub fn autosave_interval(&self) -> Duration {
        Duration::from_secs(self.autosave.interval_secs)
    }

    /// Reject values no component can work with.
    pub fn validate(&self) -> Result<(), TagError> {
        if self.store.dir.as_os_str().is_empty() {
            return Err(TagError::ConfigError("store.dir must not be empty".to_string()));
        }
        if self.buffer.threshold == 0 {
            return Err(TagError::ConfigError(
                "buffer.threshold must be at least 1".to_string(),
            ));
        }
        let remote = &self.remote;
        if remote.collection.is_empty()
            || tagstore_core::sanitize_key(&remote.collection) != remote.collection
        {
            return Err(TagError::ConfigError(format!(
                "remote.collection '{}' must be non-empty and use only [A-Za-z0-9_-]",
                remote.collection
            )));
        }
        if remote.timeout_secs == 0 {
            return Err(TagError::ConfigError(
                "remote.timeout_secs must be at least 1".to_string(),
            ));
        }
        if remote.max_read_attempts == 0 {
            return Err(TagError::ConfigError(
                "remote.max_read_attempts must be at least 1".to_string(),
            ));
        }
        if let Some(url) = &remote.database_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(TagError::ConfigError(format!(
                    "remote.database_url '{}' must start with http:// or https://",
                    url
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = Config::from_toml("").expect("parse");
        assert_eq!(config, Config::default());
        assert_eq!(config.buffer.threshold, DEFAULT_FLUSH_THRESHOLD);
        assert_eq!(config.remote.collection, "image_tags");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn sections_parse() {
        let config = Config::from_toml(
            r#"
            [store]
            dir = "/data/tags"

            [buffer]
            threshold = 5

            [remote]
            database_url = "https://tags.example.test"
            timeout_secs = 3
            "#,
        )
        .expect("parse");

        assert_eq!(config.store.dir, PathBuf::from("/data/tags"));
        assert_eq!(config.offensive_dir(), Path::new("/data/tags"));
        assert_eq!(config.buffer.threshold, 5);
        assert_eq!(config.remote.database_url.as_deref(), Some("https://tags.example.test"));
        assert_eq!(config.remote.timeout(), Duration::from_secs(3));
        assert_eq!(config.remote.max_read_attempts, 3);
    }

    #[test]
    fn unknown_keys_rejected() {
        let result = Config::from_toml("[buffer]\nthreshhold = 5\n");
        assert!(matches!(result, Err(TagError::ConfigError(_))));
    }

    #[test]
    fn env_overrides_file_and_flag_overrides_env() {
        let mut config = Config::from_toml("[store]\ndir = \"from_file\"\n").expect("parse");
        config.apply_env(|key| match key {
            ENV_STORE_DIR => Some("from_env".to_string()),
            ENV_REMOTE_URL => Some("http://127.0.0.1:9000".to_string()),
            ENV_REMOTE_TOKEN => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.store.dir, PathBuf::from("from_env"));
        assert_eq!(config.remote.database_url.as_deref(), Some("http://127.0.0.1:9000"));
        assert!(config.remote.auth_token.is_none());

        let config = config.with_store_dir(Some(PathBuf::from("from_flag")));
        assert_eq!(config.store.dir, PathBuf::from("from_flag"));
    }

    #[test]
    fn invalid_values_rejected() {
        let mut config = Config::default();
        config.buffer.threshold = 0;
        assert!(matches!(config.validate(), Err(TagError::ConfigError(_))));

        let mut config = Config::default();
        config.remote.collection = "bad/name".to_string();
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.remote.database_url = Some("ftp://nope".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let result = Config::load(Some(&dir.path().join("absent.toml")));
        assert!(matches!(result, Err(TagError::ConfigError(_))));
    }
}
