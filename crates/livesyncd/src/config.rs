//! Runtime options loaded from TOML.
//!
//! Lookup order: an explicit `--config` path, then
//! `<config dir>/livesync/config.toml`, then built-in defaults. Every key
//! is optional.
//!
//! ```toml
//! request_timeout_ms = 1000
//! create_session_timeout_ms = 15000
//! auto_remove_error_ms = 5000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    /// Default wait for a reply to a request, `rv-ping` included.
    pub request_timeout_ms: u64,
    /// Wait for `rv-session` after `rv-create-session`.
    pub create_session_timeout_ms: u64,
    /// Delay before an errored remote view session is dropped.
    /// Unset keeps errored sessions until replaced or closed.
    pub auto_remove_error_ms: Option<u64>,
    /// Store command channel capacity.
    pub command_buffer: usize,
    /// Store event and transport broadcast capacity.
    pub event_buffer: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            request_timeout_ms: 1_000,
            create_session_timeout_ms: 15_000,
            auto_remove_error_ms: None,
            command_buffer: 100,
            event_buffer: 100,
        }
    }
}

impl Options {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn create_session_timeout(&self) -> Duration {
        Duration::from_millis(self.create_session_timeout_ms)
    }

    pub fn auto_remove_error(&self) -> Option<Duration> {
        self.auto_remove_error_ms.map(Duration::from_millis)
    }

    /// `<config dir>/livesync/config.toml`, if the platform has a config dir.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("livesync").join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Loads `explicit` if given, else the default path if it exists, else defaults.
    pub fn discover(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => {
                debug!(path = %path.display(), "loading config");
                Self::load(&path)
            }
            _ => Ok(Self::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let options = Options::default();
        assert_eq!(options.request_timeout(), Duration::from_millis(1_000));
        assert_eq!(options.create_session_timeout(), Duration::from_secs(15));
        assert_eq!(options.auto_remove_error(), None);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "auto_remove_error_ms = 5000").unwrap();

        let options = Options::load(file.path()).unwrap();
        assert_eq!(options.auto_remove_error(), Some(Duration::from_secs(5)));
        assert_eq!(options.request_timeout_ms, 1_000);
    }

    #[test]
    fn test_explicit_path_errors_surface() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            Options::discover(Some(&missing)),
            Err(ConfigError::Read { .. })
        ));

        let bad = dir.path().join("bad.toml");
        std::fs::write(&bad, "request_timeout_ms = \"soon\"").unwrap();
        assert!(matches!(Options::load(&bad), Err(ConfigError::Parse { .. })));
    }
}
