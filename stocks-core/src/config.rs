//! Workspace location and fetch tuning.
//!
//! The workspace root comes from `STOCKS_WS` (leading `~` expanded) or
//! defaults to `~/stocks_ws`. Series live under `<ws>/data/<interval>/`.
//! Fetch parameters are read from an optional `<ws>/stocks.toml`:
//!
//! ```toml
//! [fetch]
//! batch_size = 100
//! timeout_secs = 30
//! max_retries = 2
//! retry_base_delay_ms = 500
//! workers = 1
//! ```

use crate::data::{DataError, DownloadOptions, ProviderConfig, DEFAULT_BATCH_SIZE};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the workspace root.
pub const WORKSPACE_ENV: &str = "STOCKS_WS";

const DEFAULT_WORKSPACE_DIR: &str = "stocks_ws";
const SETTINGS_FILE: &str = "stocks.toml";
const MAX_RETRIES_LIMIT: u32 = 10;

/// Root directory holding stored series, snapshots, settings and plots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Resolve from the process environment and the user's home directory.
    pub fn from_env() -> Result<Self, DataError> {
        Self::resolve(std::env::var(WORKSPACE_ENV).ok(), dirs::home_dir())
    }

    /// Resolve from an explicit `STOCKS_WS` value and home directory.
    pub fn resolve(env: Option<String>, home: Option<PathBuf>) -> Result<Self, DataError> {
        let no_home = || DataError::Config("cannot determine home directory".into());
        match env.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
            Some("~") => Ok(Self::new(home.ok_or_else(no_home)?)),
            Some(v) => match v.strip_prefix("~/") {
                Some(rest) => Ok(Self::new(home.ok_or_else(no_home)?.join(rest))),
                None => Ok(Self::new(v)),
            },
            None => Ok(Self::new(home.ok_or_else(no_home)?.join(DEFAULT_WORKSPACE_DIR))),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root of the per-interval series directories.
    pub fn data_root(&self) -> PathBuf {
        self.root.join("data")
    }

    pub fn settings_path(&self) -> PathBuf {
        self.root.join(SETTINGS_FILE)
    }

    /// Where `plot` writes the chart for `stem`.
    pub fn plot_path(&self, stem: &str) -> PathBuf {
        self.root.join(format!("{stem}_plot.svg"))
    }

    /// Load `stocks.toml`, falling back to defaults when it does not exist.
    pub fn load_settings(&self) -> Result<Settings, DataError> {
        let path = self.settings_path();
        if !path.exists() {
            return Ok(Settings::default());
        }
        Settings::from_file(&path)
    }
}

/// Contents of `stocks.toml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(default)]
    pub fetch: FetchSettings,
}

/// `[fetch]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FetchSettings {
    pub batch_size: usize,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub retry_base_delay_ms: u64,
    pub workers: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            timeout_secs: 30,
            max_retries: 2,
            retry_base_delay_ms: 500,
            workers: 1,
        }
    }
}

impl Settings {
    pub fn from_file(path: &Path) -> Result<Self, DataError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| DataError::Config(format!("read {}: {e}", path.display())))?;
        Self::from_toml(&content)
    }

    /// Parse and validate settings from a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, DataError> {
        let settings: Settings = toml::from_str(content)
            .map_err(|e| DataError::Config(format!("parse settings TOML: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), DataError> {
        if self.fetch.batch_size == 0 {
            return Err(DataError::Config("fetch.batch_size must be at least 1".into()));
        }
        if self.fetch.workers == 0 {
            return Err(DataError::Config("fetch.workers must be at least 1".into()));
        }
        if self.fetch.max_retries > MAX_RETRIES_LIMIT {
            return Err(DataError::Config(format!(
                "fetch.max_retries must be at most {MAX_RETRIES_LIMIT}"
            )));
        }
        if self.fetch.timeout_secs == 0 {
            return Err(DataError::Config("fetch.timeout_secs must be at least 1".into()));
        }
        Ok(())
    }

    pub fn provider_config(&self) -> ProviderConfig {
        ProviderConfig {
            timeout: Duration::from_secs(self.fetch.timeout_secs),
            max_retries: self.fetch.max_retries,
            base_delay: Duration::from_millis(self.fetch.retry_base_delay_ms),
        }
    }

    pub fn download_options(&self) -> DownloadOptions {
        DownloadOptions {
            batch_size: self.fetch.batch_size,
            workers: self.fetch.workers,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn home() -> Option<PathBuf> {
        Some(PathBuf::from("/home/trader"))
    }

    #[test]
    fn default_workspace_is_under_home() {
        let ws = Workspace::resolve(None, home()).unwrap();
        assert_eq!(ws.root(), Path::new("/home/trader/stocks_ws"));
        assert_eq!(ws.data_root(), PathBuf::from("/home/trader/stocks_ws/data"));
    }

    #[test]
    fn env_value_expands_tilde() {
        let ws = Workspace::resolve(Some("~/market".into()), home()).unwrap();
        assert_eq!(ws.root(), Path::new("/home/trader/market"));
        let ws = Workspace::resolve(Some("/srv/ws".into()), None).unwrap();
        assert_eq!(ws.root(), Path::new("/srv/ws"));
    }

    #[test]
    fn blank_env_falls_back_to_default() {
        let ws = Workspace::resolve(Some("  ".into()), home()).unwrap();
        assert_eq!(ws.root(), Path::new("/home/trader/stocks_ws"));
    }

    #[test]
    fn missing_home_is_config_error() {
        assert!(matches!(
            Workspace::resolve(None, None),
            Err(DataError::Config(_))
        ));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let s = Settings::from_toml("[fetch]\nbatch_size = 25\nworkers = 4\n").unwrap();
        assert_eq!(s.fetch.batch_size, 25);
        assert_eq!(s.fetch.workers, 4);
        assert_eq!(s.fetch.max_retries, 2);
        assert_eq!(s.provider_config().timeout, Duration::from_secs(30));
        assert_eq!(
            s.download_options(),
            DownloadOptions {
                batch_size: 25,
                workers: 4
            }
        );
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(Settings::from_toml("").unwrap(), Settings::default());
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(Settings::from_toml("[fetch]\nbatch_size = 0\n").is_err());
        assert!(Settings::from_toml("[fetch]\nworkers = 0\n").is_err());
        assert!(Settings::from_toml("[fetch]\nbatchsize = 5\n").is_err());
        assert!(Settings::from_toml("[fetch]\nmax_retries = 40\n").is_err());
        assert!(Settings::from_toml("[fetch]\nmax_retries = 10\n").is_ok());
        assert!(Settings::from_toml("fetch = [").is_err());
    }

    #[test]
    fn missing_settings_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let ws = Workspace::new(dir.path());
        assert_eq!(ws.load_settings().unwrap(), Settings::default());

        std::fs::write(ws.settings_path(), "[fetch]\nmax_retries = 0\n").unwrap();
        assert_eq!(ws.load_settings().unwrap().fetch.max_retries, 0);
    }
}
