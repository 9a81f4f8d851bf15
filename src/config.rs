use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::error::OrganizerError;
use crate::ledger::DEFAULT_LEDGER_FILE;

pub const DEFAULT_CONFIG_FILE: &str = "acq-org.json";
pub const DEFAULT_BASE_PATH: &str = "data";
pub const DEFAULT_LOG_DIR: &str = "logs";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub base_path: Option<String>,
    #[serde(default)]
    pub ledger_file: Option<String>,
    #[serde(default)]
    pub record_without_source: Option<bool>,
    #[serde(default)]
    pub log_dir: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedConfig {
    pub base_path: Utf8PathBuf,
    pub ledger_file: String,
    pub record_without_source: bool,
    pub log_dir: Utf8PathBuf,
}

impl ResolvedConfig {
    pub fn ledger_path(&self) -> Utf8PathBuf {
        self.base_path.join(&self.ledger_file)
    }
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        Self {
            base_path: Utf8PathBuf::from(DEFAULT_BASE_PATH),
            ledger_file: DEFAULT_LEDGER_FILE.to_string(),
            record_without_source: true,
            log_dir: Utf8PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

/// Values supplied on the command line; each one beats the config file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub base_path: Option<String>,
    pub log_dir: Option<String>,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads `path`, or `acq-org.json` in the working directory if present.
    ///
    /// Without an explicit path a missing file just means defaults.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, OrganizerError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| OrganizerError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| OrganizerError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, OrganizerError> {
        let base_path = config
            .base_path
            .unwrap_or_else(|| DEFAULT_BASE_PATH.to_string());
        if base_path.trim().is_empty() {
            return Err(OrganizerError::ConfigParse(
                "base_path must not be empty".to_string(),
            ));
        }

        let ledger_file = config
            .ledger_file
            .unwrap_or_else(|| DEFAULT_LEDGER_FILE.to_string());
        let is_file_name = !ledger_file.trim().is_empty()
            && !ledger_file.contains(['/', '\\'])
            && ledger_file != "."
            && ledger_file != "..";
        if !is_file_name {
            return Err(OrganizerError::ConfigParse(format!(
                "ledger_file must be a plain file name: {ledger_file:?}"
            )));
        }

        Ok(ResolvedConfig {
            base_path: Utf8PathBuf::from(base_path),
            ledger_file,
            record_without_source: config.record_without_source.unwrap_or(true),
            log_dir: Utf8PathBuf::from(
                config
                    .log_dir
                    .unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()),
            ),
        })
    }

    pub fn apply_overrides(mut resolved: ResolvedConfig, overrides: ConfigOverrides) -> ResolvedConfig {
        if let Some(base_path) = overrides.base_path {
            resolved.base_path = Utf8PathBuf::from(base_path);
        }
        if let Some(log_dir) = overrides.log_dir {
            resolved.log_dir = Utf8PathBuf::from(log_dir);
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let resolved = ConfigLoader::resolve_config(Config::default()).unwrap();
        assert_eq!(resolved.base_path, Utf8PathBuf::from("data"));
        assert_eq!(resolved.ledger_path(), Utf8PathBuf::from("data/metadata.csv"));
        assert!(resolved.record_without_source);
        assert_eq!(resolved, ResolvedConfig::default());
    }
}
