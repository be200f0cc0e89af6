use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use bb_core::GroupingPolicy;
use bb_updater::{DEBOUNCE_PERIOD, RULES_LIMIT};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read '{path}': {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("Failed to parse '{path}': {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// `bb-cli` configuration file.
///
/// ```json
/// {
///   "rulesLimit": 50000,
///   "debounceMs": 500,
///   "converter": { "command": "ConverterTool", "args": [] },
///   "filters": [{ "id": 2, "path": "lists/base.txt" }],
///   "whitelist": "whitelist.txt",
///   "settings": "settings.json"
/// }
/// ```
///
/// Relative paths are resolved against the directory holding the file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_rules_limit")]
    pub rules_limit: usize,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    pub converter: ConverterConfig,
    #[serde(default)]
    pub filters: Vec<FilterListConfig>,
    #[serde(default)]
    pub whitelist: Option<PathBuf>,
    #[serde(default)]
    pub settings: Option<PathBuf>,
    /// Bundle layout; the Safari layout when absent
    #[serde(default)]
    pub grouping: Option<GroupingPolicy>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ConverterConfig {
    pub command: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub optimize: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FilterListConfig {
    pub id: u32,
    pub path: PathBuf,
}

/// Longest accepted debounce period, one hour.
const MAX_DEBOUNCE_MS: u64 = 60 * 60 * 1000;

fn default_rules_limit() -> usize {
    RULES_LIMIT
}

fn default_debounce_ms() -> u64 {
    DEBOUNCE_PERIOD.as_millis() as u64
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json(&text, base).map_err(|e| match e {
            ConfigError::Parse { source, .. } => ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            },
            other => other,
        })
    }

    pub fn from_json(text: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    pub fn grouping_policy(&self) -> GroupingPolicy {
        self.grouping.clone().unwrap_or_default()
    }

    /// Files whose changes should trigger an update.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = self.filters.iter().map(|list| list.path.clone()).collect();
        paths.extend(self.whitelist.iter().cloned());
        paths.extend(self.settings.iter().cloned());
        paths
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };

        for list in &mut self.filters {
            resolve(&mut list.path);
        }
        if let Some(path) = self.whitelist.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.settings.as_mut() {
            resolve(path);
        }
        // Bare command names are looked up on PATH.
        if self.converter.command.components().count() > 1 {
            resolve(&mut self.converter.command);
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.rules_limit == 0 {
            return Err(ConfigError::Invalid("rulesLimit must be positive".to_string()));
        }
        if self.debounce_ms > MAX_DEBOUNCE_MS {
            return Err(ConfigError::Invalid(format!(
                "debounceMs must be at most {}",
                MAX_DEBOUNCE_MS
            )));
        }

        let mut ids = HashSet::new();
        for list in &self.filters {
            if !ids.insert(list.id) {
                return Err(ConfigError::Invalid(format!("duplicate filter id {}", list.id)));
            }
        }
        Ok(())
    }
}
