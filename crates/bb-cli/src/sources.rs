//! File-backed collaborators for the update pipeline.
//!
//! Every accessor re-reads its file, so edits are picked up by the next
//! cycle. Unreadable files are logged and treated as empty: the pipeline
//! accessors have no error channel.

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use bb_core::{AntibannerSource, ModeFlags, Rule, SettingsSource, WhitelistSource};

use crate::config::FilterListConfig;

pub struct FileAntibanner {
    lists: Vec<FilterListConfig>,
}

impl FileAntibanner {
    pub fn new(lists: Vec<FilterListConfig>) -> Self {
        Self { lists }
    }
}

impl AntibannerSource for FileAntibanner {
    fn rules(&self) -> Vec<Rule> {
        let mut rules = Vec::new();
        for list in &self.lists {
            let Some(content) = read_optional(&list.path) else {
                continue;
            };
            let before = rules.len();
            rules.extend(list_lines(&content).map(|line| Rule::new(list.id, line)));
            log::debug!("Filter {} ({}): {} rules", list.id, list.path.display(), rules.len() - before);
        }
        rules
    }
}

/// One whitelisted domain per line.
pub struct FileWhitelist {
    path: Option<PathBuf>,
}

impl FileWhitelist {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl WhitelistSource for FileWhitelist {
    fn rules(&self) -> Vec<String> {
        self.domains()
            .into_iter()
            .map(|domain| format!("@@||{}^$document", domain))
            .collect()
    }

    fn domains(&self) -> Vec<String> {
        self.path
            .as_deref()
            .and_then(read_optional)
            .map(|content| list_lines(&content).map(str::to_string).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SettingsFile {
    pub filtering_disabled: bool,
    pub default_whitelist_mode: bool,
}

impl Default for SettingsFile {
    fn default() -> Self {
        Self {
            filtering_disabled: false,
            default_whitelist_mode: true,
        }
    }
}

/// JSON settings file; defaults when absent or unreadable.
pub struct FileSettings {
    path: Option<PathBuf>,
}

impl FileSettings {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    pub fn load(&self) -> SettingsFile {
        let Some(content) = self.path.as_deref().and_then(read_optional) else {
            return SettingsFile::default();
        };

        match serde_json::from_str(&content) {
            Ok(settings) => settings,
            Err(e) => {
                log::warn!("Ignoring malformed settings file: {}", e);
                SettingsFile::default()
            }
        }
    }
}

impl SettingsSource for FileSettings {
    fn is_filtering_disabled(&self) -> bool {
        self.load().filtering_disabled
    }

    fn is_default_whitelist_mode(&self) -> bool {
        self.load().default_whitelist_mode
    }

    fn mode_flags(&self) -> ModeFlags {
        let settings = self.load();
        ModeFlags::from_settings(settings.filtering_disabled, settings.default_whitelist_mode)
    }
}

fn read_optional(path: &Path) -> Option<String> {
    match fs::read_to_string(path) {
        Ok(content) => Some(content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            log::debug!("'{}' does not exist", path.display());
            None
        }
        Err(e) => {
            log::warn!("Failed to read '{}': {}", path.display(), e);
            None
        }
    }
}

/// Non-empty lines, without `!` comments and `[Adblock Plus]` style headers.
fn list_lines(content: &str) -> impl Iterator<Item = &str> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('!') && !line.starts_with('['))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::{NamedTempFile, TempDir};

    use super::*;

    fn file_with(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn reads_filter_lists_in_order_with_ids() {
        let base = file_with("[Adblock Plus 2.0]\n! Title: Base\n||ads.example^\n\n  ||banner.example^  \n");
        let privacy = file_with("||tracker.example^\n");

        let source = FileAntibanner::new(vec![
            FilterListConfig { id: 2, path: base.path().to_path_buf() },
            FilterListConfig { id: 3, path: privacy.path().to_path_buf() },
            FilterListConfig { id: 4, path: PathBuf::from("/nonexistent/list.txt") },
        ]);

        assert_eq!(
            source.rules(),
            vec![
                Rule::new(2, "||ads.example^"),
                Rule::new(2, "||banner.example^"),
                Rule::new(3, "||tracker.example^"),
            ]
        );
    }

    #[test]
    fn whitelist_turns_domains_into_rules() {
        let list = file_with("a.com\n! comment\nb.com\n");
        let source = FileWhitelist::new(Some(list.path().to_path_buf()));

        assert_eq!(source.domains(), vec!["a.com", "b.com"]);
        assert_eq!(
            WhitelistSource::rules(&source),
            vec!["@@||a.com^$document", "@@||b.com^$document"]
        );
        assert!(FileWhitelist::new(None).domains().is_empty());
    }

    #[test]
    fn settings_default_when_missing_or_malformed() {
        let dir = TempDir::new().unwrap();
        let missing = FileSettings::new(Some(dir.path().join("settings.json")));
        assert_eq!(missing.load(), SettingsFile::default());
        assert_eq!(missing.mode_flags(), ModeFlags::DEFAULT_WHITELIST_MODE);

        let broken = file_with("{ nope");
        assert_eq!(FileSettings::new(Some(broken.path().to_path_buf())).load(), SettingsFile::default());
    }

    #[test]
    fn settings_are_reread_every_time() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.json");
        let settings = FileSettings::new(Some(path.clone()));

        fs::write(&path, r#"{"filteringDisabled": true}"#).unwrap();
        assert!(settings.is_filtering_disabled());
        assert!(settings.is_default_whitelist_mode());

        fs::write(&path, r#"{"filteringDisabled": false, "defaultWhitelistMode": false}"#).unwrap();
        assert_eq!(settings.mode_flags(), ModeFlags::empty());
    }
}
