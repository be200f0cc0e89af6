//! Read-only accessors for the collaborators that own the raw inputs.
//!
//! The filter storage, whitelist and settings subsystems live outside this
//! crate. All accessors are synchronous and return fresh copies; the update
//! pipeline calls them once per cycle.

use std::sync::RwLock;

use crate::types::{ModeFlags, Rule};

/// Filter-list storage.
pub trait AntibannerSource: Send + Sync {
    /// Enabled filter rules, in the order the filters should be applied.
    fn rules(&self) -> Vec<Rule>;
}

/// Whitelist / exception storage.
pub trait WhitelistSource: Send + Sync {
    /// Ready-made whitelist rules, used in default whitelist mode.
    fn rules(&self) -> Vec<String>;
    /// Whitelisted domains, used to build the inverted whitelist rule.
    fn domains(&self) -> Vec<String>;
}

/// User settings store.
pub trait SettingsSource: Send + Sync {
    fn is_filtering_disabled(&self) -> bool;
    fn is_default_whitelist_mode(&self) -> bool;

    fn mode_flags(&self) -> ModeFlags {
        ModeFlags::from_settings(self.is_filtering_disabled(), self.is_default_whitelist_mode())
    }
}

/// In-memory implementation of all three sources.
///
/// Handy for embedding and tests; every setter replaces the stored value and
/// the next cycle sees it.
#[derive(Debug, Default)]
pub struct StaticSources {
    state: RwLock<StaticState>,
}

#[derive(Debug, Clone)]
struct StaticState {
    rules: Vec<Rule>,
    whitelist_rules: Vec<String>,
    whitelist_domains: Vec<String>,
    mode: ModeFlags,
}

impl Default for StaticState {
    fn default() -> Self {
        Self {
            rules: Vec::new(),
            whitelist_rules: Vec::new(),
            whitelist_domains: Vec::new(),
            mode: ModeFlags::DEFAULT_WHITELIST_MODE,
        }
    }
}

impl StaticSources {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_rules(&self, rules: Vec<Rule>) {
        self.write(|state| state.rules = rules);
    }

    pub fn set_whitelist_rules(&self, rules: Vec<String>) {
        self.write(|state| state.whitelist_rules = rules);
    }

    pub fn set_whitelist_domains(&self, domains: Vec<String>) {
        self.write(|state| state.whitelist_domains = domains);
    }

    pub fn set_mode(&self, mode: ModeFlags) {
        self.write(|state| state.mode = mode);
    }

    fn write(&self, f: impl FnOnce(&mut StaticState)) {
        let mut state = self.state.write().unwrap_or_else(|e| e.into_inner());
        f(&mut state);
    }

    fn read<T>(&self, f: impl FnOnce(&StaticState) -> T) -> T {
        let state = self.state.read().unwrap_or_else(|e| e.into_inner());
        f(&state)
    }
}

impl AntibannerSource for StaticSources {
    fn rules(&self) -> Vec<Rule> {
        self.read(|state| state.rules.clone())
    }
}

impl WhitelistSource for StaticSources {
    fn rules(&self) -> Vec<String> {
        self.read(|state| state.whitelist_rules.clone())
    }

    fn domains(&self) -> Vec<String> {
        self.read(|state| state.whitelist_domains.clone())
    }
}

impl SettingsSource for StaticSources {
    fn is_filtering_disabled(&self) -> bool {
        self.read(|state| state.mode.filtering_disabled())
    }

    fn is_default_whitelist_mode(&self) -> bool {
        self.read(|state| state.mode.default_whitelist_mode())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_sources_default_to_enabled_whitelist_mode() {
        let sources = StaticSources::new();
        assert!(!sources.is_filtering_disabled());
        assert!(sources.is_default_whitelist_mode());
        assert!(AntibannerSource::rules(&sources).is_empty());
    }

    #[test]
    fn setters_replace_state() {
        let sources = StaticSources::new();
        sources.set_rules(vec![Rule::new(1, "||ads.example^")]);
        sources.set_whitelist_domains(vec!["a.com".to_string()]);
        sources.set_mode(ModeFlags::FILTERING_DISABLED);

        assert_eq!(AntibannerSource::rules(&sources).len(), 1);
        assert_eq!(sources.domains(), vec!["a.com".to_string()]);
        assert_eq!(sources.mode_flags(), ModeFlags::FILTERING_DISABLED);
    }
}
