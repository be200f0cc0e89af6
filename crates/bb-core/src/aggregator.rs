//! Rule Source Aggregator
//!
//! Merges the filter rules with whichever whitelist strategy is active into
//! the single ordered list the rest of the cycle works on. Antibanner rules
//! always come first: downstream truncation keeps the earliest rules.

use std::sync::Arc;

use crate::sources::{AntibannerSource, SettingsSource, WhitelistSource};
use crate::types::{ModeFlags, Rule};

/// Exemption rule used when the whitelist runs in inverted mode.
pub const INVERTED_WHITELIST_BASE: &str = "@@||*$document";

/// Outcome of loading the rules for one cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadedRules {
    /// Filtering is switched off. Not the same thing as zero rules.
    Disabled,
    Rules(Vec<Rule>),
}

impl LoadedRules {
    pub fn is_disabled(&self) -> bool {
        matches!(self, LoadedRules::Disabled)
    }

    pub fn into_rules(self) -> Option<Vec<Rule>> {
        match self {
            LoadedRules::Disabled => None,
            LoadedRules::Rules(rules) => Some(rules),
        }
    }
}

pub struct RuleAggregator {
    antibanner: Arc<dyn AntibannerSource>,
    whitelist: Arc<dyn WhitelistSource>,
    settings: Arc<dyn SettingsSource>,
}

impl RuleAggregator {
    pub fn new(
        antibanner: Arc<dyn AntibannerSource>,
        whitelist: Arc<dyn WhitelistSource>,
        settings: Arc<dyn SettingsSource>,
    ) -> Self {
        Self {
            antibanner,
            whitelist,
            settings,
        }
    }

    pub fn load_rules(&self) -> LoadedRules {
        let mode = self.settings.mode_flags();
        if mode.filtering_disabled() {
            log::info!("Disabling content blocker.");
            return LoadedRules::Disabled;
        }

        log::info!("Loading content blocker.");

        let mut rules = self.antibanner.rules();
        log::info!("Rules loaded: {}", rules.len());

        append_whitelist(&mut rules, mode, self.whitelist.as_ref());
        LoadedRules::Rules(rules)
    }
}

fn append_whitelist(rules: &mut Vec<Rule>, mode: ModeFlags, whitelist: &dyn WhitelistSource) {
    if mode.default_whitelist_mode() {
        rules.extend(whitelist.rules().into_iter().map(Rule::synthetic));
    } else {
        let domains = whitelist.domains();
        rules.push(Rule::synthetic(inverted_whitelist_rule(&domains)));
    }
}

/// Builds `@@||*$document,domain=~a.com|~b.com` from the whitelisted
/// domains, keeping their order. Without domains the bare base rule is
/// returned.
pub fn inverted_whitelist_rule<S: AsRef<str>>(domains: &[S]) -> String {
    let mut rule = String::from(INVERTED_WHITELIST_BASE);
    if domains.is_empty() {
        return rule;
    }

    rule.push_str(",domain=");
    for (i, domain) in domains.iter().enumerate() {
        if i > 0 {
            rule.push('|');
        }
        rule.push('~');
        rule.push_str(domain.as_ref());
    }
    rule
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::StaticSources;

    fn aggregator(sources: &Arc<StaticSources>) -> RuleAggregator {
        RuleAggregator::new(sources.clone(), sources.clone(), sources.clone())
    }

    fn sources_with_rules() -> Arc<StaticSources> {
        let sources = Arc::new(StaticSources::new());
        sources.set_rules(vec![Rule::new(1, "||ads.example^"), Rule::new(2, "||tracker.example^")]);
        sources.set_whitelist_rules(vec!["r1".to_string(), "r2".to_string()]);
        sources.set_whitelist_domains(vec!["a.com".to_string(), "b.com".to_string()]);
        sources
    }

    fn texts(rules: &[Rule]) -> Vec<&str> {
        rules.iter().map(|rule| rule.text.as_str()).collect()
    }

    #[test]
    fn disabled_filtering_is_not_an_empty_list() {
        let sources = sources_with_rules();
        sources.set_mode(ModeFlags::FILTERING_DISABLED | ModeFlags::DEFAULT_WHITELIST_MODE);

        let loaded = aggregator(&sources).load_rules();
        assert!(loaded.is_disabled());
        assert_eq!(loaded.into_rules(), None);
    }

    #[test]
    fn default_mode_appends_whitelist_rules_after_filters() {
        let sources = sources_with_rules();
        sources.set_mode(ModeFlags::DEFAULT_WHITELIST_MODE);

        let rules = aggregator(&sources).load_rules().into_rules().unwrap();
        assert_eq!(texts(&rules), vec!["||ads.example^", "||tracker.example^", "r1", "r2"]);
        assert!(rules[2].is_synthetic());
        assert!(rules[3].is_synthetic());
        assert!(!rules.iter().any(|rule| rule.text.starts_with(INVERTED_WHITELIST_BASE)));
    }

    #[test]
    fn inverted_mode_appends_single_rule() {
        let sources = sources_with_rules();
        sources.set_mode(ModeFlags::empty());

        let rules = aggregator(&sources).load_rules().into_rules().unwrap();
        assert_eq!(rules.len(), 3);
        assert_eq!(rules[2], Rule::synthetic("@@||*$document,domain=~a.com|~b.com"));
        assert!(!rules.iter().any(|rule| rule.text == "r1" || rule.text == "r2"));
    }

    #[test]
    fn inverted_mode_without_domains_keeps_base_rule() {
        let sources = sources_with_rules();
        sources.set_whitelist_domains(Vec::new());
        sources.set_mode(ModeFlags::empty());

        let rules = aggregator(&sources).load_rules().into_rules().unwrap();
        assert_eq!(rules.last().unwrap().text, "@@||*$document");
    }

    #[test]
    fn zero_filter_rules_still_load() {
        let sources = Arc::new(StaticSources::new());
        let loaded = aggregator(&sources).load_rules();
        assert_eq!(loaded, LoadedRules::Rules(Vec::new()));
    }

    #[test]
    fn inverted_rule_preserves_domain_order() {
        assert_eq!(inverted_whitelist_rule::<&str>(&[]), "@@||*$document");
        assert_eq!(inverted_whitelist_rule(&["z.org"]), "@@||*$document,domain=~z.org");
        assert_eq!(
            inverted_whitelist_rule(&["b.com", "a.com", "c.net"]),
            "@@||*$document,domain=~b.com|~a.com|~c.net"
        );
    }
}
