//! Core type definitions for BetterBlocker content blocker updates
//!
//! Everything here is rebuilt from scratch on every update cycle. Only the
//! mode flags and the raw rule sources outlive a cycle, and those belong to
//! the collaborators behind [`crate::sources`].

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

// =============================================================================
// Rules
// =============================================================================

/// Source id used for synthetic and whitelist-origin rules.
pub const SYNTHETIC_SOURCE_ID: u32 = 0;

/// A single filter rule as read from one of the rule sources.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Rule {
    /// Filter list the rule came from (0 for synthetic/whitelist rules)
    pub source_id: u32,
    /// Raw rule text, opaque to the update pipeline
    pub text: String,
}

impl Rule {
    pub fn new(source_id: u32, text: impl Into<String>) -> Self {
        Self {
            source_id,
            text: text.into(),
        }
    }

    /// Rule produced by the whitelist or by the pipeline itself.
    pub fn synthetic(text: impl Into<String>) -> Self {
        Self::new(SYNTHETIC_SOURCE_ID, text)
    }

    pub fn is_synthetic(&self) -> bool {
        self.source_id == SYNTHETIC_SOURCE_ID
    }
}

// =============================================================================
// Groups and bundles
// =============================================================================

/// A partition of the aggregated rules assigned to one bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Group {
    /// Bundle key from the grouping policy ("general", "privacy", ...)
    pub key: String,
    /// Rules in aggregation order
    pub rules: Vec<Rule>,
    /// Filter-group ids whose rules ended up in this group
    pub origin_groups: BTreeSet<u32>,
}

impl Group {
    pub fn new(key: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            rules: Vec::new(),
            origin_groups: BTreeSet::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn rule_texts(&self) -> Vec<String> {
        self.rules.iter().map(|rule| rule.text.clone()).collect()
    }
}

/// One compiled artifact addressed to a single content blocker.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledBundle {
    pub bundle_id: String,
    /// Compiled rule objects in the order the consumer applies them
    pub json: Vec<Value>,
    pub over_limit: bool,
}

// =============================================================================
// Cycle summary
// =============================================================================

/// Summary of one full update cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCycleResult {
    /// Number of aggregated rules fed into the cycle
    pub total_rules: usize,
    /// At least one grouped bundle was truncated to the rule limit
    pub any_over_limit: bool,
    /// Number of compiled objects in the advanced blocking bundle
    pub advanced_rule_count: usize,
    /// Cycle short-circuited because filtering is turned off
    pub filtering_disabled: bool,
}

impl UpdateCycleResult {
    /// Summary of a cycle that stopped at the disabled signal.
    pub fn disabled() -> Self {
        Self {
            filtering_disabled: true,
            ..Self::default()
        }
    }
}

// =============================================================================
// Mode flags
// =============================================================================

bitflags::bitflags! {
    /// Settings that shape rule aggregation, read once per cycle.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ModeFlags: u8 {
        /// Filtering is switched off; no bundles are rebuilt
        const FILTERING_DISABLED = 1 << 0;
        /// Whitelist lists allowed sites (allow by default) instead of
        /// the inverted "block by default, exempt listed" mode
        const DEFAULT_WHITELIST_MODE = 1 << 1;
    }
}

impl ModeFlags {
    pub fn from_settings(filtering_disabled: bool, default_whitelist_mode: bool) -> Self {
        let mut flags = Self::empty();
        flags.set(Self::FILTERING_DISABLED, filtering_disabled);
        flags.set(Self::DEFAULT_WHITELIST_MODE, default_whitelist_mode);
        flags
    }

    pub fn filtering_disabled(self) -> bool {
        self.contains(Self::FILTERING_DISABLED)
    }

    pub fn default_whitelist_mode(self) -> bool {
        self.contains(Self::DEFAULT_WHITELIST_MODE)
    }
}
