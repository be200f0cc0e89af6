//! Grouping/Bundling Engine
//!
//! Splits the aggregated rules into one group per content blocker bundle.
//! Each platform content blocker carries its own rule limit, so spreading
//! filters over several bundles raises the total number of rules that can
//! be active at once.
//!
//! Rules are routed by their source filter: filter id → filter-group id →
//! bundle. Anything that does not resolve lands in the policy's default
//! bundle. Every bundle yields a group on every cycle, even an empty one,
//! so its consumer gets cleared instead of keeping stale rules.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::error::PolicyError;
use crate::types::{Group, Rule};

// =============================================================================
// Well-known filter groups
// =============================================================================

pub const GROUP_CUSTOM: u32 = 0;
pub const GROUP_AD_BLOCKING: u32 = 1;
pub const GROUP_PRIVACY: u32 = 2;
pub const GROUP_SOCIAL: u32 = 3;
pub const GROUP_ANNOYANCES: u32 = 4;
pub const GROUP_SECURITY: u32 = 5;
pub const GROUP_OTHER: u32 = 6;
pub const GROUP_LANGUAGE_SPECIFIC: u32 = 7;

/// One content blocker and the filter groups it serves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BundleSpec {
    pub key: String,
    pub bundle_id: String,
    #[serde(default)]
    pub groups: Vec<u32>,
}

impl BundleSpec {
    pub fn new(key: &str, bundle_id: &str, groups: &[u32]) -> Self {
        Self {
            key: key.to_string(),
            bundle_id: bundle_id.to_string(),
            groups: groups.to_vec(),
        }
    }
}

/// Serialized form of a [`GroupingPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyConfig {
    /// filter id → filter-group id
    #[serde(default)]
    pub filter_groups: BTreeMap<u32, u32>,
    pub bundles: Vec<BundleSpec>,
    pub default_key: String,
    pub advanced_bundle_id: String,
}

/// Validated mapping from filters to bundles.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "PolicyConfig")]
pub struct GroupingPolicy {
    filter_groups: BTreeMap<u32, u32>,
    bundles: Vec<BundleSpec>,
    advanced_bundle_id: String,
    /// filter-group id → index into `bundles`
    group_slots: HashMap<u32, usize>,
    default_slot: usize,
}

impl GroupingPolicy {
    pub fn new(config: PolicyConfig) -> Result<Self, PolicyError> {
        let mut group_slots = HashMap::new();
        let mut keys: HashMap<&str, usize> = HashMap::new();

        for (slot, bundle) in config.bundles.iter().enumerate() {
            if keys.insert(bundle.key.as_str(), slot).is_some() {
                return Err(PolicyError::DuplicateKey(bundle.key.clone()));
            }
            for &group in &bundle.groups {
                if let Some(previous) = group_slots.insert(group, slot) {
                    return Err(PolicyError::GroupAssignedTwice {
                        group,
                        first: config.bundles[previous].key.clone(),
                        second: bundle.key.clone(),
                    });
                }
            }
        }

        let default_slot = *keys
            .get(config.default_key.as_str())
            .ok_or_else(|| PolicyError::UnknownDefault(config.default_key.clone()))?;

        Ok(Self {
            filter_groups: config.filter_groups,
            bundles: config.bundles,
            advanced_bundle_id: config.advanced_bundle_id,
            group_slots,
            default_slot,
        })
    }

    /// Bundle layout of the Safari app: six content blockers plus the
    /// advanced blocking extension.
    pub fn safari_default() -> Self {
        let config = PolicyConfig {
            filter_groups: default_filter_groups(),
            bundles: vec![
                BundleSpec::new(
                    "general",
                    "com.betterblocker.safari.BlockerExtension",
                    &[GROUP_AD_BLOCKING, GROUP_LANGUAGE_SPECIFIC],
                ),
                BundleSpec::new("privacy", "com.betterblocker.safari.BlockerPrivacy", &[GROUP_PRIVACY]),
                BundleSpec::new(
                    "socialWidgetsAndAnnoyances",
                    "com.betterblocker.safari.BlockerSocial",
                    &[GROUP_SOCIAL, GROUP_ANNOYANCES],
                ),
                BundleSpec::new("security", "com.betterblocker.safari.BlockerSecurity", &[GROUP_SECURITY]),
                BundleSpec::new("other", "com.betterblocker.safari.BlockerOther", &[GROUP_OTHER]),
                BundleSpec::new("custom", "com.betterblocker.safari.BlockerCustom", &[GROUP_CUSTOM]),
            ],
            default_key: "custom".to_string(),
            advanced_bundle_id: "com.betterblocker.safari.AdvancedBlocking".to_string(),
        };

        match Self::new(config) {
            Ok(policy) => policy,
            Err(e) => unreachable!("built-in grouping policy is invalid: {e}"),
        }
    }

    pub fn bundles(&self) -> &[BundleSpec] {
        &self.bundles
    }

    pub fn bundle_id(&self, key: &str) -> Option<&str> {
        self.bundles
            .iter()
            .find(|bundle| bundle.key == key)
            .map(|bundle| bundle.bundle_id.as_str())
    }

    pub fn default_key(&self) -> &str {
        &self.bundles[self.default_slot].key
    }

    pub fn advanced_bundle_id(&self) -> &str {
        &self.advanced_bundle_id
    }

    pub fn filter_group(&self, source_id: u32) -> Option<u32> {
        self.filter_groups.get(&source_id).copied()
    }

    /// Partitions `rules` into one group per bundle, in bundle order.
    ///
    /// Rules keep their relative order inside a group and every input rule
    /// appears in exactly one group.
    pub fn group_rules(&self, rules: &[Rule]) -> Vec<Group> {
        let mut groups: Vec<Group> = self.bundles.iter().map(|bundle| Group::new(&bundle.key)).collect();

        for rule in rules {
            let filter_group = self.filter_group(rule.source_id);
            let slot = filter_group
                .and_then(|group| self.group_slots.get(&group).copied())
                .unwrap_or(self.default_slot);

            let group = &mut groups[slot];
            if let Some(id) = filter_group {
                group.origin_groups.insert(id);
            }
            group.rules.push(rule.clone());
        }

        groups
    }
}

impl TryFrom<PolicyConfig> for GroupingPolicy {
    type Error = PolicyError;

    fn try_from(config: PolicyConfig) -> Result<Self, Self::Error> {
        Self::new(config)
    }
}

impl Default for GroupingPolicy {
    fn default() -> Self {
        Self::safari_default()
    }
}

fn default_filter_groups() -> BTreeMap<u32, u32> {
    // User filter and whitelist rules carry filter id 0.
    let table: &[(u32, u32)] = &[
        (0, GROUP_CUSTOM),
        (2, GROUP_AD_BLOCKING),
        (10, GROUP_AD_BLOCKING),
        (11, GROUP_AD_BLOCKING),
        (101, GROUP_AD_BLOCKING),
        (3, GROUP_PRIVACY),
        (17, GROUP_PRIVACY),
        (118, GROUP_PRIVACY),
        (4, GROUP_SOCIAL),
        (14, GROUP_ANNOYANCES),
        (18, GROUP_ANNOYANCES),
        (19, GROUP_ANNOYANCES),
        (20, GROUP_ANNOYANCES),
        (21, GROUP_ANNOYANCES),
        (22, GROUP_ANNOYANCES),
        (1, GROUP_LANGUAGE_SPECIFIC),
        (6, GROUP_LANGUAGE_SPECIFIC),
        (7, GROUP_LANGUAGE_SPECIFIC),
        (8, GROUP_LANGUAGE_SPECIFIC),
        (9, GROUP_LANGUAGE_SPECIFIC),
        (13, GROUP_LANGUAGE_SPECIFIC),
        (16, GROUP_LANGUAGE_SPECIFIC),
    ];
    table.iter().copied().collect()
}
