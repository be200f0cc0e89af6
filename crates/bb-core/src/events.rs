//! Events emitted by the update pipeline.
//!
//! Transport and UI layers subscribe to these through a
//! [`Notifier`](crate::notifier::Notifier). On the wire every event is a JSON
//! object tagged with `type` and camelCase fields, e.g.
//!
//! ```json
//! {"type":"BUNDLE_UPDATED","rulesCount":12,"bundleId":"...","overlimit":false,"originGroups":[1,7]}
//! ```

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::UpdateCycleResult;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS))]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Event {
    /// A content blocker must be reloaded with `json`.
    #[serde(rename_all = "camelCase")]
    BundleUpdateRequired { bundle_id: String, json: Vec<Value> },

    /// A grouped bundle went through compilation.
    #[serde(rename_all = "camelCase")]
    BundleUpdated {
        rules_count: usize,
        bundle_id: String,
        overlimit: bool,
        origin_groups: BTreeSet<u32>,
    },

    /// One update cycle finished.
    #[serde(rename_all = "camelCase")]
    CycleComplete {
        rules_count: usize,
        rules_over_limit: bool,
        advanced_rule_count: usize,
        filtering_disabled: bool,
    },
}

impl Event {
    pub fn name(&self) -> &'static str {
        match self {
            Event::BundleUpdateRequired { .. } => "BUNDLE_UPDATE_REQUIRED",
            Event::BundleUpdated { .. } => "BUNDLE_UPDATED",
            Event::CycleComplete { .. } => "CYCLE_COMPLETE",
        }
    }

    pub fn bundle_id(&self) -> Option<&str> {
        match self {
            Event::BundleUpdateRequired { bundle_id, .. } | Event::BundleUpdated { bundle_id, .. } => {
                Some(bundle_id)
            }
            Event::CycleComplete { .. } => None,
        }
    }
}

impl From<UpdateCycleResult> for Event {
    fn from(result: UpdateCycleResult) -> Self {
        Event::CycleComplete {
            rules_count: result.total_rules,
            rules_over_limit: result.any_over_limit,
            advanced_rule_count: result.advanced_rule_count,
            filtering_disabled: result.filtering_disabled,
        }
    }
}
