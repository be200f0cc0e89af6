//! One content blocker update cycle, end to end.
//!
//! load rules → group per bundle → compile each group → publish each
//! bundle → compile and publish the advanced bundle → publish the summary.
//!
//! Every step that talks to a collaborator is contained: a converter that
//! fails for one bundle only costs that bundle its rules, and a subscriber
//! that fails only loses its own event.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;

use bb_compiler::{empty_blocker, CompilerAdapter};
use bb_core::{
    deliver, CompiledBundle, Event, Group, GroupingPolicy, LoadedRules, Notifier, Rule, RuleAggregator,
    UpdateCycleResult,
};

/// Platform limit on rules per content blocker.
pub const RULES_LIMIT: usize = 50_000;

pub struct UpdatePipeline {
    aggregator: RuleAggregator,
    policy: GroupingPolicy,
    compiler: CompilerAdapter,
    notifier: Arc<dyn Notifier>,
    rules_limit: usize,
}

impl UpdatePipeline {
    pub fn new(
        aggregator: RuleAggregator,
        policy: GroupingPolicy,
        compiler: CompilerAdapter,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            aggregator,
            policy,
            compiler,
            notifier,
            rules_limit: RULES_LIMIT,
        }
    }

    /// Sets the per-bundle rule limit. A limit of zero would turn every
    /// bundle into an overflowing empty blocker, so it is raised to one.
    pub fn with_rules_limit(mut self, rules_limit: usize) -> Self {
        if rules_limit == 0 {
            log::warn!("Rules limit must be positive, using 1");
        }
        self.rules_limit = rules_limit.max(1);
        self
    }

    pub fn rules_limit(&self) -> usize {
        self.rules_limit
    }

    pub fn policy(&self) -> &GroupingPolicy {
        &self.policy
    }

    /// Runs a full cycle and returns the summary that was published.
    pub fn run_cycle(&self) -> UpdateCycleResult {
        let started = Instant::now();

        let rules = match self.aggregator.load_rules() {
            LoadedRules::Disabled => {
                let result = UpdateCycleResult::disabled();
                self.publish_cycle_summary(result);
                return result;
            }
            LoadedRules::Rules(rules) => rules,
        };

        let mut any_over_limit = false;
        for group in self.policy.group_rules(&rules) {
            let bundle = self.compile_group(&group);
            any_over_limit |= bundle.over_limit;
            self.publish_group(&group, bundle);
        }

        let advanced_rule_count = self.publish_advanced(&rules);

        let result = UpdateCycleResult {
            total_rules: rules.len(),
            any_over_limit,
            advanced_rule_count,
            filtering_disabled: false,
        };
        self.publish_cycle_summary(result);

        log::info!(
            "Content blocker updated: {} rules, overlimit={}, advanced={} ({:.1}ms)",
            result.total_rules,
            result.any_over_limit,
            result.advanced_rule_count,
            started.elapsed().as_secs_f64() * 1000.0
        );
        result
    }

    /// Compiles one group, substituting the empty blocker when there is
    /// nothing usable to ship.
    pub fn compile_group(&self, group: &Group) -> CompiledBundle {
        let bundle_id = self.bundle_id(group);

        if group.is_empty() {
            return fallback_bundle(bundle_id);
        }

        match self.compiler.compile(&group.rule_texts(), self.rules_limit, false) {
            // Safari refuses an empty rule list.
            Some(result) if !result.converted.is_empty() => CompiledBundle {
                bundle_id,
                json: result.converted,
                over_limit: result.over_limit,
            },
            // An overflow reported alongside an empty result still counts.
            Some(result) => CompiledBundle {
                over_limit: result.over_limit,
                ..fallback_bundle(bundle_id)
            },
            None => {
                log::warn!("No usable rules for {}, clearing content blocker", bundle_id);
                fallback_bundle(bundle_id)
            }
        }
    }

    /// Hands a bundle over to the subscribers. Never fails; returns `false`
    /// when the hand-off was lost.
    pub fn publish_bundle(&self, bundle_id: &str, json: Vec<Value>) -> bool {
        log::info!("Setting content blocker json for {}. Length={};", bundle_id, json.len());
        deliver(
            self.notifier.as_ref(),
            &Event::BundleUpdateRequired {
                bundle_id: bundle_id.to_string(),
                json,
            },
        )
    }

    pub fn publish_cycle_summary(&self, result: UpdateCycleResult) -> bool {
        deliver(self.notifier.as_ref(), &Event::from(result))
    }

    fn publish_group(&self, group: &Group, bundle: CompiledBundle) {
        let updated = Event::BundleUpdated {
            rules_count: group.rules.len(),
            bundle_id: bundle.bundle_id.clone(),
            overlimit: bundle.over_limit,
            origin_groups: group.origin_groups.clone(),
        };

        self.publish_bundle(&bundle.bundle_id, bundle.json);
        deliver(self.notifier.as_ref(), &updated);
    }

    /// The advanced bundle is built from the whole, ungrouped rule list.
    fn publish_advanced(&self, rules: &[Rule]) -> usize {
        let texts: Vec<String> = rules.iter().map(|rule| rule.text.clone()).collect();

        let json = match self
            .compiler
            .compile(&texts, self.rules_limit, true)
            .and_then(|result| result.advanced)
        {
            Some(json) => json,
            None => {
                log::warn!("No advanced blocking rules produced");
                Vec::new()
            }
        };

        let count = json.len();
        self.publish_bundle(self.policy.advanced_bundle_id(), json);
        count
    }

    fn bundle_id(&self, group: &Group) -> String {
        self.policy
            .bundle_id(&group.key)
            .unwrap_or(group.key.as_str())
            .to_string()
    }
}

fn fallback_bundle(bundle_id: String) -> CompiledBundle {
    CompiledBundle {
        bundle_id,
        json: empty_blocker(),
        over_limit: false,
    }
}
