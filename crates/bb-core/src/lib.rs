//! BetterBlocker Core Library
//!
//! This crate holds the synchronous half of the content blocker update
//! pipeline: the data model, the collaborator interfaces, rule aggregation,
//! bundling and event distribution.
//!
//! # Architecture
//!
//! Every update cycle loads the current rules from the filter storage and the
//! whitelist, splits them into one group per platform content blocker and
//! hands each compiled group to the subscribers of a [`Notifier`]. Nothing
//! survives from one cycle to the next; the collaborators behind
//! [`sources`] own all long-lived state.
//!
//! # Modules
//!
//! - `types`: Rules, groups, bundles, cycle summary and mode flags
//! - `events`: Events emitted towards transports and UI
//! - `sources`: Read-only collaborator traits and an in-memory implementation
//! - `aggregator`: Rule Source Aggregator (whitelist strategies)
//! - `grouping`: Grouping/Bundling Engine
//! - `notifier`: Event delivery, fan-out and recording
//! - `error`: Shared error types

pub mod aggregator;
pub mod error;
pub mod events;
pub mod grouping;
pub mod notifier;
pub mod sources;
pub mod types;

// Re-export commonly used types
pub use aggregator::{inverted_whitelist_rule, LoadedRules, RuleAggregator};
pub use error::{panic_message, DistributionError, PolicyError};
pub use events::Event;
pub use grouping::{BundleSpec, GroupingPolicy, PolicyConfig};
pub use notifier::{deliver, Broadcast, Notifier, RecordingNotifier};
pub use sources::{AntibannerSource, SettingsSource, StaticSources, WhitelistSource};
pub use types::{CompiledBundle, Group, ModeFlags, Rule, UpdateCycleResult};
