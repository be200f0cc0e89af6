//! BetterBlocker content blocker updater
//!
//! Ties the pieces together: a [`DebouncedTrigger`] coalesces change
//! notifications and runs one [`UpdatePipeline`] cycle at a time, which
//! aggregates, groups, compiles and publishes every content blocker bundle.

pub mod pipeline;
pub mod trigger;

pub use pipeline::{UpdatePipeline, RULES_LIMIT};
pub use trigger::{CycleRunner, DebounceState, DebouncedTrigger, Debouncer, Poll, DEBOUNCE_PERIOD};
