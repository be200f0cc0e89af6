//! BetterBlocker Rule Compiler Adapter
//!
//! Turns rule text into platform content blocker JSON through a pluggable
//! [`RuleConverter`]. The converter itself is external; this crate bounds its
//! output by the rule limit, isolates its failures and provides the
//! empty-blocker fallback document.

pub mod adapter;
pub mod external;

pub use adapter::{
    empty_blocker, CompiledResult, CompilerAdapter, ConversionOutput, ConvertError, RuleConverter,
    EMPTY_BLOCKER_JSON,
};
pub use external::ExternalConverter;
