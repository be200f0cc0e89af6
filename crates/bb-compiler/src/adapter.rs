use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use bb_core::panic_message;
use serde::Deserialize;
use serde_json::{json, Value};

/// Content blocker that blocks nothing: a single rule that drops every
/// previous rule and whose trigger matches no URL.
pub const EMPTY_BLOCKER_JSON: &str =
    r#"[{"action":{"type":"ignore-previous-rules"},"trigger":{"url-filter":"none"}}]"#;

pub fn empty_blocker() -> Vec<Value> {
    vec![json!({
        "action": { "type": "ignore-previous-rules" },
        "trigger": { "url-filter": "none" }
    })]
}

#[derive(Debug, thiserror::Error)]
pub enum ConvertError {
    #[error("Failed to start converter: {0}")]
    Spawn(std::io::Error),
    #[error("Converter I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Converter exited with {status}: {stderr}")]
    Exit { status: String, stderr: String },
    #[error("Malformed converter report: {0}")]
    Report(serde_json::Error),
    #[error("Malformed content blocker JSON: {0}")]
    Document(serde_json::Error),
    #[error("Converter produced no output")]
    NoOutput,
    #[error("Converter panicked: {0}")]
    Panicked(String),
    #[error("Converter unavailable: {0}")]
    Unavailable(String),
}

/// Raw report of one converter run.
///
/// Field names follow the JSON report written by converter executables, so
/// the struct deserializes straight from their stdout.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConversionOutput {
    pub total_converted_count: usize,
    pub converted_count: usize,
    pub errors_count: usize,
    pub over_limit: bool,
    /// Content blocker JSON array, as text
    pub converted: Option<String>,
    /// Advanced blocking JSON array, as text
    pub advanced_blocking: Option<String>,
}

/// Rule text → content blocker JSON.
pub trait RuleConverter: Send + Sync {
    /// Converts `rules` in order, emitting at most `limit` content blocker
    /// rules. With `advanced` set the advanced blocking document is
    /// produced as well.
    fn convert(&self, rules: &[String], limit: usize, advanced: bool) -> Result<ConversionOutput, ConvertError>;
}

impl<C: RuleConverter + ?Sized> RuleConverter for Arc<C> {
    fn convert(&self, rules: &[String], limit: usize, advanced: bool) -> Result<ConversionOutput, ConvertError> {
        (**self).convert(rules, limit, advanced)
    }
}

impl<C: RuleConverter + ?Sized> RuleConverter for Box<C> {
    fn convert(&self, rules: &[String], limit: usize, advanced: bool) -> Result<ConversionOutput, ConvertError> {
        (**self).convert(rules, limit, advanced)
    }
}

/// Parsed converter output for one bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledResult {
    pub converted: Vec<Value>,
    /// Input did not fit into the limit and was truncated
    pub over_limit: bool,
    /// Present only for advanced compilations
    pub advanced: Option<Vec<Value>>,
}

impl CompiledResult {
    pub fn rules_count(&self) -> usize {
        self.converted.len()
    }
}

/// Runs a converter with the rule limit applied and failures contained.
///
/// Every call is independent: a converter error, panic or unusable output
/// yields `None` for that call only.
#[derive(Clone)]
pub struct CompilerAdapter {
    converter: Arc<dyn RuleConverter>,
}

impl CompilerAdapter {
    pub fn new(converter: Arc<dyn RuleConverter>) -> Self {
        Self { converter }
    }

    pub fn compile(&self, rules: &[String], limit: usize, advanced: bool) -> Option<CompiledResult> {
        match self.try_compile(rules, limit, advanced) {
            Ok(result) => Some(result),
            Err(e) => {
                log::warn!("Unable to convert {} rules: {}", rules.len(), e);
                None
            }
        }
    }

    pub fn try_compile(&self, rules: &[String], limit: usize, advanced: bool) -> Result<CompiledResult, ConvertError> {
        let output = panic::catch_unwind(AssertUnwindSafe(|| self.converter.convert(rules, limit, advanced)))
            .map_err(|payload| ConvertError::Panicked(panic_message(payload.as_ref())))??;

        let converted = match non_blank(output.converted.as_deref()) {
            Some(text) => parse_document(text)?,
            // Advanced runs are judged by the advanced document alone.
            None if advanced => Vec::new(),
            None => return Err(ConvertError::NoOutput),
        };

        let advanced_json = if advanced {
            let text = non_blank(output.advanced_blocking.as_deref()).ok_or(ConvertError::NoOutput)?;
            Some(parse_document(text)?)
        } else {
            None
        };

        let mut converted = converted;
        let mut over_limit = output.over_limit;
        if converted.len() > limit {
            log::warn!("Converter returned {} rules, limit is {}", converted.len(), limit);
            converted.truncate(limit);
            over_limit = true;
        }

        if output.errors_count > 0 {
            log::debug!("Converter skipped {} invalid rules", output.errors_count);
        }

        Ok(CompiledResult {
            converted,
            over_limit,
            advanced: advanced_json,
        })
    }
}

fn non_blank(text: Option<&str>) -> Option<&str> {
    text.filter(|t| !t.trim().is_empty())
}

fn parse_document(text: &str) -> Result<Vec<Value>, ConvertError> {
    serde_json::from_str(text).map_err(ConvertError::Document)
}
