//! Execution context and process-level defaults.
//!
//! The context is a configuration bag handed to every compile or evaluate
//! call. Each recognized key resolves in two tiers: the explicit field on
//! the context if present, else a process-level default taken from an
//! environment variable under the `RUSTSCRIPT_` prefix.

use crate::loader::UnitLoader;
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::Arc;

/// Prefix for all process-level default environment variables.
pub const ENV_PREFIX: &str = "RUSTSCRIPT_";

/// Process default for the classpath: `RUSTSCRIPT_CLASSPATH`.
pub const ENV_CLASSPATH: &str = "RUSTSCRIPT_CLASSPATH";

/// Process default for the sourcepath: `RUSTSCRIPT_SOURCEPATH`.
pub const ENV_SOURCEPATH: &str = "RUSTSCRIPT_SOURCEPATH";

/// Process default for the entry-unit override: `RUSTSCRIPT_MAIN_UNIT`.
pub const ENV_MAIN_UNIT: &str = "RUSTSCRIPT_MAIN_UNIT";

/// Override for the compiler executable: `RUSTSCRIPT_RUSTC`.
pub const ENV_RUSTC: &str = "RUSTSCRIPT_RUSTC";

/// Placeholder source name used when a display name is needed for source
/// that arrived without one. Compile calls use generated anonymous names
/// instead, so that every anonymous compilation gets a distinct unit name.
pub const DEFAULT_SOURCE_NAME: &str = "unnamed.rs";

/// Attribute key under which the current context is stamped before any
/// execution, so context setters can recognize the handshake.
pub const ATTR_CONTEXT: &str = "context";

fn env_default(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => {
            log::debug!("using process default {key}={value}");
            Some(value)
        }
        _ => None,
    }
}

/// Configuration bag for one compile or evaluate call.
///
/// Recognized keys: classpath, sourcepath, entry-unit override, parent
/// loader, source filename and the argument sequence. Everything else goes
/// into the free-form string attribute bag, which is what a unit's context
/// setter receives, flattened into a key/value table.
///
/// The context also owns the error sink that compile diagnostics are
/// written to. It defaults to standard error.
pub struct ExecutionContext {
    /// Search roots for compiled artifacts, platform path-separator
    /// separated. Falls back to `RUSTSCRIPT_CLASSPATH`.
    pub classpath: Option<String>,
    /// Search roots for auxiliary dependencies, platform path-separator
    /// separated. Falls back to `RUSTSCRIPT_SOURCEPATH`.
    pub source_path: Option<String>,
    /// Explicit entry-unit name. Falls back to `RUSTSCRIPT_MAIN_UNIT`.
    pub main_unit: Option<String>,
    /// Name for the submitted source. When absent, compile calls generate
    /// an anonymous name from the engine's unit name generator.
    pub source_name: Option<String>,
    /// Arguments handed to the entry point. Defaults to the empty sequence.
    pub arguments: Vec<String>,
    /// Parent loader for delegation. An opaque handle as far as callers are
    /// concerned; delegation to it stops working once its own call scope
    /// has ended and its artifact map is drained.
    pub parent: Option<Arc<UnitLoader>>,
    attributes: BTreeMap<String, String>,
    error_sink: Box<dyn Write + Send>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        ExecutionContext {
            classpath: None,
            source_path: None,
            main_unit: None,
            source_name: None,
            arguments: Vec::new(),
            parent: None,
            attributes: BTreeMap::new(),
            error_sink: Box::new(io::stderr()),
        }
    }

    /// Replace the diagnostic sink. Compile diagnostics are written here,
    /// one message per line, in the order the compiler produced them.
    pub fn with_error_sink(mut self, sink: Box<dyn Write + Send>) -> Self {
        self.error_sink = sink;
        self
    }

    pub fn error_sink(&mut self) -> &mut dyn Write {
        self.error_sink.as_mut()
    }

    /// Set a free-form attribute visible to context setters.
    pub fn set_attribute(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.attributes.insert(key.into(), value.into());
    }

    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn attributes(&self) -> &BTreeMap<String, String> {
        &self.attributes
    }

    /// Stamp the bag with the current-context attribute for the unit about
    /// to be executed. Done before any execution so a context setter can
    /// observe which unit the context currently belongs to.
    pub(crate) fn stamp_current_context(&mut self, unit: &str) {
        self.attributes
            .insert(ATTR_CONTEXT.to_string(), unit.to_string());
    }

    /// Classpath: explicit field, else the process default.
    pub fn resolved_classpath(&self) -> Option<String> {
        self.classpath.clone().or_else(|| env_default(ENV_CLASSPATH))
    }

    /// Sourcepath: explicit field, else the process default.
    pub fn resolved_source_path(&self) -> Option<String> {
        self.source_path
            .clone()
            .or_else(|| env_default(ENV_SOURCEPATH))
    }

    /// Entry-unit override: explicit field, else the process default.
    pub fn resolved_main_unit(&self) -> Option<String> {
        self.main_unit.clone().or_else(|| env_default(ENV_MAIN_UNIT))
    }

    /// Explicit source name, if any. The orchestrator substitutes a
    /// generated anonymous name when this is absent.
    pub fn resolved_source_name(&self) -> Option<String> {
        self.source_name.clone()
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_field_wins_over_default() {
        let mut context = ExecutionContext::new();
        context.classpath = Some("/explicit".to_string());
        // Whatever the environment holds, the explicit value is returned.
        assert_eq!(context.resolved_classpath().as_deref(), Some("/explicit"));
    }

    #[test]
    fn main_unit_falls_back_to_environment() {
        // This test is the only one touching RUSTSCRIPT_MAIN_UNIT, so it is
        // safe under the parallel test harness.
        std::env::set_var(ENV_MAIN_UNIT, "from_env");
        let context = ExecutionContext::new();
        assert_eq!(context.resolved_main_unit().as_deref(), Some("from_env"));
        std::env::remove_var(ENV_MAIN_UNIT);
        assert_eq!(context.resolved_main_unit(), None);
    }

    #[test]
    fn stamp_overwrites_prior_value() {
        let mut context = ExecutionContext::new();
        context.stamp_current_context("first");
        context.stamp_current_context("second");
        assert_eq!(context.attribute(ATTR_CONTEXT), Some("second"));
    }

    #[test]
    fn arguments_default_to_empty() {
        let context = ExecutionContext::new();
        assert!(context.arguments.is_empty());
    }
}
