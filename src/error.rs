//! Error taxonomy for the compile-load-execute pipeline.
//!
//! One crate-wide error enum, one `Result` alias. Argument validation
//! failures are raised immediately before any work is done; compile and
//! invocation failures are distinct, catchable outcomes. Locator synthesis
//! failures never show up here at all, they are recovered internally with a
//! fixed fallback locator.

use thiserror::Error;

/// Errors raised by the scripting engine and its components.
#[derive(Error, Debug)]
pub enum ScriptError {
    /// A required input was missing or unusable. Raised before any partial
    /// work is performed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The system compiler could not be located or executed at all. This is
    /// an environment problem, not a problem with the submitted source.
    #[error("system compiler unavailable: {0}")]
    Compiler(String),

    /// Compilation produced no usable artifacts. The diagnostics describing
    /// why have already been written to the caller-supplied error sink.
    #[error("compilation of '{source_name}' failed")]
    CompileFailed { source_name: String },

    /// A requested artifact was not present in the artifact map, the parent
    /// loader, or any classpath search root.
    #[error("artifact not found: {name}")]
    ArtifactNotFound { name: String },

    /// Stored artifact bytes could not be materialized into an executable
    /// unit.
    #[error("failed to materialize artifact '{name}'")]
    Materialize {
        name: String,
        #[source]
        cause: libloading::Error,
    },

    /// An explicitly named entry unit does not expose a qualifying entry
    /// point.
    #[error("unit '{unit}' does not expose an entry point")]
    EntryNotFound { unit: String },

    /// Compilation succeeded but no unit could be resolved to construct a
    /// runnable program around.
    #[error("'{source_name}' produced no runnable unit")]
    NoRunnableUnit { source_name: String },

    /// A non-public unit was selected for execution without the trust flag
    /// being set. Bypassing unit visibility is opt-in.
    #[error("unit '{unit}' is internal and trust_internal_units is not set")]
    AccessDenied { unit: String },

    /// Invoking the context setter or the entry point failed, including a
    /// panic raised by the invoked program itself. The original payload is
    /// preserved in the message.
    #[error("invocation of '{unit}' failed: {message}")]
    Invocation { unit: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ScriptError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_names_the_source() {
        let err = ScriptError::CompileFailed {
            source_name: "script_7.rs".to_string(),
        };
        assert_eq!(err.to_string(), "compilation of 'script_7.rs' failed");
    }

    #[test]
    fn io_errors_convert() {
        fn read() -> Result<String> {
            Ok(std::fs::read_to_string("/nonexistent/rustscript-test")?)
        }
        assert!(matches!(read(), Err(ScriptError::Io(_))));
    }
}
