//! Engine metadata and source assembly helpers.
//!
//! Thin descriptive surface: names, extensions, mime types, versions and
//! the little generators that turn statements into a compilable unit.
//! The threading capability is advertised metadata only; nothing here
//! enforces it.

use crate::error::{Result, ScriptError};
use serde::Serialize;

/// Name of the engine.
pub const ENGINE_NAME: &str = "rustscript";

/// Name of the supported language.
pub const LANGUAGE_NAME: &str = "Rust";

/// Source file extension handled by the engine.
pub const EXTENSION: &str = "rs";

/// Mime types recognized for source text.
pub const MIME_TYPES: &[&str] = &["text/rust", "text/x-rust"];

/// Advertised threading capability. The engine itself is safe to call
/// from multiple threads, but invoked code runs unsupervised on the
/// calling thread, so this is a description, not a guarantee.
pub const THREADING: &str = "MULTITHREADED";

/// Descriptive engine metadata.
#[derive(Debug, Clone, Serialize)]
pub struct EngineMetadata {
    pub engine_name: String,
    pub engine_version: String,
    pub language_name: String,
    pub language_version: String,
    pub names: Vec<String>,
    pub extensions: Vec<String>,
    pub mime_types: Vec<String>,
    pub threading: String,
}

impl EngineMetadata {
    /// Both versions come from the probed compiler: the engine is only
    /// ever as capable as the toolchain it drives.
    pub(crate) fn for_compiler(compiler_version: &str) -> Self {
        EngineMetadata {
            engine_name: ENGINE_NAME.to_string(),
            engine_version: compiler_version.to_string(),
            language_name: LANGUAGE_NAME.to_string(),
            language_version: compiler_version.to_string(),
            names: vec![ENGINE_NAME.to_string(), LANGUAGE_NAME.to_string()],
            extensions: vec![EXTENSION.to_string()],
            mime_types: MIME_TYPES.iter().map(|m| m.to_string()).collect(),
            threading: THREADING.to_string(),
        }
    }
}

/// Render a method call in the supported language's syntax.
pub fn method_call_syntax(object: &str, method: &str, args: &[&str]) -> Result<String> {
    if object.trim().is_empty() {
        return Err(ScriptError::InvalidArgument(
            "object name must not be empty".to_string(),
        ));
    }
    if method.trim().is_empty() {
        return Err(ScriptError::InvalidArgument(
            "method name must not be empty".to_string(),
        ));
    }
    Ok(format!("{object}.{method}({})", args.join(", ")))
}

/// Render a statement that prints the given text.
pub fn output_statement(text: &str) -> String {
    format!("print!(\"{}\");", escape_literal(text))
}

/// Wrap statements into a compilable source unit exposing the entry
/// point. Each statement is terminated if the author did not do so.
pub fn program(statements: &[&str]) -> String {
    let mut body = String::new();
    for statement in statements {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        body.push_str("    ");
        body.push_str(statement);
        if !statement.ends_with(';') && !statement.ends_with('}') {
            body.push(';');
        }
        body.push('\n');
    }
    format!(
        "#[no_mangle]\n\
         pub extern \"C-unwind\" fn script_main(_argc: usize, _argv: *const *const std::os::raw::c_char) {{\n\
         {body}}}\n"
    )
}

fn escape_literal(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            '{' => out.push_str("{{"),
            '}' => out.push_str("}}"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_call_syntax_renders_rust() {
        assert_eq!(
            method_call_syntax("object", "method", &[]).unwrap(),
            "object.method()"
        );
        assert_eq!(
            method_call_syntax("object", "method", &["arg1", "arg2"]).unwrap(),
            "object.method(arg1, arg2)"
        );
        assert!(matches!(
            method_call_syntax("", "method", &[]),
            Err(ScriptError::InvalidArgument(_))
        ));
        assert!(matches!(
            method_call_syntax("object", "", &[]),
            Err(ScriptError::InvalidArgument(_))
        ));
    }

    #[test]
    fn output_statement_escapes_the_literal() {
        assert_eq!(output_statement("Text"), "print!(\"Text\");");
        assert_eq!(
            output_statement("a \"b\"\n{c}"),
            "print!(\"a \\\"b\\\"\\n{{c}}\");"
        );
    }

    #[test]
    fn program_wraps_statements_into_an_entry_point() {
        let source = program(&["let x = 1", "print!(\"{x}\");"]);
        assert!(source.contains("fn script_main"));
        assert!(source.contains("    let x = 1;\n"));
        assert!(source.contains("    print!(\"{x}\");\n"));
    }

    #[test]
    fn metadata_carries_the_compiler_version() {
        let metadata = EngineMetadata::for_compiler("rustc 1.80.0");
        assert_eq!(metadata.engine_version, "rustc 1.80.0");
        assert_eq!(metadata.language_version, "rustc 1.80.0");
        assert_eq!(metadata.extensions, vec!["rs".to_string()]);
        assert!(metadata.names.contains(&"Rust".to_string()));
    }
}
