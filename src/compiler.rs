//! Compilation front-end driving the external system compiler.
//!
//! One `RustCompiler` wraps one located `rustc` executable and may be
//! reused across calls; every `compile` call gets its own scoped
//! [`ArtifactStore`]. Diagnostics are collected from the compiler's JSON
//! output. On failure they are written to the caller's error sink, one
//! message per line, and the call returns `Ok(None)`: producing no
//! artifacts is not an error at this layer, the caller decides what it
//! means.

use crate::context::ENV_RUSTC;
use crate::error::{Result, ScriptError};
use crate::store::{crate_name_for, ArtifactMap, ArtifactStore};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

/// Severity of a compiler diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
    Note,
    Help,
}

impl Severity {
    fn from_level(level: &str) -> Self {
        match level {
            "warning" => Severity::Warning,
            "note" => Severity::Note,
            "help" => Severity::Help,
            // "error" and the internal-compiler-error levels all land here.
            _ => Severity::Error,
        }
    }
}

/// Source position of a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Position {
    pub file: String,
    pub line: u32,
    pub column: u32,
}

/// One structured compiler message. Diagnostics are never raised as errors
/// themselves; they describe why a compilation produced nothing usable.
#[derive(Debug, Clone, Serialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub message: String,
    pub position: Option<Position>,
}

impl Diagnostic {
    fn render(&self) -> String {
        match (&self.position, self.severity) {
            (Some(p), s) => format!(
                "{}:{}:{}: {}: {}",
                p.file,
                p.line,
                p.column,
                level_name(s),
                self.message
            ),
            (None, s) => format!("{}: {}", level_name(s), self.message),
        }
    }
}

fn level_name(severity: Severity) -> &'static str {
    match severity {
        Severity::Error => "error",
        Severity::Warning => "warning",
        Severity::Note => "note",
        Severity::Help => "help",
    }
}

// Shape of the rustc --error-format=json records we care about.
#[derive(Deserialize)]
struct RustcMessage {
    #[serde(default)]
    message: String,
    #[serde(default)]
    level: String,
    #[serde(default)]
    spans: Vec<RustcSpan>,
}

#[derive(Deserialize)]
struct RustcSpan {
    file_name: String,
    line_start: u32,
    column_start: u32,
    #[serde(default)]
    is_primary: bool,
}

/// Front-end over the system `rustc`.
pub struct RustCompiler {
    program: PathBuf,
    version: String,
}

impl RustCompiler {
    /// Locate the system compiler (`RUSTSCRIPT_RUSTC` override, else
    /// `rustc` from the search path) and probe it. Fails when no working
    /// compiler is available.
    pub fn new() -> Result<Self> {
        let program = std::env::var_os(ENV_RUSTC)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("rustc"));
        let output = Command::new(&program)
            .arg("--version")
            .output()
            .map_err(|e| {
                ScriptError::Compiler(format!("unable to run '{}': {e}", program.display()))
            })?;
        if !output.status.success() {
            return Err(ScriptError::Compiler(format!(
                "'{} --version' failed: {}",
                program.display(),
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        let version = String::from_utf8_lossy(&output.stdout).trim().to_string();
        log::debug!("using system compiler: {version}");
        Ok(RustCompiler { program, version })
    }

    /// The probed `rustc --version` line. Doubles as the engine and
    /// language version in the engine metadata.
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Compile one source unit into shared-library artifacts.
    ///
    /// Baseline options are always applied: cdylib output, full lint
    /// diagnostics, deprecation warnings, no debug metadata. The
    /// sourcepath and classpath are appended only when supplied and
    /// non-blank. Returns `Ok(Some(map))` with every produced artifact on
    /// success, `Ok(None)` after writing the diagnostics to `error_sink`
    /// on compile failure.
    pub fn compile(
        &self,
        source_name: &str,
        source_text: &str,
        error_sink: &mut dyn Write,
        source_path: Option<&str>,
        class_path: Option<&str>,
    ) -> Result<Option<ArtifactMap>> {
        if source_name.trim().is_empty() {
            return Err(ScriptError::InvalidArgument(
                "source name must not be empty".to_string(),
            ));
        }
        if source_text.trim().is_empty() {
            return Err(ScriptError::InvalidArgument(
                "source text must not be empty".to_string(),
            ));
        }

        let store = ArtifactStore::new()?;
        let source = store.create_source_input(source_name, source_text)?;
        let crate_name = crate_name_for(source_name);
        log::debug!(
            "compiling '{}' as crate '{crate_name}' ({} bytes)",
            source.locator(),
            source_text.len()
        );

        let mut cmd = Command::new(&self.program);
        cmd.arg("--crate-type")
            .arg("cdylib")
            .arg("--crate-name")
            .arg(&crate_name)
            .arg("--edition")
            .arg("2021")
            .arg("--error-format")
            .arg("json")
            .arg("-C")
            .arg("debuginfo=0")
            .arg("-W")
            .arg("warnings")
            .arg("-W")
            .arg("deprecated")
            .arg("--out-dir")
            .arg(store.run_dir());
        append_search_paths(&mut cmd, "dependency", source_path);
        append_search_paths(&mut cmd, "crate", class_path);
        cmd.arg(source.path());
        cmd.stdin(Stdio::null()).stdout(Stdio::piped()).stderr(Stdio::piped());

        let output = cmd.output().map_err(|e| {
            ScriptError::Compiler(format!("failed to spawn '{}': {e}", self.program.display()))
        })?;
        let diagnostics = parse_diagnostics(&String::from_utf8_lossy(&output.stderr));

        if !output.status.success() {
            for diagnostic in &diagnostics {
                writeln!(error_sink, "{}", diagnostic.render())?;
            }
            error_sink.flush()?;
            log::debug!(
                "compilation of '{source_name}' failed with {} diagnostics",
                diagnostics.len()
            );
            return Ok(None);
        }

        let warnings = diagnostics
            .iter()
            .filter(|d| d.severity == Severity::Warning)
            .count();
        if warnings > 0 {
            log::debug!("compilation of '{source_name}' succeeded with {warnings} warnings");
        }

        collect_artifacts(&store)?;
        let artifacts = store.artifacts();
        store.close();
        Ok(Some(artifacts))
    }
}

fn append_search_paths(cmd: &mut Command, kind: &str, value: Option<&str>) {
    if let Some(paths) = value.filter(|v| !v.trim().is_empty()) {
        for dir in std::env::split_paths(paths) {
            cmd.arg("-L").arg(format!("{kind}={}", dir.display()));
        }
    }
}

/// Parse the compiler's stderr into diagnostics, preserving compiler
/// order. Lines that are not JSON records (a crashed compiler, a linker
/// message) are kept verbatim as error diagnostics rather than dropped.
fn parse_diagnostics(stderr: &str) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    for line in stderr.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<RustcMessage>(line) {
            Ok(message) => {
                if message.message.is_empty() {
                    continue;
                }
                let position = message
                    .spans
                    .iter()
                    .find(|s| s.is_primary)
                    .or_else(|| message.spans.first())
                    .map(|s| Position {
                        file: s.file_name.clone(),
                        line: s.line_start,
                        column: s.column_start,
                    });
                diagnostics.push(Diagnostic {
                    severity: Severity::from_level(&message.level),
                    message: message.message,
                    position,
                });
            }
            Err(_) => diagnostics.push(Diagnostic {
                severity: Severity::Error,
                message: line.to_string(),
                position: None,
            }),
        }
    }
    diagnostics
}

/// Copy every shared library the compiler wrote into the store's map,
/// keyed by unit name.
fn collect_artifacts(store: &ArtifactStore) -> Result<()> {
    for entry in std::fs::read_dir(store.run_dir())? {
        let path = entry?.path();
        if !is_shared_library(&path) {
            continue;
        }
        let name = unit_name_for(&path);
        let bytes = std::fs::read(&path)?;
        let mut sink = store.create_output_sink(&name);
        sink.write_all(&bytes)?;
        sink.close();
    }
    Ok(())
}

fn is_shared_library(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("so") | Some("dylib") | Some("dll")
    )
}

/// Unit name of a produced library file: the stem without the platform
/// `lib` prefix.
fn unit_name_for(path: &Path) -> String {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    if cfg!(windows) {
        stem
    } else {
        stem.strip_prefix("lib").map(str::to_string).unwrap_or(stem)
    }
}
