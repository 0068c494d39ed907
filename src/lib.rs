//! rustscript: evaluate Rust source text at run time.
//!
//! The engine accepts source text, compiles it with the system `rustc`
//! into a shared library, loads the artifact into a call-scoped loader,
//! locates a designated entry point and invokes it with caller-supplied
//! context and arguments, propagating structured errors throughout.
//!
//! # Architecture
//!
//! The pipeline, leaves first:
//!
//! - [`store`]: run-scoped artifact store bridging compiler input/output
//! - [`compiler`]: front-end driving the external `rustc`, collecting
//!   structured diagnostics
//! - [`loader`]: materializes stored artifacts into execution units,
//!   delegating unresolved names to a parent loader or classpath roots
//! - [`unit`]: loaded units, the documented unit ABI and the per-unit
//!   capability classification
//! - [`resolver`]: selects the unit (and implicitly its entry point) to run
//! - [`harness`]: performs the context-injection and entry-point call
//! - [`engine`]: the orchestrator exposing compile and evaluate
//! - [`context`], [`error`], [`meta`]: the configuration bag, the error
//!   taxonomy and the descriptive metadata around all of it
//!
//! # Trust model
//!
//! There is no sandbox. Compiling a script runs build-time code paths of
//! the toolchain; evaluating one executes the script's code in this
//! process, with this process's privileges, on the calling thread. Only
//! hand sources to this engine that you would be willing to run as a
//! program. Invoking units that declare themselves internal additionally
//! requires the explicit [`EngineConfig::trust_internal_units`] opt-in.
//!
//! # Example
//!
//! ```no_run
//! use rustscript::{ExecutionContext, ScriptEngine};
//!
//! let engine = ScriptEngine::new()?;
//! let mut context = ExecutionContext::new();
//! context.arguments = vec!["hello".to_string()];
//! engine.evaluate(
//!     r#"
//!     #[no_mangle]
//!     pub extern "C-unwind" fn script_main(argc: usize, _argv: *const *const std::os::raw::c_char) {
//!         println!("invoked with {argc} arguments");
//!     }
//!     "#,
//!     &mut context,
//! )?;
//! # Ok::<(), rustscript::ScriptError>(())
//! ```

pub mod compiler;
pub mod context;
pub mod engine;
pub mod error;
pub mod harness;
pub mod loader;
pub mod meta;
pub mod resolver;
pub mod store;
pub mod unit;

pub use compiler::{Diagnostic, Position, RustCompiler, Severity};
pub use context::ExecutionContext;
pub use engine::{CompiledProgram, EngineConfig, ScriptEngine, UnitNameGenerator};
pub use error::{Result, ScriptError};
pub use loader::{ClasspathEntry, UnitLoader};
pub use meta::EngineMetadata;
pub use store::{ArtifactMap, ArtifactStore};
pub use unit::{Capability, ExecutionUnit};
