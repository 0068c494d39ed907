//! The orchestrator: compile and evaluate operations over the pipeline.
//!
//! Every call creates and destroys its own artifact store and unit
//! loader; nothing crosses call boundaries except the unit name
//! generator, which exists so concurrent anonymous compiles get distinct
//! names. Compilation and execution block the calling thread, with no
//! built-in timeout or cancellation; callers that need a deadline run the
//! engine call inside their own governed worker.
//!
//! `compile` and `evaluate` treat non-runnable source differently on
//! purpose. A [`CompiledProgram`] is only ever constructed around a
//! concrete resolved unit, so `compile` fails when no unit can be
//! determined. `evaluate` tolerates the same situation and returns an
//! empty result: source consisting only of declarations is valid input.

use crate::compiler::RustCompiler;
use crate::context::ExecutionContext;
use crate::error::{Result, ScriptError};
use crate::harness;
use crate::loader::UnitLoader;
use crate::meta::EngineMetadata;
use crate::resolver;
use crate::unit::ExecutionUnit;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Prefix of generated anonymous unit names.
pub const ANONYMOUS_PREFIX: &str = "script_";

/// Generator for anonymous source-unit names.
///
/// An explicitly owned, atomically incremented counter. Engines create
/// their own by default; sharing one across engines (or injecting one in
/// tests) is done by cloning, which shares the underlying counter.
#[derive(Clone, Debug)]
pub struct UnitNameGenerator {
    next: Arc<AtomicU64>,
}

impl UnitNameGenerator {
    pub fn new() -> Self {
        Self::starting_at(0)
    }

    /// Start numbering at `first`, for deterministic naming under test.
    pub fn starting_at(first: u64) -> Self {
        UnitNameGenerator {
            next: Arc::new(AtomicU64::new(first)),
        }
    }

    /// The next unique unit name: the fixed prefix plus the counter value.
    pub fn next_name(&self) -> String {
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{ANONYMOUS_PREFIX}{n}")
    }
}

impl Default for UnitNameGenerator {
    fn default() -> Self {
        Self::new()
    }
}

/// Engine configuration.
#[derive(Clone, Debug, Default)]
pub struct EngineConfig {
    /// Allow selecting and invoking non-public units, bypassing their
    /// declared visibility. Off by default: the engine already runs
    /// author-supplied code with full host privilege, and widening that to
    /// units which asked not to be invoked is a decision the embedder must
    /// make explicitly.
    pub trust_internal_units: bool,
    /// Name source for anonymous source units. Share one generator across
    /// engines to keep names unique among them.
    pub names: UnitNameGenerator,
}

/// A compiled program handle around a concrete resolved unit.
///
/// The unit keeps its own library alive, so the handle stays valid for
/// the lifetime of the process that created it. Handles never persist
/// across processes.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    unit: ExecutionUnit,
}

impl CompiledProgram {
    pub fn unit(&self) -> &ExecutionUnit {
        &self.unit
    }
}

/// The scripting engine.
pub struct ScriptEngine {
    compiler: RustCompiler,
    config: EngineConfig,
}

impl ScriptEngine {
    /// Create an engine with default configuration. Fails when no working
    /// system compiler is available.
    pub fn new() -> Result<Self> {
        Self::with_config(EngineConfig::default())
    }

    pub fn with_config(config: EngineConfig) -> Result<Self> {
        Ok(ScriptEngine {
            compiler: RustCompiler::new()?,
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Engine metadata: names, extensions, mime types and the versions
    /// reported by the probed compiler.
    pub fn metadata(&self) -> EngineMetadata {
        EngineMetadata::for_compiler(self.compiler.version())
    }

    /// Direct access to the compilation front-end.
    pub fn compiler(&self) -> &RustCompiler {
        &self.compiler
    }

    /// Compile source into a runnable program, using a default context.
    pub fn compile(&self, source: &str) -> Result<CompiledProgram> {
        self.compile_with(source, &mut ExecutionContext::new())
    }

    /// Compile source into a runnable program.
    ///
    /// The source name is the context's filename when present, else an
    /// anonymous generated name. Fails with
    /// [`ScriptError::CompileFailed`] when compilation produces nothing
    /// usable and with [`ScriptError::NoRunnableUnit`] when no unit can be
    /// resolved to build the handle around.
    pub fn compile_with(
        &self,
        source: &str,
        context: &mut ExecutionContext,
    ) -> Result<CompiledProgram> {
        let (source_name, loader) = self.parse(source, context)?;
        let unit = resolver::resolve_entry_unit(
            &loader,
            context.resolved_main_unit().as_deref(),
            self.config.trust_internal_units,
        )?
        .ok_or(ScriptError::NoRunnableUnit { source_name })?;
        Ok(CompiledProgram { unit })
    }

    /// Compile and execute source.
    ///
    /// Returns the executed unit, or `None` without error when the
    /// resolver yields no unit or the resolved unit has no entry point.
    pub fn evaluate(
        &self,
        source: &str,
        context: &mut ExecutionContext,
    ) -> Result<Option<ExecutionUnit>> {
        let (_, loader) = self.parse(source, context)?;
        let unit = resolver::resolve_entry_unit(
            &loader,
            context.resolved_main_unit().as_deref(),
            self.config.trust_internal_units,
        )?;
        match unit {
            None => Ok(None),
            Some(unit) => self.run(unit, context),
        }
    }

    /// Re-execute an already compiled program's unit.
    pub fn evaluate_program(
        &self,
        program: &CompiledProgram,
        context: &mut ExecutionContext,
    ) -> Result<Option<ExecutionUnit>> {
        self.run(program.unit.clone(), context)
    }

    fn run(
        &self,
        unit: ExecutionUnit,
        context: &mut ExecutionContext,
    ) -> Result<Option<ExecutionUnit>> {
        context.stamp_current_context(unit.name());
        if harness::run_unit(&unit, context, self.config.trust_internal_units)? {
            Ok(Some(unit))
        } else {
            Ok(None)
        }
    }

    /// Run the front-end and wrap the produced artifacts in a fresh
    /// per-call loader.
    fn parse(
        &self,
        source: &str,
        context: &mut ExecutionContext,
    ) -> Result<(String, UnitLoader)> {
        let source_name = context
            .resolved_source_name()
            .unwrap_or_else(|| format!("{}.rs", self.config.names.next_name()));
        let source_path = context.resolved_source_path();
        let class_path = context.resolved_classpath();
        let parent = context.parent.clone();

        let artifacts = self.compiler.compile(
            &source_name,
            source,
            context.error_sink(),
            source_path.as_deref(),
            class_path.as_deref(),
        )?;
        let artifacts = match artifacts {
            Some(map) if !map.is_empty() => map,
            // No usable artifacts: the diagnostics are already on the sink.
            _ => return Err(ScriptError::CompileFailed { source_name }),
        };

        let loader = UnitLoader::new(artifacts, class_path.as_deref(), parent)?;
        Ok((source_name, loader))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_names_are_distinct_and_prefixed() {
        let names = UnitNameGenerator::new();
        let a = names.next_name();
        let b = names.next_name();
        assert_ne!(a, b);
        assert!(a.starts_with(ANONYMOUS_PREFIX));
        assert!(b.starts_with(ANONYMOUS_PREFIX));
    }

    #[test]
    fn injected_generator_is_deterministic() {
        let names = UnitNameGenerator::starting_at(40);
        assert_eq!(names.next_name(), "script_40");
        assert_eq!(names.next_name(), "script_41");
    }

    #[test]
    fn cloned_generators_share_the_counter() {
        let names = UnitNameGenerator::new();
        let shared = names.clone();
        let a = names.next_name();
        let b = shared.next_name();
        assert_ne!(a, b);
    }
}
