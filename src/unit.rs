//! Execution units and the unit ABI.
//!
//! A unit is a loaded shared library produced by one compiled source unit
//! (or resolved externally through the loader's delegation chain). Units
//! declare themselves through plain exported symbols, so script sources
//! stay freestanding: they need no dependency on this crate, only the
//! documented contract below.
//!
//! ```text
//! #[no_mangle]
//! pub extern "C-unwind" fn script_main(argc: usize, argv: *const *const c_char);
//!
//! #[no_mangle]
//! pub extern "C-unwind" fn script_set_context(context: *const RawContext);
//!
//! #[no_mangle]
//! pub static SCRIPT_MANIFEST: UnitManifest;   // optional, absent means public
//! ```
//!
//! There is no stable ABI beyond this contract. Scripts are expected to be
//! built by the same toolchain the engine drives; version skew between the
//! host and a unit is the unit author's problem. Invoking a unit runs its
//! code with full host privilege on the calling thread. No isolation is
//! provided; this is the documented trust boundary of the engine.
//!
//! A unit keeps its library alive, so it stays invokable after the loader
//! that materialized it has gone out of scope. When the last handle to a
//! unit drops, the library is unloaded; callers whose scripts leak threads
//! into the host must keep a unit handle alive for as long as that code may
//! run.

use libloading::Library;
use std::os::raw::c_char;
use std::sync::Arc;

/// Symbol name of the entry point.
pub const ENTRY_SYMBOL: &[u8] = b"script_main";

/// Symbol name of the context setter.
pub const CONTEXT_SYMBOL: &[u8] = b"script_set_context";

/// Symbol name of the optional unit manifest.
pub const MANIFEST_SYMBOL: &[u8] = b"SCRIPT_MANIFEST";

/// Manifest ABI version this engine understands.
pub const ABI_VERSION: u32 = 1;

/// Manifest flag bit marking a unit as internal (non-public).
pub const FLAG_INTERNAL: u32 = 1;

/// Entry point: argc/argv over NUL-terminated UTF-8 argument strings. The
/// pointers are only valid for the duration of the call.
pub type EntryFn = unsafe extern "C-unwind" fn(argc: usize, argv: *const *const c_char);

/// Context setter: receives the flattened context attribute table. The
/// table and every string in it are only valid for the duration of the
/// call.
pub type ContextFn = unsafe extern "C-unwind" fn(context: *const RawContext);

/// Flattened execution-context attribute table passed to context setters.
/// `keys` and `values` are parallel arrays of `len` NUL-terminated strings.
#[repr(C)]
pub struct RawContext {
    pub len: usize,
    pub keys: *const *const c_char,
    pub values: *const *const c_char,
}

/// Optional self-description a unit may export under [`MANIFEST_SYMBOL`].
#[repr(C)]
pub struct UnitManifest {
    pub abi_version: u32,
    pub flags: u32,
}

/// What a loaded unit is capable of, classified once at load time from the
/// symbols it exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
    /// Neither entry point nor context setter.
    None,
    /// Only a context setter.
    ContextSetter,
    /// Only an entry point.
    EntryPoint,
    /// Both entry point and context setter.
    Both,
}

impl Capability {
    fn classify(entry: bool, setter: bool) -> Self {
        match (entry, setter) {
            (false, false) => Capability::None,
            (false, true) => Capability::ContextSetter,
            (true, false) => Capability::EntryPoint,
            (true, true) => Capability::Both,
        }
    }

    pub fn has_entry(self) -> bool {
        matches!(self, Capability::EntryPoint | Capability::Both)
    }

    pub fn has_context_setter(self) -> bool {
        matches!(self, Capability::ContextSetter | Capability::Both)
    }
}

/// A loaded, invokable unit.
#[derive(Clone)]
pub struct ExecutionUnit {
    name: String,
    public: bool,
    capability: Capability,
    entry: Option<EntryFn>,
    set_context: Option<ContextFn>,
    // Keeps the mapped code alive for as long as any clone of this unit
    // exists. The function pointers above point into it.
    #[allow(dead_code)]
    library: Arc<Library>,
}

impl ExecutionUnit {
    /// Probe the library's exports and classify the unit. Called once per
    /// materialization; the classification is never recomputed.
    pub(crate) fn from_library(name: String, library: Library) -> Self {
        let library = Arc::new(library);

        // dlsym cannot verify signatures; presence of the symbol under the
        // documented contract is what qualifies it.
        let entry: Option<EntryFn> =
            unsafe { library.get::<EntryFn>(ENTRY_SYMBOL) }.ok().map(|s| *s);
        let set_context: Option<ContextFn> =
            unsafe { library.get::<ContextFn>(CONTEXT_SYMBOL) }.ok().map(|s| *s);

        let mut public = true;
        if let Ok(symbol) = unsafe { library.get::<*const UnitManifest>(MANIFEST_SYMBOL) } {
            let manifest: &UnitManifest = unsafe { &**symbol };
            if manifest.abi_version == ABI_VERSION {
                public = manifest.flags & FLAG_INTERNAL == 0;
            } else {
                log::warn!(
                    "unit '{name}' declares manifest ABI {} (engine speaks {}), manifest ignored",
                    manifest.abi_version,
                    ABI_VERSION
                );
            }
        }

        let capability = Capability::classify(entry.is_some(), set_context.is_some());
        log::debug!(
            "unit '{name}' loaded: capability {capability:?}, {}",
            if public { "public" } else { "internal" }
        );

        ExecutionUnit {
            name,
            public,
            capability,
            entry,
            set_context,
            library,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether the unit is publicly visible. Internal units are only
    /// selected and invoked when the engine's trust flag is set.
    pub fn is_public(&self) -> bool {
        self.public
    }

    pub fn capability(&self) -> Capability {
        self.capability
    }

    pub(crate) fn entry(&self) -> Option<EntryFn> {
        self.entry
    }

    pub(crate) fn context_setter(&self) -> Option<ContextFn> {
        self.set_context
    }
}

impl std::fmt::Debug for ExecutionUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExecutionUnit")
            .field("name", &self.name)
            .field("public", &self.public)
            .field("capability", &self.capability)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classification_truth_table() {
        assert_eq!(Capability::classify(false, false), Capability::None);
        assert_eq!(Capability::classify(false, true), Capability::ContextSetter);
        assert_eq!(Capability::classify(true, false), Capability::EntryPoint);
        assert_eq!(Capability::classify(true, true), Capability::Both);
    }

    #[test]
    fn entry_and_setter_predicates() {
        assert!(Capability::Both.has_entry());
        assert!(Capability::EntryPoint.has_entry());
        assert!(!Capability::ContextSetter.has_entry());
        assert!(Capability::Both.has_context_setter());
        assert!(Capability::ContextSetter.has_context_setter());
        assert!(!Capability::None.has_context_setter());
    }
}
