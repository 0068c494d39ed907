//! Run-scoped artifact store bridging compiler input and output.
//!
//! One store serves exactly one compilation. It owns a uuid-named working
//! directory under the system temp root where the source unit is written
//! for the external compiler, plus the in-memory map the produced artifact
//! bytes are published into. Closing the store replaces the map outright,
//! so snapshots taken afterwards are empty. The directory is removed
//! best-effort when the store is dropped.

use crate::error::{Result, ScriptError};
use std::collections::BTreeMap;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Mapping from artifact name to artifact bytes, produced by one
/// compilation. Keys are unique within the compilation.
pub type ArtifactMap = BTreeMap<String, Vec<u8>>;

/// Fixed fallback locator used when a source name cannot be translated.
/// Translation failure is always recovered here, never surfaced.
pub const DEFAULT_LOCATOR: &str = "mem:///scripts/anonymous_source";

const VIRTUAL_PREFIX: &str = "mem:///";
const SOURCE_EXT: &str = ".rs";

/// Create a fresh uuid-named run directory under the crate's temp root.
pub(crate) fn create_run_dir(kind: &str) -> Result<PathBuf> {
    let base = std::env::temp_dir().join("rustscript").join(kind);
    fs::create_dir_all(&base)?;
    let run_dir = base.join(Uuid::new_v4().to_string());
    fs::create_dir_all(&run_dir)?;
    Ok(run_dir)
}

/// Remove a run directory, logging instead of failing. Cleanup is hygiene,
/// not a correctness barrier.
pub(crate) fn remove_run_dir(dir: &Path) {
    if dir.exists() {
        if let Err(e) = fs::remove_dir_all(dir) {
            log::warn!("failed to remove run directory {}: {e}", dir.display());
        }
    }
}

/// A source unit written into the store for the compiler to read.
#[derive(Debug, Clone)]
pub struct SourceInput {
    locator: String,
    path: PathBuf,
}

impl SourceInput {
    /// The locator derived from the source name. Used for display and
    /// diagnostics, not for filesystem access.
    pub fn locator(&self) -> &str {
        &self.locator
    }

    /// Where the source file actually lives inside the run directory.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Write buffer for one artifact. Accumulated bytes are published into the
/// artifact map under the sink's name when the sink is closed (or dropped),
/// overwriting any prior entry of the same name.
pub struct OutputSink {
    name: String,
    buffer: Vec<u8>,
    artifacts: Arc<Mutex<ArtifactMap>>,
    published: bool,
}

impl OutputSink {
    /// Publish the accumulated bytes and consume the sink.
    pub fn close(mut self) {
        self.publish();
    }

    fn publish(&mut self) {
        if !self.published {
            self.published = true;
            let bytes = std::mem::take(&mut self.buffer);
            lock(&self.artifacts).insert(self.name.clone(), bytes);
        }
    }
}

impl Write for OutputSink {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for OutputSink {
    fn drop(&mut self) {
        self.publish();
    }
}

fn lock(map: &Mutex<ArtifactMap>) -> std::sync::MutexGuard<'_, ArtifactMap> {
    // Stores are scoped to a single call and never shared across threads,
    // so a poisoned lock cannot be observed here.
    map.lock().expect("artifact map lock poisoned")
}

/// Scoped virtual filesystem used for the duration of one compilation.
pub struct ArtifactStore {
    run_dir: PathBuf,
    artifacts: Arc<Mutex<ArtifactMap>>,
}

impl ArtifactStore {
    pub fn new() -> Result<Self> {
        Ok(ArtifactStore {
            run_dir: create_run_dir("store")?,
            artifacts: Arc::new(Mutex::new(ArtifactMap::new())),
        })
    }

    /// The working directory handed to the compiler as its output location.
    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Write `code` as a read-only source file named after `name`.
    ///
    /// The returned input carries the derived locator: the canonical path
    /// when `name` denotes an existing file, else a synthesized `mem:///`
    /// locator, else the fixed default.
    pub fn create_source_input(&self, name: &str, code: &str) -> Result<SourceInput> {
        if name.trim().is_empty() {
            return Err(ScriptError::InvalidArgument(
                "source name must not be empty".to_string(),
            ));
        }
        let locator = derive_locator(name);
        let path = self.run_dir.join(format!("{}.rs", crate_name_for(name)));
        fs::write(&path, code)?;
        let mut perms = fs::metadata(&path)?.permissions();
        perms.set_readonly(true);
        fs::set_permissions(&path, perms)?;
        Ok(SourceInput { locator, path })
    }

    /// Open a write buffer that publishes into the map under `name` when
    /// closed.
    pub fn create_output_sink(&self, name: &str) -> OutputSink {
        OutputSink {
            name: name.to_string(),
            buffer: Vec::new(),
            artifacts: Arc::clone(&self.artifacts),
            published: false,
        }
    }

    /// Immutable snapshot of the current artifact map.
    pub fn artifacts(&self) -> ArtifactMap {
        lock(&self.artifacts).clone()
    }

    /// Discard the map. Subsequent snapshots are empty. Succeeds even if
    /// nothing was ever written.
    pub fn close(&self) {
        *lock(&self.artifacts) = ArtifactMap::new();
    }
}

impl Drop for ArtifactStore {
    fn drop(&mut self) {
        remove_run_dir(&self.run_dir);
    }
}

/// Translate a source name to a storage locator.
///
/// Existing filesystem paths get their canonical form. Anything else is
/// mapped under the virtual prefix with `::`, `.` and path separators
/// turned into `/`, keeping a trailing `.rs` extension intact. If that
/// yields nothing usable the fixed default locator is returned instead.
fn derive_locator(name: &str) -> String {
    let path = Path::new(name);
    if path.exists() {
        match path.canonicalize() {
            Ok(canonical) => return canonical.display().to_string(),
            Err(e) => {
                log::debug!("could not canonicalize '{name}': {e}");
            }
        }
    }
    let (stem, ext) = match name.strip_suffix(SOURCE_EXT) {
        Some(stem) => (stem, SOURCE_EXT),
        None => (name, ""),
    };
    let mapped: String = stem
        .replace("::", "/")
        .replace(['.', std::path::MAIN_SEPARATOR, '\\'], "/");
    let trimmed = mapped.trim_matches('/');
    if trimmed.is_empty() {
        return DEFAULT_LOCATOR.to_string();
    }
    format!("{VIRTUAL_PREFIX}{trimmed}{ext}")
}

/// Derive a valid crate name from a source name: the file stem with
/// anything outside `[A-Za-z0-9_]` replaced by underscores.
pub(crate) fn crate_name_for(name: &str) -> String {
    let stem = Path::new(name)
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let mut out: String = stem
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if out.is_empty() {
        out.push_str("script");
    }
    if out.chars().next().is_some_and(|c| c.is_ascii_digit()) {
        out.insert(0, '_');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sink_publishes_on_close_and_overwrites() {
        let store = ArtifactStore::new().unwrap();
        let mut sink = store.create_output_sink("unit_a");
        sink.write_all(b"first").unwrap();
        sink.close();
        assert_eq!(store.artifacts()["unit_a"], b"first");

        let mut sink = store.create_output_sink("unit_a");
        sink.write_all(b"second").unwrap();
        sink.close();
        assert_eq!(store.artifacts()["unit_a"], b"second");
        assert_eq!(store.artifacts().len(), 1);
    }

    #[test]
    fn sink_publishes_on_drop() {
        let store = ArtifactStore::new().unwrap();
        {
            let mut sink = store.create_output_sink("dropped");
            sink.write_all(b"bytes").unwrap();
        }
        assert_eq!(store.artifacts()["dropped"], b"bytes");
    }

    #[test]
    fn close_discards_the_map() {
        let store = ArtifactStore::new().unwrap();
        store.create_output_sink("unit_b").close();
        assert_eq!(store.artifacts().len(), 1);
        store.close();
        assert!(store.artifacts().is_empty());
        // Closing an already empty store is fine.
        store.close();
        assert!(store.artifacts().is_empty());
    }

    #[test]
    fn snapshot_is_detached_from_the_store() {
        let store = ArtifactStore::new().unwrap();
        store.create_output_sink("unit_c").close();
        let snapshot = store.artifacts();
        store.close();
        assert_eq!(snapshot.len(), 1);
    }

    #[test]
    fn source_input_is_written_read_only() {
        let store = ArtifactStore::new().unwrap();
        let input = store.create_source_input("demo.rs", "fn x() {}").unwrap();
        assert!(input.path().exists());
        assert!(fs::metadata(input.path()).unwrap().permissions().readonly());
        assert_eq!(fs::read_to_string(input.path()).unwrap(), "fn x() {}");
    }

    #[test]
    fn empty_source_name_is_rejected() {
        let store = ArtifactStore::new().unwrap();
        let err = store.create_source_input("  ", "fn x() {}").unwrap_err();
        assert!(matches!(err, ScriptError::InvalidArgument(_)));
    }

    #[test]
    fn locator_for_existing_path_is_canonical() {
        let store = ArtifactStore::new().unwrap();
        let on_disk = store.run_dir().join("real.rs");
        fs::write(&on_disk, "fn y() {}").unwrap();
        let locator = derive_locator(&on_disk.display().to_string());
        assert!(locator.ends_with("real.rs"));
        assert!(!locator.starts_with(VIRTUAL_PREFIX));
    }

    #[test]
    fn locator_for_virtual_name_is_synthesized() {
        assert_eq!(
            derive_locator("scripts.demo.hello.rs"),
            "mem:///scripts/demo/hello.rs"
        );
        assert_eq!(derive_locator("pkg::widget"), "mem:///pkg/widget");
    }

    #[test]
    fn locator_falls_back_to_default() {
        assert_eq!(derive_locator("..."), DEFAULT_LOCATOR);
        assert_eq!(derive_locator("///"), DEFAULT_LOCATOR);
    }

    #[test]
    fn crate_names_are_sanitized() {
        assert_eq!(crate_name_for("hello world.rs"), "hello_world");
        assert_eq!(crate_name_for("9lives.rs"), "_9lives");
        assert_eq!(crate_name_for(""), "script");
    }

    #[test]
    fn run_dir_is_removed_on_drop() {
        let dir = {
            let store = ArtifactStore::new().unwrap();
            store.run_dir().to_path_buf()
        };
        assert!(!dir.exists());
    }
}
