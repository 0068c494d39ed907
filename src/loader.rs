//! Artifact loader: materializes stored artifact bytes into execution
//! units, delegating unresolved names to a parent loader or classpath
//! search roots.
//!
//! One loader serves exactly one compile or evaluate call and is not
//! shared across threads. Materialization is single-use: resolving a name
//! out of the artifact map evicts its bytes, releasing the memory; a
//! second resolve of the same name falls through to delegation. Units keep
//! their own library handle, so they stay usable after the loader is gone.

use crate::error::{Result, ScriptError};
use crate::store::{create_run_dir, remove_run_dir, ArtifactMap};
use crate::unit::ExecutionUnit;
use libloading::Library;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// One resolved classpath element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClasspathEntry {
    /// An existing local directory (or file) used as a search root.
    Local(PathBuf),
    /// A well-formed remote locator. Recognized but unable to materialize
    /// units in-process: there is no remote transport for mapped code.
    Remote(String),
}

/// Resolve a single classpath token.
///
/// Existing filesystem paths become local search roots; `scheme://`
/// locators are kept as remote entries; anything else is rejected with a
/// reason instead of being silently swallowed.
pub fn resolve_classpath_token(token: &str) -> std::result::Result<ClasspathEntry, String> {
    let token = token.trim();
    if token.is_empty() {
        return Err("empty classpath token".to_string());
    }
    let path = Path::new(token);
    if path.exists() {
        return Ok(ClasspathEntry::Local(path.to_path_buf()));
    }
    if let Some((scheme, rest)) = token.split_once("://") {
        let scheme_ok = !scheme.is_empty()
            && scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
        if scheme_ok && !rest.is_empty() {
            return Ok(ClasspathEntry::Remote(token.to_string()));
        }
        return Err(format!("malformed locator '{token}'"));
    }
    Err(format!(
        "'{token}' is neither an existing path nor a remote locator"
    ))
}

/// Split a classpath on the platform path separator and resolve every
/// token. Returns the usable entries plus one diagnostic per skipped
/// token.
pub fn parse_classpath(classpath: &str) -> (Vec<ClasspathEntry>, Vec<String>) {
    let mut entries = Vec::new();
    let mut skipped = Vec::new();
    for token in std::env::split_paths(classpath) {
        match resolve_classpath_token(&token.to_string_lossy()) {
            Ok(entry) => entries.push(entry),
            Err(reason) => skipped.push(reason),
        }
    }
    (entries, skipped)
}

/// Per-call loader over one compilation's artifact map.
pub struct UnitLoader {
    artifacts: Mutex<ArtifactMap>,
    entries: Vec<ClasspathEntry>,
    skipped: Vec<String>,
    parent: Option<Arc<UnitLoader>>,
    scratch: PathBuf,
}

impl UnitLoader {
    /// Wrap an artifact map, an optional classpath and an optional parent
    /// loader. Unusable classpath tokens are reported through
    /// [`UnitLoader::skipped_classpath_tokens`] and logged.
    pub fn new(
        artifacts: ArtifactMap,
        classpath: Option<&str>,
        parent: Option<Arc<UnitLoader>>,
    ) -> Result<Self> {
        let (entries, skipped) = match classpath {
            Some(cp) if !cp.trim().is_empty() => parse_classpath(cp),
            _ => (Vec::new(), Vec::new()),
        };
        for reason in &skipped {
            log::warn!("classpath token skipped: {reason}");
        }
        Ok(UnitLoader {
            artifacts: Mutex::new(artifacts),
            entries,
            skipped,
            parent,
            scratch: create_run_dir("loader")?,
        })
    }

    /// Diagnostics for classpath tokens that could not be resolved.
    pub fn skipped_classpath_tokens(&self) -> &[String] {
        &self.skipped
    }

    /// Names still materializable from the artifact map, in map order.
    pub fn remaining(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Materialize the unit of the given name.
    ///
    /// The artifact map is consulted first; a hit evicts the bytes, so the
    /// map shrinks as units are materialized. On a miss the parent loader
    /// is delegated to, then the local classpath roots are searched for
    /// the platform library file. Remote classpath entries are bypassed.
    pub fn resolve(&self, name: &str) -> Result<ExecutionUnit> {
        let bytes = self.lock().remove(name);
        if let Some(bytes) = bytes {
            return self.materialize(name, &bytes);
        }

        if let Some(parent) = &self.parent {
            match parent.resolve(name) {
                Ok(unit) => return Ok(unit),
                Err(ScriptError::ArtifactNotFound { .. }) => {}
                Err(e) => return Err(e),
            }
        }

        let file_name = platform_library_name(name);
        for entry in &self.entries {
            match entry {
                ClasspathEntry::Local(root) => {
                    let candidate = root.join(&file_name);
                    if candidate.exists() {
                        return self.load_from_path(name, &candidate);
                    }
                }
                ClasspathEntry::Remote(locator) => {
                    log::debug!(
                        "classpath entry '{locator}' bypassed while resolving '{name}': \
                         remote locators cannot materialize units"
                    );
                }
            }
        }

        Err(ScriptError::ArtifactNotFound {
            name: name.to_string(),
        })
    }

    /// Materialize every remaining map entry, each name once, in map
    /// iteration order at call time.
    pub fn load_all(&self) -> Result<Vec<ExecutionUnit>> {
        let drained = std::mem::take(&mut *self.lock());
        let mut units = Vec::with_capacity(drained.len());
        for (name, bytes) in &drained {
            units.push(self.materialize(name, bytes)?);
        }
        Ok(units)
    }

    fn materialize(&self, name: &str, bytes: &[u8]) -> Result<ExecutionUnit> {
        let path = self.scratch.join(platform_library_name(name));
        std::fs::write(&path, bytes)?;
        self.load_from_path(name, &path)
    }

    fn load_from_path(&self, name: &str, path: &Path) -> Result<ExecutionUnit> {
        log::debug!("materializing unit '{name}' from {}", path.display());
        // Loading executes the library's initializers with host privilege.
        // That is the engine's documented trust model.
        let library = unsafe { Library::new(path) }.map_err(|cause| ScriptError::Materialize {
            name: name.to_string(),
            cause,
        })?;
        Ok(ExecutionUnit::from_library(name.to_string(), library))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ArtifactMap> {
        // Loaders are call-scoped and not thread-shared, so the lock
        // cannot be observed poisoned.
        self.artifacts.lock().expect("artifact map lock poisoned")
    }
}

impl Drop for UnitLoader {
    fn drop(&mut self) {
        // On platforms that keep mapped files open this directory may
        // outlive the loader until the units drop; removal failures are
        // logged, not raised.
        remove_run_dir(&self.scratch);
    }
}

/// Platform file name of a unit's shared library.
pub fn platform_library_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.dll")
    } else if cfg!(target_os = "macos") {
        format!("lib{name}.dylib")
    } else {
        format!("lib{name}.so")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_resolution_covers_the_three_outcomes() {
        let dir = std::env::temp_dir();
        match resolve_classpath_token(&dir.display().to_string()) {
            Ok(ClasspathEntry::Local(p)) => assert_eq!(p, dir),
            other => panic!("expected local entry, got {other:?}"),
        }
        assert_eq!(
            resolve_classpath_token("https://repo.example.com/units"),
            Ok(ClasspathEntry::Remote(
                "https://repo.example.com/units".to_string()
            ))
        );
        assert!(resolve_classpath_token("/no/such/dir/rustscript-test").is_err());
        assert!(resolve_classpath_token("").is_err());
        assert!(resolve_classpath_token("bad scheme://x").is_err());
    }

    #[test]
    fn parse_classpath_reports_skips() {
        let dir = std::env::temp_dir().display().to_string();
        let sep = if cfg!(windows) { ';' } else { ':' };
        let classpath = format!("{dir}{sep}/no/such/dir/rustscript-test");
        let (entries, skipped) = parse_classpath(&classpath);
        assert_eq!(entries.len(), 1);
        assert_eq!(skipped.len(), 1);
        assert!(skipped[0].contains("/no/such/dir/rustscript-test"));
    }

    #[test]
    fn missing_artifact_is_reported_by_name() {
        let loader = UnitLoader::new(ArtifactMap::new(), None, None).unwrap();
        match loader.resolve("ghost") {
            Err(ScriptError::ArtifactNotFound { name }) => assert_eq!(name, "ghost"),
            other => panic!("expected ArtifactNotFound, got {other:?}"),
        }
    }

    #[test]
    fn unloadable_bytes_fail_materialization() {
        let mut artifacts = ArtifactMap::new();
        artifacts.insert("junk".to_string(), b"not a shared library".to_vec());
        let loader = UnitLoader::new(artifacts, None, None).unwrap();
        match loader.resolve("junk") {
            Err(ScriptError::Materialize { name, .. }) => assert_eq!(name, "junk"),
            other => panic!("expected Materialize error, got {other:?}"),
        }
        // The bytes were evicted by the attempt; a second resolve misses.
        assert!(matches!(
            loader.resolve("junk"),
            Err(ScriptError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn parent_misses_fall_through_to_not_found() {
        let parent = Arc::new(UnitLoader::new(ArtifactMap::new(), None, None).unwrap());
        let loader = UnitLoader::new(ArtifactMap::new(), None, Some(parent)).unwrap();
        assert!(matches!(
            loader.resolve("ghost"),
            Err(ScriptError::ArtifactNotFound { .. })
        ));
    }

    #[test]
    fn load_all_drains_the_map() {
        let loader = UnitLoader::new(ArtifactMap::new(), None, None).unwrap();
        assert!(loader.load_all().unwrap().is_empty());
        assert!(loader.remaining().is_empty());
    }

    #[test]
    fn library_names_follow_the_platform() {
        let name = platform_library_name("demo");
        if cfg!(windows) {
            assert_eq!(name, "demo.dll");
        } else if cfg!(target_os = "macos") {
            assert_eq!(name, "libdemo.dylib");
        } else {
            assert_eq!(name, "libdemo.so");
        }
    }
}
