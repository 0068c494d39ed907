//! Entry-point resolution: select the single unit to execute.
//!
//! Selection honors unit visibility. Non-public units are only eligible
//! when the engine's trust flag is set; bypassing visibility is opt-in,
//! never a silent default.

use crate::error::{Result, ScriptError};
use crate::loader::UnitLoader;
use crate::unit::ExecutionUnit;

/// Resolve the unit to execute.
///
/// With an explicit `main_unit` the loader must produce it and it must
/// expose an entry point, else [`ScriptError::EntryNotFound`]; a
/// non-public unit additionally requires `trust_internal`, else
/// [`ScriptError::AccessDenied`].
///
/// Without one, the loaded units are scanned in encounter order: first a
/// public unit with an entry point; then, only under `trust_internal`,
/// any unit with an entry point; then the first loaded unit as a
/// best-effort default even if it lacks an entry point (the harness skips
/// invocation in that case). No units at all resolves to `None`, which is
/// not an error by itself.
pub fn resolve_entry_unit(
    loader: &UnitLoader,
    main_unit: Option<&str>,
    trust_internal: bool,
) -> Result<Option<ExecutionUnit>> {
    if let Some(name) = main_unit {
        let unit = loader.resolve(name)?;
        if !unit.capability().has_entry() {
            return Err(ScriptError::EntryNotFound {
                unit: name.to_string(),
            });
        }
        if !unit.is_public() && !trust_internal {
            return Err(ScriptError::AccessDenied {
                unit: name.to_string(),
            });
        }
        log::debug!("explicit entry unit '{name}' selected");
        return Ok(Some(unit));
    }

    let units = loader.load_all()?;

    if let Some(unit) = units
        .iter()
        .find(|u| u.is_public() && u.capability().has_entry())
    {
        log::debug!("public entry unit '{}' selected", unit.name());
        return Ok(Some(unit.clone()));
    }

    if trust_internal {
        if let Some(unit) = units.iter().find(|u| u.capability().has_entry()) {
            log::debug!("internal entry unit '{}' selected under trust flag", unit.name());
            return Ok(Some(unit.clone()));
        }
    }

    // Best-effort default: the first loaded unit, entry point or not.
    match units.into_iter().next() {
        Some(unit) => {
            log::debug!("falling back to first loaded unit '{}'", unit.name());
            Ok(Some(unit))
        }
        None => Ok(None),
    }
}
