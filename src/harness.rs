//! Invocation harness: the context-injection and entry-point call.
//!
//! Runs author-supplied code on the calling thread with full host
//! privilege. The only protection offered here is error containment: a
//! panic unwinding out of the unit is caught and wrapped, with its payload
//! preserved in the error message.

use crate::context::ExecutionContext;
use crate::error::{Result, ScriptError};
use crate::unit::{ExecutionUnit, RawContext};
use std::ffi::CString;
use std::os::raw::c_char;
use std::panic::{catch_unwind, AssertUnwindSafe};

/// Run a resolved unit against the context.
///
/// The context setter, when the unit exposes one, is invoked first with
/// the flattened attribute table; then the entry point with the argument
/// sequence from the context (default empty). A unit without an entry
/// point is not an error: invocation is skipped and `false` is returned.
/// Non-public units are only invoked under the trust flag.
pub fn run_unit(
    unit: &ExecutionUnit,
    context: &ExecutionContext,
    trust_internal: bool,
) -> Result<bool> {
    if !unit.is_public() && !trust_internal {
        log::debug!(
            "unit '{}' is internal and trust is not set, skipping invocation",
            unit.name()
        );
        return Ok(false);
    }

    if let Some(setter) = unit.context_setter() {
        let keys: Vec<CString> = context
            .attributes()
            .keys()
            .map(|k| c_string(unit, k))
            .collect::<Result<_>>()?;
        let values: Vec<CString> = context
            .attributes()
            .values()
            .map(|v| c_string(unit, v))
            .collect::<Result<_>>()?;
        let key_ptrs: Vec<*const c_char> = keys.iter().map(|k| k.as_ptr()).collect();
        let value_ptrs: Vec<*const c_char> = values.iter().map(|v| v.as_ptr()).collect();
        let table = RawContext {
            len: key_ptrs.len(),
            keys: key_ptrs.as_ptr(),
            values: value_ptrs.as_ptr(),
        };
        catch_unwind(AssertUnwindSafe(|| unsafe { setter(&table) }))
            .map_err(|payload| invocation_error(unit, payload))?;
    }

    let Some(entry) = unit.entry() else {
        log::debug!("unit '{}' has no entry point, invocation skipped", unit.name());
        return Ok(false);
    };

    let arguments: Vec<CString> = context
        .arguments
        .iter()
        .map(|a| c_string(unit, a))
        .collect::<Result<_>>()?;
    let argument_ptrs: Vec<*const c_char> = arguments.iter().map(|a| a.as_ptr()).collect();
    catch_unwind(AssertUnwindSafe(|| unsafe {
        entry(argument_ptrs.len(), argument_ptrs.as_ptr())
    }))
    .map_err(|payload| invocation_error(unit, payload))?;
    Ok(true)
}

fn c_string(unit: &ExecutionUnit, value: &str) -> Result<CString> {
    CString::new(value).map_err(|_| ScriptError::Invocation {
        unit: unit.name().to_string(),
        message: "argument or attribute contains an interior NUL byte".to_string(),
    })
}

fn invocation_error(unit: &ExecutionUnit, payload: Box<dyn std::any::Any + Send>) -> ScriptError {
    let message = if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "opaque panic payload".to_string()
    };
    ScriptError::Invocation {
        unit: unit.name().to_string(),
        message,
    }
}
