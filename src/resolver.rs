//! Symbol resolution.
//!
//! Composes the module walker, export parser and name matcher to map
//! `(module name, function name)` to an absolute address. Nothing is cached: every lookup walks
//! the module list and scans the name table again.

use core::ffi::c_void;
use core::ptr::NonNull;

use thiserror::Error;

use crate::export::ExportTable;
use crate::ldr::{ModuleEntry, Modules};
use crate::name::names_equal;
use crate::peb::Peb;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ResolveError {
    #[error("no control block is available")]
    NoEnvironment,

    #[error("no loaded module has the requested name")]
    ModuleNotFound,

    #[error("the module has no export table")]
    NoExportTable,

    #[error("the module does not export the requested symbol")]
    SymbolNotFound,
}

pub type ResolveResult<T> = Result<T, ResolveError>;

/// Find the loaded module whose export directory declares `module` as its name.
///
/// Modules without an export table cannot declare a name and are passed over.
///
/// # Safety
/// `peb` must be null or point at a live control block; `module` must be NUL-terminated.
pub unsafe fn find_module(peb: *const Peb, module: *const u8) -> ResolveResult<(ModuleEntry, ExportTable)> {
    if peb.is_null() {
        return Err(ResolveError::NoEnvironment);
    }

    for entry in Modules::new(peb) {
        let Some(exports) = ExportTable::parse(entry.base()) else {
            continue;
        };
        if names_equal(module, exports.module_name()) {
            debug!(base = ?entry.base(), "matched module");
            return Ok((entry, exports));
        }
    }
    Err(ResolveError::ModuleNotFound)
}

/// Scan `exports` in declaration order for `function` and return its absolute address.
///
/// # Safety
/// The image behind `exports` must still be mapped; `function` must be NUL-terminated.
pub unsafe fn find_export(exports: &ExportTable, function: *const u8) -> ResolveResult<NonNull<c_void>> {
    trace!(names = exports.number_of_names(), "scanning export names");
    for index in 0..exports.number_of_names() {
        let Some(name) = exports.name(index) else {
            break;
        };
        if !names_equal(function, name) {
            continue;
        }

        let ordinal = exports.ordinal(index).ok_or(ResolveError::SymbolNotFound)?;
        return exports
            .function_address(ordinal)
            .ok_or(ResolveError::SymbolNotFound);
    }
    Err(ResolveError::SymbolNotFound)
}

/// Resolve `function` exported by the module named `module` in the process owning `peb`.
///
/// # Safety
/// `peb` must be null or point at a live control block; both names must be NUL-terminated.
pub unsafe fn resolve(peb: *const Peb, module: *const u8, function: *const u8) -> ResolveResult<NonNull<c_void>> {
    let (_, exports) = find_module(peb, module)?;
    find_export(&exports, function)
}

/// Resolve `function` in the module mapped at `base` (a module handle).
///
/// # Safety
/// `base` must point at a mapped PE image; `function` must be NUL-terminated.
pub unsafe fn resolve_in_module(base: *const u8, function: *const u8) -> ResolveResult<NonNull<c_void>> {
    let exports = ExportTable::parse(base).ok_or(ResolveError::NoExportTable)?;
    find_export(&exports, function)
}

/// Resolve `function` from the module named `module` in the current process.
///
/// # Safety
/// Both names must be NUL-terminated.
#[cfg(windows)]
pub unsafe fn resolve_current(module: *const u8, function: *const u8) -> ResolveResult<NonNull<c_void>> {
    resolve(crate::peb::current_peb(), module, function)
}
