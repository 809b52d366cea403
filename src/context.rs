//! Resolution context and bootstrap.
//!
//! Bootstrapping resolves the two functions everything else is built on, `LoadLibraryA` and
//! `GetProcAddress`, from `KERNEL32.dll`, which every Windows process has loaded. Caller code
//! then fills its own table of modules and functions through those two pointers only.
//!
//! Bootstrap progresses through
//! `Uninitialized -> EnvironmentLocated -> ModuleEnumerated -> ExportParsed -> SymbolResolved
//! -> Complete`; a failure at any step is reported with the last stage reached, and `Ok` is
//! the `Complete` stage.

use core::ffi::c_void;
use core::mem::{size_of, transmute_copy};
use core::ptr::NonNull;

use thiserror::Error;

use crate::ldr::Modules;
use crate::local_cstr;
use crate::peb::Peb;
use crate::resolver::{find_export, find_module, ResolveError, ResolveResult};

/// A loaded module (`HMODULE`), i.e. the base address of its image.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModuleHandle(NonNull<c_void>);

impl ModuleHandle {
    pub fn new(base: *mut c_void) -> Option<Self> {
        NonNull::new(base).map(Self)
    }

    pub fn base(&self) -> *const u8 {
        self.0.as_ptr() as *const u8
    }
}

/// `HMODULE LoadLibraryA(LPCSTR lpLibFileName)`
pub type LoadLibraryAFn = unsafe extern "system" fn(lp_lib_file_name: *const u8) -> Option<ModuleHandle>;

/// `FARPROC GetProcAddress(HMODULE hModule, LPCSTR lpProcName)`
pub type GetProcAddressFn =
    unsafe extern "system" fn(h_module: ModuleHandle, lp_proc_name: *const u8) -> Option<NonNull<c_void>>;

/// Which foundational function a bootstrap failure concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Foundational {
    LoadLibraryA,
    GetProcAddress,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootstrapStage {
    Uninitialized,
    EnvironmentLocated,
    ModuleEnumerated,
    ExportParsed,
    SymbolResolved,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("bootstrap failed resolving {symbol:?} after {stage:?}: {cause}")]
pub struct BootstrapError {
    /// Last stage reached before the failure.
    pub stage: BootstrapStage,
    pub symbol: Foundational,
    pub cause: ResolveError,
}

/// The two bootstrapped functions.
#[derive(Clone, Copy)]
pub struct Foundation {
    pub load_library_a: LoadLibraryAFn,
    pub get_proc_address: GetProcAddressFn,
}

impl Foundation {
    /// Load (or reference an already loaded) module by file name.
    ///
    /// # Safety
    /// `name` must be NUL-terminated; the pointers in `self` must be valid.
    pub unsafe fn load_module(&self, name: &[u8]) -> ResolveResult<ModuleHandle> {
        debug_assert_eq!(name.last(), Some(&0));
        (self.load_library_a)(name.as_ptr()).ok_or(ResolveError::ModuleNotFound)
    }

    /// Resolve `name` in `module` and reinterpret it as the function pointer type `F`.
    ///
    /// # Safety
    /// `name` must be NUL-terminated and `F` must match the export's real signature.
    pub unsafe fn symbol<F: Copy>(&self, module: ModuleHandle, name: &[u8]) -> ResolveResult<F> {
        const { assert!(size_of::<F>() == size_of::<NonNull<c_void>>()) };
        debug_assert_eq!(name.last(), Some(&0));

        let address = (self.get_proc_address)(module, name.as_ptr()).ok_or(ResolveError::SymbolNotFound)?;
        Ok(transmute_copy(&address))
    }
}

/// A caller-defined table of modules and functions, filled through the foundation.
pub trait ResolutionTable: Sized {
    /// # Safety
    /// `foundation` must hold the real `LoadLibraryA`/`GetProcAddress`.
    unsafe fn resolve(foundation: &Foundation) -> ResolveResult<Self>;
}

/// Bootstrap output plus the caller's extension table.
pub struct Relocatable<T> {
    pub foundation: Foundation,
    pub table: T,
}

impl<T: ResolutionTable> Relocatable<T> {
    /// Bootstrap from `peb`, then let `T` resolve its own entries.
    ///
    /// # Safety
    /// `peb` must be null or point at the live control block of the current process.
    pub unsafe fn initialize(peb: *const Peb) -> Result<Self, InitializeError> {
        let foundation = bootstrap(peb)?;
        let table = T::resolve(&foundation).map_err(InitializeError::Table)?;
        Ok(Self { foundation, table })
    }

    /// [`Relocatable::initialize`] for the current process.
    ///
    /// # Safety
    /// See [`ResolutionTable::resolve`].
    #[cfg(windows)]
    pub unsafe fn current() -> Result<Self, InitializeError> {
        Self::initialize(crate::peb::current_peb())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InitializeError {
    #[error(transparent)]
    Bootstrap(#[from] BootstrapError),

    #[error("failed to resolve the function table: {0}")]
    Table(ResolveError),
}

/// Resolve `LoadLibraryA` and `GetProcAddress` from `KERNEL32.dll` in the process owning `peb`.
///
/// # Safety
/// `peb` must be null or point at a live control block.
pub unsafe fn bootstrap(peb: *const Peb) -> Result<Foundation, BootstrapError> {
    let kernel32 = local_cstr!("KERNEL32.dll");
    let load_library_a = local_cstr!("LoadLibraryA");
    let get_proc_address = local_cstr!("GetProcAddress");

    let mut stage = BootstrapStage::Uninitialized;
    let fail = |stage, symbol, cause| BootstrapError { stage, symbol, cause };

    if peb.is_null() {
        return Err(fail(stage, Foundational::LoadLibraryA, ResolveError::NoEnvironment));
    }
    stage = BootstrapStage::EnvironmentLocated;

    if Modules::new(peb).next().is_none() {
        return Err(fail(stage, Foundational::LoadLibraryA, ResolveError::ModuleNotFound));
    }
    stage = BootstrapStage::ModuleEnumerated;

    let (_, exports) = find_module(peb, kernel32.as_ptr())
        .map_err(|cause| fail(stage, Foundational::LoadLibraryA, cause))?;
    debug!(base = ?exports.base(), "located kernel32");
    stage = BootstrapStage::ExportParsed;

    let load = find_export(&exports, load_library_a.as_ptr())
        .map_err(|cause| fail(stage, Foundational::LoadLibraryA, cause))?;
    stage = BootstrapStage::SymbolResolved;

    let get = find_export(&exports, get_proc_address.as_ptr())
        .map_err(|cause| fail(stage, Foundational::GetProcAddress, cause))?;

    Ok(Foundation {
        load_library_a: transmute_copy::<NonNull<c_void>, LoadLibraryAFn>(&load),
        get_proc_address: transmute_copy::<NonNull<c_void>, GetProcAddressFn>(&get),
    })
}
