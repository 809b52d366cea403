//! Relocatable symbol resolution library.
//!
//! This library resolves operating-system function addresses from code that runs as a raw,
//! relocation-free instruction stream: no import table, no loader-provided data section.
//! It is organized into several modules:
//! - `peb`: Control block layouts and the thread-local environment locator.
//! - `ldr`: Walking the loader's circular module list.
//! - `export`: Parsing a module's in-memory export directory.
//! - `name`: Exact matching of NUL-terminated names and stack-built name literals.
//! - `resolver`: Mapping (module name, function name) to an absolute address.
//! - `context`: Bootstrapping the two foundational functions and the caller's table.
//! - `entry`: The first-instruction trampoline for packaged payloads.
//!
//! With the `cli` feature the crate also carries `config` and `image`, used by the
//! `relocatable` host tool to run the same engine against PE files on disk.

#![cfg_attr(not(any(test, feature = "std")), no_std)]

#[macro_use]
mod log;

pub mod context;
pub mod entry;
pub mod export;
pub mod ldr;
pub mod name;
pub mod peb;
pub mod resolver;

#[cfg(feature = "cli")]
pub mod config;
#[cfg(feature = "cli")]
pub mod image;

#[cfg(test)]
pub(crate) mod fixture;

pub use context::{Foundation, ModuleHandle, Relocatable, ResolutionTable};
pub use resolver::{ResolveError, ResolveResult};
