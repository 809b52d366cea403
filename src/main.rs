//! Entry point for the relocatable host tool.
//!
//! This file handles high-level application flow:
//! 1. Parse command-line arguments using `clap`.
//! 2. Install the `tracing` subscriber at the requested level.
//! 3. Run the requested command through the same engine a payload uses: the export parser and
//!    resolver over a PE image mapped from disk, or the module walker over this process.
//!
//! Error handling is done via `anyhow`.

use anyhow::{Context, Result};
use clap::Parser;
use std::ffi::{CStr, CString};
use std::path::Path;
use tracing_subscriber::EnvFilter;

use relocatable::config::{Command, Config};
use relocatable::image::{format_export, MappedImage};
use relocatable::resolver::resolve_in_module;

fn main() -> Result<()> {
    let config = Config::parse();

    let filter = EnvFilter::try_new(&config.log_level)
        .with_context(|| format!("invalid log level {}", config.log_level))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match config.command {
        Command::Exports { image } => exports(&image),
        Command::Resolve { image, function } => resolve(&image, &function),
        Command::Modules => modules(),
        Command::Lookup { module, function } => lookup(&module, &function),
    }
}

fn exports(path: &Path) -> Result<()> {
    let image = MappedImage::open(path)?;
    let Some(table) = image.exports()? else {
        println!("{} has no export table", path.display());
        return Ok(());
    };

    let module = unsafe { CStr::from_ptr(table.module_name().cast()) };
    println!(
        "{} ({} names, {} functions, ordinal base {})",
        module.to_string_lossy(),
        table.number_of_names(),
        table.number_of_functions(),
        table.ordinal_base()
    );
    for export in table.iter() {
        println!("{}", unsafe { format_export(&table, &export) });
    }
    Ok(())
}

fn resolve(path: &Path, function: &str) -> Result<()> {
    let image = MappedImage::open(path)?;
    image.exports()?;

    let name = CString::new(function).context("function name contains a NUL byte")?;
    let address = unsafe { resolve_in_module(image.base(), name.as_ptr().cast()) }
        .with_context(|| format!("failed to resolve {} in {}", function, path.display()))?;

    let rva = address.as_ptr() as u64 - image.base() as u64;
    println!(
        "{} rva {:#x} address {:#x}",
        function,
        rva,
        image.preferred_base() + rva
    );
    Ok(())
}

#[cfg(windows)]
fn modules() -> Result<()> {
    use relocatable::export::ExportTable;
    use relocatable::ldr::Modules;
    use relocatable::peb::current_peb;

    for module in unsafe { Modules::new(current_peb()) } {
        let declared = unsafe { ExportTable::parse(module.base()) }
            .map(|table| unsafe { CStr::from_ptr(table.module_name().cast()) }.to_string_lossy().into_owned())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:#018x} {:#010x} {:<28} {}",
            module.base() as usize,
            module.size_of_image(),
            String::from_utf16_lossy(module.base_dll_name()),
            declared
        );
    }
    Ok(())
}

#[cfg(not(windows))]
fn modules() -> Result<()> {
    anyhow::bail!("the modules command walks the live loader list and only runs on Windows")
}

#[cfg(windows)]
fn lookup(module: &str, function: &str) -> Result<()> {
    use relocatable::resolver::resolve_current;

    let module_name = CString::new(module).context("module name contains a NUL byte")?;
    let function_name = CString::new(function).context("function name contains a NUL byte")?;
    let address = unsafe { resolve_current(module_name.as_ptr().cast(), function_name.as_ptr().cast()) }
        .with_context(|| format!("failed to resolve {}!{}", module, function))?;

    println!("{}!{} {:#x}", module, function, address.as_ptr() as usize);
    Ok(())
}

#[cfg(not(windows))]
fn lookup(module: &str, function: &str) -> Result<()> {
    anyhow::bail!(
        "cannot look up {}!{}: the lookup command resolves in the live process and only runs on Windows",
        module,
        function
    )
}
