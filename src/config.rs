//! Configuration module.
//!
//! This module defines the command-line interface (CLI) of the `relocatable` host tool using
//! `clap`. The tool runs the resolution engine against PE images on disk and, on Windows,
//! against the tool's own process.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Inspect module exports the way a relocatable payload resolves them.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Config {
    #[command(subcommand)]
    pub command: Command,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "info", help = "Set the logging level")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List the named exports of a PE image
    Exports {
        /// Path to a DLL or EXE
        image: PathBuf,
    },

    /// Resolve one exported function of a PE image
    Resolve {
        /// Path to a DLL or EXE
        image: PathBuf,
        /// Exact, case-sensitive export name
        function: String,
    },

    /// List the modules loaded into this process (Windows only)
    Modules,

    /// Resolve a function from a module loaded into this process (Windows only)
    Lookup {
        /// Name declared by the module's export directory, e.g. KERNEL32.dll
        module: String,
        /// Exact, case-sensitive export name
        function: String,
    },
}
