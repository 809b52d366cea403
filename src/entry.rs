//! Entry trampoline.
//!
//! A packaged payload is executed from its first byte, with no startup code and no entry point
//! taken from headers. [`entry!`](crate::entry) places a one-instruction stub in `.text$A`.
//! GNU ld collects `.text$*` input sections sorted by name, and rustc emits every function on a
//! `*-windows-gnu` target into a `.text$<symbol>` section whose mangled name sorts after `A`, so
//! the extracted code stream begins with a jump to the chosen entry function.
//!
//! `link.exe` and `lld-link` order a plain `.text` group ahead of `.text$A`, and rustc on
//! `*-windows-msvc` places function bodies in plain `.text`; the trampoline would not come first
//! there, so those targets are rejected at compile time.

/// Emit the first-instruction trampoline jumping to `$main`.
///
/// Supported toolchains: `x86_64-pc-windows-gnu` and `i686-pc-windows-gnu`, linked without
/// startup objects (`-nostartfiles`). On `*-windows-msvc` the macro is a compile error. On
/// targets that are not Windows it only type-checks `$main`.
///
/// `$main` must be an `extern "C" fn()` that never relies on static initialization.
///
/// ```ignore
/// extern "C" fn payload_main() { /* ... */ }
/// relocatable::entry!(payload_main);
/// ```
#[macro_export]
macro_rules! entry {
    ($main:path) => {
        #[cfg(all(windows, target_env = "msvc"))]
        ::core::compile_error!(
            "entry! needs a *-windows-gnu target: the MSVC linker places plain `.text` ahead of `.text$A`"
        );

        #[cfg(all(windows, target_env = "gnu", any(target_arch = "x86", target_arch = "x86_64")))]
        ::core::arch::global_asm!(
            ".section .text$A,\"xr\"",
            ".globl relocatable_start",
            "relocatable_start:",
            "    jmp {main}",
            ".text",
            main = sym $main,
        );

        const _: extern "C" fn() = $main;
    };
}
