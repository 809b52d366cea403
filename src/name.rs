//! Name matching.
//!
//! Module and export names are NUL-terminated byte strings living either in a mapped image or
//! on the caller's stack. Two names are equal only if every byte matches *and* both end at the
//! same position, so `KERNEL32` never matches `KERNEL32.dll`.

use core::ffi::CStr;

/// Longest literal, including its terminator, that [`local_cstr!`](crate::local_cstr) accepts.
pub const LOCAL_CSTR_CAPACITY: usize = 64;

/// Compare two NUL-terminated byte strings for exact equality.
///
/// Both strings are advanced in lockstep. The comparison fails at the first differing byte,
/// which includes one string ending (`0`) while the other continues.
///
/// # Safety
/// Both pointers must reference readable memory up to and including a NUL byte.
#[inline]
pub unsafe fn names_equal(a: *const u8, b: *const u8) -> bool {
    let mut index = 0;
    loop {
        let left = *a.add(index);
        let right = *b.add(index);
        if left != right {
            return false;
        }
        if left == 0 {
            return true;
        }
        index += 1;
    }
}

/// Safe form of [`names_equal`] for names already known to be terminated.
pub fn cstr_equal(a: &CStr, b: &CStr) -> bool {
    unsafe { names_equal(a.as_ptr().cast(), b.as_ptr().cast()) }
}

#[doc(hidden)]
pub const fn byte_at(bytes: &[u8], index: usize) -> u8 {
    if index < bytes.len() {
        bytes[index]
    } else {
        0
    }
}

/// Build a NUL-terminated name as a `[u8; N]` local.
///
/// Each byte is written with a volatile store of a per-index constant, so the generated code
/// carries the name as immediates instead of copying it out of a read-only data section that a
/// packaged payload would not contain.
///
/// ```
/// let name = relocatable::local_cstr!("KERNEL32.dll");
/// assert_eq!(&name, b"KERNEL32.dll\0");
/// ```
#[macro_export]
macro_rules! local_cstr {
    ($text:literal) => {{
        const BYTES: &[u8] = ::core::concat!($text, "\0").as_bytes();
        const _: () = ::core::assert!(
            BYTES.len() <= $crate::name::LOCAL_CSTR_CAPACITY,
            "literal is too long for local_cstr!"
        );
        let mut buffer = [0u8; BYTES.len()];
        $crate::__local_cstr_fill!(buffer, BYTES;
            0 1 2 3 4 5 6 7 8 9 10 11 12 13 14 15
            16 17 18 19 20 21 22 23 24 25 26 27 28 29 30 31
            32 33 34 35 36 37 38 39 40 41 42 43 44 45 46 47
            48 49 50 51 52 53 54 55 56 57 58 59 60 61 62 63
        );
        buffer
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! __local_cstr_fill {
    ($buffer:ident, $bytes:ident; $($index:literal)*) => {
        $(
            if $index < $bytes.len() {
                // SAFETY: `$index` is within the buffer, which is exactly `$bytes.len()` long.
                unsafe {
                    ::core::ptr::write_volatile(
                        $buffer.as_mut_ptr().add($index),
                        {
                            const BYTE: u8 = $crate::name::byte_at($bytes, $index);
                            BYTE
                        },
                    )
                };
            }
        )*
    };
}
