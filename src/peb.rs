//! Process Environment Block (PEB) layouts and the environment locator.
//!
//! Only the leading fields the resolver actually reads are declared. Every structure here is
//! owned by the OS loader and is only ever read through raw pointers.
//!
//! The PEB address lives in the Thread Environment Block, which the processor exposes through
//! a segment register: `gs:[0x60]` on x86_64 and `fs:[0x30]` on x86.

use core::ffi::c_void;
use core::mem::{offset_of, size_of};

/// Doubly linked list node embedded in loader records (`LIST_ENTRY`).
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct ListEntry {
    pub flink: *mut ListEntry,
    pub blink: *mut ListEntry,
}

/// Counted UTF-16 string (`UNICODE_STRING`). `length` is in bytes, excluding any terminator.
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct UnicodeString {
    pub length: u16,
    pub maximum_length: u16,
    pub buffer: *mut u16,
}

/// Loader data (`PEB_LDR_DATA`) holding the heads of the three module lists.
#[repr(C)]
pub struct PebLdrData {
    pub length: u32,
    pub initialized: u8,
    pub ss_handle: *mut c_void,
    pub in_load_order_module_list: ListEntry,
    pub in_memory_order_module_list: ListEntry,
    pub in_initialization_order_module_list: ListEntry,
    pub entry_in_progress: *mut c_void,
}

/// One loaded module (`LDR_DATA_TABLE_ENTRY`), truncated after `base_dll_name`.
#[repr(C)]
pub struct LdrDataTableEntry {
    pub in_load_order_links: ListEntry,
    pub in_memory_order_links: ListEntry,
    pub in_initialization_order_links: ListEntry,
    pub dll_base: *mut c_void,
    pub entry_point: *mut c_void,
    pub size_of_image: u32,
    pub full_dll_name: UnicodeString,
    pub base_dll_name: UnicodeString,
}

/// Process Environment Block, truncated after `ldr`.
#[repr(C)]
pub struct Peb {
    pub inherited_address_space: u8,
    pub read_image_file_exec_options: u8,
    pub being_debugged: u8,
    pub bit_field: u8,
    pub mutant: *mut c_void,
    pub image_base_address: *mut c_void,
    pub ldr: *mut PebLdrData,
}

/// Byte position of `in_memory_order_links` inside [`LdrDataTableEntry`].
///
/// Nodes of the in-memory-order list point at this field, not at the start of the record.
pub const IN_MEMORY_ORDER_LINKS_OFFSET: usize = offset_of!(LdrDataTableEntry, in_memory_order_links);

#[cfg(target_pointer_width = "64")]
const _: () = {
    assert!(offset_of!(Peb, ldr) == 0x18);
    assert!(offset_of!(PebLdrData, in_memory_order_module_list) == 0x20);
    assert!(IN_MEMORY_ORDER_LINKS_OFFSET == 0x10);
    assert!(offset_of!(LdrDataTableEntry, dll_base) == 0x30);
    assert!(offset_of!(LdrDataTableEntry, base_dll_name) == 0x58);
    assert!(size_of::<LdrDataTableEntry>() == 0x68);
};

#[cfg(target_pointer_width = "32")]
const _: () = {
    assert!(offset_of!(Peb, ldr) == 0x0C);
    assert!(offset_of!(PebLdrData, in_memory_order_module_list) == 0x14);
    assert!(IN_MEMORY_ORDER_LINKS_OFFSET == 0x08);
    assert!(offset_of!(LdrDataTableEntry, dll_base) == 0x18);
    assert!(offset_of!(LdrDataTableEntry, base_dll_name) == 0x2C);
    assert!(size_of::<LdrDataTableEntry>() == 0x34);
};

/// Offset of the PEB pointer inside the TEB.
#[cfg(all(windows, target_arch = "x86_64"))]
pub const TEB_PEB_OFFSET: usize = 0x60;

/// Offset of the PEB pointer inside the TEB.
#[cfg(all(windows, target_arch = "x86"))]
pub const TEB_PEB_OFFSET: usize = 0x30;

#[cfg(all(windows, not(any(target_arch = "x86", target_arch = "x86_64"))))]
compile_error!("the environment locator only supports x86 and x86_64 Windows targets");

/// Get the current process's PEB.
///
/// Reads the thread-local PEB pointer from the segment the OS reserves for the TEB. The result
/// is never null for a thread created by the Windows loader.
#[cfg(all(windows, target_arch = "x86_64"))]
#[inline(always)]
pub fn current_peb() -> *const Peb {
    let peb: *const Peb;
    unsafe {
        core::arch::asm!(
            "mov {}, gs:[{offset}]",
            out(reg) peb,
            offset = const TEB_PEB_OFFSET,
            options(nostack, readonly, preserves_flags),
        )
    };
    peb
}

/// Get the current process's PEB.
///
/// Reads the thread-local PEB pointer from the segment the OS reserves for the TEB. The result
/// is never null for a thread created by the Windows loader.
#[cfg(all(windows, target_arch = "x86"))]
#[inline(always)]
pub fn current_peb() -> *const Peb {
    let peb: *const Peb;
    unsafe {
        core::arch::asm!(
            "mov {}, fs:[{offset}]",
            out(reg) peb,
            offset = const TEB_PEB_OFFSET,
            options(nostack, readonly, preserves_flags),
        )
    };
    peb
}
