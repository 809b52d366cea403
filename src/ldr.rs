//! Module list walker.
//!
//! The loader keeps every module in a circular, intrusive doubly linked list whose head lives
//! in [`PebLdrData`]. Walking starts at the head's successor and follows `flink` until that
//! first node comes around again; the list length is never consulted.

use core::ffi::c_void;
use core::slice;

use crate::peb::{LdrDataTableEntry, ListEntry, Peb, IN_MEMORY_ORDER_LINKS_OFFSET};

/// Recover the loader record that embeds an in-memory-order link.
///
/// This is the only place the crate converts a list node into its containing record.
///
/// # Safety
/// `links` must point at the `in_memory_order_links` field of a live [`LdrDataTableEntry`].
#[inline(always)]
pub unsafe fn entry_from_links(links: *const ListEntry) -> *const LdrDataTableEntry {
    links.byte_sub(IN_MEMORY_ORDER_LINKS_OFFSET).cast()
}

/// Raw traversal of a circular list, yielding every node exactly once.
///
/// Starting at `start`, nodes are produced until following `flink` would return to `start`.
/// List heads are ordinary nodes here; [`Modules`] is what filters them out.
pub struct ListWalk {
    first: *const ListEntry,
    cursor: *const ListEntry,
    done: bool,
}

impl ListWalk {
    /// # Safety
    /// `start` must be a node of a well-formed circular list that stays alive and unmodified
    /// while the walk is in use.
    pub unsafe fn new(start: *const ListEntry) -> Self {
        Self {
            first: start,
            cursor: start,
            done: start.is_null(),
        }
    }
}

impl Iterator for ListWalk {
    type Item = *const ListEntry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let node = self.cursor;
        let next = unsafe { (*node).flink } as *const ListEntry;
        self.done = next == self.first;
        self.cursor = next;
        Some(node)
    }
}

/// One loaded module as seen through its loader record.
#[derive(Debug, Clone, Copy)]
pub struct ModuleEntry {
    entry: *const LdrDataTableEntry,
}

impl ModuleEntry {
    /// Image base of the module, i.e. its module handle.
    pub fn base(&self) -> *const u8 {
        unsafe { (*self.entry).dll_base as *const u8 }
    }

    /// Size of the mapped image in bytes.
    pub fn size_of_image(&self) -> u32 {
        unsafe { (*self.entry).size_of_image }
    }

    /// The loader's file name for this module (e.g. `KERNEL32.DLL`), as UTF-16 code units.
    pub fn base_dll_name(&self) -> &[u16] {
        let name = unsafe { (*self.entry).base_dll_name };
        if name.buffer.is_null() {
            return &[];
        }
        unsafe { slice::from_raw_parts(name.buffer, name.length as usize / 2) }
    }

    /// The underlying loader record.
    pub fn record(&self) -> *const LdrDataTableEntry {
        self.entry
    }
}

/// Lazy sequence of the modules loaded into a process, in memory order.
///
/// Holds no state beyond the traversal itself; walk again by calling [`Modules::new`] again.
pub struct Modules {
    head: *const ListEntry,
    walk: ListWalk,
}

impl Modules {
    /// Walk the in-memory-order module list reachable from `peb`.
    ///
    /// # Safety
    /// `peb` must point at a live control block whose loader data and module list remain
    /// valid while the sequence is in use.
    pub unsafe fn new(peb: *const Peb) -> Self {
        let ldr = (*peb).ldr;
        let head = core::ptr::addr_of!((*ldr).in_memory_order_module_list);
        Self {
            head,
            walk: ListWalk::new((*head).flink),
        }
    }
}

impl Iterator for Modules {
    type Item = ModuleEntry;

    fn next(&mut self) -> Option<Self::Item> {
        for node in self.walk.by_ref() {
            if node == self.head {
                continue;
            }

            let entry = unsafe { entry_from_links(node) };
            let base: *mut c_void = unsafe { (*entry).dll_base };
            if base.is_null() {
                trace!("skipping loader entry without a module base");
                continue;
            }

            return Some(ModuleEntry { entry });
        }
        None
    }
}
