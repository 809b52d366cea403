//! Export directory parser.
//!
//! Walks the mapped image headers `IMAGE_DOS_HEADER -> IMAGE_NT_HEADERS -> DataDirectory[0]`
//! to reach the module's `IMAGE_EXPORT_DIRECTORY`. Images placed in memory by the OS loader are
//! trusted, so nothing beyond the presence of the export directory is checked here.

use core::ffi::{c_void, CStr};
use core::mem::{offset_of, size_of};
use core::ptr::NonNull;

use object::pe::{
    ImageDataDirectory, ImageDosHeader, ImageExportDirectory, ImageNtHeaders64, ImageOptionalHeader32,
    ImageOptionalHeader64, IMAGE_DIRECTORY_ENTRY_EXPORT, IMAGE_NT_OPTIONAL_HDR32_MAGIC,
};
use object::LittleEndian as LE;

#[inline(always)]
unsafe fn read<T: Copy>(base: *const u8, offset: usize) -> T {
    base.add(offset).cast::<T>().read_unaligned()
}

/// Offset of the export entry of `DataDirectory`, from the image base.
///
/// The optional header sits at the same offset in PE32 and PE32+ images; only its fixed part
/// differs in size, which the magic selects.
///
/// # Safety
/// `base` must point at a mapped PE image with readable headers.
pub unsafe fn export_data_directory_offset(base: *const u8) -> usize {
    let dos = read::<ImageDosHeader>(base, 0);
    let optional_header = dos.e_lfanew.get(LE) as usize + offset_of!(ImageNtHeaders64, optional_header);
    let data_directory = match read::<u16>(base, optional_header) {
        IMAGE_NT_OPTIONAL_HDR32_MAGIC => optional_header + size_of::<ImageOptionalHeader32>(),
        _ => optional_header + size_of::<ImageOptionalHeader64>(),
    };
    data_directory + IMAGE_DIRECTORY_ENTRY_EXPORT * size_of::<ImageDataDirectory>()
}

/// Locate the export data directory entry of a mapped image.
///
/// # Safety
/// `base` must point at a mapped PE image with readable headers.
pub unsafe fn export_data_directory(base: *const u8) -> ImageDataDirectory {
    read(base, export_data_directory_offset(base))
}

/// A named export, in the order the directory declares it.
#[derive(Debug, Clone, Copy)]
pub struct Export {
    /// Position in the name table.
    pub index: u32,
    /// NUL-terminated name inside the image.
    pub name: *const u8,
    /// Unbiased index into the function address table.
    pub ordinal: u16,
    /// Function RVA, or 0 for an empty slot.
    pub rva: u32,
}

impl Export {
    /// # Safety
    /// The owning image must still be mapped.
    pub unsafe fn name(&self) -> &CStr {
        CStr::from_ptr(self.name.cast())
    }
}

/// View over one module's export directory.
#[derive(Debug, Clone, Copy)]
pub struct ExportTable {
    base: *const u8,
    directory: ImageExportDirectory,
    data_directory: ImageDataDirectory,
}

impl ExportTable {
    /// Parse the export directory of the module mapped at `base`.
    ///
    /// Returns `None` when the export data directory is empty, which is how a module without
    /// exports looks; it is not treated as an error.
    ///
    /// # Safety
    /// `base` must point at a PE image mapped by the OS loader (or laid out the same way), and
    /// the image must outlive the returned view.
    pub unsafe fn parse(base: *const u8) -> Option<Self> {
        let data_directory = export_data_directory(base);
        let rva = data_directory.virtual_address.get(LE);
        if rva == 0 {
            return None;
        }

        let directory = read::<ImageExportDirectory>(base, rva as usize);
        Some(Self {
            base,
            directory,
            data_directory,
        })
    }

    pub fn base(&self) -> *const u8 {
        self.base
    }

    pub fn directory(&self) -> &ImageExportDirectory {
        &self.directory
    }

    /// RVA and size of the export directory itself.
    pub fn data_directory(&self) -> ImageDataDirectory {
        self.data_directory
    }

    /// The module's declared name (e.g. `KERNEL32.dll`), NUL-terminated.
    pub fn module_name(&self) -> *const u8 {
        self.at(self.directory.name.get(LE))
    }

    pub fn number_of_names(&self) -> u32 {
        self.directory.number_of_names.get(LE)
    }

    pub fn number_of_functions(&self) -> u32 {
        self.directory.number_of_functions.get(LE)
    }

    /// Bias added to address table indices to form public ordinals.
    pub fn ordinal_base(&self) -> u32 {
        self.directory.base.get(LE)
    }

    /// Public ordinal of the address table entry at `ordinal`.
    ///
    /// Wraps like the loader's 32-bit arithmetic, so a corrupt base cannot overflow.
    pub fn biased_ordinal(&self, ordinal: u16) -> u32 {
        self.ordinal_base().wrapping_add(ordinal as u32)
    }

    /// RVAs of the address, name and ordinal tables.
    pub fn table_rvas(&self) -> (u32, u32, u32) {
        (
            self.directory.address_of_functions.get(LE),
            self.directory.address_of_names.get(LE),
            self.directory.address_of_name_ordinals.get(LE),
        )
    }

    /// RVA of the `index`th entry of the name table.
    pub fn name_rva(&self, index: u32) -> Option<u32> {
        if index >= self.number_of_names() {
            return None;
        }
        Some(self.table(self.directory.address_of_names.get(LE), index))
    }

    /// Pointer to the `index`th exported name.
    pub fn name(&self, index: u32) -> Option<*const u8> {
        self.name_rva(index).map(|rva| self.at(rva))
    }

    /// Ordinal table entry paired with the `index`th name.
    pub fn ordinal(&self, index: u32) -> Option<u16> {
        if index >= self.number_of_names() {
            return None;
        }
        let offset = self.directory.address_of_name_ordinals.get(LE) as usize + index as usize * 2;
        Some(unsafe { read::<u16>(self.base, offset) })
    }

    /// Function RVA stored at `ordinal` in the address table.
    pub fn function_rva(&self, ordinal: u16) -> Option<u32> {
        if ordinal as u32 >= self.number_of_functions() {
            return None;
        }
        Some(self.table(self.directory.address_of_functions.get(LE), ordinal as u32))
    }

    /// Absolute address of the function at `ordinal` in the address table.
    pub fn function_address(&self, ordinal: u16) -> Option<NonNull<c_void>> {
        let rva = self.function_rva(ordinal)?;
        if rva == 0 {
            return None;
        }
        NonNull::new(self.at(rva) as *mut c_void)
    }

    /// Resolve a biased ordinal (as used in import-by-ordinal) to an absolute address.
    pub fn by_ordinal(&self, ordinal: u32) -> Option<NonNull<c_void>> {
        let index = ordinal.wrapping_sub(self.ordinal_base());
        self.function_address(u16::try_from(index).ok()?)
    }

    /// Named exports in declaration order.
    pub fn iter(&self) -> Exports<'_> {
        Exports {
            table: self,
            index: 0,
        }
    }

    fn table(&self, rva: u32, index: u32) -> u32 {
        unsafe { read::<u32>(self.base, rva as usize + index as usize * 4) }
    }

    fn at(&self, rva: u32) -> *const u8 {
        self.base.wrapping_add(rva as usize)
    }
}

/// Iterator over [`ExportTable::iter`].
pub struct Exports<'a> {
    table: &'a ExportTable,
    index: u32,
}

impl Iterator for Exports<'_> {
    type Item = Export;

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.index;
        let name = self.table.name(index)?;
        let ordinal = self.table.ordinal(index)?;
        self.index += 1;

        Some(Export {
            index,
            name,
            ordinal,
            rva: self.table.function_rva(ordinal).unwrap_or(0),
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.table.number_of_names().saturating_sub(self.index) as usize;
        (remaining, Some(remaining))
    }
}
