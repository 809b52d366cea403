//! Synthetic module images and loader lists for tests.
//!
//! Images are laid out exactly as the loader would map them (RVA == buffer offset) and carry
//! enough of a real PE header that `object` accepts them as files too.

use std::mem::{self, offset_of, size_of};
use std::ptr::{addr_of, addr_of_mut};

use object::pe::{
    ImageDataDirectory, ImageDosHeader, ImageExportDirectory, ImageFileHeader, ImageNtHeaders64,
    ImageOptionalHeader32, ImageOptionalHeader64, IMAGE_FILE_MACHINE_AMD64, IMAGE_FILE_MACHINE_I386,
    IMAGE_NT_OPTIONAL_HDR32_MAGIC, IMAGE_NT_OPTIONAL_HDR64_MAGIC,
};

use crate::peb::{LdrDataTableEntry, ListEntry, Peb, PebLdrData, UnicodeString};

const E_LFANEW: usize = 0x80;
const FILE_HEADER: usize = E_LFANEW + 4;
pub const OPTIONAL_HEADER: usize = E_LFANEW + offset_of!(ImageNtHeaders64, optional_header);
pub const EXPORT_DIRECTORY: usize = 0x200;
const EXPORT_TABLES: usize = EXPORT_DIRECTORY + 0x40;
const PAGE: usize = 0x1000;

/// Default preferred base recorded in the optional header.
pub const IMAGE_BASE: u64 = 0x1_8000_0000;

pub struct FakeImage {
    memory: Vec<u64>,
    len: usize,
}

pub struct FakeImageBuilder {
    name: String,
    exports: Vec<(String, u32)>,
    with_exports: bool,
    pe32: bool,
    reverse_functions: bool,
    ordinal_base: u32,
}

impl FakeImage {
    pub fn new(name: &str, exports: &[(&str, u32)]) -> Self {
        let mut builder = Self::builder(name);
        for (export, rva) in exports {
            builder = builder.export(export, *rva);
        }
        builder.build()
    }

    pub fn without_exports() -> Self {
        FakeImageBuilder {
            with_exports: false,
            ..Self::builder("")
        }
        .build()
    }

    pub fn builder(name: &str) -> FakeImageBuilder {
        FakeImageBuilder {
            name: name.to_string(),
            exports: Vec::new(),
            with_exports: true,
            pe32: false,
            reverse_functions: false,
            ordinal_base: 1,
        }
    }

    pub fn base(&self) -> *const u8 {
        self.memory.as_ptr().cast()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base(), self.len) }
    }
}

fn put<const N: usize>(buffer: &mut [u8], offset: usize, bytes: [u8; N]) {
    buffer[offset..offset + N].copy_from_slice(&bytes);
}

impl FakeImageBuilder {
    pub fn export(mut self, name: &str, rva: u32) -> Self {
        self.exports.push((name.to_string(), rva));
        self
    }

    pub fn pe32(mut self) -> Self {
        self.pe32 = true;
        self
    }

    /// Store the address table in reverse, so ordinals differ from name indices.
    pub fn reverse_functions(mut self) -> Self {
        self.reverse_functions = true;
        self
    }

    pub fn ordinal_base(mut self, base: u32) -> Self {
        self.ordinal_base = base;
        self
    }

    pub fn build(self) -> FakeImage {
        let count = self.exports.len();
        let functions = EXPORT_TABLES;
        let names = functions + 4 * count;
        let ordinals = names + 4 * count;
        let strings = (ordinals + 2 * count + 3) & !3;

        let mut blob = Vec::new();
        let module_name_rva = strings;
        blob.extend_from_slice(self.name.as_bytes());
        blob.push(0);
        let mut name_rvas = Vec::with_capacity(count);
        for (name, _) in &self.exports {
            name_rvas.push(strings + blob.len());
            blob.extend_from_slice(name.as_bytes());
            blob.push(0);
        }

        let len = (strings + blob.len() + PAGE - 1) & !(PAGE - 1);
        let mut image = vec![0u8; len];

        put(&mut image, 0, *b"MZ");
        put(&mut image, offset_of!(ImageDosHeader, e_lfanew), (E_LFANEW as u32).to_le_bytes());
        put(&mut image, E_LFANEW, *b"PE\0\0");

        // (machine, magic, NumberOfRvaAndSizes offset, optional header size without directories)
        let (machine, magic, rva_count_at, fixed_size) = if self.pe32 {
            (
                IMAGE_FILE_MACHINE_I386,
                IMAGE_NT_OPTIONAL_HDR32_MAGIC,
                offset_of!(ImageOptionalHeader32, number_of_rva_and_sizes),
                size_of::<ImageOptionalHeader32>(),
            )
        } else {
            (
                IMAGE_FILE_MACHINE_AMD64,
                IMAGE_NT_OPTIONAL_HDR64_MAGIC,
                offset_of!(ImageOptionalHeader64, number_of_rva_and_sizes),
                size_of::<ImageOptionalHeader64>(),
            )
        };
        let optional_size = fixed_size + 16 * size_of::<ImageDataDirectory>();
        put(&mut image, FILE_HEADER + offset_of!(ImageFileHeader, machine), machine.to_le_bytes());
        put(
            &mut image,
            FILE_HEADER + offset_of!(ImageFileHeader, size_of_optional_header),
            (optional_size as u16).to_le_bytes(),
        );
        put(&mut image, FILE_HEADER + offset_of!(ImageFileHeader, characteristics), 0x2022u16.to_le_bytes());

        // SectionAlignment, FileAlignment, SizeOfImage and SizeOfHeaders share offsets in both
        // optional header flavors.
        put(&mut image, OPTIONAL_HEADER, magic.to_le_bytes());
        if self.pe32 {
            let image_base = OPTIONAL_HEADER + offset_of!(ImageOptionalHeader32, image_base);
            put(&mut image, image_base, (IMAGE_BASE as u32).to_le_bytes());
        } else {
            let image_base = OPTIONAL_HEADER + offset_of!(ImageOptionalHeader64, image_base);
            put(&mut image, image_base, IMAGE_BASE.to_le_bytes());
        }
        let field = |offset| OPTIONAL_HEADER + offset;
        put(&mut image, field(offset_of!(ImageOptionalHeader64, section_alignment)), (PAGE as u32).to_le_bytes());
        put(&mut image, field(offset_of!(ImageOptionalHeader64, file_alignment)), 0x200u32.to_le_bytes());
        put(&mut image, field(offset_of!(ImageOptionalHeader64, size_of_image)), (len as u32).to_le_bytes());
        put(&mut image, field(offset_of!(ImageOptionalHeader64, size_of_headers)), (len as u32).to_le_bytes());
        put(&mut image, field(rva_count_at), 16u32.to_le_bytes());

        if self.with_exports {
            let export_entry = field(fixed_size);
            put(&mut image, export_entry, (EXPORT_DIRECTORY as u32).to_le_bytes());
            put(
                &mut image,
                export_entry + 4,
                (size_of::<ImageExportDirectory>() as u32).to_le_bytes(),
            );

            let d = EXPORT_DIRECTORY;
            let at = |offset| d + offset;
            put(&mut image, at(offset_of!(ImageExportDirectory, name)), (module_name_rva as u32).to_le_bytes());
            put(&mut image, at(offset_of!(ImageExportDirectory, base)), self.ordinal_base.to_le_bytes());
            put(
                &mut image,
                at(offset_of!(ImageExportDirectory, number_of_functions)),
                (count as u32).to_le_bytes(),
            );
            put(&mut image, at(offset_of!(ImageExportDirectory, number_of_names)), (count as u32).to_le_bytes());
            put(
                &mut image,
                at(offset_of!(ImageExportDirectory, address_of_functions)),
                (functions as u32).to_le_bytes(),
            );
            put(
                &mut image,
                at(offset_of!(ImageExportDirectory, address_of_names)),
                (names as u32).to_le_bytes(),
            );
            put(
                &mut image,
                at(offset_of!(ImageExportDirectory, address_of_name_ordinals)),
                (ordinals as u32).to_le_bytes(),
            );

            for (index, (_, rva)) in self.exports.iter().enumerate() {
                let ordinal = if self.reverse_functions { count - 1 - index } else { index };
                put(&mut image, functions + 4 * ordinal, rva.to_le_bytes());
                put(&mut image, names + 4 * index, (name_rvas[index] as u32).to_le_bytes());
                put(&mut image, ordinals + 2 * index, (ordinal as u16).to_le_bytes());
            }
            image[strings..strings + blob.len()].copy_from_slice(&blob);
        }

        let mut memory = vec![0u64; len / 8];
        unsafe {
            std::ptr::copy_nonoverlapping(image.as_ptr(), memory.as_mut_ptr().cast::<u8>(), len);
        }
        FakeImage { memory, len }
    }
}

/// A control block with a circular in-memory-order module list.
pub struct FakeProcess {
    peb: Box<Peb>,
    ldr: Box<PebLdrData>,
    entries: Vec<Box<LdrDataTableEntry>>,
    names: Vec<Vec<u16>>,
}

impl FakeProcess {
    pub fn new() -> Self {
        let mut process = Self {
            peb: Box::new(unsafe { mem::zeroed() }),
            ldr: Box::new(unsafe { mem::zeroed() }),
            entries: Vec::new(),
            names: Vec::new(),
        };
        process.peb.ldr = &mut *process.ldr;
        process.link();
        process
    }

    pub fn with_module(mut self, image: &FakeImage, loader_name: &str) -> Self {
        let mut name: Vec<u16> = loader_name.encode_utf16().collect();
        let mut entry: Box<LdrDataTableEntry> = Box::new(unsafe { mem::zeroed() });
        entry.dll_base = image.base() as *mut _;
        entry.size_of_image = image.len() as u32;
        entry.base_dll_name = UnicodeString {
            length: (name.len() * 2) as u16,
            maximum_length: (name.len() * 2) as u16,
            buffer: name.as_mut_ptr(),
        };
        self.names.push(name);
        self.entries.push(entry);
        self.link();
        self
    }

    /// An entry with a null base, like the one the loader keeps for an image in progress.
    pub fn with_placeholder(mut self) -> Self {
        self.entries.push(Box::new(unsafe { mem::zeroed() }));
        self.link();
        self
    }

    pub fn peb(&self) -> *const Peb {
        &*self.peb
    }

    pub fn list_head(&self) -> *const ListEntry {
        addr_of!(self.ldr.in_memory_order_module_list)
    }

    fn link(&mut self) {
        let mut nodes: Vec<*mut ListEntry> = vec![addr_of_mut!(self.ldr.in_memory_order_module_list)];
        nodes.extend(
            self.entries
                .iter_mut()
                .map(|entry| addr_of_mut!(entry.in_memory_order_links)),
        );

        let count = nodes.len();
        for index in 0..count {
            unsafe {
                (*nodes[index]).flink = nodes[(index + 1) % count];
                (*nodes[index]).blink = nodes[(index + count - 1) % count];
            }
        }
    }
}
