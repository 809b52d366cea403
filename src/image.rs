//! Mapping PE files from disk.
//!
//! The resolution engine expects images laid out the way the Windows loader maps them: headers
//! at offset 0 and every section at its RVA. `MappedImage` reproduces that layout from a file so
//! the host tool can run the very same export parser and resolver over it. Unlike loader-placed
//! images, files on disk are untrusted, so the export directory is bounds-checked here before
//! the engine ever reads it.

use anyhow::{bail, ensure, Context, Result};
use memmap2::Mmap;
use object::pe::{ImageDataDirectory, ImageDosHeader, ImageExportDirectory, ImageNtHeaders32, ImageNtHeaders64};
use object::read::pe::{ImageNtHeaders, ImageOptionalHeader, PeFile};
use object::{FileKind, LittleEndian};
use std::fs::File;
use std::mem::size_of;
use std::path::Path;

use crate::export::{export_data_directory_offset, Export, ExportTable};

/// Largest `SizeOfImage` the tool is willing to lay out.
pub const MAX_IMAGE_SIZE: usize = 1 << 30;

/// A PE image copied into memory at its virtual layout.
pub struct MappedImage {
    /// Backing store; `u64` keeps the base 8-byte aligned like a real mapping.
    memory: Vec<u64>,
    len: usize,
    preferred_base: u64,
}

impl MappedImage {
    /// Memory-map the file at `path` and lay it out as the loader would.
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        let mmap = unsafe { Mmap::map(&file)? };
        Self::from_file(&mmap).with_context(|| format!("failed to map {}", path.display()))
    }

    /// Lay out the raw bytes of a PE file.
    pub fn from_file(data: &[u8]) -> Result<Self> {
        match FileKind::parse(data).context("failed to identify file")? {
            FileKind::Pe32 => Self::layout::<ImageNtHeaders32>(data),
            FileKind::Pe64 => Self::layout::<ImageNtHeaders64>(data),
            kind => bail!("unsupported file kind {:?}, expected a PE image", kind),
        }
    }

    fn layout<Pe: ImageNtHeaders>(data: &[u8]) -> Result<Self> {
        let file = PeFile::<Pe>::parse(data).context("failed to parse PE headers")?;
        let optional_header = file.nt_headers().optional_header();
        let len = optional_header.size_of_image() as usize;
        let size_of_headers = optional_header.size_of_headers() as usize;
        ensure!(len <= MAX_IMAGE_SIZE, "SizeOfImage {:#x} exceeds the {:#x} byte limit", len, MAX_IMAGE_SIZE);

        let extent = file
            .section_table()
            .iter()
            .map(|section| {
                let start = section.virtual_address.get(LittleEndian) as usize;
                let size = section
                    .virtual_size
                    .get(LittleEndian)
                    .max(section.size_of_raw_data.get(LittleEndian));
                start.saturating_add(size as usize)
            })
            .fold(size_of_headers, usize::max);
        let alignment = (optional_header.section_alignment() as usize).max(1);
        let limit = extent.checked_next_multiple_of(alignment).context("section extent overflow")?;
        ensure!(
            len <= limit,
            "SizeOfImage {:#x} is larger than the headers and sections it covers ({:#x})",
            len,
            limit
        );

        let headers = size_of_headers.min(data.len()).min(len);

        let mut image = Self {
            memory: vec![0u64; len.div_ceil(8)],
            len,
            preferred_base: optional_header.image_base(),
        };
        let bytes = image.bytes_mut();
        bytes[..headers].copy_from_slice(&data[..headers]);

        for section in file.section_table().iter() {
            let address = section.virtual_address.get(LittleEndian) as usize;
            let raw = section.pe_data(data).context("section data is out of bounds")?;
            ensure!(address <= len, "section at RVA {:#x} lies outside the image", address);

            let size = raw.len().min(len - address);
            bytes[address..address + size].copy_from_slice(&raw[..size]);
            tracing::trace!(
                "Mapped section {} at RVA {:#x} ({} bytes)",
                String::from_utf8_lossy(section.raw_name()),
                address,
                size
            );
        }

        tracing::debug!("Mapped image of {:#x} bytes, preferred base {:#x}", len, image.preferred_base);
        Ok(image)
    }

    pub fn base(&self) -> *const u8 {
        self.memory.as_ptr().cast()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Base address the image asks to be loaded at.
    pub fn preferred_base(&self) -> u64 {
        self.preferred_base
    }

    pub fn bytes(&self) -> &[u8] {
        unsafe { std::slice::from_raw_parts(self.base(), self.len) }
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.memory.as_mut_ptr().cast(), self.len) }
    }

    /// Parse the export directory after checking that everything it references is in bounds.
    ///
    /// The returned table points into `self` and must not outlive it.
    pub fn exports(&self) -> Result<Option<ExportTable>> {
        let bytes = self.bytes();
        let dos = ImageDosHeader::parse(bytes).context("invalid DOS header")?;
        let nt_headers_end = (dos.nt_headers_offset() as usize)
            .checked_add(size_of::<ImageNtHeaders64>() + size_of::<ImageDataDirectory>())
            .context("address overflow")?;
        ensure!(nt_headers_end <= self.len, "headers extend past the end of the image");
        let directory_end = unsafe { export_data_directory_offset(self.base()) } + size_of::<ImageDataDirectory>();
        ensure!(directory_end <= self.len, "data directory lies outside the image");

        let Some(table) = (unsafe { ExportTable::parse(self.base()) }) else {
            return Ok(None);
        };

        let rva = table.data_directory().virtual_address.get(LittleEndian) as usize;
        self.check_range(rva, size_of::<ImageExportDirectory>(), "export directory")?;

        let names = table.number_of_names() as usize;
        let (functions_rva, names_rva, ordinals_rva) = table.table_rvas();
        self.check_range(
            functions_rva as usize,
            table.number_of_functions() as usize * 4,
            "export address table",
        )?;
        self.check_range(names_rva as usize, names * 4, "export name table")?;
        self.check_range(ordinals_rva as usize, names * 2, "export ordinal table")?;
        self.check_cstr(table.directory().name.get(LittleEndian) as usize, "module name")?;

        for index in 0..table.number_of_names() {
            let rva = table.name_rva(index).context("export name index out of range")?;
            self.check_cstr(rva as usize, "export name")?;
        }

        Ok(Some(table))
    }

    fn check_range(&self, rva: usize, size: usize, what: &str) -> Result<()> {
        let end = rva.checked_add(size).context("address overflow")?;
        ensure!(end <= self.len, "{} at RVA {:#x} ({} bytes) lies outside the image", what, rva, size);
        Ok(())
    }

    fn check_cstr(&self, rva: usize, what: &str) -> Result<()> {
        let tail = self
            .bytes()
            .get(rva..)
            .with_context(|| format!("{} at RVA {:#x} lies outside the image", what, rva))?;
        ensure!(tail.contains(&0), "{} at RVA {:#x} is not terminated", what, rva);
        Ok(())
    }
}

/// One row of the `exports` listing: name index, public ordinal, RVA and name.
///
/// # Safety
/// The image behind `table` must still be mapped and its names checked by
/// [`MappedImage::exports`].
pub unsafe fn format_export(table: &ExportTable, export: &Export) -> String {
    format!(
        "{:>6} {:>10} {:#010x} {}",
        export.index,
        table.biased_ordinal(export.ordinal),
        export.rva,
        export.name().to_string_lossy()
    )
}
