//! Heuristic discovery of runtime objects inside the reconstructed heap.
//!
//! Stripped images carry no symbols for heap objects, so they are found by byte patterns:
//!
//! - **Type descriptors** are found by their embedded name hash. The hash field sits at a fixed
//!   offset from the start of the descriptor, so every occurrence of the little-endian hash
//!   yields a candidate header address.
//! - **Strings** are found by their type pointer. One well-known diagnostic message is located
//!   by its UTF-16 text, the string type pointer in front of it is read, and every other
//!   occurrence of that pointer is treated as the start of a string object.
//!
//! Both scans are best-effort. Misses are expected and never raised as errors.

use std::collections::BTreeMap;

use memchr::memmem;
use widestring::U16String;

use crate::{
    analysis::AnalysisOptions,
    image::address::{AddressSpace, Heap},
    runtime::descriptor::TypeDescriptor,
};

/// Pattern scanner over the heap of an [`AddressSpace`].
///
/// The scanner borrows the space and the options of a session and keeps no state of its own,
/// so it is cheap to create for every scan. All scans are read-only.
///
/// # Examples
///
/// ```rust,no_run
/// use aotscope::{prelude::*, runtime::StructuralScanner};
/// use std::path::Path;
///
/// let object = AotObject::from_file(Path::new("app.exe"), 0x2_1F40, AnalysisOptions::minimal())?;
/// let scanner = StructuralScanner::new(object.space(), object.options());
///
/// if let Some(string_type) = scanner.find_string_type() {
///     println!("System.String descriptor at {string_type:#x}");
/// }
/// if let Some(descriptor) = scanner.find_type_descriptor(0x4463_A2FB) {
///     println!("{} vtable slots", descriptor.vtable_slot_count);
/// }
/// # Ok::<(), aotscope::Error>(())
/// ```
pub struct StructuralScanner<'a> {
    space: &'a AddressSpace,
    options: &'a AnalysisOptions,
}

impl<'a> StructuralScanner<'a> {
    /// Create a scanner; scans over a space without heap find nothing
    #[must_use]
    pub fn new(space: &'a AddressSpace, options: &'a AnalysisOptions) -> Self {
        StructuralScanner { space, options }
    }

    /// Find the first type descriptor in the heap carrying `hash`.
    ///
    /// Candidates whose header would start before the heap, or that can not be parsed
    /// completely, are skipped in favour of the next occurrence.
    #[must_use]
    pub fn find_type_descriptor(&self, hash: u32) -> Option<TypeDescriptor> {
        let heap = self.space.heap()?;
        let width = self.space.pointer_width();
        let hash_offset = TypeDescriptor::hash_offset(width);
        let pattern = hash.to_le_bytes();

        for found in memmem::find_iter(heap.data(), &pattern) {
            let Some(start) = found.checked_sub(hash_offset) else {
                continue;
            };

            let address = heap.address_of(start);
            match TypeDescriptor::read(self.space, address, self.options.max_interfaces) {
                Ok(descriptor) if self.is_plausible(&descriptor) => return Some(descriptor),
                Ok(_) => log::debug!("Rejected implausible descriptor for {hash:#010x} at {address:#x}"),
                Err(error) => log::debug!("Skipping descriptor candidate at {address:#x}: {error}"),
            }
        }

        None
    }

    fn is_plausible(&self, descriptor: &TypeDescriptor) -> bool {
        if !self.options.check_descriptor_size {
            return true;
        }

        let width = self.space.pointer_width().bytes() as u64;
        descriptor.address % width == 0
            && u64::from(descriptor.base_size) >= width
            && descriptor.base_size <= self.options.max_base_size
    }

    /// Locate the string type pointer by finding the configured marker text.
    ///
    /// The marker is expected to be the complete content of one string object, preceded by
    /// its length and by the type pointer.
    #[must_use]
    pub fn find_string_type(&self) -> Option<u64> {
        let heap = self.space.heap()?;
        let width = self.space.pointer_width().bytes();

        let marker: Vec<u8> = self
            .options
            .string_marker
            .encode_utf16()
            .flat_map(u16::to_le_bytes)
            .collect();
        if marker.is_empty() {
            return None;
        }

        let found = memmem::find(heap.data(), &marker)?;
        let start = found.checked_sub(4 + width)?;
        let pointer = read_pointer(heap.data(), start, width)?;

        (pointer != 0).then_some(pointer)
    }

    /// Harvest every string object in the heap.
    ///
    /// Returns an empty map if the string type can not be identified.
    #[must_use]
    pub fn scan_strings(&self) -> BTreeMap<u64, String> {
        let mut strings = BTreeMap::new();
        let (Some(heap), Some(string_type)) = (self.space.heap(), self.find_string_type()) else {
            log::debug!("String type not found, skipping string scan");
            return strings;
        };

        let width = self.space.pointer_width();
        let pattern = width.encode(string_type);
        let finder = memmem::Finder::new(&pattern);

        let mut position = 0;
        while let Some(found) = finder.find(&heap.data()[position..]) {
            let hit = position + found;
            if let Some(text) = self.read_string(heap, hit + width.bytes()) {
                strings.insert(heap.address_of(hit), text);
            }
            position = hit + 1;
        }

        log::info!("Found {} strings", strings.len());
        strings
    }

    fn read_string(&self, heap: &Heap, length_offset: usize) -> Option<String> {
        let data = heap.data();
        let length = i32::from_le_bytes(data.get(length_offset..length_offset + 4)?.try_into().ok()?);
        if length <= 0 || length as u32 > self.options.max_string_length {
            return None;
        }

        let start = length_offset + 4;
        let bytes = data.get(start..start + length as usize * 2)?;
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();

        Some(U16String::from_vec(units).to_string_lossy())
    }
}

fn read_pointer(data: &[u8], offset: usize, width: usize) -> Option<u64> {
    let bytes = data.get(offset..offset + width)?;
    let mut buffer = [0u8; 8];
    buffer[..width].copy_from_slice(bytes);
    Some(u64::from_le_bytes(buffer))
}
