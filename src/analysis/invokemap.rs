//! Resolution of native method entry points through the invoke map.
//!
//! The invoke map is a NativeFormat hashtable. Every entry starts with an unsigned
//! [`InvokeTableFlags`] word. Entries that carry a metadata handle continue with the handle's
//! offset and two indices into the common fixups table:
//!
//! ```text
//! flags              unsigned
//! method handle      unsigned, offset of a Method handle
//! declaring type     unsigned, index of a fixup cell
//! entry point        unsigned, index of a fixup cell
//! ```
//!
//! A fixup cell is 4 bytes wide at `fixups + 4 * index` and holds an offset relative to the
//! cell itself. Entries without a metadata handle are reflection stubs and are skipped.

use bitflags::bitflags;

use crate::{
    image::{address::AddressSpace, header::SectionInfo},
    metadata::{
        graph::{MetadataGraph, MethodDefRc},
        handle::{Handle, HandleType},
        reader::MetadataReader,
    },
    nativeformat::{hashtable::NativeHashtable, NativeParser, NativeReader},
    Result,
};

const FIXUP_CELL_SIZE: u64 = 4;

bitflags! {
    /// Flags word of an invoke map entry.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct InvokeTableFlags: u32 {
        /// The method is invoked through a virtual slot
        const HAS_VIRTUAL_INVOKE = 0x0000_0001;
        /// The method has generic parameters
        const IS_GENERIC_METHOD = 0x0000_0002;
        /// The entry carries a metadata handle and fixup indices
        const HAS_METADATA_HANDLE = 0x0000_0004;
        /// The entry describes a default constructor
        const IS_DEFAULT_CONSTRUCTOR = 0x0000_0008;
        /// The entry point expects an instantiation argument
        const REQUIRES_INST_ARG = 0x0000_0010;
        /// The entry has a compiled entry point
        const HAS_ENTRYPOINT = 0x0000_0020;
        /// The entry point is a universal canonical instantiation
        const IS_UNIVERSAL_CANONICAL_ENTRY = 0x0000_0040;
        /// Parameters need interpretation before the call
        const NEEDS_PARAMETER_INTERPRETATION = 0x0000_0080;
        /// Calling convention bits
        const CALLING_CONVENTION_MASK = 0x0000_7000;
    }
}

/// One decoded invoke map entry that carries a metadata handle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvokeMapEntry {
    /// Entry flags
    pub flags: InvokeTableFlags,
    /// The `Method` handle of the entry
    pub method_handle: Handle,
    /// Fixup cell index of the declaring type's descriptor
    pub declaring_type_index: u32,
    /// Fixup cell index of the native entry point
    pub entry_index: u32,
}

impl InvokeMapEntry {
    /// Decode the entry at `parser`; `None` if it carries no metadata handle
    ///
    /// # Errors
    /// Returns an error if the entry is truncated.
    pub fn parse(parser: &mut NativeParser<'_>) -> Result<Option<InvokeMapEntry>> {
        let flags = InvokeTableFlags::from_bits_retain(parser.get_unsigned()?);
        if !flags.contains(InvokeTableFlags::HAS_METADATA_HANDLE) {
            return Ok(None);
        }

        let method_handle = Handle::new(HandleType::Method, parser.get_unsigned()?);
        let declaring_type_index = parser.get_unsigned()?;
        let entry_index = parser.get_unsigned()?;

        Ok(Some(InvokeMapEntry {
            flags,
            method_handle,
            declaring_type_index,
            entry_index,
        }))
    }
}

/// A method whose entry point was resolved.
#[derive(Debug, Clone)]
pub struct ResolvedInvoke {
    /// The method, as stored in the graph
    pub method: MethodDefRc,
    /// Address of the declaring type's descriptor
    pub declaring_type: u64,
    /// Address of the compiled code
    pub entry_address: u64,
}

/// Walks the invoke map and writes entry addresses into the graph.
///
/// Every entry names a method by handle and refers to two cells of the common fixups table:
/// one holding the declaring type's descriptor and one holding the compiled code. Entries
/// without a metadata handle belong to runtime-generated stubs and are skipped.
///
/// Fixup cells are relative pointers, so every resolved address is relative to the image
/// base. When several entries name the same method, the last one decides its entry address.
pub struct InvokeMapResolver<'a> {
    space: &'a AddressSpace,
    invoke_map: &'a SectionInfo,
    fixups: &'a SectionInfo,
}

impl<'a> InvokeMapResolver<'a> {
    /// Create a resolver over the `InvokeMap` and `CommonFixupsTable` sections
    #[must_use]
    pub fn new(space: &'a AddressSpace, invoke_map: &'a SectionInfo, fixups: &'a SectionInfo) -> Self {
        InvokeMapResolver {
            space,
            invoke_map,
            fixups,
        }
    }

    /// Decode every entry of the map that carries a metadata handle
    ///
    /// # Errors
    /// Returns an error if the section is not mapped or the hashtable is corrupt.
    pub fn entries(&self) -> Result<Vec<InvokeMapEntry>> {
        let length = usize::try_from(self.invoke_map.len())
            .map_err(|_| malformed_error!("Invoke map too large - {}", self.invoke_map.len()))?;
        let bytes = self.space.read_bytes(self.invoke_map.start, length)?;

        let table = NativeHashtable::new(NativeParser::new(NativeReader::new(&bytes), 0))?;
        let mut entries = Vec::new();
        for parser in table.entries() {
            let mut parser = parser?;
            if let Some(entry) = InvokeMapEntry::parse(&mut parser)? {
                entries.push(entry);
            }
        }
        Ok(entries)
    }

    /// Target of the fixup cell `index`
    ///
    /// # Errors
    /// Returns a lookup error if the cell is not mapped.
    pub fn fixup_target(&self, index: u32) -> Result<u64> {
        self.space
            .read_relative(self.fixups.start + FIXUP_CELL_SIZE * u64::from(index))
    }

    /// Resolve every entry and record the entry addresses on the methods of `graph`.
    ///
    /// Methods are fetched through [`MetadataGraph::resolve_method`], so a method that was
    /// already resolved is updated in place.
    ///
    /// # Errors
    /// Returns an error for a corrupt map, an unmapped fixup cell, or a method handle the
    /// reader can not resolve.
    pub fn resolve<R: MetadataReader + ?Sized>(
        &self,
        graph: &MetadataGraph,
        reader: &R,
    ) -> Result<Vec<ResolvedInvoke>> {
        let entries = self.entries()?;
        let mut resolved = Vec::with_capacity(entries.len());

        for entry in entries {
            let declaring_type = self.fixup_target(entry.declaring_type_index)?;
            let entry_address = self.fixup_target(entry.entry_index)?;

            let method = graph.resolve_method(reader, entry.method_handle)?;
            method.set_entry_address(entry_address);
            resolved.push(ResolvedInvoke {
                method,
                declaring_type,
                entry_address,
            });
        }

        log::info!("Resolved {} method entry points", resolved.len());
        Ok(resolved)
    }
}
