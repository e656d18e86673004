//! The runtime header and its section directory.
//!
//! A NativeAOT module describes its runtime data through a small fixed header (`RTR`
//! signature) immediately followed by an array of section entries. Each entry carries a section
//! type tag, flags and a start/end pointer pair. The header address itself is found by an
//! architecture-specific locator outside of this crate.
//!
//! # Layout
//!
//! ```text
//! +0x00 u32 signature      "RTR\0"
//! +0x04 u16 major_version
//! +0x06 u16 minor_version
//! +0x08 u32 flags
//! +0x0C u16 section_count
//! +0x0E u8  entry_size
//! +0x0F u8  entry_type
//! +0x10 section entries: u32 id, u32 flags, ptr start, ptr end
//! ```

use std::collections::BTreeMap;

use crate::{
    file::parser::Parser,
    image::{address::AddressSpace, PointerWidth},
    Error, Result,
};

/// Known runtime section identifiers.
///
/// Ids from 300 upwards are offsets into the read-only blob region; the map and table
/// sections consumed by this crate live there.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::FromRepr, strum::Display,
)]
#[repr(u32)]
#[allow(missing_docs)]
pub enum SectionType {
    CompilerIdentifier = 100,
    GcStressOffset = 101,
    StringTable = 200,
    GcStaticRegion = 201,
    ThreadStaticRegion = 202,
    TypeManagerIndirection = 204,
    EagerCctor = 205,
    FrozenObjectRegion = 206,
    DehydratedData = 207,
    ThreadStaticOffsetRegion = 208,
    ImportAddressTables = 212,
    ModuleInitializerList = 213,
    ReadonlyBlobRegionStart = 300,
    TypeMap = 301,
    ArrayMap = 302,
    PointerTypeMap = 303,
    FunctionPointerTypeMap = 304,
    InvokeMap = 305,
    VirtualInvokeMap = 306,
    CommonFixupsTable = 307,
    FieldAccessMap = 308,
    CCtorContextMap = 309,
    ByRefTypeMap = 310,
    EmbeddedMetadata = 313,
    DefaultConstructorMap = 314,
    UnboxingAndInstantiatingStubMap = 315,
    StructMarshallingStubMap = 316,
    DelegateMarshallingStubMap = 317,
    GenericVirtualMethodTable = 318,
    InterfaceGenericVirtualMethodTable = 319,
    TypeTemplateMap = 321,
    GenericMethodsTemplateMap = 322,
    BlobIdStackTraceEmbeddedMetadata = 325,
    BlobIdStackTraceMethodRvaToTokenMapping = 326,
    ReadonlyBlobRegionEnd = 399,
}

/// The fixed-size runtime header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeHeader {
    /// Always [`RuntimeHeader::SIGNATURE`]
    pub signature: u32,
    /// Major format version
    pub major_version: u16,
    /// Minor format version
    pub minor_version: u16,
    /// Module flags
    pub flags: u32,
    /// Number of section entries following the header
    pub section_count: u16,
    /// Size in bytes of each section entry, as recorded by the compiler
    pub entry_size: u8,
    /// Encoding of the section entries
    pub entry_type: u8,
}

impl RuntimeHeader {
    /// `"RTR\0"` read as a little-endian `u32`
    pub const SIGNATURE: u32 = 0x0052_5452;
    /// Size of the header in bytes
    pub const SIZE: usize = 0x10;

    /// Read and validate the header at `address`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] if the signature does not match, or a lookup
    /// error if the header is not mapped.
    pub fn read(space: &AddressSpace, address: u64) -> Result<RuntimeHeader> {
        let bytes = space.read_bytes(address, Self::SIZE)?;
        Self::parse(&bytes)
    }

    /// Parse a header from raw bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] or [`crate::Error::OutOfBounds`].
    pub fn parse(data: &[u8]) -> Result<RuntimeHeader> {
        let mut parser = Parser::new(data);

        let signature = parser.read_le::<u32>()?;
        if signature != Self::SIGNATURE {
            return Err(Error::InvalidSignature(signature));
        }

        Ok(RuntimeHeader {
            signature,
            major_version: parser.read_le::<u16>()?,
            minor_version: parser.read_le::<u16>()?,
            flags: parser.read_le::<u32>()?,
            section_count: parser.read_le::<u16>()?,
            entry_size: parser.read_le::<u8>()?,
            entry_type: parser.read_le::<u8>()?,
        })
    }
}

/// One section directory entry, with both pointers already translated to addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionInfo {
    /// Raw section type tag
    pub id: u32,
    /// Entry flags
    pub flags: u32,
    /// First address of the section, `0` if unset
    pub start: u64,
    /// End address of the section, `0` if unset
    pub end: u64,
}

impl SectionInfo {
    /// Size of a serialized entry for the given pointer width
    #[must_use]
    pub const fn entry_size(width: PointerWidth) -> usize {
        8 + 2 * width.bytes()
    }

    /// The known section type, if the tag is recognized
    #[must_use]
    pub fn section_type(&self) -> Option<SectionType> {
        SectionType::from_repr(self.id)
    }

    /// True if the `end` pointer is meaningful
    #[must_use]
    pub fn has_end_pointer(&self) -> bool {
        self.flags == 1
    }

    /// Number of bytes between start and end
    #[must_use]
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    /// Returns true if the section spans no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Immutable mapping from section type tag to [`SectionInfo`].
#[derive(Debug, Clone, Default)]
pub struct SectionDirectory {
    sections: BTreeMap<u32, SectionInfo>,
}

impl SectionDirectory {
    /// Read the `header.section_count` entries that follow the header at `header_address`.
    ///
    /// Absolute pointers are turned into addresses by subtracting the image base; zero stays
    /// zero. A repeated section id keeps its first entry.
    ///
    /// # Errors
    /// Returns a lookup error if the entries are not mapped.
    pub fn read(
        space: &AddressSpace,
        header: &RuntimeHeader,
        header_address: u64,
    ) -> Result<SectionDirectory> {
        let width = space.pointer_width();
        let image_base = space.image().image_base();
        let stride = SectionInfo::entry_size(width).max(usize::from(header.entry_size));

        let mut sections = BTreeMap::new();
        let mut address = header_address + RuntimeHeader::SIZE as u64;
        for _ in 0..header.section_count {
            let bytes = space.read_bytes(address, SectionInfo::entry_size(width))?;
            let mut parser = Parser::new(&bytes);

            let id = parser.read_le::<u32>()?;
            let flags = parser.read_le::<u32>()?;
            let start = to_address(parser.read_pointer(width)?, image_base);
            let end = to_address(parser.read_pointer(width)?, image_base);
            let info = SectionInfo {
                id,
                flags,
                start,
                end,
            };

            match info.section_type() {
                Some(kind) => log::info!("Found section {kind} at {start:#x}..{end:#x}"),
                None => log::debug!("Found unknown section {id} at {start:#x}..{end:#x}"),
            }

            if sections.contains_key(&id) {
                log::warn!("Section {id} appears more than once, keeping the first entry");
            } else {
                sections.insert(id, info);
            }

            address += stride as u64;
        }

        Ok(SectionDirectory { sections })
    }

    /// Build a directory from already decoded entries
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = SectionInfo>) -> Self {
        let mut sections = BTreeMap::new();
        for info in entries {
            sections.entry(info.id).or_insert(info);
        }
        SectionDirectory { sections }
    }

    /// Look up a known section
    #[must_use]
    pub fn get(&self, kind: SectionType) -> Option<&SectionInfo> {
        self.sections.get(&(kind as u32))
    }

    /// Look up a section by raw id
    #[must_use]
    pub fn get_raw(&self, id: u32) -> Option<&SectionInfo> {
        self.sections.get(&id)
    }

    /// Look up a section that the caller can not continue without
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingSection`] if it is absent.
    pub fn require(&self, kind: SectionType) -> Result<&SectionInfo> {
        self.get(kind).ok_or(Error::MissingSection(kind))
    }

    /// Iterate over all entries in id order
    pub fn iter(&self) -> impl Iterator<Item = &SectionInfo> {
        self.sections.values()
    }

    /// Number of distinct sections
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Returns true if no section was found
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

fn to_address(pointer: u64, image_base: u64) -> u64 {
    if pointer == 0 {
        0
    } else {
        pointer.wrapping_sub(image_base)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::FlatImage;
    use std::sync::Arc;

    const IMAGE_BASE: u64 = 0x1_4000_0000;

    fn header_bytes(count: u16, entry_size: u8) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&RuntimeHeader::SIGNATURE.to_le_bytes());
        bytes.extend_from_slice(&9_u16.to_le_bytes());
        bytes.extend_from_slice(&2_u16.to_le_bytes());
        bytes.extend_from_slice(&1_u32.to_le_bytes());
        bytes.extend_from_slice(&count.to_le_bytes());
        bytes.push(entry_size);
        bytes.push(1);
        bytes
    }

    fn entry(id: u32, flags: u32, start: u64, end: u64) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&id.to_le_bytes());
        bytes.extend_from_slice(&flags.to_le_bytes());
        bytes.extend_from_slice(&start.to_le_bytes());
        bytes.extend_from_slice(&end.to_le_bytes());
        bytes
    }

    #[test]
    fn parse_header() {
        let header = RuntimeHeader::parse(&header_bytes(3, 24)).unwrap();
        assert_eq!(header.major_version, 9);
        assert_eq!(header.minor_version, 2);
        assert_eq!(header.flags, 1);
        assert_eq!(header.section_count, 3);
        assert_eq!(header.entry_size, 24);
    }

    #[test]
    fn bad_signature() {
        let mut bytes = header_bytes(0, 24);
        bytes[0] = b'X';
        assert!(matches!(
            RuntimeHeader::parse(&bytes),
            Err(Error::InvalidSignature(0x0052_5458))
        ));
    }

    #[test]
    fn read_directory() {
        let mut data = header_bytes(3, 24);
        data.extend(entry(207, 1, IMAGE_BASE + 0x3000, IMAGE_BASE + 0x3100));
        data.extend(entry(305, 0, IMAGE_BASE + 0x4000, 0));
        data.extend(entry(9999, 0, 0, 0));

        let image = FlatImage::new(0x2000, data, PointerWidth::Eight).with_image_base(IMAGE_BASE);
        let space = AddressSpace::new(Arc::new(image));

        let header = RuntimeHeader::read(&space, 0x2000).unwrap();
        let directory = SectionDirectory::read(&space, &header, 0x2000).unwrap();
        assert_eq!(directory.len(), 3);

        let dehydrated = directory.get(SectionType::DehydratedData).unwrap();
        assert_eq!(dehydrated.start, 0x3000);
        assert_eq!(dehydrated.end, 0x3100);
        assert!(dehydrated.has_end_pointer());
        assert_eq!(dehydrated.len(), 0x100);

        let invoke = directory.get(SectionType::InvokeMap).unwrap();
        assert_eq!(invoke.end, 0);
        assert!(!invoke.has_end_pointer());

        let unknown = directory.get_raw(9999).unwrap();
        assert_eq!(unknown.section_type(), None);
        assert_eq!(unknown.start, 0);

        assert!(matches!(
            directory.require(SectionType::EmbeddedMetadata),
            Err(Error::MissingSection(SectionType::EmbeddedMetadata))
        ));
    }

    #[test]
    fn duplicate_section_keeps_first() {
        let directory = SectionDirectory::from_entries([
            SectionInfo {
                id: 305,
                flags: 1,
                start: 0x10,
                end: 0x20,
            },
            SectionInfo {
                id: 305,
                flags: 1,
                start: 0x30,
                end: 0x40,
            },
        ]);
        assert_eq!(directory.len(), 1);
        assert_eq!(directory.get(SectionType::InvokeMap).unwrap().start, 0x10);
    }
}
