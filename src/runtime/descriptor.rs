//! Runtime type descriptors ("method tables").
//!
//! Every type that exists at runtime has a descriptor in the heap. Its layout is fixed:
//!
//! ```text
//! +0x00           u32 flags
//! +0x04           u32 base size
//! +0x08           ptr related type (base type or element type, depending on flags)
//! +0x08 + ptr     u16 vtable slot count
//! +0x0A + ptr     u16 interface count
//! +0x0C + ptr     u32 name hash
//! +0x10 + ptr     ptr[vtable slot count] vtable
//!                 ptr[interface count] interfaces
//! ```
//!
//! The name hash is the only link between a descriptor and the metadata describing it. See
//! [`crate::metadata::hash`] for how the same value is derived from type names.

use std::sync::{Arc, OnceLock};

use bitflags::bitflags;

use crate::{
    file::parser::Parser,
    image::{address::AddressSpace, PointerWidth},
    metadata::graph::{TypeDefRc, TypeDefRef},
    Result,
};

/// A reference-counted pointer to a [`TypeDescriptor`]
pub type TypeDescriptorRc = Arc<TypeDescriptor>;

bitflags! {
    /// Flags word of a type descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct TypeDescriptorFlags: u32 {
        /// Mask of the [`TypeDescriptorKind`] bits
        const KIND_MASK = 0x0003_0000;
        /// The type has a finalizer
        const HAS_FINALIZER = 0x0010_0000;
        /// The generic arguments carry variance information
        const GENERIC_VARIANCE = 0x0080_0000;
        /// Instances contain GC references
        const HAS_POINTERS = 0x0100_0000;
        /// The type is an instantiated generic type
        const IS_GENERIC = 0x0200_0000;
        /// Mask of the [`ElementType`] bits
        const ELEMENT_TYPE_MASK = 0x7C00_0000;
        /// The low 16 bits hold the component size (arrays, strings)
        const HAS_COMPONENT_SIZE = 0x8000_0000;
    }
}

const ELEMENT_TYPE_SHIFT: u32 = 26;

/// The descriptor kind stored in [`TypeDescriptorFlags::KIND_MASK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u32)]
pub enum TypeDescriptorKind {
    /// Classes, structs, interfaces and arrays of a concrete type
    Canonical = 0x0000_0000,
    /// Function pointer types
    FunctionPointer = 0x0001_0000,
    /// Arrays, pointers and by-refs: the related type is the element type
    Parameterized = 0x0002_0000,
    /// Open generic type definitions
    GenericTypeDefinition = 0x0003_0000,
}

/// The element type stored in [`TypeDescriptorFlags::ELEMENT_TYPE_MASK`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum ElementType {
    Unknown = 0x00,
    Void = 0x01,
    Boolean = 0x02,
    Char = 0x03,
    SByte = 0x04,
    Byte = 0x05,
    Int16 = 0x06,
    UInt16 = 0x07,
    Int32 = 0x08,
    UInt32 = 0x09,
    Int64 = 0x0A,
    UInt64 = 0x0B,
    IntPtr = 0x0C,
    UIntPtr = 0x0D,
    Single = 0x0E,
    Double = 0x0F,
    ValueType = 0x10,
    Nullable = 0x12,
    Class = 0x14,
    Interface = 0x15,
    SystemArray = 0x16,
    Array = 0x17,
    SzArray = 0x18,
    ByRef = 0x19,
    Pointer = 0x1A,
    FunctionPointer = 0x1B,
}

impl ElementType {
    /// True for element types whose instances live on the GC heap with a vtable
    #[must_use]
    pub fn is_reference_type(self) -> bool {
        matches!(
            self,
            ElementType::Class
                | ElementType::Interface
                | ElementType::SystemArray
                | ElementType::Array
                | ElementType::SzArray
        )
    }
}

/// The decoded meaning of the related-type field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelatedType {
    /// No related type (e.g. `System.Object`, interfaces)
    None,
    /// Address of the base type descriptor
    BaseType(u64),
    /// Address of the element type descriptor of an array, pointer or by-ref
    ElementType(u64),
}

/// A type descriptor found in the reconstructed heap.
///
/// The address is the descriptor's identity; the hash code is what links it to metadata.
/// A descriptor is bound to at most one type definition over its lifetime. The link is weak,
/// so a descriptor never keeps a metadata graph alive.
///
/// # Examples
///
/// ```rust,no_run
/// use aotscope::prelude::*;
/// use std::path::Path;
///
/// let object = AotObject::from_file(Path::new("app.exe"), 0x2_1F40, AnalysisOptions::default())?;
///
/// for descriptor in object.descriptors().iter() {
///     let name = descriptor
///         .type_def()
///         .map_or_else(|| "?".to_string(), |type_def| type_def.full_name());
///     println!("{:#x} {name} ({} bytes)", descriptor.address, descriptor.base_size);
/// }
/// # Ok::<(), aotscope::Error>(())
/// ```
pub struct TypeDescriptor {
    /// Address of the descriptor; its physical identity
    pub address: u64,
    /// Flags word
    pub flags: TypeDescriptorFlags,
    /// Base size of an instance in bytes
    pub base_size: u32,
    related_type: u64,
    /// Number of vtable slots
    pub vtable_slot_count: u16,
    /// Number of implemented interfaces
    pub interface_count: u16,
    /// Name hash; the logical join key with metadata
    pub hash_code: u32,
    /// Vtable entries, empty unless the arrays were parsed
    pub vtable: Vec<u64>,
    /// Interface descriptor addresses, empty unless the arrays were parsed
    pub interfaces: Vec<u64>,
    type_def: OnceLock<TypeDefRef>,
}

impl TypeDescriptor {
    /// Byte offset of the hash field for a given pointer width
    #[must_use]
    pub const fn hash_offset(width: PointerWidth) -> usize {
        4 + 4 + width.bytes() + 2 + 2
    }

    /// Size of the fixed part that precedes the vtable
    #[must_use]
    pub const fn header_size(width: PointerWidth) -> usize {
        Self::hash_offset(width) + 4
    }

    /// Parse the descriptor at `address`.
    ///
    /// The vtable and interface arrays are only read for reference types with fewer than
    /// `max_interfaces` interfaces; anything else is treated as a value-type shaped header.
    ///
    /// # Errors
    /// Returns a lookup error if any part of the descriptor is not mapped.
    pub fn read(space: &AddressSpace, address: u64, max_interfaces: u16) -> Result<TypeDescriptor> {
        let width = space.pointer_width();
        let header = space.read_bytes(address, Self::header_size(width))?;
        let mut parser = Parser::new(&header);

        let mut descriptor = TypeDescriptor {
            address,
            flags: TypeDescriptorFlags::from_bits_retain(parser.read_le::<u32>()?),
            base_size: parser.read_le::<u32>()?,
            related_type: parser.read_pointer(width)?,
            vtable_slot_count: parser.read_le::<u16>()?,
            interface_count: parser.read_le::<u16>()?,
            hash_code: parser.read_le::<u32>()?,
            vtable: Vec::new(),
            interfaces: Vec::new(),
            type_def: OnceLock::new(),
        };

        let is_reference = descriptor
            .element_type()
            .is_some_and(ElementType::is_reference_type);
        if is_reference && descriptor.interface_count < max_interfaces {
            let step = width.bytes() as u64;
            let mut cursor = address + Self::header_size(width) as u64;
            for _ in 0..descriptor.vtable_slot_count {
                descriptor.vtable.push(space.read_pointer(cursor)?);
                cursor += step;
            }
            for _ in 0..descriptor.interface_count {
                descriptor.interfaces.push(space.read_pointer(cursor)?);
                cursor += step;
            }
        }

        Ok(descriptor)
    }

    /// The descriptor kind
    #[must_use]
    pub fn kind(&self) -> Option<TypeDescriptorKind> {
        TypeDescriptorKind::from_repr((self.flags & TypeDescriptorFlags::KIND_MASK).bits())
    }

    /// The element type, if it is a known one
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn element_type(&self) -> Option<ElementType> {
        let bits = (self.flags & TypeDescriptorFlags::ELEMENT_TYPE_MASK).bits() >> ELEMENT_TYPE_SHIFT;
        ElementType::from_repr(bits as u8)
    }

    /// Component size of array and string types
    #[must_use]
    pub fn component_size(&self) -> Option<u16> {
        if self.flags.contains(TypeDescriptorFlags::HAS_COMPONENT_SIZE) {
            Some((self.flags.bits() & 0xFFFF) as u16)
        } else {
            None
        }
    }

    /// The raw related-type pointer, before interpretation
    #[must_use]
    pub fn related_type_raw(&self) -> u64 {
        self.related_type
    }

    /// The related-type field, interpreted according to the descriptor kind
    #[must_use]
    pub fn related_type(&self) -> RelatedType {
        match (self.related_type, self.kind()) {
            (0, _) => RelatedType::None,
            (address, Some(TypeDescriptorKind::Parameterized)) => RelatedType::ElementType(address),
            (address, _) => RelatedType::BaseType(address),
        }
    }

    /// The type definition matched to this descriptor, if it is still alive
    #[must_use]
    pub fn type_def(&self) -> Option<TypeDefRc> {
        self.type_def.get().and_then(TypeDefRef::upgrade)
    }

    /// Permanently bind this descriptor to `type_def`. Returns false if it was already bound.
    pub fn bind(&self, type_def: &TypeDefRc) -> bool {
        self.type_def.set(TypeDefRef::new(type_def)).is_ok()
    }
}

impl std::fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("address", &format_args!("{:#x}", self.address))
            .field("flags", &self.flags)
            .field("base_size", &self.base_size)
            .field("related_type", &self.related_type())
            .field("hash_code", &format_args!("{:#010x}", self.hash_code))
            .field("vtable", &self.vtable.len())
            .field("interfaces", &self.interfaces.len())
            .finish_non_exhaustive()
    }
}
