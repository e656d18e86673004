//! Metadata handles.
//!
//! A [`Handle`] is the opaque key into the packed metadata blob. It combines a [`HandleType`]
//! in the high byte with a 24-bit record offset, the same way the runtime's NativeFormat
//! metadata encodes them.
//!
//! # Examples
//!
//! ```rust
//! use aotscope::metadata::handle::{Handle, HandleType};
//!
//! let handle = Handle::new(HandleType::Method, 0x42);
//! assert_eq!(handle.value(), 0x2800_0042);
//! assert_eq!(handle.handle_type(), Some(HandleType::Method));
//! assert_eq!(handle.offset(), 0x42);
//! ```

use std::fmt;

/// The record kind encoded in the high byte of a [`Handle`].
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, strum::FromRepr, strum::Display,
)]
#[repr(u8)]
#[allow(missing_docs)]
pub enum HandleType {
    Null = 0x00,
    ArraySignature = 0x01,
    ByReferenceSignature = 0x02,
    ConstantStringValue = 0x1A,
    CustomAttribute = 0x21,
    Field = 0x23,
    FieldSignature = 0x24,
    FunctionPointerSignature = 0x25,
    GenericParameter = 0x26,
    MemberReference = 0x27,
    Method = 0x28,
    MethodInstantiation = 0x29,
    MethodSignature = 0x2B,
    MethodTypeVariableSignature = 0x2C,
    ModifiedType = 0x2D,
    NamespaceDefinition = 0x2F,
    NamespaceReference = 0x30,
    Parameter = 0x31,
    PointerSignature = 0x32,
    QualifiedField = 0x35,
    QualifiedMethod = 0x36,
    SzArraySignature = 0x37,
    ScopeDefinition = 0x38,
    ScopeReference = 0x39,
    TypeDefinition = 0x3A,
    TypeForwarder = 0x3B,
    TypeInstantiationSignature = 0x3C,
    TypeReference = 0x3D,
    TypeSpecification = 0x3E,
    TypeVariableSignature = 0x3F,
}

/// A key into the packed metadata blob: record kind in the high byte, offset below.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Handle(pub u32);

impl Handle {
    /// The nil handle
    pub const NULL: Handle = Handle(0);

    /// Combine a kind and a record offset
    #[must_use]
    pub const fn new(kind: HandleType, offset: u32) -> Self {
        Handle(((kind as u32) << 24) | (offset & 0x00FF_FFFF))
    }

    /// The raw 32-bit value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// The raw kind byte
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn kind_byte(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// The record kind, if it is a known one
    #[must_use]
    pub fn handle_type(&self) -> Option<HandleType> {
        HandleType::from_repr(self.kind_byte())
    }

    /// True if the handle is of the given kind
    #[must_use]
    pub fn is(&self, kind: HandleType) -> bool {
        self.kind_byte() == kind as u8
    }

    /// The record offset
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// True if the handle points at no record
    #[must_use]
    pub fn is_nil(&self) -> bool {
        self.offset() == 0
    }
}

impl From<u32> for Handle {
    fn from(value: u32) -> Self {
        Handle(value)
    }
}

impl From<Handle> for u32 {
    fn from(handle: Handle) -> Self {
        handle.0
    }
}

impl fmt::Debug for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.handle_type() {
            Some(kind) => write!(f, "Handle({kind}, 0x{:06x})", self.offset()),
            None => write!(f, "Handle(0x{:08x})", self.0),
        }
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}
