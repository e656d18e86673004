//! Attribute flag sets carried by metadata records.
//!
//! The values follow the ECMA-335 encodings, which the packed metadata format reuses
//! unchanged. Unknown bits are retained.

use bitflags::bitflags;

bitflags! {
    /// Flags of a type definition
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TypeAttributes: u32 {
        /// Mask of the visibility bits
        const VISIBILITY_MASK = 0x0000_0007;
        /// Visible outside the assembly
        const PUBLIC = 0x0000_0001;
        /// Nested, visible outside the assembly
        const NESTED_PUBLIC = 0x0000_0002;
        /// Nested, visible only to the enclosing type
        const NESTED_PRIVATE = 0x0000_0003;
        /// Nested, visible to the enclosing type and its subclasses
        const NESTED_FAMILY = 0x0000_0004;
        /// Nested, visible inside the assembly
        const NESTED_ASSEMBLY = 0x0000_0005;
        /// Explicit field layout
        const EXPLICIT_LAYOUT = 0x0000_0010;
        /// The type is an interface
        const INTERFACE = 0x0000_0020;
        /// The type can not be instantiated
        const ABSTRACT = 0x0000_0080;
        /// The type can not be derived from
        const SEALED = 0x0000_0100;
        /// The name is special to the runtime
        const SPECIAL_NAME = 0x0000_0400;
        /// The type has a static constructor that may run lazily
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// Nested types have one of the nested visibilities; only bits 1 and 2 are inspected
    #[must_use]
    pub fn is_nested(self) -> bool {
        self.bits() & 0x0000_0006 != 0
    }

    /// True for interface types
    #[must_use]
    pub fn is_interface(self) -> bool {
        self.contains(TypeAttributes::INTERFACE)
    }
}

bitflags! {
    /// Flags of a method definition
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodAttributes: u16 {
        /// Mask of the accessibility bits
        const MEMBER_ACCESS_MASK = 0x0007;
        /// Accessible only inside the declaring type
        const PRIVATE = 0x0001;
        /// Accessible inside the assembly
        const ASSEMBLY = 0x0003;
        /// Accessible to subclasses
        const FAMILY = 0x0004;
        /// Accessible everywhere
        const PUBLIC = 0x0006;
        /// Static method
        const STATIC = 0x0010;
        /// Can not be overridden
        const FINAL = 0x0020;
        /// Virtual method
        const VIRTUAL = 0x0040;
        /// Hides by name and signature
        const HIDE_BY_SIG = 0x0080;
        /// Always gets a new vtable slot
        const NEW_SLOT = 0x0100;
        /// No implementation is provided
        const ABSTRACT = 0x0400;
        /// The name is special
        const SPECIAL_NAME = 0x0800;
        /// Implemented through platform invoke
        const PINVOKE_IMPL = 0x2000;
        /// The name is special to the runtime
        const RT_SPECIAL_NAME = 0x1000;
    }
}

bitflags! {
    /// Implementation flags of a method definition
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MethodImplAttributes: u16 {
        /// Implemented natively
        const NATIVE = 0x0001;
        /// Implemented by the runtime
        const RUNTIME = 0x0003;
        /// Must not be inlined
        const NO_INLINING = 0x0008;
        /// Signature is exported exactly
        const PRESERVE_SIG = 0x0080;
        /// Implemented inside the runtime
        const INTERNAL_CALL = 0x1000;
        /// Single-threaded execution
        const SYNCHRONIZED = 0x0020;
        /// Should be inlined aggressively
        const AGGRESSIVE_INLINING = 0x0100;
    }
}

bitflags! {
    /// Flags of a field definition
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FieldAttributes: u16 {
        /// Mask of the accessibility bits
        const FIELD_ACCESS_MASK = 0x0007;
        /// Accessible only inside the declaring type
        const PRIVATE = 0x0001;
        /// Accessible everywhere
        const PUBLIC = 0x0006;
        /// Static field
        const STATIC = 0x0010;
        /// Only assignable during initialization
        const INIT_ONLY = 0x0020;
        /// Compile-time constant
        const LITERAL = 0x0040;
        /// Has a field RVA
        const HAS_FIELD_RVA = 0x0100;
    }
}

bitflags! {
    /// Flags of a method parameter
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ParameterAttributes: u16 {
        /// Input parameter
        const IN = 0x0001;
        /// Output parameter
        const OUT = 0x0002;
        /// Optional parameter
        const OPTIONAL = 0x0010;
        /// Has a default value
        const HAS_DEFAULT = 0x1000;
        /// Has marshalling information
        const HAS_FIELD_MARSHAL = 0x2000;
    }
}

bitflags! {
    /// Flags of an assembly scope
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AssemblyFlags: u32 {
        /// The public key is the full key, not a token
        const PUBLIC_KEY = 0x0001;
        /// Side-by-side compatible
        const RETARGETABLE = 0x0100;
        /// JIT tracking disabled
        const DISABLE_JIT_COMPILE_OPTIMIZER = 0x4000;
        /// JIT tracking enabled
        const ENABLE_JIT_COMPILE_TRACKING = 0x8000;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nested_visibility() {
        assert!(!TypeAttributes::empty().is_nested());
        assert!(!TypeAttributes::PUBLIC.is_nested());
        assert!(TypeAttributes::NESTED_PUBLIC.is_nested());
        assert!(TypeAttributes::NESTED_PRIVATE.is_nested());
        assert!(TypeAttributes::NESTED_FAMILY.is_nested());
        assert!(TypeAttributes::from_bits_retain(0x7).is_nested());
        assert!(!TypeAttributes::from_bits_retain(0x0010_0001).is_nested());
    }

    #[test]
    fn unknown_bits_are_retained() {
        let flags = MethodAttributes::from_bits_retain(0x8000 | 0x0010);
        assert!(flags.contains(MethodAttributes::STATIC));
        assert_eq!(flags.bits(), 0x8010);
    }
}
