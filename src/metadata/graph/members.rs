//! Resolved members: methods, parameters, fields and custom attributes.

use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc, OnceLock, Weak,
};

use crate::metadata::{
    flags::{FieldAttributes, MethodAttributes, MethodImplAttributes, ParameterAttributes},
    graph::types::{TypeDefRc, TypeDefRef},
    handle::Handle,
    hash::{method_hash, method_signature_hash, name_hash},
};

/// Reference counted `MethodDef`
pub type MethodDefRc = Arc<MethodDef>;
/// Reference counted `FieldDef`
pub type FieldDefRc = Arc<FieldDef>;
/// Reference counted `ParamDef`
pub type ParamDefRc = Arc<ParamDef>;
/// Reference counted `CustomAttributeDef`
pub type CustomAttributeDefRc = Arc<CustomAttributeDef>;

/// A weak reference to a [`MethodDef`]
#[derive(Clone, Debug)]
pub struct MethodDefRef {
    weak_ref: Weak<MethodDef>,
}

impl MethodDefRef {
    /// Create a new `MethodDefRef` from a strong reference
    #[must_use]
    pub fn new(strong_ref: &MethodDefRc) -> Self {
        MethodDefRef {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference, `None` if the method has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<MethodDefRc> {
        self.weak_ref.upgrade()
    }
}

/// A resolved method.
///
/// The entry address is the only state mutated after construction; it is written by invoke
/// map resolution and stays `0` for methods without compiled code.
#[derive(Debug)]
pub struct MethodDef {
    /// The `Method` handle
    pub handle: Handle,
    /// Simple name
    pub name: String,
    /// Method flags
    pub flags: MethodAttributes,
    /// Implementation flags
    pub impl_flags: MethodImplAttributes,
    /// Raw calling convention bits of the signature
    pub calling_convention: u32,
    /// Number of generic parameters
    pub generic_parameter_count: u32,
    declaring_type: OnceLock<TypeDefRef>,
    return_type: OnceLock<TypeDefRef>,
    /// Parameter types in signature order; `None` where the type kind is unsupported
    pub parameter_types: boxcar::Vec<Option<TypeDefRef>>,
    /// Named parameter records
    pub params: boxcar::Vec<ParamDefRc>,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttributeDefRc>,
    entry_address: AtomicU64,
}

impl MethodDef {
    /// Create an unresolved method
    #[must_use]
    pub fn new(
        handle: Handle,
        name: String,
        flags: MethodAttributes,
        impl_flags: MethodImplAttributes,
        calling_convention: u32,
        generic_parameter_count: u32,
    ) -> Self {
        MethodDef {
            handle,
            name,
            flags,
            impl_flags,
            calling_convention,
            generic_parameter_count,
            declaring_type: OnceLock::new(),
            return_type: OnceLock::new(),
            parameter_types: boxcar::Vec::new(),
            params: boxcar::Vec::new(),
            custom_attributes: boxcar::Vec::new(),
            entry_address: AtomicU64::new(0),
        }
    }

    /// The type declaring this method
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeDefRc> {
        self.declaring_type.get().and_then(TypeDefRef::upgrade)
    }

    /// Set the declaring type; returns false if already set
    pub fn set_declaring_type(&self, declaring_type: &TypeDefRc) -> bool {
        self.declaring_type
            .set(TypeDefRef::new(declaring_type))
            .is_ok()
    }

    /// The return type
    #[must_use]
    pub fn return_type(&self) -> Option<TypeDefRc> {
        self.return_type.get().and_then(TypeDefRef::upgrade)
    }

    /// Set the return type; returns false if already set
    pub fn set_return_type(&self, return_type: &TypeDefRc) -> bool {
        self.return_type.set(TypeDefRef::new(return_type)).is_ok()
    }

    /// Native entry address, `0` while unresolved
    #[must_use]
    pub fn entry_address(&self) -> u64 {
        self.entry_address.load(Ordering::Acquire)
    }

    /// Record the native entry address
    pub fn set_entry_address(&self, address: u64) {
        self.entry_address.store(address, Ordering::Release);
    }

    /// True for static methods
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(MethodAttributes::STATIC)
    }

    /// Identity hash: the declaring type's hash combined with the name hash
    #[must_use]
    pub fn hash(&self) -> Option<u32> {
        let owner = self.declaring_type()?.hash()?;
        Some(method_hash(owner, name_hash(&self.name)))
    }

    /// Signature hash over the return and parameter types, if every one of them is hashed
    #[must_use]
    pub fn signature_hash(&self) -> Option<u32> {
        let return_type = self.return_type()?.hash()?;
        let parameters = self
            .parameter_types
            .iter()
            .map(|(_, parameter)| parameter.as_ref().and_then(TypeDefRef::hash))
            .collect::<Option<Vec<_>>>()?;
        Some(method_signature_hash(return_type, &parameters))
    }

    /// `Owner.Name`, or just the name without a declaring type
    #[must_use]
    pub fn full_name(&self) -> String {
        match self.declaring_type() {
            Some(owner) => format!("{}.{}", owner.full_name(), self.name),
            None => self.name.clone(),
        }
    }
}

/// A resolved method parameter
#[derive(Debug)]
pub struct ParamDef {
    /// The `Parameter` handle
    pub handle: Handle,
    /// Name
    pub name: String,
    /// Flags
    pub flags: ParameterAttributes,
    /// Position, `0` for the return value
    pub sequence: u16,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttributeDefRc>,
}

/// A resolved field.
#[derive(Debug)]
pub struct FieldDef {
    /// The `Field` handle
    pub handle: Handle,
    /// Name
    pub name: String,
    /// Flags
    pub flags: FieldAttributes,
    /// Byte offset
    pub offset: u32,
    declaring_type: OnceLock<TypeDefRef>,
    field_type: OnceLock<TypeDefRef>,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttributeDefRc>,
}

impl FieldDef {
    /// Create a field with unresolved types
    #[must_use]
    pub fn new(handle: Handle, name: String, flags: FieldAttributes, offset: u32) -> Self {
        FieldDef {
            handle,
            name,
            flags,
            offset,
            declaring_type: OnceLock::new(),
            field_type: OnceLock::new(),
            custom_attributes: boxcar::Vec::new(),
        }
    }

    /// The type declaring this field
    #[must_use]
    pub fn declaring_type(&self) -> Option<TypeDefRc> {
        self.declaring_type.get().and_then(TypeDefRef::upgrade)
    }

    /// Set the declaring type; returns false if already set
    pub fn set_declaring_type(&self, declaring_type: &TypeDefRc) -> bool {
        self.declaring_type
            .set(TypeDefRef::new(declaring_type))
            .is_ok()
    }

    /// The field's type
    #[must_use]
    pub fn field_type(&self) -> Option<TypeDefRc> {
        self.field_type.get().and_then(TypeDefRef::upgrade)
    }

    /// Set the field's type; returns false if already set
    pub fn set_field_type(&self, field_type: &TypeDefRc) -> bool {
        self.field_type.set(TypeDefRef::new(field_type)).is_ok()
    }

    /// True for static fields
    #[must_use]
    pub fn is_static(&self) -> bool {
        self.flags.contains(FieldAttributes::STATIC)
    }
}

/// A resolved custom attribute; only the constructor is recovered
#[derive(Debug)]
pub struct CustomAttributeDef {
    /// The `CustomAttribute` handle
    pub handle: Handle,
    constructor: OnceLock<MethodDefRef>,
}

impl CustomAttributeDef {
    /// Create an attribute without constructor
    #[must_use]
    pub fn new(handle: Handle) -> Self {
        CustomAttributeDef {
            handle,
            constructor: OnceLock::new(),
        }
    }

    /// The constructor, if it is a method of this module
    #[must_use]
    pub fn constructor(&self) -> Option<MethodDefRc> {
        self.constructor.get().and_then(MethodDefRef::upgrade)
    }

    /// Set the constructor; returns false if already set
    pub fn set_constructor(&self, constructor: &MethodDefRc) -> bool {
        self.constructor.set(MethodDefRef::new(constructor)).is_ok()
    }

    /// Full name of the attribute type, from the constructor's declaring type
    #[must_use]
    pub fn type_name(&self) -> Option<String> {
        self.constructor()?
            .declaring_type()
            .map(|owner| owner.full_name())
    }
}
