//! The handle-based view of the packed metadata blob.
//!
//! Decoding the blob itself is the job of an external reader; this crate only consumes
//! handles and the records they resolve to. [`MetadataReader`] is the seam: every accessor
//! takes a [`Handle`] of the matching kind and returns a plain record whose references to other
//! records are handles again. [`crate::metadata::memory::MemoryMetadata`] is an in-memory
//! implementation used for synthetic inputs.
//!
//! Lists of child handles (methods of a type, parameters of a method, ...) are returned in
//! metadata order.

use crate::{
    metadata::{
        flags::{
            AssemblyFlags, FieldAttributes, MethodAttributes, MethodImplAttributes,
            ParameterAttributes, TypeAttributes,
        },
        handle::Handle,
    },
    Result,
};

/// An assembly together with its single module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeDefinition {
    /// Assembly flags
    pub flags: AssemblyFlags,
    /// Assembly name (`ConstantStringValue`)
    pub name: Handle,
    /// Hash algorithm identifier
    pub hash_algorithm: u32,
    /// Major version
    pub major_version: u16,
    /// Minor version
    pub minor_version: u16,
    /// Build number
    pub build_number: u16,
    /// Revision number
    pub revision_number: u16,
    /// Public key or token
    pub public_key: Vec<u8>,
    /// Culture (`ConstantStringValue`)
    pub culture: Handle,
    /// Root namespace (`NamespaceDefinition`)
    pub root_namespace_definition: Handle,
    /// Managed entry point (`QualifiedMethod`), may be nil
    pub entry_point: Handle,
    /// The `<Module>` type (`TypeDefinition`), may be nil
    pub global_module_type: Handle,
    /// Assembly level custom attributes
    pub custom_attributes: Vec<Handle>,
    /// Module name (`ConstantStringValue`)
    pub module_name: Handle,
    /// Module version id
    pub mvid: [u8; 16],
    /// Module level custom attributes
    pub module_custom_attributes: Vec<Handle>,
}

/// A namespace defined in a scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceDefinition {
    /// Parent namespace, or the scope for the root namespace
    pub parent_scope_or_namespace: Handle,
    /// Simple name (`ConstantStringValue`), nil for the root namespace
    pub name: Handle,
    /// Types declared directly in this namespace
    pub type_definitions: Vec<Handle>,
    /// Child namespaces
    pub namespace_definitions: Vec<Handle>,
}

/// A namespace of another scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NamespaceReference {
    /// Parent namespace reference, or the scope reference for a root
    pub parent_scope_or_namespace: Handle,
    /// Simple name (`ConstantStringValue`)
    pub name: Handle,
}

/// A type declared in this module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeDefinition {
    /// Type flags
    pub flags: TypeAttributes,
    /// Base type, may be nil
    pub base_type: Handle,
    /// Declaring namespace
    pub namespace_definition: Handle,
    /// Simple name (`ConstantStringValue`)
    pub name: Handle,
    /// Explicit size, `0` if unset
    pub size: u32,
    /// Explicit packing, `0` if unset
    pub packing_size: u16,
    /// Enclosing type of a nested type, nil otherwise
    pub enclosing_type: Handle,
    /// Nested types
    pub nested_types: Vec<Handle>,
    /// Methods
    pub methods: Vec<Handle>,
    /// Fields
    pub fields: Vec<Handle>,
    /// Generic parameters
    pub generic_parameters: Vec<Handle>,
    /// Implemented interfaces
    pub interfaces: Vec<Handle>,
    /// Custom attributes
    pub custom_attributes: Vec<Handle>,
}

/// A type declared in another module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeReference {
    /// A `NamespaceReference` or, for nested types, the enclosing `TypeReference`
    pub parent_namespace_or_type: Handle,
    /// Simple name (`ConstantStringValue`)
    pub type_name: Handle,
}

/// A constructed type used as a metadata token
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeSpecification {
    /// The signature describing the type
    pub signature: Handle,
}

/// `T[]`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SzArraySignature {
    /// Element type
    pub element_type: Handle,
}

/// `T[,]` and friends
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArraySignature {
    /// Element type
    pub element_type: Handle,
    /// Number of dimensions
    pub rank: u32,
    /// Declared sizes, may be shorter than `rank`
    pub sizes: Vec<u32>,
    /// Declared lower bounds, may be shorter than `rank`
    pub lower_bounds: Vec<i32>,
}

/// `ref T`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByReferenceSignature {
    /// Referenced type
    pub target_type: Handle,
}

/// `T*`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PointerSignature {
    /// Pointed-to type
    pub target_type: Handle,
}

/// `!N`, a type generic parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeVariableSignature {
    /// Parameter index
    pub number: u32,
}

/// `!!N`, a method generic parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodTypeVariableSignature {
    /// Parameter index
    pub number: u32,
}

/// `G<A, B>`
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TypeInstantiationSignature {
    /// The generic type definition
    pub generic_type: Handle,
    /// The type arguments, in order
    pub generic_type_arguments: Vec<Handle>,
}

/// A method declared in this module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Method {
    /// Method flags
    pub flags: MethodAttributes,
    /// Implementation flags
    pub impl_flags: MethodImplAttributes,
    /// Simple name (`ConstantStringValue`)
    pub name: Handle,
    /// The `MethodSignature`
    pub signature: Handle,
    /// Parameter records, not including the return value
    pub parameters: Vec<Handle>,
    /// Generic parameters
    pub generic_parameters: Vec<Handle>,
    /// Custom attributes
    pub custom_attributes: Vec<Handle>,
}

/// Calling convention, return type and parameter types of a method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MethodSignature {
    /// Raw calling convention bits
    pub calling_convention: u32,
    /// Number of generic parameters
    pub generic_parameter_count: u32,
    /// Return type
    pub return_type: Handle,
    /// Parameter types, in order
    pub parameters: Vec<Handle>,
}

/// A field declared in this module
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Field {
    /// Field flags
    pub flags: FieldAttributes,
    /// Simple name (`ConstantStringValue`)
    pub name: Handle,
    /// The `FieldSignature`
    pub signature: Handle,
    /// Byte offset inside the instance or static base
    pub offset: u32,
    /// Custom attributes
    pub custom_attributes: Vec<Handle>,
}

/// The type of a field
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldSignature {
    /// Field type
    pub field_type: Handle,
}

/// A method parameter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameter {
    /// Parameter flags
    pub flags: ParameterAttributes,
    /// Position, `0` for the return value
    pub sequence: u16,
    /// Simple name (`ConstantStringValue`)
    pub name: Handle,
    /// Custom attributes
    pub custom_attributes: Vec<Handle>,
}

/// A custom attribute instance
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomAttribute {
    /// `QualifiedMethod` or `MemberReference` of the constructor
    pub constructor: Handle,
}

/// A method together with its declaring type
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QualifiedMethod {
    /// The `Method`
    pub method: Handle,
    /// The declaring `TypeDefinition`
    pub enclosing_type: Handle,
}

/// Handle-based accessors over a packed metadata blob.
///
/// Each accessor fails with [`crate::Error::HandleMismatch`] if the handle does not refer to
/// a record of the requested kind, and with a format error if the record is malformed.
pub trait MetadataReader {
    /// All scopes (assemblies) of the blob
    fn scope_definitions(&self) -> Vec<Handle>;

    /// Resolve a `ScopeDefinition`
    fn scope_definition(&self, handle: Handle) -> Result<ScopeDefinition>;

    /// Resolve a `NamespaceDefinition`
    fn namespace_definition(&self, handle: Handle) -> Result<NamespaceDefinition>;

    /// Resolve a `NamespaceReference`
    fn namespace_reference(&self, handle: Handle) -> Result<NamespaceReference>;

    /// Resolve a `TypeDefinition`
    fn type_definition(&self, handle: Handle) -> Result<TypeDefinition>;

    /// Resolve a `TypeReference`
    fn type_reference(&self, handle: Handle) -> Result<TypeReference>;

    /// Resolve a `TypeSpecification`
    fn type_specification(&self, handle: Handle) -> Result<TypeSpecification>;

    /// Resolve a `SZArraySignature`
    fn sz_array_signature(&self, handle: Handle) -> Result<SzArraySignature>;

    /// Resolve an `ArraySignature`
    fn array_signature(&self, handle: Handle) -> Result<ArraySignature>;

    /// Resolve a `ByReferenceSignature`
    fn by_reference_signature(&self, handle: Handle) -> Result<ByReferenceSignature>;

    /// Resolve a `PointerSignature`
    fn pointer_signature(&self, handle: Handle) -> Result<PointerSignature>;

    /// Resolve a `TypeVariableSignature`
    fn type_variable_signature(&self, handle: Handle) -> Result<TypeVariableSignature>;

    /// Resolve a `MethodTypeVariableSignature`
    fn method_type_variable_signature(&self, handle: Handle)
        -> Result<MethodTypeVariableSignature>;

    /// Resolve a `TypeInstantiationSignature`
    fn type_instantiation_signature(&self, handle: Handle) -> Result<TypeInstantiationSignature>;

    /// Resolve a `Method`
    fn method(&self, handle: Handle) -> Result<Method>;

    /// Resolve a `MethodSignature`
    fn method_signature(&self, handle: Handle) -> Result<MethodSignature>;

    /// Resolve a `Field`
    fn field(&self, handle: Handle) -> Result<Field>;

    /// Resolve a `FieldSignature`
    fn field_signature(&self, handle: Handle) -> Result<FieldSignature>;

    /// Resolve a `Parameter`
    fn parameter(&self, handle: Handle) -> Result<Parameter>;

    /// Resolve a `CustomAttribute`
    fn custom_attribute(&self, handle: Handle) -> Result<CustomAttribute>;

    /// Resolve a `QualifiedMethod`
    fn qualified_method(&self, handle: Handle) -> Result<QualifiedMethod>;

    /// Resolve a `ConstantStringValue`; the nil handle yields an empty string
    fn string(&self, handle: Handle) -> Result<String>;
}
