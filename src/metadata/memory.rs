//! In-memory metadata.
//!
//! [`MemoryMetadata`] implements [`MetadataReader`] over records held in a map, and
//! [`MetadataBuilder`] assembles such a set of records with sequentially allocated handles. It
//! serves synthetic inputs and any front end that decodes the packed blob ahead of time.
//!
//! # Examples
//!
//! ```rust
//! use aotscope::metadata::{
//!     flags::{MethodAttributes, TypeAttributes},
//!     memory::MetadataBuilder,
//!     reader::MetadataReader,
//! };
//!
//! let mut builder = MetadataBuilder::new();
//! let scope = builder.scope("App");
//! let root = builder.root_namespace(scope).unwrap();
//! let ns = builder.namespace(root, "MyNs");
//! let widget = builder.type_definition(ns, "Widget", TypeAttributes::PUBLIC);
//! let run = builder.method(widget, "Run", MethodAttributes::PUBLIC, widget, &[]);
//!
//! let metadata = builder.build();
//! let record = metadata.method(run)?;
//! assert_eq!(metadata.string(record.name)?, "Run");
//! # Ok::<(), aotscope::Error>(())
//! ```

use std::collections::HashMap;

use crate::{
    metadata::{
        flags::{FieldAttributes, MethodAttributes, ParameterAttributes, TypeAttributes},
        handle::{Handle, HandleType},
        reader::{
            ArraySignature, ByReferenceSignature, CustomAttribute, Field, FieldSignature, Method,
            MetadataReader, MethodSignature, MethodTypeVariableSignature, NamespaceDefinition,
            NamespaceReference, Parameter, PointerSignature, QualifiedMethod, ScopeDefinition,
            SzArraySignature, TypeDefinition, TypeInstantiationSignature, TypeReference,
            TypeSpecification, TypeVariableSignature,
        },
    },
    Error, Result,
};

#[derive(Debug, Clone)]
enum Record {
    Scope(ScopeDefinition),
    NamespaceDefinition(NamespaceDefinition),
    NamespaceReference(NamespaceReference),
    TypeDefinition(TypeDefinition),
    TypeReference(TypeReference),
    TypeSpecification(TypeSpecification),
    SzArray(SzArraySignature),
    Array(ArraySignature),
    ByReference(ByReferenceSignature),
    Pointer(PointerSignature),
    TypeVariable(TypeVariableSignature),
    MethodTypeVariable(MethodTypeVariableSignature),
    TypeInstantiation(TypeInstantiationSignature),
    Method(Method),
    MethodSignature(MethodSignature),
    Field(Field),
    FieldSignature(FieldSignature),
    Parameter(Parameter),
    CustomAttribute(CustomAttribute),
    QualifiedMethod(QualifiedMethod),
    String(String),
}

/// A [`MetadataReader`] over fully decoded records.
#[derive(Debug, Clone, Default)]
pub struct MemoryMetadata {
    scopes: Vec<Handle>,
    records: HashMap<Handle, Record>,
}

impl MemoryMetadata {
    /// Number of records of every kind
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns true if no record is present
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

macro_rules! record_accessor {
    ($name:ident, $variant:ident, $ty:ty, $expected:literal) => {
        fn $name(&self, handle: Handle) -> Result<$ty> {
            match self.records.get(&handle) {
                Some(Record::$variant(record)) => Ok(record.clone()),
                _ => Err(Error::HandleMismatch {
                    handle,
                    expected: $expected,
                }),
            }
        }
    };
}

impl MetadataReader for MemoryMetadata {
    fn scope_definitions(&self) -> Vec<Handle> {
        self.scopes.clone()
    }

    record_accessor!(scope_definition, Scope, ScopeDefinition, "ScopeDefinition");
    record_accessor!(namespace_definition, NamespaceDefinition, NamespaceDefinition, "NamespaceDefinition");
    record_accessor!(namespace_reference, NamespaceReference, NamespaceReference, "NamespaceReference");
    record_accessor!(type_definition, TypeDefinition, TypeDefinition, "TypeDefinition");
    record_accessor!(type_reference, TypeReference, TypeReference, "TypeReference");
    record_accessor!(type_specification, TypeSpecification, TypeSpecification, "TypeSpecification");
    record_accessor!(sz_array_signature, SzArray, SzArraySignature, "SZArraySignature");
    record_accessor!(array_signature, Array, ArraySignature, "ArraySignature");
    record_accessor!(by_reference_signature, ByReference, ByReferenceSignature, "ByReferenceSignature");
    record_accessor!(pointer_signature, Pointer, PointerSignature, "PointerSignature");
    record_accessor!(type_variable_signature, TypeVariable, TypeVariableSignature, "TypeVariableSignature");
    record_accessor!(method_type_variable_signature, MethodTypeVariable, MethodTypeVariableSignature, "MethodTypeVariableSignature");
    record_accessor!(type_instantiation_signature, TypeInstantiation, TypeInstantiationSignature, "TypeInstantiationSignature");
    record_accessor!(method, Method, Method, "Method");
    record_accessor!(method_signature, MethodSignature, MethodSignature, "MethodSignature");
    record_accessor!(field, Field, Field, "Field");
    record_accessor!(field_signature, FieldSignature, FieldSignature, "FieldSignature");
    record_accessor!(parameter, Parameter, Parameter, "Parameter");
    record_accessor!(custom_attribute, CustomAttribute, CustomAttribute, "CustomAttribute");
    record_accessor!(qualified_method, QualifiedMethod, QualifiedMethod, "QualifiedMethod");

    fn string(&self, handle: Handle) -> Result<String> {
        if handle.is_nil() {
            return Ok(String::new());
        }

        match self.records.get(&handle) {
            Some(Record::String(value)) => Ok(value.clone()),
            _ => Err(Error::HandleMismatch {
                handle,
                expected: "ConstantStringValue",
            }),
        }
    }
}

/// Assembles a [`MemoryMetadata`] record by record.
///
/// Handles are allocated per kind, starting at offset 1, in creation order. Child records are
/// linked into their parents as they are created.
#[derive(Debug, Default)]
pub struct MetadataBuilder {
    next: HashMap<HandleType, u32>,
    strings: HashMap<String, Handle>,
    metadata: MemoryMetadata,
}

impl MetadataBuilder {
    /// Create an empty builder
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Finish building
    #[must_use]
    pub fn build(self) -> MemoryMetadata {
        self.metadata
    }

    fn allocate(&mut self, kind: HandleType, record: Record) -> Handle {
        let next = self.next.entry(kind).or_insert(0);
        *next += 1;
        let handle = Handle::new(kind, *next);
        self.metadata.records.insert(handle, record);
        handle
    }

    fn record_mut(&mut self, handle: Handle) -> Option<&mut Record> {
        self.metadata.records.get_mut(&handle)
    }

    /// Intern a constant string
    pub fn string(&mut self, value: &str) -> Handle {
        if let Some(handle) = self.strings.get(value) {
            return *handle;
        }

        let handle = self.allocate(HandleType::ConstantStringValue, Record::String(value.to_string()));
        self.strings.insert(value.to_string(), handle);
        handle
    }

    /// Create a scope with an empty root namespace
    pub fn scope(&mut self, name: &str) -> Handle {
        let name = self.string(name);
        let scope = self.allocate(
            HandleType::ScopeDefinition,
            Record::Scope(ScopeDefinition {
                name,
                module_name: name,
                ..ScopeDefinition::default()
            }),
        );
        let root = self.allocate(
            HandleType::NamespaceDefinition,
            Record::NamespaceDefinition(NamespaceDefinition {
                parent_scope_or_namespace: scope,
                ..NamespaceDefinition::default()
            }),
        );

        if let Some(Record::Scope(record)) = self.record_mut(scope) {
            record.root_namespace_definition = root;
        }
        self.metadata.scopes.push(scope);
        scope
    }

    /// The root namespace of `scope`
    #[must_use]
    pub fn root_namespace(&self, scope: Handle) -> Option<Handle> {
        match self.metadata.records.get(&scope) {
            Some(Record::Scope(record)) => Some(record.root_namespace_definition),
            _ => None,
        }
    }

    /// Mutable access to a scope, for setting versions, keys and the like
    pub fn scope_mut(&mut self, scope: Handle) -> Option<&mut ScopeDefinition> {
        match self.record_mut(scope) {
            Some(Record::Scope(record)) => Some(record),
            _ => None,
        }
    }

    /// Set the managed entry point of `scope`
    pub fn set_entry_point(&mut self, scope: Handle, method: Handle, owner: Handle) {
        let qualified = self.qualified_method(method, owner);
        if let Some(record) = self.scope_mut(scope) {
            record.entry_point = qualified;
        }
    }

    /// Set the `<Module>` type of `scope`
    pub fn set_global_module_type(&mut self, scope: Handle, type_definition: Handle) {
        if let Some(record) = self.scope_mut(scope) {
            record.global_module_type = type_definition;
        }
    }

    /// Create a child namespace of `parent`
    pub fn namespace(&mut self, parent: Handle, name: &str) -> Handle {
        let name = self.string(name);
        let namespace = self.allocate(
            HandleType::NamespaceDefinition,
            Record::NamespaceDefinition(NamespaceDefinition {
                parent_scope_or_namespace: parent,
                name,
                ..NamespaceDefinition::default()
            }),
        );

        if let Some(Record::NamespaceDefinition(record)) = self.record_mut(parent) {
            record.namespace_definitions.push(namespace);
        }
        namespace
    }

    /// Create a top-level type in `namespace`
    pub fn type_definition(&mut self, namespace: Handle, name: &str, flags: TypeAttributes) -> Handle {
        let name = self.string(name);
        let handle = self.allocate(
            HandleType::TypeDefinition,
            Record::TypeDefinition(TypeDefinition {
                flags,
                namespace_definition: namespace,
                name,
                ..TypeDefinition::default()
            }),
        );

        if let Some(Record::NamespaceDefinition(record)) = self.record_mut(namespace) {
            record.type_definitions.push(handle);
        }
        handle
    }

    /// Create a type nested in `enclosing`; a non-nested visibility becomes nested public
    pub fn nested_type(&mut self, enclosing: Handle, name: &str, flags: TypeAttributes) -> Handle {
        let flags = if flags.is_nested() {
            flags
        } else {
            (flags - TypeAttributes::VISIBILITY_MASK) | TypeAttributes::NESTED_PUBLIC
        };
        let namespace = match self.metadata.records.get(&enclosing) {
            Some(Record::TypeDefinition(record)) => record.namespace_definition,
            _ => Handle::NULL,
        };

        let name = self.string(name);
        let handle = self.allocate(
            HandleType::TypeDefinition,
            Record::TypeDefinition(TypeDefinition {
                flags,
                namespace_definition: namespace,
                name,
                enclosing_type: enclosing,
                ..TypeDefinition::default()
            }),
        );

        if let Some(Record::TypeDefinition(record)) = self.record_mut(enclosing) {
            record.nested_types.push(handle);
        }
        handle
    }

    /// Set the base type of a type definition
    pub fn set_base_type(&mut self, type_definition: Handle, base_type: Handle) {
        if let Some(Record::TypeDefinition(record)) = self.record_mut(type_definition) {
            record.base_type = base_type;
        }
    }

    /// Create a reference to `namespace.name` in another scope
    pub fn type_reference(&mut self, namespace: &[&str], name: &str) -> Handle {
        let mut parent = self.allocate(
            HandleType::NamespaceReference,
            Record::NamespaceReference(NamespaceReference {
                parent_scope_or_namespace: Handle::new(HandleType::ScopeReference, 1),
                name: Handle::NULL,
            }),
        );
        for part in namespace {
            let name = self.string(part);
            parent = self.allocate(
                HandleType::NamespaceReference,
                Record::NamespaceReference(NamespaceReference {
                    parent_scope_or_namespace: parent,
                    name,
                }),
            );
        }

        let type_name = self.string(name);
        self.allocate(
            HandleType::TypeReference,
            Record::TypeReference(TypeReference {
                parent_namespace_or_type: parent,
                type_name,
            }),
        )
    }

    /// Create a reference to a type nested in the referenced type `enclosing`
    pub fn nested_type_reference(&mut self, enclosing: Handle, name: &str) -> Handle {
        let type_name = self.string(name);
        self.allocate(
            HandleType::TypeReference,
            Record::TypeReference(TypeReference {
                parent_namespace_or_type: enclosing,
                type_name,
            }),
        )
    }

    /// Wrap a signature in a type specification
    pub fn type_specification(&mut self, signature: Handle) -> Handle {
        self.allocate(
            HandleType::TypeSpecification,
            Record::TypeSpecification(TypeSpecification { signature }),
        )
    }

    /// `element[]`
    pub fn sz_array(&mut self, element_type: Handle) -> Handle {
        self.allocate(
            HandleType::SzArraySignature,
            Record::SzArray(SzArraySignature { element_type }),
        )
    }

    /// `element[,...]` with `rank` dimensions
    pub fn array(&mut self, element_type: Handle, rank: u32) -> Handle {
        self.allocate(
            HandleType::ArraySignature,
            Record::Array(ArraySignature {
                element_type,
                rank,
                ..ArraySignature::default()
            }),
        )
    }

    /// `ref target`
    pub fn by_reference(&mut self, target_type: Handle) -> Handle {
        self.allocate(
            HandleType::ByReferenceSignature,
            Record::ByReference(ByReferenceSignature { target_type }),
        )
    }

    /// `target*`
    pub fn pointer(&mut self, target_type: Handle) -> Handle {
        self.allocate(
            HandleType::PointerSignature,
            Record::Pointer(PointerSignature { target_type }),
        )
    }

    /// `!number`
    pub fn type_variable(&mut self, number: u32) -> Handle {
        self.allocate(
            HandleType::TypeVariableSignature,
            Record::TypeVariable(TypeVariableSignature { number }),
        )
    }

    /// `!!number`
    pub fn method_type_variable(&mut self, number: u32) -> Handle {
        self.allocate(
            HandleType::MethodTypeVariableSignature,
            Record::MethodTypeVariable(MethodTypeVariableSignature { number }),
        )
    }

    /// `generic<arguments>`
    pub fn instantiation(&mut self, generic_type: Handle, arguments: &[Handle]) -> Handle {
        self.allocate(
            HandleType::TypeInstantiationSignature,
            Record::TypeInstantiation(TypeInstantiationSignature {
                generic_type,
                generic_type_arguments: arguments.to_vec(),
            }),
        )
    }

    /// Create a method on `owner` with the given signature types
    pub fn method(
        &mut self,
        owner: Handle,
        name: &str,
        flags: MethodAttributes,
        return_type: Handle,
        parameter_types: &[Handle],
    ) -> Handle {
        let signature = self.allocate(
            HandleType::MethodSignature,
            Record::MethodSignature(MethodSignature {
                return_type,
                parameters: parameter_types.to_vec(),
                ..MethodSignature::default()
            }),
        );

        let name = self.string(name);
        let method = self.allocate(
            HandleType::Method,
            Record::Method(Method {
                flags,
                name,
                signature,
                ..Method::default()
            }),
        );

        if let Some(Record::TypeDefinition(record)) = self.record_mut(owner) {
            record.methods.push(method);
        }
        method
    }

    /// Add a named parameter record to `method`
    pub fn parameter(
        &mut self,
        method: Handle,
        name: &str,
        sequence: u16,
        flags: ParameterAttributes,
    ) -> Handle {
        let name = self.string(name);
        let parameter = self.allocate(
            HandleType::Parameter,
            Record::Parameter(Parameter {
                flags,
                sequence,
                name,
                ..Parameter::default()
            }),
        );

        if let Some(Record::Method(record)) = self.record_mut(method) {
            record.parameters.push(parameter);
        }
        parameter
    }

    /// Create a field on `owner`
    pub fn field(
        &mut self,
        owner: Handle,
        name: &str,
        field_type: Handle,
        offset: u32,
        flags: FieldAttributes,
    ) -> Handle {
        let signature = self.allocate(
            HandleType::FieldSignature,
            Record::FieldSignature(FieldSignature { field_type }),
        );

        let name = self.string(name);
        let field = self.allocate(
            HandleType::Field,
            Record::Field(Field {
                flags,
                name,
                signature,
                offset,
                ..Field::default()
            }),
        );

        if let Some(Record::TypeDefinition(record)) = self.record_mut(owner) {
            record.fields.push(field);
        }
        field
    }

    /// Create a qualified method reference
    pub fn qualified_method(&mut self, method: Handle, enclosing_type: Handle) -> Handle {
        self.allocate(
            HandleType::QualifiedMethod,
            Record::QualifiedMethod(QualifiedMethod {
                method,
                enclosing_type,
            }),
        )
    }

    /// Attach a custom attribute constructed by `constructor` (declared on `owner`) to
    /// `target`, which may be a scope, type, method, field or parameter
    pub fn custom_attribute(&mut self, target: Handle, constructor: Handle, owner: Handle) -> Handle {
        let constructor = self.qualified_method(constructor, owner);
        let attribute = self.allocate(
            HandleType::CustomAttribute,
            Record::CustomAttribute(CustomAttribute { constructor }),
        );

        match self.record_mut(target) {
            Some(Record::Scope(record)) => record.custom_attributes.push(attribute),
            Some(Record::TypeDefinition(record)) => record.custom_attributes.push(attribute),
            Some(Record::Method(record)) => record.custom_attributes.push(attribute),
            Some(Record::Field(record)) => record.custom_attributes.push(attribute),
            Some(Record::Parameter(record)) => record.custom_attributes.push(attribute),
            _ => log::warn!("Custom attribute target {target:?} can not carry attributes"),
        }
        attribute
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_allocated_per_kind() {
        let mut builder = MetadataBuilder::new();
        let scope = builder.scope("App");
        let root = builder.root_namespace(scope).unwrap();
        let first = builder.type_definition(root, "A", TypeAttributes::PUBLIC);
        let second = builder.type_definition(root, "B", TypeAttributes::PUBLIC);

        assert_eq!(scope, Handle::new(HandleType::ScopeDefinition, 1));
        assert_eq!(root, Handle::new(HandleType::NamespaceDefinition, 1));
        assert_eq!(first, Handle::new(HandleType::TypeDefinition, 1));
        assert_eq!(second, Handle::new(HandleType::TypeDefinition, 2));

        let metadata = builder.build();
        assert_eq!(metadata.scope_definitions(), vec![scope]);
        assert_eq!(
            metadata.namespace_definition(root).unwrap().type_definitions,
            vec![first, second]
        );
    }

    #[test]
    fn strings_are_interned() {
        let mut builder = MetadataBuilder::new();
        let a = builder.string("Name");
        let b = builder.string("Name");
        assert_eq!(a, b);

        let metadata = builder.build();
        assert_eq!(metadata.string(a).unwrap(), "Name");
        assert_eq!(metadata.string(Handle::NULL).unwrap(), "");
    }

    #[test]
    fn mismatched_kind() {
        let mut builder = MetadataBuilder::new();
        let scope = builder.scope("App");
        let metadata = builder.build();

        assert!(matches!(
            metadata.type_definition(scope),
            Err(Error::HandleMismatch {
                expected: "TypeDefinition",
                ..
            })
        ));
        assert!(metadata.method(Handle::new(HandleType::Method, 99)).is_err());
    }

    #[test]
    fn members_are_linked() {
        let mut builder = MetadataBuilder::new();
        let scope = builder.scope("App");
        let root = builder.root_namespace(scope).unwrap();
        let outer = builder.type_definition(root, "Outer", TypeAttributes::PUBLIC);
        let inner = builder.nested_type(outer, "Inner", TypeAttributes::PUBLIC);
        let method = builder.method(outer, "Run", MethodAttributes::STATIC, outer, &[inner]);
        let parameter = builder.parameter(method, "value", 1, ParameterAttributes::IN);
        let field = builder.field(outer, "next", outer, 8, FieldAttributes::PUBLIC);
        let attribute = builder.custom_attribute(field, method, outer);
        let metadata = builder.build();

        let outer_record = metadata.type_definition(outer).unwrap();
        assert_eq!(outer_record.nested_types, vec![inner]);
        assert_eq!(outer_record.methods, vec![method]);
        assert_eq!(outer_record.fields, vec![field]);

        let inner_record = metadata.type_definition(inner).unwrap();
        assert!(inner_record.flags.is_nested());
        assert_eq!(inner_record.enclosing_type, outer);

        let method_record = metadata.method(method).unwrap();
        assert_eq!(method_record.parameters, vec![parameter]);
        let signature = metadata.method_signature(method_record.signature).unwrap();
        assert_eq!(signature.return_type, outer);
        assert_eq!(signature.parameters, vec![inner]);

        let field_record = metadata.field(field).unwrap();
        assert_eq!(field_record.offset, 8);
        assert_eq!(field_record.custom_attributes, vec![attribute]);

        let constructor = metadata.custom_attribute(attribute).unwrap().constructor;
        assert_eq!(metadata.qualified_method(constructor).unwrap().method, method);
    }
}
