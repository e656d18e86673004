//! The resolved metadata graph.
//!
//! [`MetadataGraph::build`] walks every scope of a [`MetadataReader`] and resolves assemblies,
//! their namespace-scoped types, and the methods, fields, parameters and custom attributes of
//! those types into shared objects. Resolution is lazy and handle indexed: each record kind has
//! its own cache, and a record is inserted into its cache before anything it refers to is
//! resolved. A type whose field has the type itself, or two mutually referring types, therefore
//! resolve to the same objects and construction terminates.
//!
//! # Identity
//!
//! Every handle maps to exactly one object for the lifetime of the graph. A
//! `TypeSpecification` handle maps to the object of its signature, so both handles return the
//! same [`TypeDef`].
//!
//! # Thread Safety
//!
//! The caches are concurrent maps and finished graphs can be shared freely. Resolution itself
//! is meant to run on one thread: the insert-before-recurse protocol gives no exclusivity to two
//! threads resolving the same handle for the first time.
//!
//! # Examples
//!
//! ```rust
//! use aotscope::metadata::{
//!     flags::{MethodAttributes, TypeAttributes},
//!     graph::MetadataGraph,
//!     memory::MetadataBuilder,
//! };
//!
//! let mut builder = MetadataBuilder::new();
//! let scope = builder.scope("App");
//! let root = builder.root_namespace(scope).unwrap();
//! let ns = builder.namespace(root, "MyNs");
//! let widget = builder.type_definition(ns, "Widget", TypeAttributes::PUBLIC);
//! builder.method(widget, "Run", MethodAttributes::PUBLIC, widget, &[]);
//! let metadata = builder.build();
//!
//! let graph = MetadataGraph::build(&metadata)?;
//! let types = graph.type_definitions();
//! assert_eq!(types.len(), 1);
//! assert_eq!(types[0].full_name(), "MyNs.Widget");
//! assert_eq!(types[0].hash(), Some(0x4463_A2FB));
//! # Ok::<(), aotscope::Error>(())
//! ```

mod assembly;
mod members;
mod types;

pub use assembly::{AssemblyDef, AssemblyDefRc, AssemblyVersion};
pub use members::{
    CustomAttributeDef, CustomAttributeDefRc, FieldDef, FieldDefRc, MethodDef, MethodDefRc,
    MethodDefRef, ParamDef, ParamDefRc,
};
pub use types::{
    ClassInfo, ReferenceInfo, TypeDef, TypeDefKind, TypeDefRc, TypeDefRef, TypeDefRefList,
};

use std::sync::{Arc, OnceLock};

use crossbeam_skiplist::SkipMap;

use crate::{
    metadata::{
        handle::{Handle, HandleType},
        hash::{
            by_ref_type_hash, generic_instance_hash, md_array_type_hash,
            names::{namespace_path, namespace_reference_path, type_definition_hash, type_reference_hash},
            pointer_type_hash, signature_variable_hash, sz_array_type_hash,
        },
        reader::MetadataReader,
    },
    Result,
};

/// Namespace trees deeper than this are treated as malformed
const MAX_NAMESPACE_DEPTH: usize = 128;

/// Assemblies, types and members resolved from one metadata blob.
#[derive(Debug, Default)]
pub struct MetadataGraph {
    assemblies: Vec<AssemblyDefRc>,
    type_definitions: SkipMap<Handle, TypeDefRc>,
    type_references: SkipMap<Handle, TypeDefRc>,
    type_signatures: SkipMap<Handle, TypeDefRc>,
    methods: SkipMap<Handle, MethodDefRc>,
    fields: SkipMap<Handle, FieldDefRc>,
    parameters: SkipMap<Handle, ParamDefRc>,
    custom_attributes: SkipMap<Handle, CustomAttributeDefRc>,
}

impl MetadataGraph {
    /// Resolve every scope of `reader`.
    ///
    /// # Errors
    /// Returns the first reader error; a graph is never returned half built.
    pub fn build<R: MetadataReader + ?Sized>(reader: &R) -> Result<Self> {
        let mut graph = MetadataGraph::default();

        let assemblies = reader
            .scope_definitions()
            .into_iter()
            .map(|scope| graph.resolve_assembly(reader, scope))
            .collect::<Result<Vec<_>>>()?;
        graph.assemblies = assemblies;

        log::info!(
            "Metadata graph: {} assemblies, {} types, {} methods, {} fields",
            graph.assemblies.len(),
            graph.type_definitions.len(),
            graph.methods.len(),
            graph.fields.len()
        );
        Ok(graph)
    }

    /// All resolved assemblies
    #[must_use]
    pub fn assemblies(&self) -> &[AssemblyDefRc] {
        &self.assemblies
    }

    /// Types defined in the metadata (`TypeDefinition` handles), in handle order
    #[must_use]
    pub fn type_definitions(&self) -> Vec<TypeDefRc> {
        self.type_definitions
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// Every distinct type object: definitions, references and constructed types
    #[must_use]
    pub fn types(&self) -> Vec<TypeDefRc> {
        let signatures = self
            .type_signatures
            .iter()
            .filter(|entry| !entry.key().is(HandleType::TypeSpecification))
            .map(|entry| entry.value().clone());

        self.type_definitions
            .iter()
            .chain(self.type_references.iter())
            .map(|entry| entry.value().clone())
            .chain(signatures)
            .collect()
    }

    /// All resolved methods, in handle order
    #[must_use]
    pub fn methods(&self) -> Vec<MethodDefRc> {
        self.methods
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// All resolved fields, in handle order
    #[must_use]
    pub fn fields(&self) -> Vec<FieldDefRc> {
        self.fields
            .iter()
            .map(|entry| entry.value().clone())
            .collect()
    }

    /// An already resolved type of any kind
    #[must_use]
    pub fn get_type(&self, handle: Handle) -> Option<TypeDefRc> {
        self.type_definitions
            .get(&handle)
            .or_else(|| self.type_references.get(&handle))
            .or_else(|| self.type_signatures.get(&handle))
            .map(|entry| entry.value().clone())
    }

    /// An already resolved method
    #[must_use]
    pub fn get_method(&self, handle: Handle) -> Option<MethodDefRc> {
        self.methods.get(&handle).map(|entry| entry.value().clone())
    }

    /// An already resolved field
    #[must_use]
    pub fn get_field(&self, handle: Handle) -> Option<FieldDefRc> {
        self.fields.get(&handle).map(|entry| entry.value().clone())
    }

    /// Find a type definition by its full name
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<TypeDefRc> {
        self.type_definitions
            .iter()
            .map(|entry| entry.value().clone())
            .find(|type_def| type_def.full_name() == full_name)
    }

    fn resolve_assembly<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<AssemblyDefRc> {
        let scope = reader.scope_definition(handle)?;

        let mut types = Vec::new();
        let mut pending = vec![(scope.root_namespace_definition, 0usize)];
        while let Some((namespace, depth)) = pending.pop() {
            if depth > MAX_NAMESPACE_DEPTH {
                return Err(malformed_error!(
                    "Namespace tree of {:?} exceeds {} levels",
                    handle,
                    MAX_NAMESPACE_DEPTH
                ));
            }

            let record = reader.namespace_definition(namespace)?;
            for type_definition in record.type_definitions {
                types.push(self.resolve_type_definition(reader, type_definition)?);
            }
            for child in record.namespace_definitions.into_iter().rev() {
                pending.push((child, depth + 1));
            }
        }

        let entry_point = if scope.entry_point.is_nil() {
            None
        } else {
            Some(self.resolve_qualified_method(reader, scope.entry_point)?)
        };
        let global_module_type = if scope.global_module_type.is_nil() {
            None
        } else {
            Some(self.resolve_type_definition(reader, scope.global_module_type)?)
        };

        let assembly = AssemblyDef {
            handle,
            name: reader.string(scope.name)?,
            flags: scope.flags,
            hash_algorithm: scope.hash_algorithm,
            version: AssemblyVersion {
                major: scope.major_version,
                minor: scope.minor_version,
                build: scope.build_number,
                revision: scope.revision_number,
            },
            public_key: scope.public_key,
            culture: reader.string(scope.culture)?,
            module_name: reader.string(scope.module_name)?,
            mvid: uguid::Guid::from_bytes(scope.mvid),
            types,
            entry_point,
            global_module_type,
            custom_attributes: self.resolve_custom_attributes(reader, &scope.custom_attributes)?,
            module_custom_attributes: self
                .resolve_custom_attributes(reader, &scope.module_custom_attributes)?,
        };

        log::debug!(
            "Assembly {} with {} top-level types",
            assembly.display_name(),
            assembly.types.len()
        );
        Ok(Arc::new(assembly))
    }

    /// Resolve any handle that can stand for a type.
    ///
    /// The nil handle and unsupported kinds (function pointers, modified types, ...) resolve to
    /// `None`; the latter are logged.
    ///
    /// # Errors
    /// Returns reader errors for the handle or anything it refers to.
    pub fn resolve_type<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<Option<TypeDefRc>> {
        if handle.is_nil() {
            return Ok(None);
        }

        match handle.handle_type() {
            Some(HandleType::TypeDefinition) => {
                self.resolve_type_definition(reader, handle).map(Some)
            }
            Some(HandleType::TypeReference) => self.resolve_type_reference(reader, handle).map(Some),
            Some(HandleType::TypeSpecification) => self.resolve_type_specification(reader, handle),
            Some(
                HandleType::SzArraySignature
                | HandleType::ArraySignature
                | HandleType::ByReferenceSignature
                | HandleType::PointerSignature
                | HandleType::TypeVariableSignature
                | HandleType::MethodTypeVariableSignature
                | HandleType::TypeInstantiationSignature,
            ) => self.resolve_signature(reader, handle).map(Some),
            _ => {
                log::warn!("Unsupported type handle {:?}", handle);
                Ok(None)
            }
        }
    }

    fn resolve_type_definition<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<TypeDefRc> {
        if let Some(entry) = self.type_definitions.get(&handle) {
            return Ok(entry.value().clone());
        }

        let record = reader.type_definition(handle)?;
        let class = ClassInfo::new(
            namespace_path(reader, record.namespace_definition)?,
            reader.string(record.name)?,
            record.flags,
            record.size,
            record.packing_size,
        );
        let type_def = Arc::new(TypeDef::new(handle, TypeDefKind::Class(class)));
        match type_definition_hash(reader, handle) {
            Ok(hash) => {
                type_def.set_hash(hash);
            }
            Err(error) => log::warn!("No name hash for type {handle:?}: {error}"),
        }
        self.type_definitions.insert(handle, type_def.clone());

        let TypeDefKind::Class(class) = &type_def.kind else {
            return Ok(type_def);
        };

        if record.flags.is_nested() && !record.enclosing_type.is_nil() {
            let enclosing = self.resolve_type_definition(reader, record.enclosing_type)?;
            class.set_enclosing(&enclosing);
        }
        if let Some(base) = self.resolve_type(reader, record.base_type)? {
            class.set_base(&base);
        }
        for interface in record.interfaces {
            if let Some(interface) = self.resolve_type(reader, interface)? {
                class.interfaces.push(TypeDefRef::new(&interface));
            }
        }
        for nested in record.nested_types {
            let nested = self.resolve_type_definition(reader, nested)?;
            class.nested_types.push(TypeDefRef::new(&nested));
        }
        for method in record.methods {
            let method = self.resolve_method(reader, method)?;
            method.set_declaring_type(&type_def);
            class.methods.push(method);
        }
        for field in record.fields {
            let field = self.resolve_field(reader, field)?;
            field.set_declaring_type(&type_def);
            class.fields.push(field);
        }
        for attribute in self.resolve_custom_attributes(reader, &record.custom_attributes)? {
            class.custom_attributes.push(attribute);
        }

        Ok(type_def)
    }

    fn resolve_type_reference<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<TypeDefRc> {
        if let Some(entry) = self.type_references.get(&handle) {
            return Ok(entry.value().clone());
        }

        let record = reader.type_reference(handle)?;
        let parent = record.parent_namespace_or_type;
        let namespace = if parent.is(HandleType::NamespaceReference) {
            namespace_reference_path(reader, parent)?
        } else {
            String::new()
        };

        let reference = ReferenceInfo::new(namespace, reader.string(record.type_name)?);
        let type_def = Arc::new(TypeDef::new(handle, TypeDefKind::Reference(reference)));
        match type_reference_hash(reader, handle) {
            Ok(hash) => {
                type_def.set_hash(hash);
            }
            Err(error) => log::warn!("No name hash for type reference {handle:?}: {error}"),
        }
        self.type_references.insert(handle, type_def.clone());

        if parent.is(HandleType::TypeReference) {
            let enclosing = self.resolve_type_reference(reader, parent)?;
            if let TypeDefKind::Reference(reference) = &type_def.kind {
                reference.set_enclosing(&enclosing);
            }
        }

        Ok(type_def)
    }

    fn resolve_type_specification<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<Option<TypeDefRc>> {
        if let Some(entry) = self.type_signatures.get(&handle) {
            return Ok(Some(entry.value().clone()));
        }

        let record = reader.type_specification(handle)?;
        let resolved = self.resolve_type(reader, record.signature)?;
        if let Some(type_def) = &resolved {
            self.type_signatures.insert(handle, type_def.clone());
        }
        Ok(resolved)
    }

    fn resolve_signature<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<TypeDefRc> {
        if let Some(entry) = self.type_signatures.get(&handle) {
            return Ok(entry.value().clone());
        }

        let mut array_element = Handle::NULL;
        let kind = match handle.handle_type() {
            Some(HandleType::SzArraySignature) => TypeDefKind::SzArray {
                element: OnceLock::new(),
            },
            Some(HandleType::ArraySignature) => {
                let record = reader.array_signature(handle)?;
                array_element = record.element_type;
                TypeDefKind::Array {
                    element: OnceLock::new(),
                    rank: record.rank,
                    sizes: record.sizes,
                    lower_bounds: record.lower_bounds,
                }
            }
            Some(HandleType::ByReferenceSignature) => TypeDefKind::ByRef {
                target: OnceLock::new(),
            },
            Some(HandleType::PointerSignature) => TypeDefKind::Pointer {
                target: OnceLock::new(),
            },
            Some(HandleType::TypeVariableSignature) => TypeDefKind::TypeVariable {
                number: reader.type_variable_signature(handle)?.number,
            },
            Some(HandleType::MethodTypeVariableSignature) => TypeDefKind::MethodVariable {
                number: reader.method_type_variable_signature(handle)?.number,
            },
            Some(HandleType::TypeInstantiationSignature) => TypeDefKind::Instantiation {
                definition: OnceLock::new(),
                arguments: boxcar::Vec::new(),
            },
            _ => {
                return Err(malformed_error!(
                    "Handle {:?} is not a type signature",
                    handle
                ))
            }
        };

        let type_def = Arc::new(TypeDef::new(handle, kind));
        self.type_signatures.insert(handle, type_def.clone());

        let hash = match &type_def.kind {
            TypeDefKind::SzArray { element } => {
                let record = reader.sz_array_signature(handle)?;
                self.resolve_component(reader, record.element_type, element)?
                    .map(sz_array_type_hash)
            }
            TypeDefKind::Array { element, rank, .. } => self
                .resolve_component(reader, array_element, element)?
                .map(|hash| md_array_type_hash(hash, *rank)),
            TypeDefKind::ByRef { target } => {
                let record = reader.by_reference_signature(handle)?;
                self.resolve_component(reader, record.target_type, target)?
                    .map(by_ref_type_hash)
            }
            TypeDefKind::Pointer { target } => {
                let record = reader.pointer_signature(handle)?;
                self.resolve_component(reader, record.target_type, target)?
                    .map(pointer_type_hash)
            }
            TypeDefKind::TypeVariable { number } => Some(signature_variable_hash(*number, false)),
            TypeDefKind::MethodVariable { number } => Some(signature_variable_hash(*number, true)),
            TypeDefKind::Instantiation {
                definition,
                arguments,
            } => {
                let record = reader.type_instantiation_signature(handle)?;
                let definition_hash =
                    self.resolve_component(reader, record.generic_type, definition)?;

                let mut argument_hashes = Vec::new();
                let mut complete = true;
                for argument in record.generic_type_arguments {
                    let resolved = self.resolve_type(reader, argument)?;
                    match resolved.as_ref().and_then(|argument| argument.hash()) {
                        Some(hash) => argument_hashes.push(hash),
                        None => complete = false,
                    }
                    arguments.push(resolved.as_ref().map(TypeDefRef::new));
                }

                definition_hash
                    .filter(|_| complete)
                    .map(|definition| generic_instance_hash(definition, &argument_hashes))
            }
            TypeDefKind::Class(_) | TypeDefKind::Reference(_) => None,
        };

        if let Some(hash) = hash {
            type_def.set_hash(hash);
        }
        Ok(type_def)
    }

    /// Resolve a component type into `slot`, returning its hash if known
    fn resolve_component<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
        slot: &OnceLock<TypeDefRef>,
    ) -> Result<Option<u32>> {
        let Some(component) = self.resolve_type(reader, handle)? else {
            return Ok(None);
        };

        let _ = slot.set(TypeDefRef::new(&component));
        Ok(component.hash())
    }

    /// Resolve a method through the memoized cache.
    ///
    /// A method reached only through this call has no declaring type until the type that
    /// lists it is resolved.
    ///
    /// # Errors
    /// Returns reader errors for the method or anything it refers to.
    pub fn resolve_method<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<MethodDefRc> {
        if let Some(entry) = self.methods.get(&handle) {
            return Ok(entry.value().clone());
        }

        let record = reader.method(handle)?;
        let signature = reader.method_signature(record.signature)?;
        let method = Arc::new(MethodDef::new(
            handle,
            reader.string(record.name)?,
            record.flags,
            record.impl_flags,
            signature.calling_convention,
            signature.generic_parameter_count,
        ));
        self.methods.insert(handle, method.clone());

        if let Some(return_type) = self.resolve_type(reader, signature.return_type)? {
            method.set_return_type(&return_type);
        }
        for parameter_type in signature.parameters {
            let parameter_type = self.resolve_type(reader, parameter_type)?;
            method
                .parameter_types
                .push(parameter_type.as_ref().map(TypeDefRef::new));
        }
        for parameter in record.parameters {
            method.params.push(self.resolve_parameter(reader, parameter)?);
        }
        for attribute in self.resolve_custom_attributes(reader, &record.custom_attributes)? {
            method.custom_attributes.push(attribute);
        }

        Ok(method)
    }

    /// Resolve a `QualifiedMethod`: the declaring type first, then the method itself
    fn resolve_qualified_method<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<MethodDefRc> {
        let record = reader.qualified_method(handle)?;
        let owner = self.resolve_type_definition(reader, record.enclosing_type)?;
        let method = self.resolve_method(reader, record.method)?;
        method.set_declaring_type(&owner);
        Ok(method)
    }

    fn resolve_field<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<FieldDefRc> {
        if let Some(entry) = self.fields.get(&handle) {
            return Ok(entry.value().clone());
        }

        let record = reader.field(handle)?;
        let field = Arc::new(FieldDef::new(
            handle,
            reader.string(record.name)?,
            record.flags,
            record.offset,
        ));
        self.fields.insert(handle, field.clone());

        let signature = reader.field_signature(record.signature)?;
        if let Some(field_type) = self.resolve_type(reader, signature.field_type)? {
            field.set_field_type(&field_type);
        }
        for attribute in self.resolve_custom_attributes(reader, &record.custom_attributes)? {
            field.custom_attributes.push(attribute);
        }

        Ok(field)
    }

    fn resolve_parameter<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<ParamDefRc> {
        if let Some(entry) = self.parameters.get(&handle) {
            return Ok(entry.value().clone());
        }

        let record = reader.parameter(handle)?;
        let parameter = Arc::new(ParamDef {
            handle,
            name: reader.string(record.name)?,
            flags: record.flags,
            sequence: record.sequence,
            custom_attributes: boxcar::Vec::new(),
        });
        self.parameters.insert(handle, parameter.clone());

        for attribute in self.resolve_custom_attributes(reader, &record.custom_attributes)? {
            parameter.custom_attributes.push(attribute);
        }
        Ok(parameter)
    }

    fn resolve_custom_attributes<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handles: &[Handle],
    ) -> Result<Vec<CustomAttributeDefRc>> {
        handles
            .iter()
            .map(|&handle| self.resolve_custom_attribute(reader, handle))
            .collect()
    }

    fn resolve_custom_attribute<R: MetadataReader + ?Sized>(
        &self,
        reader: &R,
        handle: Handle,
    ) -> Result<CustomAttributeDefRc> {
        if let Some(entry) = self.custom_attributes.get(&handle) {
            return Ok(entry.value().clone());
        }

        let record = reader.custom_attribute(handle)?;
        let attribute = Arc::new(CustomAttributeDef::new(handle));
        self.custom_attributes.insert(handle, attribute.clone());

        if record.constructor.is(HandleType::QualifiedMethod) {
            let constructor = self.resolve_qualified_method(reader, record.constructor)?;
            attribute.set_constructor(&constructor);
        } else {
            log::debug!(
                "Custom attribute {:?} has external constructor {:?}",
                handle,
                record.constructor
            );
        }
        Ok(attribute)
    }
}
