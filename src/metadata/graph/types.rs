//! Resolved types.
//!
//! [`TypeDef`] is one closed family over every kind of type the metadata can name: type
//! definitions of this module, references into other modules, and the constructed shapes
//! described by signatures. The variant is chosen once, from the handle kind, when the type is
//! first resolved; the contents are filled in place afterwards so that a type can already be
//! referenced while it is still being built.
//!
//! References between types are weak ([`TypeDefRef`]); the owning
//! [`crate::metadata::graph::MetadataGraph`] keeps every type alive.

use std::{
    fmt,
    sync::{Arc, OnceLock, Weak},
};

use crate::{
    metadata::{
        flags::TypeAttributes,
        graph::members::{CustomAttributeDefRc, FieldDefRc, MethodDefRc},
        handle::Handle,
    },
    runtime::descriptor::TypeDescriptorRc,
};

/// Reference counted `TypeDef`
pub type TypeDefRc = Arc<TypeDef>;
/// A list of weak type references
pub type TypeDefRefList = boxcar::Vec<TypeDefRef>;

/// A weak reference to a [`TypeDef`], used for every edge between graph nodes
#[derive(Clone, Debug)]
pub struct TypeDefRef {
    weak_ref: Weak<TypeDef>,
}

impl TypeDefRef {
    /// Create a new `TypeDefRef` from a strong reference
    #[must_use]
    pub fn new(strong_ref: &TypeDefRc) -> Self {
        TypeDefRef {
            weak_ref: Arc::downgrade(strong_ref),
        }
    }

    /// Get a strong reference, `None` if the type has been dropped
    #[must_use]
    pub fn upgrade(&self) -> Option<TypeDefRc> {
        self.weak_ref.upgrade()
    }

    /// True if both refer to the same type
    #[must_use]
    pub fn is(&self, other: &TypeDefRc) -> bool {
        std::ptr::eq(self.weak_ref.as_ptr(), Arc::as_ptr(other))
    }

    /// Display name of the referenced type, `?` if it has been dropped
    #[must_use]
    pub fn full_name(&self) -> String {
        self.upgrade()
            .map_or_else(|| "?".to_string(), |type_def| type_def.full_name())
    }

    /// Hash of the referenced type, if alive and known
    #[must_use]
    pub fn hash(&self) -> Option<u32> {
        self.upgrade().and_then(|type_def| type_def.hash())
    }
}

/// A type defined in this module.
#[derive(Debug)]
pub struct ClassInfo {
    /// Dot-joined namespace; for nested types, the namespace of the outermost type
    pub namespace: String,
    /// Simple name
    pub name: String,
    /// Type flags
    pub flags: TypeAttributes,
    /// Explicit size, `0` if unset
    pub size: u32,
    /// Explicit packing, `0` if unset
    pub packing_size: u16,
    base: OnceLock<TypeDefRef>,
    enclosing: OnceLock<TypeDefRef>,
    /// Nested types
    pub nested_types: TypeDefRefList,
    /// Implemented interfaces
    pub interfaces: TypeDefRefList,
    /// Methods, in metadata order
    pub methods: boxcar::Vec<MethodDefRc>,
    /// Fields, in metadata order
    pub fields: boxcar::Vec<FieldDefRc>,
    /// Custom attributes
    pub custom_attributes: boxcar::Vec<CustomAttributeDefRc>,
}

impl ClassInfo {
    /// Create the record with empty member lists
    #[must_use]
    pub fn new(
        namespace: String,
        name: String,
        flags: TypeAttributes,
        size: u32,
        packing_size: u16,
    ) -> Self {
        ClassInfo {
            namespace,
            name,
            flags,
            size,
            packing_size,
            base: OnceLock::new(),
            enclosing: OnceLock::new(),
            nested_types: boxcar::Vec::new(),
            interfaces: boxcar::Vec::new(),
            methods: boxcar::Vec::new(),
            fields: boxcar::Vec::new(),
            custom_attributes: boxcar::Vec::new(),
        }
    }

    /// The base type, if any
    #[must_use]
    pub fn base(&self) -> Option<TypeDefRc> {
        self.base.get().and_then(TypeDefRef::upgrade)
    }

    /// Set the base type; returns false if already set
    pub fn set_base(&self, base: &TypeDefRc) -> bool {
        self.base.set(TypeDefRef::new(base)).is_ok()
    }

    /// The enclosing type of a nested type
    #[must_use]
    pub fn enclosing(&self) -> Option<TypeDefRc> {
        self.enclosing.get().and_then(TypeDefRef::upgrade)
    }

    /// Set the enclosing type; returns false if already set
    pub fn set_enclosing(&self, enclosing: &TypeDefRc) -> bool {
        self.enclosing.set(TypeDefRef::new(enclosing)).is_ok()
    }

    /// True for nested types
    #[must_use]
    pub fn is_nested(&self) -> bool {
        self.flags.is_nested()
    }

    /// Find a method by name
    #[must_use]
    pub fn method(&self, name: &str) -> Option<MethodDefRc> {
        self.methods
            .iter()
            .map(|(_, method)| method)
            .find(|method| method.name == name)
            .cloned()
    }

    /// Find a field by name
    #[must_use]
    pub fn field(&self, name: &str) -> Option<FieldDefRc> {
        self.fields
            .iter()
            .map(|(_, field)| field)
            .find(|field| field.name == name)
            .cloned()
    }
}

/// A type of another module.
#[derive(Debug)]
pub struct ReferenceInfo {
    /// Dot-joined namespace, empty for nested references
    pub namespace: String,
    /// Simple name
    pub name: String,
    enclosing: OnceLock<TypeDefRef>,
}

impl ReferenceInfo {
    /// Create the record
    #[must_use]
    pub fn new(namespace: String, name: String) -> Self {
        ReferenceInfo {
            namespace,
            name,
            enclosing: OnceLock::new(),
        }
    }

    /// The enclosing reference of a nested reference
    #[must_use]
    pub fn enclosing(&self) -> Option<TypeDefRc> {
        self.enclosing.get().and_then(TypeDefRef::upgrade)
    }

    /// Set the enclosing reference; returns false if already set
    pub fn set_enclosing(&self, enclosing: &TypeDefRc) -> bool {
        self.enclosing.set(TypeDefRef::new(enclosing)).is_ok()
    }
}

/// The variant of a [`TypeDef`], fixed by the kind of the originating handle.
#[derive(Debug)]
pub enum TypeDefKind {
    /// Class, value type or interface defined in this module
    Class(ClassInfo),
    /// Type defined in another module
    Reference(ReferenceInfo),
    /// `T[]`
    SzArray {
        /// Element type
        element: OnceLock<TypeDefRef>,
    },
    /// `T[,]` and higher ranks
    Array {
        /// Element type
        element: OnceLock<TypeDefRef>,
        /// Number of dimensions
        rank: u32,
        /// Declared sizes
        sizes: Vec<u32>,
        /// Declared lower bounds
        lower_bounds: Vec<i32>,
    },
    /// `ref T`
    ByRef {
        /// Referenced type
        target: OnceLock<TypeDefRef>,
    },
    /// `T*`
    Pointer {
        /// Pointed-to type
        target: OnceLock<TypeDefRef>,
    },
    /// `!N`
    TypeVariable {
        /// Parameter index
        number: u32,
    },
    /// `!!N`
    MethodVariable {
        /// Parameter index
        number: u32,
    },
    /// `G<A, B>`, shape only
    Instantiation {
        /// The generic type definition
        definition: OnceLock<TypeDefRef>,
        /// Type arguments in order, `None` where an argument did not resolve
        arguments: boxcar::Vec<Option<TypeDefRef>>,
    },
}

/// A resolved type.
pub struct TypeDef {
    /// The handle the type was first resolved from
    pub handle: Handle,
    /// The variant and its contents
    pub kind: TypeDefKind,
    hash: OnceLock<u32>,
    descriptor: OnceLock<TypeDescriptorRc>,
}

impl TypeDef {
    /// Create a type with unknown hash
    #[must_use]
    pub fn new(handle: Handle, kind: TypeDefKind) -> Self {
        TypeDef {
            handle,
            kind,
            hash: OnceLock::new(),
            descriptor: OnceLock::new(),
        }
    }

    /// The runtime name hash, `None` while a component type is unresolved
    #[must_use]
    pub fn hash(&self) -> Option<u32> {
        self.hash.get().copied()
    }

    /// Set the hash; returns false if already set
    pub fn set_hash(&self, hash: u32) -> bool {
        self.hash.set(hash).is_ok()
    }

    /// The class record, for types defined in this module
    #[must_use]
    pub fn class(&self) -> Option<&ClassInfo> {
        match &self.kind {
            TypeDefKind::Class(class) => Some(class),
            _ => None,
        }
    }

    /// True for generic parameter placeholders, which never have a runtime descriptor
    #[must_use]
    pub fn is_variable(&self) -> bool {
        matches!(
            self.kind,
            TypeDefKind::TypeVariable { .. } | TypeDefKind::MethodVariable { .. }
        )
    }

    /// The matched runtime descriptor
    #[must_use]
    pub fn descriptor(&self) -> Option<&TypeDescriptorRc> {
        self.descriptor.get()
    }

    /// Link this type with its runtime descriptor in both directions.
    ///
    /// Returns false, and links nothing, if either side is already bound.
    pub fn bind_descriptor(self: &Arc<Self>, descriptor: &TypeDescriptorRc) -> bool {
        if self.descriptor.get().is_some() || !descriptor.bind(self) {
            return false;
        }
        self.descriptor.set(descriptor.clone()).is_ok()
    }

    /// Simple name: the class or reference name, or the display form of a constructed type
    #[must_use]
    pub fn name(&self) -> String {
        match &self.kind {
            TypeDefKind::Class(class) => class.name.clone(),
            TypeDefKind::Reference(reference) => reference.name.clone(),
            _ => self.full_name(),
        }
    }

    /// Namespace-qualified name, with `+` between nested types
    #[must_use]
    pub fn full_name(&self) -> String {
        match &self.kind {
            TypeDefKind::Class(class) => match class.enclosing() {
                Some(enclosing) => format!("{}+{}", enclosing.full_name(), class.name),
                None => qualify(&class.namespace, &class.name),
            },
            TypeDefKind::Reference(reference) => match reference.enclosing() {
                Some(enclosing) => format!("{}+{}", enclosing.full_name(), reference.name),
                None => qualify(&reference.namespace, &reference.name),
            },
            TypeDefKind::SzArray { element } => format!("{}[]", component_name(element)),
            TypeDefKind::Array { element, rank, .. } => {
                let commas = ",".repeat(rank.saturating_sub(1) as usize);
                format!("{}[{commas}]", component_name(element))
            }
            TypeDefKind::ByRef { target } => format!("ref {}", component_name(target)),
            TypeDefKind::Pointer { target } => format!("{}*", component_name(target)),
            TypeDefKind::TypeVariable { number } => format!("!{number}"),
            TypeDefKind::MethodVariable { number } => format!("!!{number}"),
            TypeDefKind::Instantiation {
                definition,
                arguments,
            } => {
                let arguments = arguments
                    .iter()
                    .map(|(_, argument)| {
                        argument
                            .as_ref()
                            .map_or_else(|| "?".to_string(), TypeDefRef::full_name)
                    })
                    .collect::<Vec<_>>()
                    .join(",");
                format!("{}<{arguments}>", component_name(definition))
            }
        }
    }

    /// Methods of a class, empty for every other variant
    #[must_use]
    pub fn methods(&self) -> Vec<MethodDefRc> {
        self.class()
            .map(|class| class.methods.iter().map(|(_, method)| method.clone()).collect())
            .unwrap_or_default()
    }

    /// Fields of a class, empty for every other variant
    #[must_use]
    pub fn fields(&self) -> Vec<FieldDefRc> {
        self.class()
            .map(|class| class.fields.iter().map(|(_, field)| field.clone()).collect())
            .unwrap_or_default()
    }
}

fn qualify(namespace: &str, name: &str) -> String {
    if namespace.is_empty() {
        name.to_string()
    } else {
        format!("{namespace}.{name}")
    }
}

fn component_name(component: &OnceLock<TypeDefRef>) -> String {
    component
        .get()
        .map_or_else(|| "?".to_string(), TypeDefRef::full_name)
}

impl fmt::Debug for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDef")
            .field("handle", &self.handle)
            .field("name", &self.full_name())
            .field("hash", &self.hash())
            .field("descriptor", &self.descriptor().map(|descriptor| descriptor.address))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_name())
    }
}
