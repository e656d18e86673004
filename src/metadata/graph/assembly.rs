//! Resolved assemblies.

use std::{fmt, sync::Arc};

use crate::metadata::{
    flags::AssemblyFlags,
    graph::{
        members::{CustomAttributeDefRc, MethodDefRc},
        types::TypeDefRc,
    },
    handle::Handle,
};

/// Reference counted `AssemblyDef`
pub type AssemblyDefRc = Arc<AssemblyDef>;

/// Four-part assembly version
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major
    pub major: u16,
    /// Minor
    pub minor: u16,
    /// Build
    pub build: u16,
    /// Revision
    pub revision: u16,
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}

/// An assembly and its single module.
#[derive(Debug)]
pub struct AssemblyDef {
    /// The `ScopeDefinition` handle
    pub handle: Handle,
    /// Assembly name
    pub name: String,
    /// Assembly flags
    pub flags: AssemblyFlags,
    /// Hash algorithm identifier
    pub hash_algorithm: u32,
    /// Version
    pub version: AssemblyVersion,
    /// Public key or token, may be empty
    pub public_key: Vec<u8>,
    /// Culture, empty for neutral
    pub culture: String,
    /// Module name
    pub module_name: String,
    /// Module version id
    pub mvid: uguid::Guid,
    /// Top-level types of every namespace, in namespace order
    pub types: Vec<TypeDefRc>,
    /// Managed entry point
    pub entry_point: Option<MethodDefRc>,
    /// The `<Module>` type
    pub global_module_type: Option<TypeDefRc>,
    /// Assembly level custom attributes
    pub custom_attributes: Vec<CustomAttributeDefRc>,
    /// Module level custom attributes
    pub module_custom_attributes: Vec<CustomAttributeDefRc>,
}

impl AssemblyDef {
    /// `Name, Version=..., Culture=...`
    #[must_use]
    pub fn display_name(&self) -> String {
        let culture = if self.culture.is_empty() {
            "neutral"
        } else {
            &self.culture
        };
        format!("{}, Version={}, Culture={culture}", self.name, self.version)
    }

    /// Find a top-level type by namespace-qualified name
    #[must_use]
    pub fn find_type(&self, full_name: &str) -> Option<TypeDefRc> {
        self.types
            .iter()
            .find(|type_def| type_def.full_name() == full_name)
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_name() {
        let assembly = AssemblyDef {
            handle: Handle::NULL,
            name: "App".to_string(),
            flags: AssemblyFlags::empty(),
            hash_algorithm: 0,
            version: AssemblyVersion {
                major: 1,
                minor: 2,
                build: 3,
                revision: 4,
            },
            public_key: Vec::new(),
            culture: String::new(),
            module_name: "App.dll".to_string(),
            mvid: uguid::Guid::ZERO,
            types: Vec::new(),
            entry_point: None,
            global_module_type: None,
            custom_attributes: Vec::new(),
            module_custom_attributes: Vec::new(),
        };

        assert_eq!(assembly.display_name(), "App, Version=1.2.3.4, Culture=neutral");
        assert!(assembly.find_type("App.Program").is_none());
    }
}
