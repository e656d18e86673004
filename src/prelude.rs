//! # aotscope Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the aotscope library. Import this module to get quick access to the essential
//! types for NativeAOT image analysis.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all aotscope operations
pub use crate::Error;

/// The result type used throughout aotscope
pub use crate::Result;

/// Tuning knobs of the analysis pipeline
pub use crate::AnalysisOptions;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Main entry point for NativeAOT image analysis
pub use crate::AotObject;

/// PE container and low-level parsing
pub use crate::{PeFile, Parser};

// ================================================================================================
// Image Access
// ================================================================================================

/// Container abstraction and flat images
pub use crate::image::{FlatImage, ImageSource, PointerWidth};

/// Address routing between heap and image
pub use crate::image::address::{AddressSpace, Heap};

/// Runtime header and section directory
pub use crate::image::header::{RuntimeHeader, SectionDirectory, SectionInfo, SectionType};

// ================================================================================================
// Runtime Structures
// ================================================================================================

/// Type descriptors and pattern scanning
pub use crate::runtime::{
    descriptor::{ElementType, RelatedType, TypeDescriptorKind},
    StructuralScanner, TypeDescriptor, TypeDescriptorRc,
};

// ================================================================================================
// Metadata
// ================================================================================================

/// Handles and the reader interface
pub use crate::metadata::{
    handle::{Handle, HandleType},
    reader::MetadataReader,
};

/// Resolved metadata graph
pub use crate::metadata::graph::{
    AssemblyDef, AssemblyDefRc, FieldDef, FieldDefRc, MetadataGraph, MethodDef, MethodDefRc,
    TypeDef, TypeDefKind, TypeDefRc,
};

/// Name hashing
pub use crate::metadata::hash::{name_hash, NameHashBuilder};

// ================================================================================================
// Analysis Results
// ================================================================================================

/// Type matching and invoke map results
pub use crate::analysis::{InvokeTableFlags, ResolvedInvoke, TypeTable};
