//! Runtime structures recovered from the image.
//!
//! - [`rehydrate`] expands the dehydrated data section into the initial heap
//! - [`descriptor`] reads type descriptors out of that heap
//! - [`scanner`] locates descriptors and string objects by byte pattern

pub mod descriptor;
pub mod rehydrate;
pub mod scanner;

pub use descriptor::{TypeDescriptor, TypeDescriptorRc};
pub use scanner::StructuralScanner;
