//! Shared fixtures for unit tests: synthetic images, heaps and metadata.

mod image;
mod metadata;

pub use image::*;
pub use metadata::*;
