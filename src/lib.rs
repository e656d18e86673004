// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
//#![deny(unsafe_code)]
// - 'file/physical.rs' uses mmap to map a file into memory

//! # aotscope
//!
//! Recovers types, methods, native entry points and runtime object layouts from executables
//! compiled ahead of time by the .NET NativeAOT toolchain.
//!
//! A NativeAOT executable carries no IL and no ECMA-335 tables. What survives is a runtime
//! header with a directory of data sections, a compressed snapshot of the initial heap, and a
//! packed metadata blob. `aotscope` reconstructs the heap, finds type descriptors and strings
//! in it by pattern, resolves the metadata into a cross-referenced graph, and joins the two
//! through the runtime's own name hashing.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use aotscope::prelude::*;
//! use std::path::Path;
//!
//! // The header address comes from an external, architecture specific locator
//! let object = AotObject::from_file(Path::new("app.exe"), 0x2_1F40, AnalysisOptions::default())?;
//!
//! if let Some(compiler) = object.compiler_identifier() {
//!     println!("Compiled by {compiler}");
//! }
//! for (address, text) in object.strings() {
//!     println!("{address:#x}: {text}");
//! }
//! # Ok::<(), aotscope::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`file`] - PE container access over memory-mapped or owned bytes
//! - [`image`] - Address-indexed image access, the runtime header and its sections
//! - [`runtime`] - Heap reconstruction, type descriptors and pattern scanning
//! - [`metadata`] - Metadata handles, name hashing and the resolved graph
//! - [`nativeformat`] - Decoding of the runtime's compact integer and hashtable encodings
//! - [`analysis`] - The [`AotObject`] session that runs the pipeline
//! - [`prelude`] - Convenient re-exports
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result). Structural damage such as a wrong
//! header signature or a corrupt rehydration stream aborts the analysis. Heuristic misses are
//! never errors:
//!
//! ```rust,no_run
//! use aotscope::{AnalysisOptions, AotObject, Error};
//! use std::path::Path;
//!
//! match AotObject::from_file(Path::new("app.exe"), 0x2_1F40, AnalysisOptions::default()) {
//!     Ok(object) => println!("{} strings", object.strings().len()),
//!     Err(Error::InvalidSignature(found)) => println!("No runtime header: {found:#x}"),
//!     Err(Error::InvalidCommand { offset, opcode }) => {
//!         println!("Corrupt heap stream at {offset:#x}: opcode {opcode}")
//!     }
//!     Err(e) => println!("Error: {e}"),
//! }
//! ```
//!
//! ## Logging
//!
//! Progress is reported through the [`log`](https://docs.rs/log) facade. The library never
//! installs a logger; binaries choose one.

#[macro_use]
pub(crate) mod error;

/// Shared functionality which is used in unit tests
#[cfg(test)]
pub(crate) mod test;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust,no_run
/// use aotscope::prelude::*;
///
/// let object = AotObject::from_file("app.exe".as_ref(), 0x2_1F40, AnalysisOptions::minimal())?;
/// println!("{} sections", object.sections().len());
/// # Ok::<(), aotscope::Error>(())
/// ```
pub mod prelude;

/// PE container access
pub mod file;

/// Address-indexed access to the loaded image, the runtime header and its section directory
pub mod image;

/// Structures of the NativeAOT runtime found in the image
///
/// - [`runtime::rehydrate`] - Reconstruction of the dehydrated heap
/// - [`runtime::descriptor`] - Type descriptors
/// - [`runtime::scanner`] - Pattern based discovery of descriptors and strings
pub mod runtime;

pub mod metadata;

pub mod nativeformat;

/// The analysis session and its stages
pub mod analysis;

/// `aotscope` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `aotscope` Error type
pub use error::Error;

/// Main entry point for analysing a NativeAOT image.
///
/// See [`analysis::AotObject`].
pub use analysis::{AnalysisOptions, AotObject};

/// Low-level parsing utilities.
pub use file::{parser::Parser, PeFile};
