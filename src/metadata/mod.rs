//! Embedded metadata: handles, records, name hashing and the resolved graph.
//!
//! A NativeAOT image carries a packed metadata blob describing the assemblies it was compiled
//! from. The blob is consumed through the handle-based [`reader::MetadataReader`] trait and
//! resolved into a [`graph::MetadataGraph`] of shared, cross-referenced definitions. Every
//! resolved type carries the runtime name hash computed by [`hash`], which is the key used to
//! find its runtime type descriptor in the rehydrated heap.
//!
//! # Key Components
//!
//! - [`handle`] - Record keys: kind in the high byte, offset below
//! - [`reader`] - The reader trait and its plain record types
//! - [`memory`] - In-memory reader and builder for synthetic metadata
//! - [`hash`] - Bit-exact runtime name hashing
//! - [`graph`] - Memoized, cycle-safe graph construction
//!
//! # Examples
//!
//! ```rust
//! use aotscope::metadata::{
//!     flags::TypeAttributes, graph::MetadataGraph, memory::MetadataBuilder,
//! };
//!
//! let mut builder = MetadataBuilder::new();
//! let scope = builder.scope("App");
//! let root = builder.root_namespace(scope).unwrap();
//! builder.type_definition(root, "Program", TypeAttributes::PUBLIC);
//!
//! let graph = MetadataGraph::build(&builder.build())?;
//! println!("Types: {}", graph.type_definitions().len());
//! # Ok::<(), aotscope::Error>(())
//! ```

/// Attribute flag sets of metadata records
pub mod flags;
/// Resolved assemblies, types and members
pub mod graph;
/// Metadata handles
pub mod handle;
/// Runtime compatible name hashing
pub mod hash;
/// In-memory metadata reader and builder
pub mod memory;
/// The handle-based metadata reader interface
pub mod reader;
