//! Joining runtime type descriptors with resolved metadata types.
//!
//! Descriptors only carry the name hash of their type, so the join goes through the hash: for
//! every resolved type that has one, the scanner looks for a descriptor embedding the same
//! value. Matches are recorded in two indices over the same descriptor objects, one keyed by
//! address and one keyed by hash.
//!
//! A type without a descriptor is normal. Open generic definitions, interfaces that are never
//! instantiated and references to types of other modules have none.
//!
//! # Thread Safety
//!
//! Matching one type is independent of every other type. Both indices are filled with
//! insert-if-absent operations, so matching can run on the rayon pool. The first descriptor
//! recorded for a hash is the one every later type with that hash observes.

use std::sync::Arc;

use crossbeam_skiplist::SkipMap;
use dashmap::DashMap;
use rayon::prelude::*;

use crate::{
    metadata::graph::TypeDefRc,
    runtime::{
        descriptor::{TypeDescriptor, TypeDescriptorRc},
        scanner::StructuralScanner,
    },
};

/// Descriptors found in the heap, indexed by address and by hash.
///
/// Both indices hold the same [`TypeDescriptorRc`] objects. The address index is ordered, so
/// iteration follows heap layout. A hash is recorded once; a second descriptor carrying an
/// already known hash is dropped in favour of the first.
///
/// # Examples
///
/// ```rust,no_run
/// use aotscope::prelude::*;
/// use std::path::Path;
///
/// let object = AotObject::from_file(Path::new("app.exe"), 0x2_1F40, AnalysisOptions::default())?;
/// let table = object.descriptors();
///
/// if let Some(descriptor) = table.get_by_hash(0x4463_A2FB) {
///     assert!(table.get_by_address(descriptor.address).is_some());
/// }
/// # Ok::<(), aotscope::Error>(())
/// ```
#[derive(Debug, Default)]
pub struct TypeTable {
    by_address: SkipMap<u64, TypeDescriptorRc>,
    by_hash: DashMap<u32, TypeDescriptorRc>,
}

impl TypeTable {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a descriptor for every type in `types` and bind the matches.
    ///
    /// Types that are generic variables, that are already bound, or that have no hash are
    /// skipped. Returns the number of types bound by this call.
    pub fn match_types(
        &self,
        scanner: &StructuralScanner<'_>,
        types: &[TypeDefRc],
        parallel: bool,
    ) -> usize {
        let matched = if parallel {
            types
                .par_iter()
                .filter(|type_def| self.match_type(scanner, type_def))
                .count()
        } else {
            types
                .iter()
                .filter(|type_def| self.match_type(scanner, type_def))
                .count()
        };

        log::info!(
            "Matched {matched} of {} types against {} descriptors",
            types.len(),
            self.len()
        );
        matched
    }

    fn match_type(&self, scanner: &StructuralScanner<'_>, type_def: &TypeDefRc) -> bool {
        if type_def.is_variable() || type_def.descriptor().is_some() {
            return false;
        }
        let Some(hash) = type_def.hash() else {
            return false;
        };

        let known = self.get_by_hash(hash);
        let descriptor = match known {
            Some(existing) => existing,
            None => {
                let Some(found) = scanner.find_type_descriptor(hash) else {
                    log::debug!("No descriptor for {type_def} ({hash:#010x})");
                    return false;
                };
                self.insert(found)
            }
        };

        type_def.bind_descriptor(&descriptor)
    }

    /// Record `descriptor` unless its hash is already known, and return the recorded one
    pub fn insert(&self, descriptor: TypeDescriptor) -> TypeDescriptorRc {
        let hash = descriptor.hash_code;
        let recorded = self
            .by_hash
            .entry(hash)
            .or_insert_with(|| Arc::new(descriptor))
            .clone();

        self.by_address
            .get_or_insert(recorded.address, recorded.clone());
        recorded
    }

    /// The descriptor at `address`
    #[must_use]
    pub fn get_by_address(&self, address: u64) -> Option<TypeDescriptorRc> {
        self.by_address
            .get(&address)
            .map(|entry| entry.value().clone())
    }

    /// The descriptor embedding `hash`
    #[must_use]
    pub fn get_by_hash(&self, hash: u32) -> Option<TypeDescriptorRc> {
        self.by_hash.get(&hash).map(|entry| entry.value().clone())
    }

    /// The address index
    #[must_use]
    pub fn by_address(&self) -> &SkipMap<u64, TypeDescriptorRc> {
        &self.by_address
    }

    /// The hash index
    #[must_use]
    pub fn by_hash(&self) -> &DashMap<u32, TypeDescriptorRc> {
        &self.by_hash
    }

    /// Number of recorded descriptors
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_address.len()
    }

    /// True if nothing was recorded
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_address.is_empty()
    }

    /// Descriptors in address order
    pub fn iter(&self) -> impl Iterator<Item = TypeDescriptorRc> + '_ {
        self.by_address.iter().map(|entry| entry.value().clone())
    }
}
