//! Type name hashing compatible with the NativeAOT runtime.
//!
//! Runtime type descriptors carry a 32-bit hash of their type name instead of the name itself.
//! Joining descriptors with metadata therefore requires deriving the exact same value from the
//! metadata names: this module reproduces the runtime's algorithm bit for bit. It is a
//! compatibility contract, not a general purpose hash.
//!
//! # Name Hash
//!
//! A two-lane rolling hash over UTF-16 code units. Lane one is seeded with `0x6DA3B944` and
//! folds every even-indexed unit, lane two starts at zero and folds every odd-indexed unit:
//!
//! ```text
//! lane = (lane + rotl(lane, 5)) ^ unit
//! hash = (lane1 + rotl(lane1, 8)) ^ (lane2 + rotl(lane2, 8))
//! ```
//!
//! [`NameHashBuilder`] hashes a name built from several pieces without joining them first. The
//! even/odd lane assignment continues across appends.
//!
//! # Composite Types
//!
//! Constructed types combine the hashes of their components with add-rotate-xor steps, each
//! shape with its own rotation and constant: see [`nested_type_hash`], [`sz_array_type_hash`],
//! [`md_array_type_hash`], [`pointer_type_hash`], [`by_ref_type_hash`],
//! [`generic_instance_hash`], [`method_signature_hash`], [`method_hash`] and
//! [`signature_variable_hash`].
//!
//! Hashes derived from metadata records (namespaces, nesting, references) live in [`names`].
//!
//! # Examples
//!
//! ```rust
//! use aotscope::metadata::hash::{name_hash, NameHashBuilder};
//!
//! assert_eq!(name_hash("System.Array`1"), 0xD531_3557);
//!
//! let mut builder = NameHashBuilder::new();
//! builder.append("System");
//! builder.append(".");
//! builder.append("Array`1");
//! assert_eq!(builder.finish(), 0xD531_3557);
//! ```

pub mod names;

const LANE1_SEED: u32 = 0x6DA3_B944;
const SZ_ARRAY_NAME_HASH: u32 = 0xD531_3557;

/// Incremental name hash over several string pieces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NameHashBuilder {
    lane1: u32,
    lane2: u32,
    units: usize,
}

impl Default for NameHashBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl NameHashBuilder {
    /// Start an empty name
    #[must_use]
    pub const fn new() -> Self {
        NameHashBuilder {
            lane1: LANE1_SEED,
            lane2: 0,
            units: 0,
        }
    }

    /// Append the UTF-16 units of `piece`
    pub fn append(&mut self, piece: &str) -> &mut Self {
        for unit in piece.encode_utf16() {
            if self.units & 1 == 0 {
                self.lane1 = fold(self.lane1, 5, u32::from(unit));
            } else {
                self.lane2 = fold(self.lane2, 5, u32::from(unit));
            }
            self.units += 1;
        }
        self
    }

    /// Number of UTF-16 units appended so far
    #[must_use]
    pub fn len(&self) -> usize {
        self.units
    }

    /// Returns true if nothing was appended
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.units == 0
    }

    /// Finalize the hash; the builder stays usable
    #[must_use]
    pub fn finish(&self) -> u32 {
        let lane1 = self.lane1.wrapping_add(self.lane1.rotate_left(8));
        let lane2 = self.lane2.wrapping_add(self.lane2.rotate_left(8));
        lane1 ^ lane2
    }
}

#[inline]
fn fold(hash: u32, rotation: u32, value: u32) -> u32 {
    hash.wrapping_add(hash.rotate_left(rotation)) ^ value
}

#[inline]
fn fold_all(seed: u32, values: impl IntoIterator<Item = u32>) -> u32 {
    let hash = values
        .into_iter()
        .fold(seed, |hash, value| fold(hash, 13, value));
    hash.wrapping_add(hash.rotate_left(15))
}

/// Hash a complete name in one step
#[must_use]
pub fn name_hash(name: &str) -> u32 {
    NameHashBuilder::new().append(name).finish()
}

/// Hash of a nested type from its enclosing type's hash and its own simple name hash
#[must_use]
pub fn nested_type_hash(enclosing: u32, nested_name: u32) -> u32 {
    fold(enclosing, 11, nested_name)
}

/// Hash of `element[]`. Single-dimension zero-based arrays hash like ``System.Array`1``
/// instantiated over the element type.
#[must_use]
pub fn sz_array_type_hash(element: u32) -> u32 {
    fold_all(SZ_ARRAY_NAME_HASH, [element])
}

/// Hash of a multi-dimensional array. These hash like ``System.MDArrayRank{rank}`1``
/// instantiated over the element type.
#[must_use]
pub fn md_array_type_hash(element: u32, rank: u32) -> u32 {
    fold_all(name_hash(&format!("System.MDArrayRank{rank}`1")), [element])
}

/// Hash of `pointee*`
#[must_use]
pub fn pointer_type_hash(pointee: u32) -> u32 {
    fold(pointee, 5, 0x12D0)
}

/// Hash of `ref target`
#[must_use]
pub fn by_ref_type_hash(target: u32) -> u32 {
    fold(target, 7, 0x4C85)
}

/// Hash of a generic instantiation: the definition folded with every argument, in order
#[must_use]
pub fn generic_instance_hash(definition: u32, arguments: &[u32]) -> u32 {
    fold_all(definition, arguments.iter().copied())
}

/// Hash of a method signature: the return type folded with every parameter, in order
#[must_use]
pub fn method_signature_hash(return_type: u32, parameters: &[u32]) -> u32 {
    fold_all(return_type, parameters.iter().copied())
}

/// Hash of a method: owning type combined with the name (or name and generic arguments)
#[must_use]
pub fn method_hash(owning_type: u32, name_or_instantiation: u32) -> u32 {
    owning_type ^ name_or_instantiation
}

/// Hash of a generic parameter reference `!index` (type) or `!!index` (method)
#[must_use]
pub fn signature_variable_hash(index: u32, method: bool) -> u32 {
    if method {
        index.wrapping_mul(0x0782_2381).wrapping_add(0x5487_2645)
    } else {
        index.wrapping_mul(0x0549_8341).wrapping_add(0x0083_2424)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_name_hashes() {
        assert_eq!(name_hash("System.Array`1"), 0xD531_3557);
        assert_eq!(name_hash("System.Object"), 0xB738_B9C1);
        assert_eq!(name_hash("System.Int32"), 0xBD7C_8CB2);
        assert_eq!(name_hash("MyNs.Widget"), 0x4463_A2FB);
        assert_eq!(name_hash(""), 0x115C_FDB1);
    }

    #[test]
    fn partial_appends_match_single_call() {
        let whole = name_hash("System.Array`1");

        // Even split
        let mut even = NameHashBuilder::new();
        even.append("System.Arr").append("ay`1");
        assert_eq!(even.finish(), whole);

        // Odd split, the first unit of the second piece continues in lane two
        let mut odd = NameHashBuilder::new();
        odd.append("Sys").append("tem.Array`1");
        assert_eq!(odd.finish(), whole);
        assert_eq!(odd.len(), 14);

        let mut pieces = NameHashBuilder::new();
        for piece in ["S", "y", "", "stem", ".", "Array`1"] {
            pieces.append(piece);
        }
        assert_eq!(pieces.finish(), whole);
    }

    #[test]
    fn finish_does_not_consume() {
        let mut builder = NameHashBuilder::new();
        assert!(builder.is_empty());
        assert_eq!(builder.finish(), name_hash(""));

        builder.append("System.");
        let _ = builder.finish();
        builder.append("Object");
        assert_eq!(builder.finish(), 0xB738_B9C1);
    }

    #[test]
    fn nested_differs_from_joined() {
        let outer = name_hash("Ns.Outer");
        let inner = name_hash("Inner");
        assert_eq!(outer, 0x0CAE_B570);
        assert_eq!(inner, 0x6E02_A62B);

        let nested = nested_type_hash(outer, inner);
        assert_eq!(nested, 0xEC58_93FE);
        assert_ne!(nested, name_hash("Ns.Outer.Inner"));
        assert_eq!(name_hash("Ns.Outer.Inner"), 0x03A1_993A);
    }

    #[test]
    fn array_hashes() {
        assert_eq!(sz_array_type_hash(0xB738_B9C1), 0x9802_BCAE);
        assert_eq!(md_array_type_hash(0xBD7C_8CB2, 2), 0x7FD7_90C9);
        assert_ne!(md_array_type_hash(0xBD7C_8CB2, 1), sz_array_type_hash(0xBD7C_8CB2));
    }

    #[test]
    fn pointer_and_by_ref() {
        assert_eq!(pointer_type_hash(0xBD7C_8CB2), 0x6D0E_31D9);
        assert_eq!(by_ref_type_hash(0xBD7C_8CB2), 0x7BC2_AA95);
    }

    #[test]
    fn generic_instances_and_signatures() {
        let list = name_hash("System.Collections.Generic.List`1");
        assert_eq!(list, 0x5D53_51B2);
        assert_eq!(generic_instance_hash(list, &[0xBD7C_8CB2]), 0x03EC_4F68);

        assert_eq!(
            method_signature_hash(0xBD7C_8CB2, &[0xB738_B9C1, 0xBD7C_8CB2]),
            0x76AE_EF68
        );
        assert_eq!(method_signature_hash(0xBD7C_8CB2, &[]), 0x03D5_EB70);

        // Argument order matters
        assert_ne!(
            method_signature_hash(0, &[1, 2]),
            method_signature_hash(0, &[2, 1])
        );
    }

    #[test]
    fn methods_and_variables() {
        assert_eq!(method_hash(0x4463_A2FB, name_hash("Run")), 0x98EB_4D60);
        assert_eq!(signature_variable_hash(1, true), 0x5C09_49C6);
        assert_eq!(signature_variable_hash(2, false), 0x0B16_2AA6);
        assert_eq!(signature_variable_hash(0, false), 0x0083_2424);
    }
}
