//! Analysis configuration
//!
//! Knobs for the heuristic stages of an analysis run. The pointer width is not among them: it
//! always comes from the image.

/// Configuration for an analysis run
///
/// The scanner heuristics are the only defence against false positives, so the bounds here
/// trade recall for precision. The defaults match what the runtime itself guarantees.
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct AnalysisOptions {
    /// Complete text of one string object that every image carries; used to find the string
    /// type pointer
    pub string_marker: String,

    /// Longest accepted string, in UTF-16 code units (default: 1024)
    pub max_string_length: u32,

    /// Descriptors with this many interfaces or more are parsed without their vtable and
    /// interface arrays (default: 256)
    pub max_interfaces: u16,

    /// Harvest string objects from the heap
    pub scan_strings: bool,

    /// Match type definitions against descriptors on the rayon thread pool
    pub parallel_type_matching: bool,

    /// Reject descriptor candidates with an unaligned address or an implausible base size
    pub check_descriptor_size: bool,

    /// Largest accepted base size when `check_descriptor_size` is enabled
    pub max_base_size: u32,
}

impl Default for AnalysisOptions {
    fn default() -> Self {
        Self {
            string_marker: "--- End of inner exception stack trace ---".to_string(),
            max_string_length: 1024,
            max_interfaces: 256,
            scan_strings: true,
            parallel_type_matching: false,
            check_descriptor_size: false,
            max_base_size: 0x0100_0000,
        }
    }
}

impl AnalysisOptions {
    /// Skips the string scan and matches types sequentially
    #[must_use]
    pub fn minimal() -> Self {
        Self {
            scan_strings: false,
            parallel_type_matching: false,
            ..Self::default()
        }
    }

    /// Parallel type matching with the descriptor plausibility check enabled
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            parallel_type_matching: true,
            check_descriptor_size: true,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets() {
        let default = AnalysisOptions::default();
        assert!(default.scan_strings);
        assert!(!default.parallel_type_matching);
        assert!(!default.check_descriptor_size);
        assert_eq!(default.max_string_length, 1024);
        assert_eq!(default.max_interfaces, 256);

        let minimal = AnalysisOptions::minimal();
        assert!(!minimal.scan_strings);
        assert!(!minimal.parallel_type_matching);
        assert_eq!(minimal.string_marker, default.string_marker);

        let thorough = AnalysisOptions::thorough();
        assert!(thorough.scan_strings);
        assert!(thorough.parallel_type_matching);
        assert!(thorough.check_descriptor_size);
    }
}
