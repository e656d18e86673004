use thiserror::Error;

use crate::{image::header::SectionType, metadata::handle::Handle};

macro_rules! malformed_error {
    // Single string version
    ($msg:expr) => {
        crate::Error::Malformed {
            message: $msg.to_string(),
            file: file!(),
            line: line!(),
        }
    };

    // Format string with arguments version
    ($fmt:expr, $($arg:tt)*) => {
        crate::Error::Malformed {
            message: format!($fmt, $($arg)*),
            file: file!(),
            line: line!(),
        }
    };
}

macro_rules! out_of_bounds_error {
    () => {
        crate::Error::OutOfBounds {
            file: file!(),
            line: line!(),
        }
    };
}

/// The generic Error type, which provides coverage for all errors this library can potentially
/// return.
///
/// Errors fall into two families. Format errors (a corrupt header, an unsupported machine, a
/// broken rehydration stream) abort the whole analysis, since every later stage depends on
/// exact offsets derived from the broken structure. Lookup errors ([`Error::OutOfRange`],
/// [`Error::OutOfBounds`]) are raised by a single read that left every known byte range.
///
/// Absence is never an error: a hash without a matching type descriptor, an image without
/// strings, or an invoke-map entry without a metadata handle are all represented as `None`
/// or as an empty collection.
///
/// # Examples
///
/// ```rust,no_run
/// use aotscope::{Error, file::PeFile};
/// use std::path::Path;
///
/// match PeFile::from_file(Path::new("app.exe")) {
///     Ok(file) => println!("image base {:#x}", file.imagebase()),
///     Err(Error::UnsupportedArchitecture(machine)) => eprintln!("unsupported machine {machine:#x}"),
///     Err(e) => eprintln!("failed: {e}"),
/// }
/// ```
#[derive(Error, Debug)]
pub enum Error {
    /// The input is damaged and could not be parsed.
    ///
    /// # Fields
    ///
    /// * `message` - Detailed description of what was malformed
    /// * `file` - Source file where the error was detected
    /// * `line` - Source line where the error was detected
    #[error("Malformed - {file}:{line}: {message}")]
    Malformed {
        /// The message to be printed for the Malformed error
        message: String,
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// A cursor or slice read ran past the end of its buffer.
    #[error("Out of Bound read would have occurred - {file}:{line}")]
    OutOfBounds {
        /// The source file in which this error occured
        file: &'static str,
        /// The source line in which this error occured
        line: u32,
    },

    /// An address is neither inside the reconstructed heap nor inside the static image.
    #[error("Address {0:#x} is outside of every known range")]
    OutOfRange(u64),

    /// The runtime header does not start with the expected `RTR` signature.
    #[error("Invalid runtime header signature - {0:#010x}")]
    InvalidSignature(u32),

    /// The executable targets a machine this library does not analyze.
    #[error("Unsupported architecture - machine {0:#06x}")]
    UnsupportedArchitecture(u16),

    /// The rehydration stream contains an opcode outside of the known command set.
    #[error("Invalid rehydration command {opcode} at offset {offset:#x}")]
    InvalidCommand {
        /// Offset of the command byte inside the command stream
        offset: u64,
        /// The decoded (invalid) opcode
        opcode: u8,
    },

    /// The rehydration stream contains a copy command with a zero length.
    #[error("Empty copy command at offset {offset:#x}")]
    EmptyCopy {
        /// Offset of the command byte inside the command stream
        offset: u64,
    },

    /// A section required by the current stage is missing from the section directory.
    #[error("Required section {0} is missing")]
    MissingSection(SectionType),

    /// The metadata reader returned a record of a different kind than the handle demands.
    #[error("Handle {handle} does not refer to a {expected}")]
    HandleMismatch {
        /// The handle that was resolved
        handle: Handle,
        /// The record kind the caller expected
        expected: &'static str,
    },

    /// Provided input was empty.
    #[error("Provided input was empty")]
    Empty,

    /// File I/O error.
    #[error("{0}")]
    FileError(#[from] std::io::Error),

    /// Error from the goblin crate during PE parsing.
    #[error("{0}")]
    GoblinErr(#[from] goblin::error::Error),
}
