//! Reconstruction of the dehydrated heap.
//!
//! The compiler stores the initial heap image of a module in compressed form: a stream of
//! single-byte commands, each followed by optional inline data. Pointers inside the heap are
//! not stored at all. They are re-created from relocation commands that reference either a
//! shared table of 4-byte self-relative cells located right after the stream, or a cell that
//! follows the command inline.
//!
//! # Stream Layout
//!
//! ```text
//! start      i32 offset of the heap, relative to `start`
//! start + 4  command bytes ...
//! end        fixup cells: i32 self-relative offsets, 4 bytes each
//! ```
//!
//! # Command Encoding
//!
//! The low three bits of a command byte select the [`DehydratedCommand`], the upper five bits
//! hold the payload. Payloads above [`MAX_SHORT_PAYLOAD`] announce one to three trailing
//! little-endian payload bytes, and the decoded value is offset by [`MAX_SHORT_PAYLOAD`].
//!
//! Position tracking must be exact: every relative relocation depends on the current output
//! address. A malformed command therefore aborts reconstruction instead of returning a partial
//! heap.

use crate::{
    file::parser::Parser,
    image::{
        address::{AddressSpace, Heap},
        header::SectionInfo,
        PointerWidth,
    },
    Error, Result,
};

/// Largest payload that fits into the command byte itself
pub const MAX_SHORT_PAYLOAD: u32 = MAX_RAW_SHORT_PAYLOAD - MAX_EXTRA_PAYLOAD_BYTES;

const MAX_RAW_SHORT_PAYLOAD: u32 = (1 << 5) - 1;
const MAX_EXTRA_PAYLOAD_BYTES: u32 = 3;
const FIXUP_CELL_SIZE: u64 = 4;

/// The opcodes of the dehydrated data stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::FromRepr, strum::Display)]
#[repr(u8)]
pub enum DehydratedCommand {
    /// Copy `payload` bytes verbatim from the stream
    Copy = 0,
    /// Emit `payload` zero bytes
    ZeroFill = 1,
    /// Write a 32-bit relative pointer to the target of fixup cell `payload`
    RelPtr32Reloc = 2,
    /// Write a full-width pointer to the target of fixup cell `payload`
    PtrReloc = 3,
    /// Write `payload` 32-bit relative pointers, each read from an inline cell
    InlineRelPtr32Reloc = 4,
    /// Write `payload` full-width pointers, each read from an inline cell
    InlinePtrReloc = 5,
}

/// Decode one command byte and its extended payload from `parser`.
///
/// Returns the raw opcode bits (which may not map to a [`DehydratedCommand`]) and the payload.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the stream ends inside the command.
pub fn decode_command(parser: &mut Parser<'_>) -> Result<(u8, u32)> {
    let byte = parser.read_le::<u8>()?;
    let opcode = byte & 0x07;
    let mut payload = u32::from(byte >> 3);

    if payload > MAX_SHORT_PAYLOAD {
        let extra = payload - MAX_SHORT_PAYLOAD;
        payload = u32::from(parser.read_le::<u8>()?);
        if extra > 1 {
            payload += u32::from(parser.read_le::<u8>()?) << 8;
        }
        if extra > 2 {
            payload += u32::from(parser.read_le::<u8>()?) << 16;
        }
        payload += MAX_SHORT_PAYLOAD;
    }

    Ok((opcode, payload))
}

/// Rebuild the heap described by the dehydrated data `section`.
///
/// Relocation cells are read through `space`, so the static image must already be attached.
///
/// # Errors
/// Returns [`crate::Error::EmptyCopy`] or [`crate::Error::InvalidCommand`] for a corrupt
/// stream, and lookup errors if the stream or a fixup cell is not mapped.
///
/// # Examples
///
/// ```rust,no_run
/// use aotscope::{prelude::*, runtime::rehydrate::rehydrate};
/// use std::path::Path;
///
/// let object = AotObject::from_file(Path::new("app.exe"), 0x2_1F40, AnalysisOptions::minimal())?;
///
/// if let Some(section) = object.sections().get(SectionType::DehydratedData) {
///     let heap = rehydrate(object.space(), section)?;
///     println!("{} bytes at {:#x}", heap.len(), heap.base());
/// }
/// # Ok::<(), aotscope::Error>(())
/// ```
pub fn rehydrate(space: &AddressSpace, section: &SectionInfo) -> Result<Heap> {
    let start = section.start;
    let length = usize::try_from(section.len())
        .map_err(|_| malformed_error!("Dehydrated section too large - {}", section.len()))?;
    let stream = space.read_bytes(start, length)?;

    let mut parser = Parser::new(&stream);
    let heap_base = start.wrapping_add_signed(i64::from(parser.read_le::<i32>()?));

    let mut rehydrator = Rehydrator {
        space,
        width: space.pointer_width(),
        heap_base,
        fixups: section.end,
        output: Vec::with_capacity(length * 2),
    };

    log::info!(
        "Rehydrating {length} stream bytes at {start:#x} into a heap at {heap_base:#x}"
    );

    while parser.has_more_data() {
        let offset = parser.pos() as u64;
        let (opcode, payload) = decode_command(&mut parser)?;

        match DehydratedCommand::from_repr(opcode) {
            Some(DehydratedCommand::Copy) => {
                if payload == 0 {
                    return Err(Error::EmptyCopy { offset });
                }
                let bytes = parser.read_bytes(payload as usize)?;
                rehydrator.output.extend_from_slice(bytes);
            }
            Some(DehydratedCommand::ZeroFill) => {
                let len = rehydrator.output.len() + payload as usize;
                rehydrator.output.resize(len, 0);
            }
            Some(DehydratedCommand::RelPtr32Reloc) => {
                let target = rehydrator.fixup_target(payload)?;
                rehydrator.write_relative(target);
            }
            Some(DehydratedCommand::PtrReloc) => {
                let target = rehydrator.fixup_target(payload)?;
                rehydrator.write_pointer(target);
            }
            Some(DehydratedCommand::InlineRelPtr32Reloc) => {
                for _ in 0..payload {
                    let target = inline_target(&mut parser, start)?;
                    rehydrator.write_relative(target);
                }
            }
            Some(DehydratedCommand::InlinePtrReloc) => {
                for _ in 0..payload {
                    let target = inline_target(&mut parser, start)?;
                    rehydrator.write_pointer(target);
                }
            }
            None => return Err(Error::InvalidCommand { offset, opcode }),
        }
    }

    log::info!("Rehydrated {} heap bytes", rehydrator.output.len());
    Ok(Heap::new(heap_base, rehydrator.output))
}

fn inline_target(parser: &mut Parser<'_>, stream_start: u64) -> Result<u64> {
    let cell = stream_start + parser.pos() as u64;
    let delta = parser.read_le::<i32>()?;
    Ok(cell.wrapping_add_signed(i64::from(delta)))
}

struct Rehydrator<'a> {
    space: &'a AddressSpace,
    width: PointerWidth,
    heap_base: u64,
    fixups: u64,
    output: Vec<u8>,
}

impl Rehydrator<'_> {
    fn fixup_target(&self, index: u32) -> Result<u64> {
        self.space
            .read_relative(self.fixups + FIXUP_CELL_SIZE * u64::from(index))
    }

    fn current_address(&self) -> u64 {
        self.heap_base + self.output.len() as u64
    }

    #[allow(clippy::cast_possible_truncation)]
    fn write_relative(&mut self, target: u64) {
        let relative = target.wrapping_sub(self.current_address()) as u32;
        self.output.extend_from_slice(&relative.to_le_bytes());
    }

    fn write_pointer(&mut self, target: u64) {
        let encoded = self.width.encode(target);
        self.output.extend_from_slice(&encoded);
    }
}
