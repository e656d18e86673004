//! PE container access for NativeAOT executables.
//!
//! [`PeFile`] owns the raw bytes of an executable (either memory-mapped or in an owned buffer)
//! together with the goblin PE view borrowed from them, and implements
//! [`crate::image::ImageSource`] on top of the section table. Reads are answered the way a
//! loaded process would observe memory: bytes between a section's raw size and its virtual size
//! are zero.
//!
//! # Examples
//!
//! ```rust,no_run
//! use aotscope::{file::PeFile, image::ImageSource};
//! use std::path::Path;
//!
//! let file = PeFile::from_file(Path::new("app.exe"))?;
//! println!("base {:#x}, entry {:#x}", file.imagebase(), file.entry_point());
//!
//! let mut signature = [0u8; 4];
//! file.read(0x1000, &mut signature)?;
//! # Ok::<(), aotscope::Error>(())
//! ```

pub mod io;
pub mod parser;

mod memory;
mod physical;

use std::path::Path;

use crate::{
    image::{ImageSource, PointerWidth},
    Error::{self, Empty, GoblinErr},
    Result,
};
use goblin::pe::{section_table::SectionTable, PE};
use memory::Memory;
use ouroboros::self_referencing;
use physical::Physical;

/// `IMAGE_FILE_MACHINE_AMD64`
const MACHINE_AMD64: u16 = 0x8664;

/// Backing storage of a [`PeFile`].
pub trait Backend: Send + Sync {
    /// Borrow `len` bytes starting at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the data.
    fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]>;

    /// All bytes of the backend
    fn data(&self) -> &[u8];

    /// Number of bytes in the backend
    fn len(&self) -> usize;
}

/// A parsed PE executable and the bytes it was parsed from.
#[self_referencing]
pub struct PeFile {
    data: Box<dyn Backend>,
    #[borrows(data)]
    #[not_covariant]
    pe: PE<'this>,
}

impl PeFile {
    /// Memory-map and parse the executable at `file`
    ///
    /// # Errors
    /// Returns an error if the file can not be read, is not a PE file, or targets an
    /// unsupported machine.
    pub fn from_file(file: &Path) -> Result<PeFile> {
        let input = Physical::new(file)?;

        Self::load(input)
    }

    /// Parse an executable from an owned buffer
    ///
    /// # Errors
    /// Returns an error if the buffer is not a PE file or targets an unsupported machine.
    pub fn from_mem(data: Vec<u8>) -> Result<PeFile> {
        let input = Memory::new(data);

        Self::load(input)
    }

    fn load<T: Backend + 'static>(data: T) -> Result<PeFile> {
        if data.len() == 0 {
            return Err(Empty);
        }

        let data = Box::new(data);

        PeFile::try_new(data, |data| {
            let pe = PE::parse(data.data()).map_err(GoblinErr)?;
            if pe.header.optional_header.is_none() {
                return Err(malformed_error!("File does not have an OptionalHeader"));
            }

            let machine = pe.header.coff_header.machine;
            if machine != MACHINE_AMD64 {
                return Err(Error::UnsupportedArchitecture(machine));
            }

            Ok(pe)
        })
    }

    /// Size of the file in bytes
    #[must_use]
    pub fn len(&self) -> usize {
        self.with_data(|data| data.len())
    }

    /// Returns true if the file holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Preferred load address from the optional header
    #[must_use]
    #[allow(clippy::unnecessary_cast)]
    pub fn imagebase(&self) -> u64 {
        self.with_pe(|pe| pe.image_base as u64)
    }

    /// The COFF machine type
    #[must_use]
    pub fn machine(&self) -> u16 {
        self.with_pe(|pe| pe.header.coff_header.machine)
    }

    /// Iterate over the section table
    pub fn sections(&self) -> impl Iterator<Item = &SectionTable> {
        self.with_pe(|pe| pe.sections.iter())
    }

    /// Raw file bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        self.with_data(|data| data.data())
    }

    /// Borrow `len` raw bytes at file `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the range exceeds the file.
    pub fn data_slice(&self, offset: usize, len: usize) -> Result<&[u8]> {
        self.with_data(|data| data.data_slice(offset, len))
    }

    /// Locate the file offset backing `rva`. Returns the offset, the number of raw bytes
    /// that follow it before the zero-filled tail of its section, and the number of mapped
    /// bytes left in that section.
    fn locate(&self, rva: u64) -> Option<(usize, u64, u64)> {
        self.with_pe(|pe| {
            for section in &pe.sections {
                let start = u64::from(section.virtual_address);
                let span = u64::from(section.virtual_size.max(section.size_of_raw_data));
                if start <= rva && rva < start + span {
                    let delta = rva - start;
                    let raw = u64::from(section.size_of_raw_data).saturating_sub(delta);
                    let offset =
                        usize::try_from(u64::from(section.pointer_to_raw_data) + delta).ok()?;
                    return Some((offset, raw, span - delta));
                }
            }

            let headers = pe
                .header
                .optional_header
                .map_or(0, |optional| u64::from(optional.windows_fields.size_of_headers));
            if rva < headers {
                return Some((usize::try_from(rva).ok()?, headers - rva, headers - rva));
            }

            None
        })
    }
}

impl ImageSource for PeFile {
    fn pointer_width(&self) -> PointerWidth {
        if self.with_pe(|pe| pe.is_64) {
            PointerWidth::Eight
        } else {
            PointerWidth::Four
        }
    }

    fn image_base(&self) -> u64 {
        self.imagebase()
    }

    #[allow(clippy::unnecessary_cast)]
    fn entry_point(&self) -> u64 {
        self.with_pe(|pe| pe.entry as u64)
    }

    fn read(&self, address: u64, buffer: &mut [u8]) -> Result<()> {
        buffer.fill(0);

        // A read may continue into the next section when the two are contiguous
        let mut done = 0;
        while done < buffer.len() {
            let rva = address
                .checked_add(done as u64)
                .ok_or(Error::OutOfRange(address))?;
            let Some((offset, raw, mapped)) = self.locate(rva) else {
                return Err(Error::OutOfRange(address));
            };

            let remaining = buffer.len() - done;
            let chunk = usize::try_from(mapped).map_or(remaining, |mapped| mapped.min(remaining));
            let available = self.len().saturating_sub(offset);
            let copied = usize::try_from(raw)
                .map_or(chunk, |raw| raw.min(chunk))
                .min(available);

            if copied > 0 {
                buffer[done..done + copied].copy_from_slice(self.data_slice(offset, copied)?);
            }
            done += chunk;
        }
        Ok(())
    }
}
