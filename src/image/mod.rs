//! Address-indexed access to a loaded NativeAOT image.
//!
//! Addresses throughout this crate are offsets from the image's preferred load location (RVAs),
//! used uniformly for bytes that live in the static image and for bytes that only exist in the
//! reconstructed heap produced by [`crate::runtime::rehydrate`].
//!
//! # Key Components
//!
//! - [`ImageSource`] - the container-format service: entry point, pointer width, byte reads
//! - [`FlatImage`] - a single contiguous block of bytes, useful for synthetic images
//! - [`address::AddressSpace`] - routes reads between the heap window and the static image
//! - [`header::RuntimeHeader`] / [`header::SectionDirectory`] - the runtime header and its sections
//!
//! Executables on disk are loaded through [`crate::file::PeFile`], which also implements
//! [`ImageSource`].

pub mod address;
pub mod header;

use crate::{Error, Result};

/// Size of a native pointer on the analyzed target.
///
/// The width is a property of the image and never hard-coded by the analysis: type descriptor
/// layouts, section entries and pointer relocations all scale with it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum PointerWidth {
    /// 32-bit targets
    Four,
    /// 64-bit targets
    Eight,
}

impl PointerWidth {
    /// Number of bytes in one pointer
    #[must_use]
    pub const fn bytes(self) -> usize {
        match self {
            PointerWidth::Four => 4,
            PointerWidth::Eight => 8,
        }
    }

    /// Map a byte count to a width, if it is a supported one
    #[must_use]
    pub fn from_bytes(bytes: usize) -> Option<Self> {
        match bytes {
            4 => Some(PointerWidth::Four),
            8 => Some(PointerWidth::Eight),
            _ => None,
        }
    }

    /// Encode `value` as a little-endian pointer of this width.
    ///
    /// 32-bit targets keep the low half of `value`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn encode(self, value: u64) -> Vec<u8> {
        match self {
            PointerWidth::Four => (value as u32).to_le_bytes().to_vec(),
            PointerWidth::Eight => value.to_le_bytes().to_vec(),
        }
    }
}

/// An address-indexed byte source over a loaded executable image.
///
/// Implementations must answer reads the way a loaded process would observe memory: bytes of a
/// section beyond its raw data but inside its virtual size read as zero.
pub trait ImageSource: Send + Sync {
    /// The native pointer width of the target
    fn pointer_width(&self) -> PointerWidth;

    /// The preferred load address. Absolute pointers stored in the image are relative to it.
    fn image_base(&self) -> u64;

    /// Address of the native entry point
    fn entry_point(&self) -> u64;

    /// Fill `buffer` with the bytes starting at `address`.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if any byte of the range is not mapped.
    fn read(&self, address: u64, buffer: &mut [u8]) -> Result<()>;
}

/// A flat image: one contiguous block of bytes mapped at `base`.
///
/// Used for synthetic inputs and for images that were already loaded by another tool.
///
/// # Examples
///
/// ```rust
/// use aotscope::image::{FlatImage, ImageSource, PointerWidth};
///
/// let mut image = FlatImage::zeroed(0x1000, 0x100, PointerWidth::Eight)
///     .with_image_base(0x1_4000_0000);
/// image.patch(0x1010, &[0xAA, 0xBB])?;
///
/// let mut buffer = [0u8; 2];
/// image.read(0x1010, &mut buffer)?;
/// assert_eq!(buffer, [0xAA, 0xBB]);
/// assert!(image.read(0x10FF, &mut buffer).is_err());
/// # Ok::<(), aotscope::Error>(())
/// ```
#[derive(Debug, Clone)]
pub struct FlatImage {
    base: u64,
    data: Vec<u8>,
    width: PointerWidth,
    image_base: u64,
    entry_point: u64,
}

impl FlatImage {
    /// Map `data` at `base`
    #[must_use]
    pub fn new(base: u64, data: Vec<u8>, width: PointerWidth) -> Self {
        FlatImage {
            base,
            data,
            width,
            image_base: 0,
            entry_point: 0,
        }
    }

    /// Map `len` zero bytes at `base`
    #[must_use]
    pub fn zeroed(base: u64, len: usize, width: PointerWidth) -> Self {
        Self::new(base, vec![0; len], width)
    }

    /// Set the preferred load address used to translate absolute pointers
    #[must_use]
    pub fn with_image_base(mut self, image_base: u64) -> Self {
        self.image_base = image_base;
        self
    }

    /// Set the entry point address
    #[must_use]
    pub fn with_entry_point(mut self, entry_point: u64) -> Self {
        self.entry_point = entry_point;
        self
    }

    /// First mapped address
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// One past the last mapped address
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Overwrite the bytes at `address` with `bytes`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the range is not fully mapped.
    pub fn patch(&mut self, address: u64, bytes: &[u8]) -> Result<()> {
        let range = self.range(address, bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    fn range(&self, address: u64, len: usize) -> Result<std::ops::Range<usize>> {
        let start = address
            .checked_sub(self.base)
            .and_then(|offset| usize::try_from(offset).ok())
            .ok_or(Error::OutOfRange(address))?;
        match start.checked_add(len) {
            Some(end) if end <= self.data.len() => Ok(start..end),
            _ => Err(Error::OutOfRange(address)),
        }
    }
}

impl ImageSource for FlatImage {
    fn pointer_width(&self) -> PointerWidth {
        self.width
    }

    fn image_base(&self) -> u64 {
        self.image_base
    }

    fn entry_point(&self) -> u64 {
        self.entry_point
    }

    fn read(&self, address: u64, buffer: &mut [u8]) -> Result<()> {
        let range = self.range(address, buffer.len())?;
        buffer.copy_from_slice(&self.data[range]);
        Ok(())
    }
}
