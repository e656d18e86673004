//! Uniform reads across the static image and the reconstructed heap.
//!
//! The rehydrated heap does not exist in the file: it is rebuilt in memory and placed at the
//! virtual address the runtime would have used. [`AddressSpace`] hides that split. Any address
//! inside the heap window is served from the [`Heap`], every other address is delegated to the
//! [`ImageSource`].

use std::sync::Arc;

use crate::{
    file::io::{read_le, RawIO},
    image::{ImageSource, PointerWidth},
    Error, Result,
};

/// A reconstructed memory region and the address it is mapped at.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Heap {
    base: u64,
    data: Vec<u8>,
}

impl Heap {
    /// Wrap `data` mapped at `base`
    #[must_use]
    pub fn new(base: u64, data: Vec<u8>) -> Self {
        Heap { base, data }
    }

    /// First address of the heap window
    #[must_use]
    pub fn base(&self) -> u64 {
        self.base
    }

    /// One past the last address of the heap window
    #[must_use]
    pub fn end(&self) -> u64 {
        self.base + self.data.len() as u64
    }

    /// Number of bytes in the heap
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the heap holds no bytes
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The raw heap bytes
    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Returns true if `address` falls inside the heap window
    #[must_use]
    pub fn contains(&self, address: u64) -> bool {
        address >= self.base && address < self.end()
    }

    /// Address of the byte at `offset` into the heap
    #[must_use]
    pub fn address_of(&self, offset: usize) -> u64 {
        self.base + offset as u64
    }

    /// Offset into the heap of `address`, if it lies inside the window
    #[must_use]
    pub fn offset_of(&self, address: u64) -> Option<usize> {
        if self.contains(address) {
            usize::try_from(address - self.base).ok()
        } else {
            None
        }
    }
}

/// Address-indexed reads routed between the heap window and the static image.
///
/// Reads never substitute defaults: an address outside every known range fails with
/// [`crate::Error::OutOfRange`].
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use aotscope::image::{FlatImage, PointerWidth, address::{AddressSpace, Heap}};
///
/// let image = FlatImage::new(0x1000, vec![0x11; 0x10], PointerWidth::Eight);
/// let space = AddressSpace::new(Arc::new(image))
///     .with_heap(Heap::new(0x8000, vec![0x22; 0x10]));
///
/// assert_eq!(space.read_le::<u8>(0x1000)?, 0x11);
/// assert_eq!(space.read_le::<u8>(0x8004)?, 0x22);
/// assert!(space.read_le::<u8>(0x9000).is_err());
/// # Ok::<(), aotscope::Error>(())
/// ```
#[derive(Clone)]
pub struct AddressSpace {
    image: Arc<dyn ImageSource>,
    heap: Option<Heap>,
}

impl AddressSpace {
    /// Create an address space over the static image only
    #[must_use]
    pub fn new(image: Arc<dyn ImageSource>) -> Self {
        AddressSpace { image, heap: None }
    }

    /// Attach a reconstructed heap
    #[must_use]
    pub fn with_heap(mut self, heap: Heap) -> Self {
        self.heap = Some(heap);
        self
    }

    /// Attach or replace the reconstructed heap
    pub fn set_heap(&mut self, heap: Heap) {
        self.heap = Some(heap);
    }

    /// The reconstructed heap, if one was attached
    #[must_use]
    pub fn heap(&self) -> Option<&Heap> {
        self.heap.as_ref()
    }

    /// The underlying static image
    #[must_use]
    pub fn image(&self) -> &Arc<dyn ImageSource> {
        &self.image
    }

    /// Pointer width of the target
    #[must_use]
    pub fn pointer_width(&self) -> PointerWidth {
        self.image.pointer_width()
    }

    /// Fill `buffer` with the bytes at `address`.
    ///
    /// A read starting inside the heap window must end inside it as well.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the range is not fully backed.
    pub fn read(&self, address: u64, buffer: &mut [u8]) -> Result<()> {
        if let Some(heap) = &self.heap {
            if let Some(offset) = heap.offset_of(address) {
                let Some(bytes) = heap.data().get(offset..offset + buffer.len()) else {
                    return Err(Error::OutOfRange(address));
                };
                buffer.copy_from_slice(bytes);
                return Ok(());
            }
        }

        self.image.read(address, buffer)
    }

    /// Read `len` bytes starting at `address` into a new buffer
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the range is not fully backed.
    pub fn read_bytes(&self, address: u64, len: usize) -> Result<Vec<u8>> {
        let mut buffer = vec![0u8; len];
        self.read(address, &mut buffer)?;
        Ok(buffer)
    }

    /// Read a little-endian primitive at `address`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the value is not fully backed.
    pub fn read_le<T: RawIO>(&self, address: u64) -> Result<T> {
        let mut buffer = [0u8; 8];
        let size = std::mem::size_of::<T>();
        self.read(address, &mut buffer[..size])?;
        read_le::<T>(&buffer[..size])
    }

    /// Read a pointer-sized value, zero-extended to `u64`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the value is not fully backed.
    pub fn read_pointer(&self, address: u64) -> Result<u64> {
        match self.pointer_width() {
            PointerWidth::Four => Ok(u64::from(self.read_le::<u32>(address)?)),
            PointerWidth::Eight => self.read_le::<u64>(address),
        }
    }

    /// Resolve a self-relative fixup: the signed 32-bit offset stored at `address`, added to
    /// `address` itself.
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfRange`] if the cell is not fully backed.
    pub fn read_relative(&self, address: u64) -> Result<u64> {
        let delta = self.read_le::<i32>(address)?;
        Ok(address.wrapping_add_signed(i64::from(delta)))
    }
}

impl std::fmt::Debug for AddressSpace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AddressSpace")
            .field("pointer_width", &self.pointer_width())
            .field("heap_base", &self.heap.as_ref().map(Heap::base))
            .field("heap_len", &self.heap.as_ref().map(Heap::len))
            .finish()
    }
}
