//! Forward-only cursor over a byte slice.
//!
//! [`Parser`] is used wherever a structure is laid out sequentially: the runtime header and its
//! section entries, and the rehydration command stream. Random-access decoding of NativeFormat
//! data lives in [`crate::nativeformat`] instead.

use crate::{
    file::io::{read_le_at, RawIO},
    image::PointerWidth,
    Result,
};

/// A cursor reading little-endian values from a borrowed byte slice.
///
/// # Examples
///
/// ```rust
/// use aotscope::file::parser::Parser;
///
/// let data = [0x52, 0x54, 0x52, 0x00, 0x09, 0x00];
/// let mut parser = Parser::new(&data);
/// assert_eq!(parser.read_le::<u32>()?, 0x0052_5452);
/// assert_eq!(parser.read_le::<u16>()?, 9);
/// assert!(!parser.has_more_data());
/// # Ok::<(), aotscope::Error>(())
/// ```
pub struct Parser<'a> {
    data: &'a [u8],
    position: usize,
}

impl<'a> Parser<'a> {
    /// Create a new parser positioned at the start of `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        Parser { data, position: 0 }
    }

    /// Total length of the underlying data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Returns true if the cursor has not reached the end of the data
    #[must_use]
    pub fn has_more_data(&self) -> bool {
        self.position < self.data.len()
    }

    /// Move the cursor to an absolute position
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if `pos` lies past the end of the data.
    pub fn seek(&mut self, pos: usize) -> Result<()> {
        if pos > self.data.len() {
            return Err(out_of_bounds_error!());
        }

        self.position = pos;
        Ok(())
    }

    /// Advance the cursor by `step` bytes
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the new position would pass the end.
    pub fn advance_by(&mut self, step: usize) -> Result<()> {
        match self.position.checked_add(step) {
            Some(end) if end <= self.data.len() => {
                self.position = end;
                Ok(())
            }
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Current position of the cursor
    #[must_use]
    pub fn pos(&self) -> usize {
        self.position
    }

    /// The full underlying slice
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    /// Read the next value of type `T` and advance past it
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data is left.
    pub fn read_le<T: RawIO>(&mut self) -> Result<T> {
        read_le_at::<T>(self.data, &mut self.position)
    }

    /// Read a pointer-sized value, zero-extended to `u64`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data is left.
    pub fn read_pointer(&mut self, width: PointerWidth) -> Result<u64> {
        match width {
            PointerWidth::Four => Ok(u64::from(self.read_le::<u32>()?)),
            PointerWidth::Eight => self.read_le::<u64>(),
        }
    }

    /// Borrow the next `len` bytes and advance past them
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if not enough data is left.
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        let start = self.position;
        self.advance_by(len)?;
        Ok(&self.data[start..self.position])
    }
}
