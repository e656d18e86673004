//! NativeFormat primitive decoding.
//!
//! The readonly blob sections of a NativeAOT image (invoke map, type maps, template maps, ...)
//! are written in the NativeFormat encoding: variable-length integers addressed by offset, and
//! hashtables built from them. This module provides the random-access [`NativeReader`], the
//! [`NativeParser`] cursor and the matching encoders. [`hashtable`] adds the hashtable layout.
//!
//! # Integer Encoding
//!
//! The number of trailing one bits in the first byte selects the total length:
//!
//! | First byte | Length | Payload |
//! |------------|--------|---------|
//! | `xxxxxxx0` | 1 | 7 bits |
//! | `xxxxxx01` | 2 | 14 bits |
//! | `xxxxx011` | 3 | 21 bits |
//! | `xxxx0111` | 4 | 28 bits |
//! | `xxx01111` | 5 | the following `u32` |
//!
//! Signed values use the same layout with the top payload bit sign-extended.
//!
//! # Examples
//!
//! ```rust
//! use aotscope::nativeformat::{encode_unsigned, NativeReader};
//!
//! let mut data = Vec::new();
//! encode_unsigned(&mut data, 300);
//! assert_eq!(data, [0xB1, 0x04]);
//!
//! let reader = NativeReader::new(&data);
//! assert_eq!(reader.decode_unsigned(0)?, (300, 2));
//! # Ok::<(), aotscope::Error>(())
//! ```

pub mod hashtable;

use crate::{
    file::io::{read_le_at, RawIO},
    Result,
};

/// Random-access decoder over a NativeFormat byte range.
///
/// Every method takes an offset and returns the decoded value together with the offset of
/// the next byte.
#[derive(Debug, Clone, Copy)]
pub struct NativeReader<'a> {
    data: &'a [u8],
}

impl<'a> NativeReader<'a> {
    /// Wrap `data`
    #[must_use]
    pub fn new(data: &'a [u8]) -> Self {
        NativeReader { data }
    }

    /// Length of the underlying data
    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if the underlying data is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The underlying data
    #[must_use]
    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn read<T: RawIO>(&self, offset: u32) -> Result<(T, u32)> {
        let mut position = offset as usize;
        let value = read_le_at::<T>(self.data, &mut position)?;
        Ok((value, to_offset(position)?))
    }

    /// Fixed-width `u8` at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the data.
    pub fn read_u8(&self, offset: u32) -> Result<(u8, u32)> {
        self.read::<u8>(offset)
    }

    /// Fixed-width little-endian `u16` at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the data.
    pub fn read_u16(&self, offset: u32) -> Result<(u16, u32)> {
        self.read::<u16>(offset)
    }

    /// Fixed-width little-endian `u32` at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the data.
    pub fn read_u32(&self, offset: u32) -> Result<(u32, u32)> {
        self.read::<u32>(offset)
    }

    /// Decode a variable-length unsigned integer at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the data, or a format error if
    /// the first byte selects no known length.
    pub fn decode_unsigned(&self, offset: u32) -> Result<(u32, u32)> {
        let (first, next) = self.read_u8(offset)?;
        let first = u32::from(first);

        if first & 0x01 == 0 {
            return Ok((first >> 1, next));
        }
        if first & 0x02 == 0 {
            let (b1, next) = self.read_u8(next)?;
            return Ok(((first >> 2) | (u32::from(b1) << 6), next));
        }
        if first & 0x04 == 0 {
            let (b1, next) = self.read_u8(next)?;
            let (b2, next) = self.read_u8(next)?;
            let value = (first >> 3) | (u32::from(b1) << 5) | (u32::from(b2) << 13);
            return Ok((value, next));
        }
        if first & 0x08 == 0 {
            let (b1, next) = self.read_u8(next)?;
            let (b2, next) = self.read_u8(next)?;
            let (b3, next) = self.read_u8(next)?;
            let value = (first >> 4)
                | (u32::from(b1) << 4)
                | (u32::from(b2) << 12)
                | (u32::from(b3) << 20);
            return Ok((value, next));
        }
        if first & 0x10 == 0 {
            return self.read_u32(next);
        }

        Err(malformed_error!(
            "Invalid NativeFormat integer prefix 0x{:02x} at {}",
            first,
            offset
        ))
    }

    /// Decode a variable-length signed integer at `offset`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the data, or a format error if
    /// the first byte selects no known length.
    #[allow(clippy::cast_possible_wrap)]
    pub fn decode_signed(&self, offset: u32) -> Result<(i32, u32)> {
        let (first, next) = self.read_u8(offset)?;
        let signed_first = i32::from(first as i8);
        let first = u32::from(first);

        if first & 0x01 == 0 {
            return Ok((signed_first >> 1, next));
        }
        if first & 0x02 == 0 {
            let (b1, next) = self.read_u8(next)?;
            let value = (first >> 2) as i32 | (i32::from(b1 as i8) << 6);
            return Ok((value, next));
        }
        if first & 0x04 == 0 {
            let (b1, next) = self.read_u8(next)?;
            let (b2, next) = self.read_u8(next)?;
            let value =
                (first >> 3) as i32 | (i32::from(b1) << 5) | (i32::from(b2 as i8) << 13);
            return Ok((value, next));
        }
        if first & 0x08 == 0 {
            let (b1, next) = self.read_u8(next)?;
            let (b2, next) = self.read_u8(next)?;
            let (b3, next) = self.read_u8(next)?;
            let value = (first >> 4) as i32
                | (i32::from(b1) << 4)
                | (i32::from(b2) << 12)
                | (i32::from(b3 as i8) << 20);
            return Ok((value, next));
        }
        if first & 0x10 == 0 {
            let (value, next) = self.read_u32(next)?;
            return Ok((value as i32, next));
        }

        Err(malformed_error!(
            "Invalid NativeFormat integer prefix 0x{:02x} at {}",
            first,
            offset
        ))
    }
}

fn to_offset(position: usize) -> Result<u32> {
    u32::try_from(position).map_err(|_| out_of_bounds_error!())
}

/// A cursor over a [`NativeReader`].
#[derive(Debug, Clone, Copy)]
pub struct NativeParser<'a> {
    reader: NativeReader<'a>,
    offset: u32,
}

impl<'a> NativeParser<'a> {
    /// Position a parser at `offset`
    #[must_use]
    pub fn new(reader: NativeReader<'a>, offset: u32) -> Self {
        NativeParser { reader, offset }
    }

    /// The underlying reader
    #[must_use]
    pub fn reader(&self) -> NativeReader<'a> {
        self.reader
    }

    /// Current offset
    #[must_use]
    pub fn offset(&self) -> u32 {
        self.offset
    }

    /// Fixed-width `u8`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] past the end of the data.
    pub fn get_u8(&mut self) -> Result<u8> {
        let (value, next) = self.reader.read_u8(self.offset)?;
        self.offset = next;
        Ok(value)
    }

    /// Variable-length unsigned integer
    ///
    /// # Errors
    /// Returns the errors of [`NativeReader::decode_unsigned`].
    pub fn get_unsigned(&mut self) -> Result<u32> {
        let (value, next) = self.reader.decode_unsigned(self.offset)?;
        self.offset = next;
        Ok(value)
    }

    /// Variable-length signed integer
    ///
    /// # Errors
    /// Returns the errors of [`NativeReader::decode_signed`].
    pub fn get_signed(&mut self) -> Result<i32> {
        let (value, next) = self.reader.decode_signed(self.offset)?;
        self.offset = next;
        Ok(value)
    }

    /// Read a signed delta and apply it to the offset the delta was stored at
    ///
    /// # Errors
    /// Returns the errors of [`NativeReader::decode_signed`], or [`crate::Error::OutOfBounds`]
    /// if the target lies before the start of the data.
    pub fn get_relative_offset(&mut self) -> Result<u32> {
        let position = self.offset;
        let delta = self.get_signed()?;
        position
            .checked_add_signed(delta)
            .ok_or_else(|| out_of_bounds_error!())
    }

    /// A new parser positioned at the target of a relative offset read from here
    ///
    /// # Errors
    /// Returns the errors of [`NativeParser::get_relative_offset`].
    pub fn get_parser_from_relative_offset(&mut self) -> Result<NativeParser<'a>> {
        let target = self.get_relative_offset()?;
        Ok(NativeParser::new(self.reader, target))
    }
}

/// Append the shortest encoding of `value`
#[allow(clippy::cast_possible_truncation)]
pub fn encode_unsigned(out: &mut Vec<u8>, value: u32) {
    if value < 0x80 {
        out.push((value << 1) as u8);
    } else if value < 0x4000 {
        out.push(((value << 2) | 0x01) as u8);
        out.push((value >> 6) as u8);
    } else if value < 0x0020_0000 {
        out.push(((value << 3) | 0x03) as u8);
        out.push((value >> 5) as u8);
        out.push((value >> 13) as u8);
    } else if value < 0x1000_0000 {
        out.push(((value << 4) | 0x07) as u8);
        out.push((value >> 4) as u8);
        out.push((value >> 12) as u8);
        out.push((value >> 20) as u8);
    } else {
        out.push(0x0F);
        out.extend_from_slice(&value.to_le_bytes());
    }
}

/// Append the shortest encoding of `value`
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn encode_signed(out: &mut Vec<u8>, value: i32) {
    let bits = value as u32;
    if (-0x40..0x40).contains(&value) {
        out.push((bits << 1) as u8);
    } else if (-0x2000..0x2000).contains(&value) {
        out.push(((bits << 2) | 0x01) as u8);
        out.push((bits >> 6) as u8);
    } else if (-0x0010_0000..0x0010_0000).contains(&value) {
        out.push(((bits << 3) | 0x03) as u8);
        out.push((bits >> 5) as u8);
        out.push((bits >> 13) as u8);
    } else if (-0x0800_0000..0x0800_0000).contains(&value) {
        out.push(((bits << 4) | 0x07) as u8);
        out.push((bits >> 4) as u8);
        out.push((bits >> 12) as u8);
        out.push((bits >> 20) as u8);
    } else {
        encode_signed_fixed(out, value);
    }
}

/// Append `value` in the 5-byte form, whatever its magnitude.
///
/// Used where the encoded length must be known before the value is.
pub fn encode_signed_fixed(out: &mut Vec<u8>, value: i32) {
    out.push(0x0F);
    out.extend_from_slice(&value.to_le_bytes());
}
