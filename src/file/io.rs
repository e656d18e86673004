//! Little-endian primitive reads and writes over byte slices.
//!
//! Everything inside a NativeAOT image is stored little-endian: the runtime header, section
//! entries, type descriptors and relocation cells. [`RawIO`] abstracts over the primitive
//! integer types so that [`read_le`] / [`read_le_at`] / [`write_le_at`] can be written once.
//!
//! All functions return [`crate::Error::OutOfBounds`] instead of panicking when the buffer is
//! too short.
//!
//! # Examples
//!
//! ```rust
//! use aotscope::file::io::{read_le_at, write_le_at};
//!
//! let mut data = [0u8; 6];
//! let mut offset = 0;
//! write_le_at::<u16>(&mut data, &mut offset, 0x1234)?;
//! write_le_at::<i32>(&mut data, &mut offset, -2)?;
//!
//! let mut offset = 0;
//! assert_eq!(read_le_at::<u16>(&data, &mut offset)?, 0x1234);
//! assert_eq!(read_le_at::<i32>(&data, &mut offset)?, -2);
//! # Ok::<(), aotscope::Error>(())
//! ```

use crate::Result;

/// Trait for primitive types that can be converted from and to little-endian bytes.
pub trait RawIO: Sized + Copy {
    /// The fixed-size byte array backing this type
    type Bytes: Sized + AsRef<[u8]> + for<'a> TryFrom<&'a [u8]>;

    /// Build the value from its little-endian representation
    fn from_le_bytes(bytes: Self::Bytes) -> Self;

    /// Produce the little-endian representation of the value
    fn to_le_bytes(self) -> Self::Bytes;
}

macro_rules! impl_raw_io {
    ($($ty:ty => $len:literal),* $(,)?) => {
        $(
            impl RawIO for $ty {
                type Bytes = [u8; $len];

                fn from_le_bytes(bytes: Self::Bytes) -> Self {
                    <$ty>::from_le_bytes(bytes)
                }

                fn to_le_bytes(self) -> Self::Bytes {
                    <$ty>::to_le_bytes(self)
                }
            }
        )*
    };
}

impl_raw_io! {
    u8 => 1,
    i8 => 1,
    u16 => 2,
    i16 => 2,
    u32 => 4,
    i32 => 4,
    u64 => 8,
    i64 => 8,
}

/// Read a `T` from the start of `data`.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if `data` is shorter than `T`.
pub fn read_le<T: RawIO>(data: &[u8]) -> Result<T> {
    let mut offset = 0_usize;
    read_le_at(data, &mut offset)
}

/// Read a `T` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the read exceeds `data`.
pub fn read_le_at<T: RawIO>(data: &[u8], offset: &mut usize) -> Result<T> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    let Ok(read) = data[*offset..end].try_into() else {
        return Err(out_of_bounds_error!());
    };

    *offset = end;
    Ok(T::from_le_bytes(read))
}

/// Write `value` at `offset` and advance `offset` past it.
///
/// # Errors
/// Returns [`crate::Error::OutOfBounds`] if the write exceeds `data`.
pub fn write_le_at<T: RawIO>(data: &mut [u8], offset: &mut usize, value: T) -> Result<()> {
    let type_len = std::mem::size_of::<T>();
    let Some(end) = offset.checked_add(type_len) else {
        return Err(out_of_bounds_error!());
    };
    if end > data.len() {
        return Err(out_of_bounds_error!());
    }

    data[*offset..end].copy_from_slice(value.to_le_bytes().as_ref());
    *offset = end;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEST_BUFFER: [u8; 8] = [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08];

    #[test]
    fn read_le_u32() {
        let result = read_le::<u32>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x04030201);
    }

    #[test]
    fn read_le_i64() {
        let result = read_le::<i64>(&TEST_BUFFER).unwrap();
        assert_eq!(result, 0x0807060504030201);
    }

    #[test]
    fn read_le_at_advances() {
        let mut offset = 2;
        assert_eq!(read_le_at::<u16>(&TEST_BUFFER, &mut offset).unwrap(), 0x0403);
        assert_eq!(offset, 4);
        assert_eq!(read_le_at::<i8>(&TEST_BUFFER, &mut offset).unwrap(), 5);
        assert_eq!(offset, 5);
    }

    #[test]
    fn read_past_end() {
        let mut offset = 6;
        assert!(matches!(
            read_le_at::<u32>(&TEST_BUFFER, &mut offset),
            Err(crate::Error::OutOfBounds { .. })
        ));
        assert_eq!(offset, 6);

        let mut offset = usize::MAX;
        assert!(read_le_at::<u8>(&TEST_BUFFER, &mut offset).is_err());
    }

    #[test]
    fn write_negative_i32() {
        let mut buffer = [0u8; 4];
        let mut offset = 0;
        write_le_at::<i32>(&mut buffer, &mut offset, -0x808).unwrap();
        assert_eq!(buffer, [0xF8, 0xF7, 0xFF, 0xFF]);
        assert_eq!(offset, 4);

        assert!(write_le_at::<u8>(&mut buffer, &mut offset, 1).is_err());
    }
}
