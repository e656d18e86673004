//! NativeFormat hashtables.
//!
//! A hashtable starts with one header byte: the upper six bits hold the log2 of the bucket
//! count, the lower two bits select the width of the bucket index (`0` = 1 byte, `1` = 2 bytes,
//! `2` = 4 bytes). The bucket index follows the header and holds `buckets + 1` offsets relative
//! to the first byte after the header; bucket `i` spans `[index[i], index[i + 1])`.
//!
//! Every entry inside a bucket is the low byte of the entry's hash code followed by a signed
//! relative offset to the entry payload. The payload format belongs to the table's user.

use crate::{
    nativeformat::{encode_signed_fixed, NativeParser, NativeReader},
    Result,
};

/// A decoded hashtable header.
#[derive(Debug, Clone, Copy)]
pub struct NativeHashtable<'a> {
    reader: NativeReader<'a>,
    base_offset: u32,
    bucket_mask: u32,
    entry_index_size: u8,
}

impl<'a> NativeHashtable<'a> {
    /// Read the header at the parser's position
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] if the header is missing, or a format error for an
    /// invalid bucket shift or index width.
    pub fn new(mut parser: NativeParser<'a>) -> Result<Self> {
        let header = parser.get_u8()?;
        let bucket_shift = u32::from(header >> 2);
        if bucket_shift > 31 {
            return Err(malformed_error!("Invalid hashtable bucket shift {}", bucket_shift));
        }

        let entry_index_size = header & 0x03;
        if entry_index_size > 2 {
            return Err(malformed_error!(
                "Invalid hashtable index size {}",
                entry_index_size
            ));
        }

        Ok(NativeHashtable {
            reader: parser.reader(),
            base_offset: parser.offset(),
            bucket_mask: (1u32 << bucket_shift) - 1,
            entry_index_size,
        })
    }

    /// Number of buckets
    #[must_use]
    pub fn bucket_count(&self) -> u64 {
        u64::from(self.bucket_mask) + 1
    }

    /// Absolute `[start, end)` offsets of the entries in `bucket`
    fn bucket_bounds(&self, bucket: u32) -> Result<(u32, u32)> {
        let (start, end) = match self.entry_index_size {
            0 => {
                let offset = self.base_offset + bucket;
                let (start, next) = self.reader.read_u8(offset)?;
                let (end, _) = self.reader.read_u8(next)?;
                (u32::from(start), u32::from(end))
            }
            1 => {
                let offset = self.base_offset + 2 * bucket;
                let (start, next) = self.reader.read_u16(offset)?;
                let (end, _) = self.reader.read_u16(next)?;
                (u32::from(start), u32::from(end))
            }
            _ => {
                let offset = self.base_offset + 4 * bucket;
                let (start, next) = self.reader.read_u32(offset)?;
                let (end, _) = self.reader.read_u32(next)?;
                (start, end)
            }
        };

        match (
            self.base_offset.checked_add(start),
            self.base_offset.checked_add(end),
        ) {
            (Some(start), Some(end)) => Ok((start, end)),
            _ => Err(out_of_bounds_error!()),
        }
    }

    /// Iterate the payload parsers of every entry, bucket by bucket
    #[must_use]
    pub fn entries(&self) -> AllEntries<'a> {
        AllEntries {
            table: *self,
            bucket: 0,
            parser: None,
            end_offset: 0,
            done: false,
        }
    }

    /// Payload parsers of the entries whose hash code may equal `hash`
    ///
    /// # Errors
    /// Returns [`crate::Error::OutOfBounds`] or a format error for a corrupt bucket.
    pub fn lookup(&self, hash: u32) -> Result<Vec<NativeParser<'a>>> {
        let (start, end) = self.bucket_bounds((hash >> 8) & self.bucket_mask)?;
        let low_hash = hash.to_le_bytes()[0];

        let mut parser = NativeParser::new(self.reader, start);
        let mut found = Vec::new();
        while parser.offset() < end {
            let entry_hash = parser.get_u8()?;
            let payload = parser.get_parser_from_relative_offset()?;
            if entry_hash == low_hash {
                found.push(payload);
            }
        }
        Ok(found)
    }
}

/// Iterator over all entries of a [`NativeHashtable`].
///
/// Stops after the first error.
#[derive(Debug)]
pub struct AllEntries<'a> {
    table: NativeHashtable<'a>,
    bucket: u32,
    parser: Option<NativeParser<'a>>,
    end_offset: u32,
    done: bool,
}

impl<'a> Iterator for AllEntries<'a> {
    type Item = Result<NativeParser<'a>>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }

            if self.parser.is_none() {
                match self.table.bucket_bounds(self.bucket) {
                    Ok((start, end)) => {
                        self.end_offset = end;
                        self.parser = Some(NativeParser::new(self.table.reader, start));
                    }
                    Err(error) => {
                        self.done = true;
                        return Some(Err(error));
                    }
                }
            }

            let end_offset = self.end_offset;
            if let Some(parser) = self.parser.as_mut() {
                if parser.offset() < end_offset {
                    let entry = parser
                        .get_u8()
                        .and_then(|_| parser.get_parser_from_relative_offset());
                    if entry.is_err() {
                        self.done = true;
                    }
                    return Some(entry);
                }
            }

            if self.bucket >= self.table.bucket_mask {
                self.done = true;
                return None;
            }
            self.bucket += 1;
            self.parser = None;
        }
    }
}

/// Writes hashtables in the layout read by [`NativeHashtable`].
///
/// The bucket index always uses 4-byte offsets and every entry a 5-byte relative offset, so
/// the layout is computed in one pass. Payloads are stored after the entries, in insertion
/// order.
///
/// # Examples
///
/// ```rust
/// use aotscope::nativeformat::{
///     encode_unsigned, hashtable::{NativeHashtable, NativeHashtableBuilder},
///     NativeParser, NativeReader,
/// };
///
/// let mut payload = Vec::new();
/// encode_unsigned(&mut payload, 42);
///
/// let mut builder = NativeHashtableBuilder::new(2);
/// builder.add(0x1234, payload);
/// let bytes = builder.build();
///
/// let table = NativeHashtable::new(NativeParser::new(NativeReader::new(&bytes), 0))?;
/// let mut entries = table.entries();
/// assert_eq!(entries.next().unwrap()?.get_unsigned()?, 42);
/// assert!(entries.next().is_none());
/// # Ok::<(), aotscope::Error>(())
/// ```
#[derive(Debug, Clone, Default)]
pub struct NativeHashtableBuilder {
    bucket_shift: u8,
    entries: Vec<(u32, Vec<u8>)>,
}

impl NativeHashtableBuilder {
    /// A table with `1 << bucket_shift` buckets; the shift is capped at 16
    #[must_use]
    pub fn new(bucket_shift: u8) -> Self {
        NativeHashtableBuilder {
            bucket_shift: bucket_shift.min(16),
            entries: Vec::new(),
        }
    }

    /// Add an entry with an already encoded payload
    pub fn add(&mut self, hash: u32, payload: Vec<u8>) -> &mut Self {
        self.entries.push((hash, payload));
        self
    }

    /// Number of entries added
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no entry was added
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize the table
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn build(&self) -> Vec<u8> {
        const ENTRY_SIZE: usize = 6;

        let buckets = 1usize << self.bucket_shift;
        let mask = (buckets - 1) as u32;

        let mut order: Vec<usize> = (0..self.entries.len()).collect();
        order.sort_by_key(|&index| (self.entries[index].0 >> 8) & mask);

        let index_size = 4 * (buckets + 1);
        let entries_start = 1 + index_size;
        let payloads_start = entries_start + ENTRY_SIZE * self.entries.len();

        let mut payload_offsets = Vec::with_capacity(self.entries.len());
        let mut next_payload = payloads_start;
        for (_, payload) in &self.entries {
            payload_offsets.push(next_payload);
            next_payload += payload.len();
        }

        let mut out = Vec::with_capacity(next_payload);
        out.push((self.bucket_shift << 2) | 0x02);

        let mut cursor = 0usize;
        for bucket in 0..=buckets {
            while cursor < order.len()
                && (((self.entries[order[cursor]].0 >> 8) & mask) as usize) < bucket
            {
                cursor += 1;
            }
            let relative = (entries_start + ENTRY_SIZE * cursor - 1) as u32;
            out.extend_from_slice(&relative.to_le_bytes());
        }

        for &index in &order {
            let (hash, _) = &self.entries[index];
            out.push(hash.to_le_bytes()[0]);
            let delta = payload_offsets[index] as i64 - out.len() as i64;
            encode_signed_fixed(&mut out, delta as i32);
        }

        for (_, payload) in &self.entries {
            out.extend_from_slice(payload);
        }
        out
    }
}
