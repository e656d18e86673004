//! Synthetic NativeAOT images built through the public API.

#![allow(dead_code)]

use aotscope::{
    image::{
        header::{RuntimeHeader, SectionInfo, SectionType},
        PointerWidth,
    },
    nativeformat::{encode_unsigned, hashtable::NativeHashtableBuilder},
    runtime::rehydrate::MAX_SHORT_PAYLOAD,
};

pub const IMAGE_BASE: u64 = 0x1_4000_0000;
pub const TEXT_RVA: u64 = 0x1000;
pub const TEXT_SIZE: usize = 0x1000;
pub const HEADER_ADDRESS: u64 = TEXT_RVA;
pub const HEAP: u64 = 0x8000;
pub const CODE: u64 = 0x1F00;
pub const DECLARING_TYPE: u64 = 0x1_0000;

const WIDTH: PointerWidth = PointerWidth::Eight;

/// Content of a `.text` section at [`TEXT_RVA`]: runtime header and its sections
pub struct TextBuilder {
    data: Vec<u8>,
    sections: Vec<SectionInfo>,
    cursor: u64,
}

impl TextBuilder {
    pub fn new() -> Self {
        TextBuilder {
            data: vec![0; TEXT_SIZE],
            sections: Vec::new(),
            cursor: TEXT_RVA + 0x100,
        }
    }

    pub fn section(&mut self, kind: SectionType, bytes: &[u8]) -> &mut Self {
        let start = self.cursor.div_ceil(0x10) * 0x10;
        self.write(start, bytes);
        self.sections.push(SectionInfo {
            id: kind as u32,
            flags: 1,
            start,
            end: start + bytes.len() as u64,
        });
        self.cursor = start + bytes.len() as u64;
        self
    }

    /// A copy-only dehydrated stream that reconstructs `heap` at [`HEAP`]
    pub fn dehydrated(&mut self, heap: &[u8]) -> &mut Self {
        let start = self.cursor.div_ceil(0x10) * 0x10;
        let mut stream = ((HEAP as i64 - start as i64) as i32).to_le_bytes().to_vec();
        for chunk in heap.chunks(0xFF) {
            copy_command(&mut stream, chunk);
        }
        self.section(SectionType::DehydratedData, &stream)
    }

    /// A dehydrated stream of raw command bytes
    pub fn raw_dehydrated(&mut self, commands: &[u8]) -> &mut Self {
        let start = self.cursor.div_ceil(0x10) * 0x10;
        let mut stream = ((HEAP as i64 - start as i64) as i32).to_le_bytes().to_vec();
        stream.extend_from_slice(commands);
        self.section(SectionType::DehydratedData, &stream)
    }

    /// Common fixup cells pointing at `targets`
    pub fn fixups(&mut self, targets: &[u64]) -> &mut Self {
        let start = self.cursor.div_ceil(0x10) * 0x10;
        let mut cells = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            let cell = start + 4 * index as u64;
            cells.extend_from_slice(&((*target as i64 - cell as i64) as i32).to_le_bytes());
        }
        self.section(SectionType::CommonFixupsTable, &cells)
    }

    pub fn invoke_map(&mut self, entries: &[Vec<u8>]) -> &mut Self {
        let mut table = NativeHashtableBuilder::new(1);
        for (index, entry) in entries.iter().enumerate() {
            table.add(0x0102_0304 * (index as u32 + 1), entry.clone());
        }
        let bytes = table.build();
        self.section(SectionType::InvokeMap, &bytes)
    }

    /// Write the runtime header at [`HEADER_ADDRESS`] and return the section bytes
    pub fn finish(&mut self) -> Vec<u8> {
        let mut header = Vec::new();
        header.extend_from_slice(&RuntimeHeader::SIGNATURE.to_le_bytes());
        header.extend_from_slice(&9u16.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&(self.sections.len() as u16).to_le_bytes());
        header.push(SectionInfo::entry_size(WIDTH) as u8);
        header.push(1);
        for section in &self.sections {
            header.extend_from_slice(&section.id.to_le_bytes());
            header.extend_from_slice(&section.flags.to_le_bytes());
            header.extend(WIDTH.encode(section.start + IMAGE_BASE));
            header.extend(WIDTH.encode(section.end + IMAGE_BASE));
        }
        assert!(header.len() <= 0x100);
        self.write(HEADER_ADDRESS, &header);
        self.data.clone()
    }

    fn write(&mut self, address: u64, bytes: &[u8]) {
        let offset = (address - TEXT_RVA) as usize;
        self.data[offset..offset + bytes.len()].copy_from_slice(bytes);
    }
}

fn copy_command(out: &mut Vec<u8>, bytes: &[u8]) {
    let len = bytes.len() as u32;
    if len <= MAX_SHORT_PAYLOAD {
        out.push((len as u8) << 3);
    } else {
        out.push(((MAX_SHORT_PAYLOAD + 1) as u8) << 3);
        out.push((len - MAX_SHORT_PAYLOAD) as u8);
    }
    out.extend_from_slice(bytes);
}

/// A class descriptor with a single vtable slot pointing at [`CODE`]
pub fn class_descriptor(hash: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&0x5000_0000u32.to_le_bytes());
    bytes.extend_from_slice(&0x18u32.to_le_bytes());
    bytes.extend(WIDTH.encode(0));
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes.extend_from_slice(&hash.to_le_bytes());
    bytes.extend(WIDTH.encode(CODE));
    bytes
}

/// An invoke map entry: flags, method handle offset, two fixup indices
pub fn invoke_entry(flags: u32, method: u32, declaring_type: u32, entry: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    for value in [flags, method, declaring_type, entry] {
        encode_unsigned(&mut bytes, value);
    }
    bytes
}

/// Wrap a `.text` payload at [`TEXT_RVA`] into a minimal PE32+ file
pub fn build_pe(text: &[u8]) -> Vec<u8> {
    const PE_OFFSET: usize = 0x80;
    const HEADERS: usize = 0x200;

    let raw_size = text.len().div_ceil(0x200) * 0x200;
    let virtual_size = raw_size.div_ceil(0x1000) * 0x1000;

    let mut out = vec![0u8; HEADERS];
    out[0..2].copy_from_slice(b"MZ");
    out[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

    let mut pe = Vec::new();
    pe.extend_from_slice(b"PE\0\0");
    pe.extend_from_slice(&0x8664u16.to_le_bytes());
    pe.extend_from_slice(&1u16.to_le_bytes());
    pe.extend_from_slice(&[0u8; 12]);
    pe.extend_from_slice(&0xF0u16.to_le_bytes());
    pe.extend_from_slice(&0x0022u16.to_le_bytes());

    pe.extend_from_slice(&0x020Bu16.to_le_bytes());
    pe.extend_from_slice(&[14, 0]);
    pe.extend_from_slice(&(raw_size as u32).to_le_bytes());
    pe.extend_from_slice(&[0u8; 8]);
    pe.extend_from_slice(&(TEXT_RVA as u32).to_le_bytes());
    pe.extend_from_slice(&(TEXT_RVA as u32).to_le_bytes());
    pe.extend_from_slice(&IMAGE_BASE.to_le_bytes());
    pe.extend_from_slice(&0x1000u32.to_le_bytes());
    pe.extend_from_slice(&0x200u32.to_le_bytes());
    for version in [6u16, 0, 0, 0, 6, 0] {
        pe.extend_from_slice(&version.to_le_bytes());
    }
    pe.extend_from_slice(&0u32.to_le_bytes());
    pe.extend_from_slice(&((TEXT_RVA as usize + virtual_size) as u32).to_le_bytes());
    pe.extend_from_slice(&(HEADERS as u32).to_le_bytes());
    pe.extend_from_slice(&0u32.to_le_bytes());
    pe.extend_from_slice(&3u16.to_le_bytes());
    pe.extend_from_slice(&0x8160u16.to_le_bytes());
    for reserve in [0x10_0000u64, 0x1000, 0x10_0000, 0x1000] {
        pe.extend_from_slice(&reserve.to_le_bytes());
    }
    pe.extend_from_slice(&0u32.to_le_bytes());
    pe.extend_from_slice(&16u32.to_le_bytes());
    pe.extend_from_slice(&[0u8; 16 * 8]);

    pe.extend_from_slice(b".text\0\0\0");
    pe.extend_from_slice(&(virtual_size as u32).to_le_bytes());
    pe.extend_from_slice(&(TEXT_RVA as u32).to_le_bytes());
    pe.extend_from_slice(&(raw_size as u32).to_le_bytes());
    pe.extend_from_slice(&(HEADERS as u32).to_le_bytes());
    pe.extend_from_slice(&[0u8; 12]);
    pe.extend_from_slice(&0x6000_0020u32.to_le_bytes());

    out[PE_OFFSET..PE_OFFSET + pe.len()].copy_from_slice(&pe);

    let mut section = text.to_vec();
    section.resize(raw_size, 0);
    out.extend_from_slice(&section);
    out
}
