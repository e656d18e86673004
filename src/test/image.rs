use crate::{
    image::{
        header::{RuntimeHeader, SectionInfo, SectionType},
        FlatImage, PointerWidth,
    },
    nativeformat::{encode_unsigned, hashtable::NativeHashtableBuilder},
    runtime::rehydrate::MAX_SHORT_PAYLOAD,
};

/// Preferred load address of every synthetic image
pub const IMAGE_BASE: u64 = 0x1_4000_0000;

/// A minimal PE32+ file: one section at RVA 0x1000 holding `payload`, with a virtual size
/// larger than its raw data.
pub fn build_pe(machine: u16, payload: &[u8]) -> Vec<u8> {
    let raw_size = payload.len().max(1).div_ceil(0x200) * 0x200;
    let virtual_size = raw_size.max(0x1000).div_ceil(0x1000) * 0x1000;
    build_pe_sections(machine, &[(virtual_size as u32, payload)])
}

/// A minimal PE32+ file with `sections` laid out back to back from RVA 0x1000. Each entry is
/// the section's virtual size and its raw content, padded to the file alignment.
pub fn build_pe_sections(machine: u16, sections: &[(u32, &[u8])]) -> Vec<u8> {
    const PE_OFFSET: usize = 0x80;
    const HEADERS: usize = 0x400;
    const NAMES: [&[u8; 8]; 4] = [b".text\0\0\0", b".data\0\0\0", b".rdata\0\0", b".pdata\0\0"];

    let mut out = vec![0u8; HEADERS];
    out[0..2].copy_from_slice(b"MZ");
    out[0x3C..0x40].copy_from_slice(&(PE_OFFSET as u32).to_le_bytes());

    let raw_sizes: Vec<usize> = sections
        .iter()
        .map(|(_, payload)| payload.len().max(1).div_ceil(0x200) * 0x200)
        .collect();
    let image_end = 0x1000 + sections.iter().map(|(size, _)| *size).sum::<u32>();

    let mut header = Vec::new();
    header.extend_from_slice(b"PE\0\0");
    // COFF header
    header.extend_from_slice(&machine.to_le_bytes());
    header.extend_from_slice(&(sections.len() as u16).to_le_bytes());
    header.extend_from_slice(&[0u8; 12]);
    header.extend_from_slice(&0xF0u16.to_le_bytes());
    header.extend_from_slice(&0x0022u16.to_le_bytes());
    // Optional header, standard fields
    header.extend_from_slice(&0x020Bu16.to_le_bytes());
    header.extend_from_slice(&[14, 0]);
    header.extend_from_slice(&(raw_sizes[0] as u32).to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&0x1000u32.to_le_bytes());
    header.extend_from_slice(&0x1000u32.to_le_bytes());
    // Windows fields
    header.extend_from_slice(&IMAGE_BASE.to_le_bytes());
    header.extend_from_slice(&0x200u32.to_le_bytes());
    header.extend_from_slice(&0x200u32.to_le_bytes());
    header.extend_from_slice(&6u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&6u16.to_le_bytes());
    header.extend_from_slice(&0u16.to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&image_end.to_le_bytes());
    header.extend_from_slice(&(HEADERS as u32).to_le_bytes());
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&3u16.to_le_bytes());
    header.extend_from_slice(&0x8160u16.to_le_bytes());
    for reserve in [0x10_0000u64, 0x1000, 0x10_0000, 0x1000] {
        header.extend_from_slice(&reserve.to_le_bytes());
    }
    header.extend_from_slice(&0u32.to_le_bytes());
    header.extend_from_slice(&16u32.to_le_bytes());
    header.extend_from_slice(&[0u8; 16 * 8]);
    // Section table
    let mut rva = 0x1000u32;
    let mut offset = HEADERS as u32;
    for (index, ((virtual_size, _), raw_size)) in sections.iter().zip(&raw_sizes).enumerate() {
        header.extend_from_slice(NAMES[index % NAMES.len()]);
        header.extend_from_slice(&virtual_size.to_le_bytes());
        header.extend_from_slice(&rva.to_le_bytes());
        header.extend_from_slice(&(*raw_size as u32).to_le_bytes());
        header.extend_from_slice(&offset.to_le_bytes());
        header.extend_from_slice(&[0u8; 12]);
        header.extend_from_slice(&0x6000_0020u32.to_le_bytes());
        rva += virtual_size;
        offset += *raw_size as u32;
    }

    out[PE_OFFSET..PE_OFFSET + header.len()].copy_from_slice(&header);

    for ((_, payload), raw_size) in sections.iter().zip(&raw_sizes) {
        let mut section = payload.to_vec();
        section.resize(*raw_size, 0);
        out.extend_from_slice(&section);
    }
    out
}

/// Encoder for dehydrated command streams.
///
/// The stream starts at `stream_address` and reconstructs a heap at `heap_address`. Fixup
/// cells for the table relocations are laid out right after the stream.
#[derive(Debug, Clone)]
pub struct DehydratedStreamBuilder {
    stream_address: u64,
    heap_address: u64,
    commands: Vec<u8>,
    fixups: Vec<u64>,
}

impl DehydratedStreamBuilder {
    pub fn new(stream_address: u64, heap_address: u64) -> Self {
        DehydratedStreamBuilder {
            stream_address,
            heap_address,
            commands: Vec::new(),
            fixups: Vec::new(),
        }
    }

    fn command(&mut self, opcode: u8, payload: u32) {
        if payload <= MAX_SHORT_PAYLOAD {
            self.commands.push(opcode | (payload as u8) << 3);
            return;
        }

        let extended = payload - MAX_SHORT_PAYLOAD;
        let bytes = extended.to_le_bytes();
        let extra = match extended {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            _ => 3,
        };
        self.commands
            .push(opcode | ((MAX_SHORT_PAYLOAD + extra) as u8) << 3);
        self.commands.extend_from_slice(&bytes[..extra as usize]);
    }

    pub fn copy(mut self, bytes: &[u8]) -> Self {
        self.command(0, bytes.len() as u32);
        self.commands.extend_from_slice(bytes);
        self
    }

    pub fn zero_fill(mut self, count: u32) -> Self {
        self.command(1, count);
        self
    }

    /// A 32-bit relative pointer to `target`, through a fixup cell
    pub fn relative_reloc(mut self, target: u64) -> Self {
        let index = self.fixups.len() as u32;
        self.fixups.push(target);
        self.command(2, index);
        self
    }

    /// A full-width pointer to `target`, through a fixup cell
    pub fn pointer_reloc(mut self, target: u64) -> Self {
        let index = self.fixups.len() as u32;
        self.fixups.push(target);
        self.command(3, index);
        self
    }

    pub fn stream_address(&self) -> u64 {
        self.stream_address
    }

    /// The stream bytes, heap offset included, and the fixup cells that follow them
    pub fn encode(&self) -> (Vec<u8>, Vec<u8>) {
        let heap_offset = self.heap_address as i64 - self.stream_address as i64;
        let mut stream = (heap_offset as i32).to_le_bytes().to_vec();
        stream.extend_from_slice(&self.commands);

        let fixup_base = self.stream_address + stream.len() as u64;
        let mut cells = Vec::with_capacity(self.fixups.len() * 4);
        for (index, target) in self.fixups.iter().enumerate() {
            let cell = fixup_base + 4 * index as u64;
            let delta = *target as i64 - cell as i64;
            cells.extend_from_slice(&(delta as i32).to_le_bytes());
        }
        (stream, cells)
    }

    /// A flat image holding only the stream and its cells, and the stream's section entry
    pub fn build(&self, width: PointerWidth) -> (FlatImage, SectionInfo) {
        let (stream, cells) = self.encode();
        let mut data = stream.clone();
        data.extend_from_slice(&cells);
        data.resize(data.len() + 0x10, 0);

        let image = FlatImage::new(self.stream_address, data, width);
        let section = SectionInfo {
            id: SectionType::DehydratedData as u32,
            flags: 1,
            start: self.stream_address,
            end: self.stream_address + stream.len() as u64,
        };
        (image, section)
    }
}

/// The bytes of a type descriptor: fixed header, then vtable and interface pointers
pub fn descriptor_bytes(
    width: PointerWidth,
    flags: u32,
    base_size: u32,
    related: u64,
    hash: u32,
    vtable: &[u64],
    interfaces: &[u64],
) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&flags.to_le_bytes());
    bytes.extend_from_slice(&base_size.to_le_bytes());
    bytes.extend(width.encode(related));
    bytes.extend_from_slice(&(vtable.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&(interfaces.len() as u16).to_le_bytes());
    bytes.extend_from_slice(&hash.to_le_bytes());
    for pointer in vtable.iter().chain(interfaces) {
        bytes.extend(width.encode(*pointer));
    }
    bytes
}

/// A string object: type pointer, UTF-16 length, UTF-16 text
pub fn string_object(width: PointerWidth, type_pointer: u64, text: &str) -> Vec<u8> {
    let units: Vec<u16> = text.encode_utf16().collect();
    let mut bytes = width.encode(type_pointer);
    bytes.extend_from_slice(&(units.len() as i32).to_le_bytes());
    for unit in units {
        bytes.extend_from_slice(&unit.to_le_bytes());
    }
    bytes
}

/// Payload of one invoke map entry that carries a metadata handle
pub fn invoke_entry(flags: u32, method: u32, declaring_type: u32, entry: u32) -> Vec<u8> {
    let mut bytes = Vec::new();
    encode_unsigned(&mut bytes, flags);
    encode_unsigned(&mut bytes, method);
    encode_unsigned(&mut bytes, declaring_type);
    encode_unsigned(&mut bytes, entry);
    bytes
}

/// Lays out a complete synthetic image: runtime header at 0x1000, sections after it.
pub struct AotImageBuilder {
    width: PointerWidth,
    image: FlatImage,
    sections: Vec<SectionInfo>,
    cursor: u64,
}

impl AotImageBuilder {
    const BASE: u64 = 0x1000;
    const SIZE: usize = 0x2000;
    const HEADER_AREA: u64 = 0x200;

    pub fn new(width: PointerWidth) -> Self {
        AotImageBuilder {
            width,
            image: FlatImage::zeroed(Self::BASE, Self::SIZE, width)
                .with_image_base(IMAGE_BASE)
                .with_entry_point(Self::BASE),
            sections: Vec::new(),
            cursor: Self::BASE + Self::HEADER_AREA,
        }
    }

    /// Where the next placed bytes will start
    pub fn next_address(&self) -> u64 {
        self.cursor.div_ceil(0x10) * 0x10
    }

    fn place(&mut self, bytes: &[u8]) -> u64 {
        let start = self.next_address();
        self.image
            .patch(start, bytes)
            .expect("synthetic image is large enough");
        self.cursor = start + bytes.len() as u64;
        start
    }

    fn record(&mut self, kind: SectionType, start: u64, end: u64) -> SectionInfo {
        let info = SectionInfo {
            id: kind as u32,
            flags: 1,
            start,
            end,
        };
        self.sections.push(info);
        info
    }

    /// Place `bytes` as section `kind`
    pub fn section(&mut self, kind: SectionType, bytes: &[u8]) -> SectionInfo {
        let start = self.place(bytes);
        self.record(kind, start, start + bytes.len() as u64)
    }

    /// Place a dehydrated stream; it must have been created at [`Self::next_address`]
    pub fn dehydrated(&mut self, stream: &DehydratedStreamBuilder) -> SectionInfo {
        assert_eq!(stream.stream_address(), self.next_address());
        let (bytes, cells) = stream.encode();
        let start = self.place(&bytes);
        let end = start + bytes.len() as u64;
        if !cells.is_empty() {
            self.image
                .patch(end, &cells)
                .expect("synthetic image is large enough");
            self.cursor = end + cells.len() as u64;
        }
        self.record(SectionType::DehydratedData, start, end)
    }

    /// A common fixups table with one cell per target
    pub fn fixups(&mut self, targets: &[u64]) -> SectionInfo {
        let start = self.next_address();
        let mut cells = Vec::new();
        for (index, target) in targets.iter().enumerate() {
            let cell = start + 4 * index as u64;
            cells.extend_from_slice(&((*target as i64 - cell as i64) as i32).to_le_bytes());
        }
        self.section(SectionType::CommonFixupsTable, &cells)
    }

    /// An invoke map holding `entries`
    pub fn invoke_map(&mut self, entries: &[Vec<u8>]) -> SectionInfo {
        let mut table = NativeHashtableBuilder::new(2);
        for (index, entry) in entries.iter().enumerate() {
            table.add(0x4000_0100 + index as u32 * 0x100, entry.clone());
        }
        self.section(SectionType::InvokeMap, &table.build())
    }

    /// Write the header and section directory; returns the image and the header address
    pub fn finish(mut self) -> (FlatImage, u64) {
        let mut header = Vec::new();
        header.extend_from_slice(&RuntimeHeader::SIGNATURE.to_le_bytes());
        header.extend_from_slice(&9u16.to_le_bytes());
        header.extend_from_slice(&0u16.to_le_bytes());
        header.extend_from_slice(&0u32.to_le_bytes());
        header.extend_from_slice(&(self.sections.len() as u16).to_le_bytes());
        header.push(SectionInfo::entry_size(self.width) as u8);
        header.push(1);

        for section in &self.sections {
            header.extend_from_slice(&section.id.to_le_bytes());
            header.extend_from_slice(&section.flags.to_le_bytes());
            header.extend(self.width.encode(section.start + IMAGE_BASE));
            header.extend(self.width.encode(section.end + IMAGE_BASE));
        }
        assert!(header.len() as u64 <= Self::HEADER_AREA);

        self.image
            .patch(Self::BASE, &header)
            .expect("synthetic image is large enough");
        (self.image, Self::BASE)
    }
}
