//! The analysis session over one NativeAOT image.
//!
//! [`AotObject`] runs the pipeline in its fixed order and keeps every per-run index:
//!
//! 1. runtime header and section directory
//! 2. heap reconstruction from the dehydrated data section
//! 3. string discovery in the heap
//! 4. metadata graph construction from the embedded metadata
//! 5. matching of type descriptors against resolved types
//! 6. entry point resolution through the invoke map
//!
//! Stages 1 to 3 only need the image and run in [`AotObject::new`]. Stages 4 to 6 need a
//! metadata reader and run in [`AotObject::load_metadata`]. [`AotObject::load`] does both and
//! hands the embedded metadata bytes to a caller supplied reader factory.
//!
//! Format errors abort the run. Heuristic misses never do: a type without a descriptor or an
//! image without strings simply produce empty results.
//!
//! # Examples
//!
//! ```rust,no_run
//! use aotscope::prelude::*;
//! use std::{path::Path, sync::Arc};
//!
//! let file = PeFile::from_file(Path::new("app.exe"))?;
//! let object = AotObject::new(Arc::new(file), 0x2_1F40, AnalysisOptions::default())?;
//!
//! for section in object.sections().iter() {
//!     println!("{} {:#x}..{:#x}", section.id, section.start, section.end);
//! }
//! println!("{} strings", object.strings().len());
//! # Ok::<(), aotscope::Error>(())
//! ```

mod invokemap;
mod options;
mod typetable;

pub use invokemap::{InvokeMapEntry, InvokeMapResolver, InvokeTableFlags, ResolvedInvoke};
pub use options::AnalysisOptions;
pub use typetable::TypeTable;

use std::{collections::BTreeMap, path::Path, sync::Arc};

use crate::{
    file::PeFile,
    image::{
        address::{AddressSpace, Heap},
        header::{RuntimeHeader, SectionDirectory, SectionType},
        ImageSource,
    },
    metadata::{
        graph::{AssemblyDefRc, FieldDefRc, MetadataGraph, MethodDefRc, TypeDefRc},
        reader::MetadataReader,
    },
    runtime::{descriptor::TypeDescriptorRc, rehydrate::rehydrate, scanner::StructuralScanner},
    Result,
};

/// One analysed NativeAOT image.
///
/// `AotObject` owns everything a run produces: the runtime header, the section directory, the
/// address space with its reconstructed heap, the discovered strings, the metadata graph and
/// the indices that tie descriptors and entry points to it. Results are read through the
/// accessors; nothing is recomputed on access.
///
/// The image is only ever read. The session holds it behind an [`Arc`], so several sessions
/// may analyse the same file with different options.
///
/// # Examples
///
/// ```rust,no_run
/// use aotscope::prelude::*;
/// use std::path::Path;
///
/// let object = AotObject::from_file(Path::new("app.exe"), 0x2_1F40, AnalysisOptions::default())?;
///
/// if let Some(heap) = object.heap() {
///     println!("Heap at {:#x}, {} bytes", heap.base(), heap.len());
/// }
/// for descriptor in object.descriptors().iter() {
///     println!("{:#x} hash {:#010x}", descriptor.address, descriptor.hash_code);
/// }
/// # Ok::<(), aotscope::Error>(())
/// ```
///
/// # Thread Safety
///
/// `AotObject` is [`Send`] and [`Sync`]. All accessors take `&self`; only
/// [`AotObject::load_metadata`] needs exclusive access.
pub struct AotObject {
    options: AnalysisOptions,
    header_address: u64,
    header: RuntimeHeader,
    sections: SectionDirectory,
    space: AddressSpace,
    strings: BTreeMap<u64, String>,
    graph: MetadataGraph,
    types: TypeTable,
    invokes: Vec<ResolvedInvoke>,
}

impl AotObject {
    /// Run the image-only stages: header, sections, heap reconstruction and string scan.
    ///
    /// An image without a dehydrated data section has no heap, and therefore no strings and
    /// no descriptors.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidSignature`] for a wrong header, a rehydration error for a
    /// corrupt stream, and lookup errors for unmapped structures.
    pub fn new(
        image: Arc<dyn ImageSource>,
        header_address: u64,
        options: AnalysisOptions,
    ) -> Result<AotObject> {
        let mut space = AddressSpace::new(image);

        let header = RuntimeHeader::read(&space, header_address)?;
        log::info!(
            "Found runtime header v{}.{} at {header_address:#x} with {} sections",
            header.major_version,
            header.minor_version,
            header.section_count
        );
        let sections = SectionDirectory::read(&space, &header, header_address)?;

        match sections.get(SectionType::DehydratedData) {
            Some(section) => {
                let heap = rehydrate(&space, section)?;
                space.set_heap(heap);
            }
            None => log::info!("No dehydrated data, continuing without a heap"),
        }

        let strings = if options.scan_strings {
            StructuralScanner::new(&space, &options).scan_strings()
        } else {
            BTreeMap::new()
        };

        Ok(AotObject {
            options,
            header_address,
            header,
            sections,
            space,
            strings,
            graph: MetadataGraph::default(),
            types: TypeTable::new(),
            invokes: Vec::new(),
        })
    }

    /// Memory-map the executable at `path` and run [`AotObject::new`] over it
    ///
    /// # Errors
    /// Returns container errors from [`PeFile::from_file`] and everything [`AotObject::new`]
    /// returns.
    pub fn from_file(path: &Path, header_address: u64, options: AnalysisOptions) -> Result<AotObject> {
        let file = PeFile::from_file(path)?;
        Self::new(Arc::new(file), header_address, options)
    }

    /// Run the whole pipeline.
    ///
    /// `reader_factory` receives the bytes of the embedded metadata section and returns the
    /// reader the graph is built from.
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingSection`] if the image has no embedded metadata, and any
    /// error of [`AotObject::new`], the factory or [`AotObject::load_metadata`].
    ///
    /// # Examples
    ///
    /// ```rust,no_run
    /// use aotscope::{metadata::memory::MemoryMetadata, prelude::*};
    /// use std::{path::Path, sync::Arc};
    ///
    /// fn decode(blob: &[u8]) -> aotscope::Result<MemoryMetadata> {
    ///     // Any MetadataReader over the embedded blob
    ///     # let _ = blob;
    ///     # unimplemented!()
    /// }
    ///
    /// let file = PeFile::from_file(Path::new("app.exe"))?;
    /// let object = AotObject::load(Arc::new(file), 0x2_1F40, AnalysisOptions::default(), decode)?;
    ///
    /// for invoke in object.invokes() {
    ///     println!("{} at {:#x}", invoke.method.name, invoke.entry_address);
    /// }
    /// # Ok::<(), aotscope::Error>(())
    /// ```
    pub fn load<R, F>(
        image: Arc<dyn ImageSource>,
        header_address: u64,
        options: AnalysisOptions,
        reader_factory: F,
    ) -> Result<AotObject>
    where
        R: MetadataReader,
        F: FnOnce(&[u8]) -> Result<R>,
    {
        let mut object = Self::new(image, header_address, options)?;
        let blob = object.section_bytes(SectionType::EmbeddedMetadata)?;
        let reader = reader_factory(&blob)?;
        object.load_metadata(&reader)?;
        Ok(object)
    }

    /// Build the metadata graph, match descriptors and resolve entry points.
    ///
    /// Replaces the results of an earlier call. Without an `InvokeMap` or `CommonFixupsTable`
    /// section, entry points stay unresolved.
    ///
    /// # Errors
    /// Returns reader errors and errors from a corrupt invoke map.
    pub fn load_metadata<R: MetadataReader + ?Sized>(&mut self, reader: &R) -> Result<()> {
        let graph = MetadataGraph::build(reader)?;

        let types = TypeTable::new();
        let scanner = StructuralScanner::new(&self.space, &self.options);
        types.match_types(&scanner, &graph.types(), self.options.parallel_type_matching);

        let invokes = match (
            self.sections.get(SectionType::InvokeMap),
            self.sections.get(SectionType::CommonFixupsTable),
        ) {
            (Some(invoke_map), Some(fixups)) => {
                InvokeMapResolver::new(&self.space, invoke_map, fixups).resolve(&graph, reader)?
            }
            _ => {
                log::warn!("No invoke map or common fixups table, entry points stay unresolved");
                Vec::new()
            }
        };

        self.graph = graph;
        self.types = types;
        self.invokes = invokes;
        Ok(())
    }

    /// Options this session runs with
    #[must_use]
    pub fn options(&self) -> &AnalysisOptions {
        &self.options
    }

    /// Address of the runtime header
    #[must_use]
    pub fn header_address(&self) -> u64 {
        self.header_address
    }

    /// The runtime header
    #[must_use]
    pub fn header(&self) -> &RuntimeHeader {
        &self.header
    }

    /// The section directory
    #[must_use]
    pub fn sections(&self) -> &SectionDirectory {
        &self.sections
    }

    /// The address space, with the heap attached if one was reconstructed
    #[must_use]
    pub fn space(&self) -> &AddressSpace {
        &self.space
    }

    /// The reconstructed heap
    #[must_use]
    pub fn heap(&self) -> Option<&Heap> {
        self.space.heap()
    }

    /// Discovered strings by object address
    #[must_use]
    pub fn strings(&self) -> &BTreeMap<u64, String> {
        &self.strings
    }

    /// The metadata graph; empty until metadata was loaded
    #[must_use]
    pub fn graph(&self) -> &MetadataGraph {
        &self.graph
    }

    /// Resolved assemblies
    #[must_use]
    pub fn assemblies(&self) -> &[AssemblyDefRc] {
        self.graph.assemblies()
    }

    /// Resolved type definitions
    #[must_use]
    pub fn types(&self) -> Vec<TypeDefRc> {
        self.graph.type_definitions()
    }

    /// Resolved methods
    #[must_use]
    pub fn methods(&self) -> Vec<MethodDefRc> {
        self.graph.methods()
    }

    /// Resolved fields
    #[must_use]
    pub fn fields(&self) -> Vec<FieldDefRc> {
        self.graph.fields()
    }

    /// Matched type descriptors.
    ///
    /// Only descriptors that a resolved type led to are recorded; the heap may hold more.
    #[must_use]
    pub fn descriptors(&self) -> &TypeTable {
        &self.types
    }

    /// The matched descriptor at `address`
    #[must_use]
    pub fn descriptor_by_address(&self, address: u64) -> Option<TypeDescriptorRc> {
        self.types.get_by_address(address)
    }

    /// The matched descriptor embedding `hash`
    #[must_use]
    pub fn descriptor_by_hash(&self, hash: u32) -> Option<TypeDescriptorRc> {
        self.types.get_by_hash(hash)
    }

    /// Methods whose entry point was found in the invoke map
    #[must_use]
    pub fn invokes(&self) -> &[ResolvedInvoke] {
        &self.invokes
    }

    /// The bytes of section `kind`
    ///
    /// # Errors
    /// Returns [`crate::Error::MissingSection`] if the section is absent, or a lookup error if
    /// its range is not mapped.
    pub fn section_bytes(&self, kind: SectionType) -> Result<Vec<u8>> {
        let section = self.sections.require(kind)?;
        let length = usize::try_from(section.len())
            .map_err(|_| malformed_error!("Section {kind} too large - {}", section.len()))?;
        self.space.read_bytes(section.start, length)
    }

    /// The compiler identification string, if the image carries one.
    ///
    /// The section is read up to its first NUL byte; content that is not UTF-8 yields `None`.
    #[must_use]
    pub fn compiler_identifier(&self) -> Option<String> {
        let bytes = self.section_bytes(SectionType::CompilerIdentifier).ok()?;
        let end = memchr::memchr(0, &bytes).unwrap_or(bytes.len());
        String::from_utf8(bytes[..end].to_vec()).ok()
    }
}

impl std::fmt::Debug for AotObject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AotObject")
            .field("header_address", &format_args!("{:#x}", self.header_address))
            .field("sections", &self.sections.len())
            .field("space", &self.space)
            .field("strings", &self.strings.len())
            .field("types", &self.graph.type_definitions().len())
            .field("descriptors", &self.types.len())
            .field("invokes", &self.invokes.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        image::PointerWidth,
        metadata::memory::MemoryMetadata,
        test::{
            descriptor_bytes, invoke_entry, string_object, widget_metadata, AotImageBuilder,
            DehydratedStreamBuilder, WidgetHandles,
        },
        Error,
    };

    const HEAP: u64 = 0x8000;
    const CODE: u64 = 0x1F00;
    const WIDGET_HASH: u32 = 0x4463_A2FB;
    const STRING_TYPE: u64 = 0x7_0040;

    struct Fixture {
        image: AotImageBuilder,
        metadata: MemoryMetadata,
        handles: WidgetHandles,
    }

    /// One type, one method, a heap holding the type's descriptor and optionally strings
    fn fixture(with_strings: bool, with_invoke_map: bool) -> Fixture {
        let (metadata, handles) = widget_metadata();
        let width = PointerWidth::Eight;
        let mut image = AotImageBuilder::new(width);

        let mut heap = descriptor_bytes(width, 0x5000_0000, 0x18, 0, WIDGET_HASH, &[CODE], &[]);
        if with_strings {
            let marker = AnalysisOptions::default().string_marker;
            heap.extend(string_object(width, STRING_TYPE, &marker));
            heap.extend(string_object(width, STRING_TYPE, "hello"));
        }
        let stream = DehydratedStreamBuilder::new(image.next_address(), HEAP).copy(&heap);
        image.dehydrated(&stream);

        image.section(SectionType::CompilerIdentifier, b"ILC 9.0\0\0\0");
        if with_invoke_map {
            let fixups = image.fixups(&[0x1_0000, CODE]);
            image.invoke_map(&[invoke_entry(0x24, handles.run.offset(), 0, 1)]);
            assert_eq!(fixups.len(), 8);
        }
        image.section(SectionType::EmbeddedMetadata, &[0xAA; 16]);

        Fixture {
            image,
            metadata,
            handles,
        }
    }

    #[test]
    fn session_is_shareable() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<AotObject>();
    }

    #[test]
    fn full_pipeline() {
        let Fixture {
            image,
            metadata,
            handles,
        } = fixture(true, true);
        let (image, header_address) = image.finish();

        let mut seen = Vec::new();
        let object = AotObject::load(
            Arc::new(image),
            header_address,
            AnalysisOptions::default(),
            |blob| {
                seen.extend_from_slice(blob);
                Ok(metadata)
            },
        )
        .unwrap();
        assert_eq!(seen, vec![0xAA; 16]);

        assert_eq!(object.heap().unwrap().base(), HEAP);
        assert_eq!(object.strings().len(), 2);
        assert_eq!(object.compiler_identifier().as_deref(), Some("ILC 9.0"));

        let types = object.types();
        assert_eq!(types.len(), 1);
        let descriptor = object.descriptor_by_hash(WIDGET_HASH).unwrap();
        assert_eq!(descriptor.address, HEAP);
        assert!(Arc::ptr_eq(
            &object.descriptor_by_address(HEAP).unwrap(),
            &descriptor
        ));
        assert!(Arc::ptr_eq(&descriptor.type_def().unwrap(), &types[0]));

        let methods = object.methods();
        assert_eq!(methods.len(), 1);
        assert_eq!(methods[0].entry_address(), CODE);
        assert!(Arc::ptr_eq(&methods[0].declaring_type().unwrap(), &types[0]));
        assert_eq!(object.invokes().len(), 1);
        assert_eq!(object.invokes()[0].declaring_type, 0x1_0000);
        assert_eq!(object.graph().get_method(handles.run).unwrap().entry_address(), CODE);
    }

    #[test]
    fn missing_invoke_map_is_not_fatal() {
        let Fixture {
            image, metadata, ..
        } = fixture(false, false);
        let (image, header_address) = image.finish();

        let object = AotObject::load(
            Arc::new(image),
            header_address,
            AnalysisOptions::minimal(),
            |_| Ok(metadata),
        )
        .unwrap();
        assert!(object.strings().is_empty());
        assert!(object.invokes().is_empty());
        assert_eq!(object.methods()[0].entry_address(), 0);
        assert_eq!(object.descriptors().len(), 1);
    }

    #[test]
    fn missing_metadata_is_fatal() {
        let width = PointerWidth::Eight;
        let mut image = AotImageBuilder::new(width);
        image.section(SectionType::CompilerIdentifier, b"ILC\0");
        let (image, header_address) = image.finish();

        let result = AotObject::load(
            Arc::new(image),
            header_address,
            AnalysisOptions::default(),
            |_| Ok(MemoryMetadata::default()),
        );
        assert!(matches!(
            result,
            Err(Error::MissingSection(SectionType::EmbeddedMetadata))
        ));
    }

    #[test]
    fn image_without_heap() {
        let mut image = AotImageBuilder::new(PointerWidth::Eight);
        image.section(SectionType::CompilerIdentifier, &[0xFF, 0xFE, 0x00]);
        let (image, header_address) = image.finish();

        let object =
            AotObject::new(Arc::new(image), header_address, AnalysisOptions::default()).unwrap();
        assert!(object.heap().is_none());
        assert!(object.strings().is_empty());
        assert_eq!(object.sections().len(), 1);
        assert_eq!(object.compiler_identifier(), None);
        assert!(object.types().is_empty());
    }

    #[test]
    fn bad_header_is_fatal() {
        let mut image = AotImageBuilder::new(PointerWidth::Eight);
        image.section(SectionType::CompilerIdentifier, b"ILC\0");
        let (image, header_address) = image.finish();

        let result = AotObject::new(Arc::new(image), header_address + 4, AnalysisOptions::default());
        assert!(matches!(result, Err(Error::InvalidSignature(_))));
    }
}
