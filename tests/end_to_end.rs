//! Integration tests running the whole pipeline over synthetic images.
//!
//! Each image holds one type `MyNs.Widget` with one method `Run`, the type's descriptor in a
//! dehydrated heap, and one invoke map entry pointing `Run` at native code.

mod common;

use std::sync::Arc;

use aotscope::{
    metadata::{
        flags::{MethodAttributes, TypeAttributes},
        graph::MetadataGraph,
        handle::Handle,
        memory::{MemoryMetadata, MetadataBuilder},
    },
    prelude::*,
};
use common::{
    build_pe, class_descriptor, invoke_entry, TextBuilder, CODE, DECLARING_TYPE, HEADER_ADDRESS,
    HEAP, IMAGE_BASE, TEXT_RVA,
};

fn widget_metadata() -> (MemoryMetadata, Handle) {
    let mut builder = MetadataBuilder::new();
    let scope = builder.scope("App");
    let root = builder.root_namespace(scope).unwrap();
    let namespace = builder.namespace(root, "MyNs");
    let widget = builder.type_definition(namespace, "Widget", TypeAttributes::PUBLIC);
    let run = builder.method(widget, "Run", MethodAttributes::PUBLIC, widget, &[]);
    (builder.build(), run)
}

fn widget_hash(metadata: &MemoryMetadata) -> Result<u32> {
    let graph = MetadataGraph::build(metadata)?;
    let widget = graph.find_type("MyNs.Widget").unwrap();
    Ok(widget.hash().unwrap())
}

/// `.text` content holding the full Widget image
fn widget_text(hash: u32, run: Handle) -> Vec<u8> {
    TextBuilder::new()
        .dehydrated(&class_descriptor(hash))
        .fixups(&[DECLARING_TYPE, CODE])
        .invoke_map(&[invoke_entry(0x24, run.offset(), 0, 1)])
        .section(SectionType::EmbeddedMetadata, &[0xAA; 16])
        .finish()
}

fn check_widget(object: &AotObject) {
    assert!(object.strings().is_empty());

    let types = object.types();
    assert_eq!(types.len(), 1);
    let widget = &types[0];
    assert_eq!(widget.full_name(), "MyNs.Widget");

    let descriptor = widget.descriptor().unwrap();
    assert_eq!(descriptor.address, HEAP);
    assert!(Arc::ptr_eq(
        &object.descriptor_by_address(HEAP).unwrap(),
        descriptor
    ));

    let methods = object.methods();
    assert_eq!(methods.len(), 1);
    let run = &methods[0];
    assert_eq!(run.entry_address(), CODE);
    assert_ne!(run.entry_address(), 0);
    assert!(Arc::ptr_eq(&run.declaring_type().unwrap(), widget));

    assert_eq!(object.invokes().len(), 1);
    assert_eq!(object.invokes()[0].declaring_type, DECLARING_TYPE);
}

#[test]
fn test_flat_image_pipeline() -> Result<()> {
    let (metadata, run) = widget_metadata();
    let text = widget_text(widget_hash(&metadata)?, run);
    let image = FlatImage::new(TEXT_RVA, text, PointerWidth::Eight).with_image_base(IMAGE_BASE);

    let object = AotObject::load(
        Arc::new(image),
        HEADER_ADDRESS,
        AnalysisOptions::default(),
        |blob| {
            assert_eq!(blob, &[0xAA; 16]);
            Ok(metadata)
        },
    )?;

    assert_eq!(object.sections().len(), 4);
    assert_eq!(object.heap().unwrap().base(), HEAP);
    check_widget(&object);
    Ok(())
}

#[test]
fn test_pe_file_pipeline() -> Result<()> {
    let (metadata, run) = widget_metadata();
    let text = widget_text(widget_hash(&metadata)?, run);
    let file = PeFile::from_mem(build_pe(&text))?;
    assert_eq!(file.imagebase(), IMAGE_BASE);

    let mut object = AotObject::new(Arc::new(file), HEADER_ADDRESS, AnalysisOptions::thorough())?;
    assert!(object.types().is_empty());

    object.load_metadata(&metadata)?;
    check_widget(&object);
    Ok(())
}

#[test]
fn test_sequential_and_parallel_matching_agree() -> Result<()> {
    let (metadata, run) = widget_metadata();
    let text = widget_text(widget_hash(&metadata)?, run);

    let mut found = Vec::new();
    for parallel in [false, true] {
        let image =
            FlatImage::new(TEXT_RVA, text.clone(), PointerWidth::Eight).with_image_base(IMAGE_BASE);
        let options = AnalysisOptions {
            parallel_type_matching: parallel,
            ..AnalysisOptions::default()
        };
        let mut object = AotObject::new(Arc::new(image), HEADER_ADDRESS, options)?;
        object.load_metadata(&metadata)?;
        found.push(object.descriptors().len());
    }

    assert_eq!(found, vec![1, 1]);
    Ok(())
}

#[test]
fn test_unknown_type_has_no_descriptor() -> Result<()> {
    let (metadata, run) = widget_metadata();
    let text = widget_text(0x1234_5678, run);
    let image = FlatImage::new(TEXT_RVA, text, PointerWidth::Eight).with_image_base(IMAGE_BASE);

    let mut object = AotObject::new(Arc::new(image), HEADER_ADDRESS, AnalysisOptions::default())?;
    object.load_metadata(&metadata)?;

    assert!(object.descriptors().is_empty());
    assert!(object.types()[0].descriptor().is_none());
    assert_eq!(object.methods()[0].entry_address(), CODE);
    Ok(())
}

#[test]
fn test_corrupt_heap_stream_is_fatal() {
    let text = TextBuilder::new().raw_dehydrated(&[0x06]).finish();
    let image = FlatImage::new(TEXT_RVA, text, PointerWidth::Eight).with_image_base(IMAGE_BASE);

    let result = AotObject::new(Arc::new(image), HEADER_ADDRESS, AnalysisOptions::default());
    assert!(matches!(result, Err(Error::InvalidCommand { opcode: 6, .. })));
}

#[test]
fn test_missing_metadata_is_reported() {
    let text = TextBuilder::new()
        .dehydrated(&class_descriptor(0))
        .finish();
    let image = FlatImage::new(TEXT_RVA, text, PointerWidth::Eight).with_image_base(IMAGE_BASE);

    let result = AotObject::load(
        Arc::new(image),
        HEADER_ADDRESS,
        AnalysisOptions::minimal(),
        |_| Ok(MemoryMetadata::default()),
    );
    assert!(matches!(
        result,
        Err(Error::MissingSection(SectionType::EmbeddedMetadata))
    ));
}
