use serde::Serialize;

use crate::{
    app::{GlobalOptions, ImageArgs},
    commands::common::load_image,
    output::{hex, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct SectionEntry {
    id: u32,
    name: String,
    flags: u32,
    start: String,
    end: String,
    size: u64,
}

#[derive(Debug, Serialize)]
struct InfoOutput {
    header: String,
    version: String,
    pointer_size: usize,
    compiler: Option<String>,
    heap_start: Option<String>,
    heap_size: usize,
    string_count: usize,
    sections: Vec<SectionEntry>,
}

pub fn run(args: &ImageArgs, opts: &GlobalOptions) -> anyhow::Result<()> {
    let object = load_image(args)?;
    let header = object.header();

    let sections = object
        .sections()
        .iter()
        .map(|section| SectionEntry {
            id: section.id,
            name: section
                .section_type()
                .map_or_else(|| "Unknown".to_string(), |kind| kind.to_string()),
            flags: section.flags,
            start: hex(section.start),
            end: hex(section.end),
            size: section.len(),
        })
        .collect();

    let output = InfoOutput {
        header: hex(object.header_address()),
        version: format!("{}.{}", header.major_version, header.minor_version),
        pointer_size: object.space().pointer_width().bytes(),
        compiler: object.compiler_identifier(),
        heap_start: object.heap().map(|heap| hex(heap.base())),
        heap_size: object.heap().map_or(0, |heap| heap.len()),
        string_count: object.strings().len(),
        sections,
    };

    print_output(&output, opts, |out| {
        println!("Runtime header:  {} (v{})", out.header, out.version);
        println!("Pointer size:    {}", out.pointer_size);
        println!(
            "Compiler:        {}",
            out.compiler.as_deref().unwrap_or("(unknown)")
        );
        match &out.heap_start {
            Some(start) => println!("Heap:            {start} ({} bytes)", out.heap_size),
            None => println!("Heap:            (none)"),
        }
        println!("Strings:         {}", out.string_count);
        println!();

        let mut tw = TabWriter::new(&[
            ("Id", Align::Right),
            ("Section", Align::Left),
            ("Start", Align::Left),
            ("End", Align::Left),
            ("Size", Align::Right),
        ]);
        for section in &out.sections {
            tw.row(vec![
                section.id.to_string(),
                section.name.clone(),
                section.start.clone(),
                section.end.clone(),
                section.size.to_string(),
            ]);
        }
        tw.print();
    })
}
