use std::path::Path;

use anyhow::Context;
use serde::Serialize;

use crate::{
    app::{GlobalOptions, ImageArgs},
    commands::common::load_image,
    output::{hex, print_output},
};

#[derive(Debug, Serialize)]
struct HeapOutput {
    start: String,
    size: usize,
    path: String,
}

pub fn run(args: &ImageArgs, out: &Path, opts: &GlobalOptions) -> anyhow::Result<()> {
    let object = load_image(args)?;
    let heap = object
        .heap()
        .context("the image has no dehydrated data section")?;

    std::fs::write(out, heap.data())
        .with_context(|| format!("failed to write {}", out.display()))?;

    let output = HeapOutput {
        start: hex(heap.base()),
        size: heap.len(),
        path: out.display().to_string(),
    };

    print_output(&output, opts, |o| {
        println!("Wrote {} heap bytes starting at {} to {}", o.size, o.start, o.path);
    })
}
