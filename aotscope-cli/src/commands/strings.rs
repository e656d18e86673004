use serde::Serialize;

use crate::{
    app::{GlobalOptions, ImageArgs},
    commands::common::load_image,
    output::{hex, print_output, Align, TabWriter},
};

#[derive(Debug, Serialize)]
struct StringEntry {
    address: String,
    length: usize,
    value: String,
}

#[derive(Debug, Serialize)]
struct StringsOutput {
    strings: Vec<StringEntry>,
    count: usize,
}

pub fn run(args: &ImageArgs, contains: Option<&str>, opts: &GlobalOptions) -> anyhow::Result<()> {
    if args.no_strings {
        anyhow::bail!("--no-strings disables the scan this command lists");
    }
    let object = load_image(args)?;

    let strings: Vec<StringEntry> = object
        .strings()
        .iter()
        .filter(|(_, value)| contains.is_none_or(|needle| value.contains(needle)))
        .map(|(address, value)| StringEntry {
            address: hex(*address),
            length: value.encode_utf16().count(),
            value: value.clone(),
        })
        .collect();

    let count = strings.len();
    let output = StringsOutput { strings, count };

    print_output(&output, opts, |out| {
        let mut tw = TabWriter::new(&[
            ("Address", Align::Left),
            ("Len", Align::Right),
            ("Value", Align::Left),
        ]);
        for entry in &out.strings {
            tw.row(vec![
                entry.address.clone(),
                entry.length.to_string(),
                entry.value.escape_debug().to_string(),
            ]);
        }
        tw.print();
        println!("\n{} string(s) listed.", out.count);
    })
}
