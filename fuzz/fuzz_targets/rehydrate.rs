#![no_main]

use std::sync::Arc;

use aotscope::{
    image::{address::AddressSpace, header::SectionInfo, FlatImage, PointerWidth},
    runtime::rehydrate::rehydrate,
};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // First byte splits the input into command stream and trailing fixup cells
    let Some((&split, rest)) = data.split_first() else {
        return;
    };
    let stream_len = (usize::from(split) * rest.len() / 255).max(4).min(rest.len());

    let image = FlatImage::new(0x1000, rest.to_vec(), PointerWidth::Eight);
    let section = SectionInfo {
        id: 207,
        flags: 1,
        start: 0x1000,
        end: 0x1000 + stream_len as u64,
    };
    let _ = rehydrate(&AddressSpace::new(Arc::new(image)), &section);
});
