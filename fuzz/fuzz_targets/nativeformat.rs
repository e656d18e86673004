#![no_main]

use aotscope::nativeformat::{hashtable::NativeHashtable, NativeParser, NativeReader};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let reader = NativeReader::new(data);
    let Ok(table) = NativeHashtable::new(NativeParser::new(reader, 0)) else {
        return;
    };

    for entry in table.entries().take(4096) {
        let Ok(mut parser) = entry else {
            break;
        };
        let _ = parser.get_unsigned();
        let _ = parser.get_signed();
    }
    let _ = table.lookup(0x1234_5678);
});
