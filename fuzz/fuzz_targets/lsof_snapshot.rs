#![no_main]

use libfuzzer_sys::fuzz_target;
use ktrace::descriptors::{DescriptorSnapshot, DescriptorTable};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let snapshot = DescriptorSnapshot::from_lsof(Some(1), input);
        let mut table = DescriptorTable::new();
        table.load_snapshot(&snapshot);
        assert!(table.verify().is_empty());
    }
});
