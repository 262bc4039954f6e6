#![no_main]

use libfuzzer_sys::fuzz_target;
use ktrace::parser::{parse_line, TraceParser};

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        // A single line must classify without panicking
        let _ = parse_line(input);
    }

    // The streaming parser must survive arbitrary bytes, including invalid UTF-8
    let mut parser = TraceParser::new(data);
    for _ in parser.by_ref() {}
    let stats = parser.stats();
    assert_eq!(
        stats.total_lines,
        stats.events + stats.malformed_lines + stats.ignored_lines
    );
});
