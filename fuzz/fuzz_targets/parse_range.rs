#![no_main]

use libfuzzer_sys::fuzz_target;
use dathost::http::parse_range;

fuzz_target!(|data: (&str, u64)| {
    let (header, size) = data;
    if let Some(range) = parse_range(header, size) {
        assert!(range.start <= range.end);
        assert!(range.end < size);
        assert_eq!(range.len(), range.end - range.start + 1);
    }
});
