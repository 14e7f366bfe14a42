#![no_main]

use libfuzzer_sys::fuzz_target;
use dathost::vhost::host_label;

fuzz_target!(|host: &str| {
    if let Some(label) = host_label(host) {
        assert!(!label.is_empty());
        assert!(!label.contains('.'));
        assert_eq!(label, label.to_ascii_lowercase());
    }
});
