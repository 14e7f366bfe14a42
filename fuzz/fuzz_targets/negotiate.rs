#![no_main]

use libfuzzer_sys::fuzz_target;
use dathost::listing::ListingFormat;

fuzz_target!(|accept: &str| {
    if let Some(format) = ListingFormat::negotiate(Some(accept)) {
        assert!(ListingFormat::ALL.contains(&format));
    }
});
