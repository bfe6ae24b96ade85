//! Fuzz target for declarative component manifests.
//!
//! Run with: cargo +nightly fuzz run fuzz_manifest_parser

#![no_main]

use convokit_core::ManifestLoader;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(s) = std::str::from_utf8(data) {
        let _ = ManifestLoader::new().parse(s, None);
    }
});
