//! Fuzz target for opening arbitrary bytes as a ZIP archive.
//!
//! Parsing, consistency checking and entry decoding must fail with a typed
//! error on malformed input, never panic or hang.
//!
//! Run with: cargo +nightly fuzz run archive_open

#![no_main]

use libfuzzer_sys::fuzz_target;
use zipkit::{Archive, ExtraLocation, MemorySource, OpenFlags, StringDecoding, Version};

fuzz_target!(|data: &[u8]| {
    let _ = Archive::open_source(
        Box::new(MemorySource::new(data.to_vec())),
        OpenFlags::READ_ONLY | OpenFlags::CHECK_CONSISTENCY,
    );

    let source = MemorySource::new(data.to_vec());
    if let Ok(archive) = Archive::open_source(Box::new(source), OpenFlags::READ_ONLY) {
        for index in 0..archive.len(Version::Current) {
            let Ok(entry) = archive.entry(index) else {
                continue;
            };
            let _ = entry.name(StringDecoding::Guess);
            let _ = entry.comment(StringDecoding::Guess);
            let _ = entry.extra_fields(ExtraLocation::BOTH);
            // Bound the work per entry.
            if entry.size().unwrap_or(u64::MAX) <= 1 << 20 {
                let _ = archive.read_entry(index);
            }
        }
    }
});
