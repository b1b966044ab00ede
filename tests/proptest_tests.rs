//! Property-based tests using proptest.
//!
//! These tests check that arbitrary entry sets survive a commit and that
//! arbitrary edit sequences leave exactly the expected entries behind.

mod common;

use proptest::prelude::*;
use zipkit::{Archive, LocateFlags, MemorySource, OpenFlags, StringDecoding, Timestamp, Version};

use common::{read_archive_contents, reopen};

/// Strategy for entry names: 1-3 path components of printable ASCII.
fn name_strategy() -> impl Strategy<Value = String> {
    proptest::collection::vec("[a-zA-Z0-9][a-zA-Z0-9_.-]{0,9}", 1..4).prop_map(|parts| parts.join("/"))
}

/// Strategy for a set of entries with distinct names.
fn entries_strategy() -> impl Strategy<Value = Vec<(String, Vec<u8>)>> {
    proptest::collection::btree_map(
        name_strategy(),
        proptest::collection::vec(any::<u8>(), 0..2048),
        1..12,
    )
    .prop_map(|map| map.into_iter().collect())
}

fn build(entries: &[(String, Vec<u8>)]) -> MemorySource {
    let storage = MemorySource::empty();
    let mut archive = Archive::open_source(Box::new(storage.clone()), OpenFlags::CREATE).unwrap();
    for (name, data) in entries {
        archive.add_bytes(name, data.clone()).unwrap();
    }
    let _ = archive.commit().unwrap();
    storage
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    /// Every entry reads back byte-for-byte under its own name.
    #[test]
    fn entries_roundtrip(entries in entries_strategy()) {
        let storage = build(&entries);
        let archive = reopen(&storage);
        let contents = read_archive_contents(&archive).unwrap();
        prop_assert_eq!(contents, entries.clone());

        for (expected_index, (name, _)) in entries.iter().enumerate() {
            let index = archive.locate(name, LocateFlags::empty()).unwrap();
            prop_assert_eq!(index, expected_index);
        }
    }

    /// Deleting any subset leaves the complement in the original order.
    #[test]
    fn delete_subset(
        entries in entries_strategy(),
        mask in proptest::collection::vec(any::<bool>(), 12),
    ) {
        let storage = build(&entries);
        let mut archive = reopen(&storage);
        let mut expected = Vec::new();
        for (index, entry) in entries.iter().enumerate() {
            if mask[index] {
                archive.delete(index).unwrap();
            } else {
                expected.push(entry.clone());
            }
        }
        prop_assert_eq!(archive.len(Version::Current), expected.len());
        let result = archive.commit().unwrap();

        if expected.is_empty() {
            prop_assert!(result.archive_removed);
            prop_assert!(storage.contents().is_none());
        } else {
            let archive = reopen(&storage);
            prop_assert_eq!(read_archive_contents(&archive).unwrap(), expected);
        }
    }

    /// Header-only edits never change entry data.
    #[test]
    fn rename_and_touch_preserve_data(
        entries in entries_strategy(),
        secs in 315_532_800i64..4_000_000_000i64,
    ) {
        let storage = build(&entries);
        let mtime = Timestamp::from_unix_secs(secs - secs % 2);
        let mut archive = reopen(&storage);
        for index in 0..entries.len() {
            archive.rename(index, &format!("renamed/{}", index)).unwrap();
            archive.set_modified(index, mtime).unwrap();
        }
        let result = archive.commit().unwrap();
        prop_assert_eq!(result.entries_reencoded, 0);

        let archive = reopen(&storage);
        for (index, (_, data)) in entries.iter().enumerate() {
            let entry = archive.entry(index).unwrap();
            prop_assert_eq!(entry.name(StringDecoding::Guess), format!("renamed/{}", index));
            prop_assert_eq!(entry.modified(), mtime);
            prop_assert_eq!(&entry.open(None).unwrap().read_all().unwrap(), data);
        }
    }

    /// DOS time conversion is exact for even seconds in the representable range.
    #[test]
    fn dos_time_roundtrip(secs in 315_532_800i64..4_000_000_000i64) {
        let even = Timestamp::from_unix_secs(secs - secs % 2);
        let (date, time) = even.to_dos();
        prop_assert_eq!(Timestamp::from_dos(date, time), even);
    }
}
