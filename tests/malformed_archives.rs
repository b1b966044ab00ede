//! Malformed input: every failure must surface as a typed error, never a panic.
//!
//! Archives are built by hand with [`common::raw_stored_zip`] so individual
//! bytes can be damaged at known offsets.

mod common;

use zipkit::{Archive, CompressionMethod, Error, MemorySource, OpenFlags};

use common::{eocd_offset, random_bytes, raw_stored_zip};

/// Byte offset of the first entry's data in a [`raw_stored_zip`] archive.
fn first_data_offset(name: &str) -> usize {
    30 + name.len()
}

fn open_lenient(bytes: Vec<u8>) -> zipkit::Result<Archive> {
    Archive::open_source(Box::new(MemorySource::new(bytes)), OpenFlags::READ_ONLY)
}

fn open_strict(bytes: Vec<u8>) -> zipkit::Result<Archive> {
    Archive::open_source(
        Box::new(MemorySource::new(bytes)),
        OpenFlags::READ_ONLY | OpenFlags::CHECK_CONSISTENCY,
    )
}

fn expect_corrupt(result: zipkit::Result<Archive>) {
    match result {
        Err(Error::CorruptArchive { .. }) => {}
        Err(e) => panic!("expected CorruptArchive, got {:?}", e),
        Ok(_) => panic!("expected CorruptArchive, archive opened"),
    }
}

// ============================================================================
// Unparsable archives
// ============================================================================

#[test]
fn test_garbage_input() {
    let garbage = b"this is definitely not a zip archive, just text".repeat(20);
    expect_corrupt(open_lenient(garbage));
}

#[test]
fn test_random_input() {
    for seed in 0..16 {
        let result = open_lenient(random_bytes(4096, seed));
        assert!(result.is_err(), "seed {} produced an archive", seed);
    }
}

#[test]
fn test_too_small() {
    expect_corrupt(open_lenient(b"PK\x05\x06".to_vec()));
}

#[test]
fn test_empty_file_is_empty_archive() {
    let archive = Archive::from_bytes(Vec::new()).unwrap();
    assert!(archive.is_empty());
    assert_eq!(archive.comment_raw(zipkit::Version::Current), b"");
}

#[test]
fn test_truncated_tail() {
    let bytes = raw_stored_zip(&[("a.txt", b"hello")], b"");
    let truncated = bytes[..bytes.len() - 10].to_vec();
    expect_corrupt(open_lenient(truncated));
}

#[test]
fn test_truncated_body() {
    let bytes = raw_stored_zip(&[("a.txt", b"hello world, hello world")], b"");
    // Drop part of the entry data but keep the central directory and EOCD.
    let mut cut = bytes[..20].to_vec();
    cut.extend_from_slice(&bytes[40..]);
    expect_corrupt(open_lenient(cut));
}

#[test]
fn test_entry_count_too_large() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"a"), ("b.txt", b"b")], b"");
    let eocd = eocd_offset(&bytes);
    bytes[eocd + 8..eocd + 10].copy_from_slice(&500u16.to_le_bytes());
    bytes[eocd + 10..eocd + 12].copy_from_slice(&500u16.to_le_bytes());
    expect_corrupt(open_lenient(bytes));
}

#[test]
fn test_multi_disk_rejected() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"a")], b"");
    let eocd = eocd_offset(&bytes);
    bytes[eocd + 4..eocd + 6].copy_from_slice(&1u16.to_le_bytes());
    expect_corrupt(open_lenient(bytes));
}

#[test]
fn test_bad_central_signature() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc")], b"");
    let eocd = eocd_offset(&bytes);
    let cd_offset = u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize;
    bytes[cd_offset] = b'X';
    expect_corrupt(open_lenient(bytes));
}

// ============================================================================
// Damaged entries
// ============================================================================

#[test]
fn test_corrupted_stored_data() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"important data")], b"");
    bytes[first_data_offset("a.txt") + 3] ^= 0xFF;

    let archive = open_lenient(bytes).unwrap();
    match archive.read_entry(0) {
        Err(Error::ChecksumMismatch {
            entry_index,
            expected,
            actual,
        }) => {
            assert_eq!(entry_index, 0);
            assert_ne!(expected, actual);
        }
        other => panic!("expected ChecksumMismatch, got {:?}", other),
    }
}

#[test]
fn test_bad_local_header_signature() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc"), ("b.txt", b"def")], b"");
    bytes[0..4].copy_from_slice(b"JUNK");

    let archive = open_lenient(bytes.clone()).unwrap();
    match archive.read_entry(0) {
        Err(Error::EntryNotReadable { index, .. }) => assert_eq!(index, 0),
        other => panic!("expected EntryNotReadable, got {:?}", other),
    }
    // Other entries stay readable.
    assert_eq!(archive.read_entry(1).unwrap(), b"def");

    expect_corrupt(open_strict(bytes));
}

#[test]
fn test_reencode_with_damaged_local_header_fails() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc"), ("b.txt", b"def")], b"");
    bytes[0..4].copy_from_slice(b"JUNK");
    let storage = MemorySource::new(bytes.clone());

    let mut archive = Archive::open_source(Box::new(storage.clone()), OpenFlags::empty()).unwrap();
    archive
        .set_compression(0, CompressionMethod::Stored, None)
        .unwrap();
    match archive.commit() {
        Err(Error::CommitFailed { reason }) => {
            assert!(reason.contains("Entry 0 is not readable"), "reason: {}", reason);
        }
        other => panic!("expected CommitFailed, got {:?}", other),
    }
    assert_eq!(storage.contents().unwrap(), bytes);
}

#[test]
fn test_local_name_mismatch() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc")], b"");
    bytes[30] = b'z';

    let archive = open_lenient(bytes.clone()).unwrap();
    match archive.read_entry(0) {
        Err(Error::EntryNotReadable { index, reason }) => {
            assert_eq!(index, 0);
            assert!(reason.contains("name"), "reason: {}", reason);
        }
        other => panic!("expected EntryNotReadable, got {:?}", other),
    }
    expect_corrupt(open_strict(bytes));
}

#[test]
fn test_unknown_compression_method() {
    let mut bytes = raw_stored_zip(&[("a.lzma", b"not really lzma")], b"");
    bytes[8..10].copy_from_slice(&14u16.to_le_bytes());
    let eocd = eocd_offset(&bytes);
    let cd_offset = u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize;
    bytes[cd_offset + 10..cd_offset + 12].copy_from_slice(&14u16.to_le_bytes());

    let archive = open_strict(bytes).unwrap();
    let err = archive.read_entry(0).unwrap_err();
    match err {
        Error::UnsupportedMethod { method_id } => assert_eq!(method_id, 14),
        ref e => panic!("expected UnsupportedMethod, got {:?}", e),
    }
    assert!(err.is_unsupported());
}

// ============================================================================
// Consistency checking
// ============================================================================

#[test]
fn test_gap_before_end_record() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc")], b"");
    let eocd = eocd_offset(&bytes);
    bytes.splice(eocd..eocd, [0u8; 7]);

    let archive = open_lenient(bytes.clone()).unwrap();
    assert_eq!(archive.read_entry(0).unwrap(), b"abc");
    expect_corrupt(open_strict(bytes));
}

#[test]
fn test_prefixed_archive_is_readable() {
    let mut bytes = vec![0x90u8; 100];
    bytes.extend_from_slice(&raw_stored_zip(
        &[("a.txt", b"abc"), ("b.txt", b"defg")],
        b"",
    ));

    let archive = open_strict(bytes).unwrap();
    assert_eq!(archive.directory().leading_len(), 100);
    assert_eq!(archive.read_entry(0).unwrap(), b"abc");
    assert_eq!(archive.read_entry(1).unwrap(), b"defg");
}

#[test]
fn test_trailing_data_is_tolerated() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc")], b"comment");
    bytes.extend_from_slice(b"trailing bytes");
    let archive = open_strict(bytes).unwrap();
    assert_eq!(archive.comment_raw(zipkit::Version::Current), b"comment");
    assert_eq!(archive.read_entry(0).unwrap(), b"abc");
}

#[test]
fn test_overlapping_entry_rejected_in_strict_mode() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc")], b"");
    let eocd = eocd_offset(&bytes);
    let cd_offset = u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize;
    // Claim a compressed size that runs into the central directory.
    bytes[cd_offset + 20..cd_offset + 24].copy_from_slice(&1000u32.to_le_bytes());

    assert!(open_lenient(bytes.clone()).is_ok());
    expect_corrupt(open_strict(bytes));
}

#[test]
fn test_saturated_size_without_zip64_field() {
    let mut bytes = raw_stored_zip(&[("a.txt", b"abc")], b"");
    let eocd = eocd_offset(&bytes);
    let cd_offset = u32::from_le_bytes(bytes[eocd + 16..eocd + 20].try_into().unwrap()) as usize;
    bytes[cd_offset + 20..cd_offset + 24].copy_from_slice(&u32::MAX.to_le_bytes());

    assert!(open_lenient(bytes.clone()).is_ok());
    match open_strict(bytes) {
        Err(Error::CorruptArchive { offset, reason }) => {
            assert_eq!(offset, cd_offset as u64);
            assert!(reason.contains("ZIP64"), "reason: {}", reason);
        }
        Err(e) => panic!("expected CorruptArchive, got {:?}", e),
        Ok(_) => panic!("expected CorruptArchive, archive opened"),
    }
}

#[test]
fn test_corruption_errors_are_classified() {
    let err = open_lenient(b"not a zip, not even close to one".to_vec())
        .err()
        .unwrap();
    assert!(err.is_corruption());
    assert!(!err.is_recoverable());
    assert!(!err.is_encryption_error());
}
