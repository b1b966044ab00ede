//! Entry reader lifecycle: close, seek, interleaving and sharing across threads.

mod common;

use std::io::{Read, Seek, SeekFrom};

use zipkit::{AddOptions, Archive, CompressionMethod, Error, MemorySource, OpenFlags};

use common::{create_archive_with_result, random_bytes, reopen, text_bytes};

fn stored_archive(entries: &[(&str, &[u8])]) -> Archive {
    let (storage, _) = create_archive_with_result(
        AddOptions::new().compression(CompressionMethod::Stored),
        entries,
    )
    .unwrap();
    reopen(&storage)
}

// ============================================================================
// Close
// ============================================================================

#[test]
fn test_read_after_close() {
    let archive = stored_archive(&[("a.txt", b"abcdef")]);
    let mut reader = archive.open_entry(0, None).unwrap();
    let mut buf = [0u8; 3];
    assert_eq!(reader.read(&mut buf).unwrap(), 3);
    reader.close().unwrap();
    assert!(reader.is_closed());

    match reader.read(&mut buf) {
        Err(Error::UseAfterClose) => {}
        other => panic!("expected UseAfterClose, got {:?}", other),
    }
    match reader.seek(SeekFrom::Start(0)) {
        Err(Error::UseAfterClose) => {}
        other => panic!("expected UseAfterClose, got {:?}", other),
    }
    match reader.tell() {
        Err(Error::UseAfterClose) => {}
        other => panic!("expected UseAfterClose, got {:?}", other),
    }
}

#[test]
fn test_double_close() {
    let archive = stored_archive(&[("a.txt", b"abc")]);
    let mut reader = archive.open_entry(0, None).unwrap();
    reader.close().unwrap();
    reader.close().unwrap();
    assert!(reader.is_closed());
}

#[test]
fn test_use_after_close_through_io_read() {
    let archive = stored_archive(&[("a.txt", b"abc")]);
    let mut reader = archive.open_entry(0, None).unwrap();
    reader.close().unwrap();
    let mut buf = Vec::new();
    let err = Read::read_to_end(&mut reader, &mut buf).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::NotConnected);
    assert!(matches!(
        err.get_ref().and_then(|e| e.downcast_ref::<Error>()),
        Some(Error::UseAfterClose)
    ));
}

// ============================================================================
// Seek and tell
// ============================================================================

#[test]
fn test_seek_and_tell_stored() {
    let data = text_bytes(1000);
    let archive = stored_archive(&[("text.txt", &data)]);
    let mut reader = archive.open_entry(0, None).unwrap();
    assert_eq!(reader.tell().unwrap(), 0);

    assert_eq!(reader.seek(SeekFrom::Start(500)).unwrap(), 500);
    let mut buf = [0u8; 10];
    assert_eq!(reader.read(&mut buf).unwrap(), 10);
    assert_eq!(&buf, &data[500..510]);
    assert_eq!(reader.tell().unwrap(), 510);

    assert_eq!(reader.seek(SeekFrom::End(-5)).unwrap(), 995);
    assert_eq!(reader.read_all().unwrap(), &data[995..]);

    assert_eq!(reader.seek(SeekFrom::Current(-10)).unwrap(), 990);
    assert_eq!(reader.read_all().unwrap(), &data[990..]);
}

#[test]
fn test_seek_before_start_fails() {
    let archive = stored_archive(&[("a.txt", b"abcdef")]);
    let mut reader = archive.open_entry(0, None).unwrap();
    assert!(reader.seek(SeekFrom::Current(-1)).is_err());
    // The reader is still usable.
    assert_eq!(reader.read_all().unwrap(), b"abcdef");
}

#[test]
fn test_seek_past_end_reads_nothing() {
    let archive = stored_archive(&[("a.txt", b"abcdef")]);
    let mut reader = archive.open_entry(0, None).unwrap();
    assert_eq!(reader.seek(SeekFrom::Start(100)).unwrap(), 100);
    assert_eq!(reader.read_all().unwrap(), b"");
}

#[test]
fn test_seek_staged_replacement() {
    let storage = MemorySource::empty();
    let mut archive = Archive::open_source(Box::new(storage), OpenFlags::CREATE).unwrap();
    let index = archive.add_bytes("pending.bin", b"0123456789".to_vec()).unwrap();
    let mut reader = archive.open_entry(index, None).unwrap();
    assert_eq!(reader.seek(SeekFrom::Start(7)).unwrap(), 7);
    assert_eq!(reader.read_all().unwrap(), b"789");
}

#[cfg(feature = "deflate")]
#[test]
fn test_seek_on_deflate_unsupported() {
    let data = text_bytes(5000);
    let (storage, _) = create_archive_with_result(
        AddOptions::new().compression(CompressionMethod::Deflate),
        &[("text.txt", &data)],
    )
    .unwrap();
    let archive = reopen(&storage);
    let mut reader = archive.open_entry(0, None).unwrap();

    match reader.seek(SeekFrom::Start(10)) {
        Err(Error::UnsupportedOperation { .. }) => {}
        other => panic!("expected UnsupportedOperation, got {:?}", other),
    }
    match reader.tell() {
        Err(Error::UnsupportedOperation { .. }) => {}
        other => panic!("expected UnsupportedOperation, got {:?}", other),
    }
    // A failed seek leaves the stream intact.
    assert_eq!(reader.read_all().unwrap(), data);
}

// ============================================================================
// Concurrent readers
// ============================================================================

#[test]
fn test_interleaved_readers() {
    let first = random_bytes(40_000, 1);
    let second = random_bytes(40_000, 2);
    let archive = stored_archive(&[("first.bin", &first), ("second.bin", &second)]);

    let mut a = archive.open_entry(0, None).unwrap();
    let mut b = archive.open_entry(1, None).unwrap();
    let mut c = archive.open_entry(0, None).unwrap();
    let (mut out_a, mut out_b, mut out_c) = (Vec::new(), Vec::new(), Vec::new());
    let mut buf = [0u8; 1000];
    loop {
        let na = a.read(&mut buf).unwrap();
        out_a.extend_from_slice(&buf[..na]);
        let nb = b.read(&mut buf).unwrap();
        out_b.extend_from_slice(&buf[..nb]);
        let nc = c.read(&mut buf[..333]).unwrap();
        out_c.extend_from_slice(&buf[..nc]);
        if na == 0 && nb == 0 && nc == 0 {
            break;
        }
    }
    assert_eq!(out_a, first);
    assert_eq!(out_b, second);
    assert_eq!(out_c, first);
}

#[test]
fn test_io_read_adapter() {
    let data = text_bytes(3000);
    let archive = stored_archive(&[("text.txt", &data)]);
    let mut reader = archive.open_entry(0, None).unwrap();
    let mut out = String::new();
    reader.read_to_string(&mut out).unwrap();
    assert_eq!(out.as_bytes(), data.as_slice());

    let mut reader = archive.open_entry(0, None).unwrap();
    Seek::seek(&mut reader, SeekFrom::Start(4)).unwrap();
    let mut word = [0u8; 5];
    reader.read_exact(&mut word).unwrap();
    assert_eq!(&word, b"quick");
}

#[test]
fn test_parallel_reads_across_threads() {
    let payloads: Vec<Vec<u8>> = (0..8).map(|i| random_bytes(20_000 + i * 100, i as u64)).collect();
    let names: Vec<String> = (0..8).map(|i| format!("entry-{}.bin", i)).collect();
    let entries: Vec<(&str, &[u8])> = names
        .iter()
        .zip(&payloads)
        .map(|(n, d)| (n.as_str(), d.as_slice()))
        .collect();
    let (storage, _) = create_archive_with_result(AddOptions::default(), &entries).unwrap();
    let archive = reopen(&storage);

    std::thread::scope(|scope| {
        for (index, expected) in payloads.iter().enumerate() {
            let archive = &archive;
            scope.spawn(move || {
                for _ in 0..3 {
                    assert_eq!(&archive.read_entry(index).unwrap(), expected);
                }
            });
        }
    });
}
