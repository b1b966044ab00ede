//! Shared test utilities for integration tests.
//!
//! Archive creation helpers are consolidated here to avoid duplication.
//!
//! Note: `#![allow(dead_code)]` is required because each integration test file
//! compiles as a separate crate and may only use a subset of these helpers.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use zipkit::checksum::Crc32;
use zipkit::{AddOptions, Archive, CommitResult, MemorySource, OpenFlags, StringDecoding};

/// Creates an in-memory archive and returns the storage handle together with
/// the commit result.
///
/// The storage is a [`MemorySource`] clone, so it can be reopened with
/// [`reopen`] to edit the same bytes again.
pub fn create_archive_with_result(
    options: AddOptions,
    entries: &[(&str, &[u8])],
) -> zipkit::Result<(MemorySource, CommitResult)> {
    let storage = MemorySource::empty();
    let mut archive = Archive::open_source(Box::new(storage.clone()), OpenFlags::CREATE)?;
    for (name, data) in entries {
        archive.add(
            name,
            Box::new(MemorySource::new(data.to_vec())),
            options.clone(),
        )?;
    }
    let result = archive.commit()?;
    Ok((storage, result))
}

/// Creates an in-memory archive with default options.
pub fn create_archive(entries: &[(&str, &[u8])]) -> zipkit::Result<MemorySource> {
    create_archive_with_result(AddOptions::default(), entries).map(|(storage, _)| storage)
}

/// Creates an archive and returns its raw bytes.
pub fn create_archive_bytes(entries: &[(&str, &[u8])]) -> Vec<u8> {
    create_archive(entries)
        .expect("archive creation should succeed")
        .contents()
        .expect("committed archive should exist")
}

/// Reopens in-memory storage for editing.
pub fn reopen(storage: &MemorySource) -> Archive {
    Archive::open_source(Box::new(storage.clone()), OpenFlags::CHECK_CONSISTENCY)
        .expect("reopen should succeed")
}

/// Creates an archive file inside `dir`.
pub fn create_archive_file(dir: &Path, name: &str, entries: &[(&str, &[u8])]) -> PathBuf {
    let path = dir.join(name);
    let mut archive = Archive::open(&path, OpenFlags::CREATE | OpenFlags::TRUNCATE)
        .expect("create should succeed");
    for (entry_name, data) in entries {
        archive
            .add_bytes(entry_name, data.to_vec())
            .expect("add should succeed");
    }
    let _ = archive.commit().expect("commit should succeed");
    path
}

/// Reads every existing entry as `(name, content)`.
pub fn read_archive_contents(archive: &Archive) -> zipkit::Result<Vec<(String, Vec<u8>)>> {
    let mut contents = Vec::new();
    for entry in archive.entries() {
        if entry.is_directory() {
            continue;
        }
        let data = entry.open(None)?.read_all()?;
        contents.push((entry.name(StringDecoding::Guess), data));
    }
    Ok(contents)
}

/// Deterministic pseudo-random bytes.
pub fn random_bytes(len: usize, seed: u64) -> Vec<u8> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut data = vec![0u8; len];
    rng.fill(&mut data[..]);
    data
}

/// Compressible text-like bytes.
pub fn text_bytes(len: usize) -> Vec<u8> {
    b"The quick brown fox jumps over the lazy dog. "
        .iter()
        .copied()
        .cycle()
        .take(len)
        .collect()
}

/// Hand-assembles a stored, unencrypted ZIP without going through the crate's
/// writer. Every field is little-endian as on the wire.
pub fn raw_stored_zip(entries: &[(&str, &[u8])], comment: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut central = Vec::new();
    for (name, data) in entries {
        let offset = out.len() as u32;
        let crc = Crc32::compute(data);
        let size = data.len() as u32;

        out.extend_from_slice(&0x0403_4B50u32.to_le_bytes());
        out.extend_from_slice(&20u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(&0x0021u16.to_le_bytes());
        out.extend_from_slice(&crc.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&size.to_le_bytes());
        out.extend_from_slice(&(name.len() as u16).to_le_bytes());
        out.extend_from_slice(&0u16.to_le_bytes());
        out.extend_from_slice(name.as_bytes());
        out.extend_from_slice(data);

        central.extend_from_slice(&0x0201_4B50u32.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&20u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0x0021u16.to_le_bytes());
        central.extend_from_slice(&crc.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&size.to_le_bytes());
        central.extend_from_slice(&(name.len() as u16).to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u16.to_le_bytes());
        central.extend_from_slice(&0u32.to_le_bytes());
        central.extend_from_slice(&offset.to_le_bytes());
        central.extend_from_slice(name.as_bytes());
    }

    let cd_offset = out.len() as u32;
    let cd_size = central.len() as u32;
    out.extend_from_slice(&central);
    out.extend_from_slice(&0x0605_4B50u32.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&(entries.len() as u16).to_le_bytes());
    out.extend_from_slice(&cd_size.to_le_bytes());
    out.extend_from_slice(&cd_offset.to_le_bytes());
    out.extend_from_slice(&(comment.len() as u16).to_le_bytes());
    out.extend_from_slice(comment);
    out
}

/// Offset of the end of central directory record in `bytes`.
pub fn eocd_offset(bytes: &[u8]) -> usize {
    bytes
        .windows(4)
        .rposition(|w| w == [0x50, 0x4B, 0x05, 0x06])
        .expect("archive should have an EOCD")
}
