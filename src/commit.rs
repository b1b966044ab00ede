//! The commit engine.
//!
//! Streams the effective archive into the source's staged destination and
//! swaps it in with `commit_write`. Each surviving entry takes one of three
//! paths:
//!
//! | Path | When | Work |
//! |------|------|------|
//! | copy | nothing changed | local header, data and descriptor copied as is |
//! | rewrite | only header fields changed | new local header, raw data copy |
//! | re-encode | content, compression or encryption changed | read, CRC, compress, encrypt |
//!
//! Re-encoded AES and unencrypted entries get their local header patched in
//! place once sizes are known; traditional PKWARE entries get a data
//! descriptor instead, because their password check byte is derived from the
//! DOS time rather than the CRC.

use std::io::{self, SeekFrom, Write};
use std::sync::Mutex;

use crate::archive::Archive;
use crate::attributes::ExternalAttributes;
use crate::changes::{Content, ResolvedEntry};
use crate::checksum::{CountingWriter, Crc32Reader};
use crate::codec::{self, CompressionMethod};
use crate::crypto::{EncryptingWriter, EncryptionMethod, Password};
use crate::directory::{AES_METHOD, DirectoryEntry, read_local_header};
use crate::entry::{Entry, Version};
use crate::format::eocd::encode_trailer;
use crate::format::extra::{self, AesExtraField, ExtraField, ExtraLocation, ids};
use crate::format::header::{CentralHeader, LocalHeader, data_descriptor_len, write_data_descriptor};
use crate::format::{GeneralPurposeFlags, needs_zip64, version};
use crate::source::{SharedSourceReader, Source, WritableSource, lock_or_recover, read_exact_at};
use crate::{Error, Result};

/// Uncompressed sizes from here on get a ZIP64 local header up front, leaving
/// room for compression and encryption overhead below 4 GiB.
const ZIP64_RESERVE_THRESHOLD: u64 = 0xFC00_0000;

/// Options for [`Archive::commit_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitOptions {
    /// Compression for new or replaced content without an explicit method.
    pub compression: CompressionMethod,
    /// Level for [`compression`](Self::compression); `None` uses the method
    /// default.
    pub level: Option<u32>,
}

impl Default for CommitOptions {
    fn default() -> Self {
        Self {
            compression: CompressionMethod::default(),
            level: None,
        }
    }
}

impl CommitOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default compression method for new content.
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = method;
        self
    }

    /// Sets the default compression level.
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }
}

/// Outcome of a commit.
#[must_use = "commit results report whether anything was written"]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitResult {
    /// Entries in the new archive.
    pub entries_written: usize,
    /// Entries whose stored data was copied without decoding.
    pub entries_copied: usize,
    /// Entries that were compressed and encrypted anew.
    pub entries_reencoded: usize,
    /// Original entries left out.
    pub entries_deleted: usize,
    /// Entries that did not exist before.
    pub entries_added: usize,
    /// Size of the new archive in bytes.
    pub bytes_written: u64,
    /// The archive file was removed because no entry survived.
    pub archive_removed: bool,
    /// Nothing was written.
    pub no_op: bool,
}

impl CommitResult {
    fn no_op() -> Self {
        Self {
            no_op: true,
            ..Default::default()
        }
    }
}

/// How one surviving entry reaches the output.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Copy,
    Rewrite,
    Reencode,
}

fn choose_path(resolved: &ResolvedEntry<'_>) -> Path {
    let Some(entry) = resolved.original else {
        return Path::Reencode;
    };
    if resolved.is_unchanged() {
        return Path::Copy;
    }
    if !resolved.is_header_only_change() {
        return Path::Reencode;
    }
    // The PKWARE check byte of a descriptor entry is the high byte of its
    // DOS time, so a new time needs fresh encryption.
    let new_time = resolved.slot.is_some_and(|slot| slot.patch.mtime.is_some());
    if new_time
        && entry.encryption_method() == EncryptionMethod::TraditionalPkware
        && entry.flags().contains(GeneralPurposeFlags::DATA_DESCRIPTOR)
    {
        return Path::Reencode;
    }
    Path::Rewrite
}

/// Runs a commit. The caller consumes the archive afterwards.
pub(crate) fn run(archive: &mut Archive, options: &CommitOptions) -> Result<CommitResult> {
    if archive.is_read_only() || !archive.has_changes() {
        log::debug!("commit: nothing to write");
        return Ok(CommitResult::no_op());
    }
    for content in archive.changes.contents_mut() {
        content.prepare().map_err(|e| Error::commit_failed(&e))?;
    }

    let archive: &Archive = archive;
    let survivors: Vec<usize> = (0..archive.changes.index_count())
        .filter(|&index| archive.changes.exists(index))
        .collect();
    let deleted = (0..archive.directory.len())
        .filter(|&index| !archive.changes.exists(index))
        .count();
    log::debug!(
        "commit plan: {} entries to write, {} deleted",
        survivors.len(),
        deleted
    );

    if survivors.is_empty() {
        return remove_archive(archive, deleted);
    }

    with_sink(&archive.source, |sink| sink.begin_write()).map_err(|e| Error::commit_failed(&e))?;
    let mut result = CommitResult {
        entries_deleted: deleted,
        ..Default::default()
    };
    let outcome = write_archive(archive, options, &survivors, &mut result)
        .and_then(|()| with_sink(&archive.source, |sink| sink.commit_write()));
    match outcome {
        Ok(()) => {
            log::debug!(
                "commit wrote {} entries ({} copied, {} re-encoded), {} bytes",
                result.entries_written,
                result.entries_copied,
                result.entries_reencoded,
                result.bytes_written
            );
            Ok(result)
        }
        Err(e) => {
            log::warn!("commit failed, rolling back: {}", e);
            let mut guard = lock_or_recover(&archive.source);
            if let Some(sink) = guard.as_writable() {
                sink.rollback_write();
            }
            Err(Error::commit_failed(&e))
        }
    }
}

fn remove_archive(archive: &Archive, deleted: usize) -> Result<CommitResult> {
    if !archive.existed {
        log::debug!("commit: new archive has no entries, not creating it");
        return Ok(CommitResult::no_op());
    }
    with_sink(&archive.source, |sink| sink.remove()).map_err(|e| Error::commit_failed(&e))?;
    log::debug!("commit: no entries left, archive removed");
    Ok(CommitResult {
        entries_deleted: deleted,
        archive_removed: true,
        ..Default::default()
    })
}

fn write_archive(
    archive: &Archive,
    options: &CommitOptions,
    survivors: &[usize],
    result: &mut CommitResult,
) -> Result<()> {
    let mut out = CountingWriter::new(SinkWriter {
        source: &archive.source,
    });

    let leading = archive.directory.leading_len();
    if leading > 0 {
        log::trace!("carrying over {} leading bytes", leading);
        copy_range(&archive.source, 0, leading, &mut out)?;
    }

    let mut central = Vec::with_capacity(survivors.len());
    for &index in survivors {
        let resolved = archive.changes.resolve(index, &archive.directory)?;
        let offset = out.count();
        let path = choose_path(&resolved);
        log::trace!("entry {}: {:?} at offset {}", index, path, offset);

        let header = match (path, resolved.original) {
            (Path::Copy, Some(entry)) => {
                result.entries_copied += 1;
                copy_entry(archive, entry, offset, &mut out)?
            }
            (Path::Rewrite, Some(entry)) => {
                result.entries_copied += 1;
                rewrite_entry(archive, &resolved, entry, offset, &mut out)?
            }
            _ => {
                result.entries_reencoded += 1;
                reencode_entry(archive, &resolved, options, offset, &mut out)?
            }
        };
        if resolved.original.is_none() {
            result.entries_added += 1;
        }
        central.push(header);
    }

    let cd_offset = out.count();
    for header in &central {
        out.write_all(&header.encode()?).map_err(Error::from_io)?;
    }
    let cd_size = out.count() - cd_offset;
    let trailer = encode_trailer(
        central.len() as u64,
        cd_offset,
        cd_size,
        archive.comment_raw(Version::Current),
        made_by(ExternalAttributes::default_file()),
    )?;
    out.write_all(&trailer).map_err(Error::from_io)?;

    result.entries_written = central.len();
    result.bytes_written = out.count();
    Ok(())
}

// ============================================================================
// Copy and rewrite
// ============================================================================

/// Where an original entry's bytes lie.
struct Extent {
    local: LocalHeader,
    header_len: u64,
    descriptor_len: u64,
}

impl Extent {
    fn read(source: &Mutex<Box<dyn Source>>, entry: &DirectoryEntry) -> Result<Self> {
        let mut guard = lock_or_recover(source);
        let seekable = guard.as_seekable().ok_or(Error::UnsupportedOperation {
            operation: "copy entries from a non-seekable source",
        })?;
        let offset = entry.local_header_offset();
        let (local, header_len) = read_local_header(seekable, offset)?;

        let descriptor_len = if entry.flags().contains(GeneralPurposeFlags::DATA_DESCRIPTOR) {
            let mut word = [0u8; 4];
            read_exact_at(seekable, offset + header_len + entry.compressed_size(), &mut word)?;
            let zip64 = extra::find(&local.extra, ids::ZIP64).is_some()
                || needs_zip64(entry.compressed_size())
                || needs_zip64(entry.uncompressed_size());
            data_descriptor_len(u32::from_le_bytes(word), zip64)
        } else {
            0
        };

        Ok(Self {
            local,
            header_len,
            descriptor_len,
        })
    }
}

fn copy_entry<W: Write>(
    archive: &Archive,
    entry: &DirectoryEntry,
    offset: u64,
    out: &mut W,
) -> Result<CentralHeader> {
    let extent = Extent::read(&archive.source, entry)?;
    let total = extent.header_len + entry.compressed_size() + extent.descriptor_len;
    copy_range(&archive.source, entry.local_header_offset(), total, out)?;

    let mut header = entry.header().clone();
    header.local_header_offset = offset;
    Ok(header)
}

fn rewrite_entry<W: Write>(
    archive: &Archive,
    resolved: &ResolvedEntry<'_>,
    entry: &DirectoryEntry,
    offset: u64,
    out: &mut W,
) -> Result<CentralHeader> {
    let extent = Extent::read(&archive.source, entry)?;
    let new_time = resolved.slot.and_then(|slot| slot.patch.mtime);
    let (dos_date, dos_time) = match new_time {
        Some(mtime) => mtime.to_dos(),
        None => entry.dos_datetime(),
    };

    let keep_descriptor = entry.flags().contains(GeneralPurposeFlags::DATA_DESCRIPTOR)
        && entry.encryption_method() == EncryptionMethod::TraditionalPkware;
    let mut flags = entry.flags();
    flags.set(GeneralPurposeFlags::UTF8, resolved.utf8);
    flags.set(GeneralPurposeFlags::DATA_DESCRIPTOR, keep_descriptor);

    let (local_extra, central_extra) = header_extras(
        resolved,
        &extent.local.extra,
        new_time.is_some(),
        entry.aes_extra().copied(),
    );
    let compressed = entry.compressed_size();
    let uncompressed = entry.uncompressed_size();
    let zip64 = needs_zip64(compressed) || needs_zip64(uncompressed);

    let local = LocalHeader {
        version_needed: entry.version_needed(),
        flags,
        method: entry.raw_method(),
        dos_time,
        dos_date,
        crc32: entry.crc32(),
        compressed_size: compressed,
        uncompressed_size: uncompressed,
        name: resolved.name.to_vec(),
        extra: local_extra,
    };
    out.write_all(&local.encode(zip64)?).map_err(Error::from_io)?;
    let data_start = entry.local_header_offset() + extent.header_len;
    copy_range(&archive.source, data_start, compressed, out)?;
    if keep_descriptor {
        write_data_descriptor(out, entry.crc32(), compressed, uncompressed, zip64)
            .map_err(Error::from_io)?;
    }

    Ok(CentralHeader {
        version_made_by: made_by(resolved.external_attributes),
        version_needed: entry.version_needed(),
        flags,
        method: entry.raw_method(),
        dos_time,
        dos_date,
        crc32: entry.crc32(),
        compressed_size: compressed,
        uncompressed_size: uncompressed,
        disk_start: 0,
        internal_attributes: entry.internal_attributes(),
        external_attributes: resolved.external_attributes.attributes,
        local_header_offset: offset,
        name: resolved.name.to_vec(),
        extra: central_extra,
        comment: resolved.comment.to_vec(),
    })
}

// ============================================================================
// Re-encode
// ============================================================================

/// Extra fields of an original entry's local header.
fn original_local_extra(
    archive: &Archive,
    index: usize,
    entry: &DirectoryEntry,
) -> Result<Vec<ExtraField>> {
    let mut guard = lock_or_recover(&archive.source);
    let seekable = guard.as_seekable().ok_or(Error::UnsupportedOperation {
        operation: "re-encode entries from a non-seekable source",
    })?;
    let (local, _) = read_local_header(seekable, entry.local_header_offset()).map_err(|e| {
        Error::EntryNotReadable {
            index,
            reason: e.to_string(),
        }
    })?;
    Ok(local.extra)
}

fn reencode_entry(
    archive: &Archive,
    resolved: &ResolvedEntry<'_>,
    options: &CommitOptions,
    offset: u64,
    out: &mut CountingWriter<SinkWriter<'_>>,
) -> Result<CentralHeader> {
    let index = resolved.index;
    let (method, level) = match (resolved.compression, resolved.content) {
        (Some(setting), _) => (setting.method, setting.level),
        (None, Content::Original(entry)) => (entry.compression_method(), None),
        (None, Content::Replaced(_)) if resolved.name.ends_with(b"/") => {
            (CompressionMethod::Stored, None)
        }
        (None, Content::Replaced(_)) => (options.compression, options.level),
    };
    if !method.is_encode_supported() {
        return Err(Error::UnsupportedMethod {
            method_id: method.as_u16(),
        });
    }

    let encryption = resolved.encryption;
    if !encryption.is_supported() {
        return Err(Error::UnsupportedEncryption {
            method_id: encryption.as_u16(),
        });
    }
    let password = if encryption.is_encrypted() {
        let password = resolved
            .password
            .or(archive.default_password.as_ref())
            .ok_or(Error::PasswordRequired { entry_index: index })?;
        Some(password)
    } else {
        None
    };

    let new_time = resolved.is_replaced()
        || resolved.slot.is_some_and(|slot| slot.patch.mtime.is_some());
    let (dos_date, dos_time) = match resolved.original {
        Some(entry) if !new_time => entry.dos_datetime(),
        _ => resolved.mtime.to_dos(),
    };

    let aes = encryption.aes_strength().map(|strength| AesExtraField {
        vendor_version: 1,
        strength,
        compression_method: method.as_u16(),
    });
    let original_local = match (resolved.extra, resolved.original) {
        (None, Some(entry)) => original_local_extra(archive, index, entry)?,
        _ => Vec::new(),
    };
    let (local_extra, central_extra) = header_extras(resolved, &original_local, new_time, aes);

    let pkware = encryption == EncryptionMethod::TraditionalPkware;
    let mut flags = GeneralPurposeFlags::empty();
    flags.set(GeneralPurposeFlags::UTF8, resolved.utf8);
    flags.set(GeneralPurposeFlags::ENCRYPTED, encryption.is_encrypted());
    flags.set(GeneralPurposeFlags::DATA_DESCRIPTOR, pkware);
    flags |= method.option_flags(level);

    let raw_method = if aes.is_some() {
        AES_METHOD
    } else {
        method.as_u16()
    };
    let mut version_needed = method.version_needed().max(version::DEFAULT);
    if aes.is_some() {
        version_needed = version_needed.max(version::AES);
    }

    let size_hint = match resolved.content {
        Content::Replaced(content) => content.size(),
        Content::Original(entry) => Some(entry.uncompressed_size()),
    };
    let zip64 = size_hint.is_none_or(|size| size >= ZIP64_RESERVE_THRESHOLD);

    let mut local = LocalHeader {
        version_needed,
        flags,
        method: raw_method,
        dos_time,
        dos_date,
        crc32: 0,
        compressed_size: 0,
        uncompressed_size: 0,
        name: resolved.name.to_vec(),
        extra: local_extra,
    };
    out.write_all(&local.encode(zip64)?).map_err(Error::from_io)?;
    let data_start = out.count();

    let mut reader = Entry::new(archive, index, Version::Current)?
        .open(archive.default_password.as_ref())?;
    let (crc, uncompressed) = {
        let check_byte = (dos_time >> 8) as u8;
        let sealed = EncryptingWriter::new(encryption, password, check_byte, &mut *out)?;
        pump(&mut reader, method, level, sealed)?
    };
    reader.close()?;
    let compressed = out.count() - data_start;
    log::trace!(
        "entry {}: {} -> {} bytes ({}, {})",
        index,
        uncompressed,
        compressed,
        method,
        encryption
    );

    if !zip64 && (needs_zip64(compressed) || needs_zip64(uncompressed)) {
        return Err(Error::IntegerOverflow {
            what: "entry size without a reserved ZIP64 local header",
        });
    }
    local.crc32 = crc;
    if pkware {
        write_data_descriptor(out, crc, compressed, uncompressed, zip64).map_err(Error::from_io)?;
    } else {
        local.compressed_size = compressed;
        local.uncompressed_size = uncompressed;
        let patched = local.encode(zip64)?;
        let end = out.count();
        with_sink(&archive.source, |sink| {
            sink.seek_write(SeekFrom::Start(offset))?;
            write_all(sink, &patched)?;
            sink.seek_write(SeekFrom::Start(end))?;
            Ok(())
        })?;
    }

    Ok(CentralHeader {
        version_made_by: made_by(resolved.external_attributes),
        version_needed,
        flags,
        method: raw_method,
        dos_time,
        dos_date,
        crc32: crc,
        compressed_size: compressed,
        uncompressed_size: uncompressed,
        disk_start: 0,
        internal_attributes: resolved.original.map_or(0, |entry| entry.internal_attributes()),
        external_attributes: resolved.external_attributes.attributes,
        local_header_offset: offset,
        name: resolved.name.to_vec(),
        extra: central_extra,
        comment: resolved.comment.to_vec(),
    })
}

/// Streams plaintext through CRC, compression and encryption.
///
/// Returns the CRC and the number of plaintext bytes.
fn pump<W: Write + Send>(
    reader: &mut crate::entry::EntryReader<'_>,
    method: CompressionMethod,
    level: Option<u32>,
    mut sealed: EncryptingWriter<W>,
) -> Result<(u32, u64)> {
    let mut plain = Crc32Reader::new(reader);
    {
        let mut encoder = codec::build_encoder(method, level, &mut sealed)?;
        io::copy(&mut plain, &mut encoder).map_err(Error::from_io)?;
        encoder.finish().map_err(Error::from_io)?;
    }
    sealed.finish().map_err(Error::from_io)?;
    Ok((plain.crc(), plain.bytes_read()))
}

// ============================================================================
// Helpers
// ============================================================================

/// Splits the effective user extra fields into local and central lists.
///
/// A pending override wins over the stored fields. Engine-managed fields are
/// dropped; the AES field, when given, leads both lists.
fn header_extras(
    resolved: &ResolvedEntry<'_>,
    original_local: &[ExtraField],
    new_time: bool,
    aes: Option<AesExtraField>,
) -> (Vec<ExtraField>, Vec<ExtraField>) {
    let (mut local, mut central): (Vec<ExtraField>, Vec<ExtraField>) = match resolved.extra {
        Some(fields) => (
            fields
                .iter()
                .filter(|f| f.location.intersects(ExtraLocation::LOCAL))
                .cloned()
                .collect(),
            fields
                .iter()
                .filter(|f| f.location.intersects(ExtraLocation::CENTRAL))
                .cloned()
                .collect(),
        ),
        None => (
            original_local.to_vec(),
            resolved
                .original
                .map(|entry| entry.extra_fields().to_vec())
                .unwrap_or_default(),
        ),
    };

    // A stale extended timestamp would shadow the new DOS time.
    let keep = |f: &ExtraField| {
        !extra::is_internal(f.id) && !(new_time && f.id == ids::EXTENDED_TIMESTAMP)
    };
    local.retain(keep);
    central.retain(keep);

    if let Some(aes) = aes {
        let field = ExtraField::new(ids::WINZIP_AES, aes.encode(), ExtraLocation::BOTH);
        local.insert(0, field.clone());
        central.insert(0, field);
    }
    (local, central)
}

/// "Version made by": the attribute host in the high byte.
fn made_by(attributes: ExternalAttributes) -> u16 {
    (u16::from(attributes.os.as_u8()) << 8) | version::MADE_BY
}

fn copy_range<W: Write>(
    source: &Mutex<Box<dyn Source>>,
    start: u64,
    len: u64,
    out: &mut W,
) -> Result<()> {
    let mut reader = SharedSourceReader::range(source, start, len);
    let copied = io::copy(&mut reader, out).map_err(Error::from_io)?;
    if copied != len {
        return Err(Error::corrupt(
            start + copied,
            format!("expected {} bytes of entry data, found {}", len, copied),
        ));
    }
    Ok(())
}

fn with_sink<T>(
    source: &Mutex<Box<dyn Source>>,
    f: impl FnOnce(&mut dyn WritableSource) -> Result<T>,
) -> Result<T> {
    let mut guard = lock_or_recover(source);
    let sink = guard.as_writable().ok_or(Error::UnsupportedOperation {
        operation: "commit to a source that is not writable",
    })?;
    f(sink)
}

fn write_all(sink: &mut dyn WritableSource, mut buf: &[u8]) -> Result<()> {
    while !buf.is_empty() {
        let n = sink.write(buf)?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::WriteZero,
                "sink accepted no bytes",
            )));
        }
        buf = &buf[n..];
    }
    Ok(())
}

/// `Write` into the staged output of the archive's own source.
///
/// The lock is taken per call so entry readers over the same source can run
/// in between.
struct SinkWriter<'a> {
    source: &'a Mutex<Box<dyn Source>>,
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = lock_or_recover(self.source);
        let sink = guard.as_writable().ok_or_else(|| {
            io::Error::new(io::ErrorKind::Unsupported, "source is not writable")
        })?;
        Ok(sink.write(buf)?)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
