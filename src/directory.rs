//! Central directory reader.
//!
//! [`Directory::parse`] finds the end of central directory record, follows
//! the ZIP64 locator when the classic fields are saturated, and reads every
//! central header into a [`DirectoryEntry`]. The result is the archive as it
//! was at open time; pending changes live in the change set.

use std::io::{Cursor, SeekFrom};

use crate::attributes::{ExternalAttributes, OperatingSystem};
use crate::codec::CompressionMethod;
use crate::crypto::EncryptionMethod;
use crate::encoding::{self, StringDecoding};
use crate::format::eocd::{Eocd, MAX_EOCD_SEARCH, Zip64Eocd, Zip64Locator, find_eocd};
use crate::format::extra::{self, AesExtraField, ExtraField, UnicodeExtra, ids};
use crate::format::header::{CentralHeader, LocalHeader};
use crate::format::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, EOCD_LEN, GeneralPurposeFlags, LOCAL_HEADER_LEN,
    ZIP64_EOCD_LEN, ZIP64_LOCATOR_LEN,
};
use crate::format::reader::u16_at;
use crate::source::{SeekableSource, read_exact_at};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Compression method value that marks WinZip AES entries.
pub(crate) const AES_METHOD: u16 = 99;

bitflags::bitflags! {
    /// Options for [`Directory::locate`] and `Archive::locate`.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct LocateFlags: u32 {
        /// ASCII case-insensitive comparison.
        const NOCASE = 1;
        /// Compare only the final path component of entry names.
        const NODIR = 2;
    }
}

/// One central directory record, as read at open time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryEntry {
    index: usize,
    header: CentralHeader,
    method: CompressionMethod,
    encryption: EncryptionMethod,
    aes: Option<AesExtraField>,
}

impl DirectoryEntry {
    pub(crate) fn new(index: usize, header: CentralHeader) -> Self {
        let aes = extra::find(&header.extra, ids::WINZIP_AES)
            .and_then(|field| AesExtraField::parse(&field.data));
        let method = match aes {
            Some(aes) if header.method == AES_METHOD => {
                CompressionMethod::from_u16(aes.compression_method)
            }
            _ => CompressionMethod::from_u16(header.method),
        };
        let encryption = decode_encryption(&header, aes.as_ref());
        Self {
            index,
            header,
            method,
            encryption,
            aes,
        }
    }

    /// Position in the central directory.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Raw name bytes.
    pub fn name_raw(&self) -> &[u8] {
        &self.header.name
    }

    /// Name decoded with `decoding`.
    pub fn name(&self, decoding: StringDecoding) -> String {
        let unicode = self.unicode_extra(ids::UNICODE_PATH);
        encoding::decode(
            &self.header.name,
            self.header.flags.contains(GeneralPurposeFlags::UTF8),
            unicode.as_ref(),
            decoding,
        )
    }

    /// Raw comment bytes.
    pub fn comment_raw(&self) -> &[u8] {
        &self.header.comment
    }

    /// Comment decoded with `decoding`.
    pub fn comment(&self, decoding: StringDecoding) -> String {
        let unicode = self.unicode_extra(ids::UNICODE_COMMENT);
        encoding::decode(
            &self.header.comment,
            self.header.flags.contains(GeneralPurposeFlags::UTF8),
            unicode.as_ref(),
            decoding,
        )
    }

    fn unicode_extra(&self, id: u16) -> Option<UnicodeExtra> {
        extra::find(&self.header.extra, id).and_then(|field| UnicodeExtra::parse(&field.data))
    }

    /// General-purpose flags.
    pub fn flags(&self) -> GeneralPurposeFlags {
        self.header.flags
    }

    /// Version made by.
    pub fn version_made_by(&self) -> u16 {
        self.header.version_made_by
    }

    /// Version needed to extract.
    pub fn version_needed(&self) -> u16 {
        self.header.version_needed
    }

    /// The raw method field (99 for WinZip AES entries).
    pub fn raw_method(&self) -> u16 {
        self.header.method
    }

    /// The compression method applied to the data.
    ///
    /// For WinZip AES entries this is the method from the AES extra field.
    pub fn compression_method(&self) -> CompressionMethod {
        self.method
    }

    /// The encryption method.
    pub fn encryption_method(&self) -> EncryptionMethod {
        self.encryption
    }

    /// The WinZip AES extra field, for AES entries.
    pub fn aes_extra(&self) -> Option<&AesExtraField> {
        self.aes.as_ref()
    }

    /// Returns true for AE-2 entries, whose CRC field is not meaningful.
    pub fn is_aes_v2(&self) -> bool {
        self.aes.is_some_and(|aes| aes.vendor_version == 2)
    }

    /// DOS `(date, time)` pair.
    pub fn dos_datetime(&self) -> (u16, u16) {
        (self.header.dos_date, self.header.dos_time)
    }

    /// Modification time, preferring the extended timestamp field.
    pub fn modified(&self) -> Timestamp {
        extra::find(&self.header.extra, ids::EXTENDED_TIMESTAMP)
            .and_then(|field| extra::parse_extended_mtime(&field.data))
            .map(Timestamp::from_unix_secs)
            .unwrap_or_else(|| Timestamp::from_dos(self.header.dos_date, self.header.dos_time))
    }

    /// CRC-32 of the uncompressed data.
    pub fn crc32(&self) -> u32 {
        self.header.crc32
    }

    /// Size of the stored data, including encryption overhead.
    pub fn compressed_size(&self) -> u64 {
        self.header.compressed_size
    }

    /// Size of the uncompressed data.
    pub fn uncompressed_size(&self) -> u64 {
        self.header.uncompressed_size
    }

    /// Disk on which the entry starts.
    pub fn disk_number(&self) -> u32 {
        self.header.disk_start
    }

    /// Internal file attributes.
    pub fn internal_attributes(&self) -> u16 {
        self.header.internal_attributes
    }

    /// External attributes tagged with the host system.
    pub fn external_attributes(&self) -> ExternalAttributes {
        let os = OperatingSystem::from_u8((self.header.version_made_by >> 8) as u8);
        ExternalAttributes::new(os, self.header.external_attributes)
    }

    /// Absolute offset of the local header in the source.
    pub fn local_header_offset(&self) -> u64 {
        self.header.local_header_offset
    }

    /// Central extra fields in stored order.
    pub fn extra_fields(&self) -> &[ExtraField] {
        &self.header.extra
    }

    /// Returns true if the name ends with `/` or the attributes say so.
    pub fn is_directory(&self) -> bool {
        self.header.name.ends_with(b"/") || self.external_attributes().is_directory()
    }

    pub(crate) fn header(&self) -> &CentralHeader {
        &self.header
    }
}

fn decode_encryption(header: &CentralHeader, aes: Option<&AesExtraField>) -> EncryptionMethod {
    if !header.flags.contains(GeneralPurposeFlags::ENCRYPTED) {
        return EncryptionMethod::None;
    }
    if header.flags.contains(GeneralPurposeFlags::STRONG_ENCRYPTION) {
        return EncryptionMethod::Unknown(0xFFFF);
    }
    if header.method == AES_METHOD {
        return match aes {
            Some(aes) => EncryptionMethod::from_aes_strength(aes.strength),
            None => EncryptionMethod::Unknown(0xFFFF),
        };
    }
    EncryptionMethod::TraditionalPkware
}

/// An archive's central directory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<DirectoryEntry>,
    comment: Vec<u8>,
    cd_offset: u64,
    cd_size: u64,
    prefix_len: u64,
    zip64: bool,
}

impl Directory {
    /// A directory with no entries, for new archives.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Parses the central directory of the archive in `source`.
    ///
    /// An empty source parses as an empty archive. With `check_consistency`
    /// set, every local header is also checked against its central record,
    /// and size mismatches that are otherwise only logged become errors.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CorruptArchive`] when no end of central directory
    /// record is found, when a record is truncated or has a bad signature,
    /// and for multi-disk archives.
    pub fn parse(source: &mut dyn SeekableSource, check_consistency: bool) -> Result<Self> {
        let size = source.seek(SeekFrom::End(0))?;
        if size == 0 {
            return Ok(Self::empty());
        }
        if size < EOCD_LEN as u64 {
            return Err(Error::corrupt(0, "file too small to be a ZIP archive"));
        }

        let tail_len = size.min(MAX_EOCD_SEARCH as u64);
        let tail_start = size - tail_len;
        let mut tail = vec![0u8; tail_len as usize];
        read_exact_at(source, tail_start, &mut tail)?;
        let eocd_rel = find_eocd(&tail)
            .ok_or_else(|| Error::corrupt(size, "end of central directory not found"))?;
        let eocd_pos = tail_start + eocd_rel as u64;
        let eocd = Eocd::parse(&tail[eocd_rel..], eocd_pos)?;
        let trailing = size - eocd_pos - EOCD_LEN as u64 - eocd.comment.len() as u64;
        if trailing > 0 {
            log::warn!("{} bytes of trailing data after the archive comment", trailing);
        }

        if eocd.disk_number != 0 || eocd.cd_disk != 0 || eocd.entries_on_disk != eocd.total_entries
        {
            return Err(Error::corrupt(eocd_pos, "multi-disk archives are not supported"));
        }

        let mut count = u64::from(eocd.total_entries);
        let mut cd_size = u64::from(eocd.cd_size);
        let mut cd_offset = u64::from(eocd.cd_offset);
        let mut cd_end = eocd_pos;
        let zip64 = eocd.is_zip64();
        if zip64 {
            let (pos, record) = Self::read_zip64_record(source, eocd_pos)?;
            if record.disk_number != 0
                || record.cd_disk != 0
                || record.entries_on_disk != record.total_entries
            {
                return Err(Error::corrupt(pos, "multi-disk archives are not supported"));
            }
            count = record.total_entries;
            cd_size = record.cd_size;
            cd_offset = record.cd_offset;
            cd_end = pos;
        }

        let declared_end = cd_offset
            .checked_add(cd_size)
            .filter(|&end| end <= cd_end)
            .ok_or_else(|| {
                Error::corrupt(eocd_pos, "central directory extends past its end record")
            })?;
        let prefix_len =
            Self::detect_prefix(source, cd_offset, cd_end - declared_end, count, check_consistency)?;
        let cd_start = cd_offset + prefix_len;

        if count > cd_size / CENTRAL_HEADER_LEN as u64 {
            return Err(Error::corrupt(
                cd_start,
                format!(
                    "{} entries cannot fit in a {}-byte central directory",
                    count, cd_size
                ),
            ));
        }

        let mut cd = vec![0u8; cd_size as usize];
        read_exact_at(source, cd_start, &mut cd)?;
        let mut cursor = Cursor::new(cd.as_slice());
        let mut entries = Vec::with_capacity(count as usize);
        for index in 0..count as usize {
            let at = cd_start + cursor.position();
            let mut header = CentralHeader::read(&mut cursor, at)?;
            if header.has_unresolved_zip64_marker() {
                let reason = format!(
                    "entry {} has a saturated size or offset but no ZIP64 extra field",
                    index
                );
                if check_consistency {
                    return Err(Error::corrupt(at, reason));
                }
                log::warn!("{}", reason);
            }
            if header.disk_start != 0 {
                return Err(Error::corrupt(at, "entry starts on another disk"));
            }
            header.local_header_offset = header
                .local_header_offset
                .checked_add(prefix_len)
                .ok_or(Error::IntegerOverflow {
                    what: "local header offset",
                })?;
            entries.push(DirectoryEntry::new(index, header));
        }

        let consumed = cursor.position();
        if consumed != cd_size {
            let reason = format!(
                "central directory is {} bytes but its headers use {}",
                cd_size, consumed
            );
            if check_consistency {
                return Err(Error::corrupt(cd_start + consumed, reason));
            }
            log::warn!("{}", reason);
        }

        if check_consistency {
            for entry in &entries {
                Self::check_local_header(source, entry, cd_start)?;
            }
        }

        log::debug!(
            "parsed central directory: {} entries, zip64: {}, prefix: {} bytes",
            entries.len(),
            zip64,
            prefix_len
        );

        Ok(Self {
            entries,
            comment: eocd.comment,
            cd_offset: cd_start,
            cd_size,
            prefix_len,
            zip64,
        })
    }

    /// Reads the ZIP64 record referenced by the locator before `eocd_pos`.
    fn read_zip64_record(source: &mut dyn SeekableSource, eocd_pos: u64) -> Result<(u64, Zip64Eocd)> {
        let locator_pos = eocd_pos
            .checked_sub(ZIP64_LOCATOR_LEN as u64)
            .ok_or_else(|| Error::corrupt(eocd_pos, "missing ZIP64 locator"))?;
        let mut buf = [0u8; ZIP64_LOCATOR_LEN];
        read_exact_at(source, locator_pos, &mut buf)?;
        let locator = Zip64Locator::parse(&buf)
            .ok_or_else(|| Error::corrupt(locator_pos, "missing ZIP64 locator"))?;
        if locator.eocd_disk != 0 || locator.total_disks > 1 {
            return Err(Error::corrupt(locator_pos, "multi-disk archives are not supported"));
        }

        let mut record = [0u8; ZIP64_EOCD_LEN];
        let declared = locator.eocd_offset;
        if declared
            .checked_add(ZIP64_EOCD_LEN as u64)
            .is_some_and(|end| end <= locator_pos)
        {
            read_exact_at(source, declared, &mut record)?;
            if let Ok(parsed) = Zip64Eocd::parse(&record, declared) {
                return Ok((declared, parsed));
            }
        }

        // With a prepended stub the declared offset is short by the stub length.
        let adjacent = locator_pos
            .checked_sub(ZIP64_EOCD_LEN as u64)
            .ok_or_else(|| Error::corrupt(locator_pos, "missing ZIP64 end of central directory"))?;
        read_exact_at(source, adjacent, &mut record)?;
        let parsed = Zip64Eocd::parse(&record, adjacent)?;
        Ok((adjacent, parsed))
    }

    /// Works out how many bytes precede the archive proper.
    fn detect_prefix(
        source: &mut dyn SeekableSource,
        cd_offset: u64,
        gap: u64,
        count: u64,
        check_consistency: bool,
    ) -> Result<u64> {
        if gap == 0 {
            return Ok(0);
        }
        if count == 0 || Self::has_central_signature(source, cd_offset + gap)? {
            log::debug!("archive is preceded by {} bytes of prefix data", gap);
            return Ok(gap);
        }
        if Self::has_central_signature(source, cd_offset)? {
            let reason = format!(
                "{} bytes between the central directory and its end record",
                gap
            );
            if check_consistency {
                return Err(Error::corrupt(cd_offset, reason));
            }
            log::warn!("{}", reason);
            return Ok(0);
        }
        Err(Error::corrupt(cd_offset, "central directory not found"))
    }

    fn has_central_signature(source: &mut dyn SeekableSource, offset: u64) -> Result<bool> {
        let mut sig = [0u8; 4];
        match read_exact_at(source, offset, &mut sig) {
            Ok(()) => Ok(u32::from_le_bytes(sig) == CENTRAL_HEADER_SIGNATURE),
            Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn check_local_header(
        source: &mut dyn SeekableSource,
        entry: &DirectoryEntry,
        cd_start: u64,
    ) -> Result<()> {
        let offset = entry.local_header_offset();
        if offset >= cd_start {
            return Err(Error::corrupt(
                offset,
                format!("entry {} starts inside the central directory", entry.index()),
            ));
        }
        let (local, header_len) = read_local_header(source, offset)?;
        if local.name != entry.name_raw() {
            return Err(Error::corrupt(
                offset,
                format!(
                    "local name of entry {} differs from its central name",
                    entry.index()
                ),
            ));
        }
        let data_end = offset
            .checked_add(header_len)
            .and_then(|v| v.checked_add(entry.compressed_size()));
        if data_end.is_none_or(|end| end > cd_start) {
            return Err(Error::corrupt(
                offset,
                format!("entry {} overlaps the central directory", entry.index()),
            ));
        }
        Ok(())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if there are no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// The entry at `index`.
    pub fn get(&self, index: usize) -> Option<&DirectoryEntry> {
        self.entries.get(index)
    }

    /// All entries in central directory order.
    pub fn entries(&self) -> &[DirectoryEntry] {
        &self.entries
    }

    /// Raw archive comment.
    pub fn comment_raw(&self) -> &[u8] {
        &self.comment
    }

    /// Absolute offset of the central directory.
    pub fn cd_offset(&self) -> u64 {
        self.cd_offset
    }

    /// Size of the central directory in bytes.
    pub fn cd_size(&self) -> u64 {
        self.cd_size
    }

    /// Bytes preceding the archive, such as a self-extractor stub.
    pub fn prefix_len(&self) -> u64 {
        self.prefix_len
    }

    /// Offset of the first local header, or of the central directory when
    /// there are no entries. Everything before it is carried over by commit.
    pub fn leading_len(&self) -> u64 {
        self.entries
            .iter()
            .map(DirectoryEntry::local_header_offset)
            .fold(self.cd_offset, u64::min)
    }

    /// Returns true if the archive uses a ZIP64 end of central directory.
    pub fn is_zip64(&self) -> bool {
        self.zip64
    }

    /// Finds the first entry whose name matches `name`.
    pub fn locate(&self, name: &str, flags: LocateFlags) -> Option<usize> {
        self.entries
            .iter()
            .position(|entry| {
                name_matches(
                    entry.name_raw(),
                    &entry.name(StringDecoding::Guess),
                    name,
                    flags,
                )
            })
    }
}

/// Reads the local header at `offset`, returning it with its encoded length.
pub(crate) fn read_local_header(
    source: &mut dyn SeekableSource,
    offset: u64,
) -> Result<(LocalHeader, u64)> {
    let mut fixed = [0u8; LOCAL_HEADER_LEN];
    read_exact_at(source, offset, &mut fixed)
        .map_err(|_| Error::corrupt(offset, "truncated local header"))?;
    let name_len = usize::from(u16_at(&fixed, 26).unwrap_or(0));
    let extra_len = usize::from(u16_at(&fixed, 28).unwrap_or(0));
    let mut header = vec![0u8; LOCAL_HEADER_LEN + name_len + extra_len];
    read_exact_at(source, offset, &mut header)
        .map_err(|_| Error::corrupt(offset, "truncated local header"))?;
    LocalHeader::read(&mut header.as_slice(), offset)
}

/// Compares an entry name with a wanted name under `flags`.
///
/// The raw bytes and the decoded text are both tried, so a lookup succeeds
/// whether the caller passes the stored spelling or its Unicode form.
pub(crate) fn name_matches(raw: &[u8], decoded: &str, wanted: &str, flags: LocateFlags) -> bool {
    let compare = |candidate: &[u8]| {
        let candidate = if flags.contains(LocateFlags::NODIR) {
            candidate
                .rsplit(|&b| b == b'/')
                .next()
                .unwrap_or(candidate)
        } else {
            candidate
        };
        if flags.contains(LocateFlags::NOCASE) {
            candidate.eq_ignore_ascii_case(wanted.as_bytes())
        } else {
            candidate == wanted.as_bytes()
        }
    };
    compare(raw) || compare(decoded.as_bytes())
}
