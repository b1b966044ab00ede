//! Entry handles and the streaming entry reader.
//!
//! An [`Entry`] is a borrowed view of one entry of an [`Archive`]. It resolves
//! the effective metadata once, through the pending changes for
//! [`Version::Current`] or straight from the central directory for
//! [`Version::Unchanged`], and then answers queries without further I/O
//! (local extra fields excepted, which are read on demand).
//!
//! [`Entry::open`] yields an [`EntryReader`], which moves from open to closed
//! exactly once and implements [`std::io::Read`].

use std::io::{self, Read, SeekFrom};

use crate::archive::Archive;
use crate::attributes::ExternalAttributes;
use crate::changes::{Content, ContentSource, ResolvedEntry};
use crate::checksum::Crc32;
use crate::codec::{self, CompressionMethod, Decoder};
use crate::crypto::{self, DecryptParams, EncryptionMethod, Password};
use crate::directory::{DirectoryEntry, read_local_header};
use crate::encoding::{self, StringDecoding};
use crate::format::GeneralPurposeFlags;
use crate::format::extra::{self, ExtraField, ExtraLocation, UnicodeExtra, ids};
use crate::source::{SharedSourceReader, lock_or_recover, resolve_seek};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Which state of the archive a query sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Version {
    /// The archive with all pending changes applied.
    #[default]
    Current,
    /// The archive as it was opened, ignoring pending changes.
    Unchanged,
}

/// A snapshot of an entry's metadata.
///
/// Fields are `None` when the value is not known yet, for example the CRC
/// and compressed size of content that has not been committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryStat {
    /// The entry's index.
    pub index: usize,
    /// The name, decoded with [`StringDecoding::Guess`].
    pub name: String,
    /// Uncompressed size.
    pub size: Option<u64>,
    /// Stored size, including encryption overhead.
    pub compressed_size: Option<u64>,
    /// CRC-32 of the uncompressed data.
    pub crc32: Option<u32>,
    /// Modification time.
    pub modified: Option<Timestamp>,
    /// Compression method.
    pub compression_method: Option<CompressionMethod>,
    /// Encryption method.
    pub encryption_method: Option<EncryptionMethod>,
}

/// A read-only view of one entry.
#[derive(Debug, Clone)]
pub struct Entry<'a> {
    archive: &'a Archive,
    resolved: ResolvedEntry<'a>,
    version: Version,
}

impl<'a> Entry<'a> {
    pub(crate) fn new(archive: &'a Archive, index: usize, version: Version) -> Result<Self> {
        let resolved = match version {
            Version::Current => archive.changes.resolve(index, &archive.directory)?,
            Version::Unchanged => match archive.directory.get(index) {
                Some(entry) => ResolvedEntry::original(entry),
                None if index < archive.changes.index_count() => {
                    return Err(Error::not_found_index(index));
                }
                None => {
                    return Err(Error::InvalidIndex {
                        index,
                        count: archive.changes.index_count(),
                    });
                }
            },
        };
        Ok(Self {
            archive,
            resolved,
            version,
        })
    }

    /// The entry's index.
    pub fn index(&self) -> usize {
        self.resolved.index
    }

    /// The version this handle was resolved against.
    pub fn version(&self) -> Version {
        self.version
    }

    /// Raw name bytes.
    pub fn name_raw(&self) -> &'a [u8] {
        self.resolved.name
    }

    /// Name decoded with `decoding`.
    pub fn name(&self, decoding: StringDecoding) -> String {
        let unicode = self.unicode_extra(ids::UNICODE_PATH);
        encoding::decode(self.resolved.name, self.resolved.utf8, unicode.as_ref(), decoding)
    }

    /// Raw comment bytes.
    pub fn comment_raw(&self) -> &'a [u8] {
        self.resolved.comment
    }

    /// Comment decoded with `decoding`.
    pub fn comment(&self, decoding: StringDecoding) -> String {
        let unicode = self.unicode_extra(ids::UNICODE_COMMENT);
        encoding::decode(
            self.resolved.comment,
            self.resolved.utf8,
            unicode.as_ref(),
            decoding,
        )
    }

    fn unicode_extra(&self, id: u16) -> Option<UnicodeExtra> {
        extra::find(self.resolved.extra_fields(), id).and_then(|f| UnicodeExtra::parse(&f.data))
    }

    fn stored_original(&self) -> Option<&'a DirectoryEntry> {
        match self.resolved.content {
            Content::Original(entry) if self.resolved.is_header_only_change() => Some(entry),
            _ => None,
        }
    }

    /// Uncompressed size, if known.
    pub fn size(&self) -> Option<u64> {
        match self.resolved.content {
            Content::Original(entry) => Some(entry.uncompressed_size()),
            Content::Replaced(content) => content.size(),
        }
    }

    /// Stored size, known only while the stored data is unchanged.
    pub fn compressed_size(&self) -> Option<u64> {
        self.stored_original().map(DirectoryEntry::compressed_size)
    }

    /// CRC-32 of the uncompressed data, if known.
    ///
    /// AE-2 entries do not store a meaningful CRC and report `None`.
    pub fn crc32(&self) -> Option<u32> {
        match self.resolved.content {
            Content::Original(entry) if !entry.is_aes_v2() => Some(entry.crc32()),
            _ => None,
        }
    }

    /// Modification time.
    pub fn modified(&self) -> Timestamp {
        self.resolved.mtime
    }

    /// Compression method.
    pub fn compression_method(&self) -> CompressionMethod {
        self.resolved.compression_method()
    }

    /// Encryption method.
    pub fn encryption_method(&self) -> EncryptionMethod {
        self.resolved.encryption
    }

    /// Returns true if the entry is (or will be) encrypted.
    pub fn is_encrypted(&self) -> bool {
        self.resolved.encryption.is_encrypted()
    }

    /// External attributes.
    pub fn external_attributes(&self) -> ExternalAttributes {
        self.resolved.external_attributes
    }

    /// POSIX mode, when the attributes come from a Unix-like host.
    pub fn unix_mode(&self) -> Option<u32> {
        self.resolved.external_attributes.unix_mode()
    }

    /// Returns true for directory entries.
    pub fn is_directory(&self) -> bool {
        self.resolved.name.ends_with(b"/") || self.resolved.external_attributes.is_directory()
    }

    /// Returns true if the content was replaced or added and is not yet
    /// committed.
    pub fn is_replaced(&self) -> bool {
        self.resolved.is_replaced()
    }

    /// User extra fields present in the headers selected by `location`.
    ///
    /// Fields the engine regenerates itself (ZIP64 and WinZip AES) are not
    /// listed. Local fields of unchanged entries are read from the archive.
    pub fn extra_fields(&self, location: ExtraLocation) -> Result<Vec<ExtraField>> {
        let mut fields: Vec<ExtraField> = Vec::new();
        if let Some(overridden) = self.resolved.extra {
            fields.extend(
                overridden
                    .iter()
                    .filter(|f| f.location.intersects(location))
                    .cloned(),
            );
        } else {
            if location.contains(ExtraLocation::CENTRAL) {
                if let Some(entry) = self.resolved.original {
                    fields.extend(entry.extra_fields().iter().cloned());
                }
            }
            if location.contains(ExtraLocation::LOCAL) {
                fields.extend(self.local_extra_fields()?);
            }
        }
        fields.retain(|f| !extra::is_internal(f.id));
        Ok(fields)
    }

    fn local_extra_fields(&self) -> Result<Vec<ExtraField>> {
        let Some(entry) = self.resolved.original else {
            return Ok(Vec::new());
        };
        let mut guard = lock_or_recover(&self.archive.source);
        let seekable = guard.as_seekable().ok_or(Error::UnsupportedOperation {
            operation: "read local header from a non-seekable source",
        })?;
        let (local, _) = read_local_header(seekable, entry.local_header_offset())?;
        Ok(local.extra)
    }

    /// Number of user extra fields in `location`.
    pub fn extra_fields_count(&self, location: ExtraLocation) -> Result<usize> {
        Ok(self.extra_fields(location)?.len())
    }

    /// The extra field at position `index` within `location`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if there are fewer fields.
    pub fn extra_field(&self, index: usize, location: ExtraLocation) -> Result<ExtraField> {
        let mut fields = self.extra_fields(location)?;
        let count = fields.len();
        if index >= count {
            return Err(Error::InvalidIndex { index, count });
        }
        Ok(fields.swap_remove(index))
    }

    /// The `occurrence`-th extra field with `id` within `location`.
    pub fn extra_field_by_id(
        &self,
        id: u16,
        occurrence: usize,
        location: ExtraLocation,
    ) -> Result<Option<ExtraField>> {
        Ok(self
            .extra_fields(location)?
            .into_iter()
            .filter(|f| f.id == id)
            .nth(occurrence))
    }

    /// A metadata snapshot.
    pub fn stat(&self) -> EntryStat {
        EntryStat {
            index: self.index(),
            name: self.name(StringDecoding::Guess),
            size: self.size(),
            compressed_size: self.compressed_size(),
            crc32: self.crc32(),
            modified: Some(self.modified()),
            compression_method: Some(self.compression_method()),
            encryption_method: Some(self.encryption_method()),
        }
    }

    /// Opens the entry's content for reading.
    ///
    /// Original data is decrypted and decompressed; replaced or added content
    /// is read as is. Original data is decrypted with `password`, or else
    /// with the archive default.
    ///
    /// # Errors
    ///
    /// - [`Error::PasswordRequired`] if the data is encrypted and no password
    ///   is available.
    /// - [`Error::WrongPassword`] if the password check fails.
    /// - [`Error::UnsupportedMethod`] / [`Error::UnsupportedEncryption`] for
    ///   methods this build cannot decode.
    /// - [`Error::EntryNotReadable`] if the local header is damaged.
    pub fn open(&self, password: Option<&Password>) -> Result<EntryReader<'a>> {
        let index = self.index();
        let body = match self.resolved.content {
            Content::Replaced(content) => Self::open_replacement(content)?,
            Content::Original(entry) => {
                // A pending encryption password belongs to the new ciphertext.
                let password = password.or(self.archive.default_password.as_ref());
                self.open_original(entry, password)
                    .map_err(|e| e.with_entry(index, || self.name(StringDecoding::Guess)))?
            }
        };
        log::trace!("opened entry {} for reading", index);
        Ok(EntryReader {
            index,
            state: ReaderState::Open(Box::new(body)),
        })
    }

    fn open_replacement(content: &'a ContentSource) -> Result<OpenReader<'a>> {
        let reader = SharedSourceReader::whole(content.source())?;
        let size = lock_or_recover(content.source()).stat()?.size;
        let body = match size {
            Some(len) if reader.is_positional() => Body::Direct {
                reader,
                start: 0,
                len,
            },
            _ => Body::Sequential(reader),
        };
        Ok(OpenReader::new(body, None))
    }

    fn open_original(
        &self,
        entry: &'a DirectoryEntry,
        password: Option<&Password>,
    ) -> Result<OpenReader<'a>> {
        let index = entry.index();
        let method = entry.compression_method();
        if !method.is_decode_supported() {
            return Err(Error::UnsupportedMethod {
                method_id: method.as_u16(),
            });
        }
        let encryption = entry.encryption_method();
        if !encryption.is_supported() {
            return Err(Error::UnsupportedEncryption {
                method_id: encryption.as_u16(),
            });
        }

        let data_start = {
            let mut guard = lock_or_recover(&self.archive.source);
            let seekable = guard.as_seekable().ok_or(Error::UnsupportedOperation {
                operation: "read entry from a non-seekable source",
            })?;
            let offset = entry.local_header_offset();
            let (local, header_len) =
                read_local_header(seekable, offset).map_err(|e| Error::EntryNotReadable {
                    index,
                    reason: e.to_string(),
                })?;
            if local.name != entry.name_raw() {
                return Err(Error::EntryNotReadable {
                    index,
                    reason: "local header name differs from the central directory".into(),
                });
            }
            offset + header_len
        };

        let compressed = entry.compressed_size();
        let raw = SharedSourceReader::range(&self.archive.source, data_start, compressed);
        let expected_crc = (!entry.is_aes_v2()).then_some(entry.crc32());

        if encryption == EncryptionMethod::None && method == CompressionMethod::Stored {
            let mut reader = OpenReader::new(
                Body::Direct {
                    reader: raw,
                    start: data_start,
                    len: compressed,
                },
                expected_crc,
            );
            reader.expected_size = Some(entry.uncompressed_size());
            return Ok(reader);
        }

        let decrypted: Box<dyn Read + Send + 'a> = if encryption.is_encrypted() {
            let password = password.ok_or(Error::PasswordRequired { entry_index: index })?;
            let check_byte = if entry.flags().contains(GeneralPurposeFlags::DATA_DESCRIPTOR) {
                (entry.dos_datetime().1 >> 8) as u8
            } else {
                (entry.crc32() >> 24) as u8
            };
            let params = DecryptParams {
                encrypted_len: compressed,
                check_byte,
            };
            crypto::build_decrypter(encryption, password, params, raw)?
        } else {
            Box::new(raw)
        };
        let decoder = codec::build_decoder(method, decrypted, entry.uncompressed_size())?;
        let mut reader = OpenReader::new(Body::Decoded(decoder), expected_crc);
        reader.expected_size = Some(entry.uncompressed_size());
        Ok(reader)
    }
}

enum Body<'a> {
    /// Plain bytes read in place; supports seeking.
    Direct {
        reader: SharedSourceReader<'a>,
        start: u64,
        len: u64,
    },
    /// Forward-only plain bytes.
    Sequential(SharedSourceReader<'a>),
    /// Decrypted and decompressed original data.
    Decoded(Box<dyn Decoder + 'a>),
}

struct OpenReader<'a> {
    body: Body<'a>,
    crc: Option<Crc32>,
    expected_crc: Option<u32>,
    expected_size: Option<u64>,
    produced: u64,
    verified: bool,
}

impl<'a> OpenReader<'a> {
    fn new(body: Body<'a>, expected_crc: Option<u32>) -> Self {
        Self {
            body,
            crc: expected_crc.map(|_| Crc32::new()),
            expected_crc,
            expected_size: None,
            produced: 0,
            verified: false,
        }
    }

    fn read_body(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match &mut self.body {
            Body::Direct { reader, start, len } => {
                let offset = reader.position().saturating_sub(*start);
                let want = len.saturating_sub(offset).min(buf.len() as u64) as usize;
                if want == 0 {
                    return Ok(0);
                }
                reader.read(&mut buf[..want])
            }
            Body::Sequential(reader) => reader.read(buf),
            Body::Decoded(decoder) => decoder.read(buf),
        }
    }

    fn read(&mut self, index: usize, buf: &mut [u8]) -> Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        let n = self.read_body(buf).map_err(Error::from_io)?;
        if let Some(crc) = self.crc.as_mut() {
            crc.update(&buf[..n]);
        }
        self.produced += n as u64;
        if n == 0 {
            self.verify(index)?;
        }
        Ok(n)
    }

    fn verify(&mut self, index: usize) -> Result<()> {
        if self.verified {
            return Ok(());
        }
        self.verified = true;
        if let Some(expected) = self.expected_size {
            if self.crc.is_some() && self.produced != expected {
                return Err(Error::EntryNotReadable {
                    index,
                    reason: format!(
                        "data ended after {} of {} bytes",
                        self.produced, expected
                    ),
                });
            }
        }
        if let (Some(crc), Some(expected)) = (&self.crc, self.expected_crc) {
            let actual = crc.finalize();
            if actual != expected {
                return Err(Error::ChecksumMismatch {
                    entry_index: index,
                    expected,
                    actual,
                });
            }
        }
        Ok(())
    }

    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let Body::Direct { reader, start, len } = &mut self.body else {
            return Err(Error::UnsupportedOperation {
                operation: "seek in compressed or encrypted entry data",
            });
        };
        let current = reader.position().saturating_sub(*start);
        let target = resolve_seek(pos, current, *len)?;
        reader.set_position(*start + target);
        // Checksums only cover a single front-to-back pass.
        self.crc = None;
        Ok(target)
    }

    fn tell(&self) -> Result<u64> {
        match &self.body {
            Body::Direct { reader, start, .. } => Ok(reader.position().saturating_sub(*start)),
            _ => Err(Error::UnsupportedOperation {
                operation: "tell in compressed or encrypted entry data",
            }),
        }
    }
}

enum ReaderState<'a> {
    Open(Box<OpenReader<'a>>),
    Closed,
}

/// A streaming reader over one entry's content.
///
/// The reader starts open and becomes closed after [`EntryReader::close`].
/// Reading, seeking or asking for the position of a closed reader fails with
/// [`Error::UseAfterClose`]. The CRC-32 of original data is checked when the
/// end of the data is reached, unless the reader was repositioned.
pub struct EntryReader<'a> {
    index: usize,
    state: ReaderState<'a>,
}

impl<'a> EntryReader<'a> {
    /// The index of the entry being read.
    pub fn index(&self) -> usize {
        self.index
    }

    /// Returns true once the reader is closed.
    pub fn is_closed(&self) -> bool {
        matches!(self.state, ReaderState::Closed)
    }

    fn open_state(&mut self) -> Result<&mut OpenReader<'a>> {
        match &mut self.state {
            ReaderState::Open(reader) => Ok(&mut **reader),
            ReaderState::Closed => Err(Error::UseAfterClose),
        }
    }

    /// Reads decoded bytes. Returns 0 at the end of the entry.
    ///
    /// # Errors
    ///
    /// - [`Error::UseAfterClose`] after [`EntryReader::close`].
    /// - [`Error::ChecksumMismatch`] at the end of data whose CRC is wrong.
    /// - [`Error::WrongPassword`] when a WinZip AES authentication code does
    ///   not match.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let index = self.index;
        self.open_state()?.read(index, buf)
    }

    /// Reads the rest of the entry into a vector.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut buf = [0u8; 16 * 1024];
        loop {
            let n = EntryReader::read(self, &mut buf)?;
            if n == 0 {
                return Ok(out);
            }
            out.extend_from_slice(&buf[..n]);
        }
    }

    /// Moves within the entry.
    ///
    /// Only stored, unencrypted original data and replacement content from a
    /// seekable source can be repositioned.
    pub fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        self.open_state()?.seek(pos)
    }

    /// The position within the entry.
    pub fn tell(&mut self) -> Result<u64> {
        self.open_state()?.tell()
    }

    /// Closes the reader. Closing an already closed reader does nothing.
    pub fn close(&mut self) -> Result<()> {
        if !self.is_closed() {
            log::trace!("closed reader for entry {}", self.index);
        }
        self.state = ReaderState::Closed;
        Ok(())
    }
}

impl std::fmt::Debug for EntryReader<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryReader")
            .field("index", &self.index)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl io::Read for EntryReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        EntryReader::read(self, buf).map_err(io::Error::from)
    }
}

impl io::Seek for EntryReader<'_> {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        EntryReader::seek(self, pos).map_err(io::Error::from)
    }
}

/// A mutable handle to one entry.
///
/// Every method forwards to the [`Archive`] method of the same name.
pub struct EntryMut<'a> {
    archive: &'a mut Archive,
    index: usize,
}

impl<'a> EntryMut<'a> {
    pub(crate) fn new(archive: &'a mut Archive, index: usize) -> Self {
        Self { archive, index }
    }

    /// The entry's index.
    pub fn index(&self) -> usize {
        self.index
    }

    /// A read-only view of the entry's current state.
    pub fn view(&self) -> Result<Entry<'_>> {
        self.archive.entry(self.index)
    }

    /// Renames the entry.
    pub fn rename(&mut self, name: &str) -> Result<&mut Self> {
        self.archive.rename(self.index, name)?;
        Ok(self)
    }

    /// Replaces the entry's content.
    pub fn replace(&mut self, source: Box<dyn crate::source::Source>) -> Result<&mut Self> {
        self.archive.replace(self.index, source)?;
        Ok(self)
    }

    /// Sets the entry comment. An empty comment deletes it.
    pub fn set_comment(&mut self, comment: &str) -> Result<&mut Self> {
        self.archive.set_entry_comment(self.index, comment)?;
        Ok(self)
    }

    /// Sets the modification time.
    pub fn set_modified(&mut self, mtime: Timestamp) -> Result<&mut Self> {
        self.archive.set_modified(self.index, mtime)?;
        Ok(self)
    }

    /// Sets the external attributes.
    pub fn set_external_attributes(&mut self, attributes: ExternalAttributes) -> Result<&mut Self> {
        self.archive.set_external_attributes(self.index, attributes)?;
        Ok(self)
    }

    /// Sets Unix permissions and file type.
    pub fn set_unix_mode(&mut self, mode: u32) -> Result<&mut Self> {
        self.archive.set_unix_mode(self.index, mode)?;
        Ok(self)
    }

    /// Sets the compression method and level.
    pub fn set_compression(
        &mut self,
        method: CompressionMethod,
        level: Option<u32>,
    ) -> Result<&mut Self> {
        self.archive.set_compression(self.index, method, level)?;
        Ok(self)
    }

    /// Sets the encryption method and password.
    pub fn set_encryption(
        &mut self,
        method: EncryptionMethod,
        password: Option<Password>,
    ) -> Result<&mut Self> {
        self.archive.set_encryption(self.index, method, password)?;
        Ok(self)
    }

    /// Sets or adds an extra field.
    pub fn set_extra_field(
        &mut self,
        id: u16,
        occurrence: Option<usize>,
        data: Vec<u8>,
        location: ExtraLocation,
    ) -> Result<&mut Self> {
        self.archive
            .set_extra_field(self.index, id, occurrence, data, location)?;
        Ok(self)
    }

    /// Deletes extra fields.
    pub fn delete_extra_field(
        &mut self,
        id: u16,
        occurrence: Option<usize>,
        location: ExtraLocation,
    ) -> Result<&mut Self> {
        self.archive
            .delete_extra_field(self.index, id, occurrence, location)?;
        Ok(self)
    }

    /// Reverts all pending changes of the entry.
    pub fn unchange(&mut self) -> Result<()> {
        self.archive.unchange(self.index)
    }

    /// Deletes the entry, consuming the handle.
    pub fn delete(self) -> Result<()> {
        self.archive.delete(self.index)
    }
}

impl std::fmt::Debug for EntryMut<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryMut")
            .field("index", &self.index)
            .finish_non_exhaustive()
    }
}
