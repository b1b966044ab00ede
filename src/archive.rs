//! The archive handle: opening, queries, staged mutations and commit.
//!
//! An [`Archive`] owns its byte source, the parsed central directory and a
//! [`ChangeSet`] of pending edits. Queries see the edits immediately; nothing
//! reaches storage until [`Archive::commit`].
//!
//! # Example
//!
//! ```rust,no_run
//! use zipkit::{Archive, OpenFlags, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open("data.zip", OpenFlags::CREATE)?;
//!     archive.add_bytes("hello.txt", b"Hello, World!".to_vec())?;
//!     let result = archive.commit()?;
//!     println!("wrote {} entries", result.entries_written);
//!     Ok(())
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::sync::Mutex;

use bitflags::bitflags;

use crate::attributes::ExternalAttributes;
use crate::changes::{
    ChangeSet, CompressionSetting, ContentSource, EncryptionSetting, MetadataPatch, Operation,
};
use crate::codec::CompressionMethod;
use crate::commit::{self, CommitOptions, CommitResult};
use crate::crypto::{EncryptionMethod, Password};
use crate::directory::{Directory, LocateFlags, name_matches};
use crate::encoding::{self, StringDecoding};
use crate::entry::{Entry, EntryMut, EntryReader, Version};
use crate::format::MAX_FIELD_LEN;
use crate::format::extra::{self, ExtraField, ExtraLocation};
use crate::source::{Capabilities, FileSource, MemorySource, Source};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

bitflags! {
    /// How [`Archive::open`] treats the underlying storage.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct OpenFlags: u32 {
        /// A missing archive starts empty instead of failing.
        const CREATE = 1;
        /// Fail with [`Error::ArchiveExists`] if the archive exists.
        const EXCLUSIVE = 2;
        /// Run extra consistency checks against the local headers.
        const CHECK_CONSISTENCY = 4;
        /// Start with an empty archive even if one exists.
        const TRUNCATE = 8;
        /// Reject every mutation; commit becomes a no-op.
        const READ_ONLY = 16;
    }
}

/// Options for [`Archive::add`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOptions {
    /// Replace the first entry with the same name instead of appending.
    pub overwrite: bool,
    /// Compression method; `None` uses the commit default.
    pub compression: Option<CompressionMethod>,
    /// Compression level; `None` uses the method default.
    pub level: Option<u32>,
    /// Modification time; `None` uses the source's time.
    pub mtime: Option<Timestamp>,
}

impl AddOptions {
    /// Creates default options.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces an existing same-named entry instead of appending.
    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    /// Sets the compression method.
    pub fn compression(mut self, method: CompressionMethod) -> Self {
        self.compression = Some(method);
        self
    }

    /// Sets the compression level.
    pub fn level(mut self, level: u32) -> Self {
        self.level = Some(level);
        self
    }

    /// Sets the modification time.
    pub fn mtime(mut self, mtime: Timestamp) -> Self {
        self.mtime = Some(mtime);
        self
    }

    fn into_patch(self) -> MetadataPatch {
        MetadataPatch {
            mtime: self.mtime,
            compression: self.compression.map(|method| CompressionSetting {
                method,
                level: self.level,
            }),
            ..Default::default()
        }
    }
}

/// An open ZIP archive with pending modifications.
///
/// Mutations need `&mut self`; entry reads only borrow `&self`, so several
/// readers can be open at once. [`commit`](Self::commit) and
/// [`discard`](Self::discard) consume the archive; dropping it discards
/// pending changes without touching storage.
pub struct Archive {
    pub(crate) source: Mutex<Box<dyn Source>>,
    pub(crate) directory: Directory,
    pub(crate) changes: ChangeSet,
    pub(crate) flags: OpenFlags,
    pub(crate) default_password: Option<Password>,
    /// The storage held an archive when it was opened.
    pub(crate) existed: bool,
    /// An existing archive was opened with `TRUNCATE`.
    pub(crate) truncated: bool,
    finished: bool,
}

impl Archive {
    /// Opens the archive at `path`.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] with `NotFound` if the file is missing and
    ///   [`OpenFlags::CREATE`] is not set.
    /// - [`Error::ArchiveExists`] if the file exists and
    ///   [`OpenFlags::EXCLUSIVE`] is set.
    /// - [`Error::CorruptArchive`] if the central directory is unreadable.
    pub fn open(path: impl AsRef<Path>, flags: OpenFlags) -> Result<Self> {
        let path = path.as_ref();
        Self::open_labeled(
            Box::new(FileSource::new(path)),
            flags,
            path.display().to_string(),
        )
    }

    /// Opens the archive at `path` for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(path, OpenFlags::READ_ONLY)
    }

    /// Opens an archive over any byte source.
    ///
    /// Sources without the seek tier are buffered into memory and must be
    /// opened with [`OpenFlags::READ_ONLY`].
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedOperation`] if the source lacks a tier the
    /// flags require, in addition to the errors of [`open`](Self::open).
    pub fn open_source(source: Box<dyn Source>, flags: OpenFlags) -> Result<Self> {
        Self::open_labeled(source, flags, "<source>".to_string())
    }

    /// Opens an in-memory archive read-only.
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::open_source(Box::new(MemorySource::new(data)), OpenFlags::READ_ONLY)
    }

    fn open_labeled(mut source: Box<dyn Source>, flags: OpenFlags, label: String) -> Result<Self> {
        let read_only = flags.contains(OpenFlags::READ_ONLY);
        if read_only && flags.intersects(OpenFlags::TRUNCATE | OpenFlags::CREATE) {
            return Err(Error::UnsupportedOperation {
                operation: "create or truncate a read-only archive",
            });
        }

        let existed = source.exists();
        if existed && flags.contains(OpenFlags::EXCLUSIVE) {
            return Err(Error::ArchiveExists { path: label });
        }
        if !existed && !flags.contains(OpenFlags::CREATE) {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("archive not found: {}", label),
            )));
        }

        let capabilities = source.capabilities();
        if !read_only && !capabilities.contains(Capabilities::WRITE) {
            return Err(Error::UnsupportedOperation {
                operation: "modify an archive whose source is not writable",
            });
        }
        if !capabilities.contains(Capabilities::SEEK) {
            source = buffer_source(source)?;
        }

        let truncated = existed && flags.contains(OpenFlags::TRUNCATE);
        let directory = if !existed || truncated {
            Directory::empty()
        } else {
            let seekable = source.as_seekable().ok_or(Error::UnsupportedOperation {
                operation: "parse an archive from a non-seekable source",
            })?;
            Directory::parse(seekable, flags.contains(OpenFlags::CHECK_CONSISTENCY))?
        };

        log::debug!(
            "opened {} with {} entries (flags {:?}, zip64: {})",
            label,
            directory.len(),
            flags,
            directory.is_zip64()
        );

        Ok(Self {
            source: Mutex::new(source),
            changes: ChangeSet::new(directory.len()),
            directory,
            flags,
            default_password: None,
            existed,
            truncated,
            finished: false,
        })
    }

    // ========================================================================
    // Queries
    // ========================================================================

    /// The flags the archive was opened with.
    pub fn flags(&self) -> OpenFlags {
        self.flags
    }

    /// Returns true if the archive rejects mutations.
    pub fn is_read_only(&self) -> bool {
        self.flags.contains(OpenFlags::READ_ONLY)
    }

    /// The central directory as read from storage.
    pub fn directory(&self) -> &Directory {
        &self.directory
    }

    /// Number of entries.
    ///
    /// [`Version::Current`] counts the entries that exist with pending
    /// changes applied; [`Version::Unchanged`] counts the stored directory.
    pub fn len(&self, version: Version) -> usize {
        match version {
            Version::Current => self.changes.live_count(),
            Version::Unchanged => self.directory.len(),
        }
    }

    /// Returns true if no entry currently exists.
    pub fn is_empty(&self) -> bool {
        self.len(Version::Current) == 0
    }

    /// Size of the index space, including deleted and appended entries.
    ///
    /// Indices never shift: a deleted entry keeps its index until commit.
    pub fn index_count(&self) -> usize {
        self.changes.index_count()
    }

    /// The current view of the entry at `index`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIndex`] if `index` is out of range.
    /// - [`Error::EntryNotFound`] if the entry was deleted.
    pub fn entry(&self, index: usize) -> Result<Entry<'_>> {
        Entry::new(self, index, Version::Current)
    }

    /// The view of the entry at `index` in the given version.
    pub fn entry_with_version(&self, index: usize, version: Version) -> Result<Entry<'_>> {
        Entry::new(self, index, version)
    }

    /// Iterates over every existing entry with pending changes applied.
    pub fn entries(&self) -> impl Iterator<Item = Entry<'_>> {
        (0..self.changes.index_count())
            .filter_map(move |index| Entry::new(self, index, Version::Current).ok())
    }

    /// Iterates over the entries as stored, ignoring pending changes.
    pub fn unchanged_entries(&self) -> impl Iterator<Item = Entry<'_>> {
        (0..self.directory.len())
            .filter_map(move |index| Entry::new(self, index, Version::Unchanged).ok())
    }

    /// Index of the first existing entry named `name`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if nothing matches.
    pub fn locate(&self, name: &str, flags: LocateFlags) -> Result<usize> {
        self.entries()
            .find(|entry| {
                name_matches(
                    entry.name_raw(),
                    &entry.name(StringDecoding::Guess),
                    name,
                    flags,
                )
            })
            .map(|entry| entry.index())
            .ok_or_else(|| Error::EntryNotFound {
                name: name.to_string(),
            })
    }

    /// The first existing entry named exactly `name`.
    pub fn entry_by_name(&self, name: &str) -> Result<Entry<'_>> {
        let index = self.locate(name, LocateFlags::empty())?;
        self.entry(index)
    }

    /// Raw archive comment.
    pub fn comment_raw(&self, version: Version) -> &[u8] {
        match (version, self.changes.comment()) {
            (Version::Current, Some(pending)) => pending,
            _ => self.directory.comment_raw(),
        }
    }

    /// Decoded archive comment.
    pub fn comment(&self, decoding: StringDecoding, version: Version) -> String {
        let raw = self.comment_raw(version);
        encoding::decode(raw, false, None, decoding)
    }

    /// Returns true if a commit would write anything.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty() || self.truncated
    }

    /// Opens the entry at `index` for reading.
    pub fn open_entry(&self, index: usize, password: Option<&Password>) -> Result<EntryReader<'_>> {
        self.entry(index)?.open(password)
    }

    /// Reads the whole content of the entry at `index`.
    pub fn read_entry(&self, index: usize) -> Result<Vec<u8>> {
        self.open_entry(index, None)?.read_all()
    }

    /// The archive-wide default password.
    pub fn default_password(&self) -> Option<&Password> {
        self.default_password.as_ref()
    }

    /// Sets the password used when an entry has none of its own.
    pub fn set_default_password(&mut self, password: Option<Password>) {
        self.default_password = password;
    }

    // ========================================================================
    // Mutations
    // ========================================================================

    fn check_writable(&self) -> Result<()> {
        if self.is_read_only() {
            return Err(Error::ReadOnly);
        }
        Ok(())
    }

    fn check_live(&self, index: usize) -> Result<()> {
        if index >= self.changes.index_count() {
            return Err(Error::InvalidIndex {
                index,
                count: self.changes.index_count(),
            });
        }
        if !self.changes.exists(index) {
            return Err(Error::not_found_index(index));
        }
        Ok(())
    }

    fn patch(&mut self, index: usize, patch: MetadataPatch) -> Result<()> {
        self.check_writable()?;
        self.changes.apply(index, Operation::Patch(patch))
    }

    /// Adds an entry whose content comes from `source`.
    ///
    /// Returns the new entry's index. With [`AddOptions::overwrite`] the first
    /// entry of the same name is replaced and its index is returned.
    ///
    /// # Errors
    ///
    /// - [`Error::ReadOnly`] on a read-only archive.
    /// - [`Error::IntegerOverflow`] if the name exceeds 65535 bytes.
    pub fn add(&mut self, name: &str, source: Box<dyn Source>, options: AddOptions) -> Result<usize> {
        self.check_writable()?;
        check_len(name.len(), "entry name length")?;

        if options.overwrite {
            if let Ok(index) = self.locate(name, LocateFlags::empty()) {
                self.changes.apply(index, Operation::Replace(source))?;
                let patch = options.into_patch();
                if !patch.is_empty() {
                    self.changes.apply(index, Operation::Patch(patch))?;
                }
                return Ok(index);
            }
        }

        let content = ContentSource::new(source)?;
        let index = self
            .changes
            .append(name.as_bytes().to_vec(), content, options.into_patch());
        log::trace!("entry {}: add {:?}", index, name);
        Ok(index)
    }

    /// Adds an entry holding `data`.
    pub fn add_bytes(&mut self, name: &str, data: impl Into<Vec<u8>>) -> Result<usize> {
        self.add(
            name,
            Box::new(MemorySource::new(data.into())),
            AddOptions::default(),
        )
    }

    /// Adds a directory entry. A trailing `/` is appended if missing.
    pub fn add_directory(&mut self, name: &str) -> Result<usize> {
        let name = if name.ends_with('/') {
            name.to_string()
        } else {
            format!("{}/", name)
        };
        self.add(
            &name,
            Box::new(MemorySource::new(Vec::new())),
            AddOptions::new().compression(CompressionMethod::Stored),
        )
    }

    /// Marks the entry at `index` for deletion.
    pub fn delete(&mut self, index: usize) -> Result<()> {
        self.check_writable()?;
        self.changes.apply(index, Operation::Delete)
    }

    /// Renames the entry at `index`. Duplicate names are allowed.
    pub fn rename(&mut self, index: usize, name: &str) -> Result<()> {
        self.check_writable()?;
        check_len(name.len(), "entry name length")?;
        self.changes
            .apply(index, Operation::Rename(name.as_bytes().to_vec()))
    }

    /// Replaces the content of the entry at `index`.
    ///
    /// The entry is stored unencrypted unless an encryption change is also
    /// pending.
    pub fn replace(&mut self, index: usize, source: Box<dyn Source>) -> Result<()> {
        self.check_writable()?;
        self.changes.apply(index, Operation::Replace(source))
    }

    /// Sets the archive comment. An empty comment deletes it.
    pub fn set_comment(&mut self, comment: &str) -> Result<()> {
        self.check_writable()?;
        check_len(comment.len(), "archive comment length")?;
        self.changes.set_comment(comment.as_bytes().to_vec());
        Ok(())
    }

    /// Sets the comment of the entry at `index`. An empty comment deletes it.
    pub fn set_entry_comment(&mut self, index: usize, comment: &str) -> Result<()> {
        check_len(comment.len(), "entry comment length")?;
        self.patch(
            index,
            MetadataPatch {
                comment: Some(comment.as_bytes().to_vec()),
                ..Default::default()
            },
        )
    }

    /// Sets the modification time of the entry at `index`.
    pub fn set_modified(&mut self, index: usize, mtime: Timestamp) -> Result<()> {
        self.patch(
            index,
            MetadataPatch {
                mtime: Some(mtime),
                ..Default::default()
            },
        )
    }

    /// Sets the external attributes of the entry at `index`.
    pub fn set_external_attributes(
        &mut self,
        index: usize,
        attributes: ExternalAttributes,
    ) -> Result<()> {
        self.patch(
            index,
            MetadataPatch {
                external_attributes: Some(attributes),
                ..Default::default()
            },
        )
    }

    /// Sets Unix permission and type bits, marking the host as Unix.
    pub fn set_unix_mode(&mut self, index: usize, mode: u32) -> Result<()> {
        self.set_external_attributes(index, ExternalAttributes::from_unix_mode(mode))
    }

    /// Sets the compression method of the entry at `index`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedMethod`] if this build cannot encode
    /// `method`.
    pub fn set_compression(
        &mut self,
        index: usize,
        method: CompressionMethod,
        level: Option<u32>,
    ) -> Result<()> {
        if !method.is_encode_supported() {
            return Err(Error::UnsupportedMethod {
                method_id: method.as_u16(),
            });
        }
        self.patch(
            index,
            MetadataPatch {
                compression: Some(CompressionSetting { method, level }),
                ..Default::default()
            },
        )
    }

    /// Sets the encryption of the entry at `index`.
    ///
    /// A `None` password falls back to the archive default at commit time.
    ///
    /// # Errors
    ///
    /// Returns [`Error::UnsupportedEncryption`] if this build cannot encrypt
    /// with `method`.
    pub fn set_encryption(
        &mut self,
        index: usize,
        method: EncryptionMethod,
        password: Option<Password>,
    ) -> Result<()> {
        if !method.is_supported() {
            return Err(Error::UnsupportedEncryption {
                method_id: method.as_u16(),
            });
        }
        self.patch(
            index,
            MetadataPatch {
                encryption: Some(EncryptionSetting { method, password }),
                ..Default::default()
            },
        )
    }

    /// Sets an extra field on the entry at `index`.
    ///
    /// With `occurrence` of `Some(n)` the data of the `n`-th field with `id`
    /// in `location` is replaced; with `None` a new field is added. A field
    /// that also lives in a header outside `location` is split, and only the
    /// copy in `location` changes.
    ///
    /// # Errors
    ///
    /// - [`Error::UnsupportedOperation`] for ZIP64 and WinZip AES fields,
    ///   which the engine writes itself.
    /// - [`Error::InvalidIndex`] if the occurrence does not exist.
    /// - [`Error::IntegerOverflow`] if `data` exceeds 65535 bytes.
    pub fn set_extra_field(
        &mut self,
        index: usize,
        id: u16,
        occurrence: Option<usize>,
        data: Vec<u8>,
        location: ExtraLocation,
    ) -> Result<()> {
        self.check_writable()?;
        if extra::is_internal(id) {
            return Err(Error::UnsupportedOperation {
                operation: "set an extra field the engine manages",
            });
        }
        check_len(data.len(), "extra field length")?;
        let mut fields = self.current_extra_fields(index)?;

        match occurrence {
            Some(n) => {
                let positions = matching_fields(&fields, id, location);
                let &position = positions.get(n).ok_or(Error::InvalidIndex {
                    index: n,
                    count: positions.len(),
                })?;
                let kept = fields[position].location.difference(location);
                if kept.is_empty() {
                    fields[position].data = data;
                } else {
                    // Split so the header outside `location` keeps its data.
                    let targeted = fields[position].location.intersection(location);
                    fields[position].location = kept;
                    fields.insert(position + 1, ExtraField::new(id, data, targeted));
                }
            }
            None => fields.push(ExtraField::new(id, data, location)),
        }

        self.patch(
            index,
            MetadataPatch {
                extra: Some(fields),
                ..Default::default()
            },
        )
    }

    /// Deletes extra fields with `id` from the entry at `index`.
    ///
    /// `occurrence` of `None` deletes every matching field in `location`.
    /// Copies in headers outside `location` are kept.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EntryNotFound`] if no field matched.
    pub fn delete_extra_field(
        &mut self,
        index: usize,
        id: u16,
        occurrence: Option<usize>,
        location: ExtraLocation,
    ) -> Result<()> {
        self.check_writable()?;
        let mut fields = self.current_extra_fields(index)?;
        let positions = matching_fields(&fields, id, location);
        let targets = match occurrence {
            Some(n) => positions.get(n).copied().into_iter().collect(),
            None => positions,
        };
        if targets.is_empty() {
            return Err(Error::EntryNotFound {
                name: format!("extra field {:#06x} of entry #{}", id, index),
            });
        }
        for &position in targets.iter().rev() {
            let kept = fields[position].location.difference(location);
            if kept.is_empty() {
                fields.remove(position);
            } else {
                fields[position].location = kept;
            }
        }

        self.patch(
            index,
            MetadataPatch {
                extra: Some(fields),
                ..Default::default()
            },
        )
    }

    /// All user extra fields of an entry, local and central.
    fn current_extra_fields(&self, index: usize) -> Result<Vec<ExtraField>> {
        self.check_live(index)?;
        self.entry(index)?.extra_fields(ExtraLocation::BOTH)
    }

    /// Reverts all pending changes of the entry at `index`.
    pub fn unchange(&mut self, index: usize) -> Result<()> {
        self.check_writable()?;
        self.changes.unchange(index)
    }

    /// Reverts every entry change and drops added entries.
    pub fn unchange_all(&mut self) -> Result<()> {
        self.check_writable()?;
        self.changes.unchange_all();
        Ok(())
    }

    /// Reverts archive-level changes such as the comment.
    pub fn unchange_globals(&mut self) -> Result<()> {
        self.check_writable()?;
        self.changes.unchange_globals();
        Ok(())
    }

    /// A mutable handle to the entry at `index`.
    pub fn entry_mut(&mut self, index: usize) -> Result<EntryMut<'_>> {
        self.check_writable()?;
        self.check_live(index)?;
        Ok(EntryMut::new(self, index))
    }

    // ========================================================================
    // Commit
    // ========================================================================

    /// Writes all pending changes with default options.
    ///
    /// The archive is consumed whatever the outcome.
    ///
    /// # Errors
    ///
    /// Returns [`Error::CommitFailed`] if anything goes wrong; the stored
    /// archive is then left untouched.
    pub fn commit(self) -> Result<CommitResult> {
        self.commit_with(&CommitOptions::default())
    }

    /// Writes all pending changes.
    pub fn commit_with(mut self, options: &CommitOptions) -> Result<CommitResult> {
        self.finished = true;
        commit::run(&mut self, options)
    }

    /// Drops all pending changes without touching storage.
    pub fn discard(mut self) {
        log::debug!("discarding archive with changes: {}", self.has_changes());
        self.finished = true;
    }
}

impl fmt::Debug for Archive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Archive")
            .field("entries", &self.directory.len())
            .field("flags", &self.flags)
            .field("has_changes", &self.has_changes())
            .finish_non_exhaustive()
    }
}

impl Drop for Archive {
    fn drop(&mut self) {
        if !self.finished && self.has_changes() {
            log::debug!("archive dropped with pending changes, discarding");
        }
    }
}

fn check_len(len: usize, what: &'static str) -> Result<()> {
    if len > MAX_FIELD_LEN {
        return Err(Error::IntegerOverflow { what });
    }
    Ok(())
}

/// Positions of the fields with `id` present in `location`.
fn matching_fields(fields: &[ExtraField], id: u16, location: ExtraLocation) -> Vec<usize> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.id == id && f.location.intersects(location))
        .map(|(position, _)| position)
        .collect()
}

/// Drains a forward-only source into memory.
fn buffer_source(mut source: Box<dyn Source>) -> Result<Box<dyn Source>> {
    source.open()?;
    let mut data = Vec::new();
    let mut chunk = [0u8; 64 * 1024];
    loop {
        let n = source.read(&mut chunk)?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&chunk[..n]);
    }
    source.close()?;
    log::debug!("buffered {} bytes from a non-seekable source", data.len());
    Ok(Box::new(MemorySource::new(data)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::StreamSource;
    use std::io::Cursor;

    fn memory_archive() -> (MemorySource, Archive) {
        let storage = MemorySource::empty();
        let archive =
            Archive::open_source(Box::new(storage.clone()), OpenFlags::CREATE).unwrap();
        (storage, archive)
    }

    fn committed(entries: &[(&str, &[u8])]) -> MemorySource {
        let (storage, mut archive) = memory_archive();
        for (name, data) in entries {
            archive.add_bytes(name, data.to_vec()).unwrap();
        }
        let _ = archive.commit().unwrap();
        storage
    }

    // ========================================================================
    // Open modes
    // ========================================================================

    #[test]
    fn test_archive_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<Archive>();
    }

    #[test]
    fn test_missing_without_create_is_not_found() {
        let err = Archive::open_source(Box::new(MemorySource::empty()), OpenFlags::empty())
            .unwrap_err();
        match err {
            Error::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
            e => panic!("Expected Io(NotFound), got {:?}", e),
        }
    }

    #[test]
    fn test_exclusive_on_existing() {
        let storage = committed(&[("a.txt", b"a")]);
        let err = Archive::open_source(
            Box::new(storage),
            OpenFlags::CREATE | OpenFlags::EXCLUSIVE,
        )
        .unwrap_err();
        assert!(matches!(err, Error::ArchiveExists { .. }));
    }

    #[test]
    fn test_truncate_starts_empty() {
        let storage = committed(&[("a.txt", b"a"), ("b.txt", b"b")]);
        let archive = Archive::open_source(Box::new(storage), OpenFlags::TRUNCATE).unwrap();
        assert!(archive.is_empty());
        assert_eq!(archive.len(Version::Unchanged), 0);
        assert!(archive.has_changes());
    }

    #[test]
    fn test_stream_source_requires_read_only() {
        let data = committed(&[("a.txt", b"abc")]).contents().unwrap();
        let err = Archive::open_source(
            Box::new(StreamSource::new(Cursor::new(data.clone()))),
            OpenFlags::empty(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::UnsupportedOperation { .. }));

        let archive = Archive::open_source(
            Box::new(StreamSource::new(Cursor::new(data))),
            OpenFlags::READ_ONLY,
        )
        .unwrap();
        assert_eq!(archive.read_entry(0).unwrap(), b"abc");
    }

    #[test]
    fn test_read_only_rejects_mutations() {
        let data = committed(&[("a.txt", b"abc")]).contents().unwrap();
        let mut archive = Archive::from_bytes(data).unwrap();
        assert!(matches!(archive.delete(0), Err(Error::ReadOnly)));
        assert!(matches!(archive.add_bytes("b", b"x".to_vec()), Err(Error::ReadOnly)));
        assert!(matches!(archive.set_comment("c"), Err(Error::ReadOnly)));
        assert!(matches!(archive.entry_mut(0), Err(Error::ReadOnly)));
        let result = archive.commit().unwrap();
        assert!(result.no_op);
    }

    // ========================================================================
    // Staged view
    // ========================================================================

    #[test]
    fn test_added_entry_readable_before_commit() {
        let (_, mut archive) = memory_archive();
        let index = archive.add_bytes("note.txt", b"staged".to_vec()).unwrap();
        assert_eq!(archive.read_entry(index).unwrap(), b"staged");
        assert_eq!(archive.locate("note.txt", LocateFlags::empty()).unwrap(), index);
        archive.discard();
    }

    #[test]
    fn test_locate_miss() {
        let (_, archive) = memory_archive();
        match archive.locate("nope", LocateFlags::empty()) {
            Err(Error::EntryNotFound { name }) => assert_eq!(name, "nope"),
            other => panic!("Expected EntryNotFound, got {:?}", other),
        }
    }

    #[test]
    fn test_overwrite_replaces_first_match() {
        let (_, mut archive) = memory_archive();
        let first = archive.add_bytes("dup.txt", b"one".to_vec()).unwrap();
        let index = archive
            .add(
                "dup.txt",
                Box::new(MemorySource::new(b"two".to_vec())),
                AddOptions::new().overwrite(true),
            )
            .unwrap();
        assert_eq!(index, first);
        assert_eq!(archive.len(Version::Current), 1);
        assert_eq!(archive.read_entry(index).unwrap(), b"two");
    }

    #[test]
    fn test_name_too_long() {
        let (_, mut archive) = memory_archive();
        let name = "n".repeat(MAX_FIELD_LEN + 1);
        assert!(matches!(
            archive.add_bytes(&name, Vec::new()),
            Err(Error::IntegerOverflow { .. })
        ));
    }

    #[test]
    fn test_add_directory_appends_slash() {
        let (_, mut archive) = memory_archive();
        let index = archive.add_directory("docs").unwrap();
        let entry = archive.entry(index).unwrap();
        assert_eq!(entry.name_raw(), b"docs/");
        assert!(entry.is_directory());
    }

    #[test]
    fn test_comment_versions() {
        let storage = committed(&[("a", b"a")]);
        let mut archive = Archive::open_source(Box::new(storage), OpenFlags::empty()).unwrap();
        archive.set_comment("pending").unwrap();
        assert_eq!(archive.comment(StringDecoding::Guess, Version::Current), "pending");
        assert_eq!(archive.comment_raw(Version::Unchanged), b"");
        archive.unchange_globals().unwrap();
        assert!(!archive.has_changes());
    }

    #[test]
    fn test_extra_field_edit_targets_one_header() {
        let (_, mut archive) = memory_archive();
        let index = archive.add_bytes("x", b"x".to_vec()).unwrap();
        archive
            .set_extra_field(index, 0xBEEF, None, vec![7, 7], ExtraLocation::BOTH)
            .unwrap();
        archive
            .delete_extra_field(index, 0xBEEF, Some(0), ExtraLocation::LOCAL)
            .unwrap();

        let entry = archive.entry(index).unwrap();
        assert!(entry
            .extra_field_by_id(0xBEEF, 0, ExtraLocation::LOCAL)
            .unwrap()
            .is_none());
        let central = entry
            .extra_field_by_id(0xBEEF, 0, ExtraLocation::CENTRAL)
            .unwrap()
            .unwrap();
        assert_eq!(central.data, vec![7, 7]);
        assert_eq!(central.location, ExtraLocation::CENTRAL);
    }

    #[test]
    fn test_extra_field_set_and_delete() {
        let (_, mut archive) = memory_archive();
        let index = archive.add_bytes("x", b"x".to_vec()).unwrap();
        archive
            .set_extra_field(index, 0xCAFE, None, vec![1, 2], ExtraLocation::BOTH)
            .unwrap();
        archive
            .set_extra_field(index, 0xCAFE, Some(0), vec![3], ExtraLocation::CENTRAL)
            .unwrap();
        let field = archive
            .entry(index)
            .unwrap()
            .extra_field_by_id(0xCAFE, 0, ExtraLocation::CENTRAL)
            .unwrap()
            .unwrap();
        assert_eq!(field.data, vec![3]);
        let local = archive
            .entry(index)
            .unwrap()
            .extra_field_by_id(0xCAFE, 0, ExtraLocation::LOCAL)
            .unwrap()
            .unwrap();
        assert_eq!(local.data, vec![1, 2]);
        assert_eq!(local.location, ExtraLocation::LOCAL);

        archive
            .delete_extra_field(index, 0xCAFE, None, ExtraLocation::CENTRAL)
            .unwrap();
        let entry = archive.entry(index).unwrap();
        assert_eq!(entry.extra_fields_count(ExtraLocation::CENTRAL).unwrap(), 0);
        assert_eq!(entry.extra_fields_count(ExtraLocation::LOCAL).unwrap(), 1);

        archive
            .delete_extra_field(index, 0xCAFE, None, ExtraLocation::BOTH)
            .unwrap();
        assert!(matches!(
            archive.delete_extra_field(index, 0xCAFE, None, ExtraLocation::BOTH),
            Err(Error::EntryNotFound { .. })
        ));
        assert!(matches!(
            archive.set_extra_field(index, extra::ids::ZIP64, None, vec![], ExtraLocation::BOTH),
            Err(Error::UnsupportedOperation { .. })
        ));
    }
}
