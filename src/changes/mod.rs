//! Pending changes against an archive's directory.
//!
//! Nothing here touches the archive's bytes. A [`ChangeSet`] records one
//! [`Slot`] per original entry plus appended slots for new entries, and
//! [`ChangeSet::resolve`] merges them with the [`Directory`] into the
//! effective view of an entry.

mod operation;

use std::fmt;
use std::sync::Mutex;

pub use operation::{CompressionSetting, EncryptionSetting, MetadataPatch, Operation};

use crate::attributes::ExternalAttributes;
use crate::codec::CompressionMethod;
use crate::crypto::{EncryptionMethod, Password};
use crate::directory::{Directory, DirectoryEntry};
use crate::encoding;
use crate::format::GeneralPurposeFlags;
use crate::format::extra::ExtraField;
use crate::source::{Source, lock_or_recover};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

/// Replacement or new content for an entry, owned until commit or discard.
pub struct ContentSource {
    source: Mutex<Box<dyn Source>>,
    size: Option<u64>,
    mtime: Timestamp,
}

impl ContentSource {
    /// Takes ownership of `source`, recording its size and modification time.
    ///
    /// Sources that report no modification time get the current time.
    pub fn new(source: Box<dyn Source>) -> Result<Self> {
        let stat = source.stat()?;
        Ok(Self {
            source: Mutex::new(source),
            size: stat.size,
            mtime: stat.mtime.unwrap_or_else(Timestamp::now),
        })
    }

    /// Uncompressed size, if the source reported one.
    pub fn size(&self) -> Option<u64> {
        self.size
    }

    /// Modification time taken from the source.
    pub fn mtime(&self) -> Timestamp {
        self.mtime
    }

    pub(crate) fn source(&self) -> &Mutex<Box<dyn Source>> {
        &self.source
    }

    /// Opens the source once so forward-only streams are buffered, then
    /// refreshes the recorded size.
    pub(crate) fn prepare(&mut self) -> Result<()> {
        let mut guard = lock_or_recover(&self.source);
        guard.open()?;
        if let Some(size) = guard.stat()?.size {
            self.size = Some(size);
        }
        Ok(())
    }
}

impl fmt::Debug for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentSource")
            .field("size", &self.size)
            .field("mtime", &self.mtime)
            .finish_non_exhaustive()
    }
}

/// Pending state of one entry.
#[derive(Debug, Default)]
pub struct Slot {
    /// The entry is gone. For appended slots this means it was never added.
    pub deleted: bool,
    /// New raw name.
    pub rename: Option<Vec<u8>>,
    /// New content.
    pub replace: Option<ContentSource>,
    /// Metadata overrides.
    pub patch: MetadataPatch,
}

impl Slot {
    fn appended(name: Vec<u8>, content: ContentSource, patch: MetadataPatch) -> Self {
        Self {
            deleted: false,
            rename: Some(name),
            replace: Some(content),
            patch,
        }
    }

    /// Returns true if the slot records no change at all.
    pub fn is_unchanged(&self) -> bool {
        !self.deleted && self.rename.is_none() && self.replace.is_none() && self.patch.is_empty()
    }

    fn clear(&mut self) {
        *self = Self::default();
    }
}

/// Where an entry's effective content comes from.
#[derive(Debug, Clone, Copy)]
pub enum Content<'a> {
    /// The stored data of the original entry.
    Original(&'a DirectoryEntry),
    /// Uncompressed data from a replacement or new source.
    Replaced(&'a ContentSource),
}

/// The effective view of one entry after merging pending changes.
#[derive(Debug, Clone)]
pub struct ResolvedEntry<'a> {
    /// The entry's index.
    pub index: usize,
    /// The original record, for entries that existed at open time.
    pub original: Option<&'a DirectoryEntry>,
    /// The slot holding pending changes, if any.
    pub slot: Option<&'a Slot>,
    /// Effective raw name.
    pub name: &'a [u8],
    /// Effective raw comment.
    pub comment: &'a [u8],
    /// Whether name and comment are flagged as UTF-8.
    pub utf8: bool,
    /// Effective modification time.
    pub mtime: Timestamp,
    /// Effective external attributes.
    pub external_attributes: ExternalAttributes,
    /// Explicitly requested compression, if any.
    pub compression: Option<CompressionSetting>,
    /// Effective encryption method.
    pub encryption: EncryptionMethod,
    /// Password stored with a pending encryption change.
    pub password: Option<&'a Password>,
    /// User extra fields override, if any.
    pub extra: Option<&'a [ExtraField]>,
    /// Effective content.
    pub content: Content<'a>,
}

impl<'a> ResolvedEntry<'a> {
    /// The view of an original entry with no pending changes.
    pub fn original(entry: &'a DirectoryEntry) -> Self {
        Self {
            index: entry.index(),
            original: Some(entry),
            slot: None,
            name: entry.name_raw(),
            comment: entry.comment_raw(),
            utf8: entry.flags().contains(GeneralPurposeFlags::UTF8),
            mtime: entry.modified(),
            external_attributes: entry.external_attributes(),
            compression: None,
            encryption: entry.encryption_method(),
            password: None,
            extra: None,
            content: Content::Original(entry),
        }
    }

    /// Effective compression method.
    ///
    /// New content without an explicit choice reports the crate default; the
    /// commit options may still pick another method for it.
    pub fn compression_method(&self) -> CompressionMethod {
        match (self.compression, self.content) {
            (Some(setting), _) => setting.method,
            (None, Content::Original(entry)) => entry.compression_method(),
            (None, Content::Replaced(_)) => CompressionMethod::default(),
        }
    }

    /// Returns true if the content was replaced or added.
    pub fn is_replaced(&self) -> bool {
        matches!(self.content, Content::Replaced(_))
    }

    /// Returns true if nothing about the entry changed.
    pub fn is_unchanged(&self) -> bool {
        self.original.is_some() && self.slot.is_none_or(Slot::is_unchanged)
    }

    /// Returns true if only header fields changed and the stored data can be
    /// copied as is.
    pub fn is_header_only_change(&self) -> bool {
        match (self.original, self.slot) {
            (Some(_), Some(slot)) => slot.replace.is_none() && !slot.patch.changes_data(),
            (Some(_), None) => true,
            _ => false,
        }
    }

    /// Effective user extra fields: the override, or the original central
    /// fields.
    pub fn extra_fields(&self) -> &'a [ExtraField] {
        match (self.extra, self.original) {
            (Some(fields), _) => fields,
            (None, Some(entry)) => entry.extra_fields(),
            (None, None) => &[],
        }
    }
}

/// Pending operations for an archive.
#[derive(Debug, Default)]
pub struct ChangeSet {
    slots: Vec<Slot>,
    appended: Vec<Slot>,
    comment: Option<Vec<u8>>,
}

impl ChangeSet {
    /// Creates an empty change set for a directory of `original_len` entries.
    pub fn new(original_len: usize) -> Self {
        Self {
            slots: (0..original_len).map(|_| Slot::default()).collect(),
            appended: Vec::new(),
            comment: None,
        }
    }

    /// Number of addressable indices, including deleted and appended ones.
    pub fn index_count(&self) -> usize {
        self.slots.len() + self.appended.len()
    }

    /// Number of entries that currently exist.
    pub fn live_count(&self) -> usize {
        self.slots
            .iter()
            .chain(self.appended.iter())
            .filter(|slot| !slot.deleted)
            .count()
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Slot> {
        let count = self.index_count();
        let original = self.slots.len();
        let slot = if index < original {
            self.slots.get_mut(index)
        } else {
            self.appended.get_mut(index - original)
        }
        .ok_or(Error::InvalidIndex { index, count })?;
        if slot.deleted {
            return Err(Error::not_found_index(index));
        }
        Ok(slot)
    }

    /// The slot for `index`, whether or not it is deleted.
    pub fn slot(&self, index: usize) -> Option<&Slot> {
        let original = self.slots.len();
        if index < original {
            self.slots.get(index)
        } else {
            self.appended.get(index - original)
        }
    }

    /// Returns true if `index` is in range and not deleted.
    pub fn exists(&self, index: usize) -> bool {
        self.slot(index).is_some_and(|slot| !slot.deleted)
    }

    /// Records an operation against an existing entry.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIndex`] if `index` is out of range.
    /// - [`Error::EntryNotFound`] if the entry was deleted.
    pub fn apply(&mut self, index: usize, operation: Operation) -> Result<()> {
        log::trace!("entry {}: {}", index, operation.operation_type());
        let slot = self.slot_mut(index)?;
        match operation {
            Operation::Delete => {
                slot.clear();
                slot.deleted = true;
            }
            Operation::Rename(name) => slot.rename = Some(name),
            Operation::Replace(source) => slot.replace = Some(ContentSource::new(source)?),
            Operation::Patch(patch) => slot.patch.merge(patch),
        }
        Ok(())
    }

    /// Adds a new entry and returns its index.
    pub fn append(&mut self, name: Vec<u8>, content: ContentSource, patch: MetadataPatch) -> usize {
        self.appended.push(Slot::appended(name, content, patch));
        self.index_count() - 1
    }

    /// Resolves the effective view of `index`.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidIndex`] if `index` is out of range.
    /// - [`Error::EntryNotFound`] if the entry was deleted.
    pub fn resolve<'a>(&'a self, index: usize, directory: &'a Directory) -> Result<ResolvedEntry<'a>> {
        let count = self.index_count();
        let slot = self.slot(index).ok_or(Error::InvalidIndex { index, count })?;
        if slot.deleted {
            return Err(Error::not_found_index(index));
        }

        match directory.get(index) {
            Some(entry) => Ok(Self::merge(entry, slot)),
            None => Self::resolve_appended(index, slot),
        }
    }

    fn merge<'a>(entry: &'a DirectoryEntry, slot: &'a Slot) -> ResolvedEntry<'a> {
        let patch = &slot.patch;
        let name = slot.rename.as_deref().unwrap_or(entry.name_raw());
        let comment = patch.comment.as_deref().unwrap_or(entry.comment_raw());
        let utf8 = if slot.rename.is_some() || patch.comment.is_some() {
            encoding::needs_utf8_flag(name) || encoding::needs_utf8_flag(comment)
        } else {
            entry.flags().contains(GeneralPurposeFlags::UTF8)
        };
        let content = match &slot.replace {
            Some(replacement) => Content::Replaced(replacement),
            None => Content::Original(entry),
        };
        let mtime = patch.mtime.unwrap_or(match &slot.replace {
            Some(replacement) => replacement.mtime(),
            None => entry.modified(),
        });
        let (encryption, password) = match (&patch.encryption, &slot.replace) {
            (Some(setting), _) => (setting.method, setting.password.as_ref()),
            (None, Some(_)) => (EncryptionMethod::None, None),
            (None, None) => (entry.encryption_method(), None),
        };

        ResolvedEntry {
            index: entry.index(),
            original: Some(entry),
            slot: Some(slot),
            name,
            comment,
            utf8,
            mtime,
            external_attributes: patch
                .external_attributes
                .unwrap_or_else(|| entry.external_attributes()),
            compression: patch.compression,
            encryption,
            password,
            extra: patch.extra.as_deref(),
            content,
        }
    }

    fn resolve_appended(index: usize, slot: &Slot) -> Result<ResolvedEntry<'_>> {
        let (Some(name), Some(content)) = (slot.rename.as_deref(), slot.replace.as_ref()) else {
            return Err(Error::not_found_index(index));
        };
        let patch = &slot.patch;
        let comment = patch.comment.as_deref().unwrap_or_default();
        let (encryption, password) = match &patch.encryption {
            Some(setting) => (setting.method, setting.password.as_ref()),
            None => (EncryptionMethod::None, None),
        };
        let default_attributes = if name.ends_with(b"/") {
            ExternalAttributes::default_directory()
        } else {
            ExternalAttributes::default_file()
        };

        Ok(ResolvedEntry {
            index,
            original: None,
            slot: Some(slot),
            name,
            comment,
            utf8: encoding::needs_utf8_flag(name) || encoding::needs_utf8_flag(comment),
            mtime: patch.mtime.unwrap_or(content.mtime()),
            external_attributes: patch.external_attributes.unwrap_or(default_attributes),
            compression: patch.compression,
            encryption,
            password,
            extra: patch.extra.as_deref(),
            content: Content::Replaced(content),
        })
    }

    /// Resets all changes of one entry.
    ///
    /// An appended entry returns to its unchanged state, which is "does not
    /// exist". Unchanging an index twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidIndex`] if `index` is out of range.
    pub fn unchange(&mut self, index: usize) -> Result<()> {
        let count = self.index_count();
        let original = self.slots.len();
        if index < original {
            self.slots[index].clear();
        } else if let Some(slot) = self.appended.get_mut(index - original) {
            slot.clear();
            slot.deleted = true;
        } else {
            return Err(Error::InvalidIndex { index, count });
        }
        Ok(())
    }

    /// Resets every entry and drops all appended entries.
    pub fn unchange_all(&mut self) {
        self.slots.iter_mut().for_each(Slot::clear);
        self.appended.clear();
    }

    /// Clears archive-level overrides.
    pub fn unchange_globals(&mut self) {
        self.comment = None;
    }

    /// Overrides the archive comment. An empty comment deletes it.
    pub fn set_comment(&mut self, comment: Vec<u8>) {
        self.comment = Some(comment);
    }

    /// The pending archive comment, if overridden.
    pub fn comment(&self) -> Option<&[u8]> {
        self.comment.as_deref()
    }

    /// Returns true if there is nothing to commit.
    pub fn is_empty(&self) -> bool {
        self.comment.is_none()
            && self.slots.iter().all(Slot::is_unchanged)
            && self.appended.iter().all(|slot| slot.deleted)
    }

    /// Mutable access to every pending content source.
    pub(crate) fn contents_mut(&mut self) -> impl Iterator<Item = &mut ContentSource> {
        self.slots
            .iter_mut()
            .chain(self.appended.iter_mut())
            .filter_map(|slot| slot.replace.as_mut())
    }
}
