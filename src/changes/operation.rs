//! Pending modification operations.

use std::fmt;

use crate::attributes::ExternalAttributes;
use crate::codec::CompressionMethod;
use crate::crypto::{EncryptionMethod, Password};
use crate::format::extra::ExtraField;
use crate::source::Source;
use crate::timestamp::Timestamp;

/// Requested compression for an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSetting {
    /// The method to compress with.
    pub method: CompressionMethod,
    /// Method-specific level; `None` picks the method's default.
    pub level: Option<u32>,
}

/// Requested encryption for an entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionSetting {
    /// The method to encrypt with.
    pub method: EncryptionMethod,
    /// The password; `None` falls back to the archive default.
    pub password: Option<Password>,
}

/// Field-by-field metadata overrides for one entry.
///
/// A `None` field leaves the current value alone. Merging a patch into
/// another lets every `Some` field of the newer patch win.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataPatch {
    /// New entry comment. An empty comment deletes it.
    pub comment: Option<Vec<u8>>,
    /// New modification time.
    pub mtime: Option<Timestamp>,
    /// New external attributes.
    pub external_attributes: Option<ExternalAttributes>,
    /// New compression.
    pub compression: Option<CompressionSetting>,
    /// New encryption.
    pub encryption: Option<EncryptionSetting>,
    /// Replacement list of user extra fields, for both headers.
    pub extra: Option<Vec<ExtraField>>,
}

impl MetadataPatch {
    /// Returns true if the patch overrides nothing.
    pub fn is_empty(&self) -> bool {
        self.comment.is_none()
            && self.mtime.is_none()
            && self.external_attributes.is_none()
            && self.compression.is_none()
            && self.encryption.is_none()
            && self.extra.is_none()
    }

    /// Returns true if applying the patch requires re-encoding the data.
    pub fn changes_data(&self) -> bool {
        self.compression.is_some() || self.encryption.is_some()
    }

    /// Merges `newer` into `self`; fields set in `newer` win.
    pub fn merge(&mut self, newer: MetadataPatch) {
        let MetadataPatch {
            comment,
            mtime,
            external_attributes,
            compression,
            encryption,
            extra,
        } = newer;
        if comment.is_some() {
            self.comment = comment;
        }
        if mtime.is_some() {
            self.mtime = mtime;
        }
        if external_attributes.is_some() {
            self.external_attributes = external_attributes;
        }
        if compression.is_some() {
            self.compression = compression;
        }
        if encryption.is_some() {
            self.encryption = encryption;
        }
        if extra.is_some() {
            self.extra = extra;
        }
    }
}

/// A pending modification of one entry.
pub enum Operation {
    /// Remove the entry.
    Delete,
    /// Give the entry a new raw name.
    Rename(Vec<u8>),
    /// Replace the entry's content with uncompressed data from a source.
    Replace(Box<dyn Source>),
    /// Override metadata fields.
    Patch(MetadataPatch),
}

impl Operation {
    /// Returns the operation type as a string.
    pub fn operation_type(&self) -> &'static str {
        match self {
            Operation::Delete => "delete",
            Operation::Rename(_) => "rename",
            Operation::Replace(_) => "replace",
            Operation::Patch(_) => "patch",
        }
    }
}

impl fmt::Debug for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Delete => write!(f, "Delete"),
            Operation::Rename(name) => {
                write!(f, "Rename({:?})", String::from_utf8_lossy(name))
            }
            Operation::Replace(_) => write!(f, "Replace(..)"),
            Operation::Patch(patch) => f.debug_tuple("Patch").field(patch).finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;

    #[test]
    fn test_patch_merge_is_field_by_field() {
        let mut patch = MetadataPatch {
            comment: Some(b"first".to_vec()),
            mtime: Some(Timestamp::from_unix_secs(10)),
            ..Default::default()
        };
        patch.merge(MetadataPatch {
            comment: Some(b"second".to_vec()),
            compression: Some(CompressionSetting {
                method: CompressionMethod::Stored,
                level: None,
            }),
            ..Default::default()
        });
        assert_eq!(patch.comment.as_deref(), Some(&b"second"[..]));
        assert_eq!(patch.mtime, Some(Timestamp::from_unix_secs(10)));
        assert!(patch.changes_data());
    }

    #[test]
    fn test_empty_patch() {
        let mut patch = MetadataPatch::default();
        assert!(patch.is_empty());
        patch.merge(MetadataPatch::default());
        assert!(patch.is_empty());
        assert!(!patch.changes_data());
    }

    #[test]
    fn test_operation_classification() {
        assert_eq!(Operation::Delete.operation_type(), "delete");
        assert_eq!(
            Operation::Replace(Box::new(MemorySource::new(Vec::new()))).operation_type(),
            "replace"
        );
        assert_eq!(
            Operation::Patch(MetadataPatch::default()).operation_type(),
            "patch"
        );
        assert_eq!(format!("{:?}", Operation::Rename(b"a".to_vec())), "Rename(\"a\")");
    }
}
