//! Error types for ZIP archive operations.
//!
//! This module provides the [`Error`] enum which represents every failure
//! mode of the engine, along with a convenient [`Result<T>`] type alias.
//!
//! # Error Handling
//!
//! All fallible operations in this crate return `Result<T, Error>`. Errors are
//! always returned to the immediate caller; the engine never retries.
//!
//! ```rust,no_run
//! use zipkit::{Archive, Error, OpenFlags};
//!
//! fn open_or_report(path: &str) -> zipkit::Result<Archive> {
//!     match Archive::open(path, OpenFlags::empty()) {
//!         Ok(archive) => Ok(archive),
//!         Err(Error::CorruptArchive { offset, reason }) => {
//!             eprintln!("Damaged archive at byte {:#x}: {}", offset, reason);
//!             Err(Error::CorruptArchive { offset, reason })
//!         }
//!         Err(Error::Io(e)) if e.kind() == std::io::ErrorKind::NotFound => {
//!             eprintln!("Archive not found: {}", path);
//!             Err(Error::Io(e))
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! ```
//!
//! A failed commit is reported as [`Error::CommitFailed`]; in that case the
//! original archive is left byte-for-byte untouched.

use std::io;

/// How a wrong password was detected.
///
/// Use [`Error::PasswordRequired`] instead when no password was supplied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum PasswordDetectionMethod {
    /// The WinZip AES password verification value did not match.
    ///
    /// This happens before any data is decrypted.
    VerificationValue,

    /// The traditional PKWARE header check byte did not match.
    HeaderCheckByte,

    /// The WinZip AES authentication code did not match at end of stream.
    Authentication,
}

impl std::fmt::Display for PasswordDetectionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::VerificationValue => write!(f, "password verification value"),
            Self::HeaderCheckByte => write!(f, "encryption header check byte"),
            Self::Authentication => write!(f, "authentication code"),
        }
    }
}

/// Helper struct for formatting WrongPassword error messages.
struct WrongPasswordDisplay<'a> {
    entry_index: Option<usize>,
    entry_name: Option<&'a str>,
    detection_method: PasswordDetectionMethod,
}

impl std::fmt::Display for WrongPasswordDisplay<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Wrong password")?;
        match (self.entry_index, self.entry_name) {
            (Some(idx), Some(name)) => write!(f, " for entry {} ({})", idx, name)?,
            (Some(idx), None) => write!(f, " for entry {}", idx)?,
            (None, Some(name)) => write!(f, " for entry '{}'", name)?,
            (None, None) => {}
        }
        write!(f, " (detected by {})", self.detection_method)
    }
}

/// The main error type for ZIP archive operations.
///
/// # Error Categories
///
/// | Category | Variants | Typical Cause |
/// |----------|----------|---------------|
/// | I/O | [`Io`][Self::Io] | File system operations |
/// | Format | [`CorruptArchive`][Self::CorruptArchive] | Unparsable directory |
/// | Lookup | [`EntryNotFound`][Self::EntryNotFound], [`InvalidIndex`][Self::InvalidIndex] | Caller input |
/// | Encryption | [`WrongPassword`][Self::WrongPassword], [`PasswordRequired`][Self::PasswordRequired] | Passwords |
/// | Compatibility | [`UnsupportedMethod`][Self::UnsupportedMethod], [`UnsupportedEncryption`][Self::UnsupportedEncryption], [`UnsupportedOperation`][Self::UnsupportedOperation] | Missing features |
/// | Misuse | [`UseAfterClose`][Self::UseAfterClose], [`ReadOnly`][Self::ReadOnly] | Programmer error |
/// | Commit | [`CommitFailed`][Self::CommitFailed] | Write-out failure |
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// An I/O error occurred during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The end-of-central-directory record or the central directory is
    /// unparsable or inconsistent.
    ///
    /// This is fatal to `open`. The offset is the byte position in the
    /// source where the problem was detected.
    #[error("Corrupt archive at offset {offset:#x}: {reason}")]
    CorruptArchive {
        /// The byte offset where corruption was detected.
        offset: u64,
        /// A description of the corruption.
        reason: String,
    },

    /// No entry matched a name or the entry at an index was deleted.
    #[error("Entry not found: {name}")]
    EntryNotFound {
        /// The name that was looked up, or `#<index>` for index lookups.
        name: String,
    },

    /// An index outside the archive's entry range was passed.
    #[error("Invalid entry index {index} (archive has {count} entries)")]
    InvalidIndex {
        /// The requested index.
        index: usize,
        /// The number of addressable entries.
        count: usize,
    },

    /// The password is incorrect.
    #[error("{}", WrongPasswordDisplay { entry_index: *entry_index, entry_name: entry_name.as_deref(), detection_method: *detection_method })]
    WrongPassword {
        /// The entry index where the wrong password was detected (if known).
        entry_index: Option<usize>,
        /// The entry name where the wrong password was detected (if known).
        entry_name: Option<String>,
        /// How the wrong password was detected.
        detection_method: PasswordDetectionMethod,
    },

    /// The entry is encrypted and no password was available.
    #[error("Entry {entry_index} is encrypted and no password was provided")]
    PasswordRequired {
        /// The encrypted entry.
        entry_index: usize,
    },

    /// The entry uses a compression method not supported by this build.
    ///
    /// Common method IDs: `0` stored, `8` deflate, `12` bzip2, `14` LZMA,
    /// `93` zstd. Enable the corresponding feature flag to add support.
    #[error("Unsupported compression method: {method_id}")]
    UnsupportedMethod {
        /// The method ID that is not supported.
        method_id: u16,
    },

    /// The entry uses an encryption method not supported by this build.
    #[error("Unsupported encryption method: {method_id:#x}")]
    UnsupportedEncryption {
        /// The encryption method ID that is not supported.
        method_id: u16,
    },

    /// The operation is not available for this entry or source.
    ///
    /// Returned, for example, when seeking inside compressed data or when a
    /// source lacks a capability the operation needs.
    #[error("Unsupported operation: {operation}")]
    UnsupportedOperation {
        /// A short description of the rejected operation.
        operation: &'static str,
    },

    /// A reader was used after it was closed.
    #[error("Reader used after close")]
    UseAfterClose,

    /// Writing the new archive failed. The original is untouched.
    #[error("Commit failed: {reason}")]
    CommitFailed {
        /// What went wrong.
        reason: String,
    },

    /// A size, offset or count does not fit the target integer type.
    #[error("Integer overflow: {what}")]
    IntegerOverflow {
        /// The value that overflowed.
        what: &'static str,
    },

    /// The entry's data cannot be read.
    #[error("Entry {index} is not readable: {reason}")]
    EntryNotReadable {
        /// The entry index.
        index: usize,
        /// Why the entry cannot be read.
        reason: String,
    },

    /// The CRC-32 of the decoded data does not match the stored value.
    #[error("CRC mismatch for entry {entry_index}: expected {expected:#010x}, got {actual:#010x}")]
    ChecksumMismatch {
        /// The entry index.
        entry_index: usize,
        /// The CRC stored in the archive.
        expected: u32,
        /// The CRC of the decoded data.
        actual: u32,
    },

    /// A mutation was attempted on an archive opened read-only.
    #[error("Archive is read-only")]
    ReadOnly,

    /// The archive exists and `EXCLUSIVE` was requested.
    #[error("Archive already exists: {path}")]
    ArchiveExists {
        /// The path that already exists.
        path: String,
    },

    /// A cryptographic primitive failed.
    #[error("Cryptographic error: {0}")]
    CryptoError(String),
}

/// A specialized Result type for ZIP archive operations.
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Returns true if the error is local to one entry or lookup and leaves
    /// the archive usable.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::EntryNotFound { .. }
                | Self::WrongPassword { .. }
                | Self::PasswordRequired { .. }
                | Self::UnsupportedMethod { .. }
                | Self::UnsupportedEncryption { .. }
                | Self::UnsupportedOperation { .. }
                | Self::EntryNotReadable { .. }
                | Self::ChecksumMismatch { .. }
        )
    }

    /// Returns true if the error indicates damaged archive data.
    pub fn is_corruption(&self) -> bool {
        matches!(
            self,
            Self::CorruptArchive { .. } | Self::ChecksumMismatch { .. }
        )
    }

    /// Returns true if the error is related to passwords or encryption.
    pub fn is_encryption_error(&self) -> bool {
        matches!(
            self,
            Self::WrongPassword { .. }
                | Self::PasswordRequired { .. }
                | Self::UnsupportedEncryption { .. }
                | Self::CryptoError(_)
        )
    }

    /// Returns true if the error is caused by a missing capability.
    pub fn is_unsupported(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMethod { .. }
                | Self::UnsupportedEncryption { .. }
                | Self::UnsupportedOperation { .. }
        )
    }

    /// Returns the entry index associated with the error, if any.
    pub fn entry_index(&self) -> Option<usize> {
        match self {
            Self::WrongPassword { entry_index, .. } => *entry_index,
            Self::PasswordRequired { entry_index } => Some(*entry_index),
            Self::ChecksumMismatch { entry_index, .. } => Some(*entry_index),
            Self::EntryNotReadable { index, .. } => Some(*index),
            Self::InvalidIndex { index, .. } => Some(*index),
            _ => None,
        }
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        Self::CorruptArchive {
            offset,
            reason: reason.into(),
        }
    }

    pub(crate) fn not_found_index(index: usize) -> Self {
        Self::EntryNotFound {
            name: format!("#{}", index),
        }
    }

    pub(crate) fn wrong_password(
        entry_index: usize,
        entry_name: Option<String>,
        detection_method: PasswordDetectionMethod,
    ) -> Self {
        Self::WrongPassword {
            entry_index: Some(entry_index),
            entry_name,
            detection_method,
        }
    }

    /// Recovers an engine error that travelled through an `io::Error`.
    pub(crate) fn from_io(err: io::Error) -> Self {
        let carries_engine_error = err.get_ref().is_some_and(|inner| inner.is::<Error>());
        if !carries_engine_error {
            return Self::Io(err);
        }
        match err.into_inner().map(|inner| inner.downcast::<Error>()) {
            Some(Ok(inner)) => *inner,
            Some(Err(other)) => Self::Io(io::Error::other(other)),
            None => Self::Io(io::Error::other("unknown I/O error")),
        }
    }

    /// Fills in the entry context of an error raised below the entry layer.
    pub(crate) fn with_entry(self, index: usize, name: impl FnOnce() -> String) -> Self {
        match self {
            Self::WrongPassword {
                entry_index: None,
                entry_name: None,
                detection_method,
            } => Self::WrongPassword {
                entry_index: Some(index),
                entry_name: Some(name()),
                detection_method,
            },
            other => other,
        }
    }

    pub(crate) fn commit_failed(cause: &Error) -> Self {
        match cause {
            Self::CommitFailed { reason } => Self::CommitFailed {
                reason: reason.clone(),
            },
            other => Self::CommitFailed {
                reason: other.to_string(),
            },
        }
    }
}

/// Converts an engine error into an `io::Error` for `std::io::Read` adapters.
impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        match err {
            Error::Io(e) => e,
            Error::CorruptArchive { .. } | Error::ChecksumMismatch { .. } => {
                io::Error::new(io::ErrorKind::InvalidData, err)
            }
            Error::UnsupportedMethod { .. }
            | Error::UnsupportedEncryption { .. }
            | Error::UnsupportedOperation { .. } => io::Error::new(io::ErrorKind::Unsupported, err),
            Error::UseAfterClose => io::Error::new(io::ErrorKind::NotConnected, err),
            other => io::Error::other(other),
        }
    }
}
