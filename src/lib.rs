//! # zipkit
//!
//! A ZIP archive mutation engine in pure Rust.
//!
//! An archive is opened once, edited in memory through a log of pending
//! changes, and written back with a single atomic commit. Reads always see
//! the pending state, so an entry added a moment ago can be read back before
//! anything touches storage.
//!
//! ## Quick Start
//!
//! ### Creating an Archive
//!
//! ```rust,no_run
//! use zipkit::{Archive, OpenFlags, Result};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open("new.zip", OpenFlags::CREATE | OpenFlags::TRUNCATE)?;
//!     archive.add_bytes("hello.txt", b"Hello, World!".to_vec())?;
//!     archive.add_directory("docs")?;
//!
//!     let result = archive.commit()?;
//!     println!("wrote {} entries, {} bytes", result.entries_written, result.bytes_written);
//!     Ok(())
//! }
//! ```
//!
//! ### Editing an Archive
//!
//! ```rust,no_run
//! use zipkit::{Archive, LocateFlags, OpenFlags, Result, StringDecoding, Version};
//!
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open("data.zip", OpenFlags::empty())?;
//!
//!     for entry in archive.entries() {
//!         println!("{}: {:?} bytes", entry.name(StringDecoding::Guess), entry.size());
//!     }
//!
//!     let index = archive.locate("old.txt", LocateFlags::NOCASE)?;
//!     archive.rename(index, "new.txt")?;
//!     archive.set_comment("edited")?;
//!     assert_eq!(archive.len(Version::Current), archive.len(Version::Unchanged));
//!
//!     let _ = archive.commit()?;
//!     Ok(())
//! }
//! ```
//!
//! ### Password-Protected Entries
//!
//! ```rust,ignore
//! # #[cfg(feature = "aes")]
//! use zipkit::{Archive, EncryptionMethod, OpenFlags, Password, Result};
//!
//! # #[cfg(feature = "aes")]
//! fn main() -> Result<()> {
//!     let mut archive = Archive::open("secret.zip", OpenFlags::CREATE)?;
//!     let index = archive.add_bytes("secret.txt", b"Secret data".to_vec())?;
//!     archive.set_encryption(index, EncryptionMethod::Aes256, Some(Password::new("secret")))?;
//!     let _ = archive.commit()?;
//!
//!     let archive = Archive::open_read_only("secret.zip")?;
//!     let data = archive
//!         .entry(0)?
//!         .open(Some(&Password::new("secret")))?
//!         .read_all()?;
//!     assert_eq!(data, b"Secret data");
//!     Ok(())
//! }
//! # #[cfg(not(feature = "aes"))]
//! # fn main() {}
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `deflate` | Yes | Deflate compression |
//! | `bzip2` | Yes | BZip2 compression |
//! | `aes` | Yes | WinZip AES encryption |
//! | `zstd` | No | Zstandard compression |
//!
//! Traditional PKWARE encryption and stored entries are always available.
//!
//! ## Byte Sources
//!
//! Archives and entry contents are read through [`Source`] objects that
//! advertise capability tiers (read, seek, write). [`FileSource`],
//! [`MemorySource`] and [`StreamSource`] ship with the crate; any other
//! storage can be plugged in by implementing the traits in [`source`].
//!
//! ## Error Handling
//!
//! All operations return [`Result<T>`], an alias for
//! `std::result::Result<T, Error>`:
//!
//! ```rust,no_run
//! use zipkit::{Archive, Error};
//!
//! fn open_archive(path: &str) -> zipkit::Result<()> {
//!     match Archive::open_read_only(path) {
//!         Ok(archive) => {
//!             println!("{} entries", archive.len(zipkit::Version::Current));
//!             Ok(())
//!         }
//!         Err(Error::CorruptArchive { offset, reason }) => {
//!             eprintln!("not a usable ZIP file at {:#x}: {}", offset, reason);
//!             Err(Error::CorruptArchive { offset, reason })
//!         }
//!         Err(e) => Err(e),
//!     }
//! }
//! # fn main() {}
//! ```
//!
//! ## Minimum Supported Rust Version (MSRV)
//!
//! This crate requires **Rust 1.85** or later.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]
#![warn(rust_2018_idioms)]
#![deny(unsafe_op_in_unsafe_fn)]

pub mod archive;
pub mod attributes;
pub mod changes;
pub mod checksum;
pub mod codec;
pub mod commit;
pub mod crypto;
pub mod directory;
pub mod encoding;
pub mod entry;
pub mod error;
pub mod format;
pub mod source;
pub mod timestamp;

pub use archive::{AddOptions, Archive, OpenFlags};
pub use attributes::{ExternalAttributes, OperatingSystem};
pub use codec::CompressionMethod;
pub use commit::{CommitOptions, CommitResult};
pub use crypto::{EncryptionMethod, Password};
pub use directory::LocateFlags;
pub use encoding::StringDecoding;
pub use entry::{Entry, EntryMut, EntryReader, EntryStat, Version};
pub use error::{Error, PasswordDetectionMethod, Result};
pub use format::GeneralPurposeFlags;
pub use format::extra::{ExtraField, ExtraLocation};
pub use source::{FileSource, MemorySource, Source, StreamSource};
pub use timestamp::Timestamp;
