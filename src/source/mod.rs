//! Byte sources: where archives and entry contents come from.
//!
//! A source is described by capability tiers rather than a single dispatch
//! function:
//!
//! - [`ReadableSource`]: `open`, `read`, `close`, `stat`
//! - [`SeekableSource`]: adds `seek` and `tell`
//! - [`WritableSource`]: adds staged writes (`begin_write` ... `commit_write`
//!   or `rollback_write`), write-side seeking, and `remove`
//!
//! Every concrete source implements [`Source`], which advertises its tiers
//! through [`Source::capabilities`] and hands out the richer trait objects on
//! demand. The engine picks the richest tier a source offers and fails fast
//! with [`Error::UnsupportedOperation`] when a required tier is missing.
//!
//! # Shipped sources
//!
//! | Source | Tiers | Notes |
//! |--------|-------|-------|
//! | [`FileSource`] | read, seek, write | Writes go to a sibling temp file |
//! | [`MemorySource`] | read, seek, write | Cloneable handle to a shared buffer |
//! | [`StreamSource`] | read | Buffers the stream on first open |

mod file;
mod memory;
mod stream;

use std::io::{self, SeekFrom};
use std::sync::{Mutex, MutexGuard};

pub use file::FileSource;
pub use memory::MemorySource;
pub use stream::StreamSource;

use crate::timestamp::Timestamp;
use crate::{Error, Result};

bitflags::bitflags! {
    /// Capability tiers advertised by a source.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// `open`, `read`, `close`, `stat`.
        const READ = 1 << 0;
        /// `seek`, `tell`.
        const SEEK = 1 << 1;
        /// Staged writes and `remove`.
        const WRITE = 1 << 2;
    }
}

/// Metadata reported by [`ReadableSource::stat`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SourceStat {
    /// Total size in bytes, if known.
    pub size: Option<u64>,
    /// Modification time, if known.
    pub mtime: Option<Timestamp>,
}

/// The base tier: sequential reading.
///
/// `open` (re)starts reading from the beginning. Sources that cannot rewind
/// must buffer their content on first open.
pub trait ReadableSource: Send {
    /// Prepares for reading from the beginning.
    fn open(&mut self) -> Result<()>;

    /// Reads up to `buf.len()` bytes. Returns 0 at end of data.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize>;

    /// Releases any resources acquired by `open`.
    fn close(&mut self) -> Result<()>;

    /// Reports size and modification time.
    fn stat(&self) -> Result<SourceStat>;
}

/// Random access reads.
pub trait SeekableSource: ReadableSource {
    /// Moves the read position.
    fn seek(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Returns the read position.
    fn tell(&mut self) -> Result<u64>;
}

/// Staged replacement of the source's content.
///
/// Between `begin_write` and `commit_write` the original content stays
/// readable; `commit_write` swaps the new content in, `rollback_write` throws
/// it away.
pub trait WritableSource: SeekableSource {
    /// Starts a new staged output.
    fn begin_write(&mut self) -> Result<()>;

    /// Appends to the staged output at the write position.
    fn write(&mut self, buf: &[u8]) -> Result<usize>;

    /// Replaces the original content with the staged output.
    fn commit_write(&mut self) -> Result<()>;

    /// Discards the staged output.
    fn rollback_write(&mut self);

    /// Moves the write position inside the staged output.
    fn seek_write(&mut self, pos: SeekFrom) -> Result<u64>;

    /// Returns the write position inside the staged output.
    fn tell_write(&mut self) -> Result<u64>;

    /// Deletes the underlying storage.
    fn remove(&mut self) -> Result<()>;
}

/// An object-safe source usable by the engine.
pub trait Source: ReadableSource {
    /// The tiers this source supports.
    fn capabilities(&self) -> Capabilities;

    /// Returns the seekable tier, if supported.
    fn as_seekable(&mut self) -> Option<&mut dyn SeekableSource>;

    /// Returns the writable tier, if supported.
    fn as_writable(&mut self) -> Option<&mut dyn WritableSource>;

    /// Returns true if the underlying storage currently exists.
    fn exists(&self) -> bool {
        true
    }
}

/// Acquires a source lock, recovering from a poisoned state.
///
/// Sources hold no invariants across a panic that a later positioned read
/// depends on: every read seeks first.
pub(crate) fn lock_or_recover<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| {
        log::warn!("source mutex was poisoned, recovering");
        poisoned.into_inner()
    })
}

/// Reads exactly `buf.len()` bytes at `offset`.
pub(crate) fn read_exact_at(
    source: &mut dyn SeekableSource,
    offset: u64,
    buf: &mut [u8],
) -> Result<()> {
    source.seek(SeekFrom::Start(offset))?;
    let mut filled = 0;
    while filled < buf.len() {
        let n = source.read(&mut buf[filled..])?;
        if n == 0 {
            return Err(Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!(
                    "source ended {} bytes short at offset {}",
                    buf.len() - filled,
                    offset
                ),
            )));
        }
        filled += n;
    }
    Ok(())
}

/// A `Read` over a source shared behind a mutex.
///
/// In positional mode every read locks the source, seeks to the reader's own
/// position and reads, so several readers can interleave over one source.
/// Sequential mode is used for sources without the seek tier; the source is
/// opened once and read from its own cursor.
pub(crate) struct SharedSourceReader<'a> {
    source: &'a Mutex<Box<dyn Source>>,
    pos: u64,
    end: Option<u64>,
    positional: bool,
}

impl<'a> SharedSourceReader<'a> {
    /// Reads `[start, start + len)` of a seekable source.
    pub(crate) fn range(source: &'a Mutex<Box<dyn Source>>, start: u64, len: u64) -> Self {
        Self {
            source,
            pos: start,
            end: Some(start.saturating_add(len)),
            positional: true,
        }
    }

    /// Reads a whole source from the beginning.
    pub(crate) fn whole(source: &'a Mutex<Box<dyn Source>>) -> Result<Self> {
        let positional = {
            let mut guard = lock_or_recover(source);
            let seekable = guard.capabilities().contains(Capabilities::SEEK);
            guard.open()?;
            seekable
        };
        Ok(Self {
            source,
            pos: 0,
            end: None,
            positional,
        })
    }

    /// Returns true if the reader can move to arbitrary positions.
    pub(crate) fn is_positional(&self) -> bool {
        self.positional
    }

    /// Current position relative to the source start.
    pub(crate) fn position(&self) -> u64 {
        self.pos
    }

    /// Moves to an absolute source position. Positional mode only.
    pub(crate) fn set_position(&mut self, pos: u64) {
        self.pos = pos;
    }
}

impl io::Read for SharedSourceReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let want = match self.end {
            Some(end) => (end.saturating_sub(self.pos)).min(buf.len() as u64) as usize,
            None => buf.len(),
        };
        if want == 0 {
            return Ok(0);
        }

        let mut guard = lock_or_recover(self.source);
        let n = if self.positional {
            let seekable = guard.as_seekable().ok_or_else(|| {
                io::Error::new(io::ErrorKind::Unsupported, "source lost its seek capability")
            })?;
            seekable.seek(SeekFrom::Start(self.pos))?;
            seekable.read(&mut buf[..want])?
        } else {
            guard.read(&mut buf[..want])?
        };
        self.pos += n as u64;
        Ok(n)
    }
}

/// Resolves a `SeekFrom` against a current position and total length.
pub(crate) fn resolve_seek(pos: SeekFrom, current: u64, len: u64) -> Result<u64> {
    let target = match pos {
        SeekFrom::Start(offset) => Some(offset),
        SeekFrom::Current(delta) => current.checked_add_signed(delta),
        SeekFrom::End(delta) => len.checked_add_signed(delta),
    };
    target.ok_or_else(|| {
        Error::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            "seek before start of source",
        ))
    })
}
