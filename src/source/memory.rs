//! In-memory source.

use std::io::SeekFrom;
use std::sync::{Arc, Mutex};

use super::{
    Capabilities, ReadableSource, SeekableSource, Source, SourceStat, WritableSource,
    lock_or_recover, resolve_seek,
};
use crate::timestamp::Timestamp;
use crate::{Error, Result};

#[derive(Debug, Default)]
struct Buffer {
    data: Vec<u8>,
    exists: bool,
    mtime: Option<Timestamp>,
}

/// A source backed by a byte buffer.
///
/// Clones share the buffer but keep their own read position, so a caller can
/// hand one clone to an [`Archive`](crate::Archive) and read the committed
/// bytes back through another:
///
/// ```rust
/// use zipkit::{Archive, MemorySource, OpenFlags};
///
/// # fn main() -> zipkit::Result<()> {
/// let buffer = MemorySource::empty();
/// let mut archive = Archive::open_source(Box::new(buffer.clone()), OpenFlags::CREATE)?;
/// archive.add_bytes("hello.txt", b"Hello".to_vec())?;
/// archive.commit()?;
///
/// let bytes = buffer.contents().expect("archive was written");
/// assert_eq!(&bytes[..4], b"PK\x03\x04");
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct MemorySource {
    buffer: Arc<Mutex<Buffer>>,
    pos: u64,
    staged: Option<Staged>,
}

#[derive(Debug, Clone, Default)]
struct Staged {
    data: Vec<u8>,
    pos: usize,
}

impl MemorySource {
    /// Creates a source holding `data`.
    pub fn new(data: Vec<u8>) -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Buffer {
                data,
                exists: true,
                mtime: None,
            })),
            pos: 0,
            staged: None,
        }
    }

    /// Creates a source with no content yet.
    ///
    /// [`Source::exists`] reports false until a write is committed, so the
    /// source can back a newly created archive.
    pub fn empty() -> Self {
        Self {
            buffer: Arc::new(Mutex::new(Buffer::default())),
            pos: 0,
            staged: None,
        }
    }

    /// Sets the modification time reported by `stat`.
    pub fn with_mtime(self, mtime: Timestamp) -> Self {
        lock_or_recover(&self.buffer).mtime = Some(mtime);
        self
    }

    /// Returns a copy of the current content, or `None` if removed or never
    /// written.
    pub fn contents(&self) -> Option<Vec<u8>> {
        let buffer = lock_or_recover(&self.buffer);
        buffer.exists.then(|| buffer.data.clone())
    }

    /// Current content length.
    pub fn len(&self) -> usize {
        lock_or_recover(&self.buffer).data.len()
    }

    /// Returns true if the content is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn staged(&mut self) -> Result<&mut Staged> {
        self.staged.as_mut().ok_or(Error::UnsupportedOperation {
            operation: "write without begin_write",
        })
    }
}

impl ReadableSource for MemorySource {
    fn open(&mut self) -> Result<()> {
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        let buffer = lock_or_recover(&self.buffer);
        let start = (self.pos as usize).min(buffer.data.len());
        let n = (buffer.data.len() - start).min(buf.len());
        buf[..n].copy_from_slice(&buffer.data[start..start + n]);
        drop(buffer);
        self.pos += n as u64;
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn stat(&self) -> Result<SourceStat> {
        let buffer = lock_or_recover(&self.buffer);
        Ok(SourceStat {
            size: Some(buffer.data.len() as u64),
            mtime: buffer.mtime,
        })
    }
}

impl SeekableSource for MemorySource {
    fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        let len = self.len() as u64;
        self.pos = resolve_seek(pos, self.pos, len)?;
        Ok(self.pos)
    }

    fn tell(&mut self) -> Result<u64> {
        Ok(self.pos)
    }
}

impl WritableSource for MemorySource {
    fn begin_write(&mut self) -> Result<()> {
        self.staged = Some(Staged::default());
        Ok(())
    }

    fn write(&mut self, buf: &[u8]) -> Result<usize> {
        let staged = self.staged()?;
        let end = staged.pos + buf.len();
        if staged.data.len() < end {
            staged.data.resize(end, 0);
        }
        staged.data[staged.pos..end].copy_from_slice(buf);
        staged.pos = end;
        Ok(buf.len())
    }

    fn commit_write(&mut self) -> Result<()> {
        let staged = self.staged.take().ok_or(Error::UnsupportedOperation {
            operation: "commit without begin_write",
        })?;
        let mut buffer = lock_or_recover(&self.buffer);
        buffer.data = staged.data;
        buffer.exists = true;
        buffer.mtime = Some(Timestamp::now());
        self.pos = 0;
        Ok(())
    }

    fn rollback_write(&mut self) {
        self.staged = None;
    }

    fn seek_write(&mut self, pos: SeekFrom) -> Result<u64> {
        let staged = self.staged()?;
        let target = resolve_seek(pos, staged.pos as u64, staged.data.len() as u64)?;
        staged.pos = usize::try_from(target).map_err(|_| Error::IntegerOverflow {
            what: "memory write position",
        })?;
        Ok(target)
    }

    fn tell_write(&mut self) -> Result<u64> {
        Ok(self.staged()?.pos as u64)
    }

    fn remove(&mut self) -> Result<()> {
        let mut buffer = lock_or_recover(&self.buffer);
        buffer.data.clear();
        buffer.exists = false;
        Ok(())
    }
}

impl Source for MemorySource {
    fn capabilities(&self) -> Capabilities {
        Capabilities::all()
    }

    fn as_seekable(&mut self) -> Option<&mut dyn SeekableSource> {
        Some(self)
    }

    fn as_writable(&mut self) -> Option<&mut dyn WritableSource> {
        Some(self)
    }

    fn exists(&self) -> bool {
        lock_or_recover(&self.buffer).exists
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clones_share_content() {
        let mut writer = MemorySource::empty();
        let reader = writer.clone();
        assert!(!reader.exists());
        assert_eq!(reader.contents(), None);

        writer.begin_write().unwrap();
        writer.write(b"abc").unwrap();
        writer.commit_write().unwrap();

        assert!(reader.exists());
        assert_eq!(reader.contents().unwrap(), b"abc");
    }

    #[test]
    fn test_independent_positions() {
        let mut a = MemorySource::new(b"0123456789".to_vec());
        let mut b = a.clone();
        a.seek(SeekFrom::Start(5)).unwrap();

        let mut buf = [0u8; 2];
        b.read(&mut buf).unwrap();
        assert_eq!(&buf, b"01");
        a.read(&mut buf).unwrap();
        assert_eq!(&buf, b"56");
    }

    #[test]
    fn test_seek_write_patches_staged_output() {
        let mut source = MemorySource::new(b"old".to_vec());
        source.begin_write().unwrap();
        source.write(b"xxxxyyyy").unwrap();
        source.seek_write(SeekFrom::Start(2)).unwrap();
        source.write(b"AB").unwrap();
        assert_eq!(source.tell_write().unwrap(), 4);
        source.seek_write(SeekFrom::End(0)).unwrap();
        source.write(b"z").unwrap();

        assert_eq!(source.contents().unwrap(), b"old");
        source.commit_write().unwrap();
        assert_eq!(source.contents().unwrap(), b"xxAByyyyz");
    }

    #[test]
    fn test_rollback_and_remove() {
        let mut source = MemorySource::new(b"keep".to_vec());
        source.begin_write().unwrap();
        source.write(b"drop").unwrap();
        source.rollback_write();
        assert_eq!(source.contents().unwrap(), b"keep");

        source.remove().unwrap();
        assert!(!source.exists());
        assert_eq!(source.contents(), None);
    }

    #[test]
    fn test_write_requires_begin() {
        let mut source = MemorySource::new(Vec::new());
        match source.write(b"x") {
            Err(Error::UnsupportedOperation { .. }) => {}
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
