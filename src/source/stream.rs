//! Forward-only source over any `Read`.

use std::fmt;
use std::io::Read;

use super::{Capabilities, ReadableSource, SeekableSource, Source, SourceStat, WritableSource};
use crate::timestamp::Timestamp;
use crate::Result;

/// A read-only source over a forward-only stream.
///
/// The stream is drained into memory on the first `open`; later opens replay
/// the buffered bytes. The source advertises only the read tier, so an entry
/// reader over it cannot seek.
pub struct StreamSource {
    reader: Option<Box<dyn Read + Send>>,
    buffer: Vec<u8>,
    pos: usize,
    mtime: Option<Timestamp>,
}

impl StreamSource {
    /// Wraps a stream.
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            reader: Some(Box::new(reader)),
            buffer: Vec::new(),
            pos: 0,
            mtime: None,
        }
    }

    /// Sets the modification time reported by `stat`.
    pub fn with_mtime(mut self, mtime: Timestamp) -> Self {
        self.mtime = Some(mtime);
        self
    }

    fn fill(&mut self) -> Result<()> {
        if let Some(mut reader) = self.reader.take() {
            reader.read_to_end(&mut self.buffer)?;
            log::trace!("buffered {} bytes from stream", self.buffer.len());
        }
        Ok(())
    }
}

impl fmt::Debug for StreamSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamSource")
            .field("buffered", &self.reader.is_none())
            .field("len", &self.buffer.len())
            .field("pos", &self.pos)
            .finish()
    }
}

impl ReadableSource for StreamSource {
    fn open(&mut self) -> Result<()> {
        self.fill()?;
        self.pos = 0;
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize> {
        self.fill()?;
        let n = (self.buffer.len() - self.pos).min(buf.len());
        buf[..n].copy_from_slice(&self.buffer[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }

    fn close(&mut self) -> Result<()> {
        Ok(())
    }

    fn stat(&self) -> Result<SourceStat> {
        Ok(SourceStat {
            size: self.reader.is_none().then_some(self.buffer.len() as u64),
            mtime: self.mtime,
        })
    }
}

impl Source for StreamSource {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ
    }

    fn as_seekable(&mut self) -> Option<&mut dyn SeekableSource> {
        None
    }

    fn as_writable(&mut self) -> Option<&mut dyn WritableSource> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_reopen_replays() {
        let mut source = StreamSource::new(Cursor::new(b"replay me".to_vec()));
        assert_eq!(source.stat().unwrap().size, None);

        source.open().unwrap();
        let mut buf = [0u8; 6];
        assert_eq!(source.read(&mut buf).unwrap(), 6);
        assert_eq!(&buf, b"replay");
        assert_eq!(source.stat().unwrap().size, Some(9));

        source.open().unwrap();
        let mut all = [0u8; 16];
        assert_eq!(source.read(&mut all).unwrap(), 9);
        assert_eq!(&all[..9], b"replay me");
        assert_eq!(source.read(&mut all).unwrap(), 0);
    }

    #[test]
    fn test_read_only_tier() {
        let mut source = StreamSource::new(std::io::empty());
        assert_eq!(source.capabilities(), Capabilities::READ);
        assert!(source.as_seekable().is_none());
        assert!(source.as_writable().is_none());
    }
}
