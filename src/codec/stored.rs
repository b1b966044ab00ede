//! Stored entries (method 0): the payload is written as is.

use std::io::{self, Read, Take, Write};

use super::{CompressionMethod, Decoder, Encoder};

/// Reads at most the declared size of a stored entry.
///
/// A short input ends the stream early; the entry reader reports the
/// missing bytes against the declared size.
pub fn decoder<R: Read + Send>(input: R, size: u64) -> Take<R> {
    input.take(size)
}

impl<R: Read + Send> Decoder for Take<R> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }
}

/// Hands payload bytes straight to the entry's output.
#[derive(Debug)]
pub struct StoredWriter<W> {
    inner: W,
}

impl<W: Write + Send> StoredWriter<W> {
    /// Wraps the entry's output.
    pub fn new(inner: W) -> Self {
        Self { inner }
    }
}

impl<W: Write + Send> Write for StoredWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write + Send> Encoder for StoredWriter<W> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Stored
    }

    fn finish(mut self: Box<Self>) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_declared_size_bounds_the_payload() {
        let mut out = Vec::new();
        decoder(&b"Hello, World!"[..], 5)
            .read_to_end(&mut out)
            .unwrap();
        assert_eq!(out, b"Hello");
    }

    #[test]
    fn test_short_input_ends_early() {
        let mut reader = decoder(&b"abc"[..], 10);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();
        assert_eq!(out, b"abc");
        assert_eq!(reader.limit(), 7);
    }

    #[test]
    fn test_writer_passes_through() {
        let mut out = Vec::new();
        let mut writer: Box<dyn Encoder + '_> = Box::new(StoredWriter::new(&mut out));
        assert_eq!(writer.method(), CompressionMethod::Stored);
        writer.write_all(b"pass through").unwrap();
        writer.finish().unwrap();
        assert_eq!(out, b"pass through");
    }
}
