//! Deflate (method 8) through `flate2`.
//!
//! ZIP stores a raw deflate stream with no zlib or gzip framing. The effort
//! an entry was written with is also announced in general purpose bits 1
//! and 2; see [`CompressionMethod::option_flags`].

use std::io::{self, BufRead, Write};

use flate2::Compression;
use flate2::bufread::DeflateDecoder;
use flate2::write::DeflateEncoder;

use super::{CompressionMethod, Decoder, Encoder};

/// Highest level; larger requests are clamped.
pub const MAX_LEVEL: u32 = 9;

/// Inflates the raw stream in `input`.
pub fn decoder<R: BufRead + Send>(input: R) -> DeflateDecoder<R> {
    DeflateDecoder::new(input)
}

/// Deflates into `output` at `level`.
pub fn encoder<W: Write + Send>(output: W, level: u32) -> DeflateEncoder<W> {
    DeflateEncoder::new(output, Compression::new(level.min(MAX_LEVEL)))
}

impl<R: BufRead + Send> Decoder for DeflateDecoder<R> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }
}

impl<W: Write + Send> Encoder for DeflateEncoder<W> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Deflate
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        DeflateEncoder::finish(*self).map(drop)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn inflate(compressed: &[u8]) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        decoder(compressed).read_to_end(&mut out)?;
        Ok(out)
    }

    #[test]
    fn test_every_level_inflates_back() {
        let data = b"Hello, World! This is a test of Deflate compression. ".repeat(40);
        for level in [0, 1, 6, 9, 42] {
            let mut deflater = encoder(Vec::new(), level);
            deflater.write_all(&data).unwrap();
            let compressed = deflater.finish().unwrap();
            assert_eq!(inflate(&compressed).unwrap(), data, "level {}", level);
        }
    }

    #[test]
    fn test_level_zero_does_not_shrink() {
        let data = vec![b'a'; 4096];
        let mut stored = encoder(Vec::new(), 0);
        stored.write_all(&data).unwrap();
        let mut best = encoder(Vec::new(), 9);
        best.write_all(&data).unwrap();
        let (stored, best) = (stored.finish().unwrap(), best.finish().unwrap());
        assert!(stored.len() > data.len());
        assert!(best.len() < 100);
    }

    #[test]
    fn test_garbage_input() {
        assert!(inflate(&[0xFFu8; 32]).is_err());
    }
}
