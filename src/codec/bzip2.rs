//! BZip2 (method 12) through the `bzip2` crate.
//!
//! The level is the block size in units of 100 kB.

use std::io::{self, Read, Write};

use bzip2::Compression;
use bzip2::read::BzDecoder;
use bzip2::write::BzEncoder;

use super::{CompressionMethod, Decoder, Encoder};

/// Block size range, in 100 kB units.
pub const LEVELS: std::ops::RangeInclusive<u32> = 1..=9;

/// Decompresses the stream in `input`.
pub fn decoder<R: Read + Send>(input: R) -> BzDecoder<R> {
    BzDecoder::new(input)
}

/// Compresses into `output`; `level` is clamped to [`LEVELS`].
pub fn encoder<W: Write + Send>(output: W, level: u32) -> BzEncoder<W> {
    let level = level.clamp(*LEVELS.start(), *LEVELS.end());
    BzEncoder::new(output, Compression::new(level))
}

impl<R: Read + Send> Decoder for BzDecoder<R> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Bzip2
    }
}

impl<W: Write + Send> Encoder for BzEncoder<W> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Bzip2
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        BzEncoder::finish(*self).map(drop)
    }
}
