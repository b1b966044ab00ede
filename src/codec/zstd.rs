//! Zstandard (method 93) through the `zstd` crate.

use std::io::{self, BufRead, BufReader, Read, Write};

use zstd::stream::read::Decoder as ZstdReader;
use zstd::stream::write::Encoder as ZstdWriter;

use super::{CompressionMethod, Decoder, Encoder};

/// Levels the format accepts.
pub const LEVELS: std::ops::RangeInclusive<u32> = 1..=22;

/// Decompresses the frame in `input`.
pub fn decoder<R: Read + Send>(input: R) -> io::Result<ZstdReader<'static, BufReader<R>>> {
    ZstdReader::new(input)
}

/// Compresses into `output`; `level` is clamped to [`LEVELS`].
pub fn encoder<W: Write + Send>(output: W, level: u32) -> io::Result<ZstdWriter<'static, W>> {
    let level = level.clamp(*LEVELS.start(), *LEVELS.end());
    ZstdWriter::new(output, level as i32)
}

impl<R: BufRead + Send> Decoder for ZstdReader<'static, R> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }
}

impl<W: Write + Send> Encoder for ZstdWriter<'static, W> {
    fn method(&self) -> CompressionMethod {
        CompressionMethod::Zstd
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        ZstdWriter::finish(*self).map(drop)
    }
}
