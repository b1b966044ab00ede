//! Compression codec adapters.
//!
//! This module maps ZIP compression method IDs onto streaming transforms from
//! established crates. Decoders wrap a `Read` of compressed bytes; encoders
//! wrap a `Write` that receives compressed bytes.
//!
//! | Method | ID | Feature | Crate |
//! |--------|----|---------|-------|
//! | Stored | 0 | always | |
//! | Deflate | 8 | `deflate` | `flate2` |
//! | BZip2 | 12 | `bzip2` | `bzip2` |
//! | Zstandard | 93 | `zstd` | `zstd` |
//!
//! Anything else yields [`Error::UnsupportedMethod`].

#[cfg(feature = "bzip2")]
pub mod bzip2;

#[cfg(feature = "deflate")]
pub mod deflate;

#[cfg(feature = "zstd")]
pub mod zstd;

pub mod stored;

use std::fmt;
use std::io::{self, Read, Write};

use crate::format::GeneralPurposeFlags;
use crate::{Error, Result};

pub use stored::StoredWriter;

/// A decoder that reads compressed data and produces uncompressed output.
pub trait Decoder: Read + Send {
    /// Returns the method this decoder handles.
    fn method(&self) -> CompressionMethod;
}

/// An encoder that takes uncompressed data and produces compressed output.
pub trait Encoder: Write + Send {
    /// Returns the method this encoder produces.
    fn method(&self) -> CompressionMethod;

    /// Finishes encoding and flushes any remaining data.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

/// Compression method stored in the local and central headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    /// No compression.
    Stored,
    /// Deflate.
    Deflate,
    /// Deflate64 (enhanced deflate).
    Deflate64,
    /// BZip2.
    Bzip2,
    /// LZMA.
    Lzma,
    /// Zstandard.
    Zstd,
    /// XZ.
    Xz,
    /// Any other method ID.
    Unknown(u16),
}

impl CompressionMethod {
    /// Decodes a method field.
    pub fn from_u16(id: u16) -> Self {
        match id {
            0 => Self::Stored,
            8 => Self::Deflate,
            9 => Self::Deflate64,
            12 => Self::Bzip2,
            14 => Self::Lzma,
            93 => Self::Zstd,
            95 => Self::Xz,
            other => Self::Unknown(other),
        }
    }

    /// Returns the wire value.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::Stored => 0,
            Self::Deflate => 8,
            Self::Deflate64 => 9,
            Self::Bzip2 => 12,
            Self::Lzma => 14,
            Self::Zstd => 93,
            Self::Xz => 95,
            Self::Unknown(id) => id,
        }
    }

    /// Returns true if this build can decode the method.
    pub fn is_decode_supported(self) -> bool {
        match self {
            Self::Stored => true,
            Self::Deflate => cfg!(feature = "deflate"),
            Self::Bzip2 => cfg!(feature = "bzip2"),
            Self::Zstd => cfg!(feature = "zstd"),
            _ => false,
        }
    }

    /// Returns true if this build can encode the method.
    pub fn is_encode_supported(self) -> bool {
        self.is_decode_supported()
    }

    /// The "version needed to extract" this method requires.
    pub(crate) fn version_needed(self) -> u16 {
        match self {
            Self::Bzip2 => crate::format::version::BZIP2,
            Self::Lzma | Self::Zstd | Self::Xz => 63,
            _ => crate::format::version::DEFAULT,
        }
    }

    /// Default level used when none is given.
    pub fn default_level(self) -> u32 {
        match self {
            Self::Deflate => 6,
            Self::Bzip2 => 9,
            Self::Zstd => 3,
            _ => 0,
        }
    }

    /// General purpose bits 1 and 2 for an entry written at `level`.
    ///
    /// Only deflate defines them: normal, maximum, fast or super fast effort.
    pub fn option_flags(self, level: Option<u32>) -> GeneralPurposeFlags {
        if self != Self::Deflate {
            return GeneralPurposeFlags::empty();
        }
        match level.unwrap_or_else(|| self.default_level()) {
            0..=1 => {
                GeneralPurposeFlags::COMPRESSION_OPTION_1 | GeneralPurposeFlags::COMPRESSION_OPTION_2
            }
            2 => GeneralPurposeFlags::COMPRESSION_OPTION_2,
            3..=7 => GeneralPurposeFlags::empty(),
            _ => GeneralPurposeFlags::COMPRESSION_OPTION_1,
        }
    }
}

impl Default for CompressionMethod {
    fn default() -> Self {
        if cfg!(feature = "deflate") {
            Self::Deflate
        } else {
            Self::Stored
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stored => write!(f, "Stored"),
            Self::Deflate => write!(f, "Deflate"),
            Self::Deflate64 => write!(f, "Deflate64"),
            Self::Bzip2 => write!(f, "BZip2"),
            Self::Lzma => write!(f, "LZMA"),
            Self::Zstd => write!(f, "Zstandard"),
            Self::Xz => write!(f, "XZ"),
            Self::Unknown(id) => write!(f, "Unknown({})", id),
        }
    }
}

/// Builds a decoder for `method` over compressed `input`.
///
/// `uncompressed_size` bounds stored data; compressed formats stop at their
/// own end-of-stream marker.
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] if the method is not compiled in.
pub fn build_decoder<'a, R: Read + Send + 'a>(
    method: CompressionMethod,
    input: R,
    uncompressed_size: u64,
) -> Result<Box<dyn Decoder + 'a>> {
    match method {
        CompressionMethod::Stored => Ok(Box::new(stored::decoder(input, uncompressed_size))),

        #[cfg(feature = "deflate")]
        CompressionMethod::Deflate => Ok(Box::new(deflate::decoder(io::BufReader::new(input)))),

        #[cfg(feature = "bzip2")]
        CompressionMethod::Bzip2 => Ok(Box::new(self::bzip2::decoder(input))),

        #[cfg(feature = "zstd")]
        CompressionMethod::Zstd => Ok(Box::new(self::zstd::decoder(input)?)),

        other => Err(Error::UnsupportedMethod {
            method_id: other.as_u16(),
        }),
    }
}

/// Builds an encoder for `method` writing compressed bytes to `output`.
///
/// `level` of `None` picks the method's default; out-of-range levels are
/// clamped.
///
/// # Errors
///
/// Returns [`Error::UnsupportedMethod`] if the method is not compiled in.
pub fn build_encoder<'a, W: Write + Send + 'a>(
    method: CompressionMethod,
    level: Option<u32>,
    output: W,
) -> Result<Box<dyn Encoder + 'a>> {
    #[allow(unused_variables)]
    let level = level.unwrap_or_else(|| method.default_level());
    match method {
        CompressionMethod::Stored => Ok(Box::new(StoredWriter::new(output))),

        #[cfg(feature = "deflate")]
        CompressionMethod::Deflate => Ok(Box::new(deflate::encoder(output, level))),

        #[cfg(feature = "bzip2")]
        CompressionMethod::Bzip2 => Ok(Box::new(self::bzip2::encoder(output, level))),

        #[cfg(feature = "zstd")]
        CompressionMethod::Zstd => Ok(Box::new(self::zstd::encoder(output, level)?)),

        other => Err(Error::UnsupportedMethod {
            method_id: other.as_u16(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(method: CompressionMethod, data: &[u8]) -> Vec<u8> {
        let mut compressed = Vec::new();
        {
            let mut encoder = build_encoder(method, None, &mut compressed).unwrap();
            encoder.write_all(data).unwrap();
            encoder.finish().unwrap();
        }
        let mut decoder =
            build_decoder(method, Cursor::new(compressed), data.len() as u64).unwrap();
        let mut out = Vec::new();
        decoder.read_to_end(&mut out).unwrap();
        out
    }

    #[test]
    fn test_method_ids() {
        for id in [0u16, 8, 9, 12, 14, 93, 95, 99, 1234] {
            assert_eq!(CompressionMethod::from_u16(id).as_u16(), id);
        }
        assert_eq!(CompressionMethod::from_u16(99), CompressionMethod::Unknown(99));
    }

    #[test]
    fn test_stored_roundtrip() {
        let data = b"stored payload";
        assert_eq!(roundtrip(CompressionMethod::Stored, data), data);
    }

    #[cfg(feature = "deflate")]
    #[test]
    fn test_deflate_roundtrip() {
        let data = b"deflate deflate deflate deflate deflate".repeat(20);
        assert_eq!(roundtrip(CompressionMethod::Deflate, &data), data);
    }

    #[cfg(feature = "bzip2")]
    #[test]
    fn test_bzip2_roundtrip() {
        let data = b"bzip2 payload ".repeat(50);
        assert_eq!(roundtrip(CompressionMethod::Bzip2, &data), data);
    }

    #[cfg(feature = "zstd")]
    #[test]
    fn test_zstd_roundtrip() {
        let data = b"zstd payload ".repeat(50);
        assert_eq!(roundtrip(CompressionMethod::Zstd, &data), data);
    }

    #[test]
    fn test_deflate_option_flags() {
        let fast = GeneralPurposeFlags::COMPRESSION_OPTION_2;
        let max = GeneralPurposeFlags::COMPRESSION_OPTION_1;
        let deflate = CompressionMethod::Deflate;
        assert_eq!(deflate.option_flags(None), GeneralPurposeFlags::empty());
        assert_eq!(deflate.option_flags(Some(9)), max);
        assert_eq!(deflate.option_flags(Some(2)), fast);
        assert_eq!(deflate.option_flags(Some(1)), max | fast);
        assert_eq!(
            CompressionMethod::Bzip2.option_flags(Some(1)),
            GeneralPurposeFlags::empty()
        );
    }

    #[test]
    fn test_unsupported_method() {
        let err = build_decoder(CompressionMethod::Lzma, Cursor::new(Vec::new()), 0)
            .err()
            .unwrap();
        match err {
            Error::UnsupportedMethod { method_id } => assert_eq!(method_id, 14),
            e => panic!("unexpected error: {:?}", e),
        }
        assert!(build_encoder(CompressionMethod::Unknown(77), None, Vec::new()).is_err());
    }
}
