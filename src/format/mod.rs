//! ZIP format constants, definitions, and low-level record codecs.
//!
//! This module contains the signatures, fixed record sizes and flag bits
//! defined by the ZIP application note, plus bit-exact parsers and writers for
//! each record type.

pub mod eocd;
pub mod extra;
pub mod header;
pub mod reader;

/// Local file header signature (`PK\x03\x04`).
pub const LOCAL_HEADER_SIGNATURE: u32 = 0x0403_4B50;

/// Central directory header signature (`PK\x01\x02`).
pub const CENTRAL_HEADER_SIGNATURE: u32 = 0x0201_4B50;

/// End of central directory signature (`PK\x05\x06`).
pub const EOCD_SIGNATURE: u32 = 0x0605_4B50;

/// ZIP64 end of central directory record signature (`PK\x06\x06`).
pub const ZIP64_EOCD_SIGNATURE: u32 = 0x0606_4B50;

/// ZIP64 end of central directory locator signature (`PK\x06\x07`).
pub const ZIP64_LOCATOR_SIGNATURE: u32 = 0x0706_4B50;

/// Optional data descriptor signature (`PK\x07\x08`).
pub const DATA_DESCRIPTOR_SIGNATURE: u32 = 0x0807_4B50;

/// Fixed part of a local file header.
pub const LOCAL_HEADER_LEN: usize = 30;

/// Fixed part of a central directory header.
pub const CENTRAL_HEADER_LEN: usize = 46;

/// Fixed part of the end of central directory record.
pub const EOCD_LEN: usize = 22;

/// Fixed part of the ZIP64 end of central directory record.
pub const ZIP64_EOCD_LEN: usize = 56;

/// ZIP64 end of central directory locator.
pub const ZIP64_LOCATOR_LEN: usize = 20;

/// Longest archive comment, name, or extra block the 16-bit length fields allow.
pub const MAX_FIELD_LEN: usize = u16::MAX as usize;

/// Value stored in 32-bit fields whose real value lives in a ZIP64 extra field.
pub const ZIP64_MARKER_U32: u32 = u32::MAX;

/// Value stored in 16-bit count fields whose real value lives in the ZIP64 record.
pub const ZIP64_MARKER_U16: u16 = u16::MAX;

/// "Version needed to extract" values written by this crate.
pub mod version {
    /// Default (deflate, directories, traditional encryption).
    pub const DEFAULT: u16 = 20;
    /// ZIP64 extensions.
    pub const ZIP64: u16 = 45;
    /// BZip2 compression.
    pub const BZIP2: u16 = 46;
    /// WinZip AES encryption.
    pub const AES: u16 = 51;
    /// Specification version advertised in "version made by".
    pub const MADE_BY: u16 = 63;
}

bitflags::bitflags! {
    /// General-purpose bit flags of local and central headers.
    ///
    /// Bit values match the wire format; unknown bits are retained when
    /// parsing so they survive a rewrite unchanged.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GeneralPurposeFlags: u16 {
        /// Bit 0: the entry is encrypted.
        const ENCRYPTED = 1 << 0;
        /// Bit 1: method-specific option.
        const COMPRESSION_OPTION_1 = 1 << 1;
        /// Bit 2: method-specific option.
        const COMPRESSION_OPTION_2 = 1 << 2;
        /// Bit 3: CRC and sizes follow the data in a data descriptor.
        const DATA_DESCRIPTOR = 1 << 3;
        /// Bit 6: PKWARE strong encryption.
        const STRONG_ENCRYPTION = 1 << 6;
        /// Bit 11: name and comment are UTF-8.
        const UTF8 = 1 << 11;
        /// Bit 13: central directory encrypted, local header masked.
        const MASKED_HEADERS = 1 << 13;
    }
}

/// Returns true if a 64-bit value must be moved into a ZIP64 extra field.
#[inline]
pub(crate) fn needs_zip64(value: u64) -> bool {
    value >= u64::from(ZIP64_MARKER_U32)
}
