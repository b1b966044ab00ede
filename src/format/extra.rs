//! Extra field parsing and encoding.
//!
//! Both local and central headers carry an "extra" block: a sequence of
//! `(id: u16, len: u16, data)` records. IDs may repeat and order matters, so
//! fields are kept as raw ordered tuples and interpreted only on demand for
//! the IDs this crate understands.

use super::reader::{u16_at, u32_at};

/// Well-known extra field IDs.
pub mod ids {
    /// ZIP64 extended information.
    pub const ZIP64: u16 = 0x0001;
    /// NTFS timestamps.
    pub const NTFS: u16 = 0x000A;
    /// Extended timestamp (Info-ZIP "UT").
    pub const EXTENDED_TIMESTAMP: u16 = 0x5455;
    /// Info-ZIP Unix UID/GID ("ux").
    pub const INFOZIP_UNIX: u16 = 0x7875;
    /// Info-ZIP Unicode path.
    pub const UNICODE_PATH: u16 = 0x7075;
    /// Info-ZIP Unicode comment.
    pub const UNICODE_COMMENT: u16 = 0x6375;
    /// WinZip AES encryption.
    pub const WINZIP_AES: u16 = 0x9901;
}

/// Returns true for fields that the engine owns and regenerates on write.
///
/// These are never exposed through the public extra field accessors.
pub fn is_internal(id: u16) -> bool {
    matches!(id, ids::ZIP64 | ids::WINZIP_AES)
}

bitflags::bitflags! {
    /// Which header(s) an extra field belongs to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ExtraLocation: u16 {
        /// The local file header.
        const LOCAL = 0x0100;
        /// The central directory header.
        const CENTRAL = 0x0200;
        /// Both headers.
        const BOTH = Self::LOCAL.bits() | Self::CENTRAL.bits();
    }
}

/// A single raw extra field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraField {
    /// The 16-bit field ID.
    pub id: u16,
    /// The field payload, without the 4-byte id/length prefix.
    pub data: Vec<u8>,
    /// The header(s) the field belongs to.
    pub location: ExtraLocation,
}

impl ExtraField {
    /// Creates a new extra field.
    pub fn new(id: u16, data: Vec<u8>, location: ExtraLocation) -> Self {
        Self { id, data, location }
    }
}

/// Parses an extra block into fields tagged with `location`.
///
/// A trailing fragment shorter than a field header is ignored; some writers
/// pad the block. A field whose length runs past the block is an error.
pub fn parse_extra_block(block: &[u8], location: ExtraLocation) -> Result<Vec<ExtraField>, String> {
    let mut fields = Vec::new();
    let mut offset = 0usize;
    while offset + 4 <= block.len() {
        let id = u16_at(block, offset).unwrap_or(0);
        let len = usize::from(u16_at(block, offset + 2).unwrap_or(0));
        let start = offset + 4;
        let end = start + len;
        if end > block.len() {
            return Err(format!(
                "extra field {:#06x} declares {} bytes but only {} remain",
                id,
                len,
                block.len() - start
            ));
        }
        fields.push(ExtraField::new(id, block[start..end].to_vec(), location));
        offset = end;
    }
    if offset < block.len() {
        log::debug!(
            "ignoring {} trailing bytes in extra block",
            block.len() - offset
        );
    }
    Ok(fields)
}

/// Encodes fields into an extra block.
pub fn encode_extra_block<'a, I>(fields: I) -> Vec<u8>
where
    I: IntoIterator<Item = &'a ExtraField>,
{
    let mut out = Vec::new();
    for field in fields {
        out.extend_from_slice(&field.id.to_le_bytes());
        out.extend_from_slice(&(field.data.len() as u16).to_le_bytes());
        out.extend_from_slice(&field.data);
    }
    out
}

/// Returns the first field with the given ID.
pub fn find(fields: &[ExtraField], id: u16) -> Option<&ExtraField> {
    fields.iter().find(|f| f.id == id)
}

/// ZIP64 extended information.
///
/// Only the values whose 32-bit header field was saturated are present, in the
/// fixed order: uncompressed size, compressed size, local header offset, disk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Zip64ExtendedInfo {
    /// Uncompressed size override.
    pub uncompressed_size: Option<u64>,
    /// Compressed size override.
    pub compressed_size: Option<u64>,
    /// Local header offset override.
    pub local_header_offset: Option<u64>,
    /// Starting disk number override.
    pub disk_start: Option<u32>,
}

impl Zip64ExtendedInfo {
    /// Interprets a ZIP64 payload given which header fields were saturated.
    ///
    /// Returns `None` if the payload is too short for the requested values.
    pub fn parse(
        data: &[u8],
        need_uncompressed: bool,
        need_compressed: bool,
        need_offset: bool,
        need_disk: bool,
    ) -> Option<Self> {
        let mut info = Self::default();
        let mut pos = 0usize;
        let next_u64 = |pos: &mut usize| -> Option<u64> {
            let bytes = data.get(*pos..*pos + 8)?;
            *pos += 8;
            let mut buf = [0u8; 8];
            buf.copy_from_slice(bytes);
            Some(u64::from_le_bytes(buf))
        };
        if need_uncompressed {
            info.uncompressed_size = Some(next_u64(&mut pos)?);
        }
        if need_compressed {
            info.compressed_size = Some(next_u64(&mut pos)?);
        }
        if need_offset {
            info.local_header_offset = Some(next_u64(&mut pos)?);
        }
        if need_disk {
            info.disk_start = Some(u32_at(data, pos)?);
        }
        Some(info)
    }

    /// Returns true if no value is present.
    pub fn is_empty(&self) -> bool {
        self.uncompressed_size.is_none()
            && self.compressed_size.is_none()
            && self.local_header_offset.is_none()
            && self.disk_start.is_none()
    }

    /// Encodes the present values in their fixed order.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(28);
        for value in [
            self.uncompressed_size,
            self.compressed_size,
            self.local_header_offset,
        ]
        .into_iter()
        .flatten()
        {
            out.extend_from_slice(&value.to_le_bytes());
        }
        if let Some(disk) = self.disk_start {
            out.extend_from_slice(&disk.to_le_bytes());
        }
        out
    }
}

/// WinZip AES key strength.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AesStrength {
    /// AES-128: 16-byte key, 8-byte salt.
    Aes128 = 1,
    /// AES-192: 24-byte key, 12-byte salt.
    Aes192 = 2,
    /// AES-256: 32-byte key, 16-byte salt.
    Aes256 = 3,
}

impl AesStrength {
    /// Parses the strength byte.
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Aes128),
            2 => Some(Self::Aes192),
            3 => Some(Self::Aes256),
            _ => None,
        }
    }

    /// Salt length in bytes.
    pub fn salt_len(self) -> usize {
        match self {
            Self::Aes128 => 8,
            Self::Aes192 => 12,
            Self::Aes256 => 16,
        }
    }

    /// Key length in bytes.
    pub fn key_len(self) -> usize {
        match self {
            Self::Aes128 => 16,
            Self::Aes192 => 24,
            Self::Aes256 => 32,
        }
    }
}

/// Payload of the WinZip AES extra field (`0x9901`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AesExtraField {
    /// Vendor version: 1 (AE-1, CRC stored) or 2 (AE-2, CRC zero).
    pub vendor_version: u16,
    /// Key strength.
    pub strength: AesStrength,
    /// The compression method applied before encryption.
    pub compression_method: u16,
}

impl AesExtraField {
    /// Length of the payload.
    pub const LEN: usize = 7;

    /// Parses the payload.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < Self::LEN || &data[2..4] != b"AE" {
            return None;
        }
        Some(Self {
            vendor_version: u16_at(data, 0)?,
            strength: AesStrength::from_u8(data[4])?,
            compression_method: u16_at(data, 5)?,
        })
    }

    /// Encodes the payload.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(Self::LEN);
        out.extend_from_slice(&self.vendor_version.to_le_bytes());
        out.extend_from_slice(b"AE");
        out.push(self.strength as u8);
        out.extend_from_slice(&self.compression_method.to_le_bytes());
        out
    }
}

/// Extracts the modification time from an extended timestamp payload.
pub fn parse_extended_mtime(data: &[u8]) -> Option<i64> {
    let flags = *data.first()?;
    if flags & 0x01 == 0 {
        return None;
    }
    let secs = u32_at(data, 1)? as i32;
    Some(i64::from(secs))
}

/// Payload of the Info-ZIP Unicode path and comment fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnicodeExtra {
    /// CRC-32 of the header's raw name or comment this field replaces.
    pub header_crc: u32,
    /// The UTF-8 text.
    pub text: Vec<u8>,
}

impl UnicodeExtra {
    /// Parses a version-1 payload.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < 5 || data[0] != 1 {
            return None;
        }
        Some(Self {
            header_crc: u32_at(data, 1)?,
            text: data[5..].to_vec(),
        })
    }
}
