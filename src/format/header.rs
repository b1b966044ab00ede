//! Local and central directory header records.

use std::io::{Read, Write};

use super::extra::{self, ExtraField, ExtraLocation, Zip64ExtendedInfo, ids};
use super::reader::{
    read_bytes, read_u16_le, read_u32_le, write_u16_le, write_u32_le, write_u64_le,
};
use super::{
    CENTRAL_HEADER_LEN, CENTRAL_HEADER_SIGNATURE, DATA_DESCRIPTOR_SIGNATURE, GeneralPurposeFlags,
    LOCAL_HEADER_LEN, LOCAL_HEADER_SIGNATURE, MAX_FIELD_LEN, ZIP64_MARKER_U16, ZIP64_MARKER_U32,
    needs_zip64, version,
};
use crate::{Error, Result};

fn check_field_len(len: usize, what: &'static str) -> Result<u16> {
    if len > MAX_FIELD_LEN {
        return Err(Error::IntegerOverflow { what });
    }
    Ok(len as u16)
}

fn saturate(value: u64) -> u32 {
    if needs_zip64(value) {
        ZIP64_MARKER_U32
    } else {
        value as u32
    }
}

/// A central directory file header.
///
/// Sizes and the local header offset are stored resolved: if the 32-bit field
/// was saturated, the value from the ZIP64 extra field is used.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CentralHeader {
    /// Version made by (host system in the high byte).
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// General-purpose flags.
    pub flags: GeneralPurposeFlags,
    /// Raw compression method field.
    pub method: u16,
    /// DOS modification time.
    pub dos_time: u16,
    /// DOS modification date.
    pub dos_date: u16,
    /// CRC-32 of the uncompressed data.
    pub crc32: u32,
    /// Compressed size, including any encryption header and trailer.
    pub compressed_size: u64,
    /// Uncompressed size.
    pub uncompressed_size: u64,
    /// Disk on which the entry starts.
    pub disk_start: u32,
    /// Internal file attributes.
    pub internal_attributes: u16,
    /// External file attributes.
    pub external_attributes: u32,
    /// Offset of the local header from the start of the archive.
    pub local_header_offset: u64,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra fields, in stored order.
    pub extra: Vec<ExtraField>,
    /// Raw comment bytes.
    pub comment: Vec<u8>,
}

impl CentralHeader {
    /// Reads one header. `offset` is only used for error reporting.
    pub fn read<R: Read>(r: &mut R, offset: u64) -> Result<Self> {
        let truncated = |_| Error::corrupt(offset, "truncated central directory header");

        let signature = read_u32_le(r).map_err(truncated)?;
        if signature != CENTRAL_HEADER_SIGNATURE {
            return Err(Error::corrupt(
                offset,
                format!("bad central header signature {:#010x}", signature),
            ));
        }

        let mut fixed = [0u8; CENTRAL_HEADER_LEN - 4];
        r.read_exact(&mut fixed).map_err(truncated)?;
        let mut f = &fixed[..];
        let version_made_by = read_u16_le(&mut f)?;
        let version_needed = read_u16_le(&mut f)?;
        let flags = GeneralPurposeFlags::from_bits_retain(read_u16_le(&mut f)?);
        let method = read_u16_le(&mut f)?;
        let dos_time = read_u16_le(&mut f)?;
        let dos_date = read_u16_le(&mut f)?;
        let crc32 = read_u32_le(&mut f)?;
        let compressed32 = read_u32_le(&mut f)?;
        let uncompressed32 = read_u32_le(&mut f)?;
        let name_len = usize::from(read_u16_le(&mut f)?);
        let extra_len = usize::from(read_u16_le(&mut f)?);
        let comment_len = usize::from(read_u16_le(&mut f)?);
        let disk16 = read_u16_le(&mut f)?;
        let internal_attributes = read_u16_le(&mut f)?;
        let external_attributes = read_u32_le(&mut f)?;
        let offset32 = read_u32_le(&mut f)?;

        let name = read_bytes(r, name_len).map_err(truncated)?;
        let extra_block = read_bytes(r, extra_len).map_err(truncated)?;
        let comment = read_bytes(r, comment_len).map_err(truncated)?;

        let extra = extra::parse_extra_block(&extra_block, ExtraLocation::CENTRAL)
            .map_err(|reason| Error::corrupt(offset, reason))?;

        let mut header = Self {
            version_made_by,
            version_needed,
            flags,
            method,
            dos_time,
            dos_date,
            crc32,
            compressed_size: u64::from(compressed32),
            uncompressed_size: u64::from(uncompressed32),
            disk_start: u32::from(disk16),
            internal_attributes,
            external_attributes,
            local_header_offset: u64::from(offset32),
            name,
            extra,
            comment,
        };

        let need_uncompressed = uncompressed32 == ZIP64_MARKER_U32;
        let need_compressed = compressed32 == ZIP64_MARKER_U32;
        let need_offset = offset32 == ZIP64_MARKER_U32;
        let need_disk = disk16 == ZIP64_MARKER_U16;
        if need_uncompressed || need_compressed || need_offset || need_disk {
            if let Some(field) = extra::find(&header.extra, ids::ZIP64) {
                let info = Zip64ExtendedInfo::parse(
                    &field.data,
                    need_uncompressed,
                    need_compressed,
                    need_offset,
                    need_disk,
                )
                .ok_or_else(|| Error::corrupt(offset, "ZIP64 extra field too short"))?;
                if let Some(v) = info.uncompressed_size {
                    header.uncompressed_size = v;
                }
                if let Some(v) = info.compressed_size {
                    header.compressed_size = v;
                }
                if let Some(v) = info.local_header_offset {
                    header.local_header_offset = v;
                }
                if let Some(v) = info.disk_start {
                    header.disk_start = v;
                }
            }
        }

        Ok(header)
    }

    /// Returns true if a size or offset holds the ZIP64 marker but no ZIP64
    /// extra field supplies the real value.
    pub fn has_unresolved_zip64_marker(&self) -> bool {
        let marker = u64::from(ZIP64_MARKER_U32);
        extra::find(&self.extra, ids::ZIP64).is_none()
            && [
                self.uncompressed_size,
                self.compressed_size,
                self.local_header_offset,
            ]
            .contains(&marker)
    }

    /// Total encoded length of this header as read.
    pub fn encoded_len(&self) -> usize {
        CENTRAL_HEADER_LEN
            + self.name.len()
            + extra::encode_extra_block(&self.extra).len()
            + self.comment.len()
    }

    /// Encodes the header, emitting a ZIP64 extra field when values overflow.
    ///
    /// Any ZIP64 field already present in `extra` is replaced.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let zip64 = Zip64ExtendedInfo {
            uncompressed_size: needs_zip64(self.uncompressed_size).then_some(self.uncompressed_size),
            compressed_size: needs_zip64(self.compressed_size).then_some(self.compressed_size),
            local_header_offset: needs_zip64(self.local_header_offset)
                .then_some(self.local_header_offset),
            disk_start: None,
        };

        let mut fields = Vec::with_capacity(self.extra.len() + 1);
        if !zip64.is_empty() {
            fields.push(ExtraField::new(ids::ZIP64, zip64.encode(), ExtraLocation::CENTRAL));
        }
        fields.extend(self.extra.iter().filter(|f| f.id != ids::ZIP64).cloned());
        let extra_block = extra::encode_extra_block(&fields);

        let name_len = check_field_len(self.name.len(), "entry name length")?;
        let extra_len = check_field_len(extra_block.len(), "central extra field length")?;
        let comment_len = check_field_len(self.comment.len(), "entry comment length")?;
        let version_needed = if zip64.is_empty() {
            self.version_needed
        } else {
            self.version_needed.max(version::ZIP64)
        };

        let mut out = Vec::with_capacity(CENTRAL_HEADER_LEN + self.name.len() + extra_block.len());
        write_u32_le(&mut out, CENTRAL_HEADER_SIGNATURE)?;
        write_u16_le(&mut out, self.version_made_by)?;
        write_u16_le(&mut out, version_needed)?;
        write_u16_le(&mut out, self.flags.bits())?;
        write_u16_le(&mut out, self.method)?;
        write_u16_le(&mut out, self.dos_time)?;
        write_u16_le(&mut out, self.dos_date)?;
        write_u32_le(&mut out, self.crc32)?;
        write_u32_le(&mut out, saturate(self.compressed_size))?;
        write_u32_le(&mut out, saturate(self.uncompressed_size))?;
        write_u16_le(&mut out, name_len)?;
        write_u16_le(&mut out, extra_len)?;
        write_u16_le(&mut out, comment_len)?;
        write_u16_le(&mut out, 0)?;
        write_u16_le(&mut out, self.internal_attributes)?;
        write_u32_le(&mut out, self.external_attributes)?;
        write_u32_le(&mut out, saturate(self.local_header_offset))?;
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&extra_block);
        out.extend_from_slice(&self.comment);
        Ok(out)
    }
}

/// A local file header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalHeader {
    /// Version needed to extract.
    pub version_needed: u16,
    /// General-purpose flags.
    pub flags: GeneralPurposeFlags,
    /// Raw compression method field.
    pub method: u16,
    /// DOS modification time.
    pub dos_time: u16,
    /// DOS modification date.
    pub dos_date: u16,
    /// CRC-32 (zero when a data descriptor follows).
    pub crc32: u32,
    /// Compressed size (zero when a data descriptor follows).
    pub compressed_size: u64,
    /// Uncompressed size (zero when a data descriptor follows).
    pub uncompressed_size: u64,
    /// Raw name bytes.
    pub name: Vec<u8>,
    /// Extra fields, in stored order.
    pub extra: Vec<ExtraField>,
}

impl LocalHeader {
    /// Reads one header. `offset` is only used for error reporting.
    ///
    /// Returns the header and its total encoded length.
    pub fn read<R: Read>(r: &mut R, offset: u64) -> Result<(Self, u64)> {
        let truncated = |_| Error::corrupt(offset, "truncated local header");

        let mut fixed = [0u8; LOCAL_HEADER_LEN];
        r.read_exact(&mut fixed).map_err(truncated)?;
        let mut f = &fixed[..];
        let signature = read_u32_le(&mut f)?;
        if signature != LOCAL_HEADER_SIGNATURE {
            return Err(Error::corrupt(
                offset,
                format!("bad local header signature {:#010x}", signature),
            ));
        }
        let version_needed = read_u16_le(&mut f)?;
        let flags = GeneralPurposeFlags::from_bits_retain(read_u16_le(&mut f)?);
        let method = read_u16_le(&mut f)?;
        let dos_time = read_u16_le(&mut f)?;
        let dos_date = read_u16_le(&mut f)?;
        let crc32 = read_u32_le(&mut f)?;
        let compressed32 = read_u32_le(&mut f)?;
        let uncompressed32 = read_u32_le(&mut f)?;
        let name_len = usize::from(read_u16_le(&mut f)?);
        let extra_len = usize::from(read_u16_le(&mut f)?);

        let name = read_bytes(r, name_len).map_err(truncated)?;
        let extra_block = read_bytes(r, extra_len).map_err(truncated)?;
        let extra = extra::parse_extra_block(&extra_block, ExtraLocation::LOCAL)
            .map_err(|reason| Error::corrupt(offset, reason))?;

        let mut header = Self {
            version_needed,
            flags,
            method,
            dos_time,
            dos_date,
            crc32,
            compressed_size: u64::from(compressed32),
            uncompressed_size: u64::from(uncompressed32),
            name,
            extra,
        };

        if compressed32 == ZIP64_MARKER_U32 || uncompressed32 == ZIP64_MARKER_U32 {
            if let Some(info) = extra::find(&header.extra, ids::ZIP64)
                .and_then(|f| Zip64ExtendedInfo::parse(&f.data, true, true, false, false))
            {
                header.uncompressed_size = info.uncompressed_size.unwrap_or(0);
                header.compressed_size = info.compressed_size.unwrap_or(0);
            }
        }

        let len = (LOCAL_HEADER_LEN + name_len + extra_len) as u64;
        Ok((header, len))
    }

    /// Encodes the header.
    ///
    /// With `zip64` set, both size fields are saturated and a ZIP64 extra
    /// field holding both sizes is placed first. The encoded length depends
    /// only on the name, the extras and `zip64`, so a header can be rewritten
    /// in place once the real sizes are known.
    pub fn encode(&self, zip64: bool) -> Result<Vec<u8>> {
        let mut fields = Vec::with_capacity(self.extra.len() + 1);
        if zip64 {
            let info = Zip64ExtendedInfo {
                uncompressed_size: Some(self.uncompressed_size),
                compressed_size: Some(self.compressed_size),
                ..Default::default()
            };
            fields.push(ExtraField::new(ids::ZIP64, info.encode(), ExtraLocation::LOCAL));
        } else if needs_zip64(self.compressed_size) || needs_zip64(self.uncompressed_size) {
            return Err(Error::IntegerOverflow {
                what: "entry size without ZIP64 local header",
            });
        }
        fields.extend(self.extra.iter().filter(|f| f.id != ids::ZIP64).cloned());
        let extra_block = extra::encode_extra_block(&fields);

        let name_len = check_field_len(self.name.len(), "entry name length")?;
        let extra_len = check_field_len(extra_block.len(), "local extra field length")?;
        let version_needed = if zip64 {
            self.version_needed.max(version::ZIP64)
        } else {
            self.version_needed
        };

        let mut out = Vec::with_capacity(LOCAL_HEADER_LEN + self.name.len() + extra_block.len());
        write_u32_le(&mut out, LOCAL_HEADER_SIGNATURE)?;
        write_u16_le(&mut out, version_needed)?;
        write_u16_le(&mut out, self.flags.bits())?;
        write_u16_le(&mut out, self.method)?;
        write_u16_le(&mut out, self.dos_time)?;
        write_u16_le(&mut out, self.dos_date)?;
        write_u32_le(&mut out, self.crc32)?;
        if zip64 {
            write_u32_le(&mut out, ZIP64_MARKER_U32)?;
            write_u32_le(&mut out, ZIP64_MARKER_U32)?;
        } else {
            write_u32_le(&mut out, self.compressed_size as u32)?;
            write_u32_le(&mut out, self.uncompressed_size as u32)?;
        }
        write_u16_le(&mut out, name_len)?;
        write_u16_le(&mut out, extra_len)?;
        out.extend_from_slice(&self.name);
        out.extend_from_slice(&extra_block);
        Ok(out)
    }
}

/// Writes a data descriptor with signature.
pub fn write_data_descriptor<W: Write>(
    w: &mut W,
    crc32: u32,
    compressed_size: u64,
    uncompressed_size: u64,
    zip64: bool,
) -> std::io::Result<u64> {
    write_u32_le(w, DATA_DESCRIPTOR_SIGNATURE)?;
    write_u32_le(w, crc32)?;
    if zip64 {
        write_u64_le(w, compressed_size)?;
        write_u64_le(w, uncompressed_size)?;
        Ok(24)
    } else {
        write_u32_le(w, compressed_size as u32)?;
        write_u32_le(w, uncompressed_size as u32)?;
        Ok(16)
    }
}

/// Length of the data descriptor that follows an entry's data.
///
/// The signature is optional on the wire, so `first_word` (the four bytes
/// right after the data) decides whether it is present.
pub fn data_descriptor_len(first_word: u32, zip64: bool) -> u64 {
    let body = if zip64 { 20 } else { 12 };
    if first_word == DATA_DESCRIPTOR_SIGNATURE {
        body + 4
    } else {
        body
    }
}
