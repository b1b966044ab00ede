//! End of central directory records.
//!
//! Every archive ends with an EOCD record, optionally followed by a comment of
//! up to 65535 bytes. When counts, sizes or offsets overflow their 16/32-bit
//! fields, a ZIP64 EOCD record and a locator pointing at it precede the EOCD.

use super::reader::{
    read_u16_le, read_u32_le, read_u64_le, write_u16_le, write_u32_le, write_u64_le,
};
use super::{
    EOCD_LEN, EOCD_SIGNATURE, MAX_FIELD_LEN, ZIP64_EOCD_LEN, ZIP64_EOCD_SIGNATURE,
    ZIP64_LOCATOR_LEN, ZIP64_LOCATOR_SIGNATURE, ZIP64_MARKER_U16, ZIP64_MARKER_U32, needs_zip64,
    version,
};
use crate::{Error, Result};

/// Largest number of trailing bytes that can hold the EOCD and its comment.
pub const MAX_EOCD_SEARCH: usize = EOCD_LEN + MAX_FIELD_LEN;

/// The end of central directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eocd {
    /// Number of this disk.
    pub disk_number: u16,
    /// Disk where the central directory starts.
    pub cd_disk: u16,
    /// Central directory records on this disk.
    pub entries_on_disk: u16,
    /// Total central directory records.
    pub total_entries: u16,
    /// Size of the central directory in bytes.
    pub cd_size: u32,
    /// Offset of the central directory.
    pub cd_offset: u32,
    /// Archive comment.
    pub comment: Vec<u8>,
}

impl Eocd {
    /// Returns true if any field is saturated and the ZIP64 record holds the
    /// real value.
    pub fn is_zip64(&self) -> bool {
        self.total_entries == ZIP64_MARKER_U16
            || self.entries_on_disk == ZIP64_MARKER_U16
            || self.cd_size == ZIP64_MARKER_U32
            || self.cd_offset == ZIP64_MARKER_U32
    }

    /// Parses the record at the start of `data`. `offset` is for errors.
    ///
    /// The comment is clamped to the available bytes; some writers record a
    /// longer comment than they store.
    pub fn parse(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < EOCD_LEN {
            return Err(Error::corrupt(offset, "truncated end of central directory"));
        }
        let mut r = data;
        if read_u32_le(&mut r)? != EOCD_SIGNATURE {
            return Err(Error::corrupt(offset, "bad end of central directory signature"));
        }
        let disk_number = read_u16_le(&mut r)?;
        let cd_disk = read_u16_le(&mut r)?;
        let entries_on_disk = read_u16_le(&mut r)?;
        let total_entries = read_u16_le(&mut r)?;
        let cd_size = read_u32_le(&mut r)?;
        let cd_offset = read_u32_le(&mut r)?;
        let comment_len = usize::from(read_u16_le(&mut r)?);
        if comment_len > r.len() {
            log::warn!(
                "archive comment declares {} bytes but only {} remain",
                comment_len,
                r.len()
            );
        }
        let comment = r[..comment_len.min(r.len())].to_vec();

        Ok(Self {
            disk_number,
            cd_disk,
            entries_on_disk,
            total_entries,
            cd_size,
            cd_offset,
            comment,
        })
    }

    /// Encodes the record.
    pub fn encode(&self) -> Result<Vec<u8>> {
        if self.comment.len() > MAX_FIELD_LEN {
            return Err(Error::IntegerOverflow {
                what: "archive comment length",
            });
        }
        let mut out = Vec::with_capacity(EOCD_LEN + self.comment.len());
        write_u32_le(&mut out, EOCD_SIGNATURE)?;
        write_u16_le(&mut out, self.disk_number)?;
        write_u16_le(&mut out, self.cd_disk)?;
        write_u16_le(&mut out, self.entries_on_disk)?;
        write_u16_le(&mut out, self.total_entries)?;
        write_u32_le(&mut out, self.cd_size)?;
        write_u32_le(&mut out, self.cd_offset)?;
        write_u16_le(&mut out, self.comment.len() as u16)?;
        out.extend_from_slice(&self.comment);
        Ok(out)
    }
}

/// Finds the EOCD signature in the trailing bytes of an archive.
///
/// Scans backward. A candidate whose declared comment ends exactly at the end
/// of `tail` is preferred; otherwise the last candidate found is returned.
pub fn find_eocd(tail: &[u8]) -> Option<usize> {
    if tail.len() < EOCD_LEN {
        return None;
    }
    let signature = EOCD_SIGNATURE.to_le_bytes();
    let mut fallback = None;
    for pos in (0..=tail.len() - EOCD_LEN).rev() {
        if tail[pos..pos + 4] != signature {
            continue;
        }
        let comment_len = usize::from(u16::from_le_bytes([tail[pos + 20], tail[pos + 21]]));
        if pos + EOCD_LEN + comment_len == tail.len() {
            return Some(pos);
        }
        if fallback.is_none() {
            fallback = Some(pos);
        }
    }
    fallback
}

/// The ZIP64 end of central directory locator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Locator {
    /// Disk containing the ZIP64 EOCD record.
    pub eocd_disk: u32,
    /// Offset of the ZIP64 EOCD record.
    pub eocd_offset: u64,
    /// Total number of disks.
    pub total_disks: u32,
}

impl Zip64Locator {
    /// Parses a locator, returning `None` if the signature does not match.
    pub fn parse(data: &[u8]) -> Option<Self> {
        if data.len() < ZIP64_LOCATOR_LEN {
            return None;
        }
        let mut r = data;
        if read_u32_le(&mut r).ok()? != ZIP64_LOCATOR_SIGNATURE {
            return None;
        }
        Some(Self {
            eocd_disk: read_u32_le(&mut r).ok()?,
            eocd_offset: read_u64_le(&mut r).ok()?,
            total_disks: read_u32_le(&mut r).ok()?,
        })
    }

    /// Encodes the locator.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(ZIP64_LOCATOR_LEN);
        out.extend_from_slice(&ZIP64_LOCATOR_SIGNATURE.to_le_bytes());
        out.extend_from_slice(&self.eocd_disk.to_le_bytes());
        out.extend_from_slice(&self.eocd_offset.to_le_bytes());
        out.extend_from_slice(&self.total_disks.to_le_bytes());
        out
    }
}

/// The ZIP64 end of central directory record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Zip64Eocd {
    /// Version made by.
    pub version_made_by: u16,
    /// Version needed to extract.
    pub version_needed: u16,
    /// Number of this disk.
    pub disk_number: u32,
    /// Disk where the central directory starts.
    pub cd_disk: u32,
    /// Central directory records on this disk.
    pub entries_on_disk: u64,
    /// Total central directory records.
    pub total_entries: u64,
    /// Size of the central directory.
    pub cd_size: u64,
    /// Offset of the central directory.
    pub cd_offset: u64,
}

impl Zip64Eocd {
    /// Parses the fixed part of the record. `offset` is for errors.
    pub fn parse(data: &[u8], offset: u64) -> Result<Self> {
        if data.len() < ZIP64_EOCD_LEN {
            return Err(Error::corrupt(offset, "truncated ZIP64 end of central directory"));
        }
        let mut r = data;
        if read_u32_le(&mut r)? != ZIP64_EOCD_SIGNATURE {
            return Err(Error::corrupt(
                offset,
                "bad ZIP64 end of central directory signature",
            ));
        }
        let _record_size = read_u64_le(&mut r)?;
        Ok(Self {
            version_made_by: read_u16_le(&mut r)?,
            version_needed: read_u16_le(&mut r)?,
            disk_number: read_u32_le(&mut r)?,
            cd_disk: read_u32_le(&mut r)?,
            entries_on_disk: read_u64_le(&mut r)?,
            total_entries: read_u64_le(&mut r)?,
            cd_size: read_u64_le(&mut r)?,
            cd_offset: read_u64_le(&mut r)?,
        })
    }

    /// Encodes the record without an extensible data sector.
    pub fn encode(&self) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(ZIP64_EOCD_LEN);
        write_u32_le(&mut out, ZIP64_EOCD_SIGNATURE)?;
        write_u64_le(&mut out, (ZIP64_EOCD_LEN - 12) as u64)?;
        write_u16_le(&mut out, self.version_made_by)?;
        write_u16_le(&mut out, self.version_needed)?;
        write_u32_le(&mut out, self.disk_number)?;
        write_u32_le(&mut out, self.cd_disk)?;
        write_u64_le(&mut out, self.entries_on_disk)?;
        write_u64_le(&mut out, self.total_entries)?;
        write_u64_le(&mut out, self.cd_size)?;
        write_u64_le(&mut out, self.cd_offset)?;
        Ok(out)
    }
}

/// Encodes the archive trailer for a central directory of `entries` records
/// spanning `cd_size` bytes at `cd_offset`.
///
/// Emits a ZIP64 record and locator first when any value overflows.
pub fn encode_trailer(
    entries: u64,
    cd_offset: u64,
    cd_size: u64,
    comment: &[u8],
    version_made_by: u16,
) -> Result<Vec<u8>> {
    let zip64 =
        entries >= u64::from(ZIP64_MARKER_U16) || needs_zip64(cd_offset) || needs_zip64(cd_size);
    let mut out = Vec::new();
    if zip64 {
        let record_offset = cd_offset
            .checked_add(cd_size)
            .ok_or(Error::IntegerOverflow {
                what: "ZIP64 end of central directory offset",
            })?;
        let record = Zip64Eocd {
            version_made_by,
            version_needed: version::ZIP64,
            disk_number: 0,
            cd_disk: 0,
            entries_on_disk: entries,
            total_entries: entries,
            cd_size,
            cd_offset,
        };
        out.extend_from_slice(&record.encode()?);
        let locator = Zip64Locator {
            eocd_disk: 0,
            eocd_offset: record_offset,
            total_disks: 1,
        };
        out.extend_from_slice(&locator.encode());
    }

    let count16 = if entries >= u64::from(ZIP64_MARKER_U16) {
        ZIP64_MARKER_U16
    } else {
        entries as u16
    };
    let clamp32 = |v: u64| if needs_zip64(v) { ZIP64_MARKER_U32 } else { v as u32 };
    let eocd = Eocd {
        disk_number: 0,
        cd_disk: 0,
        entries_on_disk: count16,
        total_entries: count16,
        cd_size: clamp32(cd_size),
        cd_offset: clamp32(cd_offset),
        comment: comment.to_vec(),
    };
    out.extend_from_slice(&eocd.encode()?);
    Ok(out)
}
