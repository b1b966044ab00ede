//! Low-level little-endian reading and writing helpers for ZIP records.

use std::io::{self, Read, Write};

/// Reads a single byte.
pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads an unsigned 16-bit little-endian integer.
pub fn read_u16_le<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads an unsigned 32-bit little-endian integer.
pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads an unsigned 64-bit little-endian integer.
pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads exact number of bytes into a new vector.
pub fn read_bytes<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes an unsigned 16-bit little-endian integer.
pub fn write_u16_le<W: Write>(w: &mut W, value: u16) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes an unsigned 32-bit little-endian integer.
pub fn write_u32_le<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes an unsigned 64-bit little-endian integer.
pub fn write_u64_le<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Reads a little-endian `u16` at `offset` of a slice, if in bounds.
pub(crate) fn u16_at(data: &[u8], offset: usize) -> Option<u16> {
    let bytes = data.get(offset..offset.checked_add(2)?)?;
    Some(u16::from_le_bytes([bytes[0], bytes[1]]))
}

/// Reads a little-endian `u32` at `offset` of a slice, if in bounds.
pub(crate) fn u32_at(data: &[u8], offset: usize) -> Option<u32> {
    let bytes = data.get(offset..offset.checked_add(4)?)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_read_integers() {
        let data = [
            0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12, 0x08, 0x07, 0x06, 0x05, 0x04, 0x03, 0x02,
            0x01,
        ];
        let mut r = Cursor::new(&data);
        assert_eq!(read_u8(&mut r).unwrap(), 0x01);
        assert_eq!(read_u16_le(&mut r).unwrap(), 0x1234);
        assert_eq!(read_u32_le(&mut r).unwrap(), 0x12345678);
        assert_eq!(read_u64_le(&mut r).unwrap(), 0x0102030405060708);
        assert!(read_u8(&mut r).is_err());
    }

    #[test]
    fn test_write_integers() {
        let mut out = Vec::new();
        write_u16_le(&mut out, 0xBEEF).unwrap();
        write_u32_le(&mut out, 0xDEADBEEF).unwrap();
        write_u64_le(&mut out, 1).unwrap();
        assert_eq!(&out[..2], &[0xEF, 0xBE]);
        assert_eq!(&out[2..6], &[0xEF, 0xBE, 0xAD, 0xDE]);
        assert_eq!(out.len(), 14);
    }

    #[test]
    fn test_slice_accessors() {
        let data = [0x50, 0x4B, 0x05, 0x06];
        assert_eq!(u16_at(&data, 0), Some(0x4B50));
        assert_eq!(u32_at(&data, 0), Some(0x0605_4B50));
        assert_eq!(u32_at(&data, 1), None);
        assert_eq!(u16_at(&data, usize::MAX), None);
    }

    #[test]
    fn test_read_bytes_truncated() {
        let mut r = Cursor::new(vec![1u8, 2, 3]);
        assert!(read_bytes(&mut r, 4).is_err());
    }
}
