//! Traditional PKWARE encryption (ZipCrypto).
//!
//! A stream cipher keyed by three 32-bit words that are stirred with every
//! plaintext byte. Each entry starts with a 12-byte encrypted header: eleven
//! random bytes and one check byte used to reject wrong passwords early.
//!
//! The check byte is the high byte of the entry's CRC-32, or the high byte of
//! the DOS modification time when the entry uses a data descriptor (the CRC
//! is not known when the header is written).
//!
//! This cipher is weak and is supported for compatibility only.

use std::io::{self, Read, Write};

use crate::{Error, PasswordDetectionMethod, Result};

/// Length of the encryption header.
pub const HEADER_LEN: usize = 12;

const INITIAL_KEY0: u32 = 0x1234_5678;
const INITIAL_KEY1: u32 = 0x2345_6789;
const INITIAL_KEY2: u32 = 0x3456_7890;

const CRC32_TABLE: [u32; 256] = {
    let mut table = [0u32; 256];
    let mut i = 0usize;
    while i < 256 {
        let mut crc = i as u32;
        let mut j = 0;
        while j < 8 {
            if crc & 1 != 0 {
                crc = (crc >> 1) ^ 0xEDB8_8320;
            } else {
                crc >>= 1;
            }
            j += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
};

#[inline]
fn crc32_update(crc: u32, byte: u8) -> u32 {
    CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize] ^ (crc >> 8)
}

/// ZipCrypto key state.
#[derive(Clone)]
pub struct ZipCrypto {
    key0: u32,
    key1: u32,
    key2: u32,
}

impl std::fmt::Debug for ZipCrypto {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ZipCrypto").finish_non_exhaustive()
    }
}

impl ZipCrypto {
    /// Initializes the keys from a password.
    pub fn new(password: &[u8]) -> Self {
        let mut cipher = Self {
            key0: INITIAL_KEY0,
            key1: INITIAL_KEY1,
            key2: INITIAL_KEY2,
        };
        for &byte in password {
            cipher.update_keys(byte);
        }
        cipher
    }

    #[inline]
    fn update_keys(&mut self, byte: u8) {
        self.key0 = crc32_update(self.key0, byte);
        self.key1 = self
            .key1
            .wrapping_add(self.key0 & 0xFF)
            .wrapping_mul(134_775_813)
            .wrapping_add(1);
        self.key2 = crc32_update(self.key2, (self.key1 >> 24) as u8);
    }

    #[inline]
    fn stream_byte(&self) -> u8 {
        let temp = (self.key2 | 2) as u16;
        (temp.wrapping_mul(temp ^ 1) >> 8) as u8
    }

    /// Encrypts one byte.
    #[inline]
    pub fn encrypt_byte(&mut self, byte: u8) -> u8 {
        let cipher_byte = byte ^ self.stream_byte();
        self.update_keys(byte);
        cipher_byte
    }

    /// Decrypts one byte.
    #[inline]
    pub fn decrypt_byte(&mut self, byte: u8) -> u8 {
        let plain_byte = byte ^ self.stream_byte();
        self.update_keys(plain_byte);
        plain_byte
    }

    /// Encrypts a buffer in place.
    pub fn encrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.encrypt_byte(*byte);
        }
    }

    /// Decrypts a buffer in place.
    pub fn decrypt_buffer(&mut self, buffer: &mut [u8]) {
        for byte in buffer.iter_mut() {
            *byte = self.decrypt_byte(*byte);
        }
    }
}

/// Decrypting reader. The header is consumed and checked on construction.
pub struct ZipCryptoReader<R> {
    inner: R,
    cipher: ZipCrypto,
}

impl<R: Read> ZipCryptoReader<R> {
    /// Reads and verifies the 12-byte header.
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongPassword`] when the decrypted check byte differs
    /// from `check_byte`.
    pub fn new(mut inner: R, password: &[u8], check_byte: u8) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        inner.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                Error::corrupt(0, "encrypted entry shorter than its encryption header")
            } else {
                Error::Io(e)
            }
        })?;

        let mut cipher = ZipCrypto::new(password);
        cipher.decrypt_buffer(&mut header);
        if header[HEADER_LEN - 1] != check_byte {
            return Err(Error::WrongPassword {
                entry_index: None,
                entry_name: None,
                detection_method: PasswordDetectionMethod::HeaderCheckByte,
            });
        }
        Ok(Self { inner, cipher })
    }
}

impl<R: Read> Read for ZipCryptoReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.cipher.decrypt_buffer(&mut buf[..n]);
        Ok(n)
    }
}

/// Encrypting writer. The header is written on construction.
pub struct ZipCryptoWriter<W> {
    inner: W,
    cipher: ZipCrypto,
    buffer: Vec<u8>,
}

impl<W: Write> ZipCryptoWriter<W> {
    /// Writes the encrypted header with random padding and `check_byte`.
    pub fn new(mut inner: W, password: &[u8], check_byte: u8) -> Result<Self> {
        let mut header = [0u8; HEADER_LEN];
        getrandom::getrandom(&mut header[..HEADER_LEN - 1])
            .map_err(|e| Error::CryptoError(format!("random header generation failed: {}", e)))?;
        header[HEADER_LEN - 1] = check_byte;

        let mut cipher = ZipCrypto::new(password);
        cipher.encrypt_buffer(&mut header);
        inner.write_all(&header)?;
        Ok(Self {
            inner,
            cipher,
            buffer: Vec::new(),
        })
    }

    /// Returns the inner writer.
    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for ZipCryptoWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.clear();
        self.buffer.extend_from_slice(buf);
        self.cipher.encrypt_buffer(&mut self.buffer);
        self.inner.write_all(&self.buffer)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
