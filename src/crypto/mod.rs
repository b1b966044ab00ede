//! Entry encryption adapters.
//!
//! Two schemes are supported:
//!
//! - Traditional PKWARE encryption ([`zipcrypto`]), always available.
//! - WinZip AES-128/192/256 ([`winzip_aes`]), behind the `aes` feature.
//!
//! Decryption is a `Read` adapter placed between the raw entry data and the
//! decompressor; encryption is a `Write` adapter placed between the
//! compressor and the output. Password verification happens when the adapter
//! is built, so a wrong password fails before any data is decoded.

mod password;
#[cfg(feature = "aes")]
pub mod winzip_aes;
pub mod zipcrypto;

use std::fmt;
use std::io::{self, Read, Write};

use crate::format::extra::AesStrength;
use crate::{Error, Result};

pub use password::Password;

/// Encryption applied to an entry's data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum EncryptionMethod {
    /// Not encrypted.
    #[default]
    None,
    /// Traditional PKWARE encryption (ZipCrypto).
    TraditionalPkware,
    /// WinZip AES with a 128-bit key.
    Aes128,
    /// WinZip AES with a 192-bit key.
    Aes192,
    /// WinZip AES with a 256-bit key.
    Aes256,
    /// Anything else, such as PKWARE strong encryption.
    Unknown(u16),
}

impl EncryptionMethod {
    /// Numeric identifier used in error reports.
    pub fn as_u16(self) -> u16 {
        match self {
            Self::None => 0,
            Self::TraditionalPkware => 1,
            Self::Aes128 => 0x0101,
            Self::Aes192 => 0x0102,
            Self::Aes256 => 0x0103,
            Self::Unknown(id) => id,
        }
    }

    /// Inverse of [`EncryptionMethod::as_u16`].
    pub fn from_u16(id: u16) -> Self {
        match id {
            0 => Self::None,
            1 => Self::TraditionalPkware,
            0x0101 => Self::Aes128,
            0x0102 => Self::Aes192,
            0x0103 => Self::Aes256,
            other => Self::Unknown(other),
        }
    }

    /// Returns true for any method other than `None`.
    pub fn is_encrypted(self) -> bool {
        self != Self::None
    }

    /// Returns true if this build can encrypt and decrypt with the method.
    pub fn is_supported(self) -> bool {
        match self {
            Self::None | Self::TraditionalPkware => true,
            Self::Aes128 | Self::Aes192 | Self::Aes256 => cfg!(feature = "aes"),
            Self::Unknown(_) => false,
        }
    }

    /// The WinZip AES key strength, for AES methods.
    pub fn aes_strength(self) -> Option<AesStrength> {
        match self {
            Self::Aes128 => Some(AesStrength::Aes128),
            Self::Aes192 => Some(AesStrength::Aes192),
            Self::Aes256 => Some(AesStrength::Aes256),
            _ => None,
        }
    }

    pub(crate) fn from_aes_strength(strength: AesStrength) -> Self {
        match strength {
            AesStrength::Aes128 => Self::Aes128,
            AesStrength::Aes192 => Self::Aes192,
            AesStrength::Aes256 => Self::Aes256,
        }
    }

    fn unsupported(self) -> Error {
        Error::UnsupportedEncryption {
            method_id: self.as_u16(),
        }
    }
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "None"),
            Self::TraditionalPkware => write!(f, "ZipCrypto"),
            Self::Aes128 => write!(f, "AES-128"),
            Self::Aes192 => write!(f, "AES-192"),
            Self::Aes256 => write!(f, "AES-256"),
            Self::Unknown(id) => write!(f, "Unknown({:#x})", id),
        }
    }
}

/// What a decrypter needs to know about the entry it opens.
#[derive(Debug, Clone, Copy)]
pub struct DecryptParams {
    /// Total length of the stored (encrypted) data.
    pub encrypted_len: u64,
    /// Expected PKWARE header check byte.
    pub check_byte: u8,
}

/// Builds a decrypting reader over raw entry data.
///
/// # Errors
///
/// - [`Error::WrongPassword`] if the password verifier or check byte does
///   not match.
/// - [`Error::UnsupportedEncryption`] for unknown methods or when AES support
///   is not compiled in.
pub fn build_decrypter<'a, R: Read + Send + 'a>(
    method: EncryptionMethod,
    password: &Password,
    params: DecryptParams,
    input: R,
) -> Result<Box<dyn Read + Send + 'a>> {
    match method {
        EncryptionMethod::None => Ok(Box::new(input)),
        EncryptionMethod::TraditionalPkware => Ok(Box::new(zipcrypto::ZipCryptoReader::new(
            input,
            password.as_bytes(),
            params.check_byte,
        )?)),
        #[cfg(feature = "aes")]
        EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256 => {
            let strength = method.aes_strength().ok_or(method.unsupported())?;
            Ok(Box::new(winzip_aes::AesReader::new(
                input,
                password.as_bytes(),
                strength,
                params.encrypted_len,
            )?))
        }
        other => Err(other.unsupported()),
    }
}

/// Number of bytes encryption adds to an entry's data.
pub fn overhead(method: EncryptionMethod) -> u64 {
    match method {
        EncryptionMethod::TraditionalPkware => zipcrypto::HEADER_LEN as u64,
        #[cfg(feature = "aes")]
        EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256 => method
            .aes_strength()
            .map_or(0, winzip_aes::overhead),
        _ => 0,
    }
}

/// An encrypting writer selected at runtime.
///
/// Unlike the codec encoders this is a concrete type, so that
/// [`EncryptingWriter::finish`] can hand the inner writer back.
pub enum EncryptingWriter<W: Write> {
    /// Passes data through.
    Plain(W),
    /// Traditional PKWARE encryption.
    ZipCrypto(zipcrypto::ZipCryptoWriter<W>),
    /// WinZip AES.
    #[cfg(feature = "aes")]
    Aes(winzip_aes::AesWriter<W>),
}

impl<W: Write> EncryptingWriter<W> {
    /// Starts an encrypted stream, writing any header immediately.
    ///
    /// `check_byte` is only used by traditional PKWARE encryption.
    pub fn new(
        method: EncryptionMethod,
        password: Option<&Password>,
        check_byte: u8,
        inner: W,
    ) -> Result<Self> {
        if method == EncryptionMethod::None {
            return Ok(Self::Plain(inner));
        }
        let Some(password) = password else {
            return Err(Error::CryptoError(format!(
                "{} encryption requested without a password",
                method
            )));
        };
        match method {
            EncryptionMethod::TraditionalPkware => Ok(Self::ZipCrypto(
                zipcrypto::ZipCryptoWriter::new(inner, password.as_bytes(), check_byte)?,
            )),
            #[cfg(feature = "aes")]
            EncryptionMethod::Aes128 | EncryptionMethod::Aes192 | EncryptionMethod::Aes256 => {
                let strength = method.aes_strength().ok_or(method.unsupported())?;
                Ok(Self::Aes(winzip_aes::AesWriter::new(
                    inner,
                    password.as_bytes(),
                    strength,
                )?))
            }
            other => Err(other.unsupported()),
        }
    }

    /// Finishes the stream (writing any trailer) and returns the inner writer.
    pub fn finish(self) -> io::Result<W> {
        match self {
            Self::Plain(w) => Ok(w),
            Self::ZipCrypto(w) => Ok(w.into_inner()),
            #[cfg(feature = "aes")]
            Self::Aes(w) => w.finish(),
        }
    }
}

impl<W: Write> Write for EncryptingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Plain(w) => w.write(buf),
            Self::ZipCrypto(w) => w.write(buf),
            #[cfg(feature = "aes")]
            Self::Aes(w) => w.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Plain(w) => w.flush(),
            Self::ZipCrypto(w) => w.flush(),
            #[cfg(feature = "aes")]
            Self::Aes(w) => w.flush(),
        }
    }
}
