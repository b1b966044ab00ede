//! WinZip AES encryption (AE-1 / AE-2).
//!
//! Layout of an encrypted entry's data:
//!
//! ```text
//! salt (8/12/16) | verifier (2) | ciphertext | authentication code (10)
//! ```
//!
//! Keys come from PBKDF2-HMAC-SHA1 with 1000 iterations over the password and
//! salt. The derived material splits into the AES key, the HMAC key and the
//! 2-byte password verifier. Data is encrypted with AES in CTR mode using a
//! little-endian counter that starts at 1, and authenticated with
//! HMAC-SHA1 over the ciphertext, truncated to 10 bytes.

use std::io::{self, Read, Write};

use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};
use aes::{Aes128, Aes192, Aes256};
use hmac::{Hmac, Mac};
use sha1::Sha1;
use zeroize::Zeroizing;

use crate::format::extra::AesStrength;
use crate::{Error, PasswordDetectionMethod, Result};

type HmacSha1 = Hmac<Sha1>;

/// PBKDF2 iteration count fixed by the format.
pub const KEY_DERIVATION_ITERATIONS: u32 = 1000;

/// Length of the password verification value.
pub const VERIFIER_LEN: usize = 2;

/// Length of the truncated HMAC-SHA1 authentication code.
pub const AUTH_CODE_LEN: usize = 10;

/// Bytes added to the data of an entry encrypted with `strength`.
pub fn overhead(strength: AesStrength) -> u64 {
    (strength.salt_len() + VERIFIER_LEN + AUTH_CODE_LEN) as u64
}

/// PBKDF2-HMAC-SHA1.
fn pbkdf2_sha1(
    password: &[u8],
    salt: &[u8],
    iterations: u32,
    dk_len: usize,
) -> Result<Zeroizing<Vec<u8>>> {
    let prf = <HmacSha1 as Mac>::new_from_slice(password)
        .map_err(|e| Error::CryptoError(format!("HMAC key setup failed: {}", e)))?;
    let h_len = 20;
    let blocks = dk_len.div_ceil(h_len);
    let mut dk = Zeroizing::new(Vec::with_capacity(blocks * h_len));

    for i in 1..=blocks as u32 {
        let mut mac = prf.clone();
        mac.update(salt);
        mac.update(&i.to_be_bytes());
        let mut u = [0u8; 20];
        u.copy_from_slice(&mac.finalize().into_bytes());
        let mut block = u;

        for _ in 1..iterations {
            let mut mac = prf.clone();
            mac.update(&u);
            u.copy_from_slice(&mac.finalize().into_bytes());
            for (b, x) in block.iter_mut().zip(u.iter()) {
                *b ^= x;
            }
        }
        dk.extend_from_slice(&block);
    }

    dk.truncate(dk_len);
    Ok(dk)
}

enum BlockCipher {
    Aes128(Aes128),
    Aes192(Aes192),
    Aes256(Aes256),
}

impl BlockCipher {
    fn new(strength: AesStrength, key: &[u8]) -> Result<Self> {
        let invalid = |_| Error::CryptoError("invalid AES key length".into());
        Ok(match strength {
            AesStrength::Aes128 => Self::Aes128(Aes128::new_from_slice(key).map_err(invalid)?),
            AesStrength::Aes192 => Self::Aes192(Aes192::new_from_slice(key).map_err(invalid)?),
            AesStrength::Aes256 => Self::Aes256(Aes256::new_from_slice(key).map_err(invalid)?),
        })
    }

    fn encrypt_block(&self, block: &mut [u8; 16]) {
        let block = GenericArray::from_mut_slice(block);
        match self {
            Self::Aes128(c) => c.encrypt_block(block),
            Self::Aes192(c) => c.encrypt_block(block),
            Self::Aes256(c) => c.encrypt_block(block),
        }
    }
}

/// AES in CTR mode with the WinZip little-endian counter.
struct AesCtr {
    cipher: BlockCipher,
    counter: [u8; 16],
    keystream: [u8; 16],
    pos: usize,
}

impl AesCtr {
    fn new(cipher: BlockCipher) -> Self {
        let mut counter = [0u8; 16];
        counter[0] = 1;
        Self {
            cipher,
            counter,
            keystream: [0u8; 16],
            pos: 16,
        }
    }

    fn process(&mut self, data: &mut [u8]) {
        for byte in data.iter_mut() {
            if self.pos == 16 {
                self.keystream = self.counter;
                self.cipher.encrypt_block(&mut self.keystream);
                self.pos = 0;
                for c in self.counter.iter_mut() {
                    *c = c.wrapping_add(1);
                    if *c != 0 {
                        break;
                    }
                }
            }
            *byte ^= self.keystream[self.pos];
            self.pos += 1;
        }
    }
}

struct DerivedKeys {
    ctr: AesCtr,
    mac: HmacSha1,
    verifier: [u8; VERIFIER_LEN],
}

fn derive_keys(password: &[u8], salt: &[u8], strength: AesStrength) -> Result<DerivedKeys> {
    let key_len = strength.key_len();
    let derived = pbkdf2_sha1(
        password,
        salt,
        KEY_DERIVATION_ITERATIONS,
        key_len * 2 + VERIFIER_LEN,
    )?;
    let cipher = BlockCipher::new(strength, &derived[..key_len])?;
    let mac = <HmacSha1 as Mac>::new_from_slice(&derived[key_len..key_len * 2])
        .map_err(|e| Error::CryptoError(format!("HMAC key setup failed: {}", e)))?;
    let verifier = [derived[key_len * 2], derived[key_len * 2 + 1]];
    Ok(DerivedKeys {
        ctr: AesCtr::new(cipher),
        mac,
        verifier,
    })
}

/// Decrypting reader.
///
/// The salt and verifier are consumed on construction; the authentication
/// code is checked once the ciphertext is exhausted.
pub struct AesReader<R> {
    inner: R,
    ctr: AesCtr,
    mac: Option<HmacSha1>,
    remaining: u64,
}

impl<R: Read> AesReader<R> {
    /// Opens an encrypted stream of `encrypted_len` total bytes (salt,
    /// verifier, ciphertext and authentication code).
    ///
    /// # Errors
    ///
    /// Returns [`Error::WrongPassword`] if the verifier does not match, and
    /// [`Error::CorruptArchive`] if the stream is too short.
    pub fn new(
        mut inner: R,
        password: &[u8],
        strength: AesStrength,
        encrypted_len: u64,
    ) -> Result<Self> {
        let remaining = encrypted_len
            .checked_sub(overhead(strength))
            .ok_or_else(|| Error::corrupt(0, "AES entry shorter than its encryption overhead"))?;

        let mut salt = vec![0u8; strength.salt_len()];
        inner.read_exact(&mut salt)?;
        let mut stored_verifier = [0u8; VERIFIER_LEN];
        inner.read_exact(&mut stored_verifier)?;

        let keys = derive_keys(password, &salt, strength)?;
        if keys.verifier != stored_verifier {
            return Err(Error::WrongPassword {
                entry_index: None,
                entry_name: None,
                detection_method: PasswordDetectionMethod::VerificationValue,
            });
        }

        Ok(Self {
            inner,
            ctr: keys.ctr,
            mac: Some(keys.mac),
            remaining,
        })
    }

    fn verify(&mut self) -> io::Result<()> {
        let Some(mac) = self.mac.take() else {
            return Ok(());
        };
        let mut stored = [0u8; AUTH_CODE_LEN];
        self.inner.read_exact(&mut stored)?;
        let computed = mac.finalize().into_bytes();
        if computed[..AUTH_CODE_LEN] != stored {
            return Err(Error::WrongPassword {
                entry_index: None,
                entry_name: None,
                detection_method: PasswordDetectionMethod::Authentication,
            }
            .into());
        }
        Ok(())
    }
}

impl<R: Read> Read for AesReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.remaining == 0 {
            self.verify()?;
            return Ok(0);
        }
        let want = self.remaining.min(buf.len() as u64) as usize;
        let n = self.inner.read(&mut buf[..want])?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "AES ciphertext ended early",
            ));
        }
        if let Some(mac) = self.mac.as_mut() {
            mac.update(&buf[..n]);
        }
        self.ctr.process(&mut buf[..n]);
        self.remaining -= n as u64;
        // Decoders may stop at their own end marker, so check as soon as the
        // last ciphertext byte is in.
        if self.remaining == 0 {
            self.verify()?;
        }
        Ok(n)
    }
}

/// Encrypting writer.
///
/// The salt and verifier are written on construction; [`AesWriter::finish`]
/// appends the authentication code.
pub struct AesWriter<W> {
    inner: W,
    ctr: AesCtr,
    mac: HmacSha1,
    buffer: Vec<u8>,
}

impl<W: Write> AesWriter<W> {
    /// Starts an encrypted stream with a fresh random salt.
    pub fn new(mut inner: W, password: &[u8], strength: AesStrength) -> Result<Self> {
        let mut salt = vec![0u8; strength.salt_len()];
        getrandom::getrandom(&mut salt)
            .map_err(|e| Error::CryptoError(format!("salt generation failed: {}", e)))?;
        let keys = derive_keys(password, &salt, strength)?;
        inner.write_all(&salt)?;
        inner.write_all(&keys.verifier)?;
        Ok(Self {
            inner,
            ctr: keys.ctr,
            mac: keys.mac,
            buffer: Vec::new(),
        })
    }

    /// Writes the authentication code and returns the inner writer.
    pub fn finish(mut self) -> io::Result<W> {
        let code = self.mac.finalize().into_bytes();
        self.inner.write_all(&code[..AUTH_CODE_LEN])?;
        Ok(self.inner)
    }
}

impl<W: Write> Write for AesWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.clear();
        self.buffer.extend_from_slice(buf);
        self.ctr.process(&mut self.buffer);
        self.mac.update(&self.buffer);
        self.inner.write_all(&self.buffer)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
