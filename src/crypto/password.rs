//! Password handling for entry encryption.

use zeroize::Zeroizing;

/// A password for entry encryption and decryption.
///
/// The backing string is zeroed when the password is dropped. Both
/// traditional PKWARE encryption and WinZip AES key derivation consume the
/// raw UTF-8 bytes.
#[derive(Clone)]
pub struct Password {
    inner: Zeroizing<String>,
}

impl Password {
    /// Creates a new password from a string.
    pub fn new<S: Into<String>>(password: S) -> Self {
        Self {
            inner: Zeroizing::new(password.into()),
        }
    }

    /// Returns the password bytes used for key derivation.
    pub fn as_bytes(&self) -> &[u8] {
        self.inner.as_bytes()
    }

    /// Returns the password as a string slice.
    pub fn as_str(&self) -> &str {
        &self.inner
    }

    /// Returns true if the password is empty.
    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    /// Returns the length of the password in characters.
    pub fn len(&self) -> usize {
        self.inner.chars().count()
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Password")
            .field("len", &self.inner.len())
            .finish()
    }
}

impl PartialEq for Password {
    fn eq(&self, other: &Self) -> bool {
        self.as_bytes() == other.as_bytes()
    }
}

impl Eq for Password {}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_bytes() {
        let password = Password::new("tëst");
        assert_eq!(password.as_bytes(), "tëst".as_bytes());
        assert_eq!(password.len(), 4);
        assert!(!password.is_empty());
    }

    #[test]
    fn test_password_debug_redacted() {
        let password = Password::new("secret123");
        let debug = format!("{:?}", password);
        assert!(!debug.contains("secret123"));
        assert!(debug.contains("len"));
    }

    #[test]
    fn test_password_from() {
        let a: Password = "abc".into();
        let b: Password = String::from("abc").into();
        assert_eq!(a, b);
        assert!(Password::new("").is_empty());
    }
}
