//! Connection target fingerprints.
//!
//! A [`Fingerprint`] is the only key the connection registry uses: two
//! handles connecting to byte-identical targets share one physical
//! connection. The digest is MD5, which is plenty for a lookup key over a
//! small, trusted set of connection strings. It is not a security boundary.

use std::fmt;

/// Deterministic 16-byte digest of a connection target string.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Fingerprint([u8; 16]);

impl Fingerprint {
    /// Fingerprint a connection target.
    pub fn of(target: &str) -> Self {
        Self(md5::compute(target.as_bytes()).0)
    }

    /// Raw digest bytes.
    pub const fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl From<[u8; 16]> for Fingerprint {
    fn from(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl fmt::Debug for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fingerprint({})", self)
    }
}
