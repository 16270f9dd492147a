//! Lock-holder identifiers.
//!
//! Identifiers are printable ASCII strings stored as the lock key's value.
//! A freshly generated id is 18 random bytes, base64-encoded to 24 ASCII
//! characters (matching the upstream Python implementation's
//! `b64encode(urandom(18))`, which yields >128 bits of entropy).

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use rand::RngCore;

/// An opaque ASCII identifier uniquely identifying a lock holder.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockId(String);

impl LockId {
    /// Generate a random identifier with >=128 bits of entropy.
    #[must_use]
    pub fn generate() -> Self {
        let mut bytes = [0u8; 18];
        rand::thread_rng().fill_bytes(&mut bytes);
        Self(STANDARD.encode(bytes))
    }

    /// Build an identifier from caller-supplied bytes.
    ///
    /// Bytes that decode as valid ASCII are kept verbatim (matching
    /// upstream's `bytes.decode('ascii')` fast path); anything else is
    /// base64-encoded so the value is always safe to use as a Lua script
    /// argument.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.is_ascii() {
            // `is_ascii` guarantees this succeeds.
            Self(String::from_utf8(bytes.to_vec()).unwrap_or_else(|_| STANDARD.encode(bytes)))
        } else {
            Self(STANDARD.encode(bytes))
        }
    }

    /// Build an identifier from caller-supplied text, used verbatim.
    #[must_use]
    pub fn from_text(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for LockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl redis::ToRedisArgs for LockId {
    fn write_redis_args<W>(&self, out: &mut W)
    where
        W: ?Sized + redis::RedisWrite,
    {
        self.0.write_redis_args(out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_24_ascii_chars_and_unique() {
        let a = LockId::generate();
        let b = LockId::generate();
        assert_eq!(a.as_str().len(), 24);
        assert!(a.as_str().is_ascii());
        assert_ne!(a, b, "two random ids colliding is astronomically unlikely");
    }

    #[test]
    fn ascii_bytes_kept_verbatim() {
        let id = LockId::from_bytes(b"holder-1");
        assert_eq!(id.as_str(), "holder-1");
    }

    #[test]
    fn non_ascii_bytes_are_base64_encoded() {
        let id = LockId::from_bytes(&[0xff, 0x00, 0x80]);
        assert!(id.as_str().is_ascii());
        assert_eq!(id.as_str(), STANDARD.encode([0xff, 0x00, 0x80]));
    }

    #[test]
    fn text_used_verbatim() {
        let id = LockId::from_text("explicit-id");
        assert_eq!(id.as_str(), "explicit-id");
    }
}
