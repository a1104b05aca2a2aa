use crate::digest::EventHash;

/// Domain-separated BLAKE3 hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so identical bytes hashed for different purposes never
/// collide.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for entity events.
    pub const EVENT: Self = Self {
        domain: "prov-event-v1",
    };

    /// Create a hasher with a custom domain tag.
    pub const fn new(domain: &'static str) -> Self {
        Self { domain }
    }

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> EventHash {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        hasher.update(data);
        EventHash::from_bytes(*hasher.finalize().as_bytes())
    }

    /// Verify that data produces the expected digest.
    pub fn verify(&self, data: &[u8], expected: &EventHash) -> bool {
        self.hash(data) == *expected
    }

    /// The domain tag used by this hasher.
    pub fn domain(&self) -> &str {
        self.domain
    }
}

/// Builds an unambiguous byte encoding from a sequence of fields.
///
/// Every variable-length field is prefixed with its length as a big-endian
/// `u64`, so `("ab", "c")` and `("a", "bc")` encode differently.
#[derive(Default)]
pub struct FieldEncoder {
    buf: Vec<u8>,
}

impl FieldEncoder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bytes(mut self, field: &[u8]) -> Self {
        self.buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
        self.buf.extend_from_slice(field);
        self
    }

    pub fn str(self, field: &str) -> Self {
        self.bytes(field.as_bytes())
    }

    pub fn u64(mut self, field: u64) -> Self {
        self.buf.extend_from_slice(&field.to_be_bytes());
        self
    }

    pub fn i64(mut self, field: i64) -> Self {
        self.buf.extend_from_slice(&field.to_be_bytes());
        self
    }

    /// Optional digest: a presence byte, then the 32 bytes if present.
    pub fn digest(mut self, field: Option<&EventHash>) -> Self {
        match field {
            Some(hash) => {
                self.buf.push(1);
                self.buf.extend_from_slice(hash.as_bytes());
            }
            None => self.buf.push(0),
        }
        self
    }

    pub fn finish(self) -> Vec<u8> {
        self.buf
    }
}
