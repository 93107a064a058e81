//! Content hash identifiers.
//!
//! A [`ContentHash`] is a fixed 40-hex-character lowercase string (a 160-bit
//! hash). The tagged wrappers ([`FileId`], [`ManifestId`], [`RevisionId`],
//! [`KeyId`]) exist so the type system distinguishes what a hash identifies,
//! the way the teacher's codebase distinguishes node kinds by tagged variant
//! rather than by convention.

use std::fmt;

use sha1::{Digest, Sha1};

const HEX_LEN: usize = 40;

/// 160-bit content hash, stored as 40 lowercase hex characters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ContentHash([u8; 20]);

impl ContentHash {
    pub const NULL: ContentHash = ContentHash([0u8; 20]);

    pub fn of(bytes: &[u8]) -> ContentHash {
        let digest = Sha1::digest(bytes);
        let mut out = [0u8; 20];
        out.copy_from_slice(&digest);
        ContentHash(out)
    }

    pub fn is_null(&self) -> bool {
        *self == Self::NULL
    }

    pub fn to_hex(self) -> String {
        let mut s = String::with_capacity(HEX_LEN);
        for byte in self.0 {
            use std::fmt::Write;
            let _ = write!(s, "{byte:02x}");
        }
        s
    }

    pub fn from_hex(s: &str) -> Option<ContentHash> {
        if s.len() != HEX_LEN || !s.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let mut out = [0u8; 20];
        for (i, chunk) in s.as_bytes().chunks(2).enumerate() {
            let hi = (chunk[0] as char).to_digit(16)?;
            let lo = (chunk[1] as char).to_digit(16)?;
            out[i] = ((hi << 4) | lo) as u8;
        }
        Some(ContentHash(out))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

macro_rules! tagged_hash {
    ($name:ident, $doc:literal) => {
        #[doc = $doc]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name(pub ContentHash);

        impl $name {
            pub const NULL: $name = $name(ContentHash::NULL);

            pub fn of(bytes: &[u8]) -> $name {
                $name(ContentHash::of(bytes))
            }

            pub fn is_null(&self) -> bool {
                self.0.is_null()
            }

            pub fn from_hex(s: &str) -> Option<$name> {
                ContentHash::from_hex(s).map($name)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<ContentHash> for $name {
            fn from(h: ContentHash) -> Self {
                $name(h)
            }
        }
    };
}

tagged_hash!(FileId, "Identifies the content of a single file.");
tagged_hash!(ManifestId, "Identifies the canonical text of a roster.");
tagged_hash!(RevisionId, "Identifies the canonical text of a revision.");
tagged_hash!(KeyId, "Identifies a signing key.");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_all_zero() {
        assert_eq!(ContentHash::NULL.to_hex(), "0".repeat(40));
        assert!(ContentHash::NULL.is_null());
    }

    #[test]
    fn hex_round_trip() {
        let h = ContentHash::of(b"hello\n");
        let hex = h.to_hex();
        assert_eq!(hex.len(), 40);
        assert_eq!(ContentHash::from_hex(&hex), Some(h));
    }

    #[test]
    fn rejects_malformed_hex() {
        assert_eq!(ContentHash::from_hex("not-hex"), None);
        assert_eq!(ContentHash::from_hex("abc"), None);
    }

    #[test]
    fn tagged_variants_do_not_mix_at_the_type_level() {
        let fid = FileId::of(b"a");
        let mid = ManifestId::of(b"a");
        // same underlying hash, distinct types -- this is the point.
        assert_eq!(fid.0, mid.0);
    }
}
