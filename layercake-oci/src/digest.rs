//! SHA-256 digest value types.
//!
//! Both types accept either a bare 64-character lowercase hex hash or the
//! `sha256:<hash>` digest form, and always render as the digest form. They
//! share validation but are kept apart so a blob digest cannot be passed where
//! a manifest-referenced digest is expected without an explicit conversion.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{OciError, Result};

/// Algorithm prefix of every digest string.
pub const SHA256_PREFIX: &str = "sha256:";

/// Length of a SHA-256 hash in lowercase hex.
pub const SHA256_HEX_LEN: usize = 64;

/// Returns `true` when `hash` is exactly 64 lowercase hex characters.
fn is_valid_hash(hash: &str) -> bool {
    hash.len() == SHA256_HEX_LEN
        && hash
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Lowercase hex encoding of raw digest bytes.
pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

macro_rules! sha256_digest_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub struct $name {
            hash: String,
        }

        impl $name {
            /// Create from a bare hash (`[a-f0-9]{64}`).
            pub fn from_hash(hash: &str) -> Result<Self> {
                if !is_valid_hash(hash) {
                    return Err(OciError::InvalidHash(hash.to_string()));
                }
                Ok(Self {
                    hash: hash.to_string(),
                })
            }

            /// Create from a prefixed digest (`sha256:[a-f0-9]{64}`).
            pub fn from_digest(digest: &str) -> Result<Self> {
                match digest.strip_prefix(SHA256_PREFIX) {
                    Some(hash) if is_valid_hash(hash) => Ok(Self {
                        hash: hash.to_string(),
                    }),
                    _ => Err(OciError::InvalidDigest(digest.to_string())),
                }
            }

            /// The bare hash, without the algorithm prefix.
            pub fn hash(&self) -> &str {
                &self.hash
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}{}", SHA256_PREFIX, self.hash)
            }
        }

        impl FromStr for $name {
            type Err = OciError;

            fn from_str(s: &str) -> Result<Self> {
                Self::from_digest(s)
            }
        }

        impl Serialize for $name {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                Self::from_digest(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

sha256_digest_type! {
    /// A SHA-256 digest as referenced from a registry manifest.
    Digest
}

sha256_digest_type! {
    /// A SHA-256 content descriptor digest identifying a blob.
    DescriptorDigest
}

impl DescriptorDigest {
    /// Create from the raw 32 bytes of a finalized SHA-256 hasher.
    pub(crate) fn from_sha256_bytes(bytes: &[u8]) -> Self {
        Self {
            hash: hex_encode(bytes),
        }
    }
}

impl From<Digest> for DescriptorDigest {
    fn from(digest: Digest) -> Self {
        Self { hash: digest.hash }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const GOOD_HASH: &str = "8c662931926fa990b41da3c9f42663a537ccd498130030f9149173a0493832ad";

    #[test]
    fn from_hash_renders_digest_form() {
        let d = Digest::from_hash(GOOD_HASH).unwrap();
        assert_eq!(d.hash(), GOOD_HASH);
        assert_eq!(d.to_string(), format!("sha256:{}", GOOD_HASH));
    }

    #[test]
    fn from_digest_equals_from_hash() {
        let a = DescriptorDigest::from_digest(&format!("sha256:{}", GOOD_HASH)).unwrap();
        let b = DescriptorDigest::from_hash(GOOD_HASH).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.hash(), GOOD_HASH);
    }

    #[test]
    fn invalid_hashes_rejected() {
        let upper = GOOD_HASH.to_uppercase();
        let short = &GOOD_HASH[..63];
        let long = format!("{}0", GOOD_HASH);
        let non_hex = GOOD_HASH.replacen('8', "g", 1);
        let prefixed = format!("sha256:{}", GOOD_HASH);

        for bad in [upper.as_str(), short, long.as_str(), non_hex.as_str(), prefixed.as_str(), ""] {
            let err = Digest::from_hash(bad).unwrap_err();
            assert!(matches!(err, OciError::InvalidHash(_)), "accepted {bad:?}");
            assert!(DescriptorDigest::from_hash(bad).is_err());
        }
    }

    #[test]
    fn invalid_digests_rejected() {
        let bare = GOOD_HASH.to_string();
        let wrong_algo = format!("sha512:{}", GOOD_HASH);
        let upper = format!("sha256:{}", GOOD_HASH.to_uppercase());
        let short = format!("sha256:{}", &GOOD_HASH[1..]);

        for bad in [bare, wrong_algo, upper, short, "sha256:".to_string()] {
            let err = DescriptorDigest::from_digest(&bad).unwrap_err();
            assert!(matches!(err, OciError::InvalidDigest(_)), "accepted {bad:?}");
        }
    }

    #[test]
    fn parse_via_from_str() {
        let d: Digest = format!("sha256:{}", GOOD_HASH).parse().unwrap();
        assert_eq!(d.hash(), GOOD_HASH);
    }

    #[test]
    fn serde_uses_digest_form() {
        let d = DescriptorDigest::from_hash(GOOD_HASH).unwrap();
        let json = serde_json::to_string(&d).unwrap();
        assert_eq!(json, format!("\"sha256:{}\"", GOOD_HASH));

        let back: DescriptorDigest = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);

        assert!(serde_json::from_str::<DescriptorDigest>("\"sha256:nope\"").is_err());
    }

    #[test]
    fn manifest_digest_converts_explicitly() {
        let d = Digest::from_hash(GOOD_HASH).unwrap();
        let descriptor: DescriptorDigest = d.into();
        assert_eq!(descriptor.hash(), GOOD_HASH);
    }
}
