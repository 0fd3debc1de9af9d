//! SHA-1 content hashes - how we decide two files hold the same bytes.

use std::fmt;

use anyhow::{Context, Result, ensure};
use data_encoding::HEXLOWER;
use sha1::{Digest, Sha1};

const DIGEST_LENGTH: usize = 20;

/// The SHA-1 digest of a file's contents, hex-encoded anywhere
/// a human (or the YAML metadata) might see it.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct ContentHash {
    digest: [u8; DIGEST_LENGTH],
}

impl ContentHash {
    /// Calculates the hash of the given bytes
    pub fn of(bytes: &[u8]) -> Self {
        Self {
            digest: Sha1::digest(bytes).into(),
        }
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{ digest: {} }}", HEXLOWER.encode(&self.digest))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", HEXLOWER.encode(&self.digest))
    }
}

impl std::str::FromStr for ContentHash {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = HEXLOWER
            .decode(s.as_bytes())
            .with_context(|| format!("Couldn't decode {s} as hex"))?;
        ensure!(bytes.len() == DIGEST_LENGTH, "Expected a SHA-1 digest");
        let mut digest = [0; DIGEST_LENGTH];
        digest.copy_from_slice(&bytes);
        Ok(Self { digest })
    }
}

impl serde::Serialize for ContentHash {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&HEXLOWER.encode(&self.digest))
    }
}

impl<'de> serde::Deserialize<'de> for ContentHash {
    fn deserialize<D>(deserializer: D) -> Result<ContentHash, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}
