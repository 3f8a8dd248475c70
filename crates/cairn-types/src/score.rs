use std::fmt;
use std::str::FromStr;

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Content digest identifying a stored value.
///
/// A `Score` is the MD5 digest of a value's bytes. It is both the key a
/// value is looked up by and the checksum a read is verified against:
/// identical content always produces the same `Score`.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Score([u8; Score::SIZE]);

impl Score {
    /// Width of a score in bytes, both in memory and on disk.
    pub const SIZE: usize = 16;

    /// Compute the score of `data`.
    pub fn of(data: &[u8]) -> Self {
        let digest = Md5::digest(data);
        let mut bytes = [0u8; Self::SIZE];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    /// Wrap a digest that was computed elsewhere (e.g. read back from disk).
    pub const fn from_raw(bytes: [u8; Self::SIZE]) -> Self {
        Self(bytes)
    }

    /// The raw digest bytes.
    pub fn as_bytes(&self) -> &[u8; Self::SIZE] {
        &self.0
    }

    /// Returns `true` if `data` hashes to this score.
    pub fn matches(&self, data: &[u8]) -> bool {
        Self::of(data) == *self
    }

    /// Lowercase hex encoding of the full digest.
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// First 8 hex characters, for logs.
    pub fn short_hex(&self) -> String {
        hex::encode(&self.0[..4])
    }

    /// Parse a score from its 32-character hex form.
    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHex(e.to_string()))?;
        if bytes.len() != Self::SIZE {
            return Err(TypeError::InvalidLength {
                expected: Self::SIZE,
                actual: bytes.len(),
            });
        }
        let mut arr = [0u8; Self::SIZE];
        arr.copy_from_slice(&bytes);
        Ok(Self(arr))
    }
}

/// Compute the score of `data`. Same as [`Score::of`].
pub fn make_score(data: &[u8]) -> Score {
    Score::of(data)
}

impl fmt::Debug for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Score({})", self.short_hex())
    }
}

impl fmt::Display for Score {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl FromStr for Score {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_hex(s)
    }
}

impl From<[u8; Score::SIZE]> for Score {
    fn from(bytes: [u8; Score::SIZE]) -> Self {
        Self(bytes)
    }
}

impl From<Score> for [u8; Score::SIZE] {
    fn from(score: Score) -> Self {
        score.0
    }
}
