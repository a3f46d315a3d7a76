use std::fmt;
use std::str::FromStr;

use crate::error::{Error, Result};

/// Size in bytes of an object identifier.
pub const HASH_SIZE: usize = 20;

/// A 20-byte content address of a stored object.
///
/// The all-zero value is a sentinel meaning "no object"; it is never the id
/// of a real commit or tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash([u8; HASH_SIZE]);

impl Hash {
    pub const ZERO: Hash = Hash([0u8; HASH_SIZE]);

    pub fn from_bytes(bytes: [u8; HASH_SIZE]) -> Self {
        Hash(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; HASH_SIZE] {
        &self.0
    }

    pub fn is_zero(&self) -> bool {
        *self == Hash::ZERO
    }

    /// Decode a hex encoded hash.
    ///
    /// Unlike a permissive parser this checks both that the input is valid
    /// hex and that the decoded value has at least [`HASH_SIZE`] bytes.
    pub fn from_hex(s: &str) -> Result<Hash> {
        let bytes = hex::decode(s).map_err(|_| Error::InvalidHash(s.to_string()))?;
        if bytes.len() < HASH_SIZE {
            return Err(Error::ShortHash(s.to_string()));
        }
        let mut out = [0u8; HASH_SIZE];
        out.copy_from_slice(&bytes[..HASH_SIZE]);
        Ok(Hash(out))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for Hash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> Result<Hash> {
        Hash::from_hex(s)
    }
}

/// A set of object identifiers, used to bound traversals and to record
/// past-commit sets.
pub type HashSet = std::collections::HashSet<Hash>;

/// Decode each input string with [`Hash::from_hex`].
pub fn decode_hashes<I, S>(strs: I) -> Result<Vec<Hash>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    strs.into_iter().map(|s| Hash::from_hex(s.as_ref())).collect()
}

/// Decode the input strings into a [`HashSet`].
pub fn hash_set_from_hex<I, S>(strs: I) -> Result<HashSet>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    Ok(decode_hashes(strs)?.into_iter().collect())
}

/// Union of two hash sets.
pub fn combine_hash_sets(a: &HashSet, b: &HashSet) -> HashSet {
    a.union(b).copied().collect()
}
