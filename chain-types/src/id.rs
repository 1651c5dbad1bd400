//! Content-addressed identifiers.
//!
//! Blocks, transactions, state nodes and contracts are all named by a
//! [`Id`]: a multihash (algorithm tag + digest) over the canonical
//! serialization of the thing it names. This mirrors the teacher's use of
//! `cid::Cid` / `multihash::Multihash` as the universal handle type, but
//! drops the CID codec byte since the spec's identifiers are bare
//! multihashes, not IPLD links.

use std::fmt;

use multihash_codetable::{Code, MultihashDigest};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Digest size used by the default hash algorithm (sha2-256).
pub const DIGEST_SIZE: usize = 32;

/// A multihash identifier: blocks, transactions, state nodes, contracts.
///
/// The zero [`Id`] (all-zero digest) is the sentinel parent of the genesis
/// state node (see [`Id::zero`]).
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(multihash::Multihash<64>);

// The teacher's `multihash` dependency (see `filecoin-project-ref-fvm/Cargo.toml`)
// is pulled in with `default-features = false` and no `serde` feature, the way
// the teacher itself only ever reaches `cid::Cid`'s own hand-written `Serialize`
// impl rather than deriving through `Multihash` directly. We do the same here:
// serialize through the canonical byte encoding instead of depending on a serde
// impl on `Multihash` that may or may not be compiled in. Unlike the teacher we
// have no IPLD links to name, so there's no `cid::Cid` wrapper here at all —
// just the bare multihash.
impl Serialize for Id {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Serialize::serialize(&self.to_bytes(), serializer)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let bytes = Vec::<u8>::deserialize(deserializer)?;
        Id::from_bytes(&bytes).map_err(serde::de::Error::custom)
    }
}

impl Id {
    /// The sentinel zero id: the parent of the genesis state node.
    pub fn zero() -> Self {
        Id(multihash::Multihash::wrap(0, &[0u8; DIGEST_SIZE]).expect("digest fits"))
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// Hash `bytes` with the default algorithm (sha2-256) to produce an id.
    pub fn hash(bytes: &[u8]) -> Self {
        Id(Code::Sha2_256.digest(bytes))
    }

    pub fn code(&self) -> u64 {
        self.0.code()
    }

    pub fn digest(&self) -> &[u8] {
        self.0.digest()
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        self.0.to_bytes()
    }

    pub fn from_bytes(bytes: &[u8]) -> anyhow::Result<Self> {
        Ok(Id(multihash::Multihash::from_bytes(bytes)?))
    }
}

impl Default for Id {
    fn default() -> Self {
        Self::zero()
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", hex::encode(self.digest()))
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.digest()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_is_stable_and_detectable() {
        let z = Id::zero();
        assert!(z.is_zero());
        assert_eq!(z, Id::zero());
    }

    #[test]
    fn hash_is_deterministic() {
        let a = Id::hash(b"hello");
        let b = Id::hash(b"hello");
        assert_eq!(a, b);
        let c = Id::hash(b"hellp");
        assert_ne!(a, c);
    }

    #[test]
    fn roundtrips_through_bytes() {
        let id = Id::hash(b"roundtrip");
        let bytes = id.to_bytes();
        let back = Id::from_bytes(&bytes).unwrap();
        assert_eq!(id, back);
    }
}
