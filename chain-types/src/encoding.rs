//! Canonical binary serialization.
//!
//! Every content-addressed [`crate::Id`] is a hash over the canonical
//! serialization of the thing it names, so the encoding must be
//! deterministic and unique per value. We use `bcs` (Binary Canonical
//! Serialization) for this, the same tool Aptos/Diem-lineage chains reach
//! for to guarantee a single well-defined byte sequence per value rather
//! than hand-rolling a serializer.

use serde::{de::DeserializeOwned, Serialize};

use crate::error::EncodingError;

/// Serialize `value` using the chain's canonical wire format.
pub fn canonical_serialize<T: Serialize>(value: &T) -> Result<Vec<u8>, EncodingError> {
    bcs::to_bytes(value).map_err(|e| EncodingError::Serialize(e.to_string()))
}

/// Deserialize a value previously produced by [`canonical_serialize`].
pub fn canonical_deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T, EncodingError> {
    bcs::from_bytes(bytes).map_err(|e| EncodingError::Deserialize(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Example {
        a: u32,
        b: Vec<u8>,
    }

    #[test]
    fn roundtrips() {
        let e = Example {
            a: 7,
            b: vec![1, 2, 3],
        };
        let bytes = canonical_serialize(&e).unwrap();
        let back: Example = canonical_deserialize(&bytes).unwrap();
        assert_eq!(e, back);
    }

    #[test]
    fn is_deterministic() {
        let e = Example {
            a: 1,
            b: vec![9, 9],
        };
        assert_eq!(
            canonical_serialize(&e).unwrap(),
            canonical_serialize(&e).unwrap()
        );
    }
}
