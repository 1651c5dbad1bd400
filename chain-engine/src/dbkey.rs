//! Serialization of `(space, key)` pairs into the single ordered byte
//! string the backend and state deltas actually store against (section
//! 3, "Object space" / section 4.B: "mapping `serialized_key` → value").
//!
//! The encoding groups entries first by `system`, then by zone length,
//! then by zone bytes, then by numeric space id, then by the raw key —
//! so that iterating a fixed `(system, zone, id)` space with a varying
//! key visits entries in ascending key order, which is all `next`/`prev`
//! object operations require.

use byteorder::{BigEndian, ByteOrder};
use chain_types::ObjectSpace;

pub fn encode(space: &ObjectSpace, key: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + 4 + space.zone.len() + 4 + key.len());
    buf.push(u8::from(space.system));
    let mut len_prefix = [0u8; 4];
    BigEndian::write_u32(&mut len_prefix, space.zone.len() as u32);
    buf.extend_from_slice(&len_prefix);
    buf.extend_from_slice(&space.zone);
    let mut id_bytes = [0u8; 4];
    BigEndian::write_u32(&mut id_bytes, space.id);
    buf.extend_from_slice(&id_bytes);
    buf.extend_from_slice(key);
    buf
}

/// The encoded prefix shared by every key in `space`, regardless of the
/// per-key suffix. Used to bound iteration to a single space.
pub fn space_prefix(space: &ObjectSpace) -> Vec<u8> {
    encode(space, &[])
}
