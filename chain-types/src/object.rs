//! Object spaces: the keyspace partitioning scheme for state objects.

use serde::{Deserialize, Serialize};

/// A tuple `(system, zone, id)` partitioning the state keyspace (section 3,
/// "Object space"). `system` spaces are reserved for engine metadata, the
/// syscall-override table, contract bytecode and per-contract storage;
/// non-system spaces are free for contract use, zoned by the contract id
/// that owns them.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ObjectSpace {
    pub system: bool,
    pub zone: Vec<u8>,
    pub id: u32,
}

impl ObjectSpace {
    pub fn new(system: bool, zone: impl Into<Vec<u8>>, id: u32) -> Self {
        Self {
            system,
            zone: zone.into(),
            id,
        }
    }

    pub fn system(id: u32) -> Self {
        Self::new(true, Vec::new(), id)
    }

    pub fn contract(contract_id: impl Into<Vec<u8>>, id: u32) -> Self {
        Self::new(false, contract_id, id)
    }
}

/// Reserved system object-space ids (section 6, "Persisted state layout").
pub mod reserved_space {
    /// Engine metadata: size, revision, id, merkle_root, block_header.
    pub const METADATA: u32 = 0;
    /// Per-call syscall-override table, one entry per call id.
    pub const SYSCALL_OVERRIDES: u32 = 1;
    /// Contract bytecode, keyed by contract id.
    pub const CONTRACT_BYTECODE: u32 = 2;
    /// Per-contract storage, keyed by contract id + user key.
    pub const CONTRACT_STORAGE: u32 = 3;
    /// Chain-wide metadata: chain id, genesis public key, head block pointer.
    pub const CHAIN_METADATA: u32 = 4;
}

/// Reserved metadata keys within [`reserved_space::METADATA`] and
/// [`reserved_space::CHAIN_METADATA`] (section 6).
pub mod reserved_key {
    pub const SIZE: &[u8] = b"size";
    pub const REVISION: &[u8] = b"revision";
    pub const ID: &[u8] = b"id";
    pub const MERKLE_ROOT: &[u8] = b"merkle_root";
    pub const BLOCK_HEADER: &[u8] = b"block_header";
    pub const CHAIN_ID: &[u8] = b"chain_id";
    pub const GENESIS_PUBLIC_KEY: &[u8] = b"genesis_public_key";
    pub const HEAD_BLOCK: &[u8] = b"head_block";
}
