//! Backend store (section 4.A): the persistent key/value layer underneath
//! the root [`crate::delta::StateDelta`].
//!
//! Grounded on the original `rocksdb_backend.cpp` for the operation set,
//! and on `aptos-labs-aptos-core`'s storage layer for the choice of
//! `rocksdb` + `lru` as the concrete Rust stack (the teacher crate itself
//! is storage-agnostic behind `fvm_ipld_blockstore::Blockstore`; we follow
//! that same "trait boundary, pick a concrete store" shape).

mod memory;
mod rocks;

use chain_types::Id;
pub use memory::MemoryBackend;
pub use rocks::RocksBackend;
use serde::{Deserialize, Serialize};

/// An atomic batch of writes. Implementations buffer `put`/`erase` calls
/// and apply them all-or-nothing on `commit`.
pub trait Batch {
    fn put(&mut self, key: &[u8], value: &[u8]);
    fn erase(&mut self, key: &[u8]);
}

/// Persisted metadata the backend tracks alongside the raw keyspace
/// (section 4.A: `size`, `revision`, `id`, `merkle_root`, last block header).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BackendMetadata {
    pub size: u64,
    pub revision: u64,
    pub id: Option<Id>,
    pub merkle_root: Option<Id>,
    pub block_header: Option<Vec<u8>>,
}

/// The backend store contract. Keys and values are opaque byte strings;
/// iteration is in lexicographic key order.
pub trait Backend: Send + Sync {
    type Batch: Batch;

    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>>;
    fn put(&mut self, key: &[u8], value: &[u8]) -> anyhow::Result<()>;
    fn erase(&mut self, key: &[u8]) -> anyhow::Result<()>;

    /// `true` if `key` is present.
    fn find(&self, key: &[u8]) -> anyhow::Result<bool> {
        Ok(self.get(key)?.is_some())
    }

    /// The smallest key that is `>= key`, if any.
    fn lower_bound(&self, key: &[u8]) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>>;

    /// Forward iteration starting at `key` (inclusive), in key order.
    fn iter_forward(&self, key: &[u8]) -> anyhow::Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;

    /// Reverse iteration starting at `key` (inclusive), in descending key order.
    fn iter_reverse(&self, key: &[u8]) -> anyhow::Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>>;

    fn start_batch(&self) -> Self::Batch;
    fn end_batch(&mut self, batch: Self::Batch) -> anyhow::Result<()>;

    fn flush(&mut self) -> anyhow::Result<()>;
    fn size(&self) -> anyhow::Result<u64>;

    fn metadata(&self) -> anyhow::Result<BackendMetadata>;
    fn set_metadata(&mut self, metadata: &BackendMetadata) -> anyhow::Result<()>;
}
