//! A `rocksdb`-backed [`super::Backend`], grounded on the original
//! `rocksdb_backend.cpp` for the operation set and on
//! `aptos-labs-aptos-core`'s use of `lru` for the fronting object cache.

use std::num::NonZeroUsize;
use std::path::Path;
use std::sync::Mutex;

use lru::LruCache;
use rocksdb::{Direction, IteratorMode, WriteBatch, DB};

use super::{Backend, BackendMetadata, Batch};

const METADATA_KEY: &[u8] = b"__backend_metadata__";
const DEFAULT_CACHE_CAPACITY: usize = 4096;

pub struct RocksBatch {
    inner: WriteBatch,
}

impl Batch for RocksBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.inner.put(key, value);
    }

    fn erase(&mut self, key: &[u8]) {
        self.inner.delete(key);
    }
}

/// An object cache guarded by its own mutex (section 5: "Object-cache
/// entries are guarded by a mutex internal to the backend"), independent
/// of whatever lock the fork database holds.
pub struct RocksBackend {
    db: DB,
    cache: Mutex<LruCache<Vec<u8>, Option<Vec<u8>>>>,
}

impl RocksBackend {
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = DB::open(&opts, path)?;
        Ok(Self {
            db,
            cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEFAULT_CACHE_CAPACITY).unwrap(),
            )),
        })
    }

    fn cache_get(&self, key: &[u8]) -> Option<Option<Vec<u8>>> {
        self.cache.lock().unwrap().get(key).cloned()
    }

    fn cache_put(&self, key: &[u8], value: Option<Vec<u8>>) {
        self.cache.lock().unwrap().put(key.to_vec(), value);
    }

    fn cache_invalidate(&self, key: &[u8]) {
        self.cache.lock().unwrap().pop(key);
    }
}

impl Backend for RocksBackend {
    type Batch = RocksBatch;

    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        if let Some(hit) = self.cache_get(key) {
            return Ok(hit);
        }
        let value = self.db.get(key)?;
        self.cache_put(key, value.clone());
        Ok(value)
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
        self.db.put(key, value)?;
        self.cache_put(key, Some(value.to_vec()));
        Ok(())
    }

    fn erase(&mut self, key: &[u8]) -> anyhow::Result<()> {
        self.db.delete(key)?;
        self.cache_invalidate(key);
        Ok(())
    }

    fn lower_bound(&self, key: &[u8]) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>> {
        let mut it = self
            .db
            .iterator(IteratorMode::From(key, Direction::Forward));
        Ok(it
            .next()
            .transpose()?
            .map(|(k, v)| (k.to_vec(), v.to_vec())))
    }

    fn iter_forward(
        &self,
        key: &[u8],
    ) -> anyhow::Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let it = self
            .db
            .iterator(IteratorMode::From(key, Direction::Forward))
            .filter_map(|r| r.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()));
        Ok(Box::new(it))
    }

    fn iter_reverse(
        &self,
        key: &[u8],
    ) -> anyhow::Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        let it = self
            .db
            .iterator(IteratorMode::From(key, Direction::Reverse))
            .filter_map(|r| r.ok())
            .map(|(k, v)| (k.to_vec(), v.to_vec()));
        Ok(Box::new(it))
    }

    fn start_batch(&self) -> Self::Batch {
        RocksBatch {
            inner: WriteBatch::default(),
        }
    }

    fn end_batch(&mut self, batch: Self::Batch) -> anyhow::Result<()> {
        self.db.write(batch.inner)?;
        // Conservative: a batch can touch keys we don't track individually,
        // so drop the whole cache rather than risk serving a stale entry.
        self.cache.lock().unwrap().clear();
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        self.db.flush()?;
        Ok(())
    }

    fn size(&self) -> anyhow::Result<u64> {
        Ok(self
            .db
            .property_int_value("rocksdb.estimate-num-keys")?
            .unwrap_or(0))
    }

    fn metadata(&self) -> anyhow::Result<BackendMetadata> {
        match self.get(METADATA_KEY)? {
            Some(bytes) => Ok(chain_types::encoding::canonical_deserialize(&bytes)
                .map_err(|e| anyhow::anyhow!(e))?),
            None => Ok(BackendMetadata::default()),
        }
    }

    fn set_metadata(&mut self, metadata: &BackendMetadata) -> anyhow::Result<()> {
        let bytes =
            chain_types::encoding::canonical_serialize(metadata).map_err(|e| anyhow::anyhow!(e))?;
        self.put(METADATA_KEY, &bytes)
    }
}
