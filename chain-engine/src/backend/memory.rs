//! An in-memory [`super::Backend`], analogous to the teacher's
//! `fvm_ipld_blockstore::MemoryBlockstore`: used in unit tests and by
//! tooling that doesn't need persistence across process restarts.

use std::collections::BTreeMap;

use super::{Backend, BackendMetadata, Batch};

#[derive(Default)]
pub struct MemoryBatch {
    puts: Vec<(Vec<u8>, Vec<u8>)>,
    erases: Vec<Vec<u8>>,
}

impl Batch for MemoryBatch {
    fn put(&mut self, key: &[u8], value: &[u8]) {
        self.puts.push((key.to_vec(), value.to_vec()));
    }

    fn erase(&mut self, key: &[u8]) {
        self.erases.push(key.to_vec());
    }
}

/// A `BTreeMap`-backed store. Not persistent; intended for tests and the
/// indexer's dry-run mode.
#[derive(Default)]
pub struct MemoryBackend {
    map: BTreeMap<Vec<u8>, Vec<u8>>,
    metadata: BackendMetadata,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Backend for MemoryBackend {
    type Batch = MemoryBatch;

    fn get(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        Ok(self.map.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> anyhow::Result<()> {
        self.map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn erase(&mut self, key: &[u8]) -> anyhow::Result<()> {
        self.map.remove(key);
        Ok(())
    }

    fn lower_bound(&self, key: &[u8]) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>> {
        Ok(self
            .map
            .range(key.to_vec()..)
            .next()
            .map(|(k, v)| (k.clone(), v.clone())))
    }

    fn iter_forward(
        &self,
        key: &[u8],
    ) -> anyhow::Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        Ok(Box::new(
            self.map
                .range(key.to_vec()..)
                .map(|(k, v)| (k.clone(), v.clone())),
        ))
    }

    fn iter_reverse(
        &self,
        key: &[u8],
    ) -> anyhow::Result<Box<dyn Iterator<Item = (Vec<u8>, Vec<u8>)> + '_>> {
        Ok(Box::new(
            self.map
                .range(..=key.to_vec())
                .rev()
                .map(|(k, v)| (k.clone(), v.clone())),
        ))
    }

    fn start_batch(&self) -> Self::Batch {
        MemoryBatch::default()
    }

    fn end_batch(&mut self, batch: Self::Batch) -> anyhow::Result<()> {
        for (k, v) in batch.puts {
            self.map.insert(k, v);
        }
        for k in batch.erases {
            self.map.remove(&k);
        }
        Ok(())
    }

    fn flush(&mut self) -> anyhow::Result<()> {
        Ok(())
    }

    fn size(&self) -> anyhow::Result<u64> {
        Ok(self.map.len() as u64)
    }

    fn metadata(&self) -> anyhow::Result<BackendMetadata> {
        Ok(self.metadata.clone())
    }

    fn set_metadata(&mut self, metadata: &BackendMetadata) -> anyhow::Result<()> {
        self.metadata = metadata.clone();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_get_erase() {
        let mut b = MemoryBackend::new();
        b.put(b"k", b"v").unwrap();
        assert_eq!(b.get(b"k").unwrap(), Some(b"v".to_vec()));
        b.erase(b"k").unwrap();
        assert_eq!(b.get(b"k").unwrap(), None);
    }

    #[test]
    fn iteration_is_key_ordered() {
        let mut b = MemoryBackend::new();
        b.put(b"c", b"3").unwrap();
        b.put(b"a", b"1").unwrap();
        b.put(b"b", b"2").unwrap();
        let keys: Vec<_> = b
            .iter_forward(b"")
            .unwrap()
            .map(|(k, _)| k)
            .collect();
        assert_eq!(keys, vec![b"a".to_vec(), b"b".to_vec(), b"c".to_vec()]);
    }

    #[test]
    fn batch_is_atomic_on_end() {
        let mut b = MemoryBackend::new();
        let mut batch = b.start_batch();
        batch.put(b"x", b"1");
        batch.put(b"y", b"2");
        b.end_batch(batch).unwrap();
        assert_eq!(b.get(b"x").unwrap(), Some(b"1".to_vec()));
        assert_eq!(b.get(b"y").unwrap(), Some(b"2".to_vec()));
    }
}
