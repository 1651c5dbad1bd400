//! Block data model (section 3, "Block / transaction").

use serde::{Deserialize, Serialize};

use crate::encoding::canonical_serialize;
use crate::id::Id;
use crate::transaction::Transaction;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub previous_id: Id,
    pub height: u64,
    pub timestamp: u64,
    pub previous_state_merkle_root: Id,
    pub transaction_merkle_root: Id,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
    pub signature: Vec<u8>,
    pub id: Id,
}

impl Block {
    /// Computes the content hash of this block's canonical serialization,
    /// over `(header, transactions, signature)` — the `id` field itself is
    /// excluded, since it is the hash *of* those fields.
    pub fn compute_id(&self) -> anyhow::Result<Id> {
        #[derive(Serialize)]
        struct Signable<'a> {
            header: &'a BlockHeader,
            transactions: &'a [Transaction],
            signature: &'a [u8],
        }
        let bytes = canonical_serialize(&Signable {
            header: &self.header,
            transactions: &self.transactions,
            signature: &self.signature,
        })?;
        Ok(Id::hash(&bytes))
    }

    /// Verifies that `self.id` matches the recomputed content hash.
    pub fn verify_id(&self) -> anyhow::Result<bool> {
        Ok(self.compute_id()? == self.id)
    }

    pub fn transaction_ids(&self) -> Vec<Id> {
        self.transactions.iter().map(|t| t.id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_block() -> Block {
        let header = BlockHeader {
            previous_id: Id::zero(),
            height: 1,
            timestamp: 1000,
            previous_state_merkle_root: Id::zero(),
            transaction_merkle_root: Id::zero(),
        };
        let mut b = Block {
            header,
            transactions: vec![],
            signature: vec![1, 2, 3],
            id: Id::zero(),
        };
        b.id = b.compute_id().unwrap();
        b
    }

    #[test]
    fn id_round_trips() {
        let b = sample_block();
        assert!(b.verify_id().unwrap());
    }

    #[test]
    fn id_changes_with_content() {
        let mut b = sample_block();
        let original = b.id;
        b.header.timestamp += 1;
        b.id = b.compute_id().unwrap();
        assert_ne!(original, b.id);
    }
}
