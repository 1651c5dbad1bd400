//! Transaction and operation data model (section 3).

use serde::{Deserialize, Serialize};

use crate::encoding::canonical_serialize;
use crate::id::Id;

/// One operation within a transaction. The payload is an opaque, operation-kind
/// tagged blob: the engine doesn't interpret operation semantics itself
/// beyond routing `contract_call` operations into the host API (section 4.I).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operation {
    ContractCall {
        contract_id: Id,
        entry_point: u32,
        args: Vec<u8>,
    },
    SetSystemCall {
        call_id: u32,
        contract_id: Id,
        entry_point: u32,
    },
    UploadContract {
        contract_id: Id,
        bytecode: Vec<u8>,
    },
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionHeader {
    pub payer: Vec<u8>,
    pub payee: Vec<u8>,
    pub nonce: u64,
    pub rc_limit: u64,
    pub operation_merkle_root: Id,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub header: TransactionHeader,
    pub operations: Vec<Operation>,
    pub signatures: Vec<Vec<u8>>,
    pub id: Id,
}

impl Transaction {
    pub fn compute_id(&self) -> anyhow::Result<Id> {
        #[derive(Serialize)]
        struct Signable<'a> {
            header: &'a TransactionHeader,
            operations: &'a [Operation],
            signatures: &'a [Vec<u8>],
        }
        let bytes = canonical_serialize(&Signable {
            header: &self.header,
            operations: &self.operations,
            signatures: &self.signatures,
        })?;
        Ok(Id::hash(&bytes))
    }

    pub fn verify_id(&self) -> anyhow::Result<bool> {
        Ok(self.compute_id()? == self.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Transaction {
        let header = TransactionHeader {
            payer: vec![1],
            payee: vec![2],
            nonce: 0,
            rc_limit: 100,
            operation_merkle_root: Id::zero(),
        };
        let mut t = Transaction {
            header,
            operations: vec![],
            signatures: vec![vec![0xaa]],
            id: Id::zero(),
        };
        t.id = t.compute_id().unwrap();
        t
    }

    #[test]
    fn id_round_trips() {
        assert!(sample().verify_id().unwrap());
    }

    #[test]
    fn id_depends_on_nonce() {
        let mut t = sample();
        let original = t.id;
        t.header.nonce += 1;
        t.id = t.compute_id().unwrap();
        assert_ne!(original, t.id);
    }
}
