//! Receipts, events and logs (section 3, "Receipt" / "Chronicler").

use serde::{Deserialize, Serialize};

use crate::id::Id;

/// One emitted event: `(source contract, event name, impacted accounts, data)`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub source: Id,
    pub name: String,
    pub impacted_accounts: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

impl Event {
    /// The message-bus subject this event is published under.
    pub fn subject(&self) -> String {
        format!("koinos.event.{}.{}", self.source, self.name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionReceipt {
    pub id: Id,
    pub rc_used: u64,
    pub rc_limit: u64,
    pub disk_storage_used: u64,
    pub network_bandwidth_used: u64,
    pub compute_used: u64,
    pub logs: Vec<String>,
    pub events: Vec<Event>,
    pub failed: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockReceipt {
    pub id: Id,
    pub height: u64,
    pub rc_used: u64,
    pub disk_storage_used: u64,
    pub network_bandwidth_used: u64,
    pub compute_used: u64,
    pub state_merkle_root: Id,
    pub transaction_receipts: Vec<TransactionReceipt>,
    /// Indices, within `transaction_receipts`, of transactions whose
    /// effects were rolled back (section 4.I step 7).
    pub failed_transaction_indices: Vec<u32>,
    pub logs: Vec<String>,
    pub events: Vec<Event>,
}

impl BlockReceipt {
    pub fn empty(id: Id, height: u64) -> Self {
        Self {
            id,
            height,
            rc_used: 0,
            disk_storage_used: 0,
            network_bandwidth_used: 0,
            compute_used: 0,
            state_merkle_root: Id::zero(),
            transaction_receipts: Vec::new(),
            failed_transaction_indices: Vec::new(),
            logs: Vec::new(),
            events: Vec::new(),
        }
    }
}
