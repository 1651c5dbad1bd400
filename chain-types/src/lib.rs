//! Wire types shared between the execution engine and its RPC surface:
//! identifiers, the object-space keying scheme, block/transaction/receipt
//! data, canonical encoding, and the error taxonomy.
//!
//! ## Logging
//!
//! This crate does not emit logs itself; it is pure data. Consuming crates
//! log through the `log` facade (see `chain-engine`).

pub mod block;
pub mod encoding;
pub mod error;
pub mod id;
pub mod object;
pub mod receipt;
pub mod transaction;

pub use block::{Block, BlockHeader};
pub use error::{ChainError, ContractResult, Result};
pub use id::Id;
pub use object::ObjectSpace;
pub use receipt::{BlockReceipt, Event, TransactionReceipt};
pub use transaction::{Operation, Transaction, TransactionHeader};
