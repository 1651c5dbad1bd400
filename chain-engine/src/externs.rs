//! External collaborator interfaces (section 1, out-of-scope; section
//! 6, "RPC services consumed"): the block store, the mempool, and the
//! message bus are all consumed as trait boundaries, never as concrete
//! dependencies, mirroring `fvm/src/externs.rs`'s `Externs` trait
//! (`get_chain_randomness`, `verify_consensus_fault`) for "the thing I
//! need is injected, not linked in."

use chain_types::Block;

/// Block-store RPC surface (section 6).
pub trait BlockStore: Send + Sync {
    fn add_block(&self, block: &Block) -> anyhow::Result<()>;
    fn get_highest_block(&self) -> anyhow::Result<u64>;
    fn get_blocks_by_height(&self, start_height: u64, count: u32) -> anyhow::Result<Vec<Block>>;
}

/// Mempool RPC surface (section 6). Consulted by transaction submission
/// as advisory pre-checks (section 4.I: "nonce and RC pre-checks are
/// delegated to the mempool service via RPC and treated as advisory").
pub trait Mempool: Send + Sync {
    fn check_pending_account_resources(&self, payer: &[u8], rc_limit: u64) -> anyhow::Result<bool>;
    fn check_account_nonce(&self, payer: &[u8], nonce: u64) -> anyhow::Result<bool>;
    fn get_pending_nonce(&self, payer: &[u8]) -> anyhow::Result<u64>;
}

/// Message-bus publish/subscribe surface (section 6). Every publish site
/// in the controller is best-effort: a `MessageBus` failure is logged,
/// never propagated as a request failure (section 4.I step 9).
pub trait MessageBus: Send + Sync {
    fn publish(&self, subject: &str, payload: &[u8]) -> anyhow::Result<()>;
}

/// A [`MessageBus`] that drops every publish; useful for tests and for
/// standalone/single-node operation with no broker configured.
pub struct NullMessageBus;

impl MessageBus for NullMessageBus {
    fn publish(&self, _subject: &str, _payload: &[u8]) -> anyhow::Result<()> {
        Ok(())
    }
}

/// A [`BlockStore`] that has never seen a block; useful for tests.
pub struct EmptyBlockStore;

impl BlockStore for EmptyBlockStore {
    fn add_block(&self, _block: &Block) -> anyhow::Result<()> {
        Ok(())
    }

    fn get_highest_block(&self) -> anyhow::Result<u64> {
        Ok(0)
    }

    fn get_blocks_by_height(&self, _start_height: u64, _count: u32) -> anyhow::Result<Vec<Block>> {
        Ok(Vec::new())
    }
}

/// A [`Mempool`] that approves everything; useful for tests and for
/// operation with no mempool service configured.
pub struct PermissiveMempool;

impl Mempool for PermissiveMempool {
    fn check_pending_account_resources(&self, _payer: &[u8], _rc_limit: u64) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn check_account_nonce(&self, _payer: &[u8], _nonce: u64) -> anyhow::Result<bool> {
        Ok(true)
    }

    fn get_pending_nonce(&self, _payer: &[u8]) -> anyhow::Result<u64> {
        Ok(0)
    }
}
