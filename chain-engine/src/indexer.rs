//! Block indexer (section 4.J): bulk historical sync, feeding a
//! [`crate::controller::Controller`] blocks in height order from a
//! [`crate::externs::BlockStore`] until it catches up to a target height.
//!
//! Grounded on the original indexer's "ask for the highest known block,
//! then pull in fixed-size batches" shape, and on the teacher's chain
//! sync loop style of logging progress at a fixed cadence rather than per
//! block (`fvm` itself has no such loop; this follows `aptos-labs-aptos-core`'s
//! bulk-executor batch-and-log pattern referenced in the example pack).

use crate::backend::Backend;
use crate::context::Intent;
use crate::controller::Controller;

/// Blocks requested per round-trip to the block store.
const BATCH_SIZE: u32 = 100;

/// Log a progress line every this many blocks applied.
const PROGRESS_INTERVAL: u64 = 1_000;

pub struct Indexer<'a, B: Backend> {
    controller: &'a Controller<B>,
}

impl<'a, B: Backend> Indexer<'a, B> {
    pub fn new(controller: &'a Controller<B>) -> Self {
        Self { controller }
    }

    /// Applies every block from the store, in height order, until the
    /// local head reaches `target_height` or the store runs dry. `now` is
    /// supplied by the caller rather than read from the clock here, since
    /// this module never touches wall-clock time directly (section 9).
    ///
    /// Returns the height reached. A block application failure here is
    /// treated as catastrophic (section 4.J: "terminate the process on
    /// unrecoverable sync errors") and is propagated rather than skipped.
    pub fn sync_to(&self, target_height: u64, now: u64) -> anyhow::Result<u64> {
        let mut height = self
            .controller
            .get_head_info()
            .map(|h| h.height)
            .unwrap_or(0);

        log::info!("indexer starting from height {height}, target {target_height}");

        while height < target_height {
            let blocks = self
                .controller
                .block_store()
                .get_blocks_by_height(height + 1, BATCH_SIZE)?;
            if blocks.is_empty() {
                log::warn!("block store has no blocks past height {height}; stopping sync short of target");
                break;
            }

            for block in &blocks {
                self.controller.apply_block(block, now, Intent::BlockApplication)?;
                height = block.header.height;
                if height % PROGRESS_INTERVAL == 0 {
                    log::info!("indexer applied block at height {height}");
                }
            }
        }

        log::info!("indexer reached height {height}");
        Ok(height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::externs::{BlockStore, NullMessageBus, PermissiveMempool};
    use crate::fork_db::ForkAlgorithm;
    use crate::host::{HostDispatcher, VirtualMachine};
    use crate::thunks::{builtin, ThunkDispatcher};
    use crate::controller::ControllerConfig;
    use crate::fork_db::ForkDb;
    use chain_types::{Block, BlockHeader, ContractResult, Id};
    use std::sync::{Arc, Mutex, RwLock};

    struct NoopVm;
    impl VirtualMachine<MemoryBackend> for NoopVm {
        fn invoke(
            &self,
            _ctx: &mut crate::context::ExecutionContext<MemoryBackend>,
            _host: &HostDispatcher<MemoryBackend>,
            _contract_id: Id,
            _entry_point: u32,
            _args: &[u8],
        ) -> anyhow::Result<ContractResult> {
            Ok(ContractResult::Ok(Vec::new()))
        }
    }

    struct FixedBlockStore {
        blocks: Mutex<Vec<Block>>,
    }

    impl BlockStore for FixedBlockStore {
        fn add_block(&self, _block: &Block) -> anyhow::Result<()> {
            Ok(())
        }

        fn get_highest_block(&self) -> anyhow::Result<u64> {
            Ok(self.blocks.lock().unwrap().last().map(|b| b.header.height).unwrap_or(0))
        }

        fn get_blocks_by_height(&self, start_height: u64, count: u32) -> anyhow::Result<Vec<Block>> {
            Ok(self
                .blocks
                .lock()
                .unwrap()
                .iter()
                .filter(|b| b.header.height >= start_height)
                .take(count as usize)
                .cloned()
                .collect())
        }
    }

    fn block(previous_id: Id, height: u64, timestamp: u64, previous_root: Id) -> Block {
        let header = BlockHeader {
            previous_id,
            height,
            timestamp,
            previous_state_merkle_root: previous_root,
            transaction_merkle_root: Id::zero(),
        };
        let mut b = Block {
            header,
            transactions: Vec::new(),
            signature: vec![1],
            id: Id::zero(),
        };
        b.id = b.compute_id().unwrap();
        b
    }

    #[test]
    fn sync_applies_every_block_from_the_store_in_order() {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let fork_db = ForkDb::open(backend, |_root| Ok(()), ForkAlgorithm::Fifo.comparator()).unwrap();
        let root = fork_db.get_root();
        let b1 = block(root.id(), 1, 10, root.merkle_root().unwrap());

        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        builtin::register_all(&dispatcher);
        let host = HostDispatcher::new(dispatcher, Box::new(NoopVm));
        let controller = Controller::new(
            fork_db,
            host,
            Box::new(FixedBlockStore {
                blocks: Mutex::new(vec![b1]),
            }),
            Box::new(PermissiveMempool),
            Box::new(NullMessageBus),
            ControllerConfig::default(),
        );

        let indexer = Indexer::new(&controller);
        let reached = indexer.sync_to(1, 1_000).unwrap();
        assert_eq!(reached, 1);
        assert_eq!(controller.get_head_info().unwrap().height, 1);
    }
}
