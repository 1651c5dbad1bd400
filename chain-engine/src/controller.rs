//! Controller (section 4.I): validates incoming blocks and transactions,
//! drives execution, updates the fork tree, publishes events, and serves
//! read RPCs.
//!
//! Grounded on the original `controller.cpp` apply-block algorithm
//! (section 4.I, steps reproduced in the method docs below verbatim) and
//! on the teacher's `Executor`/`ApplyRet`/`ApplyFailure` shape
//! (`fvm/src/executor/mod.rs`) for "validate, execute, produce a receipt
//! or a failure description."
//!
//! The apply-block/apply-transaction control flow itself is implemented
//! directly as Rust methods here rather than as thunks routed back
//! through [`crate::host::HostDispatcher::invoke_system_call`]; see
//! `DESIGN.md` for why that boundary was drawn this way. Contract-level
//! work (`Operation::ContractCall`) does go through the host dispatcher,
//! so overrides and the thunk table still govern everything below the
//! block/transaction pipeline itself.

use std::sync::Arc;

use chain_types::object::reserved_space;
use chain_types::{
    Block, BlockReceipt, ChainError, ContractResult, Id, ObjectSpace, Operation, Transaction,
    TransactionReceipt,
};

use crate::backend::Backend;
use crate::context::{ExecutionContext, Intent, Privilege, StackFrame};
use crate::delta::StateDelta;
use crate::externs::{BlockStore, MessageBus, Mempool};
use crate::fork_db::ForkDb;
use crate::host::HostDispatcher;
use crate::meter::ResourceMeter;
use crate::node::{NodeKind, StateNode};
use crate::overrides::Override;

/// Head pointer returned by `get_head_info` (section 4.K).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadInfo {
    pub id: Id,
    pub height: u64,
}

/// Tunables that don't belong to any single module: how deep behind the
/// head a block must be before it is treated as irreversible, the clock
/// skew tolerance from section 4.I step 6, and the read-only compute
/// budget from `--read-compute-bandwidth-limit` (section 6).
///
/// The spec's step 8 advances LIB by committing "the deepest ancestor
/// with revision <= reported last_irreversible_block", but a report of
/// that value is not part of the modeled [`chain_types::BlockHeader`]
/// (no on-chain finality-voting contract is in scope here). `finality_depth`
/// stands in for that report as a fixed confirmation depth — see
/// `DESIGN.md`'s Open Question decisions.
#[derive(Clone, Copy, Debug)]
pub struct ControllerConfig {
    pub finality_depth: u64,
    pub max_future_timestamp_secs: u64,
    pub read_compute_bandwidth_limit: u64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            finality_depth: 60,
            max_future_timestamp_secs: 5,
            read_compute_bandwidth_limit: 10_000_000,
        }
    }
}

pub struct Controller<B: Backend> {
    fork_db: ForkDb<B>,
    host: HostDispatcher<B>,
    block_store: Box<dyn BlockStore>,
    mempool: Box<dyn Mempool>,
    message_bus: Box<dyn MessageBus>,
    config: ControllerConfig,
}

impl<B: Backend> Controller<B> {
    pub fn new(
        fork_db: ForkDb<B>,
        host: HostDispatcher<B>,
        block_store: Box<dyn BlockStore>,
        mempool: Box<dyn Mempool>,
        message_bus: Box<dyn MessageBus>,
        config: ControllerConfig,
    ) -> Self {
        Self {
            fork_db,
            host,
            block_store,
            mempool,
            message_bus,
            config,
        }
    }

    pub fn fork_db(&self) -> &ForkDb<B> {
        &self.fork_db
    }

    fn publish(&self, subject: &str, payload: &[u8]) {
        if let Err(e) = self.message_bus.publish(subject, payload) {
            log::warn!("message bus publish to {subject} failed (non-fatal): {e}");
        }
    }

    /// Section 4.I, steps 1-10. `intent` must be `block_application` or
    /// `block_proposal`; under proposal intent, any transaction failure
    /// aborts the whole block rather than being recorded and tolerated.
    pub fn apply_block(&self, block: &Block, now: u64, intent: Intent) -> anyhow::Result<BlockReceipt> {
        debug_assert!(matches!(intent, Intent::BlockApplication | Intent::BlockProposal));

        // Step 1: structural validation.
        if !block.verify_id()? {
            anyhow::bail!(ChainError::MalformedId("block id does not match its content".into()));
        }
        if block.signature.is_empty() {
            anyhow::bail!(ChainError::MissingField("signature"));
        }

        // Step 2: already-known block is a no-op success.
        if let Some(existing) = self.fork_db.get_node(block.id) {
            let mut receipt = BlockReceipt::empty(block.id, block.header.height);
            receipt.state_merkle_root = existing.merkle_root()?;
            return Ok(receipt);
        }

        // Step 3: locate the parent, or fail/no-op per the rules below.
        let parent = match self.fork_db.get_node(block.header.previous_id) {
            Some(parent) => parent,
            None => {
                let root = self.fork_db.get_root();
                if block.header.height < root.revision() {
                    anyhow::bail!(ChainError::PreIrreversibilityBlock);
                }
                if block.id == root.id() {
                    return Ok(BlockReceipt::empty(block.id, block.header.height));
                }
                anyhow::bail!(ChainError::UnknownPreviousBlock(block.header.previous_id.to_string()));
            }
        };

        // Step 4: allocate the writable candidate node.
        let node = self
            .fork_db
            .create_writable_node(parent.id(), block.id, Some(block.header.clone()))
            .ok_or_else(|| {
                anyhow::anyhow!(ChainError::ForkDbInvariant(
                    "writable node already exists or parent is not finalized".into()
                ))
            })?;

        // Step 5 + 6: read-only assertions against the parent.
        if let Err(e) = self.validate_header(block, &parent, now) {
            self.fork_db.discard_node(block.id, &Default::default()).ok();
            return Err(e);
        }

        // Step 7: kernel-privilege application of the block's transactions.
        let mut receipt = BlockReceipt::empty(block.id, block.header.height);
        let outcome = self.apply_transactions(&node, block, intent, &mut receipt);

        match outcome {
            Ok(()) => {
                // Step 8: finalize, record the root, advance LIB.
                // finalize_node() marks the node finalized and updates
                // fork-heads/head-comparison bookkeeping together.
                self.fork_db.finalize_node(block.id)?;
                receipt.state_merkle_root = node.merkle_root()?;

                let lib_revision = node.revision().saturating_sub(self.config.finality_depth);
                if let Some(lib_node) = self.fork_db.get_node_at_revision(lib_revision, block.id) {
                    if let Err(e) = self.fork_db.commit_node(lib_node.id()) {
                        log::warn!("failed to advance LIB to {}: {e}", lib_node.id());
                    } else {
                        self.publish("koinos.block.irreversible", &lib_node.id().to_bytes());
                    }
                }

                // Step 9: best-effort broadcast.
                if let Err(e) = self.block_store.add_block(block) {
                    log::warn!("block store add_block failed (non-fatal): {e}");
                }
                let head_id = self.fork_db.get_head().map(|h| h.id());
                let is_head = head_id == Some(block.id);
                self.publish(
                    "koinos.block.accept",
                    &format!("{{\"id\":\"{}\",\"head\":{}}}", block.id, is_head).into_bytes(),
                );
                if self.fork_db.get_fork_heads().len() > 1 {
                    self.publish("koinos.block.forks", &block.id.to_bytes());
                }
                for event in &receipt.events {
                    self.publish(&event.subject(), &event.data);
                }

                Ok(receipt)
            }
            Err(e) => {
                // Step 10: on any other error, discard the not-yet-finalized node.
                self.fork_db.discard_node(block.id, &Default::default()).ok();
                Err(e)
            }
        }
    }

    /// Entry point for a block a local producer is proposing rather than
    /// one received from the network: same algorithm, stricter intent.
    pub fn propose_block(&self, block: &Block, now: u64) -> anyhow::Result<BlockReceipt> {
        self.apply_block(block, now, Intent::BlockProposal)
    }

    fn validate_header(&self, block: &Block, parent: &Arc<StateNode<B>>, now: u64) -> anyhow::Result<()> {
        let parent_height = parent.block_header().map(|h| h.height).unwrap_or(0);
        let parent_timestamp = parent.block_header().map(|h| h.timestamp).unwrap_or(0);

        if block.header.previous_id.is_zero() != (block.header.height == 1) {
            anyhow::bail!(ChainError::UnexpectedHeight {
                expected: 1,
                got: block.header.height,
            });
        }
        if block.header.height != parent_height + 1 {
            anyhow::bail!(ChainError::UnexpectedHeight {
                expected: parent_height + 1,
                got: block.header.height,
            });
        }
        if block.header.timestamp > now + self.config.max_future_timestamp_secs {
            anyhow::bail!(ChainError::TimestampOutOfBounds {
                timestamp: block.header.timestamp,
                now,
            });
        }
        if block.header.timestamp <= parent_timestamp {
            anyhow::bail!(ChainError::TimestampOutOfBounds {
                timestamp: block.header.timestamp,
                now: parent_timestamp,
            });
        }
        if block.header.previous_state_merkle_root != parent.merkle_root()? {
            anyhow::bail!(ChainError::StateMerkleMismatch);
        }
        Ok(())
    }

    fn apply_transactions(
        &self,
        node: &Arc<StateNode<B>>,
        block: &Block,
        intent: Intent,
        receipt: &mut BlockReceipt,
    ) -> anyhow::Result<()> {
        for (index, tx) in block.transactions.iter().enumerate() {
            let index = index as u32;
            match self.apply_transaction_within(node, tx, intent) {
                Ok(tx_receipt) => {
                    receipt.rc_used += tx_receipt.rc_used;
                    receipt.disk_storage_used += tx_receipt.disk_storage_used;
                    receipt.network_bandwidth_used += tx_receipt.network_bandwidth_used;
                    receipt.compute_used += tx_receipt.compute_used;
                    receipt.logs.extend(tx_receipt.logs.clone());
                    receipt.events.extend(tx_receipt.events.clone());
                    receipt.transaction_receipts.push(tx_receipt);
                }
                Err(e) => {
                    if intent == Intent::BlockProposal {
                        return Err(e);
                    }
                    log::warn!("transaction {} failed during block application: {e}", tx.id);
                    self.publish("koinos.transaction.fail", &tx.id.to_bytes());
                    receipt.failed_transaction_indices.push(index);
                    receipt.transaction_receipts.push(TransactionReceipt {
                        id: tx.id,
                        rc_used: 0,
                        rc_limit: tx.header.rc_limit,
                        disk_storage_used: 0,
                        network_bandwidth_used: 0,
                        compute_used: 0,
                        logs: Vec::new(),
                        events: Vec::new(),
                        failed: true,
                    });
                }
            }
        }
        Ok(())
    }

    /// Runs `tx` inside an anonymous child of `block_node`. On success the
    /// anonymous node is squashed into `block_node` (`commit`); on any
    /// error it is simply dropped (`reset`), leaving `block_node`
    /// untouched (section 4.I step 7).
    fn apply_transaction_within(
        &self,
        block_node: &Arc<StateNode<B>>,
        tx: &Transaction,
        intent: Intent,
    ) -> anyhow::Result<TransactionReceipt> {
        if !tx.verify_id()? {
            anyhow::bail!(ChainError::MalformedId("transaction id does not match its content".into()));
        }

        let anon_delta = StateDelta::new_child(block_node.delta().clone(), tx.id, None);
        let anon_node = StateNode::new(anon_delta, NodeKind::Anonymous);

        let limit = tx.header.rc_limit;
        let mut ctx = ExecutionContext::new(anon_node.clone(), intent, ResourceMeter::new(limit, limit, limit));
        ctx.push_frame(StackFrame::new(Id::zero(), Privilege::Kernel, 0, Vec::new()))?;

        for operation in &tx.operations {
            self.apply_operation(&mut ctx, operation)?;
        }

        let logs = ctx.chronicler().logs();
        let events = ctx.chronicler().events();
        let disk_storage_used = ctx.meter().disk_used();
        let network_bandwidth_used = ctx.meter().network_used();
        let compute_used = ctx.meter().compute_used();
        let rc_used = disk_storage_used + network_bandwidth_used + compute_used;
        anon_node.commit()?;

        Ok(TransactionReceipt {
            id: tx.id,
            rc_used,
            rc_limit: tx.header.rc_limit,
            disk_storage_used,
            network_bandwidth_used,
            compute_used,
            logs,
            events,
            failed: false,
        })
    }

    fn apply_operation(&self, ctx: &mut ExecutionContext<B>, operation: &Operation) -> anyhow::Result<()> {
        match operation {
            Operation::ContractCall {
                contract_id,
                entry_point,
                args,
            } => {
                ctx.push_frame(StackFrame::new(*contract_id, Privilege::User, *entry_point, args.clone()))?;
                let result = self.host.invoke_contract(ctx, *contract_id, *entry_point, args);
                ctx.pop_frame();
                match result? {
                    ContractResult::Ok(_) => Ok(()),
                    ContractResult::Reversion(msg) | ContractResult::Failure(msg) => {
                        anyhow::bail!(ChainError::AssertionFailure(msg))
                    }
                    ContractResult::SystemError(e) => Err(e.into()),
                }
            }
            Operation::SetSystemCall {
                call_id,
                contract_id,
                entry_point,
            } => self.host.set_system_call(
                ctx,
                *call_id,
                Override {
                    contract_id: *contract_id,
                    entry_point: *entry_point,
                },
            ),
            Operation::UploadContract { contract_id, bytecode } => {
                let space = ObjectSpace::system(reserved_space::CONTRACT_BYTECODE);
                ctx.node()?.put(&space, &contract_id.to_bytes(), bytecode.clone())
            }
        }
    }

    /// Mirrors [`Self::apply_block`] for a single transaction submitted
    /// outside a block (section 4.I, "Transaction submission"): an
    /// anonymous child of head, mempool pre-checks treated as advisory.
    pub fn submit_transaction(&self, tx: &Transaction) -> anyhow::Result<TransactionReceipt> {
        if !tx.verify_id()? {
            anyhow::bail!(ChainError::MalformedId("transaction id does not match its content".into()));
        }
        if !self
            .mempool
            .check_pending_account_resources(&tx.header.payer, tx.header.rc_limit)?
        {
            anyhow::bail!(ChainError::InsufficientRc {
                limit: tx.header.rc_limit,
                required: tx.header.rc_limit,
            });
        }
        if !self.mempool.check_account_nonce(&tx.header.payer, tx.header.nonce)? {
            anyhow::bail!(ChainError::InvalidNonce {
                expected: self.mempool.get_pending_nonce(&tx.header.payer)?,
                got: tx.header.nonce,
            });
        }

        let head = self
            .fork_db
            .get_head()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("no head".into())))?;
        let receipt = match self.apply_transaction_within(&head, tx, Intent::TransactionApplication) {
            Ok(receipt) => receipt,
            Err(e) => {
                self.publish("koinos.transaction.fail", &tx.id.to_bytes());
                return Err(e);
            }
        };
        self.publish("koinos.transaction.accept", &tx.id.to_bytes());
        Ok(receipt)
    }

    /// Section 4.I, "Read-contract": an anonymous child of head, capped
    /// compute budget, user privilege.
    pub fn read_contract(
        &self,
        contract_id: Id,
        entry_point: u32,
        args: &[u8],
    ) -> anyhow::Result<(Vec<u8>, Vec<String>)> {
        let head = self
            .fork_db
            .get_head()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("no head".into())))?;
        let anon_delta = StateDelta::new_child(head.delta().clone(), Id::hash(contract_id.to_bytes().as_slice()), None);
        let anon_node = StateNode::new(anon_delta, NodeKind::Anonymous);
        let mut ctx = ExecutionContext::new(
            anon_node,
            Intent::ReadOnly,
            ResourceMeter::compute_only(self.config.read_compute_bandwidth_limit),
        );
        ctx.push_frame(StackFrame::new(Id::zero(), Privilege::User, 0, Vec::new()))?;
        let result = self.host.invoke_contract(&mut ctx, contract_id, entry_point, args)?;
        let logs = ctx.chronicler().logs();
        match result {
            ContractResult::Ok(bytes) => Ok((bytes, logs)),
            ContractResult::Reversion(msg) | ContractResult::Failure(msg) => {
                anyhow::bail!(ChainError::AssertionFailure(msg))
            }
            ContractResult::SystemError(e) => Err(e.into()),
        }
    }

    /// Routes a syscall directly, under kernel privilege, at the current
    /// head — used by the RPC surface's `invoke_system_call` method.
    pub fn invoke_system_call(&self, call_id: u32, arg_bytes: &[u8], ret_len: u32) -> anyhow::Result<ContractResult> {
        let head = self
            .fork_db
            .get_head()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("no head".into())))?;
        let anon_delta = StateDelta::new_child(head.delta().clone(), Id::hash(arg_bytes), None);
        let anon_node = StateNode::new(anon_delta, NodeKind::Anonymous);
        let mut ctx = ExecutionContext::new(
            anon_node,
            Intent::ReadOnly,
            ResourceMeter::compute_only(self.config.read_compute_bandwidth_limit),
        );
        ctx.push_frame(StackFrame::new(Id::zero(), Privilege::Kernel, 0, Vec::new()))?;
        self.host.invoke_system_call(&mut ctx, call_id, ret_len, arg_bytes)
    }

    pub fn get_head_info(&self) -> anyhow::Result<HeadInfo> {
        let head = self
            .fork_db
            .get_head()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("no head".into())))?;
        Ok(HeadInfo {
            id: head.id(),
            height: head.revision(),
        })
    }

    pub fn get_chain_id(&self) -> anyhow::Result<Option<Id>> {
        let root = self.fork_db.get_root();
        let bytes = root.get(
            &ObjectSpace::system(reserved_space::CHAIN_METADATA),
            chain_types::object::reserved_key::CHAIN_ID,
        )?;
        Ok(bytes.and_then(|b| Id::from_bytes(&b).ok()))
    }

    pub fn get_fork_heads(&self) -> Vec<Id> {
        self.fork_db.get_fork_heads().iter().map(|n| n.id()).collect()
    }

    pub fn get_account_nonce(&self, account: &[u8]) -> anyhow::Result<u64> {
        self.mempool.get_pending_nonce(account)
    }

    pub fn get_resource_limits(&self) -> ControllerConfig {
        self.config
    }

    /// Catches up from the block store before serving live traffic
    /// (used by [`crate::indexer::Indexer`]); exposed here since the
    /// indexer only ever calls back into `apply_block`.
    pub fn block_store(&self) -> &dyn BlockStore {
        self.block_store.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::externs::{EmptyBlockStore, MessageBus, NullMessageBus, PermissiveMempool};
    use crate::fork_db::ForkAlgorithm;
    use crate::host::VirtualMachine;
    use crate::thunks::{builtin, ThunkDispatcher};
    use chain_types::{BlockHeader, TransactionHeader};
    use std::sync::{Mutex, RwLock};

    struct NoopVm;
    impl VirtualMachine<MemoryBackend> for NoopVm {
        fn invoke(
            &self,
            _ctx: &mut ExecutionContext<MemoryBackend>,
            _host: &HostDispatcher<MemoryBackend>,
            _contract_id: Id,
            _entry_point: u32,
            _args: &[u8],
        ) -> anyhow::Result<ContractResult> {
            Ok(ContractResult::Ok(Vec::new()))
        }
    }

    fn test_controller() -> Controller<MemoryBackend> {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let fork_db = ForkDb::open(backend, |_root| Ok(()), ForkAlgorithm::Fifo.comparator()).unwrap();
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        builtin::register_all(&dispatcher);
        let host = HostDispatcher::new(dispatcher, Box::new(NoopVm));
        Controller::new(
            fork_db,
            host,
            Box::new(EmptyBlockStore),
            Box::new(PermissiveMempool),
            Box::new(NullMessageBus),
            ControllerConfig::default(),
        )
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
    fn applies_first_block_on_top_of_genesis() {
        let controller = test_controller();
        let root = controller.fork_db().get_root();
        let b1 = block(root.id(), 1, 100, root.merkle_root().unwrap());
        let receipt = controller.apply_block(&b1, 1000, Intent::BlockApplication).unwrap();
        assert_eq!(receipt.id, b1.id);
        assert_eq!(controller.get_head_info().unwrap().height, 1);
    }

    #[test]
    fn rejects_block_with_wrong_previous_state_root() {
        let controller = test_controller();
        let root = controller.fork_db().get_root();
        let b1 = block(root.id(), 1, 100, Id::hash(b"not-the-real-root"));
        assert!(controller.apply_block(&b1, 1000, Intent::BlockApplication).is_err());
        assert!(controller.fork_db().get_node(b1.id).is_none());
    }

    #[test]
    fn unknown_previous_block_is_rejected() {
        let controller = test_controller();
        let b1 = block(Id::hash(b"nonexistent"), 1, 100, Id::zero());
        assert!(controller.apply_block(&b1, 1000, Intent::BlockApplication).is_err());
    }

    #[test]
    fn resubmitting_an_already_applied_block_is_a_no_op_success() {
        let controller = test_controller();
        let root = controller.fork_db().get_root();
        let b1 = block(root.id(), 1, 100, root.merkle_root().unwrap());
        controller.apply_block(&b1, 1000, Intent::BlockApplication).unwrap();
        assert!(controller.apply_block(&b1, 1000, Intent::BlockApplication).is_ok());
    }

    #[test]
    fn submit_transaction_runs_against_head() {
        let controller = test_controller();
        let root = controller.fork_db().get_root();
        let b1 = block(root.id(), 1, 100, root.merkle_root().unwrap());
        controller.apply_block(&b1, 1000, Intent::BlockApplication).unwrap();

        let header = TransactionHeader {
            payer: vec![1],
            payee: vec![2],
            nonce: 0,
            rc_limit: 1_000,
            operation_merkle_root: Id::zero(),
        };
        let mut tx = Transaction {
            header,
            operations: vec![Operation::UploadContract {
                contract_id: Id::hash(b"contract"),
                bytecode: vec![0xde, 0xad],
            }],
            signatures: vec![vec![1]],
            id: Id::zero(),
        };
        tx.id = tx.compute_id().unwrap();
        let receipt = controller.submit_transaction(&tx).unwrap();
        assert!(!receipt.failed);
    }

    struct FailingVm;
    impl VirtualMachine<MemoryBackend> for FailingVm {
        fn invoke(
            &self,
            _ctx: &mut ExecutionContext<MemoryBackend>,
            _host: &HostDispatcher<MemoryBackend>,
            _contract_id: Id,
            _entry_point: u32,
            _args: &[u8],
        ) -> anyhow::Result<ContractResult> {
            Ok(ContractResult::Failure("boom".into()))
        }
    }

    struct RecordingMessageBus(Arc<Mutex<Vec<String>>>);
    impl MessageBus for RecordingMessageBus {
        fn publish(&self, subject: &str, _payload: &[u8]) -> anyhow::Result<()> {
            self.0.lock().unwrap().push(subject.to_string());
            Ok(())
        }
    }

    struct PrintingVm;
    impl VirtualMachine<MemoryBackend> for PrintingVm {
        fn invoke(
            &self,
            ctx: &mut ExecutionContext<MemoryBackend>,
            host: &HostDispatcher<MemoryBackend>,
            _contract_id: Id,
            _entry_point: u32,
            _args: &[u8],
        ) -> anyhow::Result<ContractResult> {
            let arg = chain_types::encoding::canonical_serialize(&"hi".to_string())?;
            host.invoke_system_call(ctx, crate::overrides::call_id::PRINTS, 64, &arg)
        }
    }

    #[test]
    fn block_receipt_aggregates_per_dimension_usage_from_its_transactions() {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let fork_db = ForkDb::open(backend, |_root| Ok(()), ForkAlgorithm::Fifo.comparator()).unwrap();
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        builtin::register_all(&dispatcher);
        let host = HostDispatcher::new(dispatcher, Box::new(PrintingVm));
        let controller = Controller::new(
            fork_db,
            host,
            Box::new(EmptyBlockStore),
            Box::new(PermissiveMempool),
            Box::new(NullMessageBus),
            ControllerConfig::default(),
        );

        let root = controller.fork_db().get_root();
        let mut b1 = block(root.id(), 1, 100, root.merkle_root().unwrap());
        let header = TransactionHeader {
            payer: vec![1],
            payee: vec![2],
            nonce: 0,
            rc_limit: 1_000,
            operation_merkle_root: Id::zero(),
        };
        let mut tx = Transaction {
            header,
            operations: vec![Operation::ContractCall {
                contract_id: Id::hash(b"contract"),
                entry_point: 0,
                args: Vec::new(),
            }],
            signatures: vec![vec![1]],
            id: Id::zero(),
        };
        tx.id = tx.compute_id().unwrap();
        b1.transactions.push(tx);
        b1.id = b1.compute_id().unwrap();

        let receipt = controller.apply_block(&b1, 1000, Intent::BlockApplication).unwrap();
        let tx_receipt = &receipt.transaction_receipts[0];
        assert!(tx_receipt.compute_used > 0);
        assert_eq!(receipt.compute_used, tx_receipt.compute_used);
        assert_eq!(receipt.disk_storage_used, tx_receipt.disk_storage_used);
        assert_eq!(receipt.network_bandwidth_used, tx_receipt.network_bandwidth_used);
        assert_eq!(receipt.rc_used, tx_receipt.rc_used);
    }

    #[test]
    fn submit_transaction_failure_publishes_transaction_fail() {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let fork_db = ForkDb::open(backend, |_root| Ok(()), ForkAlgorithm::Fifo.comparator()).unwrap();
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        builtin::register_all(&dispatcher);
        let host = HostDispatcher::new(dispatcher, Box::new(FailingVm));
        let subjects = Arc::new(Mutex::new(Vec::new()));
        let controller = Controller::new(
            fork_db,
            host,
            Box::new(EmptyBlockStore),
            Box::new(PermissiveMempool),
            Box::new(RecordingMessageBus(subjects.clone())),
            ControllerConfig::default(),
        );

        let header = TransactionHeader {
            payer: vec![1],
            payee: vec![2],
            nonce: 0,
            rc_limit: 1_000,
            operation_merkle_root: Id::zero(),
        };
        let mut tx = Transaction {
            header,
            operations: vec![Operation::ContractCall {
                contract_id: Id::hash(b"contract"),
                entry_point: 0,
                args: Vec::new(),
            }],
            signatures: vec![vec![1]],
            id: Id::zero(),
        };
        tx.id = tx.compute_id().unwrap();

        assert!(controller.submit_transaction(&tx).is_err());
        assert!(subjects.lock().unwrap().contains(&"koinos.transaction.fail".to_string()));
    }
}
