//! Execution context (section 4.E): the per-invocation environment
//! threading a state node, a bounded call stack, a resource meter, a
//! chronicler, and a privilege mode through contract execution.
//!
//! Grounded on `fvm/src/kernel/default.rs`'s `DefaultKernel` (fields:
//! caller, actor_id, call_manager, blocks) and
//! `fvm/src/call_manager/default.rs` (call-stack depth tracking and gas
//! tracker ownership) — here generalized from the teacher's single actor
//! call stack to the spec's `(contract_id, privilege, entry_point, args,
//! return_buffer)` frame shape and its four-way intent flag.

use std::sync::Arc;

use chain_types::{Block, ChainError, Id, Transaction};

use crate::backend::Backend;
use crate::chronicle::Chronicler;
use crate::meter::ResourceMeter;
use crate::node::StateNode;

/// Which side of the host-call ABI a frame executes with (section 4.G,
/// "Privilege model").
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Privilege {
    Kernel,
    User,
}

/// Distinguishes the four ways a context can be entered (section 3,
/// glossary: "Intent"). Governs error handling and side-effect
/// persistence in the controller (section 4.I, section 7).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Intent {
    BlockApplication,
    BlockProposal,
    TransactionApplication,
    ReadOnly,
}

impl Intent {
    pub fn is_read_only(self) -> bool {
        matches!(self, Intent::ReadOnly)
    }
}

/// One entry of the call stack: `(contract_id, privilege, entry_point,
/// call_args, call_return_buffer)` (section 3, "Stack frame").
#[derive(Clone, Debug)]
pub struct StackFrame {
    pub contract_id: Id,
    pub privilege: Privilege,
    pub entry_point: u32,
    pub call_args: Vec<u8>,
    pub call_return_buffer: Vec<u8>,
}

impl StackFrame {
    pub fn new(contract_id: Id, privilege: Privilege, entry_point: u32, call_args: Vec<u8>) -> Self {
        Self {
            contract_id,
            privilege,
            entry_point,
            call_args,
            call_return_buffer: Vec::new(),
        }
    }
}

/// Default maximum call-stack depth; violating it fails with
/// `stack_overflow` before any state mutation (section 8, invariant 5).
pub const DEFAULT_MAX_STACK_DEPTH: usize = 256;

/// The per-invocation environment. Generic over the backend so it can
/// hold a live [`StateNode`] handle without an extra trait object.
pub struct ExecutionContext<B: Backend> {
    node: Option<Arc<StateNode<B>>>,
    stack: Vec<StackFrame>,
    max_stack_depth: usize,
    meter: ResourceMeter,
    chronicler: Chronicler,
    intent: Intent,
    read_only: bool,
    block: Option<Arc<Block>>,
    transaction: Option<Arc<Transaction>>,
    /// Advisory nonce hint from the mempool, consulted but never
    /// authoritative (section 4.I, "mempool-nonce hint").
    mempool_nonce_hint: Option<u64>,
}

impl<B: Backend> ExecutionContext<B> {
    pub fn new(node: Arc<StateNode<B>>, intent: Intent, meter: ResourceMeter) -> Self {
        let read_only = intent.is_read_only();
        Self {
            node: Some(node),
            stack: Vec::new(),
            max_stack_depth: DEFAULT_MAX_STACK_DEPTH,
            meter,
            chronicler: Chronicler::new(),
            intent,
            read_only,
            block: None,
            transaction: None,
            mempool_nonce_hint: None,
        }
    }

    pub fn with_max_stack_depth(mut self, depth: usize) -> Self {
        self.max_stack_depth = depth;
        self
    }

    pub fn with_block(mut self, block: Arc<Block>) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_transaction(mut self, transaction: Arc<Transaction>) -> Self {
        self.transaction = Some(transaction);
        self
    }

    pub fn with_mempool_nonce_hint(mut self, nonce: u64) -> Self {
        self.mempool_nonce_hint = Some(nonce);
        self
    }

    pub fn intent(&self) -> Intent {
        self.intent
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Future writes fail once set; there is no way back to writable
    /// from the same context (section 4.E).
    pub fn set_read_only(&mut self) {
        self.read_only = true;
    }

    pub fn node(&self) -> anyhow::Result<&Arc<StateNode<B>>> {
        self.node
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("context has no state node".into())))
    }

    /// Rebinds the context to a different node — e.g. entering the
    /// anonymous child created to roll back a failing transaction
    /// (section 4.I step 7). Invalidates any cache keyed off the
    /// previous node.
    pub fn set_state_node(&mut self, node: Arc<StateNode<B>>) {
        self.node = Some(node);
        self.reset_cache();
    }

    pub fn clear_state_node(&mut self) {
        self.node = None;
    }

    /// A hook for future in-context caches invalidated on node change;
    /// currently a no-op since the context carries none, but kept as an
    /// explicit call site so callers don't need to know that.
    pub fn reset_cache(&mut self) {}

    pub fn block(&self) -> Option<&Arc<Block>> {
        self.block.as_ref()
    }

    pub fn transaction(&self) -> Option<&Arc<Transaction>> {
        self.transaction.as_ref()
    }

    pub fn mempool_nonce_hint(&self) -> Option<u64> {
        self.mempool_nonce_hint
    }

    pub fn meter(&self) -> &ResourceMeter {
        &self.meter
    }

    pub fn meter_mut(&mut self) -> &mut ResourceMeter {
        &mut self.meter
    }

    pub fn chronicler(&self) -> &Chronicler {
        &self.chronicler
    }

    pub fn chronicler_mut(&mut self) -> &mut Chronicler {
        &mut self.chronicler
    }

    pub fn stack_depth(&self) -> usize {
        self.stack.len()
    }

    pub fn top_frame(&self) -> Option<&StackFrame> {
        self.stack.last()
    }

    pub fn top_frame_mut(&mut self) -> Option<&mut StackFrame> {
        self.stack.last_mut()
    }

    /// Pushes a new frame. Fails with `stack_overflow` before mutating
    /// anything if the stack is already at its maximum depth (section 8,
    /// invariant 5).
    pub fn push_frame(&mut self, frame: StackFrame) -> Result<(), ChainError> {
        if self.stack.len() >= self.max_stack_depth {
            return Err(ChainError::StackOverflow);
        }
        self.stack.push(frame);
        Ok(())
    }

    pub fn pop_frame(&mut self) -> Option<StackFrame> {
        self.stack.pop()
    }

    /// The calling frame's contract id and privilege; fails if fewer
    /// than two frames are on the stack (the current frame has no
    /// caller).
    pub fn get_caller(&self) -> Result<(Id, Privilege), ChainError> {
        if self.stack.len() < 2 {
            return Err(ChainError::ForkDbInvariant("no caller: stack depth < 2".into()));
        }
        let caller = &self.stack[self.stack.len() - 2];
        Ok((caller.contract_id, caller.privilege))
    }
}
