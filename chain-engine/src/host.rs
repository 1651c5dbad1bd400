//! Host API / WASM bridge (section 4.G): the single numeric entry point
//! a contract's virtual machine is given, and the abstract VM trait that
//! stands in for the out-of-scope WASM runtime.
//!
//! Grounded on `fvm/src/syscalls/mod.rs` and `syscalls/linker.rs`
//! (`InvocationData`, the `Syscall`/`Abort` traits binding individual
//! Rust functions into a `wasmtime::Linker`), generalized here from "bind
//! N functions into the linker" to "one dispatch function taking `(id,
//! ptr, len, ...)`" as the spec requires, and from a concrete
//! `wasmtime::Engine` to an abstract [`VirtualMachine`] trait — the same
//! shape as the teacher treating its blockstore/externs as injected
//! associated types on `Machine`, just applied to the VM itself since no
//! WASM runtime crate is linked into this engine (out of scope).

use chain_types::{ChainError, ContractResult};

use crate::backend::Backend;
use crate::context::ExecutionContext;
use crate::overrides::{self, call_id};
use crate::thunks::ThunkDispatcher;

/// An abstract contract virtual machine. The engine never links a
/// concrete WASM runtime; whatever embeds this crate supplies one.
/// `invoke` runs `entry_point` of the deployed contract named by
/// `contract_id` against `args`, calling back into the host for system
/// calls via the [`HostDispatcher`] it is handed.
pub trait VirtualMachine<B: Backend>: Send + Sync {
    fn invoke(
        &self,
        ctx: &mut ExecutionContext<B>,
        host: &HostDispatcher<B>,
        contract_id: chain_types::Id,
        entry_point: u32,
        args: &[u8],
    ) -> anyhow::Result<ContractResult>;
}

/// A [`VirtualMachine`] for binaries that link no WASM runtime at all:
/// every contract invocation fails with a system error rather than
/// panicking, since the engine still needs to serve block/transaction
/// validation, state queries, and thunk calls with no contracts deployed
/// (mirrors [`crate::externs::NullMessageBus`]/`EmptyBlockStore` for the
/// same "out of scope, stand in a safe default" shape, section 1).
pub struct NullVm;

impl<B: Backend> VirtualMachine<B> for NullVm {
    fn invoke(
        &self,
        _ctx: &mut ExecutionContext<B>,
        _host: &HostDispatcher<B>,
        _contract_id: chain_types::Id,
        _entry_point: u32,
        _args: &[u8],
    ) -> anyhow::Result<ContractResult> {
        Ok(ContractResult::SystemError(ChainError::Other(anyhow::anyhow!(
            "no WASM backend is linked into this binary"
        ))))
    }
}

/// Routes a numeric system call to either the override table or the
/// thunk dispatcher (section 4.G routing rule). This is the one host
/// function the VM is given: `invoke_system_call(id, ret_ptr, ret_len,
/// arg_ptr, arg_len)`. The pointer/length pairs are modeled as plain
/// byte slices and a returned buffer here; translating to/from a WASM
/// linear memory's raw pointers is the VM implementation's job, matching
/// how `fvm`'s `linker.rs` adapts typed Rust calls to wasmtime's raw ABI
/// at the binding layer rather than inside the dispatch logic itself.
pub struct HostDispatcher<B: Backend> {
    thunks: ThunkDispatcher<B>,
    vm: Box<dyn VirtualMachine<B>>,
}

impl<B: Backend> HostDispatcher<B> {
    pub fn new(thunks: ThunkDispatcher<B>, vm: Box<dyn VirtualMachine<B>>) -> Self {
        Self { thunks, vm }
    }

    pub fn thunks(&self) -> &ThunkDispatcher<B> {
        &self.thunks
    }

    /// Invokes `contract_id`'s `entry_point` directly against `args`,
    /// bypassing the numeric call-id/override table entirely. Used when
    /// applying an `Operation::ContractCall` (section 4.I), where the
    /// caller already knows which contract it means to run rather than
    /// looking one up by call id.
    pub fn invoke_contract(
        &self,
        ctx: &mut ExecutionContext<B>,
        contract_id: chain_types::Id,
        entry_point: u32,
        args: &[u8],
    ) -> anyhow::Result<ContractResult> {
        self.vm.invoke(ctx, self, contract_id, entry_point, args)
    }

    /// `invoke_system_call(id, ret_len, arg_bytes)`. Returns the call's
    /// outcome and, on `ContractResult::Ok`, the produced bytes; the
    /// caller compares their length against `ret_len` and fails with
    /// `insufficient_return_buffer` if they don't fit (section 4.F).
    pub fn invoke_system_call(
        &self,
        ctx: &mut ExecutionContext<B>,
        id: u32,
        ret_len: u32,
        arg_bytes: &[u8],
    ) -> anyhow::Result<ContractResult> {
        let result = if let Some(target) = overrides::get_override(ctx.node()?, id)? {
            // The override contract inherits kernel privilege only if the
            // caller invoking this syscall was itself kernel (section 4.G).
            let caller_privilege = ctx
                .top_frame()
                .map(|f| f.privilege)
                .unwrap_or(crate::context::Privilege::User);
            let frame = crate::context::StackFrame::new(
                target.contract_id,
                caller_privilege,
                target.entry_point,
                arg_bytes.to_vec(),
            );
            ctx.push_frame(frame)?;
            let outcome = self
                .vm
                .invoke(ctx, self, target.contract_id, target.entry_point, arg_bytes);
            ctx.pop_frame();
            outcome?
        } else {
            self.thunks.call(id, ctx, arg_bytes)?
        };

        if let ContractResult::Ok(bytes) = &result {
            if bytes.len() as u32 > ret_len {
                return Err(anyhow::anyhow!(ChainError::InsufficientReturnBuffer {
                    needed: bytes.len() as u32,
                    available: ret_len,
                }));
            }
        }
        Ok(result)
    }

    /// `set_system_call(id, target)` (section 4.H): itself a thunk call
    /// under the hood (call id [`call_id::SET_SYSTEM_CALL`]), but exposed
    /// directly here since it requires kernel privilege and writes to the
    /// override table rather than routing through user-facing dispatch.
    pub fn set_system_call(
        &self,
        ctx: &mut ExecutionContext<B>,
        id: u32,
        target: overrides::Override,
    ) -> anyhow::Result<()> {
        if !overrides::is_overridable(id) {
            anyhow::bail!(ChainError::InsufficientPrivilege);
        }
        let (_, privilege) = ctx
            .top_frame()
            .map(|f| (f.contract_id, f.privilege))
            .ok_or(ChainError::InsufficientPrivilege)?;
        if privilege != crate::context::Privilege::Kernel {
            anyhow::bail!(ChainError::InsufficientPrivilege);
        }
        overrides::set_override(ctx.node()?, id, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::context::{Intent, Privilege, StackFrame};
    use crate::delta::StateDelta;
    use crate::meter::ResourceMeter;
    use crate::node::{NodeKind, StateNode};
    use crate::thunks::{ThunkDispatcher, ThunkOutcome};
    use chain_types::Id;
    use std::sync::{Arc, RwLock};

    struct NeverCalledVm;
    impl VirtualMachine<MemoryBackend> for NeverCalledVm {
        fn invoke(
            &self,
            _ctx: &mut ExecutionContext<MemoryBackend>,
            _host: &HostDispatcher<MemoryBackend>,
            _contract_id: Id,
            _entry_point: u32,
            _args: &[u8],
        ) -> anyhow::Result<ContractResult> {
            panic!("vm should not be invoked when no override is installed");
        }
    }

    fn writable_ctx() -> ExecutionContext<MemoryBackend> {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let root = StateDelta::new_root(backend, Id::zero(), 0);
        let child = StateDelta::new_child(root, Id::hash(b"b1"), None);
        let node = StateNode::new(child, NodeKind::Writable);
        ExecutionContext::new(node, Intent::TransactionApplication, ResourceMeter::new(1000, 1000, 1000))
    }

    #[test]
    fn routes_to_thunk_when_no_override_installed() {
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        dispatcher.register(overrides::call_id::PRINTS, true, |ctx, msg: String| {
            ctx.chronicler_mut().log(None, msg);
            Ok(ThunkOutcome::Ok(()))
        });
        let host = HostDispatcher::new(dispatcher, Box::new(NeverCalledVm));
        let mut ctx = writable_ctx();
        let arg = chain_types::encoding::canonical_serialize(&"hello".to_string()).unwrap();
        let result = host
            .invoke_system_call(&mut ctx, overrides::call_id::PRINTS, 64, &arg)
            .unwrap();
        assert!(matches!(result, ContractResult::Ok(_)));
        assert_eq!(ctx.chronicler().logs(), vec!["hello".to_string()]);
    }

    #[test]
    fn set_system_call_requires_kernel_privilege() {
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        let host = HostDispatcher::new(dispatcher, Box::new(NeverCalledVm));
        let mut ctx = writable_ctx();
        ctx.push_frame(StackFrame::new(Id::zero(), Privilege::User, 0, vec![]))
            .unwrap();
        let target = overrides::Override {
            contract_id: Id::hash(b"c"),
            entry_point: 0,
        };
        assert!(host
            .set_system_call(&mut ctx, overrides::call_id::PRINTS, target)
            .is_err());
    }
}
