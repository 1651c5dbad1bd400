//! Thunk dispatcher (section 4.F): a registry mapping numeric call IDs to
//! native implementations with typed argument/return marshalling through
//! the canonical serialization.
//!
//! Grounded on the original `thunk_dispatcher.hpp` (a statically
//! registered table with a `genesis` flag per thunk) for the contract,
//! and on the teacher's `lazy_static!`-initialized process-wide tables
//! (`fvm/src/machine/manifest.rs`, `EMPTY_ARR_CID`) for the "global
//! mutable registry" redesign flag (section 9). Unlike those, this
//! dispatcher is generic over the backend type, so it can't itself be a
//! bare `lazy_static!` global — each [`crate::controller::Controller`]
//! owns exactly one [`ThunkDispatcher`], built once via
//! [`builtin::register_all`] before it serves its first request and
//! never mutated after, which plays the same "sealed singleton" role the
//! redesign flag calls for.

pub mod builtin;

use std::collections::HashMap;
use std::sync::RwLock;

use chain_types::{ChainError, ContractResult};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::backend::Backend;
use crate::context::ExecutionContext;

/// What a native thunk body hands back on the happy path, before it is
/// marshalled into a [`ContractResult`]. A `Reversion`/`Failure` is still
/// user-catchable (section 4.F: "Two status codes are surfaced to user
/// code"); an `Err` returned from the thunk body itself is a system
/// fault and is never caught by the contract.
pub enum ThunkOutcome<T> {
    Ok(T),
    Reversion(String),
    Failure(String),
}

type RawThunk<B> =
    Box<dyn Fn(&mut ExecutionContext<B>, &[u8]) -> anyhow::Result<ContractResult> + Send + Sync>;

struct ThunkEntry<B: Backend> {
    genesis: bool,
    call: RawThunk<B>,
}

/// Bytes charged against compute per byte of argument blob deserialized,
/// matching section 4.F's `deserialize_per_byte × arg_len` charge.
const DESERIALIZE_PER_BYTE: u64 = 1;

pub struct ThunkDispatcher<B: Backend> {
    thunks: RwLock<HashMap<u32, ThunkEntry<B>>>,
}

impl<B: Backend> Default for ThunkDispatcher<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B: Backend> ThunkDispatcher<B> {
    pub fn new() -> Self {
        Self {
            thunks: RwLock::new(HashMap::new()),
        }
    }

    /// Registers a native thunk under `id`. Thunk IDs are immutable for
    /// the life of the chain (section 4.F): a second `register` call for
    /// the same id during genesis wiring is a programmer error, not a
    /// recoverable one, so it panics rather than silently overwriting.
    pub fn register<Args, Return, F>(&self, id: u32, genesis: bool, native: F)
    where
        Args: DeserializeOwned,
        Return: Serialize,
        F: Fn(&mut ExecutionContext<B>, Args) -> anyhow::Result<ThunkOutcome<Return>>
            + Send
            + Sync
            + 'static,
    {
        let call: RawThunk<B> = Box::new(move |ctx, arg_bytes| {
            ctx.meter_mut()
                .use_compute(DESERIALIZE_PER_BYTE * arg_bytes.len() as u64)?;
            let args: Args = chain_types::encoding::canonical_deserialize(arg_bytes)?;
            match native(ctx, args)? {
                ThunkOutcome::Ok(ret) => {
                    let bytes = chain_types::encoding::canonical_serialize(&ret)?;
                    Ok(ContractResult::Ok(bytes))
                }
                ThunkOutcome::Reversion(msg) => Ok(ContractResult::Reversion(msg)),
                ThunkOutcome::Failure(msg) => Ok(ContractResult::Failure(msg)),
            }
        });
        let mut thunks = self.thunks.write().unwrap();
        if thunks.contains_key(&id) {
            panic!("thunk {id} registered twice");
        }
        thunks.insert(id, ThunkEntry { genesis, call });
    }

    pub fn contains(&self, id: u32) -> bool {
        self.thunks.read().unwrap().contains_key(&id)
    }

    /// Whether `id` is callable before any override exists (section 4.F,
    /// "genesis" flag / section 9, "precise set of genesis_thunks is a
    /// deploy-time decision").
    pub fn is_genesis_thunk(&self, id: u32) -> bool {
        self.thunks
            .read()
            .unwrap()
            .get(&id)
            .map(|t| t.genesis)
            .unwrap_or(false)
    }

    /// `call_thunk(id, ctx, arg_bytes)`. Returns `unknown_thunk` if `id`
    /// is not registered. The ABI's `(ret_ptr, ret_len)` buffer mechanics
    /// and `insufficient_return_buffer` failure live in the host bridge
    /// (module G), which copies `ContractResult::Ok`'s payload into the
    /// caller's buffer.
    pub fn call(
        &self,
        id: u32,
        ctx: &mut ExecutionContext<B>,
        arg_bytes: &[u8],
    ) -> anyhow::Result<ContractResult> {
        let thunks = self.thunks.read().unwrap();
        let entry = thunks
            .get(&id)
            .ok_or_else(|| anyhow::anyhow!(ChainError::UnknownThunk(id)))?;
        (entry.call)(ctx, arg_bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::delta::StateDelta;
    use crate::meter::ResourceMeter;
    use crate::node::{NodeKind, StateNode};
    use chain_types::Id;
    use serde::Deserialize;
    use std::sync::{Arc, RwLock as StdRwLock};

    fn root_ctx() -> ExecutionContext<MemoryBackend> {
        let backend = Arc::new(StdRwLock::new(MemoryBackend::new()));
        let delta = StateDelta::new_root(backend, Id::zero(), 0);
        let node = StateNode::new(delta, NodeKind::Finalized);
        ExecutionContext::new(node, crate::context::Intent::ReadOnly, ResourceMeter::compute_only(1_000))
    }

    #[derive(Serialize, Deserialize)]
    struct EchoArgs {
        value: u32,
    }

    #[test]
    fn registered_thunk_round_trips_typed_args() {
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        dispatcher.register(1, true, |_ctx, args: EchoArgs| {
            Ok(ThunkOutcome::Ok(args.value * 2))
        });
        let mut ctx = root_ctx();
        let arg_bytes = chain_types::encoding::canonical_serialize(&EchoArgs { value: 21 }).unwrap();
        let result = dispatcher.call(1, &mut ctx, &arg_bytes).unwrap();
        match result {
            ContractResult::Ok(bytes) => {
                let v: u32 = chain_types::encoding::canonical_deserialize(&bytes).unwrap();
                assert_eq!(v, 42);
            }
            other => panic!("expected Ok, got {other:?}"),
        }
    }

    #[test]
    fn unknown_thunk_id_is_an_error() {
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        let mut ctx = root_ctx();
        assert!(dispatcher.call(999, &mut ctx, &[]).is_err());
    }

    #[test]
    fn genesis_flag_is_tracked_per_thunk() {
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        dispatcher.register(1, true, |_ctx, _args: EchoArgs| Ok(ThunkOutcome::Ok(())));
        dispatcher.register(2, false, |_ctx, _args: EchoArgs| Ok(ThunkOutcome::Ok(())));
        assert!(dispatcher.is_genesis_thunk(1));
        assert!(!dispatcher.is_genesis_thunk(2));
    }
}
