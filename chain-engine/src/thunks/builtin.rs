//! Built-in native thunks installed into every fresh [`super::ThunkDispatcher`].
//!
//! `prints` is registered directly here since it is simple enough not to
//! need its own module; `apply_block`/`apply_transaction` are call IDs
//! reserved for the controller's pipeline (section 4.I) but their bodies
//! live in [`crate::controller`] rather than as thunks here — see
//! `DESIGN.md` for why that boundary was drawn this way.

use crate::backend::Backend;
use crate::overrides::call_id;
use crate::thunks::{ThunkDispatcher, ThunkOutcome};

/// Populates `dispatcher` with the engine's built-in thunks. Called once
/// per [`crate::controller::Controller`] at startup, before it serves its
/// first request (section 9: "sealed before the controller accepts its
/// first request").
pub fn register_all<B: Backend + 'static>(dispatcher: &ThunkDispatcher<B>) {
    dispatcher.register(call_id::PRINTS, true, |ctx, message: String| {
        ctx.chronicler_mut().log(None, message);
        Ok(ThunkOutcome::Ok(()))
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::context::{ExecutionContext, Intent};
    use crate::delta::StateDelta;
    use crate::meter::ResourceMeter;
    use crate::node::{NodeKind, StateNode};
    use chain_types::{ContractResult, Id};
    use std::sync::{Arc, RwLock};

    #[test]
    fn prints_appends_to_the_chronicler() {
        let dispatcher: ThunkDispatcher<MemoryBackend> = ThunkDispatcher::new();
        register_all(&dispatcher);

        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let delta = StateDelta::new_root(backend, Id::zero(), 0);
        let node = StateNode::new(delta, NodeKind::Finalized);
        let mut ctx = ExecutionContext::new(node, Intent::TransactionApplication, ResourceMeter::new(0, 0, 1_000));

        let arg = chain_types::encoding::canonical_serialize(&"Hello".to_string()).unwrap();
        let result = dispatcher.call(call_id::PRINTS, &mut ctx, &arg).unwrap();
        assert!(matches!(result, ContractResult::Ok(_)));
        assert_eq!(ctx.chronicler().logs(), vec!["Hello".to_string()]);
    }
}
