//! System-call override table (section 4.H): a persisted mapping from
//! call ID to `(contract_id, entry_point)`, consulted by the host bridge
//! before falling through to the thunk dispatcher.
//!
//! Grounded on the original override-table description (section 4.H) and
//! on the teacher's pattern of reading/writing actor state through the
//! state tree with an explicit space, rather than a side-channel
//! (`CallManager::get_actor`/`set_actor` in `fvm/src/call_manager/default.rs`).

use chain_types::{Id, ObjectSpace};
use serde::{Deserialize, Serialize};

use crate::backend::Backend;
use crate::node::StateNode;

/// A single override entry: the contract and entry point that now serve
/// calls to the overridden id.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Override {
    pub contract_id: Id,
    pub entry_point: u32,
}

/// Call IDs that may never be overridden, enforced here as an explicit
/// registry rather than by id parity (section 4.G: "certain call IDs are
/// marked non-overridable (the table enforces this by ID-parity or an
/// explicit registry)"); an explicit set is easier to extend and to read
/// than a parity rule with no protocol meaning attached.
pub fn is_overridable(call_id: u32) -> bool {
    !matches!(call_id, call_id::SET_SYSTEM_CALL)
}

/// Well-known reserved call IDs referenced directly by the engine.
pub mod call_id {
    pub const SET_SYSTEM_CALL: u32 = 0;
    pub const PRINTS: u32 = 1;
    pub const APPLY_BLOCK: u32 = 2;
    pub const APPLY_TRANSACTION: u32 = 3;
}

fn override_key(call_id: u32) -> Vec<u8> {
    call_id.to_be_bytes().to_vec()
}

/// Looks up the override installed for `call_id` at `node`, if any.
pub fn get_override<B: Backend>(node: &StateNode<B>, call_id: u32) -> anyhow::Result<Option<Override>> {
    let space = ObjectSpace::system(chain_types::object::reserved_space::SYSCALL_OVERRIDES);
    match node.get(&space, &override_key(call_id))? {
        Some(bytes) => Ok(Some(chain_types::encoding::canonical_deserialize(&bytes)?)),
        None => Ok(None),
    }
}

/// Installs an override for `call_id`, effective for the remainder of
/// the current block and every block built on this node (section 4.H).
pub fn set_override<B: Backend>(
    node: &StateNode<B>,
    call_id: u32,
    target: Override,
) -> anyhow::Result<()> {
    let space = ObjectSpace::system(chain_types::object::reserved_space::SYSCALL_OVERRIDES);
    let bytes = chain_types::encoding::canonical_serialize(&target)?;
    node.put(&space, &override_key(call_id), bytes)
}

/// Removes the override for `call_id`, restoring thunk dispatch.
pub fn clear_override<B: Backend>(node: &StateNode<B>, call_id: u32) -> anyhow::Result<()> {
    let space = ObjectSpace::system(chain_types::object::reserved_space::SYSCALL_OVERRIDES);
    node.remove(&space, &override_key(call_id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use crate::delta::StateDelta;
    use crate::node::NodeKind;
    use std::sync::{Arc, RwLock};

    fn writable_node() -> Arc<StateNode<MemoryBackend>> {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let root = StateDelta::new_root(backend, Id::zero(), 0);
        let child = StateDelta::new_child(root, Id::hash(b"c"), None);
        StateNode::new(child, NodeKind::Writable)
    }

    #[test]
    fn roundtrips_through_state() {
        let node = writable_node();
        assert!(get_override(&node, call_id::PRINTS).unwrap().is_none());
        let target = Override {
            contract_id: Id::hash(b"override-contract"),
            entry_point: 7,
        };
        set_override(&node, call_id::PRINTS, target.clone()).unwrap();
        assert_eq!(get_override(&node, call_id::PRINTS).unwrap(), Some(target));
        clear_override(&node, call_id::PRINTS).unwrap();
        assert!(get_override(&node, call_id::PRINTS).unwrap().is_none());
    }

    #[test]
    fn set_system_call_itself_is_not_overridable() {
        assert!(!is_overridable(call_id::SET_SYSTEM_CALL));
        assert!(is_overridable(call_id::PRINTS));
    }
}
