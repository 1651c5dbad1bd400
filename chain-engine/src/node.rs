//! State node (section 3, "State node"): the handle the rest of the
//! engine operates through. Wraps a [`StateDelta`] with the bookkeeping
//! that tells callers whether it may still be mutated.
//!
//! Grounded on the original `state_node_impl` (writable flag gating
//! `put_object`/`remove_object`) and on section 9's note to replace the
//! abstract-node class hierarchy with a trait describing the object-store
//! contract each node kind implements.

use std::sync::Arc;

use chain_types::{BlockHeader, ChainError, Id, ObjectSpace};

use crate::backend::Backend;
use crate::dbkey;
use crate::delta::StateDelta;
use crate::merge_iter::MergeView;

/// Whether a node may still be mutated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Pre-finalization; the only live handle expected to mutate it.
    Writable,
    /// Immutable, may still be discarded if not yet committed.
    Finalized,
    /// A throwaway child for speculative execution.
    Anonymous,
}

/// A handle onto one point in the fork tree's state.
pub struct StateNode<B: Backend> {
    delta: Arc<StateDelta<B>>,
    kind: std::sync::RwLock<NodeKind>,
}

impl<B: Backend> StateNode<B> {
    pub fn new(delta: Arc<StateDelta<B>>, kind: NodeKind) -> Arc<Self> {
        Arc::new(Self {
            delta,
            kind: std::sync::RwLock::new(kind),
        })
    }

    pub fn id(&self) -> Id {
        self.delta.id()
    }

    pub fn parent_id(&self) -> Id {
        self.delta.parent_id()
    }

    pub fn revision(&self) -> u64 {
        self.delta.revision()
    }

    pub fn kind(&self) -> NodeKind {
        *self.kind.read().unwrap()
    }

    pub fn is_finalized(&self) -> bool {
        matches!(self.kind(), NodeKind::Finalized)
    }

    pub fn is_writable(&self) -> bool {
        matches!(self.kind(), NodeKind::Writable | NodeKind::Anonymous)
    }

    pub fn block_header(&self) -> Option<&BlockHeader> {
        self.delta.block_header()
    }

    pub fn delta(&self) -> &Arc<StateDelta<B>> {
        &self.delta
    }

    pub fn merkle_root(&self) -> anyhow::Result<Id> {
        self.delta.merkle_root()
    }

    /// Marks this node finalized; an error is a programmer error (double
    /// finalize), not a spec-level failure, so we `Result` it rather than
    /// panic.
    pub fn mark_finalized(&self) -> anyhow::Result<()> {
        let mut kind = self.kind.write().unwrap();
        if *kind == NodeKind::Finalized {
            anyhow::bail!("node already finalized");
        }
        self.delta.finalize()?;
        *kind = NodeKind::Finalized;
        Ok(())
    }

    /// The chain of deltas from the root delta (exclusive... inclusive,
    /// see below) up to and including this node's delta, ordered oldest
    /// to newest. Used to build a [`MergeView`] or to squash a range into
    /// the backend on commit.
    pub fn delta_chain(&self) -> Vec<Arc<StateDelta<B>>> {
        let mut chain = vec![self.delta.clone()];
        let mut cur = self.delta.clone();
        while let Some(parent) = cur.parent_delta() {
            chain.push(parent.clone());
            cur = parent;
        }
        chain.reverse();
        chain
    }

    pub fn get(&self, space: &ObjectSpace, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        self.delta.find(&dbkey::encode(space, key))
    }

    pub fn put(&self, space: &ObjectSpace, key: &[u8], value: Vec<u8>) -> anyhow::Result<()> {
        if self.is_finalized() {
            anyhow::bail!(ChainError::NodeFinalized);
        }
        self.delta.put(&dbkey::encode(space, key), value)
    }

    pub fn remove(&self, space: &ObjectSpace, key: &[u8]) -> anyhow::Result<()> {
        if self.is_finalized() {
            anyhow::bail!(ChainError::NodeFinalized);
        }
        self.delta.erase(&dbkey::encode(space, key))
    }

    pub fn next(&self, space: &ObjectSpace, key: &[u8]) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>> {
        let chain = self.delta_chain();
        let view = MergeView::build(&chain, space);
        let prefix = dbkey::space_prefix(space);
        let full_key = dbkey::encode(space, key);
        Ok(view
            .next_after(&full_key)
            .map(|(k, v)| (k[prefix.len()..].to_vec(), v.to_vec())))
    }

    pub fn prev(&self, space: &ObjectSpace, key: &[u8]) -> anyhow::Result<Option<(Vec<u8>, Vec<u8>)>> {
        let chain = self.delta_chain();
        let view = MergeView::build(&chain, space);
        let prefix = dbkey::space_prefix(space);
        let full_key = dbkey::encode(space, key);
        Ok(view
            .prev_before(&full_key)
            .map(|(k, v)| (k[prefix.len()..].to_vec(), v.to_vec())))
    }

    /// Squashes an anonymous node's writes into its writable parent,
    /// consuming this handle (section 3, "Anonymous node").
    pub fn commit(self: Arc<Self>) -> anyhow::Result<()> {
        if self.kind() != NodeKind::Anonymous {
            anyhow::bail!("only anonymous nodes may be committed into their parent");
        }
        self.delta.squash_into_parent()
    }

    /// Abandons an anonymous node's writes; dropping the handle is
    /// sufficient since nothing else references an unfinalized anonymous
    /// delta, but this makes the intent explicit at call sites.
    pub fn reset(self: Arc<Self>) {
        drop(self);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use std::sync::RwLock;

    fn space() -> ObjectSpace {
        ObjectSpace::system(3)
    }

    #[test]
    fn anonymous_commit_squashes_into_parent() {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let root_delta = StateDelta::new_root(backend, Id::zero(), 0);
        let root = StateNode::new(root_delta.clone(), NodeKind::Finalized);
        let parent_delta = StateDelta::new_child(root_delta, Id::hash(b"p"), None);
        let parent = StateNode::new(parent_delta.clone(), NodeKind::Writable);
        parent.put(&space(), b"k", b"v0".to_vec()).unwrap();

        let anon_delta = StateDelta::new_child(parent_delta, Id::hash(b"anon"), None);
        let anon = StateNode::new(anon_delta, NodeKind::Anonymous);
        anon.put(&space(), b"k", b"v1".to_vec()).unwrap();
        anon.commit().unwrap();

        assert_eq!(parent.get(&space(), b"k").unwrap(), Some(b"v1".to_vec()));
        let _ = root;
    }

    #[test]
    fn next_and_prev_see_merged_chain() {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let root_delta = StateDelta::new_root(backend, Id::zero(), 0);
        let child_delta = StateDelta::new_child(root_delta, Id::hash(b"c"), None);
        let node = StateNode::new(child_delta, NodeKind::Writable);
        node.put(&space(), b"a", b"1".to_vec()).unwrap();
        node.put(&space(), b"b", b"2".to_vec()).unwrap();
        node.put(&space(), b"c", b"3".to_vec()).unwrap();

        let (k, v) = node.next(&space(), b"a").unwrap().unwrap();
        assert_eq!((k, v), (b"b".to_vec(), b"2".to_vec()));
        let (k, v) = node.prev(&space(), b"c").unwrap().unwrap();
        assert_eq!((k, v), (b"b".to_vec(), b"2".to_vec()));
    }

    #[test]
    fn writes_to_finalized_node_fail() {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        let root_delta = StateDelta::new_root(backend, Id::zero(), 0);
        let child_delta = StateDelta::new_child(root_delta, Id::hash(b"c"), None);
        let node = StateNode::new(child_delta, NodeKind::Writable);
        node.mark_finalized().unwrap();
        assert!(node.put(&space(), b"k", b"v".to_vec()).is_err());
    }
}
