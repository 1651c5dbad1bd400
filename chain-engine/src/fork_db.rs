//! Fork database (section 4.C): the multi-indexed collection of state
//! nodes that enforces tree shape and fork choice.
//!
//! Grounded on `database_impl` in the original `state_db.cpp`
//! (`create_writable_node`/`finalize_node`/`commit_node`/`discard_node`
//! and fork-heads bookkeeping) for the operation set, and on the
//! teacher's `HashMap`/`Cid`-keyed collections (`fvm/src/state_tree.rs`,
//! `fvm/src/history_map.rs`) for the Rust-idiomatic indexing structure in
//! place of the original's boost multi-index container (section 9,
//! "cyclic state-node <-> database references": nodes live in one owned
//! collection here, and handles returned to callers are non-owning
//! `Arc` clones).

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};

use chain_types::{BlockHeader, ChainError, Id};

use crate::backend::{Backend, Batch};
use crate::delta::{StateDelta, Write};
use crate::node::{NodeKind, StateNode};

/// Applies a delta's accumulated `(key, value_or_tombstone)` writes to
/// `backend` as a single atomic batch. Shared by genesis installation
/// (`ForkDb::open`/`reset`) and by `commit_node`'s ancestor-chain squash.
fn apply_writes_to_backend<B: Backend>(
    backend: &mut B,
    writes: &std::collections::BTreeMap<Vec<u8>, Write>,
) -> anyhow::Result<()> {
    let mut batch = backend.start_batch();
    for (k, v) in writes.iter() {
        match v {
            Some(value) => batch.put(k, value),
            None => batch.erase(k),
        }
    }
    backend.end_batch(batch)
}

/// A node's fields relevant to fork choice, passed to a [`ForkComparator`]
/// without exposing the node itself (section 4.C: "Comparator purity: no
/// side effects, deterministic over node fields only").
#[derive(Clone, Copy, Debug)]
pub struct NodeSummary {
    pub id: Id,
    pub revision: u64,
    pub timestamp: u64,
}

/// Decides whether a newly finalized candidate node should replace the
/// current head.
pub trait ForkComparator: Send + Sync {
    fn candidate_wins(&self, candidate: &NodeSummary, current_head: &NodeSummary) -> bool;
}

/// First-finalized-at-a-greater-depth wins; head revision is monotone
/// non-decreasing (section 4.C invariant list).
pub struct FifoComparator;

impl ForkComparator for FifoComparator {
    fn candidate_wins(&self, candidate: &NodeSummary, current_head: &NodeSummary) -> bool {
        candidate.revision > current_head.revision
    }
}

/// Earliest block timestamp wins regardless of depth; ties break on
/// ascending id bytes. The spec leaves the exact tie-break
/// implementation-defined beyond "earlier timestamp, then lexicographic
/// id" (section 9, Open Questions) — that is the rule implemented here.
pub struct BlockTimeComparator;

impl ForkComparator for BlockTimeComparator {
    fn candidate_wins(&self, candidate: &NodeSummary, current_head: &NodeSummary) -> bool {
        match candidate.timestamp.cmp(&current_head.timestamp) {
            std::cmp::Ordering::Less => true,
            std::cmp::Ordering::Greater => false,
            std::cmp::Ordering::Equal => candidate.id.to_bytes() < current_head.id.to_bytes(),
        }
    }
}

/// Proof-of-burn tie-break. The reference tiebreak beyond "earlier
/// timestamp wins" is not specified (section 9, Open Questions); this
/// implementation reuses the block-time rule until a canonical PoB
/// comparator is specified.
pub struct ProofOfBurnComparator;

impl ForkComparator for ProofOfBurnComparator {
    fn candidate_wins(&self, candidate: &NodeSummary, current_head: &NodeSummary) -> bool {
        BlockTimeComparator.candidate_wins(candidate, current_head)
    }
}

/// Which comparator to install, matching `--fork-algorithm` (section 6).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ForkAlgorithm {
    Fifo,
    BlockTime,
    ProofOfBurn,
}

impl ForkAlgorithm {
    pub fn comparator(self) -> Box<dyn ForkComparator> {
        match self {
            ForkAlgorithm::Fifo => Box::new(FifoComparator),
            ForkAlgorithm::BlockTime => Box::new(BlockTimeComparator),
            ForkAlgorithm::ProofOfBurn => Box::new(ProofOfBurnComparator),
        }
    }
}

struct Inner<B: Backend> {
    nodes: HashMap<Id, Arc<StateNode<B>>>,
    children: HashMap<Id, Vec<Id>>,
    root_id: Id,
    head_id: Id,
    fork_heads: HashSet<Id>,
}

/// The fork-tree database. Internally a single [`RwLock`] stands in for
/// the original's separate shared/unique lock (section 5): reads and
/// `create_writable_node` take a read guard, `finalize_node`/
/// `commit_node`/`discard_node`/`reset` take a write guard.
pub struct ForkDb<B: Backend> {
    backend: Arc<RwLock<B>>,
    inner: RwLock<Inner<B>>,
    comparator: Box<dyn ForkComparator>,
}

impl<B: Backend> ForkDb<B> {
    fn summary(node: &Arc<StateNode<B>>) -> NodeSummary {
        NodeSummary {
            id: node.id(),
            revision: node.revision(),
            timestamp: node.block_header().map(|h| h.timestamp).unwrap_or(0),
        }
    }

    /// Opens the database over `backend`. If the backend has no recorded
    /// root id yet, `genesis` is invoked with a writable, empty root node
    /// to install the genesis bundle; the writes are then squashed into
    /// `backend` and the root is sealed. Otherwise the root is
    /// reconstructed already-sealed at the backend's persisted merkle
    /// root (section 4.A).
    pub fn open(
        backend: Arc<RwLock<B>>,
        genesis: impl FnOnce(&Arc<StateNode<B>>) -> anyhow::Result<()>,
        comparator: Box<dyn ForkComparator>,
    ) -> anyhow::Result<Self> {
        let metadata = backend.read().unwrap().metadata()?;
        let is_genesis = metadata.id.is_none();
        let root_id = metadata.id.unwrap_or_else(Id::zero);

        let root_node = if is_genesis {
            let root_delta = StateDelta::new_root(backend.clone(), root_id, metadata.revision);
            let root_node = StateNode::new(root_delta, NodeKind::Writable);
            genesis(&root_node)?;
            {
                let mut backend_guard = backend.write().unwrap();
                apply_writes_to_backend(&mut *backend_guard, &root_node.delta().local_writes())?;
            }
            root_node.mark_finalized()?;
            let merkle_root = root_node.merkle_root()?;
            let mut backend_guard = backend.write().unwrap();
            let mut meta = backend_guard.metadata()?;
            meta.id = Some(root_id);
            meta.merkle_root = Some(merkle_root);
            backend_guard.set_metadata(&meta)?;
            root_node
        } else {
            let merkle_root = metadata.merkle_root.unwrap_or_else(Id::zero);
            let root_delta = StateDelta::new_root_sealed(backend.clone(), root_id, metadata.revision, merkle_root);
            StateNode::new(root_delta, NodeKind::Finalized)
        };

        let mut nodes = HashMap::new();
        nodes.insert(root_id, root_node.clone());
        let mut fork_heads = HashSet::new();
        fork_heads.insert(root_id);

        let db = Self {
            backend,
            inner: RwLock::new(Inner {
                nodes,
                children: HashMap::new(),
                root_id,
                head_id: root_id,
                fork_heads,
            }),
            comparator,
        };

        Ok(db)
    }

    pub fn close(&self) -> anyhow::Result<()> {
        self.backend.write().unwrap().flush()
    }

    /// Wipes the backend's keyspace and metadata, then reopens genesis.
    /// Used by `--reset` (section 6).
    pub fn reset(
        &self,
        genesis: impl FnOnce(&Arc<StateNode<B>>) -> anyhow::Result<()>,
    ) -> anyhow::Result<()> {
        {
            let mut backend = self.backend.write().unwrap();
            let keys: Vec<Vec<u8>> = backend
                .iter_forward(&[])?
                .map(|(k, _)| k)
                .collect();
            for key in keys {
                backend.erase(&key)?;
            }
            backend.set_metadata(&Default::default())?;
        }
        let root_delta = StateDelta::new_root(self.backend.clone(), Id::zero(), 0);
        let root_node = StateNode::new(root_delta, NodeKind::Writable);
        genesis(&root_node)?;
        {
            let mut backend = self.backend.write().unwrap();
            apply_writes_to_backend(&mut *backend, &root_node.delta().local_writes())?;
        }
        root_node.mark_finalized()?;
        let merkle_root = root_node.merkle_root()?;
        {
            let mut backend = self.backend.write().unwrap();
            let mut meta = backend.metadata()?;
            meta.id = Some(Id::zero());
            meta.merkle_root = Some(merkle_root);
            backend.set_metadata(&meta)?;
        }
        let mut inner = self.inner.write().unwrap();
        inner.nodes.clear();
        inner.nodes.insert(Id::zero(), root_node);
        inner.children.clear();
        inner.root_id = Id::zero();
        inner.head_id = Id::zero();
        inner.fork_heads.clear();
        inner.fork_heads.insert(Id::zero());
        Ok(())
    }

    pub fn create_writable_node(
        &self,
        parent_id: Id,
        new_id: Id,
        header: Option<BlockHeader>,
    ) -> Option<Arc<StateNode<B>>> {
        let mut inner = self.inner.write().unwrap();
        if inner.nodes.contains_key(&new_id) {
            return None;
        }
        let parent = inner.nodes.get(&parent_id)?.clone();
        if !parent.is_finalized() {
            return None;
        }
        let delta = StateDelta::new_child(parent.delta().clone(), new_id, header);
        let node = StateNode::new(delta, NodeKind::Writable);
        inner.nodes.insert(new_id, node.clone());
        inner.children.entry(parent_id).or_default().push(new_id);
        Some(node)
    }

    pub fn finalize_node(&self, id: Id) -> anyhow::Result<()> {
        let mut inner = self.inner.write().unwrap();
        let node = inner
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("unknown node".into())))?;
        node.mark_finalized()?;

        let parent_id = node.parent_id();
        if inner.fork_heads.remove(&parent_id) {
            // parent now has a finalized child, it is no longer a leaf.
        }
        inner.fork_heads.insert(id);

        let candidate = Self::summary(&node);
        let current_head = inner
            .nodes
            .get(&inner.head_id)
            .map(Self::summary)
            .unwrap_or(candidate);
        if self.comparator.candidate_wins(&candidate, &current_head) {
            inner.head_id = id;
        }
        Ok(())
    }

    fn chain_from_root_exclusive(
        &self,
        inner: &Inner<B>,
        id: Id,
    ) -> anyhow::Result<Vec<Arc<StateNode<B>>>> {
        let mut chain = Vec::new();
        let mut cur = inner
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("unknown node".into())))?;
        loop {
            if cur.id() == inner.root_id {
                break;
            }
            chain.push(cur.clone());
            let parent_id = cur.parent_id();
            cur = inner.nodes.get(&parent_id).cloned().ok_or_else(|| {
                anyhow::anyhow!(ChainError::ForkDbInvariant(
                    "node is not a descendant of the current root".into()
                ))
            })?;
        }
        chain.reverse();
        Ok(chain)
    }

    fn discard_subtree_locked(&self, inner: &mut Inner<B>, id: Id) {
        let mut queue = vec![id];
        while let Some(cur) = queue.pop() {
            if let Some(children) = inner.children.remove(&cur) {
                queue.extend(children);
            }
            inner.nodes.remove(&cur);
            inner.fork_heads.remove(&cur);
        }
    }

    /// `commit_node(X)`: `X` becomes the new root; the chain from the old
    /// root down to `X` is squashed into the backend in order, and every
    /// branch hanging off that chain that is not `X` itself is discarded
    /// (section 4.C, invariant 3: "committing a node discards all
    /// non-ancestor siblings of its ancestor chain").
    pub fn commit_node(&self, id: Id) -> anyhow::Result<()> {
        let mut inner = self.inner.write().unwrap();
        if id == inner.root_id {
            return Ok(());
        }
        let chain = self.chain_from_root_exclusive(&inner, id)?;
        let old_root_id = inner.root_id;

        let new_root = chain.last().expect("chain is non-empty since id != root");
        let merkle_root = new_root.merkle_root()?;
        {
            let mut backend = self.backend.write().unwrap();
            for node in &chain {
                let writes = node.delta().local_writes();
                apply_writes_to_backend(&mut *backend, &writes)?;
            }
            let mut meta = backend.metadata()?;
            meta.id = Some(id);
            meta.revision = new_root.revision();
            meta.merkle_root = Some(merkle_root);
            if let Some(header) = new_root.block_header() {
                meta.block_header = Some(chain_types::encoding::canonical_serialize(header)?);
            }
            backend.set_metadata(&meta)?;
        }
        // The chain from the old root down to `id` is now fully persisted;
        // re-root `id`'s delta directly onto the backend in place so every
        // existing `Arc` to it (including any descendant's parent pointer)
        // sees the squashed ancestor chain drop away instead of staying
        // pinned in memory, and `get_root()` is backend-backed again.
        new_root.delta().reroot_onto_backend(self.backend.clone());

        let mut cursor = old_root_id;
        for node in &chain {
            let next_id = node.id();
            if let Some(children) = inner.children.get(&cursor).cloned() {
                for child_id in children {
                    if child_id != next_id {
                        self.discard_subtree_locked(&mut inner, child_id);
                    }
                }
            }
            cursor = next_id;
        }

        inner.nodes.remove(&old_root_id);
        inner.children.remove(&old_root_id);
        inner.fork_heads.remove(&old_root_id);
        for node in &chain {
            if node.id() != id {
                inner.nodes.remove(&node.id());
                inner.children.remove(&node.id());
                inner.fork_heads.remove(&node.id());
            }
        }
        inner.root_id = id;
        Ok(())
    }

    /// `discard_node(id, whitelist)`: refuses to discard the head or
    /// root, then BFS-discards the subtree rooted at `id` except ids in
    /// `whitelist`. If the parent becomes a finalized leaf, it rejoins
    /// the fork-heads set.
    pub fn discard_node(&self, id: Id, whitelist: &HashSet<Id>) -> anyhow::Result<()> {
        let mut inner = self.inner.write().unwrap();
        if id == inner.root_id || id == inner.head_id {
            anyhow::bail!(ChainError::CannotDiscardHeadOrRoot);
        }
        let node = inner
            .nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!(ChainError::ForkDbInvariant("unknown node".into())))?;
        let parent_id = node.parent_id();

        if whitelist.contains(&id) {
            anyhow::bail!(ChainError::ForkDbInvariant(
                "cannot discard a whitelisted node".into()
            ));
        }

        let mut queue = vec![id];
        while let Some(cur) = queue.pop() {
            if whitelist.contains(&cur) {
                continue;
            }
            if let Some(children) = inner.children.remove(&cur) {
                queue.extend(children);
            }
            inner.nodes.remove(&cur);
            inner.fork_heads.remove(&cur);
        }

        if let Some(children) = inner.children.get_mut(&parent_id) {
            children.retain(|c| inner.nodes.contains_key(c));
        }

        let parent_is_leaf = inner
            .children
            .get(&parent_id)
            .map(|c| c.is_empty())
            .unwrap_or(true);
        if parent_is_leaf {
            if let Some(parent) = inner.nodes.get(&parent_id) {
                if parent.is_finalized() {
                    inner.fork_heads.insert(parent_id);
                }
            }
        }
        Ok(())
    }

    pub fn get_node(&self, id: Id) -> Option<Arc<StateNode<B>>> {
        self.inner.read().unwrap().nodes.get(&id).cloned()
    }

    /// Walks the ancestor chain of `descendant_id` looking for the node
    /// at `revision`.
    pub fn get_node_at_revision(&self, revision: u64, descendant_id: Id) -> Option<Arc<StateNode<B>>> {
        let inner = self.inner.read().unwrap();
        let mut cur = inner.nodes.get(&descendant_id).cloned()?;
        loop {
            if cur.revision() == revision {
                return Some(cur);
            }
            if cur.revision() < revision || cur.id() == inner.root_id {
                return None;
            }
            cur = inner.nodes.get(&cur.parent_id())?.clone();
        }
    }

    pub fn get_head(&self) -> Option<Arc<StateNode<B>>> {
        let inner = self.inner.read().unwrap();
        inner.nodes.get(&inner.head_id).cloned()
    }

    pub fn get_root(&self) -> Arc<StateNode<B>> {
        let inner = self.inner.read().unwrap();
        inner.nodes.get(&inner.root_id).cloned().expect("root always present")
    }

    pub fn get_fork_heads(&self) -> Vec<Arc<StateNode<B>>> {
        let inner = self.inner.read().unwrap();
        inner
            .fork_heads
            .iter()
            .filter_map(|id| inner.nodes.get(id).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MemoryBackend;
    use chain_types::ObjectSpace;

    fn header(previous: Id, height: u64, timestamp: u64) -> BlockHeader {
        BlockHeader {
            previous_id: previous,
            height,
            timestamp,
            previous_state_merkle_root: Id::zero(),
            transaction_merkle_root: Id::zero(),
        }
    }

    fn open_empty() -> ForkDb<MemoryBackend> {
        let backend = Arc::new(RwLock::new(MemoryBackend::new()));
        ForkDb::open(
            backend,
            |root| {
                root.put(&ObjectSpace::system(0), b"k", b"v".to_vec())?;
                Ok(())
            },
            ForkAlgorithm::Fifo.comparator(),
        )
        .unwrap()
    }

    #[test]
    fn genesis_bundle_is_visible_on_root_after_open() {
        let db = open_empty();
        let root = db.get_root();
        assert_eq!(
            root.get(&ObjectSpace::system(0), b"k").unwrap(),
            Some(b"v".to_vec())
        );
    }

    #[test]
    fn straight_chain_advances_head_under_fifo() {
        let db = open_empty();
        let root_id = db.get_root().id();
        let mut prev = root_id;
        for height in 1..=10u64 {
            let id = Id::hash(format!("b{height}").as_bytes());
            let node = db
                .create_writable_node(prev, id, Some(header(prev, height, height * 10)))
                .unwrap();
            node.put(&ObjectSpace::system(0), b"height", height.to_be_bytes().to_vec())
                .unwrap();
            db.finalize_node(id).unwrap();
            prev = id;
        }
        assert_eq!(db.get_head().unwrap().revision(), 10);
    }

    #[test]
    fn commit_squashes_into_backend_and_prunes_history() {
        let db = open_empty();
        let root_id = db.get_root().id();
        let b1 = Id::hash(b"b1");
        let n1 = db
            .create_writable_node(root_id, b1, Some(header(root_id, 1, 10)))
            .unwrap();
        n1.put(&ObjectSpace::system(0), b"k", b"v1".to_vec()).unwrap();
        db.finalize_node(b1).unwrap();

        let b2 = Id::hash(b"b2");
        let n2 = db.create_writable_node(b1, b2, Some(header(b1, 2, 20))).unwrap();
        n2.put(&ObjectSpace::system(0), b"k", b"v2".to_vec()).unwrap();
        db.finalize_node(b2).unwrap();

        db.commit_node(b2).unwrap();
        assert_eq!(db.get_root().id(), b2);
        assert_eq!(
            db.get_root().get(&ObjectSpace::system(0), b"k").unwrap(),
            Some(b"v2".to_vec())
        );
        assert!(db.get_node(b1).is_none());
        assert!(db.get_node(root_id).is_none());
    }

    #[test]
    fn discard_refuses_head_and_root() {
        let db = open_empty();
        let root_id = db.get_root().id();
        let b1 = Id::hash(b"b1");
        db.create_writable_node(root_id, b1, Some(header(root_id, 1, 10)))
            .unwrap();
        db.finalize_node(b1).unwrap();
        assert!(db.discard_node(root_id, &HashSet::new()).is_err());
        assert!(db.discard_node(b1, &HashSet::new()).is_err());
    }

    #[test]
    fn discarding_a_losing_fork_restores_parent_as_fork_head() {
        let db = open_empty();
        let root_id = db.get_root().id();
        let b1 = Id::hash(b"b1");
        db.create_writable_node(root_id, b1, Some(header(root_id, 1, 10)))
            .unwrap();
        db.finalize_node(b1).unwrap();

        let b2a = Id::hash(b"b2a");
        db.create_writable_node(b1, b2a, Some(header(b1, 2, 20))).unwrap();
        db.finalize_node(b2a).unwrap();

        let b2b = Id::hash(b"b2b");
        db.create_writable_node(b1, b2b, Some(header(b1, 2, 30))).unwrap();
        db.finalize_node(b2b).unwrap();

        assert_eq!(db.get_fork_heads().len(), 2);
        db.discard_node(b2b, &HashSet::new()).unwrap();
        assert_eq!(db.get_fork_heads().len(), 1);
    }
}
