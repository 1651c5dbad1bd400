//! State delta (section 4.B): an immutable-once-finalized overlay over a
//! parent delta (or, for the root delta, directly over the
//! [`crate::backend::Backend`]).
//!
//! Grounded on the teacher's `StateTree`/`StateSnapshots` layering
//! (`fvm/src/state_tree.rs`, which stacks `HashMap` overlays keyed by
//! actor id) generalized from actor state to the spec's raw
//! `(space, key) → value` object model, and on the original
//! `state_delta.hpp` for the squash/commit semantics.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use chain_types::{BlockHeader, Id};

use crate::backend::Backend;

/// A single write recorded in a delta: either a value, or a tombstone
/// recording that the parent's value has been erased.
pub type Write = Option<Vec<u8>>;

enum Parent<B: Backend> {
    Root(Arc<RwLock<B>>),
    Child(Arc<StateDelta<B>>),
}

/// An immutable-once-finalized overlay. Child deltas hold a strong
/// reference to their parent; the root delta holds a strong reference to
/// the backend.
///
/// `parent`/`parent_id` are wrapped for interior mutability so a delta
/// can be re-rooted directly onto the backend in place (see
/// [`Self::reroot_onto_backend`]) without disturbing any descendant that
/// already holds an `Arc` to it.
pub struct StateDelta<B: Backend> {
    parent: RwLock<Parent<B>>,
    id: Id,
    parent_id: RwLock<Id>,
    revision: u64,
    block_header: Option<BlockHeader>,
    writes: RwLock<BTreeMap<Vec<u8>, Write>>,
    dirty: RwLock<std::collections::BTreeSet<Vec<u8>>>,
    finalized: AtomicBool,
    merkle_root: RwLock<Option<Id>>,
    /// Bumped on every write; lets a [`crate::merge_iter::MergeIterator`]
    /// detect that the chain it was built over has since mutated
    /// (section 9, "iterator stability across writes").
    generation: AtomicU64,
}

impl<B: Backend> StateDelta<B> {
    /// Constructs an unsealed root delta, backed directly by `backend`.
    /// Left writable (unfinalized, no cached merkle root) so a genesis
    /// closure can install the genesis bundle into it (section 6) before
    /// the caller seals it with `finalize()`/the wrapping node's
    /// `mark_finalized()`.
    pub fn new_root(backend: Arc<RwLock<B>>, id: Id, revision: u64) -> Arc<Self> {
        Arc::new(Self {
            parent: RwLock::new(Parent::Root(backend)),
            id,
            parent_id: RwLock::new(Id::zero()),
            revision,
            block_header: None,
            writes: RwLock::new(BTreeMap::new()),
            dirty: RwLock::new(Default::default()),
            finalized: AtomicBool::new(false),
            merkle_root: RwLock::new(None),
            generation: AtomicU64::new(0),
        })
    }

    /// Constructs a root delta that is already sealed at `merkle_root`:
    /// no local writes, finalized, with its merkle root taken directly
    /// from already-persisted state rather than recomputed by hashing an
    /// (empty) write set over it. Used both to reopen an existing backend
    /// (the root's merkle root comes from the backend's persisted
    /// metadata, section 4.A) and by `ForkDb::commit_node` to re-root a
    /// freshly committed node once its ancestors are squashed.
    pub fn new_root_sealed(backend: Arc<RwLock<B>>, id: Id, revision: u64, merkle_root: Id) -> Arc<Self> {
        Arc::new(Self {
            parent: RwLock::new(Parent::Root(backend)),
            id,
            parent_id: RwLock::new(Id::zero()),
            revision,
            block_header: None,
            writes: RwLock::new(BTreeMap::new()),
            dirty: RwLock::new(Default::default()),
            finalized: AtomicBool::new(true),
            merkle_root: RwLock::new(Some(merkle_root)),
            generation: AtomicU64::new(0),
        })
    }

    /// Constructs a child delta. Invariant (i): `revision == parent.revision + 1`.
    pub fn new_child(
        parent: Arc<StateDelta<B>>,
        id: Id,
        block_header: Option<BlockHeader>,
    ) -> Arc<Self> {
        let revision = parent.revision + 1;
        let parent_id = parent.id;
        Arc::new(Self {
            parent: RwLock::new(Parent::Child(parent)),
            id,
            parent_id: RwLock::new(parent_id),
            revision,
            block_header,
            writes: RwLock::new(BTreeMap::new()),
            dirty: RwLock::new(Default::default()),
            finalized: AtomicBool::new(false),
            merkle_root: RwLock::new(None),
            generation: AtomicU64::new(0),
        })
    }

    pub fn id(&self) -> Id {
        self.id
    }

    pub fn parent_id(&self) -> Id {
        *self.parent_id.read().unwrap()
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn is_root(&self) -> bool {
        matches!(&*self.parent.read().unwrap(), Parent::Root(_))
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized.load(Ordering::Acquire)
    }

    pub fn block_header(&self) -> Option<&BlockHeader> {
        self.block_header.as_ref()
    }

    pub fn parent_delta(&self) -> Option<Arc<StateDelta<B>>> {
        match &*self.parent.read().unwrap() {
            Parent::Child(p) => Some(p.clone()),
            Parent::Root(_) => None,
        }
    }

    /// The backend this delta is ultimately backed by, if it is the root delta.
    pub fn root_backend(&self) -> Option<Arc<RwLock<B>>> {
        match &*self.parent.read().unwrap() {
            Parent::Root(b) => Some(b.clone()),
            Parent::Child(_) => None,
        }
    }

    /// Looks up `key`, checking this delta's own writes first, then
    /// falling through the parent chain (or the backend for the root).
    pub fn find(&self, key: &[u8]) -> anyhow::Result<Option<Vec<u8>>> {
        if let Some(w) = self.writes.read().unwrap().get(key) {
            return Ok(w.clone());
        }
        match &*self.parent.read().unwrap() {
            Parent::Root(backend) => backend.read().unwrap().get(key),
            Parent::Child(parent) => parent.find(key),
        }
    }

    /// `true` if `key` was written (put or erased) in this delta specifically.
    pub fn is_modified(&self, key: &[u8]) -> bool {
        self.writes.read().unwrap().contains_key(key)
    }

    pub fn put(&self, key: &[u8], value: Vec<u8>) -> anyhow::Result<()> {
        self.assert_writable()?;
        self.writes
            .write()
            .unwrap()
            .insert(key.to_vec(), Some(value));
        self.dirty.write().unwrap().insert(key.to_vec());
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    pub fn erase(&self, key: &[u8]) -> anyhow::Result<()> {
        self.assert_writable()?;
        self.writes.write().unwrap().insert(key.to_vec(), None);
        self.dirty.write().unwrap().insert(key.to_vec());
        self.generation.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    /// A monotonically increasing counter bumped on every write, used to
    /// detect concurrent mutation of a delta a [`crate::merge_iter::MergeIterator`]
    /// is reading over.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    fn assert_writable(&self) -> anyhow::Result<()> {
        if self.is_finalized() {
            anyhow::bail!(chain_types::ChainError::NodeFinalized);
        }
        Ok(())
    }

    /// A snapshot of the writes made directly in this delta (not merged
    /// with ancestors), ordered by key. Used when squashing a chain of
    /// deltas down into the backend on commit.
    pub fn local_writes(&self) -> BTreeMap<Vec<u8>, Write> {
        self.writes.read().unwrap().clone()
    }

    /// Marks the delta immutable and computes its merkle root (invariant
    /// (iv): a deterministic function of the parent's root and this
    /// delta's ordered `(key, value_or_tombstone)` pairs).
    pub fn finalize(&self) -> anyhow::Result<Id> {
        if let Some(root) = *self.merkle_root.read().unwrap() {
            return Ok(root);
        }
        let parent_root = match &*self.parent.read().unwrap() {
            Parent::Root(backend) => backend
                .read()
                .unwrap()
                .metadata()?
                .merkle_root
                .unwrap_or_else(Id::zero),
            Parent::Child(p) => p.merkle_root()?,
        };
        let writes = self.writes.read().unwrap();
        let mut buf = parent_root.to_bytes();
        for (k, v) in writes.iter() {
            buf.extend_from_slice(&(k.len() as u32).to_be_bytes());
            buf.extend_from_slice(k);
            match v {
                Some(value) => {
                    buf.push(1);
                    buf.extend_from_slice(&(value.len() as u32).to_be_bytes());
                    buf.extend_from_slice(value);
                }
                None => buf.push(0),
            }
        }
        let root = Id::hash(&buf);
        *self.merkle_root.write().unwrap() = Some(root);
        self.finalized.store(true, Ordering::Release);
        Ok(root)
    }

    /// The delta's merkle root, computing it via [`Self::finalize`] if
    /// this is the first call.
    pub fn merkle_root(&self) -> anyhow::Result<Id> {
        if let Some(root) = *self.merkle_root.read().unwrap() {
            return Ok(root);
        }
        self.finalize()
    }

    /// Merges this delta's writes directly into its parent delta's write
    /// set, as if they had always been made there. Used to squash an
    /// anonymous node back into its writable parent on `commit` (section
    /// 3, "Anonymous node").
    pub fn squash_into_parent(&self) -> anyhow::Result<()> {
        let parent = match &*self.parent.read().unwrap() {
            Parent::Child(p) => p.clone(),
            Parent::Root(_) => anyhow::bail!("cannot squash the root delta into a backend directly"),
        };
        parent.assert_writable()?;
        let writes = self.writes.read().unwrap();
        let mut parent_writes = parent.writes.write().unwrap();
        let mut parent_dirty = parent.dirty.write().unwrap();
        for (k, v) in writes.iter() {
            parent_writes.insert(k.clone(), v.clone());
            parent_dirty.insert(k.clone());
        }
        if !writes.is_empty() {
            parent.generation.fetch_add(1, Ordering::AcqRel);
        }
        Ok(())
    }

    /// Re-roots this delta directly onto `backend` in place: `parent`
    /// becomes `Parent::Root(backend)`, `parent_id` becomes the zero id,
    /// and the local write/dirty sets are cleared (their contents are
    /// expected to already have been squashed into `backend` by the
    /// caller). The delta's own `id` and cached merkle root are
    /// untouched. Used by `ForkDb::commit_node` once a node becomes the
    /// new fork-tree root (section 4.C, invariant 3): because this
    /// mutates the delta in place rather than replacing it, every
    /// descendant that already holds an `Arc` to this exact delta
    /// observes the re-rooting, and the discarded ancestor chain above
    /// it becomes unreferenced and is dropped.
    pub fn reroot_onto_backend(&self, backend: Arc<RwLock<B>>) {
        *self.parent.write().unwrap() = Parent::Root(backend);
        *self.parent_id.write().unwrap() = Id::zero();
        self.writes.write().unwrap().clear();
        self.dirty.write().unwrap().clear();
    }
}
