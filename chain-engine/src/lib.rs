//! Execution engine: a fork-tree state database, a deterministic
//! execution context, a system-call dispatcher with a persisted override
//! table, and the controller that drives block/transaction application
//! over all of it.
//!
//! ## Logging
//!
//! This crate logs through the `log` facade rather than printing
//! directly; the `chaind` binary installs `env_logger` as the concrete
//! subscriber (section 6, `--log-level`/`--log-dir`/`--log-color`/
//! `--log-datetime`). Log levels follow the usual convention: `error` for
//! conditions the caller must react to, `warn` for best-effort operations
//! that failed without aborting the request (message-bus publishes,
//! block-store writes), `info` for sync/indexing progress, `debug`/`trace`
//! left to call sites as they're added.
//!
//! ## Module map
//!
//! - [`backend`] — the persistent key/value layer (section 4.A)
//! - [`dbkey`] — `(space, key)` → ordered byte-string encoding (section 4.B)
//! - [`delta`] — copy-on-write state overlays (section 4.B)
//! - [`merge_iter`] — ordered merge view across a delta chain (section 4.D)
//! - [`node`] — the writable/finalized/anonymous state-node handle (section 3)
//! - [`fork_db`] — the fork-tree database and fork choice (section 4.C)
//! - [`meter`] — the disk/network/compute resource meter (section 4.E)
//! - [`chronicle`] — the per-context log/event buffer (section 3)
//! - [`context`] — the execution context: stack, meter, chronicler, intent (section 4.E)
//! - [`thunks`] — the native call-id dispatcher (section 4.F)
//! - [`overrides`] — the persisted system-call override table (section 4.H)
//! - [`host`] — the numeric host API and the abstract VM boundary (section 4.G)
//! - [`externs`] — block-store/mempool/message-bus trait boundaries (section 6)
//! - [`controller`] — apply-block/apply-transaction orchestration (section 4.I)
//! - [`indexer`] — bulk historical sync (section 4.J)
//! - [`rpc`] — the request/response envelope served over the wire (section 4.K)

pub mod backend;
pub mod chronicle;
pub mod context;
pub mod controller;
pub mod dbkey;
pub mod delta;
pub mod externs;
pub mod fork_db;
pub mod host;
pub mod indexer;
pub mod merge_iter;
pub mod meter;
pub mod node;
pub mod overrides;
pub mod rpc;
pub mod thunks;
