//! Error taxonomy.
//!
//! The split between [`ChainError`] (system/fatal — unwinds past user code)
//! and [`ContractResult`] (the two user-catchable outcomes) mirrors the
//! teacher's split between `ExecutionError`/`Abort::Fatal` and
//! `Abort::Exit`/`Abort::OutOfGas` (`fvm/src/kernel/error.rs`,
//! `fvm/src/syscalls/error.rs`): only a narrow, explicit set of outcomes is
//! visible to contract code, everything else aborts the call.

use thiserror::Error;

/// Errors raised while encoding or decoding the canonical wire format.
#[derive(Debug, Error)]
pub enum EncodingError {
    #[error("failed to serialize value: {0}")]
    Serialize(String),
    #[error("failed to deserialize value: {0}")]
    Deserialize(String),
}

/// Resource dimension exhausted by the meter (section 4.E / 5).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Disk,
    Network,
    Compute,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResourceKind::Disk => "disk",
            ResourceKind::Network => "network",
            ResourceKind::Compute => "compute",
        };
        write!(f, "{s}")
    }
}

/// The full error taxonomy from section 7 of the spec, as real variants
/// rather than prose. Every variant here is a *system*-level error: it
/// unwinds past user contract code (it is never one of the two
/// user-catchable outcomes carried by [`ContractResult`]).
#[derive(Debug, Error)]
pub enum ChainError {
    // --- Validation ---
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("malformed id: {0}")]
    MalformedId(String),
    #[error("timestamp {timestamp} out of bounds (now={now})")]
    TimestampOutOfBounds { timestamp: u64, now: u64 },
    #[error("unexpected height: expected {expected}, got {got}")]
    UnexpectedHeight { expected: u64, got: u64 },
    #[error("state merkle root mismatch")]
    StateMerkleMismatch,
    #[error("invalid signature")]
    InvalidSignature,
    #[error("invalid nonce: expected {expected}, got {got}")]
    InvalidNonce { expected: u64, got: u64 },
    #[error("insufficient resource credits: limit {limit}, required {required}")]
    InsufficientRc { limit: u64, required: u64 },

    // --- Fork-tree ---
    #[error("unknown previous block {0}")]
    UnknownPreviousBlock(String),
    #[error("block height is at or before the last irreversible block")]
    PreIrreversibilityBlock,
    #[error("node is finalized and cannot be mutated")]
    NodeFinalized,
    #[error("cannot discard the head or root node")]
    CannotDiscardHeadOrRoot,
    #[error("fork database internal invariant violated: {0}")]
    ForkDbInvariant(String),

    // --- Execution ---
    #[error("stack overflow: depth exceeds maximum")]
    StackOverflow,
    #[error("insufficient privilege for this call")]
    InsufficientPrivilege,
    #[error("attempted write under a read-only context")]
    ReadOnlyViolation,
    #[error("unknown system call {0}")]
    UnknownSystemCall(u32),
    #[error("unknown thunk {0}")]
    UnknownThunk(u32),
    #[error("arithmetic failure: {0}")]
    ArithmeticFailure(String),
    #[error("assertion failure: {0}")]
    AssertionFailure(String),

    // --- Resource ---
    #[error("{kind} exhausted: used {used}, limit {limit}")]
    ResourceExhausted {
        kind: ResourceKind,
        used: u64,
        limit: u64,
    },
    #[error("insufficient return buffer: need {needed} bytes, have {available}")]
    InsufficientReturnBuffer { needed: u32, available: u32 },

    // --- Integration ---
    #[error("rpc call timed out")]
    RpcTimeout,
    #[error("rpc peer error: {0}")]
    RpcPeerError(String),
    #[error("backend i/o error: {0}")]
    BackendIo(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T> = std::result::Result<T, ChainError>;

/// The three outcomes a host call can produce, per section 4.F/9 ("exception
/// based control flow inside contracts" → explicit result enum). Only
/// [`ContractResult::Ok`] and [`ContractResult::Reversion`]/
/// [`ContractResult::Failure`] are ever observed by contract code; a
/// [`ChainError`] (surfaced as [`ContractResult::SystemError`] at the ABI
/// boundary) unwinds past it instead of being returned as a value.
#[derive(Debug)]
pub enum ContractResult {
    /// Call succeeded; payload is the serialized return value.
    Ok(Vec<u8>),
    /// User-recoverable: the calling contract may continue executing.
    Reversion(String),
    /// Aborts the enclosing transaction; the block may continue (policy-dependent).
    Failure(String),
    /// Not catchable by user code; unwinds to the controller.
    SystemError(ChainError),
}

impl ContractResult {
    pub fn is_catchable(&self) -> bool {
        matches!(self, ContractResult::Reversion(_) | ContractResult::Failure(_))
    }
}
