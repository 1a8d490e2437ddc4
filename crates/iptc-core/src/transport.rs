//! The transport contract (§6 External Interfaces): what the core
//! requires of its environment. A real implementation would speak the
//! kernel's `getsockopt`/`setsockopt` table API; that socket plumbing
//! is an external collaborator and out of scope for this crate (§1).

use crate::blob::RawInfo;
use crate::model::Counters;

/// Header accompanying `set_replace`.
#[derive(Debug, Clone)]
pub struct ReplaceHeader {
    pub table_name: String,
    pub num_entries: u32,
    pub size: u32,
    /// Rule count of the *previous* snapshot — sizes the counters
    /// array `set_replace` hands back.
    pub old_num_entries: u32,
    pub valid_hooks: u32,
    pub hook_entry: Vec<u32>,
    pub underflow: Vec<u32>,
}

/// Header accompanying `add_counters`.
#[derive(Debug, Clone)]
pub struct CountersInfo {
    pub table_name: String,
    pub num_counters: u32,
}

/// Failure reasons a transport may report (§6/§7). Folded into
/// [`crate::error::IptcError`] at the call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("not found")]
    NotFound,
    #[error("permission denied")]
    PermissionDenied,
    #[error("snapshot changed")]
    SnapshotChanged,
    #[error("invalid rule")]
    InvalidRule,
    #[error("loop detected")]
    LoopDetected,
    #[error("target problem")]
    TargetProblem,
}

pub type TransportResult<T> = Result<T, TransportError>;

/// What `iptc-core` requires of its environment: four blocking,
/// atomic operations against a named table (§6).
pub trait Transport {
    fn get_info(&mut self, table: &str) -> TransportResult<RawInfo>;
    fn get_entries(&mut self, table: &str, expected_size: u32) -> TransportResult<Vec<u8>>;
    fn set_replace(&mut self, header: &ReplaceHeader, blob: &[u8]) -> TransportResult<Vec<Counters>>;
    fn add_counters(&mut self, info: &CountersInfo, deltas: &[Counters]) -> TransportResult<()>;
}
