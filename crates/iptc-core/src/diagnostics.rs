//! Structured, serializable lifecycle records.
//!
//! No `log`/`tracing` dependency: observability here is an in-memory
//! vector of small `serde::Serialize` structs a caller can opt into
//! and later render. `Table` follows this shape: diagnostics are off
//! by default and cost nothing unless `with_diagnostics` is used.

use crate::model::Counters;
use serde::Serialize;

/// One mutator's outcome.
#[derive(Debug, Clone, Serialize)]
pub struct MutationLogRecord {
    pub operation: &'static str,
    pub chain: String,
    pub outcome: &'static str,
    pub detail: String,
}

/// One rule's counter reconciliation during a commit (§4.7).
#[derive(Debug, Clone, Serialize)]
pub struct CounterReconciliation {
    pub rule_new_index: usize,
    pub tag: &'static str,
    pub pre_replace: Counters,
    pub contribution: Counters,
}

/// One `commit` call's outcome.
#[derive(Debug, Clone, Serialize)]
pub struct CommitLogRecord {
    pub outcome: &'static str,
    pub old_num_entries: u32,
    pub new_num_entries: u32,
    pub reconciliations: Vec<CounterReconciliation>,
}
