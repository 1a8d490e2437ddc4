//! Error taxonomy for the ruleset cache and compiler.
//!
//! Mirrors the abstract error kinds of the original `libiptc` contract:
//! one flat enum, `Display`-able, with `strerror` resolving a fixed
//! English string for a given `(CurrentOperation, IptcError)` pair,
//! preferring an operation-scoped message over the generic one.

use thiserror::Error;

/// Which public operation was in progress when an error occurred.
///
/// Replaces the source's process-global "which function am I in"
/// pointer: callers (and `strerror`) thread this explicitly instead.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CurrentOperation {
    Init,
    CreateChain,
    DeleteChain,
    RenameChain,
    InsertEntry,
    AppendEntry,
    ReplaceEntry,
    DeleteEntry,
    DeleteNumEntry,
    CheckEntry,
    FlushEntries,
    ZeroEntries,
    SetCounter,
    ZeroCounter,
    SetPolicy,
    Commit,
    Other,
}

/// Errors surfaced by `iptc-core`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IptcError {
    #[error("permission denied")]
    Permission,
    #[error("no such table")]
    NoSuchTable,
    #[error("incompatible kernel protocol version")]
    VersionMismatch,
    #[error("no such chain")]
    NoSuchChain,
    #[error("chain already exists")]
    ChainExists,
    #[error("reserved chain name")]
    ReservedLabel,
    #[error("chain or target name too long")]
    NameTooLong,
    #[error("can't operate on a built-in chain")]
    BuiltinChain,
    #[error("chain is not empty")]
    NotEmpty,
    #[error("chain is still referenced by a jump")]
    StillReferenced,
    #[error("rule number out of range")]
    IndexOutOfRange,
    #[error("rule not found")]
    NotFound,
    #[error("invalid rule")]
    InvalidRule,
    #[error("jump loop detected")]
    LoopDetected,
    #[error("out of memory")]
    OutOfMemory,
    #[error("kernel snapshot changed, retry init")]
    SnapshotChanged,
    #[error("snapshot is corrupt: {0}")]
    Corrupt(&'static str),
    #[error("transport error: {0}")]
    Transport(String),
}

pub type IptcResult<T> = Result<T, IptcError>;

/// Maps a current-operation tag plus an error code to a fixed English
/// string, preferring the more specific message when both a generic and
/// an operation-scoped message exist.
pub fn strerror(op: CurrentOperation, err: &IptcError) -> &'static str {
    use CurrentOperation as Op;
    use IptcError as E;

    match (op, err) {
        (Op::CreateChain, E::ChainExists) => "chain already exists",
        (Op::CreateChain, E::ReservedLabel) => "cannot use a verdict name as a chain name",
        (Op::CreateChain, E::NameTooLong) => "chain name is too long",
        (Op::RenameChain, E::ChainExists) => "target chain name already exists",
        (Op::RenameChain, E::BuiltinChain) => "cannot rename a built-in chain",
        (Op::DeleteChain, E::NotEmpty) => "chain still has rules",
        (Op::DeleteChain, E::StillReferenced) => "chain is still the target of a jump",
        (Op::DeleteChain, E::BuiltinChain) => "cannot delete a built-in chain",
        (Op::SetPolicy, E::BuiltinChain) => "policy can only be set on a built-in chain",
        (Op::InsertEntry, E::IndexOutOfRange) => "rule number is past the end of the chain",
        (Op::DeleteEntry, E::NotFound) | (Op::CheckEntry, E::NotFound) => {
            "no rule matching that specification"
        }
        (Op::DeleteNumEntry, E::IndexOutOfRange) => "no rule at that number",
        (Op::Commit, E::SnapshotChanged) => "table changed since last read, re-init and retry",
        (Op::Init, E::VersionMismatch) => "kernel reports an incompatible table format",
        _ => generic_message(err),
    }
}

fn generic_message(err: &IptcError) -> &'static str {
    match err {
        IptcError::Permission => "permission denied",
        IptcError::NoSuchTable => "table does not exist",
        IptcError::VersionMismatch => "incompatible kernel protocol version",
        IptcError::NoSuchChain => "no such chain",
        IptcError::ChainExists => "chain already exists",
        IptcError::ReservedLabel => "reserved chain name",
        IptcError::NameTooLong => "name too long",
        IptcError::BuiltinChain => "operation not valid on a built-in chain",
        IptcError::NotEmpty => "chain is not empty",
        IptcError::StillReferenced => "chain still referenced",
        IptcError::IndexOutOfRange => "rule number out of range",
        IptcError::NotFound => "rule not found",
        IptcError::InvalidRule => "invalid rule",
        IptcError::LoopDetected => "jump loop detected",
        IptcError::OutOfMemory => "out of memory",
        IptcError::SnapshotChanged => "snapshot changed, retry",
        IptcError::Corrupt(_) => "kernel snapshot is corrupt",
        IptcError::Transport(_) => "transport error",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_operation_scoped_message() {
        let msg = strerror(CurrentOperation::DeleteChain, &IptcError::StillReferenced);
        assert_eq!(msg, "chain is still the target of a jump");
    }

    #[test]
    fn falls_back_to_generic_message() {
        let msg = strerror(CurrentOperation::Other, &IptcError::StillReferenced);
        assert_eq!(msg, "chain still referenced");
    }
}
