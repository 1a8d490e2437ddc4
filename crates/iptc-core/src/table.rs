//! The Table Handle and Cache Model (§3, §4.3).

use crate::blob::RawInfo;
use crate::config::IndexConfig;
use crate::diagnostics::{CommitLogRecord, MutationLogRecord};
use crate::error::{IptcError, IptcResult};
use crate::index::ChainIndex;
use crate::model::{Chain, ChainId, ChainKind, Rule};
use crate::transport::Transport;

/// A simple forward-only cursor that survives removal of the element
/// it currently points at by rewinding one step (invariant 8, §8):
/// the next `advance` call then lands on the removed element's
/// successor, which has shifted into its place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Cursor {
    NotStarted,
    At(usize),
    Done,
}

impl Default for Cursor {
    fn default() -> Self {
        Cursor::NotStarted
    }
}

impl Cursor {
    pub(crate) fn advance(&mut self, len: usize) -> Option<usize> {
        let next = match *self {
            Cursor::NotStarted => 0,
            Cursor::At(i) => i + 1,
            Cursor::Done => return None,
        };
        if next < len {
            *self = Cursor::At(next);
            Some(next)
        } else {
            *self = Cursor::Done;
            None
        }
    }

    pub(crate) fn current(&self) -> Option<usize> {
        match self {
            Cursor::At(i) => Some(*i),
            _ => None,
        }
    }

    /// Adjust after the element at `removed_idx` was spliced out of
    /// the underlying `Vec`.
    pub(crate) fn on_removed(&mut self, removed_idx: usize) {
        if let Cursor::At(i) = self {
            if *i == removed_idx {
                *self = if removed_idx == 0 {
                    Cursor::NotStarted
                } else {
                    Cursor::At(removed_idx - 1)
                };
            } else if *i > removed_idx {
                *self = Cursor::At(*i - 1);
            }
        }
    }
}

/// Owns the table name, the transport, the chain arena and ordering,
/// the Chain Index, the raw kernel info, and the two iterator cursors
/// (§3 Data Model, "Table Handle").
pub struct Table<T: Transport> {
    pub(crate) name: String,
    pub(crate) transport: T,
    pub(crate) changed: bool,
    /// Chain arena; `None` marks a freed slot. Indices are never
    /// reused, so a [`ChainId`] is stable for the table's lifetime.
    pub(crate) chains: Vec<Option<Chain>>,
    /// Built-in chains, in kernel (hook) order.
    pub(crate) builtins: Vec<ChainId>,
    /// User-defined chains, strictly sorted by name (invariant 1, §8).
    pub(crate) user_chains: Vec<ChainId>,
    pub(crate) index: ChainIndex,
    pub(crate) index_cfg: IndexConfig,
    pub(crate) info: RawInfo,
    /// Rule count of the snapshot this cache was parsed from; sizes
    /// the pre-replace counters array during `commit` (§4.7).
    pub(crate) old_num_entries: u32,
    pub(crate) cursor_chain: Cursor,
    pub(crate) cursor_rule: Option<(ChainId, Cursor)>,
    pub(crate) mutation_log: Option<Vec<MutationLogRecord>>,
    pub(crate) commit_log: Option<Vec<CommitLogRecord>>,
}

impl<T: Transport> Table<T> {
    /// Enable structured diagnostics collection (§8 of `SPEC_FULL.md`).
    pub fn with_diagnostics(mut self) -> Self {
        self.mutation_log = Some(Vec::new());
        self.commit_log = Some(Vec::new());
        self
    }

    pub fn mutation_log(&self) -> &[MutationLogRecord] {
        self.mutation_log.as_deref().unwrap_or(&[])
    }

    pub fn commit_log(&self) -> &[CommitLogRecord] {
        self.commit_log.as_deref().unwrap_or(&[])
    }

    pub(crate) fn log_mutation(&mut self, operation: &'static str, chain: &str, outcome: &'static str, detail: impl Into<String>) {
        if let Some(log) = self.mutation_log.as_mut() {
            log.push(MutationLogRecord {
                operation,
                chain: chain.to_string(),
                outcome,
                detail: detail.into(),
            });
        }
    }

    pub fn table_name(&self) -> &str {
        &self.name
    }

    pub(crate) fn chain(&self, id: ChainId) -> &Chain {
        self.chains[id.0].as_ref().expect("stale ChainId")
    }

    pub(crate) fn chain_mut(&mut self, id: ChainId) -> &mut Chain {
        self.chains[id.0].as_mut().expect("stale ChainId")
    }

    pub(crate) fn chain_order(&self) -> impl Iterator<Item = ChainId> + '_ {
        self.builtins.iter().chain(self.user_chains.iter()).copied()
    }

    /// `find_chain_by_label`: built-ins first (there are only a
    /// handful, checked linearly), then the Chain Index locates the
    /// start of the user-defined scan.
    pub(crate) fn find_chain_by_label(&self, name: &str) -> Option<ChainId> {
        for &id in &self.builtins {
            if self.chain(id).name == name {
                return Some(id);
            }
        }
        let start = self
            .index
            .lookup_by_name(name, |cid| self.chain(cid).name.clone());
        let start_pos = match start {
            Some(cid) => self.user_chains.iter().position(|&c| c == cid)?,
            None => 0,
        };
        for &id in &self.user_chains[start_pos..] {
            let c = self.chain(id);
            if c.name == name {
                return Some(id);
            }
            if c.name.as_str() > name {
                break;
            }
        }
        None
    }

    /// `find_chain_by_offset`: same shape, by head offset, valid only
    /// while `sorted_offsets` holds.
    pub(crate) fn find_chain_by_offset(&self, offset: u32) -> Option<ChainId> {
        for &id in &self.builtins {
            if self.chain(id).head_offset == offset {
                return Some(id);
            }
        }
        if !self.index.sorted_offsets {
            return self
                .user_chains
                .iter()
                .copied()
                .find(|&id| self.chain(id).head_offset == offset);
        }
        let start = self
            .index
            .lookup_by_offset(offset, |cid| self.chain(cid).head_offset);
        let start_pos = match start {
            Some(cid) => self.user_chains.iter().position(|&c| c == cid)?,
            None => 0,
        };
        self.user_chains[start_pos..]
            .iter()
            .copied()
            .find(|&id| self.chain(id).head_offset == offset)
    }

    /// `get_rule_num`: 1-based rule lookup within a chain. The source
    /// walks a doubly-linked list from whichever end is closer; with
    /// rules stored contiguously (§9 design note: arena over raw
    /// pointers) indexing is O(1) outright.
    pub(crate) fn rule_by_number<'a>(chain: &'a Chain, rulenum: usize) -> Option<&'a Rule> {
        if rulenum == 0 {
            return None;
        }
        chain.rules.get(rulenum - 1)
    }

    // ---- client surface: is_chain / is_builtin / get_references ----

    pub fn is_chain(&self, name: &str) -> bool {
        self.find_chain_by_label(name).is_some()
    }

    /// `is_builtin`: hook number (1..N) for built-in chains, 0 otherwise.
    pub fn is_builtin(&self, name: &str) -> u32 {
        match self.find_chain_by_label(name) {
            Some(id) => self.chain(id).hook().map(|h| h + 1).unwrap_or(0),
            None => 0,
        }
    }

    pub fn get_references(&self, name: &str) -> IptcResult<u32> {
        let id = self.find_chain_by_label(name).ok_or(IptcError::NoSuchChain)?;
        Ok(self.chain(id).refcount)
    }

    // ---- iteration (§4.3 / §4.5 first_chain/next_chain/first_rule/next_rule) ----

    pub fn first_chain(&mut self) -> Option<String> {
        self.cursor_chain = Cursor::NotStarted;
        self.cursor_rule = None;
        let len = self.builtins.len() + self.user_chains.len();
        let idx = self.cursor_chain.advance(len)?;
        Some(self.chain(self.chain_order().nth(idx)?).name.clone())
    }

    pub fn next_chain(&mut self) -> Option<String> {
        let len = self.builtins.len() + self.user_chains.len();
        let idx = self.cursor_chain.advance(len)?;
        Some(self.chain(self.chain_order().nth(idx)?).name.clone())
    }

    pub fn first_rule(&mut self, chain_name: &str) -> Option<usize> {
        let id = self.find_chain_by_label(chain_name)?;
        let mut cur = Cursor::NotStarted;
        let len = self.chain(id).rules.len();
        let idx = cur.advance(len)?;
        self.cursor_rule = Some((id, cur));
        Some(idx)
    }

    pub fn next_rule(&mut self) -> Option<usize> {
        let id = self.cursor_rule.as_ref()?.0;
        let len = self.chain(id).rules.len();
        self.cursor_rule.as_mut()?.1.advance(len)
    }
}
