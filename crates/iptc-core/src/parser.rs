//! Parser (§4.4): two-pass conversion of the kernel blob into the cache.

use crate::blob::{self, EntryView};
use crate::config::IndexConfig;
use crate::error::{IptcError, IptcResult};
use crate::index::ChainIndex;
use crate::model::{Chain, ChainId, ChainKind, Counters, CounterTag, Rule, RuleKind, Verdict};
use crate::table::{Cursor, Table};
use crate::transport::{Transport, TransportError};

impl<T: Transport> Table<T> {
    /// `init(table)`: get-info, allocate, get-entries (retrying on a
    /// snapshot-size change), then run the two-pass parse.
    pub fn init(table: &str, mut transport: T) -> IptcResult<Self> {
        loop {
            let info = transport
                .get_info(table)
                .map_err(|e| map_transport_err(e, IptcError::NoSuchTable))?;
            match transport.get_entries(table, info.size) {
                Ok(blob) => {
                    let old_num_entries = info.num_entries;
                    let mut t = Table {
                        name: table.to_string(),
                        transport,
                        changed: false,
                        chains: Vec::new(),
                        builtins: Vec::new(),
                        user_chains: Vec::new(),
                        index: ChainIndex::empty(),
                        index_cfg: IndexConfig::default(),
                        info,
                        old_num_entries,
                        cursor_chain: Cursor::NotStarted,
                        cursor_rule: None,
                        mutation_log: None,
                        commit_log: None,
                    };
                    t.parse_blob(&blob)?;
                    return Ok(t);
                }
                Err(TransportError::SnapshotChanged) => continue,
                Err(e) => return Err(map_transport_err(e, IptcError::Transport(format!("{e}")))),
            }
        }
    }

    pub(crate) fn alloc_chain(&mut self, chain: Chain) -> ChainId {
        let id = ChainId(self.chains.len());
        self.chains.push(Some(chain));
        id
    }

    /// Splice a newly-arrived user-defined chain into `user_chains`
    /// sorted order. Returns its sorted position.
    pub(crate) fn insert_user_chain_sorted(&mut self, id: ChainId) -> usize {
        let name = self.chain(id).name.clone();
        let pos = self
            .user_chains
            .iter()
            .position(|&c| self.chain(c).name.as_str() > name.as_str())
            .unwrap_or(self.user_chains.len());
        self.user_chains.insert(pos, id);
        pos
    }

    fn parse_blob(&mut self, data: &[u8]) -> IptcResult<()> {
        let mut offset: u32 = 0;
        let mut current: Option<ChainId> = None;
        // sorted_offsets starts true; a chain arriving out of name
        // order (post-upgrade kernels can do this) clears it.
        self.index.sorted_offsets = true;
        // Sequential position in the snapshot's linear entry order,
        // counting every real wire entry (including chain footers)
        // as it is parsed — NOT derived from live `rules.len()` sums,
        // since those shrink once a footer is popped by `close_policy`.
        let mut rule_seq: u32 = 0;

        while (offset as usize) < data.len() {
            let view = EntryView::new(data, offset)
                .ok_or(IptcError::Corrupt("entry offset does not resolve to a boundary"))?;
            let next = offset + view.next_offset() as u32;

            if let Some(_hook) = self.info.is_hook_entry(offset) {
                self.close_policy(current, &view)?;
                let chain_id = self.begin_builtin_chain(offset)?;
                current = Some(chain_id);
                self.push_rule_from_view(chain_id, &view, offset, &mut rule_seq)?;
            } else if is_error_chain_header(&view)? && next != data.len() as u32 {
                self.close_policy(current, &view)?;
                let chain_id = self.begin_user_chain(&view, offset)?;
                current = Some(chain_id);
            } else if next == data.len() as u32 {
                self.close_policy(current, &view)?;
                break;
            } else {
                let chain_id = current.ok_or(IptcError::Corrupt("rule before any chain header"))?;
                self.push_rule_from_view(chain_id, &view, offset, &mut rule_seq)?;
            }

            offset = next;
        }

        self.index.build(&self.user_chains, &self.index_cfg);
        self.resolve_jumps()?;
        Ok(())
    }

    fn begin_builtin_chain(&mut self, offset: u32) -> IptcResult<ChainId> {
        let hook = self
            .info
            .is_hook_entry(offset)
            .ok_or(IptcError::Corrupt("not a hook entry"))?;
        let name = hook_name(hook);
        let chain = Chain {
            name: name.to_string(),
            kind: ChainKind::Builtin {
                hook: hook as u32,
                policy: Verdict::Accept,
            },
            counters: Counters::zero(),
            counter_tag: CounterTag::NoMap,
            refcount: 0,
            rules: Vec::new(),
            head_offset: offset,
            foot_offset: offset,
        };
        let id = self.alloc_chain(chain);
        self.builtins.push(id);
        Ok(id)
    }

    fn begin_user_chain(&mut self, view: &EntryView, offset: u32) -> IptcResult<ChainId> {
        let target = view
            .target_record()
            .ok_or(IptcError::Corrupt("missing target record"))?;
        // `target.name()` is the ERROR extension's own record name
        // (always the literal "ERROR"); the chain name lives in the
        // target's payload, per `compile.rs`'s header emission.
        let name = blob::read_name(target.payload());
        if name.is_empty() {
            return Err(IptcError::Corrupt("user-defined chain header has no name"));
        }
        let chain = Chain {
            name: name.clone(),
            kind: ChainKind::UserDefined,
            counters: Counters::zero(),
            counter_tag: CounterTag::NoMap,
            refcount: 0,
            rules: Vec::new(),
            head_offset: offset,
            foot_offset: offset,
        };
        let id = self.alloc_chain(chain);
        let would_be_last = self
            .user_chains
            .last()
            .map(|&c| self.chain(c).name.clone())
            .map(|last| name < last)
            .unwrap_or(false);
        if would_be_last {
            self.index.sorted_offsets = false;
        }
        self.insert_user_chain_sorted(id);
        Ok(id)
    }

    /// Close the policy rule of the chain currently open, if any: pop
    /// its last rule into the chain's policy/counters and foot fields.
    fn close_policy(&mut self, current: Option<ChainId>, next_view: &EntryView) -> IptcResult<()> {
        let Some(id) = current else { return Ok(()) };
        let _ = next_view;
        let chain = self.chain_mut(id);
        let Some(policy_rule) = chain.rules.pop() else {
            return Ok(());
        };
        chain.foot_offset = policy_rule.offset;
        chain.counters = policy_rule.counters;
        chain.counter_tag = policy_rule.counter_tag;
        match (&chain.kind, &policy_rule.kind) {
            (ChainKind::Builtin { .. }, RuleKind::Standard(v)) => {
                if let ChainKind::Builtin { policy, .. } = &mut chain.kind {
                    *policy = *v;
                }
            }
            (ChainKind::UserDefined, _) => {}
            _ => return Err(IptcError::Corrupt("chain footer is not a standard target")),
        }
        Ok(())
    }

    fn push_rule_from_view(
        &mut self,
        chain_id: ChainId,
        view: &EntryView,
        offset: u32,
        rule_seq: &mut u32,
    ) -> IptcResult<()> {
        let target = view
            .target_record()
            .ok_or(IptcError::Corrupt("missing target record"))?;
        let name = target.name();
        let next_off = offset + view.next_offset() as u32;
        let (packets, bytes) = view.counters();
        let rule_index_in_table = *rule_seq as usize;
        *rule_seq += 1;

        // An empty target name is unconditionally FALL-THROUGH. A
        // "STANDARD"-named target carries a verdict payload that
        // disambiguates STANDARD, FALL-THROUGH (by coincident offset),
        // and JUMP.
        let kind = if name.is_empty() {
            RuleKind::FallThrough
        } else if name == blob::STANDARD_TARGET_NAME {
            let verdict = target
                .standard_verdict()
                .ok_or(IptcError::Corrupt("standard target missing verdict payload"))?;
            if target.size as usize != blob::STANDARD_TARGET_SIZE {
                return Err(IptcError::Corrupt("standard target has wrong target_size"));
            }
            if verdict < 0 {
                RuleKind::Standard(decode_negative_verdict(verdict)?)
            } else if verdict as u32 == next_off {
                RuleKind::FallThrough
            } else {
                // Resolved to a real ChainId in pass 2 (`resolve_jumps`).
                RuleKind::Jump(ChainId(usize::MAX))
            }
        } else if name == blob::ERROR_TARGET_NAME {
            return Err(IptcError::Corrupt("unexpected ERROR target mid-chain"));
        } else {
            RuleKind::Module {
                name: name.clone(),
                target_size: target.size,
            }
        };

        let rule = Rule {
            kind,
            offset,
            size: view.next_offset() as u32,
            counters: Counters { packets, bytes },
            counter_tag: CounterTag::NormalMap {
                map_pos: rule_index_in_table,
            },
            bytes: view.entry_bytes().to_vec(),
        };
        self.chain_mut(chain_id).rules.push(rule);
        Ok(())
    }

    /// Pass 2: resolve every JUMP rule's placeholder target by offset,
    /// incrementing the target chain's reference count.
    fn resolve_jumps(&mut self) -> IptcResult<()> {
        let chain_ids: Vec<ChainId> = self.chain_order().collect();
        for cid in chain_ids {
            let rule_count = self.chain(cid).rules.len();
            for i in 0..rule_count {
                let (is_placeholder, verdict_offset) = {
                    let rule = &self.chain(cid).rules[i];
                    match &rule.kind {
                        RuleKind::Jump(placeholder) if placeholder.0 == usize::MAX => {
                            let target = crate::blob::EntryView::new(&rule.bytes, 0)
                                .and_then(|v| v.target_record())
                                .and_then(|t| t.standard_verdict());
                            (true, target)
                        }
                        _ => (false, None),
                    }
                };
                if is_placeholder {
                    let verdict_offset = verdict_offset
                        .ok_or(IptcError::Corrupt("jump rule missing verdict"))? as u32;
                    // The verdict is one rule past the callee's header
                    // (compile.rs's JUMP emission writes
                    // `target.head_offset + header_size(false)`; a JUMP
                    // can only target a user-defined chain, §4.5.1), so
                    // undo that offset before looking the chain up by
                    // its head offset.
                    let head_offset = verdict_offset
                        .checked_sub(crate::compile::header_size(false))
                        .ok_or(IptcError::Corrupt("jump verdict offset underflows chain header size"))?;
                    let target_id = self
                        .find_chain_by_offset(head_offset)
                        .ok_or(IptcError::Corrupt("jump target offset does not resolve"))?;
                    self.chain_mut(cid).rules[i].kind = RuleKind::Jump(target_id);
                    self.chain_mut(target_id).refcount += 1;
                }
            }
        }
        Ok(())
    }
}

pub(crate) fn map_transport_err(e: TransportError, default: IptcError) -> IptcError {
    match e {
        TransportError::NotFound => IptcError::NoSuchTable,
        TransportError::PermissionDenied => IptcError::Permission,
        TransportError::SnapshotChanged => IptcError::SnapshotChanged,
        TransportError::InvalidRule => IptcError::InvalidRule,
        TransportError::LoopDetected => IptcError::LoopDetected,
        TransportError::TargetProblem => default,
    }
}

fn is_error_chain_header(view: &EntryView) -> IptcResult<bool> {
    let Some(target) = view.target_record() else {
        return Ok(false);
    };
    Ok(target.name() == blob::ERROR_TARGET_NAME)
}


fn decode_negative_verdict(v: i32) -> IptcResult<Verdict> {
    // -(NF_ACCEPT+1) = -1, -(NF_DROP+1) = -2, -(NF_QUEUE+1) = -3, RETURN is a
    // distinguished large-negative sentinel (-5, avoiding NF_STOLEN=-4).
    match v {
        -1 => Ok(Verdict::Accept),
        -2 => Ok(Verdict::Drop),
        -3 => Ok(Verdict::Queue),
        -5 => Ok(Verdict::Return),
        _ => Err(IptcError::Corrupt("unrecognized standard verdict")),
    }
}

pub(crate) fn encode_verdict(v: Verdict) -> i32 {
    match v {
        Verdict::Accept => -1,
        Verdict::Drop => -2,
        Verdict::Queue => -3,
        Verdict::Return => -5,
    }
}

fn hook_name(hook: usize) -> &'static str {
    match hook {
        0 => "PREROUTING",
        1 => "INPUT",
        2 => "FORWARD",
        3 => "OUTPUT",
        4 => "POSTROUTING",
        _ => "UNKNOWN",
    }
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;

    #[test]
    fn parses_stock_filter_table_s1() {
        let (table, blob) = three_empty_chains();
        let mut t = init_mock(blob, table);
        assert_eq!(t.first_chain().as_deref(), Some("INPUT"));
        assert_eq!(t.next_chain().as_deref(), Some("FORWARD"));
        assert_eq!(t.next_chain().as_deref(), Some("OUTPUT"));
        assert_eq!(t.next_chain(), None);
        let (policy, counters) = t.get_policy("FORWARD").unwrap();
        assert_eq!(policy.name(), "DROP");
        assert_eq!(counters.packets, 0);
        assert_eq!(counters.bytes, 0);
    }

    /// A snapshot whose JUMP verdict already points one rule past the
    /// callee's header (as `compile.rs` emits it) must resolve in
    /// `resolve_jumps`, not fail with `Corrupt`.
    #[test]
    fn resolves_jump_present_in_parsed_snapshot() {
        let (table, info, blob) = chain_with_jump();
        let mut t = init_mock_with_info(table, info, blob);
        assert_eq!(t.get_target("INPUT", 1).unwrap(), "U");
        assert_eq!(t.get_references("U").unwrap(), 1);
    }
}
