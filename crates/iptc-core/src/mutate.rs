//! Mutators (§4.5): cache-local operations that never talk to the
//! transport. Every successful mutator sets `changed`.

use crate::blob::{self};
use crate::error::{IptcError, IptcResult};
use crate::model::{is_reserved_label, Chain, ChainId, ChainKind, Counters, CounterTag, Rule, RuleKind, Verdict};
use crate::parser::encode_verdict;
use crate::table::{Cursor, Table};
use crate::transport::Transport;

/// A caller-provided entry, prior to target mapping and offset
/// assignment. `ip_header` holds the protocol-specific fixed fields
/// (IP endpoints and masks, interface names and masks, protocol,
/// flags/invflags) that `delete_entry`/`check_entry` compare byte-equal.
#[derive(Debug, Clone)]
pub struct EntrySpec {
    pub ip_header: [u8; blob::IP_TUPLE_SIZE],
    pub matches: Vec<u8>,
    pub target_name: String,
    pub target_revision: u8,
    pub target_payload: Vec<u8>,
}

impl<T: Transport> Table<T> {
    // ---- §4.5.1 target mapping ----

    /// Classifies `name` the way `map_target` does, but without the
    /// JUMP refcount side effect — shared by the mutating mapper and
    /// by `delete_entry`/`check_entry`'s read-only comparison.
    fn classify_target(&self, name: &str) -> IptcResult<RuleKind> {
        if name.is_empty() {
            return Ok(RuleKind::FallThrough);
        }
        if let Some(v) = Verdict::from_name(name) {
            return Ok(RuleKind::Standard(v));
        }
        if self.builtins.iter().any(|&id| self.chain(id).name == name) {
            return Err(IptcError::InvalidRule);
        }
        if let Some(id) = self.user_chains.iter().copied().find(|&id| self.chain(id).name == name) {
            return Ok(RuleKind::Jump(id));
        }
        Ok(RuleKind::Module {
            name: name.to_string(),
            target_size: 0,
        })
    }

    /// `map_target(name)` (§4.5.1): classifies and, for JUMP, bumps the
    /// target chain's reference count.
    fn map_target(&mut self, name: &str) -> IptcResult<RuleKind> {
        let kind = self.classify_target(name)?;
        if let RuleKind::Jump(id) = kind {
            self.chain_mut(id).refcount += 1;
        }
        Ok(kind)
    }

    fn build_rule(&mut self, entry: EntrySpec) -> IptcResult<Rule> {
        let kind = self.map_target(&entry.target_name)?;
        let kind = match kind {
            RuleKind::Module { name, .. } => RuleKind::Module {
                name,
                target_size: (blob::RECORD_HEADER_SIZE + blob::align(entry.target_payload.len())) as u16,
            },
            other => other,
        };

        let (wire_name, payload): (&str, Vec<u8>) = match &kind {
            RuleKind::FallThrough | RuleKind::Jump(_) => {
                (blob::STANDARD_TARGET_NAME, 0i32.to_le_bytes().to_vec())
            }
            RuleKind::Standard(v) => (blob::STANDARD_TARGET_NAME, encode_verdict(*v).to_le_bytes().to_vec()),
            RuleKind::Module { .. } => (entry.target_name.as_str(), entry.target_payload.clone()),
        };
        let revision = match &kind {
            RuleKind::Module { .. } => entry.target_revision,
            _ => 0,
        };

        let bytes = blob::build_entry(&entry.ip_header, &entry.matches, wire_name, revision, &payload);

        Ok(Rule {
            kind,
            // Real offset/index are only meaningful after `commit`'s
            // compile pass 1; zero until then.
            offset: 0,
            size: bytes.len() as u32,
            counters: Counters::zero(),
            counter_tag: CounterTag::NoMap,
            bytes,
        })
    }

    fn remove_rule_at(&mut self, chain_id: ChainId, idx: usize) {
        let removed = self.chain_mut(chain_id).rules.remove(idx);
        if let RuleKind::Jump(target) = removed.kind {
            self.chain_mut(target).refcount -= 1;
        }
        if let Some((cid, cur)) = self.cursor_rule.as_mut() {
            if *cid == chain_id {
                cur.on_removed(idx);
            }
        }
    }

    // ---- entry mutators ----

    pub fn insert_entry(&mut self, chain: &str, entry: EntrySpec, rulenum: usize) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let len = self.chain(chain_id).rules.len();
        if rulenum > len {
            return Err(IptcError::IndexOutOfRange);
        }
        let rule = self.build_rule(entry)?;
        self.chain_mut(chain_id).rules.insert(rulenum, rule);
        self.changed = true;
        self.log_mutation("insert_entry", chain, "ok", format!("rulenum {rulenum}"));
        Ok(())
    }

    pub fn append_entry(&mut self, chain: &str, entry: EntrySpec) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let len = self.chain(chain_id).rules.len();
        self.insert_entry(chain, entry, len)
    }

    pub fn replace_entry(&mut self, chain: &str, entry: EntrySpec, rulenum: usize) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let len = self.chain(chain_id).rules.len();
        if rulenum >= len {
            return Err(IptcError::IndexOutOfRange);
        }
        let new_rule = self.build_rule(entry)?;
        let old = std::mem::replace(&mut self.chain_mut(chain_id).rules[rulenum], new_rule);
        if let RuleKind::Jump(target) = old.kind {
            self.chain_mut(target).refcount -= 1;
        }
        self.changed = true;
        self.log_mutation("replace_entry", chain, "ok", format!("rulenum {rulenum}"));
        Ok(())
    }

    fn find_matching_rule(&self, chain_id: ChainId, entry: &EntrySpec, matchmask: &[u8]) -> IptcResult<usize> {
        let candidate_kind = self.classify_target(&entry.target_name)?;
        let chain = self.chain(chain_id);
        for (i, rule) in chain.rules.iter().enumerate() {
            let view = blob::EntryView::new(&rule.bytes, 0).expect("rule bytes are always a valid entry");
            let head = &rule.bytes[0..blob::IP_TUPLE_SIZE];
            if head != entry.ip_header.as_slice() {
                continue;
            }
            let match_bytes = &rule.bytes[blob::ENTRY_FIXED_SIZE..view.target_offset() as usize];
            if !matches_masked(match_bytes, &entry.matches, matchmask) {
                continue;
            }
            if !same_target_kind(&rule.kind, &candidate_kind) {
                continue;
            }
            if let (RuleKind::Module { target_size, .. }, RuleKind::Module { .. }) = (&rule.kind, &candidate_kind) {
                let want_size = (blob::RECORD_HEADER_SIZE + blob::align(entry.target_payload.len())) as u16;
                if *target_size != want_size {
                    continue;
                }
                let payload = view.target_record().expect("target record present").payload();
                if payload != entry.target_payload.as_slice() {
                    continue;
                }
            }
            return Ok(i);
        }
        Err(IptcError::NotFound)
    }

    pub fn delete_entry(&mut self, chain: &str, entry: EntrySpec, matchmask: &[u8]) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let idx = self.find_matching_rule(chain_id, &entry, matchmask)?;
        self.remove_rule_at(chain_id, idx);
        self.changed = true;
        self.log_mutation("delete_entry", chain, "ok", format!("rule {idx}"));
        Ok(())
    }

    pub fn check_entry(&self, chain: &str, entry: EntrySpec, matchmask: &[u8]) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        self.find_matching_rule(chain_id, &entry, matchmask)?;
        Ok(())
    }

    pub fn delete_num_entry(&mut self, chain: &str, rulenum: usize) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let len = self.chain(chain_id).rules.len();
        if rulenum >= len {
            return Err(IptcError::IndexOutOfRange);
        }
        self.remove_rule_at(chain_id, rulenum);
        self.changed = true;
        self.log_mutation("delete_num_entry", chain, "ok", format!("rule {rulenum}"));
        Ok(())
    }

    pub fn flush_entries(&mut self, chain: &str) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let jump_targets: Vec<ChainId> = self
            .chain(chain_id)
            .rules
            .iter()
            .filter_map(|r| match r.kind {
                RuleKind::Jump(t) => Some(t),
                _ => None,
            })
            .collect();
        for t in jump_targets {
            self.chain_mut(t).refcount -= 1;
        }
        self.chain_mut(chain_id).rules.clear();
        if let Some((cid, cur)) = self.cursor_rule.as_mut() {
            if *cid == chain_id {
                *cur = Cursor::NotStarted;
            }
        }
        self.changed = true;
        self.log_mutation("flush_entries", chain, "ok", "");
        Ok(())
    }

    pub fn zero_entries(&mut self, chain: &str) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        for rule in self.chain_mut(chain_id).rules.iter_mut() {
            if let CounterTag::NormalMap { map_pos } = rule.counter_tag {
                rule.counter_tag = CounterTag::Zeroed { map_pos };
            }
        }
        self.changed = true;
        self.log_mutation("zero_entries", chain, "ok", "");
        Ok(())
    }

    // ---- counters ----

    pub fn read_counter(&self, chain: &str, rulenum: usize) -> IptcResult<Counters> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let rule = Self::rule_by_number(self.chain(chain_id), rulenum).ok_or(IptcError::IndexOutOfRange)?;
        Ok(rule.counters)
    }

    pub fn zero_counter(&mut self, chain: &str, rulenum: usize) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let len = self.chain(chain_id).rules.len();
        if rulenum == 0 || rulenum > len {
            return Err(IptcError::IndexOutOfRange);
        }
        let rule = &mut self.chain_mut(chain_id).rules[rulenum - 1];
        if let CounterTag::NormalMap { map_pos } = rule.counter_tag {
            rule.counter_tag = CounterTag::Zeroed { map_pos };
        }
        self.changed = true;
        Ok(())
    }

    pub fn set_counter(&mut self, chain: &str, rulenum: usize, counters: Counters) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let len = self.chain(chain_id).rules.len();
        if rulenum == 0 || rulenum > len {
            return Err(IptcError::IndexOutOfRange);
        }
        let rule = &mut self.chain_mut(chain_id).rules[rulenum - 1];
        rule.counters = counters;
        rule.counter_tag = CounterTag::Set;
        blob::patch_counters(&mut rule.bytes, counters.packets, counters.bytes);
        self.changed = true;
        Ok(())
    }

    // ---- target / policy / references ----

    pub fn get_target(&self, chain: &str, rulenum: usize) -> IptcResult<String> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let rule = Self::rule_by_number(self.chain(chain_id), rulenum).ok_or(IptcError::IndexOutOfRange)?;
        Ok(match &rule.kind {
            RuleKind::FallThrough => String::new(),
            RuleKind::Jump(id) => self.chain(*id).name.clone(),
            RuleKind::Standard(v) => v.name().to_string(),
            RuleKind::Module { name, .. } => name.clone(),
        })
    }

    pub fn get_policy(&self, chain: &str) -> IptcResult<(Verdict, Counters)> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        let c = self.chain(chain_id);
        let policy = c.policy().ok_or(IptcError::BuiltinChain)?;
        Ok((policy, c.counters))
    }

    pub fn set_policy(&mut self, chain: &str, policy: &str, counters: Option<Counters>) -> IptcResult<()> {
        let chain_id = self.find_chain_by_label(chain).ok_or(IptcError::NoSuchChain)?;
        if !self.chain(chain_id).is_builtin() {
            return Err(IptcError::BuiltinChain);
        }
        let v = match policy {
            "ACCEPT" => Verdict::Accept,
            "DROP" => Verdict::Drop,
            _ => return Err(IptcError::InvalidRule),
        };
        let c = self.chain_mut(chain_id);
        if let ChainKind::Builtin { policy, .. } = &mut c.kind {
            *policy = v;
        }
        match counters {
            Some(counters) => {
                c.counters = counters;
                c.counter_tag = CounterTag::Set;
            }
            None => c.counter_tag = CounterTag::NoMap,
        }
        self.changed = true;
        self.log_mutation("set_policy", chain, "ok", policy.to_string());
        Ok(())
    }

    // ---- chain mutators ----

    pub fn create_chain(&mut self, name: &str) -> IptcResult<()> {
        if is_reserved_label(name) {
            return Err(IptcError::ReservedLabel);
        }
        if name.len() > blob::CHAIN_NAME_MAX {
            return Err(IptcError::NameTooLong);
        }
        if self.is_chain(name) {
            return Err(IptcError::ChainExists);
        }
        let chain = Chain {
            name: name.to_string(),
            kind: ChainKind::UserDefined,
            counters: Counters::zero(),
            counter_tag: CounterTag::NoMap,
            refcount: 0,
            rules: Vec::new(),
            head_offset: 0,
            foot_offset: 0,
        };
        let id = self.alloc_chain(chain);
        let pos = self.insert_user_chain_sorted(id);
        if pos == 0 {
            self.index.replace_head(id);
        } else {
            self.index.note_insert(&self.user_chains, &self.index_cfg);
        }
        self.changed = true;
        self.log_mutation("create_chain", name, "ok", "");
        Ok(())
    }

    pub fn rename_chain(&mut self, old: &str, new: &str) -> IptcResult<()> {
        let id = self.find_chain_by_label(old).ok_or(IptcError::NoSuchChain)?;
        if self.chain(id).is_builtin() {
            return Err(IptcError::BuiltinChain);
        }
        if is_reserved_label(new) {
            return Err(IptcError::ReservedLabel);
        }
        if new.len() > blob::CHAIN_NAME_MAX {
            return Err(IptcError::NameTooLong);
        }
        if self.is_chain(new) {
            return Err(IptcError::ChainExists);
        }
        let old_pos = self
            .user_chains
            .iter()
            .position(|&c| c == id)
            .ok_or(IptcError::NoSuchChain)?;
        self.user_chains.remove(old_pos);
        self.chain_mut(id).name = new.to_string();
        self.insert_user_chain_sorted(id);
        // Renaming can move the chain to an arbitrary new position;
        // a single-slot patch isn't enough, so rebuild outright.
        self.index.rebuild(&self.user_chains, &self.index_cfg);
        self.changed = true;
        self.log_mutation("rename_chain", old, "ok", new.to_string());
        Ok(())
    }

    pub fn delete_chain(&mut self, name: &str) -> IptcResult<()> {
        let id = self.find_chain_by_label(name).ok_or(IptcError::NoSuchChain)?;
        let chain = self.chain(id);
        if chain.is_builtin() {
            return Err(IptcError::BuiltinChain);
        }
        if !chain.rules.is_empty() {
            return Err(IptcError::NotEmpty);
        }
        if chain.refcount > 0 {
            return Err(IptcError::StillReferenced);
        }

        let pos = self.user_chains.iter().position(|&c| c == id).expect("chain is user-defined");
        let successor = self.user_chains.get(pos + 1).copied();
        let patched = self.index.delete_chain(id, successor, pos + 1, self.index_cfg.bucket_size);
        self.user_chains.remove(pos);
        if !patched {
            self.index.rebuild(&self.user_chains, &self.index_cfg);
        }
        self.chains[id.0] = None;

        let combined_idx = self.builtins.len() + pos;
        self.cursor_chain.on_removed(combined_idx);
        if let Some((cid, _)) = self.cursor_rule {
            if cid == id {
                self.cursor_rule = None;
            }
        }

        self.changed = true;
        self.log_mutation("delete_chain", name, "ok", "");
        Ok(())
    }
}

fn same_target_kind(a: &RuleKind, b: &RuleKind) -> bool {
    match (a, b) {
        (RuleKind::FallThrough, RuleKind::FallThrough) => true,
        (RuleKind::Jump(x), RuleKind::Jump(y)) => x == y,
        (RuleKind::Standard(x), RuleKind::Standard(y)) => x == y,
        (RuleKind::Module { .. }, RuleKind::Module { .. }) => true,
        _ => false,
    }
}

/// Equal iff every bit selected by `mask` agrees between `a` and `b`;
/// a mask shorter than the payload leaves the tail unmasked (don't care).
fn matches_masked(a: &[u8], b: &[u8], mask: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).enumerate().all(|(i, (&x, &y))| {
        let m = mask.get(i).copied().unwrap_or(0);
        (x ^ y) & m == 0
    })
}

#[cfg(test)]
mod tests {
    use crate::test_support::*;

    #[test]
    fn create_chain_rejects_reserved_and_duplicate_names() {
        let (table, blob) = three_empty_chains();
        let mut t = init_mock(blob, table);
        assert!(t.create_chain("LOGGING").is_ok());
        assert_eq!(t.create_chain("ACCEPT").unwrap_err(), crate::error::IptcError::ReservedLabel);
        assert_eq!(t.create_chain("LOGGING").unwrap_err(), crate::error::IptcError::ChainExists);
    }

    #[test]
    fn delete_chain_rejects_builtin_and_referenced() {
        let (table, blob) = three_empty_chains();
        let mut t = init_mock(blob, table);
        assert_eq!(t.delete_chain("INPUT").unwrap_err(), crate::error::IptcError::BuiltinChain);
        t.create_chain("LOGGING").unwrap();
        assert!(t.delete_chain("LOGGING").is_ok());
    }

    #[test]
    fn set_policy_rejects_non_builtin_verdicts() {
        let (table, blob) = three_empty_chains();
        let mut t = init_mock(blob, table);
        assert_eq!(
            t.set_policy("FORWARD", "QUEUE", None).unwrap_err(),
            crate::error::IptcError::InvalidRule
        );
        assert!(t.set_policy("FORWARD", "ACCEPT", None).is_ok());
        assert_eq!(t.get_policy("FORWARD").unwrap().0.name(), "ACCEPT");
    }
}
