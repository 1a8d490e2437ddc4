//! Compiler (§4.6): two-pass conversion of the cache back into a
//! kernel-submittable blob.

use crate::blob;
use crate::error::IptcResult;
use crate::model::{ChainId, ChainKind, Counters, CounterTag, RuleKind, Verdict};
use crate::parser::encode_verdict;
use crate::table::Table;
use crate::transport::{ReplaceHeader, Transport};

/// Output of one compile: the submittable blob, its replacement
/// header, and per-entry counter-map tags in the blob's linear order
/// (one slot per rule, chain header, and chain footer — in that
/// order — used by `commit`'s counter reconciliation, §4.7).
pub(crate) struct CompiledBlob {
    pub bytes: Vec<u8>,
    pub header: ReplaceHeader,
    pub rule_tags: Vec<(CounterTag, Counters)>,
}

pub(crate) fn header_size(is_builtin: bool) -> u32 {
    if is_builtin {
        0
    } else {
        (blob::ENTRY_FIXED_SIZE + blob::ERROR_TARGET_SIZE) as u32
    }
}

impl<T: Transport> Table<T> {
    /// Compile the cache into a fresh blob. Reassigns every chain's
    /// `head_offset`/`foot_offset` and every rule's `offset` to match
    /// the newly computed layout.
    pub(crate) fn compile(&mut self) -> IptcResult<CompiledBlob> {
        let chain_ids: Vec<ChainId> = self.chain_order().collect();
        let mut offset: u32 = 0;
        let mut num_entries: u32 = 0;

        // Pass 1: reserve offsets.
        for &cid in &chain_ids {
            let is_builtin = self.chain(cid).is_builtin();
            self.chain_mut(cid).head_offset = offset;
            if !is_builtin {
                offset += header_size(false);
                num_entries += 1;
            }
            let rule_count = self.chain(cid).rules.len();
            for i in 0..rule_count {
                let size = self.chain(cid).rules[i].size;
                self.chain_mut(cid).rules[i].offset = offset;
                offset += size;
                num_entries += 1;
            }
            self.chain_mut(cid).foot_offset = offset;
            offset += (blob::ENTRY_FIXED_SIZE + blob::STANDARD_TARGET_SIZE) as u32;
            num_entries += 1;
        }
        let final_error_offset = offset;
        offset += (blob::ENTRY_FIXED_SIZE + blob::ERROR_TARGET_SIZE) as u32;
        num_entries += 1;
        let new_size = offset;

        // Pass 2: emit bytes, patching JUMP/FALL-THROUGH verdicts now
        // that every chain's head_offset is known.
        let mut bytes = vec![0u8; new_size as usize];
        let mut rule_tags: Vec<(CounterTag, Counters)> = Vec::with_capacity(num_entries as usize);

        for &cid in &chain_ids {
            let is_builtin = self.chain(cid).is_builtin();
            if !is_builtin {
                let name = self.chain(cid).name.clone();
                let head = self.chain(cid).head_offset as usize;
                let header_bytes = blob::build_entry(
                    &[0u8; blob::IP_TUPLE_SIZE],
                    &[],
                    blob::ERROR_TARGET_NAME,
                    0,
                    &blob::error_payload(&name),
                );
                bytes[head..head + header_bytes.len()].copy_from_slice(&header_bytes);
                rule_tags.push((CounterTag::NoMap, Counters::zero()));
            }

            let rule_count = self.chain(cid).rules.len();
            for i in 0..rule_count {
                let kind = self.chain(cid).rules[i].kind.clone();
                let rule_offset = self.chain(cid).rules[i].offset;
                let rule_size = self.chain(cid).rules[i].size;
                let mut entry_bytes = self.chain(cid).rules[i].bytes.clone();

                match kind {
                    RuleKind::Jump(target) => {
                        let verdict = self.chain(target).head_offset + header_size(false);
                        blob::patch_target_name(&mut entry_bytes, blob::STANDARD_TARGET_NAME);
                        blob::patch_verdict(&mut entry_bytes, verdict as i32);
                    }
                    RuleKind::FallThrough => {
                        let verdict = rule_offset + rule_size;
                        blob::patch_target_name(&mut entry_bytes, blob::STANDARD_TARGET_NAME);
                        blob::patch_verdict(&mut entry_bytes, verdict as i32);
                    }
                    RuleKind::Standard(_) | RuleKind::Module { .. } => {}
                }

                let start = rule_offset as usize;
                bytes[start..start + entry_bytes.len()].copy_from_slice(&entry_bytes);
                let rule = &self.chain(cid).rules[i];
                rule_tags.push((rule.counter_tag, rule.counters));
            }

            let verdict = match &self.chain(cid).kind {
                ChainKind::Builtin { policy, .. } => encode_verdict(*policy),
                ChainKind::UserDefined => encode_verdict(Verdict::Return),
            };
            let counters = self.chain(cid).counters;
            let mut footer_bytes = blob::build_entry(
                &[0u8; blob::IP_TUPLE_SIZE],
                &[],
                blob::STANDARD_TARGET_NAME,
                0,
                &verdict.to_le_bytes(),
            );
            blob::patch_counters(&mut footer_bytes, counters.packets, counters.bytes);
            let foot = self.chain(cid).foot_offset as usize;
            bytes[foot..foot + footer_bytes.len()].copy_from_slice(&footer_bytes);
            rule_tags.push((self.chain(cid).counter_tag, counters));
        }

        let final_bytes = blob::build_entry(
            &[0u8; blob::IP_TUPLE_SIZE],
            &[],
            blob::ERROR_TARGET_NAME,
            0,
            &blob::error_payload("ERROR"),
        );
        bytes[final_error_offset as usize..final_error_offset as usize + final_bytes.len()]
            .copy_from_slice(&final_bytes);

        let mut hook_entry = self.info.hook_entry.clone();
        let mut underflow = self.info.underflow.clone();
        for &cid in &chain_ids {
            if let ChainKind::Builtin { hook, .. } = &self.chain(cid).kind {
                let idx = *hook as usize;
                if idx < hook_entry.len() {
                    hook_entry[idx] = self.chain(cid).head_offset;
                    underflow[idx] = self.chain(cid).foot_offset;
                }
            }
        }

        let header = ReplaceHeader {
            table_name: self.name.clone(),
            num_entries,
            size: new_size,
            old_num_entries: self.old_num_entries,
            valid_hooks: self.info.valid_hooks,
            hook_entry,
            underflow,
        };

        Ok(CompiledBlob { bytes, header, rule_tags })
    }
}
