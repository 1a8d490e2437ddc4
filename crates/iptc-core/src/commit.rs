//! Commit Driver and Counter Reconciliation (§4.7).

use crate::diagnostics::{CommitLogRecord, CounterReconciliation};
use crate::error::{IptcError, IptcResult};
use crate::model::{Counters, CounterTag};
use crate::table::Table;
use crate::transport::{CountersInfo, Transport};

impl<T: Transport> Table<T> {
    /// No-op when `changed` is false. Otherwise compiles the cache,
    /// issues an atomic replace, reconciles counters against the
    /// kernel's pre-replace read-back, and pushes the deltas.
    pub fn commit(&mut self) -> IptcResult<()> {
        if !self.changed {
            return Ok(());
        }

        let compiled = self.compile()?;
        let pre = self
            .transport
            .set_replace(&compiled.header, &compiled.bytes)
            .map_err(|e| crate::parser::map_transport_err(e, IptcError::InvalidRule))?;

        let mut deltas = Vec::with_capacity(compiled.rule_tags.len());
        let mut reconciliations = Vec::with_capacity(compiled.rule_tags.len());
        for (new_index, (tag, cached)) in compiled.rule_tags.iter().enumerate() {
            let contribution = match *tag {
                CounterTag::NoMap => Counters::zero(),
                CounterTag::NormalMap { map_pos } => pre.get(map_pos).copied().unwrap_or(Counters::zero()),
                CounterTag::Zeroed { map_pos } => {
                    let read_back = pre.get(map_pos).copied().unwrap_or(Counters::zero());
                    Counters {
                        packets: read_back.packets.saturating_sub(cached.packets),
                        bytes: read_back.bytes.saturating_sub(cached.bytes),
                    }
                }
                CounterTag::Set => *cached,
            };
            deltas.push(contribution);
            if self.commit_log.is_some() {
                reconciliations.push(CounterReconciliation {
                    rule_new_index: new_index,
                    tag: tag_name(tag),
                    pre_replace: pre.get(tag.map_pos().unwrap_or(usize::MAX)).copied().unwrap_or(Counters::zero()),
                    contribution,
                });
            }
        }

        let info = CountersInfo {
            table_name: self.name.clone(),
            num_counters: deltas.len() as u32,
        };
        match self.transport.add_counters(&info, &deltas) {
            Ok(()) => {
                self.changed = false;
                self.log_commit(CommitLogRecord {
                    outcome: "ok",
                    old_num_entries: self.old_num_entries,
                    new_num_entries: compiled.header.num_entries,
                    reconciliations,
                });
                self.old_num_entries = compiled.header.num_entries;
                Ok(())
            }
            Err(e) => {
                self.log_commit(CommitLogRecord {
                    outcome: "add_counters_failed",
                    old_num_entries: self.old_num_entries,
                    new_num_entries: compiled.header.num_entries,
                    reconciliations,
                });
                Err(crate::parser::map_transport_err(e, IptcError::Transport(format!("{e}"))))
            }
        }
    }

    fn log_commit(&mut self, record: CommitLogRecord) {
        if let Some(log) = self.commit_log.as_mut() {
            log.push(record);
        }
    }
}

fn tag_name(tag: &CounterTag) -> &'static str {
    match tag {
        CounterTag::NoMap => "NOMAP",
        CounterTag::NormalMap { .. } => "NORMAL_MAP",
        CounterTag::Zeroed { .. } => "ZEROED",
        CounterTag::Set => "SET",
    }
}
